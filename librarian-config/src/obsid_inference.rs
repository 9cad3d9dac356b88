use crate::model::ObsidInferenceMode;

/// Errors from inferring an obsid out of a file name when no `obsid` is
/// supplied at registration time (§6 "Obsid inference modes").
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InferenceError {
    #[error("obsid inference is disabled (obsid_inference_mode = none)")]
    Disabled,
    #[error("file name {0:?} does not contain enough tokens to infer an obsid")]
    NotEnoughTokens(String),
    #[error("file name {0:?} does not contain a valid obsid token")]
    NotNumeric(String),
}

/// What a file name alone can tell us about its obsid.
///
/// `hera` and `so` names don't carry the obsid directly — they carry a
/// prefix shared by every file from the same observation, and the obsid
/// itself has to be looked up from whichever existing file with that prefix
/// was registered first. `_testing` names embed a Julian Date that converts
/// to a GPS-seconds obsid with no catalog involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferredObsid {
    /// The obsid, fully determined from the name alone.
    Direct(i64),
    /// A name prefix that resolves to an obsid by finding existing files
    /// that share it.
    NamePrefix(String),
}

/// Infer what a bare file name (no directory components) implies about its
/// obsid, according to the configured mode (§6):
///
/// - `hera`: prefix = first three dot-separated tokens (e.g. `zen.2458101.12345`
///   out of `zen.2458101.12345.uv`).
/// - `so`: prefix = first two underscore-separated tokens.
/// - `none`: inference refused.
/// - `_testing`: parse `bits[1]+'.'+bits[2]` as a Julian Date and convert to
///   GPS seconds directly.
pub fn infer_obsid(mode: ObsidInferenceMode, file_name: &str) -> Result<InferredObsid, InferenceError> {
    match mode {
        ObsidInferenceMode::None => Err(InferenceError::Disabled),
        ObsidInferenceMode::Hera => {
            let bits: Vec<&str> = file_name.split('.').collect();
            if bits.len() < 4 {
                return Err(InferenceError::NotEnoughTokens(file_name.to_string()));
            }
            Ok(InferredObsid::NamePrefix(format!("{}.{}.{}", bits[0], bits[1], bits[2])))
        }
        ObsidInferenceMode::So => {
            let bits: Vec<&str> = file_name.split('_').collect();
            if bits.len() < 2 {
                return Err(InferenceError::NotEnoughTokens(file_name.to_string()));
            }
            Ok(InferredObsid::NamePrefix(format!("{}_{}", bits[0], bits[1])))
        }
        ObsidInferenceMode::Testing => {
            let bits: Vec<&str> = file_name.splitn(4, '.').collect();
            if bits.len() < 3 {
                return Err(InferenceError::NotEnoughTokens(file_name.to_string()));
            }
            let jd_str = format!("{}.{}", bits[1], bits[2]);
            let jd: f64 = jd_str
                .parse()
                .map_err(|_| InferenceError::NotNumeric(file_name.to_string()))?;
            Ok(InferredObsid::Direct(julian_date_to_gps_seconds(jd)))
        }
    }
}

/// GPS epoch (1980-01-06T00:00:00Z) expressed as a Julian Date.
const GPS_EPOCH_JD: f64 = 2_444_244.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

pub fn julian_date_to_gps_seconds(jd: f64) -> i64 {
    ((jd - GPS_EPOCH_JD) * SECONDS_PER_DAY).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hera_mode_takes_first_three_dot_tokens_as_a_prefix() {
        let inferred = infer_obsid(ObsidInferenceMode::Hera, "zen.2458101.12345.uv").unwrap();
        assert_eq!(inferred, InferredObsid::NamePrefix("zen.2458101.12345".into()));
    }

    #[test]
    fn so_mode_takes_first_two_underscore_tokens_as_a_prefix() {
        let inferred = infer_obsid(ObsidInferenceMode::So, "1700000000_obs_raw.so3g").unwrap();
        assert_eq!(inferred, InferredObsid::NamePrefix("1700000000_obs".into()));
    }

    #[test]
    fn none_mode_always_refuses() {
        assert_eq!(
            infer_obsid(ObsidInferenceMode::None, "1234567890.123.uv"),
            Err(InferenceError::Disabled)
        );
    }

    #[test]
    fn testing_mode_converts_jd_to_gps_seconds() {
        let obsid = infer_obsid(ObsidInferenceMode::Testing, "x.2459000.5.uv").unwrap();
        let expected = julian_date_to_gps_seconds(2459000.5);
        assert_eq!(obsid, InferredObsid::Direct(expected));
    }

    #[test]
    fn hera_mode_requires_enough_tokens() {
        assert!(matches!(
            infer_obsid(ObsidInferenceMode::Hera, "short.uv"),
            Err(InferenceError::NotEnoughTokens(_))
        ));
    }

    #[test]
    fn so_mode_requires_enough_tokens() {
        assert!(matches!(
            infer_obsid(ObsidInferenceMode::So, "short"),
            Err(InferenceError::NotEnoughTokens(_))
        ));
    }
}
