use crate::ids::{ObsId, SessionId};

/// A single contiguous span of data-taking.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Observation {
    pub obsid: ObsId,
    pub start_time_jd: f64,
    pub stop_time_jd: Option<f64>,
    pub start_lst_hr: Option<f64>,
    pub session_id: Option<SessionId>,
}

impl Observation {
    pub fn new(obsid: ObsId, start_time_jd: f64) -> Self {
        Self {
            obsid,
            start_time_jd,
            stop_time_jd: None,
            start_lst_hr: None,
            session_id: None,
        }
    }

    /// Duration in days, if `stop_time_jd` is known.
    pub fn duration(&self) -> Option<f64> {
        self.stop_time_jd.map(|stop| stop - self.start_time_jd)
    }

    /// Whether this observation's time range is internally consistent
    /// (§3: "if stop_jd present, start_jd < stop_jd").
    pub fn is_time_range_valid(&self) -> bool {
        match self.stop_time_jd {
            Some(stop) => self.start_time_jd < stop,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_none_without_stop() {
        let obs = Observation::new(ObsId(1000), 2459000.10);
        assert_eq!(obs.duration(), None);
        assert!(obs.is_time_range_valid());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut obs = Observation::new(ObsId(1000), 2459000.10);
        obs.stop_time_jd = Some(2459000.05);
        assert!(!obs.is_time_range_valid());
    }
}
