use std::path::PathBuf;

fn parse_bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| match v.trim() {
        "1" | "true" | "TRUE" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "no" => Some(false),
        _ => None,
    })
}

/// Environment-derived overrides, gathered after `dotenvy::dotenv()` has had
/// a chance to populate the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub secret_key: Option<String>,
    pub database_url: Option<String>,
    pub database_url_file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub report_to_mandc: Option<bool>,
    pub globus_transfer_token: Option<String>,
    pub log_level: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            secret_key: std::env::var("SECRET_KEY").ok(),
            database_url: std::env::var("DATABASE_URL").ok(),
            database_url_file: std::env::var("DATABASE_URL_FILE").ok().map(PathBuf::from),
            host: std::env::var("LIBRARIAN_HOST").ok(),
            port: std::env::var("LIBRARIAN_PORT")
                .ok()
                .and_then(|v| v.parse().ok()),
            report_to_mandc: parse_bool_var("REPORT_TO_MANDC"),
            globus_transfer_token: std::env::var("GLOBUS_TRANSFER_TOKEN").ok(),
            log_level: std::env::var("LOG_LEVEL").ok(),
        }
    }
}

pub(crate) fn read_secret_file(path: &std::path::Path) -> crate::error::Result<Option<String>> {
    let contents =
        std::fs::read_to_string(path).map_err(|source| crate::error::ConfigLoadError::SecretFileIo {
            path: path.to_path_buf(),
            source,
        })?;
    let trimmed = contents.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}
