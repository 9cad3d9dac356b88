use crate::env::{read_secret_file, EnvConfig};
use crate::error::{ConfigLoadError, Result};
use crate::model::{Config, FileConfig};
use std::path::Path;

/// CLI-sourced overrides, applied last (highest precedence). Populated by
/// `librarian-server`'s `clap`-derived `Args`.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
}

/// Loads and merges configuration from a TOML file, the environment, and
/// CLI overrides, in ascending precedence (TOML < environment < CLI).
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path, cli: CliOverrides) -> Result<Config> {
        let file = Self::read_file(path)?;
        let env = EnvConfig::gather();
        Self::merge(file, env, cli)
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::FileIo {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigLoadError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn merge(file: FileConfig, env: EnvConfig, cli: CliOverrides) -> Result<Config> {
        let secret_key = env
            .secret_key
            .clone()
            .or(file.secret_key)
            .ok_or(ConfigLoadError::MissingRequired("SECRET_KEY"))?;

        let database_url = cli
            .database_url
            .or(Self::resolve_database_url(&env)?)
            .ok_or(ConfigLoadError::MissingRequired("DATABASE_URL"))?;

        let host = cli
            .host
            .or(env.host)
            .or(file.host.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string());

        let mut server = file.server;
        if let Some(port) = cli.port.or(env.port) {
            server.port = port;
        }

        let log_level = match cli.log_level.or(env.log_level) {
            Some(raw) => parse_log_level(&raw)?,
            None => file.log_level,
        };

        let report_to_mandc = env.report_to_mandc.unwrap_or(file.report_to_mandc);

        let mut transfer = file.transfer;
        if let Some(token) = env.globus_transfer_token {
            transfer.globus_transfer_token = Some(token);
        }

        Ok(Config {
            secret_key,
            database_url,
            sources: file.sources,
            stores: file.add_stores,
            obsid_inference_mode: file.obsid_inference_mode,
            host,
            server,
            local_disk_staging: file.local_disk_staging,
            standing_order_mode: file.standing_order_mode,
            report_to_mandc,
            transfer,
            permissions_mode: file.permissions_mode,
            log_level,
        })
    }

    /// Resolve the effective database URL: `DATABASE_URL`, then the
    /// contents of `DATABASE_URL_FILE`, else `None`.
    fn resolve_database_url(env: &EnvConfig) -> Result<Option<String>> {
        if let Some(url) = env.database_url.clone().filter(|v| !v.trim().is_empty()) {
            return Ok(Some(url));
        }
        if let Some(path) = env.database_url_file.as_ref() {
            if let Some(url) = read_secret_file(path)? {
                return Ok(Some(url));
            }
        }
        Ok(None)
    }
}

fn parse_log_level(raw: &str) -> Result<crate::model::LogLevel> {
    use crate::model::LogLevel;
    match raw.to_ascii_lowercase().as_str() {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warning" | "warn" => Ok(LogLevel::Warning),
        "error" => Ok(LogLevel::Error),
        other => Err(ConfigLoadError::InvalidValue {
            field: "log_level",
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn missing_secret_key_fails() {
        let f = write_toml("host = \"0.0.0.0\"\n");
        // SAFETY: tests run single-threaded per-process for env mutation here.
        unsafe {
            std::env::remove_var("SECRET_KEY");
            std::env::remove_var("DATABASE_URL");
        }
        let result = ConfigLoader::load(f.path(), CliOverrides::default());
        assert!(matches!(
            result,
            Err(ConfigLoadError::MissingRequired("SECRET_KEY"))
        ));
    }

    #[test]
    fn cli_port_overrides_file_and_env() {
        let f = write_toml(
            "secret_key = \"s3cr3t\"\n[server]\nport = 21036\n",
        );
        unsafe {
            std::env::set_var("DATABASE_URL", "postgresql://localhost/librarian");
        }
        let cli = CliOverrides {
            port: Some(9999),
            ..Default::default()
        };
        let cfg = ConfigLoader::load(f.path(), cli).unwrap();
        assert_eq!(cfg.server.port, 9999);
        unsafe {
            std::env::remove_var("DATABASE_URL");
        }
    }
}
