//! Layered configuration for drivekit.
//!
//! Values are merged, lowest priority first, from built-in defaults, an
//! optional configuration file (TOML, YAML or JSON, picked by extension) and
//! `DRIVEKIT_`-prefixed environment variables. Nested keys use a double
//! underscore in the environment, e.g. `DRIVEKIT_RETRY__MAX_ATTEMPTS=5`.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Field selection used when the caller does not ask for specific fields.
pub const DEFAULT_FIELDS: &str = "kind, id, name, mimeType, size";
/// Download chunk size; mirrors the Drive client libraries.
pub const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;
const ENV_PREFIX: &str = "DRIVEKIT_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialPaths,
    pub retry: RetrySettings,
    pub listing: ListingSettings,
    pub transfer: TransferSettings,
}

/// Where to find credentials. At least one of the two must be set before a
/// client can be built; when both are set the stored token wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialPaths {
    /// Service account key file (JSON) as downloaded from the cloud console.
    pub service_account_file: Option<PathBuf>,
    /// Authorized-user token file written by a previous OAuth consent flow.
    pub storage: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    /// Added to the delay after every failed attempt.
    pub delay_step_ms: u64,
}
impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 5_000,
            delay_step_ms: 5_000,
        }
    }
}
impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn delay_step(&self) -> Duration {
        Duration::from_millis(self.delay_step_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSettings {
    /// Page size requested from the server; `None` leaves it to the server.
    pub page_size: Option<u32>,
    pub default_fields: String,
}
impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            page_size: None,
            default_fields: DEFAULT_FIELDS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub chunk_size: u64,
}
impl Default for TransferSettings {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

impl Config {
    /// Load configuration from defaults, the given file (or the default file
    /// location when `None`) and the environment.
    ///
    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_path);
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Merging configuration file");
            figment = merge_file(figment, &path)?;
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Check constraints the type system can't express.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            exn::bail!(ErrorKind::Invalid {
                field: "retry.max_attempts",
                reason: "at least one attempt is required",
            });
        }
        if self.transfer.chunk_size == 0 {
            exn::bail!(ErrorKind::Invalid {
                field: "transfer.chunk_size",
                reason: "must be greater than zero",
            });
        }
        if self.listing.page_size == Some(0) {
            exn::bail!(ErrorKind::Invalid {
                field: "listing.page_size",
                reason: "must be greater than zero when set",
            });
        }
        if self.listing.default_fields.split(',').all(|f| f.trim().is_empty()) {
            exn::bail!(ErrorKind::Invalid {
                field: "listing.default_fields",
                reason: "must name at least one field",
            });
        }
        Ok(())
    }
}

/// `config.toml` in the platform configuration directory, if there is one.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "drivekit").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn load_in(jail: &Jail, file: &str) -> figment::Result<Config> {
        Config::load(Some(&jail.directory().join(file))).map_err(|e| e.to_string().into())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay(), Duration::from_secs(5));
        assert_eq!(config.retry.delay_step(), Duration::from_secs(5));
        assert_eq!(config.listing.default_fields, DEFAULT_FIELDS);
        assert_eq!(config.listing.page_size, None);
        assert_eq!(config.transfer.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|jail| {
            let config = load_in(jail, "nope.toml")?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[rstest]
    #[case("config.toml", "[credentials]\nstorage = \"/tmp/token.json\"\n[retry]\nmax_attempts = 5\n")]
    #[case("config.yaml", "credentials:\n  storage: /tmp/token.json\nretry:\n  max_attempts: 5\n")]
    #[case("config.json", r#"{"credentials": {"storage": "/tmp/token.json"}, "retry": {"max_attempts": 5}}"#)]
    fn test_file_formats(#[case] file: &'static str, #[case] contents: &'static str) {
        Jail::expect_with(|jail| {
            jail.create_file(file, contents)?;
            let config = load_in(jail, file)?;
            assert_eq!(config.credentials.storage, Some(PathBuf::from("/tmp/token.json")));
            assert_eq!(config.credentials.service_account_file, None);
            assert_eq!(config.retry.max_attempts, 5);
            // Untouched values keep their defaults.
            assert_eq!(config.retry.initial_delay_ms, 5_000);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[listing]\npage_size = 50\n")?;
            jail.set_env("DRIVEKIT_LISTING__PAGE_SIZE", "10");
            jail.set_env("DRIVEKIT_TRANSFER__CHUNK_SIZE", "1024");
            let config = load_in(jail, "config.toml")?;
            assert_eq!(config.listing.page_size, Some(10));
            assert_eq!(config.transfer.chunk_size, 1024);
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("config.ini", "retry=1")?;
            let err = Config::load(Some(&jail.directory().join("config.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[retry]\nmax_attempts = \"lots\"\n")?;
            let err = Config::load(Some(&jail.directory().join("config.toml"))).unwrap_err();
            assert_eq!(*err, ErrorKind::Load);
            Ok(())
        });
    }

    #[rstest]
    #[case::zero_attempts("DRIVEKIT_RETRY__MAX_ATTEMPTS", "0", "retry.max_attempts")]
    #[case::zero_chunk("DRIVEKIT_TRANSFER__CHUNK_SIZE", "0", "transfer.chunk_size")]
    #[case::zero_page("DRIVEKIT_LISTING__PAGE_SIZE", "0", "listing.page_size")]
    #[case::no_fields("DRIVEKIT_LISTING__DEFAULT_FIELDS", " , ", "listing.default_fields")]
    fn test_validation(#[case] var: &'static str, #[case] value: &'static str, #[case] expected: &'static str) {
        Jail::expect_with(|jail| {
            jail.set_env(var, value);
            let err = load_in(jail, "missing.toml").unwrap_err();
            assert!(err.to_string().contains(expected), "{err}");
            Ok(())
        });
    }
}
