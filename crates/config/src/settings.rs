use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const OUTPUT_BUCKET: &str = "s3://net-mozaws-prod-us-west-2-data-pitmo";
pub const CACHE_BUCKET: &str = "s3://telemetry-airflow-cache/cache/probe-scraper";
pub const FROM: &str = "telemetry-alerts@mozilla.com";
pub const DEFAULT_TO: &str = "glean-team@mozilla.com";
const ENV_PREFIX: &str = "PROBEINFO_";
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_REGION: &str = "us-west-2";

/// Where a run executes. Only production runs touch remote storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    pub from: String,
    /// Always copied on every notification.
    pub default_to: String,
}
impl Default for Notifications {
    fn default() -> Self {
        Self {
            from: FROM.to_string(),
            default_to: DEFAULT_TO.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    pub region: String,
    pub endpoint: Option<String>,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
}
impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            key_id: None,
            key_secret: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsSettings {
    pub service_account_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub env: Environment,
    pub output_bucket: String,
    pub cache_bucket: String,
    pub publish_timeout_secs: u64,
    pub notifications: Notifications,
    pub s3: S3Settings,
    pub gcs: GcsSettings,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            output_bucket: OUTPUT_BUCKET.to_string(),
            cache_bucket: CACHE_BUCKET.to_string(),
            publish_timeout_secs: DEFAULT_PUBLISH_TIMEOUT_SECS,
            notifications: Notifications::default(),
            s3: S3Settings::default(),
            gcs: GcsSettings::default(),
        }
    }
}

impl Config {
    /// The provider stack, exposed so callers can merge overrides on top
    /// (command-line flags, tests).
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file_exact(path));
        }
        let aws = Env::raw().only(&["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_REGION"]).map(|key| {
            if key == "AWS_ACCESS_KEY_ID" {
                "s3.key_id".into()
            } else if key == "AWS_SECRET_ACCESS_KEY" {
                "s3.key_secret".into()
            } else {
                "s3.region".into()
            }
        });
        figment.merge(aws).merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Invalid("cannot extract settings".to_string()))?;
        config.validate()?;
        tracing::debug!(env = ?config.env, output = %config.output_bucket, cache = %config.cache_bucket, "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.publish_timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("publish_timeout_secs must be positive".to_string()));
        }
        for (field, value) in [("output_bucket", &self.output_bucket), ("cache_bucket", &self.cache_bucket)] {
            if value.trim().is_empty() {
                exn::bail!(ErrorKind::Invalid(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.env == Environment::Prod
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();
            assert_eq!(config, Config::default());
            assert!(!config.is_prod());
            assert_eq!(config.publish_timeout(), Duration::from_secs(1800));
            assert_eq!(config.notifications.default_to, DEFAULT_TO);
            Ok(())
        });
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "probeinfo.toml",
                r#"
                    env = "prod"
                    output_bucket = "gs://probe-scraper-prod-artifacts"

                    [s3]
                    region = "eu-central-1"
                "#,
            )?;
            jail.set_env("PROBEINFO_OUTPUT_BUCKET", "file:///tmp/output");
            jail.set_env("PROBEINFO_S3__ENDPOINT", "http://localhost:9000");
            jail.set_env("AWS_ACCESS_KEY_ID", "key");
            jail.set_env("AWS_SECRET_ACCESS_KEY", "secret");

            let config = Config::load(Some(Path::new("probeinfo.toml"))).unwrap();
            assert!(config.is_prod());
            assert_eq!(config.output_bucket, "file:///tmp/output");
            assert_eq!(config.cache_bucket, CACHE_BUCKET);
            assert_eq!(config.s3.region, "eu-central-1");
            assert_eq!(config.s3.endpoint.as_deref(), Some("http://localhost:9000"));
            assert_eq!(config.s3.key_id.as_deref(), Some("key"));
            assert_eq!(config.s3.key_secret.as_deref(), Some("secret"));
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        Jail::expect_with(|_jail| {
            let err = Config::load(Some(Path::new("missing.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn zero_timeout_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("PROBEINFO_PUBLISH_TIMEOUT_SECS", "0");
            let err = Config::load(None).unwrap_err();
            assert_eq!(*err, ErrorKind::Invalid("publish_timeout_secs must be positive".to_string()));
            Ok(())
        });
    }
}
