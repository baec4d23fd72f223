//! Layered configuration for `rfp`.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. a configuration file (an explicit path, else `rfp.toml` in the
//!    platform configuration directory if it exists), parsed according to
//!    its extension: TOML, YAML or JSON,
//! 3. the `RABBITMQ_*` variables understood by earlier deployments,
//! 4. `RFP_`-prefixed environment variables, nested with `__`
//!    (`RFP_BROKER__HOST`, `RFP_RETRY__MAX_ATTEMPTS`),
//! 5. command-line [`Overrides`].

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use rfp_publish::{AmqpSettings, Destination, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

const FILE_NAME: &str = "rfp.toml";
const ENV_PREFIX: &str = "RFP_";

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory to scan. Required.
    pub root: Option<PathBuf>,
    /// Log what would be published instead of publishing.
    pub dry_run: bool,
    /// Default log level when `RUST_LOG` isn't set.
    pub log_level: String,
    pub broker: BrokerConfig,
    pub retry: RetryConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            dry_run: false,
            log_level: "info".to_string(),
            broker: BrokerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Broker connection and destination queue.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub queue: String,
}
impl Default for BrokerConfig {
    fn default() -> Self {
        let amqp = AmqpSettings::default();
        Self {
            host: amqp.host,
            port: amqp.port,
            username: amqp.username,
            password: amqp.password,
            vhost: amqp.vhost,
            queue: "file_events".to_string(),
        }
    }
}
impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("queue", &self.queue)
            .finish()
    }
}
impl From<&BrokerConfig> for AmqpSettings {
    fn from(broker: &BrokerConfig) -> Self {
        Self {
            host: broker.host.clone(),
            port: broker.port,
            username: broker.username.clone(),
            password: broker.password.clone(),
            vhost: broker.vhost.clone(),
        }
    }
}

/// Per-record retry budget, in milliseconds so it reads naturally from
/// files and environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub connect_timeout_ms: u64,
}
impl Default for RetryConfig {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}
impl From<RetryPolicy> for RetryConfig {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            connect_timeout_ms: policy.connect_timeout.as_millis() as u64,
        }
    }
}
impl From<RetryConfig> for RetryPolicy {
    fn from(retry: RetryConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts,
            initial_backoff: Duration::from_millis(retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(retry.max_backoff_ms),
            connect_timeout: Duration::from_millis(retry.connect_timeout_ms),
        }
    }
}

/// Values given on the command line. `None` leaves lower layers untouched.
#[derive(Default, Clone, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub broker: BrokerOverrides,
}

#[derive(Default, Clone, Serialize)]
pub struct BrokerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vhost: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

/// `rfp.toml` inside the platform configuration directory, e.g.
/// `~/.config/rfp/rfp.toml` on Linux.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rfp").map(|dirs| dirs.config_dir().join(FILE_NAME))
}

/// Environment variables from before the `RFP_` prefix existed.
fn legacy_env() -> Env {
    Env::raw().filter_map(|key| {
        let mapped = match key.as_str().to_ascii_uppercase().as_str() {
            "RABBITMQ_HOST" => "broker.host",
            "RABBITMQ_PORT" => "broker.port",
            "RABBITMQ_USER" => "broker.username",
            "RABBITMQ_PASSWORD" => "broker.password",
            "RABBITMQ_VHOST" => "broker.vhost",
            "RABBITMQ_QUEUE" => "broker.queue",
            _ => return None,
        };
        Some(mapped.into())
    })
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("toml") => Ok(figment.merge(Toml::file(path))),
        Some("yaml" | "yml") => Ok(figment.merge(Yaml::file(path))),
        Some("json") => Ok(figment.merge(Json::file(path))),
        _ => Err(exn::Exn::from(ErrorKind::UnsupportedFormat(path.to_path_buf()))),
    }
}

impl Config {
    /// Every layer except command-line overrides.
    ///
    /// An explicit `file` must exist; the default location is used only when
    /// present.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match file {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::MissingFile(path.to_path_buf()));
                }
                figment = file_provider(figment, path)?;
            },
            None => {
                if let Some(path) = default_config_file()
                    && path.is_file()
                {
                    tracing::debug!(path = %path.display(), "Using default configuration file");
                    figment = file_provider(figment, &path)?;
                }
            },
        }
        Ok(figment
            .merge(legacy_env())
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Resolve every layer, then validate.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let config: Config = Self::figment(file)?
            .merge(Serialized::globals(overrides))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ErrorKind::Invalid(reason.to_string());
        if self.root.as_deref().is_none_or(|root| root.as_os_str().is_empty()) {
            exn::bail!(invalid("no root directory given"));
        }
        if self.broker.host.trim().is_empty() {
            exn::bail!(invalid("broker host must not be empty"));
        }
        if self.broker.queue.trim().is_empty() {
            exn::bail!(invalid("queue name must not be empty"));
        }
        if self.retry.max_attempts < 1 {
            exn::bail!(invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            exn::bail!(invalid("retry.initial_backoff_ms must not exceed retry.max_backoff_ms"));
        }
        if LevelFilter::from_str(&self.log_level).is_err() {
            exn::bail!(ErrorKind::Invalid(format!("unknown log level: {}", self.log_level)));
        }
        Ok(())
    }

    /// Root directory to scan. Present once the configuration validated.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn destination(&self) -> Destination {
        Destination::queue(&self.broker.queue)
    }

    pub fn amqp(&self) -> AmqpSettings {
        AmqpSettings::from(&self.broker)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn load(jail: &Jail, file: Option<&str>, overrides: &Overrides) -> figment::error::Result<Config> {
        let file = file.map(|name| jail.directory().join(name));
        Config::load(file.as_deref(), overrides).map_err(|e| e.to_string().into())
    }

    fn with_root() -> Overrides {
        Overrides {
            root: Some(PathBuf::from("/data")),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        Jail::expect_with(|jail| {
            let config = load(jail, None, &with_root())?;
            assert_eq!(config.root(), Some(Path::new("/data")));
            assert!(!config.dry_run);
            assert_eq!(config.log_level, "info");
            assert_eq!(config.broker.host, "localhost");
            assert_eq!(config.broker.port, 5672);
            assert_eq!(config.broker.vhost, "/");
            assert_eq!(config.destination(), Destination::queue("file_events"));
            assert_eq!(config.retry_policy(), RetryPolicy::default());
            Ok(())
        });
    }

    #[rstest]
    #[case("rfp.toml", "[broker]\nhost = \"rabbit\"\nqueue = \"scans\"\n")]
    #[case("rfp.yaml", "broker:\n  host: rabbit\n  queue: scans\n")]
    #[case("rfp.yml", "broker:\n  host: rabbit\n  queue: scans\n")]
    #[case("rfp.json", "{\"broker\": {\"host\": \"rabbit\", \"queue\": \"scans\"}}")]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config = load(jail, Some(name), &with_root())?;
            assert_eq!(config.broker.host, "rabbit");
            assert_eq!(config.broker.queue, "scans");
            assert_eq!(config.broker.port, 5672);
            Ok(())
        });
    }

    #[test]
    fn test_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file("rfp.toml", "dry_run = true\n[broker]\nhost = \"from-file\"\nport = 1111\nvhost = \"file\"\n")?;
            jail.set_env("RABBITMQ_HOST", "from-legacy-env");
            jail.set_env("RABBITMQ_VHOST", "legacy");
            jail.set_env("RFP_BROKER__HOST", "from-env");
            jail.set_env("RFP_RETRY__MAX_ATTEMPTS", "7");
            let overrides = Overrides {
                broker: BrokerOverrides {
                    port: Some(2222),
                    ..Default::default()
                },
                ..with_root()
            };
            let config = load(jail, Some("rfp.toml"), &overrides)?;
            assert!(config.dry_run);
            assert_eq!(config.broker.host, "from-env");
            assert_eq!(config.broker.vhost, "legacy");
            assert_eq!(config.broker.port, 2222);
            assert_eq!(config.retry.max_attempts, 7);
            Ok(())
        });
    }

    #[test]
    fn test_unset_overrides_keep_lower_layers() {
        Jail::expect_with(|jail| {
            jail.set_env("RFP_DRY_RUN", "true");
            jail.set_env("RFP_ROOT", "/from/env");
            let config = load(jail, None, &Overrides::default())?;
            assert!(config.dry_run);
            assert_eq!(config.root(), Some(Path::new("/from/env")));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            let err = Config::load(Some(&jail.directory().join("nope.toml")), &with_root()).unwrap_err();
            assert!(matches!(&*err, ErrorKind::MissingFile(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("rfp.ini", "host = rabbit")?;
            let err = Config::load(Some(&jail.directory().join("rfp.ini")), &with_root()).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_value() {
        Jail::expect_with(|jail| {
            jail.set_env("RFP_BROKER__PORT", "not-a-port");
            let err = Config::load(None, &with_root()).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    #[rstest]
    #[case::no_root(|c: &mut Config| c.root = None)]
    #[case::empty_host(|c: &mut Config| c.broker.host = " ".to_string())]
    #[case::empty_queue(|c: &mut Config| c.broker.queue = String::new())]
    #[case::zero_attempts(|c: &mut Config| c.retry.max_attempts = 0)]
    #[case::backoff_inverted(|c: &mut Config| c.retry.initial_backoff_ms = 10_000)]
    #[case::log_level(|c: &mut Config| c.log_level = "loud".to_string())]
    fn test_validation_rejects(#[case] mutate: fn(&mut Config)) {
        let mut config = Config {
            root: Some(PathBuf::from("/data")),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let broker = BrokerConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        assert!(!format!("{broker:?}").contains("hunter2"));
        let settings = AmqpSettings::from(&broker);
        assert_eq!(settings.password, "hunter2");
    }

    #[test]
    fn test_retry_conversion() {
        let retry = RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 50,
            max_backoff_ms: 400,
            connect_timeout_ms: 1500,
        };
        let policy = RetryPolicy::from(retry);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
        assert_eq!(policy.connect_timeout, Duration::from_millis(1500));
        assert_eq!(RetryConfig::from(policy), retry);
    }
}
