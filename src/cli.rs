//! Command-line flags.
//!
//! Every flag is optional so that it only overrides the configuration file
//! and environment when given.

use clap::Parser;
use rfp_config::{BrokerOverrides, Overrides};
use std::path::PathBuf;

/// Recursively scan a directory and publish file metadata to RabbitMQ.
#[derive(Parser, Clone)]
#[command(name = "rfp", version, about)]
pub struct Args {
    /// Root directory to scan
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "RFP_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// RabbitMQ host [default: localhost]
    #[arg(long, value_name = "HOST")]
    pub rabbit_host: Option<String>,

    /// RabbitMQ port [default: 5672]
    #[arg(long, value_name = "PORT")]
    pub rabbit_port: Option<u16>,

    /// RabbitMQ username [default: guest]
    #[arg(long, value_name = "USER")]
    pub rabbit_user: Option<String>,

    /// RabbitMQ password [default: guest]
    #[arg(long, value_name = "PASSWORD")]
    pub rabbit_password: Option<String>,

    /// RabbitMQ virtual host [default: /]
    #[arg(long, value_name = "VHOST")]
    pub rabbit_vhost: Option<String>,

    /// Queue name [default: file_events]
    #[arg(long, value_name = "NAME")]
    pub queue: Option<String>,

    /// Scan and log messages without publishing to RabbitMQ
    #[arg(long)]
    pub dry_run: bool,

    /// Log level when RUST_LOG isn't set (error, warn, info, debug, trace) [default: info]
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            root: self.root.clone(),
            dry_run: self.dry_run.then_some(true),
            log_level: self.log_level.clone(),
            broker: BrokerOverrides {
                host: self.rabbit_host.clone(),
                port: self.rabbit_port,
                username: self.rabbit_user.clone(),
                password: self.rabbit_password.clone(),
                vhost: self.rabbit_vhost.clone(),
                queue: self.queue.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_all_flags() {
        let args = Args::try_parse_from([
            "rfp",
            "--root",
            "/data",
            "--rabbit-host",
            "rabbit",
            "--rabbit-port",
            "5673",
            "--rabbit-user",
            "svc",
            "--rabbit-password",
            "secret",
            "--rabbit-vhost",
            "files",
            "--queue",
            "scans",
            "--dry-run",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let overrides = args.overrides();
        assert_eq!(overrides.root, Some(PathBuf::from("/data")));
        assert_eq!(overrides.dry_run, Some(true));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
        assert_eq!(overrides.broker.host.as_deref(), Some("rabbit"));
        assert_eq!(overrides.broker.port, Some(5673));
        assert_eq!(overrides.broker.username.as_deref(), Some("svc"));
        assert_eq!(overrides.broker.password.as_deref(), Some("secret"));
        assert_eq!(overrides.broker.vhost.as_deref(), Some("files"));
        assert_eq!(overrides.broker.queue.as_deref(), Some("scans"));
    }

    #[test]
    fn test_absent_flags_override_nothing() {
        let overrides = Args::try_parse_from(["rfp"]).unwrap().overrides();
        assert_eq!(overrides.root, None);
        assert_eq!(overrides.dry_run, None);
        assert_eq!(overrides.broker.host, None);
        assert_eq!(overrides.broker.port, None);
    }

    #[rstest]
    #[case(&["rfp", "--rabbit-port", "not-a-number"])]
    #[case(&["rfp", "--rabbit-port", "70000"])]
    #[case(&["rfp", "--unknown"])]
    fn test_rejects(#[case] argv: &[&str]) {
        assert!(Args::try_parse_from(argv).is_err());
    }
}
