use crate::protocol::{Command, RespValue};
use crate::sentinel::SentinelClientConfig;
use clap::{Parser, Subcommand};

use std::fmt::Write;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sockudo-ha")]
#[command(author = "Sockudo Team")]
#[command(version = "1.0.0")]
#[command(about = "Sentinel-aware client for replicated Redis-compatible services", long_about = None)]
pub struct Cli {
    /// Sentinel address, host[:port] (repeatable)
    #[arg(short, long = "sentinel", value_name = "ADDR", required = true)]
    pub sentinels: Vec<String>,

    /// Peers a sentinel must see before its primary report is trusted
    #[arg(long, default_value_t = 0)]
    pub min_other_sentinels: u32,

    /// Password for sentinel connections
    #[arg(long)]
    pub sentinel_password: Option<String>,

    /// ACL username for data node connections
    #[arg(long)]
    pub user: Option<String>,

    /// Password for data node connections
    #[arg(short = 'a', long)]
    pub password: Option<String>,

    /// Database number on data nodes
    #[arg(short = 'n', long)]
    pub db: Option<u32>,

    /// Name set with CLIENT SETNAME on every connection
    #[arg(long)]
    pub client_name: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Log level (debug, verbose, notice, warning, nothing)
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Log file path
    #[arg(long)]
    pub logfile: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CliCommand {
    /// Print the current primary of a service
    Primary { service: String },
    /// Print the alive replicas of a service
    #[command(alias = "alternates")]
    Replicas { service: String },
    /// List the services the first sentinel monitors
    Masters,
    /// Check whether the sentinels can reach quorum for a service
    Ckquorum { service: String },
    /// Run one command against a service
    Exec {
        service: String,
        /// Send to a replica instead of the primary
        #[arg(long)]
        replica: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl Cli {
    pub fn into_config(self) -> Result<(SentinelClientConfig, CliCommand), String> {
        let mut config = SentinelClientConfig::default();

        for addr in &self.sentinels {
            config
                .add_monitor(addr)
                .map_err(|e| format!("Invalid sentinel '{}': {}", addr, e))?;
        }
        config.min_other_monitors = self.min_other_sentinels;

        config.monitor_options.password = self.sentinel_password;
        config.node_options.username = self.user;
        config.node_options.password = self.password;
        config.node_options.db = self.db;
        config.monitor_options.client_name = self.client_name.clone();
        config.node_options.client_name = self.client_name;

        if let Some(ms) = self.connect_timeout {
            config.set_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(loglevel) = self.loglevel {
            config.loglevel = loglevel;
        }
        if let Some(logfile) = self.logfile {
            config.logfile = logfile;
        }

        config.validate().map_err(|e| e.to_string())?;
        Ok((config, self.command))
    }
}

/// Build a command from `exec` arguments
pub fn command_from_args(args: &[String]) -> Option<Command> {
    let (name, rest) = args.split_first()?;
    Some(rest.iter().fold(Command::new(name), |cmd, a| cmd.arg(a)))
}

/// Render a reply the way redis-cli does
pub fn format_reply(value: &RespValue) -> String {
    let mut out = String::new();
    write_reply(&mut out, value, 0);
    out
}

fn write_reply(out: &mut String, value: &RespValue, indent: usize) {
    match value {
        RespValue::SimpleString(s) => out.push_str(&String::from_utf8_lossy(s)),
        RespValue::Error(e) => {
            let _ = write!(out, "(error) {}", String::from_utf8_lossy(e));
        }
        RespValue::Integer(n) => {
            let _ = write!(out, "(integer) {}", n);
        }
        RespValue::BulkString(s) => {
            let _ = write!(out, "\"{}\"", String::from_utf8_lossy(s));
        }
        RespValue::Null | RespValue::NullArray => out.push_str("(nil)"),
        RespValue::Array(items) if items.is_empty() => out.push_str("(empty array)"),
        RespValue::Array(items) => {
            let width = items.len().to_string().len();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                    out.push_str(&" ".repeat(indent));
                }
                let _ = write!(out, "{:>width$}) ", i + 1, width = width);
                write_reply(out, item, indent + width + 2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentinel::DEFAULT_SENTINEL_PORT;
    use crate::transport::Address;

    #[test]
    fn test_parse_exec_with_options() {
        let cli = Cli::try_parse_from([
            "sockudo-ha",
            "-s",
            "10.0.0.5",
            "--sentinel",
            "10.0.0.6:5000",
            "--min-other-sentinels",
            "1",
            "-a",
            "secret",
            "-n",
            "2",
            "--connect-timeout",
            "250",
            "exec",
            "svcA",
            "--replica",
            "GET",
            "key",
        ])
        .unwrap();

        let (config, command) = cli.into_config().unwrap();
        assert_eq!(
            config.monitors,
            vec![
                Address::new("10.0.0.5", DEFAULT_SENTINEL_PORT),
                Address::new("10.0.0.6", 5000)
            ]
        );
        assert_eq!(config.min_other_monitors, 1);
        assert_eq!(config.node_options.password.as_deref(), Some("secret"));
        assert_eq!(config.node_options.db, Some(2));
        assert!(config.monitor_options.password.is_none());
        assert_eq!(
            config.monitor_options.connect_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(
            command,
            CliCommand::Exec {
                service: "svcA".into(),
                replica: true,
                args: vec!["GET".into(), "key".into()],
            }
        );
    }

    #[test]
    fn test_alternates_alias() {
        let cli = Cli::try_parse_from(["sockudo-ha", "-s", "localhost", "alternates", "svcA"]).unwrap();
        assert_eq!(
            cli.command,
            CliCommand::Replicas {
                service: "svcA".into()
            }
        );
    }

    #[test]
    fn test_sentinel_required() {
        assert!(Cli::try_parse_from(["sockudo-ha", "masters"]).is_err());
    }

    #[test]
    fn test_invalid_sentinel_address() {
        let cli = Cli::try_parse_from(["sockudo-ha", "-s", "host:notaport", "masters"]).unwrap();
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn test_command_from_args() {
        let cmd = command_from_args(&["SET".into(), "k".into(), "v".into()]).unwrap();
        assert_eq!(cmd.to_string(), "SET k v");
        assert!(command_from_args(&[]).is_none());
    }

    #[test]
    fn test_format_reply() {
        assert_eq!(format_reply(&RespValue::ok()), "OK");
        assert_eq!(format_reply(&RespValue::Integer(3)), "(integer) 3");
        assert_eq!(format_reply(&RespValue::Null), "(nil)");
        assert_eq!(
            format_reply(&RespValue::array(vec![
                RespValue::bulk_string("a"),
                RespValue::array(vec![RespValue::bulk_string("b"), RespValue::Integer(1)]),
            ])),
            "1) \"a\"\n2) 1) \"b\"\n   2) (integer) 1"
        );
    }
}
