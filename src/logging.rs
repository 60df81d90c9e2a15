//! Logging
//!
//! Redis-style log lines (`pid:level-char timestamp message`) behind the
//! `log` facade. Output goes to a file when one is configured, otherwise to
//! stderr. Credentials that show up in logged command lines are redacted.

use std::fs::{File, OpenOptions};
use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

use crate::sentinel::SentinelClientConfig;

/// Redis-style log levels mapped to Rust log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisLogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
    Nothing,
}

impl RedisLogLevel {
    /// Parse Redis-style log level string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "verbose" => Self::Verbose,
            "notice" => Self::Notice,
            "warning" => Self::Warning,
            "nothing" => Self::Nothing,
            _ => Self::Notice,
        }
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::Debug,
            Self::Verbose => LevelFilter::Info,
            Self::Notice => LevelFilter::Info,
            Self::Warning => LevelFilter::Warn,
            Self::Nothing => LevelFilter::Off,
        }
    }
}

/// Words whose following argument is a secret
const SECRET_OPTIONS: &[&str] = &["AUTH-PASS", "REQUIREPASS"];

pub struct ClientLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl ClientLogger {
    pub fn new(config: &SentinelClientConfig) -> Self {
        let file = if config.logfile.is_empty() {
            None
        } else {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.logfile)
            {
                Ok(f) => Some(Mutex::new(f)),
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to open log file '{}': {}",
                        config.logfile, e
                    );
                    None
                }
            }
        };

        Self {
            level: RedisLogLevel::parse(&config.loglevel).to_level_filter(),
            file,
        }
    }

    fn format_record(&self, record: &Record) -> String {
        let level_char = match record.level() {
            log::Level::Error => '!',
            log::Level::Warn => '#',
            log::Level::Info => '*',
            log::Level::Debug => '-',
            log::Level::Trace => '.',
        };

        let msg = redact(&record.args().to_string());
        format!(
            "{}:{} {} {}\n",
            std::process::id(),
            level_char,
            unix_time(),
            msg
        )
    }
}

impl Log for ClientLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let formatted = self.format_record(record);
        match &self.file {
            Some(file) => {
                let _ = file.lock().write_all(formatted.as_bytes());
            }
            None => eprint!("{}", formatted),
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Hide everything after `AUTH` and the value following a password option
pub fn redact(msg: &str) -> String {
    let mut out = Vec::new();
    let mut hide_next = false;
    for word in msg.split(' ') {
        if word.eq_ignore_ascii_case("AUTH") {
            out.push(word);
            out.push("[REDACTED]");
            break;
        }
        if hide_next && !word.is_empty() {
            out.push("[REDACTED]");
            hide_next = false;
            continue;
        }
        hide_next = SECRET_OPTIONS.iter().any(|m| word.eq_ignore_ascii_case(m));
        out.push(word);
    }
    out.join(" ")
}

fn unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the logger; fails if a logger is already set
pub fn init_logging(config: &SentinelClientConfig) -> Result<(), log::SetLoggerError> {
    let logger = Box::new(ClientLogger::new(config));
    let level = RedisLogLevel::parse(&config.loglevel).to_level_filter();

    log::set_boxed_logger(logger)?;
    log::set_max_level(level);

    Ok(())
}
