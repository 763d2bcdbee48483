//! Process-wide configuration snapshot (§4.J, §6).
//!
//! Parsed once at startup from a whitespace-separated `key value` text
//! file, the same shape as `redis.conf` and the original's
//! `config/config.go`. Rust has no cheap struct-field reflection, so
//! the reflective fill in the original becomes an explicit match here.

use std::path::Path;

use smart_default::SmartDefault;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    Always,
    EverySec,
    No,
}

#[derive(Debug, Clone, SmartDefault)]
pub struct Config {
    #[default("127.0.0.1".to_string())]
    pub bind: String,
    #[default(6379)]
    pub port: u16,
    #[default(None)]
    pub maxclients: Option<usize>,
    #[default(None)]
    pub requirepass: Option<String>,
    #[default(16)]
    pub databases: usize,

    #[default(false)]
    pub append_only: bool,
    #[default("appendOnly.aof".to_string())]
    pub append_filename: String,
    #[default(FsyncPolicy::EverySec)]
    pub append_fsync: FsyncPolicy,
    #[default(64 * 1024 * 1024)]
    pub auto_aof_rewrite_min_size: u64,
    #[default(100)]
    pub auto_aof_rewrite_percentage: u64,

    #[default(Vec::new())]
    pub peers: Vec<String>,
    #[default(None)]
    pub this_node: Option<String>,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<Config> {
        let mut config = Config::default();
        for line in text.lines() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some(pivot) = trimmed.find(' ') else {
                continue;
            };
            let key = trimmed[..pivot].to_ascii_lowercase();
            let value = trimmed[pivot + 1..].trim();
            config.apply(&key, value)?;
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "bind" => self.bind = value.to_string(),
            "port" => self.port = parse_int(key, value)?,
            "maxclients" => self.maxclients = Some(parse_int(key, value)?),
            "requirepass" => self.requirepass = Some(value.to_string()),
            "databases" => self.databases = parse_int(key, value)?,
            "appendonly" => self.append_only = value.eq_ignore_ascii_case("yes"),
            "appendfilename" => self.append_filename = value.to_string(),
            "appendfsync" => self.append_fsync = parse_fsync(value),
            "auto-aof-rewrite-min-size" => self.auto_aof_rewrite_min_size = parse_size(value)?,
            "auto-aof-rewrite-percentage" => {
                self.auto_aof_rewrite_percentage = parse_int(key, value)?;
            }
            "peers" => {
                self.peers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "self" => self.this_node = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for '{key}': '{value}'")))
}

/// Redis' `appendfsync` defaults to "everysec" for any unrecognized value.
fn parse_fsync(value: &str) -> FsyncPolicy {
    match value.to_ascii_lowercase().as_str() {
        "always" => FsyncPolicy::Always,
        "no" => FsyncPolicy::No,
        _ => FsyncPolicy::EverySec,
    }
}

/// Parses a byte-size literal with an optional `kb`/`mb`/`gb` suffix
/// (case-insensitive), grounded on `config.go`'s `utils.ParseSize`
/// collaborator.
fn parse_size(value: &str) -> Result<u64> {
    let lower = value.to_ascii_lowercase();
    let (digits, multiplier) = if let Some(d) = lower.strip_suffix("gb") {
        (d, 1024 * 1024 * 1024)
    } else if let Some(d) = lower.strip_suffix("mb") {
        (d, 1024 * 1024)
    } else if let Some(d) = lower.strip_suffix("kb") {
        (d, 1024)
    } else {
        (lower.as_str(), 1)
    };
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid size literal: '{value}'")))?;
    Ok(n * multiplier)
}
