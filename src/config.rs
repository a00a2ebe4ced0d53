use anyhow::{anyhow, Context};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::path::PathBuf;

use crate::clock::{self, Clock};

pub const ENV_WORKSPACE: &str = "PORTALD_WORKSPACE";
pub const ENV_NOW: &str = "PORTALD_NOW";
pub const ENV_UTC_OFFSET_MINUTES: &str = "PORTALD_UTC_OFFSET_MINUTES";
pub const ENV_LOG: &str = "PORTALD_LOG";

const DEFAULT_LOG_FILTER: &str = "portald=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub fixed_now: Option<DateTime<Utc>>,
    pub utc_offset: FixedOffset,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let workspace = non_empty(ENV_WORKSPACE).map(PathBuf::from);

        let fixed_now = match non_empty(ENV_NOW) {
            Some(raw) => Some(
                clock::parse_timestamp(&raw)
                    .ok_or_else(|| anyhow!("{} is not an RFC 3339 timestamp: {}", ENV_NOW, raw))?,
            ),
            None => None,
        };

        let utc_offset = match non_empty(ENV_UTC_OFFSET_MINUTES) {
            Some(raw) => {
                let minutes: i32 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be an integer", ENV_UTC_OFFSET_MINUTES))?;
                if !(-1440..=1440).contains(&minutes) {
                    return Err(anyhow!(
                        "{} must be in -1440..=1440, got {}",
                        ENV_UTC_OFFSET_MINUTES,
                        minutes
                    ));
                }
                FixedOffset::east_opt(minutes * 60)
                    .ok_or_else(|| anyhow!("invalid utc offset: {} minutes", minutes))?
            }
            None => Utc.fix(),
        };

        let log_filter = non_empty(ENV_LOG)
            .or_else(|| non_empty("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            workspace,
            fixed_now,
            utc_offset,
            log_filter,
        })
    }

    pub fn clock(&self) -> Clock {
        let base = match self.fixed_now {
            Some(at) => Clock::fixed(at),
            None => Clock::system(),
        };
        base.with_offset(self.utc_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(lookup(&[])).expect("config");
        assert!(cfg.workspace.is_none());
        assert!(cfg.fixed_now.is_none());
        assert_eq!(cfg.utc_offset.local_minus_utc(), 0);
        assert_eq!(cfg.log_filter, "portald=info");
        assert!(!cfg.clock().is_fixed());
    }

    #[test]
    fn reads_every_variable() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_WORKSPACE, "/tmp/portal"),
            (ENV_NOW, "2026-10-17T00:00:00Z"),
            (ENV_UTC_OFFSET_MINUTES, "540"),
            ("RUST_LOG", "debug"),
        ]))
        .expect("config");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/portal")));
        assert_eq!(cfg.utc_offset.local_minus_utc(), 540 * 60);
        assert_eq!(cfg.log_filter, "debug");
        let clock = cfg.clock();
        assert!(clock.is_fixed());
        assert_eq!(clock.today().to_string(), "2026-10-17");
    }

    #[test]
    fn portald_log_wins_over_rust_log() {
        let cfg = Config::from_lookup(lookup(&[(ENV_LOG, "portald=trace"), ("RUST_LOG", "warn")]))
            .expect("config");
        assert_eq!(cfg.log_filter, "portald=trace");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(Config::from_lookup(lookup(&[(ENV_NOW, "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_UTC_OFFSET_MINUTES, "nine")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_UTC_OFFSET_MINUTES, "2000")])).is_err());
    }
}
