//! Configuration module.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Malformed values are rejected instead of silently replaced.

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;

use crate::check::{CheckSettings, SuspensionMarkers, DEFAULT_SUSPENSION_MARKERS};

/// Configuration error types.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the management API (default: 3000)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "pulsecheck.db")
    pub db_path: String,
    /// Time between check cycles (default: 5m)
    pub check_interval: Duration,
    /// Per-request timeout up to the response headers (default: 60s)
    pub request_timeout: Duration,
    /// Bound on reading a response body (default: 10s)
    pub body_timeout: Duration,
    /// Maximum number of concurrent probes (default: 50)
    pub max_workers: NonZeroUsize,
    /// Case-insensitive body markers of a suspended site
    pub suspension_markers: SuspensionMarkers,
    /// Age after which probe logs are deleted (default: 168h)
    pub log_retention: Duration,
    /// Time between retention sweeps (default: 5m)
    pub log_cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 3000,
            db_path: "pulsecheck.db".to_string(),
            check_interval: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(60),
            body_timeout: Duration::from_secs(10),
            max_workers: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            suspension_markers: SuspensionMarkers::new(DEFAULT_SUSPENSION_MARKERS),
            log_retention: Duration::from_secs(7 * 24 * 60 * 60),
            log_cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PULSECHECK_HTTP_PORT`: HTTP port (default: 3000)
    /// - `PULSECHECK_DB_PATH`: Database file path (default: "pulsecheck.db")
    /// - `CHECK_INTERVAL`: Cycle interval (default: 5m)
    /// - `REQUEST_TIMEOUT`: Per-request timeout (default: 60s)
    /// - `BODY_READ_TIMEOUT`: Body read bound (default: 10s)
    /// - `MAX_WORKERS`: Concurrent probe cap, must be positive (default: 50)
    /// - `SUSPENSION_MARKERS`: Comma-separated body markers
    /// - `LOG_RETENTION`: Probe log max age (default: 168h)
    /// - `LOG_CLEANUP_INTERVAL`: Retention sweep interval (default: 5m)
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PULSECHECK_HTTP_PORT") {
            cfg.http_port = v.trim().parse().map_err(|e| invalid("PULSECHECK_HTTP_PORT", &v, e))?;
        }

        if let Some(v) = get("PULSECHECK_DB_PATH") {
            cfg.db_path = v;
        }

        if let Some(v) = get("CHECK_INTERVAL") {
            cfg.check_interval = duration_var("CHECK_INTERVAL", &v)?;
        }

        if let Some(v) = get("REQUEST_TIMEOUT") {
            cfg.request_timeout = duration_var("REQUEST_TIMEOUT", &v)?;
        }

        if let Some(v) = get("BODY_READ_TIMEOUT") {
            cfg.body_timeout = duration_var("BODY_READ_TIMEOUT", &v)?;
        }

        if let Some(v) = get("MAX_WORKERS") {
            let n: i64 = v.trim().parse().map_err(|e| invalid("MAX_WORKERS", &v, e))?;
            cfg.max_workers = usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .ok_or_else(|| invalid("MAX_WORKERS", &v, "must be a positive integer"))?;
        }

        if let Some(v) = get("SUSPENSION_MARKERS") {
            let markers = SuspensionMarkers::new(v.split(','));
            if markers.as_slice().is_empty() {
                return Err(invalid("SUSPENSION_MARKERS", &v, "no markers given"));
            }
            cfg.suspension_markers = markers;
        }

        if let Some(v) = get("LOG_RETENTION") {
            cfg.log_retention = duration_var("LOG_RETENTION", &v)?;
        }

        if let Some(v) = get("LOG_CLEANUP_INTERVAL") {
            cfg.log_cleanup_interval = duration_var("LOG_CLEANUP_INTERVAL", &v)?;
        }

        Ok(cfg)
    }

    /// Settings handed to the check engine.
    pub fn check_settings(&self) -> CheckSettings {
        CheckSettings {
            max_workers: self.max_workers,
            request_timeout: self.request_timeout,
            body_timeout: self.body_timeout,
            markers: self.suspension_markers.clone(),
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn duration_var(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let d = parse_duration(value).map_err(|reason| invalid(key, value, reason))?;
    if d.is_zero() {
        return Err(invalid(key, value, "must be greater than zero"));
    }
    Ok(d)
}

/// Parse a duration such as `90`, `500ms`, `30s`, `5m`, `1h30m`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    if let Ok(secs) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).map_err(|e| e.to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in {:?}", s))?;
        if num_len == 0 {
            return Err(format!("expected a number in {:?}", s));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("bad number in {:?}", s))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            unit => return Err(format!("unknown unit {:?} in {:?}", unit, s)),
        };
        rest = &rest[unit_len..];

        let part = Duration::try_from_secs_f64(value * scale).map_err(|e| e.to_string())?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("duration too large: {:?}", s))?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.http_port, 3000);
        assert_eq!(cfg.db_path, "pulsecheck.db");
        assert_eq!(cfg.max_workers.get(), 50);
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
        assert_eq!(cfg.body_timeout, Duration::from_secs(10));
        assert_eq!(cfg.check_interval, Duration::from_secs(300));
        assert_eq!(cfg.suspension_markers.as_slice()[0], "suspended");
    }

    #[test]
    fn test_overrides() {
        let cfg = load(&[
            ("MAX_WORKERS", "8"),
            ("REQUEST_TIMEOUT", "5s"),
            ("CHECK_INTERVAL", "1m"),
            ("SUSPENSION_MARKERS", "Suspended, Parked Domain"),
            ("PULSECHECK_DB_PATH", "/tmp/pc.db"),
        ])
        .unwrap();
        assert_eq!(cfg.max_workers.get(), 8);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.check_interval, Duration::from_secs(60));
        assert_eq!(
            cfg.suspension_markers.as_slice(),
            &["suspended".to_string(), "parked domain".to_string()]
        );
        assert_eq!(cfg.db_path, "/tmp/pc.db");

        let settings = cfg.check_settings();
        assert_eq!(settings.max_workers.get(), 8);
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_non_positive_workers() {
        for bad in ["0", "-3", "many"] {
            let err = load(&[("MAX_WORKERS", bad)]).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: "MAX_WORKERS", .. }));
        }
    }

    #[test]
    fn test_rejects_bad_durations() {
        assert!(load(&[("REQUEST_TIMEOUT", "0s")]).is_err());
        assert!(load(&[("REQUEST_TIMEOUT", "soon")]).is_err());
        assert!(load(&[("CHECK_INTERVAL", "5d")]).is_err());

        let err = load(&[("REQUEST_TIMEOUT", "4000000000000000h4000000000000000h")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "REQUEST_TIMEOUT", .. }));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m5").is_err());
    }
}
