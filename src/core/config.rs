//! Configuration system: TOML file + env var overrides + defaults.
//!
//! Every value here is a *default* for the `run` command; explicit CLI flags
//! always win over what the file or the environment provide.

#![allow(missing_docs)]

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{FixOwnerError, Result};

/// Highest verbosity level understood by the console reporter.
pub const MAX_VERBOSITY: u8 = 3;

/// Full configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub walk: WalkDefaults,
    pub report: ReportConfig,
    pub paths: PathsConfig,
}

/// Traversal defaults applied when the matching CLI flag is absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalkDefaults {
    pub recurse: bool,
    pub include_files: bool,
    /// Wall-clock budget in seconds. Zero means unbounded.
    pub timeout_secs: u64,
    /// Console verbosity, 0 through 3.
    pub verbosity: u8,
    pub track_sids: bool,
}

/// Report output locations and remediation priority thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory receiving exports and failure logs.
    pub output_dir: PathBuf,
    /// Write `fix_owner_<operation>_<ts>.log` when entries fail.
    pub failure_log: bool,
    /// Optional JSONL activity log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_log: Option<PathBuf>,
    /// Share of all seen items (percent) at or above which an orphaned SID is High priority.
    pub high_priority_pct: f64,
    /// Share of all seen items (percent) at or above which an orphaned SID is Medium priority.
    pub medium_priority_pct: f64,
}

/// Filesystem paths used by the tool itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

impl Default for WalkDefaults {
    fn default() -> Self {
        Self {
            recurse: false,
            include_files: false,
            timeout_secs: 0,
            verbosity: 1,
            track_sids: false,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            failure_log: true,
            activity_log: None,
            high_priority_pct: 10.0,
            medium_priority_pct: 1.0,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME")
            .or_else(|| env::var_os("USERPROFILE"))
            .map_or_else(
                || {
                    eprintln!(
                        "[FXO-CONFIG] WARNING: HOME not set, falling back to /tmp for config path"
                    );
                    PathBuf::from("/tmp")
                },
                PathBuf::from,
            );
        Self {
            config_file: home_dir
                .join(".config")
                .join("fix-owner")
                .join("config.toml"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf)
                .map_err(|source| FixOwnerError::io(&path_buf, source))?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(FixOwnerError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic SHA-256 fingerprint of the effective config, recorded in
    /// report metadata so two exports can be matched to the same settings.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(digest
            .iter()
            .fold(String::with_capacity(64), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            }))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // walk
        override_bool(&mut lookup, "FIXOWN_WALK_RECURSE", &mut self.walk.recurse)?;
        override_bool(
            &mut lookup,
            "FIXOWN_WALK_INCLUDE_FILES",
            &mut self.walk.include_files,
        )?;
        override_u64(
            &mut lookup,
            "FIXOWN_WALK_TIMEOUT_SECS",
            &mut self.walk.timeout_secs,
        )?;
        override_u8(&mut lookup, "FIXOWN_WALK_VERBOSITY", &mut self.walk.verbosity)?;
        override_bool(
            &mut lookup,
            "FIXOWN_WALK_TRACK_SIDS",
            &mut self.walk.track_sids,
        )?;

        // report
        if let Some(raw) = lookup("FIXOWN_REPORT_OUTPUT_DIR") {
            self.report.output_dir = PathBuf::from(raw);
        }
        override_bool(
            &mut lookup,
            "FIXOWN_REPORT_FAILURE_LOG",
            &mut self.report.failure_log,
        )?;
        if let Some(raw) = lookup("FIXOWN_REPORT_ACTIVITY_LOG") {
            self.report.activity_log = Some(PathBuf::from(raw));
        }
        override_f64(
            &mut lookup,
            "FIXOWN_REPORT_HIGH_PRIORITY_PCT",
            &mut self.report.high_priority_pct,
        )?;
        override_f64(
            &mut lookup,
            "FIXOWN_REPORT_MEDIUM_PRIORITY_PCT",
            &mut self.report.medium_priority_pct,
        )?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.walk.verbosity > MAX_VERBOSITY {
            return Err(FixOwnerError::InvalidConfig {
                details: format!(
                    "walk.verbosity must be in [0, {MAX_VERBOSITY}], got {}",
                    self.walk.verbosity
                ),
            });
        }

        for (name, val) in [
            ("high_priority_pct", self.report.high_priority_pct),
            ("medium_priority_pct", self.report.medium_priority_pct),
        ] {
            if !(0.0..=100.0).contains(&val) {
                return Err(FixOwnerError::InvalidConfig {
                    details: format!("report.{name} must be in [0, 100], got {val}"),
                });
            }
        }

        if self.report.medium_priority_pct > self.report.high_priority_pct {
            return Err(FixOwnerError::InvalidConfig {
                details: "report.medium_priority_pct must be <= report.high_priority_pct"
                    .to_string(),
            });
        }

        if self.report.output_dir.as_os_str().is_empty() {
            return Err(FixOwnerError::InvalidConfig {
                details: "report.output_dir must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn override_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env_bool(name, &raw)?;
    }
    Ok(())
}

fn override_u64<F>(lookup: &mut F, name: &str, slot: &mut u64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<u64>().map_err(|error| env_parse_error(name, &raw, &error))?;
    }
    Ok(())
}

fn override_u8<F>(lookup: &mut F, name: &str, slot: &mut u8) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<u8>().map_err(|error| env_parse_error(name, &raw, &error))?;
    }
    Ok(())
}

fn override_f64<F>(lookup: &mut F, name: &str, slot: &mut f64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<f64>().map_err(|error| env_parse_error(name, &raw, &error))?;
    }
    Ok(())
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FixOwnerError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: expected a boolean"),
        }),
    }
}

fn env_parse_error(name: &str, raw: &str, error: &dyn std::fmt::Display) -> FixOwnerError {
    FixOwnerError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, FixOwnerError};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.report.output_dir, PathBuf::from("output"));
        assert_eq!(cfg.walk.timeout_secs, 0);
    }

    #[test]
    fn verbosity_above_three_rejected() {
        let mut cfg = Config::default();
        cfg.walk.verbosity = 4;
        let err = cfg.validate().expect_err("expected invalid verbosity");
        match err {
            FixOwnerError::InvalidConfig { details } => {
                assert!(details.contains("walk.verbosity"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn inverted_priority_thresholds_rejected() {
        let mut cfg = Config::default();
        cfg.report.high_priority_pct = 2.0;
        cfg.report.medium_priority_pct = 5.0;
        let err = cfg.validate().expect_err("expected threshold error");
        assert!(err.to_string().contains("medium_priority_pct"));
    }

    #[test]
    fn out_of_range_priority_rejected() {
        let mut cfg = Config::default();
        cfg.report.high_priority_pct = 150.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply_to_walk_and_report() {
        let env = vars(&[
            ("FIXOWN_WALK_RECURSE", "true"),
            ("FIXOWN_WALK_INCLUDE_FILES", "1"),
            ("FIXOWN_WALK_TIMEOUT_SECS", "90"),
            ("FIXOWN_WALK_VERBOSITY", "3"),
            ("FIXOWN_REPORT_OUTPUT_DIR", "/var/tmp/fixown"),
            ("FIXOWN_REPORT_ACTIVITY_LOG", "/var/tmp/fixown/activity.jsonl"),
            ("FIXOWN_REPORT_HIGH_PRIORITY_PCT", "25.5"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .expect("overrides should apply");

        assert!(cfg.walk.recurse);
        assert!(cfg.walk.include_files);
        assert_eq!(cfg.walk.timeout_secs, 90);
        assert_eq!(cfg.walk.verbosity, 3);
        assert_eq!(cfg.report.output_dir, PathBuf::from("/var/tmp/fixown"));
        assert_eq!(
            cfg.report.activity_log.as_deref(),
            Some(Path::new("/var/tmp/fixown/activity.jsonl"))
        );
        assert!((cfg.report.high_priority_pct - 25.5).abs() < f64::EPSILON);
    }

    #[test]
    fn env_invalid_boolean_rejected() {
        let env = vars(&[("FIXOWN_WALK_RECURSE", "sometimes")]);
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .expect_err("expected parse error");
        assert_eq!(err.code(), "FXO-1003");
        assert!(err.to_string().contains("FIXOWN_WALK_RECURSE"));
    }

    #[test]
    fn env_invalid_number_rejected() {
        let env = vars(&[("FIXOWN_WALK_TIMEOUT_SECS", "-5")]);
        let mut cfg = Config::default();
        assert!(
            cfg.apply_env_overrides_from(|name| env.get(name).cloned())
                .is_err()
        );
    }

    #[test]
    fn toml_sections_parse_with_partial_content() {
        let raw = r#"
            [walk]
            recurse = true
            track_sids = true

            [report]
            output_dir = "reports"
        "#;
        let cfg: Config = toml::from_str(raw).expect("parse");
        assert!(cfg.walk.recurse);
        assert!(cfg.walk.track_sids);
        assert!(!cfg.walk.include_files);
        assert_eq!(cfg.report.output_dir, PathBuf::from("reports"));
        assert!(cfg.report.failure_log);
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[walk]\nverbosity = 2\n").expect("write config");
        let cfg = Config::load(Some(&path)).expect("load");
        assert_eq!(cfg.walk.verbosity, 2);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/fixown/config.toml")));
        assert!(matches!(result, Err(FixOwnerError::MissingConfig { .. })));
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let hash_before = cfg.stable_hash().expect("hash should compute");
        let mut modified = Config::default();
        modified.walk.recurse = true;
        let hash_after = modified.stable_hash().expect("hash should compute");
        assert_ne!(hash_before, hash_after);
        assert_eq!(hash_before.len(), 64);
    }

    #[test]
    fn stable_hash_deterministic() {
        let cfg = Config::default();
        assert_eq!(
            cfg.stable_hash().expect("hash"),
            cfg.stable_hash().expect("hash")
        );
    }
}
