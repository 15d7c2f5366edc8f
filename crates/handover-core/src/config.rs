use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HandoverError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "handover.toml";

const REFERENCE_URL_VAR: &str = "HANDOVER_REFERENCE_DATABASE_URL";
const DESTINATION_URL_VAR: &str = "HANDOVER_DESTINATION_DATABASE_URL";
const FALLBACK_URL_VAR: &str = "DATABASE_URL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandoverConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_input_file")]
    pub input_file: PathBuf,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_file: default_input_file(),
            output_directory: default_output_directory(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceConfig {
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub key_schema: KeySchema,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            key_schema: KeySchema::default(),
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub unresolved_policy: UnresolvedPolicy,
    #[serde(default)]
    pub suffix_match: SuffixMatch,
    /// Expansion workers; `0` means one per available CPU.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub strict_live_index_checks: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            unresolved_policy: UnresolvedPolicy::default(),
            suffix_match: SuffixMatch::default(),
            workers: default_workers(),
            strict_live_index_checks: false,
        }
    }
}

impl ProcessingConfig {
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }
}

/// What to do with portfolio identifiers missing from the reference table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedPolicy {
    /// Abort the run after expansion, listing every unresolved identifier.
    #[default]
    FailFast,
    /// Drop unresolved list entries, keep single-identifier rows unverified.
    Permissive,
    /// Replace unresolved identifiers with `WrongID_<n>` rows.
    Placeholder,
}

/// Natural key of the destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeySchema {
    /// `(portfolio_id, name, start_date)` on `handover_automation_final`.
    #[default]
    Composite,
    /// `row_index` on `handovers_final`.
    Sequential,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuffixMatch {
    /// Plain substring search; truncates names like "GROWTH" too.
    #[default]
    Substring,
    /// Only match suffixes standing on their own.
    WordBoundary,
}

impl HandoverConfig {
    /// Loads the configuration file. A missing file at the default location
    /// yields the defaults; a missing file given explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|err| {
            HandoverError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn reference_database_url(&self) -> Result<String> {
        resolve_url(self.reference.database_url.as_deref(), REFERENCE_URL_VAR)
    }

    pub fn destination_database_url(&self) -> Result<String> {
        resolve_url(self.destination.database_url.as_deref(), DESTINATION_URL_VAR)
    }
}

fn resolve_url(configured: Option<&str>, var: &str) -> Result<String> {
    env::var(var)
        .ok()
        .or_else(|| configured.map(str::to_string))
        .or_else(|| env::var(FALLBACK_URL_VAR).ok())
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| {
            HandoverError::Config(format!(
                "no database URL configured ({var}, the config file, or {FALLBACK_URL_VAR})"
            ))
        })
}

fn default_input_file() -> PathBuf {
    PathBuf::from("Handover Form Final.csv")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_workers() -> usize {
    1
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = HandoverConfig::from_toml("").unwrap();
        assert_eq!(config.processing.unresolved_policy, UnresolvedPolicy::FailFast);
        assert_eq!(config.processing.suffix_match, SuffixMatch::Substring);
        assert_eq!(config.destination.key_schema, KeySchema::Composite);
        assert_eq!(config.processing.workers, 1);
        assert!(config.destination.run_migrations);
        assert!(!config.processing.strict_live_index_checks);
    }

    #[test]
    fn parses_every_section() {
        let config = HandoverConfig::from_toml(
            r#"
            [paths]
            input_file = "responses.csv"
            output_directory = "out"

            [reference]
            database_url = "postgres://reference"

            [destination]
            database_url = "postgres://destination"
            key_schema = "sequential"
            run_migrations = false

            [processing]
            unresolved_policy = "placeholder"
            suffix_match = "word-boundary"
            workers = 4
            strict_live_index_checks = true
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.input_file, PathBuf::from("responses.csv"));
        assert_eq!(config.paths.output_directory, PathBuf::from("out"));
        assert_eq!(config.reference.database_url.as_deref(), Some("postgres://reference"));
        assert_eq!(config.destination.key_schema, KeySchema::Sequential);
        assert!(!config.destination.run_migrations);
        assert_eq!(config.processing.unresolved_policy, UnresolvedPolicy::Placeholder);
        assert_eq!(config.processing.suffix_match, SuffixMatch::WordBoundary);
        assert_eq!(config.processing.effective_workers(), 4);
        assert!(config.processing.strict_live_index_checks);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = HandoverConfig::from_toml("[processing]\nunresolved_policy = \"ignore\"\n");
        assert!(matches!(err, Err(HandoverError::Toml(_))));
    }

    #[test]
    fn zero_workers_means_available_parallelism() {
        let processing = ProcessingConfig {
            workers: 0,
            ..ProcessingConfig::default()
        };
        assert!(processing.effective_workers() >= 1);
    }
}
