//! Process-wide, read-only configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::identity::{Grammar, IdentityExtractor, UnparsablePolicy};
use crate::keyserver::{DEFAULT_KEYSERVERS, KeyserverPool};

/// Attendees of earlier keysigning parties, left out of the table by default.
pub const DEFAULT_PREVIOUS_ATTENDEES: &[&str] = &[
    "Aaron Kirkbride",
    "Adam Johnson",
    "Amber Wright",
    "Benjamin Elis Misell",
    "Emmanuel Payet",
    "Fabio Natali",
    "Jonathan Burman",
    "Luca Valentini",
    "Mark Einon",
    "Matthew Power",
    "Michael Aquilina",
    "Roger G. Coram",
    "Samuel Reynolds",
    "Thomas David Newport",
    "Thomas Edwards",
    "Vipin Ajayakumar",
    "William Johnson",
];

/// How the batch driver reacts to a failing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregation {
    /// Validate every file and report all failures together.
    #[default]
    CollectAll,
    /// Stop at the first failure.
    FailFast,
}

/// Configuration for a roster check
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Keyserver endpoints, highest priority first
    pub keyservers: Vec<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// User ID grammars, tried in order
    pub grammars: Vec<Grammar>,
    /// Handling of User IDs no grammar accepts
    pub unparsable_identity: UnparsablePolicy,
    pub aggregation: Aggregation,
    /// Directory holding one declaration file per key
    pub key_dir: PathBuf,
    /// Top-level file names the misplaced-key scan skips
    pub misplaced_allow_list: Vec<String>,
    /// Names left out of the generated table
    pub previous_attendees: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keyservers: DEFAULT_KEYSERVERS.iter().map(|s| s.to_string()).collect(),
            request_timeout_secs: 10,
            grammars: vec![Grammar::Mailbox, Grammar::Loose],
            unparsable_identity: UnparsablePolicy::Skip,
            aggregation: Aggregation::CollectAll,
            key_dir: PathBuf::from("keys"),
            misplaced_allow_list: [
                "package.json",
                "package-lock.json",
                "yarn.lock",
                "Cargo.toml",
                "Cargo.lock",
                "keyroster.toml",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            previous_attendees: DEFAULT_PREVIOUS_ATTENDEES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Parses and validates a TOML configuration.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyservers.is_empty() {
            return Err(Error::Config("at least one keyserver is required".to_string()));
        }
        if self.grammars.is_empty() {
            return Err(Error::Config("at least one grammar is required".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns the request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn keyserver_pool(&self) -> Result<KeyserverPool> {
        KeyserverPool::hkp(&self.keyservers, self.request_timeout())
    }

    pub fn identity_extractor(&self) -> IdentityExtractor {
        IdentityExtractor::new(self.grammars.clone(), self.unparsable_identity)
    }
}
