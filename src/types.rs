use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::validation::validate_fingerprint;

/// A validated, normalized 40-character key fingerprint.
///
/// Only constructed through [`Fingerprint::parse`], so holding one means the
/// value is safe to put into a keyserver query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_fingerprint(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Search term understood by HKP keyservers.
    pub fn query(&self) -> String {
        format!("0x{}", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One declared (name, fingerprint) pair, as loaded from a declaration file.
///
/// The fingerprint is kept in its source form; the validator normalizes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// File the record was loaded from, used in diagnostics.
    pub source: String,
    pub name: String,
    pub fingerprint: String,
}

/// Armored key text returned by a keyserver, with the endpoint that served it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlob {
    pub endpoint: String,
    pub armored: String,
}

/// A single RFC 2822 mailbox: optional display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub phrase: Option<String>,
    pub address: String,
}

/// Summary of the primary key packet, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub version: u8,
    pub created: Option<DateTime<Utc>>,
    pub algorithm: String,
}

impl fmt::Display for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} {}", self.version, self.algorithm)?;
        if let Some(created) = self.created {
            write!(f, " created {}", created.date_naive())?;
        }
        Ok(())
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub name: String,
    pub fingerprint: Fingerprint,
    /// Keyserver endpoint whose answer was used.
    pub endpoint: String,
    /// Every display name extracted from the key.
    pub names: Vec<String>,
}
