use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed declaration in {file}: {reason}")]
    MalformedInput { file: String, reason: String },

    #[error("invalid fingerprint '{fingerprint}': {reason}")]
    InvalidFingerprint { fingerprint: String, reason: String },

    #[error("key {fingerprint} does not exist on any keyserver")]
    KeyNotFound { fingerprint: String },

    #[error("key {fingerprint} could not be decoded: {source}")]
    Decode {
        fingerprint: String,
        #[source]
        source: DecodeError,
    },

    #[error("invalid key comment on {fingerprint}: {user_id}")]
    UnparsableIdentity { fingerprint: String, user_id: String },

    #[error("key {fingerprint} missing name: {name} (found {found:?})")]
    NameMismatch {
        name: String,
        fingerprint: String,
        found: Vec<String>,
    },

    #[error("{file} looks like a key declaration outside the key directory")]
    MisplacedKey { file: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid keyserver endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Failure to turn an armored key block into packets.
///
/// Distinct from a missing key: a `DecodeError` means a keyserver answered
/// with something that is not a usable public key block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("no armor header line found")]
    MissingArmorHeader,

    #[error("armor footer missing or does not match '{0}'")]
    MissingArmorFooter(String),

    #[error("unrecognized armor type '{0}'")]
    UnknownArmorType(String),

    #[error("expected a public key block, found '{0}'")]
    UnexpectedArmorType(String),

    #[error("invalid base64 in armor body: {0}")]
    InvalidBase64(String),

    #[error("armor checksum mismatch (expected {expected:06X}, computed {actual:06X})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("key block contains no packets")]
    EmptyKeyBlock,

    #[error("invalid packet header at offset {0}")]
    InvalidPacketHeader(usize),

    #[error("packet at offset {offset} is truncated (needs {needed} bytes, {available} available)")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
