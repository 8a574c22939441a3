use std::path::Path;

use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::declaration::parse_record;
use crate::error::{Error, Result};
use crate::identity::{IdentityExtractor, UnparsableUserId};
use crate::keyserver::KeyserverPool;
use crate::packet;
use crate::types::{Fingerprint, KeyRecord, Verified};

/// Checks declared identities against the keyserver network.
///
/// Each check runs `Loaded → FingerprintValidated → KeyFetched →
/// IdentitiesExtracted → NameMatched`; any step may reject the record with
/// the matching [`Error`] variant.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> keyroster::Result<()> {
/// use keyroster::{Config, Validator};
///
/// let validator = Validator::from_config(&Config::default())?;
/// let verified = validator.validate_file("keys/alice.yml").await?;
/// println!("{} found on {}", verified.name, verified.endpoint);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Validator {
    pool: KeyserverPool,
    extractor: IdentityExtractor,
}

impl Validator {
    pub fn new(pool: KeyserverPool, extractor: IdentityExtractor) -> Self {
        Self { pool, extractor }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.keyserver_pool()?,
            config.identity_extractor(),
        ))
    }

    /// Reads and validates one declaration file.
    pub async fn validate_file(&self, path: impl AsRef<Path>) -> Result<Verified> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let record = parse_record(&path.display().to_string(), &text)?;
        self.validate_record(&record).await
    }

    /// Validates an already loaded record.
    #[instrument(skip_all, fields(source = %record.source))]
    pub async fn validate_record(&self, record: &KeyRecord) -> Result<Verified> {
        // no network traffic for a fingerprint that cannot be valid
        let fingerprint = Fingerprint::parse(&record.fingerprint)?;
        debug!(%fingerprint, "fingerprint validated");

        let blob = self
            .pool
            .lookup(&fingerprint)
            .await
            .ok_or_else(|| Error::KeyNotFound {
                fingerprint: fingerprint.to_string(),
            })?;
        debug!(%fingerprint, endpoint = %blob.endpoint, "key fetched");

        let packets = packet::decode(&blob.armored).map_err(|source| Error::Decode {
            fingerprint: fingerprint.to_string(),
            source,
        })?;
        if let Some(key) = packets.primary_key() {
            debug!(%fingerprint, %key, "primary key");
        }

        let names = self
            .extractor
            .extract_names(&packets)
            .map_err(|UnparsableUserId(user_id)| Error::UnparsableIdentity {
                fingerprint: fingerprint.to_string(),
                user_id,
            })?;
        debug!(%fingerprint, ?names, "identities extracted");

        if !names.iter().any(|n| n == &record.name) {
            return Err(Error::NameMismatch {
                name: record.name.clone(),
                fingerprint: fingerprint.to_string(),
                found: names,
            });
        }

        info!(%fingerprint, name = %record.name, "key verified");
        Ok(Verified {
            name: record.name.clone(),
            fingerprint,
            endpoint: blob.endpoint,
            names,
        })
    }
}
