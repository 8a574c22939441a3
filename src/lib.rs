//! Verify a roster of declared OpenPGP identities against public keyservers.
//!
//! Each declaration names a person and the fingerprint of their key. This
//! crate looks the fingerprint up on a pool of HKP keyservers, decodes the
//! returned key block and checks that one of the key's User IDs carries the
//! declared name. Signatures, expiry and trust are not evaluated.
//!
//! # Example
//!
//! ```no_run
//! use keyroster::{Config, Validator, batch};
//!
//! #[tokio::main]
//! async fn main() -> keyroster::Result<()> {
//!     let config = Config::default();
//!     let validator = Validator::from_config(&config)?;
//!
//!     let report = batch::validate_dir(&validator, &config.key_dir, config.aggregation).await?;
//!     for (path, error) in report.failures() {
//!         eprintln!("{}: {error}", path.display());
//!     }
//!     println!("checked {} keys", report.checked());
//!
//!     Ok(())
//! }
//! ```

pub mod armor;
pub mod batch;
mod config;
mod declaration;
mod error;
pub mod identity;
pub mod keyserver;
pub mod packet;
pub mod table;
mod types;
mod validation;
mod validator;

pub use config::{Aggregation, Config};
pub use declaration::{Declaration, parse_record};
pub use error::{DecodeError, Error, Result};
pub use identity::{Grammar, IdentityExtractor, UnparsablePolicy};
pub use keyserver::{HkpKeyserver, Keyserver, KeyserverPool};
pub use packet::PacketList;
pub use types::{Fingerprint, KeyBlob, KeyInfo, KeyRecord, Mailbox, Verified};
pub use validation::{normalize_fingerprint, validate_fingerprint};
pub use validator::Validator;
