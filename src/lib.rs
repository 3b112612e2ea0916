//! # resty
//!
//! Client for a restAssured blob and table store.
//!
//! Values are serialized (binary or text), checksummed, and stored as
//! blobs. Before every write the server manifest is queried for a record
//! with the same checksum and kind tag, so pushing the same value twice
//! updates one blob instead of storing two.
//!
//! ## Core Concepts
//!
//! - **Value**: dynamic object graph that gets serialized
//! - **Kind tag**: `"binary"` or `"text"`, recorded with each blob
//! - **Manifest**: server-side records describing stored blobs
//! - **Transport**: the [`BlobTransport`] boundary, HTTP or in-memory
//!
//! ## Example
//!
//! ```ignore
//! use resty::{Attributes, CloudPassage, DriverConfig, SerializationKind, Value};
//!
//! let passage = CloudPassage::connect(DriverConfig::from_env())?;
//! let value: Value = (0..10).map(|i| (i, i)).collect();
//! passage.push(&value, SerializationKind::Binary, &Attributes::new())?;
//!
//! let mut query = Attributes::new();
//! query.insert("metaData".into(), "binary".into());
//! let back = passage.pull(&query)?;
//! ```

pub mod auth;
pub mod config;
pub mod liaison;
pub mod model;
pub mod passage;
pub mod serializer;
pub mod transport;

mod error;

pub use auth::{SecretStore, Signer};
pub use config::DriverConfig;
pub use error::{Error, Result};
pub use liaison::{HandlerLiaison, LiaisonNames, LiaisonRegistry};
pub use model::{
    Attributes, Checksum, ChecksumAlgorithm, ChecksumEngine, ManifestRecord, SerializationKind,
    Value,
};
pub use passage::{CloudPassage, DriverCache, ManifestLookup};
pub use serializer::Serializer;
pub use transport::{BlobTransport, ManifestResponse, MockTransport, RestDriver, RestResponse};
