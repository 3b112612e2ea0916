//! Request signing and secret key persistence

mod secrets;
mod signer;

pub use secrets::{SecretStore, StoredSecret};
pub use signer::Signer;
