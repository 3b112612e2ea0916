//! HMAC-SHA256 request signing

use crate::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Signs messages with a shared secret key
#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl Signer {
    pub fn new(secret_key: impl AsRef<[u8]>) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret_key.as_ref())
            .map_err(|e| Error::Config(format!("Invalid HMAC key: {}", e)))?;
        Ok(Signer { mac })
    }

    /// Raw signature bytes
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }

    /// Hex-encoded signature
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message))
    }

    /// Constant-time check of a hex signature
    pub fn verify_hex(&self, message: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.verify_slice(&expected).is_ok()
    }

    /// One raw signature per item, in order
    pub fn sign_items<I, T>(&self, items: I) -> Vec<Vec<u8>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        items
            .into_iter()
            .map(|item| self.sign(item.as_ref()))
            .collect()
    }

    /// One hex signature per item, in order
    pub fn sign_items_hex<I, T>(&self, items: I) -> Vec<String>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        items
            .into_iter()
            .map(|item| self.sign_hex(item.as_ref()))
            .collect()
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Signer(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2
    const KEY: &[u8] = b"Jefe";
    const MESSAGE: &[u8] = b"what do ya want for nothing?";
    const EXPECTED: &str = "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";

    #[test]
    fn test_rfc4231_vector() {
        let signer = Signer::new(KEY).unwrap();
        assert_eq!(signer.sign_hex(MESSAGE), EXPECTED);
        assert!(signer.verify_hex(MESSAGE, EXPECTED));
        assert!(!signer.verify_hex(b"tampered", EXPECTED));
        assert!(!signer.verify_hex(MESSAGE, "not hex"));
    }

    #[test]
    fn test_sign_items() {
        let signer = Signer::new("secret").unwrap();
        let items = ["1234", "abcdEFGH", "", "458485"];

        let hex = signer.sign_items_hex(items);
        assert_eq!(hex.len(), items.len());
        assert!(hex.iter().all(|s| s.len() == 64));

        let raw = signer.sign_items(items);
        assert!(raw.iter().all(|s| s.len() == 32));
        assert_eq!(hex::encode(&raw[1]), hex[1]);
    }

    #[test]
    fn test_different_keys_differ() {
        let a = Signer::new("one").unwrap();
        let b = Signer::new("two").unwrap();
        assert_ne!(a.sign(b"msg"), b.sign(b"msg"));
        assert_eq!(format!("{:?}", a), "Signer(<redacted>)");
    }
}
