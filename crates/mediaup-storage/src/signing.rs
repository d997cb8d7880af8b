//! HMAC-signed relay URLs
//!
//! Backends without native presigning (the local filesystem) hand out URLs that point back
//! at the API server: `PUT {base}/uploads/relay/{key}?expires={unix}&signature={hex}`. The
//! signature is HMAC-SHA256 over `"{METHOD}\n{key}\n{expires}"`.

use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Path prefix the API serves relay writes under
pub const RELAY_PATH: &str = "/uploads/relay";

/// Characters escaped inside a key path segment; `/` is kept as the separator
const KEY_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("relay URL expired")]
    Expired,
    #[error("relay URL signature is invalid")]
    Invalid,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, method: &str, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
        };
        mac.update(method.to_uppercase().as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Hex signature for `method` on `key`, valid until `expires` (unix seconds)
    pub fn sign(&self, method: &str, key: &str, expires: i64) -> String {
        hex::encode(self.mac(method, key, expires).finalize().into_bytes())
    }

    /// Check a signature in constant time; `now` is unix seconds.
    pub fn verify(
        &self,
        method: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        if now > expires {
            return Err(SignatureError::Expired);
        }

        let provided = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        let expected = self.mac(method, key, expires).finalize().into_bytes();

        if expected.as_slice().ct_eq(provided.as_slice()).into() {
            Ok(())
        } else {
            Err(SignatureError::Invalid)
        }
    }

    /// Full relay URL for `method` on `key` under `base_url`
    pub fn relay_url(&self, base_url: &str, method: &str, key: &str, expires: i64) -> String {
        format!(
            "{}{}/{}?expires={}&signature={}",
            base_url.trim_end_matches('/'),
            RELAY_PATH,
            utf8_percent_encode(key, KEY_SEGMENT),
            expires,
            self.sign(method, key, expires)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let signer = UrlSigner::new("relay-secret");
        let sig = signer.sign("PUT", "images/a.png", 1_000);
        assert!(signer.verify("put", "images/a.png", 1_000, &sig, 999).is_ok());
    }

    #[test]
    fn tampered_key_or_expiry_is_rejected() {
        let signer = UrlSigner::new("relay-secret");
        let sig = signer.sign("PUT", "images/a.png", 1_000);
        assert_eq!(
            signer.verify("PUT", "images/b.png", 1_000, &sig, 0),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            signer.verify("PUT", "images/a.png", 2_000, &sig, 0),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            signer.verify("PUT", "images/a.png", 1_000, "zz", 0),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn expired_signature_is_rejected() {
        let signer = UrlSigner::new("relay-secret");
        let sig = signer.sign("PUT", "k", 10);
        assert_eq!(
            signer.verify("PUT", "k", 10, &sig, 11),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn relay_url_escapes_key() {
        let signer = UrlSigner::new("s");
        let url = signer.relay_url("http://api:3000/", "PUT", "a b/c.png", 5);
        assert!(url.starts_with("http://api:3000/uploads/relay/a%20b/c.png?expires=5&signature="));
    }
}
