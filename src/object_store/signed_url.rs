//! HMAC-signed, expiring read URLs for the local backend.

use std::time::Duration;

use chrono::Utc;
use ring::hmac;
use thiserror::Error;

use super::encode_key_path;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("URL has expired")]
    Expired,
    #[error("Invalid signature")]
    Invalid,
}

pub struct UrlSigner {
    key: hmac::Key,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: &[u8], base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn message(key: &str, expires: i64) -> String {
        format!("{key}\n{expires}")
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        let tag = hmac::sign(&self.key, Self::message(key, expires).as_bytes());
        hex::encode(tag.as_ref())
    }

    /// Unsigned location of `key` under the blob route.
    pub fn location(&self, key: &str) -> String {
        format!("{}/blobs/{}", self.base_url, encode_key_path(key))
    }

    pub fn signed_url(&self, key: &str, ttl: Duration) -> String {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        format!(
            "{}?expires={expires}&signature={}",
            self.location(key),
            self.sign(key, expires)
        )
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<(), SignatureError> {
        if Utc::now().timestamp() > expires {
            return Err(SignatureError::Expired);
        }
        let tag = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        hmac::verify(&self.key, Self::message(key, expires).as_bytes(), &tag)
            .map_err(|_| SignatureError::Invalid)
    }
}
