use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{encode_key_path, validate_key, ObjectStore, ObjectStoreError};

const STORAGE_HOST: &str = "storage.googleapis.com";
const METADATA_BASE: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default";
/// V4 signed URLs cannot outlive seven days.
const MAX_SIGNED_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Google Cloud Storage object store backend.
pub struct GcsStore {
    bucket: String,
    client: Client,
    access_token: RwLock<CachedToken>,
    credentials: Credentials,
}

enum Credentials {
    /// A service-account key file: tokens come from a signed JWT grant and
    /// URLs are signed locally.
    ServiceAccount(ServiceAccountKey),
    /// Ambient credentials from the metadata server: URLs are signed through
    /// the IAM signBlob API.
    Metadata { email: String },
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobResponse {
    signed_blob: String,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;

        let credentials = match credentials_file {
            Some(path) => {
                let key_json = tokio::fs::read_to_string(path).await?;
                Credentials::ServiceAccount(serde_json::from_str(&key_json)?)
            }
            None => {
                let email = client
                    .get(format!("{METADATA_BASE}/email"))
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                Credentials::Metadata {
                    email: email.trim().to_string(),
                }
            }
        };

        let store = Self {
            bucket: bucket.to_string(),
            client,
            access_token: RwLock::new(CachedToken {
                value: String::new(),
                expires_at: DateTime::<Utc>::MIN_UTC,
            }),
            credentials,
        };

        store.token().await?;
        Ok(store)
    }

    /// Current access token, refreshed a minute before it expires.
    async fn token(&self) -> Result<String, ObjectStoreError> {
        let margin = chrono::Duration::seconds(60);
        {
            let cached = self.access_token.read().await;
            if cached.expires_at > Utc::now() + margin {
                return Ok(cached.value.clone());
            }
        }

        let mut cached = self.access_token.write().await;
        if cached.expires_at > Utc::now() + margin {
            return Ok(cached.value.clone());
        }
        let resp = match &self.credentials {
            Credentials::ServiceAccount(key) => self.token_from_service_account(key).await,
            Credentials::Metadata { .. } => self.token_from_metadata_server().await,
        }
        .map_err(|e| ObjectStoreError::Backend(format!("GCS token refresh failed: {e}")))?;

        tracing::debug!(expires_in = resp.expires_in, "Refreshed GCS access token");
        cached.value = resp.access_token;
        cached.expires_at = Utc::now() + chrono::Duration::seconds(resp.expires_in);
        Ok(cached.value.clone())
    }

    async fn token_from_service_account(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<TokenResponse, anyhow::Error> {
        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        // Build JWT (header.claims.signature)
        let header = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let payload = base64_url_encode(&serde_json::to_vec(&claims)?);
        let unsigned = format!("{header}.{payload}");

        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp)
    }

    async fn token_from_metadata_server(&self) -> Result<TokenResponse, anyhow::Error> {
        let resp: TokenResponse = self
            .client
            .get(format!("{METADATA_BASE}/token"))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp)
    }

    fn signer_email(&self) -> &str {
        match &self.credentials {
            Credentials::ServiceAccount(key) => &key.client_email,
            Credentials::Metadata { email } => email,
        }
    }

    /// RSA-SHA256 signature over `data`, locally or through IAM.
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, ObjectStoreError> {
        match &self.credentials {
            Credentials::ServiceAccount(key) => sign_rs256(data, &key.private_key)
                .map_err(|e| ObjectStoreError::Backend(e.to_string())),
            Credentials::Metadata { email } => {
                let token = self.token().await?;
                let url = format!(
                    "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/{email}:signBlob"
                );
                let resp = self
                    .client
                    .post(url)
                    .bearer_auth(&token)
                    .json(&serde_json::json!({ "payload": base64_encode(data) }))
                    .send()
                    .await
                    .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ObjectStoreError::Backend(format!(
                        "IAM signBlob failed ({status}): {body}"
                    )));
                }

                let signed: SignBlobResponse = resp
                    .json()
                    .await
                    .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
                base64::Engine::decode(&base64::engine::general_purpose::STANDARD, signed.signed_blob)
                    .map_err(|e| ObjectStoreError::Backend(e.to_string()))
            }
        }
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.bucket,
            urlencoding::encode(key)
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/storage/v1/b/{}/o/{}?alt=media",
            self.bucket,
            urlencoding::encode(key)
        )
    }

    fn metadata_url(&self, key: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/storage/v1/b/{}/o/{}",
            self.bucket,
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let token = self.token().await?;

        let resp = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(&token)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let token = self.token().await?;

        let resp = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS download failed ({status}): {body}"
            )));
        }

        resp.bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let token = self.token().await?;

        let resp = self
            .client
            .delete(self.metadata_url(key))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let token = self.token().await?;

        let resp = self
            .client
            .get(self.metadata_url(key))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(ObjectStoreError::Backend(format!(
                "GCS metadata lookup failed ({status})"
            )))
        }
    }

    /// V4 signed GET URL (`GOOG4-RSA-SHA256`).
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        let now = Utc::now();
        let request = V4Request::new(
            &self.bucket,
            key,
            self.signer_email(),
            now,
            ttl.as_secs().clamp(1, MAX_SIGNED_TTL_SECS),
        );
        let signature = self.sign(request.string_to_sign().as_bytes()).await?;
        Ok(request.url(&hex::encode(signature)))
    }

    fn location(&self, key: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/{}/{}",
            self.bucket,
            encode_key_path(key)
        )
    }
}

/// The pieces of a V4 signed request that do not depend on the signature.
struct V4Request {
    canonical_uri: String,
    query: String,
    datetime: String,
    scope: String,
}

impl V4Request {
    fn new(bucket: &str, key: &str, email: &str, now: DateTime<Utc>, expires_secs: u64) -> Self {
        let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{}/auto/storage/goog4_request", now.format("%Y%m%d"));
        let credential = format!("{email}/{scope}");
        let query = format!(
            "X-Goog-Algorithm=GOOG4-RSA-SHA256&X-Goog-Credential={}&X-Goog-Date={datetime}&X-Goog-Expires={expires_secs}&X-Goog-SignedHeaders=host",
            urlencoding::encode(&credential)
        );
        Self {
            canonical_uri: format!("/{bucket}/{}", encode_key_path(key)),
            query,
            datetime,
            scope,
        }
    }

    fn canonical_request(&self) -> String {
        format!(
            "GET\n{}\n{}\nhost:{STORAGE_HOST}\n\nhost\nUNSIGNED-PAYLOAD",
            self.canonical_uri, self.query
        )
    }

    fn string_to_sign(&self) -> String {
        let digest = ring::digest::digest(&ring::digest::SHA256, self.canonical_request().as_bytes());
        format!(
            "GOOG4-RSA-SHA256\n{}\n{}\n{}",
            self.datetime,
            self.scope,
            hex::encode(digest.as_ref())
        )
    }

    fn url(&self, signature_hex: &str) -> String {
        format!(
            "https://{STORAGE_HOST}{}?{}&X-Goog-Signature={signature_hex}",
            self.canonical_uri, self.query
        )
    }
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    // Strip PEM headers and decode base64
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, der_b64.trim())?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_v4_canonical_request() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let request = V4Request::new(
            "bucket",
            "user_files/a b.png",
            "svc@project.iam.gserviceaccount.com",
            now,
            900,
        );
        assert_eq!(request.canonical_uri, "/bucket/user_files/a%20b.png");
        assert_eq!(
            request.canonical_request(),
            "GET\n/bucket/user_files/a%20b.png\n\
             X-Goog-Algorithm=GOOG4-RSA-SHA256&X-Goog-Credential=svc%40project.iam.gserviceaccount.com%2F20240501%2Fauto%2Fstorage%2Fgoog4_request&X-Goog-Date=20240501T123000Z&X-Goog-Expires=900&X-Goog-SignedHeaders=host\n\
             host:storage.googleapis.com\n\nhost\nUNSIGNED-PAYLOAD"
        );
        let to_sign = request.string_to_sign();
        assert!(to_sign.starts_with(
            "GOOG4-RSA-SHA256\n20240501T123000Z\n20240501/auto/storage/goog4_request\n"
        ));
        assert!(request
            .url("abcd")
            .ends_with("&X-Goog-SignedHeaders=host&X-Goog-Signature=abcd"));
    }
}
