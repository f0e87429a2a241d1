//! S3-compatible blob store.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication,
//! using only pure-Rust dependencies (`hmac`, `sha2`) for signing. Supports
//! custom endpoints for S3-compatible services (MinIO, GCS interop).
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};

use crate::config::StoreConfig;
use crate::store::{BlobStore, StoreError};

type HmacSha256 = Hmac<Sha256>;

pub struct S3BlobStore {
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    client: reqwest::Client,
    credentials: AwsCredentials,
}

impl S3BlobStore {
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        Ok(Self {
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
            client: reqwest::Client::new(),
            credentials: AwsCredentials::from_env()?,
        })
    }

    fn host(&self) -> String {
        match &self.endpoint_url {
            Some(endpoint) => endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            None => format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    /// Build and send a SigV4-signed request with an empty payload.
    ///
    /// `key` is the object key (empty for bucket-level operations), `query`
    /// the query parameters, `extra_headers` any amz headers beyond the
    /// signing set (e.g. `x-amz-copy-source`). All headers passed here are
    /// included in the signature.
    async fn signed_request(
        &self,
        method: Method,
        key: &str,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
    ) -> Result<reqwest::Response, StoreError> {
        let host = self.host();
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}", encoded_key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(b"");

        let mut sorted_query = query.to_vec();
        sorted_query.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring: String = sorted_query
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        for (k, v) in extra_headers {
            headers.push((k.to_lowercase(), v.clone()));
        }
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_querystring,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date_stamp,
            &self.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.credentials.access_key_id, credential_scope, signed_headers, signature
        );

        let url = if canonical_querystring.is_empty() {
            format!("https://{}{}", host, canonical_uri)
        } else {
            format!("https://{}{}?{}", host, canonical_uri, canonical_querystring)
        };

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        for (k, v) in extra_headers {
            req = req.header(k, v);
        }
        if let Some(token) = &self.credentials.session_token {
            req = req.header("x-amz-security-token", token);
        }

        req.send()
            .await
            .map_err(|e| StoreError::Storage(format!("request to s3://{}/{} failed: {}", self.bucket, key, e)))
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>), StoreError> {
        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), "1000".to_string()),
        ];
        if !prefix.is_empty() {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(token) = continuation_token {
            query.push(("continuation-token".to_string(), token.to_string()));
        }

        let resp = self.signed_request(Method::GET, "", &query, &[]).await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Storage(format!(
                "S3 ListObjectsV2 failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let xml = resp
            .text()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let mut keys = Vec::new();
        let mut remaining = xml.as_str();
        while let Some(start) = remaining.find("<Contents>") {
            let block_start = start + "<Contents>".len();
            let Some(end) = remaining[block_start..].find("</Contents>") else {
                break;
            };
            let block = &remaining[block_start..block_start + end];
            if let Some(key) = extract_xml_value(block, "Key") {
                // Skip directory placeholder objects
                if !key.is_empty() && !key.ends_with('/') {
                    keys.push(key);
                }
            }
            remaining = &remaining[block_start + end + "</Contents>".len()..];
        }

        let truncated = extract_xml_value(&xml, "IsTruncated")
            .map(|v| v == "true")
            .unwrap_or(false);
        let next_token = if truncated {
            extract_xml_value(&xml, "NextContinuationToken")
        } else {
            None
        };

        Ok((keys, next_token))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let (batch, next) = self.list_page(prefix, token.as_deref()).await?;
            keys.extend(batch);
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let resp = self.signed_request(Method::GET, key, &[], &[]).await?;
        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Storage(format!(
                "S3 GetObject failed (HTTP {}) for key '{}'",
                status, key
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let resp = self.signed_request(Method::HEAD, key, &[], &[]).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        if status.as_u16() == 404 {
            return Ok(false);
        }
        Err(StoreError::Storage(format!(
            "S3 HeadObject failed (HTTP {}) for key '{}'",
            status, key
        )))
    }

    async fn copy(&self, source_key: &str, target_key: &str) -> Result<(), StoreError> {
        let copy_source = format!(
            "/{}/{}",
            self.bucket,
            source_key
                .split('/')
                .map(uri_encode)
                .collect::<Vec<_>>()
                .join("/")
        );
        let headers = vec![("x-amz-copy-source".to_string(), copy_source)];
        let resp = self
            .signed_request(Method::PUT, target_key, &[], &headers)
            .await?;
        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(StoreError::NotFound {
                key: source_key.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Storage(format!(
                "S3 CopyObject failed (HTTP {}) for '{}' -> '{}': {}",
                status,
                source_key,
                target_key,
                body.chars().take(500).collect::<String>()
            )));
        }
        // CopyObject can return 200 with an error document in the body.
        let body = resp.text().await.unwrap_or_default();
        if body.contains("<Error>") {
            return Err(StoreError::Storage(format!(
                "S3 CopyObject returned an error body for '{}' -> '{}'",
                source_key, target_key
            )));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        // S3 DeleteObject returns 204 whether or not the key existed, so an
        // existence probe runs first to preserve the boolean contract.
        if !self.exists(key).await? {
            return Ok(false);
        }
        let resp = self.signed_request(Method::DELETE, key, &[], &[]).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        Err(StoreError::Storage(format!(
            "S3 DeleteObject failed (HTTP {}) for key '{}'",
            status, key
        )))
    }
}

// ============ AWS Credentials ============

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> anyhow::Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| anyhow::anyhow!("AWS_ACCESS_KEY_ID environment variable not set"))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| anyhow::anyhow!("AWS_SECRET_ACCESS_KEY environment variable not set"))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ AWS SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Extract the text content of an XML tag (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)?;
    let value_start = start + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(xml[value_start..value_start + end].to_string())
}
