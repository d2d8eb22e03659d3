//! S3-compatible object store adapter.
//!
//! Talks to AWS S3 or MinIO using path-style URLs (`{endpoint}/{bucket}/{key}`).
//! Requests are signed by hand with Signature V4 so no SDK is needed; XML
//! bodies are decoded with quick-xml.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use md5::Md5;
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use tracing::debug;

use bucketfs_common::documents::StoreConfig;
use bucketfs_common::store::{split_path, ObjectRecord, ObjectStore, StoreError};

use super::listing_cache::ListingCache;
use super::sigv4::{self, CanonicalRequest, Credentials};
use super::StoreProvider;

/// DeleteObjects accepts at most this many keys per request.
const DELETE_BATCH: usize = 1000;

pub struct S3Store {
    client: Client,
    endpoint: String,
    region: String,
    credentials: Credentials,
    cache: ListingCache,
}

struct S3Request<'a> {
    method: Method,
    bucket: &'a str,
    key: &'a str,
    query: Vec<(&'static str, String)>,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

impl<'a> S3Request<'a> {
    fn new(method: Method, bucket: &'a str, key: &'a str) -> Self {
        Self {
            method,
            bucket,
            key,
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    fn query(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

// ── XML documents ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListedObject>,
    #[serde(default)]
    common_prefixes: Vec<CommonPrefix>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommonPrefix {
    prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAllMyBucketsResult {
    #[serde(default)]
    buckets: BucketList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketList {
    #[serde(default)]
    bucket: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "Delete")]
struct DeleteRequest {
    #[serde(rename = "Quiet")]
    quiet: bool,
    #[serde(rename = "Object")]
    objects: Vec<DeleteTarget>,
}

#[derive(Debug, Serialize)]
struct DeleteTarget {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteResult {
    #[serde(default, rename = "Error")]
    errors: Vec<DeleteFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteFailure {
    key: String,
    code: String,
    #[serde(default)]
    message: String,
}

fn parse_xml<'de, T: Deserialize<'de>>(body: &'de str) -> Result<T, StoreError> {
    quick_xml::de::from_str(body).map_err(|e| StoreError::Malformed(e.to_string()))
}

impl S3Store {
    pub fn new(
        endpoint: &str,
        region: &str,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: region.to_string(),
            credentials,
            cache: ListingCache::new(),
        })
    }

    fn uri(bucket: &str, key: &str) -> String {
        if bucket.is_empty() {
            "/".to_string()
        } else if key.is_empty() {
            format!("/{}", urlencoding::encode(bucket))
        } else {
            format!("/{}/{}", urlencoding::encode(bucket), sigv4::encode_key(key))
        }
    }

    /// Sign and send a request. Non-success statuses become a [`StoreError`].
    async fn send(&self, request: S3Request<'_>) -> Result<Response, StoreError> {
        let now = Utc::now();
        let (date_time, _) = sigv4::amz_date(now);
        let uri = Self::uri(request.bucket, request.key);
        let query = sigv4::canonical_query(&request.query);
        let payload_hash = sigv4::payload_hash(&request.body);

        let mut headers = request.headers;
        headers.insert("host".to_string(), sigv4::url_host(&self.endpoint));
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), date_time);
        if let Some(ref token) = self.credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let auth = sigv4::authorization(
            &self.credentials,
            &self.region,
            &CanonicalRequest {
                method: request.method.as_str(),
                uri: &uri,
                query: &query,
                headers: &headers,
                payload_hash: &payload_hash,
            },
            now,
        );

        let mut url = format!("{}{}", self.endpoint, uri);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header("Authorization", auth);
        for (name, value) in &headers {
            // reqwest derives Host from the URL
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        let resp = builder.body(request.body).send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(error_from_response(resp, request.bucket, request.key).await)
    }

    /// ListObjectsV2, following continuation tokens. Returns (keys, common prefixes).
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimited: bool,
    ) -> Result<(Vec<String>, Vec<String>), StoreError> {
        let mut keys = Vec::new();
        let mut prefixes = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut request = S3Request::new(Method::GET, bucket, "")
                .query("list-type", "2")
                .query("prefix", prefix);
            if delimited {
                request = request.query("delimiter", "/");
            }
            if let Some(ref t) = token {
                request = request.query("continuation-token", t.clone());
            }

            let body = self.send(request).await?.text().await?;
            let page: ListBucketResult = parse_xml(&body)?;
            keys.extend(page.contents.into_iter().map(|o| o.key));
            prefixes.extend(page.common_prefixes.into_iter().map(|p| p.prefix));

            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }

        Ok((keys, prefixes))
    }

    fn cached_exists(&self, path: &str) -> Option<bool> {
        let parent = &path[..=path.rfind('/')?];
        let records = self.cache.get(parent)?;
        Some(records.iter().any(|r| r.key == path))
    }
}

async fn error_from_response(resp: Response, bucket: &str, key: &str) -> StoreError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let (code, message) = match quick_xml::de::from_str::<ErrorBody>(&body) {
        Ok(err) => (err.code, err.message),
        Err(_) => (format!("HTTP{}", status), body),
    };
    let path = if key.is_empty() {
        bucket.to_string()
    } else {
        format!("{}/{}", bucket, key)
    };

    match status {
        404 => StoreError::NotFound(path),
        401 | 403 => StoreError::AccessDenied(if message.is_empty() { code } else { message }),
        _ => StoreError::Service {
            status,
            code,
            message,
        },
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let body = self
            .send(S3Request::new(Method::GET, "", ""))
            .await?
            .text()
            .await?;
        let result: ListAllMyBucketsResult = parse_xml(&body)?;
        Ok(result.buckets.bucket.into_iter().map(|b| b.name).collect())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<ObjectRecord>, StoreError> {
        if let Some(records) = self.cache.get(path) {
            return Ok(records);
        }

        let records: Vec<ObjectRecord> = if path.is_empty() {
            self.list_buckets()
                .await?
                .into_iter()
                .map(|bucket| ObjectRecord::directory(format!("{}/", bucket)))
                .collect()
        } else {
            let (bucket, prefix) = split_path(path);
            let (keys, prefixes) = self.list_objects(bucket, prefix, true).await?;
            keys.into_iter()
                .map(|key| {
                    let full = format!("{}/{}", bucket, key);
                    if key.ends_with('/') {
                        ObjectRecord::directory(full)
                    } else {
                        ObjectRecord::file(full)
                    }
                })
                .chain(
                    prefixes
                        .into_iter()
                        .map(|p| ObjectRecord::directory(format!("{}/{}", bucket, p))),
                )
                .collect()
        };

        debug!(prefix = %path, count = records.len(), "S3 listing");
        self.cache.put(path, records.clone());
        Ok(records)
    }

    async fn walk(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let (bucket, prefix) = split_path(path);
        let (keys, _) = self.list_objects(bucket, prefix, false).await?;
        Ok(keys
            .into_iter()
            .map(|key| format!("{}/{}", bucket, key))
            .collect())
    }

    async fn get(&self, path: &str) -> Result<Bytes, StoreError> {
        let (bucket, key) = split_path(path);
        if key.is_empty() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        let resp = self.send(S3Request::new(Method::GET, bucket, key)).await?;
        Ok(resp.bytes().await?)
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        let (bucket, key) = split_path(path);
        if key.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let size = data.len();
        self.send(
            S3Request::new(Method::PUT, bucket, key)
                .header("content-type", "application/octet-stream")
                .body(data),
        )
        .await?;
        self.cache.clear();
        debug!(path = %path, size, "S3 upload complete");
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let (src_bucket, src_key) = split_path(src);
        let (dst_bucket, dst_key) = split_path(dst);
        if src_key.is_empty() || dst_key.is_empty() {
            return Err(StoreError::InvalidPath(format!("{} -> {}", src, dst)));
        }
        let source = format!("/{}/{}", src_bucket, sigv4::encode_key(src_key));
        self.send(S3Request::new(Method::PUT, dst_bucket, dst_key).header("x-amz-copy-source", source))
            .await?;
        self.cache.clear();
        debug!(src = %src, dst = %dst, "S3 copy complete");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let (bucket, key) = split_path(path);
        let result = self.send(S3Request::new(Method::DELETE, bucket, key)).await;
        self.cache.clear();
        match result {
            Ok(_) => {}
            // Deleting an absent object is not an error; a missing bucket is.
            Err(StoreError::NotFound(_)) if !key.is_empty() => {}
            Err(e) => return Err(e),
        }
        debug!(path = %path, "S3 delete complete");
        Ok(())
    }

    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError> {
        for batch in keys.chunks(DELETE_BATCH) {
            let request = DeleteRequest {
                quiet: true,
                objects: batch.iter().map(|k| DeleteTarget { key: k.clone() }).collect(),
            };
            let xml = quick_xml::se::to_string(&request)
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
            let md5 = base64::engine::general_purpose::STANDARD.encode(Md5::digest(xml.as_bytes()));

            let body = self
                .send(
                    S3Request::new(Method::POST, bucket, "")
                        .query("delete", "")
                        .header("content-md5", md5)
                        .header("content-type", "application/xml")
                        .body(Bytes::from(xml)),
                )
                .await?
                .text()
                .await?;
            self.cache.clear();

            let result: DeleteResult = if body.trim().is_empty() {
                DeleteResult::default()
            } else {
                parse_xml(&body)?
            };
            if let Some(failure) = result.errors.into_iter().next() {
                return Err(StoreError::Service {
                    status: 200,
                    code: failure.code,
                    message: format!("{}: {}", failure.key, failure.message),
                });
            }
        }
        debug!(bucket = %bucket, count = keys.len(), "S3 bulk delete complete");
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let (bucket, key) = split_path(path);
        if !key.is_empty() {
            if let Some(found) = self.cached_exists(path) {
                return Ok(found);
            }
        }
        match self.send(S3Request::new(Method::HEAD, bucket, key)).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let mut request = S3Request::new(Method::PUT, bucket, "");
        if self.region != "us-east-1" {
            request = request.body(Bytes::from(format!(
                "<CreateBucketConfiguration><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                self.region
            )));
        }
        let result = self.send(request).await;
        self.cache.clear();
        match result {
            Ok(_) => {}
            Err(StoreError::Service { ref code, .. }) if code == "BucketAlreadyOwnedByYou" => {}
            Err(e) => return Err(e),
        }
        debug!(bucket = %bucket, "S3 bucket ready");
        Ok(())
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

/// Builds [`S3Store`] handles from a store config.
pub struct S3Provider {
    region: String,
    timeout: Duration,
}

impl S3Provider {
    pub fn new(region: &str, timeout: Duration) -> Self {
        Self {
            region: region.to_string(),
            timeout,
        }
    }
}

impl StoreProvider for S3Provider {
    fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
        let (endpoint, credentials) = if config.is_explicit() {
            (
                config.url.clone(),
                Credentials {
                    access_key_id: config.access_key.clone(),
                    secret_access_key: config.secret_key.clone(),
                    session_token: None,
                },
            )
        } else {
            let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
            let credentials = ambient_credentials(var)?;
            let endpoint = ambient_endpoint(config, &self.region, var);
            (endpoint, credentials)
        };
        Ok(Arc::new(S3Store::new(
            &endpoint,
            &self.region,
            credentials,
            self.timeout,
        )?))
    }
}

/// Credentials from the process environment.
fn ambient_credentials<F>(var: F) -> Result<Credentials, StoreError>
where
    F: Fn(&str) -> Option<String>,
{
    match (var("AWS_ACCESS_KEY_ID"), var("AWS_SECRET_ACCESS_KEY")) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token: var("AWS_SESSION_TOKEN"),
        }),
        _ => Err(StoreError::MissingCredentials),
    }
}

fn ambient_endpoint<F>(config: &StoreConfig, region: &str, var: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    var("AWS_ENDPOINT_URL_S3")
        .or_else(|| var("AWS_ENDPOINT_URL"))
        .or_else(|| Some(config.url.clone()).filter(|u| !u.is_empty()))
        .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", region))
}
