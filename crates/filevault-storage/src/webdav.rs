use crate::traits::{normalize_key, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};

/// WebDAV storage implementation
#[derive(Debug, Clone)]
pub struct WebDavStorage {
    client: Client,
    base_url: String,
    prefix: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl WebDavStorage {
    pub fn new(
        base_url: String,
        username: Option<String>,
        password: Option<String>,
        prefix: Option<String>,
    ) -> StorageResult<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(StorageError::ConfigError(format!(
                "WebDAV base URL must be http(s), got `{}`",
                base_url
            )));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix: prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            username,
            password,
        })
    }

    fn remote_path(&self, path: &str) -> StorageResult<String> {
        let key = normalize_key(path)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key,
        })
    }

    fn url(&self, remote_path: &str) -> String {
        format!("{}/{}", self.base_url, remote_path)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    /// Create every missing collection on the way to `remote_path`
    async fn ensure_collections(&self, remote_path: &str) -> StorageResult<()> {
        let segments: Vec<&str> = remote_path.split('/').collect();
        let mut current = String::new();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);

            let mkcol = Method::from_bytes(b"MKCOL")
                .map_err(|e| StorageError::BackendError(e.to_string()))?;
            let response = self
                .request(mkcol, &format!("{}/", self.url(&current)))
                .send()
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?;
            // 405: collection already exists
            if !response.status().is_success()
                && response.status() != StatusCode::METHOD_NOT_ALLOWED
            {
                return Err(StorageError::WriteFailed(format!(
                    "MKCOL {} returned {}",
                    current,
                    response.status()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for WebDavStorage {
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let remote_path = self.remote_path(key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.ensure_collections(&remote_path).await?;

        let response = self
            .request(Method::PUT, &self.url(&remote_path))
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        if !response.status().is_success() {
            tracing::error!(
                key = %key,
                status = %response.status(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "WebDAV write failed"
            );
            return Err(StorageError::WriteFailed(format!(
                "PUT {} returned {}",
                remote_path,
                response.status()
            )));
        }

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "WebDAV write successful"
        );

        Ok(size)
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let remote_path = self.remote_path(key)?;
        let response = self
            .request(Method::GET, &self.url(&remote_path))
            .send()
            .await
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| StorageError::ReadFailed(e.to_string())),
            status => Err(StorageError::ReadFailed(format!(
                "GET {} returned {}",
                remote_path, status
            ))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let remote_path = self.remote_path(key)?;
        let response = self
            .request(Method::HEAD, &self.url(&remote_path))
            .send()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StorageError::BackendError(format!(
                "HEAD {} returned {}",
                remote_path, status
            ))),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let remote_path = self.remote_path(key)?;
        let response = self
            .request(Method::DELETE, &self.url(&remote_path))
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => {
                tracing::info!(key = %key, "WebDAV delete successful");
                Ok(true)
            }
            status => Err(StorageError::DeleteFailed(format!(
                "DELETE {} returned {}",
                remote_path, status
            ))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "webdav"
    }
}
