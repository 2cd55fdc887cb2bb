use crate::traits::{normalize_key, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::net::ToSocketAddrs;
use std::time::{Duration, Instant};
use suppaftp::types::{FileType, FtpError, Mode};
use suppaftp::{FtpStream, Status};

/// Connection settings of an FTP server
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Remote directory all keys live under
    pub root: String,
    pub passive: bool,
    pub timeout: Duration,
}

/// FTP storage implementation.
///
/// The control connection is opened per operation on a blocking thread, so an idle
/// adapter holds no sockets.
#[derive(Debug, Clone)]
pub struct FtpStorage {
    config: FtpConfig,
}

fn backend(e: FtpError) -> StorageError {
    StorageError::BackendError(e.to_string())
}

fn is_unavailable(e: &FtpError) -> bool {
    matches!(e, FtpError::UnexpectedResponse(response) if matches!(response.status, Status::FileUnavailable))
}

impl FtpStorage {
    pub fn new(config: FtpConfig) -> StorageResult<Self> {
        if config.host.trim().is_empty() {
            return Err(StorageError::ConfigError("FTP host must not be empty".to_string()));
        }
        Ok(Self { config })
    }

    fn remote_path(&self, path: &str) -> StorageResult<String> {
        let key = normalize_key(path)?;
        Ok(format!("{}/{}", self.config.root.trim_end_matches('/'), key))
    }

    async fn session<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> StorageResult<T> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut ftp = connect(&config)?;
            let result = f(&mut ftp);
            let _ = ftp.quit();
            result
        })
        .await
        .map_err(|e| StorageError::BackendError(format!("ftp task failed: {}", e)))?
    }
}

fn connect(config: &FtpConfig) -> StorageResult<FtpStream> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| StorageError::ConfigError(format!("cannot resolve FTP host `{}`", config.host)))?;
    let mut ftp = FtpStream::connect_timeout(addr, config.timeout).map_err(backend)?;
    ftp.login(&config.username, &config.password).map_err(backend)?;
    ftp.transfer_type(FileType::Binary).map_err(backend)?;
    ftp.set_mode(if config.passive { Mode::Passive } else { Mode::Active });
    Ok(ftp)
}

/// Create the missing parents of `remote`; existing directories are not an error
fn ensure_parents(ftp: &mut FtpStream, remote: &str) {
    let Some((parent, _)) = remote.rsplit_once('/') else {
        return;
    };
    let mut dir = String::new();
    for segment in parent.split('/').filter(|s| !s.is_empty()) {
        dir.push('/');
        dir.push_str(segment);
        let _ = ftp.mkdir(&dir);
    }
}

#[async_trait]
impl Storage for FtpStorage {
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<u64> {
        let remote = self.remote_path(path)?;
        let size = data.len() as u64;
        let start = Instant::now();

        self.session(move |ftp| {
            ensure_parents(ftp, &remote);
            ftp.put_file(&remote, &mut Cursor::new(data))
                .map_err(|e| StorageError::WriteFailed(e.to_string()))
        })
        .await?;

        tracing::info!(
            host = %self.config.host,
            key = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "FTP write successful"
        );
        Ok(size)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let remote = self.remote_path(path)?;
        let missing = path.to_string();
        self.session(move |ftp| match ftp.retr_as_buffer(&remote) {
            Ok(buffer) => Ok(Bytes::from(buffer.into_inner())),
            Err(e) if is_unavailable(&e) => Err(StorageError::NotFound(missing)),
            Err(e) => Err(StorageError::ReadFailed(e.to_string())),
        })
        .await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let remote = self.remote_path(path)?;
        self.session(move |ftp| match ftp.size(&remote) {
            Ok(_) => Ok(true),
            Err(e) if is_unavailable(&e) => Ok(false),
            Err(e) => Err(backend(e)),
        })
        .await
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        let remote = self.remote_path(path)?;
        self.session(move |ftp| match ftp.rm(&remote) {
            Ok(()) => Ok(true),
            Err(e) if is_unavailable(&e) => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "ftp"
    }
}
