use crate::traits::{normalize_key, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use ssh2::{ErrorCode, Session, Sftp};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// LIBSSH2_FX_NO_SUCH_FILE
const NO_SUCH_FILE: i32 = 2;

/// Connection settings of an SFTP server.
///
/// With `private_key` set, public key authentication is used and `password` is
/// ignored.
#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
    /// Remote directory all keys live under
    pub root: String,
    pub timeout: Duration,
}

/// SFTP storage implementation, one SSH session per operation
#[derive(Debug, Clone)]
pub struct SftpStorage {
    config: SftpConfig,
}

fn backend(e: ssh2::Error) -> StorageError {
    StorageError::BackendError(e.to_string())
}

fn is_missing(e: &ssh2::Error) -> bool {
    matches!(e.code(), ErrorCode::SFTP(NO_SUCH_FILE))
}

impl SftpStorage {
    pub fn new(config: SftpConfig) -> StorageResult<Self> {
        if config.host.trim().is_empty() {
            return Err(StorageError::ConfigError("SFTP host must not be empty".to_string()));
        }
        if config.password.is_none() && config.private_key.is_none() {
            return Err(StorageError::ConfigError(
                "SFTP needs either a password or a private_key".to_string(),
            ));
        }
        Ok(Self { config })
    }

    fn remote_path(&self, path: &str) -> StorageResult<PathBuf> {
        let key = normalize_key(path)?;
        Ok(PathBuf::from(format!(
            "{}/{}",
            self.config.root.trim_end_matches('/'),
            key
        )))
    }

    async fn session<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> StorageResult<T> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let session = connect(&config)?;
            let sftp = session.sftp().map_err(backend)?;
            let result = f(&sftp);
            let _ = session.disconnect(None, "done", None);
            result
        })
        .await
        .map_err(|e| StorageError::BackendError(format!("sftp task failed: {}", e)))?
    }
}

fn connect(config: &SftpConfig) -> StorageResult<Session> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| StorageError::ConfigError(format!("cannot resolve SFTP host `{}`", config.host)))?;
    let tcp = TcpStream::connect_timeout(&addr, config.timeout)?;

    let mut session = Session::new().map_err(backend)?;
    session.set_timeout(config.timeout.as_millis().min(u32::MAX as u128) as u32);
    session.set_tcp_stream(tcp);
    session.handshake().map_err(backend)?;

    match (&config.private_key, &config.password) {
        (Some(key), _) => session
            .userauth_pubkey_file(&config.username, None, key, config.passphrase.as_deref())
            .map_err(backend)?,
        (None, Some(password)) => session
            .userauth_password(&config.username, password)
            .map_err(backend)?,
        (None, None) => {
            return Err(StorageError::ConfigError(
                "SFTP needs either a password or a private_key".to_string(),
            ))
        }
    }
    Ok(session)
}

/// Create the missing parents of `remote`; existing directories are not an error
fn ensure_parents(sftp: &Sftp, remote: &Path) {
    let mut ancestors: Vec<&Path> = remote.ancestors().skip(1).collect();
    ancestors.reverse();
    for dir in ancestors {
        if dir.as_os_str().is_empty() || dir == Path::new("/") {
            continue;
        }
        if sftp.stat(dir).is_err() {
            let _ = sftp.mkdir(dir, 0o755);
        }
    }
}

#[async_trait]
impl Storage for SftpStorage {
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<u64> {
        let remote = self.remote_path(path)?;
        let size = data.len() as u64;
        let start = Instant::now();

        self.session(move |sftp| {
            ensure_parents(sftp, &remote);
            let mut file = sftp
                .create(&remote)
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            file.write_all(&data)?;
            Ok(())
        })
        .await?;

        tracing::info!(
            host = %self.config.host,
            key = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "SFTP write successful"
        );
        Ok(size)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let remote = self.remote_path(path)?;
        let missing = path.to_string();
        self.session(move |sftp| {
            let mut file = match sftp.open(&remote) {
                Ok(file) => file,
                Err(e) if is_missing(&e) => return Err(StorageError::NotFound(missing)),
                Err(e) => return Err(StorageError::ReadFailed(e.to_string())),
            };
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            Ok(Bytes::from(data))
        })
        .await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let remote = self.remote_path(path)?;
        self.session(move |sftp| match sftp.stat(&remote) {
            Ok(stat) => Ok(stat.is_file()),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(backend(e)),
        })
        .await
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        let remote = self.remote_path(path)?;
        self.session(move |sftp| match sftp.unlink(&remote) {
            Ok(()) => Ok(true),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "sftp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SftpConfig {
        SftpConfig {
            host: "sftp.example.com".to_string(),
            port: 22,
            username: "files".to_string(),
            password: Some("secret".to_string()),
            private_key: None,
            passphrase: None,
            root: "/srv/files".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_remote_path() {
        let storage = SftpStorage::new(config()).unwrap();
        assert_eq!(
            storage.remote_path("a/b.png").unwrap(),
            PathBuf::from("/srv/files/a/b.png")
        );
        assert!(matches!(
            storage.remote_path("/b.png"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_credentials_required() {
        let mut config = config();
        config.password = None;
        assert!(matches!(SftpStorage::new(config.clone()), Err(StorageError::ConfigError(_))));

        config.private_key = Some(PathBuf::from("/home/files/.ssh/id_ed25519"));
        assert!(SftpStorage::new(config).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let mut config = config();
        config.host = "127.0.0.1".to_string();
        config.port = 1;
        config.timeout = Duration::from_millis(200);
        let storage = SftpStorage::new(config).unwrap();
        assert!(storage.read("a.png").await.is_err());
    }
}
