//! Reference implementations of the two external collaborators spec §1
//! treats as out-of-scope interfaces: the store driver and the peer
//! transport. Neither is part of the core's contract surface
//! (`librarian-contracts`); these exist only so `main.rs` has something
//! real to wire up rather than leaving the server unable to boot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use librarian_contracts::{
    ByteStream, ContractError, EntryKind, PeerAck, PeerTransport, Result as ContractResult,
    SpaceInfo, StagingToken, StatInfo, StoreDriver, UploadRequest,
};
use librarian_model::FileRecInfo;
use sha2::{Digest as _, Sha256};
use tokio::io::AsyncReadExt;

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        s.push_str(&format!("{b:02x}"));
        s
    })
}

/// A store driver that operates directly on a local (or NFS/Lustre-mounted)
/// filesystem rooted at `path_prefix` — the "local-filesystem" option spec
/// §9's redesign notes sanction in place of the original's SSH-only driver.
pub struct LocalDiskDriver {
    root: PathBuf,
}

impl LocalDiskDriver {
    pub fn new(path_prefix: impl Into<PathBuf>) -> Self {
        Self { root: path_prefix.into() }
    }

    fn resolve(&self, store_path: &str) -> PathBuf {
        self.root.join(store_path.trim_start_matches('/'))
    }
}

#[async_trait]
impl StoreDriver for LocalDiskDriver {
    async fn stat(&self, store_path: &str) -> ContractResult<StatInfo> {
        let path = self.resolve(store_path);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ContractError::NotFound(format!("{store_path}: {e}")))?;

        if meta.is_dir() {
            return Ok(StatInfo { size: 0, digest: String::new(), kind: EntryKind::Directory });
        }

        let mut file = tokio::fs::File::open(&path).await.map_err(ContractError::Io)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await.map_err(ContractError::Io)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(StatInfo {
            size: meta.len() as i64,
            digest: hex_digest(hasher.finalize().as_slice()),
            kind: EntryKind::File,
        })
    }

    /// Shells out to `df -B1`, mirroring the original's `_ssh_slurp('df -B1
    /// %s')` but against the local mount instead of over SSH.
    async fn df(&self) -> ContractResult<SpaceInfo> {
        let output = tokio::process::Command::new("df")
            .arg("-B1")
            .arg(&self.root)
            .output()
            .await
            .map_err(ContractError::Io)?;
        if !output.status.success() {
            return Err(ContractError::Unavailable(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let last = text
            .lines()
            .last()
            .ok_or_else(|| ContractError::Unavailable("df produced no output".into()))?;
        let bits: Vec<&str> = last.split_whitespace().collect();
        let parse = |i: usize| -> ContractResult<i64> {
            bits.get(i)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ContractError::Unavailable(format!("could not parse df output: {last}")))
        };
        let used_bytes = parse(2)?;
        let available_bytes = parse(3)?;
        Ok(SpaceInfo { used_bytes, available_bytes, total_bytes: used_bytes + available_bytes })
    }

    async fn stage(&self, dest_dir: &str) -> ContractResult<StagingToken> {
        let dir = self.resolve(dest_dir);
        tokio::fs::create_dir_all(&dir).await.map_err(ContractError::Io)?;
        let token = format!("{dest_dir}/.staging-{}", uuid::Uuid::new_v4());
        Ok(StagingToken(token))
    }

    async fn write_staged(&self, staged: &StagingToken, mut data: ByteStream) -> ContractResult<()> {
        let path = self.resolve(&staged.0);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ContractError::Io)?;
        }
        let mut file = tokio::fs::File::create(&path).await.map_err(ContractError::Io)?;
        tokio::io::copy(&mut data, &mut file).await.map_err(ContractError::Io)?;
        Ok(())
    }

    async fn commit(&self, staged: &StagingToken, store_path: &str) -> ContractResult<()> {
        let staged_path = self.resolve(&staged.0);
        let final_path = self.resolve(store_path);
        if tokio::fs::metadata(&final_path).await.is_ok() {
            return Err(ContractError::AlreadyExists(store_path.to_string()));
        }
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ContractError::Io)?;
        }
        tokio::fs::rename(&staged_path, &final_path).await.map_err(ContractError::Io)
    }

    async fn unstage(&self, staged: &StagingToken) -> ContractResult<()> {
        let path = self.resolve(&staged.0);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ContractError::Io(e)),
        }
    }

    async fn stream(&self, store_path: &str) -> ContractResult<ByteStream> {
        let path = self.resolve(store_path);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| ContractError::NotFound(format!("{store_path}: {e}")))?;
        Ok(Box::pin(file))
    }

    async fn upload_to(&self, request: UploadRequest) -> ContractResult<()> {
        let source = self.resolve(&request.local_store_path);
        let remote_rel = request
            .remote_store_path
            .clone()
            .unwrap_or_else(|| request.local_store_path.clone());
        let dest = Path::new(&remote_rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ContractError::Io)?;
        }
        tokio::fs::copy(&source, dest).await.map_err(ContractError::Io)?;
        Ok(())
    }
}

/// Announces rec-info to a peer librarian's `create_file_record`-equivalent
/// RPC over plain HTTP. `conn_name` is resolved directly to `http://{conn_name}`
/// — spec's data model carries no peer-address table, so the connection
/// name itself doubles as the peer's host.
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpPeerTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn announce_record(&self, conn_name: &str, rec_info: &FileRecInfo) -> ContractResult<PeerAck> {
        let url = format!("http://{conn_name}/api/v2/gather_file_record");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "rec_info": rec_info }))
            .send()
            .await
            .map_err(|e| ContractError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(PeerAck { accepted: true, message: None })
        } else {
            Ok(PeerAck { accepted: false, message: Some(response.status().to_string()) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_commit_unstage_round_trip() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("source.uv"), b"hello").unwrap();
        let driver = LocalDiskDriver::new(root.path());

        let token = driver.stage("incoming").await.unwrap();
        tokio::fs::copy(root.path().join("source.uv"), driver.resolve(&token.0))
            .await
            .unwrap();

        driver.commit(&token, "2459000/zen.uv").await.unwrap();
        let stat = driver.stat("2459000/zen.uv").await.unwrap();
        assert_eq!(stat.size, 5);
        assert_eq!(stat.kind, EntryKind::File);

        let err = driver.commit(&token, "2459000/zen.uv").await.unwrap_err();
        assert!(matches!(err, ContractError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn write_staged_copies_the_byte_stream_into_the_staged_path() {
        let root = tempfile::tempdir().unwrap();
        let driver = LocalDiskDriver::new(root.path());

        let token = driver.stage("incoming").await.unwrap();
        let body: ByteStream = Box::pin(std::io::Cursor::new(b"from the stream".to_vec()));
        driver.write_staged(&token, body).await.unwrap();

        driver.commit(&token, "2459000/zen.uv").await.unwrap();
        let written = tokio::fs::read(root.path().join("2459000/zen.uv")).await.unwrap();
        assert_eq!(written, b"from the stream");
    }

    #[tokio::test]
    async fn unstage_is_idempotent_on_a_missing_token() {
        let root = tempfile::tempdir().unwrap();
        let driver = LocalDiskDriver::new(root.path());
        let token = StagingToken("nonexistent".into());
        driver.unstage(&token).await.unwrap();
    }

    #[test]
    fn hex_digest_formats_bytes_as_lowercase_hex() {
        assert_eq!(hex_digest(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
        assert_eq!(hex_digest(&[]), "");
    }
}
