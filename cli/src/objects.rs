use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use fitpulse_core::objects::ObjectStore;

type HmacSha256 = Hmac<Sha256>;

/// Object store backed by a directory, serving signed, expiring URLs.
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
    secret: String,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, base_url: &str, secret: String) -> Self {
        Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("Invalid object key '{key}'");
        }
        Ok(self.root.join(rel))
    }

    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| anyhow!("Invalid object signing key"))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    fn signature(&self, key: &str, expires: i64) -> Result<String> {
        Ok(hex::encode(self.mac(key, expires)?.finalize().into_bytes()))
    }

    /// True when `sig` was issued for `key` and `expires` is still ahead of `now`.
    /// The comparison is constant-time.
    pub fn verify(&self, key: &str, expires: i64, sig: &str, now: i64) -> bool {
        if expires <= now {
            return false;
        }
        let Ok(sig) = hex::decode(sig) else {
            return false;
        };
        self.mac(key, expires)
            .is_ok_and(|mac| mac.verify_slice(&sig).is_ok())
    }

    pub async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    async fn presign_download_url(&self, key: &str, ttl_seconds: u64) -> Result<String> {
        self.path_for(key)?;
        let ttl = i64::try_from(ttl_seconds).context("TTL out of range")?;
        let expires = Utc::now().timestamp() + ttl;
        let sig = self.signature(key, expires)?;
        Ok(format!(
            "{}/objects/{key}?expires={expires}&sig={sig}",
            self.base_url
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> LocalObjectStore {
        LocalObjectStore::new(dir.to_path_buf(), "http://127.0.0.1:8080/", "s3cret".into())
    }

    #[tokio::test]
    async fn test_put_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = store(tmp.path());
        objects
            .put_object("users/u1/meals/1_abc.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        let bytes = objects.read_object("users/u1/meals/1_abc.jpg").await.unwrap();
        assert_eq!(bytes, Some(vec![1, 2, 3]));
        assert!(objects.read_object("users/u1/meals/none.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = store(tmp.path());
        assert!(objects.put_object("../escape", vec![1], "image/png").await.is_err());
        assert!(objects.put_object("/etc/passwd", vec![1], "image/png").await.is_err());
    }

    #[tokio::test]
    async fn test_presigned_url_verifies() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = store(tmp.path());
        let url = objects
            .presign_download_url("users/u1/profile/1_ab.png", 60)
            .await
            .unwrap();
        assert!(url.starts_with("http://127.0.0.1:8080/objects/users/u1/profile/1_ab.png?expires="));

        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut sig = "";
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("sig", v) => sig = v,
                _ => {}
            }
        }
        let now = Utc::now().timestamp();
        assert!(objects.verify("users/u1/profile/1_ab.png", expires, sig, now));
        assert!(!objects.verify("users/u2/profile/1_ab.png", expires, sig, now));
        assert!(!objects.verify("users/u1/profile/1_ab.png", expires, sig, expires + 1));
    }

    #[test]
    fn test_signature_is_hmac_sha256() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = store(tmp.path());
        let mut mac = HmacSha256::new_from_slice(b"s3cret").unwrap();
        mac.update(b"users/u1/meals/1_abc.jpg\n4102444800");
        let expected = hex::encode(mac.finalize().into_bytes());

        let sig = objects.signature("users/u1/meals/1_abc.jpg", 4_102_444_800).unwrap();
        assert_eq!(sig, expected);
        assert!(objects.verify("users/u1/meals/1_abc.jpg", 4_102_444_800, &sig, 0));

        // Same length, one digit changed; also not hex at all
        let mut tampered = sig.clone().into_bytes();
        tampered[0] = if tampered[0] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(!objects.verify("users/u1/meals/1_abc.jpg", 4_102_444_800, &tampered, 0));
        assert!(!objects.verify("users/u1/meals/1_abc.jpg", 4_102_444_800, "zz", 0));

        let other = LocalObjectStore::new(tmp.path().to_path_buf(), "http://x", "other".into());
        assert!(!other.verify("users/u1/meals/1_abc.jpg", 4_102_444_800, &sig, 0));
    }
}
