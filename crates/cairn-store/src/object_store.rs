//! The low-level key-value/file store underlying every overlay. Treated
//! as an external, swappable collaborator — the core only ever depends
//! on the [`ObjectStore`] trait.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use cairn_core::Result;

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Filesystem-backed [`ObjectStore`]. Keys map to files under `root`,
/// with `/` in a key treated as a path separator.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        tokio::fs::read(&path)
            .await
            .map_err(|e| cairn_core::Error::NotFound(format!("{key}: {e}")))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        list_recursive(&self.path_for(prefix), prefix, &mut out).await?;
        out.sort();
        Ok(out)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}

/// Walk `dir` (on disk at `path_for(key_prefix)`) depth-first, collecting
/// every file's key relative to the store root. Boxed because async fns
/// can't recurse directly.
fn list_recursive<'a>(
    dir: &'a Path,
    key_prefix: &'a str,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
            let key = format!("{key_prefix}/{name}");
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                list_recursive(&entry.path(), &key, out).await?;
            } else if file_type.is_file() {
                out.push(key);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("a/b.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a/b.txt").await.unwrap(), b"hello");
        assert!(store.exists("a/b.txt").await.unwrap());
    }

    #[tokio::test]
    async fn local_store_get_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn local_store_delete_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("x", b"1".to_vec()).await.unwrap();
        store.delete("x").await.unwrap();
        store.delete("x").await.unwrap();
        assert!(!store.exists("x").await.unwrap());
    }

    #[tokio::test]
    async fn local_store_list_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("agents/one", b"1".to_vec()).await.unwrap();
        store.put("agents/two", b"2".to_vec()).await.unwrap();
        let listed = store.list("agents").await.unwrap();
        assert_eq!(listed, vec!["agents/one".to_string(), "agents/two".to_string()]);
    }

    #[tokio::test]
    async fn local_store_list_recurses_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("overlay/agent-1/files/a.txt", b"1".to_vec()).await.unwrap();
        store.put("overlay/agent-1/files/dir/b.txt", b"2".to_vec()).await.unwrap();
        store.put("overlay/agent-1/files/dir/nested/c.txt", b"3".to_vec()).await.unwrap();

        let listed = store.list("overlay/agent-1/files").await.unwrap();
        assert_eq!(
            listed,
            vec![
                "overlay/agent-1/files/a.txt".to_string(),
                "overlay/agent-1/files/dir/b.txt".to_string(),
                "overlay/agent-1/files/dir/nested/c.txt".to_string(),
            ]
        );
    }
}
