//! Per-agent content+KV storage with read-through fall-through to a base
//! overlay (spec §4.2). The stable overlay is just a [`FileOverlay`] with
//! no base; every agent overlay is a [`FileOverlay`] whose base is the
//! stable overlay.
//!
//! Reads resolve local-first, then fall through to `base`. Writes only
//! ever touch the local layer — "the overlay never writes through".
//! Deletion removes the local entry outright: this model keeps no
//! tombstones, so a deleted local file becomes visible again at
//! whatever the base holds for that path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use cairn_core::{Error, Result};

use crate::object_store::ObjectStore;

pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// A single file change within an overlay's local layer.
#[derive(Debug, Clone)]
pub enum OverlayEntry {
    /// File already existed in the base layer; this overlay modified it.
    Modified { content: Vec<u8>, hash: String },
    /// File did not exist in the base layer when this overlay wrote it.
    Added { content: Vec<u8>, hash: String },
}

impl OverlayEntry {
    pub fn content(&self) -> &[u8] {
        match self {
            Self::Modified { content, .. } | Self::Added { content, .. } => content,
        }
    }

    pub fn hash(&self) -> &str {
        match self {
            Self::Modified { hash, .. } | Self::Added { hash, .. } => hash,
        }
    }

    fn change_type_str(&self) -> &'static str {
        match self {
            Self::Modified { .. } => "modified",
            Self::Added { .. } => "added",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stat {
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub is_file: bool,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Normalize a readdir root: both `"/"` and `""`/`"."` mean "the root".
fn normalize_root(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        String::new()
    } else {
        trimmed.to_string()
    }
}

fn key_prefix(kind: &str, overlay_id: &str) -> String {
    format!("overlay/{overlay_id}/{kind}")
}

/// An isolated overlay: a file namespace and a KV namespace, both
/// falling through to `base` on local miss.
pub struct FileOverlay {
    id: String,
    entries: DashMap<String, OverlayEntry>,
    kv: DashMap<String, String>,
    base: Option<Arc<FileOverlay>>,
    store: Arc<dyn ObjectStore>,
}

impl FileOverlay {
    pub fn new(id: impl Into<String>, store: Arc<dyn ObjectStore>, base: Option<Arc<FileOverlay>>) -> Self {
        Self {
            id: id.into(),
            entries: DashMap::new(),
            kv: DashMap::new(),
            base,
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn exists_locally(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Whether `path` resolves to content anywhere in this overlay chain.
    pub fn exists(&self, path: &str) -> bool {
        if self.exists_locally(path) {
            return true;
        }
        match &self.base {
            Some(base) => base.exists(path),
            None => false,
        }
    }

    // ── File namespace ──

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        if let Some(entry) = self.entries.get(path) {
            return Ok(entry.content().to_vec());
        }
        match &self.base {
            Some(base) => base.read_file(path),
            None => Err(Error::NotFound(format!("file not found: {path}"))),
        }
    }

    pub async fn write_file(&self, path: &str, content: Vec<u8>) -> Result<String> {
        if content.len() > MAX_FILE_SIZE {
            return Err(Error::TooLarge(format!(
                "{path} is {} bytes, limit is {MAX_FILE_SIZE}",
                content.len()
            )));
        }

        let is_new = !self.exists(path);
        let hash = format!("{:x}", Sha256::digest(&content));
        let entry = if is_new {
            OverlayEntry::Added { content: content.clone(), hash: hash.clone() }
        } else {
            OverlayEntry::Modified { content: content.clone(), hash: hash.clone() }
        };

        self.store
            .put(&format!("{}/{path}", key_prefix("files", &self.id)), content)
            .await?;
        self.entries.insert(path.to_string(), entry);
        Ok(hash)
    }

    /// Remove the local entry. No tombstone: if a base exists, the path
    /// becomes visible again through it.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.entries.remove(path);
        self.store
            .delete(&format!("{}/{path}", key_prefix("files", &self.id)))
            .await?;
        Ok(())
    }

    /// Paths changed in this overlay's own local layer (not inherited
    /// from base).
    pub fn list_local_paths(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn list_local_changes(&self) -> Vec<(String, OverlayEntry)> {
        self.entries
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// All paths visible through this overlay, local entries merged over
    /// whatever the base exposes.
    fn all_visible_paths(&self) -> Vec<String> {
        let mut paths: std::collections::BTreeSet<String> = match &self.base {
            Some(base) => base.all_visible_paths().into_iter().collect(),
            None => Default::default(),
        };
        for path in self.list_local_paths() {
            paths.insert(path);
        }
        paths.into_iter().collect()
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let root = normalize_root(path);
        let prefix = if root.is_empty() { String::new() } else { format!("{root}/") };

        let mut dirs: std::collections::BTreeSet<String> = Default::default();
        let mut files: std::collections::BTreeSet<String> = Default::default();

        for visible in self.all_visible_paths() {
            let rest = if prefix.is_empty() {
                Some(visible.as_str())
            } else {
                visible.strip_prefix(prefix.as_str())
            };
            let Some(rest) = rest else { continue };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                }
                None => {
                    files.insert(rest.to_string());
                }
            }
        }

        let mut out: Vec<DirEntry> = dirs
            .into_iter()
            .map(|name| DirEntry { name, is_dir: true })
            .collect();
        out.extend(files.into_iter().map(|name| DirEntry { name, is_dir: false }));
        Ok(out)
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        if let Ok(content) = self.read_file(path) {
            return Ok(Stat {
                size: content.len() as u64,
                mtime: Utc::now(),
                is_file: true,
                is_dir: false,
            });
        }
        let root = normalize_root(path);
        let entries = self.readdir(&root)?;
        if root.is_empty() || !entries.is_empty() || self.all_visible_paths().iter().any(|p| p.starts_with(&format!("{root}/"))) {
            return Ok(Stat { size: 0, mtime: Utc::now(), is_file: false, is_dir: true });
        }
        Err(Error::NotFound(format!("not found: {path}")))
    }

    // ── KV namespace ──

    pub fn kv_get(&self, key: &str) -> Option<String> {
        self.kv.get(key).map(|v| v.clone())
    }

    pub async fn kv_set(&self, key: &str, value: String) -> Result<()> {
        self.store
            .put(&format!("{}/{key}", key_prefix("kv", &self.id)), value.clone().into_bytes())
            .await?;
        self.kv.insert(key.to_string(), value);
        Ok(())
    }

    pub fn kv_list(&self, prefix: &str) -> Vec<String> {
        self.kv
            .iter()
            .filter(|r| r.key().starts_with(prefix))
            .map(|r| r.key().clone())
            .collect()
    }

    pub async fn kv_delete(&self, key: &str) -> Result<()> {
        self.kv.remove(key);
        self.store
            .delete(&format!("{}/{key}", key_prefix("kv", &self.id)))
            .await?;
        Ok(())
    }

    /// Re-hydrate this overlay's entries from its backing store. Used on
    /// restart by Recovery (§4.10).
    pub async fn restore_from_store(&self) -> Result<()> {
        let file_prefix = key_prefix("files", &self.id);
        for key in self.store.list(&file_prefix).await? {
            let Some(path) = key.strip_prefix(&format!("{file_prefix}/")) else { continue };
            let content = self.store.get(&key).await?;
            let hash = format!("{:x}", Sha256::digest(&content));
            self.entries
                .insert(path.to_string(), OverlayEntry::Modified { content, hash });
        }

        let kv_prefix = key_prefix("kv", &self.id);
        for key in self.store.list(&kv_prefix).await? {
            let Some(name) = key.strip_prefix(&format!("{kv_prefix}/")) else { continue };
            let value = String::from_utf8_lossy(&self.store.get(&key).await?).into_owned();
            self.kv.insert(name.to_string(), value);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalObjectStore;

    fn overlay(id: &str) -> FileOverlay {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));
        std::mem::forget(dir); // keep temp dir alive for test duration
        FileOverlay::new(id, store, None)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let o = overlay("stable");
        o.write_file("README", b"orig".to_vec()).await.unwrap();
        assert_eq!(o.read_file("README").unwrap(), b"orig");
    }

    #[tokio::test]
    async fn read_falls_through_to_base() {
        let base = Arc::new(overlay("stable"));
        base.write_file("README", b"orig".to_vec()).await.unwrap();

        let top = overlay("agent-1");
        let top = FileOverlay::new(top.id, top.store, Some(base));
        assert_eq!(top.read_file("README").unwrap(), b"orig");
    }

    #[tokio::test]
    async fn local_write_shadows_base() {
        let base = Arc::new(overlay("stable"));
        base.write_file("README", b"orig".to_vec()).await.unwrap();

        let top = overlay("agent-1");
        let top = FileOverlay::new(top.id, top.store, Some(base.clone()));
        top.write_file("README", b"new".to_vec()).await.unwrap();

        assert_eq!(top.read_file("README").unwrap(), b"new");
        assert_eq!(base.read_file("README").unwrap(), b"orig");
    }

    #[tokio::test]
    async fn delete_falls_back_to_base_with_no_tombstone() {
        let base = Arc::new(overlay("stable"));
        base.write_file("README", b"orig".to_vec()).await.unwrap();

        let top = overlay("agent-1");
        let top = FileOverlay::new(top.id, top.store, Some(base));
        top.write_file("README", b"new".to_vec()).await.unwrap();
        top.delete("README").await.unwrap();

        assert_eq!(top.read_file("README").unwrap(), b"orig");
    }

    #[tokio::test]
    async fn write_over_size_limit_is_too_large() {
        let o = overlay("stable");
        let big = vec![0u8; MAX_FILE_SIZE + 1];
        let err = o.write_file("big", big).await.unwrap_err();
        assert!(matches!(err, Error::TooLarge(_)));
    }

    #[tokio::test]
    async fn readdir_tolerates_slash_and_dot_roots() {
        let o = overlay("stable");
        o.write_file("a.txt", b"1".to_vec()).await.unwrap();
        o.write_file("dir/b.txt", b"2".to_vec()).await.unwrap();

        for root in ["/", "", "."] {
            let entries = o.readdir(root).unwrap();
            let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
            assert!(names.contains(&"a.txt".to_string()));
            assert!(names.contains(&"dir".to_string()));
        }
    }

    #[tokio::test]
    async fn readdir_merges_overlay_and_base() {
        let base = Arc::new(overlay("stable"));
        base.write_file("a.txt", b"1".to_vec()).await.unwrap();

        let top = overlay("agent-1");
        let top = FileOverlay::new(top.id, top.store, Some(base));
        top.write_file("b.txt", b"2".to_vec()).await.unwrap();

        let names: Vec<_> = top.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&"a.txt".to_string()));
        assert!(names.contains(&"b.txt".to_string()));
    }

    #[tokio::test]
    async fn kv_round_trips() {
        let o = overlay("agent-1");
        o.kv_set("submission", "{\"summary\":\"x\"}".to_string()).await.unwrap();
        assert_eq!(o.kv_get("submission"), Some("{\"summary\":\"x\"}".to_string()));
    }

    #[tokio::test]
    async fn restore_from_store_repopulates_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));

        {
            let o = FileOverlay::new("agent-1", store.clone(), None);
            o.write_file("a.txt", b"1".to_vec()).await.unwrap();
            o.kv_set("submission", "{}".to_string()).await.unwrap();
        }

        let restored = FileOverlay::new("agent-1", store, None);
        restored.restore_from_store().await.unwrap();
        assert_eq!(restored.read_file("a.txt").unwrap(), b"1");
        assert_eq!(restored.kv_get("submission"), Some("{}".to_string()));
    }
}
