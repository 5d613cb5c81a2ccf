//! Recursive directory upload and path resolution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use tokio::fs;

use crate::assembler::FileAssembler;
use crate::state::{LifetimePolicy, StateStore};

use super::error::{DirError, DirResult};
use super::types::{DirEntry, DirManifest, EntryKind};

pub struct DirectoryAssembler {
    assembler: Arc<FileAssembler>,
    state: Arc<StateStore>,
}

impl DirectoryAssembler {
    pub fn new(assembler: Arc<FileAssembler>, state: Arc<StateStore>) -> Self {
        Self { assembler, state }
    }

    /// Recursively upload a local directory tree; returns the id of the
    /// directory's manifest file. Entries are sorted by name so identical
    /// trees produce identical ids regardless of readdir order.
    pub async fn upload_dir(&self, path: &Path, policy: &LifetimePolicy) -> DirResult<String> {
        upload_tree(
            self.assembler.clone(),
            self.state.clone(),
            path.to_path_buf(),
            *policy,
        )
        .await
    }

    /// Resolve a slash-separated path beneath `dir_id` to a file or
    /// directory id. An empty path resolves to `dir_id` itself.
    pub async fn resolve(
        &self,
        dir_id: &str,
        path: &str,
        policy: &LifetimePolicy,
    ) -> DirResult<String> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let mut current = dir_id.to_string();
        for (idx, segment) in segments.iter().enumerate() {
            let manifest = self.load_manifest(&current, policy).await?;
            let entry = manifest
                .entry(segment)
                .ok_or_else(|| DirError::NotFound((*segment).to_string()))?;

            if idx + 1 < segments.len() {
                // A non-terminal segment must name a directory
                if entry.kind != EntryKind::Dir {
                    return Err(DirError::NotADirectory((*segment).to_string()));
                }
            }
            current = entry.id.clone();
        }
        Ok(current)
    }

    /// Entries of one directory level.
    pub async fn list(&self, dir_id: &str, policy: &LifetimePolicy) -> DirResult<Vec<DirEntry>> {
        Ok(self.load_manifest(dir_id, policy).await?.files)
    }

    async fn load_manifest(&self, dir_id: &str, policy: &LifetimePolicy) -> DirResult<DirManifest> {
        let bytes = self.assembler.download(dir_id, policy).await?;
        DirManifest::decode(&bytes)
    }
}

/// Recursion step. Runs over owned values so the boxed future is `'static`
/// and `Send` regardless of depth.
fn upload_tree(
    assembler: Arc<FileAssembler>,
    state: Arc<StateStore>,
    path: PathBuf,
    policy: LifetimePolicy,
) -> BoxFuture<'static, DirResult<String>> {
    async move {
        let mut names = Vec::new();
        let mut reader = fs::read_dir(&path).await?;
        while let Some(entry) = reader.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let child = path.join(&name);
            let metadata = fs::metadata(&child).await?;

            if metadata.is_dir() {
                let id = upload_tree(assembler.clone(), state.clone(), child, policy).await?;
                let size = state.find_file(&id).await?.and_then(|r| r.size).unwrap_or(0);
                entries.push(DirEntry {
                    kind: EntryKind::Dir,
                    name,
                    size,
                    id,
                });
            } else {
                let id = assembler.upload_file(&child, &policy).await?;
                entries.push(DirEntry {
                    kind: EntryKind::File,
                    name,
                    size: metadata.len() as i64,
                    id,
                });
            }
        }

        let manifest = DirManifest::new(entries);
        let encoded = Bytes::from(manifest.encode()?);
        let id = assembler.upload_bytes(encoded, &policy).await?;
        tracing::debug!(dir = %path.display(), %id, "directory uploaded");
        Ok(id)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ChunkCache;
    use crate::config::StoreConfig;
    use crate::ledger::MemoryLedger;
    use crate::transfer::ChunkTransferClient;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dirs: DirectoryAssembler,
        assembler: Arc<FileAssembler>,
        _temp: TempDir,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig {
            chunk_size: 64,
            cache_dir: temp.path().join("cache"),
            retry_initial_interval: Duration::from_millis(1),
            retry_max_interval: Duration::from_millis(5),
            retry_max_elapsed: Duration::from_millis(100),
            ..Default::default()
        };
        let state = Arc::new(StateStore::open_in_memory().await.unwrap());
        let cache = ChunkCache::open(&config.cache_dir).await.unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let transfer = Arc::new(ChunkTransferClient::new(
            state.clone(),
            cache.clone(),
            ledger,
            config.clone(),
        ));
        let assembler = Arc::new(FileAssembler::new(
            state.clone(),
            cache,
            transfer,
            config,
        ));
        Fixture {
            dirs: DirectoryAssembler::new(assembler.clone(), state),
            assembler,
            _temp: temp,
        }
    }

    async fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("sub")).await.unwrap();
        fs::write(root.join("a.txt"), b"file a contents").await.unwrap();
        fs::write(root.join("b.bin"), vec![7u8; 200]).await.unwrap();
        fs::write(root.join("sub/inner.txt"), b"nested file").await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_and_list() {
        let fx = fixture().await;
        let tree = TempDir::new().unwrap();
        sample_tree(tree.path()).await;

        let policy = LifetimePolicy::default();
        let dir_id = fx.dirs.upload_dir(tree.path(), &policy).await.unwrap();

        let entries = fx.dirs.list(&dir_id, &policy).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.bin", "sub"]);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 15);
        assert_eq!(entries[2].kind, EntryKind::Dir);
    }

    #[tokio::test]
    async fn test_resolve_paths() {
        let fx = fixture().await;
        let tree = TempDir::new().unwrap();
        sample_tree(tree.path()).await;

        let policy = LifetimePolicy::default();
        let dir_id = fx.dirs.upload_dir(tree.path(), &policy).await.unwrap();

        // direct child
        let a_id = fx.dirs.resolve(&dir_id, "a.txt", &policy).await.unwrap();
        let bytes = fx.assembler.download(&a_id, &policy).await.unwrap();
        assert_eq!(bytes, &b"file a contents"[..]);

        // nested child
        let inner_id = fx
            .dirs
            .resolve(&dir_id, "sub/inner.txt", &policy)
            .await
            .unwrap();
        let bytes = fx.assembler.download(&inner_id, &policy).await.unwrap();
        assert_eq!(bytes, &b"nested file"[..]);

        // empty path is the directory itself
        assert_eq!(fx.dirs.resolve(&dir_id, "", &policy).await.unwrap(), dir_id);
    }

    #[tokio::test]
    async fn test_resolve_missing_is_not_found() {
        let fx = fixture().await;
        let tree = TempDir::new().unwrap();
        sample_tree(tree.path()).await;

        let policy = LifetimePolicy::default();
        let dir_id = fx.dirs.upload_dir(tree.path(), &policy).await.unwrap();

        let err = fx
            .dirs
            .resolve(&dir_id, "nope.txt", &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, DirError::NotFound(name) if name == "nope.txt"));

        let err = fx
            .dirs
            .resolve(&dir_id, "sub/missing", &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, DirError::NotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_resolve_through_file_is_not_a_directory() {
        let fx = fixture().await;
        let tree = TempDir::new().unwrap();
        sample_tree(tree.path()).await;

        let policy = LifetimePolicy::default();
        let dir_id = fx.dirs.upload_dir(tree.path(), &policy).await.unwrap();

        let err = fx
            .dirs
            .resolve(&dir_id, "a.txt/whatever", &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, DirError::NotADirectory(name) if name == "a.txt"));
    }

    #[tokio::test]
    async fn test_deep_tree_uploads_from_spawned_task() {
        let fx = Arc::new(fixture().await);
        let tree = TempDir::new().unwrap();
        fs::create_dir_all(tree.path().join("a/b/c")).await.unwrap();
        fs::write(tree.path().join("a/b/c/leaf.txt"), b"deep leaf")
            .await
            .unwrap();
        fs::write(tree.path().join("a/top.txt"), b"top").await.unwrap();

        let policy = LifetimePolicy::default();
        let task_fx = fx.clone();
        let root = tree.path().to_path_buf();
        let dir_id = tokio::spawn(async move {
            task_fx
                .dirs
                .upload_dir(&root, &LifetimePolicy::default())
                .await
                .unwrap()
        })
        .await
        .unwrap();

        let leaf_id = fx
            .dirs
            .resolve(&dir_id, "a/b/c/leaf.txt", &policy)
            .await
            .unwrap();
        let bytes = fx.assembler.download(&leaf_id, &policy).await.unwrap();
        assert_eq!(bytes, &b"deep leaf"[..]);
    }

    #[tokio::test]
    async fn test_identical_trees_share_an_id() {
        let fx = fixture().await;
        let policy = LifetimePolicy::default();

        let tree1 = TempDir::new().unwrap();
        sample_tree(tree1.path()).await;
        let tree2 = TempDir::new().unwrap();
        sample_tree(tree2.path()).await;

        let id1 = fx.dirs.upload_dir(tree1.path(), &policy).await.unwrap();
        let id2 = fx.dirs.upload_dir(tree2.path(), &policy).await.unwrap();
        assert_eq!(id1, id2);
    }
}
