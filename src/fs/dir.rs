//! Directory node operations: lookup, enumeration, child creation.

use super::error::{map_store, FsError};
use super::{node_inode, DirEntry, DirNode, FileNode, Node, NodeKind, StreamFs};
use crate::store::{KeyType, StoreError, StoreGateway};
use std::sync::Arc;

/// Identifier of the placeholder entry used to establish a stream key.
const PLACEHOLDER_ID: &str = "0-1";

impl<G: StoreGateway> StreamFs<G> {
    /// Resolve `name` under `dir`. The key's reported type decides the
    /// classification: stream keys become directories, everything else a
    /// file. Type-gating for unsupported kinds happens at read time, not
    /// here.
    pub async fn lookup(&self, dir: &DirNode, name: &str) -> Result<Node, FsError> {
        let present = self
            .gateway()
            .exists(name)
            .await
            .map_err(|e| map_store("exists", name, e))?;
        if !present {
            return Err(FsError::NotFound);
        }
        let kind = self
            .gateway()
            .key_type(name)
            .await
            .map_err(|e| map_store("type", name, e))?;
        Ok(self.materialize(dir, name, kind == KeyType::Stream))
    }

    /// Enumerate children. Only the root has a computed listing: every
    /// key is fetched, stream keys report as directories and string keys
    /// as files; other types are omitted. Stream directories list empty;
    /// their children are write-only.
    pub async fn read_dir(&self, dir: &DirNode) -> Result<Vec<DirEntry>, FsError> {
        if !dir.root {
            return Ok(Vec::new());
        }
        let keys = self
            .gateway()
            .list_keys("*")
            .await
            .map_err(|e| map_store("keys", "*", e))?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let kind = match self.gateway().key_type(&key).await {
                Ok(kind) => kind,
                // The key vanished mid-enumeration; skip it.
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(map_store("type", &key, err)),
            };
            let kind = match kind {
                KeyType::Stream => NodeKind::Dir,
                KeyType::String => NodeKind::File,
                _ => continue,
            };
            // Register the node so inodes handed out through the listing
            // stay resolvable even when the kernel skips the lookup.
            let node = self.materialize(dir, &key, kind == NodeKind::Dir);
            entries.push(DirEntry {
                ino: node.ino(),
                name: key,
                kind,
            });
        }
        Ok(entries)
    }

    /// Create a file node under `dir`, open for writing immediately. If
    /// the directory is a stream the node appends to it on flush. The
    /// store is not touched until that flush.
    pub fn create_file(&self, dir: &DirNode, name: &str) -> Arc<FileNode> {
        let parent_stream = (!dir.root).then(|| dir.name.clone());
        let file = Arc::new(FileNode::new(
            node_inode(dir.ino, name),
            name,
            parent_stream,
        ));
        self.register(Node::File(file.clone()));
        file
    }

    /// Create an empty stream key. The store has no create-empty
    /// primitive for streams, so existence is established by appending a
    /// placeholder entry and deleting that exact entry. If only the
    /// delete fails the placeholder is left behind; no rollback of the
    /// append is attempted.
    pub async fn create_stream_dir(
        &self,
        dir: &DirNode,
        name: &str,
    ) -> Result<Arc<DirNode>, FsError> {
        self.gateway()
            .stream_append(name, PLACEHOLDER_ID, &[("blob", b"dummy".as_slice())])
            .await
            .map_err(|e| map_store("xadd", name, e))?;
        self.gateway()
            .stream_delete(name, PLACEHOLDER_ID)
            .await
            .map_err(|e| map_store("xdel", name, e))?;
        let node = Arc::new(DirNode {
            ino: node_inode(dir.ino, name),
            name: name.to_string(),
            root: false,
        });
        self.register(Node::Dir(node.clone()));
        Ok(node)
    }
}
