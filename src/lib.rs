//! Redis keys and streams exposed as a FUSE filesystem.
//!
//! String keys read as files, stream keys mount as directories, and
//! files created inside a stream directory append one stream entry per
//! flush. List keys read as newline-joined elements. The backing store
//! is the single source of truth: reads always refetch, writes buffer in
//! memory and commit whole on flush.

pub mod config;
pub mod fs;
pub mod fuse;
pub mod store;

pub use crate::config::{Config, ConfigError};
pub use crate::fs::error::FsError;
pub use crate::fs::{
    node_inode, DirEntry, DirNode, FileNode, Node, NodeAttr, NodeKind, StreamFs, ROOT_INODE,
};
pub use crate::store::memory::MemoryGateway;
pub use crate::store::redis::RedisGateway;
pub use crate::store::{KeyType, StoreError, StoreGateway, StreamEntry};
