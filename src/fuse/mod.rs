//! FUSE adapter: translates kernel callbacks into node operations and
//! node errors into errnos.

pub mod mount;

use crate::fs::error::FsError;
use crate::fs::{DirNode, FileNode, Node, NodeAttr, NodeKind, StreamFs, ROOT_INODE};
use crate::store::StoreGateway;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyCreated, ReplyData,
    ReplyDirectory, ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs,
    ReplyWrite,
};
use rfuse3::raw::{Filesystem, Request};
use rfuse3::{Errno, FileType, Result as FuseResult, Timestamp};
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

/// Ask the kernel to bypass its page cache so every read and write goes
/// through the node buffers.
const FOPEN_DIRECT_IO: u32 = 1 << 0;

impl From<FsError> for Errno {
    fn from(err: FsError) -> Self {
        Errno::from(err.errno())
    }
}

fn node_kind(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Dir => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

fn to_fuse_attr(attr: &NodeAttr) -> FileAttr {
    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: Timestamp::new(0, 0),
        mtime: Timestamp::new(0, 0),
        ctime: Timestamp::new(0, 0),
        #[cfg(target_os = "macos")]
        crtime: Timestamp::new(0, 0),
        kind: node_kind(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: 0,
        gid: 0,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}

fn read_only_open(flags: u32) -> bool {
    flags & (libc::O_ACCMODE as u32) == libc::O_RDONLY as u32
}

impl<G: StoreGateway> StreamFs<G> {
    fn dir_node(&self, ino: u64) -> Result<Arc<DirNode>, Errno> {
        match self.node(ino) {
            Some(Node::Dir(dir)) => Ok(dir),
            Some(Node::File(_)) => Err(libc::ENOTDIR.into()),
            None => Err(libc::ENOENT.into()),
        }
    }

    fn file_node(&self, ino: u64) -> Result<Arc<FileNode>, Errno> {
        match self.node(ino) {
            Some(Node::File(file)) => Ok(file),
            Some(Node::Dir(_)) => Err(libc::EISDIR.into()),
            None => Err(libc::ENOENT.into()),
        }
    }
}

#[allow(refining_impl_trait_reachable)]
impl<G: StoreGateway> Filesystem for StreamFs<G> {
    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        Ok(ReplyInit {
            max_write: NonZeroU32::new(128 * 1024).unwrap(),
        })
    }

    async fn destroy(&self, _req: Request) {}

    async fn lookup(&self, req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        debug!(
            unique = req.unique,
            parent,
            name = %name.to_string_lossy(),
            "fuse.lookup"
        );
        let dir = self.dir_node(parent)?;
        let name = name.to_string_lossy();
        let node = self.lookup(&dir, name.as_ref()).await?;
        let attr = self.attr(&node).await;
        Ok(ReplyEntry {
            ttl: self.attr_ttl(),
            attr: to_fuse_attr(&attr),
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        debug!(ino, "fuse.getattr");
        let Some(node) = self.node(ino) else {
            return Err(libc::ENOENT.into());
        };
        let attr = self.attr(&node).await;
        Ok(ReplyAttr {
            ttl: self.attr_ttl(),
            attr: to_fuse_attr(&attr),
        })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        debug!(ino, "fuse.opendir");
        let _ = self.dir_node(ino)?;
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<BoxStream<'a, FuseResult<DirectoryEntry>>>> {
        debug!(ino, offset, "fuse.readdir");
        let dir = self.dir_node(ino)?;
        let children = self.read_dir(&dir).await?;

        let mut all = Vec::with_capacity(children.len() + 2);
        all.push(DirectoryEntry {
            inode: ino,
            kind: FileType::Directory,
            name: OsString::from("."),
            offset: 1,
        });
        // The namespace is two levels deep; every parent is the root.
        all.push(DirectoryEntry {
            inode: ROOT_INODE,
            kind: FileType::Directory,
            name: OsString::from(".."),
            offset: 2,
        });
        for (i, entry) in children.into_iter().enumerate() {
            all.push(DirectoryEntry {
                inode: entry.ino,
                kind: node_kind(entry.kind),
                name: OsString::from(entry.name),
                offset: i as i64 + 3,
            });
        }

        let entries = all.into_iter().filter(move |entry| entry.offset > offset).map(Ok);
        let boxed: BoxStream<'a, FuseResult<DirectoryEntry>> = Box::pin(stream::iter(entries));
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<BoxStream<'a, FuseResult<DirectoryEntryPlus>>>> {
        debug!(ino, offset, "fuse.readdirplus");
        let ttl = self.attr_ttl();
        let dir = self.dir_node(ino)?;
        let dir_attr = self.attr(&Node::Dir(dir.clone())).await;
        let root_attr = self.attr(&Node::Dir(self.root())).await;
        let children = self.read_dir(&dir).await?;

        let mut all = Vec::with_capacity(children.len() + 2);
        all.push(DirectoryEntryPlus {
            inode: ino,
            generation: 0,
            kind: FileType::Directory,
            name: OsString::from("."),
            offset: 1,
            attr: to_fuse_attr(&dir_attr),
            entry_ttl: ttl,
            attr_ttl: ttl,
        });
        all.push(DirectoryEntryPlus {
            inode: ROOT_INODE,
            generation: 0,
            kind: FileType::Directory,
            name: OsString::from(".."),
            offset: 2,
            attr: to_fuse_attr(&root_attr),
            entry_ttl: ttl,
            attr_ttl: ttl,
        });
        for (i, entry) in children.into_iter().enumerate() {
            // Enumeration registered the node; a miss means it was
            // replaced concurrently, so leave it to the next listing.
            let Some(node) = self.node(entry.ino) else {
                continue;
            };
            let attr = self.attr(&node).await;
            all.push(DirectoryEntryPlus {
                inode: entry.ino,
                generation: 0,
                kind: node_kind(entry.kind),
                name: OsString::from(entry.name),
                offset: i as i64 + 3,
                attr: to_fuse_attr(&attr),
                entry_ttl: ttl,
                attr_ttl: ttl,
            });
        }

        let entries = all
            .into_iter()
            .filter(move |entry| entry.offset as u64 > offset)
            .map(Ok);
        let boxed: BoxStream<'a, FuseResult<DirectoryEntryPlus>> = Box::pin(stream::iter(entries));
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn releasedir(&self, _req: Request, _ino: u64, _fh: u64, _flags: u32) -> FuseResult<()> {
        Ok(())
    }

    type DirEntryStream<'a>
        = BoxStream<'a, FuseResult<DirectoryEntry>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = BoxStream<'a, FuseResult<DirectoryEntryPlus>>
    where
        Self: 'a;

    async fn mkdir(
        &self,
        req: Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
    ) -> FuseResult<ReplyEntry> {
        debug!(
            unique = req.unique,
            parent,
            name = %name.to_string_lossy(),
            mode,
            umask,
            "fuse.mkdir"
        );
        let dir = self.dir_node(parent)?;
        let name = name.to_string_lossy();
        let node = self.create_stream_dir(&dir, name.as_ref()).await?;
        let attr = self.attr(&Node::Dir(node)).await;
        Ok(ReplyEntry {
            ttl: self.attr_ttl(),
            attr: to_fuse_attr(&attr),
            generation: 0,
        })
    }

    async fn create(
        &self,
        req: Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        flags: u32,
    ) -> FuseResult<ReplyCreated> {
        debug!(
            unique = req.unique,
            parent,
            name = %name.to_string_lossy(),
            mode,
            flags,
            "fuse.create"
        );
        let dir = self.dir_node(parent)?;
        let name = name.to_string_lossy();
        let file = self.create_file(&dir, name.as_ref());
        self.open_file(&file, read_only_open(flags)).await;
        let attr = self.attr(&Node::File(file.clone())).await;
        Ok(ReplyCreated {
            ttl: self.attr_ttl(),
            attr: to_fuse_attr(&attr),
            generation: 0,
            fh: file.ino,
            flags: FOPEN_DIRECT_IO,
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        debug!(ino, flags, "fuse.open");
        let file = self.file_node(ino)?;
        self.open_file(&file, read_only_open(flags)).await;
        Ok(ReplyOpen {
            fh: ino,
            flags: FOPEN_DIRECT_IO,
        })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        debug!(ino, offset, size, "fuse.read");
        let file = self.file_node(ino)?;
        let data = self.read_at(&file, offset, size).await?;
        Ok(ReplyData {
            data: Bytes::from(data),
        })
    }

    async fn write(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        _offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> FuseResult<ReplyWrite> {
        debug!(ino, size = data.len(), "fuse.write");
        // Offsets are ignored: writes append to the buffer and the whole
        // buffer is committed by flush.
        let file = self.file_node(ino)?;
        let written = self.write(&file, data).await as u32;
        Ok(ReplyWrite { written })
    }

    async fn flush(&self, _req: Request, ino: u64, _fh: u64, _lock_owner: u64) -> FuseResult<()> {
        debug!(ino, "fuse.flush");
        let file = self.file_node(ino)?;
        self.flush(&file).await.map_err(Errno::from)
    }

    async fn release(
        &self,
        _req: Request,
        _ino: u64,
        _fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        Ok(ReplyStatFs {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: 0,
            ffree: 0,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        })
    }

    async fn access(&self, _req: Request, ino: u64, _mask: u32) -> FuseResult<()> {
        if self.node(ino).is_some() {
            Ok(())
        } else {
            Err(libc::ENOENT.into())
        }
    }
}
