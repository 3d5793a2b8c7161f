//! File node operations: open, buffered write, flush, reload, read.
//!
//! All buffer access happens under the node's exclusive lock, so
//! concurrent operations on one file serialize while other files proceed
//! independently.

use super::error::{map_store, FsError};
use super::{FileNode, FileState, StreamFs};
use crate::store::{KeyType, StoreGateway};
use tracing::error;

impl<G: StoreGateway> StreamFs<G> {
    /// Record the open mode. A read-only open must leave no side effect
    /// on the store when the handle is flushed on close.
    pub async fn open_file(&self, file: &FileNode, read_only: bool) {
        file.state.lock().await.read_only = read_only;
    }

    /// Append to the write buffer. All bytes are accepted; the buffer is
    /// committed whole by the next flush.
    pub async fn write(&self, file: &FileNode, data: &[u8]) -> usize {
        let mut state = file.state.lock().await;
        state.write_buf.extend_from_slice(data);
        data.len()
    }

    /// Commit the write buffer. A stream-parented file appends one entry
    /// to its parent stream under the identifier `<name>-0`, carrying the
    /// buffer as the single `blob` field; a scalar-backed file overwrites
    /// its key. The buffer is cleared only on success, so a failed flush
    /// can be retried with the bytes intact.
    pub async fn flush(&self, file: &FileNode) -> Result<(), FsError> {
        let mut state = file.state.lock().await;
        if state.read_only {
            return Ok(());
        }
        match &file.parent_stream {
            Some(stream) => {
                let id = format!("{}-0", file.name);
                self.gateway()
                    .stream_append(stream, &id, &[("blob", state.write_buf.as_slice())])
                    .await
                    .map_err(|e| map_store("xadd", stream, e))?;
            }
            None => {
                self.gateway()
                    .set_string(&file.name, &state.write_buf)
                    .await
                    .map_err(|e| map_store("set", &file.name, e))?;
            }
        }
        state.write_buf.clear();
        Ok(())
    }

    /// Serve a read at the given offset. A read sequence starts with a
    /// fresh reload at offset zero; later offsets serve the buffer that
    /// reload produced, never a cache from an earlier open.
    pub async fn read_at(&self, file: &FileNode, offset: u64, size: u32) -> Result<Vec<u8>, FsError> {
        let mut state = file.state.lock().await;
        if offset == 0 {
            self.reload(file, &mut state).await?;
        }
        let buf = &state.read_buf;
        let start = offset.min(buf.len() as u64) as usize;
        let end = buf.len().min(start + size as usize);
        Ok(buf[start..end].to_vec())
    }

    /// Fetch the whole value, reloading first.
    pub async fn read_all(&self, file: &FileNode) -> Result<Vec<u8>, FsError> {
        let mut state = file.state.lock().await;
        self.reload(file, &mut state).await?;
        Ok(state.read_buf.clone())
    }

    /// Re-materialize the key into bytes by its current store type:
    /// scalars read directly, lists join their elements with a newline
    /// (no trailing separator), streams render their full entry range as
    /// JSON ordered by entry identifier. Anything else is unsupported.
    async fn reload(&self, file: &FileNode, state: &mut FileState) -> Result<(), FsError> {
        let key = file.name.as_str();
        let kind = self
            .gateway()
            .key_type(key)
            .await
            .map_err(|e| map_store("type", key, e))?;
        let bytes = match kind {
            KeyType::String => self
                .gateway()
                .get_string(key)
                .await
                .map_err(|e| map_store("get", key, e))?,
            KeyType::List => {
                let values = self
                    .gateway()
                    .list_range(key)
                    .await
                    .map_err(|e| map_store("lrange", key, e))?;
                values.join(&b'\n')
            }
            KeyType::Stream => {
                let entries = self
                    .gateway()
                    .stream_range(key)
                    .await
                    .map_err(|e| map_store("xrange", key, e))?;
                serde_json::to_vec(&entries).map_err(|e| {
                    error!(key, error = %e, "stream entry serialization failed");
                    FsError::Io
                })?
            }
            KeyType::Other(_) => return Err(FsError::Unsupported),
        };
        state.size = bytes.len() as u64;
        state.read_buf = bytes;
        Ok(())
    }
}
