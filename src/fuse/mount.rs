//! Mount helpers for starting and stopping the FUSE session.
//!
//! Thin wrappers over the raw `Session` API. On Linux the mount is
//! unprivileged (requires fusermount3 in PATH); other Unix targets fall
//! back to a privileged mount.

use crate::config::Config;
use crate::fs::StreamFs;
use crate::store::StoreGateway;
use rfuse3::raw::{MountHandle, Session};
use rfuse3::MountOptions;
use std::path::Path;

fn mount_options(config: &Config) -> MountOptions {
    let mut options = MountOptions::default();
    options.fs_name(config.fs_name.as_str());
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };
    options.uid(uid).gid(gid);

    let mut custom = vec![format!("subtype={}", config.subtype)];
    if cfg!(target_os = "macos") {
        custom.push(format!("volname={}", config.volume_name));
        if config.local_volume {
            custom.push("local".to_string());
        }
    }
    options.custom_options(custom.join(","));
    options
}

/// Mount the filesystem on the given directory.
#[cfg(target_os = "linux")]
pub async fn mount_streamfs<G: StoreGateway>(
    fs: StreamFs<G>,
    config: &Config,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<MountHandle> {
    let session = Session::new(mount_options(config));
    session
        .mount_with_unprivileged(fs, mount_point.as_ref())
        .await
}

/// Mount the filesystem on the given directory.
#[cfg(not(target_os = "linux"))]
pub async fn mount_streamfs<G: StoreGateway>(
    fs: StreamFs<G>,
    config: &Config,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<MountHandle> {
    let session = Session::new(mount_options(config));
    session.mount(fs, mount_point.as_ref()).await
}
