//! Standard filesystem paths for stagefs.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Default directory the session backing store is mounted on.
pub static SESSION_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("STAGEFS_SESSION_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/stagefs/mnt/session"))
});

/// Default location of the configuration file.
pub static CONFIG_FILE: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("STAGEFS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/stagefs/stagefs.toml"))
});

/// Join an absolute virtual path below a real root directory.
///
/// `join_under("/mnt/session", "/rootfs/etc")` yields `/mnt/session/rootfs/etc`.
/// [`Path::join`] would discard the root when given an absolute path.
#[must_use]
pub fn join_under(root: &Path, virtual_path: &Path) -> PathBuf {
    match virtual_path.strip_prefix("/") {
        Ok(relative) if relative.as_os_str().is_empty() => root.to_path_buf(),
        Ok(relative) => root.join(relative),
        Err(_) => root.join(virtual_path),
    }
}

/// Number of normal components in a path, `/` being depth zero.
#[must_use]
pub fn depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .count()
}
