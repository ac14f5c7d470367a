//! Union layers assembling the final container root.
//!
//! A layer merges the rootfs with placeholders for every destination that
//! will be mounted on top of it, so that each later mount finds an
//! attachment point even when the image does not provide one.

mod overlay;
mod underlay;

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use stagefs_common::{StageError, StageResult, join_under};

use crate::layout::{Session, SessionRef};
use crate::mount::{MountKind, Points, System, Tag};

pub use overlay::{OVERLAY_DIR, Overlay};
pub use underlay::{DEFAULT_WARN_THRESHOLD, UNDERLAY_DIR, Underlay};

/// Symlink hops followed before giving up, as the kernel does.
const MAX_SYMLINKS: usize = 40;

/// A union strategy hosted by a [`Session`].
pub trait Layer {
    /// Virtual directory reserved inside the session.
    fn dir(&self) -> &str;

    /// Reserve the layer directory and register the layer hooks.
    fn add(self: Box<Self>, session: &SessionRef, system: &mut System) -> StageResult<()>;
}

/// Layer selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerChoice {
    /// Overlay filesystem.
    Overlay,
    /// Bind-mounted duplicate tree.
    Underlay,
    /// No layer; the rootfs is used as is.
    None,
    /// Overlay when the kernel supports it, underlay otherwise.
    #[default]
    Auto,
}

impl LayerChoice {
    /// Settle [`LayerChoice::Auto`] given overlay availability.
    #[must_use]
    pub const fn resolve(self, overlay_available: bool) -> Self {
        match self {
            Self::Auto if overlay_available => Self::Overlay,
            Self::Auto => Self::Underlay,
            other => other,
        }
    }

    /// Instantiate the chosen layer, probing the kernel for `Auto`.
    #[must_use]
    pub fn build(self, warn_threshold: usize) -> Option<Box<dyn Layer>> {
        let choice = match self {
            Self::Auto => self.resolve(overlay_supported()),
            other => other,
        };
        tracing::debug!(?choice, "Layer selected");
        match choice {
            Self::Overlay => Some(Box::new(Overlay::new())),
            Self::Underlay => Some(Box::new(Underlay::new().with_warn_threshold(warn_threshold))),
            Self::None | Self::Auto => None,
        }
    }
}

/// Whether the running kernel lists `overlay` in `/proc/filesystems`.
#[must_use]
pub fn overlay_supported() -> bool {
    match fs::read_to_string("/proc/filesystems") {
        Ok(content) => lists_overlay(&content),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read /proc/filesystems");
            false
        }
    }
}

fn lists_overlay(filesystems: &str) -> bool {
    filesystems
        .lines()
        .any(|line| line.split_whitespace().last() == Some("overlay"))
}

/// Resolve `path` inside `root`, following symlinks as if `root` was `/`.
///
/// Missing components are kept lexically. The result is a virtual path that
/// never escapes `root`.
pub fn resolve_in_root(root: &Path, path: &Path) -> StageResult<PathBuf> {
    let mut pending: VecDeque<OsString> = split(path).into();
    let mut resolved = PathBuf::from("/");
    let mut hops = 0;

    while let Some(name) = pending.pop_front() {
        if name == ".." {
            resolved.pop();
            continue;
        }
        let candidate = resolved.join(&name);
        let host = join_under(root, &candidate);
        match fs::symlink_metadata(&host) {
            Ok(meta) if meta.file_type().is_symlink() => {
                hops += 1;
                if hops > MAX_SYMLINKS {
                    return Err(StageError::Layer {
                        message: format!("too many levels of symbolic links in {}", path.display()),
                    });
                }
                let target = fs::read_link(&host)?;
                if target.is_absolute() {
                    resolved = PathBuf::from("/");
                }
                for part in split(&target).into_iter().rev() {
                    pending.push_front(part);
                }
            }
            _ => resolved = candidate,
        }
    }
    Ok(resolved)
}

fn split(path: &Path) -> Vec<OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}

/// Host path of the rootfs: the first rootfs point, else the session one.
fn rootfs_path(points: &Points, session: &Session) -> PathBuf {
    points
        .get_by_tag(Tag::Rootfs)
        .first()
        .map_or_else(
            || session.rootfs_path(),
            |p| p.destination().to_path_buf(),
        )
}

/// Register an empty placeholder under `layer_dir` for every pending
/// destination the rootfs does not provide.
///
/// Returns the resolved destinations that received a placeholder.
fn create_placeholders(
    session: &mut Session,
    points: &Points,
    layer_dir: &Path,
    rootfs: &Path,
) -> StageResult<Vec<PathBuf>> {
    let mut created = Vec::new();

    for point in points.iter() {
        if point.tag().is_host_side()
            || matches!(point.kind(), MountKind::Remount | MountKind::Propagation)
        {
            continue;
        }
        let dest = point.destination();
        if dest.starts_with(session.path()) {
            continue;
        }

        let resolved = match resolve_in_root(rootfs, dest) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(dest = %dest.display(), error = %e, "Skipping placeholder");
                continue;
            }
        };
        let vpath = join_under(layer_dir, &resolved);
        if session.contains(&vpath) || session.get_override_path(&vpath).is_ok() {
            continue;
        }

        match fs::symlink_metadata(join_under(rootfs, &resolved)) {
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => continue,
            Err(_) => {}
        }

        let is_dir = if point.kind() == MountKind::Bind {
            match fs::metadata(point.source()) {
                Ok(meta) => meta.is_dir(),
                Err(e) => {
                    tracing::warn!(
                        source = %point.source().display(),
                        error = %e,
                        "Bind source not accessible, skipping placeholder"
                    );
                    continue;
                }
            }
        } else {
            true
        };

        tracing::debug!(dest = %resolved.display(), is_dir, "Adding placeholder");
        if is_dir {
            session.add_dir(&vpath)?;
        } else {
            session.add_file(&vpath, Vec::new())?;
        }
        created.push(resolved);
    }

    Ok(created)
}
