//! Virtual tree entries.

use std::path::PathBuf;

/// A node of the virtual tree, created on disk at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Directory.
    Dir {
        /// Permission bits.
        mode: u32,
        /// Owner.
        uid: u32,
        /// Group.
        gid: u32,
        /// Whether it exists on disk.
        created: bool,
    },
    /// Regular file with fixed content.
    File {
        /// Permission bits.
        mode: u32,
        /// Owner.
        uid: u32,
        /// Group.
        gid: u32,
        /// File content.
        content: Vec<u8>,
        /// Whether it exists on disk.
        created: bool,
    },
    /// Symbolic link, target stored verbatim.
    Symlink {
        /// Owner.
        uid: u32,
        /// Group.
        gid: u32,
        /// Link target.
        target: PathBuf,
        /// Whether it exists on disk.
        created: bool,
    },
}

impl Entry {
    /// Whether the entry was already created on disk.
    #[must_use]
    pub const fn created(&self) -> bool {
        match self {
            Self::Dir { created, .. }
            | Self::File { created, .. }
            | Self::Symlink { created, .. } => *created,
        }
    }

    pub(crate) const fn mark_created(&mut self) {
        match self {
            Self::Dir { created, .. }
            | Self::File { created, .. }
            | Self::Symlink { created, .. } => {
                *created = true;
            }
        }
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self, Self::Dir { .. })
    }

    /// Owner and group.
    #[must_use]
    pub const fn owner(&self) -> (u32, u32) {
        match self {
            Self::Dir { uid, gid, .. }
            | Self::File { uid, gid, .. }
            | Self::Symlink { uid, gid, .. } => (*uid, *gid),
        }
    }
}
