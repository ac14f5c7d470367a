//! Mount point definition.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::flags::{MountFlags, convert_options};
use super::tag::Tag;

/// Filesystem types accepted by `add_fs`, with their context eligibility.
pub const AUTHORIZED_FS: &[(&str, bool)] = &[
    ("tmpfs", true),
    ("ramfs", true),
    ("devpts", true),
    ("overlay", true),
    ("sysfs", false),
    ("proc", false),
    ("mqueue", false),
    ("fuse", false),
    ("cgroup", false),
    ("cgroup2", false),
];

/// Image filesystem types accepted by `add_image`, with their context eligibility.
pub const AUTHORIZED_IMAGE: &[(&str, bool)] = &[
    ("ext3", true),
    ("squashfs", true),
    ("encryptfs", true),
];

/// Kernel pseudo filesystems, classified under [`Tag::Kernel`] on import.
pub const KERNEL_FS: &[&str] = &["proc", "sysfs", "mqueue", "cgroup", "cgroup2"];

/// Device pseudo filesystems, classified under [`Tag::Dev`] on import.
pub const DEV_FS: &[&str] = &["devpts"];

/// Option prefixes kept out of the regular option list.
pub(crate) const INTERNAL_OPTIONS: &[&str] = &["loop", "offset=", "sizelimit=", "key="];

pub(crate) fn is_internal_option(option: &str) -> bool {
    INTERNAL_OPTIONS
        .iter()
        .any(|prefix| option == *prefix || (prefix.ends_with('=') && option.starts_with(prefix)))
}

/// Whether `fstype` accepts an SELinux `context=` option.
#[must_use]
pub fn context_eligible(fstype: &str) -> bool {
    AUTHORIZED_FS
        .iter()
        .chain(AUTHORIZED_IMAGE)
        .any(|(name, context)| *name == fstype && *context)
}

/// Which constructor a point was (or would be) built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Bind mount of a host path.
    Bind,
    /// Flag change on an existing mount.
    Remount,
    /// Propagation change on an existing mount.
    Propagation,
    /// Loop-backed filesystem image.
    Image,
    /// Overlay union mount.
    Overlay,
    /// Any other filesystem.
    Fs,
}

/// A validated mount operation.
///
/// Points are only built by the registry constructors, which enforce
/// absolute paths and legal flag combinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountPoint {
    pub(crate) tag: Tag,
    pub(crate) source: PathBuf,
    pub(crate) destination: PathBuf,
    #[serde(rename = "type")]
    pub(crate) fstype: String,
    #[serde(skip)]
    pub(crate) flags: MountFlags,
    pub(crate) options: Vec<String>,
    #[serde(skip)]
    pub(crate) internal_options: Vec<String>,
}

impl MountPoint {
    /// Owning tag.
    #[must_use]
    pub const fn tag(&self) -> Tag {
        self.tag
    }

    /// Mount source (host path, or the filesystem name for pseudo filesystems).
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Mount destination.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Filesystem type, empty for binds, remounts and propagation changes.
    #[must_use]
    pub fn fstype(&self) -> &str {
        &self.fstype
    }

    /// Semantic flag set.
    #[must_use]
    pub const fn flags(&self) -> MountFlags {
        self.flags
    }

    /// Canonical options: flag keywords first, then data options.
    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Data options only (everything that is not a flag keyword).
    #[must_use]
    pub fn data_options(&self) -> Vec<String> {
        convert_options(&self.options).1
    }

    /// Options consumed by the mount machinery itself (loop setup).
    #[must_use]
    pub fn internal_options(&self) -> &[String] {
        &self.internal_options
    }

    /// The constructor family of this point.
    #[must_use]
    pub fn kind(&self) -> MountKind {
        if self.flags.contains(MountFlags::REMOUNT) {
            MountKind::Remount
        } else if self.flags.contains(MountFlags::BIND) {
            MountKind::Bind
        } else if self.fstype.is_empty() && self.flags.intersects(MountFlags::PROPAGATION) {
            MountKind::Propagation
        } else if self.fstype == "overlay" {
            MountKind::Overlay
        } else if self.internal_options.iter().any(|o| o == "loop")
            || AUTHORIZED_IMAGE.iter().any(|(name, _)| *name == self.fstype)
        {
            MountKind::Image
        } else {
            MountKind::Fs
        }
    }

    /// Value of the first data option named `key` (`key=value`).
    #[must_use]
    pub fn option_value(&self, key: &str) -> Option<&str> {
        find_value(&self.options, key)
    }

    /// Loop device offset of an image.
    #[must_use]
    pub fn loop_offset(&self) -> Option<u64> {
        find_value(&self.internal_options, "offset")
            .and_then(|v| v.parse().ok())
    }

    /// Loop device size limit of an image.
    #[must_use]
    pub fn size_limit(&self) -> Option<u64> {
        find_value(&self.internal_options, "sizelimit")
            .and_then(|v| v.parse().ok())
    }

    /// Decryption key of an encrypted image.
    #[must_use]
    pub fn key(&self) -> Option<Vec<u8>> {
        find_value(&self.internal_options, "key")
            .and_then(|v| hex::decode(v).ok())
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.source.display(),
            self.destination.display()
        )?;
        if !self.fstype.is_empty() {
            write!(f, " ({})", self.fstype)?;
        }
        if !self.options.is_empty() {
            write!(f, " [{}]", self.options.join(","))?;
        }
        Ok(())
    }
}

fn find_value<'a>(options: &'a [String], key: &str) -> Option<&'a str> {
    options.iter().find_map(|option| {
        option
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
    })
}
