//! Mount point tags.
//!
//! Every mount point belongs to exactly one tag. Tags are processed in a fixed
//! order and each one either accepts a single point or many.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stagefs_common::StageError;

/// Category of a mount point, defining when it is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// Session backing store.
    #[serde(rename = "sessiondir")]
    Session,
    /// Container root filesystem image.
    Rootfs,
    /// Mounts needed before the layer is assembled.
    PreLayer,
    /// Overlay or underlay union mount.
    Layer,
    /// Device filesystems.
    Dev,
    /// Host filesystems.
    Hostfs,
    /// System configured binds.
    Binds,
    /// Kernel pseudo filesystems.
    Kernel,
    /// Home directory.
    Home,
    /// Temporary directories.
    Tmp,
    /// Scratch directories.
    Scratch,
    /// Current working directory.
    Cwd,
    /// Generated files (passwd, group, resolv.conf).
    Files,
    /// User requested binds.
    Userbinds,
    /// Anything else.
    Other,
    /// Last mounts, applied on top of everything.
    Final,
}

impl Tag {
    /// All tags in processing order.
    pub const ALL: [Self; 16] = [
        Self::Session,
        Self::Rootfs,
        Self::PreLayer,
        Self::Layer,
        Self::Dev,
        Self::Hostfs,
        Self::Binds,
        Self::Kernel,
        Self::Home,
        Self::Tmp,
        Self::Scratch,
        Self::Cwd,
        Self::Files,
        Self::Userbinds,
        Self::Other,
        Self::Final,
    ];

    /// Position of the tag in the processing order.
    #[must_use]
    pub const fn order(self) -> usize {
        self as usize
    }

    /// Whether the tag accepts more than one mount point.
    #[must_use]
    pub const fn multi_point(self) -> bool {
        !matches!(self, Self::Session | Self::Rootfs | Self::Home | Self::Cwd)
    }

    /// Whether destinations of this tag are host paths rather than paths
    /// inside the container root.
    #[must_use]
    pub const fn is_host_side(self) -> bool {
        matches!(
            self,
            Self::Session | Self::Rootfs | Self::PreLayer | Self::Layer
        )
    }

    /// Canonical tag name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "sessiondir",
            Self::Rootfs => "rootfs",
            Self::PreLayer => "prelayer",
            Self::Layer => "layer",
            Self::Dev => "dev",
            Self::Hostfs => "hostfs",
            Self::Binds => "binds",
            Self::Kernel => "kernel",
            Self::Home => "home",
            Self::Tmp => "tmp",
            Self::Scratch => "scratch",
            Self::Cwd => "cwd",
            Self::Files => "files",
            Self::Userbinds => "userbinds",
            Self::Other => "other",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| StageError::UnknownTag {
                name: s.to_string(),
            })
    }
}
