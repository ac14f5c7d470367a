//! SELinux mount context handling.
//!
//! A single process-wide context can be attached to the registry. Eligible
//! mount points then receive a `context="..."` option automatically.

use std::fmt;

use serde::{Deserialize, Serialize};
use stagefs_common::{StageError, StageResult};

use super::point::MountKind;

/// Parsed SELinux security context (`user:role:type[:level]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SELinuxContext {
    /// User component.
    pub user: String,
    /// Role component.
    pub role: String,
    /// Type component.
    pub type_: String,
    /// Level component (optional, may itself contain `:` and `,`).
    pub level: Option<String>,
}

impl SELinuxContext {
    /// Parse a context string.
    pub fn parse(context: &str) -> StageResult<Self> {
        let mut parts = context.splitn(4, ':');
        let (Some(user), Some(role), Some(type_)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(StageError::Config {
                message: format!("Invalid SELinux context: {context}"),
            });
        };
        if [user, role, type_].iter().any(|s| s.is_empty() || s.contains('"')) {
            return Err(StageError::Config {
                message: format!("Invalid SELinux context: {context}"),
            });
        }

        Ok(Self {
            user: user.to_string(),
            role: role.to_string(),
            type_: type_.to_string(),
            level: parts.next().map(String::from),
        })
    }

    /// Mount option carrying this context.
    ///
    /// The value is quoted since MLS levels contain commas.
    #[must_use]
    pub fn mount_option(&self) -> String {
        format!("context=\"{self}\"")
    }
}

impl fmt::Display for SELinuxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.level {
            Some(level) => write!(f, "{}:{}:{}:{}", self.user, self.role, self.type_, level),
            None => write!(f, "{}:{}:{}", self.user, self.role, self.type_),
        }
    }
}

/// Rules deciding which mount points receive the automatic context option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextPolicy {
    /// Filesystem, image and overlay mounts of a context-capable fstype get
    /// the option. Binds, remounts and propagation changes never do: the
    /// kernel rejects or ignores `context=` on them.
    #[default]
    Linux,
    /// Never add the option, for hosts without SELinux support.
    Portable,
}

impl ContextPolicy {
    /// Policy matching the build target.
    #[must_use]
    pub const fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Portable
        }
    }

    /// Whether a point of `kind` with a context-capable fstype gets the option.
    #[must_use]
    pub const fn applies_to(self, kind: MountKind) -> bool {
        match self {
            Self::Linux => matches!(kind, MountKind::Fs | MountKind::Image | MountKind::Overlay),
            Self::Portable => false,
        }
    }
}
