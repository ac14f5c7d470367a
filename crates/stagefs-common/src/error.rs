//! Common error types for stagefs.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`StageError`].
pub type StageResult<T> = Result<T, StageError>;

/// Errors raised while registering, staging or executing mounts.
#[derive(Error, Diagnostic, Debug)]
pub enum StageError {
    /// A mount point failed validation.
    #[error("Invalid mount point: {message}")]
    #[diagnostic(code(stagefs::mount::invalid))]
    InvalidMount {
        /// What was wrong with the mount point.
        message: String,
    },

    /// A tag name that is not part of the fixed tag set.
    #[error("Unknown mount tag: {name}")]
    #[diagnostic(
        code(stagefs::mount::unknown_tag),
        help("Valid tags are sessiondir, rootfs, prelayer, layer, dev, hostfs, binds, kernel, home, tmp, scratch, cwd, files, userbinds, other and final")
    )]
    UnknownTag {
        /// The rejected tag name.
        name: String,
    },

    /// The SELinux mount context was already set.
    #[error("SELinux mount context already set to {current}")]
    #[diagnostic(code(stagefs::mount::context_set))]
    ContextAlreadySet {
        /// The context currently in effect.
        current: String,
    },

    /// Mounting a registered point failed.
    #[error("Mount of {point} (tag {tag}) failed: {source}")]
    #[diagnostic(code(stagefs::mount::failed))]
    MountFailed {
        /// Tag being processed.
        tag: String,
        /// Human readable description of the point.
        point: String,
        /// Underlying error.
        source: Box<StageError>,
    },

    /// A hook registered on a tag failed.
    #[error("Hook for tag {tag} failed: {source}")]
    #[diagnostic(code(stagefs::mount::hook))]
    Hook {
        /// Tag the hook was bound to.
        tag: String,
        /// Underlying error.
        source: Box<StageError>,
    },

    /// A hook could not be registered.
    #[error("Cannot register hook for tag {tag}: {message}")]
    #[diagnostic(code(stagefs::mount::hook_registration))]
    HookRegistration {
        /// Tag the hook was bound to.
        tag: String,
        /// Reason for the rejection.
        message: String,
    },

    /// Layout manipulation or synchronization error.
    #[error("Layout error at {path}: {message}")]
    #[diagnostic(code(stagefs::layout))]
    Layout {
        /// Virtual or real path involved.
        path: String,
        /// The error message.
        message: String,
    },

    /// Layer construction error.
    #[error("Layer error: {message}")]
    #[diagnostic(code(stagefs::layer))]
    Layer {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(stagefs::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(stagefs::serialization))]
    Serialization(String),

    /// Feature not supported on this platform.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(
        code(stagefs::unsupported),
        help("Mount staging requires Linux")
    )]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(stagefs::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl StageError {
    /// Shorthand for [`StageError::InvalidMount`].
    pub fn invalid_mount(message: impl Into<String>) -> Self {
        Self::InvalidMount {
            message: message.into(),
        }
    }

    /// Shorthand for [`StageError::Layout`].
    pub fn layout(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::Layout {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for StageError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
