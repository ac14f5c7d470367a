//! Staging configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stagefs_common::{SESSION_DIR, StageError, StageResult};

use crate::layer::{DEFAULT_WARN_THRESHOLD, Layer, LayerChoice, Overlay};
use crate::layout::SessionRef;
use crate::mount::{AUTHORIZED_FS, ContextPolicy, Points, SELinuxContext, System};

/// Staging configuration, usually loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    /// Host directory the session filesystem is mounted on.
    pub session_dir: PathBuf,
    /// Session filesystem type.
    pub session_fstype: String,
    /// Session size in MiB. Negative means unbounded.
    pub session_size_mb: i64,
    /// Layer selection.
    pub layer: LayerChoice,
    /// Extra overlay lower directories, highest priority first.
    pub lower_dirs: Vec<PathBuf>,
    /// Overlay upper directory.
    pub upper_dir: Option<PathBuf>,
    /// Overlay work directory, required with an upper directory.
    pub work_dir: Option<PathBuf>,
    /// SELinux context applied to eligible mounts.
    pub selinux_context: Option<String>,
    /// Which mounts receive the SELinux context.
    pub context_policy: ContextPolicy,
    /// Underlay binds for one directory above which a warning is logged.
    pub underlay_warn_threshold: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            session_dir: SESSION_DIR.clone(),
            session_fstype: "tmpfs".to_string(),
            session_size_mb: 16,
            layer: LayerChoice::default(),
            lower_dirs: Vec::new(),
            upper_dir: None,
            work_dir: None,
            selinux_context: None,
            context_policy: ContextPolicy::platform_default(),
            underlay_warn_threshold: DEFAULT_WARN_THRESHOLD,
        }
    }
}

impl StageConfig {
    /// Load and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> StageResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| StageError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML configuration.
    pub fn from_toml(content: &str) -> StageResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> StageResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StageError::Serialization(e.to_string()))
    }

    /// Check values the types alone cannot enforce.
    pub fn validate(&self) -> StageResult<()> {
        if !AUTHORIZED_FS.iter().any(|(name, _)| *name == self.session_fstype) {
            return Err(config_error(format!(
                "session filesystem {} is not authorized",
                self.session_fstype
            )));
        }
        if !self.session_dir.is_absolute() {
            return Err(config_error("session_dir must be absolute"));
        }
        if self.upper_dir.is_some() != self.work_dir.is_some() {
            return Err(config_error("upper_dir and work_dir must be set together"));
        }
        if let Some(context) = &self.selinux_context {
            SELinuxContext::parse(context)?;
        }
        Ok(())
    }

    /// Session size bound, if any.
    #[must_use]
    pub fn session_size(&self) -> Option<u64> {
        u64::try_from(self.session_size_mb).ok()
    }

    /// Empty registry carrying the context settings.
    pub fn points(&self) -> StageResult<Points> {
        let mut points = Points::with_context_policy(self.context_policy);
        if let Some(context) = &self.selinux_context {
            points.set_context(context)?;
        }
        Ok(points)
    }

    /// Layer instance for this configuration.
    #[must_use]
    pub fn build_layer(&self) -> Option<Box<dyn Layer>> {
        let overlay_tuned = !self.lower_dirs.is_empty() || self.upper_dir.is_some();
        match self.layer {
            LayerChoice::Overlay if overlay_tuned => Some(Box::new(self.overlay())),
            LayerChoice::Auto if overlay_tuned && crate::layer::overlay_supported() => {
                Some(Box::new(self.overlay()))
            }
            choice => choice.build(self.underlay_warn_threshold),
        }
    }

    /// Register the session and its layer on `system`.
    pub fn session(&self, system: &mut System) -> StageResult<SessionRef> {
        crate::layout::Session::new(
            &self.session_dir,
            &self.session_fstype,
            self.session_size(),
            system,
            self.build_layer(),
        )
    }

    fn overlay(&self) -> Overlay {
        let mut overlay = self
            .lower_dirs
            .iter()
            .fold(Overlay::new(), |overlay, dir| overlay.add_lower_dir(dir));
        if let (Some(upper), Some(work)) = (&self.upper_dir, &self.work_dir) {
            overlay = overlay.with_upper_dir(upper, work);
        }
        overlay
    }

    /// Set the session directory.
    #[must_use]
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = dir.into();
        self
    }

    /// Set the session size in MiB.
    #[must_use]
    pub const fn with_session_size(mut self, size_mb: i64) -> Self {
        self.session_size_mb = size_mb;
        self
    }

    /// Set the layer selection.
    #[must_use]
    pub const fn with_layer(mut self, layer: LayerChoice) -> Self {
        self.layer = layer;
        self
    }

    /// Set the SELinux context.
    #[must_use]
    pub fn with_selinux_context(mut self, context: impl Into<String>) -> Self {
        self.selinux_context = Some(context.into());
        self
    }

    /// Set the context policy.
    #[must_use]
    pub const fn with_context_policy(mut self, policy: ContextPolicy) -> Self {
        self.context_policy = policy;
        self
    }
}

fn config_error(message: impl Into<String>) -> StageError {
    StageError::Config {
        message: message.into(),
    }
}
