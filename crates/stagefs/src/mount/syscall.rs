//! Kernel mount executor.

use std::path::{Path, PathBuf};

use stagefs_common::{StageError, StageResult, join_under};

use super::flags::MountFlags;
use super::point::{MountKind, MountPoint};
use super::system::Mounter;

/// Mounter issuing one `mount(2)` call per point.
///
/// Destinations of container-side tags are rewritten below the final
/// directory; host-side tags and destinations already inside the session
/// directory are used verbatim.
#[derive(Debug, Clone, Default)]
pub struct SystemMounter {
    session_path: Option<PathBuf>,
    final_path: Option<PathBuf>,
}

impl SystemMounter {
    /// Mounter using every destination verbatim.
    #[must_use]
    pub fn host() -> Self {
        Self::default()
    }

    /// Mounter for a session staged at `session_path`, whose container root
    /// ends up at `final_path`.
    #[must_use]
    pub fn for_session(session_path: impl Into<PathBuf>, final_path: impl Into<PathBuf>) -> Self {
        Self {
            session_path: Some(session_path.into()),
            final_path: Some(final_path.into()),
        }
    }

    /// Where `point` is actually mounted on the host.
    #[must_use]
    pub fn target(&self, point: &MountPoint) -> PathBuf {
        let dest = point.destination();
        let inside_session = self
            .session_path
            .as_deref()
            .is_some_and(|session| dest.starts_with(session));

        match &self.final_path {
            Some(root) if !point.tag().is_host_side() && !inside_session => join_under(root, dest),
            _ => dest.to_path_buf(),
        }
    }
}

impl Mounter for SystemMounter {
    fn mount(&mut self, point: &MountPoint) -> StageResult<()> {
        let target = self.target(point);
        let data = point.data_options().join(",");
        let flags = point.flags();

        tracing::debug!(
            source = %point.source().display(),
            target = %target.display(),
            fstype = point.fstype(),
            options = ?point.options(),
            "Mounting filesystem"
        );

        match point.kind() {
            MountKind::Image if point.internal_options().iter().any(|o| o == "loop") => {
                Err(StageError::Unsupported {
                    feature: format!("loop device attach for image {}", point.source().display()),
                })
            }
            MountKind::Bind => {
                sys::bind(point.source(), &target, flags)?;
                // The kernel ignores other flags on the initial bind.
                if !flags
                    .difference(MountFlags::BIND_ONLY | MountFlags::PROPAGATION)
                    .is_empty()
                {
                    sys::remount(&target, flags, "")?;
                }
                propagate(&target, flags)
            }
            MountKind::Remount => {
                sys::remount(&target, flags, &data)?;
                propagate(&target, flags)
            }
            MountKind::Propagation => propagate(&target, flags),
            MountKind::Image | MountKind::Overlay | MountKind::Fs => {
                sys::mount(point.source(), &target, point.fstype(), flags, &data)?;
                propagate(&target, flags)
            }
        }
    }
}

fn propagate(target: &Path, flags: MountFlags) -> StageResult<()> {
    if flags.intersects(MountFlags::PROPAGATION) {
        sys::change(target, flags)
    } else {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::ffi::CString;
    use std::path::Path;

    use rustix::mount::{mount_bind, mount_bind_recursive, mount_change, mount_remount};
    use stagefs_common::{StageError, StageResult};

    use crate::mount::flags::{MountFlags, to_propagation_flags, to_rustix_flags};

    fn errno(err: rustix::io::Errno) -> StageError {
        StageError::Io(err.into())
    }

    pub(super) fn mount(
        source: &Path,
        target: &Path,
        fstype: &str,
        flags: MountFlags,
        data: &str,
    ) -> StageResult<()> {
        let data = CString::new(data).map_err(|_| {
            StageError::invalid_mount(format!("mount data {data:?} contains a NUL byte"))
        })?;
        let data = (!data.as_bytes().is_empty()).then_some(data.as_c_str());

        rustix::mount::mount(source, target, fstype, to_rustix_flags(flags), data)
            .map_err(errno)
    }

    pub(super) fn bind(source: &Path, target: &Path, flags: MountFlags) -> StageResult<()> {
        if flags.contains(MountFlags::REC) {
            mount_bind_recursive(source, target).map_err(errno)
        } else {
            mount_bind(source, target).map_err(errno)
        }
    }

    pub(super) fn remount(target: &Path, flags: MountFlags, data: &str) -> StageResult<()> {
        mount_remount(target, to_rustix_flags(flags), data)
            .map_err(errno)
    }

    pub(super) fn change(target: &Path, flags: MountFlags) -> StageResult<()> {
        mount_change(target, to_propagation_flags(flags))
            .map_err(errno)
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::path::Path;

    use stagefs_common::{StageError, StageResult};

    use crate::mount::flags::MountFlags;

    fn unsupported(feature: &str) -> StageResult<()> {
        Err(StageError::Unsupported {
            feature: feature.to_string(),
        })
    }

    pub(super) fn mount(
        _source: &Path,
        _target: &Path,
        _fstype: &str,
        _flags: MountFlags,
        _data: &str,
    ) -> StageResult<()> {
        unsupported("mount")
    }

    pub(super) fn bind(_source: &Path, _target: &Path, _flags: MountFlags) -> StageResult<()> {
        unsupported("bind mounts")
    }

    pub(super) fn remount(_target: &Path, _flags: MountFlags, _data: &str) -> StageResult<()> {
        unsupported("remount")
    }

    pub(super) fn change(_target: &Path, _flags: MountFlags) -> StageResult<()> {
        unsupported("mount propagation")
    }
}
