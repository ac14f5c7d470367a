//! Overlay filesystem layer.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use stagefs_common::StageResult;

use super::{Layer, create_placeholders, rootfs_path};
use crate::layout::SessionRef;
use crate::mount::{MountFlags, System, Tag};

/// Session directory holding the placeholders, used as the top lower layer.
pub const OVERLAY_DIR: &str = "/overlay-lowerdir";

/// Overlay layer configuration.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    lower_dirs: Vec<PathBuf>,
    upper_dir: Option<PathBuf>,
    work_dir: Option<PathBuf>,
}

impl Overlay {
    /// Read-only overlay of the placeholders on top of the rootfs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lower directory, below the ones added before it.
    #[must_use]
    pub fn add_lower_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lower_dirs.push(dir.into());
        self
    }

    /// Make the overlay writable through `upper`, with `work` as work directory.
    #[must_use]
    pub fn with_upper_dir(mut self, upper: impl Into<PathBuf>, work: impl Into<PathBuf>) -> Self {
        self.upper_dir = Some(upper.into());
        self.work_dir = Some(work.into());
        self
    }

    /// Lower directory list, highest priority first.
    #[must_use]
    pub fn lowerdir(&self, placeholders: &Path, rootfs: &Path) -> String {
        std::iter::once(placeholders)
            .chain(self.lower_dirs.iter().map(PathBuf::as_path))
            .chain(std::iter::once(rootfs))
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    fn prepare(self, session: &SessionRef, system: &mut System) -> StageResult<()> {
        let mut session = session.borrow_mut();
        let rootfs = rootfs_path(system.points(), &session);

        let created = create_placeholders(
            &mut session,
            system.points(),
            Path::new(OVERLAY_DIR),
            &rootfs,
        )?;
        session.update()?;

        let lowerdir = self.lowerdir(&session.get_path(OVERLAY_DIR)?, &rootfs);
        let mut flags = MountFlags::NODEV;
        if self.upper_dir.is_none() {
            flags |= MountFlags::RDONLY;
        }

        tracing::debug!(
            placeholders = created.len(),
            lowerdir = %lowerdir,
            writable = self.upper_dir.is_some(),
            "Adding overlay"
        );

        system.points_mut().add_overlay(
            Tag::Layer,
            session.final_path(),
            flags,
            &lowerdir,
            self.upper_dir.as_deref(),
            self.work_dir.as_deref(),
        )
    }
}

impl Layer for Overlay {
    fn dir(&self) -> &str {
        OVERLAY_DIR
    }

    fn add(self: Box<Self>, session: &SessionRef, system: &mut System) -> StageResult<()> {
        session.borrow_mut().add_dir(OVERLAY_DIR)?;
        let session = Rc::clone(session);
        system.run_before_tag(Tag::Layer, move |system| {
            (*self).prepare(&session, system)
        })
    }
}
