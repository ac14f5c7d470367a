//! Underlay layer.
//!
//! Without overlay support the union view is built by hand: the rootfs
//! directories leading to each placeholder are recreated in the session and
//! every other entry they hold is bind mounted read-only from the rootfs.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use stagefs_common::paths::depth;
use stagefs_common::{StageError, StageResult, join_under};

use super::{Layer, create_placeholders, rootfs_path};
use crate::layout::{Session, SessionRef};
use crate::mount::{MountFlags, Points, System, Tag};

/// Session directory the duplicate tree is built in.
pub const UNDERLAY_DIR: &str = "/underlay";

/// Binds for a single directory above which a warning is logged.
pub const DEFAULT_WARN_THRESHOLD: usize = 50;

/// Underlay layer configuration.
#[derive(Debug, Clone)]
pub struct Underlay {
    warn_threshold: usize,
}

impl Default for Underlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Underlay {
    /// Underlay with the default warning threshold.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            warn_threshold: DEFAULT_WARN_THRESHOLD,
        }
    }

    /// Set the per-directory bind count above which a warning is logged.
    #[must_use]
    pub const fn with_warn_threshold(mut self, threshold: usize) -> Self {
        self.warn_threshold = threshold;
        self
    }

    fn prepare(self, session: &SessionRef, system: &mut System) -> StageResult<()> {
        let mut session = session.borrow_mut();
        let rootfs = rootfs_path(system.points(), &session);

        let mut created = create_placeholders(
            &mut session,
            system.points(),
            Path::new(UNDERLAY_DIR),
            &rootfs,
        )?;
        created.sort_by_key(|p| depth(p));

        let points = system.points_mut();
        let mut done = HashSet::new();
        for dest in &created {
            let mut dir = PathBuf::from("/");
            for component in dest.parent().into_iter().flat_map(Path::components) {
                if let Component::Normal(name) = component {
                    dir.push(name);
                    if done.insert(dir.clone()) {
                        self.duplicate_dir(&mut session, points, &rootfs, &dir)?;
                    }
                }
            }
        }
        self.duplicate_dir(&mut session, points, &rootfs, Path::new("/"))?;

        session.update()?;

        let underlay = session.get_path(UNDERLAY_DIR)?;
        let final_path = session.final_path();
        let flags = MountFlags::BIND | MountFlags::REC | MountFlags::RDONLY;
        tracing::debug!(
            placeholders = created.len(),
            underlay = %underlay.display(),
            "Adding underlay"
        );
        points.add_bind(Tag::Layer, &underlay, &final_path, flags)?;
        points.add_remount(Tag::Layer, &final_path, flags)
    }

    /// Mirror every entry of rootfs directory `dir` not already present in
    /// the underlay: symlinks are copied, the rest is bind mounted.
    fn duplicate_dir(
        &self,
        session: &mut Session,
        points: &mut Points,
        rootfs: &Path,
        dir: &Path,
    ) -> StageResult<()> {
        let host_dir = join_under(rootfs, dir);
        match fs::symlink_metadata(&host_dir) {
            Ok(meta) if meta.is_dir() => {}
            _ => return Ok(()),
        }

        let mut entries = fs::read_dir(&host_dir)
            .map_err(|e| StageError::Layer {
                message: format!("failed to read {}: {e}", host_dir.display()),
            })?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(fs::DirEntry::file_name);

        let base = join_under(Path::new(UNDERLAY_DIR), dir);
        let mut binds = 0;
        for entry in entries {
            let name = entry.file_name();
            let vpath = base.join(&name);
            if session.contains(&vpath) || session.get_override_path(&vpath).is_ok() {
                continue;
            }

            let source = host_dir.join(&name);
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                session.add_symlink(&vpath, fs::read_link(&source)?)?;
                continue;
            }
            if file_type.is_dir() {
                session.add_dir(&vpath)?;
            } else {
                session.add_file(&vpath, Vec::new())?;
            }

            let target = session.get_path(&vpath)?;
            points.add_bind(
                Tag::PreLayer,
                &source,
                &target,
                MountFlags::BIND | MountFlags::REC | MountFlags::RDONLY,
            )?;
            binds += 1;
        }

        if binds > self.warn_threshold {
            tracing::warn!(
                dir = %dir.display(),
                binds,
                "Underlay duplicates many entries, consider overlay"
            );
        }
        Ok(())
    }
}

impl Layer for Underlay {
    fn dir(&self) -> &str {
        UNDERLAY_DIR
    }

    fn add(self: Box<Self>, session: &SessionRef, system: &mut System) -> StageResult<()> {
        session.borrow_mut().add_dir(UNDERLAY_DIR)?;
        let session = Rc::clone(session);
        system.run_before_tag(Tag::PreLayer, move |system| {
            (*self).prepare(&session, system)
        })
    }
}
