//! Session directory.
//!
//! The session is a small filesystem mounted on the host at the very first
//! tag. It holds the container root staging directory, the directory a
//! layer assembles the final root in, and whatever the layer stages.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use stagefs_common::StageResult;

use super::manager::Manager;
use crate::layer::Layer;
use crate::mount::{MountFlags, System, SystemMounter, Tag};

/// Virtual path of the container root staging directory.
pub const ROOTFS_DIR: &str = "/rootfs";

/// Virtual path of the assembled root when a layer is attached.
pub const FINAL_DIR: &str = "/final";

/// Session shared between the caller and the hooks it registers.
pub type SessionRef = Rc<RefCell<Session>>;

/// Layout manager bound to the session filesystem.
#[derive(Debug)]
pub struct Session {
    manager: Manager,
    path: PathBuf,
    layer_dir: Option<PathBuf>,
}

impl Session {
    /// Register the session filesystem on `path` and its layout.
    ///
    /// A `fstype` filesystem is added to [`Tag::Session`] with `nosuid`,
    /// `nodev` and `mode=1777`, plus `size=<N>m` when `size_mb` is given.
    /// The layout is created right after that tag is mounted. When a layer
    /// is supplied it is attached before returning.
    pub fn new(
        path: impl AsRef<Path>,
        fstype: &str,
        size_mb: Option<u64>,
        system: &mut System,
        layer: Option<Box<dyn Layer>>,
    ) -> StageResult<SessionRef> {
        let path = path.as_ref();

        let mut manager = Manager::new();
        manager.set_root_path(path)?;
        manager.add_dir(ROOTFS_DIR)?;
        manager.add_dir(FINAL_DIR)?;
        let layer_dir = layer.as_ref().map(|l| PathBuf::from(l.dir()));

        let options = match size_mb {
            Some(size) => format!("mode=1777,size={size}m"),
            None => "mode=1777".to_string(),
        };
        system.points_mut().add_fs(
            Tag::Session,
            path,
            fstype,
            MountFlags::NOSUID | MountFlags::NODEV,
            &options,
        )?;

        let session = Rc::new(RefCell::new(Self {
            manager,
            path: path.to_path_buf(),
            layer_dir,
        }));

        let hooked = Rc::clone(&session);
        let registered = system
            .run_after_tag(Tag::Session, move |_| hooked.borrow_mut().create());
        if let Err(err) = registered {
            system.points_mut().remove_by_tag(Tag::Session);
            return Err(err);
        }

        tracing::debug!(
            path = %path.display(),
            fstype,
            options = %options,
            "Session registered"
        );

        if let Some(layer) = layer {
            layer.add(&session, system)?;
        }
        Ok(session)
    }

    /// Host path of the session directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Host path of the container root staging directory.
    #[must_use]
    pub fn rootfs_path(&self) -> PathBuf {
        self.manager.resolve(&self.path, Path::new(ROOTFS_DIR))
    }

    /// Host path where the container root is assembled: the final directory
    /// when a layer is attached, the rootfs directory otherwise.
    #[must_use]
    pub fn final_path(&self) -> PathBuf {
        if self.layer_dir.is_some() {
            self.manager.resolve(&self.path, Path::new(FINAL_DIR))
        } else {
            self.rootfs_path()
        }
    }

    /// Virtual directory reserved by the attached layer.
    #[must_use]
    pub fn layer_dir(&self) -> Option<&Path> {
        self.layer_dir.as_deref()
    }

    /// Kernel mounter targeting this session.
    #[must_use]
    pub fn mounter(&self) -> SystemMounter {
        SystemMounter::for_session(&self.path, self.final_path())
    }
}

impl Deref for Session {
    type Target = Manager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.manager
    }
}
