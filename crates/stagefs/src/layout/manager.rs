//! Virtual directory tree materialized under a root path.
//!
//! Entries are registered with virtual absolute paths (`/etc/passwd`) and
//! created on disk by [`Manager::create`]. Later additions are picked up by
//! [`Manager::update`]; an entry is never created twice.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use stagefs_common::{StageError, StageResult, join_under};

use super::entry::Entry;

/// Mode of directories created implicitly or by [`Manager::add_dir`].
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Mode of files created by [`Manager::add_file`].
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Layout manager.
#[derive(Debug)]
pub struct Manager {
    root_path: Option<PathBuf>,
    entries: Vec<(PathBuf, Entry)>,
    index: HashMap<PathBuf, usize>,
    overrides: HashMap<PathBuf, Vec<PathBuf>>,
    uid: u32,
    gid: u32,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// Create an empty layout owned by the calling process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root_path: None,
            entries: Vec::new(),
            index: HashMap::new(),
            overrides: HashMap::new(),
            uid: rustix::process::getuid().as_raw(),
            gid: rustix::process::getgid().as_raw(),
        }
    }

    /// Set the host directory the tree is created in. Can be set once.
    pub fn set_root_path(&mut self, path: impl AsRef<Path>) -> StageResult<()> {
        let path = path.as_ref();
        if let Some(root) = &self.root_path {
            return Err(StageError::layout(
                path,
                format!("root path already set to {}", root.display()),
            ));
        }
        if !path.is_absolute() {
            return Err(StageError::layout(path, "root path must be absolute"));
        }
        if !path.is_dir() {
            return Err(StageError::layout(
                path,
                "root path is not an existing directory",
            ));
        }
        self.root_path = Some(path.to_path_buf());
        Ok(())
    }

    /// The root path, once set.
    #[must_use]
    pub fn root_path(&self) -> Option<&Path> {
        self.root_path.as_deref()
    }

    /// Register a directory, creating missing parents.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) -> StageResult<()> {
        let entry = Entry::Dir {
            mode: DEFAULT_DIR_MODE,
            uid: self.uid,
            gid: self.gid,
            created: false,
        };
        self.add(path.as_ref(), entry)
    }

    /// Register a file holding `content`, creating missing parents.
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
    ) -> StageResult<()> {
        let entry = Entry::File {
            mode: DEFAULT_FILE_MODE,
            uid: self.uid,
            gid: self.gid,
            content: content.into(),
            created: false,
        };
        self.add(path.as_ref(), entry)
    }

    /// Register a symlink to `target`, stored verbatim.
    pub fn add_symlink(
        &mut self,
        path: impl AsRef<Path>,
        target: impl AsRef<Path>,
    ) -> StageResult<()> {
        let entry = Entry::Symlink {
            uid: self.uid,
            gid: self.gid,
            target: target.as_ref().to_path_buf(),
            created: false,
        };
        self.add(path.as_ref(), entry)
    }

    /// Change the mode of a registered directory or file.
    pub fn chmod(&mut self, path: impl AsRef<Path>, new_mode: u32) -> StageResult<()> {
        let path = path.as_ref();
        match self.entry_mut(path)? {
            Entry::Dir { mode, .. } | Entry::File { mode, .. } => {
                *mode = new_mode;
                Ok(())
            }
            Entry::Symlink { .. } => {
                Err(StageError::layout(path, "cannot change mode of a symlink"))
            }
        }
    }

    /// Change the owner of a registered entry.
    pub fn chown(&mut self, path: impl AsRef<Path>, new_uid: u32, new_gid: u32) -> StageResult<()> {
        match self.entry_mut(path.as_ref())? {
            Entry::Dir { uid, gid, .. }
            | Entry::File { uid, gid, .. }
            | Entry::Symlink { uid, gid, .. } => {
                *uid = new_uid;
                *gid = new_gid;
            }
        }
        Ok(())
    }

    /// Whether `path` is registered.
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        virtual_path(path.as_ref())
            .is_ok_and(|vp| self.index.contains_key(&vp))
    }

    /// The registered entry at `path`.
    #[must_use]
    pub fn entry(&self, path: impl AsRef<Path>) -> Option<&Entry> {
        let vp = virtual_path(path.as_ref()).ok()?;
        self.index.get(&vp).map(|&i| &self.entries[i].1)
    }

    /// Host path of a registered entry, honoring directory overrides.
    pub fn get_path(&self, path: impl AsRef<Path>) -> StageResult<PathBuf> {
        let path = path.as_ref();
        let root = self.root()?;
        let vp = virtual_path(path)?;
        if vp == Path::new("/") {
            return Ok(root.to_path_buf());
        }
        if !self.index.contains_key(&vp) {
            return Err(StageError::layout(path, "path is not registered"));
        }
        Ok(self.resolve(root, &vp))
    }

    /// Primary override target registered for directory `path`.
    pub fn get_override_path(&self, path: impl AsRef<Path>) -> StageResult<PathBuf> {
        let path = path.as_ref();
        let vp = virtual_path(path)?;
        self.overrides
            .get(&vp)
            .and_then(|targets| targets.first())
            .cloned()
            .ok_or_else(|| StageError::layout(path, "no override registered"))
    }

    /// Redirect directory `path` to the host directory `real_path`.
    ///
    /// Several targets may be registered; the first one is where the
    /// directory's children resolve, the others are created as plain
    /// directories.
    pub fn override_dir(
        &mut self,
        path: impl AsRef<Path>,
        real_path: impl AsRef<Path>,
    ) -> StageResult<()> {
        let vp = virtual_path(path.as_ref())?;
        let real_path = real_path.as_ref();
        if !real_path.is_absolute() {
            return Err(StageError::layout(
                real_path,
                "override target must be absolute",
            ));
        }
        self.overrides
            .entry(vp)
            .or_default()
            .push(real_path.to_path_buf());
        Ok(())
    }

    /// Materialize every registered entry.
    pub fn create(&mut self) -> StageResult<()> {
        tracing::info!(
            root = %self.root()?.display(),
            entries = self.entries.len(),
            "Creating layout"
        );
        self.sync()
    }

    /// Materialize entries registered since the last sync.
    pub fn update(&mut self) -> StageResult<()> {
        tracing::debug!(root = %self.root()?.display(), "Updating layout");
        self.sync()
    }

    pub(crate) fn resolve(&self, root: &Path, vp: &Path) -> PathBuf {
        if let Some(primary) = self.overrides.get(vp).and_then(|t| t.first()) {
            return primary.clone();
        }
        if let (Some(parent), Some(name)) = (vp.parent(), vp.file_name()) {
            if let Some(primary) = self.overrides.get(parent).and_then(|t| t.first()) {
                return primary.join(name);
            }
        }
        join_under(root, vp)
    }

    fn root(&self) -> StageResult<&Path> {
        self.root_path
            .as_deref()
            .ok_or_else(|| StageError::layout("/", "root path is not set"))
    }

    fn entry_mut(&mut self, path: &Path) -> StageResult<&mut Entry> {
        let vp = virtual_path(path)?;
        match self.index.get(&vp) {
            Some(&i) => Ok(&mut self.entries[i].1),
            None => Err(StageError::layout(path, "path is not registered")),
        }
    }

    fn add(&mut self, path: &Path, entry: Entry) -> StageResult<()> {
        self.root()?;
        let vp = virtual_path(path)?;
        if vp == Path::new("/") || self.index.contains_key(&vp) {
            return Err(StageError::layout(path, "path already exists"));
        }

        let mut missing = Vec::new();
        for ancestor in vp.ancestors().skip(1) {
            if ancestor == Path::new("/") {
                break;
            }
            if let Some(&i) = self.index.get(ancestor) {
                if !self.entries[i].1.is_dir() {
                    return Err(StageError::layout(
                        path,
                        format!("parent {} is not a directory", ancestor.display()),
                    ));
                }
                break;
            }
            missing.push(ancestor.to_path_buf());
        }

        for dir in missing.into_iter().rev() {
            let parent = Entry::Dir {
                mode: DEFAULT_DIR_MODE,
                uid: self.uid,
                gid: self.gid,
                created: false,
            };
            self.push(dir, parent);
        }
        self.push(vp, entry);
        Ok(())
    }

    fn push(&mut self, vp: PathBuf, entry: Entry) {
        self.index.insert(vp.clone(), self.entries.len());
        self.entries.push((vp, entry));
    }

    // Directories first so files and symlinks always find their parent.
    fn sync(&mut self) -> StageResult<()> {
        let root = self.root()?.to_path_buf();

        for dirs in [true, false] {
            for i in 0..self.entries.len() {
                let (vp, entry) = &self.entries[i];
                if entry.created() || entry.is_dir() != dirs {
                    continue;
                }
                self.materialize(&root, vp, entry)?;
                self.entries[i].1.mark_created();
            }
        }
        Ok(())
    }

    fn materialize(&self, root: &Path, vp: &Path, entry: &Entry) -> StageResult<()> {
        match entry {
            Entry::Dir { mode, uid, gid, .. } => {
                match self.overrides.get(vp).and_then(|t| t.split_first()) {
                    Some((primary, extra)) => {
                        self.make_dir(primary, *mode, *uid, *gid)?;
                        for target in extra {
                            plain_dir(target)?;
                        }
                        Ok(())
                    }
                    None => self.make_dir(&self.resolve(root, vp), *mode, *uid, *gid),
                }
            }
            Entry::File {
                mode,
                uid,
                gid,
                content,
                ..
            } => {
                let real = self.resolve(root, vp);
                tracing::debug!(path = %real.display(), "Creating file");
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(*mode)
                    .open(&real)
                    .map_err(|e| {
                        StageError::layout(&real, format!("failed to create file: {e}"))
                    })?;
                file.write_all(content)
                    .map_err(|e| StageError::layout(&real, format!("failed to write file: {e}")))?;
                set_mode(&real, *mode)?;
                self.apply_owner(&real, *uid, *gid)
            }
            Entry::Symlink { uid, gid, target, .. } => {
                let real = self.resolve(root, vp);
                tracing::debug!(
                    path = %real.display(),
                    target = %target.display(),
                    "Creating symlink"
                );
                std::os::unix::fs::symlink(target, &real).map_err(|e| {
                    StageError::layout(&real, format!("failed to create symlink: {e}"))
                })?;
                self.apply_owner(&real, *uid, *gid)
            }
        }
    }

    // An already existing directory is reused untouched.
    fn make_dir(&self, real: &Path, mode: u32, uid: u32, gid: u32) -> StageResult<()> {
        match fs::create_dir(real) {
            Ok(()) => {
                tracing::debug!(
                    path = %real.display(),
                    mode = %format!("{mode:o}"),
                    "Creating directory"
                );
                set_mode(real, mode)?;
                self.apply_owner(real, uid, gid)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && real.is_dir() => Ok(()),
            Err(e) => Err(StageError::layout(
                real,
                format!("failed to create directory: {e}"),
            )),
        }
    }

    fn apply_owner(&self, real: &Path, uid: u32, gid: u32) -> StageResult<()> {
        if uid == self.uid && gid == self.gid {
            return Ok(());
        }
        std::os::unix::fs::lchown(real, Some(uid), Some(gid))
            .map_err(|e| StageError::layout(real, format!("failed to change owner: {e}")))
    }
}

fn plain_dir(real: &Path) -> StageResult<()> {
    match fs::create_dir(real) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && real.is_dir() => Ok(()),
        Err(e) => Err(StageError::layout(
            real,
            format!("failed to create directory: {e}"),
        )),
    }
}

// The process umask applies at creation time.
fn set_mode(real: &Path, mode: u32) -> StageResult<()> {
    fs::set_permissions(real, fs::Permissions::from_mode(mode))
        .map_err(|e| StageError::layout(real, format!("failed to set mode: {e}")))
}

/// Normalize a virtual path: absolute, no `..`, no `.` or empty components.
fn virtual_path(path: &Path) -> StageResult<PathBuf> {
    if !path.is_absolute() {
        return Err(StageError::layout(path, "layout paths must be absolute"));
    }
    let mut vp = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(name) => vp.push(name),
            Component::ParentDir => {
                return Err(StageError::layout(
                    path,
                    "layout paths must not contain '..'",
                ));
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    Ok(vp)
}
