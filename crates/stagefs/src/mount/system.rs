//! Mount orchestration.
//!
//! [`System`] owns the registry and runs every point through a [`Mounter`]
//! in tag order, with one-shot hooks before and after each tag.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use stagefs_common::{StageError, StageResult};

use super::point::MountPoint;
use super::points::Points;
use super::tag::Tag;

/// Executes a single mount point.
pub trait Mounter {
    /// Apply `point`.
    fn mount(&mut self, point: &MountPoint) -> StageResult<()>;
}

impl<F> Mounter for F
where
    F: FnMut(&MountPoint) -> StageResult<()>,
{
    fn mount(&mut self, point: &MountPoint) -> StageResult<()> {
        self(point)
    }
}

/// Mounter that records points instead of mounting them.
///
/// Clones share the same record, so a clone can be handed to a [`System`]
/// while the original is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingMounter {
    calls: Rc<RefCell<Vec<MountPoint>>>,
}

impl RecordingMounter {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Points mounted so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<MountPoint> {
        self.calls.borrow().clone()
    }

    /// Number of mount calls so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Whether nothing was mounted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }
}

impl Mounter for RecordingMounter {
    fn mount(&mut self, point: &MountPoint) -> StageResult<()> {
        self.calls.borrow_mut().push(point.clone());
        Ok(())
    }
}

/// One-shot function bound to a tag.
pub type Hook = Box<dyn FnOnce(&mut System) -> StageResult<()>>;

/// Mount orchestrator.
pub struct System {
    points: Points,
    mounter: Box<dyn Mounter>,
    before: HashMap<Tag, Vec<Hook>>,
    after: HashMap<Tag, Vec<Hook>>,
    current: Option<Tag>,
}

impl System {
    /// Create an orchestrator over `points`, mounting through `mounter`.
    pub fn new(points: Points, mounter: impl Mounter + 'static) -> Self {
        Self {
            points,
            mounter: Box::new(mounter),
            before: HashMap::new(),
            after: HashMap::new(),
            current: None,
        }
    }

    /// The registry.
    #[must_use]
    pub const fn points(&self) -> &Points {
        &self.points
    }

    /// Mutable access to the registry, for hooks adding points.
    pub const fn points_mut(&mut self) -> &mut Points {
        &mut self.points
    }

    /// Replace the mounter, e.g. once the session paths are known.
    pub fn set_mounter(&mut self, mounter: impl Mounter + 'static) {
        self.mounter = Box::new(mounter);
    }

    /// Tag currently being processed by [`System::mount_all`].
    #[must_use]
    pub const fn current_tag(&self) -> Option<Tag> {
        self.current
    }

    /// Run `hook` once, right before the points of `tag` are mounted.
    pub fn run_before_tag(
        &mut self,
        tag: Tag,
        hook: impl FnOnce(&mut Self) -> StageResult<()> + 'static,
    ) -> StageResult<()> {
        self.check_pending(tag, true)?;
        self.before.entry(tag).or_default().push(Box::new(hook));
        Ok(())
    }

    /// Run `hook` once, right after the points of `tag` are mounted.
    pub fn run_after_tag(
        &mut self,
        tag: Tag,
        hook: impl FnOnce(&mut Self) -> StageResult<()> + 'static,
    ) -> StageResult<()> {
        self.check_pending(tag, false)?;
        self.after.entry(tag).or_default().push(Box::new(hook));
        Ok(())
    }

    /// Mount everything in tag order.
    ///
    /// For each tag: before-hooks in registration order, then points in
    /// insertion order, then after-hooks. Points are read after the
    /// before-hooks ran, so hooks may add points to their own tag; an
    /// after-hook registered by another after-hook of the same tag runs in
    /// the same pass. The first
    /// failure aborts the pass; points already mounted stay mounted.
    pub fn mount_all(&mut self) -> StageResult<()> {
        tracing::info!(points = self.points.len(), "Mounting all points");

        for tag in Tag::ALL {
            self.current = Some(tag);

            for hook in self.before.remove(&tag).unwrap_or_default() {
                hook(self).map_err(|e| hook_error(tag, e))?;
            }

            let points = self.points.get_by_tag(tag).to_vec();
            for point in &points {
                tracing::debug!(%tag, %point, "Mounting");
                self.mounter
                    .mount(point)
                    .map_err(|e| StageError::MountFailed {
                        tag: tag.to_string(),
                        point: point.to_string(),
                        source: Box::new(e),
                    })?;
            }

            // After-hooks may schedule more after-hooks for the same tag.
            while let Some(hooks) = self.after.remove(&tag) {
                for hook in hooks {
                    hook(self).map_err(|e| hook_error(tag, e))?;
                }
            }
        }

        self.current = None;
        tracing::info!("All mount points processed");
        Ok(())
    }

    // Hooks for a tag already behind the pass would silently never run.
    fn check_pending(&self, tag: Tag, before: bool) -> StageResult<()> {
        let Some(current) = self.current else {
            return Ok(());
        };
        if tag < current || (before && tag == current) {
            return Err(StageError::HookRegistration {
                tag: tag.to_string(),
                message: format!("mount pass is already at tag {current}"),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("points", &self.points)
            .field("before", &self.before.keys().collect::<Vec<_>>())
            .field("after", &self.after.keys().collect::<Vec<_>>())
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

fn hook_error(tag: Tag, err: StageError) -> StageError {
    StageError::Hook {
        tag: tag.to_string(),
        source: Box::new(err),
    }
}
