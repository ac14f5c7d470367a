//! Mount point registry and orchestration.
//!
//! This module handles:
//! - Tag definitions and their fixed processing order
//! - Validated mount point constructors
//! - Import from generic mount specifications
//! - Ordered execution with before/after hooks

mod context;
mod flags;
mod import;
mod point;
mod points;
mod syscall;
mod system;
mod tag;

pub use context::{ContextPolicy, SELinuxContext};
pub use flags::{MountFlags, convert_options, flag_options};
pub use import::MountSpec;
pub use point::{AUTHORIZED_FS, AUTHORIZED_IMAGE, MountKind, MountPoint, context_eligible};
pub use points::{ImageOptions, Points};
pub use syscall::SystemMounter;
pub use system::{Hook, Mounter, RecordingMounter, System};
pub use tag::Tag;
