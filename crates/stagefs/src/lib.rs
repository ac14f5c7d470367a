//! # stagefs
//!
//! Ordered mount staging for container root filesystems.
//!
//! ## Features
//!
//! - **Mount registry**: validated mount points grouped by tag, with canonical options
//! - **Orchestration**: one pass in fixed tag order with before/after hooks
//! - **Session layout**: a virtual tree materialized in a session filesystem
//! - **Layers**: overlay, or an underlay of read-only binds when overlay is missing
//!
//! ## Usage
//!
//! ```no_run
//! use stagefs::layer::Overlay;
//! use stagefs::layout::Session;
//! use stagefs::mount::{MountFlags, Points, System, SystemMounter, Tag};
//!
//! # fn example() -> stagefs_common::StageResult<()> {
//! let mut points = Points::new();
//! points.add_bind(Tag::Userbinds, "/host/data", "/data", MountFlags::BIND)?;
//!
//! let mut system = System::new(points, SystemMounter::host());
//! let session = Session::new(
//!     "/var/lib/stagefs/mnt/session",
//!     "tmpfs",
//!     Some(16),
//!     &mut system,
//!     Some(Box::new(Overlay::new())),
//! )?;
//! system.set_mounter(session.borrow().mounter());
//! system.mount_all()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod layer;
pub mod layout;
pub mod mount;

pub use config::StageConfig;
pub use layout::{Session, SessionRef};
pub use mount::{MountPoint, Points, System, Tag};
