//! Session directory layout.

mod entry;
mod manager;
mod session;

pub use entry::Entry;
pub use manager::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, Manager};
pub use session::{FINAL_DIR, ROOTFS_DIR, Session, SessionRef};
