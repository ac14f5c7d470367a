//! Semantic mount flags and their canonical option strings.

use bitflags::bitflags;

bitflags! {
    /// Mount flags independent of the kernel's `MS_*` encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MountFlags: u32 {
        /// Bind mount.
        const BIND = 1 << 0;
        /// Apply recursively (rbind, rprivate...).
        const REC = 1 << 1;
        /// Change flags of an existing mount.
        const REMOUNT = 1 << 2;
        /// Read-only.
        const RDONLY = 1 << 3;
        /// Ignore suid and sgid bits.
        const NOSUID = 1 << 4;
        /// Disallow device files.
        const NODEV = 1 << 5;
        /// Disallow program execution.
        const NOEXEC = 1 << 6;
        /// Synchronous writes.
        const SYNCHRONOUS = 1 << 7;
        /// Synchronous directory updates.
        const DIRSYNC = 1 << 8;
        /// Mandatory locking.
        const MANDLOCK = 1 << 9;
        /// Do not update access times.
        const NOATIME = 1 << 10;
        /// Do not update directory access times.
        const NODIRATIME = 1 << 11;
        /// Relative access time updates.
        const RELATIME = 1 << 12;
        /// Always update access times.
        const STRICTATIME = 1 << 13;
        /// Suppress kernel warnings.
        const SILENT = 1 << 14;
        /// Shared propagation.
        const SHARED = 1 << 15;
        /// Slave propagation.
        const SLAVE = 1 << 16;
        /// Private propagation.
        const PRIVATE = 1 << 17;
        /// Unbindable propagation.
        const UNBINDABLE = 1 << 18;

        /// Any propagation kind.
        const PROPAGATION = Self::SHARED.bits()
            | Self::SLAVE.bits()
            | Self::PRIVATE.bits()
            | Self::UNBINDABLE.bits();
        /// Flags that only make sense for bind or remount operations.
        const BIND_ONLY = Self::BIND.bits() | Self::REMOUNT.bits() | Self::REC.bits();
    }
}

/// Per-mount flags in canonical precedence order, after bind and remount.
const SIMPLE_FLAGS: &[(MountFlags, &str)] = &[
    (MountFlags::RDONLY, "ro"),
    (MountFlags::NOSUID, "nosuid"),
    (MountFlags::NODEV, "nodev"),
    (MountFlags::NOEXEC, "noexec"),
    (MountFlags::SYNCHRONOUS, "sync"),
    (MountFlags::DIRSYNC, "dirsync"),
    (MountFlags::MANDLOCK, "mand"),
    (MountFlags::NOATIME, "noatime"),
    (MountFlags::NODIRATIME, "nodiratime"),
    (MountFlags::RELATIME, "relatime"),
    (MountFlags::STRICTATIME, "strictatime"),
    (MountFlags::SILENT, "silent"),
];

/// Propagation flags with their plain and recursive option names.
const PROPAGATION_FLAGS: &[(MountFlags, &str, &str)] = &[
    (MountFlags::SHARED, "shared", "rshared"),
    (MountFlags::SLAVE, "slave", "rslave"),
    (MountFlags::PRIVATE, "private", "rprivate"),
    (MountFlags::UNBINDABLE, "unbindable", "runbindable"),
];

/// Options that clear a flag when parsed.
const CLEARING_OPTIONS: &[(&str, MountFlags)] = &[
    ("rw", MountFlags::RDONLY),
    ("suid", MountFlags::NOSUID),
    ("dev", MountFlags::NODEV),
    ("exec", MountFlags::NOEXEC),
    ("async", MountFlags::SYNCHRONOUS),
    ("nomand", MountFlags::MANDLOCK),
    ("atime", MountFlags::NOATIME),
    ("diratime", MountFlags::NODIRATIME),
    ("norelatime", MountFlags::RELATIME),
    ("nostrictatime", MountFlags::STRICTATIME),
    ("loud", MountFlags::SILENT),
];

/// Convert a flag set to canonical option strings.
///
/// The output order is fixed: bind/rbind, remount, per-mount flags, then
/// propagation. The same flag set always yields the same list.
#[must_use]
pub fn flag_options(flags: MountFlags) -> Vec<String> {
    let rec = flags.contains(MountFlags::REC);
    let mut options = Vec::new();

    if flags.contains(MountFlags::BIND) {
        options.push(if rec { "rbind" } else { "bind" }.to_string());
    }
    if flags.contains(MountFlags::REMOUNT) {
        options.push("remount".to_string());
    }
    for (flag, name) in SIMPLE_FLAGS {
        if flags.contains(*flag) {
            options.push((*name).to_string());
        }
    }
    for (flag, name, rname) in PROPAGATION_FLAGS {
        if flags.contains(*flag) {
            options.push(if rec { *rname } else { *name }.to_string());
        }
    }

    options
}

/// Parse option strings into a flag set and the remaining data options.
///
/// Unknown options are returned untouched, in order, as data options.
/// `defaults` and empty entries are dropped.
#[must_use]
pub fn convert_options<S: AsRef<str>>(options: &[S]) -> (MountFlags, Vec<String>) {
    let mut flags = MountFlags::empty();
    let mut data = Vec::new();

    for option in options {
        let option = option.as_ref().trim();
        if option.is_empty() || option == "defaults" {
            continue;
        }
        if let Some(parsed) = option_flag(option) {
            flags |= parsed;
            continue;
        }
        if let Some((_, cleared)) = CLEARING_OPTIONS.iter().find(|(name, _)| *name == option) {
            flags.remove(*cleared);
            continue;
        }
        data.push(option.to_string());
    }

    (flags, data)
}

/// Whether an option string is a flag keyword rather than a data option.
#[must_use]
pub fn is_flag_option(option: &str) -> bool {
    option_flag(option).is_some() || CLEARING_OPTIONS.iter().any(|(name, _)| *name == option)
}

fn option_flag(option: &str) -> Option<MountFlags> {
    match option {
        "bind" => return Some(MountFlags::BIND),
        "rbind" => return Some(MountFlags::BIND | MountFlags::REC),
        "remount" => return Some(MountFlags::REMOUNT),
        _ => {}
    }
    if let Some((flag, _)) = SIMPLE_FLAGS.iter().find(|(_, name)| *name == option) {
        return Some(*flag);
    }
    PROPAGATION_FLAGS.iter().find_map(|(flag, name, rname)| {
        if *name == option {
            Some(*flag)
        } else if *rname == option {
            Some(*flag | MountFlags::REC)
        } else {
            None
        }
    })
}

/// Per-mount flags as understood by `rustix::mount::mount`.
///
/// Remount and propagation bits are left out; they go through
/// `mount_remount` and `mount_change` instead.
#[cfg(target_os = "linux")]
#[must_use]
pub fn to_rustix_flags(flags: MountFlags) -> rustix::mount::MountFlags {
    use rustix::mount::MountFlags as Kernel;

    const TABLE: &[(MountFlags, Kernel)] = &[
        (MountFlags::BIND, Kernel::BIND),
        (MountFlags::RDONLY, Kernel::RDONLY),
        (MountFlags::NOSUID, Kernel::NOSUID),
        (MountFlags::NODEV, Kernel::NODEV),
        (MountFlags::NOEXEC, Kernel::NOEXEC),
        (MountFlags::SYNCHRONOUS, Kernel::SYNCHRONOUS),
        (MountFlags::DIRSYNC, Kernel::DIRSYNC),
        (MountFlags::MANDLOCK, Kernel::PERMIT_MANDATORY_FILE_LOCKING),
        (MountFlags::NOATIME, Kernel::NOATIME),
        (MountFlags::NODIRATIME, Kernel::NODIRATIME),
        (MountFlags::RELATIME, Kernel::RELATIME),
        (MountFlags::STRICTATIME, Kernel::STRICTATIME),
        (MountFlags::SILENT, Kernel::SILENT),
    ];

    let mut kernel = TABLE
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(Kernel::empty(), |acc, (_, bits)| acc | *bits);
    if flags.contains(MountFlags::BIND | MountFlags::REC) {
        kernel |= Kernel::REC;
    }
    kernel
}

/// Propagation flags for `rustix::mount::mount_change`.
///
/// Empty when `flags` carries no propagation kind.
#[cfg(target_os = "linux")]
#[must_use]
pub fn to_propagation_flags(flags: MountFlags) -> rustix::mount::MountPropagationFlags {
    use rustix::mount::MountPropagationFlags as Propagation;

    const TABLE: &[(MountFlags, Propagation)] = &[
        (MountFlags::SHARED, Propagation::SHARED),
        (MountFlags::SLAVE, Propagation::DOWNSTREAM),
        (MountFlags::PRIVATE, Propagation::PRIVATE),
        (MountFlags::UNBINDABLE, Propagation::UNBINDABLE),
    ];

    let propagation = TABLE
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(Propagation::empty(), |acc, (_, bits)| acc | *bits);
    if propagation.is_empty() || !flags.contains(MountFlags::REC) {
        propagation
    } else {
        propagation | Propagation::REC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bind_variants() {
        assert_eq!(flag_options(MountFlags::BIND), vec!["bind"]);
        assert_eq!(
            flag_options(MountFlags::BIND | MountFlags::REC | MountFlags::RDONLY),
            vec!["rbind", "ro"]
        );
        assert_eq!(
            flag_options(MountFlags::PRIVATE | MountFlags::REC),
            vec!["rprivate"]
        );
    }

    #[test]
    fn precedence_is_fixed() {
        let flags =
            MountFlags::NODEV | MountFlags::RDONLY | MountFlags::NOSUID | MountFlags::REMOUNT;
        assert_eq!(
            flag_options(flags),
            vec!["remount", "ro", "nosuid", "nodev"]
        );
    }

    #[test]
    fn convert_splits_data() {
        let (flags, data) =
            convert_options(&["nosuid", "mode=1777", " nodev ", "defaults", "size=16m"]);
        assert_eq!(flags, MountFlags::NOSUID | MountFlags::NODEV);
        assert_eq!(data, vec!["mode=1777", "size=16m"]);
    }

    #[test]
    fn clearing_options() {
        let (flags, data) = convert_options(&["ro", "nosuid", "rw", "suid"]);
        assert!(flags.is_empty());
        assert!(data.is_empty());
        assert!(is_flag_option("rw"));
        assert!(!is_flag_option("mode=0755"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn kernel_flags() {
        use rustix::mount::{MountFlags as Kernel, MountPropagationFlags as Propagation};

        let flags = MountFlags::BIND | MountFlags::REC | MountFlags::RDONLY | MountFlags::SLAVE;
        assert_eq!(
            to_rustix_flags(flags),
            Kernel::BIND | Kernel::REC | Kernel::RDONLY
        );
        assert_eq!(
            to_propagation_flags(flags),
            Propagation::DOWNSTREAM | Propagation::REC
        );
        assert!(
            to_propagation_flags(MountFlags::REC | MountFlags::NODEV)
                .is_empty()
        );
        assert_eq!(to_rustix_flags(MountFlags::REMOUNT), Kernel::empty());
    }

    fn representable() -> impl Strategy<Value = MountFlags> {
        // A bare REC without bind or propagation has no option string.
        any::<u32>().prop_map(|bits| {
            let flags = MountFlags::from_bits_truncate(bits);
            if flags.intersects(MountFlags::BIND | MountFlags::PROPAGATION) {
                flags
            } else {
                flags - MountFlags::REC
            }
        })
    }

    proptest! {
        #[test]
        fn options_are_canonical_strings(flags in representable()) {
            let options = flag_options(flags);
            for option in &options {
                prop_assert!(is_flag_option(option));
            }
            let (parsed, data) = convert_options(&options);
            prop_assert!(data.is_empty());
            prop_assert_eq!(flag_options(parsed), options);
        }
    }
}
