//! Mount point registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use stagefs_common::{StageError, StageResult};

use super::context::{ContextPolicy, SELinuxContext};
use super::flags::{MountFlags, convert_options, flag_options};
use super::point::{
    AUTHORIZED_FS, AUTHORIZED_IMAGE, MountKind, MountPoint, context_eligible, is_internal_option,
};
use super::tag::Tag;

/// Loop device parameters of an image mount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageOptions {
    /// Offset of the filesystem inside the image file.
    pub offset: u64,
    /// Size of the filesystem, must be non-zero.
    pub size_limit: u64,
    /// Decryption key for encrypted images.
    pub key: Option<Vec<u8>>,
}

impl ImageOptions {
    /// Options for a filesystem of `size_limit` bytes at `offset`.
    #[must_use]
    pub const fn new(offset: u64, size_limit: u64) -> Self {
        Self {
            offset,
            size_limit,
            key: None,
        }
    }

    /// Attach a decryption key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn internal_options(&self) -> Vec<String> {
        let mut options = vec![
            "loop".to_string(),
            format!("offset={}", self.offset),
            format!("sizelimit={}", self.size_limit),
        ];
        if let Some(key) = &self.key {
            options.push(format!("key={}", hex::encode(key)));
        }
        options
    }
}

/// Ordered registry of mount points keyed by tag.
///
/// Every constructor validates its input completely before storing anything,
/// so a rejected call leaves the registry untouched.
#[derive(Debug, Clone, Default)]
pub struct Points {
    points: BTreeMap<Tag, Vec<MountPoint>>,
    context: Option<SELinuxContext>,
    policy: ContextPolicy,
}

impl Points {
    /// Create an empty registry using the platform context policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_context_policy(ContextPolicy::platform_default())
    }

    /// Create an empty registry with an explicit context policy.
    #[must_use]
    pub fn with_context_policy(policy: ContextPolicy) -> Self {
        Self {
            points: BTreeMap::new(),
            context: None,
            policy,
        }
    }

    /// The context policy in effect.
    #[must_use]
    pub const fn context_policy(&self) -> ContextPolicy {
        self.policy
    }

    /// Set the SELinux context applied to eligible mounts. Can be set once.
    ///
    /// Only points added afterwards receive the context option.
    pub fn set_context(&mut self, context: &str) -> StageResult<()> {
        if let Some(current) = &self.context {
            return Err(StageError::ContextAlreadySet {
                current: current.to_string(),
            });
        }
        self.context = Some(SELinuxContext::parse(context)?);
        Ok(())
    }

    /// The SELinux context, if set.
    #[must_use]
    pub fn context(&self) -> Option<String> {
        self.context.as_ref().map(ToString::to_string)
    }

    /// Register a bind mount of `source` onto `dest`.
    pub fn add_bind(
        &mut self,
        tag: Tag,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        flags: MountFlags,
    ) -> StageResult<()> {
        let source = source.as_ref();
        check_absolute("bind source", source)?;
        if flags.intersects(MountFlags::REMOUNT | MountFlags::PROPAGATION) {
            return Err(StageError::invalid_mount(format!(
                "bind mount of {} accepts neither remount nor propagation flags",
                source.display()
            )));
        }

        self.add(
            tag,
            source.to_path_buf(),
            dest.as_ref(),
            "",
            flags | MountFlags::BIND,
            Vec::new(),
            Vec::new(),
        )
    }

    /// Register a flag change of the mount at `dest`.
    pub fn add_remount(
        &mut self,
        tag: Tag,
        dest: impl AsRef<Path>,
        flags: MountFlags,
    ) -> StageResult<()> {
        if flags.intersects(MountFlags::PROPAGATION) {
            return Err(StageError::invalid_mount(
                "remount does not accept propagation flags",
            ));
        }

        self.add(
            tag,
            PathBuf::new(),
            dest.as_ref(),
            "",
            flags | MountFlags::REMOUNT,
            Vec::new(),
            Vec::new(),
        )
    }

    /// Register a propagation change (shared, slave, private, unbindable) at `dest`.
    pub fn add_propagation(
        &mut self,
        tag: Tag,
        dest: impl AsRef<Path>,
        flags: MountFlags,
    ) -> StageResult<()> {
        if !(MountFlags::PROPAGATION | MountFlags::REC).contains(flags) {
            return Err(StageError::invalid_mount(
                "propagation change accepts only propagation and recursive flags",
            ));
        }
        if (flags & MountFlags::PROPAGATION).bits().count_ones() != 1 {
            return Err(StageError::invalid_mount(
                "propagation change requires exactly one propagation type",
            ));
        }

        self.add(
            tag,
            PathBuf::new(),
            dest.as_ref(),
            "",
            flags,
            Vec::new(),
            Vec::new(),
        )
    }

    /// Register a loop-backed image mount.
    pub fn add_image(
        &mut self,
        tag: Tag,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        fstype: &str,
        flags: MountFlags,
        image: &ImageOptions,
    ) -> StageResult<()> {
        self.add_image_with_data(
            tag,
            source.as_ref(),
            dest.as_ref(),
            fstype,
            flags,
            image,
            Vec::new(),
        )
    }

    /// [`Points::add_image`] with extra data options, such as an explicit
    /// context, kept after the loop parameters.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_image_with_data(
        &mut self,
        tag: Tag,
        source: &Path,
        dest: &Path,
        fstype: &str,
        flags: MountFlags,
        image: &ImageOptions,
        data: Vec<String>,
    ) -> StageResult<()> {
        check_absolute("image source", source)?;
        if !AUTHORIZED_IMAGE.iter().any(|(name, _)| *name == fstype) {
            return Err(StageError::invalid_mount(format!(
                "image filesystem type {fstype} is not authorized"
            )));
        }
        if image.size_limit == 0 {
            return Err(StageError::invalid_mount(format!(
                "image {} requires a non-zero size limit",
                source.display()
            )));
        }
        check_no_bind_flags(fstype, flags)?;

        self.add(
            tag,
            source.to_path_buf(),
            dest,
            fstype,
            flags,
            data,
            image.internal_options(),
        )
    }

    /// Register an overlay mount.
    ///
    /// `lowerdir` is the already joined `a:b:c` list, highest priority first.
    pub fn add_overlay(
        &mut self,
        tag: Tag,
        dest: impl AsRef<Path>,
        flags: MountFlags,
        lowerdir: &str,
        upperdir: Option<&Path>,
        workdir: Option<&Path>,
    ) -> StageResult<()> {
        self.add_overlay_with_data(
            tag,
            dest.as_ref(),
            flags,
            lowerdir,
            upperdir,
            workdir,
            Vec::new(),
        )
    }

    /// [`Points::add_overlay`] with extra data options (`index=off`,
    /// `xino=off`, an explicit context...) kept after the directories.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_overlay_with_data(
        &mut self,
        tag: Tag,
        dest: &Path,
        flags: MountFlags,
        lowerdir: &str,
        upperdir: Option<&Path>,
        workdir: Option<&Path>,
        extra: Vec<String>,
    ) -> StageResult<()> {
        if lowerdir.is_empty() {
            return Err(StageError::invalid_mount(
                "overlay requires at least one lower directory",
            ));
        }
        if upperdir.is_some() && workdir.is_none() {
            return Err(StageError::invalid_mount(
                "overlay with an upper directory requires a work directory",
            ));
        }
        check_no_bind_flags("overlay", flags)?;

        let mut data = vec![format!("lowerdir={lowerdir}")];
        if let Some(upper) = upperdir {
            check_absolute("overlay upper directory", upper)?;
            data.push(format!("upperdir={}", upper.display()));
        }
        if let Some(work) = workdir {
            check_absolute("overlay work directory", work)?;
            data.push(format!("workdir={}", work.display()));
        }
        data.extend(extra);

        self.add(
            tag,
            PathBuf::from("overlay"),
            dest,
            "overlay",
            flags,
            data,
            Vec::new(),
        )
    }

    /// Register a filesystem mount. `options` is a comma separated data string;
    /// flag keywords found in it are merged into `flags`.
    pub fn add_fs(
        &mut self,
        tag: Tag,
        dest: impl AsRef<Path>,
        fstype: &str,
        flags: MountFlags,
        options: &str,
    ) -> StageResult<()> {
        if !AUTHORIZED_FS.iter().any(|(name, _)| *name == fstype) {
            return Err(StageError::invalid_mount(format!(
                "filesystem type {fstype} is not authorized"
            )));
        }
        let (parsed, data) = convert_options(&split_options(options));
        let flags = flags | parsed;
        check_no_bind_flags(fstype, flags)?;

        self.add(
            tag,
            PathBuf::from(fstype),
            dest.as_ref(),
            fstype,
            flags,
            data,
            Vec::new(),
        )
    }

    /// Points of `tag` in insertion order.
    #[must_use]
    pub fn get_by_tag(&self, tag: Tag) -> &[MountPoint] {
        self.points.get(&tag).map(Vec::as_slice).unwrap_or_default()
    }

    /// Points mounted on `dest`, in tag order.
    #[must_use]
    pub fn get_by_dest(&self, dest: impl AsRef<Path>) -> Vec<&MountPoint> {
        let dest = dest.as_ref();
        self.iter().filter(|p| p.destination == dest).collect()
    }

    /// Points whose source is `source`, in tag order.
    #[must_use]
    pub fn get_by_source(&self, source: impl AsRef<Path>) -> Vec<&MountPoint> {
        let source = source.as_ref();
        self.iter().filter(|p| p.source == source).collect()
    }

    /// Copy of every point in tag order.
    #[must_use]
    pub fn get_all(&self) -> Vec<MountPoint> {
        self.iter().cloned().collect()
    }

    /// Iterate over every point in tag order.
    pub fn iter(&self) -> impl Iterator<Item = &MountPoint> {
        self.points.values().flatten()
    }

    /// Total number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.values().map(Vec::len).sum()
    }

    /// Whether the registry holds no point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every point of `tag`.
    pub fn remove_by_tag(&mut self, tag: Tag) {
        self.points.remove(&tag);
    }

    /// Remove every point mounted on `dest`.
    pub fn remove_by_dest(&mut self, dest: impl AsRef<Path>) {
        let dest = dest.as_ref();
        self.retain(|p| p.destination != dest);
    }

    /// Remove every point whose source is `source`.
    pub fn remove_by_source(&mut self, source: impl AsRef<Path>) {
        let source = source.as_ref();
        self.retain(|p| p.source != source);
    }

    /// Remove every point. The SELinux context is kept.
    pub fn remove_all(&mut self) {
        self.points.clear();
    }

    fn retain(&mut self, keep: impl Fn(&MountPoint) -> bool) {
        for points in self.points.values_mut() {
            points.retain(&keep);
        }
        self.points.retain(|_, points| !points.is_empty());
    }

    #[allow(clippy::too_many_arguments)]
    fn add(
        &mut self,
        tag: Tag,
        source: PathBuf,
        dest: &Path,
        fstype: &str,
        flags: MountFlags,
        data: Vec<String>,
        mut internal: Vec<String>,
    ) -> StageResult<()> {
        if dest.as_os_str().is_empty() {
            return Err(StageError::invalid_mount("empty mount destination"));
        }
        check_absolute("mount destination", dest)?;
        if flags.contains(MountFlags::REC)
            && !flags.intersects(MountFlags::BIND | MountFlags::PROPAGATION)
        {
            return Err(StageError::invalid_mount(format!(
                "recursive flag on {} requires a bind or propagation change",
                dest.display()
            )));
        }

        let existing = self.get_by_tag(tag);
        if !tag.multi_point() && !existing.is_empty() {
            return Err(StageError::invalid_mount(format!(
                "tag {tag} allows only one mount point"
            )));
        }

        let point_kind = kind_of(fstype, flags, &internal);
        let reapplies = matches!(point_kind, MountKind::Remount | MountKind::Propagation);
        if !reapplies
            && existing.iter().any(|p| {
                p.destination == dest
                    && !matches!(p.kind(), MountKind::Remount | MountKind::Propagation)
            })
        {
            return Err(StageError::invalid_mount(format!(
                "destination {} is already registered in tag {tag}",
                dest.display()
            )));
        }

        let mut options = flag_options(flags);
        let mut explicit_context = false;
        for option in data {
            if is_internal_option(&option) {
                internal.push(option);
                continue;
            }
            explicit_context |= option.starts_with("context=");
            options.push(option);
        }
        if let Some(context) = &self.context {
            if !explicit_context && context_eligible(fstype) && self.policy.applies_to(point_kind) {
                options.push(context.mount_option());
            }
        }

        let point = MountPoint {
            tag,
            source,
            destination: dest.to_path_buf(),
            fstype: fstype.to_string(),
            flags,
            options,
            internal_options: internal,
        };
        tracing::debug!(%tag, point = %point, "Registered mount point");
        self.points.entry(tag).or_default().push(point);

        Ok(())
    }
}

fn kind_of(fstype: &str, flags: MountFlags, internal: &[String]) -> MountKind {
    MountPoint {
        tag: Tag::Other,
        source: PathBuf::new(),
        destination: PathBuf::new(),
        fstype: fstype.to_string(),
        flags,
        options: Vec::new(),
        internal_options: internal.to_vec(),
    }
    .kind()
}

fn check_absolute(what: &str, path: &Path) -> StageResult<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(StageError::invalid_mount(format!(
            "{what} {} must be an absolute path",
            path.display()
        )))
    }
}

fn check_no_bind_flags(fstype: &str, flags: MountFlags) -> StageResult<()> {
    if flags.intersects(MountFlags::BIND_ONLY | MountFlags::PROPAGATION) {
        return Err(StageError::invalid_mount(format!(
            "{fstype} mount accepts neither bind, remount, recursive nor propagation flags"
        )));
    }
    Ok(())
}

/// Split a comma separated option string, keeping quoted values intact.
pub(crate) fn split_options(options: &str) -> Vec<String> {
    let mut split = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in options.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => split.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    split.push(current);

    split
        .into_iter()
        .map(|option| option.trim().to_string())
        .filter(|option| !option.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_options_are_canonical() {
        let mut points = Points::new();
        points
            .add_bind(
                Tag::Userbinds,
                "/host/data",
                "/data",
                MountFlags::REC | MountFlags::RDONLY,
            )
            .unwrap();
        let added = &points.get_by_tag(Tag::Userbinds)[0];
        assert_eq!(added.options(), ["rbind", "ro"]);
        assert_eq!(added.kind(), MountKind::Bind);
        assert_eq!(added.fstype(), "");
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut points = Points::new();
        for dest in ["/c", "/a", "/b"] {
            points
                .add_bind(Tag::Binds, "/host", dest, MountFlags::empty())
                .unwrap();
        }
        let dests: Vec<_> = points
            .get_by_tag(Tag::Binds)
            .iter()
            .map(|p| p.destination().to_path_buf())
            .collect();
        assert_eq!(
            dests,
            vec![PathBuf::from("/c"), PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[test]
    fn relative_paths_rejected() {
        let mut points = Points::new();
        assert!(
            points
                .add_bind(Tag::Binds, "host", "/data", MountFlags::empty())
                .is_err()
        );
        assert!(
            points
                .add_bind(Tag::Binds, "/host", "data", MountFlags::empty())
                .is_err()
        );
        assert!(
            points
                .add_bind(Tag::Binds, "/host", "", MountFlags::empty())
                .is_err()
        );
        assert!(points.is_empty());
    }

    #[test]
    fn fs_rejects_bind_semantics() {
        let mut points = Points::new();
        for flags in [MountFlags::BIND, MountFlags::REMOUNT, MountFlags::REC] {
            assert!(points.add_fs(Tag::Tmp, "/tmp", "tmpfs", flags, "").is_err());
            assert!(
                points
                    .add_image(
                        Tag::Rootfs,
                        "/img.sif",
                        "/rootfs",
                        "squashfs",
                        flags,
                        &ImageOptions::new(0, 4096),
                    )
                    .is_err()
            );
            assert!(
                points
                    .add_overlay(Tag::Layer, "/final", flags, "/lower", None, None)
                    .is_err()
            );
        }
        assert!(points.is_empty());
    }

    #[test]
    fn fs_type_must_be_authorized() {
        let mut points = Points::new();
        assert!(
            points
                .add_fs(Tag::Other, "/mnt", "nfs", MountFlags::empty(), "")
                .is_err()
        );
        assert!(
            points
                .add_image(
                    Tag::Rootfs,
                    "/img",
                    "/rootfs",
                    "tmpfs",
                    MountFlags::empty(),
                    &ImageOptions::new(0, 1),
                )
                .is_err()
        );
    }

    #[test]
    fn own_semantics_only() {
        let mut points = Points::new();
        assert!(
            points
                .add_bind(Tag::Binds, "/a", "/b", MountFlags::REMOUNT)
                .is_err()
        );
        assert!(
            points
                .add_bind(Tag::Binds, "/a", "/b", MountFlags::PRIVATE)
                .is_err()
        );
        assert!(
            points
                .add_remount(Tag::Binds, "/b", MountFlags::SHARED)
                .is_err()
        );
        assert!(
            points
                .add_propagation(Tag::Binds, "/b", MountFlags::RDONLY | MountFlags::PRIVATE)
                .is_err()
        );
        assert!(
            points
                .add_propagation(Tag::Binds, "/b", MountFlags::SHARED | MountFlags::SLAVE)
                .is_err()
        );
        assert!(
            points
                .add_propagation(Tag::Binds, "/b", MountFlags::REC)
                .is_err()
        );
        points
            .add_propagation(Tag::Binds, "/b", MountFlags::PRIVATE | MountFlags::REC)
            .unwrap();
        assert_eq!(points.get_by_tag(Tag::Binds)[0].options(), ["rprivate"]);
    }

    #[test]
    fn duplicate_destination_fails_identically() {
        let mut points = Points::new();
        points
            .add_bind(Tag::Binds, "/a", "/data", MountFlags::empty())
            .unwrap();
        let first = points
            .add_bind(Tag::Binds, "/b", "/data", MountFlags::empty())
            .unwrap_err()
            .to_string();
        let second = points
            .add_fs(Tag::Binds, "/data", "tmpfs", MountFlags::empty(), "")
            .unwrap_err()
            .to_string();
        assert_eq!(first, second);
        assert_eq!(points.len(), 1);

        // Remount and propagation changes may target the same destination.
        points
            .add_remount(Tag::Binds, "/data", MountFlags::BIND | MountFlags::RDONLY)
            .unwrap();
        points
            .add_propagation(Tag::Binds, "/data", MountFlags::SLAVE)
            .unwrap();
        assert_eq!(points.len(), 3);

        // Same destination in another tag is fine.
        points
            .add_bind(Tag::Userbinds, "/b", "/data", MountFlags::empty())
            .unwrap();
    }

    #[test]
    fn single_point_tags() {
        let mut points = Points::new();
        points
            .add_fs(
                Tag::Session,
                "/session",
                "tmpfs",
                MountFlags::empty(),
                "mode=1777",
            )
            .unwrap();
        assert!(
            points
                .add_fs(Tag::Session, "/other", "tmpfs", MountFlags::empty(), "")
                .is_err()
        );
        assert!(
            points
                .add_remount(Tag::Session, "/session", MountFlags::RDONLY)
                .is_err()
        );
        assert_eq!(points.get_by_tag(Tag::Session).len(), 1);
    }

    #[test]
    fn image_options_are_internal() {
        let mut points = Points::new();
        points
            .add_image(
                Tag::Rootfs,
                "/images/app.sif",
                "/session/rootfs",
                "squashfs",
                MountFlags::NODEV | MountFlags::RDONLY,
                &ImageOptions::new(4096, 1 << 20).with_key(vec![0xde, 0xad]),
            )
            .unwrap();
        let image = &points.get_by_tag(Tag::Rootfs)[0];
        assert_eq!(image.options(), ["ro", "nodev"]);
        assert_eq!(image.kind(), MountKind::Image);
        assert_eq!(image.loop_offset(), Some(4096));
        assert_eq!(image.size_limit(), Some(1 << 20));
        assert_eq!(image.key(), Some(vec![0xde, 0xad]));
        assert!(image.options().iter().all(|o| !o.starts_with("offset")));
    }

    #[test]
    fn image_requires_size_limit() {
        let mut points = Points::new();
        let err = points.add_image(
            Tag::Rootfs,
            "/images/app.sif",
            "/rootfs",
            "ext3",
            MountFlags::empty(),
            &ImageOptions::new(0, 0),
        );
        assert!(err.is_err());
    }

    #[test]
    fn loop_options_siphoned_from_fs_data() {
        let mut points = Points::new();
        points
            .add_fs(
                Tag::Other,
                "/mnt",
                "fuse",
                MountFlags::empty(),
                "loop,offset=12,fd=3",
            )
            .unwrap();
        let point = &points.get_by_tag(Tag::Other)[0];
        assert_eq!(point.options(), ["fd=3"]);
        assert_eq!(point.internal_options(), ["loop", "offset=12"]);
    }

    #[test]
    fn overlay_requires_workdir_with_upper() {
        let mut points = Points::new();
        assert!(
            points
                .add_overlay(Tag::Layer, "/final", MountFlags::empty(), "", None, None)
                .is_err()
        );
        assert!(
            points
                .add_overlay(
                    Tag::Layer,
                    "/final",
                    MountFlags::empty(),
                    "/lower",
                    Some(Path::new("/upper")),
                    None,
                )
                .is_err()
        );
        points
            .add_overlay(
                Tag::Layer,
                "/final",
                MountFlags::NODEV,
                "/a:/b",
                Some(Path::new("/upper")),
                Some(Path::new("/work")),
            )
            .unwrap();
        let overlay = &points.get_by_tag(Tag::Layer)[0];
        assert_eq!(
            overlay.options(),
            ["nodev", "lowerdir=/a:/b", "upperdir=/upper", "workdir=/work"]
        );
        assert_eq!(overlay.option_value("lowerdir"), Some("/a:/b"));
    }

    #[test]
    fn context_is_set_once() {
        let mut points = Points::with_context_policy(ContextPolicy::Linux);
        points
            .set_context("system_u:object_r:container_file_t:s0")
            .unwrap();
        assert!(matches!(
            points.set_context("system_u:object_r:tmp_t:s0"),
            Err(StageError::ContextAlreadySet { .. })
        ));
        assert_eq!(
            points.context().as_deref(),
            Some("system_u:object_r:container_file_t:s0")
        );
    }

    #[test]
    fn context_appended_to_eligible_fs_only() {
        let mut points = Points::with_context_policy(ContextPolicy::Linux);
        points
            .set_context("system_u:object_r:container_file_t:s0:c1,c2")
            .unwrap();
        points
            .add_fs(Tag::Tmp, "/tmp", "tmpfs", MountFlags::NOSUID, "mode=1777")
            .unwrap();
        points
            .add_fs(Tag::Kernel, "/proc", "proc", MountFlags::NOSUID, "")
            .unwrap();
        points
            .add_bind(Tag::Binds, "/etc/hosts", "/etc/hosts", MountFlags::empty())
            .unwrap();
        points
            .add_fs(
                Tag::Scratch,
                "/scratch",
                "tmpfs",
                MountFlags::empty(),
                "context=\"user_u:object_r:tmp_t:s0\"",
            )
            .unwrap();

        let tmp = &points.get_by_tag(Tag::Tmp)[0];
        assert_eq!(
            tmp.options(),
            [
                "nosuid",
                "mode=1777",
                "context=\"system_u:object_r:container_file_t:s0:c1,c2\""
            ]
        );
        assert_eq!(points.get_by_tag(Tag::Kernel)[0].options(), ["nosuid"]);
        assert_eq!(points.get_by_tag(Tag::Binds)[0].options(), ["bind"]);
        let scratch = &points.get_by_tag(Tag::Scratch)[0];
        assert_eq!(
            scratch
                .options()
                .iter()
                .filter(|o| o.starts_with("context="))
                .count(),
            1
        );
    }

    #[test]
    fn portable_policy_never_adds_context() {
        let mut points = Points::with_context_policy(ContextPolicy::Portable);
        points
            .set_context("system_u:object_r:container_file_t:s0")
            .unwrap();
        points
            .add_fs(Tag::Tmp, "/tmp", "tmpfs", MountFlags::empty(), "")
            .unwrap();
        assert!(points.get_by_tag(Tag::Tmp)[0].options().is_empty());
    }

    #[test]
    fn removal() {
        let mut points = Points::new();
        points
            .add_bind(Tag::Binds, "/a", "/x", MountFlags::empty())
            .unwrap();
        points
            .add_bind(Tag::Binds, "/b", "/y", MountFlags::empty())
            .unwrap();
        points
            .add_bind(Tag::Userbinds, "/a", "/z", MountFlags::empty())
            .unwrap();
        points
            .add_fs(Tag::Tmp, "/tmp", "tmpfs", MountFlags::empty(), "")
            .unwrap();

        points.remove_by_tag(Tag::Binds);
        assert!(points.get_by_tag(Tag::Binds).is_empty());
        assert_eq!(points.len(), 2);

        points.remove_by_source("/a");
        assert!(points.get_by_tag(Tag::Userbinds).is_empty());
        assert_eq!(points.get_by_source("/a").len(), 0);

        points.remove_by_dest("/tmp");
        assert!(points.is_empty());
    }

    #[test]
    fn split_keeps_quoted_commas() {
        assert_eq!(
            split_options("mode=1777, context=\"a:b:c:s0:c1,c2\",,size=1m"),
            vec!["mode=1777", "context=\"a:b:c:s0:c1,c2\"", "size=1m"]
        );
    }
}
