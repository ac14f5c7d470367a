//! Importing mount points from generic mount specifications.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stagefs_common::{StageError, StageResult};

use super::flags::{MountFlags, convert_options};
use super::point::{AUTHORIZED_IMAGE, DEV_FS, KERNEL_FS, MountKind, MountPoint, is_internal_option};
use super::points::{ImageOptions, Points};
use super::tag::Tag;

/// Generic mount description, as found in an OCI runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Mount destination path (inside container).
    pub destination: PathBuf,
    /// Mount type (e.g., "bind", "tmpfs", "proc").
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mount_type: Option<String>,
    /// Mount source path (outside container).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Mount options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl From<&MountPoint> for MountSpec {
    fn from(point: &MountPoint) -> Self {
        let mut options = point.options().to_vec();
        options.extend(point.internal_options().iter().cloned());

        Self {
            destination: point.destination().to_path_buf(),
            mount_type: match point.kind() {
                MountKind::Bind => Some("bind".to_string()),
                _ if point.fstype().is_empty() => None,
                _ => Some(point.fstype().to_string()),
            },
            source: (!point.source().as_os_str().is_empty())
                .then(|| point.source().to_path_buf()),
            options,
        }
    }
}

impl Points {
    /// Rebuild points exported by [`Points::get_all`], keeping their tags.
    ///
    /// On failure the whole registry is cleared: a partial import is never
    /// observable.
    pub fn import(&mut self, points: &[MountPoint]) -> StageResult<()> {
        for point in points {
            if let Err(err) = self.import_point(point) {
                self.remove_all();
                return Err(import_error(point.destination(), &err));
            }
        }
        tracing::debug!(count = points.len(), "Imported mount points");
        Ok(())
    }

    /// Convert generic mount specifications into registry entries.
    ///
    /// Tags are chosen from the filesystem type: kernel pseudo filesystems go
    /// to [`Tag::Kernel`], device ones to [`Tag::Dev`], overlays to
    /// [`Tag::Layer`], images to [`Tag::Rootfs`] and everything else to
    /// [`Tag::Other`]. All-or-nothing like [`Points::import`].
    pub fn import_from_spec(&mut self, mounts: &[MountSpec]) -> StageResult<()> {
        for mount in mounts {
            if let Err(err) = self.import_spec(mount) {
                self.remove_all();
                return Err(import_error(&mount.destination, &err));
            }
        }
        tracing::debug!(count = mounts.len(), "Imported mount specifications");
        Ok(())
    }

    fn import_point(&mut self, point: &MountPoint) -> StageResult<()> {
        let tag = point.tag();
        let dest = point.destination();
        let flags = point.flags();
        let data = point.data_options();

        match point.kind() {
            MountKind::Bind => self.add_bind(tag, point.source(), dest, flags),
            MountKind::Remount => self.add_remount(tag, dest, flags),
            MountKind::Propagation => self.add_propagation(tag, dest, flags),
            MountKind::Image => {
                let image = ImageOptions {
                    offset: point.loop_offset().unwrap_or(0),
                    size_limit: point.size_limit().unwrap_or(0),
                    key: point.key(),
                };
                self.add_image_with_data(
                    tag,
                    point.source(),
                    dest,
                    point.fstype(),
                    flags,
                    &image,
                    data,
                )
            }
            MountKind::Overlay => {
                let (lower, upper, work) = overlay_dirs(&data)?;
                let extra = overlay_extra(data);
                self.add_overlay_with_data(
                    tag,
                    dest,
                    flags,
                    &lower,
                    upper.as_deref(),
                    work.as_deref(),
                    extra,
                )
            }
            MountKind::Fs => self.add_fs(tag, dest, point.fstype(), flags, &data.join(",")),
        }
    }

    fn import_spec(&mut self, mount: &MountSpec) -> StageResult<()> {
        let (flags, data) = convert_options(&mount.options);
        let dest = &mount.destination;
        let fstype = mount.mount_type.as_deref().unwrap_or("");

        if flags.contains(MountFlags::REMOUNT) {
            return self.add_remount(Tag::Other, dest, flags);
        }
        if fstype.is_empty()
            && !flags.contains(MountFlags::BIND)
            && flags.intersects(MountFlags::PROPAGATION)
        {
            return self.add_propagation(Tag::Other, dest, flags);
        }
        if fstype.is_empty() || fstype == "bind" || flags.contains(MountFlags::BIND) {
            return self.add_bind(Tag::Other, spec_source(mount)?, dest, flags);
        }

        if KERNEL_FS.contains(&fstype) {
            self.add_fs(Tag::Kernel, dest, fstype, flags, &data.join(","))
        } else if DEV_FS.contains(&fstype) {
            self.add_fs(Tag::Dev, dest, fstype, flags, &data.join(","))
        } else if fstype == "overlay" {
            let (lower, upper, work) = overlay_dirs(&data)?;
            self.add_overlay_with_data(
                Tag::Layer,
                dest,
                flags,
                &lower,
                upper.as_deref(),
                work.as_deref(),
                overlay_extra(data),
            )
        } else if AUTHORIZED_IMAGE.iter().any(|(name, _)| *name == fstype) {
            let image = image_options(&data)?;
            let extra = data.into_iter()
                .filter(|o| !is_internal_option(o))
                .collect();
            self.add_image_with_data(
                Tag::Rootfs,
                spec_source(mount)?,
                dest,
                fstype,
                flags,
                &image,
                extra,
            )
        } else {
            self.add_fs(Tag::Other, dest, fstype, flags, &data.join(","))
        }
    }
}

fn import_error(dest: &Path, err: &StageError) -> StageError {
    StageError::invalid_mount(format!(
        "import of mount point {} failed, registry cleared: {err}",
        dest.display()
    ))
}

fn spec_source(mount: &MountSpec) -> StageResult<&Path> {
    mount.source.as_deref().ok_or_else(|| {
        StageError::invalid_mount(format!(
            "mount on {} requires a source",
            mount.destination.display()
        ))
    })
}

fn value<'a>(data: &'a [String], key: &str) -> Option<&'a str> {
    data.iter()
        .find_map(|option| option.strip_prefix(key)?.strip_prefix('='))
}

fn overlay_dirs(data: &[String]) -> StageResult<(String, Option<PathBuf>, Option<PathBuf>)> {
    let lower = value(data, "lowerdir")
        .ok_or_else(|| StageError::invalid_mount("overlay mount without lowerdir option"))?;
    Ok((
        lower.to_string(),
        value(data, "upperdir").map(PathBuf::from),
        value(data, "workdir").map(PathBuf::from),
    ))
}

/// Overlay data options other than the directory lists.
fn overlay_extra(data: Vec<String>) -> Vec<String> {
    const DIRS: [&str; 3] = ["lowerdir=", "upperdir=", "workdir="];
    data.into_iter()
        .filter(|option| !DIRS.iter().any(|dir| option.starts_with(*dir)))
        .collect()
}

fn image_options(data: &[String]) -> StageResult<ImageOptions> {
    let number = |key: &str| -> StageResult<u64> {
        value(data, key).map_or(Ok(0), |v| {
            v.parse()
                .map_err(|_| StageError::invalid_mount(format!("invalid {key} value {v}")))
        })
    };
    let key = value(data, "key")
        .map(|v| {
            hex::decode(v)
                .map_err(|_| StageError::invalid_mount("image key must be hex encoded"))
        })
        .transpose()?;

    Ok(ImageOptions {
        offset: number("offset")?,
        size_limit: number("sizelimit")?,
        key,
    })
}
