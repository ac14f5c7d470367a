//! End-to-end staging tests using a recording mounter.

use std::cell::RefCell;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use stagefs::layer::{Overlay, Underlay};
use stagefs::layout::Session;
use stagefs::mount::{
    MountFlags, MountKind, MountPoint, MountSpec, Points, RecordingMounter, System, Tag,
};
use stagefs_common::StageResult;
use tempfile::TempDir;

fn tag_order(calls: &[MountPoint]) -> Vec<Tag> {
    calls.iter().map(MountPoint::tag).collect()
}

#[test_log::test]
fn session_and_user_bind_are_mounted_in_order() {
    let mut points = Points::new();
    points
        .add_fs(Tag::Session, "/", "tmpfs", MountFlags::empty(), "mode=1777")
        .unwrap();
    points
        .add_bind(Tag::Userbinds, "/host/data", "/data", MountFlags::BIND)
        .unwrap();

    let recorder = RecordingMounter::new();
    let mut system = System::new(points, recorder.clone());
    system.mount_all().unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(tag_order(&calls), vec![Tag::Session, Tag::Userbinds]);
    assert_eq!(calls[0].options(), ["mode=1777"]);
    assert_eq!(calls[1].options(), ["bind"]);
}

#[test_log::test]
fn imported_specs_follow_tag_order() {
    let specs: Vec<MountSpec> = serde_json::from_str(
        r#"[
            {"destination": "/data", "type": "bind", "source": "/host/data", "options": ["rbind", "ro"]},
            {"destination": "/proc", "type": "proc", "source": "proc", "options": ["nosuid", "noexec", "nodev"]},
            {"destination": "/dev/pts", "type": "devpts", "source": "devpts", "options": ["nosuid", "noexec", "newinstance", "mode=0620"]}
        ]"#,
    )
    .unwrap();

    let mut points = Points::new();
    points.import_from_spec(&specs).unwrap();

    let recorder = RecordingMounter::new();
    System::new(points, recorder.clone()).mount_all().unwrap();

    let calls = recorder.calls();
    assert_eq!(tag_order(&calls), vec![Tag::Dev, Tag::Kernel, Tag::Other]);
    assert_eq!(calls[0].data_options(), ["newinstance", "mode=0620"]);
    assert!(
        calls[2]
            .flags()
            .contains(MountFlags::BIND | MountFlags::REC | MountFlags::RDONLY)
    );
}

struct Staging {
    session: TempDir,
    host: TempDir,
}

impl Staging {
    fn new() -> Self {
        Self {
            session: TempDir::new().unwrap(),
            host: TempDir::new().unwrap(),
        }
    }

    fn rootfs(&self) -> PathBuf {
        self.session.path().join("rootfs")
    }

    fn populate_rootfs(&self) {
        let rootfs = self.rootfs();
        fs::create_dir_all(rootfs.join("etc")).unwrap();
        fs::create_dir_all(rootfs.join("usr/bin")).unwrap();
        fs::create_dir_all(rootfs.join("usr/lib")).unwrap();
        fs::write(rootfs.join("etc/hostname"), "image\n").unwrap();
        fs::write(rootfs.join("usr/bin/sh"), "").unwrap();
        symlink("usr/lib", rootfs.join("lib")).unwrap();
        symlink("/etc", rootfs.join("config")).unwrap();
    }

    fn host_dir(&self, name: &str) -> PathBuf {
        let dir = self.host.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn host_file(&self, name: &str) -> PathBuf {
        let file = self.host.path().join(name);
        fs::write(&file, "host\n").unwrap();
        file
    }
}

#[test_log::test]
fn overlay_creates_placeholders_for_pending_mounts() {
    let staging = Staging::new();
    staging.populate_rootfs();

    let mut points = Points::new();
    points
        .add_bind(
            Tag::Userbinds,
            staging.host_dir("data"),
            "/data",
            MountFlags::BIND,
        )
        .unwrap();
    points
        .add_bind(
            Tag::Files,
            staging.host_file("app.conf"),
            "/config/app.conf",
            MountFlags::BIND,
        )
        .unwrap();
    points
        .add_bind(
            Tag::Files,
            staging.host_file("hostname"),
            "/etc/hostname",
            MountFlags::BIND,
        )
        .unwrap();
    points
        .add_bind(
            Tag::Binds,
            "/nonexistent/source",
            "/missing",
            MountFlags::BIND,
        )
        .unwrap();

    let recorder = RecordingMounter::new();
    let mut system = System::new(points, recorder.clone());
    let session = Session::new(
        staging.session.path(),
        "tmpfs",
        Some(16),
        &mut system,
        Some(Box::new(Overlay::new())),
    )
    .unwrap();
    system.mount_all().unwrap();

    let lower = staging.session.path().join("overlay-lowerdir");
    assert!(lower.join("data").is_dir());
    let conf = lower.join("etc/app.conf");
    assert!(conf.is_file());
    assert_eq!(fs::metadata(&conf).unwrap().len(), 0);
    assert!(!lower.join("config").exists());
    assert!(!lower.join("etc/hostname").exists());
    assert!(!lower.join("missing").exists());

    let final_path = session.borrow().final_path();
    assert_eq!(final_path, staging.session.path().join("final"));

    let layer = &system.points().get_by_tag(Tag::Layer)[0];
    assert_eq!(layer.kind(), MountKind::Overlay);
    assert_eq!(layer.destination(), final_path);
    assert!(
        layer
            .flags()
            .contains(MountFlags::RDONLY | MountFlags::NODEV)
    );
    let lowerdir = layer
        .data_options()
        .iter()
        .find_map(|o| o.strip_prefix("lowerdir="))
        .unwrap()
        .to_string();
    assert!(lowerdir.starts_with(&lower.display().to_string()));
    assert!(lowerdir.ends_with(&staging.rootfs().display().to_string()));

    let calls = recorder.calls();
    assert_eq!(
        tag_order(&calls),
        vec![Tag::Session, Tag::Layer, Tag::Binds, Tag::Files, Tag::Files, Tag::Userbinds]
    );
}

#[test_log::test]
fn writable_overlay_uses_upper_and_work_dirs() {
    let staging = Staging::new();
    let recorder = RecordingMounter::new();
    let mut system = System::new(Points::new(), recorder.clone());
    let overlay = Overlay::new()
        .with_upper_dir(staging.host_dir("upper"), staging.host_dir("work"));
    Session::new(
        staging.session.path(),
        "tmpfs",
        None,
        &mut system,
        Some(Box::new(overlay)),
    )
    .unwrap();
    system.mount_all().unwrap();

    let layer = &system.points().get_by_tag(Tag::Layer)[0];
    assert!(!layer.flags().contains(MountFlags::RDONLY));
    assert!(
        layer
            .data_options()
            .iter()
            .any(|o| o.starts_with("upperdir="))
    );
    assert!(
        layer
            .data_options()
            .iter()
            .any(|o| o.starts_with("workdir="))
    );
}

#[test_log::test]
fn underlay_duplicates_parents_before_children() {
    let staging = Staging::new();
    staging.populate_rootfs();

    let mut points = Points::new();
    points
        .add_bind(
            Tag::Userbinds,
            staging.host_dir("data"),
            "/usr/local/data",
            MountFlags::BIND,
        )
        .unwrap();
    points
        .add_bind(
            Tag::Files,
            staging.host_file("app.conf"),
            "/lib/app.conf",
            MountFlags::BIND,
        )
        .unwrap();

    let mounted = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&mounted);
    let mut system = System::new(points, move |point: &MountPoint| -> StageResult<()> {
        if point.tag() == Tag::PreLayer {
            assert!(
                point.destination().exists(),
                "{point} mounted before its target exists"
            );
        }
        log.borrow_mut().push(point.clone());
        Ok(())
    });
    let session = Session::new(
        staging.session.path(),
        "tmpfs",
        None,
        &mut system,
        Some(Box::new(Underlay::new())),
    )
    .unwrap();
    system.mount_all().unwrap();

    let underlay = staging.session.path().join("underlay");
    assert!(underlay.join("usr/local/data").is_dir());
    assert!(underlay.join("usr/lib/app.conf").is_file());
    assert_eq!(
        fs::read_link(underlay.join("lib")).unwrap(),
        Path::new("usr/lib")
    );
    assert!(underlay.join("etc").is_dir());
    assert!(underlay.join("usr/bin").is_dir());

    let rootfs = staging.rootfs();
    let prelayer: Vec<PathBuf> = system
        .points()
        .get_by_tag(Tag::PreLayer)
        .iter()
        .map(|p| p.source().to_path_buf())
        .collect();
    assert!(prelayer.contains(&rootfs.join("usr/bin")));
    assert!(prelayer.contains(&rootfs.join("etc")));
    assert!(!prelayer.contains(&rootfs.join("usr")));
    assert!(!prelayer.contains(&rootfs.join("usr/lib")));
    assert!(!prelayer.contains(&rootfs.join("lib")));

    let usr_bin = prelayer
        .iter()
        .position(|p| *p == rootfs.join("usr/bin"))
        .unwrap();
    let etc = prelayer
        .iter()
        .position(|p| *p == rootfs.join("etc"))
        .unwrap();
    assert!(usr_bin < etc);

    let final_path = session.borrow().final_path();
    let layer = system.points().get_by_tag(Tag::Layer);
    assert_eq!(layer.len(), 2);
    assert_eq!(layer[0].kind(), MountKind::Bind);
    assert_eq!(layer[0].source(), underlay);
    assert_eq!(layer[0].destination(), final_path);
    assert_eq!(layer[1].kind(), MountKind::Remount);
    assert!(layer[1].flags().contains(MountFlags::RDONLY));

    let order = tag_order(&mounted.borrow());
    let first_layer = order.iter().position(|t| *t == Tag::Layer).unwrap();
    assert!(order[..first_layer].iter().all(|t| *t <= Tag::PreLayer));
}
