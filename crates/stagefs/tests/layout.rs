//! Layout manager integration tests.

use std::fs;
use std::path::Path;

use stagefs::layout::{Entry, Manager, Session};
use stagefs::mount::{Points, RecordingMounter, System, Tag};
use tempfile::TempDir;

fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[test_log::test]
fn update_after_create_adds_only_new_entries() {
    let root = TempDir::new().unwrap();
    let mut manager = Manager::new();
    manager.set_root_path(root.path()).unwrap();
    manager.add_dir("/etc").unwrap();
    manager
        .add_file("/etc/passwd", "root:x:0:0::/root:/bin/sh\n")
        .unwrap();
    manager.create().unwrap();
    assert_eq!(count_entries(root.path()), 1);

    manager.add_dir("/home").unwrap();
    manager.update().unwrap();

    assert_eq!(count_entries(root.path()), 2);
    assert!(root.path().join("home").is_dir());
    assert_eq!(count_entries(&root.path().join("etc")), 1);
    assert!(matches!(
        manager.entry("/home"),
        Some(Entry::Dir { created: true, .. })
    ));
}

#[test_log::test]
fn session_layout_exists_only_after_session_tag() {
    let dir = TempDir::new().unwrap();
    let mut system = System::new(Points::new(), RecordingMounter::new());
    let session = Session::new(dir.path(), "tmpfs", Some(8), &mut system, None)
        .unwrap();

    session
        .borrow_mut()
        .add_file("/rootfs/.stage", "ready")
        .unwrap();
    assert_eq!(count_entries(dir.path()), 0);

    let observed = session.clone();
    system
        .run_before_tag(Tag::Rootfs, move |_| {
            assert!(
                observed
                    .borrow()
                    .get_path("/rootfs/.stage")
                    .unwrap()
                    .is_file()
            );
            Ok(())
        })
        .unwrap();
    system.mount_all().unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("rootfs/.stage")).unwrap(),
        "ready"
    );
    assert_eq!(session.borrow().final_path(), dir.path().join("rootfs"));
}

#[test_log::test]
fn overridden_directory_is_created_at_its_target() {
    let dir = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let real = target.path().join("real-home");

    let mut system = System::new(Points::new(), RecordingMounter::new());
    let session = Session::new(dir.path(), "tmpfs", None, &mut system, None)
        .unwrap();
    {
        let mut session = session.borrow_mut();
        session.add_dir("/home").unwrap();
        session.override_dir("/home", &real).unwrap();
        session.add_file("/home/profile", "").unwrap();
    }
    system.mount_all().unwrap();

    assert!(real.join("profile").is_file());
    assert!(!dir.path().join("home").exists());
    assert_eq!(
        session.borrow().get_path("/home/profile").unwrap(),
        real.join("profile")
    );
}
