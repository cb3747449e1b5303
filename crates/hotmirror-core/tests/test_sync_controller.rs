//! Integration tests for the sync controller state machine.

mod common;

use common::{bulk_frame, collect_events, create_temp_dir, list_files, status_messages};
use hotmirror_core::event::{self, MirrorEvent};
use hotmirror_core::protocol::{ControlMessage, FileChange, FileEdit, FolderChange};
use hotmirror_core::sync::{SyncConfig, SyncController, SyncState};

fn folder_change(folder: &str, files: &[(&str, &str)], current: Option<&str>) -> String {
    ControlMessage::FolderChange(FolderChange {
        folder: folder.to_string(),
        edits: files
            .iter()
            .map(|(path, content)| FileEdit::new(*path, *content))
            .collect(),
        current_file: current.map(str::to_string),
    })
    .encode()
}

fn file_change(path: &str, content: &str) -> String {
    ControlMessage::FileChange(FileChange {
        edit: FileEdit::new(path, content),
        current_file: None,
    })
    .encode()
}

#[test]
fn test_folder_change_end_to_end() {
    let sandbox = create_temp_dir();
    let (tx, mut rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    controller.handle_text(
        "<messagetype>folderchange</messagetype><folder>/srv/proj</folder>\
         <file>/srv/proj/a.txt</file><content>hi</content>\
         <currentfile>/srv/proj/a.txt</currentfile>",
    );

    let local = sandbox.path().join("projects/proj/a.txt");
    assert_eq!(std::fs::read_to_string(&local).unwrap(), "hi");

    let current: Vec<_> = collect_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            MirrorEvent::CurrentFileChanged { path } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(current, vec![None, Some(local)]);
}

#[test]
fn test_folder_change_writes_every_pair() {
    let sandbox = create_temp_dir();
    let (tx, _rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    let files: Vec<(String, String)> = (0..25)
        .map(|i| (format!("/home/dev/app/qml/f{i}.qml"), format!("Item {{ id: f{i} }}")))
        .collect();
    let pairs: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();

    controller.handle_text(&folder_change("/home/dev/app", &pairs, None));

    let project = sandbox.path().join("projects/app");
    for (remote, content) in &files {
        let name = remote.rsplit('/').next().unwrap();
        assert_eq!(
            std::fs::read_to_string(project.join("qml").join(name)).unwrap(),
            *content
        );
    }
}

#[test]
fn test_switching_projects_replaces_workspace() {
    let sandbox = create_temp_dir();
    let (tx, mut rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    controller.handle_text(&folder_change("/work/one", &[("/work/one/a.qml", "1")], None));
    controller.handle_text(&folder_change("/work/two", &[("/work/two/b.qml", "2")], None));

    let workspace = controller.workspace().unwrap();
    assert_eq!(workspace.remote_folder.as_deref(), Some("/work/two"));
    assert_eq!(workspace.local_project_path, sandbox.path().join("projects/two"));
    assert!(workspace.current_file.is_none());

    let folders: Vec<_> = collect_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            MirrorEvent::CurrentFolderChanged { path } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(
        folders,
        vec![
            sandbox.path().join("projects/one"),
            sandbox.path().join("projects/two")
        ]
    );

    controller.handle_text(&file_change("/work/two/b.qml", "updated"));
    assert_eq!(
        std::fs::read_to_string(sandbox.path().join("projects/two/b.qml")).unwrap(),
        "updated"
    );
}

#[tokio::test]
async fn test_import_queues_control_and_drops_bulk() {
    let sandbox = create_temp_dir();
    let (tx, mut rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    controller.handle_binary(bulk_frame(
        "proj",
        &[("main.qml", "Item {}"), ("ui/Button.qml", "Rectangle {}")],
        None,
    ));
    assert_eq!(controller.state(), SyncState::Importing);

    controller.handle_text(&folder_change(
        "/srv/proj",
        &[("/srv/proj/main.qml", "Item { width: 1 }")],
        None,
    ));
    controller.handle_text(&file_change("/srv/proj/main.qml", "Item { width: 2 }"));
    controller.handle_binary(bulk_frame("other", &[("x.qml", "x")], None));

    assert_eq!(controller.queued_control(), 2);
    assert_eq!(controller.queued_bulk(), 0);

    let result = controller.wait_import().await.expect("import was running");
    controller.finish_import(result);

    assert_eq!(controller.state(), SyncState::Idle);
    assert_eq!(controller.queued_control(), 0);

    let project = sandbox.path().join("projects/proj");
    assert_eq!(
        std::fs::read_to_string(project.join("main.qml")).unwrap(),
        "Item { width: 2 }"
    );
    assert!(project.join("ui/Button.qml").exists());
    assert!(!sandbox.path().join("projects/other").exists());

    let events = collect_events(&mut rx);
    let processing: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            MirrorEvent::ProcessingChanged { processing } => Some(*processing),
            _ => None,
        })
        .collect();
    assert_eq!(processing, vec![true, false]);
}

#[tokio::test]
async fn test_import_applies_embedded_folder_change() {
    let sandbox = create_temp_dir();
    let (tx, mut rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    let embedded = folder_change(
        "/Users/dev/demo",
        &[("/Users/dev/demo/extra.qml", "Text {}")],
        Some("/Users/dev/demo/main.qml"),
    );
    controller.handle_binary(bulk_frame("demo", &[("main.qml", "Item {}")], Some(&embedded)));

    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);

    let project = sandbox.path().join("projects/demo");
    assert_eq!(list_files(&project), vec!["extra.qml", "main.qml"]);

    let workspace = controller.workspace().unwrap();
    assert_eq!(workspace.remote_folder.as_deref(), Some("/Users/dev/demo"));
    assert_eq!(workspace.current_file, Some(project.join("main.qml")));

    let events = collect_events(&mut rx);
    assert!(events.contains(&MirrorEvent::CurrentFileChanged {
        path: Some(project.join("main.qml"))
    }));
    assert!(status_messages(&events)
        .iter()
        .any(|s| s == "Imported project 'demo' (1 files)"));
}

#[tokio::test]
async fn test_plain_import_then_file_change_learns_folder() {
    let sandbox = create_temp_dir();
    let (tx, _rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    controller.handle_binary(bulk_frame("demo", &[("main.qml", "Item {}")], None));
    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);
    assert_eq!(controller.workspace().unwrap().remote_folder, None);

    controller.handle_text(
        &ControlMessage::FileChange(FileChange {
            edit: FileEdit::new("/Users/dev/demo/main.qml", "Item { id: root }"),
            current_file: Some("/Users/dev/demo/main.qml".to_string()),
        })
        .encode(),
    );

    let project = sandbox.path().join("projects/demo");
    assert_eq!(list_files(&project), vec!["main.qml"]);
    assert_eq!(
        std::fs::read_to_string(project.join("main.qml")).unwrap(),
        "Item { id: root }"
    );

    let workspace = controller.workspace().unwrap();
    assert_eq!(workspace.remote_folder.as_deref(), Some("/Users/dev/demo"));
    assert_eq!(workspace.current_file, Some(project.join("main.qml")));

    controller.handle_text(&file_change("/Users/dev/demo/ui/demo/Button.qml", "Button {}"));
    assert!(project.join("ui/demo/Button.qml").exists());
}

#[tokio::test]
async fn test_file_change_queued_during_plain_import() {
    let sandbox = create_temp_dir();
    let (tx, _rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    controller.handle_binary(bulk_frame("demo", &[("main.qml", "Item {}")], None));
    controller.handle_text(&file_change("file:///Users/dev/demo/main.qml", "queued"));
    assert_eq!(controller.queued_control(), 1);

    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);

    let project = sandbox.path().join("projects/demo");
    assert_eq!(list_files(&project), vec!["main.qml"]);
    assert_eq!(
        std::fs::read_to_string(project.join("main.qml")).unwrap(),
        "queued"
    );
}

#[tokio::test]
async fn test_queued_frames_replay_in_arrival_order() {
    let sandbox = create_temp_dir();
    let (tx, _rx) = event::channel();
    let config = SyncConfig {
        bulk_queue_capacity: 1,
        ..SyncConfig::with_sandbox(sandbox.path())
    };
    let mut controller = SyncController::new(config, tx);

    controller.handle_binary(bulk_frame("first", &[("a.qml", "a")], None));
    controller.handle_binary(bulk_frame("second", &[("b.qml", "from zip")], None));
    controller.handle_text(&file_change("/srv/second/b.qml", "edited"));
    assert_eq!(controller.queued_bulk(), 1);
    assert_eq!(controller.queued_control(), 1);

    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);
    assert_eq!(controller.state(), SyncState::Importing);
    assert_eq!(controller.queued_control(), 1);

    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);
    assert_eq!(controller.state(), SyncState::Idle);
    assert_eq!(controller.queued_control(), 0);

    let second = sandbox.path().join("projects/second");
    assert_eq!(list_files(&second), vec!["b.qml"]);
    assert_eq!(
        std::fs::read_to_string(second.join("b.qml")).unwrap(),
        "edited"
    );
}

#[tokio::test]
async fn test_processing_cleared_after_replay() {
    let sandbox = create_temp_dir();
    let (tx, mut rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    let embedded = folder_change("/srv/demo", &[], Some("/srv/demo/main.qml"));
    controller.handle_binary(bulk_frame("demo", &[("main.qml", "Item {}")], Some(&embedded)));
    controller.handle_text("<messagetype>data</messagetype><json>{}</json>");

    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);

    let events = collect_events(&mut rx);
    let position = |wanted: &MirrorEvent| events.iter().position(|e| e == wanted).unwrap();
    let cleared = position(&MirrorEvent::ProcessingChanged { processing: false });

    assert_eq!(cleared, events.len() - 1);
    assert!(
        position(&MirrorEvent::CurrentFileChanged {
            path: Some(sandbox.path().join("projects/demo/main.qml"))
        }) < cleared
    );
    assert!(
        position(&MirrorEvent::JsonMessage {
            json: "{}".to_string()
        }) < cleared
    );
}

#[tokio::test]
async fn test_import_replaces_previous_project_contents() {
    let sandbox = create_temp_dir();
    let (tx, _rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    controller.handle_text(&folder_change(
        "/srv/proj",
        &[("/srv/proj/stale.qml", "old"), ("/srv/proj/sub/stale.js", "old")],
        None,
    ));

    controller.handle_binary(bulk_frame("proj", &[("fresh.qml", "new")], None));
    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);

    assert_eq!(
        list_files(&sandbox.path().join("projects/proj")),
        vec!["fresh.qml"]
    );
    assert_eq!(
        controller.workspace().unwrap().remote_folder.as_deref(),
        Some("/srv/proj")
    );
}

#[tokio::test]
async fn test_failed_import_keeps_workspace_and_replays_queue() {
    let sandbox = create_temp_dir();
    let (tx, mut rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    controller.handle_text(&folder_change("/srv/proj", &[("/srv/proj/a.qml", "a")], None));
    let before = controller.workspace().cloned();

    let broken = hotmirror_core::protocol::frame::BulkTransferFrame::new(
        "broken",
        b"PK\x03\x04 truncated".to_vec(),
    )
    .encode(hotmirror_core::protocol::frame::FrameVersion::Embedded)
    .unwrap();
    controller.handle_binary(broken);
    controller.handle_text(&file_change("/srv/proj/a.qml", "after"));

    let result = controller.wait_import().await.unwrap();
    assert!(result.is_err());
    controller.finish_import(result);

    assert_eq!(controller.workspace().cloned(), before);
    assert_eq!(
        std::fs::read_to_string(sandbox.path().join("projects/proj/a.qml")).unwrap(),
        "after"
    );
    assert!(status_messages(&collect_events(&mut rx))
        .iter()
        .any(|s| s.starts_with("Import failed")));
}

#[tokio::test]
async fn test_bulk_queue_capacity_runs_next_import() {
    let sandbox = create_temp_dir();
    let (tx, _rx) = event::channel();
    let config = SyncConfig {
        bulk_queue_capacity: 1,
        ..SyncConfig::with_sandbox(sandbox.path())
    };
    let mut controller = SyncController::new(config, tx);

    controller.handle_binary(bulk_frame("first", &[("a.qml", "a")], None));
    controller.handle_binary(bulk_frame("second", &[("b.qml", "b")], None));
    controller.handle_binary(bulk_frame("third", &[("c.qml", "c")], None));
    assert_eq!(controller.queued_bulk(), 1);

    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);
    assert_eq!(controller.state(), SyncState::Importing);
    assert_eq!(controller.queued_bulk(), 0);

    let result = controller.wait_import().await.unwrap();
    controller.finish_import(result);
    assert_eq!(controller.state(), SyncState::Idle);

    assert!(sandbox.path().join("projects/first/a.qml").exists());
    assert!(sandbox.path().join("projects/second/b.qml").exists());
    assert!(!sandbox.path().join("projects/third").exists());
}

#[test]
fn test_short_bulk_frame_writes_nothing() {
    let sandbox = create_temp_dir();
    let (tx, mut rx) = event::channel();
    let mut controller = SyncController::new(SyncConfig::with_sandbox(sandbox.path()), tx);

    let mut frame = bulk_frame("proj", &[("a.qml", "a")], None);
    frame.truncate(frame.len() / 2);
    controller.handle_binary(frame);

    assert_eq!(controller.state(), SyncState::Idle);
    assert!(list_files(sandbox.path()).is_empty());
    assert!(status_messages(&collect_events(&mut rx))
        .iter()
        .any(|s| s.starts_with("malformed bulk frame")));
}
