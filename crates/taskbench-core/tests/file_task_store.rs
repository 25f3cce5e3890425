use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use taskbench_core::file_store::FileTaskStore;
use taskbench_core::lifecycle::simulate;
use taskbench_core::models::{CoreErrorKind, Task, TaskAction, TaskStatus};
use taskbench_core::persistence::TaskBackend;

fn test_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("taskbench-{test_name}-{nanos}"))
}

#[test]
fn writes_replace_the_whole_record() {
    let dir = test_dir("file-writes");
    let store = FileTaskStore::open(&dir).unwrap();
    let mut task = Task::generate().unwrap();

    store.apply(TaskAction::Create, &task).unwrap();
    assert_eq!(store.load_task(&task.id).unwrap(), Some(task.clone()));

    task.status = TaskStatus::Processing;
    task.output = "0Some kind of output and whatever".to_string();
    store.apply(TaskAction::Output, &task).unwrap();
    assert_eq!(store.load_task(&task.id).unwrap(), Some(task.clone()));
    assert_eq!(store.record_count().unwrap(), 1);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn lifecycle_leaves_no_file_behind() {
    let dir = test_dir("file-lifecycle");
    let store = FileTaskStore::open(&dir).unwrap();

    let task = simulate(&store).unwrap();
    assert!(!store.record_path(&task.id).exists());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn deleting_a_missing_record_is_fatal() {
    let dir = test_dir("file-missing");
    let store = FileTaskStore::open(&dir).unwrap();
    let task = Task::generate().unwrap();

    let error = store.apply(TaskAction::Delete, &task).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);
    assert_eq!(error.action, Some(TaskAction::Delete));
    assert_eq!(error.task_id, Some(task.id.clone()));
    assert!(error.message.contains("record missing"));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn staged_write_is_invisible_until_published() {
    let dir = test_dir("file-staged");
    let store = FileTaskStore::open(&dir).unwrap();
    let mut task = Task::generate().unwrap();
    store.apply(TaskAction::Create, &task).unwrap();
    let previous = task.clone();

    task.status = TaskStatus::Processing;
    let staged = store.stage(TaskAction::Status, &task).unwrap();
    assert!(staged.temp_path().exists());
    assert_eq!(store.load_task(&task.id).unwrap(), Some(previous));
    assert_eq!(store.record_count().unwrap(), 1);

    staged.publish().unwrap();
    assert_eq!(store.load_task(&task.id).unwrap(), Some(task.clone()));
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn interrupted_publish_keeps_previous_record() {
    let dir = test_dir("file-interrupted");
    let store = FileTaskStore::open(&dir).unwrap();
    let mut task = Task::generate().unwrap();
    store.apply(TaskAction::Create, &task).unwrap();
    let previous = task.clone();

    task.output = "x".repeat(4096);
    let staged = store.stage(TaskAction::Output, &task).unwrap();
    staged.discard().unwrap();

    assert_eq!(store.load_task(&task.id).unwrap(), Some(previous));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn concurrent_reader_never_sees_a_partial_record() {
    let dir = test_dir("file-reader");
    let store = Arc::new(FileTaskStore::open(&dir).unwrap());
    let mut task = Task::generate().unwrap();
    store.apply(TaskAction::Create, &task).unwrap();
    let record_path = store.record_path(&task.id);

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = done.clone();
        std::thread::spawn(move || {
            let mut reads = 0usize;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let bytes = std::fs::read(&record_path).expect("record must always exist");
                let parsed: Task =
                    serde_json::from_slice(&bytes).expect("record must always be complete");
                assert!(parsed.output.is_empty() || parsed.output.len() >= 1024);
                reads += 1;
                if finished {
                    return reads;
                }
            }
        })
    };

    for iteration in 0..500 {
        task.output = format!("{iteration}").repeat(1024 + iteration * 16);
        store.apply(TaskAction::Output, &task).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    let reads = reader.join().expect("reader thread panicked");
    assert!(reads > 0);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn clear_removes_records_and_temp_files() {
    let dir = test_dir("file-clear");
    let store = FileTaskStore::open(&dir).unwrap();
    let task = Task::generate().unwrap();
    store.apply(TaskAction::Create, &task).unwrap();
    let _staged = store.stage(TaskAction::Status, &task).unwrap();

    assert_eq!(store.record_count().unwrap(), 1);
    assert_eq!(store.clear().unwrap(), 2);
    assert_eq!(store.record_count().unwrap(), 0);

    let _ = std::fs::remove_dir_all(dir);
}
