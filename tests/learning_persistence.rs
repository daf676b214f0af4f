//! Learned tasks survive process restarts

use deskpilot::learning::{JsonTaskStore, LearningEngine, TaskStore};
use deskpilot::memory::ConversationMemory;
use deskpilot::types::{params, ActionRequest, SourceStage};
use deskpilot::{AssistantError, RecordingStateError};
use tempfile::TempDir;

fn launch(app: &str) -> ActionRequest {
    ActionRequest::new("launch_app", params([("app", app)]), 1.0, SourceStage::Regex, "open")
}

fn engine_at(dir: &TempDir) -> LearningEngine {
    let store = JsonTaskStore::new(dir.path().join("learned_tasks.json")).unwrap();
    LearningEngine::new(Box::new(store)).unwrap()
}

#[tokio::test]
async fn test_task_reloaded_by_new_engine() {
    let dir = TempDir::new().unwrap();
    {
        let engine = engine_at(&dir);
        engine.start("Open Excel").unwrap();
        engine.record(&launch("Excel"));
        engine.stop(&[]).await.unwrap();
    }

    let engine = engine_at(&dir);
    assert!(engine.list().contains("Open Excel"));
    let steps = engine
        .replay("open excel", "do the task open excel", &ConversationMemory::new())
        .unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].param_str("app"), Some("Excel"));
}

#[tokio::test]
async fn test_unstopped_recording_discarded() {
    let dir = TempDir::new().unwrap();
    {
        let engine = engine_at(&dir);
        engine.start("half done").unwrap();
        engine.record(&launch("Excel"));
    }

    let engine = engine_at(&dir);
    assert!(engine.list().is_empty());
    assert!(!engine.is_recording());
}

#[tokio::test]
async fn test_overwrite_is_case_insensitive_on_disk() {
    let dir = TempDir::new().unwrap();
    let engine = engine_at(&dir);

    engine.start("Morning").unwrap();
    engine.record(&launch("Excel"));
    engine.stop(&[]).await.unwrap();

    engine.start("MORNING").unwrap();
    engine.record(&launch("Outlook"));
    engine.record(&launch("Teams"));
    engine.stop(&[]).await.unwrap();

    let store = JsonTaskStore::new(dir.path().join("learned_tasks.json")).unwrap();
    let stored = store.load_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored["morning"].steps.len(), 2);
}

#[tokio::test]
async fn test_forget_removes_from_disk() {
    let dir = TempDir::new().unwrap();
    let engine = engine_at(&dir);
    engine.start("tmp").unwrap();
    engine.record(&launch("Paint"));
    engine.stop(&[]).await.unwrap();
    engine.forget("TMP").await.unwrap();

    assert!(engine_at(&dir).list().is_empty());
}

#[tokio::test]
async fn test_usage_statistics_persisted() {
    let dir = TempDir::new().unwrap();
    {
        let engine = engine_at(&dir);
        engine.start("excel").unwrap();
        engine.record(&launch("Excel"));
        engine.stop(&[]).await.unwrap();
        engine.mark_replayed("excel", 1, 1).await;
        engine.mark_replayed("excel", 0, 1).await;
    }

    let task = engine_at(&dir).task("excel").unwrap();
    assert_eq!(task.usage_count, 2);
    assert!((task.success_rate - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_state_errors_leave_store_untouched() {
    let dir = TempDir::new().unwrap();
    let engine = engine_at(&dir);

    assert!(matches!(
        engine.stop(&[]).await,
        Err(AssistantError::RecordingState(RecordingStateError::NotRecording))
    ));
    assert_eq!(engine.start("  "), Err(RecordingStateError::EmptyTaskName));
    assert!(!dir.path().join("learned_tasks.json").exists());
}

#[tokio::test]
async fn test_corrupt_store_reported_as_storage_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("learned_tasks.json"), "not json").unwrap();
    let store = JsonTaskStore::new(dir.path().join("learned_tasks.json")).unwrap();
    assert!(matches!(
        LearningEngine::new(Box::new(store)),
        Err(AssistantError::Storage(_))
    ));
}

#[tokio::test]
async fn test_stop_after_file_corrupted_still_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("learned_tasks.json");
    let engine = engine_at(&dir);

    engine.start("first").unwrap();
    engine.record(&launch("Excel"));
    engine.stop(&[]).await.unwrap();

    std::fs::write(&path, "{ hand edited").unwrap();

    engine.start("second").unwrap();
    engine.record(&launch("Word"));
    engine.stop(&[]).await.unwrap();

    let reloaded = engine_at(&dir);
    let names: Vec<String> = reloaded.list().into_iter().collect();
    assert_eq!(names, vec!["first", "second"]);
}
