//! End-to-end turns: utterance in, plan and memory out

mod common;

use common::{assistant_with, registry_with, FixedGuess, Spy};
use deskpilot::memory::ConversationTurn;
use deskpilot::handlers::{register_dry_run, HandlerRegistry};
use deskpilot::nlu::{IntentClassifier, PatternRules};
use deskpilot::types::{params, ActionRequest, SourceStage};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_send_hi_to_mom_dispatched() {
    let spy = Arc::new(Spy::default());
    let assistant = assistant_with(registry_with(&spy, &["whatsapp_send"]), None);

    let plan = assistant.handle("send hi to Mom", &CancellationToken::new()).await;

    assert!(plan.overall_ok());
    assert_eq!(plan.len(), 1);
    let request = &plan.outcomes()[0].request;
    assert_eq!(request.action_type(), "whatsapp_send");
    assert_eq!(request.confidence(), 1.0);
    assert_eq!(request.source_stage(), SourceStage::Regex);

    let calls = spy.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["contact"], json!("Mom"));
    assert_eq!(calls[0]["message"], json!("hi"));
}

#[tokio::test]
async fn test_call_him_resolves_from_prior_turn() {
    let spy = Arc::new(Spy::default());
    let assistant = assistant_with(registry_with(&spy, &["whatsapp_call"]), None);

    assistant.memory().write().await.record(ConversationTurn::new(
        "send hello to John",
        vec![ActionRequest::new(
            "whatsapp_send",
            params([("contact", "John"), ("message", "hello")]),
            1.0,
            SourceStage::Regex,
            "send hello to John",
        )],
    ));

    let plan = assistant.handle("call him", &CancellationToken::new()).await;
    assert!(plan.overall_ok());
    assert_eq!(plan.outcomes()[0].request.param_str("contact"), Some("John"));
    assert_eq!(spy.calls.lock().unwrap()[0]["contact"], json!("John"));
}

#[tokio::test]
async fn test_follow_up_uses_previous_dispatch() {
    let spy = Arc::new(Spy::default());
    let assistant = assistant_with(registry_with(&spy, &["whatsapp_call"]), None);
    let cancel = CancellationToken::new();

    assistant.handle("send good morning to Sarah", &cancel).await;
    let plan = assistant.handle("call her", &cancel).await;

    assert_eq!(plan.outcomes()[0].request.param_str("contact"), Some("Sarah"));
}

#[tokio::test]
async fn test_low_confidence_invokes_no_handler() {
    let spy = Arc::new(Spy::default());
    let classifier: Arc<dyn IntentClassifier> = Arc::new(FixedGuess {
        action_type: "launch_app".to_string(),
        parameters: params([("app", "Excel")]),
        confidence: 0.2,
    });
    let assistant = assistant_with(registry_with(&spy, &["launch_app"]), Some(classifier));

    let plan = assistant.handle("zorp the blibble", &CancellationToken::new()).await;

    assert_eq!(plan.len(), 1);
    assert!(plan.outcomes()[0].request.is_clarify());
    assert!(!plan.overall_ok());
    assert_eq!(spy.count(), 0);
}

#[tokio::test]
async fn test_compound_partial_failure() {
    let spy = Arc::new(Spy::default());
    let mut registry = HandlerRegistry::new();
    let action_types = PatternRules::builtin().action_types();
    register_dry_run(&mut registry, action_types.into_iter().filter(|a| a != "search"));
    registry.register("launch_app", spy.clone());
    let assistant = assistant_with(registry, None);

    let plan = assistant
        .handle("open Chrome and search cats and mute", &CancellationToken::new())
        .await;

    let kinds: Vec<&str> = plan.outcomes().iter().map(|o| o.request.action_type()).collect();
    assert_eq!(kinds, vec!["launch_app", "search", "volume"]);
    assert!(plan.outcomes()[0].ok);
    assert_eq!(plan.outcomes()[1].message, "unknown action");
    assert!(plan.outcomes()[2].ok);
    assert_eq!(plan.summary(), "Completed 2 of 3 tasks.");
    assert_eq!(assistant.memory().read().await.len(), 3);
}

#[tokio::test]
async fn test_teach_then_replay_open_excel() {
    let spy = Arc::new(Spy::default());
    let assistant = assistant_with(registry_with(&spy, &["launch_app"]), None);
    let cancel = CancellationToken::new();

    assert!(assistant.handle("start teaching open_excel", &cancel).await.overall_ok());
    assert!(assistant.handle("open excel", &cancel).await.overall_ok());
    assert!(assistant.handle("stop teaching", &cancel).await.overall_ok());

    let engine = assistant.learning().unwrap();
    let task = engine.task("open_excel").unwrap();
    assert_eq!(task.steps.len(), 1);
    assert_eq!(task.steps[0].action_type(), "launch_app");
    assert_eq!(task.steps[0].param_str("app"), Some("Excel"));

    let plan = assistant.handle("do the task open_excel", &cancel).await;
    assert!(plan.overall_ok());
    assert_eq!(plan.outcomes()[0].request.source_stage(), SourceStage::Learned);

    let calls = spy.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);
}

#[tokio::test]
async fn test_templated_task_with_new_contact() {
    let spy = Arc::new(Spy::default());
    let assistant = assistant_with(registry_with(&spy, &["whatsapp_send"]), None);
    let cancel = CancellationToken::new();

    assistant.handle("start teaching greet", &cancel).await;
    assistant.handle("send good morning to Mom", &cancel).await;
    assistant.handle("stop teaching with contact", &cancel).await;

    let plan = assistant.handle("do the task greet with contact Dad", &cancel).await;
    assert!(plan.overall_ok());

    let calls = spy.calls.lock().unwrap();
    assert_eq!(calls[1]["contact"], json!("Papa"));
    assert_eq!(calls[1]["message"], json!("good morning"));
}

#[tokio::test]
async fn test_nested_teaching_reports_error() {
    let spy = Arc::new(Spy::default());
    let assistant = assistant_with(registry_with(&spy, &[]), None);
    let cancel = CancellationToken::new();

    assistant.handle("start teaching morning", &cancel).await;
    let plan = assistant.handle("start teaching evening", &cancel).await;

    assert!(!plan.overall_ok());
    assert!(plan.summary().contains("Already recording"));
    assert_eq!(
        assistant.learning().unwrap().active_recording().as_deref(),
        Some("morning")
    );
}

#[tokio::test]
async fn test_list_and_forget_tasks() {
    let spy = Arc::new(Spy::default());
    let assistant = assistant_with(registry_with(&spy, &[]), None);
    let cancel = CancellationToken::new();

    assistant.handle("start teaching work", &cancel).await;
    assistant.handle("open excel", &cancel).await;
    assistant.handle("stop teaching", &cancel).await;

    let listed = assistant.handle("list my tasks", &cancel).await;
    assert!(listed.summary().contains("work"));

    let forgot = assistant.handle("forget the task work", &cancel).await;
    assert!(forgot.overall_ok());
    assert!(assistant.learning().unwrap().list().is_empty());
}

#[tokio::test]
async fn test_oversized_hotkey_interval_fails_cleanly() {
    let spy = Arc::new(Spy::default());
    let assistant = Arc::new(assistant_with(registry_with(&spy, &[]), None));

    let turn = {
        let assistant = Arc::clone(&assistant);
        tokio::spawn(async move {
            assistant
                .handle("press a every 99999999999999999999 hours", &CancellationToken::new())
                .await
        })
    };
    let plan = turn.await.expect("turn must not panic");

    assert_eq!(plan.outcomes()[0].request.action_type(), "hotkey_loop");
    assert!(!plan.overall_ok());
    assert!(plan.outcomes()[0].message.contains("too long"));
}
