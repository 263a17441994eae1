// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end runs through the gateway with a scripted provider.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use codeweave::orchestrator::Orchestrator;
use codeweave::providers::ReplayProvider;
use codeweave::recorder::InteractionKind;
use codeweave::session::{MessageRole, NewMessage, SessionStore};
use codeweave::stream::{ChatRequest, StreamGateway, WireEvent, WireFrame};
use codeweave::types::{ProviderResponse, ToolCall};
use codeweave::workspace::{ProjectResolver, WorkspaceLeases};
use codeweave::RequestTag;

const PROJECT: i64 = 1;

fn call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

fn setup(script: Vec<ProviderResponse>) -> (TempDir, StreamGateway, Arc<ReplayProvider>) {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join(format!("project_{PROJECT}"));
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/main.js"), "function main() {\n  return 1;\n}\n").unwrap();

    let provider = Arc::new(ReplayProvider::new(script));
    let store = SessionStore::in_memory().unwrap();
    let orchestrator = Arc::new(Orchestrator::new(provider.clone(), store));
    let leases = Arc::new(WorkspaceLeases::new(ProjectResolver::new(temp.path())));
    (temp, StreamGateway::new(leases, orchestrator), provider)
}

fn project_root(temp: &TempDir) -> std::path::PathBuf {
    temp.path().join(format!("project_{PROJECT}"))
}

async fn collect(mut rx: UnboundedReceiver<WireFrame>) -> Vec<WireFrame> {
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    frames
}

fn interactions(frames: &[WireFrame]) -> Vec<&codeweave::recorder::AgentInteraction> {
    frames
        .iter()
        .filter_map(|f| match &f.event {
            WireEvent::AgentInteraction(i) => Some(i),
            _ => None,
        })
        .collect()
}

fn terminal_count(frames: &[WireFrame]) -> usize {
    frames.iter().filter(|f| f.event.is_terminal()).count()
}

fn tree_listing(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.path().display().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_simple_edit_goes_to_coder_and_completes() {
    let (temp, gateway, provider) = setup(vec![
        ProviderResponse::with_tool_calls(
            "Adding a log line to the entry file.",
            vec![call(
                "e1",
                "edit_file",
                json!({
                    "path": "src/main.js",
                    "old_string": "  return 1;",
                    "new_string": "  console.log('main called');\n  return 1;"
                }),
            )],
        ),
        ProviderResponse::text("Added a console log to src/main.js.\n\nTASK_COMPLETED"),
    ]);

    let request = ChatRequest::new("add a console log to the entry file").with_tag(RequestTag::Simple);
    let frames = collect(gateway.start(PROJECT, request)).await;

    assert!(matches!(frames[0].event, WireEvent::Start { .. }));
    assert_eq!(terminal_count(&frames), 1);

    let seen = interactions(&frames);
    assert!(seen.iter().all(|i| i.agent_name == "Coder"));

    let tool_calls: Vec<_> = seen.iter().filter(|i| i.kind == InteractionKind::ToolCall).collect();
    assert_eq!(tool_calls.len(), 1);
    assert_eq!(tool_calls[0].tool_name.as_deref(), Some("edit_file"));

    let responses: Vec<_> = seen.iter().filter(|i| i.kind == InteractionKind::ToolResponse).collect();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].tool_name.as_deref(), Some("edit_file"));
    assert!(responses[0].content.contains("\"success\":true"));

    let WireEvent::Complete(payload) = &frames.last().unwrap().event else {
        panic!("expected complete, got {:?}", frames.last());
    };
    assert!(!payload.incomplete);
    assert_eq!(payload.message.content, "Added a console log to src/main.js.");
    assert_eq!(payload.changed_files.len(), 1);

    let source = std::fs::read_to_string(project_root(&temp).join("src/main.js")).unwrap();
    assert!(source.contains("console.log('main called');"));

    // The Planner was never consulted.
    assert!(provider.calls().iter().all(|c| c.tool_count > 0));
}

#[tokio::test]
async fn test_complex_request_is_planned_first() {
    let (temp, gateway, _provider) = setup(vec![
        ProviderResponse::text("PLAN: Settings page\n1. Create settings.html\n2. Link it from index.html"),
        ProviderResponse::with_tool_calls(
            "Creating the page.",
            vec![call(
                "w1",
                "write_file",
                json!({"path": "settings.html", "content": "<h1>Settings</h1>\n"}),
            )],
        ),
        ProviderResponse::with_tool_calls(
            "Linking it.",
            vec![call(
                "w2",
                "write_file",
                json!({"path": "index.html", "content": "<a href=\"settings.html\">Settings</a>\n"}),
            )],
        ),
        ProviderResponse::text("The settings page is in place. TASK_COMPLETED"),
    ]);

    let frames = collect(gateway.start(PROJECT, ChatRequest::new("design and build a settings page"))).await;
    let seen = interactions(&frames);

    assert_eq!(seen[0].agent_name, "Planner");
    assert_eq!(seen[0].kind, InteractionKind::Thought);
    assert!(seen[1..].iter().all(|i| i.agent_name == "Coder"));
    assert_eq!(seen.iter().filter(|i| i.kind == InteractionKind::ToolCall).count(), 2);

    let WireEvent::Complete(payload) = &frames.last().unwrap().event else {
        panic!("expected complete");
    };
    assert_eq!(payload.changed_files.len(), 2);
    assert!(project_root(&temp).join("settings.html").exists());
    assert!(project_root(&temp).join("index.html").exists());
}

#[tokio::test]
async fn test_path_outside_workspace_is_rejected_without_mutation() {
    let (temp, gateway, _provider) = setup(vec![
        ProviderResponse::with_tool_calls(
            "Cleaning up.",
            vec![
                call("w", "write_file", json!({"path": "../outside.txt", "content": "x"})),
                call("d", "delete_file", json!({"path": "/etc/hostname"})),
                call("j", "write_json", json!({"path": "src/../../data.json", "data": {"a": 1}})),
            ],
        ),
        ProviderResponse::text("Those paths are off limits. TASK_COMPLETED"),
    ]);
    let before = tree_listing(temp.path());

    let request = ChatRequest::new("tidy the files").with_tag(RequestTag::Direct);
    let frames = collect(gateway.start(PROJECT, request)).await;

    let responses: Vec<_> = interactions(&frames)
        .into_iter()
        .filter(|i| i.kind == InteractionKind::ToolResponse)
        .collect();
    assert_eq!(responses.len(), 3);
    for response in responses {
        assert!(response.content.contains("\"success\":false"), "{}", response.content);
    }

    assert_eq!(tree_listing(temp.path()), before);
    let WireEvent::Complete(payload) = &frames.last().unwrap().event else {
        panic!("expected complete");
    };
    assert!(payload.changed_files.is_empty());
}

#[tokio::test]
async fn test_reconnect_after_disconnect_sees_only_newer_messages() {
    let (_temp, gateway, _provider) = setup(vec![
        ProviderResponse::with_tool_calls(
            "Writing the changelog.",
            vec![call("w", "write_file", json!({"path": "CHANGELOG.md", "content": "# Changes\n"}))],
        ),
        ProviderResponse::text("Changelog added. TASK_COMPLETED"),
    ]);

    // Six earlier messages, so this request becomes message 7.
    let store = gateway.store();
    let session = store.create_session(PROJECT, Some("history")).await.unwrap();
    for n in 0..3 {
        store.append(session.id, NewMessage::user(format!("request {n}"))).await.unwrap();
        store
            .append(session.id, NewMessage::assistant("Coder", format!("answer {n}"), Vec::new()))
            .await
            .unwrap();
    }

    let request = ChatRequest::new("add a changelog")
        .with_tag(RequestTag::Simple)
        .in_session(session.id);
    let mut rx = gateway.start(PROJECT, request);

    let first = rx.recv().await.unwrap();
    let WireEvent::Start { user_message_id, .. } = first.event else {
        panic!("expected start");
    };
    assert_eq!(user_message_id, 7);
    drop(rx);

    // The task keeps the lease until its last message is stored.
    let lease = gateway.leases().acquire(PROJECT).await.unwrap();
    drop(lease);

    let page = store.get_since(session.id, 7, None).await.unwrap();
    assert!(!page.has_more);
    assert!(!page.messages.is_empty());
    assert!(page.messages.iter().all(|m| m.id > 7));
    assert!(page.messages.iter().all(|m| m.role == MessageRole::Assistant));

    let last = page.messages.last().unwrap();
    assert_eq!(last.content, "Changelog added.");
    assert_eq!(last.agent_name.as_deref(), Some("Coder"));
}

#[tokio::test]
async fn test_every_stream_ends_with_one_terminal_frame() {
    let cases: Vec<(Vec<ProviderResponse>, i64)> = vec![
        (vec![ProviderResponse::text("Done. TASK_COMPLETED")], PROJECT),
        (Vec::new(), PROJECT),
        (vec![ProviderResponse::text("")], PROJECT),
        (vec![ProviderResponse::text("Done. TASK_COMPLETED")], 99),
    ];

    for (script, project) in cases {
        let (_temp, gateway, _provider) = setup(script);
        let request = ChatRequest::new("rename the variable").with_tag(RequestTag::Simple);
        let frames = collect(gateway.start(project, request)).await;

        assert_eq!(terminal_count(&frames), 1, "{frames:?}");
        assert!(frames.last().unwrap().event.is_terminal());
        assert!(frames.windows(2).all(|w| w[1].id > w[0].id));
    }
}

#[tokio::test]
async fn test_concurrent_tasks_on_one_project_never_overlap() {
    const TASKS: usize = 4;

    // Each task is one tool turn and one closing turn. Shared script order
    // only holds if the tasks run one after another.
    let mut script = Vec::new();
    for n in 0..TASKS {
        script.push(ProviderResponse::with_tool_calls(
            format!("Task {n} writing."),
            vec![call(
                &format!("w{n}"),
                "write_file",
                json!({"path": format!("out_{n}.txt"), "content": "x"}),
            )],
        ));
        script.push(ProviderResponse::text(format!("Task {n} done. TASK_COMPLETED")));
    }
    let (temp, gateway, provider) = setup(script);

    let mut handles = Vec::new();
    for n in 0..TASKS {
        let gateway = gateway.clone();
        handles.push(tokio::spawn(async move {
            let request = ChatRequest::new(format!("write file {n}")).with_tag(RequestTag::Simple);
            gateway.run_to_completion(PROJECT, request).await
        }));
    }

    for handle in handles {
        let payload = handle.await.unwrap().unwrap();
        assert!(!payload.incomplete);
        assert_eq!(payload.changed_files.len(), 1);
        assert!(payload.message.content.ends_with("done."));
    }

    assert_eq!(provider.remaining(), 0);
    for n in 0..TASKS {
        assert!(project_root(&temp).join(format!("out_{n}.txt")).exists());
    }
}

#[tokio::test]
async fn test_start_frame_wire_format() {
    let (_temp, gateway, _provider) = setup(vec![ProviderResponse::text("Done. TASK_COMPLETED")]);
    let request = ChatRequest::new("touch nothing").with_tag(RequestTag::Simple);
    let frames = collect(gateway.start(PROJECT, request)).await;

    insta::assert_snapshot!(
        frames[0].to_line().trim_end(),
        @r#"{"id":1,"type":"start","data":{"session_id":1,"user_message_id":1}}"#
    );
}
