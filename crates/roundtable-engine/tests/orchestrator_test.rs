mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::{overview, panel, Call, Script, ScriptedClient};
use roundtable_engine::{EngineError, Orchestrator, OrchestratorHandle, RoundState, ScreenMode, TimelineItem};
use roundtable_persist::{ChangeRecordService, MemoryBackend, StreamStatusStore, ThreadService};
use roundtable_types::{
    ChatMode, Command, EngineConfig, FinishReason, Message, RecordStatus, StreamKey, StreamStatus,
    StreamTarget, SynthesisRecord, Thread, ThreadSnapshot,
};

const WAIT: Duration = Duration::from_secs(5);

fn spawn(
    backend: &Arc<MemoryBackend>,
    client: &Arc<ScriptedClient>,
    state: RoundState,
) -> OrchestratorHandle {
    Orchestrator::builder()
        .backend(backend.clone())
        .round_client(client.clone())
        .config(EngineConfig::default().with_tick_interval(Duration::from_millis(50)))
        .build()
        .unwrap()
        .spawn_with_state(state)
}

async fn submit(handle: &OrchestratorHandle, content: &str) {
    handle
        .dispatch(Command::SubmitMessage {
            content: content.to_string(),
        })
        .await
        .unwrap();
}

/// Poll the backend until its view of the thread satisfies `check`
async fn eventually<F>(backend: &MemoryBackend, thread_id: &str, check: F) -> ThreadSnapshot
where
    F: Fn(&ThreadSnapshot) -> bool,
{
    for _ in 0..100 {
        let snapshot = backend.load_thread(thread_id).await.unwrap();
        if check(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("backend never reached the expected state");
}

#[tokio::test]
async fn test_first_round_streams_and_navigates() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new());
    let handle = spawn(&backend, &client, overview(2, true));

    submit(&handle, "How should we shard the orders table?").await;

    let state = handle
        .wait_until(|s| s.screen_mode == ScreenMode::Thread && s.is_round_complete(0), WAIT)
        .await
        .unwrap();

    assert_eq!(client.participant_calls(), vec![(0, 0), (0, 1)]);
    let calls = client.calls();
    assert!(calls.iter().all(|call| match call {
        Call::Participant { has_research, .. } => *has_research,
        Call::Synthesis {
            participant_messages,
            ..
        } => *participant_messages == 2,
    }));
    assert_eq!(state.thread.as_ref().map(|t| t.title_ready()), Some(true));
    assert_eq!(state.research(0).map(|r| r.status), Some(RecordStatus::Complete));

    let thread_id = state.thread_id().unwrap().to_string();
    let research_status = backend
        .get_status(&StreamKey::new(&thread_id, 0, StreamTarget::Research))
        .await
        .unwrap();
    assert_eq!(research_status, StreamStatus::Completed);

    let persisted = eventually(&backend, &thread_id, |s| {
        s.messages.len() == 4 && s.messages.iter().all(|m| m.is_user() || m.is_settled())
    })
    .await;
    assert!(persisted.messages.iter().any(|m| m.is_moderator));

    match &handle.timeline()[..] {
        [TimelineItem::Messages {
            participants,
            moderator,
            research,
            ..
        }] => {
            assert_eq!(participants.len(), 2);
            assert!(moderator.is_some());
            assert!(research.is_some());
        }
        other => panic!("unexpected timeline {:?}", other),
    }
}

#[tokio::test]
async fn test_configuration_change_produces_change_record_before_streaming() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new());
    let handle = spawn(&backend, &client, overview(1, false));

    submit(&handle, "Monolith or services?").await;
    handle
        .wait_until(|s| s.is_round_complete(0) && s.streaming_round_number.is_none(), WAIT)
        .await
        .unwrap();

    handle
        .dispatch(Command::SetMode {
            mode: ChatMode::Debating,
        })
        .await
        .unwrap();
    submit(&handle, "Argue for services").await;

    let state = handle
        .wait_until(|s| s.is_round_complete(1), WAIT)
        .await
        .unwrap();
    assert!(state.change_record(1).is_some());
    assert_eq!(state.config.mode, ChatMode::Debating);
    assert_eq!(client.participant_calls(), vec![(0, 0), (1, 0)]);

    let thread_id = state.thread_id().unwrap();
    let record = backend.fetch_change_record(thread_id, 1).await.unwrap();
    assert!(record.is_some());
    assert!(matches!(
        handle.timeline().iter().find(|item| item.round_number() == 1),
        Some(TimelineItem::ChangeNote { .. })
    ));
}

#[tokio::test]
async fn test_interrupted_participant_does_not_stall_round() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new().with_participant(
        "p-0",
        Script::FailMidway {
            partial: "Half an answer".to_string(),
            error: "connection reset".to_string(),
        },
    ));
    let handle = spawn(&backend, &client, overview(2, false));

    submit(&handle, "Pick a database").await;
    let state = handle
        .wait_until(|s| s.is_round_complete(0), WAIT)
        .await
        .unwrap();

    let first = state.participant_message(0, 0).unwrap();
    assert_eq!(first.finish_reason, Some(FinishReason::Error));
    assert_eq!(first.content, "Half an answer");
    assert_eq!(client.participant_calls(), vec![(0, 0), (0, 1)]);

    let thread_id = state.thread_id().unwrap();
    let status = backend
        .get_status(&StreamKey::participant(thread_id, 0, 0))
        .await
        .unwrap();
    assert_eq!(status, StreamStatus::Failed);
}

#[tokio::test]
async fn test_empty_participant_answer_is_terminal_and_round_continues() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new().with_participant("p-0", Script::Empty));
    let handle = spawn(&backend, &client, overview(2, false));

    submit(&handle, "Pick a cache").await;
    let state = handle
        .wait_until(|s| s.is_round_complete(0), WAIT)
        .await
        .unwrap();

    assert_eq!(client.participant_calls(), vec![(0, 0), (0, 1)]);
    let empty = state.participant_message(0, 0).unwrap();
    assert_eq!(empty.finish_reason, Some(FinishReason::Unknown));
    assert_eq!(state.synthesis(0).map(|s| s.status), Some(RecordStatus::Complete));

    let thread_id = state.thread_id().unwrap();
    let status = backend
        .get_status(&StreamKey::participant(thread_id, 0, 0))
        .await
        .unwrap();
    assert_eq!(status, StreamStatus::Completed);
}

#[tokio::test]
async fn test_empty_synthesis_fails_and_still_navigates() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new().with_synthesis(Script::Empty));
    let handle = spawn(&backend, &client, overview(1, false));

    submit(&handle, "Tabs or spaces?").await;
    let state = handle
        .wait_until(|s| s.screen_mode == ScreenMode::Thread, WAIT)
        .await
        .unwrap();

    assert_eq!(state.synthesis(0).map(|s| s.status), Some(RecordStatus::Failed));
    assert!(state.error.is_some());
}

#[tokio::test]
async fn test_attach_resumes_interrupted_participant() {
    let backend = Arc::new(MemoryBackend::new());
    let now = Utc::now();
    let mut snapshot = ThreadSnapshot::new(Thread::new("t-resume", "resume", now), panel(2));
    snapshot.messages = vec![
        Message::user("u-0", "t-resume", 0, "Cache invalidation?", now),
        Message::participant("m-0", "t-resume", 0, 0, "p-0", now)
            .with_content("Use TTLs")
            .with_finish_reason(FinishReason::Stop),
        Message::participant("m-1", "t-resume", 0, 1, "p-1", now).with_content("Event-dri"),
    ];
    snapshot
        .syntheses
        .push(SynthesisRecord::placeholder("s-0", "t-resume", 0, now));
    backend.insert_snapshot(snapshot).await;

    let client = Arc::new(ScriptedClient::new());
    let handle = spawn(&backend, &client, RoundState::new());
    handle
        .dispatch(Command::Attach {
            thread_id: "t-resume".to_string(),
        })
        .await
        .unwrap();

    let state = handle
        .wait_until(|s| s.is_round_complete(0), WAIT)
        .await
        .unwrap();
    assert_eq!(client.participant_calls(), vec![(0, 1)]);

    let resumed = state.participant_message(0, 1).unwrap();
    assert_eq!(resumed.id, "m-1");
    assert_eq!(resumed.content, "p-1 weighs in");

    let persisted = eventually(&backend, "t-resume", |s| {
        s.syntheses.iter().any(|r| r.status == RecordStatus::Complete)
    })
    .await;
    assert_eq!(
        persisted.messages.iter().filter(|m| m.is_participant()).count(),
        2
    );
}

#[tokio::test]
async fn test_retry_regenerates_round() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new());
    let handle = spawn(&backend, &client, overview(1, false));

    submit(&handle, "Name the service").await;
    let first = handle
        .wait_until(|s| s.is_round_complete(0) && s.streaming_round_number.is_none(), WAIT)
        .await
        .unwrap();
    let first_synthesis = first.synthesis(0).unwrap().id.clone();

    handle
        .dispatch(Command::RetryRound { round_number: 0 })
        .await
        .unwrap();
    handle
        .wait_until(
            |s| {
                s.is_round_complete(0)
                    && s.synthesis(0).map(|r| r.id != first_synthesis).unwrap_or(false)
            },
            WAIT,
        )
        .await
        .unwrap();

    assert_eq!(client.participant_calls(), vec![(0, 0), (0, 0)]);
    let synthesis_calls = client
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Synthesis { .. }))
        .count();
    assert_eq!(synthesis_calls, 2);
}

#[tokio::test]
async fn test_empty_submission_is_rejected() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new());
    let handle = spawn(&backend, &client, overview(1, false));

    let result = handle
        .dispatch(Command::SubmitMessage {
            content: "   ".to_string(),
        })
        .await;
    assert!(matches!(result, Err(EngineError::Rejected(_))));
}

#[tokio::test]
async fn test_attach_unknown_thread_fails() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new());
    let handle = spawn(&backend, &client, RoundState::new());

    let result = handle
        .dispatch(Command::Attach {
            thread_id: "missing".to_string(),
        })
        .await;
    assert!(matches!(result, Err(EngineError::Persist(_))));
}

#[tokio::test]
async fn test_shutdown_closes_handle() {
    let backend = Arc::new(MemoryBackend::new());
    let client = Arc::new(ScriptedClient::new());
    let handle = spawn(&backend, &client, overview(1, false));

    handle.shutdown().await;
    let result = handle
        .dispatch(Command::SetOnline { online: false })
        .await;
    assert!(matches!(result, Err(EngineError::Closed)));
}

#[test]
fn test_builder_requires_collaborators() {
    let result = Orchestrator::builder()
        .backend(Arc::new(MemoryBackend::new()))
        .build();

    let error = result.err().expect("participant client missing");
    assert!(error.to_string().contains("required"));
}

#[test]
fn test_builder_rejects_zero_capacity_and_tick() {
    let build = |config: EngineConfig| {
        Orchestrator::builder()
            .backend(Arc::new(MemoryBackend::new()))
            .round_client(Arc::new(ScriptedClient::new()))
            .config(config)
            .build()
    };

    let error = build(EngineConfig::new().with_channel_capacity(0))
        .err()
        .expect("zero capacity accepted");
    assert!(error.to_string().contains("capacity"));

    let error = build(EngineConfig::new().with_tick_interval(Duration::ZERO))
        .err()
        .expect("zero tick accepted");
    assert!(error.to_string().contains("Tick interval"));

    assert!(build(EngineConfig::default()).is_ok());
}
