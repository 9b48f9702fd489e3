//! End-to-end moderation flows against an in-memory event log and a
//! recording chat gateway.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use xgate_core::config::ModerationConfig;
use xgate_core::moderation::{ChatKind, Decision, IncomingMessage, Sender};
use xgate_core::storage::{EventStore, LinkEvent, SqliteEventStore, StorageError};
use xgate_runtime::{
    AdminCapabilities, ChatGateway, ConfigHandle, EngineError, GatewayError, MessageHandle,
    ModerationEngine, TextFormat,
};

const CHAT: i64 = -100_123;
const USER: i64 = 42;
const CONTEXT: &str = "Interesting thread about the new compiler release";
const NOTICE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sent {
    chat_id: i64,
    text: String,
    reply_to: Option<i32>,
    handle: MessageHandle,
}

struct RecordingGateway {
    can_delete: AtomicBool,
    fail_delete: AtomicBool,
    fail_capabilities: AtomicBool,
    fail_send: AtomicBool,
    next_id: AtomicI32,
    sent: Mutex<Vec<Sent>>,
    deleted: Mutex<Vec<MessageHandle>>,
}

impl RecordingGateway {
    fn new(can_delete: bool) -> Self {
        Self {
            can_delete: AtomicBool::new(can_delete),
            fail_delete: AtomicBool::new(false),
            fail_capabilities: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            next_id: AtomicI32::new(1000),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock").clone()
    }

    fn deleted(&self) -> Vec<MessageHandle> {
        self.deleted.lock().expect("deleted lock").clone()
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn get_self_id(&self) -> Result<i64, GatewayError> {
        Ok(7)
    }

    async fn get_admin_capabilities(
        &self,
        _chat_id: i64,
    ) -> Result<AdminCapabilities, GatewayError> {
        if self.fail_capabilities.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("getChatMember timed out".into()));
        }
        let can_delete = self.can_delete.load(Ordering::SeqCst);
        Ok(AdminCapabilities {
            is_admin: can_delete,
            can_delete_messages: can_delete,
        })
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to: Option<i32>,
    ) -> Result<MessageHandle, GatewayError> {
        assert_eq!(format, TextFormat::Html);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("Too Many Requests".into()));
        }
        let handle = MessageHandle::new(chat_id, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().expect("sent lock").push(Sent {
            chat_id,
            text: text.to_string(),
            reply_to,
            handle,
        });
        Ok(handle)
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), GatewayError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("message can't be deleted".into()));
        }
        self.deleted.lock().expect("deleted lock").push(handle);
        Ok(())
    }
}

/// Reads succeed with an empty log; every write fails.
struct ReadOnlyStore;

#[async_trait]
impl EventStore for ReadOnlyStore {
    async fn record(&self, _event: &LinkEvent) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    async fn record_all(&self, _events: &[LinkEvent]) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    async fn count_since(
        &self,
        _user_id: i64,
        _chat_id: i64,
        _since: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        Ok(0)
    }

    async fn events_since(
        &self,
        _user_id: i64,
        _chat_id: i64,
        _since: DateTime<Utc>,
    ) -> Result<Vec<LinkEvent>, StorageError> {
        Ok(Vec::new())
    }

    async fn prune(&self, _older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        Ok(0)
    }

    async fn check_connection(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

struct Harness {
    gateway: Arc<RecordingGateway>,
    store: Arc<dyn EventStore>,
    engine: ModerationEngine,
}

async fn harness(can_delete: bool) -> Harness {
    let store: Arc<dyn EventStore> =
        Arc::new(SqliteEventStore::in_memory().await.expect("in-memory store"));
    harness_with_store(can_delete, store)
}

fn harness_with_store(can_delete: bool, store: Arc<dyn EventStore>) -> Harness {
    let gateway = Arc::new(RecordingGateway::new(can_delete));
    let dyn_gateway: Arc<dyn ChatGateway> = gateway.clone();
    let engine = ModerationEngine::new(
        dyn_gateway,
        Arc::clone(&store),
        Arc::new(ConfigHandle::new(ModerationConfig::default())),
        NOTICE_DELAY,
    );
    Harness {
        gateway,
        store,
        engine,
    }
}

fn group_message(message_id: i32, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: CHAT,
        chat_kind: ChatKind::Supergroup,
        message_id,
        sender: Some(Sender::new(USER, "Ann <dev>")),
        text: Some(text.to_string()),
    }
}

async fn recorded(store: &Arc<dyn EventStore>) -> u32 {
    store
        .count_since(USER, CHAT, Utc::now() - TimeDelta::days(7))
        .await
        .expect("count")
}

#[tokio::test]
async fn quota_fills_up_then_rejects() -> Result<(), EngineError> {
    let h = harness(true).await;

    let first = format!("{CONTEXT} https://x.com/a/status/1 https://twitter.com/b/status/2");
    let decision = h.engine.handle(&group_message(1, &first)).await?;
    match &decision {
        Decision::Allowed { links, quota } => {
            assert_eq!(links.len(), 2);
            assert_eq!(quota.remaining, 1);
        }
        other => panic!("unexpected decision: {other:?}"),
    }
    assert_eq!(recorded(&h.store).await, 2);

    let sent = h.gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reply_to, Some(1));
    assert!(sent[0].text.contains("You have 1 X link(s) remaining"));

    let third = format!("{CONTEXT} https://fxtwitter.com/c/status/3");
    let decision = h.engine.handle(&group_message(2, &third)).await?;
    assert!(matches!(
        decision,
        Decision::Allowed { ref quota, .. } if quota.remaining == 0
    ));
    assert_eq!(recorded(&h.store).await, 3);
    assert!(h.gateway.sent()[1].text.contains("You have 0 X link(s)"));

    let fourth = format!("{CONTEXT} https://x.com/d/status/4");
    let decision = h.engine.handle(&group_message(3, &fourth)).await?;
    assert!(matches!(decision, Decision::RateLimited { .. }));
    assert_eq!(recorded(&h.store).await, 3);
    assert!(h.gateway.deleted().contains(&MessageHandle::new(CHAT, 3)));

    let warning = h.gateway.sent().pop().expect("warning sent");
    assert!(warning.text.starts_with(r#"<a href="tg://user?id=42">Ann &lt;dev&gt;</a>: "#));
    assert!(warning.text.contains("weekly limit (3 X links per week)"));
    assert_eq!(warning.reply_to, None);
    Ok(())
}

#[tokio::test]
async fn missing_context_deletes_and_records_nothing() -> Result<(), EngineError> {
    let h = harness(true).await;

    let decision = h
        .engine
        .handle(&group_message(9, "ten chars! https://x.com/a/status/1"))
        .await?;

    assert_eq!(decision, Decision::ContextMissing { context_len: 10 });
    assert_eq!(recorded(&h.store).await, 0);
    assert_eq!(h.gateway.deleted(), vec![MessageHandle::new(CHAT, 9)]);

    let sent = h.gateway.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("minimum 30 characters"));
    Ok(())
}

#[tokio::test]
async fn warning_is_removed_after_delay() -> Result<(), EngineError> {
    let h = harness(true).await;

    h.engine
        .handle(&group_message(9, "short https://x.com/a/status/1"))
        .await?;
    let warning = h.gateway.sent()[0].handle;
    assert!(!h.gateway.deleted().contains(&warning));

    tokio::time::sleep(NOTICE_DELAY * 6).await;
    assert!(h.gateway.deleted().contains(&warning));
    Ok(())
}

#[tokio::test]
async fn failed_delete_sends_no_warning() -> Result<(), EngineError> {
    let h = harness(true).await;
    h.gateway.fail_delete.store(true, Ordering::SeqCst);

    let decision = h
        .engine
        .handle(&group_message(9, "https://x.com/a/status/1"))
        .await?;

    assert!(decision.is_violation());
    assert!(h.gateway.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_warning_send_schedules_nothing() -> Result<(), EngineError> {
    let h = harness(true).await;
    h.gateway.fail_send.store(true, Ordering::SeqCst);

    let decision = h
        .engine
        .handle(&group_message(9, "https://x.com/a/status/1"))
        .await?;

    assert!(decision.is_violation());
    assert_eq!(h.gateway.deleted(), vec![MessageHandle::new(CHAT, 9)]);
    assert!(h.gateway.sent().is_empty());
    assert_eq!(h.engine.notices().pending(), 0);
    Ok(())
}

#[tokio::test]
async fn capability_query_failure_counts_as_no_permission() -> Result<(), EngineError> {
    let h = harness(true).await;
    h.gateway.fail_capabilities.store(true, Ordering::SeqCst);

    let text = format!("{CONTEXT} https://x.com/a/status/1");
    let decision = h.engine.handle(&group_message(4, &text)).await?;

    assert_eq!(decision, Decision::PermissionDenied);
    assert!(h.gateway.deleted().is_empty());
    assert_eq!(recorded(&h.store).await, 0);

    let sent = h.gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reply_to, Some(4));
    assert!(sent[0].text.contains("Delete Messages"));
    Ok(())
}

#[tokio::test]
async fn storage_failure_is_reported_without_notice() {
    let h = harness_with_store(true, Arc::new(ReadOnlyStore));

    let text = format!("{CONTEXT} https://x.com/a/status/1 https://x.com/b/status/2");
    let result = h.engine.handle(&group_message(1, &text)).await;

    assert!(matches!(result, Err(EngineError::Storage(StorageError::Io(_)))));
    assert!(h.gateway.sent().is_empty());
    assert!(h.gateway.deleted().is_empty());
}

#[tokio::test]
async fn missing_permission_replies_with_setup_help() -> Result<(), EngineError> {
    let h = harness(false).await;

    let text = format!("{CONTEXT} https://x.com/a/status/1");
    let decision = h.engine.handle(&group_message(5, &text)).await?;

    assert_eq!(decision, Decision::PermissionDenied);
    assert!(h.gateway.deleted().is_empty());
    assert_eq!(recorded(&h.store).await, 0);

    let sent = h.gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, CHAT);
    assert_eq!(sent[0].reply_to, Some(5));
    assert!(sent[0].text.contains("Delete Messages"));
    Ok(())
}

#[tokio::test]
async fn private_chats_and_plain_text_are_ignored() -> Result<(), EngineError> {
    let h = harness(true).await;

    let mut private = group_message(1, "https://x.com/a/status/1");
    private.chat_kind = ChatKind::Private;
    assert_eq!(h.engine.handle(&private).await?, Decision::Ignored);

    let plain = group_message(2, "no links in this message at all");
    assert_eq!(h.engine.handle(&plain).await?, Decision::Ignored);

    assert!(h.gateway.sent().is_empty());
    assert!(h.gateway.deleted().is_empty());
    Ok(())
}

#[tokio::test]
async fn reload_applies_to_next_message() -> Result<(), EngineError> {
    let h = harness(true).await;
    h.engine.config().replace(ModerationConfig {
        require_context: false,
        max_links_per_week: 1,
        ..ModerationConfig::default()
    });

    let first = h
        .engine
        .handle(&group_message(1, "https://x.com/a/status/1"))
        .await?;
    assert!(matches!(first, Decision::Allowed { .. }));

    let second = h
        .engine
        .handle(&group_message(2, "https://x.com/b/status/2"))
        .await?;
    assert!(matches!(second, Decision::RateLimited { .. }));
    assert!(h.gateway.sent().last().expect("warning").text.contains("(1 X links per week)"));
    Ok(())
}

#[tokio::test]
async fn shutdown_flushes_notices() -> Result<(), EngineError> {
    let gateway = Arc::new(RecordingGateway::new(true));
    let dyn_gateway: Arc<dyn ChatGateway> = gateway.clone();
    let store: Arc<dyn EventStore> =
        Arc::new(SqliteEventStore::in_memory().await.expect("in-memory store"));
    let engine = ModerationEngine::new(
        dyn_gateway,
        store,
        Arc::new(ConfigHandle::default()),
        Duration::from_secs(3600),
    );

    engine
        .handle(&group_message(9, "short https://x.com/a/status/1"))
        .await?;
    assert_eq!(engine.notices().pending(), 1);

    engine.notices().shutdown().await;
    let warning = gateway.sent()[0].handle;
    assert!(gateway.deleted().contains(&warning));
    Ok(())
}
