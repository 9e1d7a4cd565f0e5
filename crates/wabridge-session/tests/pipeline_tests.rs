//! End-to-end ingestion scenarios driven through the controller and the
//! stub gateway: live canonical rewrite, hidden↔phone merge, history sync.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use wabridge_session::{SessionController, SessionState};
use wabridge_shared::event::{
    GatewayEvent, HistoryConversation, HistoryMessage, HistorySync, LiveMessage, MessageContent,
    MessageInfo, MessageKey,
};
use wabridge_shared::gateway::GatewayFactory;
use wabridge_shared::testing::{StubFactory, StubGateway};
use wabridge_shared::{Jid, DEFAULT_USER_SERVER, GROUP_SERVER, HIDDEN_USER_SERVER};
use wabridge_store::MessageStore;

struct Harness {
    controller: Arc<SessionController>,
    gateway: Arc<StubGateway>,
    factory: Arc<StubFactory>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MessageStore::open(dir.path()).unwrap());
    let gateway = StubGateway::new();
    let factory = StubFactory::new(gateway.clone());
    let controller = SessionController::new(store, factory.clone() as Arc<dyn GatewayFactory>);
    Harness {
        controller,
        gateway,
        factory,
        _dir: dir,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}

fn pn() -> Jid {
    Jid::new("5551234567", DEFAULT_USER_SERVER)
}

fn lid() -> Jid {
    Jid::new("abcdef", HIDDEN_USER_SERVER)
}

fn live_text(id: &str, chat: Jid, sender: Jid, sender_alt: Option<Jid>, body: &str) -> LiveMessage {
    LiveMessage {
        info: MessageInfo {
            id: id.to_string(),
            chat,
            sender,
            sender_alt,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
            from_me: false,
        },
        content: MessageContent {
            conversation: Some(body.to_string()),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn live_message_is_rewritten_to_canonical_sender() {
    let h = harness();
    h.controller.ensure().await.unwrap();
    let events = h.factory.event_sender().unwrap();

    events
        .send(GatewayEvent::Message(live_text(
            "m1",
            pn(),
            pn(),
            None,
            "hello",
        )))
        .unwrap();

    let store = h.controller.store().clone();
    wait_until(|| !store.get_messages("5551234567", 10).unwrap().is_empty()).await;

    let messages = store.get_messages("5551234567", 10).unwrap();
    assert_eq!(messages[0].sender_id, "5551234567");
    assert_eq!(messages[0].content, "hello");

    assert_eq!(
        store.canonical_for_alias("5551234567").unwrap().as_deref(),
        Some("5551234567")
    );

    let chats = store.get_chats().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].chat_jid, "5551234567");
}

#[tokio::test]
async fn hidden_and_phone_space_messages_merge() {
    let h = harness();
    h.gateway.link_lid_pn(&lid(), &pn());
    h.controller.ensure().await.unwrap();
    let events = h.factory.event_sender().unwrap();

    // Message A arrives under the hidden space with a phone-number
    // alternate; message B arrives under the phone-number space directly.
    events
        .send(GatewayEvent::Message(live_text(
            "mA",
            lid(),
            lid(),
            Some(pn()),
            "first",
        )))
        .unwrap();
    events
        .send(GatewayEvent::Message(live_text(
            "mB",
            pn(),
            pn(),
            None,
            "second",
        )))
        .unwrap();

    let store = h.controller.store().clone();
    wait_until(|| store.get_messages("5551234567", 10).unwrap().len() == 2).await;

    let messages = store.get_messages("5551234567", 10).unwrap();
    assert!(messages.iter().all(|m| m.sender_id == "5551234567"));

    assert_eq!(
        store.canonical_for_alias("abcdef").unwrap().as_deref(),
        Some("5551234567")
    );
    assert_eq!(
        store.canonical_for_alias("5551234567").unwrap().as_deref(),
        Some("5551234567")
    );

    // The two address-space chats collapsed into one canonical chat row.
    let chats = store.get_chats().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].chat_jid, "5551234567");
}

#[tokio::test]
async fn group_chat_keeps_full_identifier() {
    let h = harness();
    let group = Jid::new("12036302", GROUP_SERVER);
    h.gateway.set_group_name(&group, "Weekend Plans");
    h.controller.ensure().await.unwrap();
    let events = h.factory.event_sender().unwrap();

    events
        .send(GatewayEvent::Message(live_text(
            "g1",
            group.clone(),
            pn(),
            None,
            "who's in?",
        )))
        .unwrap();

    let store = h.controller.store().clone();
    wait_until(|| !store.get_messages("12036302@g.us", 10).unwrap().is_empty()).await;

    let chats = store.get_chats().unwrap();
    assert_eq!(chats[0].chat_jid, "12036302@g.us");
    assert_eq!(chats[0].name.as_deref(), Some("Weekend Plans"));

    let messages = store.get_messages("12036302@g.us", 10).unwrap();
    assert_eq!(messages[0].sender_id, "5551234567");
}

#[tokio::test]
async fn empty_payload_is_dropped_but_chat_survives() {
    let h = harness();
    h.controller.ensure().await.unwrap();
    let events = h.factory.event_sender().unwrap();

    let mut message = live_text("m1", pn(), pn(), None, "");
    message.content = MessageContent::default();
    events.send(GatewayEvent::Message(message)).unwrap();

    let store = h.controller.store().clone();
    wait_until(|| !store.get_chats().unwrap().is_empty()).await;

    assert!(store.get_messages("5551234567", 10).unwrap().is_empty());
}

fn history_batch(conversations: usize, messages_per_conversation: usize) -> HistorySync {
    let base = 1_710_000_000i64;
    HistorySync {
        conversations: (0..conversations)
            .map(|c| HistoryConversation {
                id: Some(format!("55512345{c:02}@s.whatsapp.net")),
                display_name: None,
                name: Some(format!("Contact {c}")),
                messages: (0..messages_per_conversation)
                    .map(|m| HistoryMessage {
                        key: Some(MessageKey {
                            id: Some(format!("hist-{c}-{m}")),
                            from_me: false,
                            participant: None,
                        }),
                        // Newest first within a conversation.
                        timestamp: base - (m as i64) * 60,
                        content: MessageContent {
                            conversation: Some(format!("message {m}")),
                            ..Default::default()
                        },
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn history_sync_populates_cache_and_finishes_connected() {
    let h = harness();
    h.gateway.set_device(Some(Jid::new("5550009999", DEFAULT_USER_SERVER)));
    h.controller.ensure().await.unwrap();
    let events = h.factory.event_sender().unwrap();

    let status = h.controller.status().clone();
    status.set_logging_in("Logging into WhatsApp");

    events.send(GatewayEvent::Connected).unwrap();
    events
        .send(GatewayEvent::HistorySync(history_batch(10, 3)))
        .unwrap();

    wait_until(|| status.get().state == SessionState::Connected).await;

    let final_status = status.get();
    assert!(final_status.connected);
    assert_eq!(final_status.sync_progress, 100);

    let store = h.controller.store().clone();
    let chats = store.get_chats().unwrap();
    assert_eq!(chats.len(), 10);

    for chat in &chats {
        let messages = store.get_messages(&chat.chat_jid, 10).unwrap();
        assert_eq!(messages.len(), 3);
        // The chat's latest time matches its newest message.
        assert_eq!(chat.last_message_time, Some(messages[0].timestamp));
    }
}

#[tokio::test]
async fn history_sync_skips_zero_timestamps() {
    let h = harness();
    h.controller.ensure().await.unwrap();
    let events = h.factory.event_sender().unwrap();

    let mut batch = history_batch(1, 2);
    batch.conversations[0].messages[1].timestamp = 0;
    events.send(GatewayEvent::HistorySync(batch)).unwrap();

    let status = h.controller.status().clone();
    wait_until(|| status.get().state == SessionState::Connected).await;

    let store = h.controller.store().clone();
    let messages = store.get_messages("5551234500", 10).unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn history_sync_attributes_own_messages_to_device_identity() {
    let h = harness();
    h.gateway.set_device(Some(Jid::new("5550009999", DEFAULT_USER_SERVER)));
    h.controller.ensure().await.unwrap();
    let events = h.factory.event_sender().unwrap();

    let mut batch = history_batch(1, 1);
    batch.conversations[0].messages[0].key = Some(MessageKey {
        id: Some("own-1".into()),
        from_me: true,
        participant: None,
    });
    events.send(GatewayEvent::HistorySync(batch)).unwrap();

    let status = h.controller.status().clone();
    wait_until(|| status.get().state == SessionState::Connected).await;

    let store = h.controller.store().clone();
    let messages = store.get_messages("5551234500", 10).unwrap();
    assert!(messages[0].is_from_me);
    assert_eq!(messages[0].sender_id, "5550009999");
}

#[tokio::test]
async fn logged_out_event_publishes_logged_out_state() {
    let h = harness();
    h.controller.ensure().await.unwrap();
    let events = h.factory.event_sender().unwrap();

    events.send(GatewayEvent::LoggedOut).unwrap();

    let status = h.controller.status().clone();
    wait_until(|| status.get().state == SessionState::LoggedOut).await;
}
