//! Event ingestion pipeline.
//!
//! Consumes the upstream event stream sequentially: each handler runs to
//! completion before the next event is taken, so ordering within a chat is
//! the upstream delivery order. Cache and resolver failures are logged and
//! swallowed; one bad row never stalls ingestion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use wabridge_shared::event::{GatewayEvent, HistoryConversation, HistorySync, LiveMessage};
use wabridge_shared::gateway::Gateway;
use wabridge_shared::log_refs::{obfuscated_chat_ref, obfuscated_message_ref};
use wabridge_shared::Jid;
use wabridge_store::{MessageRecord, MessageStore};

use crate::extract::{extract_media_info, extract_text_content};
use crate::identity::{
    canonicalize_chat_id, canonicalize_sender, chat_alias_ids, parse_sender_jid, sender_alias_ids,
};
use crate::status::{SessionState, StatusHandle};

/// How long to wait for a history payload after connecting before promoting
/// the session to connected anyway.
const SYNC_WATCHDOG: Duration = Duration::from_secs(20);

pub(crate) fn spawn_event_pipeline(
    gateway: Arc<dyn Gateway>,
    store: Arc<MessageStore>,
    status: StatusHandle,
    mut events: mpsc::UnboundedReceiver<GatewayEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                GatewayEvent::Message(message) => {
                    handle_live_message(gateway.as_ref(), &store, &message).await;
                }
                GatewayEvent::HistorySync(batch) => {
                    handle_history_sync(gateway.as_ref(), &store, &status, &batch).await;
                }
                GatewayEvent::Connected => handle_connected(&status),
                GatewayEvent::LoggedOut => {
                    warn!("device logged out, please scan QR code to log in again");
                    status.set_logged_out("WhatsApp logged out, reconnect required");
                }
            }
        }
        debug!("event pipeline stopped");
    })
}

fn handle_connected(status: &StatusHandle) {
    info!("connected to WhatsApp");
    let current = status.get();
    match current.state {
        SessionState::AwaitingQr | SessionState::LoggingIn | SessionState::Syncing => {
            status.set_syncing("Syncing WhatsApp messages", 20, 0, 0);
            let status = status.clone();
            tokio::spawn(async move {
                // If no history payload arrives, avoid staying in syncing
                // forever. Once history sync starts, the totals are populated
                // and completion is driven by handle_history_sync instead.
                tokio::time::sleep(SYNC_WATCHDOG).await;
                let current = status.get();
                if current.state == SessionState::Syncing
                    && current.sync_total == 0
                    && current.sync_current == 0
                {
                    status.set_connected("WhatsApp connected");
                }
            });
        }
        _ => status.set_connected("WhatsApp connected"),
    }
}

/// Upsert sender aliases and rewrite old sender ids.
fn sync_sender_aliases(
    store: &MessageStore,
    canonical_id: &str,
    aliases: &[String],
    timestamp: DateTime<Utc>,
    context: &str,
) {
    if let Err(e) = store.upsert_aliases(canonical_id, aliases, timestamp) {
        warn!(context, error = %e, "failed to store sender aliases");
    }
    if let Err(e) = store.promote_sender(canonical_id, aliases) {
        warn!(context, error = %e, "failed to promote sender ids");
    }
}

/// Upsert chat aliases and rewrite old chat ids.
fn sync_chat_aliases(
    store: &MessageStore,
    canonical_id: &str,
    aliases: &[String],
    timestamp: DateTime<Utc>,
    context: &str,
) {
    if let Err(e) = store.upsert_aliases(canonical_id, aliases, timestamp) {
        warn!(context, error = %e, "failed to store chat aliases");
    }
    if let Err(e) = store.promote_chat(canonical_id, aliases) {
        warn!(context, error = %e, "failed to promote chat ids");
    }
}

pub(crate) async fn handle_live_message(
    gateway: &dyn Gateway,
    store: &MessageStore,
    message: &LiveMessage,
) {
    let chat_jid = message.info.chat.to_non_ad();
    let chat_id = canonicalize_chat_id(gateway, &chat_jid).await;
    let sender =
        canonicalize_sender(gateway, &message.info.sender, message.info.sender_alt.as_ref()).await;

    let name = resolve_chat_name(gateway, store, &chat_jid, &chat_id, None, &sender).await;
    if let Err(e) = store.upsert_chat(&chat_id, &name, Some(message.info.timestamp)) {
        warn!(error = %e, "failed to store chat");
    }

    let content = extract_text_content(&message.content);
    let media = extract_media_info(&message.content, message.info.timestamp);
    if content.is_empty() && media.is_none() {
        return;
    }
    let media_kind = media.as_ref().and_then(|m| m.kind);

    let alias_ids = sender_alias_ids(
        gateway,
        &message.info.sender,
        message.info.sender_alt.as_ref(),
        &sender,
    )
    .await;
    sync_sender_aliases(store, &sender, &alias_ids, message.info.timestamp, "sender");

    if !chat_jid.is_group() {
        let chat_aliases = chat_alias_ids(gateway, &chat_jid, &chat_id).await;
        sync_chat_aliases(store, &chat_id, &chat_aliases, message.info.timestamp, "live");
    }

    let record = MessageRecord {
        id: message.info.id.clone(),
        chat_jid: chat_id,
        sender_id: sender,
        content,
        timestamp: message.info.timestamp,
        is_from_me: message.info.from_me,
        media,
    };
    if let Err(e) = store.upsert_message(&record) {
        warn!(error = %e, "failed to store message");
        return;
    }

    let message_ref = obfuscated_message_ref(&message.info.id);
    let direction = if message.info.from_me { "→" } else { "←" };
    match media_kind {
        Some(kind) => info!(
            message_ref,
            direction,
            media_type = %kind,
            ts = %message.info.timestamp,
            "stored live media message"
        ),
        None => info!(
            message_ref,
            direction,
            ts = %message.info.timestamp,
            "stored live text message"
        ),
    }
}

/// Best available display name for a chat.
async fn resolve_chat_name(
    gateway: &dyn Gateway,
    store: &MessageStore,
    jid: &Jid,
    chat_id: &str,
    conversation: Option<&HistoryConversation>,
    sender: &str,
) -> String {
    let chat_ref = obfuscated_chat_ref(chat_id);
    if let Ok(Some(existing)) = store.get_chat_name(chat_id) {
        debug!(chat_ref, "using existing chat name");
        return existing;
    }

    if jid.is_group() {
        let from_snapshot = conversation.and_then(|conv| {
            conv.display_name
                .clone()
                .filter(|name| !name.is_empty())
                .or_else(|| conv.name.clone().filter(|name| !name.is_empty()))
        });
        let name = match from_snapshot {
            Some(name) => name,
            None => match gateway.group_name(jid).await.filter(|n| !n.is_empty()) {
                Some(name) => name,
                None => format!("Group {}", jid.user),
            },
        };
        debug!(chat_ref, "resolved group chat name");
        return name;
    }

    let name = match gateway.contact_name(jid).await.filter(|n| !n.is_empty()) {
        Some(name) => name,
        None if !sender.is_empty() => sender.to_string(),
        None => jid.user.clone(),
    };
    debug!(chat_ref, "resolved contact chat name");
    name
}

fn publish_progress(status: &StatusHandle, processed: usize, total: usize) {
    if total == 0 {
        return;
    }
    let progress = 25 + ((processed as f64 / total as f64) * 70.0) as u8;
    status.set_syncing_progress(progress.min(95), processed, total);
}

pub(crate) async fn handle_history_sync(
    gateway: &dyn Gateway,
    store: &MessageStore,
    status: &StatusHandle,
    batch: &HistorySync,
) {
    let total = batch.conversations.len();
    info!(conversations = total, "received history sync event");
    if total > 0 {
        status.set_syncing("Syncing WhatsApp messages", 25, 0, total);
    }

    let mut synced = 0usize;
    for (idx, conversation) in batch.conversations.iter().enumerate() {
        let processed = idx + 1;

        let Some(raw_chat_id) = conversation.id.as_deref().filter(|id| !id.is_empty()) else {
            publish_progress(status, processed, total);
            continue;
        };
        let jid = match raw_chat_id.parse::<Jid>() {
            Ok(jid) => jid.to_non_ad(),
            Err(e) => {
                warn!(chat_ref = obfuscated_chat_ref(raw_chat_id), error = %e, "failed to parse chat JID");
                publish_progress(status, processed, total);
                continue;
            }
        };

        let chat_id = canonicalize_chat_id(gateway, &jid).await;
        let name = resolve_chat_name(gateway, store, &jid, &chat_id, Some(conversation), "").await;

        if conversation.messages.is_empty() {
            publish_progress(status, processed, total);
            continue;
        }

        // Messages arrive newest first; the head carries the chat's
        // latest-activity timestamp. A zero timestamp is unusable.
        let newest = &conversation.messages[0];
        let Some(chat_time) = unix_timestamp(newest.timestamp) else {
            publish_progress(status, processed, total);
            continue;
        };

        if let Err(e) = store.upsert_chat(&chat_id, &name, Some(chat_time)) {
            warn!(error = %e, "failed to store history chat");
        }

        if !jid.is_group() {
            let chat_aliases = chat_alias_ids(gateway, &jid, &chat_id).await;
            sync_chat_aliases(store, &chat_id, &chat_aliases, chat_time, "history");
        }

        for history_message in &conversation.messages {
            let Some(timestamp) = unix_timestamp(history_message.timestamp) else {
                continue;
            };

            let content = extract_text_content(&history_message.content);
            let media = extract_media_info(&history_message.content, timestamp);
            if content.is_empty() && media.is_none() {
                continue;
            }
            let media_kind = media.as_ref().and_then(|m| m.kind);

            let mut is_from_me = false;
            let sender_jid = match &history_message.key {
                Some(key) => {
                    is_from_me = key.from_me;
                    let participant = key.participant.as_deref().unwrap_or("");
                    if !is_from_me && !participant.is_empty() {
                        parse_sender_jid(participant)
                    } else if is_from_me {
                        gateway
                            .device_id()
                            .map(|own| own.to_non_ad())
                            .unwrap_or_else(|| jid.clone())
                    } else {
                        jid.clone()
                    }
                }
                None => jid.clone(),
            };
            let sender = canonicalize_sender(gateway, &sender_jid, None).await;

            let message_id = history_message
                .key
                .as_ref()
                .and_then(|key| key.id.clone())
                .unwrap_or_default();

            let alias_ids = sender_alias_ids(gateway, &sender_jid, None, &sender).await;
            sync_sender_aliases(store, &sender, &alias_ids, timestamp, "history sender");

            let record = MessageRecord {
                id: message_id.clone(),
                chat_jid: chat_id.clone(),
                sender_id: sender,
                content,
                timestamp,
                is_from_me,
                media,
            };
            if let Err(e) = store.upsert_message(&record) {
                warn!(error = %e, "failed to store history message");
                continue;
            }

            synced += 1;
            let message_ref = obfuscated_message_ref(&message_id);
            match media_kind {
                Some(kind) => debug!(
                    message_ref,
                    media_type = %kind,
                    ts = %timestamp,
                    "stored history media message"
                ),
                None => debug!(message_ref, ts = %timestamp, "stored history text message"),
            }
        }

        publish_progress(status, processed, total);
    }

    info!(stored = synced, "history sync complete");
    if total > 0 {
        status.set_connected("WhatsApp connected");
    }
}

fn unix_timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    Utc.timestamp_opt(seconds, 0).single()
}
