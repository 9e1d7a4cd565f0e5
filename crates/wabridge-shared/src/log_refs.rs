//! Obfuscated log references.
//!
//! Raw chat and message identifiers never appear in logs. Log lines carry a
//! stable, non-reversible short reference instead: the hex of the first six
//! bytes of the SHA-256 of the raw identifier.

use sha2::{Digest, Sha256};

fn obfuscated_ref(prefix: &str, raw: &str) -> String {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return format!("{prefix}_unknown");
    }

    let digest = Sha256::digest(cleaned.as_bytes());
    format!("{prefix}_{}", hex::encode(&digest[..6]))
}

pub fn obfuscated_chat_ref(chat_id: &str) -> String {
    obfuscated_ref("chat", chat_id)
}

pub fn obfuscated_message_ref(message_id: &str) -> String {
    obfuscated_ref("msg", message_id)
}
