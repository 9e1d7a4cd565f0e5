//! Identity resolution across the two personal address spaces.
//!
//! The platform addresses the same human through a phone-number space and a
//! hidden (LID) space. Persisted rows always carry one canonical id per
//! person: the bare user part of the phone-number form whenever it is known,
//! otherwise the bare hidden form. Group identifiers keep their full
//! `user@g.us` string and never pass through sender resolution.
//!
//! Resolution is pure given a snapshot of the library's LID↔PN index; the
//! event pipeline is responsible for feeding the results into the alias
//! table and promoting existing rows.

use wabridge_shared::gateway::Gateway;
use wabridge_shared::{normalize_user_id, Jid, DEFAULT_USER_SERVER};

/// Parse a raw sender string into a non-device identifier.
///
/// Accepts either a full `user@server` form or bare digits, which are taken
/// to live in the phone-number space.
pub fn parse_sender_jid(sender: &str) -> Jid {
    let sender = sender.trim();
    if sender.is_empty() {
        return Jid::default();
    }

    if sender.contains('@') {
        if let Ok(jid) = sender.parse::<Jid>() {
            return jid.to_non_ad();
        }
    }

    Jid::new(sender, DEFAULT_USER_SERVER)
}

/// Resolve a sender into its canonical personal identifier.
///
/// Prefers the phone-number form: an alternate identifier in the default
/// server wins over the primary, and a hidden-space identifier is swapped
/// for its known phone-number counterpart when the index has one.
pub async fn canonicalize_sender(
    gateway: &dyn Gateway,
    sender: &Jid,
    sender_alt: Option<&Jid>,
) -> String {
    let sender = sender.to_non_ad();
    let sender_alt = sender_alt.map(|jid| jid.to_non_ad());

    if sender.is_empty() {
        return String::new();
    }

    let mut canonical = sender.clone();
    if let Some(alt) = sender_alt {
        if !alt.is_empty() && alt.is_default_user() {
            canonical = alt;
        }
    }

    if canonical.is_hidden_user() {
        if let Some(pn) = gateway.pn_for_lid(&canonical).await {
            if !pn.is_empty() {
                canonical = pn.to_non_ad();
            }
        }
    }

    if !canonical.user.is_empty() {
        canonical.user
    } else {
        sender.user
    }
}

/// Resolve a chat identifier: groups pass through whole, personal chats go
/// through sender resolution.
pub async fn canonicalize_chat_id(gateway: &dyn Gateway, chat: &Jid) -> String {
    let normalized = chat.to_non_ad();
    if normalized.is_empty() {
        return String::new();
    }
    if normalized.is_group() {
        return normalized.to_string();
    }
    canonicalize_sender(gateway, &normalized, None).await
}

/// Deduplicated set of raw identifiers known to refer to the same person:
/// the canonical id, both observed user parts, and for anything living in
/// one address space its known counterpart in the other.
pub async fn sender_alias_ids(
    gateway: &dyn Gateway,
    sender: &Jid,
    sender_alt: Option<&Jid>,
    canonical_id: &str,
) -> Vec<String> {
    let sender = sender.to_non_ad();
    let sender_alt = sender_alt.map(|jid| jid.to_non_ad()).unwrap_or_default();

    let mut ids: Vec<String> = Vec::new();
    let mut add = |raw: &str| {
        let normalized = normalize_user_id(raw);
        if !normalized.is_empty() && !ids.contains(&normalized) {
            ids.push(normalized);
        }
    };

    add(canonical_id);
    add(&sender.user);
    add(&sender_alt.user);

    for jid in [&sender, &sender_alt] {
        if jid.is_hidden_user() {
            if let Some(pn) = gateway.pn_for_lid(jid).await {
                if !pn.is_empty() {
                    add(&pn.user);
                }
            }
        } else if jid.is_default_user() {
            if let Some(lid) = gateway.lid_for_pn(jid).await {
                if !lid.is_empty() {
                    add(&lid.user);
                }
            }
        }
    }

    ids
}

/// Aliases used for personal chat-id normalization. Groups have none.
pub async fn chat_alias_ids(
    gateway: &dyn Gateway,
    chat: &Jid,
    canonical_chat_id: &str,
) -> Vec<String> {
    let normalized = chat.to_non_ad();
    if normalized.is_empty() || normalized.is_group() {
        return Vec::new();
    }
    sender_alias_ids(gateway, &normalized, None, canonical_chat_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_shared::testing::StubGateway;
    use wabridge_shared::{GROUP_SERVER, HIDDEN_USER_SERVER};

    fn pn() -> Jid {
        Jid::new("5551234567", DEFAULT_USER_SERVER)
    }

    fn lid() -> Jid {
        Jid::new("abcdef1234", HIDDEN_USER_SERVER)
    }

    #[tokio::test]
    async fn phone_number_sender_resolves_to_bare_digits() {
        let gw = StubGateway::new();
        let canonical = canonicalize_sender(gw.as_ref(), &pn(), None).await;
        assert_eq!(canonical, "5551234567");
    }

    #[tokio::test]
    async fn alternate_in_phone_space_is_preferred() {
        let gw = StubGateway::new();
        let canonical = canonicalize_sender(gw.as_ref(), &lid(), Some(&pn())).await;
        assert_eq!(canonical, "5551234567");
    }

    #[tokio::test]
    async fn hidden_sender_uses_lid_index() {
        let gw = StubGateway::new();
        gw.link_lid_pn(&lid(), &pn());
        let canonical = canonicalize_sender(gw.as_ref(), &lid(), None).await;
        assert_eq!(canonical, "5551234567");
    }

    #[tokio::test]
    async fn unknown_hidden_sender_keeps_hidden_user_part() {
        let gw = StubGateway::new();
        let canonical = canonicalize_sender(gw.as_ref(), &lid(), None).await;
        assert_eq!(canonical, "abcdef1234");
    }

    #[tokio::test]
    async fn group_chat_id_passes_through() {
        let gw = StubGateway::new();
        let group = Jid::new("12036302", GROUP_SERVER);
        let chat_id = canonicalize_chat_id(gw.as_ref(), &group).await;
        assert_eq!(chat_id, "12036302@g.us");

        let aliases = chat_alias_ids(gw.as_ref(), &group, &chat_id).await;
        assert!(aliases.is_empty());
    }

    #[tokio::test]
    async fn aliases_cover_both_address_spaces() {
        let gw = StubGateway::new();
        gw.link_lid_pn(&lid(), &pn());

        let aliases = sender_alias_ids(gw.as_ref(), &lid(), Some(&pn()), "5551234567").await;
        assert!(aliases.contains(&"5551234567".to_string()));
        assert!(aliases.contains(&"abcdef1234".to_string()));
        assert_eq!(aliases.len(), 2);
    }

    #[tokio::test]
    async fn device_suffixes_are_dropped() {
        let gw = StubGateway::new();
        let mut device_jid = pn();
        device_jid.device = 7;
        let canonical = canonicalize_sender(gw.as_ref(), &device_jid, None).await;
        assert_eq!(canonical, "5551234567");
    }

    #[test]
    fn parse_sender_accepts_bare_digits() {
        let jid = parse_sender_jid("5551234567");
        assert_eq!(jid.server, DEFAULT_USER_SERVER);
        assert_eq!(jid.user, "5551234567");
    }

    #[test]
    fn parse_sender_strips_device_part() {
        let jid = parse_sender_jid("5551234567:3@s.whatsapp.net");
        assert_eq!(jid.device, 0);
        assert_eq!(jid.user, "5551234567");
    }
}
