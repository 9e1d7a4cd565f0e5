pub mod event;
pub mod gateway;
pub mod jid;
pub mod log_refs;
pub mod media;
pub mod testing;

pub use jid::{normalize_user_id, Jid, DEFAULT_USER_SERVER, GROUP_SERVER, HIDDEN_USER_SERVER};
pub use media::MediaKind;
