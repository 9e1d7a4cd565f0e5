pub mod controller;
pub mod download;
pub mod extract;
pub mod identity;
pub mod send;
pub mod status;

mod error;
mod pipeline;
mod qr;

pub use controller::{connect_ready, RevokeOutcome, SessionController};
pub use download::{download_media, DownloadOutcome};
pub use error::SessionError;
pub use send::send_message;
pub use status::{AuthStatus, SessionState, StatusHandle};
