use thiserror::Error;

use wabridge_media::OggError;
use wabridge_shared::gateway::GatewayError;
use wabridge_store::StoreError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("WhatsApp client is not initialized. Start connect first.")]
    NoClient,

    #[error("Not connected to WhatsApp")]
    NotConnected,

    #[error("Error parsing recipient: {0}")]
    InvalidRecipient(String),

    #[error("failed to find message")]
    MessageNotFound,

    #[error("not a media message")]
    NotMedia,

    #[error("incomplete media information for download")]
    IncompleteMedia,

    #[error("failed to analyze Ogg Opus file: {0}")]
    Audio(#[from] OggError),

    #[error("media file error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
