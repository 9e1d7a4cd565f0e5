use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server suffix of the phone-number address space.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";

/// Server suffix of the hidden (LID) address space.
pub const HIDDEN_USER_SERVER: &str = "lid";

/// Server suffix of group identifiers.
pub const GROUP_SERVER: &str = "g.us";

#[derive(Error, Debug)]
pub enum JidError {
    #[error("identifier has no user part")]
    MissingUser,

    #[error("identifier has no server part")]
    MissingServer,

    #[error("invalid device part: {0}")]
    InvalidDevice(String),
}

/// A platform identifier of the form `user[:device]@server`.
///
/// The same human can appear under two servers: [`DEFAULT_USER_SERVER`]
/// (phone-number space) and [`HIDDEN_USER_SERVER`] (hidden space). Groups
/// live under [`GROUP_SERVER`] and are never collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub device: u16,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            device: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.server.is_empty()
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_hidden_user(&self) -> bool {
        self.server == HIDDEN_USER_SERVER
    }

    pub fn is_default_user(&self) -> bool {
        self.server == DEFAULT_USER_SERVER
    }

    /// Drop the device part, yielding the account-level identifier.
    pub fn to_non_ad(&self) -> Jid {
        Jid {
            user: self.user.clone(),
            server: self.server.clone(),
            device: 0,
        }
    }
}

/// Strip any server suffix and surrounding whitespace from a raw identifier.
///
/// `"5551234567@s.whatsapp.net"` and `" 5551234567 "` both become
/// `"5551234567"`. Empty input stays empty.
pub fn normalize_user_id(id: &str) -> String {
    let trimmed = id.trim();
    match trimmed.split_once('@') {
        Some((user, _)) => user.to_string(),
        None => trimmed.to_string(),
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (user_part, server) = s.split_once('@').ok_or(JidError::MissingServer)?;
        if server.is_empty() {
            return Err(JidError::MissingServer);
        }
        if user_part.is_empty() {
            return Err(JidError::MissingUser);
        }

        let (user, device) = match user_part.split_once(':') {
            Some((user, device)) => {
                let device = device
                    .parse::<u16>()
                    .map_err(|_| JidError::InvalidDevice(device.to_string()))?;
                (user, device)
            }
            None => (user_part, 0),
        };

        Ok(Jid {
            user: user.to_string(),
            server: server.to_string(),
            device,
        })
    }
}
