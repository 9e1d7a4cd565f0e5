//! Bridge configuration from the environment.
//!
//! `.env` files are discovered in the working directory first, then next to
//! the binary; the first hit wins. The JWT signing secret is the only
//! required setting.

use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_JWT_AUDIENCE: &str = "whatsapp-bridge";
pub const DEFAULT_JWT_ISSUER: &str = "omicron-api";

/// Directory holding the cache database, the protocol library's device
/// state and downloaded media.
pub const STORE_DIR: &str = "store";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("WHATSAPP_BRIDGE_JWT_SECRET is required for bridge JWT auth")]
    MissingJwtSecret,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub store_dir: PathBuf,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = trimmed_env("WHATSAPP_BRIDGE_JWT_SECRET")
            .ok_or(ConfigError::MissingJwtSecret)?;

        let jwt_audience =
            trimmed_env("WHATSAPP_BRIDGE_JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.into());
        let jwt_issuer =
            trimmed_env("WHATSAPP_BRIDGE_JWT_ISSUER").unwrap_or_else(|| DEFAULT_JWT_ISSUER.into());
        let host = trimmed_env("WHATSAPP_BRIDGE_HOST").unwrap_or_else(|| DEFAULT_HOST.into());

        let port = match trimmed_env("WHATSAPP_BRIDGE_PORT") {
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    tracing::warn!(value = %raw, "invalid WHATSAPP_BRIDGE_PORT, using default");
                    DEFAULT_PORT
                }
            },
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host,
            port,
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            store_dir: PathBuf::from(STORE_DIR),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn trimmed_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Load the first `.env` file found: working directory, then next to the
/// executable.
pub fn load_dotenv() {
    let mut candidates = vec![PathBuf::from(".env")];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(".env"));
        }
    }

    for path in candidates {
        if !path.is_file() {
            continue;
        }
        if let Err(e) = dotenvy::from_path(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to load .env file");
        }
        return;
    }
}
