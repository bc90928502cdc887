use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::secret::Secret;

const ENV_PREFIX: &str = "EASYLINK_";

#[derive(Deserialize, Debug)]
pub struct MainConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    pub database_url: Secret<String>,
    pub terminal_key: String,
    pub terminal_password: Secret<String>,
    #[serde(default = "default_gateway_api_url")]
    pub gateway_api_url: String,
    /// Taxation system for fiscal receipts, receipts are not sent when unset.
    pub receipt_taxation: Option<String>,
    pub telegram_bot_token: Option<Secret<String>>,
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    pub admin_token: Option<Secret<String>>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_gateway_api_url() -> String {
    "https://securepay.tinkoff.ru/v2".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

impl MainConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: MainConfig = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context("Invalid EASYLINK_* configuration")?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.terminal_key.trim().is_empty() {
            bail!("{ENV_PREFIX}TERMINAL_KEY must not be empty");
        }
        if self.terminal_password.reveal().is_empty() {
            bail!("{ENV_PREFIX}TERMINAL_PASSWORD must not be empty");
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            bail!("{ENV_PREFIX}TLS_CERT_PATH and {ENV_PREFIX}TLS_KEY_PATH must be set together");
        }

        Ok(())
    }

    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        Some((self.tls_cert_path.as_deref()?, self.tls_key_path.as_deref()?))
    }

    pub fn admin_token(&self) -> Option<Secret<String>> {
        self.admin_token
            .clone()
            .filter(|token| !token.reveal().is_empty())
    }
}
