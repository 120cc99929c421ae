use anyhow::{anyhow, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, FileFormat};
use serde::Deserialize;

use crate::codec::SharedKey;

pub const DEFAULT_MAP_URL_TEMPLATE: &str =
    "https://www.google.com/maps/search/?api=1&query={lat},{lon}";

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub http_addr: String,
    pub database_url: String,
    pub aes_key: Option<String>,
    pub aes_key_hex: Option<String>,
    pub expose_plaintext_errors: bool,
    pub map_url_template: String,
    pub cors_permissive: bool,
}

impl Settings {
    /// Resolve the pre-shared AES key. `aes_key_hex` wins over the raw `aes_key`.
    pub fn shared_key(&self) -> Result<SharedKey> {
        match (&self.aes_key_hex, &self.aes_key) {
            (Some(hex_key), _) => Ok(SharedKey::from_hex(hex_key)?),
            (None, Some(raw_key)) => Ok(SharedKey::from_bytes(raw_key.as_bytes())?),
            (None, None) => Err(anyhow!(
                "Configuration error: set aes_key_hex or aes_key (TRACKSINK_AES_KEY_HEX / TRACKSINK_AES_KEY)"
            )),
        }
    }
}

pub fn load_settings() -> Result<Settings> {
    build_settings(
        Config::builder()
            .add_source(config::File::new("tracksink.toml", FileFormat::Toml).required(false))
            .add_source(config::Environment::with_prefix("TRACKSINK")),
    )
}

fn build_settings(sources: ConfigBuilder<DefaultState>) -> Result<Settings> {
    Ok(sources
        .set_default("http_addr", "0.0.0.0:5000")?
        .set_default("database_url", "sqlite://track.db?mode=rwc")?
        .set_default("expose_plaintext_errors", false)?
        .set_default("map_url_template", DEFAULT_MAP_URL_TEMPLATE)?
        .set_default("cors_permissive", true)?
        .build()?
        .try_deserialize()?)
}
