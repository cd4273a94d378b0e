//! Configuration resolution for dkt-re
//!
//! Multi-tier resolution with Database → ENV → TOML priority.

use dkt_common::config::TomlConfig;
use dkt_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{info, warn};

/// Environment variable consulted for the provider API key
pub const API_KEY_ENV_VAR: &str = "DKT_ANALYSIS_API_KEY";

/// Key source, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Database,
    Environment,
    Toml,
}

impl KeySource {
    fn as_str(&self) -> &'static str {
        match self {
            KeySource::Database => "database",
            KeySource::Environment => "environment",
            KeySource::Toml => "TOML",
        }
    }
}

/// Resolve the analysis provider API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_analysis_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<String> {
    resolve_analysis_api_key_with_source(db, toml_config)
        .await
        .map(|(key, _)| key)
}

/// Same as [`resolve_analysis_api_key`], also reporting where the key came from
pub async fn resolve_analysis_api_key_with_source(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<(String, KeySource)> {
    let candidates = [
        (
            KeySource::Database,
            crate::db::settings::get_analysis_api_key(db).await?,
        ),
        (KeySource::Environment, std::env::var(API_KEY_ENV_VAR).ok()),
        (KeySource::Toml, toml_config.analysis.api_key.clone()),
    ];

    let mut valid = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (k, source)))
        .collect::<Vec<_>>();

    // Warn if multiple sources (potential misconfiguration)
    if valid.len() > 1 {
        let names: Vec<&str> = valid.iter().map(|(_, s)| s.as_str()).collect();
        warn!(
            "Analysis API key found in multiple sources: {}. Using {} (highest priority).",
            names.join(", "),
            names[0]
        );
    }

    if valid.is_empty() {
        return Err(Error::Config(format!(
            "Analysis API key not configured. Please configure using one of:\n\
             1. CLI: dkt-re set-api-key <key>\n\
             2. Environment: {}=your-key-here\n\
             3. TOML config: ~/.config/dkt/config.toml ([analysis] api_key = \"your-key\")",
            API_KEY_ENV_VAR
        )));
    }

    let (key, source) = valid.remove(0);
    info!("Analysis API key loaded from {}", source.as_str());
    Ok((key, source))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Store the key in the database and back it up to the TOML file
///
/// The database write is authoritative. A failed TOML write is logged and
/// otherwise ignored.
pub async fn store_api_key(db: &Pool<Sqlite>, key: String, toml_path: &Path) -> Result<()> {
    if !is_valid_key(&key) {
        return Err(Error::InvalidInput("API key must not be empty".to_string()));
    }

    crate::db::settings::set_analysis_api_key(db, key.clone()).await?;
    info!("Analysis API key stored in database");

    sync_api_key_to_toml(key, toml_path);
    Ok(())
}

/// Write the key into the `[analysis]` section, keeping other settings
fn sync_api_key_to_toml(key: String, toml_path: &Path) {
    let mut config = if toml_path.exists() {
        match dkt_common::config::load_toml_config(toml_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Not updating unreadable TOML {}: {}", toml_path.display(), e);
                return;
            }
        }
    } else {
        TomlConfig::default()
    };

    config.analysis.api_key = Some(key);

    match dkt_common::config::write_toml_config(&config, toml_path) {
        Ok(()) => info!("API key synced to TOML: {}", toml_path.display()),
        Err(e) => warn!("TOML write failed (database write succeeded): {}", e),
    }
}
