use std::path::PathBuf;

use serde::Deserialize;

use crate::record::ImportRecord;

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    Sqlite { url: String },
    Debug,
}

fn default_update_existing() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    /// Overwrite posts whose title already exists instead of leaving them untouched.
    #[serde(default = "default_update_existing")]
    pub update_existing: bool,
    /// Where fetched images wait before being sideloaded.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Layered over the built-in record defaults.
    #[serde(default)]
    pub defaults: serde_json::Value,
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(
            self.defaults,
            serde_json::Value::Object(_) | serde_json::Value::Null
        ) {
            return Err(format!("defaults must be a mapping, got {}", self.defaults));
        }
        if let StoreConfig::Sqlite { url } = &self.store {
            if url.trim().is_empty() {
                return Err("store url must not be empty".to_owned());
            }
        }
        Ok(())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("post-import"))
    }

    pub fn default_overrides(&self) -> ImportRecord {
        ImportRecord::from(self.defaults.clone())
    }
}
