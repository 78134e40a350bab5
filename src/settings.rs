// config lets you read a separate config file
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Result, SoftscopeError};
use crate::persist::PersistenceMode;
use crate::schema::Schema;
use crate::seed::demo_schema;

/// Runtime settings, read from an optional config file (`softscope.toml` by
/// default) and overridden by `SOFTSCOPE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// SQLite file; absent or `:memory:` keeps everything in memory.
    pub database: Option<String>,
    pub listen: String,
    pub log: String,
    pub seed: bool,
    /// JSON schema description; the demo schema is used when absent.
    pub schema_file: Option<String>,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .set_default("listen", "127.0.0.1:8080")?
            .set_default("log", "info")?
            .set_default("seed", true)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("SOFTSCOPE"))
            .build()?;
        Ok(settings.try_deserialize::<Settings>()?)
    }
    pub fn persistence_mode(&self) -> PersistenceMode {
        match self.database.as_deref() {
            None | Some(":memory:") => PersistenceMode::InMemory,
            Some(path) => PersistenceMode::File(path.to_string()),
        }
    }
    pub fn schema(&self) -> Result<Schema> {
        let Some(path) = &self.schema_file else {
            return Ok(demo_schema());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| SoftscopeError::Config(format!("Could not read schema file '{path}': {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| SoftscopeError::Config(format!("Could not parse schema file '{path}': {e}")))
    }
}
