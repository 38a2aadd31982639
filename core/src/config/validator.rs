use crate::config::error::{ConfigError, Result};
use crate::config::loader::AppConfig;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

/// Schema validator for [`AppConfig`]
pub struct SchemaValidator {
    app_schema: JSONSchema,
}

impl SchemaValidator {
    /// Compile the embedded schema (JSON Schema Draft 7).
    pub fn new() -> Result<Self> {
        let app_schema_str = include_str!("schemas/app_config.schema.json");
        let app_schema_value: Value = serde_json::from_str(app_schema_str).map_err(|e| {
            ConfigError::SchemaValidationError(format!("Failed to parse app schema: {e}"))
        })?;

        let app_schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&app_schema_value)
            .map_err(|e| {
                ConfigError::SchemaValidationError(format!("Failed to compile app schema: {e}"))
            })?;

        Ok(Self { app_schema })
    }

    /// Validate a config, listing every failure with its JSON path.
    pub fn validate(&self, config: &AppConfig) -> Result<()> {
        let config_value = serde_json::to_value(config).map_err(|e| {
            ConfigError::SchemaValidationError(format!("Failed to serialize config: {e}"))
        })?;

        if let Err(errors) = self.app_schema.validate(&config_value) {
            let error_messages: Vec<String> = errors
                .map(|e| {
                    let path_str = e.instance_path.to_string();
                    let path = if path_str.is_empty() {
                        "root".to_string()
                    } else {
                        path_str
                    };
                    format!("{e} at '{path}'")
                })
                .collect();

            return Err(ConfigError::SchemaValidationError(format!(
                "Configuration validation failed ({} error{}):\n  - {}",
                error_messages.len(),
                if error_messages.len() == 1 { "" } else { "s" },
                error_messages.join("\n  - ")
            )));
        }

        Ok(())
    }
}
