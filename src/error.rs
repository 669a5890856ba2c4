use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Retention must be at least one second, got {0:?}")]
    RetentionTooShort(Duration),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidVariable { name: &'static str, value: String },
}
