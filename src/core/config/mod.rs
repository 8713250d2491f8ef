mod parsing;
mod settings;
mod types;

pub(crate) use types::{ConfigError, Environment, Settings, StorageBackend};
