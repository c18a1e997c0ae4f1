//! Run configuration, read and written as YAML.

pub mod settings;

pub use settings::{IndelParameters, Settings, SettingsError};
