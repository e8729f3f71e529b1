mod settings;

pub use settings::{Config, ConfigError, SessionConfig, EXAMPLE_CONFIG};
