mod parsing;
mod settings;
mod types;

pub use types::{
    ConfigError, DatabaseSettings, Environment, GradingSettings, RuntimeSettings, Settings,
    TelemetrySettings,
};
