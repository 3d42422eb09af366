mod settings;

pub use settings::{
    ConfigError, SnapshotConfig, TomlConfig, TomlSnapshotConfig, DEFAULT_LONG_STRING_THRESHOLD,
    EXAMPLE_CONFIG,
};
