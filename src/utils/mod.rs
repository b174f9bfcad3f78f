/// Tracing subscriber setup.
pub mod logging;
/// TOML-based configuration (sleuth.toml).
pub mod toml_config;
