//! Error types for the server binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and the server run.

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: keystone_core::config::ConfigError,
    },

    /// The world could not be built.
    #[error("world setup error: {source}")]
    Setup {
        /// The underlying tick error.
        #[from]
        source: keystone_core::tick::TickError,
    },

    /// The server loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: keystone_core::runner::RunnerError,
    },

    /// Demo content setup failed.
    #[error("spawner error: {message}")]
    Spawner {
        /// Description of the spawner failure.
        message: String,
    },
}
