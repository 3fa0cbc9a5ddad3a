pub mod api;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::{
    AppConfig, ConfigError, IntakeConfig, LoggingConfig, ServerConfig, load_config,
};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{AppState, OpenlimsServer, ServerBuilder, build_app};
