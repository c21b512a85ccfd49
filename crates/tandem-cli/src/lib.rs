//! Command-line entry point and HTTP server for Tandem.
//!
//! - [`config`]: layered configuration (file, `TANDEM_*` env, defaults)
//! - [`cli`]: argument parsing
//! - [`app`]: component wiring, `serve`, `ask` and `index`
//! - [`http`]: the axum router

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod http;

pub use app::{Services, TandemCli};
pub use cli::{CliArgs, Command, ConfigAction, ConfigCommand};
pub use config::{ServerConfig, StoreConfig, TandemConfig};
pub use http::{ApiError, AppState, router};
