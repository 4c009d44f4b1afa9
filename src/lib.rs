//! hackdriver - drives NetHack sessions over telnet for automated play
//!
//! Each session reconstructs the game screen from the server's byte stream
//! (NetHack's `vt_tiledata` glyph ids included), classifies it into prompt
//! states, and answers transient dialogs until the game accepts the next
//! move. Many sessions run side by side under an orchestrator.
//!
//! # Modules
//!
//! - **core**: telnet transport, terminal emulation, sessions
//! - **prompt**: screen classification and prompt resolution
//! - **codec**: channel grid and status record encodings
//! - **env**: observation/action wrapper around a session
//! - **orchestrator**: bounded fan-out across many sessions
//! - **config**: `~/.hackdriver/config.toml`

pub mod codec;
pub mod config;
pub mod core;
pub mod env;
pub mod error;
pub mod orchestrator;
pub mod prompt;

#[cfg(test)]
mod testing;

pub use crate::config::Config;
pub use crate::core::session::{Session, SessionSettings};
pub use crate::env::{GameEnv, Observation, StepResult, Strategy, ACTION_COUNT};
pub use crate::error::{Error, Result};
pub use crate::orchestrator::{BatchResult, Orchestrator, OrchestratorSettings};
