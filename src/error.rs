//! Errors surfaced to callers

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::prompt::PromptFlags;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to connect to {peer} after {attempts} attempts: {source}")]
    ConnectFailed {
        peer: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Connection to the game server was lost")]
    ConnectionLost,

    #[error("Unhandled prompt ({flags}) after {limit} keystrokes: {screen}")]
    UnhandledPrompt {
        flags: PromptFlags,
        screen: String,
        limit: u32,
    },

    #[error("Session has ended; reset it first")]
    SessionEnded,

    #[error("Action {0} out of range")]
    InvalidAction(usize),

    #[error("Unknown strategy {0}")]
    UnknownStrategy(usize),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Failed to write transcript: {0}")]
    Transcript(#[source] io::Error),
}

impl Error {
    /// True for caller mistakes, as opposed to server or network trouble
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::SessionEnded | Error::InvalidAction(_) | Error::UnknownStrategy(_)
        )
    }

    /// A screen the prompt catalog does not know. Sending further moves
    /// into it is unsafe, so the whole run has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UnhandledPrompt { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
