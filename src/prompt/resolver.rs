//! Special prompt resolution
//!
//! After every action the game may stop on a dialog: a `--More--` banner,
//! a yes/no question, the tombstone. `PromptResolver` answers them one
//! keystroke at a time until the screen is actionable again.

use tracing::{debug, info, warn};

use super::flags::PromptFlags;
use crate::error::{Error, Result};

/// Keystrokes sent to dismiss prompts
pub const KEY_NO: &[u8] = b"n";
pub const KEY_YES: &[u8] = b"y";
pub const KEY_DISMISS: &[u8] = b"\n";

/// Dismissals allowed before giving up
pub const DEFAULT_SAFETY_LIMIT: u32 = 10;

/// Whatever the resolver drives; implemented by `Session`
pub trait PromptTarget {
    /// Re-read the screen and classify it
    fn refresh_flags(&mut self) -> PromptFlags;

    /// Flattened screen text, for diagnostics
    fn screen_text(&self) -> String;

    fn send_key(&mut self, key: &[u8]);

    fn is_connected(&self) -> bool;

    fn persist_transcript(&mut self) -> Result<()>;
}

/// The keystroke answering a special prompt.
/// Negative confirmations win over affirmative ones, anything else gets Enter.
pub fn response_for(flags: PromptFlags) -> &'static [u8] {
    if flags.contains(PromptFlags::ALWAYS_NO_QUESTION) {
        KEY_NO
    } else if flags.contains(PromptFlags::ALWAYS_YES_QUESTION) {
        KEY_YES
    } else {
        KEY_DISMISS
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PromptResolver {
    safety_limit: u32,
}

impl Default for PromptResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_LIMIT)
    }
}

impl PromptResolver {
    pub fn new(safety_limit: u32) -> Self {
        Self { safety_limit }
    }

    pub fn safety_limit(&self) -> u32 {
        self.safety_limit
    }

    /// Answer special prompts until none is left.
    ///
    /// Returns whether the game ended on the way (death, or a fall back to
    /// the launcher menu). Screens marked fainted do not count against the
    /// safety limit, since fainting can queue many messages.
    pub fn resolve<T: PromptTarget + ?Sized>(&self, target: &mut T) -> Result<bool> {
        let mut ended = false;
        let mut safety = 0u32;
        let mut flags = target.refresh_flags();

        while flags.is_special_prompt() {
            if !flags.contains(PromptFlags::FAINTED) {
                safety += 1;
            }
            if safety > self.safety_limit {
                let screen = target.screen_text();
                warn!("Prompt loop did not settle ({}): {}", flags, screen.trim_end());
                return Err(Error::UnhandledPrompt {
                    flags,
                    screen,
                    limit: self.safety_limit,
                });
            }

            if flags.intersects(PromptFlags::TERMINAL) && !ended {
                info!("Game over ({})", flags);
                ended = true;
            }

            let key = response_for(flags);
            debug!("Answering {} with {:?}", flags, String::from_utf8_lossy(key));
            target.send_key(key);
            if !target.is_connected() {
                return Err(Error::ConnectionLost);
            }
            target.persist_transcript()?;

            flags = target.refresh_flags();
        }

        Ok(ended)
    }
}
