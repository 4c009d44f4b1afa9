//! Observation/action interface for an agent
//!
//! `GameEnv` turns a session into an episodic environment: an action index
//! and a strategy become keystrokes, and each step returns the encoded
//! screen, the status record and whether the episode is over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::codec::{to_channel_grid, ChannelGrid, GlyphLayout, StatusRecord};
use crate::core::session::{Session, READY_MARKER};
use crate::error::{Error, Result};

pub const ACTION_COUNT: usize = 10;

/// Action 5 is the centre of the number pad and, like 0, does not move
const NON_MOVES: [usize; 2] = [0, 5];

/// Rest one turn; sent for actions that do not move
const WAIT_KEY: &[u8] = b".";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Step once in the given direction
    Direct,
    /// Travel in the given direction until something interesting happens
    Explore,
}

impl Strategy {
    pub const COUNT: usize = 2;

    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(Strategy::Direct),
            1 => Ok(Strategy::Explore),
            _ => Err(Error::UnknownStrategy(index)),
        }
    }
}

/// Keystrokes for an action; `None` when the strategy does nothing with it
pub fn command_for(action: usize, strategy: Strategy) -> Result<Option<Vec<u8>>> {
    if action >= ACTION_COUNT {
        return Err(Error::InvalidAction(action));
    }
    let digit = b'0' + action as u8;
    let moves = !NON_MOVES.contains(&action);

    Ok(match (strategy, moves) {
        (Strategy::Direct, true) => Some(vec![digit]),
        (Strategy::Direct, false) => Some(WAIT_KEY.to_vec()),
        (Strategy::Explore, true) => Some(vec![b'G', digit]),
        (Strategy::Explore, false) => None,
    })
}

#[derive(Clone, Debug)]
pub struct Observation {
    pub grid: ChannelGrid,
    pub status: StatusRecord,
}

#[derive(Clone, Debug)]
pub struct StepResult {
    pub grid: ChannelGrid,
    pub status: StatusRecord,
    pub ended: bool,
}

pub struct GameEnv {
    session: Session,
    layout: GlyphLayout,
    ended: Arc<AtomicBool>,
}

impl GameEnv {
    pub fn new(session: Session, layout: GlyphLayout) -> Self {
        Self {
            session,
            layout,
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Connect and get into a game
    pub fn connect(&mut self) -> Result<()> {
        self.session.start_session()?;
        self.set_ended(false);
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn username(&self) -> &str {
        self.session.username()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Shared view of the ended flag, readable while the env is busy
    pub fn ended_flag(&self) -> Arc<AtomicBool> {
        self.ended.clone()
    }

    fn set_ended(&self, ended: bool) {
        self.ended.store(ended, Ordering::SeqCst);
    }

    pub fn observe(&self) -> Observation {
        Observation {
            grid: to_channel_grid(&self.session.to_grid(), &self.layout),
            status: self.session.status(),
        }
    }

    /// Send one action and answer whatever prompts it raises
    pub fn step(&mut self, action: usize, strategy: usize) -> Result<StepResult> {
        if self.is_ended() {
            return Err(Error::SessionEnded);
        }
        let command = command_for(action, Strategy::from_index(strategy)?)?;

        if !self.session.is_connected() {
            info!("{} reconnecting before step", self.session.username());
            self.session.start_session()?;
        }

        if let Some(keys) = command {
            let timeout = self.session.settings().reply_timeout;
            self.session.send_and_await(READY_MARKER, &keys, timeout);
            if !self.session.is_connected() {
                return Err(Error::ConnectionLost);
            }
        }

        let died = match self.session.resolve_prompts() {
            Ok(died) => died,
            Err(e) => {
                // Never step again into a screen nobody could answer
                if e.is_fatal() {
                    self.set_ended(true);
                }
                return Err(e);
            }
        };
        let Observation { grid, status } = self.observe();
        let ended = died || !status.turn().map_or(false, |t| t > 0);
        if ended {
            debug!("{} episode over at {:?}", self.session.username(), status.turn());
        }
        self.set_ended(ended);

        Ok(StepResult { grid, status, ended })
    }

    /// Start a new game and return the first observation
    pub fn reset(&mut self) -> Result<ChannelGrid> {
        self.session.reset_game()?;
        self.set_ended(false);
        Ok(self.observe().grid)
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}
