//! Multi-session orchestration.
//!
//! - **pool**: bounded worker threads with a per-call deadline
//!
//! The `Orchestrator` owns a list of game environments and fans each
//! operation out across them. Every call works on the member list as it
//! was when the call started; only `create_sessions` and `close_all`
//! replace the list. A failing session shows up in the call's `errors`
//! and never fails the batch, except for an unhandled prompt: that one is
//! returned as the call's error so the caller stops the run.

pub mod pool;

pub use pool::{BatchResult, SessionId, WorkerPool};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::codec::{ChannelGrid, GlyphLayout};
use crate::core::session::{Session, SessionSettings};
use crate::core::transport::Connector;
use crate::env::{GameEnv, StepResult};
use crate::error::Result;

/// Picks `(action, strategy)` for an environment
pub type Policy = dyn Fn(&GameEnv) -> (usize, usize) + Send + Sync;

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub max_workers: usize,
    pub call_timeout: Duration,
    /// Pause between starting consecutive logins
    pub launch_delay: Duration,
    pub username_prefix: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_workers: 8,
            call_timeout: Duration::from_secs(20),
            launch_delay: Duration::from_millis(100),
            username_prefix: "bot".to_string(),
        }
    }
}

struct Member {
    id: SessionId,
    username: String,
    env: Arc<Mutex<GameEnv>>,
    ended: Arc<AtomicBool>,
}

impl Member {
    fn new(id: SessionId, env: GameEnv) -> Self {
        Self {
            id,
            username: env.username().to_string(),
            ended: env.ended_flag(),
            env: Arc::new(Mutex::new(env)),
        }
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

/// A panic inside one step must not take the session down with it
fn lock(env: &Mutex<GameEnv>) -> MutexGuard<'_, GameEnv> {
    env.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    session_settings: SessionSettings,
    layout: GlyphLayout,
    settings: OrchestratorSettings,
    policy: Arc<Policy>,
    members: Vec<Member>,
}

impl Orchestrator {
    pub fn new<P>(
        connector: Arc<dyn Connector>,
        session_settings: SessionSettings,
        layout: GlyphLayout,
        settings: OrchestratorSettings,
        policy: P,
    ) -> Self
    where
        P: Fn(&GameEnv) -> (usize, usize) + Send + Sync + 'static,
    {
        Self {
            connector,
            session_settings,
            layout,
            settings,
            policy: Arc::new(policy),
            members: Vec::new(),
        }
    }

    fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.settings.max_workers, self.settings.call_timeout)
    }

    pub fn username(&self, index: usize) -> String {
        format!("{}{:03}", self.settings.username_prefix, index)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Ids and usernames of the current members
    pub fn members(&self) -> Vec<(SessionId, String)> {
        self.members.iter().map(|m| (m.id, m.username.clone())).collect()
    }

    /// Log `n` fresh sessions into games. Sessions that fail to connect or
    /// log in are reported and left out; the previous members are closed.
    pub fn create_sessions(&mut self, n: usize) -> Result<BatchResult<String>> {
        if !self.members.is_empty() {
            self.close_all();
        }

        let jobs: Vec<_> = (0..n)
            .map(|id| {
                let session = Session::new(self.username(id), self.connector.clone(), self.session_settings.clone());
                let layout = self.layout;
                (id, move || -> Result<GameEnv> {
                    let mut env = GameEnv::new(session, layout);
                    env.connect()?;
                    Ok(env)
                })
            })
            .collect();

        let batch = self.pool().with_launch_delay(self.settings.launch_delay).run(jobs);

        let mut report = BatchResult {
            results: BTreeMap::new(),
            errors: batch.errors,
            timed_out: batch.timed_out,
        };
        for (id, env) in batch.results {
            report.results.insert(id, env.username().to_string());
            self.members.push(Member::new(id, env));
        }
        for (id, e) in &report.errors {
            warn!("Session {} could not start: {}", self.username(*id), e);
        }
        info!("{} of {} sessions started", self.members.len(), n);
        self.escalate(report)
    }

    /// One policy-driven step on every session whose game is still running
    pub fn step_all(&self) -> Result<BatchResult<StepResult>> {
        let jobs: Vec<_> = self
            .members
            .iter()
            .filter(|m| !m.is_ended())
            .map(|m| {
                let env = m.env.clone();
                let policy = self.policy.clone();
                (m.id, move || {
                    let mut env = lock(&env);
                    let (action, strategy) = policy(&*env);
                    env.step(action, strategy)
                })
            })
            .collect();
        self.escalate(self.pool().run(jobs))
    }

    /// Start new games for sessions whose game ended
    pub fn reset_done(&self) -> Result<BatchResult<ChannelGrid>> {
        self.reset_where(|m| m.is_ended())
    }

    pub fn reset_all(&self) -> Result<BatchResult<ChannelGrid>> {
        self.reset_where(|_| true)
    }

    fn reset_where(&self, select: impl Fn(&Member) -> bool) -> Result<BatchResult<ChannelGrid>> {
        let jobs: Vec<_> = self
            .members
            .iter()
            .filter(|m| select(m))
            .map(|m| {
                let env = m.env.clone();
                (m.id, move || lock(&env).reset())
            })
            .collect();
        self.escalate(self.pool().run(jobs))
    }

    /// Turn a fatal per-session error into the error of the whole call
    fn escalate<T>(&self, mut batch: BatchResult<T>) -> Result<BatchResult<T>> {
        let fatal = batch
            .errors
            .iter()
            .find(|(_, e)| e.is_fatal())
            .map(|(id, _)| *id);
        match fatal.and_then(|id| batch.errors.remove(&id).map(|e| (id, e))) {
            Some((id, e)) => {
                error!("{} is stuck: {}", self.username(id), e);
                Err(e)
            }
            None => Ok(batch),
        }
    }

    /// Close every session and empty the member list
    pub fn close_all(&mut self) -> BatchResult<()> {
        let members = std::mem::take(&mut self.members);
        let jobs: Vec<_> = members
            .iter()
            .map(|m| {
                let env = m.env.clone();
                (m.id, move || {
                    lock(&env).close();
                    Ok(())
                })
            })
            .collect();
        let batch = self.pool().run(jobs);
        info!("Closed {} sessions", batch.results.len());
        batch
    }

    /// `username turn` for every member; `-` when the turn is unknown or a
    /// straggling worker still holds the session
    pub fn session_turns(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| {
                let turn = match m.env.try_lock() {
                    Ok(env) => env.session().status().turn(),
                    Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().session().status().turn(),
                    Err(TryLockError::WouldBlock) => None,
                };
                match turn {
                    Some(t) => format!("{} {}", m.username, t),
                    None => format!("{} -", m.username),
                }
            })
            .collect()
    }
}
