//! Session management
//!
//! A session is one login on the game server: a connection (absent while
//! disconnected), the screen reconstructed from everything the server sent,
//! and the prompt flags of that screen.

use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::term::{CellGrid, Cursor, Terminal};
use super::transcript::{Transcript, TRANSCRIPT_LIMIT};
use super::transport::{Connector, Transport};
use crate::codec::{to_status_record, StatusRecord};
use crate::error::{Error, Result};
use crate::prompt::{classify, PromptFlags, PromptResolver, PromptTarget, DEFAULT_SAFETY_LIMIT};

/// Cursor placement that ends the dgamelaunch menu
pub const ENTRY_BANNER: &[u8] = b"\x1b[19;3H=> ";
/// Any dgamelaunch input prompt
pub const DG_PROMPT: &[u8] = b"=>";
/// Tail of a `--More--` banner
pub const MORE_MARKER: &[u8] = b"ore--\x1b[27m\x1b[3z";
/// End of tile data: the game waits for input
pub const READY_MARKER: &[u8] = b"\x1b[3z";

const READ_CHUNK: usize = 4096;

/// Where and how much to record
#[derive(Clone, Debug)]
pub struct TranscriptSettings {
    pub dir: PathBuf,
    pub max_entries: usize,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("transcripts"),
            max_entries: TRANSCRIPT_LIMIT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub cols: u16,
    pub rows: u16,
    /// Login password; the username when unset
    pub password: Option<String>,
    /// Wait for the launcher banner after connecting
    pub banner_timeout: Duration,
    /// Wait for the reply to one keystroke
    pub reply_timeout: Duration,
    /// Wait while the server finishes a screen on its own
    pub settle_timeout: Duration,
    pub retry: RetryPolicy,
    pub safety_limit: u32,
    /// Recording is off when `None`
    pub transcript: Option<TranscriptSettings>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            password: None,
            banner_timeout: Duration::from_secs(2),
            reply_timeout: Duration::from_secs(2),
            settle_timeout: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            safety_limit: DEFAULT_SAFETY_LIMIT,
            transcript: None,
        }
    }
}

pub struct Session {
    username: String,
    settings: SessionSettings,
    connector: Arc<dyn Connector>,
    /// `None` while disconnected
    transport: Option<Box<dyn Transport>>,
    terminal: Terminal,
    flags: PromptFlags,
    transcript: Option<Transcript>,
}

impl Session {
    pub fn new(username: impl Into<String>, connector: Arc<dyn Connector>, settings: SessionSettings) -> Self {
        Self {
            username: username.into(),
            terminal: Terminal::new(settings.cols, settings.rows),
            settings,
            connector,
            transport: None,
            flags: PromptFlags::empty(),
            transcript: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Flags of the last snapshot
    pub fn flags(&self) -> PromptFlags {
        self.flags
    }

    pub fn is_special_prompt(&self) -> bool {
        self.flags.is_special_prompt()
    }

    pub fn display(&self) -> Vec<String> {
        self.terminal.display()
    }

    pub fn text(&self) -> String {
        self.terminal.text()
    }

    pub fn cursor(&self) -> Cursor {
        self.terminal.cursor()
    }

    pub fn to_grid(&self) -> CellGrid {
        self.terminal.to_grid()
    }

    pub fn status(&self) -> StatusRecord {
        to_status_record(&self.terminal.display())
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    /// Open the connection and read up to the launcher banner.
    ///
    /// Refused connections are retried with linear backoff. A session that
    /// is already connected is left alone.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let peer = self.connector.describe();
        let policy = self.settings.retry;
        let mut last_error = None;

        for attempt in policy.attempts() {
            debug!("Connecting {} to {} (attempt {})", self.username, peer, attempt);
            match self.connector.connect() {
                Ok(transport) => {
                    self.terminal = Terminal::new(self.settings.cols, self.settings.rows);
                    self.transcript = self
                        .settings
                        .transcript
                        .as_ref()
                        .map(|t| Transcript::for_user(&t.dir, &self.username, t.max_entries));
                    self.transport = Some(transport);
                    self.await_marker(ENTRY_BANNER, self.settings.banner_timeout);
                    info!("Connected {} to {}", self.username, peer);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connection attempt {} for {} failed: {}", attempt, self.username, e);
                    last_error = Some(e);
                    if attempt < policy.max_attempts {
                        thread::sleep(policy.backoff(attempt));
                    }
                }
            }
        }

        Err(Error::ConnectFailed {
            peer,
            attempts: policy.max_attempts,
            source: last_error.unwrap_or_else(|| io::Error::new(ErrorKind::Other, "no connection attempt")),
        })
    }

    /// Write `message`, then read until `marker` shows up or `timeout`
    /// passes, and drain whatever else is already buffered.
    ///
    /// Returns the bytes read. A lost connection is logged, leaves the
    /// session disconnected and yields an empty result.
    pub fn send_and_await(&mut self, marker: &[u8], message: &[u8], timeout: Duration) -> Vec<u8> {
        let Some(transport) = self.transport.as_mut() else {
            debug!("{} is disconnected, not sending {:?}", self.username, String::from_utf8_lossy(message));
            return Vec::new();
        };

        let data = match round_trip(transport.as_mut(), message, marker, timeout) {
            Ok(data) => data,
            Err(e) => {
                warn!("{} lost the connection: {}", self.username, e);
                self.disconnect();
                return Vec::new();
            }
        };

        self.terminal.feed(&data);
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(message, &data, self.terminal.display());
        }
        self.refresh();
        data
    }

    /// Read until `marker` without sending anything
    pub fn await_marker(&mut self, marker: &[u8], timeout: Duration) -> Vec<u8> {
        self.send_and_await(marker, b"", timeout)
    }

    /// Send keystrokes and wait for the game to ask for more input
    pub fn send_keys(&mut self, keys: &[u8]) -> Vec<u8> {
        self.send_and_await(READY_MARKER, keys, self.settings.reply_timeout)
    }

    /// Pull in buffered bytes and reclassify the screen
    pub fn refresh(&mut self) -> PromptFlags {
        if let Some(transport) = self.transport.as_mut() {
            let mut data = Vec::new();
            let drained = drain(transport.as_mut(), &mut data);
            self.terminal.feed(&data);
            if let Err(e) = drained {
                warn!("{} lost the connection: {}", self.username, e);
                self.disconnect();
            }
        }

        self.flags = classify(&self.terminal.text());

        if self.flags.contains(PromptFlags::GAME_SCREEN)
            && self.terminal.cursor().row == 0
            && !self.flags.is_special_prompt()
        {
            let display = self.terminal.display();
            let top = display.first().map(|s| s.trim_end()).unwrap_or("");
            warn!("{}: unexpected prompt: {}", self.username, top);
        }

        self.flags
    }

    /// Answer special prompts; true when the game ended on the way
    pub fn resolve_prompts(&mut self) -> Result<bool> {
        PromptResolver::new(self.settings.safety_limit).resolve(self)
    }

    /// Dismiss informational screens (end, more, blank, call, entry problem) with Enter
    pub fn clear_prompts(&mut self) -> Result<()> {
        let mut rounds = 0;
        while self.refresh().intersects(PromptFlags::INFORMATIONAL) {
            rounds += 1;
            if rounds > self.settings.safety_limit {
                return Err(Error::UnhandledPrompt {
                    flags: self.flags,
                    screen: self.text(),
                    limit: self.settings.safety_limit,
                });
            }
            debug!("{}: clearing prompts ({})", self.username, self.flags);
            self.send_and_await(MORE_MARKER, b"\n", self.settings.reply_timeout);
            if !self.is_connected() {
                return Err(Error::ConnectionLost);
            }
        }
        Ok(())
    }

    /// Get from wherever the session is to a running game: log in at the
    /// launcher if needed, pick play, and wait out stale process notices.
    pub fn start_session(&mut self) -> Result<()> {
        info!("(Re)starting session {}", self.username);
        self.connect()?;
        self.clear_prompts()?;

        if !self.flags.contains(PromptFlags::DGAMELAUNCH) {
            debug!("{} is not at the launcher menu", self.username);
            return Ok(());
        }

        let timeout = self.settings.reply_timeout;
        if !self.flags.contains(PromptFlags::DG_LOGGED_IN) || self.flags.contains(PromptFlags::GAME_SCREEN) {
            info!("Logging in {}", self.username);
            self.await_marker(DG_PROMPT, timeout);
            self.send_and_await(DG_PROMPT, b"l", timeout);
            let user = format!("{}\n", self.username);
            let password = format!("{}\n", self.settings.password.as_deref().unwrap_or(&self.username));
            self.send_and_await(DG_PROMPT, user.as_bytes(), timeout);
            self.send_and_await(DG_PROMPT, password.as_bytes(), timeout);
        }
        self.send_and_await(DG_PROMPT, b"p", timeout);
        self.clear_prompts()?;

        // Sending anything while stale processes are killed confuses the launcher
        let mut rounds = 0;
        while self.flags.contains(PromptFlags::STALE) {
            rounds += 1;
            if rounds > self.settings.safety_limit {
                return Err(Error::UnhandledPrompt {
                    flags: self.flags,
                    screen: self.text(),
                    limit: self.settings.safety_limit,
                });
            }
            info!("{}: waiting for stale process", self.username);
            self.await_marker(b"seconds.", self.settings.settle_timeout);
            if !self.is_connected() {
                return Err(Error::ConnectionLost);
            }
        }

        self.await_marker(MORE_MARKER, self.settings.settle_timeout);
        self.clear_prompts()?;

        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::ConnectionLost)
        }
    }

    /// Quit a game in progress (unless it is still on its first turn) and
    /// start a new one.
    pub fn reset_game(&mut self) -> Result<()> {
        info!("Resetting {}", self.username);
        self.connect()?;
        self.clear_prompts()?;

        if self.flags.contains(PromptFlags::GAME_SCREEN) && self.status().turn() != Some(1) {
            let timeout = self.settings.reply_timeout;
            self.send_and_await(b"[yes/no]?", b"#quit\n", timeout);
            self.send_and_await(b"(end)", b"yes\n", timeout);
            self.clear_prompts()?;
        }

        self.start_session()
    }

    /// Save (in a game) or quit (at the launcher) and drop the connection.
    /// Closing twice is harmless.
    pub fn close(&mut self) {
        if !self.is_connected() {
            return;
        }

        if self.refresh().contains(PromptFlags::GAME_SCREEN) {
            debug!("Saving game of {}", self.username);
            for key in [b"S", b"y", b"\n"] {
                self.send_keys(key);
            }
        } else {
            self.send_keys(b"q");
        }

        if let Err(e) = self.persist_transcript() {
            warn!("{}: {}", self.username, e);
        }
        self.disconnect();
        info!("Closed {}", self.username);
    }

    pub fn persist_transcript(&mut self) -> Result<()> {
        match &self.transcript {
            Some(transcript) => transcript.persist().map_err(Error::Transcript),
            None => Ok(()),
        }
    }

    fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl PromptTarget for Session {
    fn refresh_flags(&mut self) -> PromptFlags {
        self.refresh()
    }

    fn screen_text(&self) -> String {
        self.text()
    }

    fn send_key(&mut self, key: &[u8]) {
        self.send_keys(key);
    }

    fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn persist_transcript(&mut self) -> Result<()> {
        Session::persist_transcript(self)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn round_trip(transport: &mut dyn Transport, message: &[u8], marker: &[u8], timeout: Duration) -> io::Result<Vec<u8>> {
    if !message.is_empty() {
        transport.write_all(message)?;
    }

    let deadline = Instant::now() + timeout;
    let mut data = Vec::new();
    let mut buf = [0u8; READ_CHUNK];

    while !contains(&data, marker) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match transport.read_timeout(&mut buf, remaining)? {
            None => break,
            Some(0) => return Err(io::Error::new(ErrorKind::UnexpectedEof, "server closed the connection")),
            Some(n) => data.extend_from_slice(&buf[..n]),
        }
    }

    drain(transport, &mut data)?;
    Ok(data)
}

/// Append bytes that are already buffered, without waiting
fn drain(transport: &mut dyn Transport, data: &mut Vec<u8>) -> io::Result<()> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match transport.read_available(&mut buf)? {
            None => return Ok(()),
            Some(0) => return Err(io::Error::new(ErrorKind::UnexpectedEof, "server closed the connection")),
            Some(n) => data.extend_from_slice(&buf[..n]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_settings, FakeConnector, GameScript, TRAILING_MESSAGE};

    fn session(fake: &FakeConnector) -> Session {
        Session::new("bot000", fake.connector(), test_settings())
    }

    #[test]
    fn test_connect_reads_launcher_menu() -> Result<()> {
        let fake = FakeConnector::default();
        let mut session = session(&fake);
        session.connect()?;
        assert!(session.is_connected());
        assert!(session.refresh().contains(PromptFlags::DGAMELAUNCH));
        assert_eq!(fake.open_connections(), 1);
        Ok(())
    }

    #[test]
    fn test_connect_retries_refusals() -> Result<()> {
        let fake = FakeConnector::new(GameScript {
            refuse_connections: 2,
            ..Default::default()
        });
        let mut session = session(&fake);
        session.connect()?;
        assert_eq!(fake.attempts(), 3);
        Ok(())
    }

    #[test]
    fn test_connect_gives_up_after_retries() {
        let fake = FakeConnector::new(GameScript {
            refuse_connections: usize::MAX,
            ..Default::default()
        });
        let mut session = session(&fake);
        match session.connect() {
            Err(Error::ConnectFailed { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected connect failure, got {:?}", other.map(|_| ())),
        }
        assert_eq!(fake.attempts(), 3);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_start_session_logs_in_and_plays() -> Result<()> {
        let fake = FakeConnector::default();
        let mut session = session(&fake);
        session.start_session()?;

        assert!(session.flags().contains(PromptFlags::GAME_SCREEN));
        assert_eq!(session.status().turn(), Some(1));
        let messages = fake.messages();
        assert!(messages.contains(&b"bot000\n".to_vec()));
        assert!(messages.contains(&b"p".to_vec()));
        Ok(())
    }

    #[test]
    fn test_send_and_await_reads_through_marker() -> Result<()> {
        let fake = FakeConnector::default();
        let mut session = session(&fake);
        session.start_session()?;

        let data = session.send_and_await(READY_MARKER, b"6", Duration::from_millis(50));
        assert!(contains(&data, READY_MARKER));
        assert_eq!(session.status().turn(), Some(2));
        Ok(())
    }

    #[test]
    fn test_bytes_after_the_marker_are_drained() -> Result<()> {
        let fake = FakeConnector::new(GameScript {
            trailing_message: true,
            ..Default::default()
        });
        let mut session = session(&fake);
        session.start_session()?;

        let data = session.send_and_await(READY_MARKER, b"6", Duration::from_millis(50));
        assert!(contains(&data, TRAILING_MESSAGE.as_bytes()));
        assert!(session.text().contains(TRAILING_MESSAGE));
        assert_eq!(session.status().turn(), Some(2));
        Ok(())
    }

    #[test]
    fn test_lost_connection_yields_empty_read() -> Result<()> {
        let fake = FakeConnector::new(GameScript {
            hangup_on_move: ["bot000".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let mut session = session(&fake);
        session.start_session()?;

        assert!(session.send_keys(b"4").is_empty());
        assert!(!session.is_connected());
        assert_eq!(fake.open_connections(), 0);
        assert!(session.send_keys(b"4").is_empty());
        Ok(())
    }

    #[test]
    fn test_stale_process_is_waited_out_silently() -> Result<()> {
        let fake = FakeConnector::new(GameScript {
            stale_rounds: 3,
            ..Default::default()
        });
        let mut session = session(&fake);
        session.start_session()?;
        assert!(session.flags().contains(PromptFlags::GAME_SCREEN));
        assert_eq!(fake.keys_during_stale(), 0);
        Ok(())
    }

    #[test]
    fn test_reset_quits_a_running_game() -> Result<()> {
        let fake = FakeConnector::default();
        let mut session = session(&fake);
        session.start_session()?;
        session.send_keys(b"2");
        session.send_keys(b"2");
        assert_eq!(session.status().turn(), Some(3));

        session.reset_game()?;
        assert_eq!(fake.quits(), 1);
        assert_eq!(session.status().turn(), Some(1));
        Ok(())
    }

    #[test]
    fn test_reset_keeps_a_fresh_game() -> Result<()> {
        let fake = FakeConnector::default();
        let mut session = session(&fake);
        session.start_session()?;
        session.reset_game()?;
        assert_eq!(fake.quits(), 0);
        assert_eq!(session.status().turn(), Some(1));
        Ok(())
    }

    #[test]
    fn test_close_saves_game_once() -> Result<()> {
        let fake = FakeConnector::default();
        let mut session = session(&fake);
        session.start_session()?;

        session.close();
        session.close();
        assert_eq!(fake.saves(), 1);
        assert_eq!(fake.open_connections(), 0);
        assert!(!session.is_connected());
        Ok(())
    }

    #[test]
    fn test_close_at_menu_quits() -> Result<()> {
        let fake = FakeConnector::default();
        let mut session = session(&fake);
        session.connect()?;
        session.close();
        assert_eq!(fake.messages().last(), Some(&b"q".to_vec()));
        assert_eq!(fake.saves(), 0);
        assert_eq!(fake.open_connections(), 0);
        Ok(())
    }

    #[test]
    fn test_dropping_a_session_closes_its_connection() -> Result<()> {
        let fake = FakeConnector::default();
        {
            let mut session = session(&fake);
            session.connect()?;
            assert_eq!(fake.open_connections(), 1);
        }
        assert_eq!(fake.open_connections(), 0);
        Ok(())
    }

    #[test]
    fn test_transcript_is_written_when_enabled() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::Transcript)?;
        let fake = FakeConnector::default();
        let settings = SessionSettings {
            transcript: Some(TranscriptSettings {
                dir: dir.path().to_path_buf(),
                max_entries: 100,
            }),
            ..test_settings()
        };
        let mut session = Session::new("bot007", fake.connector(), settings);
        session.start_session()?;
        session.close();

        let entries = Transcript::load(&dir.path().join("bot007.json")).map_err(Error::Transcript)?;
        assert!(entries.iter().any(|e| e.sent == "p"));
        assert!(entries.iter().any(|e| e.sent == "S"));
        Ok(())
    }

    #[test]
    fn test_transcript_is_off_by_default() -> Result<()> {
        let fake = FakeConnector::default();
        let mut session = session(&fake);
        session.start_session()?;
        assert!(session.transcript().is_none());
        Ok(())
    }
}
