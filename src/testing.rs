//! In-memory game server for tests
//!
//! `FakeConnector` hands out `FakeGame` transports that play a tiny
//! dgamelaunch + NetHack: a login menu, a one-room map whose turn counter
//! advances on every move, death, quitting and saving. Reads never block;
//! an empty buffer reads as a timeout.

use std::collections::{HashSet, VecDeque};
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::core::retry::RetryPolicy;
use crate::core::session::SessionSettings;
use crate::core::transport::{Connector, Transport};

/// How the fake server misbehaves
#[derive(Clone, Debug, Default)]
pub struct GameScript {
    /// Refuse this many connection attempts before accepting
    pub refuse_connections: usize,
    /// Turn on which the character dies
    pub die_at_turn: Option<u32>,
    /// Hang up when one of these users logs in
    pub hangup_at_login: HashSet<String>,
    /// Hang up when one of these users moves
    pub hangup_on_move: HashSet<String>,
    /// Stale notices shown before the game starts
    pub stale_rounds: u32,
    /// Time the server takes to answer a move
    pub slow_move: Option<Duration>,
    /// Follow every map frame with a message that only shows up once the
    /// ready marker has been read
    pub trailing_message: bool,
}

#[derive(Default)]
struct FakeShared {
    script: GameScript,
    attempts: AtomicUsize,
    open: AtomicUsize,
    quits: AtomicUsize,
    saves: AtomicUsize,
    keys_during_stale: AtomicUsize,
    log: Mutex<Vec<Vec<u8>>>,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    shared: Arc<FakeShared>,
}

impl FakeConnector {
    pub fn new(script: GameScript) -> Self {
        Self {
            shared: Arc::new(FakeShared {
                script,
                ..Default::default()
            }),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn quits(&self) -> usize {
        self.shared.quits.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.shared.saves.load(Ordering::SeqCst)
    }

    pub fn keys_during_stale(&self) -> usize {
        self.shared.keys_during_stale.load(Ordering::SeqCst)
    }

    /// Every message written by any client, in arrival order
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.shared.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> io::Result<Box<dyn Transport>> {
        let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.shared.script.refuse_connections {
            return Err(io::Error::new(ErrorKind::ConnectionRefused, "connection refused"));
        }
        self.shared.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeGame::new(self.shared.clone())))
    }

    fn describe(&self) -> String {
        "fake:23".to_string()
    }
}

/// Fast settings for driving a `FakeGame`
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        banner_timeout: Duration::from_millis(50),
        reply_timeout: Duration::from_millis(50),
        settle_timeout: Duration::from_millis(50),
        retry: RetryPolicy::new(3, Duration::ZERO),
        ..SessionSettings::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    Menu,
    Username,
    Password,
    Stale(u32),
    Playing,
    Dying(u8),
    Quitting(u8),
    Saving(u8),
}

struct FakeGame {
    shared: Arc<FakeShared>,
    phase: Phase,
    username: Option<String>,
    logged_in: bool,
    turn: u32,
    output: VecDeque<u8>,
    /// Bytes that arrive after `output` has been read
    tail: VecDeque<u8>,
    idle_reads: u32,
    hung_up: bool,
    released: bool,
}

const MORE: &str = "\x1b[7m--More--\x1b[27m\x1b[3z";
pub const TRAILING_MESSAGE: &str = "You hear the footsteps of a guard on patrol.";

impl FakeGame {
    fn new(shared: Arc<FakeShared>) -> Self {
        let mut game = Self {
            shared,
            phase: Phase::Menu,
            username: None,
            logged_in: false,
            turn: 1,
            output: VecDeque::new(),
            tail: VecDeque::new(),
            idle_reads: 0,
            hung_up: false,
            released: false,
        };
        game.show_menu();
        game
    }

    fn emit(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
    }

    fn show_menu(&mut self) {
        let status = match (&self.username, self.logged_in) {
            (Some(name), true) => format!("Logged in as: {}\r\n\r\n p) Play NetHack 3.6.0", name),
            _ => "Not logged in.\r\n\r\n l) Login\r\n r) Register new user".to_string(),
        };
        let menu = format!(
            "\x1b[2J\x1b[H ## dgamelaunch 1.5.1 - network console game launcher\r\n\r\n {}\r\n q) Quit\x1b[19;3H=> ",
            status
        );
        self.emit(&menu);
    }

    fn show_game(&mut self, message: &str) {
        let frame = format!(
            "\x1b[2J\x1b[H{}\x1b[4;10H\x1b[0;832z-\x1b[1z\x1b[0;831z-\x1b[1z\x1b[0;831z-\x1b[1z\x1b[0;831z-\x1b[1z\
             \x1b[5;10H\x1b[0;830z|\x1b[1z\x1b[0;848z.\x1b[1z\x1b[0;340z@\x1b[1z\x1b[0;16zd\x1b[1z\
             \x1b[23;1HAgent the Stripling  St:18/02 Dx:14 Co:16 In:8 Wi:9 Ch:8  Lawful S:0\
             \x1b[24;1HDlvl:1  $:0  HP:18(18) Pw:1(1) AC:6  Xp:1/0 T:{}\x1b[5;12H\x1b[3z",
            message, self.turn
        );
        self.emit(&frame);
        if self.shared.script.trailing_message {
            self.tail.extend(format!("\x1b[2;1H{}", TRAILING_MESSAGE).as_bytes());
        }
    }

    fn start_game(&mut self) {
        self.phase = Phase::Playing;
        self.turn = 1;
        let name = self.username.clone().unwrap_or_default();
        self.show_game(&format!("Hello {}, welcome to NetHack!", name));
    }

    fn is_move(message: &[u8]) -> bool {
        match message {
            [b'.'] => true,
            [d] | [b'G', d] => (b'1'..=b'9').contains(d),
            _ => false,
        }
    }

    fn user_in(&self, set: &HashSet<String>) -> bool {
        self.username.as_ref().map_or(false, |u| set.contains(u))
    }

    fn handle(&mut self, message: &[u8]) {
        match (self.phase, message) {
            (Phase::Menu, b"l") => {
                self.phase = Phase::Username;
                self.emit("\x1b[2J\x1b[H Please enter your username. (blank entry aborts)\x1b[19;3H=> ");
            }
            (Phase::Menu, b"p") if self.logged_in => {
                if self.shared.script.stale_rounds > 0 {
                    self.phase = Phase::Stale(self.shared.script.stale_rounds);
                    self.emit("\x1b[2J\x1b[HThere is a stale nethack process, killing it in a few seconds.");
                } else {
                    self.start_game();
                }
            }
            (Phase::Menu, b"q") => self.hung_up = true,
            (Phase::Menu, _) => self.show_menu(),
            (Phase::Username, name) => {
                let name = String::from_utf8_lossy(name).trim_end().to_string();
                self.username = Some(name);
                if self.user_in(&self.shared.script.hangup_at_login) {
                    self.hung_up = true;
                    return;
                }
                self.phase = Phase::Password;
                self.emit("\x1b[2J\x1b[H Please enter your password.\x1b[19;3H=> ");
            }
            (Phase::Password, _) => {
                self.logged_in = true;
                self.phase = Phase::Menu;
                self.show_menu();
            }
            (Phase::Stale(_), _) => {
                self.shared.keys_during_stale.fetch_add(1, Ordering::SeqCst);
            }
            (Phase::Playing, b"#quit\n") => {
                self.phase = Phase::Quitting(0);
                self.emit("\x1b[H\x1b[KReally quit? [yes/no]? \x1b[3z");
            }
            (Phase::Playing, b"S") => {
                self.phase = Phase::Saving(0);
                self.emit("\x1b[H\x1b[KReally save? [yn] (n) \x1b[3z");
            }
            (Phase::Playing, m) if Self::is_move(m) => {
                if self.user_in(&self.shared.script.hangup_on_move) {
                    self.hung_up = true;
                    return;
                }
                self.turn += 1;
                if self.shared.script.die_at_turn == Some(self.turn) {
                    self.phase = Phase::Dying(0);
                    self.emit(&format!("\x1b[H\x1b[KYou die...{}", MORE));
                } else {
                    self.show_game("");
                }
            }
            (Phase::Playing, _) => self.show_game(""),
            (Phase::Dying(0), b"\n") => {
                self.phase = Phase::Dying(1);
                self.emit(&format!(
                    "\x1b[2J\x1b[H Goodbye Agent the Valkyrie... killed by a jackal on dungeon level 1 {}",
                    MORE
                ));
            }
            (Phase::Dying(1), b"\n") => {
                self.phase = Phase::Dying(2);
                self.emit("\x1b[2J\x1b[HVoluntary challenges: You were an atheist. (end) \x1b[3z");
            }
            (Phase::Dying(_), b"\n") => {
                self.phase = Phase::Menu;
                self.show_menu();
            }
            (Phase::Quitting(0), b"yes\n") => {
                self.phase = Phase::Quitting(1);
                self.emit("\x1b[2J\x1b[H Goodbye Agent the Valkyrie... You quit. (end) \x1b[3z");
            }
            (Phase::Quitting(1), b"\n") => {
                self.shared.quits.fetch_add(1, Ordering::SeqCst);
                self.phase = Phase::Menu;
                self.show_menu();
            }
            (Phase::Saving(0), b"y") => {
                self.phase = Phase::Saving(1);
                self.emit("\x1b[2J\x1b[HSaving...\x1b[3z");
            }
            (Phase::Saving(1), b"\n") => {
                self.shared.saves.fetch_add(1, Ordering::SeqCst);
                self.hung_up = true;
            }
            // Anything else is a wrong answer: back to the map
            (Phase::Dying(_) | Phase::Quitting(_) | Phase::Saving(_), _) => {
                self.phase = Phase::Playing;
                self.show_game("");
            }
        }
    }

    /// Advance time-driven phases when the client waits without sending
    fn tick(&mut self) {
        if let Phase::Stale(rounds) = self.phase {
            self.idle_reads += 1;
            if self.idle_reads < 2 {
                return;
            }
            self.idle_reads = 0;
            if rounds > 1 {
                self.phase = Phase::Stale(rounds - 1);
                self.emit("\x1b[2J\x1b[HStill waiting for the stale process, a few more seconds.");
            } else {
                self.start_game();
            }
        }
    }


    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Transport for FakeGame {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.hung_up {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "server hung up"));
        }
        if let Ok(mut log) = self.shared.log.lock() {
            log.push(data.to_vec());
        }
        if let Some(delay) = self.shared.script.slow_move {
            if self.phase == Phase::Playing && Self::is_move(data) {
                thread::sleep(delay);
            }
        }
        self.handle(data);
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<Option<usize>> {
        if self.output.is_empty() {
            if self.hung_up {
                return Ok(Some(0));
            }
            self.tick();
        }
        if self.output.is_empty() {
            return Ok(None);
        }
        Ok(Some(take(&mut self.output, buf)))
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        if !self.output.is_empty() {
            return Ok(Some(take(&mut self.output, buf)));
        }
        if !self.tail.is_empty() {
            return Ok(Some(take(&mut self.tail, buf)));
        }
        Ok(if self.hung_up { Some(0) } else { None })
    }

    fn shutdown(&mut self) {
        self.release();
    }
}

fn take(queue: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = buf.len().min(queue.len());
    for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
        *slot = byte;
    }
    n
}

impl Drop for FakeGame {
    fn drop(&mut self) {
        self.release();
    }
}
