//! hackdriver - plays NetHack on a dgamelaunch server with a crowd of bots
//!
//! Logs in a number of sessions, drives each one with a random agent for a
//! number of rounds (restarting games that end), then saves and closes
//! everything.
//!
//! # Quick Start
//!
//! ```text
//! hackdriver                      # 4 sessions on localhost:23, 100 rounds
//! hackdriver -H nh.local -n 16    # 16 sessions on another server
//! hackdriver --transcript runs/   # record every exchange as JSON
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Mutex;

use rand::Rng;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hackdriver::config::LoggingConfig;
use hackdriver::{Config, GameEnv, Orchestrator, Strategy, ACTION_COUNT};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line options
struct Args {
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    sessions: usize,
    steps: usize,
    transcript_dir: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config_path: None,
            host: None,
            port: None,
            sessions: 4,
            steps: 100,
            transcript_dir: None,
        }
    }
}

fn print_version() {
    eprintln!("hackdriver {}", VERSION);
}

fn print_help() {
    eprintln!("hackdriver {} - automated NetHack sessions over telnet", VERSION);
    eprintln!();
    eprintln!("Usage: hackdriver [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>      Configuration file (default: ~/.hackdriver/config.toml)");
    eprintln!("  -H, --host <HOST>        Game server host");
    eprintln!("  -p, --port <PORT>        Game server port");
    eprintln!("  -n, --sessions <N>       Number of concurrent sessions (default: 4)");
    eprintln!("  -s, --steps <N>          Rounds to play (default: 100)");
    eprintln!("      --transcript <DIR>   Record each session's exchanges to DIR");
    eprintln!("  -v, --version            Show version");
    eprintln!("  -h, --help               Show this help");
    eprintln!();
    eprintln!("Logging: RUST_LOG overrides the configured level, e.g. RUST_LOG=hackdriver=debug");
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;

    fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
        args.get(i)
            .map(String::as_str)
            .ok_or_else(|| format!("Missing value for {}", flag))
    }

    fn number<T: std::str::FromStr>(text: &str, flag: &str) -> Result<T, String> {
        text.parse()
            .map_err(|_| format!("Invalid value for {}: {}", flag, text))
    }

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                parsed.config_path = Some(PathBuf::from(value(&args, i, flag)?));
            }
            "-H" | "--host" => {
                i += 1;
                parsed.host = Some(value(&args, i, flag)?.to_string());
            }
            "-p" | "--port" => {
                i += 1;
                parsed.port = Some(number(value(&args, i, flag)?, flag)?);
            }
            "-n" | "--sessions" => {
                i += 1;
                parsed.sessions = number(value(&args, i, flag)?, flag)?;
            }
            "-s" | "--steps" => {
                i += 1;
                parsed.steps = number(value(&args, i, flag)?, flag)?;
            }
            "--transcript" => {
                i += 1;
                parsed.transcript_dir = Some(PathBuf::from(value(&args, i, flag)?));
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

/// Log to the configured file (append, no colors) or to stderr
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if let Some(path) = &logging.file {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path);
        match log_file {
            Ok(file) => {
                let subscriber = FmtSubscriber::builder()
                    .with_env_filter(filter)
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
                return;
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", path.display(), e),
        }
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn random_policy(_env: &GameEnv) -> (usize, usize) {
    let mut rng = rand::thread_rng();
    (rng.gen_range(0..ACTION_COUNT), rng.gen_range(0..Strategy::COUNT))
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    // Command line overrides the file
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.transcript_dir.clone() {
        config.transcript.enabled = true;
        config.transcript.dir = dir;
    }

    init_logging(&config.logging);
    info!("hackdriver {} starting against {}:{}", VERSION, config.server.host, config.server.port);

    run(&config, args.sessions, args.steps)
}

fn run(config: &Config, sessions: usize, steps: usize) -> anyhow::Result<()> {
    let mut orchestrator = Orchestrator::new(
        config.connector(),
        config.session_settings(),
        config.glyphs,
        config.orchestrator_settings(),
        random_policy,
    );

    // Sessions are saved and closed even when play stops on an error
    let outcome = play(&mut orchestrator, sessions, steps);

    for line in orchestrator.session_turns() {
        println!("{}", line);
    }

    let closed = orchestrator.close_all();
    if !closed.is_complete() {
        warn!("{} sessions did not close cleanly", closed.errors.len());
    }
    outcome
}

fn play(orchestrator: &mut Orchestrator, sessions: usize, steps: usize) -> anyhow::Result<()> {
    let created = orchestrator.create_sessions(sessions)?;
    for (id, e) in &created.errors {
        error!("Session {} failed to start: {}", orchestrator.username(*id), e);
    }
    if orchestrator.is_empty() {
        anyhow::bail!("none of the {} sessions could be started", sessions);
    }

    for round in 1..=steps {
        let reset = orchestrator.reset_done()?;
        for (id, e) in &reset.errors {
            warn!("Reset of {} failed: {}", orchestrator.username(*id), e);
        }

        let batch = orchestrator.step_all()?;
        for (id, e) in &batch.errors {
            warn!("Step of {} failed: {}", orchestrator.username(*id), e);
        }
        let ended = batch.results.values().filter(|r| r.ended).count();
        info!(
            "Round {}: {} stepped, {} ended, {} failed ({} timed out)",
            round,
            batch.results.len(),
            ended,
            batch.errors.len(),
            batch.timed_out.len()
        );
    }
    Ok(())
}
