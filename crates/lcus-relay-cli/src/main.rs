mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lcus_relay_core::demo::SimulatedBoard;
use lcus_relay_core::{AckMode, RelayTarget, Session, SessionConfig, StatusSnapshot};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "lcus-relay",
    version,
    about = "Switch and query LCUS USB relay boards"
)]
struct Cli {
    /// Serial port the board is attached to
    #[arg(long, short, env = "LCUS_RELAY_PORT", value_name = "PORT")]
    port: Option<String>,
    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,
    /// Read timeout per exchange, in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
    /// Relay count (asked from the board when omitted)
    #[arg(long)]
    channels: Option<u8>,
    /// Don't switch every relay off when connecting
    #[arg(long)]
    no_init: bool,
    /// How switch commands are confirmed
    #[arg(long, value_enum)]
    ack: Option<AckArg>,
    /// Status queries per read (the last reply wins)
    #[arg(long, value_name = "N")]
    status_reads: Option<u8>,
    /// JSON session config; flags override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Talk to a simulated board with this many relays instead of a port
    #[arg(long, value_name = "CHANNELS")]
    demo: Option<u8>,
    /// Output JSON
    #[arg(long)]
    json: bool,
    /// Verbose logging
    #[arg(long, short)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AckArg {
    Readback,
    Echo,
}

impl From<AckArg> for AckMode {
    fn from(arg: AckArg) -> Self {
        match arg {
            AckArg::Readback => AckMode::Readback,
            AckArg::Echo => AckMode::Echo,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show relay states
    Status {
        /// Relay to show (all when omitted)
        relay: Option<u8>,
    },
    /// Turn a relay on (all when omitted)
    On { relay: Option<u8> },
    /// Turn a relay off (all when omitted)
    Off { relay: Option<u8> },
    /// Turn a relay on, then off again after a pause
    Toggle {
        /// Relay to pulse (all when omitted)
        relay: Option<u8>,
        /// How long to hold the relay on
        #[arg(long, default_value_t = 500, value_name = "MS")]
        ms: u64,
    },
}

#[derive(Serialize)]
struct SwitchResult {
    relay: Option<u8>,
    on: bool,
    ok: bool,
}

impl Cli {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => SessionConfig::default(),
        };

        if let Some(port) = &self.port {
            config.port_name = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if self.channels.is_some() {
            config.channels = self.channels;
        }
        if self.no_init {
            config.init_off = false;
        }
        if let Some(ack) = self.ack {
            config.ack = ack.into();
        }
        if let Some(reads) = self.status_reads {
            config.status_reads = reads;
        }
        Ok(config)
    }

    fn connect(&self) -> Result<Session> {
        let mut config = self.session_config()?;
        debug!(?config, "session config");

        if let Some(channels) = self.demo {
            if config.port_name.is_empty() {
                config.port_name = "demo".to_string();
            }
            let mut board = SimulatedBoard::new(channels);
            if config.ack == AckMode::Echo {
                board = board.with_echo();
            }
            return Session::with_transport(board, config).context("opening demo board");
        }

        if config.port_name.is_empty() {
            bail!("no serial port given (use --port, LCUS_RELAY_PORT or a config file)");
        }
        let port = config.port_name.clone();
        Session::open(config).with_context(|| format!("opening relay board on {}", port))
    }
}

fn print_status(snapshot: &StatusSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        for (relay, on) in snapshot.iter() {
            println!("CH{}: {}", relay, if on { "ON" } else { "OFF" });
        }
    }
    Ok(())
}

fn print_switch(result: SwitchResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        let target = result
            .relay
            .map_or_else(|| "all relays".to_string(), |r| format!("relay {}", r));
        let state = if result.on { "on" } else { "off" };
        if result.ok {
            println!("{} {}", target, state);
        } else {
            println!("{}: board did not confirm switching {}", target, state);
        }
    }
    Ok(())
}

/// Block until the off scheduled by a toggle has run. An unconfirmed toggle
/// still schedules one, and closing the session first would cancel it.
fn wait_for_deferred_off(session: &Session, relay: Option<u8>) {
    let relays = relay.map_or_else(|| session.relays(), |r| vec![r]);
    while relays.iter().any(|r| session.off_pending(*r)) {
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn run(cli: Cli) -> Result<bool> {
    let session = cli.connect()?;

    let ok = match cli.command {
        Command::Status { relay } => {
            let snapshot = match relay {
                Some(relay) => session.status_of(relay)?,
                None => session.status()?,
            };
            print_status(&snapshot, cli.json)?;
            true
        }
        Command::On { relay } => {
            let ok = session.switch(RelayTarget::from(relay), true)?;
            print_switch(SwitchResult { relay, on: true, ok }, cli.json)?;
            ok
        }
        Command::Off { relay } => {
            let ok = session.switch(RelayTarget::from(relay), false)?;
            print_switch(SwitchResult { relay, on: false, ok }, cli.json)?;
            ok
        }
        Command::Toggle { relay, ms } => {
            let duration = Duration::from_millis(ms);
            let ok = match relay {
                Some(relay) => session.toggle(relay, duration)?,
                None => session.toggle_all(duration)?,
            };
            print_switch(SwitchResult { relay, on: true, ok }, cli.json)?;
            wait_for_deferred_off(&session, relay);
            ok
        }
    };

    session.close()?;
    Ok(ok)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if !run(cli)? {
        std::process::exit(1);
    }
    Ok(())
}
