//! can2mqtt: CAN ↔ MQTT bridge tool, entry point.
//!
//! # Usage
//!
//! ```text
//! can2mqtt [OPTIONS] <COMMAND>
//!
//! Commands:
//!   check    Load the configuration and binding table and print them
//!   modes    List every conversion mode
//!   decode   Decode one CAN payload with a conversion mode
//!   encode   Encode one MQTT payload with a conversion mode
//!   replay   Run a candump log through the bridge and print the MQTT output
//!
//! Options:
//!   -c, --can-interface <IF>   CAN interface            [env: CAN2MQTT_CAN]
//!   -m, --mqtt <URL>           MQTT connect string      [env: CAN2MQTT_MQTT]
//!   -f, --file <PATH>          binding table            [env: CAN2MQTT_FILE]
//!   -d, --direction <DIR>      0|1|2 or name            [env: CAN2MQTT_DIRECTION]
//!       --config <PATH>        TOML configuration file  [env: CAN2MQTT_CONFIG]
//!   -v, --verbose              debug logging
//! ```
//!
//! Log output goes to stderr so that command output on stdout can be piped.
//! `RUST_LOG` overrides `--verbose`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use can2mqtt_bridge::application::orchestrator::BridgeOptions;
use can2mqtt_bridge::application::Bridge;
use can2mqtt_bridge::domain::Direction;
use can2mqtt_bridge::infrastructure::storage::{self, candump, ConfigOverrides, LoadedConfig};
use can2mqtt_bridge::infrastructure::{MemoryBroker, MemoryFrameBus};
use can2mqtt_core::{ConversionMode, ModeSupport, CAN_MAX_DLEN};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// CAN ↔ MQTT bridge tool.
#[derive(Debug, Parser)]
#[command(name = "can2mqtt", about = "CAN <-> MQTT protocol bridge", version)]
struct Cli {
    /// CAN network interface, e.g. `can0` or `vcan0`.
    #[arg(short = 'c', long, env = "CAN2MQTT_CAN", global = true)]
    can_interface: Option<String>,

    /// MQTT connect string, `tcp://[user:pass@]host:port`.
    #[arg(short = 'm', long = "mqtt", env = "CAN2MQTT_MQTT", global = true)]
    mqtt: Option<String>,

    /// Binding table (`id,mode,topics` per line).
    #[arg(short = 'f', long = "file", env = "CAN2MQTT_FILE", global = true)]
    file: Option<PathBuf>,

    /// Translation direction: 0 = both, 1 = CAN → MQTT only, 2 = MQTT → CAN only.
    #[arg(short = 'd', long, env = "CAN2MQTT_DIRECTION", global = true)]
    direction: Option<String>,

    /// TOML configuration file.
    #[arg(long, env = "CAN2MQTT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log every translated frame and message.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the configuration and binding table and print them.
    Check {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List every conversion mode and the directions it supports.
    Modes,
    /// Decode one CAN payload.
    Decode {
        #[arg(long)]
        mode: String,
        /// Payload as hex, e.g. `002A` or `00 2A`.
        #[arg(long)]
        data: String,
    },
    /// Encode one MQTT payload.
    Encode {
        #[arg(long)]
        mode: String,
        #[arg(long)]
        text: String,
    },
    /// Feed a candump log through the bridge (CAN → MQTT) and print every
    /// MQTT publish as `<topic> <payload>`.
    Replay {
        /// candump log file (`candump -L` format).
        log: PathBuf,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            can_interface: self.can_interface.clone(),
            broker: self.mqtt.clone(),
            bindings_file: self.file.clone(),
            direction: self.direction.clone(),
        }
    }

    /// Loads the configuration; any error here is fatal.
    fn load_config(&self) -> anyhow::Result<LoadedConfig> {
        let loaded = storage::load(self.config.as_deref(), self.overrides())
            .context("invalid configuration")?;
        log_config(&loaded);
        Ok(loaded)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Check { json } => check(&cli, *json),
        Command::Modes => {
            list_modes();
            Ok(())
        }
        Command::Decode { mode, data } => decode(mode, data),
        Command::Encode { mode, text } => encode(mode, text),
        Command::Replay { log } => replay(&cli, log).await,
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Shown with `check`: no subcommand opens a real CAN socket or broker
/// connection, so these three settings are only echoed back.
const TRANSPORT_NOTE: &str =
    "CAN interface, MQTT broker and client id are informational: no network transport is built in";

#[derive(Serialize)]
struct CheckReport<'a> {
    can_interface: &'a str,
    broker: String,
    client_id: &'a str,
    note: &'static str,
    direction: String,
    bindings_file: Option<String>,
    inbound_queue_capacity: usize,
    bindings: Vec<&'a can2mqtt_core::Binding>,
}

impl<'a> CheckReport<'a> {
    fn new(loaded: &'a LoadedConfig) -> Self {
        let config = &loaded.config;
        Self {
            can_interface: &config.can_interface,
            broker: config.broker.to_string(),
            client_id: &config.client_id,
            note: TRANSPORT_NOTE,
            direction: config.direction.to_string(),
            bindings_file: loaded
                .read_bindings_file
                .then(|| config.bindings_file.display().to_string()),
            inbound_queue_capacity: config.inbound_queue_capacity,
            bindings: loaded.registry.iter().collect(),
        }
    }
}

impl fmt::Display for CheckReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CAN interface : {}", self.can_interface)?;
        writeln!(f, "MQTT broker   : {}", self.broker)?;
        writeln!(f, "client id     : {}", self.client_id)?;
        writeln!(f, "                ({})", self.note)?;
        writeln!(f, "direction     : {}", self.direction)?;
        writeln!(
            f,
            "bindings file : {}",
            self.bindings_file.as_deref().unwrap_or("(inline bindings only)")
        )?;
        writeln!(f, "queue capacity: {}", self.inbound_queue_capacity)?;
        writeln!(f, "bindings ({}):", self.bindings.len())?;
        for binding in &self.bindings {
            writeln!(
                f,
                "  {:#05X}  {:<20} {}",
                binding.frame_id(),
                binding.mode().name(),
                binding.topics().join(" & ")
            )?;
        }
        Ok(())
    }
}

fn check(cli: &Cli, json: bool) -> anyhow::Result<()> {
    let loaded = cli.load_config()?;
    let report = CheckReport::new(&loaded);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

fn list_modes() {
    for mode in ConversionMode::ALL {
        let support = match mode.support() {
            ModeSupport::Both => "CAN <-> MQTT",
            ModeSupport::DecodeOnly => "CAN  -> MQTT",
            ModeSupport::EncodeOnly => "CAN <-  MQTT",
        };
        println!("{:<20} {}", mode.name(), support);
    }
}

fn decode(mode: &str, data: &str) -> anyhow::Result<()> {
    let mode: ConversionMode = mode.parse()?;
    let payload = parse_hex_payload(data)?;
    for value in mode.decode(&payload) {
        println!("{value}");
    }
    Ok(())
}

fn encode(mode: &str, text: &str) -> anyhow::Result<()> {
    let mode: ConversionMode = mode.parse()?;
    let encoded = mode.encode(text);
    println!("[{}] {}", encoded.len, format_bytes(encoded.bytes()));
    Ok(())
}

async fn replay(cli: &Cli, log: &std::path::Path) -> anyhow::Result<()> {
    let loaded = cli.load_config()?;
    let frames = candump::load_candump(log)?;

    let bus = MemoryFrameBus::new();
    let broker = MemoryBroker::new();
    let options = BridgeOptions {
        direction: Direction::CanToMqtt,
        ..BridgeOptions::from(&loaded.config)
    };
    let bridge = Bridge::new(
        Arc::new(loaded.registry),
        Arc::new(bus.clone()),
        Arc::new(broker.clone()),
        options,
    );

    let handle = bridge
        .start(&loaded.config.broker, &loaded.config.client_id)
        .await?;

    let mut unbound = 0usize;
    for frame in &frames {
        if !bus.inject(*frame).await {
            unbound += 1;
        }
    }
    bus.close().await;
    handle.join().await.context("bridge task failed")?;

    let published = broker.published().await;
    for msg in &published {
        println!("{} {}", msg.topic, msg.payload);
    }
    info!(
        "replayed {} frame(s): {} unbound, {} MQTT message(s)",
        frames.len(),
        unbound,
        published.len()
    );
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn log_config(loaded: &LoadedConfig) {
    let config = &loaded.config;
    info!(
        "config: can={}, mqtt={}, client_id={}, direction={}, bindings={}",
        config.can_interface,
        config.broker,
        config.client_id,
        config.direction,
        if loaded.read_bindings_file {
            config.bindings_file.display().to_string()
        } else {
            "(inline)".to_string()
        }
    );
    for binding in loaded.registry.iter() {
        debug!(
            "binding {} -> {:?} ({})",
            binding.frame_id(),
            binding.topics(),
            binding.mode()
        );
    }
}

/// Parses `002A`, `00 2A` or `00:2A` into at most eight bytes.
fn parse_hex_payload(text: &str) -> anyhow::Result<Vec<u8>> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = hex::decode(&compact).with_context(|| format!("invalid hex payload {text:?}"))?;
    if bytes.len() > CAN_MAX_DLEN {
        bail!(
            "payload has {} bytes, a CAN frame holds at most {CAN_MAX_DLEN}",
            bytes.len()
        );
    }
    Ok(bytes)
}

fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn loaded_config() -> LoadedConfig {
        LoadedConfig {
            config: can2mqtt_bridge::domain::BridgeConfig::default(),
            read_bindings_file: true,
            registry: can2mqtt_core::BindingRegistry::new([can2mqtt_core::BindingRecord::new(
                0x100,
                "uint162ascii",
                "plant/level",
            )])
            .unwrap(),
        }
    }

    #[test]
    fn test_check_text_marks_transport_settings_informational() {
        // Arrange
        let loaded = loaded_config();

        // Act
        let text = CheckReport::new(&loaded).to_string();

        // Assert
        assert!(text.contains("CAN interface : can0"));
        assert!(text.contains(TRANSPORT_NOTE));
        assert!(text.contains("0x100"));
    }

    #[test]
    fn test_check_json_carries_note() {
        let loaded = loaded_config();

        let json = serde_json::to_value(CheckReport::new(&loaded)).unwrap();

        assert_eq!(json["note"], TRANSPORT_NOTE);
        assert_eq!(json["client_id"], "CAN2MQTT");
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_short_flags() {
        // Arrange / Act
        let cli = Cli::parse_from([
            "can2mqtt", "-c", "vcan0", "-m", "tcp://h:1883", "-f", "b.csv", "-d", "2", "check",
        ]);

        // Assert
        assert_eq!(cli.can_interface.as_deref(), Some("vcan0"));
        assert_eq!(cli.mqtt.as_deref(), Some("tcp://h:1883"));
        assert_eq!(cli.file, Some(PathBuf::from("b.csv")));
        assert_eq!(cli.direction.as_deref(), Some("2"));
        assert!(matches!(cli.command, Command::Check { json: false }));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["can2mqtt", "check", "--json", "-v", "--config", "a.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        assert!(matches!(cli.command, Command::Check { json: true }));
    }

    #[test]
    fn test_cli_decode_arguments() {
        let cli = Cli::parse_from(["can2mqtt", "decode", "--mode", "uint162ascii", "--data", "002A"]);
        match cli.command {
            Command::Decode { mode, data } => {
                assert_eq!(mode, "uint162ascii");
                assert_eq!(data, "002A");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_a_command() {
        assert!(Cli::try_parse_from(["can2mqtt"]).is_err());
    }

    #[test]
    fn test_overrides_carry_cli_values() {
        let cli = Cli::parse_from(["can2mqtt", "-d", "can2mqtt", "replay", "log.txt"]);
        let overrides = cli.overrides();
        assert_eq!(overrides.direction.as_deref(), Some("can2mqtt"));
        assert!(overrides.can_interface.is_none());
    }

    #[test]
    fn test_parse_hex_payload_accepts_separators() {
        assert_eq!(parse_hex_payload("00 2A").unwrap(), vec![0x00, 0x2A]);
        assert_eq!(parse_hex_payload("00:ff:00").unwrap(), vec![0x00, 0xFF, 0x00]);
        assert!(parse_hex_payload("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_hex_payload_rejects_bad_input() {
        assert!(parse_hex_payload("0G").is_err());
        assert!(parse_hex_payload("000102030405060708").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[0x00, 0x2A, 0xFF]), "00 2A FF");
        assert_eq!(format_bytes(&[]), "");
    }
}
