use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, RelayConfig, RoomRole, SyncTuning};
use crate::player::PlayerError;
use crate::runtime;
use crate::telemetry::logging::{self, InitError, LogConfig, LogLevel};
use crate::transport::TransportError;

#[derive(Parser, Debug)]
#[command(
    name = "watchparty",
    about = "Keep a local mpv in lockstep with a shared watch party",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "WATCHPARTY_RELAY",
        default_value = "ws://localhost:8080/ws",
        help = "Websocket URL of the room relay"
    )]
    pub relay: String,

    #[arg(
        long = "name",
        global = true,
        env = "WATCHPARTY_NAME",
        default_value = "guest",
        help = "Display name announced to the room"
    )]
    pub user_name: String,

    #[arg(
        long = "mpv-socket",
        global = true,
        env = "WATCHPARTY_MPV_SOCKET",
        value_name = "PATH",
        default_value = "/tmp/watchparty-mpv.sock",
        help = "mpv JSON IPC socket (start mpv with --input-ipc-server=PATH)"
    )]
    pub mpv_socket: PathBuf,

    #[arg(
        long = "tuning",
        global = true,
        env = "WATCHPARTY_TUNING",
        value_name = "PATH",
        help = "TOML file overriding sync tuning defaults"
    )]
    pub tuning: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "WATCHPARTY_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "WATCHPARTY_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a room and drive it from the local player
    Host(HostArgs),
    /// Join a room and follow its host
    Join(JoinArgs),
}

#[derive(Args, Debug)]
pub struct HostArgs {
    #[arg(long = "media", value_name = "ID", help = "Media identifier shown to the room")]
    pub media_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct JoinArgs {
    #[arg(env = "WATCHPARTY_ROOM", value_name = "ROOM", help = "Room id to join")]
    pub room: String,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("logging initialization failed: {0}")]
    Logging(#[from] InitError),
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("player error: {0}")]
    Player(#[from] PlayerError),
}

impl Cli {
    pub fn role(&self) -> RoomRole {
        match &self.command {
            Command::Host(args) => RoomRole::Host {
                media_id: args.media_id.clone(),
            },
            Command::Join(args) => RoomRole::Follow {
                room: args.room.clone(),
            },
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::new(self.relay.clone(), self.user_name.clone(), self.role())
    }

    pub fn load_tuning(&self) -> Result<SyncTuning, ConfigError> {
        match &self.tuning {
            Some(path) => SyncTuning::load(path),
            None => Ok(SyncTuning::default()),
        }
    }
}

pub async fn execute(cli: Cli) -> Result<(), CliError> {
    logging::init(&cli.logging.to_config())?;
    let tuning = cli.load_tuning()?;
    let relay = cli.relay_config();
    info!(target: "watchparty::client", role = ?relay.role, relay = %relay.relay_url, "starting");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    run_with_mpv(&cli, relay, tuning, shutdown).await
}

#[cfg(unix)]
async fn run_with_mpv(
    cli: &Cli,
    relay: RelayConfig,
    tuning: SyncTuning,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), CliError> {
    use crate::player::mpv::MpvPlayer;

    let (player, events) = MpvPlayer::connect(&cli.mpv_socket).await?;
    let engine = runtime::run(relay, tuning, player, Some(events), shutdown).await?;
    info!(
        target: "watchparty::client",
        status = ?engine.sync_status(),
        clock_offset_ms = engine.clock().offset_ms(),
        "stopped"
    );
    Ok(())
}

#[cfg(not(unix))]
async fn run_with_mpv(
    _cli: &Cli,
    _relay: RelayConfig,
    _tuning: SyncTuning,
    _shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), CliError> {
    Err(PlayerError::Unavailable.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_requires_room_and_normalizes_localhost() {
        let cli = Cli::try_parse_from(["watchparty", "--name", "ana", "join", "r42"]).unwrap();
        let relay = cli.relay_config();
        assert_eq!(relay.role, RoomRole::Follow { room: "r42".into() });
        assert_eq!(relay.relay_url, "ws://127.0.0.1:8080/ws");
        assert_eq!(relay.user_name, "ana");
    }

    #[test]
    fn host_takes_optional_media() {
        let cli = Cli::try_parse_from([
            "watchparty",
            "host",
            "--media",
            "big-buck-bunny",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(
            cli.role(),
            RoomRole::Host {
                media_id: Some("big-buck-bunny".into())
            }
        );
        assert_eq!(cli.logging.level, LogLevel::Debug);
        assert!(cli.load_tuning().unwrap().validate().is_ok());
    }
}
