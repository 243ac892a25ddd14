//! mpv notification OSD
//!
//! Connects to a player's JSON IPC socket and mirrors its state into a
//! desktop notification until the player exits.
//!
//! Start mpv as `mpv --input-ipc-server=<socket> ...` and point this at the
//! same socket.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Name used for `script-opts` prefixes and the config file
const DEFAULT_CLIENT_NAME: &str = "notify_osd";

#[derive(Parser, Debug)]
#[command(
    name = "mpv-notify-osd",
    version,
    about = "Desktop notification OSD for mpv"
)]
struct Cli {
    /// Prefix for script-opts keys and the config file name
    #[arg(long, default_value = DEFAULT_CLIENT_NAME)]
    client_name: String,

    /// mpv IPC socket (`--input-ipc-server`)
    socket: PathBuf,
}

#[cfg(all(unix, not(target_os = "macos")))]
fn run(cli: Cli) -> Result<()> {
    use log::info;
    use mpv_notify_osd::desktop::DesktopServer;
    use mpv_notify_osd::ipc::IpcPlayer;
    use mpv_notify_osd::{run_event_loop, Engine};

    let (player, events) = IpcPlayer::connect(&cli.socket, &cli.client_name)?;
    info!("✅ Connected to {}", cli.socket.display());

    let mut engine = Engine::new(player, DesktopServer::new(), cli.client_name);
    engine.start();
    run_event_loop(&mut engine, &events);
    Ok(())
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn run(_cli: Cli) -> Result<()> {
    anyhow::bail!("freedesktop notifications are not available on this platform")
}

fn main() -> Result<()> {
    // Everything passes the env filter; the player's msg-level narrows it later
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format_timestamp(None)
        .init();
    log::set_max_level(log::LevelFilter::Warn);

    run(Cli::parse())
}
