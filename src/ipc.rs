//! mpv JSON IPC transport
//!
//! Talks to a running player through its `--input-ipc-server` socket. A
//! reader thread turns the newline-delimited JSON stream into
//! [`PlayerEvent`]s; replies to synchronous commands go to a second channel
//! that [`IpcPlayer`] waits on.
//!
//! Screenshots cannot travel as raw pixels over JSON, so they are written to
//! a temporary PNG with `screenshot-to-file` and decoded by the reader thread
//! before being handed to the engine.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::player::{FrameReply, Player, PlayerEvent};

/// How long to wait for the reply to a synchronous command
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Wire request ids at or above this belong to screenshot requests.
const SCREENSHOT_ID_BASE: u64 = 1 << 32;

/// One line received from the player
#[derive(Debug, Default, Deserialize)]
struct Message {
    event: Option<String>,
    id: Option<u64>,
    name: Option<String>,
    data: Option<Value>,
    request_id: Option<u64>,
    error: Option<String>,
    #[serde(default)]
    args: Vec<String>,
}

/// Reply to a synchronous command
#[derive(Debug)]
struct Reply {
    request_id: u64,
    result: std::result::Result<Option<Value>, String>,
}

#[derive(Debug)]
enum Inbound {
    Event(PlayerEvent),
    Reply(Reply),
}

pub struct IpcPlayer {
    writer: UnixStream,
    replies: Receiver<Reply>,
    next_id: u64,
}

impl IpcPlayer {
    /// Connect to the socket at `path`.
    pub fn connect(path: &Path, client_name: &str) -> Result<(Self, Receiver<PlayerEvent>)> {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("Failed to connect to mpv IPC socket: {}", path.display()))?;
        Self::from_stream(stream, client_name)
    }

    /// Wrap an already connected stream and start the reader thread.
    pub fn from_stream(stream: UnixStream, client_name: &str) -> Result<(Self, Receiver<PlayerEvent>)> {
        let reader = stream.try_clone().context("Failed to clone IPC socket")?;
        let (event_tx, event_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let client_name = client_name.to_string();

        thread::Builder::new()
            .name("mpv-ipc-reader".into())
            .spawn(move || read_loop(reader, &client_name, &event_tx, &reply_tx))
            .context("Failed to spawn IPC reader thread")?;

        let player = Self {
            writer: stream,
            replies: reply_rx,
            next_id: 1,
        };
        Ok((player, event_rx))
    }

    fn send(&mut self, command: Value, request_id: u64, asynchronous: bool) -> Result<()> {
        let mut message = json!({ "command": command, "request_id": request_id });
        if asynchronous {
            message["async"] = Value::Bool(true);
        }
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        self.write_line(&line)
            .context("Failed to write to mpv IPC socket")?;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> crate::error::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Run a command and wait for its reply.
    fn command(&mut self, command: Value) -> Result<Option<Value>> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(command, id, false)?;

        let deadline = Instant::now() + REPLY_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = self
                .replies
                .recv_timeout(remaining)
                .map_err(|_| anyhow!("no reply from mpv to request {id}"))?;
            if reply.request_id != id {
                debug!("dropping late reply to request {}", reply.request_id);
                continue;
            }
            return reply.result.map_err(|e| anyhow!("mpv command failed: {e}"));
        }
    }
}

impl Player for IpcPlayer {
    fn observe_property(&mut self, id: u64, name: &str) -> Result<()> {
        self.command(json!(["observe_property", id, name]))?;
        Ok(())
    }

    fn unobserve_property(&mut self, id: u64) -> Result<()> {
        self.command(json!(["unobserve_property", id]))?;
        Ok(())
    }

    fn request_screenshot(&mut self, request_id: u64, flags: &str) -> Result<()> {
        let path = screenshot_path(request_id);
        let path = path.to_string_lossy();
        self.send(
            json!(["screenshot-to-file", path, flags]),
            SCREENSHOT_ID_BASE + request_id,
            true,
        )
    }

    fn osd_string(&mut self, name: &str) -> Option<String> {
        // `${name:}` expands to nothing when the property is unavailable
        match self.command(json!(["expand-text", format!("${{{name}:}}")])) {
            Ok(Some(Value::String(s))) if !s.is_empty() => Some(s),
            Ok(_) => None,
            Err(e) => {
                debug!("failed to get OSD string for {name}: {e:#}");
                None
            }
        }
    }

    fn get_property(&mut self, name: &str) -> Option<Value> {
        match self.command(json!(["get_property", name])) {
            Ok(value) => value,
            Err(e) => {
                debug!("failed to get property {name}: {e:#}");
                None
            }
        }
    }

    fn expand_path(&mut self, path: &str) -> Option<PathBuf> {
        match self.command(json!(["expand-path", path])) {
            Ok(Some(Value::String(s))) => Some(PathBuf::from(s)),
            Ok(_) => None,
            Err(e) => {
                debug!("failed to expand path {path}: {e:#}");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reader thread
// ---------------------------------------------------------------------------

fn read_loop(stream: UnixStream, client_name: &str, events: &Sender<PlayerEvent>, replies: &Sender<Reply>) {
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("IPC read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message: Message = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("ignoring malformed IPC line: {e}");
                continue;
            }
        };

        match classify(message, client_name) {
            Some(Inbound::Event(event)) => {
                if events.send(event).is_err() {
                    return;
                }
            }
            Some(Inbound::Reply(reply)) => {
                // nobody waiting is fine
                let _ = replies.send(reply);
            }
            None => {}
        }
    }

    debug!("IPC socket closed");
    let _ = events.send(PlayerEvent::Shutdown);
}

fn classify(message: Message, client_name: &str) -> Option<Inbound> {
    if let Some(event) = message.event.as_deref() {
        let event = match event {
            "property-change" => PlayerEvent::PropertyChange {
                id: message.id?,
                data: message.data,
            },
            "video-reconfig" => PlayerEvent::VideoReconfig,
            "seek" => PlayerEvent::Seek,
            "client-message" => {
                let mut args = message.args;
                // `script-message-to <client> ...` style addressing
                if args.first().is_some_and(|a| a == client_name) {
                    args.remove(0);
                }
                PlayerEvent::ClientMessage(args)
            }
            "shutdown" => PlayerEvent::Shutdown,
            other => {
                debug!("ignoring event {other} ({:?})", message.name);
                return None;
            }
        };
        return Some(Inbound::Event(event));
    }

    let request_id = message.request_id?;
    let result = match message.error.as_deref() {
        None | Some("success") => Ok(message.data),
        Some(error) => Err(error.to_string()),
    };

    if request_id >= SCREENSHOT_ID_BASE {
        let request_id = request_id - SCREENSHOT_ID_BASE;
        let path = screenshot_path(request_id);
        let result = match result {
            Ok(_) => load_frame(&path),
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                Err(e)
            }
        };
        return Some(Inbound::Event(PlayerEvent::CommandReply { request_id, result }));
    }

    Some(Inbound::Reply(Reply { request_id, result }))
}

fn screenshot_path(request_id: u64) -> PathBuf {
    std::env::temp_dir().join(format!(
        "mpv-notify-osd-{}-{request_id}.png",
        std::process::id()
    ))
}

/// Decode and remove a screenshot file.
fn load_frame(path: &Path) -> std::result::Result<FrameReply, String> {
    let decoded = image::open(path);
    let _ = std::fs::remove_file(path);
    let image = decoded
        .map_err(|e| format!("failed to decode {}: {e}", path.display()))?
        .into_rgba8();

    let (w, h) = image.dimensions();
    Ok(FrameReply {
        data: Some(image.into_raw()),
        w: Some(i64::from(w)),
        h: Some(i64::from(h)),
        stride: Some(i64::from(w) * 4),
    })
}
