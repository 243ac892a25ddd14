//! Desktop notification OSD for mpv
//!
//! Watches a running player and keeps a single desktop notification in sync
//! with it: title, playback status, chapter, volume and a live thumbnail of
//! the current frame. Bursts of player events are coalesced into one update
//! per batch, and the popup closes itself after a configurable timeout.
//!
//! The pieces, bottom up:
//! - [`props`] and [`options`] hold what the player reported and how the
//!   user configured us
//! - [`text`] turns that into a summary and body
//! - [`thumbnail`] scales screenshots into notification images
//! - [`engine`] decides what to do with each batch of events
//! - [`runner`] drives the engine from a channel of [`player::PlayerEvent`]s

pub mod actions;
#[cfg(all(unix, not(target_os = "macos")))]
pub mod desktop;
pub mod engine;
pub mod error;
#[cfg(unix)]
pub mod ipc;
pub mod notification;
pub mod options;
pub mod player;
pub mod props;
pub mod runner;
pub mod text;
pub mod thumbnail;
pub mod timer;
pub mod util;

pub use engine::{Control, Engine};
pub use error::{Error, Result};
pub use notification::{NotificationServer, NotificationSession};
pub use player::{FrameReply, Player, PlayerEvent};
pub use runner::run_event_loop;
