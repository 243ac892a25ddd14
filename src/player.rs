//! Playback engine seam
//!
//! The decision engine talks to the player only through [`Player`] and only
//! learns about it through [`PlayerEvent`]s, delivered one at a time and in
//! order by whatever transport is in use.

use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;

/// Screenshot command result; fields are optional because the player may
/// omit any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReply {
    pub data: Option<Vec<u8>>,
    pub w: Option<i64>,
    pub h: Option<i64>,
    pub stride: Option<i64>,
}

/// Inbound notifications from the player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// An observed property changed; `None` means it became unavailable
    PropertyChange { id: u64, data: Option<Value> },
    /// Video output was reconfigured (new file, new track, filter change)
    VideoReconfig,
    Seek,
    /// Completion of an asynchronous command
    CommandReply {
        request_id: u64,
        result: std::result::Result<FrameReply, String>,
    },
    /// `script-message` arguments addressed to this client
    ClientMessage(Vec<String>),
    Shutdown,
}

/// Outbound calls into the player
pub trait Player {
    fn observe_property(&mut self, id: u64, name: &str) -> Result<()>;

    fn unobserve_property(&mut self, id: u64) -> Result<()>;

    /// Start an asynchronous RGBA screenshot; the result arrives later as a
    /// [`PlayerEvent::CommandReply`] carrying `request_id`.
    fn request_screenshot(&mut self, request_id: u64, flags: &str) -> Result<()>;

    /// Human readable rendering of a property, `None` if unavailable
    fn osd_string(&mut self, name: &str) -> Option<String>;

    /// Current raw value of a property
    fn get_property(&mut self, name: &str) -> Option<Value>;

    /// Resolve a player path such as `~~home/...`
    fn expand_path(&mut self, path: &str) -> Option<PathBuf>;
}
