//! Error types for the notification OSD

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures the decision engine reacts to
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The notification service rejected a call
    #[error("notification service error: {0}")]
    Notification(String),

    /// A screenshot reply was missing data or had unusable dimensions
    #[error("screenshot command returned bad parameters: {0}")]
    MalformedReply(String),

    /// No scaler could be built for the requested geometry
    #[error("cannot scale {src_w}x{src_h} to {dst_w}x{dst_h}")]
    ScalerUnavailable {
        src_w: u32,
        src_h: u32,
        dst_w: u32,
        dst_h: u32,
    },

    /// Output buffer would exceed the D-Bus message limit
    #[error("thumbnail output resolution is too large ({0} bytes)")]
    ImageTooLarge(usize),

    /// IPC transport failure
    #[error("IPC error: {0}")]
    Ipc(#[from] std::io::Error),
}
