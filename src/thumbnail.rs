//! Thumbnail pipeline
//!
//! Screenshots arrive as packed RGBA frames of arbitrary size. A
//! [`ThumbnailContext`] is built once per source geometry and scaling setup;
//! it owns the output buffer handed to the notification and, when scaling,
//! a cached [`Scaler`]. Frames of the same size reuse both.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use log::{debug, info};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::options::ScalingAlgorithm;
use crate::player::FrameReply;

/// D-Bus caps messages at 128 MiB; leave room for the rest of the message.
pub const MAX_IMAGE_SIZE: usize = 127 * 1024 * 1024;

/// Frames are always requested as 8-bit RGBA
pub const BYTES_PER_PIXEL: usize = 4;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A validated screenshot
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Check that a reply carries pixel data, size and stride, and that the
    /// data actually covers the described image.
    pub fn from_reply(reply: FrameReply) -> Result<Self> {
        let data = reply
            .data
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::MalformedReply("missing pixel data".into()))?;
        let width = positive(reply.w, "w")?;
        let height = positive(reply.h, "h")?;
        let stride = positive(reply.stride, "stride")?;

        let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Err(Error::MalformedReply(format!("size {width}x{height}"))),
        };
        let stride = usize::try_from(stride)
            .map_err(|_| Error::MalformedReply(format!("stride {stride}")))?;

        let row = width as usize * BYTES_PER_PIXEL;
        if stride < row {
            return Err(Error::MalformedReply(format!(
                "stride {stride} shorter than row of {row} bytes"
            )));
        }
        let needed = stride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(row))
            .unwrap_or(usize::MAX);
        if data.len() < needed {
            return Err(Error::MalformedReply(format!(
                "{} bytes of data, {needed} needed",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width as usize * BYTES_PER_PIXEL]
    }
}

fn positive(value: Option<i64>, field: &str) -> Result<i64> {
    match value {
        Some(v) if v > 0 => Ok(v),
        Some(v) => Err(Error::MalformedReply(format!("{field}={v}"))),
        None => Err(Error::MalformedReply(format!("missing {field}"))),
    }
}

/// Borrowed view of the finished thumbnail
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: &'a [u8],
}

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Option values that shape the thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleSettings {
    /// Bounding box edge in pixels
    pub target: u32,
    pub algorithm: ScalingAlgorithm,
    /// Send frames at source resolution
    pub disabled: bool,
}

/// Output size for a source frame.
///
/// Scaling keeps the aspect ratio and fits the frame inside a
/// `target`x`target` box; neither edge ever drops below one pixel.
pub fn destination_size(src_w: u32, src_h: u32, settings: &ScaleSettings) -> (u32, u32) {
    if settings.disabled {
        return (src_w, src_h);
    }

    let target = f64::from(settings.target);
    let ratio = (target / f64::from(src_w)).min(target / f64::from(src_h));
    let scale = |edge: u32| {
        let scaled = (f64::from(edge) * ratio).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = scaled.min(f64::from(u32::MAX)) as u32;
        scaled.max(1)
    };
    (scale(src_w), scale(src_h))
}

/// Identity of a context: rebuilt whenever any of this changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextKey {
    pub src_w: u32,
    pub src_h: u32,
    pub settings: ScaleSettings,
}

// ---------------------------------------------------------------------------
// Scaler
// ---------------------------------------------------------------------------

fn filter_for(algorithm: ScalingAlgorithm) -> FilterType {
    match algorithm {
        ScalingAlgorithm::FastBilinear | ScalingAlgorithm::Bilinear => FilterType::Triangle,
        ScalingAlgorithm::Bicubic => FilterType::CatmullRom,
        ScalingAlgorithm::Lanczos => FilterType::Lanczos3,
    }
}

/// Resampler for one source/destination geometry
pub struct Scaler {
    filter: FilterType,
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    /// Rows copied out of padded frames
    packed: Vec<u8>,
}

impl Scaler {
    pub fn new(algorithm: ScalingAlgorithm, src: (u32, u32), dst: (u32, u32)) -> Result<Self> {
        let (src_w, src_h) = src;
        let (dst_w, dst_h) = dst;
        if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
            return Err(Error::ScalerUnavailable {
                src_w,
                src_h,
                dst_w,
                dst_h,
            });
        }

        Ok(Self {
            filter: filter_for(algorithm),
            src_w,
            src_h,
            dst_w,
            dst_h,
            packed: Vec::new(),
        })
    }

    /// Resample `frame` into `out`, which holds `dst_w * dst_h` packed pixels.
    fn scale(&mut self, frame: &RawFrame, out: &mut [u8]) -> Result<()> {
        let row = self.src_w as usize * BYTES_PER_PIXEL;
        let rows = self.src_h as usize;

        let pixels: &[u8] = if frame.stride == row {
            &frame.data[..row * rows]
        } else {
            self.packed.clear();
            for y in 0..rows {
                self.packed.extend_from_slice(frame.row(y));
            }
            &self.packed
        };

        let unavailable = || Error::ScalerUnavailable {
            src_w: self.src_w,
            src_h: self.src_h,
            dst_w: self.dst_w,
            dst_h: self.dst_h,
        };

        let source = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(self.src_w, self.src_h, pixels)
            .ok_or_else(unavailable)?;
        let resized = imageops::resize(&source, self.dst_w, self.dst_h, self.filter);
        if resized.as_raw().len() != out.len() {
            return Err(unavailable());
        }
        out.copy_from_slice(resized.as_raw());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Sizing, scaler and output buffer for one source geometry
pub struct ThumbnailContext {
    key: ContextKey,
    dst_w: u32,
    dst_h: u32,
    dst_stride: usize,
    pixels: Vec<u8>,
    scaler: Option<Scaler>,
}

impl ThumbnailContext {
    pub fn new(key: ContextKey) -> Result<Self> {
        let (dst_w, dst_h) = destination_size(key.src_w, key.src_h, &key.settings);
        let dst_stride = dst_w as usize * BYTES_PER_PIXEL;

        let scaler = if key.settings.disabled {
            None
        } else {
            Some(Scaler::new(
                key.settings.algorithm,
                (key.src_w, key.src_h),
                (dst_w, dst_h),
            )?)
        };

        let size = dst_stride.checked_mul(dst_h as usize).unwrap_or(usize::MAX);
        if size > MAX_IMAGE_SIZE {
            return Err(Error::ImageTooLarge(size));
        }

        info!(
            "configured thumbnail context {}x{} -> {dst_w}x{dst_h}",
            key.src_w, key.src_h
        );

        Ok(Self {
            key,
            dst_w,
            dst_h,
            dst_stride,
            pixels: vec![0; size],
            scaler,
        })
    }

    pub fn key(&self) -> ContextKey {
        self.key
    }

    pub fn is_scaling(&self) -> bool {
        self.scaler.is_some()
    }

    /// Convert one frame of this context's source size into the output buffer.
    pub fn process(&mut self, frame: &RawFrame) -> Result<()> {
        if let Some(scaler) = self.scaler.as_mut() {
            return scaler.scale(frame, &mut self.pixels);
        }

        // same size, but the source may pad its rows
        for (y, dst) in self.pixels.chunks_exact_mut(self.dst_stride).enumerate() {
            dst.copy_from_slice(frame.row(y));
        }
        Ok(())
    }

    pub fn image(&self) -> ImageView<'_> {
        ImageView {
            width: self.dst_w,
            height: self.dst_h,
            stride: self.dst_stride,
            data: &self.pixels,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// What happened to an accepted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Written into the current context; `rebuilt` if that context is new
    Processed { rebuilt: bool },
    /// Dropped because this geometry already failed to build
    Skipped,
}

/// Thumbnail enablement, the in-flight screenshot and the current context
#[derive(Default)]
pub struct ThumbnailPipeline {
    enabled: bool,
    ctx: Option<ThumbnailContext>,
    failed: Option<ContextKey>,
    pending: Option<u64>,
    last_request: u64,
    builds: u64,
    last_process: Duration,
}

impl ThumbnailPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `true` if the state changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    /// Drop the context and forget failed geometries.
    ///
    /// Returns `true` if a context existed.
    pub fn teardown(&mut self) -> bool {
        self.failed = None;
        let existed = self.ctx.take().is_some();
        if existed {
            info!("destroyed thumbnail context");
        }
        existed
    }

    pub fn has_context(&self) -> bool {
        self.ctx.is_some()
    }

    pub fn context(&self) -> Option<&ThumbnailContext> {
        self.ctx.as_ref()
    }

    pub fn image(&self) -> Option<ImageView<'_>> {
        self.ctx.as_ref().map(ThumbnailContext::image)
    }

    /// Number of contexts built so far
    pub fn builds(&self) -> u64 {
        self.builds
    }

    pub fn last_process_time(&self) -> Duration {
        self.last_process
    }

    pub fn is_request_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Allocate the id for a new screenshot request, abandoning any
    /// outstanding one: its reply will no longer match.
    pub fn next_request(&mut self) -> u64 {
        if let Some(old) = self.pending.take() {
            debug!("abandoning screenshot request {old}");
        }
        self.last_request += 1;
        self.last_request
    }

    /// Record that request `id` was sent.
    pub fn mark_pending(&mut self, id: u64) {
        self.pending = Some(id);
    }

    /// Claim the reply for `id`; `false` for stale or unknown replies.
    pub fn take_reply(&mut self, id: u64) -> bool {
        if self.pending == Some(id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Convert a frame, (re)building the context when its geometry or
    /// settings differ from the current one.
    ///
    /// A geometry whose context cannot be built is remembered and its frames
    /// are skipped until [`teardown`](Self::teardown).
    pub fn accept(&mut self, frame: &RawFrame, settings: ScaleSettings) -> Result<FrameOutcome> {
        let key = ContextKey {
            src_w: frame.width,
            src_h: frame.height,
            settings,
        };

        if self.failed == Some(key) {
            return Ok(FrameOutcome::Skipped);
        }

        let mut rebuilt = false;
        if self.ctx.as_ref().map(ThumbnailContext::key) != Some(key) {
            self.teardown();
            match ThumbnailContext::new(key) {
                Ok(ctx) => {
                    self.ctx = Some(ctx);
                    self.builds += 1;
                    rebuilt = true;
                }
                Err(e) => {
                    self.failed = Some(key);
                    return Err(e);
                }
            }
        }

        let Some(ctx) = self.ctx.as_mut() else {
            return Ok(FrameOutcome::Skipped);
        };
        let start = Instant::now();
        ctx.process(frame)?;
        self.last_process = start.elapsed();

        Ok(FrameOutcome::Processed { rebuilt })
    }
}
