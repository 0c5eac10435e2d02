//! Parallel pixel interface: sync-line polling and frame readout.
//!
//! The HM01B0 streams one byte per pixel clock over an 8-bit bus, framed by
//! a frame-valid (vsync) and a line-valid (href) signal. This module drives
//! those three lines by polling, so it works on boards without a camera
//! peripheral. Every wait is bounded by a poll budget; a dead or miswired
//! line surfaces as [`CaptureError::Timeout`] instead of a hang.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Sync and data lines of the pixel interface.
///
/// Implementations read GPIO levels. On most boards each method is a single
/// volatile port read; `data` samples all eight data pins in one access so
/// the byte is coherent with the pixel clock edge that latched it.
pub trait PixelPort {
    /// Frame-valid level.
    fn vsync(&mut self) -> bool;
    /// Line-valid level.
    fn href(&mut self) -> bool;
    /// Pixel clock level.
    fn pclk(&mut self) -> bool;
    /// Current byte on the data bus.
    fn data(&mut self) -> u8;
}

/// Which wait of the capture state machine starved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPoint {
    FrameStart,
    LineStart,
    PixelClock,
    LineEnd,
}

impl fmt::Display for SyncPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncPoint::FrameStart => "frame start",
            SyncPoint::LineStart => "line start",
            SyncPoint::PixelClock => "pixel clock",
            SyncPoint::LineEnd => "line end",
        })
    }
}

/// Pixel-path failures, independent of the control bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// A sync-line wait exhausted its poll budget.
    #[error("capture timed out waiting for {0}")]
    Timeout(SyncPoint),
    /// The cancel flag was observed at a row boundary.
    #[error("capture cancelled")]
    Cancelled,
}

/// Maximum poll iterations per wait.
///
/// The defaults are sized for a 12 MHz pixel clock polled from a
/// ~100 MHz core; they cover several frame periods of slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Waits for the frame-valid edge (one full frame period may pass).
    pub frame_start: u32,
    /// Waits for line-valid to rise or fall.
    pub line: u32,
    /// Waits for a pixel clock edge.
    pub pixel: u32,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            frame_start: 5_000_000,
            line: 500_000,
            pixel: 50_000,
        }
    }
}

/// Per-capture knobs: poll budget plus an optional cancel flag shared with
/// another execution context.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureControl<'a> {
    pub budget: PollBudget,
    pub cancel: Option<&'a AtomicBool>,
}

impl CaptureControl<'_> {
    pub fn cancelled(&self) -> bool {
        self.cancel.map_or(false, |flag| flag.load(Ordering::Relaxed))
    }
}

/// Reads one frame of `rows` lines, `line_bytes` bytes each, into `buf`.
///
/// Synchronizes to a frame boundary first: if frame-valid is already high
/// the current partial frame is waited out, so the first sampled byte is
/// always pixel (0, 0). The caller guarantees `buf` holds a full frame.
pub(crate) fn capture_frame<P: PixelPort>(
    port: &mut P,
    line_bytes: usize,
    rows: usize,
    buf: &mut [u8],
    ctl: &CaptureControl<'_>,
) -> Result<(), CaptureError> {
    debug_assert!(buf.len() >= line_bytes * rows);

    wait(port, ctl.budget.frame_start, SyncPoint::FrameStart, |p| {
        !p.vsync()
    })?;
    wait(port, ctl.budget.frame_start, SyncPoint::FrameStart, |p| {
        p.vsync()
    })?;

    for (row, line) in buf.chunks_exact_mut(line_bytes).take(rows).enumerate() {
        if row > 0 && ctl.cancelled() {
            return Err(CaptureError::Cancelled);
        }
        wait(port, ctl.budget.line, SyncPoint::LineStart, |p| p.href())?;
        for byte in line.iter_mut() {
            wait(port, ctl.budget.pixel, SyncPoint::PixelClock, |p| p.pclk())?;
            *byte = port.data();
            wait(port, ctl.budget.pixel, SyncPoint::PixelClock, |p| {
                !p.pclk()
            })?;
        }
        wait(port, ctl.budget.line, SyncPoint::LineEnd, |p| !p.href())?;
    }
    Ok(())
}

fn wait<P, F>(
    port: &mut P,
    budget: u32,
    point: SyncPoint,
    mut done: F,
) -> Result<(), CaptureError>
where
    P: PixelPort,
    F: FnMut(&mut P) -> bool,
{
    for _ in 0..budget {
        if done(port) {
            return Ok(());
        }
    }
    Err(CaptureError::Timeout(point))
}
