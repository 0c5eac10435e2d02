//! Driver for the Himax HM01B0 monochrome image sensor.
//!
//! The HM01B0 exposes two hardware interfaces and this driver needs both:
//!
//! - a control bus (standard-mode I2C, 16-bit register addresses) for
//!   configuration, handled through [`embedded_hal::blocking::i2c`] traits;
//! - a parallel pixel interface (vsync, href, pclk and an 8-bit data bus)
//!   for frame readout, handled through the [`PixelPort`] trait by polling
//!   GPIO levels, so no camera peripheral is required.
//!
//! Configuration is two-phase: setters stage register writes, and
//! [`Hm01b0::cmd_update`] latches the whole staged group at a frame
//! boundary. A frame size and pixel format must be committed before the
//! first capture.
//!
//! ```no_run
//! # fn demo<I2C, P, D, E>(i2c: I2C, port: P, delay: &mut D) -> Result<(), hm01b0::Error<E>>
//! # where
//! #     I2C: embedded_hal::blocking::i2c::Read<Error = E>
//! #         + embedded_hal::blocking::i2c::Write<Error = E>,
//! #     P: hm01b0::PixelPort,
//! #     D: embedded_hal::blocking::delay::DelayMs<u16>,
//! #     E: core::fmt::Debug,
//! # {
//! use hm01b0::{FrameSize, Hm01b0, Mode, PixelFormat};
//!
//! let mut camera = Hm01b0::new(i2c, port, 12_000_000);
//! camera.init(delay)?;
//! camera.set_frame_size(FrameSize::Qqvga)?;
//! camera.set_pixel_format(PixelFormat::Grayscale)?;
//! camera.cmd_update()?;
//! camera.set_mode(Mode::Streaming, 0)?;
//!
//! let mut frame = [0u8; 160 * 120];
//! camera.read_frame(&mut frame)?;
//! # Ok(())
//! # }
//! ```
//!
//! Every operation takes `&mut self`; the driver is blocking and single
//! context by construction. Long captures can be cancelled at row
//! boundaries through [`CaptureControl`].

#![cfg_attr(not(test), no_std)]

pub mod ae;
pub mod bus;
pub mod config;
pub mod parallel;
pub mod regs;

#[cfg(test)]
pub(crate) mod mock;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Read, Write};
use log::debug;
use thiserror::Error as ThisError;

pub use ae::{AeConfig, ExposureGain};
pub use config::{FrameSize, GainCeiling, Mode, PixelFormat, Preset};
pub use parallel::{CaptureControl, CaptureError, PixelPort, PollBudget, SyncPoint};

use bus::SensorBus;
use regs::Register;

/// Soft-reset polls before giving up on the sensor.
const RESET_RETRIES: u8 = 10;

/// Driver errors. `E` is the control-bus error type.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum Error<E> {
    /// Control-bus write transaction failed.
    #[error("control bus write failed")]
    BusWrite(E),
    /// Control-bus read transaction failed.
    #[error("control bus read failed")]
    BusRead(E),
    /// A setting, numeric input, or buffer size is outside the sensor's
    /// contract.
    #[error("parameter out of range")]
    InvalidParameter,
    /// Capture was requested before a frame size and pixel format were
    /// committed.
    #[error("frame geometry never committed")]
    NotCommitted,
    /// The pixel path stalled or the caller cancelled.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// The identity registers belong to some other device.
    #[error("model id mismatch, read {0:#06x}")]
    ModelMismatch(u16),
    /// The sensor never reported standby after a soft reset.
    #[error("soft reset did not reach standby")]
    ResetTimeout,
    /// Exposure calibration exhausted its frame budget.
    #[error("auto exposure did not converge")]
    AeNotConverged,
}

/// HM01B0 driver over an I2C control bus and a polled pixel port.
pub struct Hm01b0<I2C, P> {
    pub(crate) bus: SensorBus<I2C>,
    pub(crate) port: P,
    pub(crate) xclk_hz: u32,
    pub(crate) budget: PollBudget,
    pub(crate) staged_size: Option<FrameSize>,
    pub(crate) staged_format: Option<PixelFormat>,
    pub(crate) committed: Option<(FrameSize, PixelFormat)>,
}

impl<I2C, P> Hm01b0<I2C, P> {
    /// Wraps the two interfaces. `xclk_hz` is the external clock fed to
    /// the sensor's MCLK pin, needed for exposure arithmetic.
    pub fn new(i2c: I2C, port: P, xclk_hz: u32) -> Self {
        Self {
            bus: SensorBus::new(i2c),
            port,
            xclk_hz,
            budget: PollBudget::default(),
            staged_size: None,
            staged_format: None,
            committed: None,
        }
    }

    /// Releases the bus peripheral and pixel port.
    pub fn free(self) -> (I2C, P) {
        (self.bus.free(), self.port)
    }

    /// Poll budget used by [`read_frame`](Hm01b0::read_frame) and the
    /// calibration loop.
    pub fn set_poll_budget(&mut self, budget: PollBudget) {
        self.budget = budget;
    }

    /// Committed readout geometry, if any.
    pub fn resolution(&self) -> Option<(usize, usize)> {
        let (size, _) = self.committed?;
        Some((size.width(), size.height()))
    }

    /// Committed frame size, if any.
    pub fn frame_size(&self) -> Option<FrameSize> {
        self.committed.map(|(size, _)| size)
    }

    /// Committed pixel format, if any.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.committed.map(|(_, format)| format)
    }

    /// Buffer length one committed frame occupies.
    pub fn frame_bytes(&self) -> Option<usize> {
        let (size, format) = self.committed?;
        Some(size.width() * size.height() * format.bytes_per_pixel()?)
    }
}

impl<I2C, P, E> Hm01b0<I2C, P>
where
    I2C: Read<Error = E> + Write<Error = E>,
{
    /// Brings the sensor to a known state: soft reset, identity check,
    /// baseline register script, commit. Leaves it in standby with QVGA
    /// grayscale committed.
    pub fn init<D: DelayMs<u16>>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.reset(delay)?;
        let id = self.model_id()?;
        if id != regs::MODEL_ID {
            return Err(Error::ModelMismatch(id));
        }
        self.load_settings(Preset::Default)?;
        self.cmd_update()?;
        debug!("hm01b0 up, model {:#06x}", id);
        Ok(())
    }

    /// Soft-resets the sensor and waits for it to report standby. All
    /// staged and committed configuration is lost.
    pub fn reset<D: DelayMs<u16>>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.staged_size = None;
        self.staged_format = None;
        self.committed = None;
        self.bus.write(Register::SW_RESET, 0x00)?;
        for _ in 0..RESET_RETRIES {
            delay.delay_ms(10);
            if self.bus.read(Register::MODE_SELECT)? == regs::MODE_STANDBY {
                return Ok(());
            }
        }
        Err(Error::ResetTimeout)
    }

    /// Reads the 16-bit model id; a live HM01B0 reports [`regs::MODEL_ID`].
    pub fn model_id(&mut self) -> Result<u16, Error<E>> {
        self.bus.read_pair(Register::MODEL_ID_H)
    }

    /// Selects the operating mode. `frame_count` applies only to
    /// [`Mode::StreamingFrames`] and must be nonzero there.
    pub fn set_mode(&mut self, mode: Mode, frame_count: u8) -> Result<(), Error<E>> {
        if matches!(mode, Mode::StreamingFrames) {
            if frame_count == 0 {
                return Err(Error::InvalidParameter);
            }
            self.bus
                .write(Register::PMU_AUTOSLEEP_FRAMECNT, frame_count)?;
        }
        self.bus.write(Register::MODE_SELECT, mode.register_value())
    }

    /// Latches all staged register writes at the next frame boundary and
    /// marks the staged geometry as the active one.
    pub fn cmd_update(&mut self) -> Result<(), Error<E>> {
        self.bus.write(Register::GRP_PARAM_HOLD, 0x01)?;
        if let (Some(size), Some(format)) = (self.staged_size, self.staged_format) {
            self.committed = Some((size, format));
        }
        Ok(())
    }

    /// Raw register read, for tuning beyond the typed API.
    pub fn read_register(&mut self, reg: u16) -> Result<u8, Error<E>> {
        self.bus.read(reg)
    }

    /// Raw register write. Latched with the rest of the staged group at
    /// [`cmd_update`](Hm01b0::cmd_update).
    pub fn write_register(&mut self, reg: u16, value: u8) -> Result<(), Error<E>> {
        self.bus.write(reg, value)
    }
}

impl<I2C, P, E> Hm01b0<I2C, P>
where
    I2C: Read<Error = E> + Write<Error = E>,
    P: PixelPort,
{
    /// Captures one frame into `buf` using the driver's poll budget.
    pub fn read_frame(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
        let ctl = CaptureControl {
            budget: self.budget,
            cancel: None,
        };
        self.read_frame_with(buf, &ctl)
    }

    /// Captures one frame into `buf` in raster order.
    ///
    /// `buf` must hold at least one frame of the committed geometry; only
    /// that prefix is written. The sensor must be streaming (see
    /// [`set_mode`](Hm01b0::set_mode)), otherwise the frame-start wait
    /// times out.
    pub fn read_frame_with(
        &mut self,
        buf: &mut [u8],
        ctl: &CaptureControl<'_>,
    ) -> Result<(), Error<E>> {
        let (size, format) = self.committed.ok_or(Error::NotCommitted)?;
        let bpp = format.bytes_per_pixel().ok_or(Error::InvalidParameter)?;
        let line_bytes = size.width() * bpp;
        let frame_len = line_bytes * size.height();
        if buf.len() < frame_len {
            return Err(Error::InvalidParameter);
        }
        parallel::capture_frame(
            &mut self.port,
            line_bytes,
            size.height(),
            &mut buf[..frame_len],
            ctl,
        )?;
        Ok(())
    }
}
