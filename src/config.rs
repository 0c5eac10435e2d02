//! Enumerated sensor settings and the staging setters.
//!
//! Setters write configuration registers but never touch `GRP_PARAM_HOLD`;
//! nothing takes effect on the sensor until [`Hm01b0::cmd_update`] latches
//! the staged group. That keeps multi-register changes (geometry, exposure)
//! atomic with respect to frame boundaries.
//!
//! [`Hm01b0::cmd_update`]: crate::Hm01b0::cmd_update

use embedded_hal::blocking::i2c::{Read, Write};

use crate::regs::{self, Register};
use crate::{Error, Hm01b0};

/// Host-side interpretation of the pixel stream.
///
/// The HM01B0 is monochrome, so only [`PixelFormat::Grayscale`] and
/// [`PixelFormat::Bayer`] (raw) are accepted by the setter; the remaining
/// variants exist so frame consumers can share one vocabulary across
/// sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 1 bit per pixel, stored one byte per pixel.
    Binary,
    /// 8-bit luminance.
    Grayscale,
    /// 16-bit RGB, two bytes per pixel.
    Rgb565,
    /// YUV 4:2:2, two bytes per pixel.
    Yuv422,
    /// Raw sensor data, one byte per pixel.
    Bayer,
    /// Compressed stream with no fixed pixel size.
    Jpeg,
}

impl PixelFormat {
    /// Bytes per pixel on the parallel bus, `None` for compressed output.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Binary | PixelFormat::Grayscale | PixelFormat::Bayer => Some(1),
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => Some(2),
            PixelFormat::Jpeg => None,
        }
    }
}

/// Readout geometry. The sensor array is 320x320; smaller sizes come from
/// the QVGA window and 2x2 skip-and-bin readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    /// 160x120, binned.
    Qqvga,
    /// 320x240, windowed.
    Qvga,
    /// 320x320, full array.
    Full,
}

impl FrameSize {
    pub fn width(self) -> usize {
        match self {
            FrameSize::Qqvga => 160,
            FrameSize::Qvga | FrameSize::Full => 320,
        }
    }

    pub fn height(self) -> usize {
        match self {
            FrameSize::Qqvga => 120,
            FrameSize::Qvga => 240,
            FrameSize::Full => 320,
        }
    }

    /// 2x2 binning active, which halves the pixel rate and selects the
    /// binned analog gain ceiling.
    pub(crate) fn binned(self) -> bool {
        matches!(self, FrameSize::Qqvga)
    }

    pub(crate) fn table(self) -> &'static [(u16, u8)] {
        match self {
            FrameSize::Qqvga => regs::QQVGA_REGS,
            FrameSize::Qvga => regs::QVGA_REGS,
            FrameSize::Full => regs::FULL_REGS,
        }
    }
}

/// Upper bound for the analog gain stage, in linear steps of 2x.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainCeiling {
    X2,
    X4,
    X8,
    X16,
}

impl GainCeiling {
    /// Register encoding: log2 of the linear ceiling.
    pub(crate) fn steps(self) -> u8 {
        match self {
            GainCeiling::X2 => 1,
            GainCeiling::X4 => 2,
            GainCeiling::X8 => 3,
            GainCeiling::X16 => 4,
        }
    }
}

/// Named register scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Baseline bring-up: corrections on, on-chip AE on, QVGA grayscale.
    Default,
    /// Walking-ones test pattern for pin-level bring-up.
    Walking1s,
    /// Alternate vendor script with fixed exposure and on-chip AE off.
    Alternate,
}

impl Preset {
    pub(crate) fn table(self) -> &'static [(u16, u8)] {
        match self {
            Preset::Default => regs::DEFAULT_REGS,
            Preset::Walking1s => regs::WALKING1S_REGS,
            Preset::Alternate => regs::ALTERNATE_REGS,
        }
    }
}

/// `MODE_SELECT` operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Registers accessible, no readout.
    Standby,
    /// Continuous streaming.
    Streaming,
    /// Stream a fixed number of frames, then sleep until the next I2C
    /// wake-up.
    StreamingFrames,
    /// One frame per hardware trigger pulse.
    StreamingTrigger,
}

impl Mode {
    pub(crate) fn register_value(self) -> u8 {
        match self {
            Mode::Standby => regs::MODE_STANDBY,
            Mode::Streaming => regs::MODE_STREAMING,
            Mode::StreamingFrames => regs::MODE_STREAMING_NFRAMES,
            Mode::StreamingTrigger => regs::MODE_STREAMING_TRIG,
        }
    }
}

impl<I2C, P, E> Hm01b0<I2C, P>
where
    I2C: Read<Error = E> + Write<Error = E>,
{
    /// Stages the host-side pixel format. Color formats are rejected on
    /// this monochrome sensor.
    pub fn set_pixel_format(&mut self, format: PixelFormat) -> Result<(), Error<E>> {
        match format {
            PixelFormat::Grayscale | PixelFormat::Bayer => {
                self.staged_format = Some(format);
                Ok(())
            }
            _ => Err(Error::InvalidParameter),
        }
    }

    /// Stages a readout geometry.
    pub fn set_frame_size(&mut self, size: FrameSize) -> Result<(), Error<E>> {
        self.bus.apply(size.table())?;
        self.staged_size = Some(size);
        Ok(())
    }

    /// Stages a nominal frame rate by reprogramming the clock divisor.
    /// Accepts 15, 30, 60, or 120 fps; 120 selects the fastest divisor the
    /// staged geometry supports.
    pub fn set_frame_rate(&mut self, fps: u8) -> Result<(), Error<E>> {
        let full_rate = !self.staged_size.is_some_and(FrameSize::binned);
        let div = match (fps, full_rate) {
            (15, true) => 0x01,
            (15, false) => 0x00,
            (30, true) => 0x02,
            (30, false) => 0x01,
            (60, true) => 0x03,
            (60, false) => 0x02,
            (120, _) => 0x03,
            _ => return Err(Error::InvalidParameter),
        };
        // Bit 3 keeps the pixel clock gated outside valid data.
        self.bus.write(Register::OSC_CLK_DIV, 0x08 | div)
    }

    /// Stages an exposure bias by moving the AE target mean. Levels 0..=4,
    /// 2 is the vendor baseline.
    pub fn set_brightness(&mut self, level: u8) -> Result<(), Error<E>> {
        const TARGETS: [u8; 5] = [0x28, 0x46, 0x64, 0x82, 0xA0];
        let target = *TARGETS
            .get(usize::from(level))
            .ok_or(Error::InvalidParameter)?;
        self.bus.write(Register::AE_TARGET_MEAN, target)
    }

    /// Stages the analog gain ceiling for both full and binned readout.
    pub fn set_gain_ceiling(&mut self, ceiling: GainCeiling) -> Result<(), Error<E>> {
        self.bus.write(Register::MAX_AGAIN_FULL, ceiling.steps())?;
        self.bus.write(Register::MAX_AGAIN_BIN2, ceiling.steps())
    }

    /// Stages the color-bar test pattern on or off.
    pub fn set_colorbar(&mut self, enable: bool) -> Result<(), Error<E>> {
        let value = if enable { 0x01 } else { 0x00 };
        self.bus.write(Register::TEST_PATTERN_MODE, value)
    }

    /// Stages horizontal mirroring.
    pub fn set_mirror(&mut self, enable: bool) -> Result<(), Error<E>> {
        self.bus.modify(Register::IMG_ORIENTATION, |v| {
            if enable {
                v | 0x01
            } else {
                v & !0x01
            }
        })
    }

    /// Stages vertical flip.
    pub fn set_flip(&mut self, enable: bool) -> Result<(), Error<E>> {
        self.bus.modify(Register::IMG_ORIENTATION, |v| {
            if enable {
                v | 0x02
            } else {
                v & !0x02
            }
        })
    }

    /// Applies a named register script. `Default` and `Alternate` configure
    /// QVGA grayscale readout, so they stage that geometry as well.
    pub fn load_settings(&mut self, preset: Preset) -> Result<(), Error<E>> {
        self.bus.apply(preset.table())?;
        if matches!(preset, Preset::Default | Preset::Alternate) {
            self.staged_size = Some(FrameSize::Qvga);
            self.staged_format = Some(PixelFormat::Grayscale);
        }
        Ok(())
    }
}
