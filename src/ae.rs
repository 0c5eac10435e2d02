//! Exposure and gain control, including the software auto-exposure loop.
//!
//! The sensor has an on-chip AE engine, but its convergence is opaque and
//! its statistics window is fixed. [`Hm01b0::calibrate_auto_exposure`]
//! instead disables the on-chip engine and runs a measured loop on the
//! host: capture, average, correct the integration time proportionally,
//! and spill into analog then digital gain once integration saturates.

use embedded_hal::blocking::i2c::{Read, Write};
use log::{debug, trace, warn};

use crate::config::Mode;
use crate::parallel::{self, CaptureControl};
use crate::regs::Register;
use crate::{Error, Hm01b0};

/// Shortest integration the sensor accepts, in lines.
const MIN_INTEGRATION_LINES: u16 = 2;

/// Per-iteration bound on the exposure correction ratio. Larger errors are
/// walked over several frames to avoid oscillating around the target.
const RATIO_MIN: f32 = 0.125;
const RATIO_MAX: f32 = 8.0;

/// One analog gain step doubles the signal: 20*log10(2) dB.
const DB_PER_STEP: f32 = 20.0 * core::f32::consts::LOG10_2;

/// Digital gain of 1.0x in the sensor's 8.8 fixed-point register pair.
const DGAIN_UNITY: u16 = 0x0100;

/// Auto-exposure parameters and the last measured frame mean.
///
/// Defaults match the vendor baseline script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AeConfig {
    /// Luminance the loop steers toward.
    pub target_mean: u8,
    /// Lowest mean the on-chip engine accepts before forcing gain.
    pub min_mean: u8,
    /// Half-width of the band that counts as converged.
    pub converge_in_th: u8,
    /// Hysteresis band for leaving the converged state (on-chip engine).
    pub converge_out_th: u8,
    /// Mean of the last analyzed frame, updated by the calibration loop.
    pub mean: u8,
}

impl Default for AeConfig {
    fn default() -> Self {
        Self {
            target_mean: 0x64,
            min_mean: 0x0A,
            converge_in_th: 0x03,
            converge_out_th: 0x05,
            mean: 0,
        }
    }
}

/// Exposure-related register state, always read back from the sensor
/// rather than cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureGain {
    /// Integration time in line periods.
    pub integration_lines: u16,
    /// Analog gain stage, log2 of the linear gain.
    pub analog_gain_steps: u8,
    /// Digital gain, 8.8 fixed point (0x0100 = 1.0x).
    pub digital_gain: u16,
}

/// Sensor bounds the correction planner must respect.
#[derive(Debug, Clone, Copy)]
struct GainLimits {
    max_integration: u16,
    max_analog_steps: u8,
    max_digital: u16,
}

/// Plans the next exposure state from one frame measurement.
///
/// Integration absorbs as much of the correction as it can; only when it
/// pins at a bound does the residual move into gain, analog stage first,
/// digital remainder second.
fn plan_adjustment(
    current: &ExposureGain,
    mean: u8,
    target: u8,
    limits: &GainLimits,
) -> ExposureGain {
    let ratio = (f32::from(target) / f32::from(mean.max(1))).clamp(RATIO_MIN, RATIO_MAX);
    let ideal = f32::from(current.integration_lines) * ratio;
    let applied = libm::roundf(ideal).clamp(
        f32::from(MIN_INTEGRATION_LINES),
        f32::from(limits.max_integration),
    ) as u16;

    let mut next = ExposureGain {
        integration_lines: applied,
        ..*current
    };

    let pinned_high = applied == limits.max_integration && ideal > f32::from(applied);
    let pinned_low = applied == MIN_INTEGRATION_LINES && ideal < f32::from(applied);
    if pinned_high || pinned_low {
        let residual = ideal / f32::from(applied);
        let current_gain = f32::from(1u16 << current.analog_gain_steps)
            * (f32::from(current.digital_gain) / 256.0);
        let max_gain = f32::from(1u16 << limits.max_analog_steps)
            * (f32::from(limits.max_digital) / 256.0);
        let desired = (current_gain * residual).clamp(1.0, max_gain);
        // Largest analog stage not exceeding the desired gain, so digital
        // gain only ever covers the sub-2x remainder.
        let steps = libm::floorf(libm::log2f(desired)).max(0.0) as u8;
        let steps = steps.min(limits.max_analog_steps);
        let digital = libm::roundf(desired / f32::from(1u16 << steps) * 256.0)
            .clamp(f32::from(DGAIN_UNITY), f32::from(limits.max_digital))
            as u16;
        next.analog_gain_steps = steps;
        next.digital_gain = digital;
    }
    next
}

fn frame_mean(frame: &[u8]) -> u8 {
    let sum: u64 = frame.iter().map(|&p| u64::from(p)).sum();
    (sum / frame.len() as u64) as u8
}

impl<I2C, P, E> Hm01b0<I2C, P>
where
    I2C: Read<Error = E> + Write<Error = E>,
{
    /// Reads the current integration time and gain stages.
    pub fn exposure_gain(&mut self) -> Result<ExposureGain, Error<E>> {
        Ok(ExposureGain {
            integration_lines: self.bus.read_pair(Register::INTEGRATION_H)?,
            analog_gain_steps: self.bus.read(Register::ANALOG_GAIN)? >> 4,
            digital_gain: self.bus.read_pair(Register::DIGITAL_GAIN_H)?,
        })
    }

    /// Stages an explicit exposure state. Takes effect at the next
    /// [`cmd_update`](Hm01b0::cmd_update).
    pub fn apply_exposure_gain(&mut self, state: &ExposureGain) -> Result<(), Error<E>> {
        self.bus
            .write_pair(Register::INTEGRATION_H, state.integration_lines)?;
        self.bus
            .write(Register::ANALOG_GAIN, (state.analog_gain_steps & 0x07) << 4)?;
        self.bus
            .write_pair(Register::DIGITAL_GAIN_H, state.digital_gain)
    }

    /// Reads the AE parameters and the sensor's measured frame mean.
    pub fn ae_config(&mut self) -> Result<AeConfig, Error<E>> {
        Ok(AeConfig {
            target_mean: self.bus.read(Register::AE_TARGET_MEAN)?,
            min_mean: self.bus.read(Register::AE_MIN_MEAN)?,
            converge_in_th: self.bus.read(Register::CONVERGE_IN_TH)?,
            converge_out_th: self.bus.read(Register::CONVERGE_OUT_TH)?,
            mean: self.bus.read(Register::AE_MEAN)?,
        })
    }

    /// Stages the AE parameter registers; the measured mean is read-only.
    pub fn set_ae_config(&mut self, cfg: &AeConfig) -> Result<(), Error<E>> {
        self.bus.write(Register::AE_TARGET_MEAN, cfg.target_mean)?;
        self.bus.write(Register::AE_MIN_MEAN, cfg.min_mean)?;
        self.bus.write(Register::CONVERGE_IN_TH, cfg.converge_in_th)?;
        self.bus.write(Register::CONVERGE_OUT_TH, cfg.converge_out_th)
    }

    /// Enables the on-chip AE with a gain ceiling, or disables it and
    /// programs a fixed analog gain. Gains are in dB, clamped to 0..=24.
    pub fn set_auto_gain(
        &mut self,
        enable: bool,
        gain_db: f32,
        ceiling_db: f32,
    ) -> Result<(), Error<E>> {
        if enable {
            if !ceiling_db.is_finite() {
                return Err(Error::InvalidParameter);
            }
            let ceiling = db_to_steps(ceiling_db);
            self.bus.write(Register::MAX_AGAIN_FULL, ceiling)?;
            self.bus.write(Register::MAX_AGAIN_BIN2, ceiling)?;
            self.bus.write(Register::AE_CTRL, 0x01)
        } else {
            if !gain_db.is_finite() {
                return Err(Error::InvalidParameter);
            }
            let steps = db_to_steps(gain_db);
            self.bus.write(Register::AE_CTRL, 0x00)?;
            self.bus.write(Register::ANALOG_GAIN, (steps & 0x07) << 4)
        }
    }

    /// Current analog gain in dB, floored to a whole dB like the register
    /// readout it derives from.
    pub fn gain_db(&mut self) -> Result<f32, Error<E>> {
        let steps = self.bus.read(Register::ANALOG_GAIN)? >> 4;
        let linear = f32::from(1u16 << steps);
        Ok(libm::floorf(20.0 * libm::log10f(linear)))
    }

    /// Enables the on-chip AE, or disables it and programs a fixed
    /// exposure in microseconds (clamped to the sensor's line range).
    pub fn set_auto_exposure(&mut self, enable: bool, exposure_us: u32) -> Result<(), Error<E>> {
        if enable {
            return self.bus.write(Register::AE_CTRL, 0x01);
        }
        let line_len = u64::from(self.bus.read_pair(Register::LINE_LEN_PCK_H)?);
        let pclk = u64::from(self.pixel_clock()?);
        if line_len == 0 {
            return Err(Error::InvalidParameter);
        }
        let lines = (u64::from(exposure_us) * pclk / (line_len * 1_000_000))
            .clamp(u64::from(MIN_INTEGRATION_LINES), 0xFFFF) as u16;
        self.bus.write(Register::AE_CTRL, 0x00)?;
        self.bus.write_pair(Register::INTEGRATION_H, lines)
    }

    /// Current exposure in microseconds, derived from the integration time
    /// and line timing.
    pub fn exposure_us(&mut self) -> Result<u32, Error<E>> {
        let lines = u64::from(self.bus.read_pair(Register::INTEGRATION_H)?);
        let line_len = u64::from(self.bus.read_pair(Register::LINE_LEN_PCK_H)?);
        let pclk = u64::from(self.pixel_clock()?);
        if pclk == 0 {
            return Err(Error::InvalidParameter);
        }
        Ok((lines * line_len * 1_000_000 / pclk) as u32)
    }

    /// Pixel clock in Hz: the external clock through the system divisor.
    pub fn pixel_clock(&mut self) -> Result<u32, Error<E>> {
        let div = self.bus.read(Register::OSC_CLK_DIV)? & 0x03;
        Ok(self.xclk_hz / (8 >> div))
    }
}

impl<I2C, P, E> Hm01b0<I2C, P>
where
    I2C: Read<Error = E> + Write<Error = E>,
    P: parallel::PixelPort,
{
    /// Runs the measured auto-exposure loop with the driver's poll budget.
    /// See [`calibrate_auto_exposure_with`](Hm01b0::calibrate_auto_exposure_with).
    pub fn calibrate_auto_exposure(
        &mut self,
        max_frames: u8,
        buf: &mut [u8],
        cfg: &mut AeConfig,
    ) -> Result<u8, Error<E>> {
        let ctl = CaptureControl {
            budget: self.budget,
            cancel: None,
        };
        self.calibrate_auto_exposure_with(max_frames, buf, cfg, &ctl)
    }

    /// Converges exposure on the live scene within `max_frames` captures.
    ///
    /// `buf` is scratch for the analysis frames and must hold one committed
    /// frame. On success returns the number of frames consumed; on budget
    /// exhaustion returns [`Error::AeNotConverged`] (the scene may simply
    /// be beyond the exposure range). Either way `cfg.mean` holds the last
    /// measured mean. Leaves the sensor streaming.
    pub fn calibrate_auto_exposure_with(
        &mut self,
        max_frames: u8,
        buf: &mut [u8],
        cfg: &mut AeConfig,
        ctl: &CaptureControl<'_>,
    ) -> Result<u8, Error<E>> {
        let (size, format) = self.committed.ok_or(Error::NotCommitted)?;
        let bpp = format.bytes_per_pixel().ok_or(Error::InvalidParameter)?;
        let line_bytes = size.width() * bpp;
        let frame_len = line_bytes * size.height();
        if buf.len() < frame_len {
            return Err(Error::InvalidParameter);
        }
        let frame = &mut buf[..frame_len];

        // The loop owns the exposure registers: on-chip AE off, sensor
        // streaming, parameters latched.
        self.set_ae_config(cfg)?;
        self.bus.write(Register::AE_CTRL, 0x00)?;
        self.set_mode(Mode::Streaming, 0)?;
        self.cmd_update()?;

        let limits = GainLimits {
            max_integration: self.bus.read_pair(Register::MAX_INTG_H)?,
            max_analog_steps: if size.binned() {
                self.bus.read(Register::MAX_AGAIN_BIN2)?
            } else {
                self.bus.read(Register::MAX_AGAIN_FULL)?
            },
            // MAX_DGAIN is in 2.6 fixed point; widen to the 8.8 scale of
            // the gain registers.
            max_digital: u16::from(self.bus.read(Register::MAX_DGAIN)?) << 2,
        };

        for frame_no in 0..max_frames {
            if ctl.cancelled() {
                return Err(parallel::CaptureError::Cancelled.into());
            }
            parallel::capture_frame(&mut self.port, line_bytes, size.height(), frame, ctl)?;
            let mean = frame_mean(frame);
            cfg.mean = mean;
            trace!(
                "ae frame {}: mean {} target {}",
                frame_no,
                mean,
                cfg.target_mean
            );
            if mean.abs_diff(cfg.target_mean) <= cfg.converge_in_th {
                debug!("ae converged after {} frames, mean {}", frame_no + 1, mean);
                return Ok(frame_no + 1);
            }
            let current = self.exposure_gain()?;
            let next = plan_adjustment(&current, mean, cfg.target_mean, &limits);
            self.apply_exposure_gain(&next)?;
            self.cmd_update()?;
        }
        warn!(
            "ae gave up after {} frames, last mean {} target {}",
            max_frames, cfg.mean, cfg.target_mean
        );
        Err(Error::AeNotConverged)
    }
}

fn db_to_steps(db: f32) -> u8 {
    libm::ceilf(db.clamp(0.0, 24.0) / DB_PER_STEP) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDE_LIMITS: GainLimits = GainLimits {
        max_integration: 1000,
        max_analog_steps: 4,
        max_digital: 0x0300,
    };

    fn state(integration: u16, steps: u8, digital: u16) -> ExposureGain {
        ExposureGain {
            integration_lines: integration,
            analog_gain_steps: steps,
            digital_gain: digital,
        }
    }

    #[test]
    fn dim_scene_raises_integration_proportionally() {
        let next = plan_adjustment(&state(100, 0, DGAIN_UNITY), 25, 100, &WIDE_LIMITS);
        assert_eq!(next.integration_lines, 400);
        assert_eq!(next.analog_gain_steps, 0);
        assert_eq!(next.digital_gain, DGAIN_UNITY);
    }

    #[test]
    fn correction_ratio_is_clamped() {
        let next = plan_adjustment(&state(100, 0, DGAIN_UNITY), 1, 255, &WIDE_LIMITS);
        assert_eq!(next.integration_lines, 800);
    }

    #[test]
    fn saturated_integration_spills_into_analog_gain() {
        let limits = GainLimits {
            max_integration: 200,
            ..WIDE_LIMITS
        };
        // Needs 4x total; integration already pinned, so gain doubles
        // twice.
        let next = plan_adjustment(&state(200, 0, DGAIN_UNITY), 25, 100, &limits);
        assert_eq!(next.integration_lines, 200);
        assert_eq!(next.analog_gain_steps, 2);
        assert_eq!(next.digital_gain, DGAIN_UNITY);
    }

    #[test]
    fn sub_doubling_residual_lands_in_digital_gain() {
        let limits = GainLimits {
            max_integration: 200,
            ..WIDE_LIMITS
        };
        // 1.5x short: too small for an analog step.
        let next = plan_adjustment(&state(200, 0, DGAIN_UNITY), 66, 99, &limits);
        assert_eq!(next.integration_lines, 200);
        assert_eq!(next.analog_gain_steps, 0);
        assert_eq!(next.digital_gain, 384);
    }

    #[test]
    fn bright_scene_at_floor_sheds_gain() {
        let next = plan_adjustment(&state(2, 2, DGAIN_UNITY), 200, 100, &WIDE_LIMITS);
        assert_eq!(next.integration_lines, MIN_INTEGRATION_LINES);
        assert_eq!(next.analog_gain_steps, 1);
        assert_eq!(next.digital_gain, DGAIN_UNITY);
    }

    #[test]
    fn gain_never_exceeds_ceilings() {
        let limits = GainLimits {
            max_integration: 100,
            max_analog_steps: 2,
            max_digital: 0x0200,
        };
        let next = plan_adjustment(&state(100, 2, 0x0200), 1, 255, &limits);
        assert_eq!(next.analog_gain_steps, 2);
        assert_eq!(next.digital_gain, 0x0200);
    }

    #[test]
    fn db_conversion_matches_gain_steps() {
        assert_eq!(db_to_steps(0.0), 0);
        assert_eq!(db_to_steps(6.0), 1);
        assert_eq!(db_to_steps(12.0), 2);
        // Rounds up to the next whole step.
        assert_eq!(db_to_steps(12.1), 3);
        assert_eq!(db_to_steps(24.0), 4);
        assert_eq!(db_to_steps(99.0), 4);
    }

    #[test]
    fn frame_mean_is_arithmetic() {
        assert_eq!(frame_mean(&[0, 50, 100, 150]), 75);
        assert_eq!(frame_mean(&[255; 16]), 255);
    }
}
