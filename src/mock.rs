//! Test doubles: a scripted register file behind the control bus and a
//! waveform generator behind the pixel port.
//!
//! `MockI2c` and `MockPort` can share one [`SensorState`], which closes
//! the loop for exposure tests: gain and integration registers written
//! over the mock bus change the luminance of the frames the mock port
//! serves.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Read, Write};

use crate::bus::BUS_ADDRESS;
use crate::parallel::{PixelPort, SyncPoint};
use crate::regs::Register;

/// Error type carried by the mock bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

/// Shared register file with the side effects the driver relies on.
pub struct SensorState {
    regs: BTreeMap<u16, u8>,
    ignore_reset: bool,
    resets: u32,
}

impl SensorState {
    fn new() -> Self {
        let mut regs = BTreeMap::new();
        // Power-on identity and conservative timing defaults.
        regs.insert(Register::MODEL_ID_H, 0x01);
        regs.insert(Register::MODEL_ID_L, 0xB0);
        regs.insert(Register::INTEGRATION_H, 0x01);
        regs.insert(Register::INTEGRATION_L, 0x08);
        regs.insert(Register::DIGITAL_GAIN_H, 0x01);
        regs.insert(Register::FRAME_LEN_LINES_H, 0x01);
        regs.insert(Register::FRAME_LEN_LINES_L, 0x58);
        regs.insert(Register::LINE_LEN_PCK_H, 0x01);
        regs.insert(Register::LINE_LEN_PCK_L, 0x78);
        regs.insert(Register::MAX_INTG_H, 0x01);
        regs.insert(Register::MAX_INTG_L, 0x54);
        regs.insert(Register::MAX_AGAIN_BIN2, 0x04);
        regs.insert(Register::MAX_DGAIN, 0xC0);
        Self {
            regs,
            ignore_reset: false,
            resets: 0,
        }
    }

    pub fn reg(&self, addr: u16) -> u8 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    pub fn set_reg(&mut self, addr: u16, value: u8) {
        self.regs.insert(addr, value);
    }

    /// Soft resets no longer bring the sensor back to standby.
    pub fn ignore_reset(&mut self) {
        self.ignore_reset = true;
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    fn bus_write(&mut self, addr: u16, value: u8) {
        if addr == Register::SW_RESET {
            self.resets += 1;
            if !self.ignore_reset {
                self.regs.insert(Register::MODE_SELECT, 0x00);
            }
            return;
        }
        self.regs.insert(addr, value);
    }

    fn exposure_luma(&self, gain: f32) -> u8 {
        let integration = u16::from_be_bytes([
            self.reg(Register::INTEGRATION_H),
            self.reg(Register::INTEGRATION_L),
        ]);
        let analog = 1u32 << (self.reg(Register::ANALOG_GAIN) >> 4);
        let digital = f32::from(u16::from_be_bytes([
            self.reg(Register::DIGITAL_GAIN_H),
            self.reg(Register::DIGITAL_GAIN_L),
        ])) / 256.0;
        let luma = gain * f32::from(integration) * analog as f32 * digital;
        luma.round().clamp(0.0, 255.0) as u8
    }
}

/// I2C double that decodes the sensor's framing: a two-byte write latches
/// a read address, a three-byte write sets a register.
pub struct MockI2c {
    state: Rc<RefCell<SensorState>>,
    log: Rc<RefCell<Vec<(u16, u8)>>>,
    latched: u16,
    fail_write: bool,
    fail_read: bool,
}

impl MockI2c {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SensorState::new())),
            log: Rc::new(RefCell::new(Vec::new())),
            latched: 0,
            fail_write: false,
            fail_read: false,
        }
    }

    /// Handle on the register file, shared with ports built by
    /// [`MockPort::tracking`].
    pub fn state(&self) -> Rc<RefCell<SensorState>> {
        Rc::clone(&self.state)
    }

    /// Every register write in order, as `(address, value)`.
    pub fn write_log(&self) -> Rc<RefCell<Vec<(u16, u8)>>> {
        Rc::clone(&self.log)
    }

    pub fn fail_writes(&mut self) {
        self.fail_write = true;
    }

    pub fn fail_reads(&mut self) {
        self.fail_read = true;
    }
}

impl Write for MockI2c {
    type Error = BusFault;

    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), BusFault> {
        assert_eq!(addr, BUS_ADDRESS, "unexpected bus address");
        if self.fail_write {
            return Err(BusFault);
        }
        match *bytes {
            [hi, lo] => self.latched = u16::from_be_bytes([hi, lo]),
            [hi, lo, value] => {
                let reg = u16::from_be_bytes([hi, lo]);
                self.log.borrow_mut().push((reg, value));
                self.state.borrow_mut().bus_write(reg, value);
            }
            _ => panic!("control frame of {} bytes", bytes.len()),
        }
        Ok(())
    }
}

impl Read for MockI2c {
    type Error = BusFault;

    fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), BusFault> {
        assert_eq!(addr, BUS_ADDRESS, "unexpected bus address");
        if self.fail_read {
            return Err(BusFault);
        }
        let state = self.state.borrow();
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = state.reg(self.latched + i as u16);
        }
        Ok(())
    }
}

/// What the mock port puts on the data bus.
#[derive(Debug, Clone, Copy)]
pub enum Scene {
    /// Byte n of the frame is `n % 256`; proves raster order.
    Gradient,
    /// Every pixel the same value, regardless of exposure.
    Flat(u8),
    /// Flat frames whose level follows the exposure registers:
    /// `value = factor * integration * analog * digital`.
    Metered(f32),
}

/// Pixel-port double that replays plausible sync waveforms. Each level
/// read advances the generator, so every wait in the capture loop settles
/// within a few polls.
pub struct MockPort {
    line_bytes: usize,
    rows: usize,
    scene: Scene,
    state: Option<Rc<RefCell<SensorState>>>,
    luma: u8,
    vsync_preamble: u32,
    vsync_gap: u32,
    pclk_high: bool,
    row_active: bool,
    row_gap: u32,
    bytes_left: usize,
    rows_left: usize,
    cursor: usize,
    hang: Option<SyncPoint>,
    frames: u32,
}

impl MockPort {
    pub fn new(line_bytes: usize, rows: usize, scene: Scene) -> Self {
        Self {
            line_bytes,
            rows,
            scene,
            state: None,
            luma: 0,
            vsync_preamble: 0,
            vsync_gap: 2,
            pclk_high: false,
            row_active: false,
            row_gap: 0,
            bytes_left: 0,
            rows_left: 0,
            cursor: 0,
            hang: None,
            frames: 0,
        }
    }

    /// Metered port sharing the register file with a [`MockI2c`].
    pub fn tracking(
        state: Rc<RefCell<SensorState>>,
        line_bytes: usize,
        rows: usize,
        factor: f32,
    ) -> Self {
        let mut port = Self::new(line_bytes, rows, Scene::Metered(factor));
        port.state = Some(state);
        port
    }

    /// The named line never reaches the level the capture loop waits for.
    pub fn hang_at(mut self, point: SyncPoint) -> Self {
        self.hang = Some(point);
        self
    }

    /// Start with frame-valid high, as if a frame were already underway.
    pub fn joined_mid_frame(mut self) -> Self {
        self.vsync_preamble = 3;
        self
    }

    pub fn frames_served(&self) -> u32 {
        self.frames
    }

    fn begin_frame(&mut self) {
        self.rows_left = self.rows;
        self.cursor = 0;
        self.frames += 1;
        if let Scene::Metered(factor) = self.scene {
            if let Some(state) = &self.state {
                self.luma = state.borrow().exposure_luma(factor);
            }
        }
    }
}

impl PixelPort for MockPort {
    fn vsync(&mut self) -> bool {
        if self.hang == Some(SyncPoint::FrameStart) {
            return false;
        }
        if self.vsync_preamble > 0 {
            self.vsync_preamble -= 1;
            return true;
        }
        if self.rows_left == 0 {
            if self.vsync_gap > 0 {
                self.vsync_gap -= 1;
                return false;
            }
            self.begin_frame();
        }
        true
    }

    fn href(&mut self) -> bool {
        match self.hang {
            Some(SyncPoint::LineStart) => return false,
            Some(SyncPoint::LineEnd) if self.cursor > 0 => return true,
            _ => {}
        }
        if self.row_active {
            return true;
        }
        if self.row_gap > 0 {
            self.row_gap -= 1;
            return false;
        }
        if self.rows_left > 0 {
            self.row_active = true;
            self.bytes_left = self.line_bytes;
            return true;
        }
        false
    }

    fn pclk(&mut self) -> bool {
        if self.hang == Some(SyncPoint::PixelClock) {
            return false;
        }
        self.pclk_high = !self.pclk_high;
        self.pclk_high
    }

    fn data(&mut self) -> u8 {
        let value = match self.scene {
            Scene::Gradient => self.cursor as u8,
            Scene::Flat(v) => v,
            Scene::Metered(_) => self.luma,
        };
        self.cursor += 1;
        self.bytes_left -= 1;
        if self.bytes_left == 0 {
            self.row_active = false;
            self.row_gap = 1;
            self.rows_left -= 1;
            if self.rows_left == 0 {
                self.vsync_gap = 2;
            }
        }
        value
    }
}

/// Delay that returns immediately; register polls in tests are scripted.
pub struct NoopDelay;

impl DelayMs<u16> for NoopDelay {
    fn delay_ms(&mut self, _ms: u16) {}
}
