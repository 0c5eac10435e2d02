//! HM01B0 register map and configuration tables.
//!
//! Addresses are 16 bits wide and transferred big-endian on the control bus.
//! The tables are `(address, value)` pairs applied in order; none of them
//! touch `GRP_PARAM_HOLD`, committing staged values is always a separate
//! step.

/// Register addresses from the Himax HM01B0 datasheet.
pub struct Register;

impl Register {
    // Identity (read-only)
    pub const MODEL_ID_H: u16 = 0x0000;
    pub const MODEL_ID_L: u16 = 0x0001;
    pub const SILICON_REV: u16 = 0x0002;
    pub const FRAME_COUNT: u16 = 0x0005;

    // Sensor mode
    pub const MODE_SELECT: u16 = 0x0100;
    pub const IMG_ORIENTATION: u16 = 0x0101;
    pub const SW_RESET: u16 = 0x0103;
    pub const GRP_PARAM_HOLD: u16 = 0x0104;

    // Exposure and gain
    pub const INTEGRATION_H: u16 = 0x0202;
    pub const INTEGRATION_L: u16 = 0x0203;
    pub const ANALOG_GAIN: u16 = 0x0205;
    pub const DIGITAL_GAIN_H: u16 = 0x020E;
    pub const DIGITAL_GAIN_L: u16 = 0x020F;

    // Frame timing
    pub const FRAME_LEN_LINES_H: u16 = 0x0340;
    pub const FRAME_LEN_LINES_L: u16 = 0x0341;
    pub const LINE_LEN_PCK_H: u16 = 0x0342;
    pub const LINE_LEN_PCK_L: u16 = 0x0343;

    // Readout and binning
    pub const READOUT_X: u16 = 0x0383;
    pub const READOUT_Y: u16 = 0x0387;
    pub const BINNING_MODE: u16 = 0x0390;

    // Test pattern
    pub const TEST_PATTERN_MODE: u16 = 0x0601;

    // Black level correction
    pub const BLC_CFG: u16 = 0x1000;
    pub const BLC_TGT: u16 = 0x1003;
    pub const BLI_EN: u16 = 0x1006;
    pub const BLC2_TGT: u16 = 0x1007;

    // Defective pixel correction
    pub const DPC_CTRL: u16 = 0x1008;
    pub const SINGLE_THR_HOT: u16 = 0x100B;
    pub const SINGLE_THR_COLD: u16 = 0x100C;

    // Statistics engine
    pub const STATISTIC_CTRL: u16 = 0x2000;
    pub const AE_MEAN: u16 = 0x2020;

    // Auto exposure
    pub const AE_CTRL: u16 = 0x2100;
    pub const AE_TARGET_MEAN: u16 = 0x2101;
    pub const AE_MIN_MEAN: u16 = 0x2102;
    pub const CONVERGE_IN_TH: u16 = 0x2103;
    pub const CONVERGE_OUT_TH: u16 = 0x2104;
    pub const MAX_INTG_H: u16 = 0x2105;
    pub const MAX_INTG_L: u16 = 0x2106;
    pub const MIN_INTG: u16 = 0x2107;
    pub const MAX_AGAIN_FULL: u16 = 0x2108;
    pub const MAX_AGAIN_BIN2: u16 = 0x2109;
    pub const MIN_AGAIN: u16 = 0x210A;
    pub const MAX_DGAIN: u16 = 0x210B;
    pub const MIN_DGAIN: u16 = 0x210C;
    pub const DAMPING_FACTOR: u16 = 0x210D;

    // Flicker suppression
    pub const FS_CTRL: u16 = 0x210E;
    pub const FS_60HZ_H: u16 = 0x210F;
    pub const FS_60HZ_L: u16 = 0x2110;
    pub const FS_50HZ_H: u16 = 0x2111;
    pub const FS_50HZ_L: u16 = 0x2112;

    // Motion detection
    pub const MD_CTRL: u16 = 0x2150;

    // Sensor timing and interface
    pub const QVGA_WIN_EN: u16 = 0x3010;
    pub const SIX_BIT_SAMPLE_EN: u16 = 0x3011;
    pub const PMU_AUTOSLEEP_FRAMECNT: u16 = 0x3020;
    pub const BIT_CONTROL: u16 = 0x3059;
    pub const OSC_CLK_DIV: u16 = 0x3060;
}

/// Value read back from `MODEL_ID_H:MODEL_ID_L` on a live sensor.
pub const MODEL_ID: u16 = 0x01B0;

// MODE_SELECT values.
pub(crate) const MODE_STANDBY: u8 = 0x00;
pub(crate) const MODE_STREAMING: u8 = 0x01;
pub(crate) const MODE_STREAMING_NFRAMES: u8 = 0x03;
pub(crate) const MODE_STREAMING_TRIG: u8 = 0x05;

// Frame geometry in sensor clocks. The line length is in pixel clocks, the
// frame length in lines; both bound the integration time range.
pub(crate) const FRAME_LENGTH_FULL: u16 = 0x0158;
pub(crate) const LINE_LENGTH_FULL: u16 = 0x0178;
pub(crate) const FRAME_LENGTH_QVGA: u16 = 0x0104;
pub(crate) const LINE_LENGTH_QVGA: u16 = 0x0178;
pub(crate) const FRAME_LENGTH_QQVGA: u16 = 0x0084;
pub(crate) const LINE_LENGTH_QQVGA: u16 = 0x00D7;

/// Baseline sensor bring-up: analog tuning, black level and defect
/// correction, AE statistics windows, QVGA readout at full pixel rate.
pub(crate) const DEFAULT_REGS: &[(u16, u8)] = &[
    (Register::BLC_TGT, 0x08),              // BLC target, 8-bit mode
    (Register::BLC2_TGT, 0x08),             // BLI target, 8-bit mode
    (0x3044, 0x0A),                         // Longer CDS settling time
    (0x3045, 0x00),                         // Symmetric cds_tg / rst_tg
    (0x3047, 0x0A),
    (0x3050, 0xC0),                         // Negative offset up to 4x
    (0x3051, 0x42),
    (0x3052, 0x50),
    (0x3053, 0x00),
    (0x3054, 0x03),                         // Lowest sf signal clamping
    (0x3055, 0xF7),                         // dsun tuning
    (0x3056, 0xF8),                         // Wider ADC non-overlap clock
    (0x3057, 0x29),                         // More ADC power, missing codes
    (0x3058, 0x1F),                         // dsun on
    (0x3064, 0x00),
    (0x3065, 0x04),                         // Pad pull low
    (Register::BLC_CFG, 0x43),              // BLC on, IIR filtered
    (0x1001, 0x43),                         // BLC dithering
    (0x1002, 0x43),                         // Dark pixel threshold
    (0x0350, 0x7F),                         // Digital gain control
    (Register::BLI_EN, 0x01),
    (Register::DPC_CTRL, 0x01),             // DPC in mono mode
    (0x1009, 0xA0),                         // Cluster hot pixel threshold
    (0x100A, 0x60),                         // Cluster cold pixel threshold
    (Register::SINGLE_THR_HOT, 0x90),
    (Register::SINGLE_THR_COLD, 0x40),
    (0x1012, 0x00),                         // Sync shift off
    (Register::STATISTIC_CTRL, 0x07),       // AE and MD statistics on
    (0x2003, 0x00),                         // AE statistics window
    (0x2004, 0x1C),
    (0x2007, 0x00),
    (0x2008, 0x58),
    (0x200B, 0x00),
    (0x200C, 0x7A),
    (0x200F, 0x00),
    (0x2010, 0xB8),
    (0x2013, 0x00),
    (0x2014, 0x58),
    (0x2017, 0x00),
    (0x2018, 0x9B),
    (Register::AE_CTRL, 0x01),              // On-chip AE on
    (Register::AE_TARGET_MEAN, 0x64),
    (Register::AE_MIN_MEAN, 0x0A),
    (Register::CONVERGE_IN_TH, 0x03),
    (Register::CONVERGE_OUT_TH, 0x05),
    (Register::MAX_INTG_H, (MAX_INTEGRATION_QVGA >> 8) as u8),
    (Register::MAX_INTG_L, (MAX_INTEGRATION_QVGA & 0xFF) as u8),
    (Register::MAX_AGAIN_FULL, 0x04),       // Analog gain ceiling, full frame
    (Register::MAX_AGAIN_BIN2, 0x04),       // Analog gain ceiling, 2x2 binned
    (Register::MAX_DGAIN, 0xC0),
    (Register::INTEGRATION_H, 0x01),
    (Register::INTEGRATION_L, 0x08),
    (Register::ANALOG_GAIN, 0x00),
    (Register::DAMPING_FACTOR, 0x20),
    (Register::DIGITAL_GAIN_H, 0x01),       // Digital gain 1.0x
    (Register::DIGITAL_GAIN_L, 0x00),
    (Register::FS_CTRL, 0x00),              // Flicker suppression off
    (Register::FS_60HZ_H, 0x00),
    (Register::FS_60HZ_L, 0x3C),
    (Register::FS_50HZ_H, 0x00),
    (Register::FS_50HZ_L, 0x32),
    (Register::MD_CTRL, 0x00),              // Motion detection off
    (Register::FRAME_LEN_LINES_H, (FRAME_LENGTH_QVGA >> 8) as u8),
    (Register::FRAME_LEN_LINES_L, (FRAME_LENGTH_QVGA & 0xFF) as u8),
    (Register::LINE_LEN_PCK_H, (LINE_LENGTH_QVGA >> 8) as u8),
    (Register::LINE_LEN_PCK_L, (LINE_LENGTH_QVGA & 0xFF) as u8),
    (Register::QVGA_WIN_EN, 0x01),          // QVGA window readout
    (Register::READOUT_X, 0x01),
    (Register::READOUT_Y, 0x01),
    (Register::BINNING_MODE, 0x00),
    (Register::SIX_BIT_SAMPLE_EN, 0x70),
    (Register::BIT_CONTROL, 0x02),          // 8-bit parallel output
    (Register::OSC_CLK_DIV, 0x0B),          // Gated pclk, full-rate divisor
    (Register::IMG_ORIENTATION, 0x00),
];

/// Walking-ones test script: statistics and corrections off, unity gain,
/// deterministic pattern on the data bus for pin-level bring-up.
pub(crate) const WALKING1S_REGS: &[(u16, u8)] = &[
    (Register::AE_CTRL, 0x00),
    (Register::BLC_CFG, 0x00),
    (Register::DPC_CTRL, 0x00),
    (Register::ANALOG_GAIN, 0x00),
    (Register::DIGITAL_GAIN_H, 0x01),
    (Register::DIGITAL_GAIN_L, 0x00),
    (Register::TEST_PATTERN_MODE, 0x11),    // Walking ones
];

/// Alternate vendor bring-up script: fixed exposure, on-chip AE left off,
/// reduced analog ceiling. Used by boards that run their own AE loop from
/// cold start.
pub(crate) const ALTERNATE_REGS: &[(u16, u8)] = &[
    (0x3044, 0x0A),
    (0x3045, 0x00),
    (0x3047, 0x0A),
    (0x3050, 0xC0),
    (0x3051, 0x42),
    (0x3052, 0x50),
    (0x3053, 0x00),
    (0x3054, 0x03),
    (0x3055, 0xF7),
    (0x3056, 0xF8),
    (0x3057, 0x29),
    (0x3058, 0x1F),
    (Register::BLC_CFG, 0x43),
    (Register::BLC_TGT, 0x08),
    (Register::BLI_EN, 0x01),
    (Register::DPC_CTRL, 0x01),
    (Register::STATISTIC_CTRL, 0x07),
    (Register::AE_CTRL, 0x00),              // Host drives exposure
    (Register::AE_TARGET_MEAN, 0x3C),
    (Register::AE_MIN_MEAN, 0x0A),
    (Register::CONVERGE_IN_TH, 0x03),
    (Register::CONVERGE_OUT_TH, 0x05),
    (Register::MAX_AGAIN_FULL, 0x03),
    (Register::MAX_AGAIN_BIN2, 0x03),
    (Register::MAX_DGAIN, 0xC0),
    (Register::INTEGRATION_H, 0x01),
    (Register::INTEGRATION_L, 0x58),
    (Register::ANALOG_GAIN, 0x00),
    (Register::DIGITAL_GAIN_H, 0x01),
    (Register::DIGITAL_GAIN_L, 0x00),
    (Register::FRAME_LEN_LINES_H, (FRAME_LENGTH_QVGA >> 8) as u8),
    (Register::FRAME_LEN_LINES_L, (FRAME_LENGTH_QVGA & 0xFF) as u8),
    (Register::LINE_LEN_PCK_H, (LINE_LENGTH_QVGA >> 8) as u8),
    (Register::LINE_LEN_PCK_L, (LINE_LENGTH_QVGA & 0xFF) as u8),
    (Register::QVGA_WIN_EN, 0x01),
    (Register::READOUT_X, 0x01),
    (Register::READOUT_Y, 0x01),
    (Register::BINNING_MODE, 0x00),
    (Register::SIX_BIT_SAMPLE_EN, 0x70),
    (Register::BIT_CONTROL, 0x02),
    (Register::OSC_CLK_DIV, 0x0A),
];

/// 320x320 full-array readout.
pub(crate) const FULL_REGS: &[(u16, u8)] = &[
    (Register::READOUT_X, 0x01),            // No column skip
    (Register::READOUT_Y, 0x01),            // No row skip
    (Register::BINNING_MODE, 0x00),
    (Register::QVGA_WIN_EN, 0x00),          // Full window
    (Register::FRAME_LEN_LINES_H, (FRAME_LENGTH_FULL >> 8) as u8),
    (Register::FRAME_LEN_LINES_L, (FRAME_LENGTH_FULL & 0xFF) as u8),
    (Register::LINE_LEN_PCK_H, (LINE_LENGTH_FULL >> 8) as u8),
    (Register::LINE_LEN_PCK_L, (LINE_LENGTH_FULL & 0xFF) as u8),
];

/// 320x240 windowed readout.
pub(crate) const QVGA_REGS: &[(u16, u8)] = &[
    (Register::READOUT_X, 0x01),
    (Register::READOUT_Y, 0x01),
    (Register::BINNING_MODE, 0x00),
    (Register::QVGA_WIN_EN, 0x01),
    (Register::FRAME_LEN_LINES_H, (FRAME_LENGTH_QVGA >> 8) as u8),
    (Register::FRAME_LEN_LINES_L, (FRAME_LENGTH_QVGA & 0xFF) as u8),
    (Register::LINE_LEN_PCK_H, (LINE_LENGTH_QVGA >> 8) as u8),
    (Register::LINE_LEN_PCK_L, (LINE_LENGTH_QVGA & 0xFF) as u8),
];

/// 160x120 readout, 2x2 skip and binning inside the QVGA window.
pub(crate) const QQVGA_REGS: &[(u16, u8)] = &[
    (Register::READOUT_X, 0x03),            // Skip every other column
    (Register::READOUT_Y, 0x03),            // Skip every other row
    (Register::BINNING_MODE, 0x03),
    (Register::QVGA_WIN_EN, 0x01),
    (Register::FRAME_LEN_LINES_H, (FRAME_LENGTH_QQVGA >> 8) as u8),
    (Register::FRAME_LEN_LINES_L, (FRAME_LENGTH_QQVGA & 0xFF) as u8),
    (Register::LINE_LEN_PCK_H, (LINE_LENGTH_QQVGA >> 8) as u8),
    (Register::LINE_LEN_PCK_L, (LINE_LENGTH_QQVGA & 0xFF) as u8),
];

/// Largest integration time the AE is allowed to program at QVGA timing,
/// two lines short of the frame length.
pub(crate) const MAX_INTEGRATION_QVGA: u16 = FRAME_LENGTH_QVGA - 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_tables_program_frame_timing() {
        for table in [FULL_REGS, QVGA_REGS, QQVGA_REGS] {
            for addr in [
                Register::FRAME_LEN_LINES_H,
                Register::LINE_LEN_PCK_H,
                Register::QVGA_WIN_EN,
                Register::BINNING_MODE,
            ] {
                assert!(
                    table.iter().any(|&(a, _)| a == addr),
                    "missing register {addr:#06x}"
                );
            }
        }
    }

    #[test]
    fn no_table_commits_on_its_own() {
        for table in [
            DEFAULT_REGS,
            WALKING1S_REGS,
            ALTERNATE_REGS,
            FULL_REGS,
            QVGA_REGS,
            QQVGA_REGS,
        ] {
            assert!(table.iter().all(|&(a, _)| a != Register::GRP_PARAM_HOLD));
        }
    }

    #[test]
    fn max_integration_fits_qvga_frame() {
        assert_eq!(MAX_INTEGRATION_QVGA, 0x0102);
        assert!(MAX_INTEGRATION_QVGA < FRAME_LENGTH_QVGA);
    }
}
