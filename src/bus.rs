//! Control bus access to the HM01B0 register file.
//!
//! The sensor sits on a standard-mode I2C bus at a fixed address and uses
//! 16-bit register addresses with 8-bit values. A register read is two
//! transactions: write the big-endian address, then read one byte back.

use embedded_hal::blocking::i2c::{Read, Write};

use crate::Error;

/// Fixed 7-bit bus address of the HM01B0.
pub const BUS_ADDRESS: u8 = 0x24;

/// Owns the I2C peripheral wired to the sensor control pins.
pub struct SensorBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> SensorBus<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            address: BUS_ADDRESS,
        }
    }

    /// Releases the I2C peripheral.
    pub fn free(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> SensorBus<I2C>
where
    I2C: Read<Error = E> + Write<Error = E>,
{
    /// Reads one register.
    pub fn read(&mut self, reg: u16) -> Result<u8, Error<E>> {
        self.i2c
            .write(self.address, &reg.to_be_bytes())
            .map_err(Error::BusWrite)?;
        let mut buf = [0x00];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(Error::BusRead)?;
        Ok(buf[0])
    }

    /// Writes one register.
    pub fn write(&mut self, reg: u16, value: u8) -> Result<(), Error<E>> {
        let [hi, lo] = reg.to_be_bytes();
        self.i2c
            .write(self.address, &[hi, lo, value])
            .map_err(Error::BusWrite)
    }

    /// Reads a high/low register pair as one 16-bit value.
    pub fn read_pair(&mut self, high_reg: u16) -> Result<u16, Error<E>> {
        let high = self.read(high_reg)?;
        let low = self.read(high_reg + 1)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Writes a 16-bit value across a high/low register pair.
    pub fn write_pair(&mut self, high_reg: u16, value: u16) -> Result<(), Error<E>> {
        let [high, low] = value.to_be_bytes();
        self.write(high_reg, high)?;
        self.write(high_reg + 1, low)
    }

    /// Read-modify-write of one register.
    pub fn modify<F>(&mut self, reg: u16, f: F) -> Result<(), Error<E>>
    where
        F: FnOnce(u8) -> u8,
    {
        let value = self.read(reg)?;
        self.write(reg, f(value))
    }

    /// Applies a configuration table in order, stopping at the first failure.
    pub fn apply(&mut self, table: &[(u16, u8)]) -> Result<(), Error<E>> {
        for &(reg, value) in table {
            self.write(reg, value)?;
        }
        Ok(())
    }
}
