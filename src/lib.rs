//! A driver for the magnetometer of the ST LSM303AGR
//!
//! This driver was built using [`embedded-hal`] traits.
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal/~0.2
//!
//! The driver starts out [`Uninitialized`], carrying only the sensor id used
//! to tag its events. [`Lsm303agrMag::begin`] probes the bus, checks the chip
//! identity and configures the device, handing back a [`Ready`] driver that
//! can be read any number of times.
//!
//! # Examples
//!
//! ```ignore
//! let mag = Lsm303agrMag::new(30302);
//! let mut mag = mag.begin(i2c, ADDRESS, &mut delay).map_err(|e| e.error)?;
//!
//! mag.set_data_rate(DataRate::HZ100)?;
//!
//! /* Any `FnMut() -> u32` can stamp events */
//! let mut ticks: u32 = 0;
//! let mut clock = || {
//!     ticks += 10;
//!     ticks
//! };
//! let event = mag.read_event(&mut clock)?;
//! ```

#![deny(warnings)]
#![cfg_attr(not(test), no_std)]

extern crate cast;
extern crate embedded_hal as hal;

pub mod sensor;

use core::fmt;

use cast::{f32, u16};
use hal::blocking::delay::DelayMs;
use hal::blocking::i2c::{Write, WriteRead};

pub use sensor::{Clock, Event, Sensor, SensorType, UnifiedSensor, Vector};

pub const ADDRESS: u8 = 0x1E;

/// Content of `WHO_AM_I_M`
pub const CHIP_ID: u8 = 0x40;

/// Milli-Gauss per LSB
pub const MAG_LSB: f32 = 1.5;

pub const MILLIGAUSS_TO_MICROTESLA: f32 = 0.1;

/// Settling time after a soft reset or a reboot, in milliseconds
pub const SETTLE_MS: u8 = 100;

const NAME: &str = "LSM303AGR Mag";

#[allow(dead_code)]
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    OFFSET_X_REG_L_M = 0x45, // Hard-iron X offset, low byte
    OFFSET_X_REG_H_M = 0x46, // Hard-iron X offset, high byte
    OFFSET_Y_REG_L_M = 0x47, // Hard-iron Y offset, low byte
    OFFSET_Y_REG_H_M = 0x48, // Hard-iron Y offset, high byte
    OFFSET_Z_REG_L_M = 0x49, // Hard-iron Z offset, low byte
    OFFSET_Z_REG_H_M = 0x4A, // Hard-iron Z offset, high byte
    WHO_AM_I_M = 0x4F,       // Device ID Number
    CFG_REG_A_M = 0x60,      // Temperature compensation, reboot, reset, data rate, mode
    CFG_REG_B_M = 0x61,      // Filtering and offset cancellation
    CFG_REG_C_M = 0x62,      // Interface options, block data update
    INT_CTRL_REG_M = 0x63,   // Interrupt configuration
    INT_SOURCE_REG_M = 0x64, // Interrupt source
    INT_THS_L_REG_M = 0x65,  // Interrupt threshold, low byte
    INT_THS_H_REG_M = 0x66,  // Interrupt threshold, high byte
    STATUS_REG_M = 0x67,     // Data ready and overrun per axis
    OUTX_L_REG_M = 0x68,     // Bits [7:0] of X measurement
    OUTX_H_REG_M = 0x69,     // Bits [15:8] of X measurement
    OUTY_L_REG_M = 0x6A,     // Bits [7:0] of Y measurement
    OUTY_H_REG_M = 0x6B,     // Bits [15:8] of Y measurement
    OUTZ_L_REG_M = 0x6C,     // Bits [7:0] of Z measurement
    OUTZ_H_REG_M = 0x6D,     // Bits [15:8] of Z measurement
}

impl Register {
    pub fn addr(&self) -> u8 {
        *self as u8
    }
}

/// A run of bits inside a single register
///
/// Writes go through read-modify-write so the other bits of the register
/// keep their value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterBits {
    pub register: Register,
    pub offset: u8,
    pub width: u8,
}

impl RegisterBits {
    pub const fn new(register: Register, offset: u8, width: u8) -> Self {
        Self {
            register,
            offset,
            width,
        }
    }

    fn mask(&self) -> u8 {
        (((1u16 << self.width) - 1) as u8) << self.offset
    }

    /// Extracts the field from a register value
    pub fn get(&self, byte: u8) -> u8 {
        (byte & self.mask()) >> self.offset
    }

    /// Replaces the field in a register value, excess bits of `value` are dropped
    pub fn set(&self, byte: u8, value: u8) -> u8 {
        (byte & !self.mask()) | ((value << self.offset) & self.mask())
    }
}

pub const SOFT_RST: RegisterBits = RegisterBits::new(Register::CFG_REG_A_M, 5, 1);
pub const REBOOT: RegisterBits = RegisterBits::new(Register::CFG_REG_A_M, 6, 1);
pub const COMP_TEMP_EN: RegisterBits = RegisterBits::new(Register::CFG_REG_A_M, 7, 1);
pub const ODR: RegisterBits = RegisterBits::new(Register::CFG_REG_A_M, 2, 2);
pub const MD: RegisterBits = RegisterBits::new(Register::CFG_REG_A_M, 0, 2);
pub const BDU: RegisterBits = RegisterBits::new(Register::CFG_REG_C_M, 4, 1);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRate {
    HZ10 = 0b00,  // 10Hz, power-on default
    HZ20 = 0b01,  // 20Hz
    HZ50 = 0b10,  // 50Hz
    HZ100 = 0b11, // 100Hz
}

impl DataRate {
    pub fn bits(&self) -> u8 {
        *self as u8
    }

    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => DataRate::HZ10,
            0b01 => DataRate::HZ20,
            0b10 => DataRate::HZ50,
            _ => DataRate::HZ100,
        }
    }
}

#[allow(dead_code)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Continuous = 0b00, // Sample at the configured data rate
    Single = 0b01,     // One sample, then back to idle
    Idle = 0b11,       // Power down
}

impl Mode {
    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

/// Raw reading in LSB, as delivered by the chip
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawSample {
    /// Decodes `OUTX_L_REG_M` to `OUTZ_H_REG_M`
    pub fn from_bytes(buffer: [u8; 6]) -> Self {
        Self {
            x: (u16(buffer[0]) | (u16(buffer[1]) << 8)) as i16,
            y: (u16(buffer[2]) | (u16(buffer[3]) << 8)) as i16,
            z: (u16(buffer[4]) | (u16(buffer[5]) << 8)) as i16,
        }
    }

    /// Field strength in micro-Tesla
    pub fn microtesla(&self) -> Vector {
        Vector {
            x: f32(self.x) * MAG_LSB * MILLIGAUSS_TO_MICROTESLA,
            y: f32(self.y) * MAG_LSB * MILLIGAUSS_TO_MICROTESLA,
            z: f32(self.z) * MAG_LSB * MILLIGAUSS_TO_MICROTESLA,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Nothing acknowledged the device address
    Unreachable(E),
    /// Something answered, but `WHO_AM_I_M` held this value
    WrongDevice(u8),
    /// A bus transaction failed
    I2c(E),
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::I2c(e)
    }
}

/// Failed [`Lsm303agrMag::begin`], returns the bus and the driver so the
/// caller can try again
pub struct InitError<I2C, E> {
    pub mag: Lsm303agrMag<Uninitialized>,
    pub i2c: I2C,
    pub error: Error<E>,
}

impl<I2C, E: fmt::Debug> fmt::Debug for InitError<I2C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.error, f)
    }
}

/// Driver state before a successful [`Lsm303agrMag::begin`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Uninitialized;

/// Driver state once the device has been found and configured
pub struct Ready<I2C> {
    i2c: I2C,
    address: u8,
}

pub struct Lsm303agrMag<STATE> {
    state: STATE,
    sensor_id: i32,
    raw: RawSample,
}

impl<STATE> Lsm303agrMag<STATE> {
    pub fn sensor_id(&self) -> i32 {
        self.sensor_id
    }

    /// Last sample fetched while the driver was ready, zero before that
    pub fn raw(&self) -> RawSample {
        self.raw
    }

    /// Describes the sensor, no bus access
    pub fn sensor(&self) -> Sensor {
        Sensor::new(NAME, 1, self.sensor_id, SensorType::MagneticField)
    }
}

impl Lsm303agrMag<Uninitialized> {
    /// Creates a driver tagging its events with `sensor_id`, the bus is not
    /// touched until [`begin`](Self::begin)
    pub const fn new(sensor_id: i32) -> Self {
        Self {
            state: Uninitialized,
            sensor_id,
            raw: RawSample { x: 0, y: 0, z: 0 },
        }
    }

    /// Looks for the chip at `address` and brings it into a known state
    pub fn begin<I2C, E, D>(
        self,
        i2c: I2C,
        address: u8,
        delay: &mut D,
    ) -> Result<Lsm303agrMag<Ready<I2C>>, InitError<I2C, E>>
    where
        I2C: WriteRead<Error = E> + Write<Error = E>,
        D: DelayMs<u8>,
    {
        let mut mag = Lsm303agrMag {
            state: Ready { i2c, address },
            sensor_id: self.sensor_id,
            raw: self.raw,
        };

        match mag.probe().and_then(|_| mag.reset(delay)) {
            Ok(()) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("LSM303AGR magnetometer ready at {=u8:#x}", address);
                Ok(mag)
            }
            Err(error) => {
                let (mag, i2c) = mag.release();
                Err(InitError { mag, i2c, error })
            }
        }
    }
}

impl<I2C, E> Lsm303agrMag<Ready<I2C>>
where
    I2C: WriteRead<Error = E> + Write<Error = E>,
{
    fn probe(&mut self) -> Result<(), Error<E>> {
        let address = self.state.address;

        /* An empty write only succeeds if the address is acknowledged */
        if let Err(e) = self.state.i2c.write(address, &[]) {
            #[cfg(feature = "defmt")]
            defmt::warn!("no device at {=u8:#x}", address);
            return Err(Error::Unreachable(e));
        }

        let id = self.read_register(Register::WHO_AM_I_M)?;
        if id != CHIP_ID {
            #[cfg(feature = "defmt")]
            defmt::warn!("chip id is {=u8:#x}", id);
            return Err(Error::WrongDevice(id));
        }

        Ok(())
    }

    /// Resets the device and starts continuous sampling
    ///
    /// The data rate is left alone.
    pub fn reset<D>(&mut self, delay: &mut D) -> Result<(), Error<E>>
    where
        D: DelayMs<u8>,
    {
        self.write_bits(SOFT_RST, 1)?;
        delay.delay_ms(SETTLE_MS);

        /* Reload trimming parameters */
        self.write_bits(REBOOT, 1)?;
        delay.delay_ms(SETTLE_MS);

        self.write_bits(BDU, 1)?;
        self.write_bits(COMP_TEMP_EN, 1)?;
        self.write_bits(MD, Mode::Continuous.bits())?;

        Ok(())
    }

    pub fn set_data_rate(&mut self, rate: DataRate) -> Result<(), Error<E>> {
        self.write_bits(ODR, rate.bits())
    }

    pub fn data_rate(&mut self) -> Result<DataRate, Error<E>> {
        Ok(DataRate::from_bits(self.read_bits(ODR)?))
    }

    /// Fetches a fresh sample into the driver and returns it
    pub fn read_raw(&mut self) -> Result<RawSample, Error<E>> {
        let mut buffer = [0u8; 6];
        self.state.i2c.write_read(
            self.state.address,
            &[Register::OUTX_L_REG_M.addr()],
            &mut buffer,
        )?;

        self.raw = RawSample::from_bytes(buffer);
        Ok(self.raw)
    }

    pub fn read_event<C: Clock>(&mut self, clock: &mut C) -> Result<Event, Error<E>> {
        let raw = self.read_raw()?;
        Ok(Event::magnetic(
            self.sensor_id,
            clock.millis(),
            raw.microtesla(),
        ))
    }

    pub fn read_bits(&mut self, bits: RegisterBits) -> Result<u8, Error<E>> {
        Ok(bits.get(self.read_register(bits.register)?))
    }

    pub fn write_bits(&mut self, bits: RegisterBits, value: u8) -> Result<(), Error<E>> {
        let byte = self.read_register(bits.register)?;
        self.write_register(bits.register, bits.set(byte, value))
    }

    /// Gives back the bus, the driver has to be started again afterwards
    pub fn release(self) -> (Lsm303agrMag<Uninitialized>, I2C) {
        let mag = Lsm303agrMag {
            state: Uninitialized,
            sensor_id: self.sensor_id,
            raw: self.raw,
        };
        (mag, self.state.i2c)
    }

    fn read_register(&mut self, reg: Register) -> Result<u8, Error<E>> {
        let mut buffer = [0u8; 1];
        self.state
            .i2c
            .write_read(self.state.address, &[reg.addr()], &mut buffer)?;

        Ok(buffer[0])
    }

    fn write_register(&mut self, reg: Register, byte: u8) -> Result<(), Error<E>> {
        self.state.i2c.write(self.state.address, &[reg.addr(), byte])?;
        Ok(())
    }
}

impl<I2C, E> UnifiedSensor for Lsm303agrMag<Ready<I2C>>
where
    I2C: WriteRead<Error = E> + Write<Error = E>,
{
    type Error = Error<E>;

    fn event<C: Clock>(&mut self, clock: &mut C) -> Result<Event, Self::Error> {
        self.read_event(clock)
    }

    fn sensor(&self) -> Sensor {
        Lsm303agrMag::sensor(self)
    }
}
