//! Unified sensor types
//!
//! The same event and descriptor layout is shared by every driver of the
//! family, so consumers can treat an accelerometer, a magnetometer or a
//! gyroscope alike.

use core::{mem, str};

/// Width of the fixed name field of a [`Sensor`], terminator included
pub const NAME_LEN: usize = 12;

#[allow(dead_code)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorType {
    Accelerometer = 1,
    MagneticField = 2,
    Orientation = 3,
    Gyroscope = 4,
}

/// Three axis measurement
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A single calibrated reading
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    /// Size of this structure in bytes
    pub version: i32,
    pub sensor_id: i32,
    pub sensor_type: SensorType,
    /// Milliseconds, as reported by the [`Clock`] passed to the read
    pub timestamp: u32,
    /// Magnetic field in micro-Tesla
    pub magnetic: Vector,
}

impl Event {
    pub fn magnetic(sensor_id: i32, timestamp: u32, magnetic: Vector) -> Self {
        Self {
            version: mem::size_of::<Event>() as i32,
            sensor_id,
            sensor_type: SensorType::MagneticField,
            timestamp,
            magnetic,
        }
    }
}

/// Static description of a sensor
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sensor {
    name: [u8; NAME_LEN],
    pub version: i32,
    pub sensor_id: i32,
    pub sensor_type: SensorType,
    pub max_value: f32,
    pub min_value: f32,
    pub resolution: f32,
    /// Minimum delay between events in microseconds, 0 if not a constant rate
    pub min_delay: i32,
}

impl Sensor {
    /// Creates a zeroed descriptor carrying `name`, cut down to fit the
    /// name field and always NUL terminated.
    pub fn new(name: &str, version: i32, sensor_id: i32, sensor_type: SensorType) -> Self {
        let mut field = [0u8; NAME_LEN];
        let len = name.len().min(NAME_LEN - 1);
        field[..len].copy_from_slice(&name.as_bytes()[..len]);

        Self {
            name: field,
            version,
            sensor_id,
            sensor_type,
            max_value: 0.0,
            min_value: 0.0,
            resolution: 0.0,
            min_delay: 0,
        }
    }

    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        /* A cut may have landed inside a multi-byte character */
        match str::from_utf8(&self.name[..end]) {
            Ok(name) => name,
            Err(e) => str::from_utf8(&self.name[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

/// Source of monotonic milliseconds used to stamp events
pub trait Clock {
    fn millis(&mut self) -> u32;
}

impl<F> Clock for F
where
    F: FnMut() -> u32,
{
    fn millis(&mut self) -> u32 {
        self()
    }
}

/// Common interface of the sensor driver family
pub trait UnifiedSensor {
    type Error;

    /// Reads the most recent measurement
    fn event<C: Clock>(&mut self, clock: &mut C) -> Result<Event, Self::Error>;

    /// Describes the sensor
    fn sensor(&self) -> Sensor;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_cut_to_field_width() {
        let sensor = Sensor::new("LSM303AGR Mag", 1, 7, SensorType::MagneticField);
        assert_eq!(sensor.name(), "LSM303AGR M");
        assert_eq!(sensor.name.len(), NAME_LEN);
        assert_eq!(sensor.name[NAME_LEN - 1], 0);
    }

    #[test]
    fn short_name_is_zero_padded() {
        let sensor = Sensor::new("Mag", 1, 0, SensorType::MagneticField);
        assert_eq!(sensor.name(), "Mag");
        assert!(sensor.name[3..].iter().all(|&b| b == 0));
        assert_eq!(sensor.max_value, 0.0);
        assert_eq!(sensor.min_value, 0.0);
        assert_eq!(sensor.resolution, 0.0);
        assert_eq!(sensor.min_delay, 0);
    }

    #[test]
    fn closures_are_clocks() {
        let mut ticks: u32 = 10;
        let mut clock = || {
            ticks += 5;
            ticks
        };
        assert_eq!(clock.millis(), 15);
        assert_eq!(clock.millis(), 20);
    }

    #[test]
    fn event_carries_its_own_size() {
        let event = Event::magnetic(3, 42, Vector::default());
        assert_eq!(event.version as usize, mem::size_of::<Event>());
        assert_eq!(event.sensor_type, SensorType::MagneticField);
        assert_eq!(event.sensor_id, 3);
        assert_eq!(event.timestamp, 42);
    }
}
