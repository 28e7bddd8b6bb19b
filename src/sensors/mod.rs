use {
    crate::{
        error::{Error, Quantity, ReadError},
        sample::{altitude_from_pressure, Sample},
    },
    chrono::Utc,
    std::{fmt, str::FromStr},
};

mod bmx280;
#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use bmx280::Bmx280;
#[cfg(any(test, feature = "testing"))]
pub use fake::FakeSensor;

/// Primary I2C address of the BMP280/BME280 (SDO pulled low).
pub const PRIMARY_ADDRESS: u8 = 0x76;
/// Secondary I2C address of the BMP280/BME280 (SDO pulled high).
pub const SECONDARY_ADDRESS: u8 = 0x77;

/// An exclusively owned connection to one environmental sensor chip.
///
/// Reads are blocking bus transactions and must not run concurrently;
/// callers serialize access through [`crate::sampling::SensorReader`].
pub trait Sensor: Send + 'static {
    fn chip(&self) -> Chip;

    /// Called once before the reads of each cycle. Values an adapter caches
    /// for a cycle must not be served after the next call.
    fn begin_cycle(&mut self) {}

    /// Degrees Celsius.
    fn read_temperature(&mut self, accuracy: Accuracy) -> Result<f64, ReadError>;

    /// Pascals.
    fn read_pressure(&mut self, accuracy: Accuracy) -> Result<f64, ReadError>;

    /// Relative humidity percentage. Only called when [`Chip::has_humidity`].
    fn read_humidity(&mut self, accuracy: Accuracy) -> Result<f64, ReadError>;
}

/// Reads temperature, pressure and, when the chip has one, humidity in that
/// order, then derives altitude from the pressure of the same cycle.
///
/// The first failing read aborts the cycle; no partial sample is returned.
pub fn read_sample<S: Sensor + ?Sized>(sensor: &mut S, accuracy: Accuracy) -> Result<Sample, ReadError> {
    sensor.begin_cycle();
    let temperature_c = finite(Quantity::Temperature, sensor.read_temperature(accuracy)?)?;
    let pressure_pa = finite(Quantity::Pressure, sensor.read_pressure(accuracy)?)?;
    let humidity_rh = if sensor.chip().has_humidity() {
        Some(finite(Quantity::Humidity, sensor.read_humidity(accuracy)?)?)
    } else {
        None
    };
    let altitude_m = finite(Quantity::Altitude, altitude_from_pressure(pressure_pa))?;

    Ok(Sample {
        temperature_c,
        pressure_pa,
        humidity_rh,
        altitude_m,
        collected_at: Utc::now(),
    })
}

fn finite(quantity: Quantity, value: f64) -> Result<f64, ReadError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ReadError::Invalid { quantity, value })
    }
}

/// Supported members of the Bosch BMx280 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    Bmp280,
    Bme280,
}

impl Chip {
    pub fn has_humidity(self) -> bool {
        matches!(self, Chip::Bme280)
    }
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chip::Bmp280 => f.write_str("BMP280"),
            Chip::Bme280 => f.write_str("BME280"),
        }
    }
}

impl FromStr for Chip {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bmp280" => Ok(Chip::Bmp280),
            "bme280" => Ok(Chip::Bme280),
            other => Err(Error::Config(format!("unknown chip {:?}", other))),
        }
    }
}

/// Oversampling level requested from the chip. Higher levels trade read
/// latency for lower noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    UltraLow,
    Low,
    Standard,
    High,
    UltraHigh,
}

impl Default for Accuracy {
    fn default() -> Self {
        Accuracy::Standard
    }
}

impl FromStr for Accuracy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "ultra_low" => Ok(Accuracy::UltraLow),
            "low" => Ok(Accuracy::Low),
            "standard" => Ok(Accuracy::Standard),
            "high" => Ok(Accuracy::High),
            "ultra_high" => Ok(Accuracy::UltraHigh),
            other => Err(Error::Config(format!("unknown accuracy {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_sea_level_without_humidity() {
        let mut sensor = FakeSensor::new(Chip::Bmp280, 22.5, 101_325.0);
        let sample = read_sample(&mut sensor, Accuracy::Standard).unwrap();

        assert_eq!(sample.temperature_c, 22.5);
        assert_eq!(sample.pressure_pa, 101_325.0);
        assert_eq!(sample.altitude_m, 0.0);
        assert_eq!(sample.humidity_rh, None);
    }

    #[test]
    fn humidity_read_only_for_bme280() {
        let mut sensor = FakeSensor::new(Chip::Bme280, 20.0, 100_000.0).with_humidity(55.0);
        let sample = read_sample(&mut sensor, Accuracy::High).unwrap();
        assert_eq!(sample.humidity_rh, Some(55.0));
        assert_eq!(sensor.bus_reads(), 3);

        let mut sensor = FakeSensor::new(Chip::Bmp280, 20.0, 100_000.0).with_humidity(55.0);
        read_sample(&mut sensor, Accuracy::High).unwrap();
        assert_eq!(sensor.bus_reads(), 2);
    }

    #[test]
    fn first_failure_short_circuits() {
        let mut sensor = FakeSensor::new(Chip::Bme280, 20.0, 100_000.0)
            .with_humidity(40.0)
            .fail_on(Quantity::Pressure);

        let err = read_sample(&mut sensor, Accuracy::Standard).unwrap_err();
        assert!(matches!(err, ReadError::Bus { quantity: Quantity::Pressure, .. }));
        // Humidity was never requested after the pressure read failed.
        assert_eq!(sensor.bus_reads(), 2);
    }

    #[test]
    fn non_finite_reading_discards_cycle() {
        let mut sensor = FakeSensor::new(Chip::Bmp280, f64::NAN, 100_000.0);
        let err = read_sample(&mut sensor, Accuracy::Standard).unwrap_err();
        assert!(matches!(err, ReadError::Invalid { quantity: Quantity::Temperature, .. }));
    }

    #[test]
    fn accuracy_passes_through_unchanged() {
        let mut sensor = FakeSensor::new(Chip::Bme280, 20.0, 100_000.0).with_humidity(40.0);
        read_sample(&mut sensor, Accuracy::UltraHigh).unwrap();
        assert_eq!(sensor.accuracies(), vec![Accuracy::UltraHigh; 3]);
    }

    #[test]
    fn parse_chip_and_accuracy() {
        assert_eq!("BME280".parse::<Chip>().unwrap(), Chip::Bme280);
        assert_eq!("ultra-high".parse::<Accuracy>().unwrap(), Accuracy::UltraHigh);
        assert!("bmp180".parse::<Chip>().is_err());
        assert!("extreme".parse::<Accuracy>().is_err());
    }
}
