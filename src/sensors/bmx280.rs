use {
    super::{Accuracy, Chip, Sensor},
    crate::{
        config::SensorConfig,
        error::{Error, Quantity, ReadError},
    },
    bme280::BME280,
    embedded_hal::blocking::i2c::{Read, Write, WriteRead},
    linux_embedded_hal::{Delay, I2cdev},
    log::debug,
    std::fmt::Debug,
};

/// BMP280/BME280 attached to an I2C bus.
pub struct Bmx280<I2C = I2cdev> {
    driver: BME280<I2C, Delay>,
    chip: Chip,
    cycle: Option<(Accuracy, Reading)>,
}

/// All three quantities of one or more forced conversions.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reading {
    temperature: f64,
    pressure: f64,
    humidity: f64,
}

impl Bmx280<I2cdev> {
    /// Opens `/dev/i2c-<bus>` and initializes the chip at the configured address.
    pub fn open(config: &SensorConfig) -> Result<Self, Error> {
        let path = format!("/dev/i2c-{}", config.bus);
        let dev = I2cdev::new(&path)
            .map_err(|e| Error::Connection(format!("Failed to open {}: {}", path, e)))?;

        Self::new(dev, config.address, config.chip)
    }
}

impl<I2C, E> Bmx280<I2C>
where
    I2C: Read<Error = E> + Write<Error = E> + WriteRead<Error = E>,
    E: Debug,
{
    pub fn new(i2c: I2C, address: u8, chip: Chip) -> Result<Self, Error> {
        let mut driver = BME280::new(i2c, address, Delay);

        driver.init().map_err(|e| {
            Error::Connection(format!(
                "Failed to initialize {} at {:#04x}: {:?}",
                chip, address, e
            ))
        })?;

        Ok(Self {
            driver,
            chip,
            cycle: None,
        })
    }

    /// Every quantity of a cycle is served from the same conversions. The
    /// first read of a cycle runs them, averaging more passes as `accuracy`
    /// rises.
    fn reading(&mut self, quantity: Quantity, accuracy: Accuracy) -> Result<Reading, ReadError> {
        if let Some((cached, reading)) = self.cycle {
            if cached == accuracy {
                return Ok(reading);
            }
        }

        let passes = passes(accuracy);
        let mut total = Reading {
            temperature: 0.0,
            pressure: 0.0,
            humidity: 0.0,
        };
        for _ in 0..passes {
            let m = self
                .driver
                .measure()
                .map_err(|e| ReadError::bus(quantity, format!("{:?}", e)))?;
            total.temperature += f64::from(m.temperature);
            total.pressure += f64::from(m.pressure);
            total.humidity += f64::from(m.humidity);
        }
        debug!("{} averaged over {} conversion(s)", self.chip, passes);

        let n = f64::from(passes);
        let reading = Reading {
            temperature: total.temperature / n,
            pressure: total.pressure / n,
            humidity: total.humidity / n,
        };
        self.cycle = Some((accuracy, reading));
        Ok(reading)
    }
}

fn passes(accuracy: Accuracy) -> u32 {
    match accuracy {
        Accuracy::UltraLow | Accuracy::Low | Accuracy::Standard => 1,
        Accuracy::High => 2,
        Accuracy::UltraHigh => 4,
    }
}

impl<I2C, E> Sensor for Bmx280<I2C>
where
    I2C: Read<Error = E> + Write<Error = E> + WriteRead<Error = E> + Send + 'static,
    E: Debug,
{
    fn chip(&self) -> Chip {
        self.chip
    }

    fn begin_cycle(&mut self) {
        self.cycle = None;
    }

    fn read_temperature(&mut self, accuracy: Accuracy) -> Result<f64, ReadError> {
        Ok(self.reading(Quantity::Temperature, accuracy)?.temperature)
    }

    fn read_pressure(&mut self, accuracy: Accuracy) -> Result<f64, ReadError> {
        Ok(self.reading(Quantity::Pressure, accuracy)?.pressure)
    }

    fn read_humidity(&mut self, accuracy: Accuracy) -> Result<f64, ReadError> {
        if !self.chip.has_humidity() {
            return Err(ReadError::Unsupported(Quantity::Humidity));
        }
        Ok(self.reading(Quantity::Humidity, accuracy)?.humidity)
    }
}
