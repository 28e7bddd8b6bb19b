//! Command line flags with environment variable fallbacks.
//!
//! A flag always wins over its environment variable, which wins over the
//! built-in default.

use {
    crate::{
        error::Error,
        sampling::ReadErrorPolicy,
        sensors::{Accuracy, Chip, PRIMARY_ADDRESS},
    },
    std::{collections::HashMap, env, net::SocketAddr, str::FromStr, time::Duration},
};

pub const DEFAULT_BUS: u8 = 1;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_LISTEN_ADDRESS: &str = ":9110";
/// Usual address of a PCF8574 LCD backpack.
pub const DEFAULT_LCD_ADDRESS: u8 = 0x27;

const SENSOR_USAGE: &str = "\
  --bus <number>              I2C bus index, opened as /dev/i2c-<number> (env BAROMETER_I2C_BUS, default: 1)
  --address <addr>            Sensor I2C address, usually 0x76 or 0x77 (env BAROMETER_I2C_ADDRESS, default: 0x76)
  --chip <bmp280|bme280>      Chip variant; bme280 adds humidity (env BAROMETER_CHIP, default: bmp280)
  --accuracy <level>          ultra_low, low, standard, high or ultra_high (env BAROMETER_ACCURACY, default: standard)
  --read-timeout-ms <number>  Upper bound on one sensor read (env BAROMETER_READ_TIMEOUT_MS, default: 500)
  --exit-on-read-error        Exit instead of skipping a failed read (env BAROMETER_EXIT_ON_READ_ERROR)
  -h, --help                  Show this help
";

/// How to reach the sensor and how to read it.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    pub bus: u8,
    pub address: u8,
    pub chip: Chip,
    pub accuracy: Accuracy,
    pub read_timeout: Duration,
    pub on_read_error: ReadErrorPolicy,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bus: DEFAULT_BUS,
            address: PRIMARY_ADDRESS,
            chip: Chip::Bmp280,
            accuracy: Accuracy::Standard,
            read_timeout: DEFAULT_READ_TIMEOUT,
            on_read_error: ReadErrorPolicy::Skip,
        }
    }
}

/// Character display mirroring the logged samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcdConfig {
    pub bus: u8,
    pub address: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub sensor: SensorConfig,
    pub interval: Duration,
    /// Also show each sample on a 16x2 LCD.
    pub lcd: Option<LcdConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    pub sensor: SensorConfig,
    pub listen_address: SocketAddr,
    /// Sample in the background at this period and serve the cached sample,
    /// instead of reading the sensor inside each scrape.
    pub refresh_interval: Option<Duration>,
}

/// Either a configuration to run with or a request to print usage.
#[derive(Debug, PartialEq)]
pub enum Parsed<T> {
    Run(T),
    Help,
}

impl LoggerConfig {
    pub fn usage() -> String {
        format!(
            "barometer-logger - log BMP280/BME280 readings\n\nUSAGE:\n  barometer-logger [OPTIONS]\n\nOPTIONS:\n  --interval-ms <number>      Sampling period (env BAROMETER_INTERVAL_MS, default: 1000)\n  --lcd                       Show samples on a 16x2 I2C LCD (env BAROMETER_LCD)\n  --lcd-bus <number>          LCD I2C bus (env BAROMETER_LCD_BUS, default: sensor bus)\n  --lcd-address <addr>        LCD I2C address (env BAROMETER_LCD_ADDRESS, default: 0x27)\n{}",
            SENSOR_USAGE
        )
    }

    pub fn from_env_args() -> Result<Parsed<Self>, Error> {
        Self::parse(env::args().skip(1), |key| env::var(key).ok())
    }

    pub fn parse<A, V>(args: A, var: V) -> Result<Parsed<Self>, Error>
    where
        A: IntoIterator<Item = String>,
        V: Fn(&str) -> Option<String>,
    {
        let mut flags = match Flags::collect(args, &["--interval-ms", "--lcd-bus", "--lcd-address"])? {
            Some(flags) => flags,
            None => return Ok(Parsed::Help),
        };
        let sensor = flags.sensor(&var)?;
        let interval = flags
            .value("--interval-ms", "BAROMETER_INTERVAL_MS", &var)
            .map(|v| millis("--interval-ms", &v))
            .transpose()?
            .unwrap_or(DEFAULT_INTERVAL);
        let lcd = flags.lcd(&sensor, &var)?;
        flags.finish()?;

        if interval.is_zero() {
            return Err(Error::Config("--interval-ms must be positive".into()));
        }

        Ok(Parsed::Run(Self {
            sensor,
            interval,
            lcd,
        }))
    }
}

impl ExporterConfig {
    pub fn usage() -> String {
        format!(
            "barometer-exporter - serve BMP280/BME280 readings as Prometheus metrics\n\nUSAGE:\n  barometer-exporter [OPTIONS]\n\nOPTIONS:\n  --listen-address <addr>     Metrics bind address, ':port' for all interfaces (env BAROMETER_LISTEN_ADDRESS, default: :9110)\n  --refresh-interval-ms <n>   Read in the background and serve the cached sample (env BAROMETER_REFRESH_INTERVAL_MS)\n{}",
            SENSOR_USAGE
        )
    }

    pub fn from_env_args() -> Result<Parsed<Self>, Error> {
        Self::parse(env::args().skip(1), |key| env::var(key).ok())
    }

    pub fn parse<A, V>(args: A, var: V) -> Result<Parsed<Self>, Error>
    where
        A: IntoIterator<Item = String>,
        V: Fn(&str) -> Option<String>,
    {
        let mut flags = match Flags::collect(args, &["--listen-address", "--refresh-interval-ms"])? {
            Some(flags) => flags,
            None => return Ok(Parsed::Help),
        };
        let sensor = flags.sensor(&var)?;
        let listen_address = parse_listen_address(
            &flags
                .value("--listen-address", "BAROMETER_LISTEN_ADDRESS", &var)
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string()),
        )?;
        let refresh_interval = flags
            .value("--refresh-interval-ms", "BAROMETER_REFRESH_INTERVAL_MS", &var)
            .map(|v| millis("--refresh-interval-ms", &v))
            .transpose()?;
        flags.finish()?;

        if refresh_interval.map_or(false, |d| d.is_zero()) {
            return Err(Error::Config("--refresh-interval-ms must be positive".into()));
        }

        Ok(Parsed::Run(Self {
            sensor,
            listen_address,
            refresh_interval,
        }))
    }
}

/// Accepts `host:port`, or `:port` meaning every interface.
pub fn parse_listen_address(s: &str) -> Result<SocketAddr, Error> {
    let full = if s.starts_with(':') {
        format!("0.0.0.0{}", s)
    } else {
        s.to_string()
    };
    full.parse()
        .map_err(|_| Error::Config(format!("invalid listen address {:?}", s)))
}

/// Accepts `0x76`, `0X77` or decimal.
pub fn parse_address(s: &str) -> Result<u8, Error> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| Error::Config(format!("invalid I2C address {:?}", s)))
}

fn millis(flag: &str, value: &str) -> Result<Duration, Error> {
    value
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| Error::Config(format!("{} expects milliseconds, got {:?}", flag, value)))
}

fn number<T: FromStr>(flag: &str, value: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value {:?} for {}", value, flag)))
}

fn truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

const SENSOR_FLAGS: &[&str] = &["--bus", "--address", "--chip", "--accuracy", "--read-timeout-ms"];
const SWITCHES: &[&str] = &["--exit-on-read-error", "--lcd"];

struct Flags {
    values: HashMap<String, String>,
}

impl Flags {
    /// Returns `None` when help was requested.
    fn collect<A>(args: A, extra: &[&str]) -> Result<Option<Self>, Error>
    where
        A: IntoIterator<Item = String>,
    {
        let mut values = HashMap::new();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "-h" || arg == "--help" {
                return Ok(None);
            }
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };
            if SWITCHES.contains(&flag.as_str()) {
                values.insert(flag, inline.unwrap_or_else(|| "true".to_string()));
                continue;
            }
            if !SENSOR_FLAGS.contains(&flag.as_str()) && !extra.contains(&flag.as_str()) {
                return Err(Error::Config(format!("unknown argument {:?}", flag)));
            }
            let value = match inline.or_else(|| args.next()) {
                Some(value) => value,
                None => return Err(Error::Config(format!("{} expects a value", flag))),
            };
            values.insert(flag, value);
        }
        Ok(Some(Self { values }))
    }

    fn value<V>(&mut self, flag: &str, key: &str, var: &V) -> Option<String>
    where
        V: Fn(&str) -> Option<String>,
    {
        self.values.remove(flag).or_else(|| var(key))
    }

    fn sensor<V>(&mut self, var: &V) -> Result<SensorConfig, Error>
    where
        V: Fn(&str) -> Option<String>,
    {
        let defaults = SensorConfig::default();
        let bus = match self.value("--bus", "BAROMETER_I2C_BUS", var) {
            Some(v) => number("--bus", &v)?,
            None => defaults.bus,
        };
        let address = match self.value("--address", "BAROMETER_I2C_ADDRESS", var) {
            Some(v) => parse_address(&v)?,
            None => defaults.address,
        };
        let chip = match self.value("--chip", "BAROMETER_CHIP", var) {
            Some(v) => v.parse()?,
            None => defaults.chip,
        };
        let accuracy = match self.value("--accuracy", "BAROMETER_ACCURACY", var) {
            Some(v) => v.parse()?,
            None => defaults.accuracy,
        };
        let read_timeout = match self.value("--read-timeout-ms", "BAROMETER_READ_TIMEOUT_MS", var) {
            Some(v) => millis("--read-timeout-ms", &v)?,
            None => defaults.read_timeout,
        };
        let on_read_error = match self.value("--exit-on-read-error", "BAROMETER_EXIT_ON_READ_ERROR", var) {
            Some(v) if truthy(&v) => ReadErrorPolicy::Exit,
            _ => ReadErrorPolicy::Skip,
        };

        if read_timeout.is_zero() {
            return Err(Error::Config("--read-timeout-ms must be positive".into()));
        }

        Ok(SensorConfig {
            bus,
            address,
            chip,
            accuracy,
            read_timeout,
            on_read_error,
        })
    }

    /// The display is off unless `--lcd` is set; its bus defaults to the sensor's.
    fn lcd<V>(&mut self, sensor: &SensorConfig, var: &V) -> Result<Option<LcdConfig>, Error>
    where
        V: Fn(&str) -> Option<String>,
    {
        let enabled = self.value("--lcd", "BAROMETER_LCD", var).map_or(false, |v| truthy(&v));
        let bus = match self.value("--lcd-bus", "BAROMETER_LCD_BUS", var) {
            Some(v) => number("--lcd-bus", &v)?,
            None => sensor.bus,
        };
        let address = match self.value("--lcd-address", "BAROMETER_LCD_ADDRESS", var) {
            Some(v) => parse_address(&v)?,
            None => DEFAULT_LCD_ADDRESS,
        };

        Ok(enabled.then_some(LcdConfig { bus, address }))
    }

    fn finish(self) -> Result<(), Error> {
        match self.values.keys().next() {
            Some(flag) => Err(Error::Config(format!("{} is not accepted here", flag))),
            None => Ok(()),
        }
    }
}
