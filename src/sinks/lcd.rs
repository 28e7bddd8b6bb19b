//! HD44780 character display behind a PCF8574 I2C backpack, driven in
//! 4-bit mode.

use {
    super::Sink,
    crate::{config::LcdConfig, error::Error, sample::Sample},
    embedded_hal::blocking::{delay::DelayMs, i2c::Write},
    linux_embedded_hal::{Delay, I2cdev},
    log::{info, warn},
    std::{
        fmt::Debug,
        sync::{Mutex, PoisonError},
    },
};

pub const COLUMNS: usize = 16;
pub const ROWS: usize = 2;

// PCF8574 outputs: P0 register select, P2 enable, P3 backlight, P4-P7 data.
const RS: u8 = 0x01;
const ENABLE: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CLEAR: u8 = 0x01;
const ENTRY_LEFT: u8 = 0x06;
const DISPLAY_ON: u8 = 0x0C;
const FUNCTION_4BIT_2LINE: u8 = 0x28;
const SET_DDRAM: u8 = 0x80;
const ROW_OFFSETS: [u8; ROWS] = [0x00, 0x40];

pub struct Lcd<I2C> {
    i2c: I2C,
    address: u8,
    delay: Delay,
}

impl<I2C, E> Lcd<I2C>
where
    I2C: Write<Error = E>,
    E: Debug,
{
    pub fn new(i2c: I2C, address: u8) -> Result<Self, Error> {
        let mut lcd = Self {
            i2c,
            address,
            delay: Delay,
        };
        lcd.init().map_err(|e| {
            Error::Connection(format!("Failed to initialize LCD at {:#04x}: {:?}", address, e))
        })?;

        Ok(lcd)
    }

    fn init(&mut self) -> Result<(), E> {
        self.delay.delay_ms(20u8);
        // Resynchronize in 8-bit mode whatever state the controller is in.
        for wait in [5u8, 1, 1] {
            self.nibble(0x03, 0)?;
            self.delay.delay_ms(wait);
        }
        self.nibble(0x02, 0)?;

        self.command(FUNCTION_4BIT_2LINE)?;
        self.command(DISPLAY_ON)?;
        self.clear()?;
        self.command(ENTRY_LEFT)
    }

    fn nibble(&mut self, nibble: u8, mode: u8) -> Result<(), E> {
        let byte = (nibble << 4) | BACKLIGHT | mode;
        self.i2c.write(self.address, &[byte | ENABLE])?;
        self.i2c.write(self.address, &[byte])
    }

    fn send(&mut self, byte: u8, mode: u8) -> Result<(), E> {
        self.nibble(byte >> 4, mode)?;
        self.nibble(byte & 0x0F, mode)
    }

    fn command(&mut self, command: u8) -> Result<(), E> {
        self.send(command, 0)
    }

    pub fn clear(&mut self) -> Result<(), E> {
        self.command(CLEAR)?;
        self.delay.delay_ms(2u8);
        Ok(())
    }

    /// Overwrites `row`, padding or truncating `text` to the display width.
    /// Characters outside ASCII are shown as `?`.
    pub fn write_line(&mut self, row: usize, text: &str) -> Result<(), E> {
        self.command(SET_DDRAM | ROW_OFFSETS[row % ROWS])?;
        for c in text.chars().chain(std::iter::repeat(' ')).take(COLUMNS) {
            let byte = if c.is_ascii() { c as u8 } else { b'?' };
            self.send(byte, RS)?;
        }
        Ok(())
    }
}

/// Humidity and temperature on the first row, pressure and altitude on the
/// second.
pub fn lines(sample: &Sample) -> [String; ROWS] {
    let humidity = match sample.humidity_rh {
        Some(h) => format!("{:.1}", h),
        None => "--".to_string(),
    };
    [
        format!("H:{:<6}T:{:.1}", humidity, sample.temperature_c),
        format!("P:{:<7.0}A:{:.0}m", sample.pressure_pa, sample.altitude_m),
    ]
}

/// Shows the latest sample on a character display.
pub struct LcdSink<I2C = I2cdev> {
    lcd: Mutex<Lcd<I2C>>,
}

impl LcdSink<I2cdev> {
    /// Opens `/dev/i2c-<bus>` and initializes the display at the configured address.
    pub fn open(config: &LcdConfig) -> Result<Self, Error> {
        let path = format!("/dev/i2c-{}", config.bus);
        info!("Connecting to LCD on {} at {:#04x}", path, config.address);
        let dev = I2cdev::new(&path)
            .map_err(|e| Error::Connection(format!("Failed to open {}: {}", path, e)))?;

        Ok(Self::new(Lcd::new(dev, config.address)?))
    }
}

impl<I2C, E> LcdSink<I2C>
where
    I2C: Write<Error = E>,
    E: Debug,
{
    pub fn new(lcd: Lcd<I2C>) -> Self {
        Self { lcd: Mutex::new(lcd) }
    }

    fn show(&self, lines: &[String]) {
        let mut lcd = self.lcd.lock().unwrap_or_else(PoisonError::into_inner);
        for (row, line) in lines.iter().enumerate() {
            if let Err(e) = lcd.write_line(row, line) {
                warn!("Failed to update LCD: {:?}", e);
                return;
            }
        }
    }
}

impl<I2C, E> Sink for LcdSink<I2C>
where
    I2C: Write<Error = E> + Send + 'static,
    E: Debug,
{
    fn publish(&self, sample: &Sample) {
        self.show(&lines(sample));
    }

    fn invalidate(&self) {
        self.show(&["Sensor error".to_string(), String::new()]);
    }
}
