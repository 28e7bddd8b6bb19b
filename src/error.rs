use std::{error, fmt, io, net::SocketAddr, time::Duration};

/// One physical quantity of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Temperature,
    Pressure,
    Humidity,
    Altitude,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Temperature => "temperature",
            Quantity::Pressure => "pressure",
            Quantity::Humidity => "humidity",
            Quantity::Altitude => "altitude",
        };
        f.write_str(name)
    }
}

/// A failed read cycle. The whole cycle is discarded when one of these occurs.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadError {
    /// The bus transaction for a quantity failed.
    Bus { quantity: Quantity, message: String },
    /// The chip variant has no element for this quantity.
    Unsupported(Quantity),
    /// The driver returned a value that is not a finite number.
    Invalid { quantity: Quantity, value: f64 },
    /// The read did not complete within the configured bound.
    Timeout(Duration),
    /// The blocking read task was lost (panicked or cancelled).
    Worker(String),
}

impl ReadError {
    pub fn bus(quantity: Quantity, message: impl Into<String>) -> Self {
        ReadError::Bus {
            quantity,
            message: message.into(),
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Bus { quantity, message } => {
                write!(f, "Failed to read {}: {}", quantity, message)
            }
            ReadError::Unsupported(quantity) => {
                write!(f, "Sensor has no {} element", quantity)
            }
            ReadError::Invalid { quantity, value } => {
                write!(f, "Sensor returned invalid {}: {}", quantity, value)
            }
            ReadError::Timeout(bound) => write!(f, "Sensor read timed out after {:?}", bound),
            ReadError::Worker(message) => write!(f, "Sensor read task failed: {}", message),
        }
    }
}

impl error::Error for ReadError {}

#[derive(Debug)]
pub enum Error {
    /// Opening or configuring the bus connection failed at startup.
    Connection(String),
    /// A read cycle failed.
    Read(ReadError),
    /// The metrics listener could not bind.
    Bind { address: SocketAddr, source: io::Error },
    /// Invalid command line flag or environment variable.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(message) => write!(f, "Failed to connect to sensor: {}", message),
            Error::Read(e) => e.fmt(f),
            Error::Bind { address, source } => {
                write!(f, "Failed to bind metrics listener on {}: {}", address, source)
            }
            Error::Config(message) => write!(f, "Invalid configuration: {}", message),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Read(e) => Some(e),
            Error::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ReadError> for Error {
    fn from(e: ReadError) -> Self {
        Error::Read(e)
    }
}
