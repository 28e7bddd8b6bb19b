use {
    chrono::{DateTime, Utc},
    std::fmt,
};

/// Assumed atmospheric pressure at sea level, in pascals.
pub const SEA_LEVEL_PA: f64 = 101_325.0;

/// One complete read cycle. Only constructed once every required read succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub temperature_c: f64,
    pub pressure_pa: f64,
    /// Absent for chips without a humidity element.
    pub humidity_rh: Option<f64>,
    pub altitude_m: f64,
    pub collected_at: DateTime<Utc>,
}

/// Meters above sea level for a pressure reading, using the international
/// barometric formula against [`SEA_LEVEL_PA`].
pub fn altitude_from_pressure(pressure_pa: f64) -> f64 {
    44_330.0 * (1.0 - (pressure_pa / SEA_LEVEL_PA).powf(1.0 / 5.255))
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temperature = {:.2}C  Pressure = {:.2} Pa  Altitude = {:.2} m",
            self.temperature_c, self.pressure_pa, self.altitude_m
        )?;
        if let Some(humidity) = self.humidity_rh {
            write!(f, "  Humidity = {:.2} %", humidity)?;
        }
        Ok(())
    }
}
