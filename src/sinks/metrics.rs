use {
    super::Sink,
    crate::{
        exposition::Descriptor,
        sample::Sample,
        sampling::Health,
        sensors::Chip,
    },
    std::{
        fmt::{self, Write},
        sync::{Arc, PoisonError, RwLock},
    },
};

const TEMPERATURE: Descriptor = Descriptor::gauge("temperature").with_help("Temperature in degrees Celsius.");
const PRESSURE: Descriptor = Descriptor::gauge("pressure").with_help("Atmospheric pressure in pascals.");
const ALTITUDE: Descriptor =
    Descriptor::gauge("altitude").with_help("Altitude in meters above sea level, assuming 101325 Pa at sea level.");
const HUMIDITY: Descriptor = Descriptor::gauge("humidity").with_help("Relative humidity in percent.");
const READS_TOTAL: Descriptor = Descriptor::counter("sensor_reads_total").with_help("Sensor read cycles attempted.");
const READ_ERRORS_TOTAL: Descriptor =
    Descriptor::counter("sensor_read_errors_total").with_help("Sensor read cycles that failed.");

/// Renders samples as Prometheus metrics and keeps the most recent one.
///
/// Descriptors depend only on the chip variant, so they can be listed
/// without reading the sensor.
pub struct MetricsSink {
    chip: Chip,
    health: Arc<Health>,
    latest: RwLock<Option<Sample>>,
}

impl MetricsSink {
    pub fn new(chip: Chip, health: Arc<Health>) -> Self {
        Self {
            chip,
            health,
            latest: RwLock::new(None),
        }
    }

    pub fn descriptors(&self) -> Vec<Descriptor> {
        let mut descriptors = vec![TEMPERATURE, PRESSURE, ALTITUDE];
        if self.chip.has_humidity() {
            descriptors.push(HUMIDITY);
        }
        descriptors.push(READS_TOTAL);
        descriptors.push(READ_ERRORS_TOTAL);
        descriptors
    }

    /// `# HELP` and `# TYPE` lines for every metric, without values.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for descriptor in self.descriptors() {
            // Writing into a String cannot fail.
            let _ = descriptor.render_header(&mut out);
        }
        out
    }

    /// Full exposition for `sample`, gauges stamped with its collection time.
    pub fn render(&self, sample: &Sample) -> String {
        let mut out = String::new();
        let _ = self.render_into(sample, &mut out);
        out
    }

    fn render_into(&self, sample: &Sample, w: &mut impl Write) -> fmt::Result {
        let ts = Some(sample.collected_at.timestamp_millis());

        TEMPERATURE.render(w, sample.temperature_c, ts)?;
        PRESSURE.render(w, sample.pressure_pa, ts)?;
        ALTITUDE.render(w, sample.altitude_m, ts)?;
        if let Some(humidity) = sample.humidity_rh {
            HUMIDITY.render(w, humidity, ts)?;
        }
        READS_TOTAL.render(w, self.health.reads() as f64, None)?;
        READ_ERRORS_TOTAL.render(w, self.health.failures() as f64, None)
    }

    pub fn latest(&self) -> Option<Sample> {
        self.latest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Sink for MetricsSink {
    fn publish(&self, sample: &Sample) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(sample.clone());
    }

    fn invalidate(&self) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
