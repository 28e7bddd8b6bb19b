use {
    super::{Accuracy, Chip, Sensor},
    crate::error::{Quantity, ReadError},
    std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        thread,
        time::Duration,
    },
};

/// Scripted in-process sensor used in place of real hardware.
pub struct FakeSensor {
    chip: Chip,
    temperature_c: f64,
    pressure_pa: f64,
    humidity_rh: f64,
    latency: Duration,
    control: FakeControl,
}

/// Handle for observing and steering a [`FakeSensor`] after it has been
/// moved into a reader.
#[derive(Clone, Default)]
pub struct FakeControl {
    bus_reads: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    failing: Arc<Mutex<Option<Quantity>>>,
    accuracies: Arc<Mutex<Vec<Accuracy>>>,
}

impl FakeSensor {
    pub fn new(chip: Chip, temperature_c: f64, pressure_pa: f64) -> Self {
        Self {
            chip,
            temperature_c,
            pressure_pa,
            humidity_rh: 0.0,
            latency: Duration::from_millis(0),
            control: FakeControl::default(),
        }
    }

    pub fn with_humidity(mut self, humidity_rh: f64) -> Self {
        self.humidity_rh = humidity_rh;
        self
    }

    /// Every bus transaction blocks the calling thread for `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_on(self, quantity: Quantity) -> Self {
        self.control.set_failing(Some(quantity));
        self
    }

    pub fn control(&self) -> FakeControl {
        self.control.clone()
    }

    pub fn bus_reads(&self) -> usize {
        self.control.bus_reads()
    }

    pub fn accuracies(&self) -> Vec<Accuracy> {
        self.control.accuracies()
    }

    fn transact(&mut self, quantity: Quantity, accuracy: Accuracy, value: f64) -> Result<f64, ReadError> {
        let control = &self.control;
        let now = control.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        control.max_in_flight.fetch_max(now, Ordering::SeqCst);
        control.bus_reads.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = control.accuracies.lock() {
            seen.push(accuracy);
        }

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let failing = control.failing.lock().map(|f| *f).unwrap_or(None);
        control.in_flight.fetch_sub(1, Ordering::SeqCst);

        if failing == Some(quantity) {
            Err(ReadError::bus(quantity, "injected bus failure"))
        } else {
            Ok(value)
        }
    }
}

impl Sensor for FakeSensor {
    fn chip(&self) -> Chip {
        self.chip
    }

    fn read_temperature(&mut self, accuracy: Accuracy) -> Result<f64, ReadError> {
        self.transact(Quantity::Temperature, accuracy, self.temperature_c)
    }

    fn read_pressure(&mut self, accuracy: Accuracy) -> Result<f64, ReadError> {
        self.transact(Quantity::Pressure, accuracy, self.pressure_pa)
    }

    fn read_humidity(&mut self, accuracy: Accuracy) -> Result<f64, ReadError> {
        if !self.chip.has_humidity() {
            return Err(ReadError::Unsupported(Quantity::Humidity));
        }
        self.transact(Quantity::Humidity, accuracy, self.humidity_rh)
    }
}

impl FakeControl {
    pub fn bus_reads(&self) -> usize {
        self.bus_reads.load(Ordering::SeqCst)
    }

    /// Highest number of bus transactions observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, quantity: Option<Quantity>) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = quantity;
        }
    }

    pub fn accuracies(&self) -> Vec<Accuracy> {
        self.accuracies.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}
