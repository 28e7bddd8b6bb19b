use {
    crate::{
        error::ReadError,
        sample::Sample,
        sensors::{self, Accuracy, Sensor},
        shutdown::Shutdown,
        sinks::Sink,
    },
    log::{info, warn},
    std::{
        future::Future,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::{
        sync::Mutex,
        task,
        time::{interval, timeout, MissedTickBehavior},
    },
};

/// Anything that can produce one complete sample on demand.
pub trait SampleSource: Send + Sync + 'static {
    fn produce_sample(&self) -> impl Future<Output = Result<Sample, ReadError>> + Send;
}

/// What a sampling loop does with a failed read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadErrorPolicy {
    /// Log the failure, keep the connection and try again next cycle.
    Skip,
    /// Stop the loop and surface the error.
    Exit,
}

/// Read attempt and failure counts, shared with the metrics endpoint.
#[derive(Debug, Default)]
pub struct Health {
    reads: AtomicU64,
    failures: AtomicU64,
}

impl Health {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn record(&self, result: &Result<Sample, ReadError>) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Owns the sensor connection and hands out one read at a time.
///
/// Callers queue on the connection in arrival order. Each read runs on the
/// blocking pool and is bounded by `read_timeout`; a read that overruns keeps
/// the connection locked until the bus transaction returns.
pub struct SensorReader<S> {
    sensor: Arc<Mutex<S>>,
    accuracy: Accuracy,
    read_timeout: Duration,
    health: Arc<Health>,
}

impl<S: Sensor> SensorReader<S> {
    pub fn new(sensor: S, accuracy: Accuracy, read_timeout: Duration) -> Self {
        Self {
            sensor: Arc::new(Mutex::new(sensor)),
            accuracy,
            read_timeout,
            health: Arc::new(Health::default()),
        }
    }

    pub fn health(&self) -> Arc<Health> {
        self.health.clone()
    }

    pub async fn read_sample(&self, accuracy: Accuracy) -> Result<Sample, ReadError> {
        let result = self.read_serialized(accuracy).await;
        self.health.record(&result);
        result
    }

    async fn read_serialized(&self, accuracy: Accuracy) -> Result<Sample, ReadError> {
        let mut guard = self.sensor.clone().lock_owned().await;
        let read = task::spawn_blocking(move || sensors::read_sample(&mut *guard, accuracy));

        match timeout(self.read_timeout, read).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ReadError::Worker(e.to_string())),
            Err(_) => Err(ReadError::Timeout(self.read_timeout)),
        }
    }
}

impl<S: Sensor> SampleSource for SensorReader<S> {
    fn produce_sample(&self) -> impl Future<Output = Result<Sample, ReadError>> + Send {
        self.read_sample(self.accuracy)
    }
}

/// Reads from a source at a fixed period and publishes each sample to a sink.
pub struct SamplingLoop<Src, Snk> {
    source: Arc<Src>,
    sink: Arc<Snk>,
    period: Duration,
    policy: ReadErrorPolicy,
}

impl<Src: SampleSource, Snk: Sink> SamplingLoop<Src, Snk> {
    pub fn new(source: Arc<Src>, sink: Arc<Snk>, period: Duration, policy: ReadErrorPolicy) -> Self {
        Self {
            source,
            sink,
            period,
            policy,
        }
    }

    /// Runs until `shutdown` fires. Shutdown is only observed between cycles,
    /// so an in-flight read always completes and is published first.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ReadError> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            match self.source.produce_sample().await {
                Ok(sample) => self.sink.publish(&sample),
                Err(e) => {
                    self.sink.invalidate();
                    match self.policy {
                        ReadErrorPolicy::Skip => warn!("Skipping cycle: {}", e),
                        ReadErrorPolicy::Exit => return Err(e),
                    }
                }
            }
        }

        info!("Sampling stopped");
        Ok(())
    }
}
