//! Poll a BMP280/BME280 environmental sensor over I2C and publish its
//! readings, either as log lines or as a Prometheus metrics endpoint.

use {
    anyhow::Result,
    config::{ExporterConfig, LoggerConfig, SensorConfig},
    http::{Exporter, ScrapeMode},
    log::{error, info, LevelFilter},
    sampling::{SamplingLoop, SensorReader},
    sensors::{Bmx280, Sensor},
    shutdown::Shutdown,
    sinks::{LcdSink, LogSink, MetricsSink, Sink},
    std::{env, sync::Arc},
    tokio::{net::TcpListener, task},
};

pub mod config;
pub mod error;
pub mod exposition;
pub mod http;
pub mod sample;
pub mod sampling;
pub mod sensors;
pub mod shutdown;
pub mod sinks;

pub use {error::Error, sample::Sample};

/// Installs the logger and panic handler. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_logging() {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(LevelFilter::Info);
    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let _ = builder.try_init();
    color_backtrace::install();
}

/// Standalone variant: log one line per sample until SIGINT/SIGTERM.
pub async fn logger(config: LoggerConfig) -> Result<()> {
    let sensor = open(&config.sensor)?;
    let display = config
        .lcd
        .as_ref()
        .map(LcdSink::open)
        .transpose()
        .map_err(|e| fatal(e.into()))?;
    let shutdown = listen_for_signals();

    log_samples(sensor, display, &config, shutdown).await.map_err(fatal)
}

/// Exporter variant: serve `/metrics` until SIGINT/SIGTERM.
pub async fn exporter(config: ExporterConfig) -> Result<()> {
    let sensor = open(&config.sensor)?;
    let listener = http::bind(config.listen_address).await.map_err(|e| fatal(e.into()))?;
    let shutdown = listen_for_signals();

    export_samples(sensor, &config, listener, shutdown).await.map_err(fatal)
}

fn open(config: &SensorConfig) -> Result<Bmx280> {
    info!(
        "Connecting to {} on /dev/i2c-{} at {:#04x}",
        config.chip, config.bus, config.address
    );
    Bmx280::open(config).map_err(|e| fatal(e.into()))
}

fn listen_for_signals() -> Shutdown {
    let (trigger, shutdown) = shutdown::channel();
    task::spawn(shutdown::on_signal(trigger));
    shutdown
}

fn fatal(e: anyhow::Error) -> anyhow::Error {
    error!("{:#}", e);
    e
}

/// Runs the sampling loop against `sensor` with a [`LogSink`], mirroring each
/// sample to `display` when there is one. The sensor is released when this
/// returns.
pub async fn log_samples<S: Sensor, D: Sink>(
    sensor: S,
    display: Option<D>,
    config: &LoggerConfig,
    shutdown: Shutdown,
) -> Result<()> {
    let reader = Arc::new(SensorReader::new(
        sensor,
        config.sensor.accuracy,
        config.sensor.read_timeout,
    ));
    let sampling = SamplingLoop::new(
        reader,
        Arc::new((LogSink, display)),
        config.interval,
        config.sensor.on_read_error,
    );

    sampling.run(shutdown).await.map_err(Error::from)?;
    info!("exit");
    Ok(())
}

/// Serves metrics for `sensor` on `listener`. With a refresh interval a
/// background loop feeds the cache; otherwise each scrape reads the sensor.
pub async fn export_samples<S: Sensor>(
    sensor: S,
    config: &ExporterConfig,
    listener: TcpListener,
    shutdown: Shutdown,
) -> Result<()> {
    let chip = sensor.chip();
    let reader = Arc::new(SensorReader::new(
        sensor,
        config.sensor.accuracy,
        config.sensor.read_timeout,
    ));
    let sink = Arc::new(MetricsSink::new(chip, reader.health()));
    let policy = config.sensor.on_read_error;

    match config.refresh_interval {
        None => {
            let (fatal_tx, fatal_rx) = async_channel::bounded(1);
            let exporter = Arc::new(
                Exporter::new(reader, sink, ScrapeMode::OnDemand).with_policy(policy, fatal_tx),
            );

            tokio::select! {
                served = http::serve(listener, exporter, shutdown) => served?,
                Ok(e) = fatal_rx.recv() => return Err(Error::from(e).into()),
            }
        }
        Some(period) => {
            let exporter = Arc::new(Exporter::new(reader.clone(), sink.clone(), ScrapeMode::Cached));
            let sampling = SamplingLoop::new(reader, sink, period, policy);

            tokio::try_join!(http::serve(listener, exporter, shutdown.clone()), async {
                sampling.run(shutdown.clone()).await.map_err(anyhow::Error::from)
            })?;
        }
    }

    info!("exit");
    Ok(())
}
