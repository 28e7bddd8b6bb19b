use {
    barometer::{
        config::{ExporterConfig, SensorConfig},
        error::Quantity,
        http::{Exporter, ScrapeMode},
        sampling::{ReadErrorPolicy, SensorReader},
        sensors::{Accuracy, Chip, FakeSensor, Sensor},
        shutdown::{self, Trigger},
        sinks::MetricsSink,
        Error,
    },
    hyper::{header, Method, StatusCode},
    std::{
        net::SocketAddr,
        sync::Arc,
        time::{Duration, Instant},
    },
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        task::JoinHandle,
        time::{sleep, timeout},
    },
};

fn exporter(sensor: FakeSensor) -> Arc<Exporter<SensorReader<FakeSensor>>> {
    let chip = sensor.chip();
    let reader = Arc::new(SensorReader::new(sensor, Accuracy::Standard, Duration::from_secs(5)));
    let sink = Arc::new(MetricsSink::new(chip, reader.health()));
    Arc::new(Exporter::new(reader, sink, ScrapeMode::OnDemand))
}

async fn start(
    sensor: FakeSensor,
    refresh_interval: Option<Duration>,
    on_read_error: ReadErrorPolicy,
) -> (SocketAddr, Trigger, JoinHandle<anyhow::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listen_address = listener.local_addr().unwrap();
    let config = ExporterConfig {
        sensor: SensorConfig {
            chip: sensor.chip(),
            on_read_error,
            ..SensorConfig::default()
        },
        listen_address,
        refresh_interval,
    };
    let (trigger, shutdown) = shutdown::channel();
    let handle = tokio::spawn(async move {
        barometer::export_samples(sensor, &config, listener, shutdown).await
    });
    (listen_address, trigger, handle)
}

/// Sends `method path` on a fresh connection and returns the raw response.
async fn request(address: SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(address).await.unwrap();
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
        method, path
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

/// Returns the status code and body of a plain GET.
async fn get(address: SocketAddr, path: &str) -> (u16, String) {
    let response = request(address, "GET", path).await;
    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let status = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    (status, body.to_string())
}

#[tokio::test]
async fn scrape_reads_sensor_and_renders_metrics() {
    let (address, trigger, handle) = start(
        FakeSensor::new(Chip::Bme280, 22.5, 101_325.0).with_humidity(48.5),
        None,
        ReadErrorPolicy::Skip,
    )
    .await;

    let (status, body) = get(address, "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("# TYPE temperature gauge\ntemperature 22.5 "));
    assert!(body.contains("\npressure 101325 "));
    assert!(body.contains("\naltitude 0 "));
    assert!(body.contains("\nhumidity 48.5 "));
    assert!(body.contains("\nsensor_reads_total 1\n"));
    assert!(body.contains("\nsensor_read_errors_total 0\n"));

    trigger.fire();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
    assert!(TcpStream::connect(address).await.is_err());
}

#[tokio::test]
async fn failing_read_returns_error_not_stale_values() {
    let sensor = FakeSensor::new(Chip::Bmp280, 22.5, 101_325.0);
    let control = sensor.control();
    let (address, trigger, handle) = start(sensor, None, ReadErrorPolicy::Skip).await;

    assert_eq!(get(address, "/metrics").await.0, 200);

    control.set_failing(Some(Quantity::Pressure));
    let (status, body) = get(address, "/metrics").await;
    assert_eq!(status, 503);
    assert!(!body.contains("temperature"));
    assert!(body.contains("pressure"));

    // A failed scrape does not take the service down.
    control.set_failing(None);
    let (status, body) = get(address, "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("\nsensor_read_errors_total 1\n"));

    trigger.fire();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn descriptors_do_not_touch_the_bus() {
    let sensor = FakeSensor::new(Chip::Bme280, 22.5, 101_325.0);
    let control = sensor.control();
    let (address, trigger, handle) = start(sensor, None, ReadErrorPolicy::Skip).await;

    let (status, body) = get(address, "/descriptors").await;
    assert_eq!(status, 200);
    for name in ["temperature", "pressure", "altitude", "humidity"] {
        assert!(body.contains(&format!("# TYPE {} gauge\n", name)), "missing {}", name);
    }
    assert_eq!(control.bus_reads(), 0);

    assert_eq!(get(address, "/nope").await.0, 404);

    trigger.fire();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scrapes_are_serialized() {
    let latency = Duration::from_millis(20);
    let sensor = FakeSensor::new(Chip::Bmp280, 22.5, 101_325.0).with_latency(latency);
    let control = sensor.control();
    let exporter = exporter(sensor);

    let start = Instant::now();
    let scrapes: Vec<_> = (0..5)
        .map(|_| {
            let exporter = exporter.clone();
            tokio::spawn(async move { exporter.route(&Method::GET, "/metrics").await.status() })
        })
        .collect();
    for scrape in scrapes {
        assert_eq!(scrape.await.unwrap(), StatusCode::OK);
    }

    // Two bus reads per sample on a BMP280, none overlapping.
    assert!(start.elapsed() >= latency * 10);
    assert_eq!(control.bus_reads(), 10);
    assert_eq!(control.max_in_flight(), 1);
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let exporter = exporter(FakeSensor::new(Chip::Bmp280, 22.5, 101_325.0));
    let response = exporter.route(&Method::POST, "/metrics").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
    assert_eq!(exporter.route(&Method::GET, "/metrics").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn head_and_query_strings_are_served() {
    let (address, trigger, handle) = start(
        FakeSensor::new(Chip::Bmp280, 22.5, 101_325.0),
        None,
        ReadErrorPolicy::Skip,
    )
    .await;

    let response = request(address, "HEAD", "/metrics").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);
    assert!(response.ends_with("\r\n\r\n"), "HEAD carried a body: {}", response);

    assert_eq!(get(address, "/metrics?name=temperature").await.0, 200);

    trigger.fire();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn unterminated_request_is_not_served() {
    let sensor = FakeSensor::new(Chip::Bmp280, 22.5, 101_325.0);
    let control = sensor.control();
    let (address, trigger, handle) = start(sensor, None, ReadErrorPolicy::Skip).await;

    // Request line and a header, then EOF without the blank line.
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(b"GET /metrics HTTP/1.1\r\nHost: test\r\n").await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = String::new();
    let _ = stream.read_to_string(&mut response).await;

    assert!(!response.starts_with("HTTP/1.1 200"), "{}", response);
    assert_eq!(control.bus_reads(), 0);

    trigger.fire();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn cached_mode_serves_background_samples() {
    let sensor = FakeSensor::new(Chip::Bmp280, 19.0, 100_000.0);
    let control = sensor.control();
    let (address, trigger, handle) =
        start(sensor, Some(Duration::from_millis(10)), ReadErrorPolicy::Skip).await;

    let mut status = 0;
    for _ in 0..50 {
        status = get(address, "/metrics").await.0;
        if status == 200 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, 200);

    // Once a background cycle fails the cache is dropped rather than served stale.
    control.set_failing(Some(Quantity::Temperature));
    sleep(Duration::from_millis(50)).await;
    let (status, body) = get(address, "/metrics").await;
    assert_eq!(status, 503);
    assert_eq!(body, "no sample available\n");

    trigger.fire();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn exit_policy_makes_read_failure_fatal() {
    let sensor = FakeSensor::new(Chip::Bmp280, 22.5, 101_325.0).fail_on(Quantity::Temperature);
    let (address, _trigger, handle) = start(sensor, None, ReadErrorPolicy::Exit).await;

    let mut stream = TcpStream::connect(address).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut ignored = Vec::new();
    let _ = stream.read_to_end(&mut ignored).await;

    let err = timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Read(_))));
}
