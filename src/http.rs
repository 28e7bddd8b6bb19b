//! HTTP endpoint serving `/metrics` and `/descriptors`.

use {
    crate::{
        error::{Error, ReadError},
        exposition,
        sampling::{ReadErrorPolicy, SampleSource},
        shutdown::Shutdown,
        sinks::{MetricsSink, Sink},
    },
    anyhow::Result,
    async_channel::Sender,
    hyper::{
        header::{self, HeaderValue},
        server::conn::{AddrIncoming, AddrStream},
        service::{make_service_fn, service_fn},
        Body, Method, Request, Response, Server, StatusCode,
    },
    log::{info, warn},
    std::{convert::Infallible, net::SocketAddr, sync::Arc},
    tokio::net::TcpListener,
};

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// Where a scrape gets its sample from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    /// Read the sensor inside every scrape.
    OnDemand,
    /// Serve the sample last published by a background sampling loop.
    Cached,
}

fn text(status: StatusCode, content_type: &'static str, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn metrics(body: String) -> Response<Body> {
    text(StatusCode::OK, exposition::CONTENT_TYPE, body)
}

fn error(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut body = message.into();
    body.push('\n');
    text(status, PLAIN_TEXT, body)
}

pub struct Exporter<Src> {
    source: Arc<Src>,
    sink: Arc<MetricsSink>,
    mode: ScrapeMode,
    fatal: Option<Sender<ReadError>>,
}

impl<Src: SampleSource> Exporter<Src> {
    pub fn new(source: Arc<Src>, sink: Arc<MetricsSink>, mode: ScrapeMode) -> Self {
        Self {
            source,
            sink,
            mode,
            fatal: None,
        }
    }

    /// With [`ReadErrorPolicy::Exit`], failed on-demand reads are also sent to
    /// `fatal` so the caller can shut the process down.
    pub fn with_policy(mut self, policy: ReadErrorPolicy, fatal: Sender<ReadError>) -> Self {
        self.fatal = match policy {
            ReadErrorPolicy::Exit => Some(fatal),
            ReadErrorPolicy::Skip => None,
        };
        self
    }

    /// HEAD is answered like GET; the server drops the body.
    pub async fn route(&self, method: &Method, path: &str) -> Response<Body> {
        let readable = *method == Method::GET || *method == Method::HEAD;
        match path {
            "/metrics" if readable => self.scrape().await,
            "/descriptors" if readable => metrics(self.sink.describe()),
            "/metrics" | "/descriptors" => {
                let mut response = error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
                response
            }
            _ => error(StatusCode::NOT_FOUND, "not found"),
        }
    }

    async fn scrape(&self) -> Response<Body> {
        match self.mode {
            ScrapeMode::OnDemand => match self.source.produce_sample().await {
                Ok(sample) => {
                    self.sink.publish(&sample);
                    metrics(self.sink.render(&sample))
                }
                Err(e) => {
                    self.sink.invalidate();
                    warn!("Scrape failed: {}", e);
                    if let Some(fatal) = &self.fatal {
                        let _ = fatal.try_send(e.clone());
                    }
                    error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
                }
            },
            ScrapeMode::Cached => match self.sink.latest() {
                Some(sample) => metrics(self.sink.render(&sample)),
                None => error(StatusCode::SERVICE_UNAVAILABLE, "no sample available"),
            },
        }
    }
}

pub async fn bind(address: SocketAddr) -> Result<TcpListener, Error> {
    TcpListener::bind(address)
        .await
        .map_err(|source| Error::Bind { address, source })
}

/// Serves requests until `shutdown` fires, then stops accepting and waits for
/// in-flight requests to finish.
pub async fn serve<Src: SampleSource>(
    listener: TcpListener,
    exporter: Arc<Exporter<Src>>,
    shutdown: Shutdown,
) -> Result<()> {
    let incoming = AddrIncoming::from_listener(listener)?;
    info!("Serving metrics on http://{}/metrics", incoming.local_addr());

    let make_service = make_service_fn(move |_: &AddrStream| {
        let exporter = exporter.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                let exporter = exporter.clone();
                async move {
                    Ok::<_, Infallible>(exporter.route(request.method(), request.uri().path()).await)
                }
            }))
        }
    });

    Server::builder(incoming)
        .serve(make_service)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    info!("Metrics server stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bodies_are_plain_text_lines() {
        let response = error(StatusCode::NOT_FOUND, "not found");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PLAIN_TEXT);
    }

    #[test]
    fn metrics_use_exposition_content_type() {
        let response = metrics(String::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], exposition::CONTENT_TYPE);
    }
}
