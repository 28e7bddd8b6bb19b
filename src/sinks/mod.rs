use {crate::sample::Sample, std::sync::Arc};

pub mod lcd;
mod logging;
mod metrics;

pub use {lcd::LcdSink, logging::LogSink, metrics::MetricsSink};

/// Consumer of completed samples.
pub trait Sink: Send + Sync + 'static {
    fn publish(&self, sample: &Sample);

    /// Called after a failed cycle, before the next sample is published.
    fn invalidate(&self) {}
}

/// Publishes to both sinks, first to second.
impl<A: Sink, B: Sink> Sink for (A, B) {
    fn publish(&self, sample: &Sample) {
        self.0.publish(sample);
        self.1.publish(sample);
    }

    fn invalidate(&self) {
        self.0.invalidate();
        self.1.invalidate();
    }
}

/// An absent sink ignores everything.
impl<S: Sink> Sink for Option<S> {
    fn publish(&self, sample: &Sample) {
        if let Some(sink) = self {
            sink.publish(sample);
        }
    }

    fn invalidate(&self) {
        if let Some(sink) = self {
            sink.invalidate();
        }
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn publish(&self, sample: &Sample) {
        (**self).publish(sample);
    }

    fn invalidate(&self) {
        (**self).invalidate();
    }
}
