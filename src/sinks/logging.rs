use {
    super::Sink,
    crate::sample::Sample,
    log::info,
};

/// Writes one human-readable line per sample to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn publish(&self, sample: &Sample) {
        info!("{}", sample);
    }
}
