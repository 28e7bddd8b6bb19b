//! Prometheus text exposition format, version 0.0.4.

use std::fmt::{self, Write};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Gauge,
    Counter,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Gauge => "gauge",
            Kind::Counter => "counter",
        }
    }
}

/// Name, help text and type of one unlabelled metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: Kind,
}

impl Descriptor {
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            help: "",
            kind: Kind::Gauge,
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            help: "",
            kind: Kind::Counter,
        }
    }

    pub const fn with_help(self, help: &'static str) -> Self {
        Self { help, ..self }
    }

    pub fn render_header(&self, w: &mut impl Write) -> fmt::Result {
        if !self.help.is_empty() {
            writeln!(w, "# HELP {} {}", self.name, escape_help(self.help))?;
        }
        writeln!(w, "# TYPE {} {}", self.name, self.kind.as_str())
    }

    /// Header plus one sample line, with an optional millisecond timestamp.
    pub fn render(&self, w: &mut impl Write, value: f64, timestamp_ms: Option<i64>) -> fmt::Result {
        self.render_header(w)?;
        write!(w, "{} {}", self.name, format_value(value))?;
        if let Some(ts) = timestamp_ms {
            write!(w, " {}", ts)?;
        }
        writeln!(w)
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPERATURE: Descriptor = Descriptor::gauge("temperature").with_help("Degrees Celsius.");

    #[test]
    fn renders_gauge_with_timestamp() {
        let mut out = String::new();
        TEMPERATURE.render(&mut out, 22.5, Some(1_700_000_000_000)).unwrap();
        assert_eq!(
            out,
            "# HELP temperature Degrees Celsius.\n# TYPE temperature gauge\ntemperature 22.5 1700000000000\n"
        );
    }

    #[test]
    fn renders_counter_without_help() {
        let mut out = String::new();
        Descriptor::counter("reads_total").render(&mut out, 3.0, None).unwrap();
        assert_eq!(out, "# TYPE reads_total counter\nreads_total 3\n");
    }

    #[test]
    fn special_values() {
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(101_325.0), "101325");
    }
}
