//! `tracing` integration.
//!
//! Lets applications that log through `tracing` write into the same rotating
//! file as the leveled [`Logger`] API.

use crate::logger::Logger;
use crate::sink::RotatingFileSink;
use std::io;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::filter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Events from this crate are kept out of the file layer so a rotation
/// diagnostic never re-enters the sink that produced it.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// [`MakeWriter`] over a rotating sink. Each formatted event is one
/// `write_raw` call, so events are never split across a rotation.
#[derive(Clone)]
pub struct SinkMakeWriter {
    sink: Arc<RotatingFileSink>,
}

impl SinkMakeWriter {
    pub fn new(sink: Arc<RotatingFileSink>) -> Self {
        Self { sink }
    }
}

pub struct SinkWriter<'a> {
    sink: &'a RotatingFileSink,
}

impl io::Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_raw(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl<'a> MakeWriter<'a> for SinkMakeWriter {
    type Writer = SinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter { sink: &self.sink }
    }
}

/// Build a subscriber that writes through `logger`'s sink (if one is
/// configured) and to stderr (if console output is on). `default_filter` is
/// used unless `RUST_LOG` is set.
pub fn build_subscriber(
    logger: &Logger,
    default_filter: &str,
) -> impl Subscriber + Send + Sync + use<> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let not_own = filter::filter_fn(|meta| !meta.target().starts_with(OWN_TARGET));
    let file_layer = logger.sink().map(|sink| {
        fmt::layer()
            .with_writer(SinkMakeWriter::new(Arc::clone(sink)))
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .with_filter(not_own)
    });

    let console_layer = logger.console_enabled().then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_ansi(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
}

/// Install [`build_subscriber`] as the global default.
pub fn init_tracing(logger: &Logger, default_filter: &str) -> Result<(), TryInitError> {
    build_subscriber(logger, default_filter).try_init()
}
