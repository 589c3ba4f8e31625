use anyhow::{Context, Result};
use colored::*;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormattedFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// A tracing event formatter that colors each line by level.
///
/// The line carries no timestamp or level label. Fields of the enclosing
/// spans are printed first, so every line logged from inside a pipeline job
/// shows which job (and therefore which file) it belongs to:
///
/// ```text
/// job=bin errors global/[measuring][login].csv: Binning "global/[measuring][login].csv"
/// ```
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Buffer the whole line so the color applies to all of it.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(buf_writer, "{}: ", fields)?;
                    }
                }
            }
        }
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}

/// Install the global subscriber.
///
/// The level comes from `RUST_LOG` (default `info`), raised to `debug` by
/// `verbose`. With a log directory, plain lines are also appended to
/// [`crate::defaults::LOG_FILE`] there; the returned guard must be held until
/// the program exits so buffered lines get flushed.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let console = tracing_subscriber::fmt::layer()
        .event_format(ColorizedFormatter)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::never(dir, crate::defaults::LOG_FILE);
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .try_init()
                .context("Failed to install tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .context("Failed to install tracing subscriber")?;
            Ok(None)
        }
    }
}
