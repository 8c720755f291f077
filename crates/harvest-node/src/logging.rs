use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::logbuf::LogBuffer;

/// Initialise the subscriber stack: env filter, console format, the
/// dashboard ring layer, and an optional plain-text file layer.
pub fn init_logging(
    cli_verbose: u8,
    format: &str,
    file_output: Option<&PathBuf>,
    buffer: &LogBuffer,
) -> anyhow::Result<()> {
    let level = match cli_verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("harvest={level}")),
    );

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(buffer.layer());

    let file = match file_output {
        Some(path) => {
            Some(std::fs::OpenOptions::new().create(true).append(true).open(path)?)
        }
        None => None,
    };

    match format {
        "json" => {
            let console = fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            let file_layer = file.map(|f| fmt::layer().with_writer(f).with_ansi(false));
            registry.with(console).with(file_layer).init();
        }
        "compact" => {
            let console = fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            let file_layer = file.map(|f| fmt::layer().with_writer(f).with_ansi(false));
            registry.with(console).with(file_layer).init();
        }
        _ => {
            let show_location = cli_verbose > 0;
            let console = fmt::layer()
                .with_target(show_location)
                .with_file(show_location)
                .with_line_number(show_location)
                .with_thread_ids(false);
            let file_layer = file.map(|f| fmt::layer().with_writer(f).with_ansi(false));
            registry.with(console).with(file_layer).init();
        }
    }

    Ok(())
}
