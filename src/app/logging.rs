use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the crate's own diagnostics (distinct from the uploaded
/// `LogBatcher` records). `RUST_LOG` wins over the provided default filter.
pub fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .try_init()?;

    Ok(())
}
