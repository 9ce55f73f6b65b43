use anyhow::Context;
use tour::Config;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = Config::command().get_matches();
    let config = Config::from_matches(&matches)?;

    let report = tour::workflow::run(&config)
        .with_context(|| format!("conditional update tour against {} failed", config.uri))?;

    tracing::info!(final_seats = ?report.final_seats(), "tour finished");

    Ok(())
}
