use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt};

/// Env var holding `EnvFilter` directives, e.g. `studyplan::regen=debug`.
pub const LOG_ENV: &str = "STUDYPLAN_LOG";

const DEFAULT_LOG_DIRECTIVES: &str = "info";

/// Install the stderr subscriber. `verbose` forces debug output for the
/// studyplan targets on top of whatever the env filter says.
pub fn init_logging(verbose: bool) -> Result<()> {
    let mut filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES))
        .context("parse log directives")?;
    if verbose {
        filter = filter.add_directive("studyplan=debug".parse().context("parse verbose directive")?);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339()),
        )
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
