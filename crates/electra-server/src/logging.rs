use std::path::Path;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`. With `log_dir` set, an hourly rolling
/// `electra.log` receives the same events as JSON.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let file = log_dir.map(|dir| {
        let appender = tracing_appender::rolling::hourly(dir, "electra.log");
        fmt::layer()
            .json()
            .with_writer(appender)
            .with_target(true)
            .with_thread_ids(true)
    });

    Registry::default()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}
