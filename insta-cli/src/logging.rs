use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

const FALLBACK_DIRECTIVES: &str = "info";

/// Диагностика CLI: stdout занят таблицами и JSON, поэтому логи идут в stderr
/// без отметок времени. Уровень берётся только из `directives`, которые уже
/// собрал [`crate::settings::Settings`] (`LOG_LEVEL`, затем `RUST_LOG`).
pub fn init_logging(directives: &str) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(directives))
        .with_target(true)
        .with_writer(std::io::stderr)
        .without_time()
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(())
}

fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|err| {
        eprintln!("invalid log directives '{directives}': {err}; using '{FALLBACK_DIRECTIVES}'");
        EnvFilter::new(FALLBACK_DIRECTIVES)
    })
}
