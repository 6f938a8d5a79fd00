use anyhow::{Context, Result};
use bankscrape::{fetch, Config, Pipeline};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── 2) configuration ────────────────────────────────────────────
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_yaml_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => Config::default(),
    };
    config.validate().context("validating config")?;
    info!(url = %config.source_url, db = %config.db_path.display(), "startup");

    // ─── 3) run ──────────────────────────────────────────────────────
    let source = fetch::source_for_url(&config.source_url()?)?;
    let report = Pipeline::new(config, source)?.run()?;

    for skipped in &report.skipped {
        info!(row = skipped.row_index, reason = %skipped.reason, "skipped row");
    }
    info!(
        rows = report.rows_loaded,
        skipped = report.skipped.len(),
        "all done"
    );
    Ok(())
}
