// src/main.rs

use anyhow::Result;
use macroscraper::{MacroData, SeriesKind, Settings};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) settings + store ─────────────────────────────────────────
    let settings = Settings::from_env()?;
    info!(export = %settings.data_export_path.display(), "loaded settings");
    let data = MacroData::new(settings)?;

    // ─── 3) load or fetch each series ────────────────────────────────
    let mut failed = 0;
    for kind in SeriesKind::ALL {
        match data.get(kind) {
            Ok(series) => {
                let latest = series
                    .numeric()
                    .ok()
                    .and_then(|v| v.into_iter().next());
                info!(
                    series = %kind,
                    rows = series.len(),
                    latest = ?latest,
                    source = data.source(kind),
                    "ready"
                );
            }
            Err(e) => {
                error!(series = %kind, "failed: {:#}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} series unavailable", failed, SeriesKind::ALL.len());
    }
    info!("all done");
    Ok(())
}
