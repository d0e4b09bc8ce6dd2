// src/store/mod.rs

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

use crate::series::{Observation, Series, SeriesKind};

/// How an absent value is spelled on disk.
pub const ABSENT: &str = "N\\A";
const HEADER: [&str; 2] = ["Date", "Value"];

/// Flat-file cache of the three series under `<export root>/MacroData`.
///
/// Each series lives in its own directory as a two-column CSV keyed by
/// period. There is no locking: two writers of the same series race and the
/// last rename wins.
pub struct SeriesStore {
    root: PathBuf,
}

impl SeriesStore {
    /// Open the store, creating the per-series directories if needed.
    pub fn new(export_root: impl AsRef<Path>) -> Result<Self> {
        let root = export_root.as_ref().join("MacroData");
        for kind in SeriesKind::ALL {
            let dir = root.join(kind.dir_name());
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating series directory {:?}", &dir))?;
        }
        Ok(Self { root })
    }

    pub fn path(&self, kind: SeriesKind) -> PathBuf {
        self.root.join(kind.dir_name()).join(kind.file_name())
    }

    /// Read the persisted series, cleaned. `Ok(None)` only when the file
    /// does not exist; any other I/O or parse failure is an error.
    pub fn load(&self, kind: SeriesKind) -> Result<Option<Series>> {
        let path = self.path(kind);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());
        let mut observations = Vec::new();
        for record in rdr.records() {
            let record = record.with_context(|| format!("parsing {}", path.display()))?;
            let period = record.get(0).unwrap_or_default().to_string();
            let value = match record.get(1).map(str::trim) {
                None | Some("") | Some(ABSENT) => None,
                Some(v) => Some(v.to_string()),
            };
            observations.push(Observation { period, value });
        }

        debug!(%kind, rows = observations.len(), "loaded series from disk");
        Ok(Some(Self::clean(kind, Series::new(observations))))
    }

    /// Write `series` over the stored copy: to a temp file, then rename.
    pub fn save(&self, kind: SeriesKind, series: &Series) -> Result<()> {
        let path = self.path(kind);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;

        let tmp_path = dir.join(format!(".{}.tmp", kind.file_name()));
        {
            let mut wtr = WriterBuilder::new()
                .from_path(&tmp_path)
                .with_context(|| format!("creating {:?}", tmp_path))?;
            wtr.write_record(HEADER)?;
            for o in series.iter() {
                wtr.write_record([o.period.as_str(), o.value.as_deref().unwrap_or(ABSENT)])?;
            }
            wtr.flush()
                .with_context(|| format!("flushing {:?}", tmp_path))?;
        }

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;
        info!(%kind, rows = series.len(), path = %path.display(), "saved series");
        Ok(())
    }

    /// Drop absent values. CPI values additionally lose any `%` and must
    /// parse as numbers; rows that do not are dropped.
    pub fn clean(kind: SeriesKind, series: Series) -> Series {
        let series = series.without_absent();
        if kind != SeriesKind::Cpi {
            return series;
        }

        series
            .into_iter()
            .filter_map(|mut o| {
                let v = o.value.as_deref()?.trim().trim_end_matches('%').trim();
                if v.parse::<f64>().is_err() {
                    warn!(period = %o.period, value = v, "dropping non-numeric CPI value");
                    return None;
                }
                o.value = Some(v.to_string());
                Some(o)
            })
            .collect()
    }

    /// Return the stored series, or fetch, persist and return it when no
    /// file exists yet.
    #[instrument(level = "info", skip(self, fetch))]
    pub fn load_or_fetch<F>(&self, kind: SeriesKind, fetch: F) -> Result<Series>
    where
        F: FnOnce() -> Result<Series>,
    {
        if let Some(series) = self.load(kind)? {
            info!(rows = series.len(), "using stored series");
            return Ok(series);
        }
        info!("no stored series; fetching");
        self.refresh(kind, fetch)
    }

    /// Fetch unconditionally, then clean, persist and return the result.
    #[instrument(level = "info", skip(self, fetch))]
    pub fn refresh<F>(&self, kind: SeriesKind, fetch: F) -> Result<Series>
    where
        F: FnOnce() -> Result<Series>,
    {
        let fresh = fetch().with_context(|| format!("fetching {}", kind))?;
        let dupes = fresh.duplicate_periods();
        if !dupes.is_empty() {
            warn!(count = dupes.len(), first = dupes[0], "duplicate periods in fetched series");
        }
        let cleaned = Self::clean(kind, fresh);
        self.save(kind, &cleaned)?;
        Ok(cleaned)
    }
}
