// src/macro_data.rs

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use reqwest::blocking::Client;

use crate::config::Settings;
use crate::fetch;
use crate::scrape;
use crate::series::{Series, SeriesKind};
use crate::store::SeriesStore;

/// Entry point for callers: each series is read from the store, or fetched
/// from its source and stored when there is no local copy.
pub struct MacroData {
    settings: Settings,
    client: Client,
    store: SeriesStore,
}

impl MacroData {
    pub fn new(settings: Settings) -> Result<Self> {
        let store = SeriesStore::new(&settings.data_export_path)?;
        let client = Client::builder()
            .user_agent(concat!("macroscraper/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            settings,
            client,
            store,
        })
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    /// Page the series is published on.
    pub fn source(&self, kind: SeriesKind) -> &'static str {
        kind.source_url()
    }

    pub fn get(&self, kind: SeriesKind) -> Result<Series> {
        self.store.load_or_fetch(kind, || self.fetch(kind))
    }

    /// Fetch `kind` again regardless of what is stored.
    pub fn update(&self, kind: SeriesKind) -> Result<Series> {
        self.store.refresh(kind, || self.fetch(kind))
    }

    pub fn cpi(&self) -> Result<Series> {
        self.get(SeriesKind::Cpi)
    }

    pub fn fed_funds(&self) -> Result<Series> {
        self.get(SeriesKind::FedFunds)
    }

    pub fn treasury_spread(&self) -> Result<Series> {
        self.get(SeriesKind::TreasurySpread)
    }

    pub fn update_cpi(&self) -> Result<Series> {
        self.update(SeriesKind::Cpi)
    }

    pub fn update_fed_funds(&self) -> Result<Series> {
        self.update(SeriesKind::FedFunds)
    }

    pub fn update_treasury_spread(&self) -> Result<Series> {
        self.update(SeriesKind::TreasurySpread)
    }

    fn fetch(&self, kind: SeriesKind) -> Result<Series> {
        match kind {
            SeriesKind::Cpi => scrape::scrape_cpi(&self.settings),
            SeriesKind::FedFunds => fetch::fetch_fed_funds(&self.client, today()),
            SeriesKind::TreasurySpread => fetch::fetch_treasury_spread(&self.client, today()),
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Observation;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn settings(root: PathBuf) -> Settings {
        Settings {
            data_export_path: root,
            chrome_driver_path: PathBuf::from("/nonexistent/chromedriver"),
            driver_port: 9515,
            browser_args: vec![],
            wait_secs: 1,
        }
    }

    #[test]
    fn test_stored_series_served_without_network() -> Result<()> {
        let tmp = tempdir()?;
        let data = MacroData::new(settings(tmp.path().to_path_buf()))?;
        let stored = Series::new(vec![Observation::new("2024-5", "-0.38")]);
        data.store().save(SeriesKind::TreasurySpread, &stored)?;

        assert_eq!(data.treasury_spread()?, stored);
        Ok(())
    }

    #[test]
    fn test_cpi_without_driver_fails_at_session_start() -> Result<()> {
        let tmp = tempdir()?;
        let data = MacroData::new(settings(tmp.path().to_path_buf()))?;

        let err = data.cpi().unwrap_err();
        assert!(format!("{:#}", err).contains("starting browser session"));
        assert!(!data.store().path(SeriesKind::Cpi).exists());
        Ok(())
    }

    #[test]
    fn test_sources() -> Result<()> {
        let tmp = tempdir()?;
        let data = MacroData::new(settings(tmp.path().to_path_buf()))?;
        assert!(data.source(SeriesKind::Cpi).contains("rateinflation.com"));
        assert!(data.source(SeriesKind::FedFunds).ends_with("FEDFUNDS"));
        Ok(())
    }
}
