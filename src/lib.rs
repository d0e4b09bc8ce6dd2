// src/lib.rs

//! Ingestion layer for three macroeconomic series: CPI (scraped from a yearly
//! HTML table through a browser session), the Federal Funds rate and the
//! 10Y-2Y Treasury spread (both FRED CSV exports). Each series is normalized
//! into `(period, value)` observations and cached as a flat CSV file.

pub mod browser;
pub mod config;
pub mod fetch;
pub mod macro_data;
pub mod scrape;
pub mod series;
pub mod store;

pub use config::Settings;
pub use macro_data::MacroData;
pub use series::{Observation, Series, SeriesKind};
pub use store::SeriesStore;
