// src/series/mod.rs

use anyhow::{Context, Result};
use std::collections::HashSet;

/// One `(period, value)` pair. `period` is `YYYY-M` without zero padding;
/// `value` stays text, `None` marks a missing observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Observation {
    pub period: String,
    pub value: Option<String>,
}

impl Observation {
    pub fn new(period: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            value: Some(value.into()),
        }
    }

    pub fn absent(period: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            value: None,
        }
    }
}

/// Ordered sequence of observations as produced by a fetcher or scraper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Series {
    observations: Vec<Observation>,
}

impl Series {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Drop every observation whose value is absent.
    pub fn without_absent(self) -> Self {
        Self {
            observations: self
                .observations
                .into_iter()
                .filter(|o| o.value.is_some())
                .collect(),
        }
    }

    /// Periods that repeat an earlier one, in the order the repeats occur.
    pub fn duplicate_periods(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.observations
            .iter()
            .filter(|o| !seen.insert(o.period.as_str()))
            .map(|o| o.period.as_str())
            .collect()
    }

    /// Parse every present value as `f64`. Absent values are skipped; a value
    /// that is not a number is an error naming its period.
    pub fn numeric(&self) -> Result<Vec<(String, f64)>> {
        self.observations
            .iter()
            .filter_map(|o| o.value.as_deref().map(|v| (o.period.as_str(), v)))
            .map(|(period, v)| {
                let n = v
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("value {:?} for {} is not numeric", v, period))?;
                Ok::<_, anyhow::Error>((period.to_string(), n))
            })
            .collect()
    }
}

impl FromIterator<Observation> for Series {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Series {
    type Item = Observation;
    type IntoIter = std::vec::IntoIter<Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.into_iter()
    }
}

/// The three series this crate knows how to obtain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Cpi,
    FedFunds,
    TreasurySpread,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 3] = [
        SeriesKind::Cpi,
        SeriesKind::FedFunds,
        SeriesKind::TreasurySpread,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            SeriesKind::Cpi => "cpi",
            SeriesKind::FedFunds => "fed_funds",
            SeriesKind::TreasurySpread => "treasury_spread",
        }
    }

    /// Directory under `<export root>/MacroData`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            SeriesKind::Cpi => "CPI",
            SeriesKind::FedFunds => "FedFunds",
            SeriesKind::TreasurySpread => "Treasury_Yield_Spread_10Y_2Y",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            SeriesKind::Cpi => "cpi.csv",
            SeriesKind::FedFunds => "fed_funds.csv",
            SeriesKind::TreasurySpread => "Treasury_Yield_Spread_10Y_2Y.csv",
        }
    }

    /// Human-facing page the data comes from.
    pub fn source_url(&self) -> &'static str {
        match self {
            SeriesKind::Cpi => {
                "https://www.rateinflation.com/inflation-rate/usa-historical-inflation-rate/"
            }
            SeriesKind::FedFunds => "https://fred.stlouisfed.org/series/FEDFUNDS",
            SeriesKind::TreasurySpread => "https://fred.stlouisfed.org/series/T10Y2Y",
        }
    }

    /// FRED series id and first observation date of the CSV export, for the
    /// series that come from FRED.
    pub fn fred_series(&self) -> Option<(&'static str, &'static str)> {
        match self {
            SeriesKind::Cpi => None,
            SeriesKind::FedFunds => Some(("FEDFUNDS", "1954-07-01")),
            SeriesKind::TreasurySpread => Some(("T10Y2YM", "1976-06-01")),
        }
    }
}

impl std::fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_periods_detected_not_removed() {
        let s = Series::new(vec![
            Observation::new("2020-2", "1.00"),
            Observation::new("2020-1", "2.00"),
            Observation::new("2020-2", "3.00"),
        ]);
        assert_eq!(s.duplicate_periods(), vec!["2020-2"]);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_without_absent() {
        let s = Series::new(vec![
            Observation::new("2021-12", "7.0"),
            Observation::absent("2021-11"),
        ])
        .without_absent();
        assert_eq!(s.len(), 1);
        assert_eq!(s.first().unwrap().period, "2021-12");
    }

    #[test]
    fn test_numeric_is_explicit_and_fallible() {
        let ok = Series::new(vec![
            Observation::new("2020-2", "1.58"),
            Observation::absent("2020-1"),
        ]);
        assert_eq!(ok.numeric().unwrap(), vec![("2020-2".to_string(), 1.58)]);

        let bad = Series::new(vec![Observation::new("2020-2", "n/a")]);
        let err = bad.numeric().unwrap_err().to_string();
        assert!(err.contains("2020-2"), "{}", err);
    }
}
