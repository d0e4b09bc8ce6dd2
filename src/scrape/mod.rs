// src/scrape/mod.rs

//! CPI table scrape: walk a yearly table row by row through a browser
//! session, with no known row count, until the year column runs out or
//! row reads keep failing.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::browser::{read_cell, BrowserError, Session, StaticPage, Wait, WebDriverSession};
use crate::config::Settings;
use crate::series::{Observation, Series, SeriesKind};

/// Failed row reads tolerated over one walk before it is abandoned.
pub const ERROR_THRESHOLD: u32 = 3;

/// `tbody` of the yearly table on the rateinflation.com CPI page.
pub const CPI_TABLE_BODY: &str = "/html/body/div/div/div[2]/main/div[3]/table/tbody";

/// Year, twelve months, annual.
const CELLS_PER_ROW: usize = 14;

/// The fourteen cells of one table row, `None` where the cell is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub year: Option<String>,
    /// January first.
    pub months: [Option<String>; 12],
    /// Read for completeness; not emitted.
    pub annual: Option<String>,
}

impl RawRow {
    /// The year label, or `None` when it is absent or blank (end of table).
    pub fn year_label(&self) -> Option<&str> {
        self.year
            .as_deref()
            .map(str::trim)
            .filter(|y| !y.is_empty())
    }
}

/// Something that can hand out table rows by 1-based position.
pub trait RowSource {
    fn read_row(&mut self, index: usize) -> Result<RawRow, BrowserError>;
}

/// XPath addressing of a table body: `<body>/tr[row]/td[col]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    body_xpath: String,
}

impl TableLayout {
    pub fn new(body_xpath: impl Into<String>) -> Self {
        Self {
            body_xpath: body_xpath.into(),
        }
    }

    pub fn cpi() -> Self {
        Self::new(CPI_TABLE_BODY)
    }

    pub fn cell(&self, row: usize, col: usize) -> String {
        format!("{}/tr[{}]/td[{}]", self.body_xpath, row, col)
    }
}

/// Rows read cell by cell from a session with immediate (non-waiting) reads.
pub struct TableRows<S: Session> {
    session: S,
    layout: TableLayout,
}

impl<S: Session> TableRows<S> {
    pub fn new(session: S, layout: TableLayout) -> Self {
        Self { session, layout }
    }

    /// Give the session back so the caller can release it.
    pub fn into_session(self) -> S {
        self.session
    }
}

impl<S: Session> RowSource for TableRows<S> {
    fn read_row(&mut self, index: usize) -> Result<RawRow, BrowserError> {
        let mut cells = Vec::with_capacity(CELLS_PER_ROW);
        for col in 1..=CELLS_PER_ROW {
            let xpath = self.layout.cell(index, col);
            cells.push(read_cell(&mut self.session, &xpath, Wait::Immediate)?);
        }

        let mut cells = cells.into_iter();
        let year = cells.next().flatten();
        let months = std::array::from_fn(|_| cells.next().flatten());
        let annual = cells.next().flatten();
        Ok(RawRow {
            year,
            months,
            annual,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The year column was empty: normal end of data.
    SentinelYear,
    /// [`ERROR_THRESHOLD`] row reads failed.
    ErrorThreshold,
}

/// Progress of one walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrapeState {
    /// 1-based row being (or last) read.
    pub current_row_index: usize,
    /// Failed row reads so far. Never reset by a successful row, so this is
    /// a budget for the whole walk rather than a run of adjacent failures.
    pub consecutive_errors: u32,
    pub terminated: bool,
    pub reason: Option<StopReason>,
}

impl ScrapeState {
    fn new() -> Self {
        Self {
            current_row_index: 1,
            consecutive_errors: 0,
            terminated: false,
            reason: None,
        }
    }

    fn stop(&mut self, reason: StopReason) {
        self.terminated = true;
        self.reason = Some(reason);
    }
}

/// Blank → absent; a trailing `%` is dropped.
pub fn normalize_cell(cell: Option<&str>) -> Option<String> {
    let v = cell?.trim();
    let v = v.strip_suffix('%').unwrap_or(v).trim_end();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

/// Explode one row into twelve observations. Cell `i` (January = 0) is
/// labelled month `12 - i`, so a row is emitted December label first.
pub fn decode_row(year: &str, months: &[Option<String>; 12]) -> Vec<Observation> {
    months
        .iter()
        .enumerate()
        .map(|(i, cell)| Observation {
            period: format!("{}-{}", year, months.len() - i),
            value: normalize_cell(cell.as_deref()),
        })
        .collect()
}

/// Walk rows from 1 until the year column is empty or the error budget is
/// spent. A failed row contributes nothing and the walk moves to the next
/// index.
pub fn walk_rows<R: RowSource + ?Sized>(rows: &mut R) -> (Series, ScrapeState) {
    let mut state = ScrapeState::new();
    let mut out = Vec::new();

    loop {
        let index = state.current_row_index;
        match rows.read_row(index) {
            Ok(row) => match row.year_label() {
                Some(year) => {
                    let obs = decode_row(year, &row.months);
                    debug!(row = index, year, ?obs, "CPI row");
                    out.extend(obs);
                }
                None => {
                    debug!(row = index, "empty year, end of table");
                    state.stop(StopReason::SentinelYear);
                }
            },
            Err(e) => {
                state.consecutive_errors += 1;
                warn!(row = index, errors = state.consecutive_errors, error = %e, "row read failed");
                if state.consecutive_errors >= ERROR_THRESHOLD {
                    state.stop(StopReason::ErrorThreshold);
                }
            }
        }

        if state.terminated {
            break;
        }
        state.current_row_index += 1;
    }

    (Series::new(out), state)
}

/// Scrape the CPI table from an open session positioned on the CPI page,
/// then release the session.
#[instrument(level = "info", skip_all)]
pub fn scrape_cpi_table<S: Session>(session: S) -> Series {
    let mut rows = TableRows::new(session, TableLayout::cpi());
    let (series, state) = walk_rows(&mut rows);
    info!(
        rows = state.current_row_index,
        reason = ?state.reason,
        errors = state.consecutive_errors,
        observations = series.len(),
        "CPI table walk finished"
    );

    if let Err(e) = rows.into_session().quit() {
        warn!(error = %e, "releasing browser session failed");
    }
    series
}

/// Launch a browser at the CPI page and scrape it. Fails only when the
/// session cannot be established.
#[instrument(level = "info", skip(settings))]
pub fn scrape_cpi(settings: &Settings) -> Result<Series> {
    let mut session = WebDriverSession::launch_at(settings, SeriesKind::Cpi.source_url())
        .context("starting browser session for CPI scrape")?;

    // let the table render before the immediate reads start
    let first_year = TableLayout::cpi().cell(1, 1);
    if let Err(e) = read_cell(&mut session, &first_year, Wait::Until(settings.wait())) {
        warn!(error = %e, "CPI table did not appear; walking anyway");
    }

    Ok(scrape_cpi_table(session))
}

/// Scrape a saved copy of the CPI page without a browser.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub fn scrape_cpi_file(path: impl AsRef<Path>) -> Result<Series> {
    let page = StaticPage::from_file(path.as_ref()).context("loading saved CPI page")?;
    Ok(scrape_cpi_table(page))
}
