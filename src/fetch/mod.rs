// src/fetch/mod.rs

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate};
use reqwest::blocking::Client;
use tracing::{debug, info, instrument, trace};
use url::Url;

use crate::series::{Observation, Series, SeriesKind};

const FRED_CSV_ENDPOINT: &str = "https://fred.stlouisfed.org/graph/fredgraph.csv";

/// Build the FRED CSV export URL for `kind`, covering every month up to the
/// month of `today`.
pub fn fred_csv_url(kind: SeriesKind, today: NaiveDate) -> Result<Url> {
    let (id, start) = kind
        .fred_series()
        .ok_or_else(|| anyhow!("{} is not a FRED series", kind))?;
    let end = format!("{}-{}-1", today.year(), today.month());
    Url::parse_with_params(
        FRED_CSV_ENDPOINT,
        &[
            ("id", id),
            ("cosd", start),
            ("coed", end.as_str()),
            ("fq", "Monthly"),
            ("fam", "avg"),
        ],
    )
    .with_context(|| format!("building FRED URL for {}", id))
}

/// GET `url` and decode its `date,value` body into a series, newest first.
#[instrument(level = "info", skip(client))]
pub fn fetch_series(client: &Client, url: &Url) -> Result<Series> {
    debug!("Fetching CSV from {}", url);
    let body = client
        .get(url.clone())
        .send()
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .text()
        .with_context(|| format!("Reading text from {}", url))?;

    let series = parse_series_csv(&body);
    info!(observations = series.len(), "parsed CSV series");
    Ok(series)
}

pub fn fetch_fed_funds(client: &Client, today: NaiveDate) -> Result<Series> {
    fetch_series(client, &fred_csv_url(SeriesKind::FedFunds, today)?)
}

pub fn fetch_treasury_spread(client: &Client, today: NaiveDate) -> Result<Series> {
    fetch_series(client, &fred_csv_url(SeriesKind::TreasurySpread, today)?)
}

/// Decode a two-column CSV export. The first line is the header; blank and
/// malformed lines are skipped without error.
pub fn parse_series_csv(body: &str) -> Series {
    let mut out: Vec<Observation> = body
        .lines()
        .skip(1)
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
        .filter_map(|l| {
            let parsed = parse_line(l);
            if parsed.is_none() {
                trace!(line = l, "skipping malformed line");
            }
            parsed
        })
        .collect();

    // newest first
    out.reverse();
    Series::new(out)
}

fn parse_line(line: &str) -> Option<Observation> {
    let mut fields = line.split(',');
    let (date, value) = match (fields.next(), fields.next(), fields.next()) {
        (Some(d), Some(v), None) => (d.trim(), v.trim()),
        _ => return None,
    };
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let value: f64 = value.parse().ok()?;
    Some(Observation::new(
        format!("{}-{}", date.year(), date.month()),
        format!("{:.2}", value),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve exactly one HTTP response on a loopback port.
    fn serve_once(status: &'static str, body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let mut req = Vec::new();
            while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
            }
            let resp = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(resp.as_bytes()).unwrap();
        });
        Url::parse(&format!("http://{}/fredgraph.csv", addr)).unwrap()
    }

    #[test]
    fn test_parse_reverses_and_formats() {
        let s = parse_series_csv("DATE,X\n2020-01-01,1.0\n2020-02-01,2.0\n");
        assert_eq!(
            s.observations(),
            &[
                Observation::new("2020-2", "2.00"),
                Observation::new("2020-1", "1.00"),
            ]
        );
    }

    #[test]
    fn test_parse_skips_garbage_and_blank_lines() {
        let body = "DATE,FEDFUNDS\r\n2023-11-01,5.33\r\ngarbage\r\n\r\n2023-12-01,5.330001\r\n";
        let s = parse_series_csv(body);
        assert_eq!(
            s.observations(),
            &[
                Observation::new("2023-12", "5.33"),
                Observation::new("2023-11", "5.33"),
            ]
        );
    }

    #[test]
    fn test_parse_skips_extra_fields_and_missing_values() {
        // FRED marks missing observations with "."
        let body = "observation_date,T10Y2YM\n1976-06-01,0.80\n1976-07-01,.\n1976-08-01,1,2\n";
        let s = parse_series_csv(body);
        assert_eq!(s.observations(), &[Observation::new("1976-6", "0.80")]);
    }

    #[test]
    fn test_parse_header_only() {
        assert!(parse_series_csv("DATE,X\n").is_empty());
        assert!(parse_series_csv("").is_empty());
    }

    #[test]
    fn test_fred_url_parameters() -> Result<()> {
        let today = NaiveDate::from_ymd_opt(2024, 6, 27).unwrap();
        let url = fred_csv_url(SeriesKind::TreasurySpread, today)?;
        let q: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(q.contains(&("id".into(), "T10Y2YM".into())));
        assert!(q.contains(&("cosd".into(), "1976-06-01".into())));
        assert!(q.contains(&("coed".into(), "2024-6-1".into())));
        assert!(fred_csv_url(SeriesKind::Cpi, today).is_err());
        Ok(())
    }

    #[test]
    fn test_fetch_series_over_http() -> Result<()> {
        let url = serve_once("200 OK", "DATE,FEDFUNDS\n2020-01-01,1.55\n2020-02-01,1.58\n");
        let s = fetch_series(&Client::new(), &url)?;
        assert_eq!(s.len(), 2);
        assert_eq!(s.first(), Some(&Observation::new("2020-2", "1.58")));
        Ok(())
    }

    #[test]
    fn test_fetch_series_non_success_is_error() {
        let url = serve_once("503 Service Unavailable", "busy");
        assert!(fetch_series(&Client::new(), &url).is_err());
    }

    #[test]
    fn test_fetch_series_transport_failure_propagates() {
        // bind then drop to get a port with nothing listening
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = Url::parse(&format!("http://127.0.0.1:{}/x.csv", port)).unwrap();
        let err = fetch_series(&Client::new(), &url).unwrap_err();
        assert!(err.to_string().contains("GET"));
    }
}
