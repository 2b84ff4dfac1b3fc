// src/arbitrage/export.rs
//! Tabular export of per-observation decisions.
//!
//! Columns: `provider,timestamp,selected_price,<p1>_price,...,<pN>_price`.
//! Prices of providers that have not reported yet are written as empty cells.

use super::selector::Decision;
use crate::error::{ArbiterError, Result};
use crate::pricing::ProviderId;
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use std::io::{Read, Write};
use std::path::Path;

fn header(providers: &[ProviderId]) -> Vec<String> {
    let mut columns = vec![
        "provider".to_string(),
        "timestamp".to_string(),
        "selected_price".to_string(),
    ];
    columns.extend(providers.iter().map(|p| format!("{}_price", p)));
    columns
}

pub fn write_decisions<W: Write>(
    writer: W,
    providers: &[ProviderId],
    decisions: &[Decision],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header(providers))?;

    for decision in decisions {
        if decision.prices.len() != providers.len() {
            return Err(ArbiterError::InvalidInput(format!(
                "decision at {} carries {} prices for {} providers",
                decision.timestamp,
                decision.prices.len(),
                providers.len()
            )));
        }
        let mut row = vec![
            decision.active_provider.to_string(),
            decision
                .timestamp
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            decision.selected_price.to_string(),
        ];
        row.extend(
            decision
                .prices
                .iter()
                .map(|p| p.map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_decisions_to_csv(
    path: impl AsRef<Path>,
    providers: &[ProviderId],
    decisions: &[Decision],
) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    write_decisions(file, providers, decisions)?;
    info!(
        "📄 Exported {} decisions to {}",
        decisions.len(),
        path.display()
    );
    Ok(())
}

/// Reads an export back. Returns the provider columns and the decisions.
pub fn read_decisions<R: Read>(reader: R) -> Result<(Vec<ProviderId>, Vec<Decision>)> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.len() < 3
        || &headers[0] != "provider"
        || &headers[1] != "timestamp"
        || &headers[2] != "selected_price"
    {
        return Err(ArbiterError::Parse(format!(
            "unexpected export header: {:?}",
            headers
        )));
    }
    let providers = headers
        .iter()
        .skip(3)
        .map(|h| {
            h.strip_suffix("_price")
                .map(ProviderId::new)
                .ok_or_else(|| ArbiterError::Parse(format!("bad price column '{}'", h)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut decisions = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let timestamp = DateTime::parse_from_rfc3339(&record[1])
            .map_err(|e| ArbiterError::Parse(format!("timestamp '{}': {}", &record[1], e)))?
            .with_timezone(&Utc);
        let selected_price = parse_price(&record[2])?;
        let prices = record
            .iter()
            .skip(3)
            .map(|cell| {
                if cell.is_empty() {
                    Ok(None)
                } else {
                    parse_price(cell).map(Some)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        decisions.push(Decision {
            timestamp,
            active_provider: ProviderId::new(&record[0]),
            selected_price,
            prices,
        });
    }
    Ok((providers, decisions))
}

pub fn import_decisions_from_csv(path: impl AsRef<Path>) -> Result<(Vec<ProviderId>, Vec<Decision>)> {
    let file = std::fs::File::open(path.as_ref())?;
    read_decisions(file)
}

fn parse_price(cell: &str) -> Result<f64> {
    cell.parse::<f64>()
        .map_err(|e| ArbiterError::Parse(format!("price '{}': {}", cell, e)))
}
