//! JSON / CSV writers for transformed page records.
//!
//! JSON writes the record as-is, one file per season and page. CSV flattens a
//! record into named tables and writes one file per table, since a page like
//! standings carries several tables of different shapes.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::models::{
    Attendance, EventScorecard, Events, Listing, PlayoffRecord, RiderAverages, Standings,
    TeamSquad, Teams, TextTable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Csv,
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => bail!("Unknown output format {:?} (expected json or csv)", other),
        }
    }
}

/// A record that flattens into named text tables.
pub trait Tabular {
    fn tables(&self) -> Vec<(&'static str, TextTable)>;
}

/// Writes `record` under `dir` with file stem `stem`; returns the files written.
pub fn write<T>(dir: &Path, stem: &str, format: Format, record: &T) -> Result<Vec<PathBuf>>
where
    T: Serialize + Tabular,
{
    fs::create_dir_all(dir).with_context(|| format!("Creating output directory {:?}", dir))?;
    match format {
        Format::Json => Ok(vec![write_json(&dir.join(format!("{stem}.json")), record)?]),
        Format::Csv => record
            .tables()
            .into_iter()
            .map(|(name, table)| write_csv(&dir.join(format!("{stem}_{name}.csv")), &table))
            .collect(),
    }
}

pub fn write_json<T: Serialize>(path: &Path, record: &T) -> Result<PathBuf> {
    let file = fs::File::create(path).with_context(|| format!("Creating {:?}", path))?;
    serde_json::to_writer_pretty(file, record).with_context(|| format!("Writing {:?}", path))?;
    debug!("Wrote {:?}", path);
    Ok(path.to_path_buf())
}

/// Rows may differ in length; header and body rows of scraped tables often do.
pub fn write_csv(path: &Path, table: &TextTable) -> Result<PathBuf> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Creating {:?}", path))?;
    for row in table {
        writer.write_record(row)?;
    }
    writer.flush()?;
    debug!("Wrote {} rows to {:?}", table.len(), path);
    Ok(path.to_path_buf())
}

// ── Flattening ────────────────────────────────────────────────────────────────

/// Header and cells, plus a `<column> URL` column for every column that links
/// anywhere in the listing.
fn listing_table(listing: &Listing) -> TextTable {
    let linked: Vec<usize> = (0..listing.header.len())
        .filter(|i| {
            listing
                .rows
                .iter()
                .any(|r| r.links.get(*i).is_some_and(Option::is_some))
        })
        .collect();

    let mut header = listing.header.clone();
    header.extend(linked.iter().map(|i| format!("{} URL", listing.header[*i])));
    let mut table = vec![header];
    for row in &listing.rows {
        let mut cells = row.cells.clone();
        cells.extend(
            linked
                .iter()
                .map(|i| row.links.get(*i).cloned().flatten().unwrap_or_default()),
        );
        table.push(cells);
    }
    table
}

fn playoff_table(records: &[PlayoffRecord]) -> TextTable {
    let header = ["round", "date", "home_team", "home_points", "away_team", "away_points"];
    std::iter::once(header.iter().map(|h| h.to_string()).collect())
        .chain(records.iter().map(|r| {
            vec![
                r.round.clone(),
                r.date.clone(),
                r.home_team.clone(),
                r.home_points.clone(),
                r.away_team.clone(),
                r.away_points.clone(),
            ]
        }))
        .collect()
}

/// Prefixes every row of every table with `key` columns, header rows with
/// `key_header`, and concatenates them.
fn keyed<'a, I>(key_header: &[&str], tables: I) -> TextTable
where
    I: IntoIterator<Item = (Vec<String>, &'a TextTable)>,
{
    let mut out: TextTable = Vec::new();
    for (key, table) in tables {
        for (i, row) in table.iter().enumerate() {
            // keep only the first header row
            if i == 0 && !out.is_empty() {
                continue;
            }
            let prefix: Vec<String> = if i == 0 {
                key_header.iter().map(|h| h.to_string()).collect()
            } else {
                key.clone()
            };
            out.push(prefix.into_iter().chain(row.iter().cloned()).collect());
        }
    }
    out
}

impl Tabular for Events {
    fn tables(&self) -> Vec<(&'static str, TextTable)> {
        self.table.iter().map(|t| ("events", listing_table(t))).collect()
    }
}

impl Tabular for Teams {
    fn tables(&self) -> Vec<(&'static str, TextTable)> {
        self.table.iter().map(|t| ("teams", listing_table(t))).collect()
    }
}

impl Tabular for RiderAverages {
    fn tables(&self) -> Vec<(&'static str, TextTable)> {
        self.table.iter().map(|t| ("rider_averages", t.clone())).collect()
    }
}

impl Tabular for Attendance {
    fn tables(&self) -> Vec<(&'static str, TextTable)> {
        let mut tables = Vec::new();
        if let Some(avg) = &self.average {
            tables.push(("average", vec![vec!["average".to_string()], vec![avg.clone()]]));
        }
        if let Some(t) = &self.table {
            tables.push(("attendance", t.clone()));
        }
        tables
    }
}

impl Tabular for Standings {
    fn tables(&self) -> Vec<(&'static str, TextTable)> {
        let mut tables = Vec::new();
        for (name, records) in [("po1", &self.po1), ("po2", &self.po2), ("po3", &self.po3)] {
            if let Some(records) = records {
                tables.push((name, playoff_table(records)));
            }
        }
        if let Some(t) = &self.regular {
            tables.push(("regular", t.clone()));
        }
        tables
    }
}

impl Tabular for Vec<EventScorecard> {
    fn tables(&self) -> Vec<(&'static str, TextTable)> {
        let key = |e: &EventScorecard| vec![e.event.date.clone(), e.event.name.clone()];

        let mut results = vec![
            ["date", "name", "team1", "team1_points", "team2", "team2_points"]
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>(),
        ];
        let mut attendance = vec![vec!["date".to_string(), "name".into(), "attendance".into()]];
        for e in self {
            if let Some(r) = &e.scorecard.result {
                let mut row = key(e);
                row.extend([
                    r.team1.name.clone(),
                    r.team1.points.clone(),
                    r.team2.name.clone(),
                    r.team2.points.clone(),
                ]);
                results.push(row);
            }
            if let Some(a) = &e.scorecard.attendance {
                let mut row = key(e);
                row.push(a.clone());
                attendance.push(row);
            }
        }
        let heats = keyed(
            &["date", "name"],
            self.iter()
                .filter_map(|e| e.scorecard.scorecard.as_ref().map(|t| (key(e), t))),
        );

        [("results", results), ("attendance", attendance), ("heats", heats)]
            .into_iter()
            .filter(|(_, t)| t.len() > 1)
            .collect()
    }
}

impl Tabular for Vec<TeamSquad> {
    fn tables(&self) -> Vec<(&'static str, TextTable)> {
        let riders = keyed(
            &["team"],
            self.iter()
                .filter_map(|s| s.squad.riders.as_ref().map(|t| (vec![s.team.clone()], t))),
        );
        let guests = keyed(
            &["team"],
            self.iter()
                .filter_map(|s| s.squad.guests.as_ref().map(|t| (vec![s.team.clone()], t))),
        );
        [("riders", riders), ("guests", guests)]
            .into_iter()
            .filter(|(_, t)| !t.is_empty())
            .collect()
    }
}
