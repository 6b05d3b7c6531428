//! Page transforms: captured elements into typed records.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use super::parsers::{self, replace_nbsp};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::models::{
    Attendance, AttendanceLabel, Events, Listing, ListingRow, MatchResult, PlayoffRecord,
    RiderAverages, Scorecard, ScorecardLabel, Squad, SquadLabel, Standings, StandingsLabel,
    TeamScore, Teams, TextTable,
};

static HOME_TEAM_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" \(H[^\)]*\)$").expect("hardcoded regex pattern is valid")
});
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("hardcoded regex pattern is valid"));
static FIGURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("hardcoded regex pattern is valid"));

// ── Listings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Cell {
    /// First non-empty text in the subtree.
    FirstText,
    /// The cell's own leading text.
    Text,
    /// Link text plus the absolute URL of its target.
    Link,
}

const EVENTS_HEADER: [Cell; 4] = [Cell::FirstText, Cell::FirstText, Cell::Text, Cell::Text];
const EVENTS_BODY: [Cell; 4] = [Cell::Text, Cell::Text, Cell::Link, Cell::Link];
const TEAMS_HEADER: [Cell; 4] = [Cell::FirstText, Cell::FirstText, Cell::FirstText, Cell::Text];
const TEAMS_BODY: [Cell; 4] = [Cell::Text, Cell::Text, Cell::Text, Cell::Link];

fn row_cells<'a>(tr: &'a Element, layout: &[Cell]) -> Result<Vec<&'a Element>> {
    let cells: Vec<&Element> = tr.child_elements().collect();
    if cells.len() != layout.len() {
        return Err(Error::element(format!(
            "Expected {} cells per row, found {}.",
            layout.len(),
            cells.len()
        )));
    }
    Ok(cells)
}

fn listing(table: &Element, header: &[Cell], body: &[Cell], base_url: &str) -> Result<Listing> {
    let (thead, tbody) = parsers::sections(table)?;

    let header_row = match thead.find_child("tr") {
        Some(tr) => row_cells(tr, header)?
            .into_iter()
            .zip(header)
            .map(|(th, cell)| match cell {
                Cell::FirstText => th.first_stripped_text(),
                Cell::Text | Cell::Link => th.stripped_text(),
            })
            .collect(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for tr in tbody.descend(&["tr"]) {
        let mut row = ListingRow::default();
        for (td, cell) in row_cells(tr, body)?.into_iter().zip(body) {
            let (text, link) = match cell {
                Cell::FirstText => (td.first_stripped_text(), None),
                Cell::Text => (td.stripped_text(), None),
                Cell::Link => (
                    td.first_stripped_text(),
                    parsers::url_from_href(td, base_url),
                ),
            };
            row.cells.push(text);
            row.links.push(link);
        }
        rows.push(row);
    }
    debug!("Listing with {} row(s)", rows.len());

    Ok(Listing {
        header: header_row,
        rows,
    })
}

/// Events listing; the last two columns link to the scorecard and heat pages.
pub fn events(table: &Element, base_url: &str) -> Result<Events> {
    Ok(Events {
        table: Some(listing(table, &EVENTS_HEADER, &EVENTS_BODY, base_url)?),
    })
}

/// Teams listing; the last column links to the squad page.
pub fn teams(table: &Element, base_url: &str) -> Result<Teams> {
    Ok(Teams {
        table: Some(listing(table, &TEAMS_HEADER, &TEAMS_BODY, base_url)?),
    })
}

pub fn rider_averages(table: &Element) -> Result<RiderAverages> {
    let mut rows = parsers::first_stripped_text(table)?;
    replace_nbsp(1, &mut rows);
    Ok(RiderAverages { table: Some(rows) })
}

// ── Attendance ────────────────────────────────────────────────────────────────

pub fn attendance(elements: &BTreeMap<AttendanceLabel, Element>) -> Result<Attendance> {
    let mut out = Attendance::default();
    for (label, el) in elements {
        match label {
            AttendanceLabel::Average => out.average = Some(average_attendance(el)?),
            AttendanceLabel::Table => out.table = Some(parsers::first_stripped_text(el)?),
        }
    }
    Ok(out)
}

fn average_attendance(p: &Element) -> Result<String> {
    if p.find_child("b").is_none() {
        return Err(Error::element("Missing expected element <b>."));
    }
    p.tail_of("b")
        .map(|t| t.trim().to_string())
        .ok_or_else(|| Error::element("Missing expected tail text of element <b>."))
}

// ── Standings ─────────────────────────────────────────────────────────────────

pub fn standings(elements: &BTreeMap<StandingsLabel, Element>) -> Result<Standings> {
    let mut out = Standings::default();
    for (label, el) in elements {
        match label {
            StandingsLabel::Po1 => out.po1 = Some(playoff_records(el)?),
            StandingsLabel::Po2 => out.po2 = Some(playoff_records(el)?),
            StandingsLabel::Po3 => out.po3 = Some(playoff_records(el)?),
            StandingsLabel::Regular => out.regular = Some(parsers::first_stripped_text(el)?),
        }
    }
    Ok(out)
}

/// Fixtures of a play-off tree.
///
/// The tree flattens to text where every fixture is a run of five values
/// starting with its date, and a round label directly precedes the first
/// fixture of each round.
pub fn playoff_records(tree: &Element) -> Result<Vec<PlayoffRecord>> {
    const FIXTURE_LEN: usize = 5;

    let texts: Vec<String> = tree
        .iter_stripped_text()
        .map(|t| HOME_TEAM_SUFFIX.replace(t, "").into_owned())
        .collect();
    let dates: Vec<usize> = texts
        .iter()
        .enumerate()
        .filter(|(_, t)| ISO_DATE.is_match(t))
        .map(|(i, _)| i)
        .collect();

    let Some(&first) = dates.first() else {
        return Ok(Vec::new());
    };
    let round_at = |pos: usize| {
        pos.checked_sub(1)
            .and_then(|i| texts.get(i))
            .cloned()
            .ok_or_else(|| Error::element("Play-off fixture has no preceding round label."))
    };

    let mut round = round_at(first)?;
    let mut records = Vec::with_capacity(dates.len());
    for (i, &pos) in dates.iter().enumerate() {
        let Some(f) = texts.get(pos..pos + FIXTURE_LEN) else {
            return Err(Error::element(format!(
                "Incomplete play-off fixture at text position {pos}."
            )));
        };
        records.push(PlayoffRecord {
            round: round.clone(),
            date: f[0].clone(),
            home_team: f[1].clone(),
            home_points: f[2].clone(),
            away_team: f[3].clone(),
            away_points: f[4].clone(),
        });
        if let Some(&next) = dates.get(i + 1) {
            if next - pos > FIXTURE_LEN {
                round = round_at(next)?;
            }
        }
    }
    Ok(records)
}

// ── Scorecard ─────────────────────────────────────────────────────────────────

pub fn scorecard(elements: &BTreeMap<ScorecardLabel, Element>) -> Result<Scorecard> {
    let mut out = Scorecard::default();
    for (label, el) in elements {
        match label {
            ScorecardLabel::Result => out.result = Some(match_result(el)?),
            ScorecardLabel::Attendance => out.attendance = Some(attendance_figure(el)?),
            ScorecardLabel::Scorecard => out.scorecard = Some(heat_table(el)?),
        }
    }
    Ok(out)
}

fn match_result(div: &Element) -> Result<MatchResult> {
    let headings: Vec<String> = div
        .descendants()
        .into_iter()
        .filter(|e| e.name() == "h2")
        .map(Element::first_stripped_text)
        .collect();
    let [t1, p1, t2, p2] = <[String; 4]>::try_from(headings).map_err(|h| {
        Error::element(format!("Expected 4 <h2> elements, got {}.", h.len()))
    })?;
    if [&t1, &p1, &t2, &p2].iter().any(|t| t.is_empty()) {
        return Err(Error::element("Unable to extract text from all 4 <h2> elements."));
    }
    Ok(MatchResult {
        team1: TeamScore { name: t1, points: p1 },
        team2: TeamScore { name: t2, points: p2 },
    })
}

fn attendance_figure(h3: &Element) -> Result<String> {
    FIGURE
        .find(&h3.first_stripped_text())
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::element("Unable to extract attendance figure."))
}

/// Scorecard rows with every heat cell collapsed to `helmet/result/gate`.
///
/// Heat cells hold a two-row layout table: the first row carries helmet
/// colour, result and gate; when the colour is missing there it sits in the
/// first cell of the second row.
pub fn heat_table(table: &Element) -> Result<TextTable> {
    let mut copy = table.clone();
    let tbody = copy
        .find_child_mut("tbody")
        .ok_or_else(|| Error::element("Expected child <tbody> is missing from <table>."))?;
    rewrite_heat_cells(tbody, false)?;
    parsers::first_stripped_text(&copy)
}

fn is_rider_row(el: &Element) -> bool {
    el.name() == "tr" && el.attr("class").is_some_and(|c| c.contains("Driver"))
}

fn layout_table(td: &Element) -> Option<&Element> {
    td.descendants()
        .into_iter()
        .find(|e| e.name() == "table" && e.attr("class") == Some("DriverSchema"))
}

fn rewrite_heat_cells(el: &mut Element, in_rider_row: bool) -> Result<()> {
    let in_rider_row = in_rider_row || is_rider_row(el);
    for child in el.child_elements_mut() {
        if in_rider_row && child.name() == "td" && layout_table(child).is_some() {
            collapse_heat_cell(child)?;
        } else {
            rewrite_heat_cells(child, in_rider_row)?;
        }
    }
    Ok(())
}

fn collapse_heat_cell(td: &mut Element) -> Result<()> {
    let joined = {
        let layout = layout_table(td)
            .ok_or_else(|| Error::element("Heat cell has no layout table."))?;
        let rows: Vec<&Element> = layout
            .descendants()
            .into_iter()
            .filter(|e| e.name() == "tr")
            .collect();
        let divs_of = |tr: &Element| -> Vec<String> {
            tr.descendants()
                .into_iter()
                .filter(|e| e.name() == "div")
                .map(|d| match d.text() {
                    Some("\u{a0}") => String::from("\u{a0}"),
                    _ => d.first_stripped_text(),
                })
                .collect()
        };
        let mut values = rows
            .first()
            .copied()
            .map(divs_of)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::element("Heat cell layout has no values."))?;
        if values[0] == "\u{a0}" {
            values[0] = rows
                .get(1)
                .copied()
                .and_then(|tr| divs_of(tr).into_iter().next())
                .ok_or_else(|| Error::element("Heat cell is missing its helmet colour."))?;
        }
        values.join("/")
    };
    td.set_text(&joined);
    td.remove_first_child_element();
    Ok(())
}

// ── Squad ─────────────────────────────────────────────────────────────────────

pub fn squad(elements: &BTreeMap<SquadLabel, Element>) -> Result<Squad> {
    let mut out = Squad::default();
    for (label, el) in elements {
        match label {
            SquadLabel::Riders => out.riders = Some(rider_rows(el)?),
            SquadLabel::Guests => out.guests = guest_rows(el)?,
        }
    }
    Ok(out)
}

fn rider_rows(table: &Element) -> Result<TextTable> {
    let mut rows = parsers::first_stripped_text(table)?;
    replace_nbsp(0, &mut rows);
    Ok(rows)
}

fn guest_rows(table: &Element) -> Result<Option<TextTable>> {
    let empty = table
        .descendants()
        .into_iter()
        .any(|e| e.name() == "tr" && e.attr("class") == Some("rgNoRecords"));
    match empty {
        true => Ok(None),
        false => rider_rows(table).map(Some),
    }
}
