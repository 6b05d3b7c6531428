use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ── Tag signature ─────────────────────────────────────────────────────────────

/// Tag name plus the attribute pairs an element must carry to be selected.
///
/// A signature is satisfied by any element with the same tag whose attributes
/// include every required pair; extra attributes on the element are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagSignature {
    tag: String,
    attrs: BTreeMap<String, String>,
}

impl TagSignature {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Signature describing an element exactly as encountered in markup.
    pub fn of<'a, I>(tag: &str, attrs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        attrs
            .into_iter()
            .fold(Self::new(tag), |sig, (k, v)| sig.with_attr(k, v))
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    /// True when `element` has this tag and every required attribute pair.
    pub fn is_satisfied_by(&self, element: &TagSignature) -> bool {
        self.tag == element.tag
            && self
                .attrs
                .iter()
                .all(|(k, v)| element.attrs.get(k) == Some(v))
    }

    /// Same test as [`is_satisfied_by`](Self::is_satisfied_by) without building
    /// a signature for the candidate element.
    pub fn matches<'a, I>(&self, tag: &str, attrs: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
    {
        self.tag.eq_ignore_ascii_case(tag)
            && self.attrs.iter().all(|(k, v)| {
                attrs
                    .clone()
                    .into_iter()
                    .any(|(ek, ev)| ek.eq_ignore_ascii_case(k) && ev == v)
            })
    }
}

impl fmt::Display for TagSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (k, v) in &self.attrs {
            write!(f, " {}=\"{}\"", k, v)?;
        }
        f.write_str(">")
    }
}

// ── Launch arguments ──────────────────────────────────────────────────────────

/// First season with data on the results site.
pub const FIRST_AVAILABLE_SEASON: u16 = 2011;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tier {
    /// Bauhausligan / Elitserien
    Elite,
    /// Allsvenskan
    Second,
}

impl Tier {
    /// League names the navigation bar has used for this tier over the years.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Elite => &["Bauhausligan", "Elitserien"],
            Self::Second => &["Allsvenskan"],
        }
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(Self::Elite),
            "2" => Ok(Self::Second),
            other => Err(Error::InvalidArguments(vec![format!(
                "Unavailable tier: {other}"
            )])),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    Swedish,
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Swedish => "sv-se",
            Self::English => "en-us",
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sv-se" => Ok(Self::Swedish),
            "en-us" => Ok(Self::English),
            other => Err(Error::InvalidArguments(vec![format!(
                "Unavailable language: {other}"
            )])),
        }
    }
}

// ── Page labels ───────────────────────────────────────────────────────────────

/// Pages reachable through the tabs of a season's results page, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TabPage {
    Events,
    Standings,
    Teams,
    RiderAverages,
    Attendance,
}

impl TabPage {
    pub const ALL: [TabPage; 5] = [
        Self::Events,
        Self::Standings,
        Self::Teams,
        Self::RiderAverages,
        Self::Attendance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Standings => "standings",
            Self::Teams => "teams",
            Self::RiderAverages => "rider averages",
            Self::Attendance => "attendance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AttendanceLabel {
    Average,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ScorecardLabel {
    Result,
    Attendance,
    Scorecard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SquadLabel {
    Riders,
    Guests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StandingsLabel {
    Po1,
    Po2,
    Po3,
    Regular,
}

impl StandingsLabel {
    pub fn is_playoff(&self) -> bool {
        !matches!(self, Self::Regular)
    }
}

// ── Page records ──────────────────────────────────────────────────────────────

/// Rows of stripped cell text, header row first.
pub type TextTable = Vec<Vec<String>>;

/// A table whose rows mix text cells with links to nested pages.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Listing {
    pub header: Vec<String>,
    pub rows: Vec<ListingRow>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ListingRow {
    pub cells: Vec<String>,
    /// Absolute URLs; `None` where the cell carries no link.
    pub links: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Events {
    pub table: Option<Listing>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Teams {
    pub table: Option<Listing>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RiderAverages {
    pub table: Option<TextTable>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Attendance {
    pub average: Option<String>,
    pub table: Option<TextTable>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PlayoffRecord {
    pub round: String,
    pub date: String,
    pub home_team: String,
    pub home_points: String,
    pub away_team: String,
    pub away_points: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Standings {
    pub po1: Option<Vec<PlayoffRecord>>,
    pub po2: Option<Vec<PlayoffRecord>>,
    pub po3: Option<Vec<PlayoffRecord>>,
    pub regular: Option<TextTable>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TeamScore {
    pub name: String,
    pub points: String,
}

/// Ordering is language dependent: Swedish pages list the home team first,
/// English pages the away team.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MatchResult {
    pub team1: TeamScore,
    pub team2: TeamScore,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Scorecard {
    pub result: Option<MatchResult>,
    pub attendance: Option<String>,
    /// Heat cells are formatted `helmet/result/gate`, e.g. `B/0/4`.
    pub scorecard: Option<TextTable>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Squad {
    pub riders: Option<TextTable>,
    /// `None` when the page reports no guest riders.
    pub guests: Option<TextTable>,
}

/// Key of a scorecard page: the (date, event name) columns of its events row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventKey {
    pub date: String,
    pub name: String,
}

/// A scorecard together with the events row it was reached from.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventScorecard {
    #[serde(flatten)]
    pub event: EventKey,
    pub scorecard: Scorecard,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TeamSquad {
    pub team: String,
    pub squad: Squad,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_subset_law() {
        let required = TagSignature::new("td").with_attr("k1", "v1");
        let element = TagSignature::new("td")
            .with_attr("k1", "v1")
            .with_attr("k2", "v2");
        assert!(required.is_satisfied_by(&element));

        let missing = TagSignature::new("td").with_attr("k2", "v2");
        assert!(!required.is_satisfied_by(&missing));

        let different = TagSignature::new("td").with_attr("k1", "other");
        assert!(!required.is_satisfied_by(&different));

        let other_tag = TagSignature::new("th")
            .with_attr("k1", "v1")
            .with_attr("k2", "v2");
        assert!(!required.is_satisfied_by(&other_tag));
        assert!(!TagSignature::new("td").is_satisfied_by(&TagSignature::new("th")));
    }

    #[test]
    fn test_matches_agrees_with_is_satisfied_by() {
        let sig = TagSignature::new("table").with_attr("class", "rgMasterTable");
        let attrs = [("class", "rgMasterTable"), ("id", "grid")];
        assert!(sig.matches("TABLE", attrs.iter().copied()));
        assert!(sig.is_satisfied_by(&TagSignature::of("table", attrs.iter().copied())));
        assert!(!sig.matches("table", [("class", "rgMasterTable rgClipCells")].iter().copied()));
    }

    #[test]
    fn test_equal_signatures_hash_equal() {
        use std::collections::HashSet;
        let a = TagSignature::new("div").with_attr("id", "x").with_attr("class", "y");
        let b = TagSignature::new("DIV").with_attr("class", "y").with_attr("id", "x");
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_tier_and_language_parse() {
        assert_eq!("1".parse::<Tier>().unwrap(), Tier::Elite);
        assert_eq!("EN-US".parse::<Language>().unwrap(), Language::English);
        assert!("3".parse::<Tier>().is_err());
        assert!("de-de".parse::<Language>().is_err());
    }
}
