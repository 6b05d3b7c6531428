pub mod browser;
pub mod cleaner;
pub mod extractor;
pub mod http_client;
pub mod parsers;
pub mod pgfetch;

#[cfg(test)]
pub(crate) mod testing;

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use self::http_client::Session;
use self::parsers::ColumnPredicate;
use crate::config::{FetchConfig, ScraperConfig};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::models::{
    AttendanceLabel, EventKey, FIRST_AVAILABLE_SEASON, Language, ScorecardLabel, SquadLabel,
    StandingsLabel, TabPage, Tier,
};
use crate::utils;

/// Test on a cell's text used to narrow nested fetches.
pub type TextQuery = Box<dyn Fn(&str) -> bool + Send + Sync>;

const SCORECARD_LINK_TEXT: [&str; 2] = ["Matchresultat", "Matchresults"];
const SQUAD_LINK_TEXT: [&str; 2] = ["Visa", "View"];

#[derive(Default)]
pub struct ScorecardQuery {
    pub date: Option<TextQuery>,
    pub name: Option<TextQuery>,
}

// ── Scraper ───────────────────────────────────────────────────────────────────

/// Season-level access to the results site.
///
/// `launch` discovers every requested season's page URLs once; page methods
/// then fetch by season. Page futures hold a streaming tokenizer and are not
/// `Send`; drive them on one task.
pub struct SvemoScraper {
    session: Arc<dyn Session>,
    config: ScraperConfig,
    fetch: FetchConfig,
    launched: bool,
    url_cache: HashMap<(TabPage, u16), String>,
    page_cache: HashMap<(TabPage, u16), Element>,
}

impl SvemoScraper {
    pub fn new(session: Arc<dyn Session>, config: &ScraperConfig, fetch: &FetchConfig) -> Self {
        Self {
            session,
            config: config.clone(),
            fetch: fetch.clone(),
            launched: false,
            url_cache: HashMap::new(),
            page_cache: HashMap::new(),
        }
    }

    pub fn is_launched(&self) -> bool {
        self.launched
    }

    /// Seasons with page URLs on record.
    pub fn seasons(&self) -> BTreeSet<u16> {
        self.url_cache.keys().map(|(_, s)| *s).collect()
    }

    /// Validates the arguments, selects the site language and discovers the
    /// tab page URLs of every season.
    pub async fn launch(&mut self, seasons: &[u16], tier: Tier, language: Language) -> Result<&mut Self> {
        if self.launched {
            return Err(Error::AlreadyLaunched);
        }
        validate_seasons(seasons)?;

        self.session.set_header("accept", "text/html")?;
        self.session.set_header(
            "cookie",
            &format!("Svemo.TA.Language.SelectedLanguage={}", language.as_str()),
        )?;

        let session = self.session.as_ref();
        let chunk_size = self.config.chunk_size;
        let home_url = self.config.home_url.as_str();
        let results_urls = pgfetch::home::fetch(session, home_url, seasons, tier, chunk_size)
            .await
            .map_err(|e| {
                Error::fetch("Failed fetching results page URLs from the home page.", home_url, e)
            })?;
        info!("Found {} results page(s)", results_urls.len());

        let fetches = results_urls.iter().map(|(season, url)| async move {
            let tabs = pgfetch::results::fetch(session, url, chunk_size)
                .await
                .map_err(|e| Error::fetch("Failed fetching URLs from all results pages.", url.as_str(), e))?;
            Ok::<_, Error>((*season, tabs))
        });
        for outcome in join_all(fetches).await {
            let (season, tabs) = outcome?;
            for (page, url) in tabs {
                let url = parsers::absolute_url(&self.config.data_url, &url);
                debug!("{} {} -> {}", season, page.as_str(), url);
                self.url_cache.insert((page, season), url);
            }
        }

        self.launched = true;
        Ok(self)
    }

    fn page_url(&self, page: TabPage, season: u16) -> Result<String> {
        if !self.launched {
            return Err(Error::Usage("The scraper has not been launched.".into()));
        }
        self.url_cache.get(&(page, season)).cloned().ok_or_else(|| {
            Error::Usage(format!(
                "The {} page URL for season {season} is unavailable. \
                 Verify that {season} was passed when the scraper was launched.",
                page.as_str()
            ))
        })
    }

    fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    // ── Tab pages ─────────────────────────────────────────────────────────────

    /// The season's events table, every listing page merged.
    pub async fn events(&mut self, season: u16, cache: bool) -> Result<Element> {
        let url = self.page_url(TabPage::Events, season)?;
        let table = pgfetch::events::fetch(
            self.session.as_ref(),
            &url,
            self.fetch.page_size,
            self.fetch.page_limit,
            self.chunk_size(),
        )
        .await
        .map_err(|e| Error::fetch("Failed fetching page data.", url.as_str(), e))?;
        if cache {
            self.page_cache.insert((TabPage::Events, season), table.clone());
        }
        Ok(table)
    }

    pub async fn teams(&mut self, season: u16, cache: bool) -> Result<Element> {
        let url = self.page_url(TabPage::Teams, season)?;
        let table = pgfetch::teams::fetch(self.session.as_ref(), &url, self.chunk_size())
            .await
            .map_err(|e| Error::fetch("Failed fetching page data.", url.as_str(), e))?;
        if cache {
            self.page_cache.insert((TabPage::Teams, season), table.clone());
        }
        Ok(table)
    }

    pub async fn rider_averages(&self, season: u16) -> Result<Element> {
        let url = self.page_url(TabPage::RiderAverages, season)?;
        pgfetch::rider_averages::fetch(self.session.as_ref(), &url, self.chunk_size())
            .await
            .map_err(|e| Error::fetch("Failed fetching page data.", url.as_str(), e))
    }

    pub async fn standings(
        &self,
        labels: &[StandingsLabel],
        season: u16,
    ) -> Result<BTreeMap<StandingsLabel, Element>> {
        let url = self.page_url(TabPage::Standings, season)?;
        pgfetch::standings::fetch(self.session.as_ref(), &url, &dedup(labels), self.chunk_size())
            .await
            .map_err(|e| Error::fetch("Failed fetching page data.", url.as_str(), e))
    }

    pub async fn attendance(
        &self,
        labels: &[AttendanceLabel],
        season: u16,
    ) -> Result<BTreeMap<AttendanceLabel, Element>> {
        let url = self.page_url(TabPage::Attendance, season)?;
        pgfetch::attendance::fetch(self.session.as_ref(), &url, &dedup(labels), self.chunk_size())
            .await
            .map_err(|e| Error::fetch("Failed fetching page data.", url.as_str(), e))
    }

    // ── Nested pages ──────────────────────────────────────────────────────────

    /// Scorecards of every played event matching `query`, keyed by the
    /// event's date and name.
    pub async fn scorecards(
        &mut self,
        labels: &[ScorecardLabel],
        season: u16,
        query: &ScorecardQuery,
    ) -> Result<BTreeMap<EventKey, BTreeMap<ScorecardLabel, Element>>> {
        let table = match self.page_cache.get(&(TabPage::Events, season)) {
            Some(table) => table.clone(),
            None => self.events(season, false).await?,
        };

        let played = |s: &str| SCORECARD_LINK_TEXT.contains(&s);
        let mut predicates: Vec<ColumnPredicate<'_>> = Vec::new();
        predicates.push((3, &played));
        if let Some(q) = &query.date {
            predicates.push((1, q.as_ref()));
        }
        if let Some(q) = &query.name {
            predicates.push((2, q.as_ref()));
        }
        let targets = nested_targets(&table, &predicates, &[1, 2], 3, &self.config.data_url)?
            .into_iter()
            .map(|(mut keys, url)| {
                let name = keys.pop().unwrap_or_default();
                let date = keys.pop().unwrap_or_default();
                (EventKey { date, name }, url)
            })
            .collect();

        let labels = dedup(labels);
        let session = self.session.as_ref();
        let chunk_size = self.chunk_size();
        self.fetch_nested(targets, |url| {
            let labels = labels.clone();
            async move { pgfetch::scorecard::fetch(session, &url, &labels, chunk_size).await }
        })
        .await
    }

    /// Squads of every team matching `team_query`, keyed by team name.
    pub async fn squads(
        &mut self,
        labels: &[SquadLabel],
        season: u16,
        team_query: Option<&TextQuery>,
    ) -> Result<BTreeMap<String, BTreeMap<SquadLabel, Element>>> {
        let table = match self.page_cache.get(&(TabPage::Teams, season)) {
            Some(table) => table.clone(),
            None => self.teams(season, false).await?,
        };

        let listed = |s: &str| SQUAD_LINK_TEXT.contains(&s);
        let mut predicates: Vec<ColumnPredicate<'_>> = Vec::new();
        predicates.push((4, &listed));
        if let Some(q) = team_query {
            predicates.push((1, q.as_ref()));
        }
        let targets = nested_targets(&table, &predicates, &[1], 4, &self.config.data_url)?
            .into_iter()
            .map(|(mut keys, url)| (keys.pop().unwrap_or_default(), url))
            .collect();

        let labels = dedup(labels);
        let session = self.session.as_ref();
        let chunk_size = self.chunk_size();
        self.fetch_nested(targets, |url| {
            let labels = labels.clone();
            async move { pgfetch::squad::fetch(session, &url, &labels, chunk_size).await }
        })
        .await
    }

    /// Fetches every target concurrently, task `i` starting after
    /// `i * nested_delay_ms` plus jitter, at most `concurrency` in flight.
    async fn fetch_nested<K, L, F, Fut>(
        &self,
        targets: Vec<(K, String)>,
        fetch: F,
    ) -> Result<BTreeMap<K, BTreeMap<L, Element>>>
    where
        K: Ord,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<BTreeMap<L, Element>>>,
    {
        let total = targets.len();
        info!("Fetching {} nested page(s)", total);
        let permits = Semaphore::new(self.fetch.concurrency.max(1));
        let step = Duration::from_millis(self.fetch.nested_delay_ms);
        let jitter_ms = self.fetch.nested_jitter_ms;

        let tasks = targets.iter().enumerate().map(|(i, (_, url))| {
            let permits = &permits;
            let fetch = &fetch;
            let offset = step * u32::try_from(i).unwrap_or(u32::MAX);
            async move {
                utils::delayed(offset, jitter_ms, async {
                    match permits.acquire().await {
                        Ok(_permit) => fetch(url.clone()).await,
                        Err(e) => Err(Error::Transport(e.to_string())),
                    }
                })
                .await
                .map_err(|e| Error::fetch("Failed fetching page data.", url.as_str(), e))
            }
        });
        let results = join_all(tasks).await;

        let mut out = BTreeMap::new();
        let mut failures = Vec::new();
        for ((key, _), result) in targets.into_iter().zip(results) {
            match result {
                Ok(elements) => {
                    out.insert(key, elements);
                }
                Err(e) => {
                    warn!("{}", e);
                    failures.push(e);
                }
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            Some(first) => Err(Error::Nested {
                failed,
                total,
                first: Box::new(first),
            }),
            None => Ok(out),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn validate_seasons(seasons: &[u16]) -> Result<()> {
    let mut problems = Vec::new();
    if seasons.is_empty() {
        problems.push("'seasons' is empty".to_string());
    }
    let mut unavailable: Vec<u16> = seasons
        .iter()
        .copied()
        .filter(|s| *s < FIRST_AVAILABLE_SEASON)
        .collect();
    if !unavailable.is_empty() {
        unavailable.sort_unstable();
        problems.push(format!("Unavailable seasons: {unavailable:?}"));
    }
    match problems.is_empty() {
        true => Ok(()),
        false => Err(Error::InvalidArguments(problems)),
    }
}

fn dedup<L: Copy + Ord>(labels: &[L]) -> Vec<L> {
    labels
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Key texts and absolute link target of every listing row passing the
/// predicates.
fn nested_targets(
    table: &Element,
    predicates: &[ColumnPredicate<'_>],
    key_columns: &[usize],
    link_column: usize,
    base_url: &str,
) -> Result<Vec<(Vec<String>, String)>> {
    let tbody = table
        .find_child("tbody")
        .ok_or_else(|| Error::element("Expected child <tbody> is missing from <table>."))?;
    let subset = parsers::filtered_tbody(tbody, predicates);

    let mut targets = Vec::new();
    for tr in subset.child_elements() {
        let cell = |i: usize| {
            parsers::cell(tr, i).ok_or_else(|| {
                Error::element(format!(
                    "Index {i} is greater than the number of columns in <tbody>."
                ))
            })
        };
        let keys = key_columns
            .iter()
            .map(|&i| parsers::stripped_text_e(cell(i)?))
            .collect::<Result<Vec<_>>>()?;
        let href = parsers::hyperlink_href(cell(link_column)?)?;
        targets.push((keys, parsers::absolute_url(base_url, &href)));
    }
    debug!("{} of {} row(s) selected", targets.len(), tbody.child_elements().count());
    Ok(targets)
}
