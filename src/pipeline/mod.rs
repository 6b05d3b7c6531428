//! Pipeline orchestrator: ties scraper → transforms → export together.
//!
//! One run serves one request: launch the scraper for the requested seasons,
//! then for every season fetch the page, transform it into its typed record
//! and write it to the output directory. A failing season is logged and
//! counted; the remaining seasons still run.

use crate::config::AppConfig;
use crate::export::{self, Format};
use crate::models::{
    AttendanceLabel, EventScorecard, Language, ScorecardLabel, SquadLabel, StandingsLabel,
    TeamSquad, Tier,
};
use crate::scraper::http_client::{Session, available_clients, session_for};
use crate::scraper::{ScorecardQuery, SvemoScraper, cleaner};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Pages the pipeline can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Page {
    Events,
    Teams,
    Standings,
    RiderAverages,
    Attendance,
    Scorecards,
    Squads,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Teams => "teams",
            Self::Standings => "standings",
            Self::RiderAverages => "rider_averages",
            Self::Attendance => "attendance",
            Self::Scorecards => "scorecards",
            Self::Squads => "squads",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub page: Page,
    pub seasons: Vec<u16>,
    pub tier: Tier,
    pub language: Language,
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, request: &Request) -> Result<PipelineStats> {
        let session = session_for(&self.config.scraper.client, &self.config.scraper)
            .with_context(|| {
                format!(
                    "Failed to build HTTP session (available clients: {:?})",
                    available_clients()
                )
            })?;
        self.run_with(session, request).await
    }

    /// Runs `request` over an existing session.
    pub async fn run_with(&self, session: Arc<dyn Session>, request: &Request) -> Result<PipelineStats> {
        let format: Format = self.config.output.format.parse()?;

        let mut scraper = SvemoScraper::new(session, &self.config.scraper, &self.config.fetch);
        scraper
            .launch(&request.seasons, request.tier, request.language)
            .await
            .context("Failed to launch scraper")?;

        let mut stats = PipelineStats {
            page: request.page,
            seasons_exported: 0,
            files: Vec::new(),
            errors: 0,
        };

        // ── Fetch, transform, export per season ───────────────────────────────
        let seasons: Vec<u16> = scraper.seasons().into_iter().collect();
        for season in seasons {
            match self.export_season(&mut scraper, request.page, season, format).await {
                Ok(files) => {
                    info!("{} {}: {} file(s) written", request.page.as_str(), season, files.len());
                    stats.seasons_exported += 1;
                    stats.files.extend(files);
                }
                Err(e) => {
                    warn!("{} {}: {:#}", request.page.as_str(), season, e);
                    stats.errors += 1;
                }
            }
        }

        info!(
            "=== Done: {} | {} season(s) | {} file(s) | {} errors ===",
            stats.page.as_str(),
            stats.seasons_exported,
            stats.files.len(),
            stats.errors,
        );
        Ok(stats)
    }

    async fn export_season(
        &self,
        scraper: &mut SvemoScraper,
        page: Page,
        season: u16,
        format: Format,
    ) -> Result<Vec<PathBuf>> {
        let dir = &self.config.output.dir;
        let stem = format!("{}_{}", page.as_str(), season);
        let base_url = self.config.scraper.data_url.as_str();
        let cache = self.config.fetch.cache_pages;

        match page {
            Page::Events => {
                let table = scraper.events(season, cache).await?;
                export::write(dir, &stem, format, &cleaner::events(&table, base_url)?)
            }
            Page::Teams => {
                let table = scraper.teams(season, cache).await?;
                export::write(dir, &stem, format, &cleaner::teams(&table, base_url)?)
            }
            Page::RiderAverages => {
                let table = scraper.rider_averages(season).await?;
                export::write(dir, &stem, format, &cleaner::rider_averages(&table)?)
            }
            Page::Standings => {
                let labels = [
                    StandingsLabel::Po1,
                    StandingsLabel::Po2,
                    StandingsLabel::Po3,
                    StandingsLabel::Regular,
                ];
                let elements = scraper.standings(&labels, season).await?;
                export::write(dir, &stem, format, &cleaner::standings(&elements)?)
            }
            Page::Attendance => {
                let labels = [AttendanceLabel::Average, AttendanceLabel::Table];
                let elements = scraper.attendance(&labels, season).await?;
                export::write(dir, &stem, format, &cleaner::attendance(&elements)?)
            }
            Page::Scorecards => {
                let labels = [
                    ScorecardLabel::Result,
                    ScorecardLabel::Attendance,
                    ScorecardLabel::Scorecard,
                ];
                let pages = scraper
                    .scorecards(&labels, season, &ScorecardQuery::default())
                    .await?;
                let mut records = Vec::with_capacity(pages.len());
                for (event, elements) in pages {
                    let scorecard = cleaner::scorecard(&elements)
                        .with_context(|| format!("Scorecard of {} {}", event.date, event.name))?;
                    records.push(EventScorecard { event, scorecard });
                }
                export::write(dir, &stem, format, &records)
            }
            Page::Squads => {
                let labels = [SquadLabel::Riders, SquadLabel::Guests];
                let pages = scraper.squads(&labels, season, None).await?;
                let mut records = Vec::with_capacity(pages.len());
                for (team, elements) in pages {
                    let squad = cleaner::squad(&elements)
                        .with_context(|| format!("Squad of {}", team))?;
                    records.push(TeamSquad { team, squad });
                }
                export::write(dir, &stem, format, &records)
            }
        }
    }
}

#[derive(Debug)]
pub struct PipelineStats {
    pub page: Page,
    pub seasons_exported: usize,
    pub files: Vec<PathBuf>,
    pub errors: usize,
}
