use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use svemo_scraper::config::AppConfig;
use svemo_scraper::models::{Language, Tier};
use svemo_scraper::pipeline::{Page, Pipeline, Request};
use svemo_scraper::utils;

#[derive(Parser)]
#[command(name = "svemo-scraper", about = "Svemo speedway results scraper", version)]
struct Cli {
    /// Page to scrape
    #[arg(value_enum)]
    page: Page,

    /// Season to scrape; repeat for several
    #[arg(short, long = "season", required = true)]
    seasons: Vec<u16>,

    /// League tier: 1 (Elitserien / Bauhausligan) or 2 (Allsvenskan)
    #[arg(short, long, default_value = "1")]
    tier: Tier,

    /// Site language: sv-se or en-us (default from config)
    #[arg(short, long)]
    lang: Option<Language>,

    /// Output format: json or csv (default from config)
    #[arg(short, long)]
    format: Option<String>,

    /// Output directory (default from config)
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "svemo_scraper=info,warn",
        1 => "svemo_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    if let Some(out) = cli.out {
        config.output.dir = out;
    }
    let language = match cli.lang {
        Some(lang) => lang,
        None => config.scraper.language.parse()?,
    };

    let request = Request {
        page: cli.page,
        seasons: cli.seasons,
        tier: cli.tier,
        language,
    };

    let _t = utils::Timer::start(format!(
        "{} for season(s) {:?}",
        request.page.as_str(),
        request.seasons
    ));
    let stats = Pipeline::new(config).run(&request).await?;
    info!(
        "Done: {} season(s), {} file(s), {} errors",
        utils::fmt_number(stats.seasons_exported as i64),
        utils::fmt_number(stats.files.len() as i64),
        stats.errors
    );
    for path in &stats.files {
        println!("{}", path.display());
    }

    Ok(())
}
