//! Results-page discovery from the home page navigation bar.
//!
//! Previous seasons are listed in a nested accordion under the results menu,
//! one entry per season with a link per league. The running season only has
//! a top-level "Resultat <league>" link.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::extract_elements;
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::models::{TagSignature, Tier};
use crate::scraper::http_client::Session;

const RESULTS_MENU_HREF: &str = "https://www.svemo.se/vara-sportgrenar/start-speedway/resultat-speedway/";

pub fn navbar() -> TagSignature {
    TagSignature::new("div").with_attr("class", "mx-6 my-0 p-0 main-menu-offcanvas offcanvas-body")
}

/// Results page URL of each requested season for `tier`.
pub async fn fetch(
    session: &dyn Session,
    url: &str,
    seasons: &[u16],
    tier: Tier,
    chunk_size: usize,
) -> Result<BTreeMap<u16, String>> {
    let navbar = extract_elements(session, url, &[((), navbar())], chunk_size)
        .await?
        .remove(&())
        .ok_or_else(|| Error::element("Missing navigation bar."))?;
    season_urls(&navbar, seasons, tier)
}

/// Resolves season URLs from a captured navigation bar.
pub fn season_urls(navbar: &Element, seasons: &[u16], tier: Tier) -> Result<BTreeMap<u16, String>> {
    let results = results_accordion(navbar)?;
    let previous = results
        .descend(&["div", "div", "div", "div"])
        .into_iter()
        .next()
        .ok_or_else(|| Error::element("Failed selecting the previous results accordion in the navigation bar."))?;

    let mut urls = previous_season_urls(previous, tier.aliases()).map_err(|e| {
        Error::element(format!(
            "Failed fetching URLs to result pages of previous seasons. {e}"
        ))
    })?;
    let (Some(&first), Some(&last)) = (urls.keys().next(), urls.keys().next_back()) else {
        return Err(Error::element("No previous seasons listed in the navigation bar."));
    };
    let current = last + 1;
    check_available(first, current, seasons)?;

    if seasons.contains(&current) {
        let href = current_season_url(results, tier.aliases()).map_err(|e| {
            Error::element(format!(
                "Failed fetching the URL to the current season results page. {e}"
            ))
        })?;
        urls.insert(current, href);
    }
    info!("Seasons {} to {} available", first, current);

    Ok(seasons
        .iter()
        .filter_map(|s| urls.get(s).map(|u| (*s, u.clone())))
        .collect())
}

fn results_accordion(navbar: &Element) -> Result<&Element> {
    let fail = || Error::element("Failed selecting the results accordion in the navigation bar.");
    let mut path = navbar
        .path_to(|e| e.name() == "a" && e.attr("href") == Some(RESULTS_MENU_HREF))
        .ok_or_else(fail)?;
    // the link sits three levels below the accordion item
    if path.len() < 3 {
        return Err(fail());
    }
    path.truncate(path.len() - 3);
    let item = navbar.at_path(&path).ok_or_else(fail)?;
    item.descend(&["div", "div"]).into_iter().next().ok_or_else(fail)
}

fn previous_season_urls(previous: &Element, aliases: &[&str]) -> Result<BTreeMap<u16, String>> {
    let mut urls = BTreeMap::new();
    for entry in previous.child_elements() {
        let season = entry
            .descend(&["div", "p", "button", "a"])
            .first()
            .map(|a| a.iter_text().concat().trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::element("Failed to extract season from hyperlink text."))?;

        let links = entry.descend(&["div", "div", "div", "a"]);
        let href = aliases
            .iter()
            .find_map(|alias| link_labelled(&links, alias))
            .ok_or_else(|| Error::element("Failed to extract URL from hyperlink href."))?;

        let season: u16 = season.parse().map_err(|_| {
            Error::element(format!("Failed converting season \"{season}\" to integer."))
        })?;
        debug!("Season {} -> {}", season, href);
        urls.insert(season, href);
    }
    Ok(urls)
}

fn current_season_url(results: &Element, aliases: &[&str]) -> Result<String> {
    let links = results.descend(&["a"]);
    aliases
        .iter()
        .find_map(|alias| link_labelled(&links, &format!("Resultat {alias}")))
        .ok_or_else(|| {
            Error::element(format!(
                "Could not select any href using tier aliases: {aliases:?}"
            ))
        })
}

fn link_labelled(links: &[&Element], label: &str) -> Option<String> {
    links
        .iter()
        .find(|a| a.iter_text().iter().any(|t| t.trim() == label))
        .and_then(|a| a.attr("href"))
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

fn check_available(low: u16, high: u16, seasons: &[u16]) -> Result<()> {
    let mut unavailable: Vec<u16> = seasons
        .iter()
        .copied()
        .filter(|s| !(low..=high).contains(s))
        .collect();
    if unavailable.is_empty() {
        return Ok(());
    }
    unavailable.sort_unstable();
    Err(Error::InvalidArguments(vec![format!(
        "Unavailable seasons: {unavailable:?}. Available seasons: {low} to {high}"
    )]))
}
