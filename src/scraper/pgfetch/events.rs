use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

use crate::dom::Element;
use crate::error::{Error, Result};
use crate::scraper::browser::{BrowserConfig, TableBrowser};
use crate::scraper::http_client::Session;

/// The listing link carries `&pagesize=10”`; the site falls back to 10 rows
/// unless the stray quote is removed along with the value.
static PAGE_SIZE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("&pagesize=[125]0”?").expect("hardcoded regex pattern is valid")
});

pub fn with_page_size(url: &str, page_size: u32) -> String {
    PAGE_SIZE_PARAM
        .replace(url, format!("&pagesize={page_size}").as_str())
        .into_owned()
}

/// Launches `browser` and follows pagination to the end, merging every page's
/// body rows into one table.
///
/// `page_limit` bounds loop iterations, the first page included, so a limit
/// of 0 fails before any row is read.
pub async fn accumulate_rows(browser: &mut TableBrowser<'_>, page_limit: usize) -> Result<Element> {
    browser.launch().await?;

    let mut rows: Vec<Element> = Vec::new();
    let mut iterations = 0usize;
    loop {
        if iterations >= page_limit {
            return Err(Error::PageLimit { limit: page_limit });
        }
        iterations += 1;

        let tbody = browser
            .table_mut()?
            .find_child_mut("tbody")
            .ok_or_else(|| Error::element("<table> is missing <tbody>."))?;
        rows.extend(tbody.take_child_elements());

        if browser.has_pagination()? && !browser.on_last_page()? {
            if iterations >= page_limit {
                return Err(Error::PageLimit { limit: page_limit });
            }
            browser.next_page().await?;
            continue;
        }

        info!(
            "{}: {} row(s) over {} page(s)",
            browser.url(),
            rows.len(),
            iterations
        );
        let tbody = browser
            .table_mut()?
            .find_child_mut("tbody")
            .ok_or_else(|| Error::element("<table> is missing <tbody>."))?;
        tbody.extend_elements(rows);
        break;
    }

    let mut table = Element::new("table");
    std::mem::swap(&mut table, browser.table_mut()?);
    Ok(table)
}

/// Events listing of a season, every page merged.
pub async fn fetch(
    session: &dyn Session,
    url: &str,
    page_size: u32,
    page_limit: usize,
    chunk_size: usize,
) -> Result<Element> {
    let url = with_page_size(url, page_size);
    let mut browser = TableBrowser::new(session, url, BrowserConfig::web_forms(chunk_size)?);
    accumulate_rows(&mut browser, page_limit).await
}
