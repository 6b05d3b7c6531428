use std::collections::BTreeMap;

use super::extract_elements;
use crate::error::{Error, Result};
use crate::models::{TabPage, TagSignature};
use crate::scraper::http_client::Session;

pub fn tab_content() -> TagSignature {
    TagSignature::new("div").with_attr("class", "tab-content")
}

/// URLs of the pages embedded in, or linked from, a results page's tabs.
///
/// Tabs are read positionally in [`TabPage::ALL`] order; a panel carries its
/// URL in `src` (iframes) or `href`.
pub async fn fetch(
    session: &dyn Session,
    url: &str,
    chunk_size: usize,
) -> Result<BTreeMap<TabPage, String>> {
    let content = extract_elements(session, url, &[((), tab_content())], chunk_size)
        .await?
        .remove(&())
        .ok_or_else(|| Error::element("Missing tab content."))?;

    let panels = content.descend(&["*", "*", "*", "*"]);
    if panels.len() != TabPage::ALL.len() {
        return Err(Error::element(format!(
            "Expected {} tabs, found {}.",
            TabPage::ALL.len(),
            panels.len()
        )));
    }

    let mut urls = BTreeMap::new();
    let mut missing = Vec::new();
    for (page, panel) in TabPage::ALL.iter().zip(panels) {
        match panel.attr("src").or_else(|| panel.attr("href")) {
            Some(u) if !u.is_empty() => {
                urls.insert(*page, u.to_string());
            }
            _ => missing.push(page.as_str()),
        }
    }
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(Error::element(format!(
            "Failed extracting URL(s) for pages: {missing:?}"
        )));
    }
    Ok(urls)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scraper::testing::FakeSession;

    fn panel(attr: &str, url: &str) -> String {
        format!(r#"<div class="tab-pane"><div><div><iframe {attr}="{url}"></iframe></div></div></div>"#)
    }

    /// Results page whose tabs embed `<base>/<page>` for every tab page.
    pub(crate) fn results_page(base: &str) -> String {
        let panels: String = TabPage::ALL
            .iter()
            .map(|p| panel("src", &format!("{base}/{}", p.as_str())))
            .collect();
        format!(r#"<html><body><div class="tab-content">{panels}</div></body></html>"#)
    }

    #[tokio::test]
    async fn test_tab_urls_in_order() {
        let session = FakeSession::new()
            .page("r", results_page("https://ta.svemo.se/2012"))
            .chunk_size(30);
        let urls = fetch(&session, "r", 0).await.unwrap();
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[&TabPage::Events], "https://ta.svemo.se/2012/events");
        assert_eq!(urls[&TabPage::Attendance], "https://ta.svemo.se/2012/attendance");
    }

    #[tokio::test]
    async fn test_tab_count_mismatch() {
        let page = format!(r#"<div class="tab-content">{}</div>"#, panel("src", "a"));
        let session = FakeSession::new().page("r", page.as_str());
        let err = fetch(&session, "r", 0).await.err().unwrap();
        assert_eq!(err.to_string(), "Expected 5 tabs, found 1.");
    }

    #[tokio::test]
    async fn test_href_fallback_and_missing_urls() {
        let page = format!(
            r#"<div class="tab-content">{}{}{}{}{}</div>"#,
            panel("href", "e"),
            panel("src", ""),
            panel("src", "t"),
            panel("data-x", "r"),
            panel("src", "a"),
        );
        let session = FakeSession::new().page("r", page.as_str());
        let err = fetch(&session, "r", 0).await.err().unwrap();
        assert_eq!(
            err.to_string(),
            r#"Failed extracting URL(s) for pages: ["rider averages", "standings"]"#
        );
    }
}
