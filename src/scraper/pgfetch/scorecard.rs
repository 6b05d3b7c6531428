use std::collections::BTreeMap;

use super::{extract_elements, master_table};
use crate::dom::Element;
use crate::error::Result;
use crate::models::{ScorecardLabel, TagSignature};
use crate::scraper::http_client::Session;

pub fn signature(label: ScorecardLabel) -> TagSignature {
    match label {
        ScorecardLabel::Result => TagSignature::new("div").with_attr("class", "floatLeft"),
        ScorecardLabel::Attendance => TagSignature::new("h3"),
        ScorecardLabel::Scorecard => master_table(),
    }
}

/// Captured elements of one scorecard page.
pub async fn fetch(
    session: &dyn Session,
    url: &str,
    labels: &[ScorecardLabel],
    chunk_size: usize,
) -> Result<BTreeMap<ScorecardLabel, Element>> {
    let targets: Vec<_> = labels.iter().map(|&l| (l, signature(l))).collect();
    extract_elements(session, url, &targets, chunk_size).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::FakeSession;

    const PAGE: &str = r#"<html><body>
        <div class="floatLeft"><h2>Dackarna</h2><h2>50</h2><h2>Piraterna</h2><h2>40</h2></div>
        <h3>Publik: 1 812</h3>
        <table class="rgMasterTable"><tbody><tr class="rgRow Driver"><td>1</td></tr></tbody></table>
        </body></html>"#;

    #[tokio::test]
    async fn test_fetch_every_label() {
        let session = FakeSession::new().page("u", PAGE).chunk_size(7);
        let labels = [
            ScorecardLabel::Result,
            ScorecardLabel::Attendance,
            ScorecardLabel::Scorecard,
        ];
        let out = fetch(&session, "u", &labels, 0).await.unwrap();
        assert_eq!(out[&ScorecardLabel::Result].child_elements().count(), 4);
        assert_eq!(out[&ScorecardLabel::Attendance].stripped_text(), "Publik: 1 812");
        assert_eq!(out[&ScorecardLabel::Scorecard].name(), "table");
    }

    #[tokio::test]
    async fn test_stops_reading_once_captured() {
        let page = format!("<h3>Publik: 10</h3>{}", "<p>filler</p>".repeat(200));
        let session = FakeSession::new().page("u", page.as_str()).chunk_size(16);
        fetch(&session, "u", &[ScorecardLabel::Attendance], 0).await.unwrap();
        let served = session.chunks_served.load(std::sync::atomic::Ordering::SeqCst);
        assert!(served < page.len() / 16);
    }
}
