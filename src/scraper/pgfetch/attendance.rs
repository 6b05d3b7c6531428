use std::collections::BTreeMap;

use super::{extract_elements, master_table};
use crate::dom::Element;
use crate::error::Result;
use crate::models::{AttendanceLabel, TagSignature};
use crate::scraper::http_client::Session;

/// The attendance page carries no id or class on the average paragraph, so
/// the first `<p>` of the page is taken to be it. A page that renders another
/// paragraph before the average yields that paragraph instead, and the
/// transform then reports the missing `<b>`.
pub fn signature(label: AttendanceLabel) -> TagSignature {
    match label {
        // the figure itself is the tail text of the paragraph's <b>
        AttendanceLabel::Average => TagSignature::new("p"),
        AttendanceLabel::Table => master_table(),
    }
}

pub async fn fetch(
    session: &dyn Session,
    url: &str,
    labels: &[AttendanceLabel],
    chunk_size: usize,
) -> Result<BTreeMap<AttendanceLabel, Element>> {
    let targets: Vec<_> = labels.iter().map(|&l| (l, signature(l))).collect();
    extract_elements(session, url, &targets, chunk_size).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::FakeSession;

    #[tokio::test]
    async fn test_fetch_average_and_table() {
        let page = r#"<html><body><div class="box">
            <p><b>Snitt:</b> 2 315</p>
            <table class="rgMasterTable"><thead><tr><th>Datum</th></tr></thead>
            <tbody><tr><td>2012-05-02</td></tr></tbody></table>
            </div></body></html>"#;
        let session = FakeSession::new().page("u", page).chunk_size(16);
        let out = fetch(&session, "u", &[AttendanceLabel::Average, AttendanceLabel::Table], 0)
            .await
            .unwrap();
        assert_eq!(out[&AttendanceLabel::Average].tail_of("b"), Some(" 2 315"));
        assert_eq!(out[&AttendanceLabel::Table].name(), "table");
    }

    #[tokio::test]
    async fn test_average_is_first_paragraph() {
        let page = r#"<p><b>Snitt:</b> 2 315</p><p><b>Max:</b> 9 000</p>"#;
        let session = FakeSession::new().page("u", page);
        let out = fetch(&session, "u", &[AttendanceLabel::Average], 0).await.unwrap();
        assert_eq!(out[&AttendanceLabel::Average].tail_of("b"), Some(" 2 315"));
    }

    #[tokio::test]
    async fn test_fetch_only_requested_label() {
        let page = r#"<p>x</p>"#;
        let session = FakeSession::new().page("u", page);
        let out = fetch(&session, "u", &[AttendanceLabel::Average], 0).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(out.contains_key(&AttendanceLabel::Average));
    }
}
