use std::collections::BTreeMap;

use super::{child_table, extract_elements};
use crate::dom::Element;
use crate::error::Result;
use crate::models::{SquadLabel, TagSignature};
use crate::scraper::http_client::Session;

pub fn signature(label: SquadLabel) -> TagSignature {
    match label {
        SquadLabel::Riders => TagSignature::new("div").with_attr("id", "ctl00_Body_RadGrid1"),
        SquadLabel::Guests => TagSignature::new("div").with_attr("id", "ctl00_Body_RadGrid2"),
    }
}

/// Rider and guest tables of a team's squad page.
pub async fn fetch(
    session: &dyn Session,
    url: &str,
    labels: &[SquadLabel],
    chunk_size: usize,
) -> Result<BTreeMap<SquadLabel, Element>> {
    let targets: Vec<_> = labels.iter().map(|&l| (l, signature(l))).collect();
    extract_elements(session, url, &targets, chunk_size)
        .await?
        .into_iter()
        .map(|(label, grid)| Ok((label, child_table(grid)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::FakeSession;

    #[tokio::test]
    async fn test_grids_unwrap_to_tables() {
        let page = r#"<body>
            <div id="ctl00_Body_RadGrid1" class="RadGrid"><table class="rgMasterTable"><tbody>
              <tr><td>Fredrik&nbsp;Lindgren</td></tr></tbody></table></div>
            <div id="ctl00_Body_RadGrid2" class="RadGrid"><table class="rgMasterTable"><tbody>
              <tr class="rgNoRecords"><td>Inga</td></tr></tbody></table></div>
            </body>"#;
        let session = FakeSession::new().page("u", page).chunk_size(20);
        let out = fetch(&session, "u", &[SquadLabel::Riders, SquadLabel::Guests], 0)
            .await
            .unwrap();
        assert_eq!(out[&SquadLabel::Riders].name(), "table");
        assert_eq!(out[&SquadLabel::Guests].name(), "table");
        assert_eq!(
            out[&SquadLabel::Riders].first_stripped_text(),
            "Fredrik\u{a0}Lindgren"
        );
    }

    #[tokio::test]
    async fn test_grid_without_table_fails() {
        let page = r#"<div id="ctl00_Body_RadGrid1"><span>empty</span></div>"#;
        let session = FakeSession::new().page("u", page);
        let err = fetch(&session, "u", &[SquadLabel::Riders], 0).await.err().unwrap();
        assert!(err.to_string().contains("no child <table>"));
    }
}
