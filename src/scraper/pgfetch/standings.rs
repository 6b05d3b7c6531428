use std::collections::BTreeMap;

use super::{child_table, extract_elements, master_table};
use crate::dom::Element;
use crate::error::Result;
use crate::models::{StandingsLabel, TagSignature};
use crate::scraper::http_client::Session;

/// The play-off tree tables share one signature, so each is reached through
/// its uniquely identified container.
pub fn signature(label: StandingsLabel) -> TagSignature {
    let tree = |n: u8| {
        TagSignature::new("div").with_attr("id", &format!("ctl00_Body_Repeater1_ctl0{n}_RadTreeList1"))
    };
    match label {
        StandingsLabel::Po1 => tree(0),
        StandingsLabel::Po2 => tree(1),
        StandingsLabel::Po3 => tree(2),
        StandingsLabel::Regular => master_table(),
    }
}

pub async fn fetch(
    session: &dyn Session,
    url: &str,
    labels: &[StandingsLabel],
    chunk_size: usize,
) -> Result<BTreeMap<StandingsLabel, Element>> {
    let targets: Vec<_> = labels.iter().map(|&l| (l, signature(l))).collect();
    extract_elements(session, url, &targets, chunk_size)
        .await?
        .into_iter()
        .map(|(label, el)| match label.is_playoff() {
            true => Ok((label, child_table(el)?)),
            false => Ok((label, el)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::FakeSession;

    fn tree(n: u8, text: &str) -> String {
        format!(
            r#"<div id="ctl00_Body_Repeater1_ctl0{n}_RadTreeList1" class="RadTreeList"><table class="rtlTable"><tbody><tr><td>{text}</td></tr></tbody></table></div>"#
        )
    }

    #[tokio::test]
    async fn test_playoff_trees_and_regular_table() {
        let page = format!(
            r#"<body>{}{}{}<table class="rgMasterTable"><tbody><tr><td>Lag</td></tr></tbody></table></body>"#,
            tree(0, "final"),
            tree(1, "semi"),
            tree(2, "quarter"),
        );
        let session = FakeSession::new().page("u", page.as_str()).chunk_size(25);
        let labels = [
            StandingsLabel::Po1,
            StandingsLabel::Po2,
            StandingsLabel::Po3,
            StandingsLabel::Regular,
        ];
        let out = fetch(&session, "u", &labels, 0).await.unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[&StandingsLabel::Po1].attr("class"), Some("rtlTable"));
        assert_eq!(out[&StandingsLabel::Po2].first_stripped_text(), "semi");
        assert_eq!(out[&StandingsLabel::Po3].first_stripped_text(), "quarter");
        assert_eq!(out[&StandingsLabel::Regular].attr("class"), Some("rgMasterTable"));
    }

    #[tokio::test]
    async fn test_missing_playoff_tree_fails() {
        let page = tree(0, "final");
        let session = FakeSession::new().page("u", page.as_str());
        let err = fetch(&session, "u", &[StandingsLabel::Po1, StandingsLabel::Po2], 0)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("Expected 2 elements, found 1."));
    }
}
