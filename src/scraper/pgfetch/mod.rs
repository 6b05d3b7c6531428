//! Page fetch routines. Each submodule knows the signatures of the elements a
//! page type carries and returns them captured, untransformed.

pub mod attendance;
pub mod events;
pub mod home;
pub mod results;
pub mod rider_averages;
pub mod scorecard;
pub mod squad;
pub mod standings;
pub mod teams;

use std::collections::BTreeMap;
use tracing::debug;

use super::extractor::ElementExtractor;
use super::http_client::{Session, response_chunks};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::models::TagSignature;

/// Signature of the grid table every listing page renders.
pub(crate) fn master_table() -> TagSignature {
    TagSignature::new("table").with_attr("class", "rgMasterTable")
}

/// Fetches `url` once and captures one element per requested label.
///
/// Fails when any requested element is absent from the page.
pub async fn extract_elements<L>(
    session: &dyn Session,
    url: &str,
    targets: &[(L, TagSignature)],
    chunk_size: usize,
) -> Result<BTreeMap<L, Element>>
where
    L: Copy + Ord,
{
    let mut extractor = ElementExtractor::new(targets.iter().map(|(_, sig)| sig.clone()));
    let response = session.get(url).await?;
    response.error_for_status()?;
    let captured = extractor
        .feed_stream(response_chunks(response, chunk_size))
        .await?;

    if !extractor.is_done() {
        let expected = extractor.targets().len();
        let found = expected - extractor.remaining().len();
        return Err(Error::element(format!(
            "Expected {expected} elements, found {found}. (URL: {url})"
        )));
    }
    debug!("{}: captured {} element(s)", url, captured.len());

    let mut out = BTreeMap::new();
    for (label, sig) in targets {
        if let Some(c) = captured.iter().find(|c| &c.signature == sig) {
            out.insert(*label, c.element.clone());
        }
    }
    Ok(out)
}

/// The grid table of a page rendering a single unpaginated listing.
pub(crate) async fn master_table_of(
    session: &dyn Session,
    url: &str,
    chunk_size: usize,
) -> Result<Element> {
    extract_elements(session, url, &[((), master_table())], chunk_size)
        .await?
        .remove(&())
        .ok_or_else(|| Error::element("No element found."))
}

/// Direct child `<table>` of a grid container.
pub(crate) fn child_table(mut container: Element) -> Result<Element> {
    let name = container.name().to_string();
    container
        .take_child_elements()
        .into_iter()
        .find(|e| e.name() == "table")
        .ok_or_else(|| Error::element(format!("<{name}> has no child <table>.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::FakeSession;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Label {
        A,
        B,
        C,
    }

    fn targets() -> Vec<(Label, TagSignature)> {
        vec![
            (Label::A, TagSignature::new("h3")),
            (Label::B, TagSignature::new("div").with_attr("class", "floatLeft")),
            (Label::C, master_table()),
        ]
    }

    #[tokio::test]
    async fn test_extract_elements_maps_labels() {
        let page = r#"<html><body>
            <table class="rgMasterTable"><tbody><tr><td>1</td></tr></tbody></table>
            <div class="floatLeft"><h2>Team</h2></div>
            <h3>Publik: 812</h3></body></html>"#;
        let session = FakeSession::new().page("u", page).chunk_size(10);
        let out = extract_elements(&session, "u", &targets(), 0).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[&Label::A].first_stripped_text(), "Publik: 812");
        assert_eq!(out[&Label::B].name(), "div");
        assert_eq!(out[&Label::C].name(), "table");
    }

    #[tokio::test]
    async fn test_extract_elements_counts_missing() {
        let page = r#"<div class="floatLeft">x</div><h3>y</h3>"#;
        let session = FakeSession::new().page("u", page);
        let err = extract_elements(&session, "u", &targets(), 0).await.err().unwrap();
        assert!(err.to_string().starts_with("Expected 3 elements, found 2."));
        assert!(err.to_string().contains("URL: u"));
        assert!(err.is_fetch_failure());
    }

    #[test]
    fn test_child_table() {
        let div = Element::parse(r#"<div id="g"><span>x</span><table><tbody></tbody></table></div>"#)
            .unwrap();
        assert_eq!(child_table(div).unwrap().name(), "table");
        let empty = Element::parse(r#"<div id="g"><span>x</span></div>"#).unwrap();
        assert!(child_table(empty).is_err());
    }
}
