use crate::dom::Element;
use crate::error::Result;
use crate::scraper::http_client::Session;

/// Teams table of a season, one row per team with a link to its squad.
pub async fn fetch(session: &dyn Session, url: &str, chunk_size: usize) -> Result<Element> {
    super::master_table_of(session, url, chunk_size).await
}
