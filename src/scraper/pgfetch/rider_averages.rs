use crate::dom::Element;
use crate::error::Result;
use crate::scraper::http_client::Session;

/// Rider averages table of a season. Single page, no pagination.
pub async fn fetch(session: &dyn Session, url: &str, chunk_size: usize) -> Result<Element> {
    super::master_table_of(session, url, chunk_size).await
}
