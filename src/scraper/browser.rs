//! Browser for paginated grids driven by form postbacks.
//!
//! The first page is fetched with a GET. Every further page is requested by
//! POSTing back to the same URL with the view-state token of the page just
//! loaded and the event target of its "next page" control, both read from
//! markup on every transition.

use scraper::Selector;
use tracing::{debug, info};

use super::extractor::ElementExtractor;
use super::http_client::{HttpResponse, Session, response_chunks};
use crate::dom::Element;
use crate::error::{Error, RequiredElement, Result};
use crate::models::TagSignature;

// ── Relative queries ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ValueSource {
    Text,
    Attr(String),
}

/// CSS query yielding one string from under an element.
#[derive(Debug, Clone)]
pub struct ValueQuery {
    selector: Selector,
    source: ValueSource,
    last: bool,
}

impl ValueQuery {
    /// First non-empty text of the first match.
    pub fn text(css: &str) -> Result<Self> {
        Ok(Self {
            selector: parse_selector(css)?,
            source: ValueSource::Text,
            last: false,
        })
    }

    /// Attribute `name` of the first match.
    pub fn attr(css: &str, name: &str) -> Result<Self> {
        Ok(Self {
            selector: parse_selector(css)?,
            source: ValueSource::Attr(name.to_string()),
            last: false,
        })
    }

    /// Read from the last match instead of the first.
    pub fn last(mut self) -> Self {
        self.last = true;
        self
    }

    /// Non-empty value under `root`, if any.
    pub fn eval(&self, root: &Element) -> Option<String> {
        let matches = root.select(&self.selector);
        let el = if self.last {
            matches.last()
        } else {
            matches.first()
        }?;
        let value = match &self.source {
            ValueSource::Text => el.first_stripped_text(),
            ValueSource::Attr(name) => el.attr(name)?.to_string(),
        };
        (!value.is_empty()).then_some(value)
    }
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|_| Error::Selector(css.to_string()))
}

/// Queries locating the pagination control inside the table, and the page
/// labels and next-page event target inside that control.
#[derive(Debug, Clone)]
pub struct BrowserQueries {
    pub pagination: Selector,
    pub current_page: ValueQuery,
    pub last_visible_page: ValueQuery,
    pub event_target: ValueQuery,
}

impl BrowserQueries {
    /// Pager markup emitted by Telerik RadGrid.
    pub fn rad_grid() -> Result<Self> {
        Ok(Self {
            pagination: parse_selector(r#"td[class="rgPagerCell NextPrevAndNumeric"]"#)?,
            current_page: ValueQuery::text("a.rgCurrentPage > span")?,
            last_visible_page: ValueQuery::text(r#"div[class="rgWrap rgNumPart"] a > span"#)?
                .last(),
            event_target: ValueQuery::attr("input.rgPageNext", "name")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub viewstate: TagSignature,
    pub table: TagSignature,
    pub viewstate_field: String,
    pub event_target_field: String,
    pub queries: BrowserQueries,
    pub chunk_size: usize,
}

impl BrowserConfig {
    /// ASP.NET Web Forms page hosting a RadGrid.
    pub fn web_forms(chunk_size: usize) -> Result<Self> {
        Ok(Self {
            viewstate: TagSignature::new("input").with_attr("id", "__VIEWSTATE"),
            table: TagSignature::new("table").with_attr("class", "rgMasterTable"),
            viewstate_field: "__VIEWSTATE".to_string(),
            event_target_field: "__EVENTTARGET".to_string(),
            queries: BrowserQueries::rad_grid()?,
            chunk_size,
        })
    }
}

// ── Browser ───────────────────────────────────────────────────────────────────

struct PageState {
    table: Element,
    viewstate: String,
    pagination: Option<Element>,
    current_page: Option<String>,
    last_visible_page: Option<String>,
}

#[derive(Clone, Copy)]
enum PageLabelKind {
    Current,
    LastVisible,
}

pub struct TableBrowser<'s> {
    session: &'s dyn Session,
    url: String,
    config: BrowserConfig,
    extractor: ElementExtractor,
    state: Option<PageState>,
}

impl<'s> TableBrowser<'s> {
    pub fn new(session: &'s dyn Session, url: impl Into<String>, config: BrowserConfig) -> Self {
        let extractor = ElementExtractor::new([config.viewstate.clone(), config.table.clone()]);
        Self {
            session,
            url: url.into(),
            config,
            extractor,
            state: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_launched(&self) -> bool {
        self.state.is_some()
    }

    /// Fetches the first page.
    pub async fn launch(&mut self) -> Result<&mut Self> {
        info!("Browsing {}", self.url);
        let response = self.session.get(&self.url).await?;
        self.handle_response(response).await?;
        Ok(self)
    }

    async fn handle_response(&mut self, response: Box<dyn HttpResponse>) -> Result<()> {
        response.error_for_status()?;

        let captured = self
            .extractor
            .feed_stream(response_chunks(response, self.config.chunk_size))
            .await;
        self.extractor.reset();

        let mut viewstate = None;
        let mut table = None;
        for capture in captured? {
            if capture.signature == self.config.viewstate {
                viewstate = Some(capture.element);
            } else if capture.signature == self.config.table {
                table = Some(capture.element);
            }
        }

        let (viewstate, mut table) = match (viewstate, table) {
            (Some(v), Some(t)) => (v, t),
            (v, t) => {
                let mut missing = Vec::new();
                if v.is_none() {
                    missing.push(RequiredElement::ViewState);
                }
                if t.is_none() {
                    missing.push(RequiredElement::Table);
                }
                return Err(Error::MissingElements {
                    url: self.url.clone(),
                    missing,
                });
            }
        };

        let viewstate = viewstate
            .attr("value")
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::element("Missing viewstate value."))?;

        let pagination = table.select_first(&self.config.queries.pagination);
        table.remove_children_named("tfoot");
        debug!(
            "{}: table loaded (paginated: {})",
            self.url,
            pagination.is_some()
        );

        self.state = Some(PageState {
            table,
            viewstate,
            pagination,
            current_page: None,
            last_visible_page: None,
        });
        Ok(())
    }

    fn state(&self) -> Result<&PageState> {
        self.state.as_ref().ok_or(Error::NotLaunched)
    }

    /// Table of the loaded page, footer removed.
    pub fn table(&self) -> Result<&Element> {
        Ok(&self.state()?.table)
    }

    pub fn table_mut(&mut self) -> Result<&mut Element> {
        self.state
            .as_mut()
            .map(|s| &mut s.table)
            .ok_or(Error::NotLaunched)
    }

    pub fn has_pagination(&self) -> Result<bool> {
        Ok(self.state()?.pagination.is_some())
    }

    pub fn current_page(&mut self) -> Result<String> {
        self.page_label(PageLabelKind::Current)
    }

    pub fn last_visible_page(&mut self) -> Result<String> {
        self.page_label(PageLabelKind::LastVisible)
    }

    pub fn on_last_page(&mut self) -> Result<bool> {
        Ok(self.current_page()? == self.last_visible_page()?)
    }

    fn page_label(&mut self, kind: PageLabelKind) -> Result<String> {
        let queries = &self.config.queries;
        let state = self.state.as_mut().ok_or(Error::NotLaunched)?;
        let (slot, query, what) = match kind {
            PageLabelKind::Current => (
                &mut state.current_page,
                &queries.current_page,
                "Current page",
            ),
            PageLabelKind::LastVisible => (
                &mut state.last_visible_page,
                &queries.last_visible_page,
                "Last visible page",
            ),
        };
        if let Some(label) = slot {
            return Ok(label.clone());
        }
        let pagination = state.pagination.as_ref().ok_or(Error::NoPagination)?;
        let label = query
            .eval(pagination)
            .ok_or_else(|| Error::element(format!("{what} button text not found.")))?;
        *slot = Some(label.clone());
        Ok(label)
    }

    /// Posts back to load the following page.
    pub async fn next_page(&mut self) -> Result<()> {
        let state = self.state()?;
        let pagination = state.pagination.as_ref().ok_or(Error::NoPagination)?;
        let event_target = self
            .config
            .queries
            .event_target
            .eval(pagination)
            .ok_or_else(|| Error::element("Eventtarget not found."))?;
        let viewstate = state.viewstate.clone();

        info!("{}: posting back {}", self.url, event_target);
        let form = [
            (self.config.event_target_field.as_str(), event_target.as_str()),
            (self.config.viewstate_field.as_str(), viewstate.as_str()),
        ];
        let response = self.session.post(&self.url, &form).await?;
        self.handle_response(response).await
    }
}
