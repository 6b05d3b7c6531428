use std::fmt;
use thiserror::Error;

/// Library result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Elements a paginated listing response must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequiredElement {
    ViewState,
    Table,
}

impl fmt::Display for RequiredElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ViewState => f.write_str("element containing view-state"),
            Self::Table => f.write_str("entire table"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A single required element or value is absent from parsed markup.
    #[error("{0}")]
    Element(String),

    #[error("unable to browse table, missing: {} (URL: {url})", join(.missing))]
    MissingElements {
        url: String,
        missing: Vec<RequiredElement>,
    },

    #[error("table browser has not been launched")]
    NotLaunched,

    #[error("the scraper has already been launched")]
    AlreadyLaunched,

    #[error("table has no pagination")]
    NoPagination,

    #[error("page limit ({limit}) exceeded")]
    PageLimit { limit: usize },

    #[error("{context} (URL: {url})")]
    Fetch {
        context: String,
        url: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed fetching data from {failed} of {total} page(s): {first}")]
    Nested {
        failed: usize,
        total: usize,
        first: Box<Error>,
    },

    #[error("invalid launch argument(s): {}", .0.join("; "))]
    InvalidArguments(Vec<String>),

    #[error("{0}")]
    Usage(String),

    #[error("client '{0}' is not supported by this build")]
    UnsupportedClient(String),

    #[error("invalid selector '{0}'")]
    Selector(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[cfg(feature = "reqwest-client")]
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    pub(crate) fn element(msg: impl Into<String>) -> Self {
        Self::Element(msg.into())
    }

    pub(crate) fn fetch(context: impl Into<String>, url: impl Into<String>, source: Error) -> Self {
        Self::Fetch {
            context: context.into(),
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// True for every failure raised while fetching or reading page markup.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. }
                | Self::Nested { .. }
                | Self::PageLimit { .. }
                | Self::MissingElements { .. }
                | Self::Element(_)
        )
    }

    /// True when the page-count ceiling was hit, however deeply wrapped.
    pub fn is_page_limit(&self) -> bool {
        match self {
            Self::PageLimit { .. } => true,
            Self::Fetch { source, .. } => source.is_page_limit(),
            Self::Nested { first, .. } => first.is_page_limit(),
            _ => false,
        }
    }

    /// The composite diagnostic's absent elements, if this is one.
    pub fn missing_elements(&self) -> Option<&[RequiredElement]> {
        match self {
            Self::MissingElements { missing, .. } => Some(missing.as_slice()),
            Self::Fetch { source, .. } => source.missing_elements(),
            _ => None,
        }
    }
}

fn join(missing: &[RequiredElement]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_elements_message_lists_every_element() {
        let err = Error::MissingElements {
            url: "https://example.com/events".into(),
            missing: vec![RequiredElement::ViewState, RequiredElement::Table],
        };
        assert_eq!(
            err.to_string(),
            "unable to browse table, missing: element containing view-state, entire table \
             (URL: https://example.com/events)"
        );
    }

    #[test]
    fn test_page_limit_is_distinguishable_through_wrapping() {
        let err = Error::fetch("Failed fetching page data.", "u", Error::PageLimit { limit: 3 });
        assert!(err.is_fetch_failure());
        assert!(err.is_page_limit());

        let structural = Error::fetch("Failed fetching page data.", "u", Error::element("x"));
        assert!(structural.is_fetch_failure());
        assert!(!structural.is_page_limit());
    }
}
