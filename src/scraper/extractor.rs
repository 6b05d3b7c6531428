//! Incremental capture of selected elements from a streamed HTML document.
//!
//! The html5ever tokenizer is driven chunk by chunk. Tokens outside a capture
//! are only inspected when their tag name belongs to one of the targets and are
//! dropped right away. Once a start tag satisfies a remaining signature every
//! token up to the matching close is re-serialized into a buffer, which is then
//! materialized into an owned [`Element`].

use bytes::Bytes;
use futures::{Stream, StreamExt};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use std::cell::RefCell;
use std::collections::HashSet;
use tracing::{debug, trace};

use crate::dom::{self, Element};
use crate::error::Result;
use crate::models::TagSignature;

/// One element captured for the signature it satisfied.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub signature: TagSignature,
    pub element: Element,
}

// ── Capture state ─────────────────────────────────────────────────────────────

struct InProgress {
    signature: TagSignature,
    root: String,
    /// Open elements inside the capture, root first.
    open: Vec<String>,
    markup: String,
    raw_text: bool,
}

struct Completed {
    signature: TagSignature,
    root: String,
    markup: String,
}

struct CaptureState {
    names: HashSet<String>,
    remaining: Vec<TagSignature>,
    in_progress: Option<InProgress>,
    completed: Vec<Completed>,
}

impl CaptureState {
    fn start_tag(&mut self, tag: &Tag) {
        let name: &str = &tag.name;

        if let Some(capture) = self.in_progress.as_mut() {
            while capture
                .open
                .last()
                .is_some_and(|open| implicitly_closed_by(open, name))
            {
                capture.open.pop();
            }
            if capture.open.is_empty() {
                self.finish();
            } else {
                capture.push_start(tag);
                return;
            }
        }

        if !self.names.contains(name) {
            return;
        }
        let attrs = tag.attrs.iter().map(|a| (&*a.name.local, &*a.value));
        let Some(signature) = self
            .remaining
            .iter()
            .find(|sig| sig.matches(name, attrs.clone()))
            .cloned()
        else {
            return;
        };

        trace!(%signature, "capture started");
        let mut capture = InProgress {
            signature,
            root: name.to_string(),
            open: Vec::new(),
            markup: String::new(),
            raw_text: false,
        };
        capture.push_start(tag);
        self.in_progress = Some(capture);
        if self.in_progress.as_ref().is_some_and(|c| c.open.is_empty()) {
            self.finish();
        }
    }

    fn end_tag(&mut self, tag: &Tag) {
        let Some(capture) = self.in_progress.as_mut() else {
            return;
        };
        let name: &str = &tag.name;
        capture.raw_text = false;
        let Some(pos) = capture.open.iter().rposition(|open| open == name) else {
            // an end tag the capture never opened belongs to an ancestor
            if has_optional_end(&capture.root) {
                for open in capture.open.drain(..).rev() {
                    dom::write_end_tag(&mut capture.markup, &open);
                }
                self.finish();
            }
            return;
        };
        for open in capture.open.drain(pos..).rev() {
            dom::write_end_tag(&mut capture.markup, &open);
        }
        if capture.open.is_empty() {
            self.finish();
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.in_progress.as_mut() {
            dom::write_text(&mut capture.markup, text, capture.raw_text);
        }
    }

    fn finish(&mut self) {
        if let Some(capture) = self.in_progress.take() {
            self.remaining.retain(|sig| sig != &capture.signature);
            self.completed.push(Completed {
                signature: capture.signature,
                root: capture.root,
                markup: capture.markup,
            });
        }
    }
}

impl InProgress {
    fn push_start(&mut self, tag: &Tag) {
        let name: &str = &tag.name;
        dom::write_start_tag(
            &mut self.markup,
            name,
            tag.attrs.iter().map(|a| (&*a.name.local, &*a.value)),
        );
        // `/>` only closes void elements
        if !dom::is_void(name) {
            self.open.push(name.to_string());
            self.raw_text = dom::is_raw_text(name);
        }
    }
}

/// Start tags that end an open element without an explicit close tag.
fn implicitly_closed_by(open: &str, incoming: &str) -> bool {
    match open {
        "p" => matches!(
            incoming,
            "address" | "article" | "aside" | "blockquote" | "div" | "dl" | "fieldset"
                | "footer" | "form" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "header"
                | "hr" | "li" | "main" | "nav" | "ol" | "p" | "pre" | "section" | "table"
                | "ul"
        ),
        "li" => incoming == "li",
        "dt" | "dd" => matches!(incoming, "dt" | "dd"),
        "option" => matches!(incoming, "option" | "optgroup"),
        "td" | "th" => matches!(incoming, "td" | "th" | "tr" | "tbody" | "thead" | "tfoot"),
        "tr" => matches!(incoming, "tr" | "tbody" | "thead" | "tfoot"),
        "thead" | "tbody" | "tfoot" => matches!(incoming, "thead" | "tbody" | "tfoot"),
        _ => false,
    }
}

/// Elements whose end tag may be omitted.
fn has_optional_end(name: &str) -> bool {
    matches!(
        name,
        "p" | "li" | "dt" | "dd" | "option" | "td" | "th" | "tr" | "thead" | "tbody" | "tfoot"
    )
}

// ── Token sink ────────────────────────────────────────────────────────────────

struct CaptureSink {
    state: RefCell<CaptureState>,
}

impl TokenSink for CaptureSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let mut state = self.state.borrow_mut();
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => {
                    state.start_tag(&tag);
                    if let Some(kind) = raw_kind(&tag.name) {
                        return TokenSinkResult::RawData(kind);
                    }
                }
                TagKind::EndTag => state.end_tag(&tag),
            },
            Token::CharacterTokens(text) => state.text(&text),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

/// Elements whose content the tokenizer must not scan for markup.
fn raw_kind(name: &str) -> Option<RawKind> {
    match name {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

// ── Extractor ─────────────────────────────────────────────────────────────────

/// Captures the first element satisfying each target signature.
///
/// At most one capture is in progress at a time. While it is open, start tags
/// that would satisfy other targets are ignored, so targets nested inside a
/// capture are never captured separately. The set of remaining targets only
/// shrinks until [`reset`](Self::reset) is called.
///
/// A self-closing slash is honoured on void elements only. A capture rooted at
/// an element with an optional end tag (`p`, `li`, table cells and rows) also
/// ends at the first end tag it cannot match, which is taken to close an
/// ancestor. A stray inline end tag inside such a capture ends it early.
///
/// Input is decoded as UTF-8; sequences split across chunks are carried over.
pub struct ElementExtractor {
    targets: Vec<TagSignature>,
    tokenizer: Tokenizer<CaptureSink>,
    input: BufferQueue,
    carry: Vec<u8>,
}

impl ElementExtractor {
    pub fn new<I>(targets: I) -> Self
    where
        I: IntoIterator<Item = TagSignature>,
    {
        let mut unique: Vec<TagSignature> = Vec::new();
        for sig in targets {
            if !unique.contains(&sig) {
                unique.push(sig);
            }
        }
        Self {
            tokenizer: build_tokenizer(&unique),
            targets: unique,
            input: BufferQueue::default(),
            carry: Vec::new(),
        }
    }

    pub fn targets(&self) -> &[TagSignature] {
        &self.targets
    }

    /// Targets not yet captured, in the order they were requested.
    pub fn remaining(&self) -> Vec<TagSignature> {
        self.tokenizer.sink.state.borrow().remaining.clone()
    }

    pub fn in_progress(&self) -> Option<TagSignature> {
        self.tokenizer
            .sink
            .state
            .borrow()
            .in_progress
            .as_ref()
            .map(|c| c.signature.clone())
    }

    pub fn is_done(&self) -> bool {
        self.tokenizer.sink.state.borrow().remaining.is_empty()
    }

    /// Pushes a chunk through the tokenizer and returns the elements whose
    /// closing tag it contained, in closing order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Capture> {
        if self.is_done() {
            return Vec::new();
        }
        let text = self.decode(chunk);
        if !text.is_empty() {
            self.input.push_back(StrTendril::from(text));
            let _ = self.tokenizer.feed(&self.input);
        }

        let completed = std::mem::take(&mut self.tokenizer.sink.state.borrow_mut().completed);
        completed
            .into_iter()
            .filter_map(|c| {
                let element = Element::materialize(&c.root, &c.markup);
                if element.is_none() {
                    debug!(signature = %c.signature, "captured markup did not parse");
                }
                element.map(|element| Capture {
                    signature: c.signature,
                    element,
                })
            })
            .inspect(|c| debug!(signature = %c.signature, "element captured"))
            .collect()
    }

    /// Feeds chunks until the source is exhausted or every target is captured.
    ///
    /// No chunk is pulled once the extractor is done. Control is yielded back
    /// to the runtime after each chunk since tokenizing is CPU bound.
    pub async fn feed_stream<S>(&mut self, chunks: S) -> Result<Vec<Capture>>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let mut chunks = std::pin::pin!(chunks);
        let mut captured = Vec::new();
        while !self.is_done() {
            let Some(chunk) = chunks.next().await else {
                break;
            };
            captured.extend(self.feed(&chunk?));
            tokio::task::yield_now().await;
        }
        Ok(captured)
    }

    /// Restores every target and discards all buffered input so that a new
    /// document can be fed.
    pub fn reset(&mut self) {
        self.tokenizer = build_tokenizer(&self.targets);
        self.input = BufferQueue::default();
        self.carry.clear();
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

fn build_tokenizer(targets: &[TagSignature]) -> Tokenizer<CaptureSink> {
    let sink = CaptureSink {
        state: RefCell::new(CaptureState {
            names: targets.iter().map(|t| t.tag().to_string()).collect(),
            remaining: targets.to_vec(),
            in_progress: None,
            completed: Vec::new(),
        }),
    };
    Tokenizer::new(sink, TokenizerOpts::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table_sig() -> TagSignature {
        TagSignature::new("table").with_attr("class", "rgMasterTable")
    }

    fn viewstate_sig() -> TagSignature {
        TagSignature::new("input").with_attr("id", "__VIEWSTATE")
    }

    const PAGE: &str = r#"<html><head><title>x</title>
        <script>var s = "<table class='rgMasterTable'>";</script></head>
        <body><form>
        <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="abc" />
        <table class="other"><tr><td>no</td></tr></table>
        <table class="rgMasterTable"><thead><tr><th>H</th></tr></thead>
        <tbody><tr><td>A &amp; B</td></tr></tbody></table>
        </form></body></html>"#;

    #[test]
    fn test_captures_each_target_once() {
        let mut ex = ElementExtractor::new([viewstate_sig(), table_sig()]);
        let captured = ex.feed(PAGE.as_bytes());
        assert!(ex.is_done());
        assert_eq!(captured.len(), 2);

        assert_eq!(captured[0].signature, viewstate_sig());
        assert_eq!(captured[0].element.attr("value"), Some("abc"));

        let table = &captured[1].element;
        assert_eq!(table.name(), "table");
        assert_eq!(table.attr("class"), Some("rgMasterTable"));
        let tbody = table.find_child("tbody").unwrap();
        assert_eq!(tbody.first_stripped_text(), "A & B");
    }

    #[test]
    fn test_nested_same_tag_target_is_not_captured_while_outer_open() {
        let outer = TagSignature::new("div").with_attr("class", "t");
        let inner = TagSignature::new("div").with_attr("class", "u");
        let mut ex = ElementExtractor::new([outer.clone(), inner.clone()]);

        let first = ex.feed(br#"<div class="t">a<div class="u">nested</div>"#);
        assert!(first.is_empty());
        assert_eq!(ex.in_progress(), Some(outer.clone()));
        assert_eq!(ex.remaining().len(), 2);

        let second = ex.feed(br#"b</div><div class="u">later</div>"#);
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].signature, outer);
        assert!(second[0].element.to_html().contains("nested"));
        assert_eq!(second[1].signature, inner);
        assert_eq!(second[1].element.first_stripped_text(), "later");
        assert!(ex.is_done());
    }

    #[test]
    fn test_nested_identical_signature_captures_outer_only() {
        let sig = TagSignature::new("div").with_attr("class", "t");
        let mut ex = ElementExtractor::new([sig]);
        let out = ex.feed(br#"<div class="t"><div class="t">in</div>out</div>"#);
        assert_eq!(out.len(), 1);
        let el = &out[0].element;
        assert_eq!(el.child_elements().count(), 1);
        assert_eq!(el.iter_stripped_text().collect::<Vec<_>>(), vec!["in", "out"]);
    }

    #[test]
    fn test_remaining_never_grows_across_feeds() {
        let mut ex = ElementExtractor::new([viewstate_sig(), table_sig()]);
        let mut last = ex.remaining().len();
        for chunk in PAGE.as_bytes().chunks(7) {
            ex.feed(chunk);
            let now = ex.remaining().len();
            assert!(now <= last);
            last = now;
        }
        assert_eq!(last, 0);
        ex.feed(PAGE.as_bytes());
        assert_eq!(ex.remaining().len(), 0);
    }

    #[test]
    fn test_reset_restores_targets_for_second_document() {
        let mut ex = ElementExtractor::new([viewstate_sig(), table_sig()]);
        let first = ex.feed(PAGE.as_bytes());
        ex.reset();
        assert_eq!(ex.remaining(), vec![viewstate_sig(), table_sig()]);
        assert_eq!(ex.in_progress(), None);

        let second = ex.feed(PAGE.as_bytes());
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset_discards_partial_document() {
        let mut ex = ElementExtractor::new([table_sig()]);
        ex.feed(br#"<table class="rgMasterTable"><tbody><tr><td>stale"#);
        assert!(ex.in_progress().is_some());
        ex.reset();
        let out = ex.feed(br#"<table class="rgMasterTable"><tbody><tr><td>fresh</td></tr></tbody></table>"#);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].element.first_stripped_text(), "fresh");
    }

    #[test]
    fn test_multibyte_characters_split_across_chunks() {
        let doc = "<h3>Publik: 1 234 åskådare</h3>".as_bytes();
        let split = doc.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut ex = ElementExtractor::new([TagSignature::new("h3")]);
        assert!(ex.feed(&doc[..split]).is_empty());
        let out = ex.feed(&doc[split..]);
        assert_eq!(out[0].element.first_stripped_text(), "Publik: 1 234 åskådare");
    }

    #[test]
    fn test_implicitly_closed_root() {
        let mut ex = ElementExtractor::new([TagSignature::new("p")]);
        let out = ex.feed(b"<div><p><b>Snitt:</b> 3 125<div>after</div></div>");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].element.tail_of("b"), Some(" 3 125"));
    }

    #[test]
    fn test_void_root_completes_immediately() {
        let mut ex = ElementExtractor::new([viewstate_sig()]);
        let out = ex.feed(br#"<input id="__VIEWSTATE" value="v1">"#);
        assert_eq!(out.len(), 1);
        assert!(ex.is_done());
    }

    #[test]
    fn test_self_closing_slash_ignored_on_non_void_root() {
        let grid = TagSignature::new("div").with_attr("id", "g");
        let mut ex = ElementExtractor::new([grid]);
        let out = ex.feed(br#"<div id="g"/><table><tr><td>x</td></tr></table></div><p>after</p>"#);
        assert_eq!(out.len(), 1);
        let div = &out[0].element;
        assert_eq!(div.find_child("table").map(|t| t.first_stripped_text()).as_deref(), Some("x"));
        assert!(!div.to_html().contains("after"));
    }

    #[test]
    fn test_self_closing_slash_on_void_root() {
        let mut ex = ElementExtractor::new([viewstate_sig()]);
        let out = ex.feed(br#"<input id="__VIEWSTATE" value="v2" /><p>x</p>"#);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].element.attr("value"), Some("v2"));
    }

    #[test]
    fn test_optional_end_root_closed_by_ancestor_end_tag() {
        let mut ex = ElementExtractor::new([TagSignature::new("p")]);
        let out = ex.feed(b"<div><p><b>Snitt:</b> 3 125</div><span>junk</span>");
        assert_eq!(out.len(), 1);
        let p = &out[0].element;
        assert_eq!(p.tail_of("b"), Some(" 3 125"));
        assert!(!p.to_html().contains("junk"));
    }

    #[test]
    fn test_missing_target_is_reported_through_state() {
        let mut ex = ElementExtractor::new([viewstate_sig(), table_sig()]);
        let out = ex.feed(br#"<input id="__VIEWSTATE" value="v"><p>no table</p>"#);
        assert_eq!(out.len(), 1);
        assert!(!ex.is_done());
        assert_eq!(ex.remaining(), vec![table_sig()]);
    }

    #[tokio::test]
    async fn test_feed_stream_stops_pulling_once_done() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(br#"<input id="__VIEWSTATE" value="v">"#)),
            Ok(Bytes::from_static(br#"<table class="rgMasterTable"><tbody></tbody></table>"#)),
            Err(Error::Transport("over-consumed".into())),
            Err(Error::Transport("over-consumed".into())),
        ];
        let source = stream::iter(chunks).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut ex = ElementExtractor::new([viewstate_sig(), table_sig()]);
        let out = ex.feed_stream(source).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_feed_stream_returns_partial_result_when_exhausted() {
        let chunks: Vec<Result<Bytes>> = vec![Ok(Bytes::from_static(b"<p>nothing here</p>"))];
        let mut ex = ElementExtractor::new([table_sig()]);
        let out = ex.feed_stream(stream::iter(chunks)).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(ex.remaining(), vec![table_sig()]);
    }
}
