//! Owned element trees for captured markup.
//!
//! Captured subtrees outlive the parser that produced them, get mutated by the
//! pagination loop (rows moved between pages, footers stripped) and are deep
//! cloned into page caches. `scraper::Html` is immutable and borrows from its
//! own arena, so captures are converted into the plain tree below.

use scraper::{ElementRef, Html, Selector};
use std::fmt::Write as _;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(text.to_string()));
        self
    }

    /// Parses `markup` and returns its first element.
    pub fn parse(markup: &str) -> Option<Self> {
        let name = leading_tag_name(markup)?;
        Self::materialize(&name, markup)
    }

    /// Parses markup whose outermost element is named `root`.
    ///
    /// Table parts cannot stand alone in a fragment, so they are wrapped in
    /// the minimum table scaffolding before parsing.
    pub fn materialize(root: &str, markup: &str) -> Option<Self> {
        let html = Html::parse_fragment(&wrap_table_part(root, markup));
        locate(&html, root).map(Self::from_element_ref)
    }

    pub fn from_element_ref(element: ElementRef<'_>) -> Self {
        let value = element.value();
        let mut out = Self {
            name: value.name().to_ascii_lowercase(),
            attrs: value
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            children: Vec::new(),
        };
        for child in element.children() {
            match child.value() {
                scraper::Node::Text(text) => out.children.push(Node::Text(text.text.to_string())),
                scraper::Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        out.children.push(Node::Element(Self::from_element_ref(el)));
                    }
                }
                _ => {}
            }
        }
        out
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> + Clone {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_ascii_lowercase(), value.to_string())),
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.name == name)
    }

    /// Every descendant element in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.child_elements().collect();
        stack.reverse();
        while let Some(el) = stack.pop() {
            out.push(el);
            let at = stack.len();
            stack.extend(el.child_elements());
            stack[at..].reverse();
        }
        out
    }

    pub fn find_descendant(&self, name: &str) -> Option<&Element> {
        self.descendants().into_iter().find(|e| e.name == name)
    }

    /// Elements reached by following `path` one child step per name, in
    /// document order. Equivalent to the relative path `./a/b/c`; `*` matches
    /// any element.
    pub fn descend(&self, path: &[&str]) -> Vec<&Element> {
        path.iter().fold(vec![self], |level, name| {
            level
                .into_iter()
                .flat_map(|el| el.child_elements().filter(move |c| *name == "*" || c.name == *name))
                .collect()
        })
    }

    /// Child-index path from `self` to the first descendant satisfying `pred`.
    pub fn path_to<F>(&self, pred: F) -> Option<Vec<usize>>
    where
        F: Fn(&Element) -> bool + Copy,
    {
        for (i, child) in self.child_elements().enumerate() {
            if pred(child) {
                return Some(vec![i]);
            }
            if let Some(mut rest) = child.path_to(pred) {
                rest.insert(0, i);
                return Some(rest);
            }
        }
        None
    }

    /// Element at a child-index path produced by [`path_to`](Self::path_to).
    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |el, &i| el.child_elements().nth(i))
    }

    // ── Text ──────────────────────────────────────────────────────────────────

    /// Text preceding the first child element.
    pub fn text(&self) -> Option<&str> {
        match self.children.first() {
            Some(Node::Text(t)) => Some(t),
            _ => None,
        }
    }

    /// Leading text, trimmed; empty when absent.
    pub fn stripped_text(&self) -> String {
        self.text().map(str::trim).unwrap_or_default().to_string()
    }

    /// Text immediately following the first child element named `name`.
    pub fn tail_of(&self, name: &str) -> Option<&str> {
        let pos = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.name == name))?;
        match self.children.get(pos + 1) {
            Some(Node::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, text: &str) {
        match self.children.first_mut() {
            Some(Node::Text(t)) => *t = text.to_string(),
            _ => self.children.insert(0, Node::Text(text.to_string())),
        }
    }

    /// All text nodes of the subtree in document order.
    pub fn iter_text(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_text(self, &mut out);
        out
    }

    pub fn iter_stripped_text(&self) -> impl Iterator<Item = &str> {
        self.iter_text()
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// First non-empty trimmed text anywhere in the subtree; empty when none.
    pub fn first_stripped_text(&self) -> String {
        self.iter_stripped_text()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    pub fn push(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Removes and returns every child element, keeping text nodes.
    pub fn take_child_elements(&mut self) -> Vec<Element> {
        let (elements, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.children)
            .into_iter()
            .partition(|n| matches!(n, Node::Element(_)));
        self.children = rest;
        elements
            .into_iter()
            .filter_map(|n| match n {
                Node::Element(e) => Some(e),
                Node::Text(_) => None,
            })
            .collect()
    }

    pub fn extend_elements<I: IntoIterator<Item = Element>>(&mut self, elements: I) {
        self.children
            .extend(elements.into_iter().map(Node::Element));
    }

    /// Removes every direct child element named `name`; returns how many.
    pub fn remove_children_named(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, Node::Element(e) if e.name == name));
        before - self.children.len()
    }

    pub fn remove_first_child_element(&mut self) -> Option<Element> {
        let pos = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(_)))?;
        match self.children.remove(pos) {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Descendants matching a CSS selector, in document order.
    pub fn select(&self, selector: &Selector) -> Vec<Element> {
        let html = Html::parse_fragment(&wrap_table_part(&self.name, &self.to_html()));
        match locate(&html, &self.name) {
            Some(root) => root.select(selector).map(Self::from_element_ref).collect(),
            None => Vec::new(),
        }
    }

    pub fn select_first(&self, selector: &Selector) -> Option<Element> {
        self.select(selector).into_iter().next()
    }

    // ── Serialization ─────────────────────────────────────────────────────────

    pub fn to_html(&self) -> String {
        let mut buf = String::new();
        self.write_html(&mut buf);
        buf
    }

    fn write_html(&self, buf: &mut String) {
        write_start_tag(buf, &self.name, self.attrs());
        if is_void(&self.name) {
            return;
        }
        let raw = RAW_TEXT_ELEMENTS.contains(&self.name.as_str());
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_html(buf),
                Node::Text(t) => write_text(buf, t, raw),
            }
        }
        write_end_tag(buf, &self.name);
    }
}

fn collect_text<'a>(el: &'a Element, out: &mut Vec<&'a str>) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

// ── Markup writing ────────────────────────────────────────────────────────────

pub(crate) fn write_start_tag<'a, I>(buf: &mut String, name: &str, attrs: I)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    buf.push('<');
    buf.push_str(name);
    for (k, v) in attrs {
        let _ = write!(buf, " {}=\"", k);
        for c in v.chars() {
            match c {
                '&' => buf.push_str("&amp;"),
                '"' => buf.push_str("&quot;"),
                _ => buf.push(c),
            }
        }
        buf.push('"');
    }
    buf.push('>');
}

pub(crate) fn write_end_tag(buf: &mut String, name: &str) {
    let _ = write!(buf, "</{}>", name);
}

pub(crate) fn write_text(buf: &mut String, text: &str, raw: bool) {
    if raw {
        buf.push_str(text);
        return;
    }
    for c in text.chars() {
        match c {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            _ => buf.push(c),
        }
    }
}

pub(crate) fn is_raw_text(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&name)
}

// ── Fragment parsing ──────────────────────────────────────────────────────────

fn wrap_table_part(root: &str, markup: &str) -> String {
    match root {
        "td" | "th" => format!("<table><tbody><tr>{markup}</tr></tbody></table>"),
        "tr" => format!("<table><tbody>{markup}</tbody></table>"),
        "tbody" | "thead" | "tfoot" | "caption" | "colgroup" => {
            format!("<table>{markup}</table>")
        }
        _ => markup.to_string(),
    }
}

fn locate<'a>(html: &'a Html, name: &str) -> Option<ElementRef<'a>> {
    html.root_element()
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name().eq_ignore_ascii_case(name))
}

fn leading_tag_name(markup: &str) -> Option<String> {
    let start = markup.find('<')? + 1;
    let name: String = markup[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_text_accessors() {
        let p = Element::parse("<p>  lead <b>Average:</b> 1234 <i>x</i></p>").unwrap();
        assert_eq!(p.name(), "p");
        assert_eq!(p.text(), Some("  lead "));
        assert_eq!(p.stripped_text(), "lead");
        assert_eq!(p.tail_of("b"), Some(" 1234 "));
        assert_eq!(
            p.iter_stripped_text().collect::<Vec<_>>(),
            vec!["lead", "Average:", "1234", "x"]
        );
    }

    #[test]
    fn test_materialize_table_parts() {
        let tr = Element::materialize("tr", "<tr><td>A</td><td>B</td></tr>").unwrap();
        assert_eq!(tr.name(), "tr");
        assert_eq!(tr.child_elements().count(), 2);

        let td = Element::materialize("td", "<td class=\"x\">A</td>").unwrap();
        assert_eq!(td.attr("class"), Some("x"));
        assert_eq!(td.first_stripped_text(), "A");
    }

    #[test]
    fn test_to_html_round_trips_through_parse() {
        let src = Element::new("div")
            .with_attr("title", "a \"q\" & b")
            .with_text("1 < 2")
            .with_child(Element::new("br"))
            .with_child(Element::new("span").with_text("x"));
        let html = src.to_html();
        assert_eq!(
            html,
            "<div title=\"a &quot;q&quot; &amp; b\">1 &lt; 2<br><span>x</span></div>"
        );
        assert_eq!(Element::parse(&html).unwrap(), src);
    }

    #[test]
    fn test_select_is_relative_to_descendants() {
        let table = Element::parse(
            "<table class=\"t\"><tbody><tr><td><a href=\"/x\">x</a></td></tr></tbody></table>",
        )
        .unwrap();
        let sel = Selector::parse("a").unwrap();
        let found = table.select(&sel);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attr("href"), Some("/x"));
        assert!(table.select(&Selector::parse("table").unwrap()).is_empty());
    }

    #[test]
    fn test_descend_and_paths() {
        let root = Element::parse(
            "<div><div><p>a</p></div><div><p>b</p><span><a href=\"h\">c</a></span></div></div>",
        )
        .unwrap();
        let ps = root.descend(&["div", "p"]);
        assert_eq!(ps.len(), 2);
        assert_eq!(ps[1].first_stripped_text(), "b");

        let path = root.path_to(|e| e.attr("href") == Some("h")).unwrap();
        assert_eq!(path, vec![1, 1, 0]);
        assert_eq!(root.at_path(&path[..1]).unwrap().first_stripped_text(), "b");
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = Element::parse("<ul><li>1</li><li>2</li></ul>").unwrap();
        let copy = original.clone();
        original.remove_children_named("li");
        assert_eq!(original.child_elements().count(), 0);
        assert_eq!(copy.child_elements().count(), 2);
    }
}
