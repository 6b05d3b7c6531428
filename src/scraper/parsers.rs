use crate::dom::Element;
use crate::error::{Error, Result};
use crate::models::TextTable;

/// Column predicate: 1-based column index and a test on the cell's text.
pub type ColumnPredicate<'a> = (usize, &'a (dyn Fn(&str) -> bool + Send + Sync));

// ── Cells ─────────────────────────────────────────────────────────────────────

pub fn href(el: &Element) -> Result<&str> {
    el.attr("href")
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::element("Element has no href attribute."))
}

/// `href` of the first direct child `<a>`.
pub fn hyperlink_href(cell: &Element) -> Result<String> {
    let a = cell
        .find_child("a")
        .ok_or_else(|| Error::element("Expected child <a> is missing."))?;
    Ok(href(a)?.to_string())
}

/// Absolute URL of the first `href` in the subtree, `None` when there is none.
pub fn url_from_href(el: &Element, base: &str) -> Option<String> {
    std::iter::once(el)
        .chain(el.descendants())
        .find_map(|e| e.attr("href").filter(|h| !h.is_empty()))
        .map(|h| absolute_url(base, h))
}

pub fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    format!("{}{}", base.trim_end_matches('/'), href)
}

pub fn stripped_text_e(el: &Element) -> Result<String> {
    match el.stripped_text() {
        t if t.is_empty() => Err(Error::element("Element contains no text.")),
        t => Ok(t),
    }
}

pub fn first_stripped_text_e(el: &Element) -> Result<String> {
    match el.first_stripped_text() {
        t if t.is_empty() => Err(Error::element("Element contains no text.")),
        t => Ok(t),
    }
}

// ── Tables ────────────────────────────────────────────────────────────────────

pub fn sections(table: &Element) -> Result<(&Element, &Element)> {
    match (table.find_child("thead"), table.find_child("tbody")) {
        (Some(thead), Some(tbody)) => Ok((thead, tbody)),
        (None, None) => Err(Error::element("<table> is missing <thead> and <tbody>.")),
        (None, _) => Err(Error::element("<table> is missing <thead>.")),
        (_, None) => Err(Error::element("<table> is missing <tbody>.")),
    }
}

/// Header rows followed by body rows.
pub fn rows(table: &Element) -> Result<Vec<&Element>> {
    let (thead, tbody) = sections(table)?;
    Ok(thead
        .child_elements()
        .chain(tbody.child_elements())
        .filter(|tr| tr.name() == "tr")
        .collect())
}

/// First non-empty text of every cell, row by row.
pub fn first_stripped_text(table: &Element) -> Result<TextTable> {
    Ok(rows(table)?
        .into_iter()
        .map(|tr| tr.child_elements().map(Element::first_stripped_text).collect())
        .collect())
}

/// Leading text of every cell, row by row.
pub fn stripped_text(table: &Element) -> Result<TextTable> {
    Ok(rows(table)?
        .into_iter()
        .map(|tr| tr.child_elements().map(Element::stripped_text).collect())
        .collect())
}

/// The `i`-th (1-based) `<td>` of every body row that has one.
pub fn column(tbody: &Element, i: usize) -> Result<Vec<&Element>> {
    let cells: Vec<&Element> = tbody
        .descend(&["tr"])
        .into_iter()
        .filter_map(|tr| cell(tr, i))
        .collect();
    if cells.is_empty() {
        return Err(Error::element(format!(
            "Index {i} is greater than the number of columns in <tbody>."
        )));
    }
    Ok(cells)
}

/// The `i`-th (1-based) `<td>` of a row.
pub fn cell(tr: &Element, i: usize) -> Option<&Element> {
    i.checked_sub(1)
        .and_then(|i| tr.child_elements().filter(|c| c.name() == "td").nth(i))
}

/// Copy of `tbody` keeping only rows whose cells satisfy every predicate.
/// A row lacking a predicate's column is dropped.
pub fn filtered_tbody(tbody: &Element, predicates: &[ColumnPredicate<'_>]) -> Element {
    let mut subset = Element::new(tbody.name());
    subset.extend_elements(
        tbody
            .child_elements()
            .filter(|tr| {
                predicates.iter().all(|(i, f)| {
                    cell(tr, *i).is_some_and(|td| f(&td.first_stripped_text()))
                })
            })
            .cloned(),
    );
    subset
}

/// Replaces non-breaking spaces in column `i` (0-based) of every row.
pub fn replace_nbsp(i: usize, rows: &mut TextTable) {
    for cell in rows.iter_mut().filter_map(|row| row.get_mut(i)) {
        if cell.contains('\u{a0}') {
            *cell = cell.replace('\u{a0}', " ");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Element {
        Element::parse(
            r#"<table><thead><tr><th><a>Datum</a></th><th>Match</th><th>Res</th></tr></thead>
            <tbody>
              <tr><td>2012-05-02</td><td> Dackarna - Piraterna </td><td><a href="/Result/1">Matchresultat</a></td></tr>
              <tr><td>2012-05-09</td><td>Indianerna - Vargarna</td><td>Inställd</td></tr>
              <tr><td>2012-05-16</td><td>Masarna - Lejonen</td><td><a href="/Result/3">Matchresultat</a></td></tr>
            </tbody></table>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_sections() {
        let bare = Element::parse("<table><tr><td>x</td></tr></table>").unwrap();
        // the HTML parser inserts <tbody>
        assert_eq!(
            sections(&bare).err().unwrap().to_string(),
            "<table> is missing <thead>."
        );
        let empty = Element::new("table");
        assert_eq!(
            rows(&empty).err().unwrap().to_string(),
            "<table> is missing <thead> and <tbody>."
        );
    }

    #[test]
    fn test_text_tables() {
        let t = table();
        let first = first_stripped_text(&t).unwrap();
        assert_eq!(first[0], vec!["Datum", "Match", "Res"]);
        assert_eq!(first[1][1], "Dackarna - Piraterna");
        assert_eq!(first[1][2], "Matchresultat");

        let leading = stripped_text(&t).unwrap();
        assert_eq!(leading[0][0], "");
        assert_eq!(leading[2][2], "Inställd");
    }

    #[test]
    fn test_column_is_one_based() {
        let t = table();
        let tbody = t.find_child("tbody").unwrap();
        let dates: Vec<String> = column(tbody, 1)
            .unwrap()
            .into_iter()
            .map(Element::first_stripped_text)
            .collect();
        assert_eq!(dates, vec!["2012-05-02", "2012-05-09", "2012-05-16"]);
        assert!(column(tbody, 0).is_err());
        assert!(column(tbody, 4).is_err());
    }

    #[test]
    fn test_filtered_tbody_applies_every_predicate() {
        let t = table();
        let tbody = t.find_child("tbody").unwrap();
        let is_result = |s: &str| s == "Matchresultat";
        let not_may_16 = |s: &str| s != "2012-05-16";
        let predicates: [ColumnPredicate<'_>; 2] = [(3, &is_result), (1, &not_may_16)];
        let subset = filtered_tbody(tbody, &predicates);
        assert_eq!(subset.child_elements().count(), 1);
        let hrefs: Vec<String> = column(&subset, 3)
            .unwrap()
            .into_iter()
            .map(|td| hyperlink_href(td).unwrap())
            .collect();
        assert_eq!(hrefs, vec!["/Result/1"]);
    }

    #[test]
    fn test_urls() {
        let t = table();
        let tbody = t.find_child("tbody").unwrap();
        let cells = column(tbody, 3).unwrap();
        assert_eq!(
            url_from_href(cells[0], "https://ta.svemo.se").as_deref(),
            Some("https://ta.svemo.se/Result/1")
        );
        assert_eq!(url_from_href(cells[1], "https://ta.svemo.se"), None);
        assert!(hyperlink_href(cells[1]).is_err());
        assert_eq!(absolute_url("https://a/", "https://b/x"), "https://b/x");
    }

    #[test]
    fn test_replace_nbsp_only_touches_column() {
        let mut rows = vec![
            vec!["a\u{a0}b".to_string(), "c\u{a0}d".to_string()],
            vec!["e".to_string()],
        ];
        replace_nbsp(0, &mut rows);
        assert_eq!(rows[0], vec!["a b", "c\u{a0}d"]);
        assert_eq!(rows[1], vec!["e"]);
    }
}
