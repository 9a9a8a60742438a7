use crate::parser::normalize_whitespace;
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};

/// All text below `el`, whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Text below `el`, leaving out text inside any descendant element for
/// which `skip` returns true (footnote markers, labels and the like).
pub fn text_excluding<F>(el: ElementRef<'_>, skip: F) -> String
where
    F: Fn(&Element) -> bool,
{
    let mut parts: Vec<&str> = Vec::new();

    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != el.id())
            .filter_map(|ancestor| ancestor.value().as_element())
            .any(|element| skip(element));
        if !skipped {
            parts.push(text);
        }
    }

    normalize_whitespace(&parts.join(" "))
}

/// Text of the first match, if it is not blank.
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

pub fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn has_class(element: &Element, class: &str) -> bool {
    element.classes().any(|c| c == class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_footnotes() {
        let html = Html::parse_fragment(r#"<div id="r"><span>Ranked:</span> #12<sup>2</sup></div>"#);
        let selector = Selector::parse("div#r").unwrap();
        let div = html.select(&selector).next().unwrap();

        assert_eq!(element_text(div), "Ranked: #12 2");
        assert_eq!(text_excluding(div, |e| e.name() == "sup"), "Ranked: #12");
    }

    #[test]
    fn first_text_ignores_blank_matches() {
        let html = Html::parse_document("<h1 class='title'>   </h1>");
        let selector = Selector::parse("h1.title").unwrap();
        assert_eq!(first_text(&html, &selector), None);
    }
}
