//! XPath and CSS selector derivation, plus the small matcher backing the
//! uniqueness check and the class/selector policies
//!
//! The matcher handles comma-separated compound simple selectors (tag,
//! `#id`, `.class`, `[attr]`, `[attr="value"]`, `:nth-of-type(n)`), which
//! covers both the selectors this module generates and the policy
//! selectors hosts pass in.

use pagetape_dom::{NodeRef, Page};

/// Absolute-ish XPath: the id shortcut when available, otherwise a chain
/// of tags with positional indices.
pub fn xpath(page: &Page, node: NodeRef) -> String {
    if let Some(id) = page.attr(node, "id") {
        return format!("//*[@id=\"{}\"]", id);
    }

    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        let tag = match page.tag(n) {
            Some(t) => t.to_string(),
            None => break, // reached the document node
        };
        segments.push(format!("{}[{}]", tag, page.same_tag_index(n)));
        current = page.parent(n);
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

/// CSS selector: id shortcut, then tag + classes + data attributes if
/// unique in the document, else the positional chain.
pub fn selector(page: &Page, node: NodeRef) -> String {
    if let Some(id) = page.attr(node, "id") {
        return format!("#{}", id);
    }

    let descriptive = descriptive_selector(page, node);
    if let Some(sel) = descriptive {
        if count_matches(page, node.doc, &sel) == 1 {
            return sel;
        }
    }

    positional_chain(page, node)
}

fn descriptive_selector(page: &Page, node: NodeRef) -> Option<String> {
    let el = page.element(node)?;
    let mut sel = el.tag.clone();
    if let Some(class) = el.attr("class") {
        for part in class.split_whitespace() {
            sel.push('.');
            sel.push_str(part);
        }
    }
    for (name, value) in &el.attrs {
        if name.starts_with("data-") {
            sel.push_str(&format!("[{}=\"{}\"]", name, value));
        }
    }
    Some(sel)
}

fn positional_chain(page: &Page, node: NodeRef) -> String {
    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        let tag = match page.tag(n) {
            Some(t) => t.to_string(),
            None => break,
        };
        segments.push(format!("{}:nth-of-type({})", tag, page.same_tag_index(n)));
        current = page.parent(n);
    }
    segments.reverse();
    segments.join(" > ")
}

/// Count elements in `doc` matching a compound simple selector.
pub fn count_matches(page: &Page, doc: pagetape_dom::DocId, selector: &str) -> usize {
    page.attached_elements(doc)
        .into_iter()
        .filter(|&n| matches(page, n, selector))
        .count()
}

/// Match `node` against a selector list.
pub fn matches(page: &Page, node: NodeRef, selector: &str) -> bool {
    selector
        .split(',')
        .any(|part| matches_compound(page, node, part.trim()))
}

fn matches_compound(page: &Page, node: NodeRef, compound: &str) -> bool {
    let el = match page.element(node) {
        Some(el) => el,
        None => return false,
    };
    if compound.is_empty() {
        return false;
    }

    for part in split_compound(compound) {
        let ok = match part {
            SimplePart::Tag(tag) => el.tag == tag,
            SimplePart::Id(id) => el.attr("id") == Some(id),
            SimplePart::Class(class) => el.has_class(class),
            SimplePart::AttrPresent(name) => el.attr(name).is_some(),
            SimplePart::AttrEquals(name, value) => el.attr(name) == Some(value),
            SimplePart::NthOfType(n) => page.same_tag_index(node) == n,
        };
        if !ok {
            return false;
        }
    }
    true
}

enum SimplePart<'a> {
    Tag(&'a str),
    Id(&'a str),
    Class(&'a str),
    AttrPresent(&'a str),
    AttrEquals(&'a str, &'a str),
    NthOfType(usize),
}

fn split_compound(compound: &str) -> Vec<SimplePart<'_>> {
    let mut parts = Vec::new();
    let bytes = compound.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'#' | b'.' => {
                let sigil = bytes[i];
                let start = i + 1;
                let end = scan_name(bytes, start);
                let name = &compound[start..end];
                parts.push(if sigil == b'#' {
                    SimplePart::Id(name)
                } else {
                    SimplePart::Class(name)
                });
                i = end;
            }
            b'[' => {
                let close = compound[i..].find(']').map(|p| i + p).unwrap_or(bytes.len());
                let inner = &compound[i + 1..close];
                match inner.split_once('=') {
                    Some((name, value)) => {
                        parts.push(SimplePart::AttrEquals(name, value.trim_matches('"')))
                    }
                    None => parts.push(SimplePart::AttrPresent(inner)),
                }
                i = close + 1;
            }
            b':' => {
                let start = i + 1;
                let rest = &compound[start..];
                if let Some(args) = rest
                    .strip_prefix("nth-of-type(")
                    .and_then(|r| r.split_once(')'))
                {
                    if let Ok(n) = args.0.parse::<usize>() {
                        parts.push(SimplePart::NthOfType(n));
                    }
                    i = start + "nth-of-type(".len() + args.0.len() + 1;
                } else {
                    // Unsupported pseudo-class; skip its name
                    i = scan_name(bytes, start);
                }
            }
            _ => {
                let end = scan_name(bytes, i);
                if end > i {
                    parts.push(SimplePart::Tag(&compound[i..end]));
                    i = end;
                } else {
                    i += 1;
                }
            }
        }
    }
    parts
}

fn scan_name(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len()
        && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-' || bytes[i] == b'_')
    {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetape_dom::Page;

    fn sample_page() -> (Page, NodeRef, NodeRef, NodeRef) {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let first = page.create_element(main, "div");
        let second = page.create_element(main, "div");
        let button = page.create_element(main, "button");
        page.append_child(body, first);
        page.append_child(body, second);
        page.append_child(second, button);
        (page, first, second, button)
    }

    #[test]
    fn id_shortcut_wins() {
        let (mut page, first, ..) = sample_page();
        page.set_attribute(first, "id", "hero");
        assert_eq!(xpath(&page, first), "//*[@id=\"hero\"]");
        assert_eq!(selector(&page, first), "#hero");
    }

    #[test]
    fn xpath_uses_positional_chain() {
        let (page, _, second, button) = sample_page();
        assert_eq!(xpath(&page, second), "/html[1]/body[1]/div[2]");
        assert_eq!(xpath(&page, button), "/html[1]/body[1]/div[2]/button[1]");
    }

    #[test]
    fn unique_class_selector_is_kept() {
        let (mut page, first, ..) = sample_page();
        page.set_attribute(first, "class", "hero primary");
        assert_eq!(selector(&page, first), "div.hero.primary");
    }

    #[test]
    fn ambiguous_selector_falls_back_to_positions() {
        let (mut page, first, second, _) = sample_page();
        page.set_attribute(first, "class", "card");
        page.set_attribute(second, "class", "card");
        assert_eq!(
            selector(&page, second),
            "html:nth-of-type(1) > body:nth-of-type(1) > div:nth-of-type(2)"
        );
    }

    #[test]
    fn data_attributes_refine_selectors() {
        let (mut page, first, second, _) = sample_page();
        page.set_attribute(first, "class", "card");
        page.set_attribute(second, "class", "card");
        page.set_attribute(second, "data-test", "checkout");
        assert_eq!(selector(&page, second), "div.card[data-test=\"checkout\"]");
    }

    #[test]
    fn matcher_handles_compound_selectors() {
        let (mut page, first, _, button) = sample_page();
        page.set_attribute(first, "class", "card open");
        assert!(matches(&page, first, "div.card"));
        assert!(matches(&page, first, ".open"));
        assert!(!matches(&page, first, "div.closed"));
        assert!(matches(&page, button, "button, a"));
        assert!(matches(&page, button, "button:nth-of-type(1)"));
    }
}
