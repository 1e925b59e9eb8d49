//! slimDOM pruning: scripts, comments, and common head noise

use crate::config::SlimDomOptions;
use pagetape_dom::{NodeData, NodeRef, Page};

const ROBOTS_NAMES: &[&str] = &["robots", "googlebot", "bingbot"];
const SOCIAL_PREFIXES: &[&str] = &["og:", "twitter:", "fb:"];
const AUTHORSHIP_NAMES: &[&str] = &["author", "generator", "framework", "publisher", "progid"];
const DESC_KEYWORD_NAMES: &[&str] = &["description", "keywords"];

/// Whether slimDOM drops this node entirely.
pub fn should_prune(page: &Page, slim: &SlimDomOptions, node: NodeRef) -> bool {
    if slim.is_noop() {
        return false;
    }

    match page.node(node).map(|n| &n.data) {
        Some(NodeData::Comment { .. }) => slim.comment,
        Some(NodeData::Element(el)) => match el.tag.as_str() {
            "script" => slim.script,
            "noscript" => slim.script,
            "link" => {
                let rel = el.attr("rel").unwrap_or("");
                if slim.head_favicon && rel.split_whitespace().any(|r| r.ends_with("icon")) {
                    return true;
                }
                // Script preloads count as script noise
                slim.script && rel == "preload" && el.attr("as") == Some("script")
            }
            "meta" => prune_meta(el.attr("name"), el.attr("property"), el.attr("http-equiv"), slim),
            _ => false,
        },
        _ => false,
    }
}

fn prune_meta(
    name: Option<&str>,
    property: Option<&str>,
    http_equiv: Option<&str>,
    slim: &SlimDomOptions,
) -> bool {
    if slim.head_meta_http_equiv && http_equiv.is_some() {
        return true;
    }
    if slim.head_meta_social {
        if let Some(property) = property {
            if SOCIAL_PREFIXES.iter().any(|p| property.starts_with(p)) {
                return true;
            }
        }
    }
    let name = match name {
        Some(n) => n.to_ascii_lowercase(),
        None => return false,
    };
    if slim.head_meta_robots && ROBOTS_NAMES.contains(&name.as_str()) {
        return true;
    }
    if slim.head_meta_verification && name.contains("verification") {
        return true;
    }
    if slim.head_meta_authorship && AUTHORSHIP_NAMES.contains(&name.as_str()) {
        return true;
    }
    if slim.head_meta_desc_keywords && DESC_KEYWORD_NAMES.contains(&name.as_str()) {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetape_dom::Page;

    fn head_child(page: &mut Page, tag: &str, attrs: &[(&str, &str)]) -> NodeRef {
        let main = page.main();
        let head = page.doc(main).head();
        let el = page.create_element(main, tag);
        page.append_child(head, el);
        for (k, v) in attrs {
            page.set_attribute(el, k, v);
        }
        el
    }

    #[test]
    fn common_preset_prunes_script_and_favicon() {
        let mut page = Page::new("https://example.com/");
        let script = head_child(&mut page, "script", &[("src", "/app.js")]);
        let favicon = head_child(&mut page, "link", &[("rel", "shortcut icon")]);
        let stylesheet = head_child(&mut page, "link", &[("rel", "stylesheet")]);

        let slim = SlimDomOptions::common();
        assert!(should_prune(&page, &slim, script));
        assert!(should_prune(&page, &slim, favicon));
        assert!(!should_prune(&page, &slim, stylesheet));
    }

    #[test]
    fn description_only_pruned_by_all() {
        let mut page = Page::new("https://example.com/");
        let desc = head_child(&mut page, "meta", &[("name", "description"), ("content", "x")]);
        assert!(!should_prune(&page, &SlimDomOptions::common(), desc));
        assert!(should_prune(&page, &SlimDomOptions::all(), desc));
    }

    #[test]
    fn social_and_verification_metas_pruned() {
        let mut page = Page::new("https://example.com/");
        let og = head_child(&mut page, "meta", &[("property", "og:title"), ("content", "x")]);
        let verify = head_child(
            &mut page,
            "meta",
            &[("name", "google-site-verification"), ("content", "t")],
        );
        let slim = SlimDomOptions::common();
        assert!(should_prune(&page, &slim, og));
        assert!(should_prune(&page, &slim, verify));
    }

    #[test]
    fn noop_prunes_nothing() {
        let mut page = Page::new("https://example.com/");
        let script = head_child(&mut page, "script", &[]);
        assert!(!should_prune(&page, &SlimDomOptions::default(), script));
    }
}
