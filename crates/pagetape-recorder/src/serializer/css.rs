//! Stylesheet stringification: imports, URL rewriting, and the two
//! engine-specific workarounds carried over from the browser build

use pagetape_dom::{Page, StyleSheet};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Marker joining per-text-node chunks of a `<style>` element's cssText.
pub const SPLIT_MARKER: &str = "/* rr_split */";

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"url\((['"]?)([^)'"]+)\1\)"#).unwrap())
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"@import\s+(?:url\()?['"]?([^'")\s;]+)['"]?\)?"#).unwrap())
}

fn background_clip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?P<decl>background-clip:\s*[^;}]+)").unwrap())
}

fn safari_colon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\[[\w-]+[^\\])(:[\w-]+\])").unwrap())
}

/// Full text of a sheet with `@import` rules recursively inlined and the
/// browser workarounds applied. `None` while an external sheet has no
/// readable rules yet.
pub fn stringify_sheet(page: &Page, sheet: &StyleSheet) -> Option<String> {
    if !sheet.loaded {
        return None;
    }
    let base = sheet.href.as_deref();
    let mut out = String::new();
    for rule in &sheet.rules {
        out.push_str(&stringify_rule(page, rule, base));
    }
    Some(fix_safari_colons(&fix_background_clip(&out)))
}

/// One rule; `@import` resolves to the imported sheet's text with its URLs
/// rewritten against the importer's href.
fn stringify_rule(page: &Page, rule: &str, base: Option<&str>) -> String {
    if let Some(caps) = import_re().captures(rule) {
        let target = &caps[1];
        let resolved = match base {
            Some(base) => absolute_url(base, target),
            None => target.to_string(),
        };
        if let Some(imported) = find_sheet_by_href(page, &resolved) {
            if let Some(text) = stringify_sheet(page, imported) {
                return absolutify_urls(&text, &resolved);
            }
        }
        // Unresolvable import stays verbatim
        return rule.to_string();
    }
    match base {
        Some(base) => absolutify_urls(rule, base),
        None => rule.to_string(),
    }
}

fn find_sheet_by_href<'a>(page: &'a Page, href: &str) -> Option<&'a StyleSheet> {
    let mut id = 0u32;
    loop {
        match page.sheet(pagetape_dom::SheetId(id)) {
            Some(sheet) => {
                if sheet.href.as_deref() == Some(href)
                    || sheet
                        .href
                        .as_deref()
                        .map(|h| href.ends_with(h) || h.ends_with(href))
                        .unwrap_or(false)
                {
                    return Some(sheet);
                }
                id += 1;
            }
            None => return None,
        }
    }
}

/// Rewrite relative `url(...)` references against a base href.
pub fn absolutify_urls(css: &str, base: &str) -> String {
    url_re()
        .replace_all(css, |caps: &regex::Captures| {
            let quote = &caps[1];
            let target = &caps[2];
            if target.starts_with("data:") || target.starts_with("http") || target.starts_with("//")
            {
                return format!("url({q}{t}{q})", q = quote, t = target);
            }
            format!("url({q}{t}{q})", q = quote, t = absolute_url(base, target))
        })
        .to_string()
}

fn absolute_url(base: &str, relative: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(relative)) {
        Ok(url) => url.to_string(),
        Err(_) => relative.to_string(),
    }
}

/// Chrome drops the `-webkit-` prefixed clip on read; re-insert it next
/// to the unprefixed declaration.
pub fn fix_background_clip(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut last = 0;
    for caps in background_clip_re().captures_iter(css) {
        let m = caps.get(0).unwrap();
        out.push_str(&css[last..m.end()]);
        let prefix_present = css[..m.start()].ends_with("-webkit-");
        if !prefix_present {
            let value = caps["decl"].trim_start_matches("background-clip:").trim();
            out.push_str(&format!("; -webkit-background-clip: {}", value));
        }
        last = m.end();
    }
    out.push_str(&css[last..]);
    out
}

/// Safari leaves colons in attribute selectors unescaped; escape them so
/// the stringified rule parses again.
pub fn fix_safari_colons(css: &str) -> String {
    safari_colon_re().replace_all(css, "$1\\$2").to_string()
}

/// cssText of a `<style>` element. With several text children the chunks
/// are joined with the split marker so replay can restore the original
/// node boundaries.
pub fn style_element_css(page: &Page, sheet: &StyleSheet, child_texts: &[String]) -> Option<String> {
    let sheet_text = stringify_sheet(page, sheet)?;
    if child_texts.len() > 1 {
        return Some(child_texts.join(SPLIT_MARKER));
    }
    Some(sheet_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetape_dom::Page;

    #[test]
    fn urls_are_rewritten_against_base() {
        let css = r#".a { background: url("img/x.png"); }"#;
        let out = absolutify_urls(css, "https://cdn.test/styles/main.css");
        assert!(out.contains("url(\"https://cdn.test/styles/img/x.png\")"));
    }

    #[test]
    fn absolute_and_data_urls_untouched() {
        let css = r#".a { background: url(data:image/png;base64,AA==); mask: url(https://x.test/m.svg); }"#;
        let out = absolutify_urls(css, "https://cdn.test/styles/main.css");
        assert!(out.contains("url(data:image/png;base64,AA==)"));
        assert!(out.contains("url(https://x.test/m.svg)"));
    }

    #[test]
    fn background_clip_gets_webkit_twin() {
        let css = ".t { background-clip: text; color: red; }";
        let out = fix_background_clip(css);
        assert!(out.contains("-webkit-background-clip: text"));
        assert!(out.contains("background-clip: text"));
    }

    #[test]
    fn already_prefixed_clip_left_alone() {
        let css = ".t { -webkit-background-clip: text; }";
        let out = fix_background_clip(css);
        assert_eq!(out.matches("background-clip").count(), 1);
    }

    #[test]
    fn safari_colons_escaped() {
        let css = "[data:attr] { color: red; }";
        assert_eq!(fix_safari_colons(css), "[data\\:attr] { color: red; }");
    }

    #[test]
    fn import_is_inlined_and_rewritten() {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let link = page.create_element(main, "link");
        page.append_child(body, link);
        let imported = page.create_linked_stylesheet(link, "https://cdn.test/inner.css");
        page.complete_stylesheet_load(
            imported,
            vec![".x { background: url(\"i.png\"); }".to_string()],
        );

        let importer = page.create_stylesheet(
            None,
            vec!["@import url(\"https://cdn.test/inner.css\");".to_string()],
        );
        let sheet = page.sheet(importer).unwrap();
        let text = stringify_sheet(&page, sheet).unwrap();
        assert!(text.contains("url(\"https://cdn.test/i.png\")"));
        assert!(!text.contains("@import"));
    }

    #[test]
    fn unloaded_sheet_has_no_text() {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let link = page.create_element(main, "link");
        page.append_child(body, link);
        let sheet_id = page.create_linked_stylesheet(link, "https://cdn.test/a.css");
        let sheet = page.sheet(sheet_id).unwrap();
        assert!(stringify_sheet(&page, sheet).is_none());
    }
}
