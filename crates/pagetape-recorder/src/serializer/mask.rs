//! Text and input masking policies

use crate::config::RecordOptions;
use crate::serializer::locate;
use pagetape_dom::{NodeRef, Page};

/// Replace every character with `*`, preserving length.
pub fn star_mask(value: &str) -> String {
    "*".repeat(value.chars().count())
}

/// Apply the text masking policy to a text value.
pub fn mask_text(options: &RecordOptions, value: &str) -> String {
    match &options.mask_text_fn {
        Some(f) => f(value),
        None => star_mask(value),
    }
}

/// Whether text under `element` must be masked: the element or any
/// ancestor matches the mask class or selector.
pub fn should_mask_text(page: &Page, options: &RecordOptions, element: NodeRef) -> bool {
    let mut current = Some(element);
    while let Some(node) = current {
        if let Some(el) = page.element(node) {
            if el.has_class(&options.mask_text_class) {
                return true;
            }
            if let Some(selector) = &options.mask_text_selector {
                if locate::matches(page, node, selector) {
                    return true;
                }
            }
        }
        current = page.parent(node);
    }
    false
}

/// A password control, by current type or by the retained marker from an
/// earlier serialization.
pub fn is_password(page: &Page, element: NodeRef) -> bool {
    let el = match page.element(element) {
        Some(el) => el,
        None => return false,
    };
    el.attr("type") == Some("password") || el.attr("data-rr-is-password").is_some()
}

/// Mask an input value when the policy applies; `None` leaves the value
/// untouched.
pub fn mask_input_value(
    page: &Page,
    options: &RecordOptions,
    element: NodeRef,
    value: &str,
) -> Option<String> {
    let el = page.element(element)?;
    let kind = match el.tag.as_str() {
        "input" => el.attr("type").unwrap_or("text").to_ascii_lowercase(),
        "textarea" => "textarea".to_string(),
        "select" => "select".to_string(),
        _ => return None,
    };

    let kind = if is_password(page, element) {
        "password".to_string()
    } else {
        kind
    };

    if !options.mask_all_inputs && !options.mask_input_options.masks(&kind) {
        return None;
    }

    Some(match &options.mask_input_fn {
        Some(f) => f(value, &kind),
        None => star_mask(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordOptions;
    use std::rc::Rc;

    fn page_with_input(input_type: &str) -> (Page, NodeRef) {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let input = page.create_element(main, "input");
        page.append_child(body, input);
        page.set_attribute(input, "type", input_type);
        (page, input)
    }

    #[test]
    fn star_mask_preserves_length() {
        assert_eq!(star_mask("secret"), "******");
        assert_eq!(star_mask(""), "");
    }

    #[test]
    fn password_masked_by_default() {
        let (page, input) = page_with_input("password");
        let options = RecordOptions::default();
        assert_eq!(
            mask_input_value(&page, &options, input, "secret"),
            Some("******".to_string())
        );
    }

    #[test]
    fn text_input_unmasked_by_default() {
        let (page, input) = page_with_input("text");
        let options = RecordOptions::default();
        assert_eq!(mask_input_value(&page, &options, input, "hello"), None);
    }

    #[test]
    fn mask_all_inputs_masks_everything() {
        let (page, input) = page_with_input("text");
        let options = RecordOptions {
            mask_all_inputs: true,
            ..Default::default()
        };
        assert_eq!(
            mask_input_value(&page, &options, input, "hello"),
            Some("*****".to_string())
        );
    }

    #[test]
    fn retyped_password_stays_masked() {
        let (mut page, input) = page_with_input("password");
        // The host flipped the type, but the retained marker wins
        page.set_attribute(input, "data-rr-is-password", "true");
        page.set_attribute(input, "type", "text");
        let options = RecordOptions::default();
        assert_eq!(
            mask_input_value(&page, &options, input, "hunter2"),
            Some("*******".to_string())
        );
    }

    #[test]
    fn custom_mask_input_fn_wins() {
        let (page, input) = page_with_input("password");
        let options = RecordOptions {
            mask_input_fn: Some(Rc::new(|v, _| "#".repeat(v.len()))),
            ..Default::default()
        };
        assert_eq!(
            mask_input_value(&page, &options, input, "abc"),
            Some("###".to_string())
        );
    }

    #[test]
    fn mask_text_class_applies_to_descendants() {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let outer = page.create_element(main, "div");
        let inner = page.create_element(main, "span");
        page.append_child(body, outer);
        page.append_child(outer, inner);
        page.set_attribute(outer, "class", "rr-mask");

        let options = RecordOptions::default();
        assert!(should_mask_text(&page, &options, inner));
        assert_eq!(mask_text(&options, "hi there"), "********");
    }
}
