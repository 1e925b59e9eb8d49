//! Per-element visibility classification
//!
//! Pure geometry and computed-style evaluation; pacing and batching live
//! in the visibility manager.

use pagetape_dom::{Margin, NodeRef, Page, Rect};
use std::collections::HashMap;

/// Evaluation options, shared with the manager.
#[derive(Debug, Clone)]
pub struct VisibilityOptions {
    /// Intersection root; the element's viewport when absent.
    pub root: Option<NodeRef>,
    /// Minimum ratio for an element to count as visible.
    pub threshold: f64,
    /// Ratio delta that re-reports an element even without a flip.
    pub sensitivity: f64,
    /// CSS margin expanding the root rect.
    pub root_margin: String,
}

impl Default for VisibilityOptions {
    fn default() -> Self {
        Self {
            root: None,
            threshold: 0.0,
            sensitivity: 0.05,
            root_margin: "0px".to_string(),
        }
    }
}

/// Evaluation result for one element.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityEntry {
    pub target: NodeRef,
    pub is_visible: bool,
    pub is_style_visible: bool,
    pub intersection_ratio: f64,
    pub intersection_rect: Rect,
    /// Ratio from the previous evaluation, if any.
    pub old_ratio: Option<f64>,
}

/// Evaluate every element against the root, carrying prior ratios forward.
pub fn evaluate<'a>(
    page: &Page,
    elements: impl IntoIterator<Item = &'a NodeRef>,
    previous: &HashMap<NodeRef, VisibilityEntry>,
    options: &VisibilityOptions,
) -> HashMap<NodeRef, VisibilityEntry> {
    let margin = Margin::parse(&options.root_margin);
    let mut out = HashMap::new();

    for &target in elements {
        let el_rect = page.rect(target);
        let root_rect = match options.root {
            Some(root) => page.rect(root),
            None => page.viewport_rect(target.doc),
        }
        .expand(&margin);

        let intersection_rect = el_rect.intersect(&root_rect).unwrap_or_default();
        let ratio = if el_rect.area() > 0.0 {
            round2(intersection_rect.area() / el_rect.area())
        } else {
            0.0
        };

        let is_style_visible = page.style(target).is_visible();
        let is_visible = is_style_visible && ratio > options.threshold;

        out.insert(
            target,
            VisibilityEntry {
                target,
                is_visible,
                is_style_visible,
                intersection_ratio: ratio,
                intersection_rect,
                old_ratio: previous.get(&target).map(|e| e.intersection_ratio),
            },
        );
    }

    out
}

/// A change is reportable when visibility flipped or the ratio moved more
/// than the sensitivity.
pub fn changed(
    previous: Option<&VisibilityEntry>,
    current: &VisibilityEntry,
    sensitivity: f64,
) -> bool {
    match previous {
        None => true,
        Some(prev) => {
            prev.is_visible != current.is_visible
                || (prev.intersection_ratio - current.intersection_ratio).abs() > sensitivity
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetape_dom::{ComputedStyle, Page};

    fn page_with_div(rect: Rect) -> (Page, NodeRef) {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let div = page.create_element(main, "div");
        page.append_child(body, div);
        page.set_rect(div, rect);
        (page, div)
    }

    #[test]
    fn fully_on_screen_has_ratio_one() {
        let (page, div) = page_with_div(Rect::new(10.0, 10.0, 100.0, 100.0));
        let entries = evaluate(
            &page,
            [&div],
            &HashMap::new(),
            &VisibilityOptions::default(),
        );
        let e = &entries[&div];
        assert!(e.is_visible);
        assert_eq!(e.intersection_ratio, 1.0);
    }

    #[test]
    fn half_off_screen_rounds_to_two_decimals() {
        // 100x100 element with 50x100 on screen
        let (page, div) = page_with_div(Rect::new(-50.0, 0.0, 100.0, 100.0));
        let entries = evaluate(
            &page,
            [&div],
            &HashMap::new(),
            &VisibilityOptions::default(),
        );
        assert_eq!(entries[&div].intersection_ratio, 0.5);
    }

    #[test]
    fn display_none_is_not_visible() {
        let (mut page, div) = page_with_div(Rect::new(0.0, 0.0, 100.0, 100.0));
        page.set_style(
            div,
            ComputedStyle {
                display: "none".into(),
                ..Default::default()
            },
        );
        let entries = evaluate(
            &page,
            [&div],
            &HashMap::new(),
            &VisibilityOptions::default(),
        );
        let e = &entries[&div];
        assert!(!e.is_visible);
        assert!(!e.is_style_visible);
    }

    #[test]
    fn zero_opacity_is_not_visible() {
        let (mut page, div) = page_with_div(Rect::new(0.0, 0.0, 100.0, 100.0));
        page.set_style(
            div,
            ComputedStyle {
                opacity: 0.0,
                ..Default::default()
            },
        );
        let entries = evaluate(
            &page,
            [&div],
            &HashMap::new(),
            &VisibilityOptions::default(),
        );
        assert!(!entries[&div].is_visible);
    }

    #[test]
    fn root_margin_extends_the_viewport() {
        // Just below the fold of a 1280x720 viewport
        let (page, div) = page_with_div(Rect::new(0.0, 730.0, 100.0, 100.0));
        let tight = evaluate(
            &page,
            [&div],
            &HashMap::new(),
            &VisibilityOptions::default(),
        );
        assert_eq!(tight[&div].intersection_ratio, 0.0);

        let margined = evaluate(
            &page,
            [&div],
            &HashMap::new(),
            &VisibilityOptions {
                root_margin: "50px".into(),
                ..Default::default()
            },
        );
        assert!(margined[&div].intersection_ratio > 0.0);
    }

    #[test]
    fn change_detection_honors_sensitivity() {
        let (page, div) = page_with_div(Rect::new(0.0, 0.0, 100.0, 100.0));
        let options = VisibilityOptions {
            sensitivity: 0.1,
            ..Default::default()
        };
        let first = evaluate(&page, [&div], &HashMap::new(), &options);

        // Same geometry: no reportable change
        let second = evaluate(&page, [&div], &first, &options);
        assert!(!changed(first.get(&div), &second[&div], options.sensitivity));

        // Small shift under the sensitivity: still no report
        let mut page2 = page;
        page2.set_rect(div, Rect::new(-5.0, 0.0, 100.0, 100.0));
        let third = evaluate(&page2, [&div], &second, &options);
        assert!(!changed(second.get(&div), &third[&div], options.sensitivity));

        // Large shift: reported
        page2.set_rect(div, Rect::new(-60.0, 0.0, 100.0, 100.0));
        let fourth = evaluate(&page2, [&div], &third, &options);
        assert!(changed(third.get(&div), &fourth[&div], options.sensitivity));
    }
}
