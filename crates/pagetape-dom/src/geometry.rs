//! Rectangles and CSS-style margins for intersection math

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Intersection with another rect, `None` when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right > x && bottom > y {
            Some(Rect::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Grow the rect on each side by a margin. Percent values resolve
    /// against this rect's own dimensions, matching root-margin semantics.
    pub fn expand(&self, margin: &Margin) -> Rect {
        let top = margin.top.resolve(self.height);
        let right = margin.right.resolve(self.width);
        let bottom = margin.bottom.resolve(self.height);
        let left = margin.left.resolve(self.width);

        Rect::new(
            self.x - left,
            self.y - top,
            self.width + left + right,
            self.height + top + bottom,
        )
    }
}

/// One margin component, pixels or percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarginValue {
    Px(f64),
    Percent(f64),
}

impl MarginValue {
    pub fn resolve(&self, basis: f64) -> f64 {
        match self {
            MarginValue::Px(v) => *v,
            MarginValue::Percent(p) => basis * p / 100.0,
        }
    }
}

/// Four-sided margin parsed in CSS order: top, right, bottom, left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margin {
    pub top: MarginValue,
    pub right: MarginValue,
    pub bottom: MarginValue,
    pub left: MarginValue,
}

impl Default for Margin {
    fn default() -> Self {
        Self::uniform(MarginValue::Px(0.0))
    }
}

impl Margin {
    pub fn uniform(v: MarginValue) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    /// Parse a CSS margin shorthand ("10px", "10px 5%", "1px 2px 3px 4px").
    /// Unparseable input collapses to zero, the way a browser treats an
    /// invalid root-margin.
    pub fn parse(s: &str) -> Margin {
        let parts: Vec<MarginValue> = s.split_whitespace().filter_map(parse_component).collect();

        match parts.len() {
            1 => Margin::uniform(parts[0]),
            2 => Margin {
                top: parts[0],
                right: parts[1],
                bottom: parts[0],
                left: parts[1],
            },
            3 => Margin {
                top: parts[0],
                right: parts[1],
                bottom: parts[2],
                left: parts[1],
            },
            4 => Margin {
                top: parts[0],
                right: parts[1],
                bottom: parts[2],
                left: parts[3],
            },
            _ => Margin::default(),
        }
    }
}

fn parse_component(s: &str) -> Option<MarginValue> {
    let s = s.trim();
    if let Some(pct) = s.strip_suffix('%') {
        return pct.parse::<f64>().ok().map(MarginValue::Percent);
    }
    let px = s.strip_suffix("px").unwrap_or(s);
    px.parse::<f64>().ok().map(MarginValue::Px)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_overlapping() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 100.0, 100.0);
        let i = a.intersect(&b).unwrap();
        assert_eq!(i, Rect::new(50.0, 50.0, 50.0, 50.0));
    }

    #[test]
    fn intersect_disjoint() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn margin_css_order() {
        let m = Margin::parse("1px 2px 3px 4px");
        assert_eq!(m.top, MarginValue::Px(1.0));
        assert_eq!(m.right, MarginValue::Px(2.0));
        assert_eq!(m.bottom, MarginValue::Px(3.0));
        assert_eq!(m.left, MarginValue::Px(4.0));
    }

    #[test]
    fn margin_two_values() {
        let m = Margin::parse("10px 5%");
        assert_eq!(m.top, MarginValue::Px(10.0));
        assert_eq!(m.right, MarginValue::Percent(5.0));
        assert_eq!(m.bottom, MarginValue::Px(10.0));
        assert_eq!(m.left, MarginValue::Percent(5.0));
    }

    #[test]
    fn expand_with_percent() {
        let r = Rect::new(0.0, 0.0, 200.0, 100.0);
        let grown = r.expand(&Margin::parse("10%"));
        assert_eq!(grown.y, -10.0);
        assert_eq!(grown.x, -20.0);
        assert_eq!(grown.width, 240.0);
        assert_eq!(grown.height, 120.0);
    }
}
