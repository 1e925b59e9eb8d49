//! Recorder configuration
//!
//! `RecordOptions` is the full programmatic surface; `RecordSettings` is
//! the serde-facing subset hosts persist as JSON. Drifted legacy field
//! names from older settings shapes are rejected at load time.

use crate::error::{Error, Result};
use crate::event::{Event, IncrementalData};
use crate::plugin::RecordPlugin;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

/// What the sink receives: a structured event, or the packed form when a
/// `pack_fn` is installed.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Event(Event),
    Packed(String),
}

impl SinkEvent {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            SinkEvent::Event(e) => Some(e),
            SinkEvent::Packed(_) => None,
        }
    }
}

pub type EmitFn = Rc<dyn Fn(&SinkEvent, bool) -> Result<()>>;
pub type PackFn = Rc<dyn Fn(&Event) -> String>;
pub type MaskTextFn = Rc<dyn Fn(&str) -> String>;
/// Receives the raw value and the input type (or tag name).
pub type MaskInputFn = Rc<dyn Fn(&str, &str) -> String>;
pub type KeepIframeSrcFn = Rc<dyn Fn(&str) -> bool>;
pub type ErrorHandler = Rc<dyn Fn(&Error)>;
pub type HookFn = Rc<dyn Fn(&IncrementalData)>;

/// Which input kinds get their values masked.
#[derive(Debug, Clone)]
pub struct MaskInputOptions {
    pub color: bool,
    pub date: bool,
    pub datetime_local: bool,
    pub email: bool,
    pub month: bool,
    pub number: bool,
    pub range: bool,
    pub search: bool,
    pub tel: bool,
    pub text: bool,
    pub time: bool,
    pub url: bool,
    pub week: bool,
    pub textarea: bool,
    pub select: bool,
    pub password: bool,
}

impl Default for MaskInputOptions {
    fn default() -> Self {
        // Passwords are always masked unless explicitly disabled
        Self {
            color: false,
            date: false,
            datetime_local: false,
            email: false,
            month: false,
            number: false,
            range: false,
            search: false,
            tel: false,
            text: false,
            time: false,
            url: false,
            week: false,
            textarea: false,
            select: false,
            password: true,
        }
    }
}

impl MaskInputOptions {
    pub fn all() -> Self {
        Self {
            color: true,
            date: true,
            datetime_local: true,
            email: true,
            month: true,
            number: true,
            range: true,
            search: true,
            tel: true,
            text: true,
            time: true,
            url: true,
            week: true,
            textarea: true,
            select: true,
            password: true,
        }
    }

    pub fn masks(&self, kind: &str) -> bool {
        match kind {
            "color" => self.color,
            "date" => self.date,
            "datetime-local" => self.datetime_local,
            "email" => self.email,
            "month" => self.month,
            "number" => self.number,
            "range" => self.range,
            "search" => self.search,
            "tel" => self.tel,
            "text" => self.text,
            "time" => self.time,
            "url" => self.url,
            "week" => self.week,
            "textarea" => self.textarea,
            "select" => self.select,
            "password" => self.password,
            _ => false,
        }
    }
}

/// Head/script noise pruning.
#[derive(Debug, Clone, Default)]
pub struct SlimDomOptions {
    pub script: bool,
    pub comment: bool,
    pub head_favicon: bool,
    pub head_meta_social: bool,
    pub head_meta_robots: bool,
    pub head_meta_http_equiv: bool,
    pub head_meta_verification: bool,
    pub head_meta_authorship: bool,
    pub head_meta_desc_keywords: bool,
    pub head_title_mutations: bool,
}

impl SlimDomOptions {
    /// The `true` preset: everything except authorship/description/title.
    pub fn common() -> Self {
        Self {
            script: true,
            comment: true,
            head_favicon: true,
            head_meta_social: true,
            head_meta_robots: true,
            head_meta_http_equiv: true,
            head_meta_verification: true,
            head_meta_authorship: false,
            head_meta_desc_keywords: false,
            head_title_mutations: false,
        }
    }

    /// The `'all'` preset.
    pub fn all() -> Self {
        Self {
            head_meta_authorship: true,
            head_meta_desc_keywords: true,
            head_title_mutations: true,
            ..Self::common()
        }
    }

    pub fn is_noop(&self) -> bool {
        !(self.script
            || self.comment
            || self.head_favicon
            || self.head_meta_social
            || self.head_meta_robots
            || self.head_meta_http_equiv
            || self.head_meta_verification
            || self.head_meta_authorship
            || self.head_meta_desc_keywords
            || self.head_title_mutations)
    }
}

/// Per-kind toggles for discrete pointer interactions.
#[derive(Debug, Clone)]
pub struct MouseInteractionSampling {
    pub mouse_up: bool,
    pub mouse_down: bool,
    pub click: bool,
    pub context_menu: bool,
    pub dbl_click: bool,
    pub focus: bool,
    pub blur: bool,
    pub touch_start: bool,
    pub touch_end: bool,
    pub touch_cancel: bool,
}

impl Default for MouseInteractionSampling {
    fn default() -> Self {
        Self {
            mouse_up: true,
            mouse_down: true,
            click: true,
            context_menu: true,
            dbl_click: true,
            focus: true,
            blur: true,
            touch_start: true,
            touch_end: true,
            touch_cancel: true,
        }
    }
}

/// Input event sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputSampling {
    /// Every input event is recorded.
    #[default]
    All,
    /// Only the final value of a quiescent burst.
    Last,
}

/// Visibility flush pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityFlushMode {
    /// Emit as soon as a frame produced changes.
    #[default]
    None,
    /// Restart a timer on change; emit when it fires.
    Debounce,
    /// Emit at most once per window.
    Throttle,
}

/// Visibility pipeline sampling options.
#[derive(Debug, Clone)]
pub struct VisibilitySampling {
    pub mode: VisibilityFlushMode,
    pub debounce: u64,
    pub throttle: u64,
    /// Minimum interval between evaluation passes, in ms. Zero evaluates
    /// every frame.
    pub raf_throttle: u64,
    pub threshold: f64,
    pub sensitivity: f64,
    pub root_margin: String,
}

impl Default for VisibilitySampling {
    fn default() -> Self {
        Self {
            mode: VisibilityFlushMode::None,
            debounce: 100,
            throttle: 100,
            raf_throttle: 0,
            threshold: 0.0,
            sensitivity: 0.05,
            root_margin: "0px".to_string(),
        }
    }
}

/// Canvas capture sampling.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanvasSampling {
    /// When set, emit data-URL snapshots at this rate instead of command
    /// lists.
    pub fps: Option<u32>,
}

/// Observer sampling tree.
#[derive(Debug, Clone)]
pub struct Sampling {
    /// Batch window for mouse/touch movement, in ms.
    pub mousemove: u64,
    pub mouse_interaction: MouseInteractionSampling,
    /// Scroll throttle in ms.
    pub scroll: u64,
    /// Media interaction throttle in ms; zero records every event.
    pub media: u64,
    pub input: InputSampling,
    pub visibility: VisibilitySampling,
    pub canvas: CanvasSampling,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            mousemove: 50,
            mouse_interaction: MouseInteractionSampling::default(),
            scroll: 100,
            media: 0,
            input: InputSampling::default(),
            visibility: VisibilitySampling::default(),
            canvas: CanvasSampling::default(),
        }
    }
}

/// Canvas/image data-URL serialization options.
#[derive(Debug, Clone)]
pub struct DataUrlOptions {
    pub mime_type: String,
    pub quality: f64,
}

impl Default for DataUrlOptions {
    fn default() -> Self {
        Self {
            mime_type: "image/webp".to_string(),
            quality: 0.6,
        }
    }
}

/// When queued custom events flush relative to the first full snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushCustomEvent {
    Before,
    #[default]
    After,
}

/// Which document milestone starts the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordAfter {
    #[default]
    Load,
    DomContentLoaded,
}

/// Coarse pre-emit callbacks per incremental family.
#[derive(Clone, Default)]
pub struct Hooks {
    pub mutation: Option<HookFn>,
    pub mouse_move: Option<HookFn>,
    pub mouse_interaction: Option<HookFn>,
    pub scroll: Option<HookFn>,
    pub viewport_resize: Option<HookFn>,
    pub input: Option<HookFn>,
    pub media_interaction: Option<HookFn>,
    pub style_sheet_rule: Option<HookFn>,
    pub style_declaration: Option<HookFn>,
    pub canvas_mutation: Option<HookFn>,
    pub font: Option<HookFn>,
    pub selection: Option<HookFn>,
    pub adopted_style_sheet: Option<HookFn>,
    pub custom_element: Option<HookFn>,
    pub visibility_mutation: Option<HookFn>,
}

/// Everything `record()` accepts.
pub struct RecordOptions {
    /// Required sink. Missing it is a fatal `InvalidConfig`.
    pub emit: Option<EmitFn>,
    pub checkout_every_nth: Option<u64>,
    pub checkout_every_nms: Option<u64>,
    /// Full snapshot after this many visibility-change entries.
    pub checkout_every_nvm: Option<u64>,
    pub block_class: String,
    pub block_selector: Option<String>,
    pub ignore_class: String,
    pub ignore_selector: Option<String>,
    pub exclude_attribute: Option<Regex>,
    pub mask_text_class: String,
    pub mask_text_selector: Option<String>,
    pub mask_text_fn: Option<MaskTextFn>,
    pub mask_all_inputs: bool,
    pub mask_input_options: MaskInputOptions,
    pub mask_input_fn: Option<MaskInputFn>,
    pub inline_stylesheet: bool,
    pub inline_images: bool,
    pub collect_fonts: bool,
    pub slim_dom: SlimDomOptions,
    pub sampling: Sampling,
    /// Legacy alias for `sampling.mousemove`.
    pub mousemove_wait: Option<u64>,
    pub record_dom: bool,
    pub record_canvas: bool,
    pub record_cross_origin_iframes: bool,
    pub record_after: RecordAfter,
    pub flush_custom_event: FlushCustomEvent,
    pub user_triggered_on_input: bool,
    pub keep_iframe_src_fn: Option<KeepIframeSrcFn>,
    pub ignore_css_attributes: HashSet<String>,
    pub data_url_options: DataUrlOptions,
    pub plugins: Vec<Box<dyn RecordPlugin>>,
    pub hooks: Hooks,
    pub pack_fn: Option<PackFn>,
    pub error_handler: Option<ErrorHandler>,
    /// Timestamp source; the system clock when absent.
    pub clock: Option<Rc<dyn crate::clock::Clock>>,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            emit: None,
            checkout_every_nth: None,
            checkout_every_nms: None,
            checkout_every_nvm: None,
            block_class: "rr-block".to_string(),
            block_selector: None,
            ignore_class: "rr-ignore".to_string(),
            ignore_selector: None,
            exclude_attribute: None,
            mask_text_class: "rr-mask".to_string(),
            mask_text_selector: None,
            mask_text_fn: None,
            mask_all_inputs: false,
            mask_input_options: MaskInputOptions::default(),
            mask_input_fn: None,
            inline_stylesheet: true,
            inline_images: false,
            collect_fonts: false,
            slim_dom: SlimDomOptions::default(),
            sampling: Sampling::default(),
            mousemove_wait: None,
            record_dom: true,
            record_canvas: false,
            record_cross_origin_iframes: false,
            record_after: RecordAfter::default(),
            flush_custom_event: FlushCustomEvent::default(),
            user_triggered_on_input: false,
            keep_iframe_src_fn: None,
            ignore_css_attributes: HashSet::new(),
            data_url_options: DataUrlOptions::default(),
            plugins: Vec::new(),
            hooks: Hooks::default(),
            pack_fn: None,
            error_handler: None,
            clock: None,
        }
    }
}

impl RecordOptions {
    /// Resolve legacy aliases and check required fields. Called by
    /// `record()`; a missing sink throws there.
    pub fn normalize(&mut self) -> Result<()> {
        if self.emit.is_none() {
            return Err(Error::invalid_config("emit is required"));
        }
        if let Some(wait) = self.mousemove_wait.take() {
            self.sampling.mousemove = wait;
        }
        Ok(())
    }

    /// Effective mouse-move batch window.
    pub fn mousemove_window(&self) -> u64 {
        self.mousemove_wait.unwrap_or(self.sampling.mousemove)
    }
}

/// Serde-facing settings shape used by hosts. Field names follow the wire
/// (camelCase); the drifting legacy names are rejected outright.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordSettings {
    pub checkout_every_nth: Option<u64>,
    pub checkout_every_nms: Option<u64>,
    pub checkout_every_nvm: Option<u64>,
    pub block_class: Option<String>,
    pub block_selector: Option<String>,
    pub ignore_class: Option<String>,
    pub ignore_selector: Option<String>,
    pub exclude_attribute: Option<String>,
    pub mask_text_class: Option<String>,
    pub mask_text_selector: Option<String>,
    pub mask_all_inputs: Option<bool>,
    pub inline_stylesheet: Option<bool>,
    pub inline_images: Option<bool>,
    pub collect_fonts: Option<bool>,
    /// `true`, `"all"`, or absent.
    #[serde(rename = "slimDOMOptions")]
    pub slim_dom_options: Option<serde_json::Value>,
    #[serde(rename = "recordDOM")]
    pub record_dom: Option<bool>,
    pub record_canvas: Option<bool>,
    pub record_cross_origin_iframes: Option<bool>,
    pub record_after: Option<String>,
    pub flush_custom_event: Option<String>,
    pub user_triggered_on_input: Option<bool>,
    pub mousemove_wait: Option<u64>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

/// Field names from older drifted settings shapes; canonical spellings
/// exist for each, so their presence means a stale host.
const LEGACY_FIELDS: &[(&str, &str)] = &[
    ("checkoutEveryEvc", "checkoutEveryNvm"),
    ("ignoreAttribute", "excludeAttribute"),
];

impl RecordSettings {
    pub fn parse(json: &str) -> Result<Self> {
        let settings: RecordSettings =
            serde_json::from_str(json).map_err(|e| Error::invalid_config(e.to_string()))?;
        for (legacy, canonical) in LEGACY_FIELDS {
            if settings.unknown.contains_key(*legacy) {
                return Err(Error::invalid_config(format!(
                    "legacy setting '{}' is not accepted; use '{}'",
                    legacy, canonical
                ))
                .with_suggestions(vec![format!("Rename '{}' to '{}'", legacy, canonical)]));
            }
        }
        for key in settings.unknown.keys() {
            tracing::warn!(key = key.as_str(), "ignoring unknown record setting");
        }
        Ok(settings)
    }

    pub fn into_options(self) -> Result<RecordOptions> {
        let mut options = RecordOptions::default();
        options.checkout_every_nth = self.checkout_every_nth;
        options.checkout_every_nms = self.checkout_every_nms;
        options.checkout_every_nvm = self.checkout_every_nvm;
        if let Some(v) = self.block_class {
            options.block_class = v;
        }
        options.block_selector = self.block_selector;
        if let Some(v) = self.ignore_class {
            options.ignore_class = v;
        }
        options.ignore_selector = self.ignore_selector;
        if let Some(pattern) = self.exclude_attribute {
            options.exclude_attribute = Some(
                Regex::new(&pattern)
                    .map_err(|e| Error::invalid_config(format!("excludeAttribute: {}", e)))?,
            );
        }
        if let Some(v) = self.mask_text_class {
            options.mask_text_class = v;
        }
        options.mask_text_selector = self.mask_text_selector;
        if let Some(v) = self.mask_all_inputs {
            options.mask_all_inputs = v;
            if v {
                options.mask_input_options = MaskInputOptions::all();
            }
        }
        if let Some(v) = self.inline_stylesheet {
            options.inline_stylesheet = v;
        }
        options.inline_images = self.inline_images.unwrap_or(false);
        options.collect_fonts = self.collect_fonts.unwrap_or(false);
        options.slim_dom = match self.slim_dom_options {
            None => SlimDomOptions::default(),
            Some(serde_json::Value::Bool(true)) => SlimDomOptions::common(),
            Some(serde_json::Value::Bool(false)) => SlimDomOptions::default(),
            Some(serde_json::Value::String(s)) if s == "all" => SlimDomOptions::all(),
            Some(other) => {
                return Err(Error::invalid_config(format!(
                    "slimDOMOptions must be true, false or \"all\", got {}",
                    other
                )))
            }
        };
        if let Some(v) = self.record_dom {
            options.record_dom = v;
        }
        options.record_canvas = self.record_canvas.unwrap_or(false);
        options.record_cross_origin_iframes = self.record_cross_origin_iframes.unwrap_or(false);
        options.record_after = match self.record_after.as_deref() {
            None | Some("load") => RecordAfter::Load,
            Some("DOMContentLoaded") => RecordAfter::DomContentLoaded,
            Some(other) => {
                return Err(Error::invalid_config(format!(
                    "recordAfter must be 'load' or 'DOMContentLoaded', got '{}'",
                    other
                )))
            }
        };
        options.flush_custom_event = match self.flush_custom_event.as_deref() {
            None | Some("after") => FlushCustomEvent::After,
            Some("before") => FlushCustomEvent::Before,
            Some(other) => {
                return Err(Error::invalid_config(format!(
                    "flushCustomEvent must be 'before' or 'after', got '{}'",
                    other
                )))
            }
        };
        options.user_triggered_on_input = self.user_triggered_on_input.unwrap_or(false);
        options.mousemove_wait = self.mousemove_wait;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn legacy_checkout_field_is_rejected() {
        let err = RecordSettings::parse(r#"{"checkoutEveryEvc": 10}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
        assert!(err.message.contains("checkoutEveryNvm"));
    }

    #[test]
    fn legacy_ignore_attribute_is_rejected() {
        let err = RecordSettings::parse(r#"{"ignoreAttribute": "data-x"}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }

    #[test]
    fn canonical_settings_load() {
        let settings = RecordSettings::parse(
            r#"{"checkoutEveryNvm": 25, "maskAllInputs": true, "slimDOMOptions": "all"}"#,
        )
        .unwrap();
        let options = settings.into_options().unwrap();
        assert_eq!(options.checkout_every_nvm, Some(25));
        assert!(options.mask_all_inputs);
        assert!(options.mask_input_options.masks("text"));
        assert!(options.slim_dom.head_meta_desc_keywords);
    }

    #[test]
    fn missing_emit_fails_normalize() {
        let mut options = RecordOptions::default();
        let err = options.normalize().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }

    #[test]
    fn mousemove_wait_aliases_sampling() {
        let mut options = RecordOptions {
            emit: Some(Rc::new(|_, _| Ok(()))),
            mousemove_wait: Some(20),
            ..Default::default()
        };
        options.normalize().unwrap();
        assert_eq!(options.sampling.mousemove, 20);
    }
}
