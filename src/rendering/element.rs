//! Transient render target built for a single export.

use crate::rendering::layout::{layout_fragment, Layout, LayoutConstraints};
use scraper::Html;

/// Inline style applied to the render target
#[derive(Debug, Clone, PartialEq)]
pub struct ElementStyle {
    pub width: Option<u32>,
    pub min_width: u32,
    pub min_height: u32,
    pub padding: u32,
    pub background_color: String,
    pub font_family: String,
    pub font_size_px: u32,
    pub line_height: f32,
    pub color: String,
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            width: None,
            min_width: 200,
            min_height: 100,
            padding: 20,
            background_color: "#ffffff".to_string(),
            font_family: "Arial, sans-serif".to_string(),
            font_size_px: 14,
            line_height: 1.4,
            color: "#333".to_string(),
        }
    }
}

impl ElementStyle {
    /// Serialize as a CSS declaration list
    pub fn to_css(&self) -> String {
        let mut css = format!(
            "padding: {}px; min-width: {}px; min-height: {}px; background-color: {}; font-family: {}; font-size: {}px; line-height: {}; color: {}; overflow: visible; white-space: normal; word-wrap: break-word;",
            self.padding,
            self.min_width,
            self.min_height,
            self.background_color,
            self.font_family,
            self.font_size_px,
            self.line_height,
            self.color
        );
        if let Some(w) = self.width {
            css.push_str(&format!(" width: {}px;", w));
        }
        css
    }
}

/// The markup plus the style of its off-screen render target.
///
/// One element is created per export and dropped when the export finishes;
/// the parsed document is rebuilt on demand rather than stored.
#[derive(Debug, Clone)]
pub struct VisualElement {
    markup: String,
    style: ElementStyle,
}

impl VisualElement {
    pub fn new(markup: impl Into<String>, background_color: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            style: ElementStyle {
                background_color: background_color.into(),
                ..Default::default()
            },
        }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn style(&self) -> &ElementStyle {
        &self.style
    }

    /// Pin the target to an explicit width
    pub fn set_width(&mut self, width: u32) {
        self.style.width = Some(width);
        self.style.min_width = width;
    }

    pub fn set_min_width(&mut self, min_width: u32) {
        self.style.min_width = min_width;
    }

    pub fn layout(&self) -> Layout {
        let fragment = Html::parse_fragment(&self.markup);
        layout_fragment(
            &fragment,
            &LayoutConstraints {
                width: self.style.width,
                min_width: self.style.min_width,
                min_height: self.style.min_height,
                padding: self.style.padding,
            },
        )
    }

    /// Current outer size of the target
    pub fn measure(&self) -> (u32, u32) {
        let layout = self.layout();
        (layout.width, layout.height)
    }
}
