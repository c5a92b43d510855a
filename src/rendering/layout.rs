//! Block layout for markup fragments.
//!
//! Text is grouped under its nearest block-level ancestor and laid out as a
//! vertical stack of boxes using a fixed-width glyph grid.

use scraper::{ElementRef, Html};

/// Glyph cell width (and height) at scale 1
pub const GLYPH_SIZE: u32 = 8;
/// Line advance at scale 1
pub const LINE_HEIGHT: u32 = 10;
/// Widest the render target grows on its own before text wraps
pub const MAX_NATURAL_WIDTH: u32 = 1280;

const BLOCK_PADDING: u32 = 6;
const BLOCK_MARGIN: u32 = 6;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "html", "li",
    "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &["head", "noscript", "script", "style", "template", "title"];

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxModel {
    pub margin: u32,
    pub border: u32,
    pub padding: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub rect: Rect,
    pub box_model: BoxModel,
}

impl LayoutBox {
    pub fn content_width(&self) -> u32 {
        self.rect.width.saturating_sub(2 * (self.box_model.border + self.box_model.padding))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Heading,
    Paragraph,
    ListItem,
}

impl ElementType {
    fn for_tag(name: &str) -> Self {
        match name {
            "h1" | "h2" | "h3" => ElementType::Heading,
            "li" | "dt" | "dd" => ElementType::ListItem,
            _ => ElementType::Paragraph,
        }
    }

    pub fn scale(self) -> u32 {
        match self {
            ElementType::Heading => 2,
            _ => 1,
        }
    }
}

/// Whitespace-collapsed text owned by one block element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub kind: ElementType,
    pub text: String,
}

/// A laid out block: box, wrapped text and glyph scale
#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub lb: LayoutBox,
    pub text: String,
    pub elem_type: ElementType,
    pub scale: u32,
}

/// Size constraints of the render target
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConstraints {
    /// Explicit outer width; `None` shrinks to fit the content
    pub width: Option<u32>,
    pub min_width: u32,
    pub min_height: u32,
    pub padding: u32,
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub nodes: Vec<LayoutNode>,
    pub width: u32,
    pub height: u32,
}

/// Collect the text of a fragment, grouped by nearest block ancestor.
pub fn collect_blocks(fragment: &Html) -> Vec<TextBlock> {
    let mut blocks: Vec<TextBlock> = Vec::new();
    let mut current = None;

    for node in fragment.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }

        let mut anchor: Option<ElementRef> = None;
        let mut skipped = false;
        for ancestor in node.ancestors() {
            if let Some(el) = ElementRef::wrap(ancestor) {
                let name = el.value().name();
                if SKIPPED_TAGS.contains(&name) {
                    skipped = true;
                    break;
                }
                if anchor.is_none() && BLOCK_TAGS.contains(&name) {
                    anchor = Some(el);
                }
            }
        }
        let Some(anchor) = anchor.filter(|_| !skipped) else {
            continue;
        };

        match blocks.last_mut() {
            Some(last) if current == Some(anchor.id()) => {
                last.text.push(' ');
                last.text.push_str(&text);
            }
            _ => {
                blocks.push(TextBlock {
                    kind: ElementType::for_tag(anchor.value().name()),
                    text,
                });
                current = Some(anchor.id());
            }
        }
    }

    blocks
}

fn wrap_text(text: &str, chars_per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        if !cur.is_empty() && cur.chars().count() + word.chars().count() + 1 > chars_per_line {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

fn display_text(block: &TextBlock) -> String {
    match block.kind {
        ElementType::ListItem => format!("- {}", block.text),
        _ => block.text.clone(),
    }
}

/// Lay out `fragment` inside the render target described by `constraints`.
///
/// Without an explicit width the target grows to fit its widest line (up to
/// [`MAX_NATURAL_WIDTH`]), never below `min_width`; height always grows to fit.
pub fn layout_fragment(fragment: &Html, constraints: &LayoutConstraints) -> Layout {
    let blocks = collect_blocks(fragment);
    let pad = constraints.padding;

    let width = match constraints.width {
        Some(w) => w.max(constraints.min_width),
        None => {
            let widest = blocks
                .iter()
                .map(|b| {
                    let chars = display_text(b).chars().count() as u32;
                    chars * GLYPH_SIZE * b.kind.scale() + 2 * BLOCK_PADDING
                })
                .max()
                .unwrap_or(0);
            (widest + 2 * pad).min(MAX_NATURAL_WIDTH).max(constraints.min_width)
        }
    };
    let content_w = width.saturating_sub(2 * pad);

    let mut nodes = Vec::with_capacity(blocks.len());
    let mut y = pad;
    for block in &blocks {
        let scale = block.kind.scale();
        let inner_w = content_w.saturating_sub(2 * BLOCK_PADDING);
        let chars_per_line = ((inner_w / (GLYPH_SIZE * scale)) as usize).max(1);
        let lines = wrap_text(&display_text(block), chars_per_line);
        let box_h = (lines.len() as u32).max(1) * LINE_HEIGHT * scale + 2 * BLOCK_PADDING;

        nodes.push(LayoutNode {
            lb: LayoutBox {
                rect: Rect {
                    x: pad as i32,
                    y: y as i32,
                    width: content_w,
                    height: box_h,
                },
                box_model: BoxModel {
                    margin: BLOCK_MARGIN,
                    border: 0,
                    padding: BLOCK_PADDING,
                },
            },
            text: lines.join("\n"),
            elem_type: block.kind,
            scale,
        });
        y += box_h + BLOCK_MARGIN;
    }
    if !nodes.is_empty() {
        y -= BLOCK_MARGIN;
    }

    Layout {
        nodes,
        width,
        height: (y + pad).max(constraints.min_height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn constraints(width: Option<u32>) -> LayoutConstraints {
        LayoutConstraints { width, min_width: 200, min_height: 100, padding: 20 }
    }

    #[test]
    fn collects_blocks_by_nearest_block_ancestor() {
        let doc = Html::parse_fragment(
            "<div>Intro <b>bold</b><h1>Title</h1><ul><li>One</li><li>Two</li></ul>tail<style>p{}</style></div>",
        );
        let blocks = collect_blocks(&doc);
        let texts: Vec<_> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, ["Intro bold", "Title", "One", "Two", "tail"]);
        assert_eq!(blocks[1].kind, ElementType::Heading);
        assert_eq!(blocks[2].kind, ElementType::ListItem);
    }

    #[test]
    fn natural_width_shrinks_to_content_with_floor() {
        let doc = Html::parse_fragment("<div>hello</div>");
        let layout = layout_fragment(&doc, &constraints(None));
        assert_eq!(layout.width, 200);
        assert_eq!(layout.height, 100);
        assert_eq!(layout.nodes.len(), 1);
    }

    #[test]
    fn natural_width_grows_with_long_lines() {
        let doc = Html::parse_fragment(&format!("<p>{}</p>", "x".repeat(60)));
        let layout = layout_fragment(&doc, &constraints(None));
        // 60 glyphs + block padding + target padding
        assert_eq!(layout.width, 60 * GLYPH_SIZE + 12 + 40);
    }

    #[test]
    fn explicit_width_wraps_text() {
        let words = vec!["word"; 40].join(" ");
        let doc = Html::parse_fragment(&format!("<h1>Heading</h1><p>{}</p>", words));
        let layout = layout_fragment(&doc, &constraints(Some(300)));
        assert_eq!(layout.width, 300);
        assert_eq!(layout.nodes[0].scale, 2);
        let para = &layout.nodes[1];
        assert!(para.text.lines().count() > 1);
        assert!(para.text.lines().all(|l| l.len() as u32 * GLYPH_SIZE <= para.lb.content_width()));
        assert!(layout.height > 100);
    }

    #[test]
    fn empty_fragment_keeps_minimum_box() {
        let doc = Html::parse_fragment("<div>   </div>");
        let layout = layout_fragment(&doc, &constraints(None));
        assert!(layout.nodes.is_empty());
        assert_eq!((layout.width, layout.height), (200, 100));
    }
}
