//! Vector output: the markup wrapped in an SVG `foreignObject`.

use crate::rendering::element::VisualElement;
use crate::rendering::RenderConfig;
use scraper::{ElementRef, Html, Node};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// Build the SVG document for `element`
pub fn svg_document(element: &VisualElement, config: &RenderConfig) -> String {
    let (width, height) = element.measure();

    let mut style = element.style().to_css();
    style.push_str(&format!(" background-color: {};", config.background_color));
    for (prop, value) in &config.style {
        style.push_str(&format!(" {}: {};", prop, value));
    }

    let fragment = Html::parse_fragment(element.markup());
    let mut body = String::new();
    write_children(fragment.root_element(), &mut body);

    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r#"<foreignObject x="0" y="0" width="100%" height="100%">"#,
            r#"<div xmlns="http://www.w3.org/1999/xhtml" style="{style}">{body}</div>"#,
            "</foreignObject></svg>"
        ),
        w = width,
        h = height,
        style = escape(&style, true),
        body = body
    )
}

// Serialize as well-formed XHTML so the document parses as XML.
fn write_children(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape(text, false)),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    out.push('<');
    out.push_str(name);
    for (attr, value) in el.value().attrs() {
        out.push_str(&format!(" {}=\"{}\"", attr, escape(value, true)));
    }
    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    write_children(el, out);
    out.push_str(&format!("</{}>", name));
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
