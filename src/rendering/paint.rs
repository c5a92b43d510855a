//! Paint commands produced from a layout

use crate::rendering::layout::Layout;

pub type Rgba8 = (u8, u8, u8, u8);

/// Default text colour of the render target (`#333`)
pub const TEXT_COLOR: Rgba8 = (0x33, 0x33, 0x33, 0xff);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Rgba8,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        scale: u32,
        rgba: Rgba8,
    },
}

/// Parse a CSS colour: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa` or a basic name.
pub fn parse_color(input: &str) -> Option<Rgba8> {
    let s = input.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return match hex.len() {
            3 => Some((nibble(0)?, nibble(1)?, nibble(2)?, 0xff)),
            4 => Some((nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
            6 => Some((byte(0)?, byte(2)?, byte(4)?, 0xff)),
            8 => Some((byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        };
    }
    match s.as_str() {
        "white" => Some((0xff, 0xff, 0xff, 0xff)),
        "black" => Some((0, 0, 0, 0xff)),
        "transparent" => Some((0, 0, 0, 0)),
        "red" => Some((0xff, 0, 0, 0xff)),
        "green" => Some((0, 0x80, 0, 0xff)),
        "blue" => Some((0, 0, 0xff, 0xff)),
        "gray" | "grey" => Some((0x80, 0x80, 0x80, 0xff)),
        _ => None,
    }
}

/// Background fill followed by one text command per layout node
pub fn build_display_list(layout: &Layout, background: Rgba8) -> Vec<PaintCommand> {
    let mut cmds = Vec::with_capacity(layout.nodes.len() + 1);
    cmds.push(PaintCommand::SolidRect {
        x: 0,
        y: 0,
        width: layout.width,
        height: layout.height,
        rgba: background,
    });
    for node in &layout.nodes {
        if node.text.is_empty() {
            continue;
        }
        let inset = (node.lb.box_model.border + node.lb.box_model.padding) as i32;
        cmds.push(PaintCommand::Text {
            x: node.lb.rect.x + inset,
            y: node.lb.rect.y + inset,
            text: node.text.clone(),
            scale: node.scale,
            rgba: TEXT_COLOR,
        });
    }
    cmds
}
