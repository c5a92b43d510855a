//! Rasterizer for the paint command list

use crate::rendering::layout::{GLYPH_SIZE, LINE_HEIGHT};
use crate::rendering::paint::{PaintCommand, Rgba8};
use crate::{Error, Result};
use image::{Rgba, RgbaImage};

/// Largest device-pixel size of either side of a raster target
pub const MAX_CANVAS_DIMENSION: u32 = 32_768;

/// Rasterize `commands` onto a `width` x `height` target at `pixel_ratio`.
///
/// Glyphs are drawn as solid blocks on the layout's glyph grid, which keeps
/// output deterministic without a font stack. Targets wider or taller than
/// [`MAX_CANVAS_DIMENSION`] device pixels are refused.
pub fn rasterize(commands: &[PaintCommand], width: u32, height: u32, pixel_ratio: u32) -> Result<RgbaImage> {
    let ratio = pixel_ratio.max(1);
    let scaled = |side: u32| side.checked_mul(ratio).filter(|s| *s <= MAX_CANVAS_DIMENSION);
    let (Some(target_w), Some(target_h)) = (scaled(width), scaled(height)) else {
        return Err(Error::Other(format!(
            "canvas {}x{} at pixel ratio {} exceeds the {}px limit",
            width, height, ratio, MAX_CANVAS_DIMENSION
        )));
    };
    let mut img = RgbaImage::new(target_w, target_h);

    for cmd in commands {
        match cmd {
            PaintCommand::SolidRect { x, y, width, height, rgba } => {
                fill_rect(&mut img, *x * ratio as i32, *y * ratio as i32, width * ratio, height * ratio, *rgba);
            }
            PaintCommand::Text { x, y, text, scale, rgba } => {
                let cell = GLYPH_SIZE * scale * ratio;
                let advance = LINE_HEIGHT * scale * ratio;
                let inset = scale * ratio;
                let glyph = cell.saturating_sub(2 * inset);
                for (row, line) in text.lines().enumerate() {
                    for (col, ch) in line.chars().enumerate() {
                        if ch.is_whitespace() {
                            continue;
                        }
                        let gx = *x * ratio as i32 + (col as u32 * cell + inset) as i32;
                        let gy = *y * ratio as i32 + (row as u32 * advance + inset) as i32;
                        fill_rect(&mut img, gx, gy, glyph, glyph, *rgba);
                    }
                }
            }
        }
    }
    Ok(img)
}

fn fill_rect(img: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32, rgba: Rgba8) {
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = (i64::from(x) + i64::from(width)).clamp(0, i64::from(img.width())) as u32;
    let y1 = (i64::from(y) + i64::from(height)).clamp(0, i64::from(img.height())) as u32;
    let px = Rgba([rgba.0, rgba.1, rgba.2, rgba.3]);
    for yy in y0..y1 {
        for xx in x0..x1 {
            img.put_pixel(xx, yy, px);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_fills_scaled_target() {
        let cmds = [PaintCommand::SolidRect { x: 0, y: 0, width: 10, height: 5, rgba: (9, 9, 9, 255) }];
        let img = rasterize(&cmds, 10, 5, 2).unwrap();
        assert_eq!(img.dimensions(), (20, 10));
        assert_eq!(img.get_pixel(19, 9), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn glyphs_skip_whitespace_and_clip() {
        let cmds = [PaintCommand::Text { x: 0, y: 0, text: "a b".into(), scale: 1, rgba: (1, 2, 3, 255) }];
        let img = rasterize(&cmds, 20, 10, 1).unwrap();
        // first glyph covers (1..7, 1..7); the space leaves the second cell empty
        assert_eq!(img.get_pixel(3, 3), &Rgba([1, 2, 3, 255]));
        assert_eq!(img.get_pixel(11, 3)[3], 0);
        // third glyph starts at x=17 and is clipped at the right edge
        assert_eq!(img.get_pixel(19, 3), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn oversized_targets_are_refused() {
        let cmds = [PaintCommand::SolidRect { x: 0, y: 0, width: 1, height: 1, rgba: (0, 0, 0, 255) }];
        assert!(matches!(rasterize(&cmds, 3_000_000_000, 100, 2), Err(Error::Other(_))));
        assert!(rasterize(&cmds, 10_000, 100, 4).is_err());
        assert!(rasterize(&cmds, 100, MAX_CANVAS_DIMENSION + 1, 1).is_err());
        assert_eq!(rasterize(&cmds, MAX_CANVAS_DIMENSION, 1, 1).unwrap().width(), MAX_CANVAS_DIMENSION);
    }
}
