//! Drawing on RGB frames via `embedded-graphics`.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use facecheck_core::BoundingBox;
use image::RgbImage;

pub const MATCH_COLOR: Rgb888 = Rgb888::new(0, 255, 0);
pub const NO_MATCH_COLOR: Rgb888 = Rgb888::new(0, 0, 255);
pub const SCAN_LINE_COLOR: Rgb888 = Rgb888::new(0, 255, 255);
pub const SCANNING_TEXT_COLOR: Rgb888 = Rgb888::new(255, 255, 0);

pub const SCANNING_TEXT: &str = "Scanning...";
pub const MATCHED_TEXT: &str = "Face matched";

const BOX_STROKE: u32 = 2;
const SCAN_LINE_THICKNESS: u32 = 2;
const TEXT_ORIGIN: Point = Point::new(10, 10);

/// Adapter that lets `embedded-graphics` draw straight into an [`RgbImage`].
struct Target<'a>(&'a mut RgbImage);

impl OriginDimensions for Target<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(point, color) in pixels {
            if point.x >= 0 && (point.x as u32) < width && point.y >= 0 && (point.y as u32) < height {
                self.0.put_pixel(
                    point.x as u32,
                    point.y as u32,
                    image::Rgb([color.r(), color.g(), color.b()]),
                );
            }
        }

        Ok(())
    }
}

fn draw<D>(image: &mut RgbImage, drawable: D)
where
    D: Drawable<Color = Rgb888>,
{
    match drawable.draw(&mut Target(image)) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

/// Outline `face` (full-frame coordinates) in `color`.
pub fn face_box(image: &mut RgbImage, face: &BoundingBox, color: Rgb888) {
    let (left, top, right, bottom) = face.corners();
    let size = Size::new((right - left).max(0) as u32, (bottom - top).max(0) as u32);
    draw(
        image,
        Rectangle::new(Point::new(left, top), size)
            .into_styled(PrimitiveStyle::with_stroke(color, BOX_STROKE)),
    );
}

/// Full-width horizontal bar starting at row `y`, kept inside the frame.
pub fn scan_line(image: &mut RgbImage, y: u32) {
    let top = y.min(image.height().saturating_sub(SCAN_LINE_THICKNESS)) as i32;
    draw(
        image,
        Rectangle::new(Point::new(0, top), Size::new(image.width(), SCAN_LINE_THICKNESS))
            .into_styled(PrimitiveStyle::with_fill(SCAN_LINE_COLOR)),
    );
}

/// Status text in the top-left corner.
pub fn status_text(image: &mut RgbImage, text: &str, color: Rgb888) {
    let style = MonoTextStyle::new(&FONT_10X20, color);
    draw(image, Text::with_baseline(text, TEXT_ORIGIN, style, Baseline::Top));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black(w: u32, h: u32) -> RgbImage {
        RgbImage::new(w, h)
    }

    fn count_color(image: &RgbImage, color: Rgb888) -> usize {
        let want = [color.r(), color.g(), color.b()];
        image.pixels().filter(|p| p.0 == want).count()
    }

    #[test]
    fn test_face_box_draws_outline_only() {
        let mut img = black(100, 100);
        let face = BoundingBox {
            x: 20.0,
            y: 20.0,
            width: 40.0,
            height: 40.0,
            confidence: 1.0,
            landmarks: None,
        };
        face_box(&mut img, &face, MATCH_COLOR);

        assert!(count_color(&img, MATCH_COLOR) > 0);
        // Centre stays untouched.
        assert_eq!(img.get_pixel(40, 40).0, [0, 0, 0]);
    }

    #[test]
    fn test_face_box_clips_at_frame_edge() {
        let mut img = black(50, 50);
        let face = BoundingBox {
            x: 30.0,
            y: -10.0,
            width: 100.0,
            height: 100.0,
            confidence: 1.0,
            landmarks: None,
        };
        face_box(&mut img, &face, NO_MATCH_COLOR);
        assert!(count_color(&img, NO_MATCH_COLOR) > 0);
    }

    #[test]
    fn test_scan_line_spans_width() {
        let mut img = black(64, 32);
        scan_line(&mut img, 10);
        assert_eq!(img.get_pixel(0, 10).0, [0, 255, 255]);
        assert_eq!(img.get_pixel(63, 11).0, [0, 255, 255]);
        assert_eq!(count_color(&img, SCAN_LINE_COLOR), 64 * 2);
        assert_eq!(img.get_pixel(32, 20).0, [0, 0, 0]);
    }

    #[test]
    fn test_scan_line_at_bottom_edge_stays_visible() {
        let mut img = black(16, 16);
        scan_line(&mut img, 16);
        assert_eq!(count_color(&img, SCAN_LINE_COLOR), 16 * 2);
        assert_eq!(img.get_pixel(0, 15).0, [0, 255, 255]);
    }

    #[test]
    fn test_status_text_renders_pixels() {
        let mut img = black(200, 40);
        status_text(&mut img, MATCHED_TEXT, MATCH_COLOR);
        assert!(count_color(&img, MATCH_COLOR) > 0);
    }
}
