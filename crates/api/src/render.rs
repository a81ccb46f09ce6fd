//! Frame overlays and JPEG encoding

use dms::{DmsAnalysis, EyeLabel, EyeReading, EyeRegion};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::ApiError;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
const RED: Rgb<u8> = Rgb([220, 0, 0]);
const DARK: Rgb<u8> = Rgb([40, 40, 40]);

const BAR_ORIGIN: i32 = 10;
const BAR_WIDTH: u32 = 100;
const BAR_HEIGHT: u32 = 10;
const BAR_SPACING: i32 = 14;

const BORDER: u32 = 6;

/// Draw eye boxes, openness bars and the alert banner
pub fn render_overlay(img: &mut RgbImage, analysis: &DmsAnalysis) {
    let mut bar = 0;
    for face in &analysis.faces {
        let Some(eyes) = &face.eyes else { continue };
        for reading in [&eyes.left, &eyes.right] {
            draw_eye_box(img, &reading.region);
            draw_openness_bar(img, bar, reading);
            bar += 1;
        }
    }

    if analysis.has_alert() {
        draw_alert(img);
    }
}

/// 2px white rectangle
fn draw_eye_box(img: &mut RgbImage, region: &EyeRegion) {
    let Ok(region) = region.clamp_to(img.width(), img.height()) else {
        return;
    };
    for inset in 0..2 {
        let w = region.width() - 2 * inset;
        let h = region.height() - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(region.min_x + inset, region.min_y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, rect, WHITE);
    }
}

fn draw_openness_bar(img: &mut RgbImage, index: i32, reading: &EyeReading) {
    let y = BAR_ORIGIN + index * BAR_SPACING;
    draw_filled_rect_mut(
        img,
        Rect::at(BAR_ORIGIN, y).of_size(BAR_WIDTH, BAR_HEIGHT),
        DARK,
    );

    let filled = (reading.openness.clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as u32;
    if filled > 0 {
        let colour = match reading.label {
            EyeLabel::Open => GREEN,
            EyeLabel::Close => RED,
        };
        draw_filled_rect_mut(img, Rect::at(BAR_ORIGIN, y).of_size(filled, BAR_HEIGHT), colour);
    }
}

/// Red border and a centered banner
fn draw_alert(img: &mut RgbImage) {
    let (width, height) = img.dimensions();
    if width <= 2 * BORDER || height <= 2 * BORDER {
        draw_filled_rect_mut(img, Rect::at(0, 0).of_size(width.max(1), height.max(1)), RED);
        return;
    }

    for inset in 0..BORDER {
        let rect = Rect::at(inset as i32, inset as i32)
            .of_size(width - 2 * inset, height - 2 * inset);
        draw_hollow_rect_mut(img, rect, RED);
    }

    let banner_w = (width / 2).max(1);
    let banner_h = (height / 8).max(1);
    let x = ((width - banner_w) / 2) as i32;
    let y = ((height - banner_h) / 2) as i32;
    draw_filled_rect_mut(img, Rect::at(x, y).of_size(banner_w, banner_h), RED);
}

/// Encode as baseline JPEG
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ApiError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .map_err(|e| ApiError::Encode(e.to_string()))?;
    Ok(buf)
}
