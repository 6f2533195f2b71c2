// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Draw detections onto an image for inspection

use image::{DynamicImage, Rgba, RgbaImage};

use crate::detection::DetectionSet;

pub const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const BOX_THICKNESS: i64 = 2;

/// Copy of `image` with one rectangle outline per detection
pub fn annotate(image: &DynamicImage, detections: &DetectionSet) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    for detection in detections {
        let (x1, y1, x2, y2) = detection.to_corners();
        for inset in 0..BOX_THICKNESS {
            draw_rectangle(
                &mut canvas,
                x1.saturating_add(inset),
                y1.saturating_add(inset),
                x2.saturating_sub(inset),
                y2.saturating_sub(inset),
                BOX_COLOR,
            );
        }
    }
    canvas
}

/// Outline a rectangle, clamped to the image bounds
pub fn draw_rectangle(
    image: &mut RgbaImage,
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
    color: Rgba<u8>,
) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    if width == 0 || height == 0 || right < left || bottom < top {
        return;
    }
    // Entirely outside the image
    if right < 0 || bottom < 0 || left >= width || top >= height {
        return;
    }

    let l = left.clamp(0, width - 1);
    let r = right.clamp(0, width - 1);
    let t = top.clamp(0, height - 1);
    let b = bottom.clamp(0, height - 1);

    for x in l..=r {
        if top >= 0 {
            image.put_pixel(x as u32, t as u32, color);
        }
        if bottom < height {
            image.put_pixel(x as u32, b as u32, color);
        }
    }
    for y in t..=b {
        if left >= 0 {
            image.put_pixel(l as u32, y as u32, color);
        }
        if right < width {
            image.put_pixel(r as u32, y as u32, color);
        }
    }
}
