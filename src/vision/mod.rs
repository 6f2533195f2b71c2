// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image handling around detection requests
//!
//! - loading images and inlining them as data URLs for VLM requests
//! - drawing detected boxes back onto the source image

pub mod annotate;
pub mod image_utils;

pub use annotate::{annotate, draw_rectangle};
pub use image_utils::{
    decode_data_url, decode_image_bytes, detect_format, load_image_file, to_png_data_url,
    ImageError,
};
