//! Owned RGBA images for the handmarker pipeline.
//!
//! # Overview
//!
//! [`Image`] is an 8-bit sRGB image with alpha channel, laid out so that it can be uploaded to the
//! GPU without conversion. Webcam frames are decoded into it, the landmark network samples its
//! input tensor from it, and the scene renderer rasterizes into it.
//!
//! Geometry is described with [`Resolution`], [`AspectRatio`] and the floating-point [`Rect`].
//!
//! ## Drawing
//!
//! A few primitive drawing operations are available in the [`draw`] module. They are meant for
//! overlays (landmark dots, status text, wireframes), not as a general-purpose 2D library.

pub mod draw;

mod color;
mod image;
mod jpeg;
mod rect;
mod resolution;

#[cfg(test)]
mod tests;

pub use color::Color;
pub use image::*;
pub use rect::Rect;
pub use resolution::{AspectRatio, Resolution};
