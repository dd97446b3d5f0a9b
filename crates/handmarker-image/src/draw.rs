//! Drawing API for [`Image`]s.
//!
//! This module contains a collection of freestanding functions that draw shapes onto an
//! [`Image`]. All functions return a *guard object* that allows optional customization of the
//! shape and performs the draw operation when dropped.
//!
//! All drawing operations *overwrite* the target pixel with the shape color. They do not perform
//! blending. Pixels outside of the image are silently discarded.

use std::{convert::Infallible, thread};

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii, MonoTextStyle},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle, Triangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::{Color, Image, Rect};

/// Guard returned by [`dot`]; draws a filled circle when dropped and allows customization.
pub struct DrawDot<'a> {
    image: &'a mut Image,
    x: f32,
    y: f32,
    radius: f32,
    color: Color,
}

impl DrawDot<'_> {
    /// Sets the dot's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the dot's radius in pixels.
    ///
    /// The default radius is 5.
    pub fn radius(&mut self, radius: f32) -> &mut Self {
        self.radius = radius;
        self
    }
}

impl Drop for DrawDot<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }

        let diameter = (self.radius * 2.0).round().max(1.0) as u32;
        let center = Point::new(self.x.round() as i32, self.y.round() as i32);
        draw(
            self.image,
            Circle::with_center(center, diameter).into_styled(PrimitiveStyle::with_fill(self.color)),
        );
    }
}

/// Guard returned by [`line`]; draws the line when dropped and allows customization.
pub struct DrawLine<'a> {
    image: &'a mut Image,
    start: [f32; 2],
    end: [f32; 2],
    color: Color,
    stroke_width: u32,
}

impl DrawLine<'_> {
    /// Sets the line's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }

        draw(
            self.image,
            Line::new(point(self.start), point(self.end))
                .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width)),
        );
    }
}

/// Guard returned by [`triangle`]; fills the triangle when dropped and allows customization.
pub struct DrawTriangle<'a> {
    image: &'a mut Image,
    vertices: [[f32; 2]; 3],
    color: Color,
}

impl DrawTriangle<'_> {
    /// Sets the fill color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }
}

impl Drop for DrawTriangle<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }

        let [a, b, c] = self.vertices;
        draw(
            self.image,
            Triangle::new(point(a), point(b), point(c))
                .into_styled(PrimitiveStyle::with_fill(self.color)),
        );
    }
}

/// Guard returned by [`rect`]; draws the rectangle when dropped and allows customization.
pub struct DrawRect<'a> {
    image: &'a mut Image,
    rect: Rect,
    color: Color,
    filled: bool,
}

impl DrawRect<'_> {
    /// Sets the rectangle's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Fills the rectangle instead of only drawing its outline.
    pub fn filled(&mut self) -> &mut Self {
        self.filled = true;
        self
    }
}

impl Drop for DrawRect<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }

        let rect = Rectangle::new(
            Point::new(self.rect.x().round() as i32, self.rect.y().round() as i32),
            Size::new(
                self.rect.width().round().max(0.0) as u32,
                self.rect.height().round().max(0.0) as u32,
            ),
        );
        let style = if self.filled {
            PrimitiveStyle::with_fill(self.color)
        } else {
            PrimitiveStyle::with_stroke(self.color, 1)
        };
        draw(self.image, rect.into_styled(style));
    }
}

/// Guard returned by [`text`]; draws the text when dropped and allows customization.
pub struct DrawText<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    text: &'a str,
    color: Color,
    alignment: Alignment,
    baseline: Baseline,
}

impl DrawText<'_> {
    /// Sets the text color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Aligns the top of the text with the `y` coordinate.
    pub fn align_top(&mut self) -> &mut Self {
        self.baseline = Baseline::Top;
        self
    }

    /// Aligns the left side of the text with the `x` coordinate.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }

        let character_style = MonoTextStyle::new(&ascii::FONT_10X20, self.color);
        let text_style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        draw(
            self.image,
            Text::with_text_style(
                self.text,
                Point::new(self.x, self.y),
                character_style,
                text_style,
            ),
        );
    }
}

/// Draws a filled circle (a "dot") centered at `(x, y)`.
pub fn dot(image: &mut Image, x: f32, y: f32) -> DrawDot<'_> {
    DrawDot {
        image,
        x,
        y,
        radius: 5.0,
        color: Color::RED,
    }
}

/// Draws a line onto an image.
pub fn line(image: &mut Image, start: [f32; 2], end: [f32; 2]) -> DrawLine<'_> {
    DrawLine {
        image,
        start,
        end,
        color: Color::BLUE,
        stroke_width: 1,
    }
}

/// Fills a triangle given by its three corners.
pub fn triangle(image: &mut Image, vertices: [[f32; 2]; 3]) -> DrawTriangle<'_> {
    DrawTriangle {
        image,
        vertices,
        color: Color::GREEN,
    }
}

/// Draws the outline of a rectangle.
pub fn rect(image: &mut Image, rect: Rect) -> DrawRect<'_> {
    DrawRect {
        image,
        rect,
        color: Color::GREEN,
        filled: false,
    }
}

/// Draws a text string onto an image.
///
/// By default, the text is drawn centered horizontally and vertically around `x` and `y`.
pub fn text<'a>(image: &'a mut Image, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        image,
        x,
        y,
        text,
        color: Color::WHITE,
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
    }
}

fn point([x, y]: [f32; 2]) -> Point {
    Point::new(x.round() as i32, y.round() as i32)
}

fn draw(image: &mut Image, drawable: impl Drawable<Color = Color>) {
    match drawable.draw(&mut Target(image)) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

struct Target<'a>(&'a mut Image);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = (self.0.width(), self.0.height());

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                self.0.set(pos.x as _, pos.y as _, color);
            }
        }

        Ok(())
    }
}
