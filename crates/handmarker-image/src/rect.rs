use std::fmt;

use crate::AspectRatio;

/// An axis-aligned rectangle with floating-point position and size.
///
/// Rectangles are stored as their center point and size, which makes growing and aspect ratio
/// adjustments keep the rectangle centered on the same spot.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: [f32; 2],
    size: [f32; 2],
}

impl Rect {
    /// Constructs a [`Rect`] from its center point and size.
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: [x_center, y_center],
            size: [width, height],
        }
    }

    /// Constructs a [`Rect`] from its top-left corner and size.
    #[inline]
    pub fn from_top_left(top_left_x: f32, top_left_y: f32, width: f32, height: f32) -> Self {
        Self::from_center(
            top_left_x + width / 2.0,
            top_left_y + height / 2.0,
            width,
            height,
        )
    }

    /// Computes the axis-aligned bounding rectangle of a set of points.
    ///
    /// Returns [`None`] if `points` is empty.
    pub fn bounding<I: IntoIterator<Item = [f32; 2]>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();

        let first = iter.next()?;
        let (mut min, mut max) = (first, first);

        for [x, y] in iter {
            min = [min[0].min(x), min[1].min(y)];
            max = [max[0].max(x), max[1].max(y)];
        }

        Some(Self::from_top_left(
            min[0],
            min[1],
            max[0] - min[0],
            max[1] - min[1],
        ))
    }

    /// Grows every side of the rectangle by a relative amount of its size.
    ///
    /// An `amount` of `0.25` grows a `100x100` rectangle to `150x150` around the same center.
    pub fn grow_rel(&self, amount: f32) -> Self {
        let [w, h] = self.size;
        Self {
            size: [w + 2.0 * w * amount, h + 2.0 * h * amount],
            ..*self
        }
    }

    /// Grows the rectangle's width or height until it has the aspect ratio `target_aspect`.
    pub fn grow_to_fit_aspect(&self, target_aspect: AspectRatio) -> Self {
        let mut res = *self;
        let target_width = self.height() * target_aspect.as_f32();
        if target_width >= self.width() {
            res.size[0] = target_width;
        } else {
            res.size[1] = self.width() / target_aspect.as_f32();
        }

        res
    }

    /// Returns the X coordinate of the left edge.
    #[inline]
    pub fn x(&self) -> f32 {
        self.center[0] - self.size[0] / 2.0
    }

    /// Returns the Y coordinate of the top edge.
    #[inline]
    pub fn y(&self) -> f32 {
        self.center[1] - self.size[1] / 2.0
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size[0]
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size[1]
    }

    #[inline]
    pub fn center(&self) -> [f32; 2] {
        self.center
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{})/{}x{}",
            self.x(),
            self.y(),
            self.width(),
            self.height()
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn bounding() {
        assert_eq!(Rect::bounding([]), None);

        let rect = Rect::bounding([[1.0, 2.0], [5.0, -2.0], [3.0, 0.0]]).unwrap();
        assert_eq!(rect.x(), 1.0);
        assert_eq!(rect.y(), -2.0);
        assert_eq!(rect.width(), 4.0);
        assert_eq!(rect.height(), 4.0);
    }

    #[test]
    fn grow_keeps_center() {
        let rect = Rect::from_top_left(0.0, 0.0, 100.0, 50.0);
        let grown = rect.grow_rel(0.25);
        assert_eq!(grown.center(), rect.center());
        assert_relative_eq!(grown.width(), 150.0);
        assert_relative_eq!(grown.height(), 75.0);
    }

    #[test]
    fn fit_aspect() {
        let rect = Rect::from_top_left(0.0, 0.0, 640.0, 480.0);
        let square = rect.grow_to_fit_aspect(AspectRatio::SQUARE);
        assert_relative_eq!(square.width(), 640.0);
        assert_relative_eq!(square.height(), 640.0);
        assert_relative_eq!(square.y(), -80.0);

        let tall = Rect::from_top_left(0.0, 0.0, 10.0, 40.0);
        let square = tall.grow_to_fit_aspect(AspectRatio::SQUARE);
        assert_relative_eq!(square.width(), 40.0);
        assert_relative_eq!(square.x(), -15.0);
    }
}
