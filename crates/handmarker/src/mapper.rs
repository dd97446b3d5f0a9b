//! Mapping from video-pixel space to scene space.
//!
//! Video frames have their origin in the top-left corner with Y pointing down, while the scene
//! uses a centered origin with Y pointing up (see the crate-level docs). The [`CoordinateMapper`]
//! normalizes a landmark's X and Y to `[-1, 1]`, flips Y, and multiplies both by a configurable
//! scale. Depth is handled separately by a [`DepthMapping`], since the detector's Z estimate is
//! not measured in pixels.

use handmarker_image::Resolution;
use nalgebra::Point3;
use serde::Deserialize;

use crate::landmark::Landmark;

/// How the detector's relative depth estimate is turned into a scene Z coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DepthMapping {
    /// Ignore the detector's depth and always use `value`.
    Constant { value: f32 },
    /// Multiply the detector's depth by `factor`.
    Scaled { factor: f32 },
}

impl Default for DepthMapping {
    fn default() -> Self {
        Self::Constant { value: 0.0 }
    }
}

impl DepthMapping {
    /// Returns `true` if this mapping only involves finite numbers.
    pub fn is_finite(&self) -> bool {
        match *self {
            Self::Constant { value } => value.is_finite(),
            Self::Scaled { factor } => factor.is_finite(),
        }
    }

    #[inline]
    fn map(&self, z: f32) -> f32 {
        match *self {
            Self::Constant { value } => value,
            Self::Scaled { factor } => z * factor,
        }
    }
}

/// Converts landmark positions into marker positions.
///
/// This is a pure function of its inputs: no clamping happens, so landmarks outside the video frame
/// (which the detector can produce) map to positions outside of `[-scale, scale]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale: f32,
    depth: DepthMapping,
}

impl CoordinateMapper {
    pub fn new(scale: f32, depth: DepthMapping) -> Self {
        Self { scale, depth }
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[inline]
    pub fn depth(&self) -> DepthMapping {
        self.depth
    }

    /// Maps a landmark detected in a frame of resolution `frame` into scene space.
    ///
    /// `frame` must have non-zero width and height.
    pub fn map(&self, landmark: Landmark, frame: Resolution) -> Point3<f32> {
        let half_w = frame.width() as f32 / 2.0;
        let half_h = frame.height() as f32 / 2.0;

        let x = (landmark.x() - half_w) / half_w;
        let y = (half_h - landmark.y()) / half_h;

        Point3::new(
            x * self.scale,
            y * self.scale,
            self.depth.map(landmark.z()),
        )
    }

    /// Maps `landmark` and writes the result to the marker position `target`.
    pub fn apply(&self, landmark: Landmark, frame: Resolution, target: &mut Point3<f32>) {
        *target = self.map(landmark, frame);
        log::trace!(
            "marker position: ({:.3}, {:.3}, {:.3})",
            target.x,
            target.y,
            target.z
        );
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const VGA: Resolution = Resolution::new(640, 480);

    fn mapper(scale: f32) -> CoordinateMapper {
        CoordinateMapper::new(scale, DepthMapping::default())
    }

    #[test]
    fn center_maps_to_origin() {
        for scale in [0.5, 1.0, 5.0, 123.0] {
            let p = mapper(scale).map(Landmark::new(320.0, 240.0, 0.0), VGA);
            assert_eq!(p.x, 0.0);
            assert_eq!(p.y, 0.0);
        }
    }

    #[test]
    fn corners() {
        let m = mapper(5.0);
        let top_left = m.map(Landmark::new(0.0, 0.0, 0.0), VGA);
        assert_relative_eq!(top_left, Point3::new(-5.0, 5.0, 0.0));

        let bottom_right = m.map(Landmark::new(640.0, 480.0, 0.0), VGA);
        assert_relative_eq!(bottom_right, Point3::new(5.0, -5.0, 0.0));
    }

    #[test]
    fn out_of_frame_is_not_clamped() {
        let p = mapper(5.0).map(Landmark::new(960.0, -240.0, 0.0), VGA);
        assert_relative_eq!(p.x, 10.0);
        assert_relative_eq!(p.y, 10.0);
    }

    #[test]
    fn depth_mappings() {
        let lm = Landmark::new(320.0, 240.0, -40.0);

        let constant = CoordinateMapper::new(5.0, DepthMapping::Constant { value: 1.5 });
        assert_eq!(constant.map(lm, VGA).z, 1.5);

        let scaled = CoordinateMapper::new(5.0, DepthMapping::Scaled { factor: 0.01 });
        assert_relative_eq!(scaled.map(lm, VGA).z, -0.4);

        let raw = CoordinateMapper::new(5.0, DepthMapping::Scaled { factor: 1.0 });
        assert_eq!(raw.map(lm, VGA).z, -40.0);
    }

    #[test]
    fn apply_writes_target() {
        let mut pos = Point3::new(9.0, 9.0, 9.0);
        mapper(5.0).apply(Landmark::new(0.0, 0.0, 3.0), VGA, &mut pos);
        assert_relative_eq!(pos, Point3::new(-5.0, 5.0, 0.0));
    }

    #[test]
    fn bounds_and_monotonicity() {
        let res = Resolution::new(1280, 720);
        let (w, h) = (res.width() as f32, res.height() as f32);
        let scale = 3.0;
        let m = mapper(scale);

        let mut rng = fastrand::Rng::with_seed(0x5EED);
        for _ in 0..1000 {
            let (x, y) = (rng.f32() * w, rng.f32() * h);
            let p = m.map(Landmark::new(x, y, rng.f32()), res);
            assert!((-scale..=scale).contains(&p.x), "{p:?}");
            assert!((-scale..=scale).contains(&p.y), "{p:?}");

            // Moving right increases X, moving down decreases Y.
            let right = m.map(Landmark::new(x + 1.0, y, 0.0), res);
            let down = m.map(Landmark::new(x, y + 1.0, 0.0), res);
            assert!(right.x > p.x);
            assert!(down.y < p.y);

            // No hidden state: mapping twice gives the same answer.
            let lm = Landmark::new(x, y, 0.0);
            assert_eq!(m.map(lm, res), m.map(lm, res));
        }
    }

    #[test]
    fn parse_depth_mapping() {
        #[derive(Deserialize)]
        struct Wrapper {
            depth: DepthMapping,
        }

        let w: Wrapper = toml::from_str("depth = { mode = \"scaled\", factor = 0.01 }").unwrap();
        assert_eq!(w.depth, DepthMapping::Scaled { factor: 0.01 });
        let w: Wrapper = toml::from_str("depth = { mode = \"constant\", value = 2.0 }").unwrap();
        assert_eq!(w.depth, DepthMapping::Constant { value: 2.0 });
        assert!(toml::from_str::<Wrapper>("depth = { mode = \"raw\" }").is_err());
    }
}
