//! The 3D scene containing the hand-driven marker.
//!
//! Scene space is right-handed: X points right, Y points up and Z points towards the viewer. The
//! [`PerspectiveCamera`] sits on the positive Z axis and looks at the origin.

mod render;

pub use render::render;

use handmarker_image::{Color, Resolution};
use nalgebra::{Isometry3, Perspective3, Point2, Point3, Vector3};
use serde::Deserialize;

use crate::config::SceneConfig;

/// Surface material of the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    /// Flat color, not affected by lights.
    #[default]
    Basic,
    /// Diffuse surface lit by the scene's ambient and point light.
    Lambert,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Color,
    pub intensity: f32,
    pub position: Point3<f32>,
}

/// The sphere that follows the tracked landmark.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    radius: f32,
    color: Color,
    material: Material,
    position: Point3<f32>,
}

impl Marker {
    /// Creates a marker at the scene origin.
    pub fn new(radius: f32, color: Color, material: Material) -> Self {
        Self {
            radius,
            color,
            material,
            position: Point3::origin(),
        }
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn material(&self) -> Material {
        self.material
    }

    #[inline]
    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    /// Returns a mutable reference to the marker position, for the coordinate mapper to write to.
    #[inline]
    pub fn position_mut(&mut self) -> &mut Point3<f32> {
        &mut self.position
    }
}

/// Axis-aligned cube used to check that rendering works.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestCube {
    pub center: Point3<f32>,
    pub size: f32,
    pub color: Color,
}

impl Default for TestCube {
    fn default() -> Self {
        Self {
            center: Point3::origin(),
            size: 1.0,
            color: Color::GREEN,
        }
    }
}

/// All objects and lights that make up the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub ambient: AmbientLight,
    pub point_light: PointLight,
    pub marker: Marker,
    pub test_cube: Option<TestCube>,
}

impl Scene {
    /// Creates a scene with the marker at the origin and the default lighting (a dim white ambient
    /// light and a white point light at `(5, 5, 5)`).
    pub fn new(marker: Marker) -> Self {
        Self {
            ambient: AmbientLight {
                color: Color::WHITE,
                intensity: 0.5,
            },
            point_light: PointLight {
                color: Color::WHITE,
                intensity: 1.0,
                position: Point3::new(5.0, 5.0, 5.0),
            },
            marker,
            test_cube: None,
        }
    }

    pub fn from_config(config: &SceneConfig) -> Self {
        let marker = Marker::new(
            config.marker_radius,
            config.marker_color(),
            config.marker_material,
        );
        let mut scene = Self::new(marker);
        if config.test_cube {
            scene.test_cube = Some(TestCube::default());
        }
        scene
    }
}

/// A perspective camera looking at the scene origin, with +Y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    fov_y_degrees: f32,
    near: f32,
    far: f32,
    position: Point3<f32>,
}

impl PerspectiveCamera {
    pub const DEFAULT_NEAR: f32 = 0.1;
    pub const DEFAULT_FAR: f32 = 1000.0;

    pub fn new(fov_y_degrees: f32, position: Point3<f32>) -> Self {
        Self {
            fov_y_degrees,
            near: Self::DEFAULT_NEAR,
            far: Self::DEFAULT_FAR,
            position,
        }
    }

    /// Creates the camera described by `config`: on the Z axis, `camera_distance` away from the
    /// origin.
    pub fn from_config(config: &SceneConfig) -> Self {
        Self::new(
            config.fov_degrees,
            Point3::new(0.0, 0.0, config.camera_distance),
        )
    }

    #[inline]
    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    #[inline]
    pub fn near(&self) -> f32 {
        self.near
    }

    #[inline]
    pub fn far(&self) -> f32 {
        self.far
    }

    fn view(&self) -> Isometry3<f32> {
        // Looking straight down the Y axis would make `up` degenerate.
        let forward = Point3::origin() - self.position;
        let up = if forward.cross(&Vector3::y()).norm() < 1e-6 {
            Vector3::z()
        } else {
            Vector3::y()
        };
        Isometry3::look_at_rh(&self.position, &Point3::origin(), &up)
    }

    /// Transforms a scene-space point into view space (camera at the origin, looking down -Z).
    pub fn to_view(&self, point: &Point3<f32>) -> Point3<f32> {
        self.view().transform_point(point)
    }

    /// Returns the focal length in pixels for a target of height `height`.
    pub fn focal_length_px(&self, height: u32) -> f32 {
        let half_fov = self.fov_y_degrees.to_radians() / 2.0;
        height as f32 / 2.0 / half_fov.tan()
    }

    /// Projects a scene-space point onto a target of resolution `res`.
    ///
    /// Returns [`None`] if the point is not in front of the near plane. Points outside of the field
    /// of view are still projected (to coordinates outside of the target).
    pub fn project(&self, point: &Point3<f32>, res: Resolution) -> Option<Point2<f32>> {
        self.project_view(&self.to_view(point), res)
    }

    pub(crate) fn project_view(&self, view: &Point3<f32>, res: Resolution) -> Option<Point2<f32>> {
        if -view.z < self.near {
            return None;
        }

        let aspect = res.width() as f32 / res.height() as f32;
        let proj = Perspective3::new(
            aspect,
            self.fov_y_degrees.to_radians(),
            self.near,
            self.far,
        );
        let ndc = proj.project_point(view);
        Some(Point2::new(
            (ndc.x + 1.0) / 2.0 * res.width() as f32,
            (1.0 - ndc.y) / 2.0 * res.height() as f32,
        ))
    }
}
