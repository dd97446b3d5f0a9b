//! Moves a 3D marker to follow a hand seen by a webcam.
//!
//! The pipeline is driven by [`render_loop::RenderLoop`]: a [`video::VideoSource`] supplies frames,
//! a [`detector::LandmarkDetector`] finds hand landmarks in them, a [`mapper::CoordinateMapper`]
//! turns the configured landmark into a scene position, and [`scene::render`] draws the marker.
//!
//! # Coordinate Systems
//!
//! Landmarks are in *image space*: X points right, Y points down, both measured in pixels of the
//! frame the hand was detected in. Z is a relative depth estimate, scaled like X.
//!
//! The 3D scene uses *world space*: X points right, Y points up, and the camera looks down the
//! negative Z axis from `(0, 0, camera_distance)`. The frame center maps to the world origin.
//!
//! # Environment Variables
//!
//! * `HANDMARKER_WEBCAM_NAME`: forces the camera to open, by V4L2 card name.
//! * `HANDMARKER_MODEL`: overrides the path of the hand landmark model.
//! * `RUST_LOG`: adjusts log filtering, in [`env_logger`] syntax.

use log::LevelFilter;

pub mod config;
pub mod detector;
pub mod gui;
pub mod landmark;
pub mod mapper;
pub mod nn;
pub mod render_loop;
pub mod scene;
pub mod schedule;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and handmarker will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `wgpu` will always log at *warn* level. `RUST_LOG` takes precedence over all of these.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
