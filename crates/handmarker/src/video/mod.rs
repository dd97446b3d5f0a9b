//! Video sources.
//!
//! A [`VideoSource`] provides the most recent frame of a continuously updating video stream. The
//! only real implementation is [`webcam::WebcamStream`], which captures V4L2 devices on a
//! background thread.

pub mod webcam;

use std::{io, sync::Arc};

use handmarker_image::Image;
use serde::Deserialize;

/// A continuously updating source of video frames.
pub trait VideoSource {
    /// Returns `true` once the source can deliver frames.
    ///
    /// Once a source is ready, it stays ready.
    fn is_ready(&self) -> bool;

    /// Returns the most recently captured frame, or [`None`] if the source is not ready yet.
    fn current_frame(&self) -> Option<Arc<Image>>;
}

impl<V: VideoSource + ?Sized> VideoSource for Box<V> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn current_frame(&self) -> Option<Arc<Image>> {
        (**self).current_frame()
    }
}

/// Errors returned when requesting a video stream.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("permission to access the camera was denied")]
    PermissionDenied,
    #[error("no suitable camera found")]
    NoCamera,
    #[error("failed to start video capture: {0}")]
    Io(#[from] io::Error),
}

/// Which way the requested camera should face.
///
/// V4L2 has no notion of camera orientation, so this is matched against the device name: cameras
/// named "back", "rear" or "world" face the environment, "front", "user", "integrated" or
/// "facetime" cameras face the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Camera pointing at the user.
    User,
    /// Camera pointing away from the user.
    #[default]
    Environment,
}

const ENVIRONMENT_KEYWORDS: &[&str] = &["back", "rear", "world", "environment"];
const USER_KEYWORDS: &[&str] = &["front", "user", "integrated", "facetime"];

impl FacingMode {
    fn keywords(self) -> &'static [&'static str] {
        match self {
            FacingMode::User => USER_KEYWORDS,
            FacingMode::Environment => ENVIRONMENT_KEYWORDS,
        }
    }

    fn opposite(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    /// Classifies the device named `card` with respect to this facing mode.
    pub fn classify(self, card: &str) -> FacingMatch {
        let card = card.to_lowercase();
        let mentions = |mode: FacingMode| mode.keywords().iter().any(|kw| card.contains(kw));
        if mentions(self) {
            FacingMatch::Matches
        } else if mentions(self.opposite()) {
            FacingMatch::Opposite
        } else {
            FacingMatch::Unknown
        }
    }
}

/// Result of [`FacingMode::classify`], ordered from worst to best match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FacingMatch {
    /// The device name indicates that the camera faces the other way.
    Opposite,
    /// The device name says nothing about the camera's orientation.
    Unknown,
    /// The device name indicates the requested orientation.
    Matches,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_device_names() {
        let env = FacingMode::Environment;
        assert_eq!(env.classify("Rear Camera"), FacingMatch::Matches);
        assert_eq!(env.classify("Integrated Webcam"), FacingMatch::Opposite);
        assert_eq!(env.classify("HD Pro Webcam C920"), FacingMatch::Unknown);

        let user = FacingMode::User;
        assert_eq!(user.classify("FaceTime HD Camera"), FacingMatch::Matches);
        assert_eq!(user.classify("OV5640 back"), FacingMatch::Opposite);

        assert!(FacingMatch::Matches > FacingMatch::Unknown);
        assert!(FacingMatch::Unknown > FacingMatch::Opposite);
    }
}
