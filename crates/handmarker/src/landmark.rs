//! Hand landmarks as produced by a [`LandmarkDetector`].
//!
//! [`LandmarkDetector`]: crate::detector::LandmarkDetector

use handmarker_image::{draw, Color, Image, Rect};
use serde::Deserialize;

/// Number of landmarks in every [`HandDetection`].
pub const NUM_LANDMARKS: usize = 21;

/// A single detected point on a hand, in video-pixel coordinates.
///
/// X and Y are pixel coordinates of the video frame the landmark was detected in (Y pointing
/// *down*). Z is a relative depth estimate whose unit is unrelated to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pos: [f32; 3],
}

impl Landmark {
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { pos: [x, y, z] }
    }

    #[inline]
    pub fn position(&self) -> [f32; 3] {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl LandmarkIdx {
    /// Returns the position of this landmark in a [`HandDetection`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// The full set of [`NUM_LANDMARKS`] landmarks of one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandDetection {
    landmarks: [Landmark; NUM_LANDMARKS],
    presence: f32,
    raw_handedness: f32,
}

impl HandDetection {
    /// Creates a detection with full presence confidence and no handedness information.
    pub fn new(landmarks: [Landmark; NUM_LANDMARKS]) -> Self {
        Self {
            landmarks,
            presence: 1.0,
            raw_handedness: 0.5,
        }
    }

    pub(crate) fn with_scores(mut self, presence: f32, raw_handedness: f32) -> Self {
        self.presence = presence;
        self.raw_handedness = raw_handedness;
        self
    }

    /// Returns all landmarks, ordered by [`LandmarkIdx`].
    #[inline]
    pub fn landmarks(&self) -> &[Landmark; NUM_LANDMARKS] {
        &self.landmarks
    }

    #[inline]
    pub fn landmark(&self, idx: LandmarkIdx) -> Landmark {
        self.landmarks[idx.index()]
    }

    /// Confidence value indicating whether a hand is actually in view.
    ///
    /// In range 0.0 to 1.0; anything above 0.5 indicates that a hand is probably present.
    #[inline]
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the estimated handedness of the hand.
    ///
    /// This assumes that the camera image is passed in as-is (not mirrored).
    pub fn handedness(&self) -> Handedness {
        if self.raw_handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    /// Computes the axis-aligned bounding rectangle of the landmarks' X and Y coordinates.
    pub fn bounding_rect(&self) -> Rect {
        Rect::bounding(self.landmarks.iter().map(|lm| [lm.x(), lm.y()]))
            .expect("hand detections always contain landmarks")
    }

    pub fn map_positions(&mut self, mut f: impl FnMut([f32; 3]) -> [f32; 3]) {
        for lm in &mut self.landmarks {
            lm.pos = f(lm.pos);
        }
    }

    /// Draws the hand's skeleton and a dot at each landmark.
    ///
    /// Landmark pixel coordinates are multiplied with `scale` first, to allow drawing onto a
    /// target that is larger or smaller than the video frame.
    pub fn draw(&self, target: &mut Image, scale: [f32; 2]) {
        let to_target = |lm: Landmark| [lm.x() * scale[0], lm.y() * scale[1]];

        for (a, b) in CONNECTIVITY {
            let a = to_target(self.landmark(*a));
            let b = to_target(self.landmark(*b));
            draw::line(target, a, b).color(Color::GREEN);
        }
        for lm in &self.landmarks {
            let [x, y] = to_target(*lm);
            draw::dot(target, x, y).color(Color::RED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection() -> HandDetection {
        let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
        for (i, lm) in landmarks.iter_mut().enumerate() {
            *lm = Landmark::new(i as f32 * 10.0, 100.0 - i as f32, 0.5);
        }
        HandDetection::new(landmarks)
    }

    #[test]
    fn named_indices() {
        assert_eq!(LandmarkIdx::Wrist.index(), 0);
        assert_eq!(LandmarkIdx::IndexFingerTip.index(), 8);
        assert_eq!(LandmarkIdx::PinkyTip.index(), NUM_LANDMARKS - 1);

        let det = detection();
        assert_eq!(
            det.landmark(LandmarkIdx::IndexFingerTip),
            Landmark::new(80.0, 92.0, 0.5)
        );
    }

    #[test]
    fn bounding_rect() {
        let rect = detection().bounding_rect();
        assert_eq!(rect.x(), 0.0);
        assert_eq!(rect.y(), 80.0);
        assert_eq!(rect.width(), 200.0);
        assert_eq!(rect.height(), 20.0);
    }

    #[test]
    fn handedness() {
        let det = detection();
        assert_eq!(det.presence(), 1.0);
        assert_eq!(det.clone().with_scores(0.9, 0.8).handedness(), Handedness::Right);
        assert_eq!(det.with_scores(0.9, 0.1).handedness(), Handedness::Left);
    }

    #[test]
    fn draw_scaled() {
        let mut image = Image::new(400, 400);
        detection().draw(&mut image, [2.0, 2.0]);
        // Landmark 0 sits at (0, 100) in frame space, (0, 200) in target space.
        assert_eq!(image.get(0, 200), Color::RED);
        assert_eq!(image.get(399, 0), Color::NONE);
    }

    #[test]
    fn parse_landmark_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            landmark: LandmarkIdx,
        }

        let w: Wrapper = toml::from_str("landmark = \"index_finger_tip\"").unwrap();
        assert_eq!(w.landmark, LandmarkIdx::IndexFingerTip);
        assert!(toml::from_str::<Wrapper>("landmark = \"elbow\"").is_err());
    }
}
