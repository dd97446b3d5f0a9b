//! Hand landmark detection.
//!
//! [`OnnxHandDetector`] runs the MediaPipe hand landmark network. The network expects a roughly
//! centered hand, so the detector tracks a region of interest: it starts out with the whole frame,
//! and once a hand was found, the next frame is cropped to the (padded) bounding rectangle of the
//! previous landmarks. When the hand is lost, the next frame is examined as a whole again.

use handmarker_image::{Image, Rect, Resolution};
use itertools::Itertools;

use crate::{
    config::DetectorConfig,
    landmark::{HandDetection, Landmark, NUM_LANDMARKS},
    nn::{Cnn, CnnInputShape, NeuralNetwork, Outputs},
};

/// Estimates hand landmarks in video frames.
pub trait LandmarkDetector {
    /// Estimates the hands visible in `frame`.
    ///
    /// Landmark coordinates of the returned detections are in `frame`'s pixel space. An empty list
    /// means that no hand was found, which is not an error.
    fn estimate(&mut self, frame: &Image) -> anyhow::Result<Vec<HandDetection>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn estimate(&mut self, frame: &Image) -> anyhow::Result<Vec<HandDetection>> {
        (**self).estimate(frame)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("failed to load hand landmark model '{path}': {reason}")]
    Load { path: String, reason: String },
}

/// Hand landmark detector backed by an ONNX model.
pub struct OnnxHandDetector {
    cnn: Cnn,
    presence_threshold: f32,
    roi: Option<Rect>,
}

impl OnnxHandDetector {
    /// Relative amount by which the landmarks' bounding rectangle is grown to obtain the region of
    /// interest for the next frame.
    pub const ROI_PADDING: f32 = 0.3;

    /// Loads the model configured in `config`.
    pub fn load(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let load = || -> anyhow::Result<Cnn> {
            let nn = NeuralNetwork::load(&config.model)?;
            Cnn::new(nn, CnnInputShape::NCHW, 0.0..=1.0)
        };
        let cnn = load().map_err(|e| DetectorError::Load {
            path: config.model.display().to_string(),
            reason: format!("{e:#}"),
        })?;
        log::info!(
            "loaded hand landmark model from '{}' (input {})",
            config.model.display(),
            cnn.input_resolution(),
        );

        Ok(Self {
            cnn,
            presence_threshold: config.presence_threshold,
            roi: None,
        })
    }
}

impl LandmarkDetector for OnnxHandDetector {
    fn estimate(&mut self, frame: &Image) -> anyhow::Result<Vec<HandDetection>> {
        let input_res = self.cnn.input_resolution();
        let Some(aspect) = input_res.aspect_ratio() else {
            anyhow::bail!("network input resolution {input_res} has no aspect ratio");
        };

        let view = self
            .roi
            .unwrap_or_else(|| frame.rect())
            .grow_to_fit_aspect(aspect);
        let outputs = self.cnn.estimate(frame, view)?;
        log::trace!("inference result: {:?}", outputs);

        let mut detection = extract(&outputs)?;
        if detection.presence() < self.presence_threshold {
            if self.roi.take().is_some() {
                log::debug!(
                    "hand lost (presence {:.2} < {:.2})",
                    detection.presence(),
                    self.presence_threshold,
                );
            }
            return Ok(Vec::new());
        }

        map_to_frame(&mut detection, view, input_res);
        self.roi = Some(detection.bounding_rect().grow_rel(Self::ROI_PADDING));
        Ok(vec![detection])
    }
}

/// Decodes the hand landmark network's outputs.
///
/// The outputs are, in order: 21 screen landmarks (`[1, 63]`), the hand presence flag (`[1, 1]`),
/// the handedness (`[1, 1]`), and 21 metric landmarks, which are not used.
fn extract(outputs: &Outputs) -> anyhow::Result<HandDetection> {
    if outputs.len() < 3 {
        anyhow::bail!(
            "hand landmark network has {} outputs, expected at least 3",
            outputs.len()
        );
    }

    let screen_landmarks = outputs[0].as_slice();
    if screen_landmarks.len() != NUM_LANDMARKS * 3 {
        anyhow::bail!(
            "unexpected landmark tensor shape {:?}",
            outputs[0].shape()
        );
    }
    let scalar = |index: usize| match outputs[index].as_slice() {
        &[value] => Ok(value),
        _ => Err(anyhow::anyhow!(
            "expected scalar output {index}, got shape {:?}",
            outputs[index].shape()
        )),
    };
    let presence = scalar(1)?;
    let handedness = scalar(2)?;

    let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
    for (lm, (x, y, z)) in landmarks
        .iter_mut()
        .zip(screen_landmarks.iter().copied().tuples())
    {
        *lm = Landmark::new(x, y, z);
    }

    Ok(HandDetection::new(landmarks).with_scores(presence, handedness))
}

/// Maps landmarks from the network's input coordinate system to the frame containing `view`.
///
/// Depth is scaled like X, so that it stays proportional to the hand's size in the frame.
fn map_to_frame(detection: &mut HandDetection, view: Rect, input_res: Resolution) {
    let scale_x = view.width() / input_res.width() as f32;
    let scale_y = view.height() / input_res.height() as f32;
    detection.map_positions(|[x, y, z]| {
        [
            view.x() + x * scale_x,
            view.y() + y * scale_y,
            z * scale_x,
        ]
    });
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use approx::assert_relative_eq;

    use crate::{landmark::LandmarkIdx, nn::Tensor};

    use super::*;

    fn outputs(presence: f32) -> Outputs {
        let screen = (0..NUM_LANDMARKS)
            .flat_map(|i| [i as f32, 2.0 * i as f32, -(i as f32)])
            .collect::<Vec<_>>();
        Outputs::from_tensors(vec![
            Tensor::new(vec![1, 63], screen).unwrap(),
            Tensor::new(vec![1, 1], vec![presence]).unwrap(),
            Tensor::new(vec![1, 1], vec![0.9]).unwrap(),
            Tensor::new(vec![1, 63], vec![0.0; 63]).unwrap(),
        ])
    }

    #[test]
    fn extract_landmarks() {
        let det = extract(&outputs(0.75)).unwrap();
        assert_eq!(det.presence(), 0.75);
        assert_eq!(det.landmark(LandmarkIdx::Wrist), Landmark::new(0.0, 0.0, 0.0));
        assert_eq!(
            det.landmark(LandmarkIdx::IndexFingerTip),
            Landmark::new(8.0, 16.0, -8.0)
        );
    }

    #[test]
    fn extract_rejects_bad_shapes() {
        let bad = Outputs::from_tensors(vec![
            Tensor::new(vec![1, 3], vec![0.0; 3]).unwrap(),
            Tensor::new(vec![1, 1], vec![1.0]).unwrap(),
            Tensor::new(vec![1, 1], vec![1.0]).unwrap(),
        ]);
        assert!(extract(&bad).is_err());

        let too_few = Outputs::from_tensors(vec![Tensor::new(vec![1], vec![0.0]).unwrap()]);
        assert!(extract(&too_few).is_err());
    }

    #[test]
    fn letterboxed_view_maps_to_frame() {
        // A 640x480 frame is letterboxed to a 640x640 square view for a 224x224 network.
        let frame = Resolution::RES_VGA;
        let input_res = Resolution::new(224, 224);
        let view = frame
            .to_rect()
            .grow_to_fit_aspect(input_res.aspect_ratio().unwrap());
        assert_eq!(view.width(), 640.0);
        assert_eq!(view.height(), 640.0);

        let mut det = extract(&outputs(1.0)).unwrap();
        det.map_positions(|_| [112.0, 112.0, 22.4]);
        map_to_frame(&mut det, view, input_res);

        // The network's center is the frame's center.
        let lm = det.landmark(LandmarkIdx::Wrist);
        assert_relative_eq!(lm.x(), 320.0);
        assert_relative_eq!(lm.y(), 240.0);
        assert_relative_eq!(lm.z(), 64.0, epsilon = 1e-4);
    }

    #[test]
    fn missing_model_is_a_load_error() {
        let config = DetectorConfig {
            model: PathBuf::from("/nonexistent/hand_landmark.onnx"),
            ..DetectorConfig::default()
        };
        let err = OnnxHandDetector::load(&config).err().unwrap();
        let DetectorError::Load { path, .. } = err;
        assert_eq!(path, "/nonexistent/hand_landmark.onnx");
    }
}
