use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use approx::assert_relative_eq;
use handmarker::{
    detector::LandmarkDetector,
    landmark::{HandDetection, Landmark, LandmarkIdx, NUM_LANDMARKS},
    mapper::{CoordinateMapper, DepthMapping},
    render_loop::{
        DisplayOptions, LoopState, RenderLoop, STATUS_HAND, STATUS_NO_HAND, STATUS_VIDEO_READY,
        STATUS_WAITING,
    },
    scene::{Marker, Material, PerspectiveCamera, Scene},
    schedule::{Shutdown, Ticker},
    video::VideoSource,
};
use handmarker_image::{Color, Image, Resolution};
use nalgebra::Point3;

struct FakeVideo {
    ready: Arc<AtomicBool>,
    frame: Arc<Image>,
}

impl VideoSource for FakeVideo {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn current_frame(&self) -> Option<Arc<Image>> {
        self.is_ready().then(|| self.frame.clone())
    }
}

/// Returns queued results in order, then empty detections.
struct FakeDetector {
    calls: Arc<AtomicUsize>,
    results: VecDeque<anyhow::Result<Vec<HandDetection>>>,
}

impl LandmarkDetector for FakeDetector {
    fn estimate(&mut self, _frame: &Image) -> anyhow::Result<Vec<HandDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn hand_at(x: f32, y: f32) -> HandDetection {
    HandDetection::new([Landmark::new(x, y, 0.0); NUM_LANDMARKS])
}

fn new_loop() -> RenderLoop<FakeVideo, FakeDetector> {
    RenderLoop::new(
        Scene::new(Marker::new(0.2, Color::MAGENTA, Material::Basic)),
        PerspectiveCamera::new(75.0, Point3::new(0.0, 0.0, 10.0)),
        CoordinateMapper::new(5.0, DepthMapping::default()),
        LandmarkIdx::IndexFingerTip,
        DisplayOptions::default(),
    )
}

fn video(ready: bool) -> (FakeVideo, Arc<AtomicBool>) {
    let flag = Arc::new(AtomicBool::new(ready));
    let video = FakeVideo {
        ready: flag.clone(),
        frame: Arc::new(Image::filled(Resolution::RES_VGA, Color::BLUE)),
    };
    (video, flag)
}

fn detector(
    results: impl IntoIterator<Item = anyhow::Result<Vec<HandDetection>>>,
) -> (FakeDetector, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = FakeDetector {
        calls: calls.clone(),
        results: results.into_iter().collect(),
    };
    (detector, calls)
}

#[test]
fn waits_for_video_without_detecting() {
    let (video, ready) = video(false);
    let (detector, calls) = detector([]);
    let mut rl = new_loop().with_video(video).with_detector(detector);

    for _ in 0..3 {
        rl.tick();
    }
    assert_eq!(rl.state(), LoopState::WaitingForVideo);
    assert_eq!(rl.status().message(), STATUS_WAITING);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    ready.store(true, Ordering::SeqCst);
    rl.tick();
    assert_eq!(rl.state(), LoopState::Detecting);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // There is no way back.
    ready.store(false, Ordering::SeqCst);
    rl.tick();
    assert_eq!(rl.state(), LoopState::Detecting);
}

#[test]
fn detection_moves_marker() {
    let (video, _) = video(true);
    let (detector, _) = detector([Ok(vec![hand_at(0.0, 0.0)])]);
    let mut rl = new_loop().with_video(video).with_detector(detector);

    assert_eq!(rl.marker_position(), Point3::origin());
    rl.tick();
    assert_eq!(rl.status().message(), STATUS_HAND);
    let pos = rl.marker_position();
    assert_relative_eq!(pos.x, -5.0);
    assert_relative_eq!(pos.y, 5.0);
    assert_relative_eq!(pos.z, 0.0);
}

#[test]
fn empty_detection_keeps_marker() {
    let (video, _) = video(true);
    let (detector, calls) = detector([Ok(vec![hand_at(320.0, 0.0)]), Ok(Vec::new())]);
    let mut rl = new_loop().with_video(video).with_detector(detector);

    rl.tick();
    let moved = rl.marker_position();
    assert_relative_eq!(moved.x, 0.0);
    assert_relative_eq!(moved.y, 5.0);

    rl.tick();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(rl.status().message(), STATUS_NO_HAND);
    assert_eq!(rl.marker_position(), moved);
}

#[test]
fn only_first_detection_is_used() {
    let (video, _) = video(true);
    let (detector, _) = detector([Ok(vec![hand_at(0.0, 0.0), hand_at(640.0, 480.0)])]);
    let mut rl = new_loop().with_video(video).with_detector(detector);

    rl.tick();
    let pos = rl.marker_position();
    assert_relative_eq!(pos.x, -5.0);
    assert_relative_eq!(pos.y, 5.0);
}

#[test]
fn detector_error_keeps_marker() {
    let (video, _) = video(true);
    let (detector, calls) = detector([
        Ok(vec![hand_at(640.0, 480.0)]),
        Err(anyhow::anyhow!("inference failed")),
    ]);
    let mut rl = new_loop().with_video(video).with_detector(detector);

    rl.tick();
    let moved = rl.marker_position();
    assert_relative_eq!(moved.x, 5.0);
    assert_relative_eq!(moved.y, -5.0);

    rl.tick();
    assert_eq!(rl.marker_position(), moved);
    assert_eq!(rl.status().message(), STATUS_NO_HAND);

    // The next tick tries again.
    rl.tick();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn missing_detector_keeps_default_marker() {
    let (video, _) = video(true);
    let mut rl = new_loop().with_video(video);
    rl.add_alert("model missing");

    for _ in 0..3 {
        rl.tick();
    }
    assert_eq!(rl.state(), LoopState::Detecting);
    assert_eq!(rl.status().message(), STATUS_VIDEO_READY);
    assert_eq!(rl.status().alerts(), ["model missing"]);
    assert_eq!(rl.marker_position(), Point3::origin());
}

#[test]
fn missing_video_keeps_waiting() {
    let (detector, calls) = detector([]);
    let mut rl = new_loop().with_detector(detector);
    rl.add_alert("no camera");

    for _ in 0..3 {
        rl.tick();
    }
    assert_eq!(rl.state(), LoopState::WaitingForVideo);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn composes_video_scene_and_alert() {
    let (video, _) = video(true);
    let mut rl = new_loop().with_video(video);
    rl.add_alert("no model");

    let image = rl.tick();
    assert_eq!(image.resolution(), Resolution::RES_VGA);
    // The marker sits at the origin, in front of the video.
    assert_eq!(image.get(320, 240), Color::MAGENTA);
    assert_eq!(image.get(600, 100), Color::BLUE);
    // Alert banner along the bottom edge.
    assert_eq!(image.get(630, 470), Color::RED);
}

#[test]
fn hidden_video_clears_to_black() {
    let (video, _) = video(true);
    let mut rl: RenderLoop<FakeVideo, FakeDetector> = RenderLoop::new(
        Scene::new(Marker::new(0.2, Color::MAGENTA, Material::Basic)),
        PerspectiveCamera::new(75.0, Point3::new(0.0, 0.0, 10.0)),
        CoordinateMapper::new(5.0, DepthMapping::default()),
        LandmarkIdx::IndexFingerTip,
        DisplayOptions {
            show_video: false,
            ..DisplayOptions::default()
        },
    )
    .with_video(video);

    let image = rl.tick();
    assert_eq!(image.get(600, 100), Color::BLACK);
    assert_eq!(image.get(320, 240), Color::MAGENTA);
}

#[test]
fn run_stops_on_shutdown() {
    let (video, _) = video(true);
    let (detector, calls) = detector([]);
    let mut rl = new_loop().with_video(video).with_detector(detector);

    let shutdown = Shutdown::new();
    let mut presented = 0;
    rl.run(&mut Ticker::from_hz(1000), &shutdown, |image| {
        assert_eq!(image.resolution(), Resolution::RES_VGA);
        presented += 1;
        if presented == 3 {
            shutdown.request();
        }
    });
    assert_eq!(presented, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn alerts_accumulate() {
    let (detector, _) = detector([]);
    let mut rl = new_loop().with_detector(detector);
    rl.add_alert("no camera");
    rl.add_alert("no model");

    let image = rl.tick();
    // Two stacked banner lines.
    assert_eq!(image.get(630, 470), Color::RED);
    assert_eq!(image.get(630, 420), Color::RED);
    assert_eq!(image.get(630, 400), Color::NONE);
    assert_eq!(rl.status().alerts(), ["no camera", "no model"]);
}
