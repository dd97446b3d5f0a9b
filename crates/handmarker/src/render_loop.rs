//! The per-tick loop tying video, detection, mapping and rendering together.
//!
//! Every tick, the loop checks whether the [`VideoSource`] has delivered a frame yet. Once it has,
//! each tick runs the [`LandmarkDetector`] on the latest frame and moves the scene's marker to the
//! configured landmark. The scene is redrawn on every tick, whether or not detection ran.

use std::ops::ControlFlow;

use handmarker_image::{draw, Color, Image, Rect, Resolution};
use nalgebra::Point3;

use crate::{
    config::Config,
    detector::LandmarkDetector,
    landmark::{HandDetection, LandmarkIdx},
    mapper::CoordinateMapper,
    scene::{self, PerspectiveCamera, Scene},
    schedule::{Shutdown, Ticker},
    timer::{FpsCounter, Timer},
    video::VideoSource,
};

pub const STATUS_WAITING: &str = "Waiting for video...";
pub const STATUS_VIDEO_READY: &str = "Video ready.";
pub const STATUS_NO_HAND: &str = "No hand detected.";
pub const STATUS_HAND: &str = "Hand detected.";

const ALERT_BANNER_HEIGHT: f32 = 32.0;
const TEXT_MARGIN: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// The video source has not delivered a frame yet. Detection does not run.
    WaitingForVideo,
    /// Detection runs on every tick. There is no way back to [`LoopState::WaitingForVideo`].
    Detecting,
}

/// The user-visible status line and alerts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    message: &'static str,
    alerts: Vec<String>,
}

impl Status {
    #[inline]
    pub fn message(&self) -> &'static str {
        self.message
    }

    /// Returns all alerts, oldest first.
    #[inline]
    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }
}

/// Options controlling how a tick's output image is composed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayOptions {
    pub resolution: Resolution,
    pub show_video: bool,
    pub draw_landmarks: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::RES_VGA,
            show_video: true,
            draw_landmarks: true,
        }
    }
}

/// Everything the loop reads and writes between ticks.
struct Context {
    scene: Scene,
    camera: PerspectiveCamera,
    mapper: CoordinateMapper,
    landmark: LandmarkIdx,
    status: Status,
    /// The detection of the latest tick, with the resolution of the frame it was found in.
    hand: Option<(HandDetection, Resolution)>,
}

/// Drives detection and redraws the scene once per tick.
///
/// Both collaborators are optional: without a video source, the loop stays in
/// [`LoopState::WaitingForVideo`] forever. Without a detector, the marker never moves.
pub struct RenderLoop<V, D> {
    video: Option<V>,
    detector: Option<D>,
    state: LoopState,
    ctx: Context,
    display: DisplayOptions,
    canvas: Image,
    t_detect: Timer,
    t_render: Timer,
    fps: FpsCounter,
}

impl<V: VideoSource, D: LandmarkDetector> RenderLoop<V, D> {
    pub fn new(
        scene: Scene,
        camera: PerspectiveCamera,
        mapper: CoordinateMapper,
        landmark: LandmarkIdx,
        display: DisplayOptions,
    ) -> Self {
        Self {
            video: None,
            detector: None,
            state: LoopState::WaitingForVideo,
            ctx: Context {
                scene,
                camera,
                mapper,
                landmark,
                status: Status {
                    message: STATUS_WAITING,
                    alerts: Vec::new(),
                },
                hand: None,
            },
            display,
            canvas: Image::filled(display.resolution, Color::BLACK),
            t_detect: Timer::new("detect"),
            t_render: Timer::new("render"),
            fps: FpsCounter::new("render loop"),
        }
    }

    /// Creates a render loop with the scene, camera, mapping and display settings in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Scene::from_config(&config.scene),
            PerspectiveCamera::from_config(&config.scene),
            config.mapping.mapper(),
            config.mapping.landmark,
            DisplayOptions {
                resolution: config.display.resolution(),
                show_video: config.display.show_video,
                draw_landmarks: config.display.draw_landmarks,
            },
        )
    }

    pub fn with_video(mut self, video: V) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_detector(mut self, detector: D) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Shows `alert` in a banner on every following frame, below any earlier alerts.
    pub fn add_alert(&mut self, alert: impl Into<String>) {
        self.ctx.status.alerts.push(alert.into());
    }

    #[inline]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[inline]
    pub fn status(&self) -> &Status {
        &self.ctx.status
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.ctx.scene
    }

    #[inline]
    pub fn marker_position(&self) -> Point3<f32> {
        self.ctx.scene.marker.position()
    }

    /// Returns the image composed by the last tick.
    #[inline]
    pub fn canvas(&self) -> &Image {
        &self.canvas
    }

    /// Runs a single tick and returns the composed output image.
    pub fn tick(&mut self) -> &Image {
        if self.state == LoopState::WaitingForVideo
            && self.video.as_ref().map_or(false, |v| v.is_ready())
        {
            log::info!("video ready, starting detection");
            self.state = LoopState::Detecting;
            self.ctx.status.message = STATUS_VIDEO_READY;
        }

        let frame = match self.state {
            LoopState::WaitingForVideo => None,
            LoopState::Detecting => self.video.as_ref().and_then(|v| v.current_frame()),
        };

        if let (Some(frame), Some(detector)) = (&frame, &mut self.detector) {
            let result = self.t_detect.time(|| detector.estimate(frame));
            let first = match result {
                Ok(hands) => hands.into_iter().next(),
                Err(e) => {
                    log::error!("hand detection failed: {e:#}");
                    None
                }
            };

            let ctx = &mut self.ctx;
            match first {
                Some(hand) => {
                    let res = frame.resolution();
                    ctx.mapper.apply(
                        hand.landmark(ctx.landmark),
                        res,
                        ctx.scene.marker.position_mut(),
                    );
                    ctx.status.message = STATUS_HAND;
                    ctx.hand = Some((hand, res));
                }
                None => {
                    ctx.status.message = STATUS_NO_HAND;
                    ctx.hand = None;
                }
            }
        }

        self.t_render.time(|| {
            compose(
                &mut self.canvas,
                &self.ctx,
                &self.display,
                frame.as_deref(),
            )
        });
        self.fps.tick_with([&self.t_detect, &self.t_render]);

        &self.canvas
    }

    /// Runs ticks at the rate of `ticker` until `shutdown` is requested, passing every composed
    /// image to `present`.
    pub fn run(
        &mut self,
        ticker: &mut Ticker,
        shutdown: &Shutdown,
        mut present: impl FnMut(&Image),
    ) {
        ticker.run(shutdown, || {
            present(self.tick());
            ControlFlow::Continue(())
        });
    }
}

fn compose(canvas: &mut Image, ctx: &Context, display: &DisplayOptions, frame: Option<&Image>) {
    let res = canvas.resolution();
    match frame {
        Some(frame) if display.show_video => *canvas = frame.resized(res),
        _ => canvas.clear(if display.show_video {
            Color::NONE
        } else {
            Color::BLACK
        }),
    }

    scene::render(&ctx.scene, &ctx.camera, canvas);

    if display.draw_landmarks {
        if let Some((hand, frame_res)) = &ctx.hand {
            let scale = [
                res.width() as f32 / frame_res.width() as f32,
                res.height() as f32 / frame_res.height() as f32,
            ];
            hand.draw(canvas, scale);
        }
    }

    draw::text(canvas, TEXT_MARGIN, TEXT_MARGIN, ctx.status.message)
        .align_top()
        .align_left();

    let alerts = &ctx.status.alerts;
    if !alerts.is_empty() {
        // One banner line per alert, stacked along the bottom edge.
        let height = ALERT_BANNER_HEIGHT * alerts.len() as f32;
        let top = res.height() as f32 - height;
        draw::rect(
            canvas,
            Rect::from_top_left(0.0, top, res.width() as f32, height),
        )
        .color(Color::RED)
        .filled();
        for (i, alert) in alerts.iter().enumerate() {
            let center = top + (i as f32 + 0.5) * ALERT_BANNER_HEIGHT;
            draw::text(canvas, TEXT_MARGIN, center as i32, alert).align_left();
        }
    }
}
