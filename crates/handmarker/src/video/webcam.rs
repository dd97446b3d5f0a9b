//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported.
//!
//! [`Webcam`] is a blocking frame reader. [`WebcamStream`] runs a [`Webcam`] on a background thread
//! and keeps the most recent frame around, which is what the render loop consumes.

use std::{
    cmp::Reverse,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::bail;
use handmarker_image::{Image, Resolution};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{
    config::VideoConfig,
    timer::{FpsCounter, Timer},
};

use super::{FacingMatch, FacingMode, VideoError, VideoSource};

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Device selection and format negotiation options.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    facing: FacingMode,
    exact_facing: bool,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Builds the options described by the `[video]` configuration section.
    pub fn from_config(config: &VideoConfig) -> Self {
        let mut options = Self::default()
            .facing(config.facing, config.exact_facing)
            .resolution(config.resolution())
            .fps(config.fps);
        if let Some(name) = &config.device {
            options = options.name(name.clone());
        }
        options
    }

    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the preferred camera orientation.
    ///
    /// With `exact` set to `false`, matching cameras are merely tried first. With `exact` set to
    /// `true`, cameras that aren't known to face the requested way are not opened at all.
    #[inline]
    pub fn facing(mut self, facing: FacingMode, exact: bool) -> Self {
        self.facing = facing;
        self.exact_facing = exact;
        self
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }

    /// Returns whether a device with the V4L2 card name `card` may be opened, and with which
    /// priority (higher is tried first).
    fn rank(&self, card: &str) -> Option<FacingMatch> {
        if let Some(name) = &self.name {
            if card != name {
                return None;
            }
        }

        let matched = self.facing.classify(card);
        if self.exact_facing && matched != FacingMatch::Matches {
            return None;
        }
        Some(matched)
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(device: &Device, mut prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    loop {
        if let Some(fmt) = negotiate_format_step(&formats, prefs) {
            return Ok((
                PixFormat::new(
                    fmt.resolution.width(),
                    fmt.resolution.height(),
                    pixel_format,
                ),
                fmt.frame_interval,
            ));
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        let relaxed = match prefs.pref {
            ParamPreference::Resolution => {
                prefs.fps.take().is_some() || prefs.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                prefs.resolution.take().is_some() || prefs.fps.take().is_some()
            }
        };
        if !relaxed {
            break;
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }

    bail!("failed to negotiate a webcam format")
}

fn negotiate_format_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut formats = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| {
                (1.0 / fmt.frame_interval.as_f32()).round() >= fps as f32
            })
        })
        .copied()
        .collect::<Vec<_>>();

    // With a requested resolution, the smallest eligible one is the closest match. Without one,
    // take the largest.
    let pixels = |fmt: &FrameFormat| {
        let n = fmt.resolution.num_pixels() as i64;
        if prefs.resolution.is_some() {
            -n
        } else {
            n
        }
    };
    match prefs.pref {
        ParamPreference::Resolution => {
            formats.sort_by_key(|fmt| (pixels(fmt), Reverse(fmt.frame_interval)))
        }
        ParamPreference::Framerate => {
            formats.sort_by_key(|fmt| (Reverse(fmt.frame_interval), pixels(fmt)))
        }
    }
    formats.last().copied()
}

fn is_permission_denied(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<io::Error>()
        .map_or(false, |e| e.kind() == io::ErrorKind::PermissionDenied)
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the best matching webcam.
    ///
    /// Devices are ranked by how well their name matches the requested [`FacingMode`]; devices with
    /// equal rank are tried in enumeration order.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: &WebcamOptions) -> Result<Self, VideoError> {
        let mut permission_denied = false;
        let mut candidates = Vec::new();
        for res in linuxvideo::list()? {
            let dev = match res {
                Ok(dev) => dev,
                Err(e) => {
                    if e.kind() == io::ErrorKind::PermissionDenied {
                        permission_denied = true;
                    }
                    log::warn!("{}", e);
                    continue;
                }
            };

            let caps = match dev.capabilities() {
                Ok(caps) => caps,
                Err(e) => {
                    log::debug!("{}", e);
                    continue;
                }
            };
            let card = caps.card().to_string();
            if !caps
                .device_capabilities()
                .contains(CapabilityFlags::VIDEO_CAPTURE)
            {
                log::trace!("skipping '{card}': not a capture device");
                continue;
            }
            match options.rank(&card) {
                Some(rank) => candidates.push((rank, card, dev)),
                None => log::debug!("skipping '{card}': does not match {options:?}"),
            }
        }

        // Stable sort, so enumeration order breaks ties.
        candidates.sort_by_key(|(rank, ..)| Reverse(*rank));

        for (_, card, dev) in candidates {
            match Self::open_device(dev, &card, options.frame) {
                Ok(webcam) => return Ok(webcam),
                Err(e) => {
                    if is_permission_denied(&e) {
                        permission_denied = true;
                    }
                    log::debug!("failed to open '{card}': {e}");
                }
            }
        }

        if permission_denied {
            Err(VideoError::PermissionDenied)
        } else {
            Err(VideoError::NoCamera)
        }
    }

    fn open_device(dev: Device, card: &str, prefs: FramePrefs) -> anyhow::Result<Self> {
        let path = dev.path()?;
        let (pixfmt, fract) = negotiate_format(&dev, prefs)?;

        let capture = dev.video_capture(pixfmt)?;

        let format = capture.format();
        let width = format.width();
        let height = format.height();

        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {}x{} @ {:.1}Hz",
            card,
            path.display(),
            width,
            height,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;

        Ok(Self {
            stream,
            width,
            height,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        })
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let image = match self.t_decode.time(|| Image::decode_jpeg(&buf)) {
                    Ok(image) => image,
                    Err(e) => {
                        // Even good webcams occasionally hand out corrupted MJPG frames. A blank
                        // frame keeps the stream's cadence intact.
                        log::error!("webcam decode error: {}", e);
                        Image::new(self.width, self.height)
                    }
                };
                Ok(image)
            })
            .map_err(Into::into)
    }

    /// Returns profiling timers for webcam access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

/// How long dropping a [`WebcamStream`] waits for the capture thread.
const STOP_TIMEOUT: Duration = Duration::from_secs(1);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Shared {
    latest: Mutex<Option<Arc<Image>>>,
    stop: AtomicBool,
}

/// A [`Webcam`] running on a background thread.
///
/// The capture thread publishes every decoded frame, replacing the previous one. Readers only ever
/// see the latest frame. Dropping the stream stops the thread and releases the device.
pub struct WebcamStream {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl WebcamStream {
    /// Opens a webcam matching `options` and starts capturing frames.
    ///
    /// Returns once the device has been opened (or failed to open). The stream becomes ready when
    /// the first frame has been decoded.
    pub fn request(options: WebcamOptions) -> Result<Self, VideoError> {
        let shared = Arc::new(Shared::default());
        let (opened_tx, opened_rx) = mpsc::sync_channel(1);

        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("webcam".into())
            .spawn(move || {
                let mut webcam = match Webcam::open(&options) {
                    Ok(webcam) => {
                        opened_tx.send(Ok(())).ok();
                        webcam
                    }
                    Err(e) => {
                        opened_tx.send(Err(e)).ok();
                        return;
                    }
                };
                capture(&mut webcam, &thread_shared);
            })?;

        let opened = opened_rx.recv().unwrap_or_else(|_| {
            Err(VideoError::Io(io::Error::new(
                io::ErrorKind::Other,
                "webcam thread exited unexpectedly",
            )))
        });
        let stream = Self {
            shared,
            thread: Some(thread),
        };
        // On error, `stream` is dropped here, which joins the (already finished) thread.
        opened.map(|()| stream)
    }
}

fn capture(webcam: &mut Webcam, shared: &Shared) {
    let mut fps = FpsCounter::new("webcam");
    while !shared.stop.load(Ordering::Relaxed) {
        match webcam.read() {
            Ok(image) => {
                *shared.latest.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::new(image));
            }
            Err(e) => {
                log::error!("webcam capture failed: {e}");
                return;
            }
        }
        fps.tick_with(webcam.timers());
    }
    log::debug!("webcam capture stopped");
}

impl VideoSource for WebcamStream {
    fn is_ready(&self) -> bool {
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn current_frame(&self) -> Option<Arc<Image>> {
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for WebcamStream {
    /// Stops the capture thread and waits up to [`STOP_TIMEOUT`] for it to exit.
    ///
    /// The thread checks the stop flag between frames, so a camera that stops delivering frames
    /// keeps it blocked. In that case the thread is detached instead of hanging the caller.
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        let Some(thread) = self.thread.take() else {
            return;
        };

        let deadline = Instant::now() + STOP_TIMEOUT;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("webcam thread did not stop within {STOP_TIMEOUT:?}, detaching it");
                return;
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }
        if thread.join().is_err() {
            log::error!("webcam thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    #[test]
    fn negotiate_closest_resolution() {
        let formats = [
            fmt(320, 240, 30),
            fmt(640, 480, 30),
            fmt(640, 480, 60),
            fmt(1280, 720, 30),
            fmt(1920, 1080, 15),
        ];
        let prefs = FramePrefs {
            resolution: Some(Resolution::RES_VGA),
            fps: Some(30),
            pref: ParamPreference::Resolution,
        };
        let chosen = negotiate_format_step(&formats, prefs).unwrap();
        assert_eq!(chosen.resolution, Resolution::RES_VGA);
        assert_eq!(chosen.frame_interval.as_f32(), 1.0 / 60.0);

        let prefs = FramePrefs {
            resolution: None,
            fps: Some(30),
            pref: ParamPreference::Resolution,
        };
        let chosen = negotiate_format_step(&formats, prefs).unwrap();
        assert_eq!(chosen.resolution, Resolution::RES_720P);

        let prefs = FramePrefs {
            resolution: Some(Resolution::new(3840, 2160)),
            fps: None,
            pref: ParamPreference::Resolution,
        };
        assert!(negotiate_format_step(&formats, prefs).is_none());
    }

    #[test]
    fn drop_detaches_stuck_thread() {
        let shared = Arc::new(Shared::default());
        let thread = thread::spawn(|| thread::sleep(STOP_TIMEOUT * 10));
        let stream = WebcamStream {
            shared: shared.clone(),
            thread: Some(thread),
        };

        let start = Instant::now();
        drop(stream);
        assert!(start.elapsed() < STOP_TIMEOUT * 5);
        assert!(shared.stop.load(Ordering::Relaxed));
    }

    #[test]
    fn drop_joins_stopping_thread() {
        let shared = Arc::new(Shared::default());
        let thread_shared = shared.clone();
        let thread = thread::spawn(move || {
            while !thread_shared.stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(1));
            }
        });
        let stream = WebcamStream {
            shared,
            thread: Some(thread),
        };

        let start = Instant::now();
        drop(stream);
        assert!(start.elapsed() < STOP_TIMEOUT);
    }

    #[test]
    fn rank_devices() {
        let options = WebcamOptions::default();
        assert_eq!(options.rank("Rear Camera"), Some(FacingMatch::Matches));
        assert_eq!(options.rank("Integrated Camera"), Some(FacingMatch::Opposite));

        let exact = WebcamOptions::default().facing(FacingMode::User, true);
        assert_eq!(exact.rank("Integrated Camera"), Some(FacingMatch::Matches));
        assert_eq!(exact.rank("USB Camera"), None);

        let named = WebcamOptions::default().name("USB Camera");
        assert_eq!(named.rank("USB Camera"), Some(FacingMatch::Unknown));
        assert_eq!(named.rank("Rear Camera"), None);
    }
}
