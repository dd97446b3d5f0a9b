//! A minimal GUI that displays images in native windows.
//!
//! [`run`] takes over the main thread to run the windowing event loop and runs the application on
//! a background thread. The application then calls [`show_image`] to present its frames. Closing a
//! window requests shutdown via the [`Shutdown`] flag handed to the application.

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::{Mutex, OnceLock},
};

use handmarker_image::{Image, Resolution};
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowId,
};

use crate::schedule::Shutdown;

use self::renderer::{Gpu, Renderer, Window};

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
    shutdown: Shutdown,
}

impl Gui {
    fn new(gpu: Gpu, shutdown: Shutdown) -> Self {
        Self {
            gpu: Rc::new(gpu),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
            shutdown,
        }
    }

    fn renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }

    fn show(&mut self, target: &winit::event_loop::EventLoopWindowTarget<Msg>, msg: Msg) {
        let Msg::Image { key, res, data } = msg;
        if self.shutdown.is_requested() {
            // Don't reopen windows the user just closed.
            return;
        }

        if !self.windows.contains_key(&key) {
            log::debug!("creating window for image '{key}' at {res}");

            let renderer = Window::open(target, &key, res)
                .and_then(|win| Renderer::new(win, self.gpu.clone()));
            match renderer {
                Ok(renderer) => {
                    self.win_id_to_key.insert(renderer.window().id(), key.clone());
                    self.windows.insert(key.clone(), renderer);
                }
                Err(e) => {
                    log::error!("failed to open window '{key}': {e:#}");
                    self.shutdown.request();
                    return;
                }
            }
        }

        if let Some(renderer) = self.windows.get_mut(&key) {
            renderer.update_texture(res, &data);
            renderer.window().request_redraw();
        }
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(msg) => self.show(target, msg),
                Event::WindowEvent {
                    window_id,
                    event: WindowEvent::CloseRequested,
                } => {
                    if let Some(key) = self.win_id_to_key.remove(&window_id) {
                        log::info!("window '{key}' closed, shutting down");
                        self.windows.remove(&key);
                    }
                    self.shutdown.request();
                }
                Event::RedrawRequested(window) => {
                    if let Some(renderer) = self.renderer_mut(window) {
                        if let Err(e) = renderer.redraw() {
                            log::error!("failed to redraw window: {e:#}");
                        }
                    }
                }
                _ => {}
            }
        });
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

static DISPLAY: OnceLock<Mutex<EventLoopProxy<Msg>>> = OnceLock::new();

fn send(msg: Msg) {
    let Some(proxy) = DISPLAY.get() else {
        log::warn!("GUI not running, dropping message");
        return;
    };
    let proxy = match proxy.lock() {
        Ok(proxy) => proxy,
        Err(poisoned) => poisoned.into_inner(),
    };
    if proxy.send_event(msg).is_err() {
        log::debug!("event loop closed, dropping message");
    }
}

/// Runs the GUI event loop on the calling thread and `app` on a new thread.
///
/// The process exits when `app` returns: with status 0 if it returned `Ok`, 1 if it returned an
/// error, and 101 if it panicked. `app` receives a [`Shutdown`] flag that is raised when the user
/// closes a window.
///
/// Must be called from the main thread.
pub fn run<F>(app: F) -> !
where
    F: FnOnce(Shutdown) -> anyhow::Result<()> + Send + 'static,
{
    let event_loop = EventLoopBuilder::<Msg>::with_user_event().build();
    if DISPLAY
        .set(Mutex::new(event_loop.create_proxy()))
        .is_err()
    {
        log::error!("GUI already initialized");
        process::exit(1);
    }

    let gpu = match pollster::block_on(Gpu::open()) {
        Ok(gpu) => gpu,
        Err(e) => {
            log::error!("failed to open GPU: {e:#}");
            process::exit(1);
        }
    };

    let shutdown = Shutdown::new();
    let app_shutdown = shutdown.clone();
    std::thread::Builder::new()
        .name("app".into())
        .spawn(move || {
            match catch_unwind(AssertUnwindSafe(move || app(app_shutdown))) {
                Ok(Ok(())) => process::exit(0),
                Ok(Err(e)) => {
                    log::error!("{e:#}");
                    process::exit(1);
                }
                // The panic hook has printed the message already. Exit with 101 like libstd does.
                Err(_payload) => process::exit(101),
            }
        })
        .unwrap_or_else(|e| {
            log::error!("failed to spawn application thread: {e}");
            process::exit(1);
        });

    Gui::new(gpu, shutdown).run(event_loop);
}

/// Displays an image in the window titled `key`, opening the window if needed.
///
/// Does nothing if [`run`] has not been called or the event loop has exited.
pub fn show_image(key: impl Into<String>, image: &Image) {
    // Image data is RGBA8 internally so that no conversion before GPU upload is needed.
    send(Msg::Image {
        key: key.into(),
        res: image.resolution(),
        data: image.data().to_vec(),
    });
}
