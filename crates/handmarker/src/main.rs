use std::{env, path::PathBuf, process};

use handmarker::{
    config::Config,
    detector::OnnxHandDetector,
    gui,
    render_loop::RenderLoop,
    schedule::{Shutdown, Ticker},
    video::webcam::{WebcamOptions, WebcamStream},
};

const WINDOW_TITLE: &str = "handmarker";

fn main() {
    handmarker::init_logger!();

    let config_path = env::args_os().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    gui::run(move |shutdown| app(config, shutdown));
}

fn app(config: Config, shutdown: Shutdown) -> anyhow::Result<()> {
    let mut render_loop = RenderLoop::<WebcamStream, OnnxHandDetector>::from_config(&config);

    match WebcamStream::request(WebcamOptions::from_config(&config.video)) {
        Ok(stream) => render_loop = render_loop.with_video(stream),
        Err(e) => {
            log::error!("{e}");
            render_loop.add_alert(format!("Unable to access the camera: {e}"));
        }
    }

    match OnnxHandDetector::load(&config.detector) {
        Ok(detector) => render_loop = render_loop.with_detector(detector),
        Err(e) => {
            log::error!("{e}");
            render_loop.add_alert(format!("Failed to load the hand landmark model: {e}"));
        }
    }

    let mut ticker = Ticker::from_hz(config.display.refresh_hz);
    render_loop.run(&mut ticker, &shutdown, |image| {
        gui::show_image(WINDOW_TITLE, image)
    });

    log::info!("shutting down");
    Ok(())
}
