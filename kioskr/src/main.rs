//! Starts the photo booth on a fresh desktop session: prepare the display, start the
//! web app, wait until it answers, then become the kiosk browser.

mod display;
mod launcher;

use anyhow::Context;
use config::{locate_config, read_config};
use env_logger::{Builder, Env, Target};
use launcher::ReadinessPolicy;
use log::{error, info, warn};
use std::env;
use std::thread;

fn main() {
    log_panics::init();
    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .init();

    if let Err(e) = run() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config_arg = env::args().nth(1);
    let config_file_path = locate_config(config_arg.as_deref())?;
    let config = read_config(&config_file_path)
        .with_context(|| format!("Could not load '{}'", config_file_path.display()))?;
    info!("Config file loaded from: \"{}\"", config_file_path.display());

    let settings = config.kiosk_settings()?;
    let display = env::var("DISPLAY").unwrap_or_else(|_| settings.display.clone());

    info!(
        "Waiting {}s for the display server on {display}",
        settings.display_wait.as_secs()
    );
    thread::sleep(settings.display_wait);

    display::prepare_display(&settings, &display);

    let mut app = launcher::start_app(&settings, &display).context("Could not start the web app")?;

    let policy = ReadinessPolicy::from(&settings);
    let ready = launcher::wait_ready(&settings.url, &policy, || {
        app.try_wait().ok().flatten()
    });

    if let Err(e) = ready {
        if let Err(kill_error) = app.kill() {
            warn!("Could not stop the web app: {kill_error}");
        }
        let _ = app.wait();
        return Err(e).context("Not opening the browser");
    }

    // the web app keeps running after this process is replaced
    let e = launcher::exec_browser(&settings, &display);
    Err(e).with_context(|| format!("Could not start '{}'", settings.browser))
}
