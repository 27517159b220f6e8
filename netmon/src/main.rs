mod monitor;
mod network;
mod probe;

use anyhow::Context;
use config::{locate_config, read_config, Backend, ConfigError};
use env_logger::{Builder, Env, Target};
use log::{error, info};
use monitor::Monitor;
use network::{NmCli, WpaCli};
use probe::PingProber;
use std::env;
use std::sync::mpsc::channel;

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

    let settings = config.monitor_settings()?;
    info!("Monitor: {settings}");

    let profiles = match config.network_profiles() {
        Ok(profiles) => {
            for (role, profile) in profiles.by_priority() {
                info!("{role} network: {profile}");
            }
            Some(profiles.clone())
        }
        Err(ConfigError::Missing(_)) => {
            info!("No [networks] configured, scan results will not be matched to profiles");
            None
        }
        Err(e) => {
            // The OS still picks networks by whatever priorities were provisioned
            error!("{:#}", anyhow::Error::from(e));
            config.networks.clone()
        }
    };

    let (tx, rx) = channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Error setting termination signal handler")?;

    let prober = PingProber::new(&settings);
    match settings.backend {
        Backend::WpaCli => {
            let network = WpaCli::new(&settings.interface);
            Monitor::new(settings, profiles, prober, network, rx).run()
        }
        Backend::NetworkManager => {
            let network = NmCli::new(&settings.interface);
            Monitor::new(settings, profiles, prober, network, rx).run()
        }
    }

    Ok(())
}
