mod nm;
mod wpa;

use anyhow::{bail, Context};
use config::{locate_config, read_config, Config};
use env_logger::{Builder, Env};
use log::{error, info};
use std::env;
use std::path::Path;
use std::process::exit;

fn main() {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("check") if args.len() <= 2 => check(args.get(1)),
        Some("wpa") if (2..=3).contains(&args.len()) => wpa(&args[1], args.get(2)),
        Some("nm") if args.len() <= 2 => nm(args.get(1)),
        _ => {
            print_help();
            exit(2);
        }
    };

    if let Err(e) = result {
        error!("{e:#}");
        exit(1);
    }
}

fn load(config_arg: Option<&String>) -> anyhow::Result<Config> {
    let config_file_path = locate_config(config_arg.map(String::as_str))?;
    let config = read_config(&config_file_path)
        .with_context(|| format!("Could not load '{}'", config_file_path.display()))?;
    info!("Config file loaded from: \"{}\"", config_file_path.display());
    Ok(config)
}

fn check(config_arg: Option<&String>) -> anyhow::Result<()> {
    let config = load(config_arg)?;
    let profiles = config.network_profiles()?;
    for (role, profile) in profiles.by_priority() {
        println!("{role}: {profile}");
    }
    if let Some(country) = config.country()? {
        println!("country: {country}");
    }
    Ok(())
}

fn wpa(output: &str, config_arg: Option<&String>) -> anyhow::Result<()> {
    let config = load(config_arg)?;
    let contents = wpa::render(config.network_profiles()?, config.country()?);
    wpa::write(Path::new(output), &contents)
        .with_context(|| format!("Could not write '{output}'"))?;
    info!("Wrote '{output}'");
    Ok(())
}

fn nm(config_arg: Option<&String>) -> anyhow::Result<()> {
    let config = load(config_arg)?;
    let profiles = config.network_profiles()?;
    let interface = config.monitor_settings()?.interface;

    let mut failures = 0;
    for (role, profile) in profiles.by_priority() {
        if let Err(e) = nm::provision(profile, &interface) {
            error!("Could not provision the {role} network: {e}");
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} network(s) were not provisioned");
    }
    Ok(())
}

fn print_help() {
    println!(
        "Usage: {name} check [config_file]\n       \
         {name} wpa {{output_file}} [config_file]\n       \
         {name} nm [config_file]",
        name = env!("CARGO_PKG_NAME")
    );
}
