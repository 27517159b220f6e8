use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, io};

use data_model::{NetworkProfiles, ProfileError};
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const CONFIG_FILE_NAME: &str = "boothr.toml";

/// Where an installed device keeps its config when none is found above the working directory
pub const SYSTEM_CONFIG_PATH: &str = "/etc/boothr/boothr.toml";

pub const DEFAULT_INTERFACE: &str = "wlan0";
pub const DEFAULT_PERIOD_SECONDS: u64 = 30;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_PROBE_COUNT: u32 = 1;
pub const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 4;
pub const DEFAULT_REASSOCIATE_WAIT_SECONDS: u64 = 10;
pub const DEFAULT_SCAN_WAIT_SECONDS: u64 = 5;
pub const DEFAULT_GRACE_SECONDS: u64 = 15;
/// Well-known public resolvers, answering ICMP echo
pub const DEFAULT_TARGETS: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
    IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
];

pub const DEFAULT_DISPLAY: &str = ":0";
pub const DEFAULT_DISPLAY_WAIT_SECONDS: u64 = 10;
pub const DEFAULT_APP_URL: &str = "http://localhost:5000/";
pub const DEFAULT_READY_ATTEMPTS: u32 = 30;
pub const DEFAULT_READY_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_BROWSER: &str = "chromium-browser";
pub const DEFAULT_BROWSER_ARGS: [&str; 7] = [
    "--kiosk",
    "--noerrdialogs",
    "--disable-infobars",
    "--incognito",
    "--disable-pinch",
    "--overscroll-history-navigation=0",
    "--check-for-update-interval=31536000",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("boothr.toml config file not found")]
    NotFound,
    #[error("could not read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse toml config file")]
    Parse(#[from] toml::de::Error),
    #[error("invalid [{section}] setting: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
    #[error("config has no [{0}] section")]
    Missing(&'static str),
    #[error("invalid network profiles")]
    Profiles(#[from] ProfileError),
}

fn invalid(section: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section,
        reason: reason.into(),
    }
}

/// How the OS network manager is driven
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Default, Clone, Copy)]
pub enum Backend {
    /// wpa_supplicant through `wpa_cli`
    #[default]
    WpaCli,
    /// NetworkManager through `nmcli`
    NetworkManager,
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::WpaCli => write!(f, "wpa_cli"),
            Backend::NetworkManager => write!(f, "nmcli"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Default, Clone, Copy)]
pub enum Rotation {
    #[default]
    Normal,
    Left,
    Right,
    Inverted,
}

impl Rotation {
    /// Argument for `xrandr --rotate`
    pub fn xrandr_name(&self) -> &'static str {
        match self {
            Rotation::Normal => "normal",
            Rotation::Left => "left",
            Rotation::Right => "right",
            Rotation::Inverted => "inverted",
        }
    }
}

impl Display for Rotation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.xrandr_name())
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct MonitorSpec {
    pub interface: Option<String>,
    pub backend: Option<Backend>,
    pub period_seconds: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub probe_count: Option<u32>,
    pub probe_timeout_seconds: Option<u64>,
    pub targets: Option<Vec<IpAddr>>,
    pub reassociate_wait_seconds: Option<u64>,
    pub scan_wait_seconds: Option<u64>,
    pub grace_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct KioskSpec {
    pub display: Option<String>,
    pub display_wait_seconds: Option<u64>,
    /// xrandr output to rotate, e.g. "HDMI-1". No rotation is applied without it.
    pub output: Option<String>,
    pub rotation: Option<Rotation>,
    /// xinput name of a touch screen to align with the rotation
    pub touch_device: Option<String>,
    pub hide_cursor: Option<bool>,
    pub app_command: Option<Vec<String>>,
    pub app_dir: Option<PathBuf>,
    pub url: Option<String>,
    pub ready_attempts: Option<u32>,
    pub ready_interval_ms: Option<u64>,
    pub ready_timeout_ms: Option<u64>,
    pub browser: Option<String>,
    pub browser_args: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct ProvisioningSpec {
    /// ISO 3166 alpha-2 regulatory domain written to wpa_supplicant.conf
    pub country: Option<String>,
}

#[derive(Default, Serialize, Deserialize, Debug)]
pub struct Config {
    pub monitor: Option<MonitorSpec>,
    pub networks: Option<NetworkProfiles>,
    pub kiosk: Option<KioskSpec>,
    pub provisioning: Option<ProvisioningSpec>,
}

/// Fully resolved monitor settings, every default applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interface: String,
    pub backend: Backend,
    pub period: Duration,
    pub failure_threshold: u32,
    pub probe_count: u32,
    pub probe_timeout: Duration,
    pub targets: Vec<IpAddr>,
    pub reassociate_wait: Duration,
    /// Time given to a rescan before its results are read
    pub scan_wait: Duration,
    /// Time given to a reconnection before probing resumes
    pub grace: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            interface: DEFAULT_INTERFACE.to_owned(),
            backend: Backend::default(),
            period: Duration::from_secs(DEFAULT_PERIOD_SECONDS),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            probe_count: DEFAULT_PROBE_COUNT,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECONDS),
            targets: DEFAULT_TARGETS.to_vec(),
            reassociate_wait: Duration::from_secs(DEFAULT_REASSOCIATE_WAIT_SECONDS),
            scan_wait: Duration::from_secs(DEFAULT_SCAN_WAIT_SECONDS),
            grace: Duration::from_secs(DEFAULT_GRACE_SECONDS),
        }
    }
}

impl TryFrom<&MonitorSpec> for MonitorSettings {
    type Error = ConfigError;

    fn try_from(spec: &MonitorSpec) -> Result<Self, Self::Error> {
        let defaults = MonitorSettings::default();

        let settings = MonitorSettings {
            interface: spec.interface.clone().unwrap_or(defaults.interface),
            backend: spec.backend.unwrap_or(defaults.backend),
            period: spec
                .period_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.period),
            failure_threshold: spec.failure_threshold.unwrap_or(defaults.failure_threshold),
            probe_count: spec.probe_count.unwrap_or(defaults.probe_count),
            probe_timeout: spec
                .probe_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
            targets: spec.targets.clone().unwrap_or(defaults.targets),
            reassociate_wait: spec
                .reassociate_wait_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.reassociate_wait),
            scan_wait: spec
                .scan_wait_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.scan_wait),
            grace: spec
                .grace_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.grace),
        };

        if settings.interface.is_empty() {
            return Err(invalid("monitor", "interface must not be empty"));
        }
        if settings.period.is_zero() {
            return Err(invalid("monitor", "period_seconds must be at least 1"));
        }
        if settings.failure_threshold == 0 {
            return Err(invalid("monitor", "failure_threshold must be at least 1"));
        }
        if settings.probe_count == 0 {
            return Err(invalid("monitor", "probe_count must be at least 1"));
        }
        if settings.probe_timeout.is_zero() {
            return Err(invalid("monitor", "probe_timeout_seconds must be at least 1"));
        }
        if settings.targets.is_empty() {
            return Err(invalid("monitor", "at least one probe target is needed"));
        }

        Ok(settings)
    }
}

impl Display for MonitorSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let targets: Vec<String> = self.targets.iter().map(|t| t.to_string()).collect();
        write!(
            f,
            "interface {} via {}, probing [{}] every {}s (count {}, timeout {}s), \
             reconnecting after {} consecutive failures",
            self.interface,
            self.backend,
            targets.join(", "),
            self.period.as_secs(),
            self.probe_count,
            self.probe_timeout.as_secs(),
            self.failure_threshold
        )
    }
}

/// Fully resolved kiosk launcher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KioskSettings {
    pub display: String,
    pub display_wait: Duration,
    pub output: Option<String>,
    pub rotation: Rotation,
    pub touch_device: Option<String>,
    pub hide_cursor: bool,
    pub app_command: Vec<String>,
    pub app_dir: Option<PathBuf>,
    pub url: Url,
    pub ready_attempts: u32,
    pub ready_interval: Duration,
    pub ready_timeout: Duration,
    pub browser: String,
    pub browser_args: Vec<String>,
}

impl TryFrom<&KioskSpec> for KioskSettings {
    type Error = ConfigError;

    fn try_from(spec: &KioskSpec) -> Result<Self, Self::Error> {
        let url_string = spec.url.as_deref().unwrap_or(DEFAULT_APP_URL);
        let url = Url::parse(url_string)
            .map_err(|e| invalid("kiosk", format!("url '{url_string}': {e}")))?;

        let app_command = spec
            .app_command
            .clone()
            .unwrap_or_else(|| vec!["python3".to_owned(), "app.py".to_owned()]);
        if app_command.first().map_or(true, |program| program.is_empty()) {
            return Err(invalid("kiosk", "app_command must name a program"));
        }

        let ready_attempts = spec.ready_attempts.unwrap_or(DEFAULT_READY_ATTEMPTS);
        if ready_attempts == 0 {
            return Err(invalid("kiosk", "ready_attempts must be at least 1"));
        }

        // curl treats a zero timeout as no timeout at all
        let ready_timeout_ms = spec.ready_timeout_ms.unwrap_or(DEFAULT_READY_TIMEOUT_MS);
        if ready_timeout_ms == 0 {
            return Err(invalid("kiosk", "ready_timeout_ms must be at least 1"));
        }

        let browser = spec
            .browser
            .clone()
            .unwrap_or_else(|| DEFAULT_BROWSER.to_owned());
        if browser.is_empty() {
            return Err(invalid("kiosk", "browser must not be empty"));
        }

        Ok(KioskSettings {
            display: spec
                .display
                .clone()
                .unwrap_or_else(|| DEFAULT_DISPLAY.to_owned()),
            display_wait: Duration::from_secs(
                spec.display_wait_seconds.unwrap_or(DEFAULT_DISPLAY_WAIT_SECONDS),
            ),
            output: spec.output.clone(),
            rotation: spec.rotation.unwrap_or_default(),
            touch_device: spec.touch_device.clone(),
            hide_cursor: spec.hide_cursor.unwrap_or(true),
            app_command,
            app_dir: spec.app_dir.clone(),
            url,
            ready_attempts,
            ready_interval: Duration::from_millis(
                spec.ready_interval_ms.unwrap_or(DEFAULT_READY_INTERVAL_MS),
            ),
            ready_timeout: Duration::from_millis(ready_timeout_ms),
            browser,
            browser_args: spec.browser_args.clone().unwrap_or_else(|| {
                DEFAULT_BROWSER_ARGS.iter().map(|a| a.to_string()).collect()
            }),
        })
    }
}

impl Config {
    /// Monitor settings, using defaults for a missing [monitor] section
    pub fn monitor_settings(&self) -> Result<MonitorSettings, ConfigError> {
        match &self.monitor {
            Some(spec) => MonitorSettings::try_from(spec),
            None => Ok(MonitorSettings::default()),
        }
    }

    /// Kiosk settings, using defaults for a missing [kiosk] section
    pub fn kiosk_settings(&self) -> Result<KioskSettings, ConfigError> {
        match &self.kiosk {
            Some(spec) => KioskSettings::try_from(spec),
            None => KioskSettings::try_from(&KioskSpec::default()),
        }
    }

    /// Regulatory domain for provisioning, if configured
    pub fn country(&self) -> Result<Option<&str>, ConfigError> {
        let country = self
            .provisioning
            .as_ref()
            .and_then(|spec| spec.country.as_deref());

        if let Some(code) = country {
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) {
                let reason = format!("country '{code}' is not a two letter code");
                return Err(invalid("provisioning", reason));
            }
        }

        Ok(country)
    }

    /// The [networks] profiles, validated
    pub fn network_profiles(&self) -> Result<&NetworkProfiles, ConfigError> {
        let profiles = self.networks.as_ref().ok_or(ConfigError::Missing("networks"))?;
        profiles.validate()?;
        Ok(profiles)
    }
}

pub fn find_config_file(file_name: &str) -> Result<PathBuf, ConfigError> {
    let mut dir = env::current_dir().ok();

    // Loop until no parent director exists. (i.e. stop at "/")
    while let Some(directory) = dir {
        let config_path = directory.join(file_name);

        if config_path.exists() {
            return Ok(config_path);
        }

        dir = directory.parent().map(|p| p.to_path_buf());
    }

    let system_path = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system_path.exists() {
        return Ok(system_path);
    }

    Err(ConfigError::NotFound)
}

/// Use the path given on the command line, or search for the default config file
pub fn locate_config(explicit: Option<&str>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(PathBuf::from(path)),
        None => find_config_file(CONFIG_FILE_NAME),
    }
}

pub fn parse_config(config_string: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(config_string)?;

    // Surface bad values at load time rather than when a section is first used
    config.monitor_settings()?;
    config.kiosk_settings()?;
    config.country()?;

    Ok(config)
}

pub fn read_config(config_file_path: &Path) -> Result<Config, ConfigError> {
    let config_string =
        std::fs::read_to_string(config_file_path).map_err(|source| ConfigError::Read {
            path: config_file_path.to_path_buf(),
            source,
        })?;

    parse_config(&config_string)
}
