use config::KioskSettings;
use curl::easy::Easy;
use log::{debug, info};
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub(crate) enum ReadinessError {
    #[error("web app exited with {0} before answering")]
    AppExited(ExitStatus),
    #[error("web app did not answer on {url} after {attempts} attempts")]
    NotReady { url: Url, attempts: u32 },
}

/// How long and how often to poll the web app
pub(crate) struct ReadinessPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&KioskSettings> for ReadinessPolicy {
    fn from(settings: &KioskSettings) -> Self {
        ReadinessPolicy {
            attempts: settings.ready_attempts,
            interval: settings.ready_interval,
            timeout: settings.ready_timeout,
        }
    }
}

pub(crate) fn app_command(settings: &KioskSettings, display: &str) -> io::Result<Command> {
    let (program, args) = settings
        .app_command
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty app_command"))?;

    let mut command = Command::new(program);
    command.args(args).env("DISPLAY", display).stdin(Stdio::null());
    if let Some(dir) = &settings.app_dir {
        command.current_dir(dir);
    }
    Ok(command)
}

pub(crate) fn start_app(settings: &KioskSettings, display: &str) -> io::Result<Child> {
    let child = app_command(settings, display)?.spawn()?;
    info!(
        "Started web app '{}' (pid {})",
        settings.app_command.join(" "),
        child.id()
    );
    Ok(child)
}

/// HTTP status of a GET on `url`. Any status, even an error page, means something
/// is listening.
pub(crate) fn http_status(url: &Url, timeout: Duration) -> Result<u32, curl::Error> {
    let mut easy = Easy::new();
    easy.url(url.as_str())?;
    easy.connect_timeout(timeout)?;
    easy.timeout(timeout)?;
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| Ok(data.len()))?;
        transfer.perform()?;
    }
    easy.response_code()
}

/// Poll `url` until it answers with a non server-error status. `exited` reports whether
/// the web app process has died, which ends the wait early.
pub(crate) fn wait_ready<F>(
    url: &Url,
    policy: &ReadinessPolicy,
    mut exited: F,
) -> Result<u32, ReadinessError>
where
    F: FnMut() -> Option<ExitStatus>,
{
    for attempt in 1..=policy.attempts {
        if let Some(status) = exited() {
            return Err(ReadinessError::AppExited(status));
        }

        match http_status(url, policy.timeout) {
            Ok(code) if (100..500).contains(&code) => {
                info!("Web app answered {code} on {url} after {attempt} attempt(s)");
                return Ok(attempt);
            }
            Ok(code) => debug!("Attempt {attempt}: {url} answered {code}"),
            Err(e) => debug!("Attempt {attempt}: {url} not ready: {e}"),
        }

        if attempt < policy.attempts {
            thread::sleep(policy.interval);
        }
    }

    Err(ReadinessError::NotReady {
        url: url.clone(),
        attempts: policy.attempts,
    })
}

pub(crate) fn browser_command(settings: &KioskSettings, display: &str) -> Command {
    let mut command = Command::new(&settings.browser);
    command
        .args(&settings.browser_args)
        .arg(settings.url.as_str())
        .env("DISPLAY", display);
    command
}

/// Replace this process with the kiosk browser. Only returns if that failed.
pub(crate) fn exec_browser(settings: &KioskSettings, display: &str) -> io::Error {
    info!("Handing over to {} on {}", settings.browser, settings.url);
    browser_command(settings, display).exec()
}
