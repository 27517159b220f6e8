use config::MonitorSettings;
use data_model::ProbeResult;
use log::{debug, warn};
use std::net::IpAddr;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[cfg_attr(test, mockall::automock)]
pub(crate) trait Prober {
    /// Reachable if any target answered within its timeout
    fn probe(&self) -> ProbeResult;
}

/// Probes targets with the system `ping` utility, one target after the other
pub(crate) struct PingProber {
    targets: Vec<IpAddr>,
    count: u32,
    timeout: Duration,
}

impl PingProber {
    pub(crate) fn new(settings: &MonitorSettings) -> Self {
        PingProber {
            targets: settings.targets.clone(),
            count: settings.probe_count,
            timeout: settings.probe_timeout,
        }
    }

    fn ping(&self, target: &IpAddr) -> bool {
        let child = Command::new("ping")
            .args(ping_args(target, self.count, self.timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match child {
            Ok(child) => match wait_with_deadline(child, self.timeout) {
                Some(status) => status.success(),
                None => {
                    debug!("ping {target} killed after {:?}", self.timeout);
                    false
                }
            },
            Err(e) => {
                warn!("Could not execute 'ping': {e}");
                false
            }
        }
    }
}

impl Prober for PingProber {
    fn probe(&self) -> ProbeResult {
        for target in &self.targets {
            if self.ping(target) {
                debug!("{target} answered");
                return ProbeResult::Reachable;
            }
            debug!("{target} did not answer");
        }

        ProbeResult::Unreachable
    }
}

pub(crate) fn ping_args(target: &IpAddr, count: u32, timeout: Duration) -> Vec<String> {
    // ping only takes whole seconds
    let seconds = (timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)).max(1);

    let mut args = vec![];
    if target.is_ipv6() {
        args.push("-6".to_owned());
    }
    args.extend([
        "-n".to_owned(),
        "-q".to_owned(),
        "-c".to_owned(),
        count.to_string(),
        "-W".to_owned(),
        seconds.to_string(),
        "-w".to_owned(),
        seconds.to_string(),
        target.to_string(),
    ]);
    args
}

/// Wait for the child to exit, killing it once `deadline` has elapsed.
/// Returns `None` if it had to be killed.
pub(crate) fn wait_with_deadline(mut child: Child, deadline: Duration) -> Option<ExitStatus> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => {
                warn!("Could not wait for child process: {e}");
                break;
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= deadline {
            break;
        }
        thread::sleep(POLL_INTERVAL.min(deadline - elapsed));
    }

    let _ = child.kill();
    let _ = child.wait();
    None
}
