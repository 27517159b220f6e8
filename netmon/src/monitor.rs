use crate::network::NetworkControl;
use crate::probe::Prober;
use config::MonitorSettings;
use data_model::{ConnectivityState, MonitorState, NetworkProfiles, ProbeResult, VisibleNetwork};
use log::{debug, info, warn};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, SystemTime};

pub(crate) struct Monitor<P, N> {
    settings: MonitorSettings,
    profiles: Option<NetworkProfiles>,
    prober: P,
    network: N,
    term_receiver: Receiver<()>,
}

impl<P: Prober, N: NetworkControl> Monitor<P, N> {
    pub(crate) fn new(
        settings: MonitorSettings,
        profiles: Option<NetworkProfiles>,
        prober: P,
        network: N,
        term_receiver: Receiver<()>,
    ) -> Self {
        Monitor {
            settings,
            profiles,
            prober,
            network,
            term_receiver,
        }
    }

    /// Probe, escalate if needed and sleep, until asked to terminate
    pub(crate) fn run(&self) {
        let mut state = MonitorState::new();

        loop {
            state = match self.cycle(state) {
                Some(next) => next,
                None => break,
            };

            if self.pause(self.settings.period) {
                break;
            }
        }

        info!("Exiting");
    }

    /// One probe and whatever it escalates to. Returns `None` if termination was
    /// requested while waiting on a reconnection.
    pub(crate) fn cycle(&self, state: MonitorState) -> Option<MonitorState> {
        let threshold = self.settings.failure_threshold;
        let previous = state.connectivity(threshold);

        let result = self.prober.probe();
        let state = state.record(result, SystemTime::now());
        let current = state.connectivity(threshold);

        match (previous, current) {
            (ConnectivityState::Stable, ConnectivityState::Stable) => debug!("Internet {result}"),
            (_, ConnectivityState::Stable) => info!("Internet reachable again"),
            _ => debug!(
                "Internet {result}, {} of {threshold} failures before reconnecting",
                state.consecutive_failures
            ),
        }

        if !state.needs_recovery(threshold) {
            return Some(state);
        }

        warn!(
            "{} consecutive failed probes: {current}, asking the network manager to reconnect",
            state.consecutive_failures
        );
        self.reconnect()?;

        if self.pause(self.settings.grace) {
            return None;
        }

        Some(state.recovered())
    }

    /// Best effort: every failure is logged and otherwise ignored, the next cycles will
    /// escalate again if the device is still offline.
    fn reconnect(&self) -> Option<()> {
        if let Err(e) = self.network.reassociate() {
            warn!("Reassociation failed: {e}");
        }

        if self.pause(self.settings.reassociate_wait) {
            return None;
        }

        if self.prober.probe() == ProbeResult::Reachable {
            info!("Reassociation restored connectivity");
            return Some(());
        }

        if let Err(e) = self.network.scan() {
            warn!("Scan failed: {e}");
        }

        if self.pause(self.settings.scan_wait) {
            return None;
        }

        match self.network.scan_results() {
            Ok(networks) => self.log_visible(&networks),
            Err(e) => warn!("Could not read scan results: {e}"),
        }

        match self.network.reconnect() {
            Ok(()) => info!("Reconnect requested, the network manager picks the network by priority"),
            Err(e) => warn!("Reconnect failed: {e}"),
        }

        Some(())
    }

    fn log_visible(&self, networks: &[VisibleNetwork]) {
        let Some(profiles) = &self.profiles else {
            debug!("{} networks visible", networks.len());
            return;
        };

        let mut known = 0;
        for network in networks {
            match profiles.role_of(&network.ssid) {
                Some(role) => {
                    known += 1;
                    info!("Visible {role} network: {network}");
                }
                None => debug!("Visible network: {network}"),
            }
        }

        if known == 0 {
            warn!(
                "Neither '{}' nor '{}' is visible ({} other networks)",
                profiles.primary.ssid,
                profiles.fallback.ssid,
                networks.len()
            );
        }
    }

    /// A "sleep", interruptible by receiving a message to exit. Returns true when the
    /// monitor should stop.
    fn pause(&self, duration: Duration) -> bool {
        match self.term_receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::{MockNetworkControl, NetworkError};
    use crate::probe::MockProber;
    use data_model::{NetworkProfile, Signal};
    use std::sync::mpsc::{channel, Sender};
    use ProbeResult::{Reachable, Unreachable};

    fn settings() -> MonitorSettings {
        MonitorSettings {
            period: Duration::ZERO,
            reassociate_wait: Duration::ZERO,
            scan_wait: Duration::ZERO,
            grace: Duration::ZERO,
            ..MonitorSettings::default()
        }
    }

    fn profiles() -> NetworkProfiles {
        NetworkProfiles {
            primary: NetworkProfile {
                ssid: "Booth".into(),
                secret: "boothpass123".into(),
                priority: 10,
            },
            fallback: NetworkProfile {
                ssid: "Hotspot".into(),
                secret: "hotspot-pass".into(),
                priority: 5,
            },
        }
    }

    fn prober(results: Vec<ProbeResult>) -> MockProber {
        let mut prober = MockProber::new();
        let count = results.len();
        let mut results = results.into_iter();
        prober
            .expect_probe()
            .times(count)
            .returning(move || results.next().unwrap_or(Reachable));
        prober
    }

    fn refused(command: &str) -> NetworkError {
        NetworkError::Refused {
            command: command.to_owned(),
        }
    }

    fn monitor(
        results: Vec<ProbeResult>,
        network: MockNetworkControl,
    ) -> (Monitor<MockProber, MockNetworkControl>, Sender<()>) {
        let (tx, rx) = channel();
        let monitor = Monitor::new(settings(), Some(profiles()), prober(results), network, rx);
        (monitor, tx)
    }

    /// Run one cycle per probe result, collecting the failure counter seen after each
    fn counters(monitor: &Monitor<MockProber, MockNetworkControl>, cycles: usize) -> Vec<u32> {
        let mut state = MonitorState::new();
        let mut seen = vec![];
        for _ in 0..cycles {
            state = monitor.cycle(state).expect("monitor stopped unexpectedly");
            seen.push(state.consecutive_failures);
        }
        seen
    }

    #[test]
    fn three_failures_trigger_one_reconnect() {
        let mut network = MockNetworkControl::new();
        network.expect_reassociate().times(1).returning(|| Ok(()));
        network.expect_scan().times(1).returning(|| Ok(()));
        network.expect_scan_results().times(1).returning(|| {
            Ok(vec![VisibleNetwork {
                ssid: "Hotspot".into(),
                signal: Signal::Dbm(-60),
                frequency_mhz: Some(2437),
            }])
        });
        network.expect_reconnect().times(1).returning(|| Ok(()));

        // the fourth probe is the check after reassociating
        let (monitor, _tx) = monitor(
            vec![Unreachable, Unreachable, Unreachable, Unreachable],
            network,
        );

        assert_eq!(counters(&monitor, 3), vec![1, 2, 0]);
    }

    #[test]
    fn reassociation_success_skips_rescan() {
        let mut network = MockNetworkControl::new();
        network.expect_reassociate().times(1).returning(|| Ok(()));
        network.expect_scan().never();
        network.expect_scan_results().never();
        network.expect_reconnect().never();

        let (monitor, _tx) = monitor(
            vec![Unreachable, Unreachable, Unreachable, Reachable],
            network,
        );

        assert_eq!(counters(&monitor, 3), vec![1, 2, 0]);
    }

    #[test]
    fn single_failure_then_success_never_reconnects() {
        let mut network = MockNetworkControl::new();
        network.expect_reassociate().never();
        network.expect_reconnect().never();

        let (monitor, _tx) = monitor(vec![Unreachable, Reachable], network);

        assert_eq!(counters(&monitor, 2), vec![1, 0]);
    }

    #[test]
    fn interleaved_success_delays_reconnect() {
        let mut network = MockNetworkControl::new();
        network.expect_reassociate().times(1).returning(|| Ok(()));
        network.expect_scan().times(1).returning(|| Ok(()));
        network.expect_scan_results().times(1).returning(|| Ok(vec![]));
        network.expect_reconnect().times(1).returning(|| Ok(()));

        let (monitor, _tx) = monitor(
            vec![
                Unreachable,
                Reachable,
                Unreachable,
                Unreachable,
                Unreachable,
                Unreachable,
            ],
            network,
        );

        // the fifth cycle hits the threshold, reconnects and resets the counter
        assert_eq!(counters(&monitor, 5), vec![1, 0, 1, 2, 0]);
    }

    #[test]
    fn command_failures_are_swallowed() {
        let mut network = MockNetworkControl::new();
        network
            .expect_reassociate()
            .times(1)
            .returning(|| Err(refused("reassociate")));
        network
            .expect_scan()
            .times(1)
            .returning(|| Err(refused("scan")));
        network
            .expect_scan_results()
            .times(1)
            .returning(|| Err(refused("scan_results")));
        network
            .expect_reconnect()
            .times(1)
            .returning(|| Err(refused("reconnect")));

        let (monitor, _tx) = monitor(
            vec![Unreachable, Unreachable, Unreachable, Unreachable],
            network,
        );

        assert_eq!(counters(&monitor, 3), vec![1, 2, 0]);
    }

    #[test]
    fn escalates_again_when_reconnect_did_not_help() {
        let mut network = MockNetworkControl::new();
        network.expect_reassociate().times(2).returning(|| Ok(()));
        network.expect_scan().times(2).returning(|| Ok(()));
        network.expect_scan_results().times(2).returning(|| Ok(vec![]));
        network.expect_reconnect().times(2).returning(|| Ok(()));

        // two rounds of three failures, each followed by a failed post-reassociation probe
        let (monitor, _tx) = monitor(vec![Unreachable; 8], network);

        assert_eq!(counters(&monitor, 6), vec![1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn termination_during_reconnect_stops_cycle() {
        let mut network = MockNetworkControl::new();
        network.expect_reassociate().times(1).returning(|| Ok(()));
        network.expect_scan().never();
        network.expect_reconnect().never();

        let (monitor, tx) = monitor(vec![Unreachable, Unreachable, Unreachable], network);

        let state = MonitorState::new();
        let state = monitor.cycle(state).unwrap();
        let state = monitor.cycle(state).unwrap();
        tx.send(()).unwrap();
        assert_eq!(monitor.cycle(state), None);
    }

    #[test]
    fn run_exits_on_termination() {
        let mut network = MockNetworkControl::new();
        network.expect_reassociate().never();

        let (monitor, tx) = monitor(vec![Reachable], network);
        tx.send(()).unwrap();

        // one probe, then the pause receives the termination message
        monitor.run();
    }

    #[test]
    fn run_exits_when_sender_dropped() {
        let network = MockNetworkControl::new();
        let (monitor, tx) = monitor(vec![Reachable], network);
        drop(tx);

        monitor.run();
    }

    #[test]
    fn works_without_profiles() {
        let mut network = MockNetworkControl::new();
        network.expect_reassociate().times(1).returning(|| Ok(()));
        network.expect_scan().times(1).returning(|| Ok(()));
        network.expect_scan_results().times(1).returning(|| Ok(vec![]));
        network.expect_reconnect().times(1).returning(|| Ok(()));

        let (_tx, rx) = channel();
        let settings = MonitorSettings {
            failure_threshold: 1,
            ..settings()
        };
        let monitor = Monitor::new(
            settings,
            None,
            prober(vec![Unreachable, Unreachable]),
            network,
            rx,
        );

        assert_eq!(counters(&monitor, 1), vec![0]);
    }
}
