use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Longest SSID allowed by 802.11, in bytes
pub const MAX_SSID_BYTES: usize = 32;

/// Bounds for a WPA-PSK passphrase, in characters
pub const MIN_PSK_CHARS: usize = 8;
pub const MAX_PSK_CHARS: usize = 63;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub ssid: String,
    /// WPA passphrase. Empty for an open network.
    #[serde(default)]
    pub secret: String,
    pub priority: i32,
}

impl NetworkProfile {
    pub fn is_open(&self) -> bool {
        self.secret.is_empty()
    }
}

impl Display for NetworkProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let security = if self.is_open() { "open" } else { "wpa-psk" };
        write!(f, "'{}' (priority {}, {security})", self.ssid, self.priority)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Fallback,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileError {
    #[error("primary priority ({primary}) must be greater than fallback priority ({fallback})")]
    PriorityOrder { primary: i32, fallback: i32 },
    #[error("{0} network has an empty SSID")]
    EmptySsid(Role),
    #[error("{role} SSID is {len} bytes, longer than 32")]
    SsidTooLong { role: Role, len: usize },
    #[error("{role} secret must be 8 to 63 characters, or empty for an open network")]
    SecretLength { role: Role },
    #[error("{role} secret may only contain printable ASCII characters")]
    SecretCharacters { role: Role },
    #[error("primary and fallback both use SSID '{0}'")]
    SameSsid(String),
}

/// The two networks the device may join. The OS network manager picks between them
/// using `priority`, so the primary must always rank higher.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfiles {
    pub primary: NetworkProfile,
    pub fallback: NetworkProfile,
}

impl NetworkProfiles {
    pub fn validate(&self) -> Result<(), ProfileError> {
        for (role, profile) in self.by_priority() {
            check_profile(role, profile)?;
        }

        if self.primary.ssid == self.fallback.ssid {
            return Err(ProfileError::SameSsid(self.primary.ssid.clone()));
        }

        if self.primary.priority <= self.fallback.priority {
            return Err(ProfileError::PriorityOrder {
                primary: self.primary.priority,
                fallback: self.fallback.priority,
            });
        }

        Ok(())
    }

    /// Profiles ordered highest priority first
    pub fn by_priority(&self) -> impl Iterator<Item = (Role, &NetworkProfile)> {
        let mut profiles = [
            (Role::Primary, &self.primary),
            (Role::Fallback, &self.fallback),
        ];
        profiles.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));
        profiles.into_iter()
    }

    /// Which configured profile, if any, uses this SSID
    pub fn role_of(&self, ssid: &str) -> Option<Role> {
        if self.primary.ssid == ssid {
            Some(Role::Primary)
        } else if self.fallback.ssid == ssid {
            Some(Role::Fallback)
        } else {
            None
        }
    }
}

fn check_profile(role: Role, profile: &NetworkProfile) -> Result<(), ProfileError> {
    if profile.ssid.is_empty() {
        return Err(ProfileError::EmptySsid(role));
    }

    if profile.ssid.len() > MAX_SSID_BYTES {
        return Err(ProfileError::SsidTooLong {
            role,
            len: profile.ssid.len(),
        });
    }

    let secret_chars = profile.secret.chars().count();
    if !profile.is_open() && !(MIN_PSK_CHARS..=MAX_PSK_CHARS).contains(&secret_chars) {
        return Err(ProfileError::SecretLength { role });
    }

    // WPA passphrases are printable ASCII, which also keeps them on one config line
    if !profile.secret.chars().all(|c| (' '..='~').contains(&c)) {
        return Err(ProfileError::SecretCharacters { role });
    }

    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Reachable,
    Unreachable,
}

impl From<bool> for ProbeResult {
    fn from(reachable: bool) -> Self {
        if reachable {
            ProbeResult::Reachable
        } else {
            ProbeResult::Unreachable
        }
    }
}

impl Display for ProbeResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeResult::Reachable => write!(f, "reachable"),
            ProbeResult::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// No failed probe since the last success
    Stable,
    /// Some consecutive failures, below the escalation threshold
    Degraded,
    /// Threshold reached, a reconnection is due or in progress
    Recovering,
}

impl Display for ConnectivityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Stable => write!(f, "STABLE"),
            ConnectivityState::Degraded => write!(f, "DEGRADED"),
            ConnectivityState::Recovering => write!(f, "RECOVERING"),
        }
    }
}

/// Process-local state of the connectivity monitor. It is passed into and returned from
/// each monitoring cycle and is never persisted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorState {
    pub consecutive_failures: u32,
    pub last_check: Option<SystemTime>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one probe result into the state. Success resets the counter, it is never
    /// partially decremented.
    #[must_use]
    pub fn record(self, result: ProbeResult, now: SystemTime) -> Self {
        let consecutive_failures = match result {
            ProbeResult::Reachable => 0,
            ProbeResult::Unreachable => self.consecutive_failures.saturating_add(1),
        };

        MonitorState {
            consecutive_failures,
            last_check: Some(now),
        }
    }

    pub fn connectivity(&self, threshold: u32) -> ConnectivityState {
        match self.consecutive_failures {
            0 => ConnectivityState::Stable,
            n if n < threshold => ConnectivityState::Degraded,
            _ => ConnectivityState::Recovering,
        }
    }

    pub fn needs_recovery(&self, threshold: u32) -> bool {
        self.connectivity(threshold) == ConnectivityState::Recovering
    }

    /// State after a reconnection attempt, whatever its outcome. Later probes will
    /// escalate again if the network is still down.
    #[must_use]
    pub fn recovered(self) -> Self {
        MonitorState {
            consecutive_failures: 0,
            last_check: self.last_check,
        }
    }
}

impl Display for MonitorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "consecutive failures = {}", self.consecutive_failures)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Received power as reported by wpa_supplicant
    Dbm(i16),
    /// Signal quality as reported by NetworkManager
    Percent(u8),
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Dbm(dbm) => write!(f, "{dbm} dBm"),
            Signal::Percent(percent) => write!(f, "{percent}%"),
        }
    }
}

/// One entry of a wireless scan
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VisibleNetwork {
    pub ssid: String,
    pub signal: Signal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_mhz: Option<u32>,
}

impl Display for VisibleNetwork {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' {}", self.ssid, self.signal)?;
        if let Some(frequency) = self.frequency_mhz {
            write!(f, " @ {frequency} MHz")?;
        }
        Ok(())
    }
}
