use data_model::NetworkProfile;
use log::{debug, info};
use std::io;
use std::process::Command;

/// Arguments for `nmcli` creating a connection for this profile. NetworkManager ranks
/// candidate connections by `connection.autoconnect-priority`.
pub(crate) fn add_args(profile: &NetworkProfile, interface: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "connection",
        "add",
        "type",
        "wifi",
        "ifname",
        interface,
        "con-name",
        profile.ssid.as_str(),
        "ssid",
        profile.ssid.as_str(),
        "connection.autoconnect",
        "yes",
        "connection.autoconnect-priority",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();
    args.push(profile.priority.to_string());

    if !profile.is_open() {
        args.extend(
            ["wifi-sec.key-mgmt", "wpa-psk", "wifi-sec.psk", profile.secret.as_str()]
                .iter()
                .map(|arg| arg.to_string()),
        );
    }

    args
}

/// Replace any existing connection of the same name with one built from the profile
pub(crate) fn provision(profile: &NetworkProfile, interface: &str) -> io::Result<()> {
    // absent on first provisioning
    let deleted = Command::new("nmcli")
        .args(["connection", "delete", "id", &profile.ssid])
        .output()?;
    if deleted.status.success() {
        debug!("Removed previous connection '{}'", profile.ssid);
    }

    let output = Command::new("nmcli")
        .args(add_args(profile, interface))
        .output()?;
    if !output.status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "nmcli could not add '{}': {}",
                profile.ssid,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    info!("Added NetworkManager connection for {profile}");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn secured_profile() {
        let profile = NetworkProfile {
            ssid: "Booth".into(),
            secret: "boothpass123".into(),
            priority: 10,
        };
        let args = add_args(&profile, "wlan0");
        assert_eq!(
            args,
            vec![
                "connection",
                "add",
                "type",
                "wifi",
                "ifname",
                "wlan0",
                "con-name",
                "Booth",
                "ssid",
                "Booth",
                "connection.autoconnect",
                "yes",
                "connection.autoconnect-priority",
                "10",
                "wifi-sec.key-mgmt",
                "wpa-psk",
                "wifi-sec.psk",
                "boothpass123",
            ]
        );
    }

    #[test]
    fn open_profile_has_no_security() {
        let profile = NetworkProfile {
            ssid: "Hotspot".into(),
            secret: String::new(),
            priority: 5,
        };
        let args = add_args(&profile, "wlan0");
        assert_eq!(args.last().map(String::as_str), Some("5"));
        assert!(!args.iter().any(|arg| arg.starts_with("wifi-sec")));
    }
}
