use data_model::NetworkProfiles;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

const HEADER: &str = "ctrl_interface=DIR=/var/run/wpa_supplicant GROUP=netdev\nupdate_config=1\n";

/// SSIDs wpa_supplicant cannot read back from a quoted string are written as hex
fn ssid_value(ssid: &str) -> String {
    if ssid.chars().all(|c| c.is_ascii_graphic() || c == ' ') && !ssid.contains('"') {
        format!("\"{ssid}\"")
    } else {
        ssid.bytes().fold(String::new(), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
    }
}

/// A complete wpa_supplicant.conf, one network block per profile, highest priority first
pub(crate) fn render(profiles: &NetworkProfiles, country: Option<&str>) -> String {
    let mut conf = String::from(HEADER);
    if let Some(country) = country {
        let _ = writeln!(conf, "country={country}");
    }

    for (role, profile) in profiles.by_priority() {
        let _ = writeln!(conf, "\n# {role}");
        conf.push_str("network={\n");
        let _ = writeln!(conf, "\tssid={}", ssid_value(&profile.ssid));
        if profile.is_open() {
            conf.push_str("\tkey_mgmt=NONE\n");
        } else {
            let _ = writeln!(conf, "\tpsk=\"{}\"", profile.secret);
        }
        let _ = writeln!(conf, "\tpriority={}", profile.priority);
        conf.push_str("}\n");
    }

    conf
}

/// Write the config readable by root only, it holds the passphrases
pub(crate) fn write(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;
    use data_model::NetworkProfile;
    use std::os::unix::fs::PermissionsExt;

    fn profiles() -> NetworkProfiles {
        NetworkProfiles {
            primary: NetworkProfile {
                ssid: "Booth".into(),
                secret: "boothpass123".into(),
                priority: 10,
            },
            fallback: NetworkProfile {
                ssid: "Hotspot".into(),
                secret: String::new(),
                priority: 5,
            },
        }
    }

    #[test]
    fn renders_blocks_by_priority() {
        let conf = render(&profiles(), Some("FR"));
        assert_eq!(
            conf,
            "ctrl_interface=DIR=/var/run/wpa_supplicant GROUP=netdev\n\
             update_config=1\n\
             country=FR\n\
             \n\
             # primary\n\
             network={\n\
             \tssid=\"Booth\"\n\
             \tpsk=\"boothpass123\"\n\
             \tpriority=10\n\
             }\n\
             \n\
             # fallback\n\
             network={\n\
             \tssid=\"Hotspot\"\n\
             \tkey_mgmt=NONE\n\
             \tpriority=5\n\
             }\n"
        );
    }

    #[test]
    fn no_country_line_without_country() {
        assert!(!render(&profiles(), None).contains("country="));
    }

    #[test]
    fn quoted_secret_stays_on_its_line() {
        let mut profiles = profiles();
        profiles.primary.secret = "say \"cheese\"!".into();
        assert_eq!(profiles.validate(), Ok(()));

        let conf = render(&profiles, None);
        assert!(conf.contains("\n\tpsk=\"say \"cheese\"!\"\n"));
        assert_eq!(conf.matches("network={").count(), 2);
    }

    #[test]
    fn unusual_ssid_written_as_hex() {
        assert_eq!(ssid_value("Café"), "436166c3a9");
        assert_eq!(ssid_value("a\"b"), "612262");
        assert_eq!(ssid_value("My Booth"), "\"My Booth\"");
    }

    #[test]
    fn written_private() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wpa_supplicant.conf");
        write(&path, &render(&profiles(), None)).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(fs::read_to_string(&path).unwrap().contains("priority=10"));
    }
}
