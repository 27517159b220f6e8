use data_model::{Signal, VisibleNetwork};
use log::debug;
use std::io;
use std::process::{Command, ExitStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum NetworkError {
    #[error("could not execute '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("'{command}' was refused")]
    Refused { command: String },
}

/// The commands the monitor may issue to the OS network manager. Which configured
/// network gets joined is always the network manager's decision.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait NetworkControl {
    /// Re-establish the link to the current access point
    fn reassociate(&self) -> Result<(), NetworkError>;
    /// Start a scan for visible networks
    fn scan(&self) -> Result<(), NetworkError>;
    /// Networks seen by the latest scan
    fn scan_results(&self) -> Result<Vec<VisibleNetwork>, NetworkError>;
    /// Reload the configured profiles and connect to the best one in range
    fn reconnect(&self) -> Result<(), NetworkError>;
}

fn run(program: &str, args: &[&str]) -> Result<String, NetworkError> {
    let command = format!("{program} {}", args.join(" "));
    debug!("Running '{command}'");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| NetworkError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(NetworkError::Failed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// One of the operations of [`NetworkControl`], used to look up the commands a
/// backend runs for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Reassociate,
    Scan,
    ScanResults,
    Reconnect,
}

/// `wpa_cli` argument lists for an action, run in order
pub(crate) fn wpa_cli_commands(interface: &str, action: Action) -> Vec<Vec<&str>> {
    let commands: &[&'static str] = match action {
        Action::Reassociate => &["reassociate"],
        Action::Scan => &["scan"],
        Action::ScanResults => &["scan_results"],
        Action::Reconnect => &["reconfigure", "reconnect"],
    };

    commands
        .iter()
        .map(|command| vec!["-i", interface, *command])
        .collect()
}

/// wpa_cli exits successfully even when wpa_supplicant refuses the command
pub(crate) fn check_reply(command: &str, output: String) -> Result<String, NetworkError> {
    if output.trim() == "FAIL" {
        return Err(NetworkError::Refused {
            command: command.to_owned(),
        });
    }

    Ok(output)
}

/// wpa_supplicant, driven through `wpa_cli`
pub(crate) struct WpaCli {
    interface: String,
}

impl WpaCli {
    pub(crate) fn new(interface: &str) -> Self {
        WpaCli {
            interface: interface.to_owned(),
        }
    }

    /// Output of the last command run for the action
    fn perform(&self, action: Action) -> Result<String, NetworkError> {
        let mut output = String::new();
        for args in wpa_cli_commands(&self.interface, action) {
            let reply = run("wpa_cli", &args)?;
            output = check_reply(&format!("wpa_cli {}", args.join(" ")), reply)?;
        }
        Ok(output)
    }
}

impl NetworkControl for WpaCli {
    fn reassociate(&self) -> Result<(), NetworkError> {
        self.perform(Action::Reassociate).map(|_| ())
    }

    fn scan(&self) -> Result<(), NetworkError> {
        self.perform(Action::Scan).map(|_| ())
    }

    fn scan_results(&self) -> Result<Vec<VisibleNetwork>, NetworkError> {
        self.perform(Action::ScanResults)
            .map(|data| parse_wpa_scan_results(&data))
    }

    fn reconnect(&self) -> Result<(), NetworkError> {
        self.perform(Action::Reconnect).map(|_| ())
    }
}

/// Undo the escaping wpa_supplicant applies to SSIDs it prints: `\\`, `\"`, `\n`,
/// `\r`, `\t`, `\e` and `\xNN` for any other byte outside printable ASCII
pub(crate) fn decode_wpa_ssid(field: &str) -> String {
    let mut bytes = Vec::with_capacity(field.len());
    let mut rest = field.as_bytes();

    while let Some((&byte, tail)) = rest.split_first() {
        rest = tail;
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }

        let Some((&escaped, tail)) = rest.split_first() else {
            bytes.push(byte);
            break;
        };
        rest = tail;

        match escaped {
            b'n' => bytes.push(b'\n'),
            b'r' => bytes.push(b'\r'),
            b't' => bytes.push(b'\t'),
            b'e' => bytes.push(0x1b),
            b'x' => {
                let value = rest
                    .get(..2)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match value {
                    Some(value) => {
                        bytes.push(value);
                        rest = &rest[2..];
                    }
                    None => bytes.extend_from_slice(b"\\x"),
                }
            }
            other => bytes.push(other),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Parse the table printed by `wpa_cli scan_results`:
/// `bssid / frequency / signal level / flags / ssid`, tab separated.
pub(crate) fn parse_wpa_scan_results(data: &str) -> Vec<VisibleNetwork> {
    data.lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let _bssid = fields.next()?;
            let frequency = fields.next()?.trim().parse::<u32>().ok()?;
            let signal = fields.next()?.trim().parse::<i16>().ok()?;
            let _flags = fields.next()?;
            // spaces are part of an SSID
            let ssid = decode_wpa_ssid(fields.next()?);

            // hidden networks have no SSID to match a profile against
            if ssid.is_empty() {
                return None;
            }

            Some(VisibleNetwork {
                ssid,
                signal: Signal::Dbm(signal),
                frequency_mhz: Some(frequency),
            })
        })
        .collect()
}

/// `nmcli` argument lists for an action, run in order
pub(crate) fn nmcli_commands(interface: &str, action: Action) -> Vec<Vec<&str>> {
    match action {
        Action::Reassociate => vec![vec!["device", "connect", interface]],
        Action::Scan => vec![vec!["device", "wifi", "rescan", "ifname", interface]],
        Action::ScanResults => vec![vec![
            "-t",
            "-f",
            "SSID,SIGNAL,FREQ",
            "device",
            "wifi",
            "list",
            "ifname",
            interface,
        ]],
        Action::Reconnect => vec![
            vec!["connection", "reload"],
            vec!["device", "connect", interface],
        ],
    }
}

/// NetworkManager, driven through `nmcli`
pub(crate) struct NmCli {
    interface: String,
}

impl NmCli {
    pub(crate) fn new(interface: &str) -> Self {
        NmCli {
            interface: interface.to_owned(),
        }
    }

    fn perform(&self, action: Action) -> Result<String, NetworkError> {
        let mut output = String::new();
        for args in nmcli_commands(&self.interface, action) {
            output = run("nmcli", &args)?;
        }
        Ok(output)
    }
}

impl NetworkControl for NmCli {
    fn reassociate(&self) -> Result<(), NetworkError> {
        self.perform(Action::Reassociate).map(|_| ())
    }

    fn scan(&self) -> Result<(), NetworkError> {
        self.perform(Action::Scan).map(|_| ())
    }

    fn scan_results(&self) -> Result<Vec<VisibleNetwork>, NetworkError> {
        self.perform(Action::ScanResults)
            .map(|data| parse_nmcli_wifi_list(&data))
    }

    fn reconnect(&self) -> Result<(), NetworkError> {
        self.perform(Action::Reconnect).map(|_| ())
    }
}

/// Split one line of `nmcli -t` output on its unescaped ':' separators
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = vec![];
    let mut field = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => field.extend(chars.next()),
            ':' => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}

/// Parse `nmcli -t -f SSID,SIGNAL,FREQ device wifi list`, e.g. `Booth:82:2437 MHz`
pub(crate) fn parse_nmcli_wifi_list(data: &str) -> Vec<VisibleNetwork> {
    data.lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            let [ssid, signal, frequency] = fields.as_slice() else {
                return None;
            };

            if ssid.is_empty() {
                return None;
            }

            Some(VisibleNetwork {
                ssid: ssid.clone(),
                signal: Signal::Percent(signal.trim().parse().ok()?),
                frequency_mhz: frequency
                    .trim()
                    .trim_end_matches("MHz")
                    .trim()
                    .parse()
                    .ok(),
            })
        })
        .collect()
}
