//! Wi-Fi management.
//!
//! [`WifiBackend`] abstracts the host's Wi-Fi stack. [`NmcliBackend`] drives
//! NetworkManager through `nmcli` in terse mode; [`MockWifi`] is an
//! in-memory backend for tests.
//!
//! [`connect_network`] wraps a backend with the portal's password policy:
//! without a password, try a direct connect first (open or already-saved
//! networks), and only ask for a password when that fails on a network that
//! is visibly secured.

use std::collections::{HashMap, HashSet};
use std::process::Output;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use netnexus_types::{WifiConnection, WifiNetwork};

/// nmcli exit code for "connection, device, or access point does not exist".
const NMCLI_NOT_FOUND: i32 = 10;

/// Errors raised by Wi-Fi backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WifiError {
    /// The network is secured and no usable credentials were given.
    #[error("Password is required for this secure network.")]
    PasswordRequired {
        /// Network name.
        ssid: String,
    },

    /// The backend command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// Command line, with secrets redacted.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// No visible network has this SSID.
    #[error("Network '{ssid}' not found")]
    NetworkNotFound {
        /// Network name.
        ssid: String,
    },

    /// The host has no Wi-Fi interface.
    #[error("No Wi-Fi interface available")]
    NoInterface,

    /// Disconnect requested while no Wi-Fi network is connected.
    #[error("Not connected to any Wi-Fi network")]
    NotConnected,

    /// The backend program could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Wi-Fi operations.
pub type WifiResult<T> = std::result::Result<T, WifiError>;

/// Host Wi-Fi stack.
#[async_trait]
pub trait WifiBackend: Send + Sync {
    /// List visible networks.
    async fn scan(&self) -> WifiResult<Vec<WifiNetwork>>;

    /// List active connections.
    async fn current_connections(&self) -> WifiResult<Vec<WifiConnection>>;

    /// Join a network, with a password when given.
    async fn connect(&self, ssid: &str, password: Option<&str>) -> WifiResult<()>;

    /// Leave the current network.
    async fn disconnect(&self) -> WifiResult<()>;
}

/// Connect to `ssid`, asking for a password only when one is needed.
pub async fn connect_network<B>(backend: &B, ssid: &str, password: Option<&str>) -> WifiResult<()>
where
    B: WifiBackend + ?Sized,
{
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        return backend.connect(ssid, Some(password)).await;
    }

    let err = match backend.connect(ssid, None).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    let secured = match backend.scan().await {
        Ok(networks) => networks.iter().any(|n| n.ssid == ssid && n.is_secured()),
        Err(e) => {
            warn!("Wi-Fi scan after failed connect also failed: {}", e);
            false
        }
    };

    if secured {
        info!("{} is secured, password required", ssid);
        Err(WifiError::PasswordRequired {
            ssid: ssid.to_string(),
        })
    } else {
        Err(err)
    }
}

/// Split one line of `nmcli -t` output into fields.
///
/// nmcli escapes `:` and `\` inside values with a backslash.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn field(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty() && value != "--").then(|| value.to_string())
}

/// Parse `nmcli -t -f SSID,BSSID,SIGNAL,MODE,SECURITY,RSN-FLAGS device wifi list`.
pub(crate) fn parse_networks(output: &str) -> Vec<WifiNetwork> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = split_terse(line);
            if fields.len() < 6 {
                debug!("Skipping malformed nmcli line: {}", line);
                return None;
            }
            // Hidden networks have no SSID
            let ssid = field(&fields[0])?;
            Some(WifiNetwork {
                ssid,
                bssid: field(&fields[1]),
                strength: fields[2].trim().parse().ok(),
                network_type: field(&fields[3]),
                authentication: field(&fields[4]),
                encryption: field(&fields[5]),
            })
        })
        .collect()
}

/// Parse `nmcli -t -f ACTIVE,SSID,BSSID,SIGNAL,DEVICE device wifi list`.
pub(crate) fn parse_connections(output: &str) -> Vec<WifiConnection> {
    output
        .lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            if fields.len() < 5 || fields[0].trim() != "yes" {
                return None;
            }
            Some(WifiConnection {
                ssid: field(&fields[1])?,
                bssid: field(&fields[2]),
                strength: fields[3].trim().parse().ok(),
                iface: field(&fields[4]),
            })
        })
        .collect()
}

/// Parse `nmcli -t -f DEVICE,TYPE,STATE device` into Wi-Fi `(device, state)` pairs.
pub(crate) fn parse_wifi_devices(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            if fields.len() < 3 || fields[1].trim() != "wifi" {
                return None;
            }
            Some((fields[0].trim().to_string(), fields[2].trim().to_string()))
        })
        .collect()
}

/// Render a command line for logs and errors, hiding the password argument.
fn describe(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    let mut redact_next = false;
    for arg in args {
        if redact_next {
            parts.push("********".to_string());
            redact_next = false;
        } else {
            parts.push((*arg).to_string());
            redact_next = *arg == "password";
        }
    }
    parts.join(" ")
}

/// Wi-Fi backend driving NetworkManager's `nmcli`.
#[derive(Debug, Clone)]
pub struct NmcliBackend {
    program: String,
}

impl Default for NmcliBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NmcliBackend {
    /// Use `nmcli` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("nmcli")
    }

    /// Use a specific nmcli executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn output(&self, args: &[&str]) -> WifiResult<Output> {
        debug!("Running {}", describe(&self.program, args));
        Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| WifiError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    fn check(&self, args: &[&str], output: Output) -> WifiResult<String> {
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        Err(WifiError::CommandFailed {
            command: describe(&self.program, args),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn run(&self, args: &[&str]) -> WifiResult<String> {
        let output = self.output(args).await?;
        self.check(args, output)
    }
}

#[async_trait]
impl WifiBackend for NmcliBackend {
    async fn scan(&self) -> WifiResult<Vec<WifiNetwork>> {
        let out = self
            .run(&[
                "-t",
                "-f",
                "SSID,BSSID,SIGNAL,MODE,SECURITY,RSN-FLAGS",
                "device",
                "wifi",
                "list",
            ])
            .await?;
        let networks = parse_networks(&out);
        info!("Wi-Fi scan found {} network(s)", networks.len());
        Ok(networks)
    }

    async fn current_connections(&self) -> WifiResult<Vec<WifiConnection>> {
        let out = self
            .run(&[
                "-t",
                "-f",
                "ACTIVE,SSID,BSSID,SIGNAL,DEVICE",
                "device",
                "wifi",
                "list",
                "--rescan",
                "no",
            ])
            .await?;
        Ok(parse_connections(&out))
    }

    async fn connect(&self, ssid: &str, password: Option<&str>) -> WifiResult<()> {
        let mut args = vec!["device", "wifi", "connect", ssid];
        if let Some(password) = password {
            args.extend(["password", password]);
        }

        let output = self.output(&args).await?;
        if output.status.code() == Some(NMCLI_NOT_FOUND) {
            return Err(WifiError::NetworkNotFound {
                ssid: ssid.to_string(),
            });
        }
        self.check(&args, output)?;
        info!("Successfully initiated connection to {}", ssid);
        Ok(())
    }

    async fn disconnect(&self) -> WifiResult<()> {
        let out = self.run(&["-t", "-f", "DEVICE,TYPE,STATE", "device"]).await?;
        let devices = parse_wifi_devices(&out);
        if devices.is_empty() {
            return Err(WifiError::NoInterface);
        }

        let Some((device, _)) = devices.iter().find(|(_, state)| state == "connected") else {
            return Err(WifiError::NotConnected);
        };
        self.run(&["device", "disconnect", device]).await?;
        info!("Disconnected {} from Wi-Fi", device);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory Wi-Fi backend for testing.
#[derive(Debug, Default)]
pub struct MockWifi {
    networks: Mutex<Vec<WifiNetwork>>,
    passwords: Mutex<HashMap<String, String>>,
    remembered: Mutex<HashSet<String>>,
    current: Mutex<Option<WifiConnection>>,
    fail_scan: AtomicBool,
    connect_count: AtomicU32,
}

impl MockWifi {
    /// Create a backend with no visible networks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a visible open network.
    #[must_use]
    pub fn with_open_network(self, ssid: &str, strength: u8) -> Self {
        let mut network = WifiNetwork::new(ssid);
        network.strength = Some(strength);
        network.network_type = Some("Infra".to_string());
        lock(&self.networks).push(network);
        self
    }

    /// Add a visible WPA2 network that accepts `password`.
    #[must_use]
    pub fn with_secured_network(self, ssid: &str, password: &str) -> Self {
        let mut network = WifiNetwork::new(ssid);
        network.strength = Some(70);
        network.network_type = Some("Infra".to_string());
        network.authentication = Some("WPA2".to_string());
        network.encryption = Some("pair_ccmp group_ccmp psk".to_string());
        lock(&self.networks).push(network);
        lock(&self.passwords).insert(ssid.to_string(), password.to_string());
        self
    }

    /// Mark a secured network as having a saved profile.
    #[must_use]
    pub fn remember(self, ssid: &str) -> Self {
        lock(&self.remembered).insert(ssid.to_string());
        self
    }

    /// Make scans fail.
    pub fn set_fail_scan(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::Relaxed);
    }

    /// Number of connect calls.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// The network currently joined, if any.
    pub fn current(&self) -> Option<WifiConnection> {
        lock(&self.current).clone()
    }
}

#[async_trait]
impl WifiBackend for MockWifi {
    async fn scan(&self) -> WifiResult<Vec<WifiNetwork>> {
        if self.fail_scan.load(Ordering::Relaxed) {
            return Err(WifiError::NoInterface);
        }
        Ok(lock(&self.networks).clone())
    }

    async fn current_connections(&self) -> WifiResult<Vec<WifiConnection>> {
        Ok(self.current().into_iter().collect())
    }

    async fn connect(&self, ssid: &str, password: Option<&str>) -> WifiResult<()> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);

        let network = lock(&self.networks)
            .iter()
            .find(|n| n.ssid == ssid)
            .cloned()
            .ok_or_else(|| WifiError::NetworkNotFound {
                ssid: ssid.to_string(),
            })?;

        if network.is_secured() && !lock(&self.remembered).contains(ssid) {
            let expected = lock(&self.passwords).get(ssid).cloned();
            if password.is_none() || password != expected.as_deref() {
                return Err(WifiError::CommandFailed {
                    command: describe("nmcli", &["device", "wifi", "connect", ssid]),
                    status: "exit status: 4".to_string(),
                    stderr: "Secrets were required, but not provided".to_string(),
                });
            }
            lock(&self.remembered).insert(ssid.to_string());
        }

        *lock(&self.current) = Some(WifiConnection {
            ssid: network.ssid,
            bssid: network.bssid,
            strength: network.strength,
            iface: Some("wlan0".to_string()),
        });
        Ok(())
    }

    async fn disconnect(&self) -> WifiResult<()> {
        match lock(&self.current).take() {
            Some(_) => Ok(()),
            None => Err(WifiError::NotConnected),
        }
    }
}
