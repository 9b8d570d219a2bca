//! Device naming and addressing.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opaque name of one remote or logical endpoint.
///
/// Two ids are the same device only when their strings are byte-for-byte equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::classify(&self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// How a device is reached, taken from the tag the device list appends to its name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// `(WIFI HOST)`: the controller runs its own access point and a TCP line server.
    WifiHost,
    /// `(PHONE CLIENT)`
    PhoneClient,
    /// `(SERIAL)`
    Serial,
    Unknown,
}

impl DeviceKind {
    pub fn classify(name: &str) -> Self {
        if name.contains("(WIFI HOST)") {
            DeviceKind::WifiHost
        } else if name.contains("(PHONE CLIENT)") {
            DeviceKind::PhoneClient
        } else if name.contains("(SERIAL)") {
            DeviceKind::Serial
        } else {
            DeviceKind::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceKind::WifiHost => "wifi host",
            DeviceKind::PhoneClient => "phone client",
            DeviceKind::Serial => "serial",
            DeviceKind::Unknown => "unknown",
        }
    }

    /// Only Wi-Fi hosts are backed by a line transport.
    pub fn has_transport(self) -> bool {
        matches!(self, DeviceKind::WifiHost)
    }
}

/// Host/port pair a line transport connects to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
