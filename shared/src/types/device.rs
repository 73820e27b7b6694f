//! Compute device identifiers
//!
//! A [`DeviceHandle`] is a plain value: two handles are the same device when
//! their kind and index match. Its canonical text form (`cpu:0`, `gpu:1`,
//! `rocm:0`) is also its serialized form, so it can key JSON objects.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Kind of compute device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    /// Any other backend, by lowercase name (e.g. "rocm", "vulkan")
    Other(String),
}

impl DeviceKind {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
            DeviceKind::Other(name) => name,
        }
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "" => Err("empty device kind".to_string()),
            "cpu" => Ok(DeviceKind::Cpu),
            "gpu" | "cuda" => Ok(DeviceKind::Gpu),
            other if other.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                Ok(DeviceKind::Other(other.to_string()))
            }
            other => Err(format!("invalid device kind: {}", other)),
        }
    }
}

/// A compute device metrics are grouped by
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle {
    pub kind: DeviceKind,
    pub index: u32,
}

impl DeviceHandle {
    pub fn new(kind: DeviceKind, index: u32) -> Self {
        Self { kind, index }
    }

    pub fn cpu(index: u32) -> Self {
        Self::new(DeviceKind::Cpu, index)
    }

    pub fn gpu(index: u32) -> Self {
        Self::new(DeviceKind::Gpu, index)
    }

    pub fn other(kind: impl Into<String>, index: u32) -> Self {
        Self::new(DeviceKind::Other(kind.into().to_lowercase()), index)
    }

    pub fn is_cpu(&self) -> bool {
        self.kind == DeviceKind::Cpu
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.index)
    }
}

impl FromStr for DeviceHandle {
    type Err = String;

    /// Parse `kind:index`. A bare kind (`cpu`) means index 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = match s.trim().split_once(':') {
            Some((kind, index)) => {
                let index: u32 = index
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid device index in `{}`", s))?;
                (kind, index)
            }
            None => (s, 0),
        };
        Ok(DeviceHandle::new(kind.parse()?, index))
    }
}

impl Serialize for DeviceHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
