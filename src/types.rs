//! NewType wrappers and small enums for the console domain
//!
//! Prevents type confusion between framework/model/agent identifiers and
//! keeps validated invariants (non-empty ids, positive batch size) at the
//! type boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// PAGE
// ============================================================================

/// Page identifiers the console can navigate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Page {
    #[default]
    Home,
    Models,
    Frameworks,
    Agents,
    Agent,
    About,
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Page::Home => "Home",
            Page::Models => "Models",
            Page::Frameworks => "Frameworks",
            Page::Agents => "Agents",
            Page::Agent => "Agent",
            Page::About => "About",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// DEVICE
// ============================================================================

/// Execution device requested for an inference run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Device {
    Cpu,
    #[default]
    Gpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu => write!(f, "GPU"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CPU" => Ok(Device::Cpu),
            "GPU" => Ok(Device::Gpu),
            other => Err(format!("unknown device '{}', expected CPU or GPU", other)),
        }
    }
}

// ============================================================================
// TRACE LEVEL
// ============================================================================

/// Tracing granularity forwarded to the backend with a prediction request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceLevel {
    NoTrace,
    ApplicationTrace,
    ModelTrace,
    FrameworkTrace,
    #[default]
    FullTrace,
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceLevel::NoTrace => "NO_TRACE",
            TraceLevel::ApplicationTrace => "APPLICATION_TRACE",
            TraceLevel::ModelTrace => "MODEL_TRACE",
            TraceLevel::FrameworkTrace => "FRAMEWORK_TRACE",
            TraceLevel::FullTrace => "FULL_TRACE",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NO_TRACE" => Ok(TraceLevel::NoTrace),
            "APPLICATION_TRACE" => Ok(TraceLevel::ApplicationTrace),
            "MODEL_TRACE" => Ok(TraceLevel::ModelTrace),
            "FRAMEWORK_TRACE" => Ok(TraceLevel::FrameworkTrace),
            "FULL_TRACE" => Ok(TraceLevel::FullTrace),
            other => Err(format!("unknown trace level '{}'", other)),
        }
    }
}

// ============================================================================
// BATCH SIZE
// ============================================================================

/// Strictly positive batch size for inference requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct BatchSize(u32);

impl BatchSize {
    /// Maximum batch the console will request
    pub const MAX: u32 = 1024;

    pub fn new(size: u32) -> Result<Self, BatchSizeError> {
        if size == 0 {
            return Err(BatchSizeError::Zero);
        }
        if size > Self::MAX {
            return Err(BatchSizeError::TooLarge(size));
        }
        Ok(BatchSize(size))
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        BatchSize(1)
    }
}

impl fmt::Display for BatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for BatchSize {
    type Error = BatchSizeError;

    fn try_from(size: u32) -> Result<Self, Self::Error> {
        BatchSize::new(size)
    }
}

impl<'de> Deserialize<'de> for BatchSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = u32::deserialize(deserializer)?;
        BatchSize::new(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchSizeError {
    #[error("batch size must be at least 1")]
    Zero,
    #[error("batch size {0} exceeds maximum {}", BatchSize::MAX)]
    TooLarge(u32),
}

// ============================================================================
// AGENT ID
// ============================================================================

/// Strongly-typed agent identifier (`host:port` as reported by the registry)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl AsRef<str>) -> Result<Self, AgentIdError> {
        let id = id.as_ref();
        if id.trim().is_empty() {
            return Err(AgentIdError::Empty);
        }
        Ok(AgentId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AgentId {
    type Err = AgentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentId::new(s)
    }
}

impl<'de> Deserialize<'de> for AgentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        AgentId::new(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentIdError {
    #[error("agent id cannot be empty")]
    Empty,
}

// ============================================================================
// MANIFEST KEY (framework / model addressing)
// ============================================================================

/// Registry address of a framework or model manifest: name plus version,
/// where the version defaults to "latest".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestKey {
    pub name: String,
    #[serde(default = "latest_version")]
    pub version: String,
}

fn latest_version() -> String {
    "latest".to_string()
}

impl ManifestKey {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ManifestKeyError> {
        let name = name.into().to_lowercase();
        let version = version.into().to_lowercase();
        if name.is_empty() {
            return Err(ManifestKeyError::EmptyName);
        }
        if version.is_empty() {
            return Err(ManifestKeyError::EmptyVersion);
        }
        Ok(ManifestKey { name, version })
    }

    /// Address the latest registered version
    pub fn latest(name: impl Into<String>) -> Result<Self, ManifestKeyError> {
        Self::new(name, "latest")
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for ManifestKey {
    type Err = ManifestKeyError;

    /// Parse `name` or `name:version`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, version)) => ManifestKey::new(name, version),
            None => ManifestKey::latest(s),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestKeyError {
    #[error("manifest name cannot be empty")]
    EmptyName,
    #[error("manifest version cannot be empty")]
    EmptyVersion,
}

// ============================================================================
// TESTS
// ============================================================================
