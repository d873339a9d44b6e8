use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Protocol identifier of a navigable browsing context.
    FrameId
);
string_id!(
    /// Network request identifier as reported by the browser.
    RequestId
);
string_id!(
    /// Service worker version identifier.
    VersionId
);
string_id!(RegistrationId);
string_id!(
    /// Debugging target identifier (tab, worker, ...).
    TargetId
);

/// Protocol session identifier returned by `Target.attachToTarget`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Local placeholder used before the browser hands out a real session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl RequestId {
    /// True for ids shaped like a decimal fraction (`"1234.5"`).
    pub fn looks_fractional(&self) -> bool {
        match self.0.split_once('.') {
            Some((whole, frac)) => {
                !whole.is_empty()
                    && !frac.is_empty()
                    && whole.bytes().all(|b| b.is_ascii_digit())
                    && frac.bytes().all(|b| b.is_ascii_digit())
            }
            None => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

/// Service worker lifecycle status.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    New,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::New => "new",
            VersionStatus::Installing => "installing",
            VersionStatus::Installed => "installed",
            VersionStatus::Activating => "activating",
            VersionStatus::Activated => "activated",
            VersionStatus::Redundant => "redundant",
        }
    }

    /// Position along the nominal lifecycle; `redundant` is terminal.
    pub fn rank(&self) -> u8 {
        match self {
            VersionStatus::New => 0,
            VersionStatus::Installing => 1,
            VersionStatus::Installed => 2,
            VersionStatus::Activating => 3,
            VersionStatus::Activated => 4,
            VersionStatus::Redundant => 5,
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(VersionStatus::New),
            "installing" => Ok(VersionStatus::Installing),
            "installed" => Ok(VersionStatus::Installed),
            "activating" => Ok(VersionStatus::Activating),
            "activated" => Ok(VersionStatus::Activated),
            "redundant" => Ok(VersionStatus::Redundant),
            other => Err(ParseStatusError {
                kind: "version status",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether the worker's execution context is alive, independent of lifecycle status.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunningStatus {
    Stopped,
    Starting,
    #[default]
    Running,
    Stopping,
}

impl RunningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunningStatus::Stopped => "stopped",
            RunningStatus::Starting => "starting",
            RunningStatus::Running => "running",
            RunningStatus::Stopping => "stopping",
        }
    }
}

impl fmt::Display for RunningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunningStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(RunningStatus::Stopped),
            "starting" => Ok(RunningStatus::Starting),
            "running" => Ok(RunningStatus::Running),
            "stopping" => Ok(RunningStatus::Stopping),
            other => Err(ParseStatusError {
                kind: "running status",
                value: other.to_string(),
            }),
        }
    }
}
