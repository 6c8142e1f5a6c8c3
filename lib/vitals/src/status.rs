use std::{fmt, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Availability of a single check, or of the system as a whole.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum AvailabilityStatus {
    /// The check, or system, is available.
    Up,

    /// The check, or system, is unavailable.
    Down,

    /// The status is not (yet) known.
    #[default]
    Unknown,

    /// A user-defined status code.
    ///
    /// Custom codes carry the same weight as `Up` when aggregating.
    Custom(Arc<str>),
}

impl AvailabilityStatus {
    /// Creates a status from the given code.
    ///
    /// The codes `up`, `down`, and `unknown` map to their built-in variants, and any other code becomes
    /// [`AvailabilityStatus::Custom`].
    pub fn from_code<S: AsRef<str>>(code: S) -> Self {
        match code.as_ref() {
            "up" => Self::Up,
            "down" => Self::Down,
            "unknown" => Self::Unknown,
            other => Self::Custom(Arc::from(other)),
        }
    }

    /// Returns the string code for this status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
            Self::Custom(code) => code,
        }
    }

    /// Returns `true` if the status is `Up`.
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }

    /// Returns `true` if the status is `Down`.
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Down)
    }

    pub(crate) fn as_gauge_value(&self) -> f64 {
        match self {
            Self::Down => -1.0,
            Self::Unknown => 0.0,
            Self::Up | Self::Custom(_) => 1.0,
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AvailabilityStatus {
    fn from(code: &str) -> Self {
        Self::from_code(code)
    }
}

impl Serialize for AvailabilityStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AvailabilityStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from_code(code))
    }
}

/// Reduces a set of statuses to a single, overall status.
///
/// If any status is `Down`, the result is `Down`. Otherwise, if any status is `Unknown`, the result is `Unknown`.
/// Otherwise, the result is `Up`, which includes the case of there being no statuses at all.
pub fn aggregate<'a, I>(statuses: I) -> AvailabilityStatus
where
    I: IntoIterator<Item = &'a AvailabilityStatus>,
{
    let mut overall = AvailabilityStatus::Up;
    for status in statuses {
        match status {
            AvailabilityStatus::Down => return AvailabilityStatus::Down,
            AvailabilityStatus::Unknown => overall = AvailabilityStatus::Unknown,
            AvailabilityStatus::Up | AvailabilityStatus::Custom(_) => {}
        }
    }

    overall
}
