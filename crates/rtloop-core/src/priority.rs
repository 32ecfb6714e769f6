//! Scheduling priority levels of the worker task.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Real-time priority level applied to the worker task.
///
/// The worker moves between three levels over its lifetime:
/// - `Startup` while the user setup hook initializes hardware
/// - `Main` for every normal loop iteration
/// - `Overtime` after the watchdog caught an iteration overrunning its budget
///
/// Ordering follows effective scheduling priority, so `Overtime < Main`.
/// The concrete OS priority numbers come from [`crate::PriorityConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    /// Demoted level used while running the one-shot setup hook
    Startup,

    /// Elevated level for the periodic control loop
    Main,

    /// Demoted level while an iteration runs over budget
    Overtime,
}

impl PriorityLevel {
    /// All levels, lowest effective priority first.
    pub const ALL: [PriorityLevel; 3] = [Self::Overtime, Self::Startup, Self::Main];

    /// Rank used for ordering. Higher runs first.
    fn rank(self) -> u8 {
        match self {
            Self::Overtime => 0,
            Self::Startup => 1,
            Self::Main => 2,
        }
    }

    /// Compact encoding for storage in an atomic.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Startup => 1,
            Self::Main => 2,
            Self::Overtime => 3,
        }
    }

    /// Decodes [`PriorityLevel::as_u8`]. Zero and unknown values mean "unset".
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Startup),
            2 => Some(Self::Main),
            3 => Some(Self::Overtime),
            _ => None,
        }
    }

    /// Returns a short lowercase label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Main => "main",
            Self::Overtime => "overtime",
        }
    }
}

impl PartialOrd for PriorityLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overtime_below_main() {
        assert!(PriorityLevel::Overtime < PriorityLevel::Main);
        assert!(PriorityLevel::Startup < PriorityLevel::Main);
        assert_eq!(
            PriorityLevel::ALL.iter().max(),
            Some(&PriorityLevel::Main)
        );
    }

    #[test]
    fn test_u8_encoding() {
        for level in PriorityLevel::ALL {
            assert_eq!(PriorityLevel::from_u8(level.as_u8()), Some(level));
        }
        assert_eq!(PriorityLevel::from_u8(0), None);
        assert_eq!(PriorityLevel::from_u8(42), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(PriorityLevel::Overtime.to_string(), "overtime");
        assert_eq!(PriorityLevel::Main.label(), "main");
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&PriorityLevel::Overtime).unwrap();
        assert_eq!(json, "\"overtime\"");
    }
}
