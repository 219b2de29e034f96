//! Ring catalog: the ordered, closed set of rollout stages.
//!
//! A rollout's only progression cursor is an index into [`Ring::ALL`].
//! Every other component goes through these helpers to translate between
//! the cursor and the stage label.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A deployment stage, smallest device population first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ring {
    Pilot,
    Five,
    Twentyfive,
    All,
}

impl Ring {
    /// Every ring in progression order.
    pub const ALL: [Ring; 4] = [Ring::Pilot, Ring::Five, Ring::Twentyfive, Ring::All];

    /// Number of rings in the catalog.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this ring in the progression.
    pub fn index(self) -> usize {
        match self {
            Ring::Pilot => 0,
            Ring::Five => 1,
            Ring::Twentyfive => 2,
            Ring::All => 3,
        }
    }

    /// Look up the ring at `index`.
    ///
    /// An index past the last ring is an internal error; it is reported,
    /// never clamped.
    pub fn at(index: usize) -> CoreResult<Ring> {
        Self::ALL.get(index).copied().ok_or(CoreError::OutOfRange {
            index,
            len: Self::COUNT,
        })
    }

    /// Index of the ring after `index`, or `None` when already at (or past) the last ring.
    pub fn next_index(index: usize) -> Option<usize> {
        index.checked_add(1).filter(|next| *next < Self::COUNT)
    }

    /// Whether `index` points at the final ring.
    pub fn is_final(index: usize) -> bool {
        index >= Self::COUNT - 1
    }

    /// Index one ring back, saturating at the first ring.
    pub fn previous_index(index: usize) -> usize {
        index.saturating_sub(1)
    }

    /// Wire label for this ring.
    pub fn as_str(self) -> &'static str {
        match self {
            Ring::Pilot => "pilot",
            Ring::Five => "five",
            Ring::Twentyfive => "twentyfive",
            Ring::All => "all",
        }
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_at_agree() {
        for (i, ring) in Ring::ALL.iter().enumerate() {
            assert_eq!(ring.index(), i);
            assert_eq!(Ring::at(i).unwrap(), *ring);
        }
    }

    #[test]
    fn at_rejects_out_of_range() {
        assert_eq!(
            Ring::at(4),
            Err(CoreError::OutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn next_index_stops_at_last_ring() {
        assert_eq!(Ring::next_index(0), Some(1));
        assert_eq!(Ring::next_index(2), Some(3));
        assert_eq!(Ring::next_index(3), None);
        assert_eq!(Ring::next_index(17), None);
        assert_eq!(Ring::next_index(usize::MAX), None);
    }

    #[test]
    fn final_ring_detection() {
        assert!(!Ring::is_final(0));
        assert!(!Ring::is_final(2));
        assert!(Ring::is_final(3));
        assert!(Ring::is_final(usize::MAX));
    }

    #[test]
    fn previous_index_saturates() {
        assert_eq!(Ring::previous_index(0), 0);
        assert_eq!(Ring::previous_index(3), 2);
    }

    #[test]
    fn serde_uses_lowercase_labels() {
        assert_eq!(serde_json::to_string(&Ring::Twentyfive).unwrap(), "\"twentyfive\"");
        let ring: Ring = serde_json::from_str("\"pilot\"").unwrap();
        assert_eq!(ring, Ring::Pilot);
        assert!(serde_json::from_str::<Ring>("\"ten\"").is_err());
    }
}
