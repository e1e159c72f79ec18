use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::Angle;

/// Per-angle ply count table.
///
/// A fixed four-element array indexed by [`Angle::index`]. The sum of the
/// counts defines the length of any sequence built from the table.
///
/// Serializes as a degree → count map (`{"0": 12, "90": 8, ...}`) to match
/// the payload shape callers exchange.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlyCounts([usize; Angle::LEN]);

impl PlyCounts {
    /// Empty table (all counts zero).
    #[must_use]
    pub const fn new() -> Self {
        Self([0; Angle::LEN])
    }

    /// Builds a table from `(angle, count)` pairs; unmentioned angles are zero.
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Angle, usize)>,
    {
        let mut counts = Self::new();
        for (angle, count) in pairs {
            counts.0[angle.index()] = count;
        }
        counts
    }

    /// Tallies the plies of a sequence.
    #[must_use]
    pub fn from_sequence(sequence: &[Angle]) -> Self {
        let mut counts = Self::new();
        for &angle in sequence {
            counts.0[angle.index()] += 1;
        }
        counts
    }

    /// Count for one angle.
    #[inline]
    #[must_use]
    pub const fn get(&self, angle: Angle) -> usize {
        self.0[angle.index()]
    }

    /// Sets the count for one angle.
    pub const fn set(&mut self, angle: Angle, count: usize) {
        self.0[angle.index()] = count;
    }

    /// Total ply count (sequence length).
    #[must_use]
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    /// Whether all counts are zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&c| c == 0)
    }

    /// Combined count of +45° and −45° plies.
    #[must_use]
    pub const fn diagonal_total(&self) -> usize {
        self.get(Angle::Plus45) + self.get(Angle::Minus45)
    }

    /// Componentwise `self[a] <= other[a]` for every angle.
    ///
    /// This is the drop-off feasibility relation: a child zone fits within
    /// its parent exactly when its table fits within the parent's.
    #[must_use]
    pub fn fits_within(&self, other: &Self) -> bool {
        Angle::ALL.iter().all(|&a| self.get(a) <= other.get(a))
    }

    /// Iterates `(angle, count)` in canonical table order.
    pub fn iter(&self) -> impl Iterator<Item = (Angle, usize)> + '_ {
        Angle::ALL.iter().map(|&a| (a, self.get(a)))
    }
}

impl fmt::Display for PlyCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (angle, count) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{angle}: {count}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for PlyCounts {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.iter().map(|(a, c)| (a.degrees(), c)))
    }
}

impl<'de> Deserialize<'de> for PlyCounts {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = BTreeMap::<i32, usize>::deserialize(deserializer)?;
        let mut counts = Self::new();
        for (degrees, count) in map {
            let angle = Angle::from_degrees(degrees)
                .ok_or_else(|| de::Error::custom(format!("unsupported ply angle: {degrees}")))?;
            counts.set(angle, count);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sequence_tallies_every_angle() {
        let seq = vec![
            Angle::Plus45,
            Angle::Minus45,
            Angle::Zero,
            Angle::Zero,
            Angle::Ninety,
            Angle::Minus45,
            Angle::Plus45,
        ];
        let counts = PlyCounts::from_sequence(&seq);
        assert_eq!(counts.get(Angle::Zero), 2);
        assert_eq!(counts.get(Angle::Ninety), 1);
        assert_eq!(counts.get(Angle::Plus45), 2);
        assert_eq!(counts.get(Angle::Minus45), 2);
        assert_eq!(counts.total(), 7);
    }

    #[test]
    fn test_fits_within_is_componentwise() {
        let parent = PlyCounts::from_pairs([
            (Angle::Zero, 8),
            (Angle::Ninety, 8),
            (Angle::Plus45, 8),
            (Angle::Minus45, 8),
        ]);
        let child = PlyCounts::from_pairs([
            (Angle::Zero, 8),
            (Angle::Ninety, 8),
            (Angle::Plus45, 7),
            (Angle::Minus45, 7),
        ]);
        assert!(child.fits_within(&parent));
        assert!(!parent.fits_within(&child));
        assert!(parent.fits_within(&parent));
    }

    #[test]
    fn test_serde_degree_map() {
        let counts = PlyCounts::from_pairs([
            (Angle::Zero, 12),
            (Angle::Ninety, 8),
            (Angle::Plus45, 8),
            (Angle::Minus45, 8),
        ]);
        let json = serde_json::to_value(counts).unwrap();
        assert_eq!(json["0"], 12);
        assert_eq!(json["-45"], 8);

        let parsed: PlyCounts =
            serde_json::from_str(r#"{"0": 12, "90": 8, "45": 8, "-45": 8}"#).unwrap();
        assert_eq!(parsed, counts);

        assert!(serde_json::from_str::<PlyCounts>(r#"{"30": 4}"#).is_err());
    }
}
