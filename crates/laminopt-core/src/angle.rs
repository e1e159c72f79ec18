use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Fibre orientation of a single ply.
///
/// The orientation set is closed: laminates in this system are built from
/// exactly four ply angles. Angles are stored as enum tags, not degrees, so
/// per-angle tables can be plain four-element arrays indexed by
/// [`Angle::index`].
///
/// # Example
///
/// ```
/// use laminopt_core::Angle;
///
/// assert_eq!(Angle::Minus45.degrees(), -45);
/// assert_eq!(Angle::from_degrees(90), Some(Angle::Ninety));
/// assert_eq!(Angle::from_degrees(30), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Angle {
    /// 0° — fibres along the primary load direction.
    Zero,
    /// 90° — fibres across the primary load direction.
    Ninety,
    /// +45° diagonal.
    Plus45,
    /// −45° diagonal.
    Minus45,
}

impl Angle {
    /// Number of distinct ply angles.
    pub const LEN: usize = 4;

    /// All angles in canonical table order (`[0°, 90°, +45°, −45°]`).
    pub const ALL: [Self; Self::LEN] = [Self::Zero, Self::Ninety, Self::Plus45, Self::Minus45];

    /// Position of this angle in the canonical table order.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::Ninety => 1,
            Self::Plus45 => 2,
            Self::Minus45 => 3,
        }
    }

    /// Orientation in degrees.
    #[inline]
    #[must_use]
    pub const fn degrees(self) -> i32 {
        match self {
            Self::Zero => 0,
            Self::Ninety => 90,
            Self::Plus45 => 45,
            Self::Minus45 => -45,
        }
    }

    /// Parses a degree value from the closed set {0, 90, 45, −45}.
    #[must_use]
    pub const fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Zero),
            90 => Some(Self::Ninety),
            45 => Some(Self::Plus45),
            -45 => Some(Self::Minus45),
            _ => None,
        }
    }

    /// Whether this is a ±45° ply.
    #[inline]
    #[must_use]
    pub const fn is_diagonal(self) -> bool {
        matches!(self, Self::Plus45 | Self::Minus45)
    }

    /// Whether this is a 0° or 90° ply.
    ///
    /// 0° and 90° plies must never sit next to each other; several
    /// constraints treat the two as one family.
    #[inline]
    #[must_use]
    pub const fn is_cross(self) -> bool {
        matches!(self, Self::Zero | Self::Ninety)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Serializes as the plain degree value, so sequences read `[45, -45, 0, ...]`.
impl Serialize for Angle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i32(self.degrees())
    }
}

impl<'de> Deserialize<'de> for Angle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let degrees = i32::deserialize(deserializer)?;
        Self::from_degrees(degrees)
            .ok_or_else(|| de::Error::custom(format!("unsupported ply angle: {degrees}")))
    }
}
