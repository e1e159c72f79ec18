use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// The eight soft lamination rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// R1 — mirror symmetry about the mid-plane.
    Symmetry,
    /// R2 — equal +45°/−45° counts.
    Balance,
    /// R3 — every angle within 8–67% of the stack.
    Percentage,
    /// R4 — quality of the outer ply pairs.
    ExternalPlies,
    /// R5 — even spread of each angle along the stack.
    Distribution,
    /// R6 — short runs of identical plies.
    Grouping,
    /// R7 — ±45° away from the mid-plane.
    Buckling,
    /// R8 — 90° away from the mid-plane.
    LateralBending,
}

impl Rule {
    /// Number of rules.
    pub const LEN: usize = 8;

    /// All rules in R1..R8 order.
    pub const ALL: [Self; Self::LEN] = [
        Self::Symmetry,
        Self::Balance,
        Self::Percentage,
        Self::ExternalPlies,
        Self::Distribution,
        Self::Grouping,
        Self::Buckling,
        Self::LateralBending,
    ];

    /// Position in R1..R8 order.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Symmetry => 0,
            Self::Balance => 1,
            Self::Percentage => 2,
            Self::ExternalPlies => 3,
            Self::Distribution => 4,
            Self::Grouping => 5,
            Self::Buckling => 6,
            Self::LateralBending => 7,
        }
    }

    /// Short identifier (`"R1"` .. `"R8"`), used as the breakdown map key.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Symmetry => "R1",
            Self::Balance => "R2",
            Self::Percentage => "R3",
            Self::ExternalPlies => "R4",
            Self::Distribution => "R5",
            Self::Grouping => "R6",
            Self::Buckling => "R7",
            Self::LateralBending => "R8",
        }
    }

    /// Parses a short identifier.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rule| rule.id() == id)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for Rule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = String::deserialize(deserializer)?;
        Self::from_id(&id).ok_or_else(|| de::Error::custom(format!("unknown rule: {id}")))
    }
}

/// Per-rule weight table.
///
/// The defaults sum to 100, which makes the maximum total score 100 by
/// construction. Callers may supply their own table (e.g. to emphasize
/// grouping over buckling); every scoring path uses whatever table the
/// optimizer is holding.
///
/// Deserializes from a partial `{"R1": 18.0, ...}` map: mentioned rules
/// override the defaults, unmentioned rules keep them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleWeights([f64; Rule::LEN]);

impl RuleWeights {
    /// The default weight table (sums to 100).
    pub const DEFAULT: Self = Self([18.0, 12.0, 13.0, 12.0, 14.0, 20.5, 3.5, 7.0]);

    /// Weight of one rule.
    #[inline]
    #[must_use]
    pub const fn get(&self, rule: Rule) -> f64 {
        self.0[rule.index()]
    }

    /// Overrides the weight of one rule.
    pub const fn set(&mut self, rule: Rule, weight: f64) {
        self.0[rule.index()] = weight;
    }

    /// Sum of all weights — the maximum achievable total score.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Iterates `(rule, weight)` in R1..R8 order.
    pub fn iter(&self) -> impl Iterator<Item = (Rule, f64)> + '_ {
        Rule::ALL.iter().map(|&rule| (rule, self.get(rule)))
    }
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Serialize for RuleWeights {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.iter().map(|(rule, weight)| (rule.id(), weight)))
    }
}

impl<'de> Deserialize<'de> for RuleWeights {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = BTreeMap::<String, f64>::deserialize(deserializer)?;
        let mut weights = Self::DEFAULT;
        for (id, weight) in map {
            let rule = Rule::from_id(&id)
                .ok_or_else(|| de::Error::custom(format!("unknown rule: {id}")))?;
            weights.set(rule, weight);
        }
        Ok(weights)
    }
}
