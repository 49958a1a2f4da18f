use serde::{Deserialize, Serialize};

/// How much behavioural history a user has.
///
/// One classification drives both the profile/behaviour vector blend and the
/// adaptive exploration strategy. The two call sites count interactions from
/// different sources (the request's interaction log vs. the user's row in the
/// CF interaction matrix), so the same user can land in different tiers on
/// the two paths until the CF model is retrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaturityTier {
    ColdStart,
    Growing,
    Mature,
}

impl MaturityTier {
    pub const GROWING_FROM: usize = 5;
    pub const MATURE_FROM: usize = 20;

    pub fn from_interaction_count(count: usize) -> Self {
        if count < Self::GROWING_FROM {
            MaturityTier::ColdStart
        } else if count < Self::MATURE_FROM {
            MaturityTier::Growing
        } else {
            MaturityTier::Mature
        }
    }

    /// `(profile_weight, behavior_weight)` for the user-vector blend.
    pub fn blend_weights(&self) -> (f32, f32) {
        match self {
            MaturityTier::ColdStart => (0.9, 0.1),
            MaturityTier::Growing => (0.6, 0.4),
            MaturityTier::Mature => (0.3, 0.7),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaturityTier::ColdStart => "cold_start",
            MaturityTier::Growing => "growing",
            MaturityTier::Mature => "mature",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_and_weights() {
        let cases = [
            (0, (0.9, 0.1)),
            (4, (0.9, 0.1)),
            (5, (0.6, 0.4)),
            (19, (0.6, 0.4)),
            (20, (0.3, 0.7)),
            (100, (0.3, 0.7)),
        ];
        for (count, expected) in cases {
            assert_eq!(
                MaturityTier::from_interaction_count(count).blend_weights(),
                expected,
                "count {}",
                count
            );
        }
    }
}
