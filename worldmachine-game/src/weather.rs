//! Weather states and their per-resource generation modifiers.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{CHAOTIC_VARIANCE_MAX, CHAOTIC_VARIANCE_MIN};
use crate::resources::ResourceId;

/// Weather conditions a world can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Weather {
    #[default]
    Calm,
    Stormy,
    Chaotic,
    Serene,
    Turbulent,
}

/// Canonical order used for uniform weather rotation.
pub const WEATHER_ORDER: [Weather; 5] = [
    Weather::Calm,
    Weather::Stormy,
    Weather::Chaotic,
    Weather::Serene,
    Weather::Turbulent,
];

impl Weather {
    /// Stable save-file key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Calm => "calm",
            Self::Stormy => "stormy",
            Self::Chaotic => "chaotic",
            Self::Serene => "serene",
            Self::Turbulent => "turbulent",
        }
    }

    /// Fixed per-resource multiplier for this weather state.
    ///
    /// Chaotic carries no fixed heat/fuel multiplier here; those two move
    /// together through the shared variance roll instead.
    #[must_use]
    pub fn multiplier(self, resource: ResourceId) -> f64 {
        match (self, resource) {
            (Self::Calm, ResourceId::Stability) => 1.1,
            (Self::Stormy, ResourceId::Heat | ResourceId::Fuel) => 0.9,
            (Self::Stormy, ResourceId::Pressure) => 1.2,
            (Self::Chaotic, ResourceId::Pressure) => 1.15,
            (Self::Chaotic, ResourceId::Stability) => 0.7,
            (Self::Serene, ResourceId::Stability) => 1.3,
            (Self::Serene, ResourceId::Heat | ResourceId::Fuel) => 1.05,
            (Self::Turbulent, ResourceId::Pressure) => 1.3,
            (Self::Turbulent, ResourceId::Stability) => 0.8,
            _ => 1.0,
        }
    }

    /// Additive stability adjustment used by the stability base formula.
    #[must_use]
    pub const fn stability_adjustment(self) -> f64 {
        match self {
            Self::Calm | Self::Serene => 0.5,
            Self::Stormy | Self::Chaotic => -0.3,
            Self::Turbulent => -0.1,
        }
    }
}

/// Variance rolled once per generation call under Chaotic weather.
///
/// The same sign and magnitude apply to heat and fuel so the two resources
/// move together within a single call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChaoticVariance {
    pub factor: f64,
}

impl ChaoticVariance {
    /// Roll a fresh variance: swing of 25-75%, positive or negative.
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let magnitude = rng.gen_range(CHAOTIC_VARIANCE_MIN..=CHAOTIC_VARIANCE_MAX);
        let positive = rng.r#gen::<bool>();
        let factor = if positive {
            1.0 + magnitude
        } else {
            1.0 - magnitude
        };
        Self { factor }
    }

    /// Neutral variance for non-chaotic weather.
    #[must_use]
    pub const fn neutral() -> Self {
        Self { factor: 1.0 }
    }

    /// Whether this variance applies to the given resource.
    #[must_use]
    pub fn applies_to(resource: ResourceId) -> bool {
        matches!(resource, ResourceId::Heat | ResourceId::Fuel)
    }
}

/// Pick the next weather state uniformly, excluding the current one.
pub fn rotate_weather<R: Rng + ?Sized>(current: Weather, rng: &mut R) -> Weather {
    let candidates: Vec<Weather> = WEATHER_ORDER
        .into_iter()
        .filter(|weather| *weather != current)
        .collect();
    candidates[rng.gen_range(0..candidates.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn chaotic_variance_stays_in_bounds() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..200 {
            let variance = ChaoticVariance::roll(&mut rng);
            let swing = (variance.factor - 1.0).abs();
            assert!(
                (CHAOTIC_VARIANCE_MIN..=CHAOTIC_VARIANCE_MAX).contains(&swing),
                "swing {swing} out of range"
            );
        }
    }

    #[test]
    fn variance_targets_heat_and_fuel_only() {
        assert!(ChaoticVariance::applies_to(ResourceId::Heat));
        assert!(ChaoticVariance::applies_to(ResourceId::Fuel));
        assert!(!ChaoticVariance::applies_to(ResourceId::Pressure));
        assert!(!ChaoticVariance::applies_to(ResourceId::Crystal));
    }

    #[test]
    fn rotation_never_repeats_current() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..50 {
            let next = rotate_weather(Weather::Chaotic, &mut rng);
            assert_ne!(next, Weather::Chaotic);
        }
    }

    #[test]
    fn serene_favors_stability() {
        assert!(Weather::Serene.multiplier(ResourceId::Stability) > 1.0);
        assert!(Weather::Turbulent.multiplier(ResourceId::Stability) < 1.0);
        assert!((Weather::Calm.multiplier(ResourceId::Heat) - 1.0).abs() < f64::EPSILON);
    }
}
