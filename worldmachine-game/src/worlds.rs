//! Static world catalog, environments, special effects, and unlock scanning.
//!
//! Worlds follow the structured-progression model: a fixed catalog of named
//! planets ordered by id, each with unlock requirements over current resource
//! amounts. Unlocking is permanent and consumes the requirement exactly once.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::resources::{CapPolicy, ResourceDelta, ResourceId, ResourceLedger};
use crate::weather::Weather;

/// Per-resource generation coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenRate {
    pub base: f64,
    #[serde(default = "GenRate::default_multiplier")]
    pub multiplier: f64,
}

impl GenRate {
    const fn default_multiplier() -> f64 {
        1.0
    }

    #[must_use]
    pub const fn new(base: f64, multiplier: f64) -> Self {
        Self { base, multiplier }
    }
}

/// Environmental properties of a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub gravity: f64,
    pub time_speed: f64,
    /// Surface temperature in degrees C.
    pub temperature: f64,
    /// Atmosphere density, 0-100.
    pub atmosphere: f64,
    pub weather: Weather,
    /// Ticks between weather rotations.
    pub weather_countdown: u32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            gravity: 1.0,
            time_speed: 1.0,
            temperature: 20.0,
            atmosphere: 50.0,
            weather: Weather::Calm,
            weather_countdown: 60,
        }
    }
}

/// Closed set of behavioral modifiers a world can carry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecialEffect {
    /// Flat multiplier on one resource's yields.
    FlatBoost { resource: ResourceId, factor: f64 },
    /// Uniform 0.5-2.0x factor rolled once per generation call.
    RandomYield,
    /// Part of the stone and ice yield is compressed into crystal.
    Compression,
    /// Yields scale with the number of worlds created so far.
    AdaptiveLearning,
    /// Multiplies the finite caps (pressure, energy, stability).
    CapBoost { factor: f64 },
    /// Removes all resource caps while this world is current.
    CapRemoval,
}

impl SpecialEffect {
    /// Cap policy contribution of this effect.
    #[must_use]
    pub fn cap_policy(self) -> CapPolicy {
        match self {
            Self::CapBoost { factor } => CapPolicy {
                multiplier: factor,
                removed: false,
            },
            Self::CapRemoval => CapPolicy {
                multiplier: 1.0,
                removed: true,
            },
            _ => CapPolicy::default(),
        }
    }
}

/// A catalog entry describing one world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDef {
    pub id: u32,
    pub name: String,
    /// Progression tier, 1-based.
    pub tier: u8,
    /// All listed resources must meet their threshold to unlock.
    #[serde(default)]
    pub unlock: ResourceDelta,
    /// Per-resource generation table for this world.
    #[serde(default)]
    pub generation: BTreeMap<ResourceId, GenRate>,
    pub environment: Environment,
    #[serde(default)]
    pub special: Option<SpecialEffect>,
}

impl WorldDef {
    /// Whether the unlock requirement is fully satisfied by current amounts.
    #[must_use]
    pub fn requirement_met(&self, ledger: &ResourceLedger) -> bool {
        ledger.can_afford(&self.unlock)
    }
}

/// Append-only record of a world selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldHistoryEntry {
    pub world_id: u32,
    pub timestamp_ms: u64,
    /// Playtime seconds at unlock, used by speed-run achievements.
    #[serde(default)]
    pub playtime_seconds: u64,
    pub environment: Environment,
}

/// The full static catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldCatalog {
    pub worlds: Vec<WorldDef>,
}

impl WorldCatalog {
    /// Look up a world by id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&WorldDef> {
        self.worlds.iter().find(|world| world.id == id)
    }

    /// First not-yet-unlocked world whose requirement is met, by ascending id.
    ///
    /// The scan order is fixed; ties are impossible because ids are unique,
    /// and eligible worlds are never chosen at random.
    #[must_use]
    pub fn next_unlockable(
        &self,
        ledger: &ResourceLedger,
        unlocked: &BTreeSet<u32>,
    ) -> Option<&WorldDef> {
        self.worlds
            .iter()
            .filter(|world| !unlocked.contains(&world.id))
            .find(|world| world.requirement_met(ledger))
    }

    /// Number of unlocked worlds in a given tier.
    #[must_use]
    pub fn unlocked_in_tier(&self, unlocked: &BTreeSet<u32>, tier: u8) -> usize {
        self.worlds
            .iter()
            .filter(|world| world.tier == tier && unlocked.contains(&world.id))
            .count()
    }

    /// Number of distinct tiers with at least one unlocked world.
    #[must_use]
    pub fn distinct_unlocked_tiers(&self, unlocked: &BTreeSet<u32>) -> usize {
        let tiers: BTreeSet<u8> = self
            .worlds
            .iter()
            .filter(|world| unlocked.contains(&world.id))
            .map(|world| world.tier)
            .collect();
        tiers.len()
    }

    /// Load a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into valid world data.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The built-in catalog of named worlds.
    #[must_use]
    pub fn default_catalog() -> Self {
        let worlds = vec![
            WorldDef {
                id: 0,
                name: String::from("Desert Planet"),
                tier: 1,
                unlock: ResourceDelta::new(),
                generation: BTreeMap::from([
                    (ResourceId::Heat, GenRate::new(5.0, 1.0)),
                    (ResourceId::Fuel, GenRate::new(3.0, 1.0)),
                    (ResourceId::Pressure, GenRate::new(0.0, 1.0)),
                    (ResourceId::Stability, GenRate::new(0.0, 1.0)),
                ]),
                environment: Environment {
                    gravity: 1.0,
                    time_speed: 1.0,
                    temperature: 85.0,
                    atmosphere: 20.0,
                    weather: Weather::Calm,
                    weather_countdown: 60,
                },
                special: None,
            },
            WorldDef {
                id: 1,
                name: String::from("Ocean Planet"),
                tier: 1,
                unlock: BTreeMap::from([(ResourceId::Heat, 50.0), (ResourceId::Fuel, 25.0)]),
                generation: BTreeMap::from([
                    (ResourceId::Heat, GenRate::new(4.0, 1.0)),
                    (ResourceId::Fuel, GenRate::new(4.0, 1.0)),
                    (ResourceId::Water, GenRate::new(6.0, 1.0)),
                    (ResourceId::Pressure, GenRate::new(0.0, 1.0)),
                    (ResourceId::Stability, GenRate::new(0.0, 1.2)),
                ]),
                environment: Environment {
                    gravity: 1.1,
                    time_speed: 1.0,
                    temperature: 15.0,
                    atmosphere: 75.0,
                    weather: Weather::Serene,
                    weather_countdown: 75,
                },
                special: Some(SpecialEffect::FlatBoost {
                    resource: ResourceId::Water,
                    factor: 1.5,
                }),
            },
            WorldDef {
                id: 2,
                name: String::from("Jungle Planet"),
                tier: 2,
                unlock: BTreeMap::from([(ResourceId::Heat, 150.0), (ResourceId::Water, 60.0)]),
                generation: BTreeMap::from([
                    (ResourceId::Fuel, GenRate::new(6.0, 1.0)),
                    (ResourceId::Oxygen, GenRate::new(7.0, 1.0)),
                    (ResourceId::Water, GenRate::new(4.0, 1.0)),
                    (ResourceId::Stability, GenRate::new(0.0, 1.0)),
                ]),
                environment: Environment {
                    gravity: 0.95,
                    time_speed: 1.1,
                    temperature: 32.0,
                    atmosphere: 88.0,
                    weather: Weather::Stormy,
                    weather_countdown: 45,
                },
                special: Some(SpecialEffect::AdaptiveLearning),
            },
            WorldDef {
                id: 3,
                name: String::from("Mountain Planet"),
                tier: 2,
                unlock: BTreeMap::from([
                    (ResourceId::Heat, 200.0),
                    (ResourceId::Fuel, 120.0),
                    (ResourceId::Oxygen, 40.0),
                ]),
                generation: BTreeMap::from([
                    (ResourceId::Stone, GenRate::new(8.0, 1.0)),
                    (ResourceId::Heat, GenRate::new(3.0, 1.0)),
                    (ResourceId::Pressure, GenRate::new(0.0, 1.3)),
                    (ResourceId::Stability, GenRate::new(0.0, 1.0)),
                ]),
                environment: Environment {
                    gravity: 1.6,
                    time_speed: 0.9,
                    temperature: 5.0,
                    atmosphere: 40.0,
                    weather: Weather::Turbulent,
                    weather_countdown: 50,
                },
                special: Some(SpecialEffect::CapBoost { factor: 2.0 }),
            },
            WorldDef {
                id: 4,
                name: String::from("Volcanic Planet"),
                tier: 3,
                unlock: BTreeMap::from([(ResourceId::Stone, 150.0), (ResourceId::Pressure, 60.0)]),
                generation: BTreeMap::from([
                    (ResourceId::Magma, GenRate::new(9.0, 1.0)),
                    (ResourceId::Heat, GenRate::new(12.0, 1.0)),
                    (ResourceId::Pressure, GenRate::new(0.0, 1.5)),
                    (ResourceId::Stability, GenRate::new(0.0, 0.8)),
                ]),
                environment: Environment {
                    gravity: 1.3,
                    time_speed: 1.2,
                    temperature: 320.0,
                    atmosphere: 25.0,
                    weather: Weather::Chaotic,
                    weather_countdown: 30,
                },
                special: Some(SpecialEffect::RandomYield),
            },
            WorldDef {
                id: 5,
                name: String::from("Frozen Planet"),
                tier: 3,
                unlock: BTreeMap::from([(ResourceId::Water, 150.0), (ResourceId::Energy, 50.0)]),
                generation: BTreeMap::from([
                    (ResourceId::Ice, GenRate::new(8.0, 1.0)),
                    (ResourceId::Fuel, GenRate::new(5.0, 1.0)),
                    (ResourceId::Water, GenRate::new(3.0, 1.0)),
                    (ResourceId::Stability, GenRate::new(0.0, 1.4)),
                ]),
                environment: Environment {
                    gravity: 0.8,
                    time_speed: 0.8,
                    temperature: -40.0,
                    atmosphere: 55.0,
                    weather: Weather::Calm,
                    weather_countdown: 80,
                },
                special: Some(SpecialEffect::FlatBoost {
                    resource: ResourceId::Ice,
                    factor: 1.4,
                }),
            },
            WorldDef {
                id: 6,
                name: String::from("Crystal Caverns"),
                tier: 4,
                unlock: BTreeMap::from([(ResourceId::Magma, 120.0), (ResourceId::Ice, 120.0)]),
                generation: BTreeMap::from([
                    (ResourceId::Crystal, GenRate::new(6.0, 1.0)),
                    (ResourceId::Stone, GenRate::new(5.0, 1.0)),
                    (ResourceId::Ice, GenRate::new(4.0, 1.0)),
                    (ResourceId::Stability, GenRate::new(0.0, 1.1)),
                ]),
                environment: Environment {
                    gravity: 1.05,
                    time_speed: 1.0,
                    temperature: -5.0,
                    atmosphere: 35.0,
                    weather: Weather::Serene,
                    weather_countdown: 70,
                },
                special: Some(SpecialEffect::Compression),
            },
            WorldDef {
                id: 7,
                name: String::from("Void Reach"),
                tier: 4,
                unlock: BTreeMap::from([
                    (ResourceId::Crystal, 200.0),
                    (ResourceId::Stability, 80.0),
                ]),
                generation: BTreeMap::from([
                    (ResourceId::VoidEnergy, GenRate::new(5.0, 1.0)),
                    (ResourceId::Crystal, GenRate::new(3.0, 1.0)),
                    (ResourceId::Pressure, GenRate::new(0.0, 1.0)),
                    (ResourceId::Stability, GenRate::new(0.0, 0.9)),
                ]),
                environment: Environment {
                    gravity: 0.3,
                    time_speed: 1.5,
                    temperature: -270.0,
                    atmosphere: 2.0,
                    weather: Weather::Turbulent,
                    weather_countdown: 40,
                },
                special: Some(SpecialEffect::CapRemoval),
            },
        ];
        Self { worlds }
    }
}
