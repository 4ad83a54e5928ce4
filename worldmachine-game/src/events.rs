//! Random events: rolling, rarity tiers, choices, and timed effects.
//!
//! Event lifecycle: a qualifying action rolls against a stability-shifted
//! chance, picks a rarity tier, then a uniform event within the tier. The
//! player resolves one choice; timed effects join the active set and count
//! down by one per qualifying action or tick until removal.

use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::{
    EVENT_BASE_CHANCE, EVENT_NEGATIVE_BASE, EVENT_NEGATIVE_FLOOR, EVENT_PERMANENT_DURATION,
    EVENT_STABILITY_SWING,
};
use crate::resources::{CapPolicy, ResourceDelta, ResourceId, ResourceLedger};

/// Rarity tiers in cumulative-table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rarity {
    Negative,
    Common,
    Uncommon,
    Rare,
    UltraRare,
}

/// The tagged effect a choice executes when picked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ChoiceEffect {
    /// Immediate resource grant (negative amounts are costs).
    Grant { deltas: ResourceDelta },
    /// Multiplier over a set of resources for a number of turns.
    /// A duration of -1 folds the factor into permanent efficiency instead.
    TimedModifier {
        resources: SmallVec<[ResourceId; 4]>,
        factor: f64,
        duration: i32,
    },
    /// Permanent bonus increments, applied once.
    PermanentBonus {
        #[serde(default)]
        efficiency_bonus: f64,
        #[serde(default)]
        cost_reduction_bonus: f64,
    },
    /// Pay a cost to avoid a penalty; the penalty lands if unaffordable.
    Mitigate {
        cost: ResourceDelta,
        penalty: ResourceDelta,
    },
}

/// One selectable choice on an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventChoice {
    pub label: String,
    pub effect: ChoiceEffect,
}

/// A catalog entry describing one random event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDef {
    pub name: String,
    pub rarity: Rarity,
    pub description: String,
    pub choices: Vec<EventChoice>,
}

/// A timed modifier currently in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEvent {
    pub name: String,
    pub resources: SmallVec<[ResourceId; 4]>,
    pub factor: f64,
    pub remaining: i32,
    pub original_duration: i32,
}

impl ActiveEvent {
    /// Whether this modifier touches the given resource.
    #[must_use]
    pub fn applies_to(&self, resource: ResourceId) -> bool {
        self.resources.contains(&resource)
    }
}

/// Permanent gains produced by resolving a choice, for the caller to fold
/// into the permanent-bonus state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PermanentGain {
    pub efficiency_bonus: f64,
    pub cost_reduction_bonus: f64,
}

impl PermanentGain {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.efficiency_bonus == 0.0 && self.cost_reduction_bonus == 0.0
    }
}

/// What happened when a choice was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceResolution {
    /// New timed modifier to push onto the active set, if any.
    pub new_active: Option<ActiveEvent>,
    /// Permanent gains to fold into bonuses.
    pub permanent: PermanentGain,
    /// Whether a mitigation cost could not be paid and the penalty landed.
    pub mitigation_failed: bool,
}

/// Chance that a qualifying action rolls an event.
///
/// Stability shifts the base chance linearly, up or down by the swing at
/// the 0 and 100 extremes.
#[must_use]
pub fn event_chance(stability: f64) -> f64 {
    let shift = (stability.clamp(0.0, 100.0) / 100.0 - 0.5) * 2.0 * EVENT_STABILITY_SWING;
    (EVENT_BASE_CHANCE + shift).clamp(0.0, 1.0)
}

/// Probability mass of the negative tier at the given stability.
#[must_use]
pub fn negative_tier_probability(stability: f64) -> f64 {
    (EVENT_NEGATIVE_BASE - stability.clamp(0.0, 100.0) * 0.001).max(EVENT_NEGATIVE_FLOOR)
}

/// Random-event selection and choice resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEngine {
    pub events: Vec<EventDef>,
}

impl EventEngine {
    /// Roll for an event on a qualifying action. Returns the index of the
    /// selected event, or `None` when no event fires.
    pub fn roll_for_event<R: Rng + ?Sized>(&self, stability: f64, rng: &mut R) -> Option<usize> {
        if rng.r#gen::<f64>() >= event_chance(stability) {
            return None;
        }
        let rarity = self.pick_rarity(stability, rng);
        let tier: Vec<usize> = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, def)| def.rarity == rarity)
            .map(|(idx, _)| idx)
            .collect();
        if tier.is_empty() {
            log::warn!("no events defined for rarity tier {rarity:?}");
            return None;
        }
        let picked = tier[rng.gen_range(0..tier.len())];
        log::info!("event rolled: {}", self.events[picked].name);
        Some(picked)
    }

    /// Pick a rarity tier from the fixed cumulative table. The negative
    /// tier's mass shrinks as stability rises; the remainder splits across
    /// the positive tiers in fixed proportions.
    fn pick_rarity<R: Rng + ?Sized>(&self, stability: f64, rng: &mut R) -> Rarity {
        let negative = negative_tier_probability(stability);
        let positive = 1.0 - negative;
        let roll = rng.r#gen::<f64>();
        if roll < negative {
            Rarity::Negative
        } else if roll < negative + positive * 0.55 {
            Rarity::Common
        } else if roll < negative + positive * 0.80 {
            Rarity::Uncommon
        } else if roll < negative + positive * 0.95 {
            Rarity::Rare
        } else {
            Rarity::UltraRare
        }
    }

    /// Look up an event by name (used when resolving a pending choice).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EventDef> {
        self.events.iter().find(|def| def.name == name)
    }

    /// Resolve a choice's effect against the ledger.
    ///
    /// Resource grants and mitigation costs land immediately; timed and
    /// permanent pieces come back in the resolution for the caller to apply.
    pub fn resolve_choice(
        event_name: &str,
        effect: &ChoiceEffect,
        ledger: &mut ResourceLedger,
        caps: &CapPolicy,
    ) -> ChoiceResolution {
        let mut resolution = ChoiceResolution {
            new_active: None,
            permanent: PermanentGain::default(),
            mitigation_failed: false,
        };
        match effect {
            ChoiceEffect::Grant { deltas } => {
                ledger.apply(deltas, caps);
            }
            ChoiceEffect::TimedModifier {
                resources,
                factor,
                duration,
            } => {
                if *duration == EVENT_PERMANENT_DURATION {
                    // Sentinel: fold into permanent efficiency once instead
                    // of keeping timed state around forever.
                    resolution.permanent.efficiency_bonus = (factor - 1.0).max(0.0);
                } else {
                    resolution.new_active = Some(ActiveEvent {
                        name: String::from(event_name),
                        resources: resources.clone(),
                        factor: *factor,
                        remaining: *duration,
                        original_duration: *duration,
                    });
                }
            }
            ChoiceEffect::PermanentBonus {
                efficiency_bonus,
                cost_reduction_bonus,
            } => {
                resolution.permanent.efficiency_bonus = *efficiency_bonus;
                resolution.permanent.cost_reduction_bonus = *cost_reduction_bonus;
            }
            ChoiceEffect::Mitigate { cost, penalty } => {
                if ledger.can_afford(cost) {
                    ledger.subtract(cost, caps);
                } else {
                    resolution.mitigation_failed = true;
                    ledger.apply(penalty, caps);
                }
            }
        }
        resolution
    }

    /// Load an event catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into valid event data.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The built-in event catalog.
    #[must_use]
    pub fn default_catalog() -> Self {
        let events = vec![
            EventDef {
                name: String::from("Pressure Leak"),
                rarity: Rarity::Negative,
                description: String::from("A seal fails and pressure vents into the void."),
                choices: vec![
                    EventChoice {
                        label: String::from("Vent it"),
                        effect: ChoiceEffect::Grant {
                            deltas: ResourceDelta::from([(ResourceId::Pressure, -25.0)]),
                        },
                    },
                    EventChoice {
                        label: String::from("Patch with fuel"),
                        effect: ChoiceEffect::Mitigate {
                            cost: ResourceDelta::from([(ResourceId::Fuel, 20.0)]),
                            penalty: ResourceDelta::from([
                                (ResourceId::Pressure, -40.0),
                                (ResourceId::Stability, -10.0),
                            ]),
                        },
                    },
                ],
            },
            EventDef {
                name: String::from("Coolant Failure"),
                rarity: Rarity::Negative,
                description: String::from("The heat exchangers run dry."),
                choices: vec![
                    EventChoice {
                        label: String::from("Emergency shutdown"),
                        effect: ChoiceEffect::TimedModifier {
                            resources: SmallVec::from_slice(&[ResourceId::Heat, ResourceId::Fuel]),
                            factor: 0.5,
                            duration: 5,
                        },
                    },
                    EventChoice {
                        label: String::from("Dump water reserves"),
                        effect: ChoiceEffect::Mitigate {
                            cost: ResourceDelta::from([(ResourceId::Water, 30.0)]),
                            penalty: ResourceDelta::from([(ResourceId::Heat, -50.0)]),
                        },
                    },
                ],
            },
            EventDef {
                name: String::from("Warm Front"),
                rarity: Rarity::Common,
                description: String::from("Favorable thermals sweep the surface."),
                choices: vec![EventChoice {
                    label: String::from("Ride the front"),
                    effect: ChoiceEffect::TimedModifier {
                        resources: SmallVec::from_slice(&[ResourceId::Heat]),
                        factor: 1.25,
                        duration: 8,
                    },
                }],
            },
            EventDef {
                name: String::from("Fuel Pocket"),
                rarity: Rarity::Common,
                description: String::from("Drilling uncovers a shallow fuel pocket."),
                choices: vec![EventChoice {
                    label: String::from("Tap it"),
                    effect: ChoiceEffect::Grant {
                        deltas: ResourceDelta::from([(ResourceId::Fuel, 35.0)]),
                    },
                }],
            },
            EventDef {
                name: String::from("Stable Orbit"),
                rarity: Rarity::Common,
                description: String::from("The machine settles into a smooth rhythm."),
                choices: vec![EventChoice {
                    label: String::from("Hold steady"),
                    effect: ChoiceEffect::Grant {
                        deltas: ResourceDelta::from([(ResourceId::Stability, 15.0)]),
                    },
                }],
            },
            EventDef {
                name: String::from("Resonance Cascade"),
                rarity: Rarity::Uncommon,
                description: String::from("Generator harmonics align across the board."),
                choices: vec![EventChoice {
                    label: String::from("Amplify"),
                    effect: ChoiceEffect::TimedModifier {
                        resources: SmallVec::from_slice(&[
                            ResourceId::Heat,
                            ResourceId::Fuel,
                            ResourceId::Pressure,
                        ]),
                        factor: 1.5,
                        duration: 6,
                    },
                }],
            },
            EventDef {
                name: String::from("Geothermal Surge"),
                rarity: Rarity::Uncommon,
                description: String::from("Magma channels open beneath the machine."),
                choices: vec![
                    EventChoice {
                        label: String::from("Harvest the surge"),
                        effect: ChoiceEffect::Grant {
                            deltas: ResourceDelta::from([
                                (ResourceId::Heat, 60.0),
                                (ResourceId::Magma, 10.0),
                            ]),
                        },
                    },
                    EventChoice {
                        label: String::from("Channel into pressure"),
                        effect: ChoiceEffect::Grant {
                            deltas: ResourceDelta::from([(ResourceId::Pressure, 30.0)]),
                        },
                    },
                ],
            },
            EventDef {
                name: String::from("Machine Insight"),
                rarity: Rarity::Rare,
                description: String::from("A pattern in the logs reveals a lasting optimization."),
                choices: vec![EventChoice {
                    label: String::from("Apply the insight"),
                    effect: ChoiceEffect::PermanentBonus {
                        efficiency_bonus: 0.05,
                        cost_reduction_bonus: 0.0,
                    },
                }],
            },
            EventDef {
                name: String::from("Salvage Cache"),
                rarity: Rarity::Rare,
                description: String::from("Old machinery yields reusable parts."),
                choices: vec![EventChoice {
                    label: String::from("Strip it down"),
                    effect: ChoiceEffect::PermanentBonus {
                        efficiency_bonus: 0.0,
                        cost_reduction_bonus: 0.03,
                    },
                }],
            },
            EventDef {
                name: String::from("Void Alignment"),
                rarity: Rarity::UltraRare,
                description: String::from("The worlds align and the machine hums in unison."),
                choices: vec![EventChoice {
                    label: String::from("Embrace it"),
                    effect: ChoiceEffect::TimedModifier {
                        resources: SmallVec::from_slice(&[
                            ResourceId::Heat,
                            ResourceId::Fuel,
                            ResourceId::Energy,
                        ]),
                        factor: 1.1,
                        duration: EVENT_PERMANENT_DURATION,
                    },
                }],
            },
        ];
        Self { events }
    }
}

/// Decrement every active modifier by one turn; remove those reaching zero.
/// Returns the names of expired events.
pub fn decrement_active(active: &mut Vec<ActiveEvent>) -> Vec<String> {
    let mut expired = Vec::new();
    active.retain_mut(|event| {
        event.remaining -= 1;
        if event.remaining <= 0 {
            expired.push(event.name.clone());
            false
        } else {
            true
        }
    });
    for name in &expired {
        log::debug!("event expired: {name}");
    }
    expired
}

/// Combined multiplier from all active modifiers touching a resource.
#[must_use]
pub fn event_multiplier(active: &[ActiveEvent], resource: ResourceId) -> f64 {
    active
        .iter()
        .filter(|event| event.applies_to(resource))
        .map(|event| event.factor)
        .product()
}
