//! Upgrade catalog, cost curves, gating, and atomic purchases.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::constants::UPGRADE_COST_GROWTH;
use crate::resources::{CapPolicy, ResourceDelta, ResourceId, ResourceLedger};

/// Identifier for every upgrade.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum UpgradeId {
    HeatGenerator,
    FuelInjector,
    PressureRegulator,
    EnergyCondenser,
    StabilityField,
    ThermalAccelerator,
    FuelSynchronizer,
    PressureValve,
}

impl UpgradeId {
    /// All upgrades in canonical order.
    pub const ALL: [Self; 8] = [
        Self::HeatGenerator,
        Self::FuelInjector,
        Self::PressureRegulator,
        Self::EnergyCondenser,
        Self::StabilityField,
        Self::ThermalAccelerator,
        Self::FuelSynchronizer,
        Self::PressureValve,
    ];

    /// Stable save-file key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::HeatGenerator => "heatGenerator",
            Self::FuelInjector => "fuelInjector",
            Self::PressureRegulator => "pressureRegulator",
            Self::EnergyCondenser => "energyCondenser",
            Self::StabilityField => "stabilityField",
            Self::ThermalAccelerator => "thermalAccelerator",
            Self::FuelSynchronizer => "fuelSynchronizer",
            Self::PressureValve => "pressureValve",
        }
    }

    /// Parse a save-file key back into an id.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.key() == key)
    }
}

impl fmt::Display for UpgradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Threshold condition over a resource amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceGate {
    pub resource: ResourceId,
    pub min: f64,
}

impl ResourceGate {
    #[must_use]
    pub fn passes(&self, ledger: &ResourceLedger) -> bool {
        ledger.amount(self.resource) > self.min
    }
}

/// What an upgrade does and how it is gated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpgradeKind {
    /// Always-active rate boost for one resource.
    Basic {
        resource: ResourceId,
        rate_per_level: f64,
    },
    /// Cross-resource upgrade: must be unlocked first, and only contributes
    /// its multiplier while the activity gate passes.
    Cross {
        resource: ResourceId,
        rate_per_level: f64,
        /// Gate that must pass for the multiplier to apply.
        active_gate: ResourceGate,
        /// Unlock conditions: prerequisite upgrade level and a resource floor.
        unlock_upgrade: UpgradeId,
        unlock_level: u32,
        unlock_resource: ResourceGate,
    },
}

/// A catalog entry describing one upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDef {
    pub id: UpgradeId,
    pub name: String,
    /// Cost at level 0; each level multiplies by the growth factor.
    pub base_cost: ResourceDelta,
    pub max_level: u32,
    pub kind: UpgradeKind,
}

impl UpgradeDef {
    /// Cost of the next level given the current level.
    ///
    /// Cost is always recomputed, never stored: `floor(base * growth^level)`,
    /// scaled by the permanent cost-reduction multiplier.
    #[must_use]
    pub fn cost_at(&self, level: u32, cost_reduction: f64) -> ResourceDelta {
        let growth = UPGRADE_COST_GROWTH.powi(i32::try_from(level).unwrap_or(i32::MAX));
        self.base_cost
            .iter()
            .map(|(&resource, &base)| {
                (resource, (base * growth * cost_reduction.max(0.0)).floor())
            })
            .collect()
    }

    /// The resource whose generation this upgrade boosts.
    #[must_use]
    pub const fn target_resource(&self) -> ResourceId {
        match &self.kind {
            UpgradeKind::Basic { resource, .. } | UpgradeKind::Cross { resource, .. } => *resource,
        }
    }

    /// Whether this is a cross-resource upgrade.
    #[must_use]
    pub const fn is_cross(&self) -> bool {
        matches!(self.kind, UpgradeKind::Cross { .. })
    }
}

/// Player-side upgrade progress layered over the static catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UpgradeProgress {
    /// Current level per upgrade.
    #[serde(default)]
    pub levels: BTreeMap<UpgradeId, u32>,
    /// Cross-resource upgrades whose unlock gates have been satisfied.
    #[serde(default)]
    pub cross_unlocked: BTreeSet<UpgradeId>,
}

impl UpgradeProgress {
    #[must_use]
    pub fn level(&self, id: UpgradeId) -> u32 {
        self.levels.get(&id).copied().unwrap_or(0)
    }

    /// Ensure every upgrade has a level entry (used after loading old saves).
    pub fn normalize(&mut self) {
        for id in UpgradeId::ALL {
            self.levels.entry(id).or_insert(0);
        }
    }
}

/// Typed outcome of a purchase attempt. Insufficient funds is normal control
/// flow, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    Purchased { new_level: u32, paid: ResourceDelta },
    Insufficient { shortfall: ResourceDelta },
    MaxLevel,
    Locked,
}

/// The full static upgrade catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeCatalog {
    pub upgrades: Vec<UpgradeDef>,
}

impl UpgradeCatalog {
    /// Look up an upgrade definition.
    #[must_use]
    pub fn get(&self, id: UpgradeId) -> Option<&UpgradeDef> {
        self.upgrades.iter().find(|def| def.id == id)
    }

    /// Basic (non-cross) upgrade definitions.
    pub fn basics(&self) -> impl Iterator<Item = &UpgradeDef> {
        self.upgrades.iter().filter(|def| !def.is_cross())
    }

    /// Refresh which cross upgrades are unlocked. Unlocks are permanent:
    /// the gate is only ever added to, never removed.
    /// Returns the newly unlocked ids.
    pub fn refresh_cross_unlocks(
        &self,
        progress: &mut UpgradeProgress,
        ledger: &ResourceLedger,
    ) -> Vec<UpgradeId> {
        let mut newly = Vec::new();
        for def in &self.upgrades {
            let UpgradeKind::Cross {
                unlock_upgrade,
                unlock_level,
                unlock_resource,
                ..
            } = &def.kind
            else {
                continue;
            };
            if progress.cross_unlocked.contains(&def.id) {
                continue;
            }
            if progress.level(*unlock_upgrade) >= *unlock_level && unlock_resource.passes(ledger) {
                progress.cross_unlocked.insert(def.id);
                newly.push(def.id);
                log::info!("cross upgrade unlocked: {}", def.id);
            }
        }
        newly
    }

    /// Attempt to purchase one level of an upgrade.
    ///
    /// The purchase is atomic: the cost is deducted and the level incremented
    /// together, or nothing changes at all.
    pub fn purchase(
        &self,
        id: UpgradeId,
        progress: &mut UpgradeProgress,
        ledger: &mut ResourceLedger,
        caps: &CapPolicy,
        cost_reduction: f64,
    ) -> PurchaseOutcome {
        let Some(def) = self.get(id) else {
            debug_assert!(false, "unknown upgrade id {id}");
            return PurchaseOutcome::Locked;
        };
        if def.is_cross() && !progress.cross_unlocked.contains(&id) {
            return PurchaseOutcome::Locked;
        }
        let level = progress.level(id);
        if level >= def.max_level {
            return PurchaseOutcome::MaxLevel;
        }
        let cost = def.cost_at(level, cost_reduction);
        if !ledger.can_afford(&cost) {
            return PurchaseOutcome::Insufficient {
                shortfall: ledger.shortfall(&cost),
            };
        }
        ledger.subtract(&cost, caps);
        let new_level = level + 1;
        progress.levels.insert(id, new_level);
        log::debug!("purchased {id} -> level {new_level}");
        PurchaseOutcome::Purchased {
            new_level,
            paid: cost,
        }
    }

    /// Combined multiplier all upgrades contribute to a resource's yield.
    ///
    /// Basic upgrades always contribute `1 + level * rate`; cross upgrades
    /// contribute only when unlocked and their activity gate passes.
    #[must_use]
    pub fn yield_multiplier(
        &self,
        resource: ResourceId,
        progress: &UpgradeProgress,
        ledger: &ResourceLedger,
    ) -> f64 {
        let mut combined = 1.0;
        for def in &self.upgrades {
            if def.target_resource() != resource {
                continue;
            }
            let level = progress.level(def.id);
            if level == 0 {
                continue;
            }
            match &def.kind {
                UpgradeKind::Basic { rate_per_level, .. } => {
                    combined *= 1.0 + f64::from(level) * rate_per_level;
                }
                UpgradeKind::Cross {
                    rate_per_level,
                    active_gate,
                    ..
                } => {
                    if progress.cross_unlocked.contains(&def.id) && active_gate.passes(ledger) {
                        combined *= 1.0 + f64::from(level) * rate_per_level;
                    }
                }
            }
        }
        combined
    }

    /// Load a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into valid upgrade data.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The built-in upgrade catalog.
    #[must_use]
    pub fn default_catalog() -> Self {
        let upgrades = vec![
            UpgradeDef {
                id: UpgradeId::HeatGenerator,
                name: String::from("Heat Generator"),
                base_cost: BTreeMap::from([(ResourceId::Heat, 10.0)]),
                max_level: 20,
                kind: UpgradeKind::Basic {
                    resource: ResourceId::Heat,
                    rate_per_level: 0.1,
                },
            },
            UpgradeDef {
                id: UpgradeId::FuelInjector,
                name: String::from("Fuel Injector"),
                base_cost: BTreeMap::from([(ResourceId::Fuel, 15.0)]),
                max_level: 20,
                kind: UpgradeKind::Basic {
                    resource: ResourceId::Fuel,
                    rate_per_level: 0.15,
                },
            },
            UpgradeDef {
                id: UpgradeId::PressureRegulator,
                name: String::from("Pressure Regulator"),
                base_cost: BTreeMap::from([(ResourceId::Heat, 25.0), (ResourceId::Fuel, 20.0)]),
                max_level: 20,
                kind: UpgradeKind::Basic {
                    resource: ResourceId::Pressure,
                    rate_per_level: 0.2,
                },
            },
            UpgradeDef {
                id: UpgradeId::EnergyCondenser,
                name: String::from("Energy Condenser"),
                base_cost: BTreeMap::from([(ResourceId::Energy, 20.0)]),
                max_level: 20,
                kind: UpgradeKind::Basic {
                    resource: ResourceId::Energy,
                    rate_per_level: 0.25,
                },
            },
            UpgradeDef {
                id: UpgradeId::StabilityField,
                name: String::from("Stability Field"),
                base_cost: BTreeMap::from([(ResourceId::Energy, 15.0), (ResourceId::Water, 10.0)]),
                max_level: 20,
                kind: UpgradeKind::Basic {
                    resource: ResourceId::Stability,
                    rate_per_level: 0.3,
                },
            },
            UpgradeDef {
                id: UpgradeId::ThermalAccelerator,
                name: String::from("Thermal Accelerator"),
                base_cost: BTreeMap::from([(ResourceId::Heat, 100.0), (ResourceId::Fuel, 60.0)]),
                max_level: 10,
                kind: UpgradeKind::Cross {
                    resource: ResourceId::Heat,
                    rate_per_level: 0.2,
                    active_gate: ResourceGate {
                        resource: ResourceId::Pressure,
                        min: crate::constants::ACCELERATOR_PRESSURE_GATE,
                    },
                    unlock_upgrade: UpgradeId::HeatGenerator,
                    unlock_level: 5,
                    unlock_resource: ResourceGate {
                        resource: ResourceId::Fuel,
                        min: 100.0,
                    },
                },
            },
            UpgradeDef {
                id: UpgradeId::FuelSynchronizer,
                name: String::from("Fuel Synchronizer"),
                base_cost: BTreeMap::from([(ResourceId::Fuel, 120.0), (ResourceId::Energy, 30.0)]),
                max_level: 10,
                kind: UpgradeKind::Cross {
                    resource: ResourceId::Fuel,
                    rate_per_level: 0.15,
                    active_gate: ResourceGate {
                        resource: ResourceId::Energy,
                        min: 10.0,
                    },
                    unlock_upgrade: UpgradeId::FuelInjector,
                    unlock_level: 5,
                    unlock_resource: ResourceGate {
                        resource: ResourceId::Energy,
                        min: 30.0,
                    },
                },
            },
            UpgradeDef {
                id: UpgradeId::PressureValve,
                name: String::from("Pressure Valve"),
                base_cost: BTreeMap::from([(ResourceId::Heat, 150.0), (ResourceId::Stone, 40.0)]),
                max_level: 10,
                kind: UpgradeKind::Cross {
                    resource: ResourceId::Pressure,
                    rate_per_level: 0.1,
                    active_gate: ResourceGate {
                        resource: ResourceId::Stability,
                        min: crate::constants::VALVE_STABILITY_GATE,
                    },
                    unlock_upgrade: UpgradeId::PressureRegulator,
                    unlock_level: 8,
                    unlock_resource: ResourceGate {
                        resource: ResourceId::Pressure,
                        min: 60.0,
                    },
                },
            },
        ];
        Self { upgrades }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::delta_of;

    fn setup() -> (UpgradeCatalog, UpgradeProgress, ResourceLedger, CapPolicy) {
        (
            UpgradeCatalog::default_catalog(),
            UpgradeProgress::default(),
            ResourceLedger::default(),
            CapPolicy::default(),
        )
    }

    #[test]
    fn cost_curve_matches_growth_factor() {
        let catalog = UpgradeCatalog::default_catalog();
        let def = catalog.get(UpgradeId::HeatGenerator).unwrap();
        assert_eq!(def.cost_at(0, 1.0)[&ResourceId::Heat], 10.0);
        assert_eq!(def.cost_at(1, 1.0)[&ResourceId::Heat], 15.0);
        assert_eq!(def.cost_at(2, 1.0)[&ResourceId::Heat], 22.0);
        assert_eq!(def.cost_at(3, 1.0)[&ResourceId::Heat], 33.0);
    }

    #[test]
    fn purchase_is_atomic() {
        let (catalog, mut progress, mut ledger, caps) = setup();
        ledger.add(&delta_of(ResourceId::Heat, 10.0), &caps);

        let outcome = catalog.purchase(
            UpgradeId::HeatGenerator,
            &mut progress,
            &mut ledger,
            &caps,
            1.0,
        );
        assert!(matches!(
            outcome,
            PurchaseOutcome::Purchased { new_level: 1, .. }
        ));
        assert!(ledger.amount(ResourceId::Heat).abs() < f64::EPSILON);
        assert_eq!(progress.level(UpgradeId::HeatGenerator), 1);

        // Next cost is 15; nothing changes on a failed attempt.
        let outcome = catalog.purchase(
            UpgradeId::HeatGenerator,
            &mut progress,
            &mut ledger,
            &caps,
            1.0,
        );
        assert!(matches!(outcome, PurchaseOutcome::Insufficient { .. }));
        assert_eq!(progress.level(UpgradeId::HeatGenerator), 1);
    }

    #[test]
    fn purchase_at_max_level_fails_without_mutation() {
        let (catalog, mut progress, mut ledger, caps) = setup();
        progress.levels.insert(UpgradeId::HeatGenerator, 20);
        ledger.add(&delta_of(ResourceId::Heat, 1_000_000.0), &caps);
        let before = ledger.amount(ResourceId::Heat);

        let outcome = catalog.purchase(
            UpgradeId::HeatGenerator,
            &mut progress,
            &mut ledger,
            &caps,
            1.0,
        );
        assert_eq!(outcome, PurchaseOutcome::MaxLevel);
        assert!((ledger.amount(ResourceId::Heat) - before).abs() < f64::EPSILON);
        assert_eq!(progress.level(UpgradeId::HeatGenerator), 20);
    }

    #[test]
    fn cross_upgrade_locked_until_gates_pass() {
        let (catalog, mut progress, mut ledger, caps) = setup();
        ledger.add(&delta_of(ResourceId::Heat, 10_000.0), &caps);
        ledger.add(&delta_of(ResourceId::Fuel, 10_000.0), &caps);

        let outcome = catalog.purchase(
            UpgradeId::ThermalAccelerator,
            &mut progress,
            &mut ledger,
            &caps,
            1.0,
        );
        assert_eq!(outcome, PurchaseOutcome::Locked);

        progress.levels.insert(UpgradeId::HeatGenerator, 5);
        let newly = catalog.refresh_cross_unlocks(&mut progress, &ledger);
        assert!(newly.contains(&UpgradeId::ThermalAccelerator));

        let outcome = catalog.purchase(
            UpgradeId::ThermalAccelerator,
            &mut progress,
            &mut ledger,
            &caps,
            1.0,
        );
        assert!(matches!(outcome, PurchaseOutcome::Purchased { .. }));
    }

    #[test]
    fn cross_multiplier_respects_activity_gate() {
        let (catalog, mut progress, mut ledger, caps) = setup();
        progress.levels.insert(UpgradeId::ThermalAccelerator, 2);
        progress.cross_unlocked.insert(UpgradeId::ThermalAccelerator);

        // Pressure below the gate: only basic upgrades would count.
        let low = catalog.yield_multiplier(ResourceId::Heat, &progress, &ledger);
        assert!((low - 1.0).abs() < f64::EPSILON);

        ledger.add(&delta_of(ResourceId::Pressure, 60.0), &caps);
        let high = catalog.yield_multiplier(ResourceId::Heat, &progress, &ledger);
        assert!((high - 1.4).abs() < 1e-9, "1 + 2 * 0.2 = 1.4, got {high}");
    }

    #[test]
    fn cost_reduction_scales_cost() {
        let catalog = UpgradeCatalog::default_catalog();
        let def = catalog.get(UpgradeId::FuelInjector).unwrap();
        let full = def.cost_at(4, 1.0)[&ResourceId::Fuel];
        let reduced = def.cost_at(4, 0.8)[&ResourceId::Fuel];
        assert!(reduced < full);
    }
}
