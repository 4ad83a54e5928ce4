//! Resource identifiers and the capping ledger.
//!
//! Every mutation of resource amounts funnels through [`ResourceLedger::apply`]
//! so the non-negativity and cap invariants can never be bypassed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier for every resource the engine tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum ResourceId {
    #[default]
    Heat,
    Fuel,
    Pressure,
    Energy,
    Stability,
    Water,
    Oxygen,
    Stone,
    Magma,
    Ice,
    Crystal,
    VoidEnergy,
}

impl ResourceId {
    /// All resources in canonical order.
    pub const ALL: [Self; 12] = [
        Self::Heat,
        Self::Fuel,
        Self::Pressure,
        Self::Energy,
        Self::Stability,
        Self::Water,
        Self::Oxygen,
        Self::Stone,
        Self::Magma,
        Self::Ice,
        Self::Crystal,
        Self::VoidEnergy,
    ];

    /// Stable save-file key for this resource.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Fuel => "fuel",
            Self::Pressure => "pressure",
            Self::Energy => "energy",
            Self::Stability => "stability",
            Self::Water => "water",
            Self::Oxygen => "oxygen",
            Self::Stone => "stone",
            Self::Magma => "magma",
            Self::Ice => "ice",
            Self::Crystal => "crystal",
            Self::VoidEnergy => "voidEnergy",
        }
    }

    /// Parse a save-file key back into an id.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.key() == key)
    }

    /// Base cap for this resource; `None` means unbounded.
    #[must_use]
    pub const fn base_cap(self) -> Option<f64> {
        match self {
            Self::Pressure | Self::Energy | Self::Stability => Some(100.0),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A sparse map of per-resource deltas or costs.
pub type ResourceDelta = BTreeMap<ResourceId, f64>;

/// Cap adjustments contributed by the current world and achievement bonuses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapPolicy {
    /// Multiplier on every finite cap (world special effects, cap bonuses).
    pub multiplier: f64,
    /// When set, all caps are lifted entirely.
    pub removed: bool,
}

impl Default for CapPolicy {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            removed: false,
        }
    }
}

impl CapPolicy {
    /// Effective cap for a resource under this policy.
    #[must_use]
    pub fn effective_cap(&self, id: ResourceId) -> Option<f64> {
        if self.removed {
            return None;
        }
        id.base_cap().map(|cap| cap * self.multiplier.max(0.0))
    }
}

/// Holds current amounts for every resource and enforces clamping.
///
/// Amounts are private; the only mutation path is [`ResourceLedger::apply`]
/// (and its `add`/`subtract` wrappers), which re-clamps after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLedger {
    amounts: BTreeMap<ResourceId, f64>,
}

impl Default for ResourceLedger {
    fn default() -> Self {
        let mut amounts = BTreeMap::new();
        for id in ResourceId::ALL {
            amounts.insert(id, 0.0);
        }
        Self { amounts }
    }
}

impl ResourceLedger {
    /// Current amount of a resource.
    #[must_use]
    pub fn amount(&self, id: ResourceId) -> f64 {
        self.amounts.get(&id).copied().unwrap_or(0.0)
    }

    /// Iterate over all amounts in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, f64)> + '_ {
        self.amounts.iter().map(|(id, amount)| (*id, *amount))
    }

    /// Apply a delta map, then clamp every touched resource to `[0, cap]`.
    ///
    /// Returns the number of resources that hit their cap, for telemetry.
    pub fn apply(&mut self, deltas: &ResourceDelta, caps: &CapPolicy) -> u32 {
        let mut cap_hits = 0;
        for (&id, &delta) in deltas {
            if !delta.is_finite() {
                continue;
            }
            let entry = self.amounts.entry(id).or_insert(0.0);
            *entry += delta;
            if let Some(cap) = caps.effective_cap(id)
                && *entry > cap
            {
                *entry = cap;
                cap_hits += 1;
                log::debug!("resource {id} clamped to cap {cap}");
            }
            if *entry < 0.0 {
                *entry = 0.0;
            }
        }
        cap_hits
    }

    /// Add positive deltas (convenience wrapper over [`Self::apply`]).
    pub fn add(&mut self, deltas: &ResourceDelta, caps: &CapPolicy) -> u32 {
        self.apply(deltas, caps)
    }

    /// Subtract a cost map (negates the deltas, then applies).
    pub fn subtract(&mut self, cost: &ResourceDelta, caps: &CapPolicy) -> u32 {
        let negated: ResourceDelta = cost.iter().map(|(&id, &amount)| (id, -amount)).collect();
        self.apply(&negated, caps)
    }

    /// Whether every listed cost can be paid from current amounts.
    #[must_use]
    pub fn can_afford(&self, cost: &ResourceDelta) -> bool {
        cost.iter()
            .all(|(&id, &amount)| self.amount(id) >= amount - f64::EPSILON)
    }

    /// Resources that fall short of a cost, with the missing amount each.
    #[must_use]
    pub fn shortfall(&self, cost: &ResourceDelta) -> ResourceDelta {
        cost.iter()
            .filter_map(|(&id, &amount)| {
                let missing = amount - self.amount(id);
                (missing > f64::EPSILON).then_some((id, missing))
            })
            .collect()
    }

    /// Ensure every known resource has an entry (used after loading old saves).
    pub fn normalize(&mut self) {
        for id in ResourceId::ALL {
            let entry = self.amounts.entry(id).or_insert(0.0);
            if !entry.is_finite() || *entry < 0.0 {
                *entry = 0.0;
            }
        }
    }

    /// Re-clamp every resource against the given cap policy.
    pub fn reclamp(&mut self, caps: &CapPolicy) {
        for (&id, amount) in &mut self.amounts {
            if let Some(cap) = caps.effective_cap(id)
                && *amount > cap
            {
                *amount = cap;
            }
            if *amount < 0.0 {
                *amount = 0.0;
            }
        }
    }
}

/// Convenience constructor for a single-resource delta.
#[must_use]
pub fn delta_of(id: ResourceId, amount: f64) -> ResourceDelta {
    let mut deltas = ResourceDelta::new();
    deltas.insert(id, amount);
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_clamps_to_cap_and_floor() {
        let mut ledger = ResourceLedger::default();
        let caps = CapPolicy::default();

        let hits = ledger.apply(&delta_of(ResourceId::Pressure, 250.0), &caps);
        assert_eq!(hits, 1);
        assert!((ledger.amount(ResourceId::Pressure) - 100.0).abs() < f64::EPSILON);

        ledger.apply(&delta_of(ResourceId::Heat, -5.0), &caps);
        assert!(ledger.amount(ResourceId::Heat).abs() < f64::EPSILON);
    }

    #[test]
    fn cap_policy_multiplier_and_removal() {
        let doubled = CapPolicy {
            multiplier: 2.0,
            removed: false,
        };
        assert_eq!(doubled.effective_cap(ResourceId::Pressure), Some(200.0));
        assert_eq!(doubled.effective_cap(ResourceId::Heat), None);

        let lifted = CapPolicy {
            multiplier: 1.0,
            removed: true,
        };
        assert_eq!(lifted.effective_cap(ResourceId::Stability), None);
    }

    #[test]
    fn subtract_is_negated_add() {
        let mut ledger = ResourceLedger::default();
        let caps = CapPolicy::default();
        ledger.add(&delta_of(ResourceId::Fuel, 40.0), &caps);
        ledger.subtract(&delta_of(ResourceId::Fuel, 15.0), &caps);
        assert!((ledger.amount(ResourceId::Fuel) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn affordability_and_shortfall() {
        let mut ledger = ResourceLedger::default();
        let caps = CapPolicy::default();
        ledger.add(&delta_of(ResourceId::Heat, 50.0), &caps);

        let mut cost = delta_of(ResourceId::Heat, 50.0);
        cost.insert(ResourceId::Fuel, 25.0);
        assert!(!ledger.can_afford(&cost));
        let missing = ledger.shortfall(&cost);
        assert_eq!(missing.len(), 1);
        assert!((missing[&ResourceId::Fuel] - 25.0).abs() < f64::EPSILON);

        ledger.add(&delta_of(ResourceId::Fuel, 25.0), &caps);
        assert!(ledger.can_afford(&cost));
    }

    #[test]
    fn non_finite_deltas_are_ignored() {
        let mut ledger = ResourceLedger::default();
        let caps = CapPolicy::default();
        ledger.apply(&delta_of(ResourceId::Heat, f64::NAN), &caps);
        ledger.apply(&delta_of(ResourceId::Heat, f64::INFINITY), &caps);
        assert!(ledger.amount(ResourceId::Heat).abs() < f64::EPSILON);
    }

    #[test]
    fn resource_keys_roundtrip() {
        for id in ResourceId::ALL {
            assert_eq!(ResourceId::from_key(id.key()), Some(id));
        }
        assert_eq!(ResourceId::from_key("plutonium"), None);
    }
}
