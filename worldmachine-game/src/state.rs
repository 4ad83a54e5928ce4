//! The full player state: the single source of truth during a session.
//!
//! Catalogs are static; everything here is the mutable layer persisted by
//! the save manager. Fields added after the first release carry
//! `#[serde(default)]` so older saves keep loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::achievements::{BonusTable, Telemetry};
use crate::constants::DEFAULT_AUTOSAVE_INTERVAL_SECS;
use crate::events::{ActiveEvent, PermanentGain};
use crate::resources::{CapPolicy, ResourceLedger};
use crate::upgrades::UpgradeProgress;
use crate::weather::Weather;
use crate::worlds::{WorldCatalog, WorldHistoryEntry};

/// Player-favorable multipliers that survive everything except a full reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermanentBonuses {
    /// Multiplier on all generation, starts at 1 and only increases.
    pub resource_efficiency: f64,
    /// Multiplier on upgrade costs, starts at 1 and only decreases.
    pub upgrade_cost_reduction: f64,
}

impl Default for PermanentBonuses {
    fn default() -> Self {
        Self {
            resource_efficiency: 1.0,
            upgrade_cost_reduction: 1.0,
        }
    }
}

impl PermanentBonuses {
    /// Fold in gains from an event choice. Movement is one-way: efficiency
    /// never drops, cost reduction never rises.
    pub fn grant(&mut self, gain: PermanentGain) {
        if gain.efficiency_bonus > 0.0 {
            self.resource_efficiency += gain.efficiency_bonus;
        }
        if gain.cost_reduction_bonus > 0.0 {
            self.upgrade_cost_reduction =
                (self.upgrade_cost_reduction - gain.cost_reduction_bonus).max(0.1);
        }
    }

    /// Repair out-of-range values from old or hand-edited saves.
    pub fn normalize(&mut self) {
        if !self.resource_efficiency.is_finite() || self.resource_efficiency < 1.0 {
            self.resource_efficiency = 1.0;
        }
        if !self.upgrade_cost_reduction.is_finite()
            || self.upgrade_cost_reduction > 1.0
            || self.upgrade_cost_reduction < 0.1
        {
            self.upgrade_cost_reduction = 1.0;
        }
    }
}

/// Settings the engine itself consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Seconds between auto-saves; 0 disables.
    pub autosave_interval_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
        }
    }
}

/// Everything that persists for one playthrough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    /// Deterministic run seed; RNG streams derive from it.
    pub seed: u64,
    pub worlds_created: u32,
    pub current_world: u32,
    /// Live weather on the current world; rotates on a countdown.
    pub current_weather: Weather,
    /// Ticks until the next weather rotation.
    pub weather_ticks_left: u32,
    pub unlocked_worlds: BTreeSet<u32>,
    pub resources: ResourceLedger,
    pub upgrades: UpgradeProgress,
    /// Append-only; display layers may truncate, storage never does.
    pub world_history: Vec<WorldHistoryEntry>,
    pub achievements: BTreeSet<u32>,
    pub active_events: Vec<ActiveEvent>,
    /// Name of a rolled event awaiting the player's choice.
    pub pending_event: Option<String>,
    pub permanent_bonuses: PermanentBonuses,
    pub entered_codes: BTreeSet<String>,
    pub telemetry: Telemetry,
    pub settings: Settings,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new_with_seed(0)
    }
}

impl GameState {
    /// Fresh state with the desert planet pre-selected at zero cost.
    #[must_use]
    pub fn new_with_seed(seed: u64) -> Self {
        let mut upgrades = UpgradeProgress::default();
        upgrades.normalize();
        Self {
            seed,
            worlds_created: 0,
            current_world: 0,
            current_weather: Weather::Calm,
            weather_ticks_left: 60,
            unlocked_worlds: BTreeSet::from([0]),
            resources: ResourceLedger::default(),
            upgrades,
            world_history: Vec::new(),
            achievements: BTreeSet::new(),
            active_events: Vec::new(),
            pending_event: None,
            permanent_bonuses: PermanentBonuses::default(),
            entered_codes: BTreeSet::new(),
            telemetry: Telemetry::default(),
            settings: Settings::default(),
        }
    }

    /// Effective cap policy: the current world's special effect combined
    /// with achievement cap bonuses.
    #[must_use]
    pub fn cap_policy(&self, worlds: &WorldCatalog, bonuses: &BonusTable) -> CapPolicy {
        let mut policy = worlds
            .get(self.current_world)
            .and_then(|world| world.special)
            .map_or_else(CapPolicy::default, |special| special.cap_policy());
        policy.multiplier *= bonuses.cap_multiplier();
        policy
    }

    /// Repair a freshly loaded state: fill missing entries, drop spent
    /// events, and make sure the current world is marked unlocked.
    pub fn normalize(&mut self) {
        self.resources.normalize();
        self.upgrades.normalize();
        self.permanent_bonuses.normalize();
        self.unlocked_worlds.insert(self.current_world);
        self.active_events.retain(|event| event.remaining > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::BonusTable;
    use crate::events::PermanentGain;
    use crate::resources::ResourceId;

    #[test]
    fn fresh_state_starts_on_desert() {
        let state = GameState::default();
        assert_eq!(state.current_world, 0);
        assert_eq!(state.worlds_created, 0);
        assert!(state.unlocked_worlds.contains(&0));
        assert!(state.resources.amount(ResourceId::Heat).abs() < f64::EPSILON);
    }

    #[test]
    fn permanent_bonuses_move_one_way() {
        let mut bonuses = PermanentBonuses::default();
        bonuses.grant(PermanentGain {
            efficiency_bonus: 0.05,
            cost_reduction_bonus: 0.03,
        });
        assert!((bonuses.resource_efficiency - 1.05).abs() < 1e-12);
        assert!((bonuses.upgrade_cost_reduction - 0.97).abs() < 1e-12);

        // Zero or negative gains change nothing.
        bonuses.grant(PermanentGain::default());
        assert!((bonuses.resource_efficiency - 1.05).abs() < 1e-12);
    }

    #[test]
    fn normalize_repairs_bad_values() {
        let mut state = GameState::default();
        state.permanent_bonuses.resource_efficiency = 0.2;
        state.active_events.push(ActiveEvent {
            name: String::from("spent"),
            resources: smallvec::SmallVec::new(),
            factor: 1.0,
            remaining: 0,
            original_duration: 3,
        });
        state.unlocked_worlds.clear();

        state.normalize();
        assert!((state.permanent_bonuses.resource_efficiency - 1.0).abs() < f64::EPSILON);
        assert!(state.active_events.is_empty());
        assert!(state.unlocked_worlds.contains(&state.current_world));
    }

    #[test]
    fn cap_policy_combines_world_and_bonuses() {
        let worlds = WorldCatalog::default_catalog();
        let bonuses = BonusTable::default();
        let mut state = GameState::default();

        // Mountain planet doubles caps.
        state.current_world = 3;
        let policy = state.cap_policy(&worlds, &bonuses);
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);

        // Void reach removes them.
        state.current_world = 7;
        assert!(state.cap_policy(&worlds, &bonuses).removed);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = GameState::new_with_seed(99);
        state.worlds_created = 3;
        state.achievements.insert(6);
        state.entered_codes.insert(String::from("VOIDWALKER"));

        let json = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
