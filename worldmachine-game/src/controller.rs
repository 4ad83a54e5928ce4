//! The progression controller: sequences every player action and the tick.
//!
//! Within one action the order is fixed: generate resources, run cross-
//! upgrade side effects, decrement active events, roll for a new event,
//! re-check achievements, persist. Achievement checks therefore observe
//! post-generation state and persistence observes post-achievement state.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::achievements::{AchievementCatalog, BonusTable, EvalInput};
use crate::constants::{BALANCE_TOLERANCE, MANUAL_CHALLENGE_WINDOW_SECS};
use crate::events::{self, EventEngine};
use crate::generation::{
    self, GenerationOutcome, PipelineContext, cross_upgrade_side_effects, energy_decay,
};
use crate::resources::{ResourceDelta, ResourceId};
use crate::rng::RngBundle;
use crate::save::{LoadSource, SaveError, SaveStateManager, SaveStorage};
use crate::state::GameState;
use crate::upgrades::{PurchaseOutcome, UpgradeCatalog, UpgradeId};
use crate::weather::rotate_weather;
use crate::worlds::{WorldCatalog, WorldDef, WorldHistoryEntry};

/// Wall-clock abstraction so tests can drive time explicitly.
pub trait GameClock {
    fn now_ms(&self) -> u64;
}

/// Test clock advanced by hand.
#[derive(Debug, Default)]
pub struct VirtualClock {
    ms: std::cell::Cell<u64>,
}

impl VirtualClock {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            ms: std::cell::Cell::new(start_ms),
        }
    }

    pub fn advance_ms(&self, delta: u64) {
        self.ms.set(self.ms.get() + delta);
    }
}

impl GameClock for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.ms.get()
    }
}

/// Discrete notifications for the render layer to drain.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    WorldUnlocked { world_id: u32 },
    AchievementUnlocked { achievement_id: u32 },
    EventTriggered { name: String },
    InsufficientResources { shortfall: ResourceDelta },
    SaveFailed { message: String },
}

/// Contract violations and persistence failures.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("unknown world id {id}")]
    UnknownWorld { id: u32 },
    #[error("no event is awaiting a choice")]
    NoPendingEvent,
    #[error("choice index {index} out of range for event {event}")]
    InvalidChoice { event: String, index: usize },
    #[error(transparent)]
    Save(#[from] SaveError),
}

/// Typed outcome of a world selection attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutcome {
    /// First-time unlock: cost consumed, creation reward credited.
    Created { reward: ResourceDelta },
    /// Switched to an already-unlocked world.
    Switched,
    AlreadyCurrent,
    Insufficient { shortfall: ResourceDelta },
}

/// Orchestrates catalogs, state, RNG, and persistence.
pub struct ProgressionController<S: SaveStorage, C: GameClock> {
    worlds: WorldCatalog,
    upgrades: UpgradeCatalog,
    achievements: AchievementCatalog,
    events: EventEngine,
    state: GameState,
    rng: RngBundle,
    save: SaveStateManager<S>,
    clock: C,
    notifications: Vec<Notification>,
    /// Playtime second of the last auto-save.
    last_autosave_at: u64,
}

impl<S: SaveStorage, C: GameClock> ProgressionController<S, C> {
    /// Fresh game with the default catalogs.
    #[must_use]
    pub fn new(storage: S, clock: C, seed: u64) -> Self {
        Self::with_state(storage, clock, GameState::new_with_seed(seed))
    }

    /// Resume from storage, falling back through backups to a fresh state.
    pub fn load_or_new(storage: S, clock: C) -> (Self, LoadSource) {
        let manager = SaveStateManager::new(storage);
        let (state, source) = manager.load();
        let rng = RngBundle::from_user_seed(state.seed);
        let mut controller = Self {
            worlds: WorldCatalog::default_catalog(),
            upgrades: UpgradeCatalog::default_catalog(),
            achievements: AchievementCatalog::default_catalog(),
            events: EventEngine::default_catalog(),
            last_autosave_at: state.telemetry.playtime_seconds,
            rng,
            state,
            save: manager,
            clock,
            notifications: Vec::new(),
        };
        controller.reclamp_resources();
        (controller, source)
    }

    /// Resume from an in-memory state (imports, tests, headless tools).
    #[must_use]
    pub fn from_state(storage: S, clock: C, state: GameState) -> Self {
        Self::with_state(storage, clock, state)
    }

    fn with_state(storage: S, clock: C, state: GameState) -> Self {
        let rng = RngBundle::from_user_seed(state.seed);
        let mut controller = Self {
            worlds: WorldCatalog::default_catalog(),
            upgrades: UpgradeCatalog::default_catalog(),
            achievements: AchievementCatalog::default_catalog(),
            events: EventEngine::default_catalog(),
            last_autosave_at: state.telemetry.playtime_seconds,
            rng,
            state,
            save: SaveStateManager::new(storage),
            clock,
            notifications: Vec::new(),
        };
        controller.reclamp_resources();
        controller
    }

    /// Clamp stored amounts against the current world's cap policy. Needed
    /// whenever the policy may have tightened since the amounts were written.
    fn reclamp_resources(&mut self) {
        let caps = self.state.cap_policy(&self.worlds, &self.bonuses());
        self.state.resources.reclamp(&caps);
    }

    // Read-only accessors for render collaborators.

    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    #[must_use]
    pub fn worlds(&self) -> &WorldCatalog {
        &self.worlds
    }

    #[must_use]
    pub fn upgrades(&self) -> &UpgradeCatalog {
        &self.upgrades
    }

    #[must_use]
    pub fn achievements(&self) -> &AchievementCatalog {
        &self.achievements
    }

    #[must_use]
    pub fn events(&self) -> &EventEngine {
        &self.events
    }

    /// The current world definition.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when the state references a world id missing
    /// from the catalog; release builds log and fall back to the first world.
    #[must_use]
    pub fn current_world(&self) -> &WorldDef {
        if let Some(world) = self.worlds.get(self.state.current_world) {
            return world;
        }
        debug_assert!(
            false,
            "current world id {} missing from catalog",
            self.state.current_world
        );
        log::error!(
            "current world id {} missing from catalog, using first world",
            self.state.current_world
        );
        &self.worlds.worlds[0]
    }

    /// Cost of the next level of an upgrade under current reductions.
    #[must_use]
    pub fn upgrade_cost(&self, id: UpgradeId) -> Option<ResourceDelta> {
        let bonuses = self.bonuses();
        let reduction =
            self.state.permanent_bonuses.upgrade_cost_reduction * bonuses.upgrade_cost_factor();
        self.upgrades
            .get(id)
            .map(|def| def.cost_at(self.state.upgrades.level(id), reduction))
    }

    /// Achievement bonuses, recomputed from the unlocked set.
    #[must_use]
    pub fn bonuses(&self) -> BonusTable {
        self.achievements.compute_bonuses(&self.state.achievements)
    }

    /// Drain queued notifications for the UI layer.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn pipeline_context<'a>(&'a self, bonuses: &'a BonusTable) -> PipelineContext<'a> {
        PipelineContext {
            world: self.current_world(),
            weather: self.state.current_weather,
            upgrades: &self.upgrades,
            progress: &self.state.upgrades,
            ledger: &self.state.resources,
            active_events: &self.state.active_events,
            bonuses,
            permanent_efficiency: self.state.permanent_bonuses.resource_efficiency,
            worlds_created: self.state.worlds_created,
        }
    }

    /// Manual per-click generation of one resource.
    pub fn manual_generate(&mut self, resource: ResourceId) -> GenerationOutcome {
        let bonuses = self.bonuses();
        let ctx = self.pipeline_context(&bonuses);
        let outcome = generation::manual_yield(&ctx, resource, &mut *self.rng.variance());

        let caps = self.state.cap_policy(&self.worlds, &bonuses);
        let cap_hits = self.state.resources.add(&outcome.yields, &caps);
        self.state.telemetry.cap_hits += u64::from(cap_hits);
        self.record_click();

        self.post_action(&bonuses);
        outcome
    }

    fn record_click(&mut self) {
        let telemetry = &mut self.state.telemetry;
        telemetry.click_count += 1;
        let now = telemetry.playtime_seconds;
        if now.saturating_sub(telemetry.window_opened_at) >= MANUAL_CHALLENGE_WINDOW_SECS {
            telemetry.window_opened_at = now;
            telemetry.clicks_in_window = 0;
        }
        telemetry.clicks_in_window += 1;
    }

    /// Select a world: unlock it on first selection (consuming the unlock
    /// cost and granting the one-shot creation reward), or just switch to it.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::UnknownWorld`] for an id not in the
    /// catalog. Insufficient resources is a normal outcome, not an error.
    pub fn select_world(&mut self, world_id: u32) -> Result<SelectOutcome, ControllerError> {
        let Some(world) = self.worlds.get(world_id).cloned() else {
            debug_assert!(false, "unknown world id {world_id}");
            return Err(ControllerError::UnknownWorld { id: world_id });
        };
        if self.state.current_world == world_id && self.state.unlocked_worlds.contains(&world_id) {
            return Ok(SelectOutcome::AlreadyCurrent);
        }

        let bonuses = self.bonuses();
        let first_time = !self.state.unlocked_worlds.contains(&world_id);
        if first_time {
            if !self.state.resources.can_afford(&world.unlock) {
                let shortfall = self.state.resources.shortfall(&world.unlock);
                self.notifications.push(Notification::InsufficientResources {
                    shortfall: shortfall.clone(),
                });
                return Ok(SelectOutcome::Insufficient { shortfall });
            }
            let caps = self.state.cap_policy(&self.worlds, &bonuses);
            self.state.resources.subtract(&world.unlock, &caps);
            self.state.unlocked_worlds.insert(world_id);
            self.state.worlds_created += 1;
            self.state
                .telemetry
                .record_world_milestone(self.state.worlds_created);
            self.state.world_history.push(WorldHistoryEntry {
                world_id,
                timestamp_ms: self.clock.now_ms(),
                playtime_seconds: self.state.telemetry.playtime_seconds,
                environment: world.environment.clone(),
            });
            self.notifications
                .push(Notification::WorldUnlocked { world_id });
            log::info!("world unlocked: {} ({world_id})", world.name);
        }

        self.state.current_world = world_id;
        self.state.current_weather = world.environment.weather;
        self.state.weather_ticks_left = world.environment.weather_countdown;
        // The new world's cap policy may be tighter than the old one's
        // (leaving a cap-removal world); over-cap amounts clamp down now.
        let caps = self.state.cap_policy(&self.worlds, &bonuses);
        self.state.resources.reclamp(&caps);

        if !first_time {
            self.post_action(&bonuses);
            return Ok(SelectOutcome::Switched);
        }

        // One-shot creation reward through the full pipeline. The unlock
        // cost stays spent: resources it named are excluded from the reward.
        let ctx = self.pipeline_context(&bonuses);
        let mut outcome = generation::world_creation_yields(&ctx, &mut *self.rng.variance());
        outcome.yields.retain(|id, _| !world.unlock.contains_key(id));
        if outcome.synergy_applied {
            self.state.telemetry.synergy_activations += 1;
        }
        let caps = self.state.cap_policy(&self.worlds, &bonuses);
        let cap_hits = self.state.resources.add(&outcome.yields, &caps);
        self.state.telemetry.cap_hits += u64::from(cap_hits);

        self.post_action(&bonuses);
        Ok(SelectOutcome::Created {
            reward: outcome.yields,
        })
    }

    /// Attempt to purchase one level of an upgrade.
    pub fn purchase_upgrade(&mut self, id: UpgradeId) -> PurchaseOutcome {
        let bonuses = self.bonuses();
        let reduction =
            self.state.permanent_bonuses.upgrade_cost_reduction * bonuses.upgrade_cost_factor();
        let caps = self.state.cap_policy(&self.worlds, &bonuses);
        let outcome = self.upgrades.purchase(
            id,
            &mut self.state.upgrades,
            &mut self.state.resources,
            &caps,
            reduction,
        );
        if let PurchaseOutcome::Insufficient { shortfall } = &outcome {
            self.notifications.push(Notification::InsufficientResources {
                shortfall: shortfall.clone(),
            });
        }
        self.post_action(&bonuses);
        outcome
    }

    /// Purchase up to `count` levels in one action. Without the bulk
    /// purchasing feature this degrades to a single purchase.
    ///
    /// Returns the number of levels bought and the outcome that stopped
    /// the run (max level, insufficient funds, or the final purchase).
    pub fn purchase_upgrade_bulk(&mut self, id: UpgradeId, count: u32) -> (u32, PurchaseOutcome) {
        let bonuses = self.bonuses();
        let limit = if bonuses.has_feature(crate::achievements::FeatureUnlock::BulkPurchasing) {
            count.max(1)
        } else {
            1
        };
        let reduction_base = self.state.permanent_bonuses.upgrade_cost_reduction;
        let caps = self.state.cap_policy(&self.worlds, &bonuses);
        let reduction = reduction_base * bonuses.upgrade_cost_factor();

        let mut bought = 0;
        let mut last = PurchaseOutcome::MaxLevel;
        while bought < limit {
            last = self.upgrades.purchase(
                id,
                &mut self.state.upgrades,
                &mut self.state.resources,
                &caps,
                reduction,
            );
            if matches!(last, PurchaseOutcome::Purchased { .. }) {
                bought += 1;
            } else {
                break;
            }
        }
        if let PurchaseOutcome::Insufficient { shortfall } = &last
            && bought == 0
        {
            self.notifications.push(Notification::InsufficientResources {
                shortfall: shortfall.clone(),
            });
        }
        self.post_action(&bonuses);
        (bought, last)
    }

    /// Resolve the pending event with the given choice index.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NoPendingEvent`] when nothing is pending
    /// and [`ControllerError::InvalidChoice`] for an out-of-range index.
    pub fn resolve_event_choice(&mut self, choice_index: usize) -> Result<(), ControllerError> {
        let Some(event_name) = self.state.pending_event.take() else {
            return Err(ControllerError::NoPendingEvent);
        };
        let Some(def) = self.events.get(&event_name).cloned() else {
            debug_assert!(false, "pending event {event_name} missing from catalog");
            return Err(ControllerError::NoPendingEvent);
        };
        let Some(choice) = def.choices.get(choice_index) else {
            self.state.pending_event = Some(event_name.clone());
            return Err(ControllerError::InvalidChoice {
                event: event_name,
                index: choice_index,
            });
        };

        let bonuses = self.bonuses();
        let caps = self.state.cap_policy(&self.worlds, &bonuses);
        let resolution = EventEngine::resolve_choice(
            &def.name,
            &choice.effect,
            &mut self.state.resources,
            &caps,
        );
        if !resolution.permanent.is_empty() {
            self.state.permanent_bonuses.grant(resolution.permanent);
        }

        self.post_action(&bonuses);
        // The new modifier joins after the countdown so it keeps its full
        // duration on the action that created it.
        if let Some(active) = resolution.new_active {
            self.state.active_events.push(active);
        }
        Ok(())
    }

    /// Shared action tail: side effects, event countdown, event roll,
    /// achievement re-check, auto-save. Order is fixed.
    fn post_action(&mut self, bonuses: &BonusTable) {
        let caps = self.state.cap_policy(&self.worlds, bonuses);

        let effects = cross_upgrade_side_effects(
            &self.state.upgrades,
            &self.state.resources,
            bonuses.conversion_multiplier(),
        );
        if !effects.deltas.is_empty() {
            let cap_hits = self.state.resources.apply(&effects.deltas, &caps);
            self.state.telemetry.cap_hits += u64::from(cap_hits);
            self.state.telemetry.conversion_total += effects.converted;
        }

        // Existing events tick down before a fresh roll, so a newly rolled
        // event keeps its full duration.
        events::decrement_active(&mut self.state.active_events);
        if self.state.pending_event.is_none() {
            let stability = self.state.resources.amount(ResourceId::Stability);
            if let Some(idx) = self
                .events
                .roll_for_event(stability, &mut *self.rng.events())
            {
                let name = self.events.events[idx].name.clone();
                self.notifications
                    .push(Notification::EventTriggered { name: name.clone() });
                self.state.pending_event = Some(name);
            }
        }

        let _ = self
            .upgrades
            .refresh_cross_unlocks(&mut self.state.upgrades, &self.state.resources);

        self.state.telemetry.record_discoveries(&self.state.resources);
        self.check_achievements();
        self.autosave_if_due();
    }

    fn check_achievements(&mut self) {
        let mut unlocked = self.state.achievements.clone();
        // Count-based requirements can chain off unlocks from the same pass,
        // so re-evaluate until a pass finds nothing new.
        loop {
            let newly = {
                let input = EvalInput {
                    ledger: &self.state.resources,
                    worlds: &self.worlds,
                    upgrades: &self.upgrades,
                    progress: &self.state.upgrades,
                    telemetry: &self.state.telemetry,
                    unlocked_worlds: &self.state.unlocked_worlds,
                    worlds_created: self.state.worlds_created,
                    unlocked_achievements: u32::try_from(unlocked.len()).unwrap_or(u32::MAX),
                    entered_codes: &self.state.entered_codes,
                };
                self.achievements.check_all(&mut unlocked, &input)
            };
            if newly.is_empty() {
                break;
            }
            for achievement_id in newly {
                self.notifications.push(Notification::AchievementUnlocked {
                    achievement_id,
                });
            }
        }
        self.state.achievements = unlocked;
    }

    fn autosave_if_due(&mut self) {
        let interval = u64::from(self.state.settings.autosave_interval_secs);
        if interval == 0 {
            return;
        }
        let now = self.state.telemetry.playtime_seconds;
        if now.saturating_sub(self.last_autosave_at) >= interval {
            self.last_autosave_at = now;
            if let Err(err) = self.save.save(&self.state, self.clock.now_ms()) {
                log::error!("auto-save failed: {err}");
                self.notifications.push(Notification::SaveFailed {
                    message: err.to_string(),
                });
            }
        }
    }

    /// One-second tick: playtime, energy decay, weather rotation, streak
    /// bookkeeping, event countdown, achievement re-check, auto-save.
    pub fn tick(&mut self) {
        self.state.telemetry.playtime_seconds += 1;

        let bonuses = self.bonuses();
        let caps = self.state.cap_policy(&self.worlds, &bonuses);
        let time_speed = self.current_world().environment.time_speed;
        let decay = energy_decay(self.state.resources.amount(ResourceId::Energy), time_speed);
        if decay < 0.0 {
            self.state.resources.apply(
                &ResourceDelta::from([(ResourceId::Energy, decay)]),
                &caps,
            );
        }

        if self.state.weather_ticks_left == 0 {
            let next = rotate_weather(self.state.current_weather, &mut *self.rng.weather());
            log::debug!(
                "weather rotated: {} -> {}",
                self.state.current_weather.key(),
                next.key()
            );
            self.state.current_weather = next;
            self.state.weather_ticks_left = self.current_world().environment.weather_countdown;
        } else {
            self.state.weather_ticks_left -= 1;
        }

        self.update_streaks();
        for feature in bonuses.features.iter() {
            *self
                .state
                .telemetry
                .feature_usage_seconds
                .entry(*feature)
                .or_insert(0) += 1;
        }

        events::decrement_active(&mut self.state.active_events);
        self.state.telemetry.record_discoveries(&self.state.resources);
        self.check_achievements();
        self.autosave_if_due();
    }

    fn update_streaks(&mut self) {
        let heat = self.state.resources.amount(ResourceId::Heat);
        let fuel = self.state.resources.amount(ResourceId::Fuel);
        let telemetry = &mut self.state.telemetry;

        let ratio_ok = heat > 0.0 && fuel > 0.0 && {
            let ratio = heat / fuel;
            (1.0 - BALANCE_TOLERANCE..=1.0 + BALANCE_TOLERANCE).contains(&ratio)
        };
        if ratio_ok {
            telemetry.ratio_held_seconds += 1;
        } else {
            telemetry.ratio_held_seconds = 0;
        }

        let pressure = self.state.resources.amount(ResourceId::Pressure);
        let mean = (heat + fuel + pressure) / 3.0;
        let balanced = mean > 0.0
            && [heat, fuel, pressure]
                .iter()
                .all(|amount| (amount - mean).abs() <= mean * BALANCE_TOLERANCE);
        if balanced {
            self.state.telemetry.balance_streak_seconds += 1;
        } else {
            self.state.telemetry.balance_streak_seconds = 0;
        }
    }

    /// Record a page visit (navigation telemetry from the UI layer).
    pub fn record_page_visit(&mut self) {
        self.state.telemetry.page_visits += 1;
    }

    /// Enter a secret code, possibly exposing hidden achievements.
    pub fn enter_secret_code(&mut self, code: &str) {
        let normalized = code.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return;
        }
        self.state.entered_codes.insert(normalized);
        self.check_achievements();
    }

    /// Change the auto-save interval. The schedule is fully reset so the
    /// timer can never fire on the old cadence.
    pub fn set_autosave_interval(&mut self, secs: u32) {
        self.state.settings.autosave_interval_secs = secs;
        self.last_autosave_at = self.state.telemetry.playtime_seconds;
    }

    /// Persist immediately.
    ///
    /// # Errors
    ///
    /// Propagates storage failures after recovery was attempted; the
    /// in-memory state is never touched.
    pub fn save_now(&mut self) -> Result<(), ControllerError> {
        self.save.save(&self.state, self.clock.now_ms())?;
        self.last_autosave_at = self.state.telemetry.playtime_seconds;
        Ok(())
    }

    /// Pretty-printed export of the current session.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn export(&self) -> Result<String, ControllerError> {
        Ok(SaveStateManager::<S>::export(&self.state)?)
    }

    /// Import a snapshot, backing up the current session first.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed payloads; the session is
    /// unchanged in that case.
    pub fn import(&mut self, raw: &str) -> Result<(), ControllerError> {
        let now = self.clock.now_ms();
        let imported = self.save.import(raw, &self.state, now)?;
        self.rng = RngBundle::from_user_seed(imported.seed);
        self.last_autosave_at = imported.telemetry.playtime_seconds;
        self.state = imported;
        self.save.save(&self.state, now)?;
        Ok(())
    }

    /// Full reset: everything goes except the reset counter, which feeds
    /// reset achievements.
    ///
    /// # Errors
    ///
    /// Propagates storage failures from clearing the old save.
    pub fn reset_game(&mut self, new_seed: u64) -> Result<(), ControllerError> {
        let resets = self.state.telemetry.reset_count + 1;
        self.save.clear()?;
        self.state = GameState::new_with_seed(new_seed);
        self.state.telemetry.reset_count = resets;
        self.rng = RngBundle::from_user_seed(new_seed);
        self.last_autosave_at = 0;
        self.notifications.clear();
        self.check_achievements();
        self.save.save(&self.state, self.clock.now_ms())?;
        log::info!("game reset (count {resets})");
        Ok(())
    }

    /// Worlds currently eligible for a first unlock.
    #[must_use]
    pub fn next_unlockable_world(&self) -> Option<&WorldDef> {
        let unlocked: &BTreeSet<u32> = &self.state.unlocked_worlds;
        self.worlds.next_unlockable(&self.state.resources, unlocked)
    }
}
