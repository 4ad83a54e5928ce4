//! The Machine of Worlds Engine
//!
//! Platform-agnostic progression and economy core for The Machine of Worlds
//! incremental game. This crate provides the world/upgrade/achievement data
//! model, the deterministic generation pipeline, random events, and the
//! validated save/recovery subsystem, without UI or platform dependencies.

pub mod achievements;
pub mod constants;
pub mod controller;
pub mod events;
pub mod generation;
pub mod resources;
pub mod rng;
pub mod save;
pub mod state;
pub mod upgrades;
pub mod weather;
pub mod worlds;

// Re-export commonly used types
pub use achievements::{
    AchievementCatalog, AchievementDef, BonusCategory, BonusGrant, BonusTable, EvalInput,
    FeatureUnlock, Requirement, RewardEffect, Telemetry,
};
pub use controller::{
    ControllerError, GameClock, Notification, ProgressionController, SelectOutcome, VirtualClock,
};
pub use events::{
    ActiveEvent, ChoiceEffect, ChoiceResolution, EventChoice, EventDef, EventEngine, PermanentGain,
    Rarity, decrement_active, event_chance, event_multiplier, negative_tier_probability,
};
pub use generation::{
    GenerationOutcome, PipelineContext, SideEffects, cross_upgrade_side_effects, energy_base,
    energy_decay, manual_yield, pressure_base, stability_base, world_creation_yields,
};
pub use resources::{CapPolicy, ResourceDelta, ResourceId, ResourceLedger, delta_of};
pub use rng::{CountingRng, RngBundle};
pub use save::{
    BACKUP_KEY, BackupRing, BackupSlot, LoadSource, MAX_BACKUPS, MemoryStorage, SAVE_KEY,
    SaveError, SaveStateManager, SaveStorage, validate,
};
pub use state::{GameState, PermanentBonuses, Settings};
pub use upgrades::{
    PurchaseOutcome, ResourceGate, UpgradeCatalog, UpgradeDef, UpgradeId, UpgradeKind,
    UpgradeProgress,
};
pub use weather::{ChaoticVariance, WEATHER_ORDER, Weather, rotate_weather};
pub use worlds::{
    Environment, GenRate, SpecialEffect, WorldCatalog, WorldDef, WorldHistoryEntry,
};
