//! Tuning constants for the progression engine.

/// Geometric growth factor for upgrade cost curves.
pub const UPGRADE_COST_GROWTH: f64 = 1.5;

/// Base chance that a qualifying action rolls a random event.
pub const EVENT_BASE_CHANCE: f64 = 0.30;
/// Maximum shift applied to the event chance at the stability extremes.
pub const EVENT_STABILITY_SWING: f64 = 0.25;
/// Base probability mass of the negative rarity tier.
pub const EVENT_NEGATIVE_BASE: f64 = 0.15;
/// Floor for the negative tier even at full stability.
pub const EVENT_NEGATIVE_FLOOR: f64 = 0.05;
/// Sentinel duration marking an event effect as permanent.
pub const EVENT_PERMANENT_DURATION: i32 = -1;

/// Base yield for one manual generation click, before any multipliers.
pub const MANUAL_BASE_YIELD: f64 = 1.0;
/// Bonus per created world applied to manual generation.
pub const WORLD_OWNERSHIP_BONUS: f64 = 0.1;

/// Hot temperature band threshold (degrees C).
pub const TEMP_HOT_THRESHOLD: f64 = 75.0;
/// Cold temperature band threshold (degrees C).
pub const TEMP_COLD_THRESHOLD: f64 = 0.0;
/// Dense atmosphere band threshold.
pub const ATMOSPHERE_HIGH_THRESHOLD: f64 = 70.0;
/// Thin atmosphere band threshold.
pub const ATMOSPHERE_LOW_THRESHOLD: f64 = 30.0;

/// Pressure level above which the heat synergy kicks in during world creation.
pub const SYNERGY_PRESSURE_THRESHOLD: f64 = 40.0;
/// Heat multiplier granted by the pressure synergy.
pub const SYNERGY_HEAT_MULTIPLIER: f64 = 1.3;

/// Pressure level above which the pressure valve starts converting.
pub const VALVE_PRESSURE_THRESHOLD: f64 = 80.0;
/// Stability gate for the pressure valve to operate.
pub const VALVE_STABILITY_GATE: f64 = 20.0;
/// Heat granted per valve level on each conversion.
pub const VALVE_HEAT_PER_LEVEL: f64 = 2.0;

/// Pressure gate for the thermal accelerator to contribute its multiplier.
pub const ACCELERATOR_PRESSURE_GATE: f64 = 50.0;
/// Energy granted per fuel synchronizer level on each generation call.
pub const SYNCHRONIZER_ENERGY_PER_LEVEL: f64 = 1.0;

/// Fraction of current energy lost per tick, scaled by world time speed.
pub const ENERGY_DECAY_RATE: f64 = 0.02;

/// Chaotic weather variance bounds (fractional swing applied to heat and fuel).
pub const CHAOTIC_VARIANCE_MIN: f64 = 0.25;
pub const CHAOTIC_VARIANCE_MAX: f64 = 0.75;

/// Random-yield special effect bounds, rolled once per generation call.
pub const RANDOM_YIELD_MIN: f64 = 0.5;
pub const RANDOM_YIELD_MAX: f64 = 2.0;

/// Adaptive-learning special effect bonus per created world.
pub const ADAPTIVE_LEARNING_RATE: f64 = 0.02;
/// Fraction of stone and ice yield compressed into crystal.
pub const COMPRESSION_RATIO: f64 = 0.25;

/// Window length in seconds for the manual generation challenge.
pub const MANUAL_CHALLENGE_WINDOW_SECS: u64 = 10;
/// Relative tolerance for the heat/fuel balance streak.
pub const BALANCE_TOLERANCE: f64 = 0.10;

/// Default auto-save interval in seconds (0 disables).
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u32 = 30;
