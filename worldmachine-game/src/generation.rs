//! The resource-generation pipeline.
//!
//! Yields are built up through a fixed stack of multiplicative stages. The
//! stage order is load-bearing: amounts are floored to integers only at the
//! very end, so reordering stages changes rounding.
//!
//! Stages, in order: world base formula, temperature and atmosphere bands,
//! weather, upgrades, world special effect, heat-pressure synergy (world
//! creation only), active events, achievement bonuses, permanent efficiency,
//! integer floor.

use rand::Rng;

use crate::achievements::BonusTable;
use crate::constants::{
    ADAPTIVE_LEARNING_RATE, ATMOSPHERE_HIGH_THRESHOLD, ATMOSPHERE_LOW_THRESHOLD, COMPRESSION_RATIO,
    ENERGY_DECAY_RATE, MANUAL_BASE_YIELD, RANDOM_YIELD_MAX, RANDOM_YIELD_MIN,
    SYNCHRONIZER_ENERGY_PER_LEVEL, SYNERGY_HEAT_MULTIPLIER, SYNERGY_PRESSURE_THRESHOLD,
    TEMP_COLD_THRESHOLD, TEMP_HOT_THRESHOLD, VALVE_HEAT_PER_LEVEL, VALVE_PRESSURE_THRESHOLD,
    VALVE_STABILITY_GATE, WORLD_OWNERSHIP_BONUS,
};
use crate::events::{ActiveEvent, event_multiplier};
use crate::resources::{ResourceDelta, ResourceId, ResourceLedger};
use crate::upgrades::{UpgradeCatalog, UpgradeId, UpgradeProgress};
use crate::weather::{ChaoticVariance, Weather};
use crate::worlds::{Environment, SpecialEffect, WorldDef};

/// Borrowed view of everything a generation call reads.
pub struct PipelineContext<'a> {
    pub world: &'a WorldDef,
    /// Live weather, which rotates independently of the catalog default.
    pub weather: Weather,
    pub upgrades: &'a UpgradeCatalog,
    pub progress: &'a UpgradeProgress,
    pub ledger: &'a ResourceLedger,
    pub active_events: &'a [ActiveEvent],
    pub bonuses: &'a BonusTable,
    /// Permanent resource-efficiency multiplier, applied last.
    pub permanent_efficiency: f64,
    pub worlds_created: u32,
}

/// Result of one generation call, pre-credit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationOutcome {
    /// Integer-floored yields ready to credit to the ledger.
    pub yields: ResourceDelta,
    /// Whether the heat-pressure synergy fired this call.
    pub synergy_applied: bool,
    /// The shared chaotic variance factor used, when weather was chaotic.
    pub chaotic_factor: Option<f64>,
}

/// Result of cross-upgrade side effects after a generation call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SideEffects {
    /// Deltas to apply (valve pressure drain, granted heat and energy).
    pub deltas: ResourceDelta,
    /// Resources converted through the pressure valve, for telemetry.
    pub converted: f64,
}

/// Pressure base formula from the world environment.
#[must_use]
pub fn pressure_base(env: &Environment) -> f64 {
    2.0 + env.gravity * 3.0 + env.atmosphere / 25.0
}

/// Stability base formula: additive around 1 with weather and temperature
/// adjustments.
#[must_use]
pub fn stability_base(env: &Environment, weather: Weather) -> f64 {
    let mut base = 1.0 + weather.stability_adjustment();
    if env.temperature > TEMP_HOT_THRESHOLD {
        base -= 0.2;
    } else if env.temperature < TEMP_COLD_THRESHOLD {
        base += 0.1;
    }
    base.max(0.0)
}

/// Energy derives from current heat and fuel rather than a world rate.
#[must_use]
pub fn energy_base(heat: f64, fuel: f64) -> f64 {
    (0.1 * heat + 0.1 * fuel) / 4.0
}

/// Per-tick energy decay, scaled by world time speed. Returns the (negative)
/// delta to apply.
#[must_use]
pub fn energy_decay(current_energy: f64, time_speed: f64) -> f64 {
    -(current_energy * time_speed * ENERGY_DECAY_RATE)
}

/// Temperature-band multiplier for a resource.
fn temperature_multiplier(env: &Environment, resource: ResourceId) -> f64 {
    if env.temperature > TEMP_HOT_THRESHOLD {
        match resource {
            ResourceId::Heat => 1.25,
            ResourceId::Magma => 1.2,
            _ => 1.0,
        }
    } else if env.temperature < TEMP_COLD_THRESHOLD {
        match resource {
            ResourceId::Fuel => 1.2,
            ResourceId::Ice => 1.3,
            _ => 1.0,
        }
    } else {
        1.0
    }
}

/// Atmosphere-band multiplier for a resource.
fn atmosphere_multiplier(env: &Environment, resource: ResourceId) -> f64 {
    if env.atmosphere > ATMOSPHERE_HIGH_THRESHOLD {
        match resource {
            ResourceId::Water | ResourceId::Oxygen => 1.15,
            _ => 1.0,
        }
    } else if env.atmosphere < ATMOSPHERE_LOW_THRESHOLD {
        match resource {
            ResourceId::Heat | ResourceId::Pressure => 1.3,
            _ => 1.0,
        }
    } else {
        1.0
    }
}

/// Weather multiplier, substituting the shared variance factor for heat and
/// fuel under chaotic skies.
fn weather_multiplier(weather: Weather, variance: ChaoticVariance, resource: ResourceId) -> f64 {
    if weather == Weather::Chaotic && ChaoticVariance::applies_to(resource) {
        variance.factor
    } else {
        weather.multiplier(resource)
    }
}

/// Special-effect multiplier for one resource (the multiplicative effects
/// only; compression is handled after the per-resource loop).
fn special_multiplier(
    special: Option<SpecialEffect>,
    resource: ResourceId,
    random_factor: f64,
    worlds_created: u32,
) -> f64 {
    match special {
        Some(SpecialEffect::FlatBoost {
            resource: boosted,
            factor,
        }) if boosted == resource => factor,
        Some(SpecialEffect::RandomYield) => random_factor,
        Some(SpecialEffect::AdaptiveLearning) => {
            1.0 + f64::from(worlds_created) * ADAPTIVE_LEARNING_RATE
        }
        _ => 1.0,
    }
}

/// One-shot world-creation reward: the full pipeline over the world's
/// generation table.
pub fn world_creation_yields<R: Rng + ?Sized>(
    ctx: &PipelineContext<'_>,
    rng: &mut R,
) -> GenerationOutcome {
    let env = &ctx.world.environment;
    let weather = ctx.weather;
    let variance = if weather == Weather::Chaotic {
        ChaoticVariance::roll(rng)
    } else {
        ChaoticVariance::neutral()
    };
    // Rolled once per call, shared by every resource this world generates.
    let random_factor = if matches!(ctx.world.special, Some(SpecialEffect::RandomYield)) {
        rng.gen_range(RANDOM_YIELD_MIN..=RANDOM_YIELD_MAX)
    } else {
        1.0
    };
    let synergy = ctx.ledger.amount(ResourceId::Pressure) > SYNERGY_PRESSURE_THRESHOLD;

    let mut outcome = GenerationOutcome {
        yields: ResourceDelta::new(),
        synergy_applied: false,
        chaotic_factor: (weather == Weather::Chaotic).then_some(variance.factor),
    };

    for (&resource, rate) in &ctx.world.generation {
        let mut amount = match resource {
            ResourceId::Pressure => pressure_base(env) * rate.multiplier,
            ResourceId::Stability => stability_base(env, weather) * rate.multiplier,
            ResourceId::Energy => {
                energy_base(
                    ctx.ledger.amount(ResourceId::Heat),
                    ctx.ledger.amount(ResourceId::Fuel),
                ) * rate.multiplier
            }
            _ => rate.base * rate.multiplier,
        };
        amount *= temperature_multiplier(env, resource);
        amount *= atmosphere_multiplier(env, resource);
        amount *= weather_multiplier(weather, variance, resource);
        amount *= ctx
            .upgrades
            .yield_multiplier(resource, ctx.progress, ctx.ledger);
        amount *= special_multiplier(
            ctx.world.special,
            resource,
            random_factor,
            ctx.worlds_created,
        );
        if synergy && resource == ResourceId::Heat {
            amount *= SYNERGY_HEAT_MULTIPLIER;
            outcome.synergy_applied = true;
        }
        amount *= event_multiplier(ctx.active_events, resource);
        amount *= ctx.bonuses.generation_multiplier(resource);
        amount *= ctx.permanent_efficiency;
        if amount > 0.0 {
            outcome.yields.insert(resource, amount);
        }
    }

    if matches!(ctx.world.special, Some(SpecialEffect::Compression)) {
        compress_yields(&mut outcome.yields);
    }

    // Integer floor is the final stage; fractional carry is discarded.
    for amount in outcome.yields.values_mut() {
        *amount = amount.floor();
    }
    outcome.yields.retain(|_, amount| *amount > 0.0);
    outcome
}

/// Part of the stone and ice yield is compressed into crystal.
fn compress_yields(yields: &mut ResourceDelta) {
    let mut compressed = 0.0;
    for source in [ResourceId::Stone, ResourceId::Ice] {
        if let Some(amount) = yields.get_mut(&source) {
            let taken = *amount * COMPRESSION_RATIO;
            *amount -= taken;
            compressed += taken;
        }
    }
    if compressed > 0.0 {
        *yields.entry(ResourceId::Crystal).or_insert(0.0) += compressed;
    }
}

/// Manual per-click generation for a single resource.
pub fn manual_yield<R: Rng + ?Sized>(
    ctx: &PipelineContext<'_>,
    resource: ResourceId,
    rng: &mut R,
) -> GenerationOutcome {
    let env = &ctx.world.environment;
    let weather = ctx.weather;
    let variance = if weather == Weather::Chaotic {
        ChaoticVariance::roll(rng)
    } else {
        ChaoticVariance::neutral()
    };

    let mut amount = MANUAL_BASE_YIELD;
    amount *= temperature_multiplier(env, resource);
    amount *= atmosphere_multiplier(env, resource);
    amount *= weather_multiplier(weather, variance, resource);
    amount *= ctx
        .upgrades
        .yield_multiplier(resource, ctx.progress, ctx.ledger);
    // Every world owned sweetens manual clicks.
    amount *= 1.0 + f64::from(ctx.worlds_created) * WORLD_OWNERSHIP_BONUS;
    amount *= event_multiplier(ctx.active_events, resource);
    amount *= ctx.bonuses.generation_multiplier(resource);
    amount *= ctx.bonuses.manual_multiplier();
    amount *= ctx.permanent_efficiency;

    let floored = amount.floor();
    let mut yields = ResourceDelta::new();
    if floored > 0.0 {
        yields.insert(resource, floored);
    }
    GenerationOutcome {
        yields,
        synergy_applied: false,
        chaotic_factor: (weather == Weather::Chaotic).then_some(variance.factor),
    }
}

/// Cross-upgrade side effects, run after yields are credited.
///
/// The fuel synchronizer grants flat energy per level; the pressure valve
/// converts excess pressure into heat when its gates pass.
#[must_use]
pub fn cross_upgrade_side_effects(
    progress: &UpgradeProgress,
    ledger: &ResourceLedger,
    conversion_bonus: f64,
) -> SideEffects {
    let mut effects = SideEffects::default();

    let sync_level = progress.level(UpgradeId::FuelSynchronizer);
    if sync_level > 0 && progress.cross_unlocked.contains(&UpgradeId::FuelSynchronizer) {
        let energy = SYNCHRONIZER_ENERGY_PER_LEVEL * f64::from(sync_level);
        *effects.deltas.entry(ResourceId::Energy).or_insert(0.0) += energy;
    }

    let valve_level = progress.level(UpgradeId::PressureValve);
    if valve_level > 0
        && progress.cross_unlocked.contains(&UpgradeId::PressureValve)
        && ledger.amount(ResourceId::Pressure) > VALVE_PRESSURE_THRESHOLD
        && ledger.amount(ResourceId::Stability) > VALVE_STABILITY_GATE
    {
        let heat = (VALVE_HEAT_PER_LEVEL * f64::from(valve_level)).floor() * conversion_bonus;
        let heat = heat.floor();
        let excess = ledger.amount(ResourceId::Pressure) - VALVE_PRESSURE_THRESHOLD;
        let drained = heat.min(excess.floor());
        *effects.deltas.entry(ResourceId::Heat).or_insert(0.0) += heat;
        *effects.deltas.entry(ResourceId::Pressure).or_insert(0.0) -= drained;
        effects.converted += heat;
        log::debug!("pressure valve converted {heat} heat");
    }

    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::BonusTable;
    use crate::resources::{CapPolicy, delta_of};
    use crate::worlds::WorldCatalog;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn context_parts() -> (WorldCatalog, UpgradeCatalog, UpgradeProgress, BonusTable) {
        (
            WorldCatalog::default_catalog(),
            UpgradeCatalog::default_catalog(),
            UpgradeProgress::default(),
            BonusTable::default(),
        )
    }

    #[test]
    fn secondary_base_formulas() {
        let env = Environment {
            gravity: 1.6,
            atmosphere: 40.0,
            ..Environment::default()
        };
        assert!((pressure_base(&env) - (2.0 + 4.8 + 1.6)).abs() < 1e-12);
        assert!((energy_base(100.0, 60.0) - 4.0).abs() < 1e-12);
        assert!((energy_decay(50.0, 1.5) + 1.5).abs() < 1e-12);
    }

    #[test]
    fn stability_base_reacts_to_weather_and_temperature() {
        let calm = Environment::default();
        assert!((stability_base(&calm, Weather::Calm) - 1.5).abs() < 1e-12);

        let hot = Environment {
            temperature: 320.0,
            ..Environment::default()
        };
        assert!((stability_base(&hot, Weather::Stormy) - 0.5).abs() < 1e-12);

        let cold = Environment {
            temperature: -40.0,
            ..Environment::default()
        };
        assert!((stability_base(&cold, Weather::Calm) - 1.6).abs() < 1e-12);
    }

    #[test]
    fn yields_are_integer_floored() {
        let (worlds, upgrades, progress, bonuses) = context_parts();
        let ledger = ResourceLedger::default();
        let ctx = PipelineContext {
            world: worlds.get(0).unwrap(),
            weather: worlds.get(0).unwrap().environment.weather,
            upgrades: &upgrades,
            progress: &progress,
            ledger: &ledger,
            active_events: &[],
            bonuses: &bonuses,
            permanent_efficiency: 1.0,
            worlds_created: 0,
        };
        let mut rng = SmallRng::seed_from_u64(5);
        let outcome = world_creation_yields(&ctx, &mut rng);
        for (&resource, &amount) in &outcome.yields {
            assert!(
                (amount - amount.floor()).abs() < f64::EPSILON,
                "{resource} yield {amount} not an integer"
            );
            assert!(amount > 0.0);
        }
    }

    #[test]
    fn synergy_fires_only_above_pressure_threshold() {
        let (worlds, upgrades, progress, bonuses) = context_parts();
        let caps = CapPolicy::default();
        let mut ledger = ResourceLedger::default();
        let mut rng = SmallRng::seed_from_u64(9);

        let ctx = PipelineContext {
            world: worlds.get(0).unwrap(),
            weather: worlds.get(0).unwrap().environment.weather,
            upgrades: &upgrades,
            progress: &progress,
            ledger: &ledger,
            active_events: &[],
            bonuses: &bonuses,
            permanent_efficiency: 1.0,
            worlds_created: 0,
        };
        let quiet = world_creation_yields(&ctx, &mut rng);
        assert!(!quiet.synergy_applied);
        drop(ctx);

        ledger.add(&delta_of(ResourceId::Pressure, 45.0), &caps);
        let ctx = PipelineContext {
            world: worlds.get(0).unwrap(),
            weather: worlds.get(0).unwrap().environment.weather,
            upgrades: &upgrades,
            progress: &progress,
            ledger: &ledger,
            active_events: &[],
            bonuses: &bonuses,
            permanent_efficiency: 1.0,
            worlds_created: 0,
        };
        let boosted = world_creation_yields(&ctx, &mut rng);
        assert!(boosted.synergy_applied);
        assert!(boosted.yields[&ResourceId::Heat] >= quiet.yields[&ResourceId::Heat]);
    }

    #[test]
    fn chaotic_variance_is_shared_between_heat_and_fuel() {
        let (worlds, upgrades, progress, bonuses) = context_parts();
        let ledger = ResourceLedger::default();
        // Volcanic planet runs chaotic weather and generates heat.
        let volcanic = worlds.get(4).unwrap();
        let ctx = PipelineContext {
            world: volcanic,
            weather: volcanic.environment.weather,
            upgrades: &upgrades,
            progress: &progress,
            ledger: &ledger,
            active_events: &[],
            bonuses: &bonuses,
            permanent_efficiency: 1.0,
            worlds_created: 0,
        };
        let mut rng = SmallRng::seed_from_u64(21);
        let outcome = world_creation_yields(&ctx, &mut rng);
        let factor = outcome.chaotic_factor.unwrap();
        assert!((0.25..=1.75).contains(&factor));
    }

    #[test]
    fn compression_moves_yield_into_crystal() {
        let mut yields = ResourceDelta::from([
            (ResourceId::Stone, 8.0),
            (ResourceId::Ice, 4.0),
            (ResourceId::Crystal, 6.0),
        ]);
        compress_yields(&mut yields);
        assert!((yields[&ResourceId::Stone] - 6.0).abs() < 1e-12);
        assert!((yields[&ResourceId::Ice] - 3.0).abs() < 1e-12);
        assert!((yields[&ResourceId::Crystal] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn manual_click_scales_with_worlds_owned() {
        let (worlds, upgrades, progress, bonuses) = context_parts();
        let ledger = ResourceLedger::default();
        let mut rng = SmallRng::seed_from_u64(2);

        let few = PipelineContext {
            world: worlds.get(0).unwrap(),
            weather: worlds.get(0).unwrap().environment.weather,
            upgrades: &upgrades,
            progress: &progress,
            ledger: &ledger,
            active_events: &[],
            bonuses: &bonuses,
            permanent_efficiency: 1.0,
            worlds_created: 0,
        };
        let base = manual_yield(&few, ResourceId::Fuel, &mut rng);
        drop(few);

        let many = PipelineContext {
            world: worlds.get(0).unwrap(),
            weather: worlds.get(0).unwrap().environment.weather,
            upgrades: &upgrades,
            progress: &progress,
            ledger: &ledger,
            active_events: &[],
            bonuses: &bonuses,
            permanent_efficiency: 1.0,
            worlds_created: 10,
        };
        let scaled = manual_yield(&many, ResourceId::Fuel, &mut rng);
        assert!(
            scaled.yields[&ResourceId::Fuel] >= 2.0 * base.yields[&ResourceId::Fuel],
            "ten worlds double the click"
        );
    }

    #[test]
    fn pressure_valve_converts_excess_into_heat() {
        let caps = CapPolicy::default();
        let mut ledger = ResourceLedger::default();
        ledger.add(&delta_of(ResourceId::Pressure, 85.0), &caps);
        ledger.add(&delta_of(ResourceId::Stability, 25.0), &caps);

        let mut progress = UpgradeProgress::default();
        progress.levels.insert(UpgradeId::PressureValve, 2);
        progress.cross_unlocked.insert(UpgradeId::PressureValve);

        let effects = cross_upgrade_side_effects(&progress, &ledger, 1.0);
        assert!((effects.deltas[&ResourceId::Heat] - 4.0).abs() < f64::EPSILON);
        assert!((effects.converted - 4.0).abs() < f64::EPSILON);

        // Below the stability gate nothing converts.
        ledger.subtract(&delta_of(ResourceId::Stability, 10.0), &caps);
        let effects = cross_upgrade_side_effects(&progress, &ledger, 1.0);
        assert!(!effects.deltas.contains_key(&ResourceId::Heat));
    }

    #[test]
    fn synchronizer_grants_flat_energy() {
        let ledger = ResourceLedger::default();
        let mut progress = UpgradeProgress::default();
        progress.levels.insert(UpgradeId::FuelSynchronizer, 3);
        progress.cross_unlocked.insert(UpgradeId::FuelSynchronizer);

        let effects = cross_upgrade_side_effects(&progress, &ledger, 1.0);
        assert!((effects.deltas[&ResourceId::Energy] - 3.0).abs() < f64::EPSILON);
    }
}
