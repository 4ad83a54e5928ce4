//! Achievement catalog, requirement evaluation, and bonus computation.
//!
//! Unlocks are idempotent and monotonic. The bonus table is recomputed from
//! scratch on every call so it always agrees with the unlocked set, even
//! right after a load.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::resources::{ResourceId, ResourceLedger};
use crate::upgrades::{UpgradeCatalog, UpgradeId, UpgradeProgress};
use crate::worlds::WorldCatalog;

/// Categories a structured achievement reward can boost.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum BonusCategory {
    HeatGeneration,
    FuelGeneration,
    PressureGeneration,
    EnergyGeneration,
    StabilityGeneration,
    UpgradeEfficiency,
    AllGeneration,
    ConversionEfficiency,
    ManualGeneration,
    ResourceCaps,
    WorldCreationSpeed,
    BalancedGeneration,
    ContinuousGeneration,
    ParallelGeneration,
}

impl BonusCategory {
    /// The per-resource generation category for a resource, if one exists.
    #[must_use]
    pub const fn for_resource(resource: ResourceId) -> Option<Self> {
        match resource {
            ResourceId::Heat => Some(Self::HeatGeneration),
            ResourceId::Fuel => Some(Self::FuelGeneration),
            ResourceId::Pressure => Some(Self::PressureGeneration),
            ResourceId::Energy => Some(Self::EnergyGeneration),
            ResourceId::Stability => Some(Self::StabilityGeneration),
            _ => None,
        }
    }
}

/// Feature flags toggled by achievement rewards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum FeatureUnlock {
    AutoConversion,
    RatioBonuses,
    BulkPurchasing,
    DailyBonuses,
    AdvancedAutomation,
    QuickNavigation,
}

/// Structured reward descriptor: a percentage bonus in one category and/or
/// a feature-flag unlock. Either side may be absent (title-only rewards).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RewardEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<BonusGrant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<FeatureUnlock>,
}

/// A single percentage bonus in one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BonusGrant {
    pub category: BonusCategory,
    pub percent: f64,
}

/// Closed set of requirement kinds, one variant per counter the engine tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    ResourceThreshold { resource: ResourceId, min: f64 },
    WorldCount { min: u32 },
    UpgradeLevel { upgrade: UpgradeId, min: u32 },
    MaxedBasicUpgrades { count: u32 },
    AchievementCount { min: u32 },
    Playtime { secs: u64 },
    ClickCount { min: u64 },
    ResetCount { min: u32 },
    SynergyActivations { min: u64 },
    /// All listed resources within a relative tolerance of their mean.
    ResourceBalance { resources: Vec<ResourceId>, tolerance: f64 },
    ResourceTotal { resources: Vec<ResourceId>, min_sum: f64 },
    /// Fraction of visible achievements unlocked.
    CompletionPercentage { min_pct: f64 },
    /// Reach a world count within a playtime budget.
    SpeedRun { world_count: u32, within_secs: u64 },
    ConversionTotal { min: f64 },
    /// Heat/fuel ratio held near 1:1 for a continuous duration.
    RatioHeld { secs: u64 },
    /// Continuous balanced-generation streak.
    Streak { secs: u64 },
    /// Distinct resources ever seen above zero.
    Discovery { distinct_resources: u32 },
    /// Manual clicks packed into a short window.
    ManualChallenge { clicks: u32 },
    /// Basic upgrades simultaneously at level >= 1.
    SimultaneousGenerators { min: u32 },
    CapHits { min: u64 },
    FeatureUsage { feature: FeatureUnlock, secs: u64 },
    PageVisits { min: u32 },
    /// Reach a resource threshold while an upgrade stays below a level.
    ConstrainedGoal {
        resource: ResourceId,
        min: f64,
        limited_upgrade: UpgradeId,
        max_level: u32,
    },
    TierWorldCount { tier: u8, min: u32 },
    TierVariety { distinct_tiers: u32 },
}

/// A catalog entry describing one achievement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDef {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub requirement: Requirement,
    #[serde(default)]
    pub reward: RewardEffect,
    #[serde(default)]
    pub hidden: bool,
    /// Hidden achievements stay invisible to the evaluator until this code
    /// has been entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_code: Option<String>,
}

/// Counters the evaluator consumes, accumulated by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Telemetry {
    pub playtime_seconds: u64,
    pub click_count: u64,
    pub reset_count: u32,
    pub synergy_activations: u64,
    pub conversion_total: f64,
    pub cap_hits: u64,
    pub page_visits: u32,
    /// Seconds the heat/fuel ratio has been continuously held near 1:1.
    pub ratio_held_seconds: u64,
    /// Seconds of the current balanced-generation streak.
    pub balance_streak_seconds: u64,
    /// Manual clicks inside the rolling challenge window.
    pub clicks_in_window: u32,
    /// Tick count when the current challenge window opened.
    pub window_opened_at: u64,
    /// Resources ever observed above zero.
    pub discovered: BTreeSet<ResourceId>,
    /// Seconds each unlocked feature has been in use.
    pub feature_usage_seconds: BTreeMap<FeatureUnlock, u64>,
    /// Playtime at which each world-count milestone was first reached.
    pub world_count_times: BTreeMap<u32, u64>,
}

impl Telemetry {
    /// Record resources currently above zero into the discovery set.
    pub fn record_discoveries(&mut self, ledger: &ResourceLedger) {
        for (id, amount) in ledger.iter() {
            if amount > 0.0 {
                self.discovered.insert(id);
            }
        }
    }

    /// Record the playtime at which a world-count milestone was reached.
    pub fn record_world_milestone(&mut self, worlds_created: u32) {
        self.world_count_times
            .entry(worlds_created)
            .or_insert(self.playtime_seconds);
    }
}

/// Borrowed view of everything requirement evaluation needs.
pub struct EvalInput<'a> {
    pub ledger: &'a ResourceLedger,
    pub worlds: &'a WorldCatalog,
    pub upgrades: &'a UpgradeCatalog,
    pub progress: &'a UpgradeProgress,
    pub telemetry: &'a Telemetry,
    pub unlocked_worlds: &'a BTreeSet<u32>,
    pub worlds_created: u32,
    pub unlocked_achievements: u32,
    pub entered_codes: &'a BTreeSet<String>,
}

/// Full multiplier table recomputed from the unlocked set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BonusTable {
    pub by_category: BTreeMap<BonusCategory, f64>,
    pub features: BTreeSet<FeatureUnlock>,
}

impl BonusTable {
    fn fraction(&self, category: BonusCategory) -> f64 {
        self.by_category.get(&category).copied().unwrap_or(0.0)
    }

    /// Generation multiplier for a resource: all-generation plus the
    /// resource's own category.
    #[must_use]
    pub fn generation_multiplier(&self, resource: ResourceId) -> f64 {
        let mut bonus = self.fraction(BonusCategory::AllGeneration);
        if let Some(category) = BonusCategory::for_resource(resource) {
            bonus += self.fraction(category);
        }
        1.0 + bonus
    }

    /// Multiplier applied to manual clicks on top of generation bonuses.
    #[must_use]
    pub fn manual_multiplier(&self) -> f64 {
        1.0 + self.fraction(BonusCategory::ManualGeneration)
    }

    /// Extra multiplier on every finite resource cap.
    #[must_use]
    pub fn cap_multiplier(&self) -> f64 {
        1.0 + self.fraction(BonusCategory::ResourceCaps)
    }

    /// Cost-reduction factor from upgrade-efficiency bonuses (<= 1).
    #[must_use]
    pub fn upgrade_cost_factor(&self) -> f64 {
        (1.0 - self.fraction(BonusCategory::UpgradeEfficiency)).max(0.1)
    }

    /// Multiplier on cross-upgrade conversion yields.
    #[must_use]
    pub fn conversion_multiplier(&self) -> f64 {
        1.0 + self.fraction(BonusCategory::ConversionEfficiency)
    }

    #[must_use]
    pub fn has_feature(&self, feature: FeatureUnlock) -> bool {
        self.features.contains(&feature)
    }
}

/// The full static achievement catalog plus its evaluation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementCatalog {
    pub achievements: Vec<AchievementDef>,
}

impl AchievementCatalog {
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&AchievementDef> {
        self.achievements.iter().find(|def| def.id == id)
    }

    /// Count of achievements visible without a secret code.
    #[must_use]
    pub fn visible_count(&self) -> u32 {
        u32::try_from(self.achievements.iter().filter(|def| !def.hidden).count()).unwrap_or(0)
    }

    /// Evaluate every locked achievement; move newly satisfied ones into
    /// `unlocked` and return their ids. Already-unlocked ids are skipped, so
    /// a second call with unchanged state returns nothing.
    pub fn check_all(&self, unlocked: &mut BTreeSet<u32>, input: &EvalInput<'_>) -> Vec<u32> {
        let mut newly = Vec::new();
        for def in &self.achievements {
            if unlocked.contains(&def.id) {
                continue;
            }
            if def.hidden
                && let Some(code) = &def.secret_code
                && !input.entered_codes.contains(code)
            {
                continue;
            }
            if self.requirement_met(&def.requirement, input) {
                unlocked.insert(def.id);
                newly.push(def.id);
                log::info!("achievement unlocked: {} ({})", def.name, def.id);
            }
        }
        newly
    }

    fn requirement_met(&self, requirement: &Requirement, input: &EvalInput<'_>) -> bool {
        let telemetry = input.telemetry;
        match requirement {
            Requirement::ResourceThreshold { resource, min } => {
                input.ledger.amount(*resource) >= *min
            }
            Requirement::WorldCount { min } => input.worlds_created >= *min,
            Requirement::UpgradeLevel { upgrade, min } => input.progress.level(*upgrade) >= *min,
            Requirement::MaxedBasicUpgrades { count } => {
                let maxed = input
                    .upgrades
                    .basics()
                    .filter(|def| input.progress.level(def.id) >= def.max_level)
                    .count();
                u32::try_from(maxed).unwrap_or(0) >= *count
            }
            Requirement::AchievementCount { min } => input.unlocked_achievements >= *min,
            Requirement::Playtime { secs } => telemetry.playtime_seconds >= *secs,
            Requirement::ClickCount { min } => telemetry.click_count >= *min,
            Requirement::ResetCount { min } => telemetry.reset_count >= *min,
            Requirement::SynergyActivations { min } => telemetry.synergy_activations >= *min,
            Requirement::ResourceBalance {
                resources,
                tolerance,
            } => {
                if resources.is_empty() {
                    return false;
                }
                let amounts: Vec<f64> = resources
                    .iter()
                    .map(|id| input.ledger.amount(*id))
                    .collect();
                let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
                mean > 0.0
                    && amounts
                        .iter()
                        .all(|amount| (amount - mean).abs() <= mean * tolerance)
            }
            Requirement::ResourceTotal { resources, min_sum } => {
                resources
                    .iter()
                    .map(|id| input.ledger.amount(*id))
                    .sum::<f64>()
                    >= *min_sum
            }
            Requirement::CompletionPercentage { min_pct } => {
                let total = self.visible_count();
                total > 0
                    && f64::from(input.unlocked_achievements) / f64::from(total) * 100.0 >= *min_pct
            }
            Requirement::SpeedRun {
                world_count,
                within_secs,
            } => telemetry
                .world_count_times
                .get(world_count)
                .is_some_and(|at| *at <= *within_secs),
            Requirement::ConversionTotal { min } => telemetry.conversion_total >= *min,
            Requirement::RatioHeld { secs } => telemetry.ratio_held_seconds >= *secs,
            Requirement::Streak { secs } => telemetry.balance_streak_seconds >= *secs,
            Requirement::Discovery { distinct_resources } => {
                u32::try_from(telemetry.discovered.len()).unwrap_or(0) >= *distinct_resources
            }
            Requirement::ManualChallenge { clicks } => telemetry.clicks_in_window >= *clicks,
            Requirement::SimultaneousGenerators { min } => {
                let active = input
                    .upgrades
                    .basics()
                    .filter(|def| input.progress.level(def.id) >= 1)
                    .count();
                u32::try_from(active).unwrap_or(0) >= *min
            }
            Requirement::CapHits { min } => telemetry.cap_hits >= *min,
            Requirement::FeatureUsage { feature, secs } => telemetry
                .feature_usage_seconds
                .get(feature)
                .is_some_and(|used| *used >= *secs),
            Requirement::PageVisits { min } => telemetry.page_visits >= *min,
            Requirement::ConstrainedGoal {
                resource,
                min,
                limited_upgrade,
                max_level,
            } => {
                input.ledger.amount(*resource) >= *min
                    && input.progress.level(*limited_upgrade) <= *max_level
            }
            Requirement::TierWorldCount { tier, min } => {
                input.worlds.unlocked_in_tier(input.unlocked_worlds, *tier)
                    >= *min as usize
            }
            Requirement::TierVariety { distinct_tiers } => {
                input.worlds.distinct_unlocked_tiers(input.unlocked_worlds)
                    >= *distinct_tiers as usize
            }
        }
    }

    /// Recompute the full bonus table from the unlocked set.
    #[must_use]
    pub fn compute_bonuses(&self, unlocked: &BTreeSet<u32>) -> BonusTable {
        let mut table = BonusTable::default();
        for def in &self.achievements {
            if !unlocked.contains(&def.id) {
                continue;
            }
            if let Some(grant) = &def.reward.bonus {
                *table.by_category.entry(grant.category).or_insert(0.0) += grant.percent / 100.0;
            }
            if let Some(feature) = def.reward.feature {
                table.features.insert(feature);
            }
        }
        table
    }

    /// Load a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into valid data.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The built-in achievement catalog.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn default_catalog() -> Self {
        fn bonus(category: BonusCategory, percent: f64) -> RewardEffect {
            RewardEffect {
                bonus: Some(BonusGrant { category, percent }),
                feature: None,
            }
        }
        fn feature(feature: FeatureUnlock) -> RewardEffect {
            RewardEffect {
                bonus: None,
                feature: Some(feature),
            }
        }
        fn plain(
            id: u32,
            name: &str,
            description: &str,
            requirement: Requirement,
            reward: RewardEffect,
        ) -> AchievementDef {
            AchievementDef {
                id,
                name: String::from(name),
                description: String::from(description),
                requirement,
                reward,
                hidden: false,
                secret_code: None,
            }
        }

        let achievements = vec![
            plain(
                1,
                "First Spark",
                "Accumulate 100 heat.",
                Requirement::ResourceThreshold {
                    resource: ResourceId::Heat,
                    min: 100.0,
                },
                bonus(BonusCategory::HeatGeneration, 5.0),
            ),
            plain(
                2,
                "Fuel Reserves",
                "Accumulate 100 fuel.",
                Requirement::ResourceThreshold {
                    resource: ResourceId::Fuel,
                    min: 100.0,
                },
                bonus(BonusCategory::FuelGeneration, 5.0),
            ),
            plain(
                3,
                "Under Pressure",
                "Reach 80 pressure.",
                Requirement::ResourceThreshold {
                    resource: ResourceId::Pressure,
                    min: 80.0,
                },
                bonus(BonusCategory::PressureGeneration, 5.0),
            ),
            plain(
                4,
                "Charged Up",
                "Reach 50 energy.",
                Requirement::ResourceThreshold {
                    resource: ResourceId::Energy,
                    min: 50.0,
                },
                bonus(BonusCategory::EnergyGeneration, 5.0),
            ),
            plain(
                5,
                "Steady Hands",
                "Reach 90 stability.",
                Requirement::ResourceThreshold {
                    resource: ResourceId::Stability,
                    min: 90.0,
                },
                bonus(BonusCategory::StabilityGeneration, 5.0),
            ),
            plain(
                6,
                "World Builder",
                "Create your first world.",
                Requirement::WorldCount { min: 1 },
                bonus(BonusCategory::AllGeneration, 2.0),
            ),
            plain(
                7,
                "Terraformer",
                "Create 4 worlds.",
                Requirement::WorldCount { min: 4 },
                bonus(BonusCategory::AllGeneration, 5.0),
            ),
            plain(
                8,
                "Machine of Worlds",
                "Create all 8 worlds.",
                Requirement::WorldCount { min: 8 },
                bonus(BonusCategory::AllGeneration, 10.0),
            ),
            plain(
                9,
                "Tinkerer",
                "Raise the heat generator to level 5.",
                Requirement::UpgradeLevel {
                    upgrade: UpgradeId::HeatGenerator,
                    min: 5,
                },
                bonus(BonusCategory::UpgradeEfficiency, 3.0),
            ),
            plain(
                10,
                "Completionist",
                "Max out 3 basic upgrades.",
                Requirement::MaxedBasicUpgrades { count: 3 },
                bonus(BonusCategory::UpgradeEfficiency, 5.0),
            ),
            plain(
                11,
                "Collector",
                "Unlock 10 achievements.",
                Requirement::AchievementCount { min: 10 },
                bonus(BonusCategory::AllGeneration, 3.0),
            ),
            plain(
                12,
                "Dedicated",
                "Play for one hour.",
                Requirement::Playtime { secs: 3600 },
                bonus(BonusCategory::ContinuousGeneration, 3.0),
            ),
            plain(
                13,
                "Clicker",
                "Generate manually 500 times.",
                Requirement::ClickCount { min: 500 },
                bonus(BonusCategory::ManualGeneration, 10.0),
            ),
            plain(
                14,
                "Fresh Start",
                "Reset the game once.",
                Requirement::ResetCount { min: 1 },
                bonus(BonusCategory::AllGeneration, 1.0),
            ),
            plain(
                15,
                "Synergist",
                "Trigger the heat-pressure synergy 25 times.",
                Requirement::SynergyActivations { min: 25 },
                bonus(BonusCategory::HeatGeneration, 5.0),
            ),
            plain(
                16,
                "Equilibrium",
                "Hold heat, fuel, and pressure within 10% of each other.",
                Requirement::ResourceBalance {
                    resources: vec![ResourceId::Heat, ResourceId::Fuel, ResourceId::Pressure],
                    tolerance: 0.10,
                },
                bonus(BonusCategory::BalancedGeneration, 5.0),
            ),
            plain(
                17,
                "Stockpile",
                "Hold 1000 combined heat and fuel.",
                Requirement::ResourceTotal {
                    resources: vec![ResourceId::Heat, ResourceId::Fuel],
                    min_sum: 1000.0,
                },
                feature(FeatureUnlock::BulkPurchasing),
            ),
            plain(
                18,
                "Halfway There",
                "Unlock 50% of visible achievements.",
                Requirement::CompletionPercentage { min_pct: 50.0 },
                bonus(BonusCategory::AllGeneration, 5.0),
            ),
            plain(
                19,
                "Speed Demon",
                "Create 3 worlds within 10 minutes of starting.",
                Requirement::SpeedRun {
                    world_count: 3,
                    within_secs: 600,
                },
                bonus(BonusCategory::WorldCreationSpeed, 10.0),
            ),
            plain(
                20,
                "Alchemist",
                "Convert 500 total resources through cross upgrades.",
                Requirement::ConversionTotal { min: 500.0 },
                feature(FeatureUnlock::AutoConversion),
            ),
            plain(
                21,
                "Perfect Ratio",
                "Hold a 1:1 heat-fuel ratio for 60 seconds.",
                Requirement::RatioHeld { secs: 60 },
                feature(FeatureUnlock::RatioBonuses),
            ),
            plain(
                22,
                "On a Roll",
                "Keep generation balanced for 120 seconds straight.",
                Requirement::Streak { secs: 120 },
                bonus(BonusCategory::ContinuousGeneration, 5.0),
            ),
            plain(
                23,
                "Prospector",
                "Discover 8 distinct resources.",
                Requirement::Discovery {
                    distinct_resources: 8,
                },
                feature(FeatureUnlock::QuickNavigation),
            ),
            plain(
                24,
                "Frenzy",
                "Click 30 times inside a ten-second window.",
                Requirement::ManualChallenge { clicks: 30 },
                bonus(BonusCategory::ManualGeneration, 15.0),
            ),
            plain(
                25,
                "Full Spread",
                "Run all 5 basic generators at once.",
                Requirement::SimultaneousGenerators { min: 5 },
                bonus(BonusCategory::ParallelGeneration, 5.0),
            ),
            plain(
                26,
                "Overflow",
                "Hit resource caps 50 times.",
                Requirement::CapHits { min: 50 },
                bonus(BonusCategory::ResourceCaps, 10.0),
            ),
            plain(
                27,
                "Automated",
                "Use auto-conversion for 300 seconds.",
                Requirement::FeatureUsage {
                    feature: FeatureUnlock::AutoConversion,
                    secs: 300,
                },
                feature(FeatureUnlock::AdvancedAutomation),
            ),
            plain(
                28,
                "Explorer",
                "Visit 20 pages of the machine.",
                Requirement::PageVisits { min: 20 },
                feature(FeatureUnlock::DailyBonuses),
            ),
            plain(
                29,
                "Purist",
                "Reach 500 heat with the heat generator at level 2 or below.",
                Requirement::ConstrainedGoal {
                    resource: ResourceId::Heat,
                    min: 500.0,
                    limited_upgrade: UpgradeId::HeatGenerator,
                    max_level: 2,
                },
                bonus(BonusCategory::ManualGeneration, 10.0),
            ),
            plain(
                30,
                "Deep Tiers",
                "Unlock both tier-3 worlds.",
                Requirement::TierWorldCount { tier: 3, min: 2 },
                bonus(BonusCategory::AllGeneration, 5.0),
            ),
            plain(
                31,
                "Well Traveled",
                "Unlock worlds across 4 different tiers.",
                Requirement::TierVariety { distinct_tiers: 4 },
                bonus(BonusCategory::ConversionEfficiency, 5.0),
            ),
            AchievementDef {
                id: 32,
                name: String::from("Ghost in the Machine"),
                description: String::from("???"),
                requirement: Requirement::ResourceThreshold {
                    resource: ResourceId::VoidEnergy,
                    min: 1.0,
                },
                reward: bonus(BonusCategory::AllGeneration, 5.0),
                hidden: true,
                secret_code: Some(String::from("VOIDWALKER")),
            },
            AchievementDef {
                id: 33,
                name: String::from("Overclocked"),
                description: String::from("???"),
                requirement: Requirement::ClickCount { min: 2000 },
                reward: bonus(BonusCategory::ManualGeneration, 25.0),
                hidden: true,
                secret_code: Some(String::from("TURBOBUTTON")),
            },
        ];
        Self { achievements }
    }
}
