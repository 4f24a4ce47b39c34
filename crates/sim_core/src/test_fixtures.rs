//! Shared test fixtures for sim_core and downstream crates.
//!
//! `base_content()` provides a paladin with Crusader Strike and a Judgement, a
//! training dummy, and three auras (two Judgements, one finite and one permanent,
//! plus an unrelated armor debuff). `minimal_content()` is the bare minimum for
//! content-validation tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ability::{
    Ability, AbilityRegistry, ClassSpellMask, DamageFormula, DefenseType, GcdPolicy, OutcomeRoll,
    ProcMask, SpellFlags, SpellSchool,
};
use crate::engine::Encounter;
use crate::metrics::MetricsLedger;
use crate::scheduler::Scheduler;
use crate::{
    AbilityDef, AbilityId, AuraDef, AuraExtension, AuraId, AuraTag, CombatContent, CombatState,
    Constants, Counters, EventLevel, MetaState, RuneId, SimTime, Talents, Unit, UnitDef, UnitId,
    UnitKind, Weapon, WeaponKind,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub fn paladin_id() -> UnitId {
    UnitId("paladin".to_string())
}

pub fn target_id() -> UnitId {
    UnitId("target_dummy".to_string())
}

pub fn crusader_strike_id() -> AbilityId {
    AbilityId("crusader_strike".to_string())
}

pub fn judgement_id() -> AbilityId {
    AbilityId("judgement".to_string())
}

pub fn test_constants() -> Constants {
    Constants {
        batch_window_ms: 10,
        gcd_ms: 1500,
        melee_miss_chance: 0.08,
        spell_miss_chance: 0.17,
        melee_crit_multiplier: 2.0,
        spell_crit_multiplier: 1.5,
        attack_power_per_dps: 14.0,
    }
}

/// Crusader Strike: rune-gated, 6 s cooldown, 5% max-mana refund, extends
/// Judgements on the target to 30 s.
pub fn crusader_strike_def() -> AbilityDef {
    AbilityDef {
        id: crusader_strike_id(),
        name: "Crusader Strike".to_string(),
        school: SpellSchool::Holy,
        defense_type: DefenseType::Melee,
        proc_mask: ProcMask::MELEE_MH_SPECIAL,
        class_mask: ClassSpellMask::PALADIN_CRUSADER_STRIKE,
        flags: SpellFlags::MELEE_METRICS
            | SpellFlags::APL
            | SpellFlags::RV
            | SpellFlags::IGNORE_RESISTS
            | SpellFlags::BATCH_START_ATTACK_MACRO,
        damage_multiplier: 0.75,
        weapon_specialization_scaling: true,
        threat_multiplier: 1.0,
        cooldown_ms: 6000,
        cooldown_timer: None,
        gcd: GcdPolicy::Default,
        mana_cost: 0.0,
        refund_fraction: 0.05,
        damage: DamageFormula::NormalizedWeapon,
        outcome: OutcomeRoll::MeleeSpecialHitAndCrit,
        requires_rune: Some(RuneId("rune_hands_crusader_strike".to_string())),
        extends_auras: Some(AuraExtension {
            tag: AuraTag("judgement".to_string()),
            duration_ms: 30_000,
        }),
        applies_aura: None,
    }
}

/// Judgement: spends mana and puts Judgement of Light on the target.
pub fn judgement_def() -> AbilityDef {
    AbilityDef {
        id: judgement_id(),
        name: "Judgement".to_string(),
        school: SpellSchool::Holy,
        defense_type: DefenseType::Magic,
        proc_mask: ProcMask::SPELL_DAMAGE,
        class_mask: ClassSpellMask::PALADIN_JUDGEMENT,
        flags: SpellFlags::APL,
        damage_multiplier: 1.0,
        weapon_specialization_scaling: false,
        threat_multiplier: 1.0,
        cooldown_ms: 10_000,
        cooldown_timer: None,
        gcd: GcdPolicy::Default,
        mana_cost: 50.0,
        refund_fraction: 0.0,
        damage: DamageFormula::Flat {
            min: 50.0,
            max: 60.0,
        },
        outcome: OutcomeRoll::SpellHitAndCrit,
        requires_rune: None,
        extends_auras: None,
        applies_aura: Some(AuraId("judgement_of_light".to_string())),
    }
}

fn test_auras() -> Vec<AuraDef> {
    vec![
        AuraDef {
            id: AuraId("judgement_of_light".to_string()),
            name: "Judgement of Light".to_string(),
            tag: AuraTag("judgement".to_string()),
            duration_ms: Some(5000),
        },
        AuraDef {
            id: AuraId("judgement_of_wisdom".to_string()),
            name: "Judgement of Wisdom".to_string(),
            tag: AuraTag("judgement".to_string()),
            duration_ms: None,
        },
        AuraDef {
            id: AuraId("sunder_armor".to_string()),
            name: "Sunder Armor".to_string(),
            tag: AuraTag("armor".to_string()),
            duration_ms: Some(30_000),
        },
    ]
}

fn paladin_def() -> UnitDef {
    UnitDef {
        id: paladin_id(),
        name: "Paladin".to_string(),
        kind: UnitKind::Player,
        max_health: 5000.0,
        immune: false,
        max_mana: 2000.0,
        attack_power: 1400.0,
        crit_chance: 0.1,
        hit_chance: 0.05,
        dodge_chance: 0.0,
        weapon: Weapon {
            min_damage: 120.0,
            max_damage: 180.0,
            kind: WeaponKind::TwoHand,
        },
        runes: vec![RuneId("rune_hands_crusader_strike".to_string())],
        talents: Talents {
            two_handed_weapon_specialization: 3,
        },
        abilities: vec![crusader_strike_id(), judgement_id()],
        initial_auras: vec![],
    }
}

fn target_def() -> UnitDef {
    UnitDef {
        id: target_id(),
        name: "Training Dummy".to_string(),
        kind: UnitKind::Target,
        max_health: 1_000_000.0,
        immune: false,
        max_mana: 0.0,
        attack_power: 0.0,
        crit_chance: 0.0,
        hit_chance: 0.0,
        dodge_chance: 0.05,
        weapon: Weapon {
            min_damage: 0.0,
            max_damage: 0.0,
            kind: WeaponKind::OneHand,
        },
        runes: vec![],
        talents: Talents::default(),
        abilities: vec![],
        initial_auras: vec![],
    }
}

/// Full content: one paladin, one target dummy, two abilities, three auras.
pub fn base_content() -> CombatContent {
    CombatContent {
        content_version: "test".to_string(),
        abilities: vec![crusader_strike_def(), judgement_def()],
        auras: test_auras(),
        units: vec![paladin_def(), target_def()],
        constants: test_constants(),
    }
}

/// Bare-minimum content for validation tests: no abilities, no auras, one target.
pub fn minimal_content() -> CombatContent {
    CombatContent {
        content_version: "test".to_string(),
        abilities: vec![],
        auras: vec![],
        units: vec![target_def()],
        constants: test_constants(),
    }
}

/// The content's paladin, freshly spawned.
pub fn spawn_paladin(content: &CombatContent) -> Unit {
    let def = content
        .units
        .iter()
        .find(|def| def.id == paladin_id())
        .expect("base content has a paladin");
    Unit::from_def(def)
}

pub fn spawn_target(content: &CombatContent) -> Unit {
    let def = content
        .units
        .iter()
        .find(|def| def.id == target_id())
        .expect("base content has a target");
    Unit::from_def(def)
}

/// Every unit spawned, abilities registered, initial auras applied at t=0.
pub fn base_state(content: &CombatContent) -> CombatState {
    let mut units = BTreeMap::new();
    let mut abilities = AbilityRegistry::default();
    for def in &content.units {
        let mut unit = Unit::from_def(def);
        for ability_id in &def.abilities {
            let ability_def = content
                .ability_def(ability_id)
                .expect("unit references known ability");
            if let Some(ability) = Ability::register(ability_def, &unit) {
                abilities.insert(ability);
            }
        }
        for aura_id in &def.initial_auras {
            let aura = content.aura_def(aura_id).expect("unit references known aura");
            unit.auras.apply(
                aura.id.clone(),
                aura.tag.clone(),
                aura.expiry_from(SimTime::ZERO),
                SimTime::ZERO,
            );
        }
        units.insert(unit.id.clone(), unit);
    }

    CombatState {
        meta: MetaState {
            encounter_id: "encounter_test".to_string(),
            seed: 42,
            schema_version: 1,
            content_version: content.content_version.clone(),
        },
        units,
        abilities,
        metrics: MetricsLedger::default(),
        counters: Counters::default(),
    }
}

/// Deterministic RNG seeded with 42.
pub fn make_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}

/// A fresh encounter over `content` at t=0 with an empty scheduler.
pub fn base_encounter(content: CombatContent) -> (Encounter, Scheduler<Encounter>) {
    let state = base_state(&content);
    let encounter = Encounter::new(Arc::new(content), state, 42, EventLevel::Normal);
    (encounter, Scheduler::new())
}
