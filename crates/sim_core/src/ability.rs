//! Ability descriptors and the per-encounter registry.
//!
//! An [`Ability`] is built once from its [`AbilityDef`] when its caster is spawned
//! and is shared by every cast afterwards. Only `flags` is expected to change at
//! runtime; every other field is fixed at registration.

use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsCategory;
use crate::{
    AbilityDef, AbilityId, AuraExtension, AuraId, ResourceTag, TimerId, Unit, UnitId, WeaponKind,
};

bitflags! {
    /// Attribution and behaviour flags carried by an ability.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SpellFlags: u32 {
        /// Record damage under the melee metrics bucket.
        const MELEE_METRICS            = 1 << 0;
        /// Usable from an action priority list.
        const APL                      = 1 << 1;
        /// Counts as a Retribution-rune ability for set bonuses.
        const RV                       = 1 << 2;
        const IGNORE_RESISTS           = 1 << 3;
        /// Cast through a start-attack macro; grouped with the swing batch.
        const BATCH_START_ATTACK_MACRO = 1 << 4;
        const NO_METRICS               = 1 << 5;
    }
}

impl Serialize for SpellFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        bitflags::serde::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for SpellFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bitflags::serde::deserialize(deserializer)
    }
}

impl SpellFlags {
    pub fn metrics_category(self) -> MetricsCategory {
        if self.contains(SpellFlags::MELEE_METRICS) {
            MetricsCategory::Melee
        } else {
            MetricsCategory::Spell
        }
    }
}

bitflags! {
    /// Which proc triggers an ability's hits can fire.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ProcMask: u32 {
        const MELEE_MH_AUTO    = 1 << 0;
        const MELEE_MH_SPECIAL = 1 << 1;
        const SPELL_DAMAGE     = 1 << 2;
    }
}

impl Serialize for ProcMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        bitflags::serde::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ProcMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bitflags::serde::deserialize(deserializer)
    }
}

bitflags! {
    /// Class spell family bits. Talents and set bonuses select the abilities
    /// they modify by mask rather than by id.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ClassSpellMask: u64 {
        const PALADIN_CRUSADER_STRIKE = 1 << 0;
        const PALADIN_JUDGEMENT       = 1 << 1;
        const PALADIN_SEAL            = 1 << 2;
        const PALADIN_EXORCISM        = 1 << 3;
        const PALADIN_DIVINE_STORM    = 1 << 4;
    }
}

impl Serialize for ClassSpellMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        bitflags::serde::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ClassSpellMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bitflags::serde::deserialize(deserializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellSchool {
    Physical,
    Holy,
    Fire,
    Nature,
    Frost,
    Shadow,
    Arcane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefenseType {
    None,
    Magic,
    Melee,
    Ranged,
}

/// Whether a cast triggers the caster's global cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcdPolicy {
    /// Standard GCD, not reduced by haste.
    Default,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DamageFormula {
    /// Rolled weapon damage plus attack power at normalized weapon speed.
    NormalizedWeapon,
    Flat { min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeRoll {
    MeleeSpecialHitAndCrit,
    SpellHitAndCrit,
    AlwaysHit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ability {
    pub id: AbilityId,
    pub name: String,
    pub caster: UnitId,
    pub school: SpellSchool,
    pub defense_type: DefenseType,
    pub proc_mask: ProcMask,
    pub class_mask: ClassSpellMask,
    pub flags: SpellFlags,
    /// Final multiplier, weapon specialization already folded in.
    pub damage_multiplier: f64,
    pub threat_multiplier: f64,
    pub cooldown_ms: u64,
    pub cooldown_timer: TimerId,
    pub gcd: GcdPolicy,
    pub mana_cost: f64,
    pub refund_fraction: f64,
    pub damage: DamageFormula,
    pub outcome: OutcomeRoll,
    pub extends_auras: Option<AuraExtension>,
    pub applies_aura: Option<AuraId>,
    pub mana_metrics: ResourceTag,
}

impl Ability {
    /// Build the runtime descriptor for `caster`. Returns `None` when the ability
    /// needs a rune the caster has not engraved.
    pub fn register(def: &AbilityDef, caster: &Unit) -> Option<Self> {
        if let Some(rune) = &def.requires_rune {
            if !caster.runes.contains(rune) {
                return None;
            }
        }
        let damage_multiplier = if def.weapon_specialization_scaling {
            def.damage_multiplier * weapon_specialization_modifier(caster)
        } else {
            def.damage_multiplier
        };
        Some(Self {
            id: def.id.clone(),
            name: def.name.clone(),
            caster: caster.id.clone(),
            school: def.school,
            defense_type: def.defense_type,
            proc_mask: def.proc_mask,
            class_mask: def.class_mask,
            flags: def.flags,
            damage_multiplier,
            threat_multiplier: def.threat_multiplier,
            cooldown_ms: def.cooldown_ms,
            cooldown_timer: def
                .cooldown_timer
                .clone()
                .unwrap_or_else(|| TimerId(def.id.0.clone())),
            gcd: def.gcd,
            mana_cost: def.mana_cost,
            refund_fraction: def.refund_fraction,
            damage: def.damage,
            outcome: def.outcome,
            extends_auras: def.extends_auras.clone(),
            applies_aura: def.applies_aura.clone(),
            mana_metrics: ResourceTag(format!("{}:mana", def.id.0)),
        })
    }
}

/// Two-Handed Weapon Specialization: 2% per rank while wielding a two-hander.
pub fn weapon_specialization_modifier(unit: &Unit) -> f64 {
    if unit.weapon.kind == WeaponKind::TwoHand {
        1.0 + 0.02 * f64::from(unit.talents.two_handed_weapon_specialization)
    } else {
        1.0
    }
}

/// Every ability registered in an encounter, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbilityRegistry {
    abilities: BTreeMap<AbilityId, Ability>,
}

impl AbilityRegistry {
    pub fn insert(&mut self, ability: Ability) {
        self.abilities.insert(ability.id.clone(), ability);
    }

    pub fn get(&self, id: &AbilityId) -> Option<&Ability> {
        self.abilities.get(id)
    }

    pub fn get_mut(&mut self, id: &AbilityId) -> Option<&mut Ability> {
        self.abilities.get_mut(id)
    }

    pub fn contains(&self, id: &AbilityId) -> bool {
        self.abilities.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ability> {
        self.abilities.values()
    }

    /// Abilities sharing at least one bit with `mask`.
    pub fn with_class_mask(&self, mask: ClassSpellMask) -> impl Iterator<Item = &Ability> {
        self.abilities
            .values()
            .filter(move |ability| ability.class_mask.intersects(mask))
    }

    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }
}
