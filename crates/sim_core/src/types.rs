//! Type definitions for `sim_core`.
//!
//! Time, IDs, unit state, content definitions, replay scripts, and the event log.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ability::{
    AbilityRegistry, ClassSpellMask, DamageFormula, DefenseType, GcdPolicy, OutcomeRoll, ProcMask,
    SpellFlags, SpellSchool,
};
use crate::aura::AuraTagIndex;
use crate::cooldown::CooldownTimers;
use crate::damage::HitOutcome;
use crate::metrics::{MetricsCategory, MetricsLedger};
use crate::resources::ResourcePool;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Simulation time in milliseconds since encounter start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn after(self, duration_ms: u64) -> Self {
        SimTime(self.0.saturating_add(duration_ms))
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// When an aura runs out. `Never` sorts after every finite time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    At(SimTime),
    Never,
}

impl Expiry {
    pub fn is_finite(self) -> bool {
        matches!(self, Expiry::At(_))
    }
}

impl std::fmt::Display for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expiry::At(at) => write!(f, "{at}"),
            Expiry::Never => f.write_str("never"),
        }
    }
}

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(UnitId);
string_id!(AbilityId);
string_id!(AuraId);
string_id!(AuraTag);
string_id!(TimerId);
string_id!(RuneId);
string_id!(ResourceTag);
string_id!(EventId);

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Normal,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Player,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    OneHand,
    TwoHand,
    Dagger,
}

impl WeaponKind {
    /// Normalized swing speed in seconds used by AP-normalized attacks.
    pub fn normalized_speed(self) -> f64 {
        match self {
            WeaponKind::OneHand => 2.4,
            WeaponKind::TwoHand => 3.3,
            WeaponKind::Dagger => 1.7,
        }
    }
}

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatState {
    pub meta: MetaState,
    pub units: BTreeMap<UnitId, Unit>,
    pub abilities: AbilityRegistry,
    pub metrics: MetricsLedger,
    pub counters: Counters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaState {
    pub encounter_id: String,
    pub seed: u64,
    pub schema_version: u32,
    pub content_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weapon {
    pub min_damage: f64,
    pub max_damage: f64,
    pub kind: WeaponKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Talents {
    /// Ranks in Two-Handed Weapon Specialization (0–3).
    #[serde(default)]
    pub two_handed_weapon_specialization: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub kind: UnitKind,
    pub health: f64,
    pub max_health: f64,
    pub immune: bool,
    pub mana: ResourcePool,
    pub attack_power: f64,
    pub crit_chance: f64,
    pub hit_chance: f64,
    pub dodge_chance: f64,
    pub weapon: Weapon,
    pub runes: BTreeSet<RuneId>,
    pub talents: Talents,
    pub cooldowns: CooldownTimers,
    pub auras: AuraTagIndex,
}

impl Unit {
    /// Spawn at full health and mana with no cooldowns or auras.
    pub fn from_def(def: &UnitDef) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            kind: def.kind,
            health: def.max_health,
            max_health: def.max_health,
            immune: def.immune,
            mana: ResourcePool::full(def.max_mana),
            attack_power: def.attack_power,
            crit_chance: def.crit_chance,
            hit_chance: def.hit_chance,
            dodge_chance: def.dodge_chance,
            weapon: def.weapon.clone(),
            runes: def.runes.iter().cloned().collect(),
            talents: def.talents.clone(),
            cooldowns: CooldownTimers::default(),
            auras: AuraTagIndex::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatContent {
    pub content_version: String,
    pub abilities: Vec<AbilityDef>,
    pub auras: Vec<AuraDef>,
    pub units: Vec<UnitDef>,
    pub constants: Constants,
}

impl CombatContent {
    pub fn aura_def(&self, id: &AuraId) -> Option<&AuraDef> {
        self.auras.iter().find(|def| &def.id == id)
    }

    pub fn ability_def(&self, id: &AbilityId) -> Option<&AbilityDef> {
        self.abilities.iter().find(|def| &def.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constants {
    /// Delay between a cast and its damage landing.
    pub batch_window_ms: u64,
    pub gcd_ms: u64,
    /// Base chance for a melee attack to miss a raid-level target.
    pub melee_miss_chance: f64,
    pub spell_miss_chance: f64,
    pub melee_crit_multiplier: f64,
    pub spell_crit_multiplier: f64,
    /// Attack power that adds one point of weapon DPS.
    pub attack_power_per_dps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuraExtension {
    pub tag: AuraTag,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityDef {
    pub id: AbilityId,
    pub name: String,
    pub school: SpellSchool,
    pub defense_type: DefenseType,
    pub proc_mask: ProcMask,
    #[serde(default)]
    pub class_mask: ClassSpellMask,
    pub flags: SpellFlags,
    pub damage_multiplier: f64,
    /// Scale `damage_multiplier` by the caster's weapon specialization.
    #[serde(default)]
    pub weapon_specialization_scaling: bool,
    #[serde(default = "default_threat_multiplier")]
    pub threat_multiplier: f64,
    pub cooldown_ms: u64,
    #[serde(default)]
    pub cooldown_timer: Option<TimerId>,
    pub gcd: GcdPolicy,
    #[serde(default)]
    pub mana_cost: f64,
    /// Fraction of max mana returned to the caster on every cast.
    #[serde(default)]
    pub refund_fraction: f64,
    pub damage: DamageFormula,
    pub outcome: OutcomeRoll,
    #[serde(default)]
    pub requires_rune: Option<RuneId>,
    #[serde(default)]
    pub extends_auras: Option<AuraExtension>,
    #[serde(default)]
    pub applies_aura: Option<AuraId>,
}

fn default_threat_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuraDef {
    pub id: AuraId,
    pub name: String,
    pub tag: AuraTag,
    /// `None` means the aura never expires on its own.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl AuraDef {
    pub fn expiry_from(&self, now: SimTime) -> Expiry {
        match self.duration_ms {
            Some(ms) => Expiry::At(now.after(ms)),
            None => Expiry::Never,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDef {
    pub id: UnitId,
    pub name: String,
    pub kind: UnitKind,
    pub max_health: f64,
    #[serde(default)]
    pub immune: bool,
    #[serde(default)]
    pub max_mana: f64,
    #[serde(default)]
    pub attack_power: f64,
    #[serde(default)]
    pub crit_chance: f64,
    #[serde(default)]
    pub hit_chance: f64,
    #[serde(default)]
    pub dodge_chance: f64,
    pub weapon: Weapon,
    #[serde(default)]
    pub runes: Vec<RuneId>,
    #[serde(default)]
    pub talents: Talents,
    #[serde(default)]
    pub abilities: Vec<AbilityId>,
    #[serde(default)]
    pub initial_auras: Vec<AuraId>,
}

// ---------------------------------------------------------------------------
// Replay scripts
// ---------------------------------------------------------------------------

/// A timed list of inputs replayed against the encounter clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastScript {
    pub name: String,
    pub entries: Vec<ScriptEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub at_ms: u64,
    /// Re-issue the same input every `every_ms` until the encounter ends.
    #[serde(default)]
    pub every_ms: Option<u64>,
    #[serde(flatten)]
    pub action: ScriptAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Cast {
        ability: AbilityId,
        caster: UnitId,
        target: UnitId,
    },
    ApplyAura {
        unit: UnitId,
        aura: AuraId,
    },
    RemoveAura {
        unit: UnitId,
        aura: AuraId,
    },
    SetFlags {
        ability: AbilityId,
        flags: SpellFlags,
    },
    ClearFlags {
        ability: AbilityId,
        flags: SpellFlags,
    },
}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub at: SimTime,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CastSucceeded {
        ability: AbilityId,
        caster: UnitId,
        target: UnitId,
        resolves_at: SimTime,
    },
    CastRejected {
        ability: AbilityId,
        caster: UnitId,
        target: UnitId,
        reason: String,
    },
    /// Only emitted at `EventLevel::Debug`.
    OutcomeRolled {
        ability: AbilityId,
        roll: f64,
        outcome: HitOutcome,
    },
    ResourceGained {
        unit: UnitId,
        tag: ResourceTag,
        amount: f64,
        actual: f64,
    },
    ResourceSpent {
        unit: UnitId,
        tag: ResourceTag,
        amount: f64,
    },
    DamageResolved {
        ability: AbilityId,
        target: UnitId,
        amount: f64,
        outcome: HitOutcome,
        category: MetricsCategory,
    },
    DamageNegated {
        ability: AbilityId,
        target: UnitId,
        reason: String,
    },
    AuraApplied {
        unit: UnitId,
        aura: AuraId,
        expires: Expiry,
    },
    AuraExtended {
        unit: UnitId,
        aura: AuraId,
        from: SimTime,
        to: SimTime,
    },
    AuraExpired {
        unit: UnitId,
        aura: AuraId,
    },
    AuraRemoved {
        unit: UnitId,
        aura: AuraId,
    },
    FlagsChanged {
        ability: AbilityId,
        flags: SpellFlags,
    },
    UnitDied {
        unit: UnitId,
    },
}
