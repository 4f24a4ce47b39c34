//! Content loading, validation, and encounter setup shared between sim_cli and sim_bench.

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sim_core::{
    Ability, AbilityDef, AbilityRegistry, AuraDef, CastScript, CombatContent, CombatState,
    Constants, Counters, DamageFormula, MetaState, ScriptAction, SimTime, Unit, UnitDef, UnitId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Deserialize)]
struct AbilitiesFile {
    content_version: String,
    abilities: Vec<AbilityDef>,
}

#[derive(Deserialize)]
struct AurasFile {
    auras: Vec<AuraDef>,
}

#[derive(Deserialize)]
struct UnitsFile {
    units: Vec<UnitDef>,
}

fn assert_chance(owner: &str, field: &str, value: f64) {
    assert!(
        (0.0..=1.0).contains(&value),
        "{owner} {field} {value} is not a chance in [0, 1]",
    );
}

/// Validates loaded content, panicking on any authoring error.
///
/// Catches mistakes like: a unit listing an ability that doesn't exist, an
/// ability extending a tag no aura carries, or a damage range with min > max.
pub fn validate_content(content: &CombatContent) {
    validate_constants(&content.constants);

    let mut aura_ids = HashSet::new();
    for aura in &content.auras {
        assert!(
            aura_ids.insert(&aura.id),
            "aura '{}' is defined more than once",
            aura.id
        );
        assert!(
            aura.duration_ms != Some(0),
            "aura '{}' has a zero duration; omit duration_ms for a permanent aura",
            aura.id
        );
    }
    let aura_tags: HashSet<_> = content.auras.iter().map(|a| &a.tag).collect();

    let mut ability_ids = HashSet::new();
    for ability in &content.abilities {
        assert!(
            ability_ids.insert(&ability.id),
            "ability '{}' is defined more than once",
            ability.id
        );
        validate_ability(ability);
        if let Some(extension) = &ability.extends_auras {
            assert!(
                aura_tags.contains(&extension.tag),
                "ability '{}' extends tag '{}' which no aura carries",
                ability.id,
                extension.tag,
            );
        }
        if let Some(aura) = &ability.applies_aura {
            assert!(
                aura_ids.contains(aura),
                "ability '{}' applies aura '{}' which is not a known aura",
                ability.id,
                aura,
            );
        }
    }

    // Registered abilities are keyed by id and bound to a single caster.
    let mut owners: HashMap<_, _> = HashMap::new();
    let mut unit_ids = HashSet::new();
    for unit in &content.units {
        assert!(
            unit_ids.insert(&unit.id),
            "unit '{}' is defined more than once",
            unit.id
        );
        validate_unit(unit);
        for ability in &unit.abilities {
            assert!(
                ability_ids.contains(ability),
                "unit '{}' lists ability '{}' which is not a known ability",
                unit.id,
                ability,
            );
            if let Some(previous) = owners.insert(ability, &unit.id) {
                panic!(
                    "ability '{ability}' is listed by both '{previous}' and '{}'",
                    unit.id
                );
            }
        }
        for aura in &unit.initial_auras {
            assert!(
                aura_ids.contains(aura),
                "unit '{}' starts with aura '{}' which is not a known aura",
                unit.id,
                aura,
            );
        }
    }
}

fn validate_constants(c: &Constants) {
    assert_chance("constants", "melee_miss_chance", c.melee_miss_chance);
    assert_chance("constants", "spell_miss_chance", c.spell_miss_chance);
    assert!(
        c.melee_crit_multiplier >= 1.0 && c.spell_crit_multiplier >= 1.0,
        "crit multipliers must be at least 1.0 (melee {}, spell {})",
        c.melee_crit_multiplier,
        c.spell_crit_multiplier,
    );
    assert!(
        c.attack_power_per_dps > 0.0,
        "attack_power_per_dps must be positive, got {}",
        c.attack_power_per_dps
    );
}

fn validate_ability(ability: &AbilityDef) {
    let owner = format!("ability '{}'", ability.id);
    assert!(
        ability.damage_multiplier >= 0.0,
        "{owner} has negative damage_multiplier {}",
        ability.damage_multiplier
    );
    assert!(
        ability.threat_multiplier >= 0.0,
        "{owner} has negative threat_multiplier {}",
        ability.threat_multiplier
    );
    assert!(
        ability.mana_cost >= 0.0,
        "{owner} has negative mana_cost {}",
        ability.mana_cost
    );
    assert_chance(&owner, "refund_fraction", ability.refund_fraction);
    if let DamageFormula::Flat { min, max } = ability.damage {
        assert!(
            0.0 <= min && min <= max,
            "{owner} has invalid damage range {min}..{max}"
        );
    }
}

fn validate_unit(unit: &UnitDef) {
    let owner = format!("unit '{}'", unit.id);
    assert!(
        unit.max_health > 0.0,
        "{owner} has non-positive max_health {}",
        unit.max_health
    );
    assert!(
        unit.max_mana >= 0.0,
        "{owner} has negative max_mana {}",
        unit.max_mana
    );
    assert_chance(&owner, "crit_chance", unit.crit_chance);
    assert_chance(&owner, "hit_chance", unit.hit_chance);
    assert_chance(&owner, "dodge_chance", unit.dodge_chance);
    assert!(
        0.0 <= unit.weapon.min_damage && unit.weapon.min_damage <= unit.weapon.max_damage,
        "{owner} has invalid weapon damage {}..{}",
        unit.weapon.min_damage,
        unit.weapon.max_damage,
    );
}

fn read_json<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T> {
    let text =
        std::fs::read_to_string(dir.join(file)).with_context(|| format!("reading {file}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {file}"))
}

pub fn load_content(content_dir: &str) -> Result<CombatContent> {
    let dir = Path::new(content_dir);
    let constants: Constants = read_json(dir, "constants.json")?;
    let abilities_file: AbilitiesFile = read_json(dir, "abilities.json")?;
    let auras_file: AurasFile = read_json(dir, "auras.json")?;
    let units_file: UnitsFile = read_json(dir, "units.json")?;
    let content = CombatContent {
        content_version: abilities_file.content_version,
        abilities: abilities_file.abilities,
        auras: auras_file.auras,
        units: units_file.units,
        constants,
    };
    validate_content(&content);
    Ok(content)
}

pub fn load_script(path: &Path) -> Result<CastScript> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing script {}", path.display()))
}

/// Checks that every unit, ability and aura a script names exists in `content`.
pub fn validate_script(content: &CombatContent, script: &CastScript) -> Result<()> {
    let known_unit = |id: &UnitId| content.units.iter().any(|u| &u.id == id);
    for (index, entry) in script.entries.iter().enumerate() {
        if entry.every_ms == Some(0) {
            bail!("script '{}' entry {index}: every_ms must be positive", script.name);
        }
        match &entry.action {
            ScriptAction::Cast {
                ability,
                caster,
                target,
            } => {
                if content.ability_def(ability).is_none() {
                    bail!("script '{}' entry {index}: unknown ability '{ability}'", script.name);
                }
                for unit in [caster, target] {
                    if !known_unit(unit) {
                        bail!("script '{}' entry {index}: unknown unit '{unit}'", script.name);
                    }
                }
            }
            ScriptAction::ApplyAura { unit, aura } | ScriptAction::RemoveAura { unit, aura } => {
                if !known_unit(unit) {
                    bail!("script '{}' entry {index}: unknown unit '{unit}'", script.name);
                }
                if content.aura_def(aura).is_none() {
                    bail!("script '{}' entry {index}: unknown aura '{aura}'", script.name);
                }
            }
            ScriptAction::SetFlags { ability, .. } | ScriptAction::ClearFlags { ability, .. } => {
                if content.ability_def(ability).is_none() {
                    bail!("script '{}' entry {index}: unknown ability '{ability}'", script.name);
                }
            }
        }
    }
    Ok(())
}

/// Writes `run_info.json` describing one encounter run into `dir`.
pub fn write_run_info(
    dir: &Path,
    run_id: &str,
    seed: u64,
    content_version: &str,
    metrics_every_ms: u64,
    args: &serde_json::Value,
) -> Result<()> {
    let info = serde_json::json!({
        "run_id": run_id,
        "seed": seed,
        "start_time": chrono::Utc::now().to_rfc3339(),
        "schema_version": SCHEMA_VERSION,
        "content_version": content_version,
        "metrics_every_ms": metrics_every_ms,
        "args": args,
    });
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Spawns every unit at full resources, registers the abilities each unit can
/// use, and applies initial auras at t=0.
pub fn build_initial_state(content: &CombatContent, seed: u64, rng: &mut impl Rng) -> CombatState {
    let mut units = BTreeMap::new();
    let mut abilities = AbilityRegistry::default();
    for def in &content.units {
        let mut unit = Unit::from_def(def);
        for ability_def in def
            .abilities
            .iter()
            .filter_map(|id| content.ability_def(id))
        {
            match Ability::register(ability_def, &unit) {
                Some(ability) => abilities.insert(ability),
                None => tracing::info!(
                    unit = %unit.id,
                    ability = %ability_def.id,
                    "ability not registered: required rune missing"
                ),
            }
        }
        for aura in def.initial_auras.iter().filter_map(|id| content.aura_def(id)) {
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
            encounter_id: sim_core::encounter_id(rng),
            seed,
            schema_version: SCHEMA_VERSION,
            content_version: content.content_version.clone(),
        },
        units,
        abilities,
        metrics: sim_core::metrics::MetricsLedger::default(),
        counters: Counters::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sim_core::test_fixtures::{
        base_content, crusader_strike_id, judgement_id, minimal_content, paladin_id, target_id,
    };
    use sim_core::{AuraExtension, AuraId, AuraTag, Expiry, ScriptEntry};

    fn write_content(dir: &Path, content: &CombatContent) {
        let write = |file: &str, value: serde_json::Value| {
            std::fs::write(dir.join(file), serde_json::to_string_pretty(&value).unwrap()).unwrap();
        };
        write("constants.json", serde_json::to_value(&content.constants).unwrap());
        write(
            "abilities.json",
            serde_json::json!({
                "content_version": content.content_version,
                "abilities": content.abilities,
            }),
        );
        write("auras.json", serde_json::json!({ "auras": content.auras }));
        write("units.json", serde_json::json!({ "units": content.units }));
    }

    #[test]
    fn test_valid_content_passes_validation() {
        validate_content(&minimal_content());
        validate_content(&base_content());
    }

    #[test]
    #[should_panic(expected = "is not a known ability")]
    fn test_unit_unknown_ability_panics() {
        let mut content = base_content();
        content.units[0]
            .abilities
            .push(sim_core::AbilityId("divine_storm".to_string()));
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "which no aura carries")]
    fn test_extension_of_unknown_tag_panics() {
        let mut content = base_content();
        content.abilities[0].extends_auras = Some(AuraExtension {
            tag: AuraTag("seal".to_string()),
            duration_ms: 30_000,
        });
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "invalid damage range")]
    fn test_flat_damage_min_above_max_panics() {
        let mut content = base_content();
        content.abilities[1].damage = DamageFormula::Flat {
            min: 80.0,
            max: 60.0,
        };
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "is listed by both")]
    fn test_ability_shared_between_units_panics() {
        let mut content = base_content();
        content.units[1].abilities.push(crusader_strike_id());
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "zero duration")]
    fn test_zero_duration_aura_panics() {
        let mut content = base_content();
        content.auras[0].duration_ms = Some(0);
        validate_content(&content);
    }

    #[test]
    #[should_panic(expected = "refund_fraction")]
    fn test_refund_fraction_above_one_panics() {
        let mut content = base_content();
        content.abilities[0].refund_fraction = 1.5;
        validate_content(&content);
    }

    #[test]
    fn test_initial_state_registers_usable_abilities() {
        let content = base_content();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let state = build_initial_state(&content, 7, &mut rng);

        assert_eq!(state.units.len(), 2);
        assert!(state.abilities.contains(&crusader_strike_id()));
        assert!(state.abilities.contains(&judgement_id()));
        let paladin = &state.units[&paladin_id()];
        assert!((paladin.mana.current - paladin.mana.max).abs() < f64::EPSILON);
        assert_eq!(state.meta.seed, 7);
        assert_eq!(state.meta.schema_version, SCHEMA_VERSION);
        assert!(state.meta.encounter_id.starts_with("encounter_"));
    }

    #[test]
    fn test_rune_gated_ability_skipped_without_rune() {
        let mut content = base_content();
        content.units[0].runes.clear();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let state = build_initial_state(&content, 7, &mut rng);
        assert!(!state.abilities.contains(&crusader_strike_id()));
        assert!(state.abilities.contains(&judgement_id()));
    }

    #[test]
    fn test_initial_auras_applied_at_zero() {
        let mut content = base_content();
        content.units[1].initial_auras = vec![
            AuraId("judgement_of_light".to_string()),
            AuraId("judgement_of_wisdom".to_string()),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let state = build_initial_state(&content, 7, &mut rng);
        let auras = &state.units[&target_id()].auras;
        assert_eq!(
            auras
                .get(&AuraId("judgement_of_light".to_string()))
                .unwrap()
                .expires,
            Expiry::At(SimTime(5000))
        );
        assert_eq!(
            auras
                .get(&AuraId("judgement_of_wisdom".to_string()))
                .unwrap()
                .expires,
            Expiry::Never
        );
    }

    #[test]
    fn test_encounter_id_follows_seed() {
        let content = base_content();
        let a = build_initial_state(&content, 1, &mut ChaCha8Rng::seed_from_u64(1));
        let b = build_initial_state(&content, 1, &mut ChaCha8Rng::seed_from_u64(1));
        let c = build_initial_state(&content, 2, &mut ChaCha8Rng::seed_from_u64(2));
        assert_eq!(a.meta.encounter_id, b.meta.encounter_id);
        assert_ne!(a.meta.encounter_id, c.meta.encounter_id);
    }

    #[test]
    fn test_load_content_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        write_content(dir.path(), &base_content());

        let loaded = load_content(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.content_version, "test");
        assert_eq!(loaded.abilities.len(), 2);
        assert_eq!(loaded.auras.len(), 3);
        assert_eq!(loaded.constants.batch_window_ms, 10);
    }

    #[test]
    fn test_load_content_names_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        write_content(dir.path(), &base_content());
        std::fs::remove_file(dir.path().join("auras.json")).unwrap();

        let err = load_content(dir.path().to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("reading auras.json"));
    }

    #[test]
    fn test_load_script_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"name\": \"broken\" ").unwrap();
        let err = load_script(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing script"));
    }

    #[test]
    fn test_run_info_records_seed_and_args() {
        let dir = tempfile::tempdir().unwrap();
        write_run_info(
            dir.path(),
            "run_1",
            42,
            "test",
            500,
            &serde_json::json!({ "runner": "test", "duration_ms": 60_000 }),
        )
        .unwrap();

        let text = std::fs::read_to_string(dir.path().join("run_info.json")).unwrap();
        let info: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(info["run_id"], "run_1");
        assert_eq!(info["seed"], 42);
        assert_eq!(info["metrics_every_ms"], 500);
        assert_eq!(info["args"]["duration_ms"], 60_000);
        assert!(info["start_time"].is_string());
    }

    #[test]
    fn test_validate_script_rejects_unknown_references() {
        let content = base_content();
        let cast = |caster: &str| CastScript {
            name: "bad".to_string(),
            entries: vec![ScriptEntry {
                at_ms: 0,
                every_ms: None,
                action: ScriptAction::Cast {
                    ability: crusader_strike_id(),
                    caster: UnitId(caster.to_string()),
                    target: target_id(),
                },
            }],
        };
        assert!(validate_script(&content, &cast("paladin")).is_ok());
        let err = validate_script(&content, &cast("warrior")).unwrap_err();
        assert!(err.to_string().contains("unknown unit 'warrior'"));
    }
}
