use anyhow::{bail, Result};
use sim_core::Constants;
use std::collections::HashMap;

const VALID_KEYS: &[&str] = &[
    "batch_window_ms",
    "gcd_ms",
    "melee_miss_chance",
    "spell_miss_chance",
    "melee_crit_multiplier",
    "spell_crit_multiplier",
    "attack_power_per_dps",
];

pub fn apply_overrides(
    constants: &mut Constants,
    overrides: &HashMap<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in overrides {
        match key.as_str() {
            "batch_window_ms" => constants.batch_window_ms = as_u64(key, value)?,
            "gcd_ms" => constants.gcd_ms = as_u64(key, value)?,
            "melee_miss_chance" => constants.melee_miss_chance = as_chance(key, value)?,
            "spell_miss_chance" => constants.spell_miss_chance = as_chance(key, value)?,
            "melee_crit_multiplier" => {
                constants.melee_crit_multiplier = as_multiplier(key, value)?;
            }
            "spell_crit_multiplier" => {
                constants.spell_crit_multiplier = as_multiplier(key, value)?;
            }
            "attack_power_per_dps" => {
                let v = as_f64(key, value)?;
                if v <= 0.0 {
                    bail!("override '{key}': must be positive, got {v}");
                }
                constants.attack_power_per_dps = v;
            }
            _ => bail!(
                "unknown override key '{key}'. Valid keys: {}",
                VALID_KEYS.join(", ")
            ),
        }
    }
    Ok(())
}

fn as_f64(key: &str, value: &serde_json::Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| anyhow::anyhow!("override '{key}': expected a number, got {value}"))
}

fn as_chance(key: &str, value: &serde_json::Value) -> Result<f64> {
    let v = as_f64(key, value)?;
    if !(0.0..=1.0).contains(&v) {
        bail!("override '{key}': chance {v} is outside [0, 1]");
    }
    Ok(v)
}

fn as_multiplier(key: &str, value: &serde_json::Value) -> Result<f64> {
    let v = as_f64(key, value)?;
    if v < 1.0 {
        bail!("override '{key}': multiplier {v} is below 1.0");
    }
    Ok(v)
}

fn as_u64(key: &str, value: &serde_json::Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        anyhow::anyhow!("override '{key}': expected a non-negative integer, got {value}")
    })
}
