use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub duration_ms: u64,
    #[serde(default = "default_metrics_every_ms")]
    pub metrics_every_ms: u64,
    pub seeds: SeedSpec,
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
    /// Cast script replayed for every seed.
    pub script: String,
    #[serde(default)]
    pub overrides: HashMap<String, serde_json::Value>,
}

fn default_metrics_every_ms() -> u64 {
    1000
}

fn default_content_dir() -> String {
    "./content".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SeedSpec {
    List(Vec<u64>),
    Range { range: [u64; 2] },
}

impl SeedSpec {
    pub fn expand(&self) -> Vec<u64> {
        match self {
            SeedSpec::List(seeds) => seeds.clone(),
            SeedSpec::Range { range } => (range[0]..=range[1]).collect(),
        }
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario file: {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&json)
        .with_context(|| format!("parsing scenario file: {}", path.display()))?;
    if scenario.name.is_empty() {
        bail!("scenario 'name' must not be empty");
    }
    if scenario.duration_ms == 0 {
        bail!("scenario 'duration_ms' must be > 0");
    }
    if scenario.metrics_every_ms == 0 {
        bail!("scenario 'metrics_every_ms' must be > 0");
    }
    let seeds = scenario.seeds.expand();
    if seeds.is_empty() {
        bail!("scenario 'seeds' must produce at least one seed");
    }
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_scenario(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_scenario_with_seed_list() {
        let file = write_temp_scenario(
            r#"{
            "name": "cs_baseline",
            "duration_ms": 120000,
            "script": "content/scripts/crusader_strike.json",
            "seeds": [1, 2, 3]
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.name, "cs_baseline");
        assert_eq!(scenario.duration_ms, 120_000);
        assert_eq!(scenario.metrics_every_ms, 1000);
        assert_eq!(scenario.seeds.expand(), vec![1, 2, 3]);
        assert_eq!(scenario.content_dir, "./content");
        assert!(scenario.overrides.is_empty());
    }

    #[test]
    fn test_load_scenario_with_seed_range() {
        let file = write_temp_scenario(
            r#"{
            "name": "range_test",
            "duration_ms": 500,
            "script": "s.json",
            "seeds": {"range": [1, 5]}
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.seeds.expand(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_load_scenario_with_overrides() {
        let file = write_temp_scenario(
            r#"{
            "name": "override_test",
            "duration_ms": 100,
            "script": "s.json",
            "seeds": [42],
            "overrides": {
                "batch_window_ms": 0,
                "melee_crit_multiplier": 2.2
            }
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.overrides.len(), 2);
    }

    #[test]
    fn test_load_scenario_empty_name_fails() {
        let file = write_temp_scenario(
            r#"{
            "name": "",
            "duration_ms": 100,
            "script": "s.json",
            "seeds": [1]
        }"#,
        );
        let result = load_scenario(file.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("name"));
    }

    #[test]
    fn test_load_scenario_zero_duration_fails() {
        let file = write_temp_scenario(
            r#"{
            "name": "bad",
            "duration_ms": 0,
            "script": "s.json",
            "seeds": [1]
        }"#,
        );
        assert!(load_scenario(file.path()).is_err());
    }

    #[test]
    fn test_load_scenario_without_script_fails() {
        let file = write_temp_scenario(r#"{ "name": "bad", "duration_ms": 10, "seeds": [1] }"#);
        let err = load_scenario(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("script"));
    }
}
