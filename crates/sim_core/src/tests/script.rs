use super::*;

#[test]
fn test_repeating_entry_casts_on_every_cooldown() {
    let content = base_content();
    let state = base_state(&content);
    let output = simulate(
        Arc::new(content),
        state,
        &script(vec![cast_entry(0, Some(6000), crusader_strike_id())]),
        42,
        20_000,
        EventLevel::Normal,
    );

    let casts: Vec<u64> = output
        .events
        .iter()
        .filter(|e| matches!(e.event, Event::CastSucceeded { .. }))
        .map(|e| e.at.as_millis())
        .collect();
    assert_eq!(casts, vec![0, 6000, 12_000, 18_000]);
    assert_eq!(output.snapshot.casts, 4);
}

#[test]
fn test_repeating_faster_than_cooldown_gets_rejections() {
    let content = base_content();
    let state = base_state(&content);
    let output = simulate(
        Arc::new(content),
        state,
        &script(vec![cast_entry(0, Some(1000), crusader_strike_id())]),
        42,
        5000,
        EventLevel::Normal,
    );

    let rejected = output
        .events
        .iter()
        .filter(|e| matches!(e.event, Event::CastRejected { .. }))
        .count();
    assert_eq!(output.snapshot.casts, 1);
    assert_eq!(rejected, 5);
}

#[test]
fn test_entries_past_the_end_never_run() {
    let content = base_content();
    let state = base_state(&content);
    let output = simulate(
        Arc::new(content),
        state,
        &script(vec![cast_entry(9000, None, crusader_strike_id())]),
        42,
        5000,
        EventLevel::Normal,
    );
    assert!(output.events.is_empty());
    assert_eq!(output.actions_executed, 0);
}

#[test]
fn test_flag_entries_change_live_flags() {
    let content = base_content();
    let state = base_state(&content);
    let output = simulate(
        Arc::new(content),
        state,
        &script(vec![
            ScriptEntry {
                at_ms: 0,
                every_ms: None,
                action: ScriptAction::SetFlags {
                    ability: crusader_strike_id(),
                    flags: SpellFlags::NO_METRICS,
                },
            },
            ScriptEntry {
                at_ms: 100,
                every_ms: None,
                action: ScriptAction::ClearFlags {
                    ability: crusader_strike_id(),
                    flags: SpellFlags::MELEE_METRICS,
                },
            },
        ]),
        42,
        1000,
        EventLevel::Normal,
    );

    let flags = output
        .state
        .abilities
        .get(&crusader_strike_id())
        .unwrap()
        .flags;
    assert!(flags.contains(SpellFlags::NO_METRICS));
    assert!(!flags.contains(SpellFlags::MELEE_METRICS));
    let changes = output
        .events
        .iter()
        .filter(|e| matches!(e.event, Event::FlagsChanged { .. }))
        .count();
    assert_eq!(changes, 2);
}

#[test]
fn test_aura_entries_apply_and_remove() {
    let content = base_content();
    let state = base_state(&content);
    let output = simulate(
        Arc::new(content),
        state,
        &script(vec![
            ScriptEntry {
                at_ms: 0,
                every_ms: None,
                action: ScriptAction::ApplyAura {
                    unit: target_id(),
                    aura: aura("sunder_armor"),
                },
            },
            ScriptEntry {
                at_ms: 2000,
                every_ms: None,
                action: ScriptAction::RemoveAura {
                    unit: target_id(),
                    aura: aura("sunder_armor"),
                },
            },
        ]),
        42,
        40_000,
        EventLevel::Normal,
    );

    let sunder = output.state.units[&target_id()]
        .auras
        .get(&aura("sunder_armor"))
        .unwrap();
    assert!(!sunder.is_active());
    assert!(output
        .events
        .iter()
        .any(|e| matches!(e.event, Event::AuraRemoved { .. })));
    // The pending expiry check finds the aura already gone.
    assert!(!output
        .events
        .iter()
        .any(|e| matches!(e.event, Event::AuraExpired { .. })));
}

#[test]
fn test_initial_auras_get_expiry_checks() {
    let mut content = base_content();
    content
        .units
        .iter_mut()
        .find(|def| def.id == target_id())
        .unwrap()
        .initial_auras = vec![aura("judgement_of_light")];
    let state = base_state(&content);
    let output = simulate(
        Arc::new(content),
        state,
        &script(vec![]),
        42,
        10_000,
        EventLevel::Normal,
    );
    assert!(!output.state.units[&target_id()]
        .auras
        .get(&aura("judgement_of_light"))
        .unwrap()
        .is_active());
}

#[test]
fn test_script_parses_from_json() {
    let json = r#"{
        "name": "cs_on_cooldown",
        "entries": [
            { "at_ms": 0, "every_ms": 6000, "action": "cast",
              "ability": "crusader_strike", "caster": "paladin", "target": "target_dummy" },
            { "at_ms": 50, "action": "set_flags",
              "ability": "crusader_strike", "flags": "NO_METRICS" }
        ]
    }"#;
    let parsed: CastScript = serde_json::from_str(json).unwrap();
    assert_eq!(parsed.entries.len(), 2);
    assert_eq!(parsed.entries[0].every_ms, Some(6000));
    assert!(matches!(
        parsed.entries[1].action,
        ScriptAction::SetFlags { flags, .. } if flags == SpellFlags::NO_METRICS
    ));
}
