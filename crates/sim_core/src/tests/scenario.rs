use super::*;

/// Cast at t=0, 10 ms batch window, 5% refund, Judgement extension to 30 s,
/// 6 s cooldown.
#[test]
fn test_crusader_strike_timeline() {
    let (mut encounter, mut scheduler) = setup();
    guarantee_hits(&mut encounter);
    set_mana(&mut encounter, 1000.0);
    let max = target_max_health(&encounter);
    apply_to_target(&mut encounter, &mut scheduler, "judgement_of_light");
    apply_to_target(&mut encounter, &mut scheduler, "judgement_of_wisdom");

    // t=0: refund and extension happen now, damage does not.
    expect_cast(cast(&mut encounter, &mut scheduler, &crusader_strike()));
    assert!((mana(&encounter) - 1100.0).abs() < 1e-9);
    assert!((target_health(&encounter) - max).abs() < f64::EPSILON);
    assert_eq!(
        target_aura(&encounter, "judgement_of_light").expires,
        Expiry::At(SimTime(30_000))
    );
    assert_eq!(target_aura(&encounter, "judgement_of_wisdom").expires, Expiry::Never);

    // t=10: damage applied.
    scheduler.run_until(&mut encounter, SimTime(10));
    assert!((target_health(&encounter) - (max - CERTAIN_HIT_DAMAGE)).abs() < 1e-6);

    // Every recast before t=6000 is refused.
    for at in [10, 1500, 3000, 5999] {
        scheduler.run_until(&mut encounter, SimTime(at));
        assert!(
            matches!(
                cast(&mut encounter, &mut scheduler, &crusader_strike()),
                CastOutcome::NotReady { .. }
            ),
            "recast at {at}ms should be refused"
        );
    }
    assert!((mana(&encounter) - 1100.0).abs() < 1e-9);
    assert!(target_aura(&encounter, "judgement_of_light").is_active());

    scheduler.run_until(&mut encounter, SimTime(6000));
    expect_cast(cast(&mut encounter, &mut scheduler, &crusader_strike()));
    assert!((mana(&encounter) - 1200.0).abs() < 1e-9);
    assert_eq!(
        target_aura(&encounter, "judgement_of_light").expires,
        Expiry::At(SimTime(36_000))
    );

    scheduler.run_until(&mut encounter, SimTime(6010));
    let metrics = melee_metrics(&encounter).unwrap();
    assert_eq!(metrics.casts, 2);
    assert_eq!(metrics.hits, 2);
    assert_eq!(refund_events(&encounter), 2);
}

#[test]
fn test_event_ids_are_sequential() {
    let (mut encounter, mut scheduler) = setup();
    expect_cast(cast(&mut encounter, &mut scheduler, &crusader_strike()));
    scheduler.run_until(&mut encounter, SimTime(10));

    for (index, envelope) in encounter.events.iter().enumerate() {
        assert_eq!(envelope.id.0, format!("evt_{index:06}"));
    }
    let times: Vec<u64> = encounter.events.iter().map(|e| e.at.as_millis()).collect();
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
}
