//! Protocol-level scenarios through the server driver.

use bb84_core::{SessionConfig, sifting};
use bb84_harness::{Alice, Bob, Eve, Scenario, ScenarioError, SimEnv, World};
use bb84_proto::{ClientMessage, Phase, Role, ServerMessage};
use bb84_server::DriverConfig;
use proptest::prelude::*;

fn world(seed: u64) -> World {
    World::new(SimEnv::with_seed(seed), DriverConfig::default())
}

#[test]
fn honest_run_establishes_key_and_carries_message() {
    let outcome = Scenario::new().with_seed(5).with_bits(64).with_message("HI").run().unwrap();

    assert!(outcome.key_established());
    assert!(outcome.qber.abs() < f64::EPSILON);
    assert_eq!(outcome.raw_len, 64);
    assert_eq!(outcome.final_key_len, outcome.sifted_len);
    assert_eq!(outcome.refusal, None);
    assert_eq!(outcome.received.as_deref(), Some("HI"));
}

#[test]
fn eavesdropped_run_is_refused() {
    let outcome = Scenario::new()
        .with_seed(9)
        .with_bits(256)
        .with_eavesdropper(true)
        .with_message("never sent")
        .run()
        .unwrap();

    assert_eq!(outcome.phase, Phase::ErrorCheck);
    assert!(outcome.qber >= 0.11, "qber {}", outcome.qber);
    assert!(!outcome.key_established());
    assert!(outcome.refusal.unwrap().contains("threshold"));
    assert_eq!(outcome.received, None);
}

#[test]
fn advisory_threshold_finalizes_anyway() {
    let config = SessionConfig { enforce_threshold: false, ..SessionConfig::default() };
    let outcome = Scenario::new()
        .with_seed(9)
        .with_bits(256)
        .with_eavesdropper(true)
        .with_session_config(config)
        .run()
        .unwrap();

    assert!(outcome.qber >= 0.11);
    assert_eq!(outcome.phase, Phase::Complete);
    assert!(outcome.final_key_len > 0);
}

#[test]
fn keys_agree_exactly_when_honest() {
    Scenario::new()
        .with_seed(77)
        .with_bits(128)
        .oracle(Box::new(|world| {
            let state = world.session().state();
            if state.alice.final_key == state.bob.final_key {
                Ok(())
            } else {
                Err("final keys differ".into())
            }
        }))
        .run()
        .unwrap();
}

#[test]
fn eve_log_covers_every_photon() {
    Scenario::new()
        .with_seed(3)
        .with_bits(40)
        .with_eavesdropper(true)
        .oracle(Box::new(|world| {
            let state = world.session().state();
            let log = &state.eve.intercepted_photons;
            if log.len() != state.alice.sent_photons.len() {
                let sent = state.alice.sent_photons.len();
                return Err(format!("{} intercepted of {sent}", log.len()));
            }
            for (record, sent) in log.iter().zip(&state.alice.sent_photons) {
                if record.photon != *sent {
                    return Err("log out of channel order".into());
                }
            }
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn failing_oracle_fails_the_scenario() {
    let result = Scenario::new().oracle(Box::new(|_| Err("nope".into()))).run();
    assert!(matches!(result, Err(ScenarioError::Oracle(reason)) if reason == "nope"));
}

#[test]
fn empty_transmission_never_reaches_bob() {
    let result = Scenario::new().with_bits(0).run();
    assert!(matches!(result, Err(ScenarioError::MissingMessage { role: Role::Bob, .. })));
}

#[test]
fn restart_mid_sifting_resets_for_everyone() {
    let mut world = world(21);
    let mut alice = Alice::new(world.join(Role::Alice).unwrap());
    let bob = Bob::new(world.join(Role::Bob).unwrap());
    let env = world.env().clone();

    let transmit = alice.transmit(&env, 20);
    world.submit(alice.conn_id(), transmit).unwrap();
    let report = bob.measure(&env, world.participant(bob.conn_id()).unwrap()).unwrap();
    world.submit(bob.conn_id(), report).unwrap();
    world.submit(alice.conn_id(), alice.publish_bases()).unwrap();
    assert_eq!(world.session().phase(), Phase::Sifting);

    let before = world.session().id();
    world.submit(bob.conn_id(), ClientMessage::Restart).unwrap();

    for conn_id in [alice.conn_id(), bob.conn_id()] {
        let snapshot = world.participant(conn_id).unwrap().latest_snapshot().unwrap();
        assert_eq!(snapshot.phase, Phase::Setup);
        assert_ne!(snapshot.id, before);
        assert!(snapshot.alice.sifted_key.is_empty());
        assert!(snapshot.bob.sifted_key.is_empty());
        assert!(!snapshot.eve.active);
    }
}

#[test]
fn sifted_event_matches_snapshot() {
    let mut world = world(4);
    let mut alice = Alice::new(world.join(Role::Alice).unwrap());
    let bob = Bob::new(world.join(Role::Bob).unwrap());
    let env = world.env().clone();

    let transmit = alice.transmit(&env, 30);
    world.submit(alice.conn_id(), transmit).unwrap();
    let report = bob.measure(&env, world.participant(bob.conn_id()).unwrap()).unwrap();
    world.submit(bob.conn_id(), report).unwrap();
    world.submit(alice.conn_id(), alice.publish_bases()).unwrap();

    let inbox = world.participant(bob.conn_id()).unwrap();
    let (alice_key, bob_key) = inbox
        .inbox()
        .iter()
        .find_map(|m| match m {
            ServerMessage::Sifted { alice_key, bob_key } => Some((alice_key, bob_key)),
            _ => None,
        })
        .unwrap();
    let snapshot = inbox.latest_snapshot().unwrap();

    assert_eq!(*alice_key, snapshot.alice.sifted_key);
    assert_eq!(*bob_key, snapshot.bob.sifted_key);
    assert!(sifting::error_indices(alice_key, bob_key).is_empty());
}

#[test]
fn out_of_order_actions_are_refused_without_side_effects() {
    let mut world = world(8);
    let alice = Alice::new(world.join(Role::Alice).unwrap());
    let bob = Bob::new(world.join(Role::Bob).unwrap());

    world.submit(alice.conn_id(), alice.publish_bases()).unwrap();
    world.submit(bob.conn_id(), ClientMessage::ReportMeasurements { bits: vec![] }).unwrap();

    assert_eq!(world.session().phase(), Phase::Setup);
    assert_eq!(world.participant(alice.conn_id()).unwrap().rejections().count(), 1);
    assert_eq!(world.participant(bob.conn_id()).unwrap().rejections().count(), 1);
}

#[test]
fn roster_tracks_joins_and_disconnects() {
    let mut world = world(2);
    let alice = world.join(Role::Alice).unwrap();
    let bob = world.join(Role::Bob).unwrap();
    let eve = Eve::new(world.join(Role::Eve).unwrap());

    assert_eq!(
        world.participant(alice).unwrap().roster(),
        Some(&[Role::Alice, Role::Bob, Role::Eve][..])
    );

    world.disconnect(bob).unwrap();
    assert_eq!(world.participant(alice).unwrap().roster(), Some(&[Role::Alice, Role::Eve][..]));
    assert_eq!(world.participant(eve.conn_id()).unwrap().roster().map(<[Role]>::len), Some(2));
}

#[test]
fn duplicate_role_is_logged_not_refused() {
    let mut world = world(6);
    world.join(Role::Bob).unwrap();
    let second = world.join(Role::Bob).unwrap();

    assert_eq!(world.warnings(), 1);
    assert_eq!(world.participant(second).unwrap().rejections().count(), 0);
    assert_eq!(world.driver().registry().roles(), vec![Role::Bob, Role::Bob]);
}

#[test]
fn only_recipient_role_sees_relayed_message() {
    let mut world = world(12);
    let mut alice = Alice::new(world.join(Role::Alice).unwrap());
    let bob = Bob::new(world.join(Role::Bob).unwrap());
    let eve = Eve::new(world.join(Role::Eve).unwrap());
    let env = world.env().clone();

    let transmit = alice.transmit(&env, 64);
    world.submit(alice.conn_id(), transmit).unwrap();
    let report = bob.measure(&env, world.participant(bob.conn_id()).unwrap()).unwrap();
    world.submit(bob.conn_id(), report).unwrap();
    world.submit(alice.conn_id(), alice.publish_bases()).unwrap();
    world.submit(alice.conn_id(), ClientMessage::CheckErrorRate).unwrap();
    world.submit(alice.conn_id(), ClientMessage::FinalizeKey).unwrap();

    let message = alice
        .compose(&env, world.participant(alice.conn_id()).unwrap(), Role::Bob, "meet at noon")
        .unwrap();
    world.submit(alice.conn_id(), message).unwrap();

    assert_eq!(bob.read(world.participant(bob.conn_id()).unwrap()), vec!["meet at noon"]);
    assert_eq!(world.participant(eve.conn_id()).unwrap().relayed().count(), 0);
}

proptest! {
    #[test]
    fn same_seed_same_outcome(seed in any::<u64>(), eavesdrop in any::<bool>()) {
        let run = || Scenario::new()
            .with_seed(seed)
            .with_bits(32)
            .with_eavesdropper(eavesdrop)
            .with_message("determinism")
            .run();

        let first = run();
        let second = run();
        prop_assert_eq!(first.is_ok(), second.is_ok());
        if let (Ok(a), Ok(b)) = (first, second) {
            prop_assert_eq!(a, b);
        }
    }
}
