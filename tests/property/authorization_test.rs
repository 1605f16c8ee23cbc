// tests/property/authorization_test.rs

//! Property-based tests for the authorization rule over generated registries

use doorwarden::core::access::{AccessTables, Decision};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_approval_matches_level_threshold(
        door_level in any::<u8>(),
        user_levels in prop::collection::vec(any::<u8>(), 1..=30),
    ) {
        let mut tables = AccessTables::default();
        tables.insert_door("gate", door_level).unwrap();
        for (i, level) in user_levels.iter().enumerate() {
            tables.insert_user(&format!("user{i}"), *level, &format!("uid-{i}")).unwrap();
        }

        for (i, level) in user_levels.iter().enumerate() {
            let (decision, user) = tables.authorize("gate", &format!("uid-{i}"));
            let expected = if *level >= door_level { Decision::Approved } else { Decision::Denied };
            prop_assert_eq!(decision, expected);
            prop_assert_eq!(user.map(|u| u.level), Some(*level));
        }
    }

    #[test]
    fn test_unknown_credentials_are_denied(
        door_level in any::<u8>(),
        credential in "[a-z0-9-]{1,16}",
    ) {
        let mut tables = AccessTables::default();
        tables.insert_door("gate", door_level).unwrap();
        let (decision, user) = tables.authorize("gate", &credential);
        prop_assert_eq!(decision, Decision::Denied);
        prop_assert!(user.is_none());
    }

    #[test]
    fn test_unknown_doors_short_circuit(
        level in any::<u8>(),
        door in "[a-z]{1,12}",
    ) {
        let mut tables = AccessTables::default();
        tables.insert_user("alice", level, "uid-1").unwrap();
        prop_assume!(tables.door(&door).is_none());
        let (decision, _) = tables.authorize(&door, "uid-1");
        prop_assert_eq!(decision, Decision::UnknownDoor);
    }

    #[test]
    fn test_document_round_trip_preserves_decisions(
        levels in prop::collection::vec((any::<u8>(), any::<u8>()), 1..=20),
    ) {
        let mut tables = AccessTables::default();
        for (i, (door_level, user_level)) in levels.iter().enumerate() {
            tables.insert_door(&format!("door{i}"), *door_level).unwrap();
            tables.insert_user(&format!("user{i}"), *user_level, &format!("uid-{i}")).unwrap();
        }
        let (reloaded, skipped) = AccessTables::from_document(&tables.to_document());
        prop_assert_eq!(skipped, 0);

        for i in 0..levels.len() {
            for j in 0..levels.len() {
                let door = format!("door{i}");
                let credential = format!("uid-{j}");
                prop_assert_eq!(
                    reloaded.authorize(&door, &credential).0,
                    tables.authorize(&door, &credential).0
                );
            }
        }
    }
}
