//! Property-based tests for contact ingestion and selection.
//!
//! Arbitrary parser output must always produce a duplicate-free directory,
//! and arbitrary selection edits must keep the tracker consistent with it.

use std::{collections::HashSet, sync::Arc};

use proptest::prelude::*;
use vcfcast_core::{Address, ContactSet, ParsedEntry, SelectionTracker, ToggleOutcome};

/// Phone-like values: mostly formatted numbers, some too short, some junk.
fn phone_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[+]?[0-9]{3}[ -]?[0-9]{3}[ -]?[0-9]{4}",
        1 => "[0-9]{1,6}",
        1 => "[a-z() .+-]{0,12}",
        // Small pool so duplicates across entries are common
        2 => (0u8..5).prop_map(|n| format!("+1 555 000 000{n}")),
    ]
}

fn entry_strategy() -> impl Strategy<Value = ParsedEntry> {
    (prop::option::of("[A-Za-z ]{0,10}"), prop::collection::vec(phone_strategy(), 0..4))
        .prop_map(|(name, phones)| ParsedEntry { name, phones })
}

#[derive(Debug, Clone)]
enum SelectionOp {
    Toggle(usize),
    SelectAll,
    Clear,
}

fn op_strategy() -> impl Strategy<Value = SelectionOp> {
    prop_oneof![
        4 => (0usize..12).prop_map(SelectionOp::Toggle),
        1 => Just(SelectionOp::SelectAll),
        1 => Just(SelectionOp::Clear),
    ]
}

proptest! {
    #[test]
    fn prop_addresses_unique_and_bounded(
        entries in prop::collection::vec(entry_strategy(), 0..20),
    ) {
        let phone_values: usize = entries.iter().map(|e| e.phones.len()).sum();
        let set = ContactSet::from_entries(entries);

        let unique: HashSet<&Address> = set.iter().map(|c| &c.address).collect();
        prop_assert_eq!(unique.len(), set.len());
        prop_assert!(set.len() <= phone_values);

        let summary = set.summary();
        prop_assert_eq!(summary.phone_values, phone_values);
        prop_assert_eq!(set.len() + summary.skipped(), phone_values);
    }

    #[test]
    fn prop_canonical_form_is_stable(raw in phone_strategy()) {
        if let Some(address) = Address::canonicalize(&raw) {
            // ORACLE: canonicalization is idempotent
            prop_assert_eq!(Address::canonicalize(address.as_str()), Some(address.clone()));
            prop_assert!(address.digits().chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn prop_toggle_twice_restores_selection(
        entries in prop::collection::vec(entry_strategy(), 1..10),
        ops in prop::collection::vec(op_strategy(), 0..20),
        probe in 0usize..12,
    ) {
        let set = Arc::new(ContactSet::from_entries(entries));
        prop_assume!(probe < set.len());

        let mut tracker = SelectionTracker::new(Arc::clone(&set));
        apply(&mut tracker, &ops);

        let before: HashSet<Address> = tracker.snapshot().into_iter().map(|c| c.address).collect();
        let first = tracker.toggle_index(probe).unwrap();
        let second = tracker.toggle_index(probe).unwrap();
        let after: HashSet<Address> = tracker.snapshot().into_iter().map(|c| c.address).collect();

        prop_assert_ne!(first, second);
        prop_assert_eq!(before, after);
    }

    #[test]
    fn prop_select_all_then_clear_is_empty(
        entries in prop::collection::vec(entry_strategy(), 0..10),
        ops in prop::collection::vec(op_strategy(), 0..20),
    ) {
        let set = Arc::new(ContactSet::from_entries(entries));
        let mut tracker = SelectionTracker::new(Arc::clone(&set));
        apply(&mut tracker, &ops);

        tracker.select_all();
        prop_assert_eq!(tracker.len(), set.len());

        tracker.clear();
        prop_assert!(tracker.is_empty());
        prop_assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn prop_selection_stays_within_set(
        entries in prop::collection::vec(entry_strategy(), 0..10),
        ops in prop::collection::vec(op_strategy(), 0..30),
    ) {
        let set = Arc::new(ContactSet::from_entries(entries));
        let mut tracker = SelectionTracker::new(Arc::clone(&set));
        apply(&mut tracker, &ops);

        let snapshot = tracker.snapshot();
        prop_assert_eq!(snapshot.len(), tracker.len());
        for contact in &snapshot {
            prop_assert!(set.contains(&contact.address));
            prop_assert!(tracker.contains(&contact.address));
        }
    }
}

fn apply(tracker: &mut SelectionTracker, ops: &[SelectionOp]) {
    for op in ops {
        match op {
            SelectionOp::Toggle(index) => {
                let result = tracker.toggle_index(*index);
                if *index >= tracker.contacts().len() {
                    assert!(result.is_err());
                } else {
                    assert!(matches!(result, Ok(ToggleOutcome::Added | ToggleOutcome::Removed)));
                }
            },
            SelectionOp::SelectAll => {
                tracker.select_all();
            },
            SelectionOp::Clear => {
                tracker.clear();
            },
        }
    }
}
