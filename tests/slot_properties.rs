//! Property-based tests for overlap, conflict detection and alternative-slot
//! carving. These hold for any busy calendar, not just the hand-picked cases
//! in the unit tests.

use std::collections::BTreeSet;

use chrono::{TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use ulid::Ulid;

use huddle::engine::{carve_alternatives, conflicting, SlotSearch};
use huddle::model::{Meeting, TimeSlot, Timestamp};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn base() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A slot starting within three days of the base, 1 minute to 4 hours long.
fn arb_slot() -> impl Strategy<Value = TimeSlot> {
    (0i64..3 * 24 * 60, 1i64..=240).prop_map(|(offset, len)| {
        let start = base() + TimeDelta::minutes(offset);
        TimeSlot::new(start, start + TimeDelta::minutes(len))
    })
}

/// Busy meetings for a small pool of participants.
fn arb_busy(pool: Vec<Ulid>) -> impl Strategy<Value = Vec<Meeting>> {
    let n = pool.len();
    prop::collection::vec((arb_slot(), prop::collection::btree_set(0..n, 1..=n)), 0..25).prop_map(
        move |specs| {
            specs
                .into_iter()
                .map(|(slot, who)| Meeting {
                    id: Ulid::new(),
                    title: "busy".into(),
                    slot,
                    participants: who.into_iter().map(|i| pool[i]).collect(),
                })
                .collect()
        },
    )
}

fn arb_search() -> impl Strategy<Value = SlotSearch> {
    (1i64..=96, 0usize..=10).prop_map(|(hours, max_results)| SlotSearch {
        horizon: TimeDelta::hours(hours),
        max_results,
    })
}

fn pool() -> Vec<Ulid> {
    (0..4).map(|_| Ulid::new()).collect()
}

// ---------------------------------------------------------------------------
// Overlap
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn overlap_is_symmetric(a in arb_slot(), b in arb_slot()) {
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
    }

    #[test]
    fn nonempty_slot_overlaps_itself(a in arb_slot()) {
        prop_assert!(a.overlaps(&a));
    }

    #[test]
    fn touching_slots_never_overlap(a in arb_slot(), len in 1i64..=240) {
        let next = TimeSlot::new(a.end, a.end + TimeDelta::minutes(len));
        prop_assert!(!a.overlaps(&next));
        prop_assert!(!next.overlaps(&a));
    }
}

// ---------------------------------------------------------------------------
// Conflict detection
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn conflicts_are_exactly_overlapping_shared_meetings(
        (who, busy) in Just(pool()).prop_flat_map(|p| (Just(p.clone()), arb_busy(p))),
        candidate in arb_slot(),
        pick in 0usize..4,
    ) {
        let ids = BTreeSet::from([who[pick]]);
        let hits = conflicting(&candidate, &ids, &busy, None);
        let hit_ids: BTreeSet<Ulid> = hits.iter().map(|m| m.id).collect();
        for m in &busy {
            let expected = m.slot.overlaps(&candidate) && m.participants.contains(&who[pick]);
            prop_assert_eq!(hit_ids.contains(&m.id), expected);
        }
    }
}

// ---------------------------------------------------------------------------
// Alternative slots
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn alternatives_never_overlap_busy_meetings(
        busy in arb_busy(pool()),
        rejected in arb_slot(),
        search in arb_search(),
    ) {
        let found = carve_alternatives(&rejected, &busy, &search);
        for slot in &found {
            for m in &busy {
                prop_assert!(!slot.overlaps(&m.slot), "{} overlaps {}", slot, m.slot);
            }
        }
    }

    #[test]
    fn alternatives_are_bounded_and_exact(
        busy in arb_busy(pool()),
        rejected in arb_slot(),
        search in arb_search(),
    ) {
        let found = carve_alternatives(&rejected, &busy, &search);
        prop_assert!(found.len() <= search.max_results);
        for slot in &found {
            prop_assert_eq!(slot.duration(), rejected.duration());
            prop_assert!(slot.start >= rejected.start);
        }
        for pair in found.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn alternatives_ignore_input_order(
        busy in arb_busy(pool()),
        rejected in arb_slot(),
        search in arb_search(),
    ) {
        let mut reversed = busy.clone();
        reversed.reverse();
        prop_assert_eq!(
            carve_alternatives(&rejected, &busy, &search),
            carve_alternatives(&rejected, &reversed, &search)
        );
    }
}
