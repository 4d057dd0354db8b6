// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests: counters always equal the number of live tickets.

use metatron_core::AdmissionKey;
use metatron_queue::{InFlightCounters, InFlightTicket};
use proptest::prelude::*;

proptest! {
    #[test]
    fn counter_matches_live_tickets(
        ops in prop::collection::vec((0usize..3, any::<bool>()), 1..200),
        max in 1usize..5,
    ) {
        let counters = InFlightCounters::new();
        let keys = ["a", "b", "c"].map(AdmissionKey::from);
        let mut held: Vec<Vec<InFlightTicket>> = vec![Vec::new(), Vec::new(), Vec::new()];

        for (k, acquire) in ops {
            if acquire {
                match counters.try_acquire(&keys[k], max) {
                    Some(ticket) => held[k].push(ticket),
                    None => prop_assert_eq!(held[k].len(), max),
                }
            } else {
                held[k].pop();
            }
            for (key, tickets) in keys.iter().zip(&held) {
                prop_assert_eq!(counters.count(key), tickets.len());
                prop_assert!(tickets.len() <= max);
            }
        }

        held.clear();
        for key in &keys {
            prop_assert_eq!(counters.count(key), 0);
        }
    }
}
