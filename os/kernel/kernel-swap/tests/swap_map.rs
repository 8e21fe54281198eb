use kernel_swap::SwapMap;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn concurrent_allocations_never_collide() {
    let threads = 8;
    let per_thread = 100;
    let map = Arc::new(SwapMap::new(threads * per_thread).unwrap());
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let map = Arc::clone(&map);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                (0..per_thread)
                    .map(|_| map.allocate().expect("enough slots"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for h in handles {
        for slot in h.join().unwrap() {
            assert!(seen.insert(slot), "slot {slot} handed out twice");
        }
    }
    assert_eq!(seen.len(), threads * per_thread);
    assert_eq!(map.allocate(), None);
}

proptest! {
    /// Interleaved allocate/free sequences keep live slots distinct and the
    /// in-use count exact.
    #[test]
    fn live_slots_stay_disjoint(ops in prop::collection::vec(any::<bool>(), 1..400)) {
        let map = SwapMap::new(64).unwrap();
        let mut live = Vec::new();

        for allocate in ops {
            if allocate || live.is_empty() {
                if let Some(slot) = map.allocate() {
                    prop_assert!(!live.contains(&slot));
                    live.push(slot);
                } else {
                    prop_assert_eq!(live.len(), 64);
                }
            } else {
                let slot = live.swap_remove(live.len() / 2);
                prop_assert!(map.free(slot));
            }
            prop_assert_eq!(map.in_use(), live.len());
        }

        for slot in &live {
            prop_assert!(map.is_allocated(*slot));
        }
    }
}
