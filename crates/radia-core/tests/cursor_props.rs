use proptest::prelude::*;
use radia_core::catalog::{Cursor, Station, StationCatalog};

fn cursor_at(p: usize, count: usize) -> Cursor {
    let mut c = Cursor::new();
    for _ in 0..p {
        assert!(c.next(count));
    }
    c
}

proptest! {
    #[test]
    fn test_next_and_prev_move_by_one_within_bounds(count in 1usize..40, seed in 0usize..40) {
        let p = seed % count;

        let mut c = cursor_at(p, count);
        let moved = c.next(count);
        if p == count - 1 {
            prop_assert!(!moved);
            prop_assert_eq!(c.index(), count - 1);
        } else {
            prop_assert!(moved);
            prop_assert_eq!(c.index(), p + 1);
        }

        let mut c = cursor_at(p, count);
        let moved = c.prev();
        if p == 0 {
            prop_assert!(!moved);
            prop_assert_eq!(c.index(), 0);
        } else {
            prop_assert!(moved);
            prop_assert_eq!(c.index(), p - 1);
        }
    }

    #[test]
    fn test_sorted_view_is_ascending_and_stable(
        names in proptest::collection::vec("[A-Za-z ]{0,6}", 0..25)
    ) {
        let catalog = StationCatalog::from_stations(names.iter().enumerate().map(|(i, n)| Station {
            id: i as u32,
            name: n.clone(),
            stream_url: String::new(),
        }));
        let sorted = catalog.sorted();
        for pair in sorted.windows(2) {
            prop_assert!(
                (pair[0].name.as_str(), pair[0].id) < (pair[1].name.as_str(), pair[1].id)
            );
        }
        let again: Vec<u32> = catalog.sorted().iter().map(|s| s.id).collect();
        let first: Vec<u32> = sorted.iter().map(|s| s.id).collect();
        prop_assert_eq!(first, again);
    }
}
