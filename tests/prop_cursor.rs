use bson::doc;
use odmlite::{Database, Schema};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_cursor_exhaustion_is_monotonic(
        n in 0usize..20,
        limit in proptest::option::of(0usize..25),
        sorted in any::<bool>(),
        extra_polls in 1usize..5,
    ) {
        let db = Database::new();
        let m = db.model("c", Schema::new().strict(false)).unwrap();
        m.insert_many((0..n).map(|i| doc!{"i": i as i64}).collect()).unwrap();
        let mut q = m.find();
        if sorted {
            q = q.sort("-i");
        }
        if let Some(l) = limit {
            q = q.limit(l);
        }
        let mut cur = q.cursor().unwrap();
        let mut seen = 0usize;
        while cur.next_doc().is_some() {
            seen += 1;
        }
        prop_assert_eq!(seen, limit.map_or(n, |l| l.min(n)));
        prop_assert!(cur.is_exhausted());
        m.create(doc!{"i": -1i64}).unwrap();
        for _ in 0..extra_polls {
            prop_assert!(cur.next_doc().is_none());
            prop_assert!(cur.is_exhausted());
        }
    }
}
