use std::collections::HashMap;

use conctable::{EvictableHashTable, HashTable, Put, TableBuilder, TableError};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Put(u8, u16),
    Get(u8),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<u8>(), any::<u16>()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => any::<u8>().prop_map(Op::Get),
        1 => any::<u8>().prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn hashtable_matches_hashmap(ops in proptest::collection::vec(op(), 1..512), count in 1usize..16, length in 1usize..6) {
        let table: HashTable<u8, u16> = TableBuilder::new().set_size(count, length).build().unwrap();
        let mut model: HashMap<u8, u16> = HashMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => match table.put(k, v) {
                    Ok(Put::Inserted) => {
                        prop_assert_eq!(model.insert(k, v), None);
                    }
                    Ok(Put::Replaced(old)) => {
                        prop_assert_eq!(model.insert(k, v), Some(old));
                    }
                    Err(TableError::Full) => {
                        prop_assert!(!model.contains_key(&k));
                    }
                    other => prop_assert!(false, "unexpected {:?}", other),
                },
                Op::Get(k) => {
                    prop_assert_eq!(table.get(&k), Ok(model.get(&k).copied()));
                }
                Op::Remove(k) => {
                    prop_assert_eq!(table.remove(&k), Ok(model.remove(&k)));
                }
            }
            prop_assert_eq!(table.len(), model.len());
            prop_assert!(table.len() <= table.capacity());
        }

        let mut entries = table.into_entries();
        entries.sort_unstable();
        let mut expect: Vec<_> = model.into_iter().collect();
        expect.sort_unstable();
        prop_assert_eq!(entries, expect);
    }

    #[test]
    fn evictable_matches_hashmap(ops in proptest::collection::vec(op(), 1..512), count in 1usize..8, length in 1usize..4) {
        let table: EvictableHashTable<u8, u16> = EvictableHashTable::new(count, length);
        let mut model: HashMap<u8, u16> = HashMap::new();
        let mut evictions = 0;

        for op in ops {
            match op {
                Op::Put(k, v) => match table.put(k, v) {
                    Ok(Put::Inserted) => {
                        prop_assert_eq!(model.insert(k, v), None);
                    }
                    Ok(Put::Replaced(old)) => {
                        prop_assert_eq!(model.insert(k, v), Some(old));
                    }
                    Ok(Put::Evicted(ek, ev)) => {
                        prop_assert_ne!(ek, k);
                        prop_assert_eq!(model.remove(&ek), Some(ev));
                        prop_assert_eq!(model.insert(k, v), None);
                        evictions += 1;
                    }
                    Err(e) => prop_assert!(false, "unexpected {:?}", e),
                },
                Op::Get(k) => {
                    prop_assert_eq!(table.get(&k), Ok(model.get(&k).copied()));
                }
                Op::Remove(k) => {
                    prop_assert_eq!(table.remove(&k), Ok(model.remove(&k)));
                }
            }
            prop_assert_eq!(table.len(), model.len());
        }

        prop_assert_eq!(table.stats().evictions, evictions);
        let stats = table.bucket_stats();
        prop_assert_eq!(stats.sum as usize, model.len());
        prop_assert!(stats.max as usize <= length);
    }
}
