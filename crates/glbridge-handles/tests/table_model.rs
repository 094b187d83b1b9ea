#![cfg(not(target_arch = "wasm32"))]

use std::collections::BTreeMap;

use glbridge_handles::{Category, HandleError, HandleTable, ZeroHandle};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate,
    Release(u32),
    Resolve(u32),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            3 => Just(Op::Allocate),
            2 => (0u32..24).prop_map(Op::Release),
            2 => (0u32..24).prop_map(Op::Resolve),
        ],
        0..200,
    )
}

fn zero_handle() -> impl Strategy<Value = ZeroHandle> {
    prop_oneof![Just(ZeroHandle::Sentinel), Just(ZeroHandle::Object)]
}

proptest! {
    /// Compare the table against a map of live handles. Objects are unique serial numbers, so a
    /// stale resolve would show up as a wrong value.
    #[test]
    fn table_matches_reference_model(zero in zero_handle(), ops in ops()) {
        let mut table = HandleTable::new(Category::Texture, zero);
        let mut live: BTreeMap<u32, u64> = BTreeMap::new();
        let mut destroyed: Vec<u64> = Vec::new();
        let mut next_object = 0u64;

        for op in ops {
            match op {
                Op::Allocate => {
                    let handle = table.allocate(next_object).unwrap();
                    prop_assert!(!live.contains_key(&handle));
                    if zero == ZeroHandle::Sentinel {
                        prop_assert_ne!(handle, 0);
                    }
                    live.insert(handle, next_object);
                    next_object += 1;
                }
                Op::Release(handle) => {
                    let sentinel = zero == ZeroHandle::Sentinel && handle == 0;
                    match table.release(handle) {
                        Ok(Some(object)) => {
                            prop_assert_eq!(live.remove(&handle), Some(object));
                            destroyed.push(object);
                        }
                        Ok(None) => prop_assert!(sentinel),
                        Err(HandleError::Released { .. } | HandleError::OutOfRange { .. }) => {
                            prop_assert!(!live.contains_key(&handle));
                        }
                        Err(err) => prop_assert!(false, "unexpected error {err}"),
                    }
                }
                Op::Resolve(handle) => {
                    let sentinel = zero == ZeroHandle::Sentinel && handle == 0;
                    match table.resolve(handle) {
                        Ok(Some(&object)) => prop_assert_eq!(live.get(&handle), Some(&object)),
                        Ok(None) => prop_assert!(sentinel),
                        Err(_) => prop_assert!(!live.contains_key(&handle) && !sentinel),
                    }
                }
            }
        }

        prop_assert_eq!(table.live_count(), live.len());
        // Every object was handed back for destruction at most once.
        let mut sorted = destroyed.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), destroyed.len());
    }
}
