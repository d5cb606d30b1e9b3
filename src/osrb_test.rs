use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::{SystemTime, UNIX_EPOCH};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::prelude::random;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::empty::Empty;
use crate::error::Error;
use crate::osrb::Osrb;

#[test]
fn test_id() {
    let index: Osrb<i64, i64> = Osrb::new("test-osrb");
    assert_eq!(index.id(), "test-osrb".to_string());
}

#[test]
fn test_len() {
    let index: Osrb<i64, i64> = Osrb::new("test-osrb");
    assert_eq!(index.len(), 0);
    assert!(index.is_empty());
}

#[test]
fn test_create() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    let mut model: BTreeMap<i64, i64> = BTreeMap::new();

    for key in [2, 1, 3, 6, 5, 4, 8, 0, 9, 7].iter() {
        assert!(index.create(*key, key * 10).is_ok());
        model.insert(*key, key * 10);
    }

    assert_eq!(index.len(), 10);
    assert!(index.validate().is_ok());

    // error case
    assert_eq!(index.create(7, 20), Err(Error::DuplicateKey));
    assert_eq!(index.len(), 10);
    assert!(index.validate().is_ok());
    assert_eq!(index.get(&7), Some(70));

    // test get
    for key in 0..10 {
        assert_eq!(index.get(&key), model.get(&key).cloned());
        assert!(index.contains(&key));
    }
    assert_eq!(index.get(&10), None);
    assert!(!index.contains(&10));

    // test iter
    let entries: Vec<(i64, i64)> = index.iter().collect();
    let expected: Vec<(i64, i64)> = model.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(entries, expected);
}

#[test]
fn test_set() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");

    for key in [2, 1, 3, 6, 5, 4, 8, 0, 9, 7].iter() {
        assert_eq!(index.set(*key, 10), None);
    }
    assert_eq!(index.len(), 10);
    assert!(index.validate().is_ok());

    // overwrite
    assert_eq!(index.set(5, 500), Some(10));
    assert_eq!(index.len(), 10);
    assert_eq!(index.get(&5), Some(500));
    assert!(index.validate().is_ok());
}

#[test]
fn test_remove() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");

    for key in [2, 1, 3, 6, 5, 4, 8, 0, 9, 7].iter() {
        assert!(index.create(*key, key * 100).is_ok());
    }

    // remove a missing key.
    assert_eq!(index.remove(&10), None);
    assert_eq!(index.len(), 10);
    assert!(index.validate().is_ok());

    // remove all entries, in a different order than insertion.
    for key in [0, 9, 4, 5, 2, 7, 1, 8, 3, 6].iter() {
        assert_eq!(index.remove(key), Some((*key, key * 100)));
        assert!(index.validate().is_ok());
    }
    assert_eq!(index.len(), 0);
    assert!(index.is_empty());
    assert!(index.iter().next().is_none());
}

#[test]
fn test_single_entry() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    assert!(index.create(5, 50).is_ok());
    assert_eq!(index.remove(&5), Some((5, 50)));
    assert_eq!(index.len(), 0);
    assert!(!index.contains(&5));
    assert!(index.validate().is_ok());
}

#[test]
fn test_ordered_batches() {
    let mut rng = SmallRng::from_seed(make_seed().to_le_bytes());

    // random order
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in shuffled_keys(50, &mut rng) {
        assert!(index.create(key, key).is_ok());
    }
    assert_eq!(index.len(), 50);
    assert!(index.validate().is_ok());

    // strictly increasing
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in 0..50 {
        assert!(index.create(key, key).is_ok());
    }
    assert_eq!(index.len(), 50);
    assert!(index.validate().is_ok());

    // strictly decreasing
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in (0..50).rev() {
        assert!(index.create(key, key).is_ok());
    }
    assert_eq!(index.len(), 50);
    assert!(index.validate().is_ok());
}

#[test]
fn test_rank() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in [10, 20, 30].iter() {
        assert!(index.create(*key, key * 10).is_ok());
    }

    assert_eq!(index.get_by_rank(0), Ok((10, 100)));
    assert_eq!(index.get_by_rank(1), Ok((20, 200)));
    assert_eq!(index.get_by_rank(2), Ok((30, 300)));
    assert_eq!(index.get_by_rank(3), Err(Error::IndexOutOfRange(3, 3)));

    assert_eq!(index.rank_of(&10), Some(0));
    assert_eq!(index.rank_of(&20), Some(1));
    assert_eq!(index.rank_of(&30), Some(2));
    assert_eq!(index.rank_of(&25), None);

    assert_eq!(index.min(), Some((10, 100)));
    assert_eq!(index.max(), Some((30, 300)));
}

#[test]
fn test_rank_matches_enumeration() {
    let mut rng = SmallRng::from_seed(make_seed().to_le_bytes());
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in shuffled_keys(200, &mut rng) {
        assert!(index.create(key, key * 2).is_ok());
    }

    for (rank, entry) in index.iter().enumerate() {
        assert_eq!(index.get_by_rank(rank), Ok(entry));
        assert_eq!(index.rank_of(&entry.0), Some(rank));
    }
    let n = index.len();
    assert_eq!(index.get_by_rank(n), Err(Error::IndexOutOfRange(n, n)));
}

#[test]
fn test_odd_even() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in 1..=100 {
        assert!(index.create(key, key).is_ok());
    }
    for key in (2..=100).step_by(2) {
        assert_eq!(index.remove(&key), Some((key, key)));
        assert!(index.validate().is_ok());
    }

    assert_eq!(index.len(), 50);
    let keys: Vec<i64> = index.iter().map(|(k, _)| k).collect();
    let odds: Vec<i64> = (1..=99).step_by(2).collect();
    assert_eq!(keys, odds);
}

#[test]
fn test_round_trip() {
    let mut rng = SmallRng::from_seed(make_seed().to_le_bytes());
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in shuffled_keys(100, &mut rng) {
        assert!(index.create(key * 2, key).is_ok());
    }

    let before: Vec<(i64, i64)> = index.iter().collect();
    let n = index.len();

    // insert a key then remove it; logical content is restored.
    assert!(index.create(101, 0).is_ok());
    assert_eq!(index.remove(&101), Some((101, 0)));

    assert_eq!(index.len(), n);
    assert!(index.validate().is_ok());
    let after: Vec<(i64, i64)> = index.iter().collect();
    assert_eq!(after, before);
}

#[test]
fn test_cursor() {
    let mut rng = SmallRng::from_seed(make_seed().to_le_bytes());
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in shuffled_keys(100, &mut rng) {
        assert!(index.create(key, key * 3).is_ok());
    }

    let mut cursor = index.cursor();
    let mut entries = vec![];
    while let Some(entry) = index.cursor_next(&mut cursor).unwrap() {
        entries.push(entry);
    }
    let expected: Vec<(i64, i64)> = index.iter().collect();
    assert_eq!(entries, expected);
    // exhausted cursor keeps returning None, not an error.
    assert_eq!(index.cursor_next(&mut cursor), Ok(None));
}

#[test]
fn test_cursor_fail_fast() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in 0..10 {
        assert!(index.create(key, key).is_ok());
    }

    // create() invalidates.
    let mut cursor = index.cursor();
    assert!(index.create(100, 100).is_ok());
    assert_eq!(index.cursor_next(&mut cursor), Err(Error::StaleCursor));
    // and stays invalid.
    assert_eq!(index.cursor_next(&mut cursor), Err(Error::StaleCursor));

    // remove() invalidates.
    let mut cursor = index.cursor();
    assert_eq!(index.remove(&100), Some((100, 100)));
    assert_eq!(index.cursor_next(&mut cursor), Err(Error::StaleCursor));

    // a missing-key remove is a no-op and does not invalidate.
    let mut cursor = index.cursor();
    assert_eq!(index.remove(&100), None);
    assert_eq!(index.cursor_next(&mut cursor), Ok(Some((0, 0))));

    // overwriting a value moves no node and does not invalidate.
    let mut cursor = index.cursor();
    assert_eq!(index.set(5, 500), Some(5));
    assert_eq!(index.cursor_next(&mut cursor), Ok(Some((0, 0))));

    // clear() invalidates.
    let mut cursor = index.cursor();
    index.clear();
    assert_eq!(index.cursor_next(&mut cursor), Err(Error::StaleCursor));
}

#[test]
fn test_random() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    let mut rng = SmallRng::from_seed(make_seed().to_le_bytes());

    assert_eq!(index.random(&mut rng), None);

    assert!(index.create(0, 0).is_ok());
    assert_eq!(index.random(&mut rng), Some((0, 0)));
    assert_eq!(index.random(&mut rng), Some((0, 0)));

    for key in 1..10_000 {
        assert!(index.create(key, key * 10).is_ok());
    }
    for _ in 0..20_000 {
        let (key, value) = index.random(&mut rng).unwrap();
        assert!(key >= 0 && key < 10_000);
        assert_eq!(value, key * 10);
    }
}

#[test]
fn test_range() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    let mut model: BTreeMap<i64, i64> = BTreeMap::new();
    let size = 1000;

    for _ in 0..size {
        let key: i64 = (random::<i64>() % (size as i64)).abs();
        index.set(key, key * 10);
        model.insert(key, key * 10);
    }
    assert!(index.validate().is_ok());

    for _ in 0..1_000 {
        let (low, high) = random_low_high(size);

        let entries: Vec<(i64, i64)> = index.range((low, high)).collect();
        let expected: Vec<(i64, i64)> = model
            .iter()
            .filter(|(k, _)| above_low(**k, &low) && below_high(**k, &high))
            .map(|(k, v)| (*k, *v))
            .collect();
        assert_eq!(entries, expected);

        let entries: Vec<(i64, i64)> = index.range((low, high)).rev().collect();
        let expected: Vec<(i64, i64)> = expected.into_iter().rev().collect();
        assert_eq!(entries, expected);
    }
}

#[test]
fn test_empty_value() {
    let mut index: Osrb<i64, Empty> = Osrb::new("test-osrb-set");
    for key in [30, 10, 20].iter() {
        assert!(index.create(*key, Empty {}).is_ok());
    }

    assert_eq!(index.len(), 3);
    assert!(index.contains(&10));
    assert!(!index.contains(&40));
    assert!(index.validate().is_ok());

    let keys: Vec<i64> = index.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![10, 20, 30]);
}

#[test]
fn test_load_from() {
    let iter = (0..10).map(|key| (key, key * 10));
    let index = Osrb::load_from("test-osrb", iter).unwrap();
    assert_eq!(index.len(), 10);
    assert!(index.validate().is_ok());

    let iter = vec![(1, 10), (2, 20), (1, 100)].into_iter();
    let result: Result<Osrb<i64, i64>, Error<i64>> = Osrb::load_from("test-osrb", iter);
    assert_eq!(result.err(), Some(Error::DuplicateKey));
}

#[test]
fn test_clear() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in 0..100 {
        assert!(index.create(key, key).is_ok());
    }
    index.clear();
    assert_eq!(index.len(), 0);
    assert!(index.is_empty());
    assert!(index.validate().is_ok());
    assert!(index.iter().next().is_none());
}

#[test]
fn test_stats() {
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in 0..1000 {
        assert!(index.create(key, key).is_ok());
    }
    assert_eq!(index.stats().entries(), 1000);

    let stats = index.validate().unwrap();
    assert_eq!(stats.entries(), 1000);
    assert!(stats.blacks().is_some());
    let depths = stats.depths().unwrap();
    assert!(depths.min() > 0);
    // height of a red-black tree stays within 2*log2(n+1).
    assert!(depths.max() <= 20);
    assert!(depths.mean() >= depths.min() && depths.mean() <= depths.max());
    assert!(!depths.percentiles().is_empty());
}

#[test]
fn test_depth() {
    let mut rng = SmallRng::from_seed(make_seed().to_le_bytes());
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    for key in shuffled_keys(500, &mut rng) {
        assert!(index.create(key, key).is_ok());
    }

    let stats = index.validate().unwrap();
    // Stats and Depth are debug-printable, useful in logs.
    assert!(format!("{:?}", stats).contains("depths"));

    let depths = stats.depths().unwrap();
    assert_eq!(depths.samples(), 501); // n + 1 empty leaves.
    for (perc, depth) in depths.percentiles().into_iter() {
        assert!(perc >= 90 && perc <= 100, "percentile {}", perc);
        assert!(depth >= depths.min() && depth <= depths.max());
    }
    depths.pretty_print("");
    depths.pretty_print("  ");
}

#[test]
fn test_crud() {
    let size = 1000;
    let mut index: Osrb<i64, i64> = Osrb::new("test-osrb");
    let mut model: BTreeMap<i64, i64> = BTreeMap::new();

    for _ in 0..10_000 {
        let key: i64 = (random::<i64>() % (size as i64)).abs();
        let value: i64 = random();
        let op: i64 = (random::<i64>() % 5).abs();
        match op {
            0 => {
                let ok1 = model.contains_key(&key);
                let ok2 = index.create(key, value).is_err();
                assert_eq!(ok1, ok2);
                if !ok1 {
                    model.insert(key, value);
                }
            }
            1 => {
                assert_eq!(index.set(key, value), model.insert(key, value));
            }
            2 => {
                let expected = model.remove(&key).map(|value| (key, value));
                assert_eq!(index.remove(&key), expected);
            }
            3 => {
                assert_eq!(index.get(&key), model.get(&key).cloned());
            }
            4 => {
                let rank = (key as usize) % (model.len() + 1);
                match index.get_by_rank(rank) {
                    Ok((k, v)) => {
                        let (ek, ev) = model.iter().nth(rank).unwrap();
                        assert_eq!((k, v), (*ek, *ev));
                        assert_eq!(index.rank_of(&k), Some(rank));
                    }
                    Err(err) => {
                        assert_eq!(err, Error::IndexOutOfRange(rank, model.len()));
                    }
                }
            }
            op => panic!("unreachable {}", op),
        };

        assert_eq!(index.len(), model.len());
        assert!(index.validate().is_ok());
    }

    // test iter
    let entries: Vec<(i64, i64)> = index.iter().collect();
    let expected: Vec<(i64, i64)> = model.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(entries, expected);
}

proptest! {
    #[test]
    fn prop_model_equivalence(
        ops in prop::collection::vec((0u8..4u8, 0i64..64i64, any::<i64>()), 1..256)
    ) {
        let mut index: Osrb<i64, i64> = Osrb::new("prop-osrb");
        let mut model: BTreeMap<i64, i64> = BTreeMap::new();

        for (op, key, value) in ops {
            match op {
                0 => {
                    let expected = if model.contains_key(&key) {
                        Err(Error::DuplicateKey)
                    } else {
                        model.insert(key, value);
                        Ok(())
                    };
                    prop_assert_eq!(index.create(key, value), expected);
                }
                1 => {
                    prop_assert_eq!(index.set(key, value), model.insert(key, value));
                }
                2 => {
                    let expected = model.remove(&key).map(|value| (key, value));
                    prop_assert_eq!(index.remove(&key), expected);
                }
                _ => {
                    prop_assert_eq!(index.get(&key), model.get(&key).cloned());
                }
            }
            prop_assert_eq!(index.len(), model.len());
            prop_assert!(index.validate().is_ok());
        }

        let entries: Vec<(i64, i64)> = index.iter().collect();
        let expected: Vec<(i64, i64)> = model.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(entries, expected);
    }
}

fn make_seed() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

fn shuffled_keys(n: i64, rng: &mut SmallRng) -> Vec<i64> {
    let mut keys: Vec<i64> = (0..n).collect();
    for i in (1..keys.len()).rev() {
        let j = rng.gen_range(0, i + 1);
        keys.swap(i, j);
    }
    keys
}

fn random_low_high(size: usize) -> (Bound<i64>, Bound<i64>) {
    let size = size as u64;
    let low = (random::<u64>() % size) as i64;
    let high = (random::<u64>() % size) as i64;
    let low = match random::<u8>() % 3 {
        0 => Bound::Included(low),
        1 => Bound::Excluded(low),
        2 => Bound::Unbounded,
        _ => unreachable!(),
    };
    let high = match random::<u8>() % 3 {
        0 => Bound::Included(high),
        1 => Bound::Excluded(high),
        2 => Bound::Unbounded,
        _ => unreachable!(),
    };
    (low, high)
}

fn above_low(key: i64, low: &Bound<i64>) -> bool {
    match low {
        Bound::Included(low) => key >= *low,
        Bound::Excluded(low) => key > *low,
        Bound::Unbounded => true,
    }
}

fn below_high(key: i64, high: &Bound<i64>) -> bool {
    match high {
        Bound::Included(high) => key <= *high,
        Bound::Excluded(high) => key < *high,
        Bound::Unbounded => true,
    }
}
