// Hash maps over string and integer keys: a bucket vector of entry chains.
// Built only on the primitives the core exports to map implementations:
// cell allocation, child declaration, rope comparison and hashing.

use crate::pages::Heap;
use crate::rope::{rope_compare, rope_hash};
use crate::vector::new_mvector_node;
use crate::word::{CellType, Word};

/// Initial bucket count.
const MIN_BUCKETS: usize = 16;

/// Buckets live in one mutable vector, which bounds their number; chains
/// absorb the rest.
const MAX_BUCKETS: usize = crate::vector::VECTOR_MAX_LENGTH;

fn int_hash(key: isize) -> u64 {
    (key as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn entry_hash_bits(hash: u64) -> u64 {
    hash & 0xFFFF_FFFF_FFFF
}

pub(crate) fn new_hashmap_node(heap: &mut Heap, tag: CellType, capacity: usize) -> Word {
    debug_assert!(matches!(tag, CellType::StrHashMap | CellType::IntHashMap));
    let id = heap.alloc_cells(1);
    heap.init_map(id, tag);
    let nbuckets = capacity.max(MIN_BUCKETS).next_power_of_two().min(MAX_BUCKETS);
    let buckets = new_mvector_node(heap, nbuckets, nbuckets);
    heap.set_map_root(id, buckets);
    Word::from_cell(id)
}

fn nbuckets(heap: &Heap, map: u32) -> usize {
    heap.vector_length(heap.map_root(map).cell_id())
}

fn bucket_of(heap: &Heap, map: u32, hash: u64) -> usize {
    (hash % nbuckets(heap, map) as u64) as usize
}

fn key_hash(heap: &Heap, map: u32, key: MapKey) -> u64 {
    match key {
        MapKey::Rope(k) => {
            debug_assert!(heap.cell_tag(map) == CellType::StrHashMap);
            rope_hash(heap, k)
        }
        MapKey::Int(k) => {
            debug_assert!(heap.cell_tag(map) == CellType::IntHashMap);
            int_hash(k)
        }
    }
}

/// A lookup key, either flavor.
#[derive(Clone, Copy)]
pub(crate) enum MapKey {
    Rope(Word),
    Int(isize),
}

pub(crate) fn entry_matches(heap: &Heap, entry: u32, key: MapKey, hash: u64) -> bool {
    match key {
        MapKey::Rope(k) => {
            heap.entry_hash(entry) == entry_hash_bits(hash)
                && rope_compare(heap, heap.entry_key(entry), k) == 0
        }
        MapKey::Int(k) => heap.entry_int_key(entry) == k,
    }
}

/// Find the entry for `key`, returning (bucket, entry) when present.
pub(crate) fn hashmap_find(heap: &Heap, map: u32, key: MapKey) -> (usize, Option<u32>) {
    let hash = key_hash(heap, map, key);
    let bucket = bucket_of(heap, map, hash);
    let buckets = heap.map_root(map).cell_id();
    let mut entry = heap.vector_elem(buckets, bucket);
    while entry.is_heap() {
        let eid = entry.cell_id();
        if entry_matches(heap, eid, key, hash) {
            return (bucket, Some(eid));
        }
        entry = heap.entry_next(eid);
    }
    (bucket, None)
}

pub(crate) fn hashmap_get(heap: &Heap, map: u32, key: MapKey) -> Option<Word> {
    let (_, entry) = hashmap_find(heap, map, key);
    entry.map(|eid| heap.entry_value(eid))
}

/// Double the bucket array and relink every entry.
fn grow(heap: &mut Heap, map: u32) {
    let old_buckets = heap.map_root(map).cell_id();
    let old_n = heap.vector_length(old_buckets);
    let new_n = (old_n * 2).min(MAX_BUCKETS);
    if new_n == old_n {
        return;
    }
    let new_vec = new_mvector_node(heap, new_n, new_n);
    let new_id = new_vec.cell_id();
    let int_keyed = heap.cell_tag(map) == CellType::IntHashMap;
    for b in 0..old_n {
        let mut entry = heap.vector_elem(old_buckets, b);
        while entry.is_heap() {
            let eid = entry.cell_id();
            let next = heap.entry_next(eid);
            let hash = if int_keyed {
                int_hash(heap.entry_int_key(eid))
            } else {
                let k = heap.entry_key(eid);
                rope_hash(heap, k)
            };
            let nb = (hash % new_n as u64) as usize;
            let head = heap.vector_elem(new_id, nb);
            heap.set_entry_next(eid, head);
            heap.set_vector_elem(new_id, nb, entry);
            heap.declare_child(new_vec, entry);
            entry = next;
        }
    }
    heap.set_map_root(map, new_vec);
    heap.declare_child(Word::from_cell(map), new_vec);
}

/// Set `key` to `value`, creating the entry if needed. Returns true when a
/// new entry was created.
pub(crate) fn hashmap_set(heap: &mut Heap, map: u32, key: MapKey, value: Word) -> bool {
    let (_, found) = hashmap_find(heap, map, key);
    if let Some(eid) = found {
        heap.set_entry_value(eid, value);
        heap.declare_child(Word::from_cell(eid), value);
        return false;
    }
    let size = heap.map_size(map);
    if size + 1 > nbuckets(heap, map) * 2 {
        grow(heap, map);
    }
    let hash = key_hash(heap, map, key);
    let bucket = bucket_of(heap, map, hash);
    let buckets = heap.map_root(map);
    let head = heap.vector_elem(buckets.cell_id(), bucket);
    let eid = heap.alloc_cells(2);
    match key {
        MapKey::Rope(k) => heap.init_map_entry(
            eid,
            CellType::MapEntry,
            entry_hash_bits(hash),
            head,
            k.0 as u64,
            value,
        ),
        MapKey::Int(k) => heap.init_map_entry(
            eid,
            CellType::IntMapEntry,
            0,
            head,
            k as u64,
            value,
        ),
    }
    let entry = Word::from_cell(eid);
    heap.set_vector_elem(buckets.cell_id(), bucket, entry);
    heap.declare_child(buckets, entry);
    heap.set_map_size(map, size + 1);
    true
}

/// Remove `key`'s entry. Returns true when one was removed.
pub(crate) fn hashmap_unset(heap: &mut Heap, map: u32, key: MapKey) -> bool {
    let hash = key_hash(heap, map, key);
    let bucket = bucket_of(heap, map, hash);
    let buckets = heap.map_root(map).cell_id();
    let mut prev: Option<u32> = None;
    let mut entry = heap.vector_elem(buckets, bucket);
    while entry.is_heap() {
        let eid = entry.cell_id();
        if entry_matches(heap, eid, key, hash) {
            let next = heap.entry_next(eid);
            match prev {
                None => heap.set_vector_elem(buckets, bucket, next),
                Some(pid) => heap.set_entry_next(pid, next),
            }
            let size = heap.map_size(map);
            heap.set_map_size(map, size - 1);
            return true;
        }
        prev = Some(eid);
        entry = heap.entry_next(eid);
    }
    false
}

/// First entry in bucket order, as (bucket, entry).
pub(crate) fn hashmap_first(heap: &Heap, map: u32) -> Option<(usize, u32)> {
    let buckets = heap.map_root(map).cell_id();
    let n = heap.vector_length(buckets);
    for b in 0..n {
        let entry = heap.vector_elem(buckets, b);
        if entry.is_heap() {
            return Some((b, entry.cell_id()));
        }
    }
    None
}

/// Entry following (bucket, entry) in bucket order.
pub(crate) fn hashmap_next(heap: &Heap, map: u32, bucket: usize, entry: u32) -> Option<(usize, u32)> {
    let next = heap.entry_next(entry);
    if next.is_heap() {
        return Some((bucket, next.cell_id()));
    }
    let buckets = heap.map_root(map).cell_id();
    let n = heap.vector_length(buckets);
    for b in bucket + 1..n {
        let entry = heap.vector_elem(buckets, b);
        if entry.is_heap() {
            return Some((b, entry.cell_id()));
        }
    }
    None
}

#[cfg(test)]
mod hash_tests {
    use super::*;
    use crate::rope;

    #[test]
    fn test_int_hashmap_basics() {
        let mut heap = Heap::new();
        let map = new_hashmap_node(&mut heap, CellType::IntHashMap, 0).cell_id();
        assert_eq!(heap.map_size(map), 0);
        assert!(hashmap_set(&mut heap, map, MapKey::Int(7), Word::new_int(70)));
        assert!(hashmap_set(&mut heap, map, MapKey::Int(-3), Word::new_int(-30)));
        assert!(!hashmap_set(&mut heap, map, MapKey::Int(7), Word::new_int(71)));
        assert_eq!(heap.map_size(map), 2);
        assert_eq!(
            hashmap_get(&heap, map, MapKey::Int(7)).unwrap().int_value(),
            71
        );
        assert!(hashmap_get(&heap, map, MapKey::Int(8)).is_none());
        assert!(hashmap_unset(&mut heap, map, MapKey::Int(7)));
        assert!(!hashmap_unset(&mut heap, map, MapKey::Int(7)));
        assert_eq!(heap.map_size(map), 1);
    }

    #[test]
    fn test_growth_keeps_entries() {
        let mut heap = Heap::new();
        let map = new_hashmap_node(&mut heap, CellType::IntHashMap, 0).cell_id();
        for i in 0..200 {
            hashmap_set(&mut heap, map, MapKey::Int(i), Word::new_int(i * 2));
        }
        assert_eq!(heap.map_size(map), 200);
        for i in 0..200 {
            let v = hashmap_get(&heap, map, MapKey::Int(i)).unwrap();
            assert_eq!(v.int_value(), i * 2);
        }
    }

    #[test]
    fn test_string_keys_compare_by_content() {
        let mut heap = Heap::new();
        let map = new_hashmap_node(&mut heap, CellType::StrHashMap, 0).cell_id();
        let k1 = rope::new_rope_node(&mut heap, crate::format::StringFormat::Ucs1, b"key");
        // Same content through a different construction.
        let a = rope::new_rope_node(&mut heap, crate::format::StringFormat::Ucs1, b"k");
        let b = rope::new_rope_node(&mut heap, crate::format::StringFormat::Ucs1, b"ey");
        let k2 = rope::concat_ropes(&mut heap, a, b);
        hashmap_set(&mut heap, map, MapKey::Rope(k1), Word::new_int(1));
        assert!(!hashmap_set(&mut heap, map, MapKey::Rope(k2), Word::new_int(2)));
        assert_eq!(heap.map_size(map), 1);
        assert_eq!(
            hashmap_get(&heap, map, MapKey::Rope(k2)).unwrap().int_value(),
            2
        );
    }

    #[test]
    fn test_iteration_covers_all_entries() {
        let mut heap = Heap::new();
        let map = new_hashmap_node(&mut heap, CellType::IntHashMap, 0).cell_id();
        for i in 0..50 {
            hashmap_set(&mut heap, map, MapKey::Int(i), Word::new_int(i));
        }
        let mut seen = 0;
        let mut cur = hashmap_first(&heap, map);
        while let Some((b, e)) = cur {
            seen += 1;
            cur = hashmap_next(&heap, map, b, e);
        }
        assert_eq!(seen, 50);
    }
}
