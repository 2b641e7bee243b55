// Generic map front-end: dispatches on the map word's kind to the hash or
// trie implementation and carries the common iterator surface.

use crate::error::ErrorLevel;
use crate::hash::{
    hashmap_find, hashmap_first, hashmap_get, hashmap_next, hashmap_set, hashmap_unset,
    new_hashmap_node, MapKey,
};
use crate::pages::Heap;
use crate::rope::is_rope_word;
use crate::runtime::with_heap;
use crate::trie::{
    new_triemap_node, triemap_find, triemap_first, triemap_get, triemap_last, triemap_next,
    triemap_prev, triemap_set, triemap_unset,
};
use crate::word::{CellType, Word, NIL};

fn map_tag(heap: &Heap, w: Word) -> Option<CellType> {
    if w.is_heap() {
        let tag = heap.cell_tag(w.cell_id());
        if matches!(
            tag,
            CellType::StrHashMap | CellType::IntHashMap | CellType::StrTrieMap | CellType::IntTrieMap
        ) {
            return Some(tag);
        }
    }
    col_error!(ErrorLevel::Error, "{:#x} is not a map", w.0);
    None
}

fn str_keyed(tag: CellType) -> bool {
    matches!(tag, CellType::StrHashMap | CellType::StrTrieMap)
}

fn is_hash(tag: CellType) -> bool {
    matches!(tag, CellType::StrHashMap | CellType::IntHashMap)
}

/*
 * Creation.
 */

/// New string-keyed hash map with room for `capacity` entries.
pub fn new_hash_map(capacity: usize) -> Word {
    with_heap(|heap| new_hashmap_node(heap, CellType::StrHashMap, capacity)).unwrap_or(NIL)
}

/// New integer-keyed hash map.
pub fn new_int_hash_map(capacity: usize) -> Word {
    with_heap(|heap| new_hashmap_node(heap, CellType::IntHashMap, capacity)).unwrap_or(NIL)
}

/// New string-keyed trie map (ordered).
pub fn new_trie_map() -> Word {
    with_heap(|heap| new_triemap_node(heap, CellType::StrTrieMap)).unwrap_or(NIL)
}

/// New integer-keyed trie map (ordered).
pub fn new_int_trie_map() -> Word {
    with_heap(|heap| new_triemap_node(heap, CellType::IntTrieMap)).unwrap_or(NIL)
}

/*
 * Access.
 */

/// Number of entries.
pub fn size(map: Word) -> usize {
    with_heap(|heap| {
        let map = heap.resolve(map);
        match map_tag(heap, map) {
            Some(_) => heap.map_size(map.cell_id()),
            None => 0,
        }
    })
    .unwrap_or(0)
}

fn check_str_key(heap: &Heap, map: Word, key: Word) -> Option<(CellType, u32)> {
    let tag = map_tag(heap, map)?;
    if !str_keyed(tag) {
        col_error!(ErrorLevel::Error, "{:#x} is not a string-keyed map", map.0);
        return None;
    }
    if !is_rope_word(heap, key) {
        col_error!(ErrorLevel::Error, "map key {:#x} is not a rope", key.0);
        return None;
    }
    Some((tag, map.cell_id()))
}

fn check_int_key(heap: &Heap, map: Word) -> Option<(CellType, u32)> {
    let tag = map_tag(heap, map)?;
    if str_keyed(tag) {
        col_error!(ErrorLevel::Error, "{:#x} is not an integer-keyed map", map.0);
        return None;
    }
    Some((tag, map.cell_id()))
}

/// Look up a string key.
pub fn get(map: Word, key: Word) -> Option<Word> {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let key = heap.resolve(key);
        let (tag, id) = check_str_key(heap, map, key)?;
        if is_hash(tag) {
            hashmap_get(heap, id, MapKey::Rope(key))
        } else {
            triemap_get(heap, id, MapKey::Rope(key))
        }
    })
    .unwrap_or(None)
}

/// Bind a string key; returns true when the entry was created.
pub fn set(map: Word, key: Word, value: Word) -> bool {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let key = heap.resolve(key);
        let value = heap.resolve(value);
        let (tag, id) = match check_str_key(heap, map, key) {
            Some(x) => x,
            None => return false,
        };
        if is_hash(tag) {
            hashmap_set(heap, id, MapKey::Rope(key), value)
        } else {
            triemap_set(heap, id, MapKey::Rope(key), value)
        }
    })
    .unwrap_or(false)
}

/// Remove a string key; returns true when an entry was removed.
pub fn unset(map: Word, key: Word) -> bool {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let key = heap.resolve(key);
        let (tag, id) = match check_str_key(heap, map, key) {
            Some(x) => x,
            None => return false,
        };
        if is_hash(tag) {
            hashmap_unset(heap, id, MapKey::Rope(key))
        } else {
            triemap_unset(heap, id, MapKey::Rope(key))
        }
    })
    .unwrap_or(false)
}

/// Look up an integer key.
pub fn int_get(map: Word, key: isize) -> Option<Word> {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let (tag, id) = check_int_key(heap, map)?;
        if is_hash(tag) {
            hashmap_get(heap, id, MapKey::Int(key))
        } else {
            triemap_get(heap, id, MapKey::Int(key))
        }
    })
    .unwrap_or(None)
}

/// Bind an integer key; returns true when the entry was created.
pub fn int_set(map: Word, key: isize, value: Word) -> bool {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let value = heap.resolve(value);
        let (tag, id) = match check_int_key(heap, map) {
            Some(x) => x,
            None => return false,
        };
        if is_hash(tag) {
            hashmap_set(heap, id, MapKey::Int(key), value)
        } else {
            triemap_set(heap, id, MapKey::Int(key), value)
        }
    })
    .unwrap_or(false)
}

/// Remove an integer key; returns true when an entry was removed.
pub fn int_unset(map: Word, key: isize) -> bool {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let (tag, id) = match check_int_key(heap, map) {
            Some(x) => x,
            None => return false,
        };
        if is_hash(tag) {
            hashmap_unset(heap, id, MapKey::Int(key))
        } else {
            triemap_unset(heap, id, MapKey::Int(key))
        }
    })
    .unwrap_or(false)
}

/*
 * Iterators. Hash maps iterate in bucket order, trie maps in key order
 * (and backward).
 */

/// Map iterator: the current entry plus its bucket for hash maps.
#[derive(Debug, Clone)]
pub struct MapIter {
    map: Word,
    entry: Word,
    bucket: usize,
}

impl MapIter {
    fn at_end() -> MapIter {
        MapIter {
            map: NIL,
            entry: NIL,
            bucket: 0,
        }
    }

    fn from_entry(map: Word, bucket: usize, entry: Option<u32>) -> MapIter {
        match entry {
            Some(e) => MapIter {
                map,
                entry: Word::from_cell(e),
                bucket,
            },
            None => MapIter::at_end(),
        }
    }

    pub fn end(&self) -> bool {
        self.map.is_nil()
    }

    pub fn map(&self) -> Word {
        self.map
    }

    /// Key of the current entry (string-keyed maps).
    pub fn key(&self) -> Word {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid map iterator");
            return NIL;
        }
        with_heap(|heap| {
            let eid = self.entry.cell_id();
            if heap.cell_tag(eid) != CellType::MapEntry {
                col_error!(ErrorLevel::Error, "not a string-keyed map entry");
                return NIL;
            }
            heap.entry_key(eid)
        })
        .unwrap_or(NIL)
    }

    /// Key of the current entry (integer-keyed maps).
    pub fn int_key(&self) -> isize {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid map iterator");
            return 0;
        }
        with_heap(|heap| {
            let eid = self.entry.cell_id();
            if heap.cell_tag(eid) != CellType::IntMapEntry {
                col_error!(ErrorLevel::Error, "not an integer-keyed map entry");
                return 0;
            }
            heap.entry_int_key(eid)
        })
        .unwrap_or(0)
    }

    /// Value of the current entry.
    pub fn value(&self) -> Word {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid map iterator");
            return NIL;
        }
        with_heap(|heap| heap.entry_value(self.entry.cell_id())).unwrap_or(NIL)
    }

    /// Overwrite the value of the current entry.
    pub fn set_value(&self, value: Word) {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid map iterator");
            return;
        }
        with_heap(|heap| {
            let value = heap.resolve(value);
            let eid = self.entry.cell_id();
            heap.set_entry_value(eid, value);
            heap.declare_child(self.entry, value);
        });
    }

    /// Advance to the next entry.
    pub fn next(&mut self) {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid map iterator");
            return;
        }
        let updated = with_heap(|heap| {
            let map = self.map.cell_id();
            let eid = self.entry.cell_id();
            match heap.cell_tag(map) {
                CellType::StrHashMap | CellType::IntHashMap => {
                    match hashmap_next(heap, map, self.bucket, eid) {
                        Some((b, e)) => Some((b, e)),
                        None => None,
                    }
                }
                _ => triemap_next(heap, map, eid).map(|e| (0, e)),
            }
        })
        .unwrap_or(None);
        match updated {
            Some((b, e)) => {
                self.bucket = b;
                self.entry = Word::from_cell(e);
            }
            None => *self = MapIter::at_end(),
        }
    }

    /// Step back to the previous entry; ordered (trie) maps only.
    pub fn prev(&mut self) {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid map iterator");
            return;
        }
        let updated = with_heap(|heap| {
            let map = self.map.cell_id();
            let eid = self.entry.cell_id();
            match heap.cell_tag(map) {
                CellType::StrTrieMap | CellType::IntTrieMap => triemap_prev(heap, map, eid),
                _ => {
                    col_error!(ErrorLevel::Error, "hash map iterators cannot go backward");
                    None
                }
            }
        })
        .unwrap_or(None);
        match updated {
            Some(e) => self.entry = Word::from_cell(e),
            None => *self = MapIter::at_end(),
        }
    }
}

/// Iterator over the first entry (smallest key for trie maps).
pub fn iter(map: Word) -> MapIter {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let tag = match map_tag(heap, map) {
            Some(t) => t,
            None => return MapIter::at_end(),
        };
        let id = map.cell_id();
        if is_hash(tag) {
            match hashmap_first(heap, id) {
                Some((b, e)) => MapIter::from_entry(map, b, Some(e)),
                None => MapIter::at_end(),
            }
        } else {
            MapIter::from_entry(map, 0, triemap_first(heap, id))
        }
    })
    .unwrap_or_else(MapIter::at_end)
}

/// Iterator over the last entry; ordered (trie) maps only.
pub fn iter_last(map: Word) -> MapIter {
    with_heap(|heap| {
        let map = heap.resolve(map);
        match map_tag(heap, map) {
            Some(CellType::StrTrieMap) | Some(CellType::IntTrieMap) => {
                MapIter::from_entry(map, 0, triemap_last(heap, map.cell_id()))
            }
            Some(_) => {
                col_error!(ErrorLevel::Error, "hash maps are not ordered");
                MapIter::at_end()
            }
            None => MapIter::at_end(),
        }
    })
    .unwrap_or_else(MapIter::at_end)
}

/// Iterator positioned on a string key, creating a nil-valued entry when
/// `create` is set and the key is absent.
pub fn find(map: Word, key: Word, create: bool) -> MapIter {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let key = heap.resolve(key);
        let (tag, id) = match check_str_key(heap, map, key) {
            Some(x) => x,
            None => return MapIter::at_end(),
        };
        find_in(heap, map, tag, id, MapKey::Rope(key), create)
    })
    .unwrap_or_else(MapIter::at_end)
}

/// Iterator positioned on an integer key.
pub fn int_find(map: Word, key: isize, create: bool) -> MapIter {
    with_heap(|heap| {
        let map = heap.resolve(map);
        let (tag, id) = match check_int_key(heap, map) {
            Some(x) => x,
            None => return MapIter::at_end(),
        };
        find_in(heap, map, tag, id, MapKey::Int(key), create)
    })
    .unwrap_or_else(MapIter::at_end)
}

fn find_in(
    heap: &mut Heap,
    map: Word,
    tag: CellType,
    id: u32,
    key: MapKey,
    create: bool,
) -> MapIter {
    if is_hash(tag) {
        let (bucket, entry) = hashmap_find(heap, id, key);
        if let Some(e) = entry {
            return MapIter::from_entry(map, bucket, Some(e));
        }
        if !create {
            return MapIter::at_end();
        }
        hashmap_set(heap, id, key, NIL);
        let (bucket, entry) = hashmap_find(heap, id, key);
        MapIter::from_entry(map, bucket, entry)
    } else {
        if let Some(e) = triemap_find(heap, id, key) {
            return MapIter::from_entry(map, 0, Some(e));
        }
        if !create {
            return MapIter::at_end();
        }
        triemap_set(heap, id, key, NIL);
        MapIter::from_entry(map, 0, triemap_find(heap, id, key))
    }
}
