// Trie maps: crit-bit trees over string codepoints or integer keys, giving
// ordered iteration. String keys compare codepoint-wise with positions past
// the end reading as zero (keys containing NUL are not supported); integer
// keys are ordered by flipping the sign bit and comparing as unsigned.

use crate::hash::MapKey;
use crate::pages::Heap;
use crate::rope::{rope_char_at, rope_length};
use crate::word::{CellType, Word, NIL};

pub(crate) fn new_triemap_node(heap: &mut Heap, tag: CellType) -> Word {
    debug_assert!(matches!(tag, CellType::StrTrieMap | CellType::IntTrieMap));
    let id = heap.alloc_cells(1);
    heap.init_map(id, tag);
    Word::from_cell(id)
}

fn int_bits(key: isize) -> u64 {
    (key as u64) ^ (1u64 << 63)
}

fn char_or_zero(heap: &Heap, key: Word, index: usize) -> u32 {
    if index < rope_length(heap, key) {
        rope_char_at(heap, key, index)
    } else {
        0
    }
}

/// Critical position distinguishing two unequal keys.
enum Crit {
    Str { index: usize, mask: u32 },
    Int { mask: u64 },
}

fn key_diff(heap: &Heap, key: MapKey, entry: u32) -> Option<Crit> {
    match key {
        MapKey::Rope(k) => {
            let ekey = heap.entry_key(entry);
            let len = rope_length(heap, k).max(rope_length(heap, ekey));
            for index in 0..len {
                let a = char_or_zero(heap, k, index);
                let b = char_or_zero(heap, ekey, index);
                if a != b {
                    let x = a ^ b;
                    let mask = 1u32 << (31 - x.leading_zeros());
                    return Some(Crit::Str { index, mask });
                }
            }
            None
        }
        MapKey::Int(k) => {
            let x = int_bits(k) ^ int_bits(heap.entry_int_key(entry));
            if x == 0 {
                None
            } else {
                Some(Crit::Int {
                    mask: 1u64 << (63 - x.leading_zeros()),
                })
            }
        }
    }
}

/// Whether `key` takes the right branch at a trie node.
fn key_bit(heap: &Heap, key: MapKey, node: u32) -> bool {
    match key {
        MapKey::Rope(k) => {
            let index = heap.trie_str_index(node);
            let mask = heap.trie_str_mask(node);
            char_or_zero(heap, k, index) & mask != 0
        }
        MapKey::Int(k) => int_bits(k) & heap.trie_int_mask(node) != 0,
    }
}

/// Whether an existing node discriminates at an earlier position than
/// `crit`.
fn node_above(heap: &Heap, node: u32, crit: &Crit) -> bool {
    match *crit {
        Crit::Str { index, mask } => {
            let ni = heap.trie_str_index(node);
            ni < index || (ni == index && heap.trie_str_mask(node) > mask)
        }
        Crit::Int { mask } => heap.trie_int_mask(node) > mask,
    }
}

fn is_trie_node(heap: &Heap, w: Word) -> bool {
    w.is_heap()
        && matches!(
            heap.cell_tag(w.cell_id()),
            CellType::StrTrieNode | CellType::IntTrieNode
        )
}

#[derive(Clone, Copy)]
struct Slot {
    cell: u32,
    off: usize,
}

fn get_slot(heap: &Heap, s: Slot) -> Word {
    Word(heap.word(s.cell, s.off) as usize)
}

fn set_slot(heap: &mut Heap, s: Slot, w: Word) {
    heap.set_word(s.cell, s.off, w.0 as u64);
    if w.is_heap() {
        heap.declare_child(Word::from_cell(s.cell), w);
    }
}

fn root_slot(map: u32) -> Slot {
    Slot { cell: map, off: 1 }
}

/// Descend to the closest leaf entry for `key`.
fn closest_entry(heap: &Heap, map: u32, key: MapKey) -> Option<u32> {
    let mut node = heap.map_root(map);
    if node.is_nil() {
        return None;
    }
    while is_trie_node(heap, node) {
        let id = node.cell_id();
        node = if key_bit(heap, key, id) {
            heap.trie_right(id)
        } else {
            heap.trie_left(id)
        };
    }
    Some(node.cell_id())
}

pub(crate) fn triemap_get(heap: &Heap, map: u32, key: MapKey) -> Option<Word> {
    let entry = closest_entry(heap, map, key)?;
    if key_diff(heap, key, entry).is_none() {
        Some(heap.entry_value(entry))
    } else {
        None
    }
}

pub(crate) fn triemap_find(heap: &Heap, map: u32, key: MapKey) -> Option<u32> {
    let entry = closest_entry(heap, map, key)?;
    if key_diff(heap, key, entry).is_none() {
        Some(entry)
    } else {
        None
    }
}

fn new_entry(heap: &mut Heap, key: MapKey, value: Word) -> Word {
    let eid = heap.alloc_cells(2);
    match key {
        MapKey::Rope(k) => {
            heap.init_map_entry(eid, CellType::MapEntry, 0, NIL, k.0 as u64, value)
        }
        MapKey::Int(k) => {
            heap.init_map_entry(eid, CellType::IntMapEntry, 0, NIL, k as u64, value)
        }
    }
    Word::from_cell(eid)
}

/// Set `key` to `value`. Returns true when a new entry was created.
pub(crate) fn triemap_set(heap: &mut Heap, map: u32, key: MapKey, value: Word) -> bool {
    let size = heap.map_size(map);
    let closest = match closest_entry(heap, map, key) {
        None => {
            let entry = new_entry(heap, key, value);
            set_slot(heap, root_slot(map), entry);
            heap.set_map_size(map, 1);
            return true;
        }
        Some(e) => e,
    };
    let crit = match key_diff(heap, key, closest) {
        None => {
            heap.set_entry_value(closest, value);
            heap.declare_child(Word::from_cell(closest), value);
            return false;
        }
        Some(c) => c,
    };

    // Walk down to the first node discriminating at or after the critical
    // position; the new node goes right there.
    let mut slot = root_slot(map);
    loop {
        let node = get_slot(heap, slot);
        if !is_trie_node(heap, node) || !node_above(heap, node.cell_id(), &crit) {
            break;
        }
        let id = node.cell_id();
        slot = if key_bit(heap, key, id) {
            Slot { cell: id, off: 3 }
        } else {
            Slot { cell: id, off: 2 }
        };
    }

    let old = get_slot(heap, slot);
    let entry = new_entry(heap, key, value);
    let node = heap.alloc_cells(2);
    match crit {
        Crit::Str { index, mask } => {
            let right = match key {
                MapKey::Rope(k) => char_or_zero(heap, k, index) & mask != 0,
                MapKey::Int(_) => unreachable!(),
            };
            let (l, r) = if right { (old, entry) } else { (entry, old) };
            heap.init_str_trie_node(node, mask, index, l, r);
        }
        Crit::Int { mask } => {
            let right = match key {
                MapKey::Int(k) => int_bits(k) & mask != 0,
                MapKey::Rope(_) => unreachable!(),
            };
            let (l, r) = if right { (old, entry) } else { (entry, old) };
            heap.init_int_trie_node(node, mask, l, r);
        }
    }
    let node_word = Word::from_cell(node);
    heap.declare_child(node_word, old);
    heap.declare_child(node_word, entry);
    set_slot(heap, slot, node_word);
    heap.set_map_size(map, size + 1);
    true
}

/// Remove `key`'s entry; the parent node collapses onto the sibling.
pub(crate) fn triemap_unset(heap: &mut Heap, map: u32, key: MapKey) -> bool {
    let root = heap.map_root(map);
    if root.is_nil() {
        return false;
    }
    let mut slot = root_slot(map);
    let mut parent: Option<(u32, bool, Slot)> = None;
    let mut node = root;
    while is_trie_node(heap, node) {
        let id = node.cell_id();
        let right = key_bit(heap, key, id);
        parent = Some((id, right, slot));
        slot = if right {
            Slot { cell: id, off: 3 }
        } else {
            Slot { cell: id, off: 2 }
        };
        node = get_slot(heap, slot);
    }
    let entry = node.cell_id();
    if key_diff(heap, key, entry).is_some() {
        return false;
    }
    match parent {
        None => set_slot(heap, root_slot(map), NIL),
        Some((pid, went_right, pslot)) => {
            let sibling = if went_right {
                heap.trie_left(pid)
            } else {
                heap.trie_right(pid)
            };
            set_slot(heap, pslot, sibling);
        }
    }
    let size = heap.map_size(map);
    heap.set_map_size(map, size - 1);
    true
}

fn leftmost(heap: &Heap, mut node: Word) -> Option<u32> {
    if node.is_nil() {
        return None;
    }
    while is_trie_node(heap, node) {
        node = heap.trie_left(node.cell_id());
    }
    Some(node.cell_id())
}

fn rightmost(heap: &Heap, mut node: Word) -> Option<u32> {
    if node.is_nil() {
        return None;
    }
    while is_trie_node(heap, node) {
        node = heap.trie_right(node.cell_id());
    }
    Some(node.cell_id())
}

/// Entry with the smallest key.
pub(crate) fn triemap_first(heap: &Heap, map: u32) -> Option<u32> {
    leftmost(heap, heap.map_root(map))
}

/// Entry with the largest key.
pub(crate) fn triemap_last(heap: &Heap, map: u32) -> Option<u32> {
    rightmost(heap, heap.map_root(map))
}

fn entry_lookup_key(heap: &Heap, map: u32, entry: u32) -> MapKey {
    if heap.cell_tag(map) == CellType::IntTrieMap {
        MapKey::Int(heap.entry_int_key(entry))
    } else {
        MapKey::Rope(heap.entry_key(entry))
    }
}

/// In-order successor of `entry`: the leftmost leaf of the right subtree at
/// the last node where the key went left.
pub(crate) fn triemap_next(heap: &Heap, map: u32, entry: u32) -> Option<u32> {
    let key = entry_lookup_key(heap, map, entry);
    let mut node = heap.map_root(map);
    let mut candidate = NIL;
    while is_trie_node(heap, node) {
        let id = node.cell_id();
        if key_bit(heap, key, id) {
            node = heap.trie_right(id);
        } else {
            candidate = heap.trie_right(id);
            node = heap.trie_left(id);
        }
    }
    leftmost(heap, candidate)
}

/// In-order predecessor of `entry`.
pub(crate) fn triemap_prev(heap: &Heap, map: u32, entry: u32) -> Option<u32> {
    let key = entry_lookup_key(heap, map, entry);
    let mut node = heap.map_root(map);
    let mut candidate = NIL;
    while is_trie_node(heap, node) {
        let id = node.cell_id();
        if key_bit(heap, key, id) {
            candidate = heap.trie_left(id);
            node = heap.trie_right(id);
        } else {
            node = heap.trie_left(id);
        }
    }
    rightmost(heap, candidate)
}
