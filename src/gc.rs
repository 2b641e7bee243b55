// Exact, generational mark-and-sweep collector.
//
// The allocation bitmap doubles as the mark bitmap: a cycle clears the
// bitmaps of every collected generation, then re-marks reachable objects
// from the roots and from remembered parents in older generations. Marking
// is slot-based — the stack holds (cell, word-offset) pairs naming the
// location a child reference was read from — so that forwarding left behind
// by promotion can be healed in place as it is encountered.
//
// A cell is promoted after surviving two collections: the first survival
// sets its age bit, and on a later cycle where its generation is the top
// collected one it is copied into the next generation's pool, leaving a
// redirect cell behind. Promotion only ever targets an uncollected pool, so
// a copy can never land on top of a live-but-not-yet-marked object.

use std::collections::HashMap;

use crate::error::ErrorLevel;
use crate::format::{Char, StringFormat};
use crate::pages::{Heap, CELLS_PER_PAGE, INVALID_PAGE};
use crate::word::{CellType, Word};

/// Number of generations. Generation 0 is the nursery.
pub const GC_MAX_GENERATIONS: usize = 6;

#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    pub cycles: u64,
    pub promoted_cells: u64,
    pub last_max_generation: usize,
}

/// Chunk description returned by a custom rope's chunk accessor; offsets are
/// relative to the word's data area.
#[derive(Debug, Clone, Copy)]
pub struct CustomChunk {
    pub format: StringFormat,
    pub byte_offset: usize,
    pub byte_len: usize,
    pub char_len: usize,
}

/// Rope behavior of a custom word type. A missing `chunk_at` forces
/// per-character traversal. Subrope and concatenation always use the
/// generic routines.
#[derive(Clone, Copy)]
pub struct RopeProcs {
    pub length: fn(&[u64]) -> usize,
    pub char_at: fn(&[u64], usize) -> Char,
    pub chunk_at: Option<fn(&[u64], usize, usize) -> CustomChunk>,
}

/// Custom word type descriptor. Procs live in this registry, keyed by the
/// type id stored in the cell header; cells never carry function pointers.
#[derive(Clone, Copy)]
pub struct WordTypeDesc {
    pub name: &'static str,
    /// Called on collected words during sweep.
    pub free: Option<fn(&[u64])>,
    /// Word offsets of child references within the data area.
    pub children: Option<fn(&[u64]) -> Vec<usize>>,
    /// Present when the type behaves as a rope.
    pub rope: Option<RopeProcs>,
}

/// A reference location: word offset `off` within the object headed at
/// `cell`.
#[derive(Debug, Clone, Copy)]
struct Slot {
    cell: u32,
    off: usize,
}

impl Heap {
    /// Follow promotion forwarding. Called on every word entering a public
    /// operation; redirects never surface to user code.
    pub(crate) fn resolve(&self, mut w: Word) -> Word {
        while w.is_heap() && self.cell_tag(w.cell_id()) == CellType::Redirect {
            w = self.redirect_target(w.cell_id());
        }
        w
    }

    /// Record `parent` (an older cell) as referencing a younger child.
    /// Engines call this after every mutating child-pointer write.
    pub(crate) fn declare_child(&mut self, parent: Word, child: Word) {
        if !parent.is_heap() || !child.is_heap() {
            return;
        }
        if self.cell_generation(parent.cell_id()) <= self.cell_generation(child.cell_id()) {
            return;
        }
        self.declare_parent(parent);
    }

    fn declare_parent(&mut self, parent: Word) {
        let id = parent.cell_id();
        if !self.cell_parent_flag(id) {
            self.set_cell_parent_flag(id, true);
            self.parents.push(parent);
        }
    }

    /*
     * Preserved roots.
     */

    /// Declare a word as a GC root. Roots are refcounted: preserving twice
    /// requires releasing twice.
    pub(crate) fn preserve(&mut self, w: Word) {
        let w = self.resolve(w);
        if !w.is_heap() {
            // Immediates survive on their own.
            return;
        }
        if let Some(&rid) = self.root_index.get(&w.0) {
            let rc = self.root_refcount(rid);
            self.set_root_refcount(rid, rc + 1);
            return;
        }
        let rid = self.alloc_cells(1);
        let head = self.root_head;
        self.init_root(rid, 1, head, w);
        self.root_head = rid;
        self.root_index.insert(w.0, rid);
    }

    /// Drop one reference to a preserved word.
    pub(crate) fn release(&mut self, w: Word) {
        let w = self.resolve(w);
        if !w.is_heap() {
            return;
        }
        let rid = match self.root_index.get(&w.0) {
            Some(&rid) => rid,
            None => {
                col_error!(ErrorLevel::Error, "release without matching preserve");
                return;
            }
        };
        let rc = self.root_refcount(rid);
        if rc > 1 {
            self.set_root_refcount(rid, rc - 1);
            return;
        }
        self.root_index.remove(&w.0);
        // Unlink from the root list and free the cell right away.
        if self.root_head == rid {
            self.root_head = self.root_next(rid);
        } else {
            let mut prev = self.root_head;
            while self.root_next(prev) != rid {
                prev = self.root_next(prev);
                debug_assert!(prev != 0, "root cell not in root list");
            }
            let next = self.root_next(rid);
            self.set_root_next(prev, next);
        }
        let idx = (rid as usize) % CELLS_PER_PAGE;
        self.page_of_mut(rid).clear_cells(idx, 1);
    }

    /*
     * Custom word types.
     */

    pub(crate) fn register_word_type(&mut self, desc: WordTypeDesc) -> u16 {
        let id = self.word_types.len() as u16;
        self.word_types.push(desc);
        id
    }

    pub(crate) fn new_custom_word(&mut self, type_id: u16, data_cells: usize) -> Word {
        if type_id as usize >= self.word_types.len() {
            col_error!(ErrorLevel::Error, "unregistered word type {}", type_id);
            return crate::word::NIL;
        }
        let id = self.alloc_cells(1 + data_cells);
        self.init_custom(id, type_id, data_cells);
        for k in 0..data_cells * 2 {
            self.set_custom_data_word(id, k, 0);
        }
        self.custom_cells.push(id);
        Word::from_cell(id)
    }
}

fn mark_cells(heap: &mut Heap, id: u32, n: usize) {
    let idx = (id as usize) % CELLS_PER_PAGE;
    heap.page_of_mut(id).set_cells(idx, n);
}

fn push_child_slots(heap: &Heap, id: u32, stack: &mut Vec<Slot>) {
    match heap.cell_tag(id) {
        CellType::RopeLeaf => {}
        CellType::Subrope | CellType::Sublist => stack.push(Slot { cell: id, off: 1 }),
        CellType::ConcatRope | CellType::ConcatList | CellType::MConcatList => {
            stack.push(Slot { cell: id, off: 2 });
            stack.push(Slot { cell: id, off: 3 });
        }
        CellType::Vector | CellType::MVector => {
            for i in 0..heap.vector_length(id) {
                stack.push(Slot {
                    cell: id,
                    off: 2 + i,
                });
            }
        }
        CellType::List | CellType::MList | CellType::StrBuf => {
            stack.push(Slot { cell: id, off: 1 })
        }
        CellType::MapEntry => {
            stack.push(Slot { cell: id, off: 1 });
            stack.push(Slot { cell: id, off: 2 });
            stack.push(Slot { cell: id, off: 3 });
        }
        CellType::IntMapEntry => {
            stack.push(Slot { cell: id, off: 1 });
            stack.push(Slot { cell: id, off: 3 });
        }
        CellType::StrHashMap
        | CellType::IntHashMap
        | CellType::StrTrieMap
        | CellType::IntTrieMap => stack.push(Slot { cell: id, off: 1 }),
        CellType::StrTrieNode | CellType::IntTrieNode => {
            stack.push(Slot { cell: id, off: 2 });
            stack.push(Slot { cell: id, off: 3 });
        }
        CellType::Custom => {
            let desc = heap.word_types[heap.custom_type_id(id) as usize];
            if let Some(children) = desc.children {
                let n = heap.custom_data_cells(id);
                let data = heap.data_words(id, n * 2);
                for k in children(data) {
                    stack.push(Slot {
                        cell: id,
                        off: 2 + k,
                    });
                }
            }
        }
        CellType::Root | CellType::Redirect => stack.push(Slot { cell: id, off: 1 }),
    }
}

fn process_slot(heap: &mut Heap, slot: Slot, max_gen: usize, stack: &mut Vec<Slot>) {
    let raw = Word(heap.word(slot.cell, slot.off) as usize);
    if !raw.is_heap() {
        return;
    }

    // Heal forwarding left by earlier promotions.
    let mut id = raw.cell_id();
    while heap.cell_tag(id) == CellType::Redirect {
        let t = heap.redirect_target(id);
        debug_assert!(t.is_heap());
        id = t.cell_id();
    }
    if id != raw.cell_id() {
        heap.set_word(slot.cell, slot.off, Word::from_cell(id).0 as u64);
    }

    let gen = heap.cell_generation(id) as usize;
    if gen > max_gen {
        // Not collected this cycle; cross-generation edges out of it are
        // covered by the remembered parent list.
        return;
    }
    if heap.cell_is_live(id) {
        return;
    }

    let tag = heap.cell_tag(id);
    let n = heap.object_cells(id);

    if heap.cell_age(id) && gen == max_gen && gen + 1 < GC_MAX_GENERATIONS {
        // Second survival: copy into the next generation and leave a
        // redirect behind. The target pool is not being collected, so the
        // copy cannot overlap anything still unmarked.
        let new_id = heap.alloc_cells_gen(n, gen + 1);
        for k in 0..n * 2 {
            let v = heap.word(id, k);
            heap.set_word(new_id, k, v);
        }
        heap.set_cell_age(new_id, false);
        heap.set_cell_parent_flag(new_id, false);
        let new_word = Word::from_cell(new_id);
        heap.init_redirect(id, new_word);
        mark_cells(heap, id, 1);
        heap.redirects.push(id);
        heap.set_word(slot.cell, slot.off, new_word.0 as u64);
        if tag == CellType::Custom {
            heap.custom_cells.push(new_id);
        }
        // The copy may now be older than its children.
        heap.declare_parent(new_word);
        heap.stats.promoted_cells += n as u64;
        push_child_slots(heap, new_id, stack);
    } else {
        if !heap.cell_age(id) {
            heap.set_cell_age(id, true);
        }
        mark_cells(heap, id, n);
        push_child_slots(heap, id, stack);
    }
}

/// Run one collection cycle over generations `0..=G`, where G rises every
/// `gen_factor` collections of the generation below it.
pub(crate) fn collect(heap: &mut Heap) {
    heap.gc_pending = false;

    let mut max_gen = 0;
    while max_gen + 1 < GC_MAX_GENERATIONS
        && (heap.pools[max_gen].gc_count + 1) % heap.gen_factor == 0
    {
        max_gen += 1;
    }

    // The allocation bitmap becomes the mark bitmap.
    for gen in 0..=max_gen {
        let mut pid = heap.pools[gen].first_page;
        while pid != INVALID_PAGE {
            let next = heap.page(pid).next;
            heap.page_mut(pid).clear_all_cells();
            pid = next;
        }
    }

    let mut stack: Vec<Slot> = Vec::new();

    // Roots. Root cells are marked in place and never promoted, so the list
    // links stay valid across the cycle.
    let mut rid = heap.root_head;
    while rid != 0 {
        if (heap.cell_generation(rid) as usize) <= max_gen {
            mark_cells(heap, rid, 1);
        }
        stack.push(Slot { cell: rid, off: 1 });
        rid = heap.root_next(rid);
    }

    // Remembered parents in uncollected generations.
    let parents = std::mem::take(&mut heap.parents);
    for p in &parents {
        let id = p.cell_id();
        if (heap.cell_generation(id) as usize) > max_gen
            && heap.cell_tag(id) != CellType::Redirect
        {
            push_child_slots(heap, id, &mut stack);
        }
    }
    heap.parents = parents;

    while let Some(slot) = stack.pop() {
        process_slot(heap, slot, max_gen, &mut stack);
    }

    // Keep redirect cells alive while their target lives: words held on the
    // mutator's stack resolve through them lazily.
    let redirects = std::mem::take(&mut heap.redirects);
    let mut kept = Vec::with_capacity(redirects.len());
    for rid in redirects {
        if (heap.cell_generation(rid) as usize) > max_gen {
            kept.push(rid);
            continue;
        }
        let mut target = heap.redirect_target(rid);
        while target.is_heap() && heap.cell_tag(target.cell_id()) == CellType::Redirect {
            target = heap.redirect_target(target.cell_id());
        }
        let live = target.is_heap()
            && ((heap.cell_generation(target.cell_id()) as usize) > max_gen
                || heap.cell_is_live(target.cell_id()));
        if live {
            // Path-compress the chain while we are here.
            heap.init_redirect(rid, target);
            mark_cells(heap, rid, 1);
            kept.push(rid);
        }
    }
    heap.redirects = kept;

    // Sweep custom words: run cleanup procs for the ones that died. Entries
    // whose cell now holds a redirect were promoted; the copy was recorded
    // during marking.
    let customs = std::mem::take(&mut heap.custom_cells);
    let mut live_customs = Vec::with_capacity(customs.len());
    for cid in customs {
        let live = (heap.cell_generation(cid) as usize) > max_gen || heap.cell_is_live(cid);
        if live {
            if heap.cell_tag(cid) == CellType::Custom {
                live_customs.push(cid);
            }
            continue;
        }
        let desc = heap.word_types[heap.custom_type_id(cid) as usize];
        if let Some(free) = desc.free {
            let n = heap.custom_data_cells(cid);
            let mut data = Vec::with_capacity(n * 2);
            for k in 0..n * 2 {
                data.push(heap.custom_data_word(cid, k));
            }
            free(&data);
        }
    }
    heap.custom_cells = live_customs;

    // Drop remembered parents that died or were forwarded.
    let parents = std::mem::take(&mut heap.parents);
    heap.parents = parents
        .into_iter()
        .filter(|p| {
            let id = p.cell_id();
            let live =
                (heap.cell_generation(id) as usize) > max_gen || heap.cell_is_live(id);
            live && heap.cell_tag(id) != CellType::Redirect
        })
        .collect();

    // Preserved words may have been forwarded; re-key the root index.
    let mut index = HashMap::with_capacity(heap.root_index.len());
    let mut rid = heap.root_head;
    while rid != 0 {
        index.insert(heap.root_source(rid).0, rid);
        rid = heap.root_next(rid);
    }
    heap.root_index = index;

    heap.reclaim_empty_pages(max_gen);
    for gen in 0..=max_gen {
        heap.pools[gen].gc_count += 1;
        heap.pools[gen].alloc_count = 0;
    }
    heap.stats.cycles += 1;
    heap.stats.last_max_generation = max_gen;

    #[cfg(feature = "gc_stats")]
    eprintln!(
        "nereid: gc cycle {} collected generations 0..={}, {} cells promoted, {} pages",
        heap.stats.cycles,
        max_gen,
        heap.stats.promoted_cells,
        heap.page_count(),
    );

    #[cfg(feature = "paranoid")]
    verify_heap(heap, max_gen);
}

/// Walk the root list and check that everything reachable from preserved
/// words is marked live.
#[cfg(any(feature = "paranoid", test))]
pub(crate) fn verify_heap(heap: &Heap, _max_gen: usize) {
    let mut seen = std::collections::HashSet::new();
    let mut rid = heap.root_head;
    while rid != 0 {
        assert!(heap.cell_is_live(rid), "root cell swept");
        let mut reachable: Vec<Word> = vec![heap.root_source(rid)];
        while let Some(w) = reachable.pop() {
            if !w.is_heap() {
                continue;
            }
            let id = w.cell_id();
            if !seen.insert(id) {
                continue;
            }
            assert!(heap.cell_is_live(id), "reachable cell swept");
            let mut slots = Vec::new();
            push_child_slots(heap, id, &mut slots);
            for s in slots {
                reachable.push(Word(heap.word(s.cell, s.off) as usize));
            }
        }
        rid = heap.root_next(rid);
    }
}

#[cfg(test)]
mod gc_tests {
    use super::*;
    use crate::word::NIL;

    fn new_pair(heap: &mut Heap, left: Word, right: Word) -> Word {
        let id = heap.alloc_cells(2);
        heap.init_concat(id, CellType::ConcatList, 1, 2, left, right);
        Word::from_cell(id)
    }

    #[test]
    fn test_unreachable_cells_are_swept() {
        let mut heap = Heap::new();
        let kept = new_pair(&mut heap, NIL, NIL);
        let dropped = new_pair(&mut heap, NIL, NIL);
        heap.preserve(kept);
        collect(&mut heap);
        assert!(heap.cell_is_live(kept.cell_id()));
        assert!(!heap.cell_is_live(dropped.cell_id()));
        verify_heap(&heap, 0);
    }

    #[test]
    fn test_reachable_graph_survives() {
        let mut heap = Heap::new();
        let a = new_pair(&mut heap, NIL, NIL);
        let b = new_pair(&mut heap, a, NIL);
        let c = new_pair(&mut heap, b, a);
        heap.preserve(c);
        collect(&mut heap);
        assert!(heap.cell_is_live(a.cell_id()));
        assert!(heap.cell_is_live(b.cell_id()));
        assert!(heap.cell_is_live(c.cell_id()));
    }

    #[test]
    fn test_release_drops_root() {
        let mut heap = Heap::new();
        let a = new_pair(&mut heap, NIL, NIL);
        heap.preserve(a);
        heap.preserve(a);
        heap.release(a);
        collect(&mut heap);
        assert!(heap.cell_is_live(a.cell_id()));
        heap.release(a);
        collect(&mut heap);
        assert!(!heap.cell_is_live(a.cell_id()));
    }

    #[test]
    fn test_promotion_after_two_survivals() {
        let mut heap = Heap::new();
        let a = new_pair(&mut heap, NIL, NIL);
        heap.preserve(a);
        assert_eq!(heap.cell_generation(a.cell_id()), 0);
        collect(&mut heap); /* first survival: aged */
        assert!(heap.cell_age(a.cell_id()));
        collect(&mut heap); /* second survival: promoted */
        let resolved = heap.resolve(a);
        assert_ne!(resolved, a);
        assert_eq!(heap.cell_generation(resolved.cell_id()), 1);
        // The old cell now forwards to the copy.
        assert_eq!(heap.cell_tag(a.cell_id()), CellType::Redirect);
        // The root was healed to point at the copy.
        let rid = *heap.root_index.get(&resolved.0).unwrap();
        assert_eq!(heap.root_source(rid), resolved);
    }

    #[test]
    fn test_redirect_kept_while_target_lives() {
        let mut heap = Heap::new();
        let a = new_pair(&mut heap, NIL, NIL);
        heap.preserve(a);
        collect(&mut heap);
        collect(&mut heap); /* promoted here */
        let old = a;
        let resolved = heap.resolve(a);
        assert_ne!(resolved, old);
        collect(&mut heap);
        // The stale word still resolves after another cycle.
        assert_eq!(heap.resolve(old), resolved);
    }

    #[test]
    fn test_cross_generation_edge() {
        let mut heap = Heap::new();
        let parent = new_pair(&mut heap, NIL, NIL);
        heap.preserve(parent);
        collect(&mut heap);
        collect(&mut heap); /* parent now in generation 1 */
        let parent = heap.resolve(parent);
        assert_eq!(heap.cell_generation(parent.cell_id()), 1);

        // Mutate: point the old parent at a nursery child.
        let child = new_pair(&mut heap, NIL, NIL);
        let pid = parent.cell_id();
        heap.set_word(pid, 2, child.0 as u64);
        heap.declare_child(parent, child);

        // A nursery-only collection must keep the child alive through the
        // remembered parent.
        collect(&mut heap);
        assert!(heap.cell_is_live(heap.resolve(child).cell_id()));
    }

    #[test]
    fn test_custom_word_free_proc() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static FREED: AtomicUsize = AtomicUsize::new(0);

        fn free_proc(_data: &[u64]) {
            FREED.fetch_add(1, Ordering::SeqCst);
        }

        let mut heap = Heap::new();
        let tid = heap.register_word_type(WordTypeDesc {
            name: "resource",
            free: Some(free_proc),
            children: None,
            rope: None,
        });
        let w = heap.new_custom_word(tid, 1);
        assert!(w.is_heap());
        collect(&mut heap);
        assert_eq!(FREED.load(Ordering::SeqCst), 1);
    }
}
