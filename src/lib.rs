//! Persistent ropes, lists, vectors and maps over a cell-based allocator
//! with an exact, generational, mark-and-sweep garbage collector.
//!
//! Values are opaque tagged [`Word`]s: small integers, characters, short
//! strings and void lists ride directly in the word, everything else lives
//! in 16-byte cells managed per thread. Call [`init`] once per thread before
//! anything else.
//!
//! A collection may start at the end of any allocating operation or at
//! [`resume_gc`]. A word is kept alive by being reachable from a
//! [`preserve`]d root; anything else is valid only until the next collection
//! point, so either preserve values that must last or bracket work with
//! [`pause_gc`]/[`resume_gc`] and preserve before resuming. Iterators cache
//! heap positions and are likewise invalidated by a collection.
//!
//! ```no_run
//! use nereid::{init, Mode, rope};
//!
//! init(Mode::Single);
//! let r = rope::concat(rope::from_str("hello "), rope::from_str("world"));
//! assert_eq!(rope::length(r), 11);
//! ```

#[macro_use]
mod error;
mod format;
mod gc;
mod hash;
mod pages;
mod runtime;
mod trie;
mod util;
mod word;

pub mod list;
pub mod map;
pub mod rope;
pub mod strbuf;
pub mod vector;

#[cfg(test)]
mod tests;

pub use crate::error::{error_proc, set_error_proc, ErrorLevel, ErrorProc};
pub use crate::format::{Char, StringFormat, CHAR_INVALID, CHAR_MAX};
pub use crate::gc::{CustomChunk, GcStats, RopeProcs, WordTypeDesc};
pub use crate::runtime::{
    cleanup, gc_stats, init, initialized, pause_gc, resume_gc, try_pause_gc, Mode,
};
pub use crate::word::{Word, WordType, EMPTY_LIST, EMPTY_ROPE, NIL};

use crate::runtime::with_heap;

/// Classify a word.
pub fn word_type(w: Word) -> WordType {
    with_heap(|heap| {
        let w = heap.resolve(w);
        heap.word_type(w)
    })
    .unwrap_or(WordType::Nil)
}

/// Declare a word as a GC root. Roots are refcounted; each `preserve` needs
/// a matching [`release`].
pub fn preserve(w: Word) {
    with_heap(|heap| heap.preserve(w));
}

/// Drop one root reference to a word.
pub fn release(w: Word) {
    with_heap(|heap| heap.release(w));
}

/// Record a cross-generation edge after writing `child` into `parent`.
/// Mutators of custom words must call this after every child-pointer write;
/// the built-in engines do it internally.
pub fn declare_child(parent: Word, child: Word) {
    with_heap(|heap| {
        let parent = heap.resolve(parent);
        let child = heap.resolve(child);
        heap.declare_child(parent, child);
    });
}

/// Register a custom word type and get its id.
pub fn register_word_type(desc: WordTypeDesc) -> u16 {
    with_heap(|heap| heap.register_word_type(desc)).unwrap_or(0)
}

/// Allocate a custom word of a registered type with `data_cells` cells of
/// zeroed type-owned data.
pub fn new_custom_word(type_id: u16, data_cells: usize) -> Word {
    with_heap(|heap| heap.new_custom_word(type_id, data_cells)).unwrap_or(NIL)
}

/// Read the `k`-th data word of a custom word.
pub fn custom_data(w: Word, k: usize) -> u64 {
    with_heap(|heap| {
        let w = heap.resolve(w);
        if !w.is_heap() || heap.cell_tag(w.cell_id()) != crate::word::CellType::Custom {
            col_error!(ErrorLevel::Error, "{:#x} is not a custom word", w.0);
            return 0;
        }
        heap.custom_data_word(w.cell_id(), k)
    })
    .unwrap_or(0)
}

/// Write the `k`-th data word of a custom word. When storing a child word,
/// pair the write with [`declare_child`].
pub fn set_custom_data(w: Word, k: usize, v: u64) {
    with_heap(|heap| {
        let w = heap.resolve(w);
        if !w.is_heap() || heap.cell_tag(w.cell_id()) != crate::word::CellType::Custom {
            col_error!(ErrorLevel::Error, "{:#x} is not a custom word", w.0);
            return;
        }
        heap.set_custom_data_word(w.cell_id(), k, v);
    });
}
