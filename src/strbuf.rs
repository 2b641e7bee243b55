// String buffers: append-only accumulators that emit a rope on freeze.
//
// Appended characters land in a pending inline chunk stored as UCS-4
// codepoints in the buffer's own cells; when it fills up it is flushed into
// the accumulator rope with a concat. Freezing is O(1) when the pending
// chunk is empty.

use crate::error::ErrorLevel;
use crate::format::{Char, StringFormat, CHAR_MAX};
use crate::pages::{Heap, AVAILABLE_CELLS, CELL_SIZE};
use crate::rope::{
    collect_leaf_ranges, concat_ropes, is_rope_word, rope_from_chars, rope_length, CharCursor,
};
use crate::runtime::with_heap;
use crate::word::{CellType, Word, EMPTY_ROPE, NIL};

/// Default pending-chunk capacity, in characters.
pub const DEFAULT_CAPACITY: usize = 120;

const MAX_CAPACITY: usize = (AVAILABLE_CELLS - 1) * (CELL_SIZE / 4);

pub(crate) fn new_strbuf_node(heap: &mut Heap, format: StringFormat, capacity: usize) -> Word {
    let capacity = capacity.clamp(1, MAX_CAPACITY);
    let size_cells = 1 + (capacity * 4 + CELL_SIZE - 1) / CELL_SIZE;
    let id = heap.alloc_cells(size_cells);
    heap.init_strbuf(id, format, size_cells);
    Word::from_cell(id)
}

fn expect_strbuf(heap: &Heap, w: Word) -> Option<u32> {
    if w.is_heap() && heap.cell_tag(w.cell_id()) == CellType::StrBuf {
        Some(w.cell_id())
    } else {
        col_error!(ErrorLevel::Error, "{:#x} is not a string buffer", w.0);
        None
    }
}

/// Move the pending chunk into the accumulator rope.
fn flush(heap: &mut Heap, id: u32) {
    let pending = heap.strbuf_pending_len(id);
    if pending == 0 {
        return;
    }
    let mut chars = Vec::with_capacity(pending);
    for i in 0..pending {
        chars.push(heap.strbuf_pending_char(id, i));
    }
    let format = heap.strbuf_format(id);
    let piece = rope_from_chars(heap, format, &chars);
    let acc = heap.strbuf_rope(id);
    let acc = concat_ropes(heap, acc, piece);
    heap.set_strbuf_rope(id, acc);
    heap.declare_child(Word::from_cell(id), acc);
    heap.set_strbuf_pending_len(id, 0);
}

fn push_char(heap: &mut Heap, id: u32, c: Char) {
    let pending = heap.strbuf_pending_len(id);
    if pending >= heap.strbuf_capacity(id) {
        flush(heap, id);
        heap.set_strbuf_pending_char(id, 0, c);
        heap.set_strbuf_pending_len(id, 1);
    } else {
        heap.set_strbuf_pending_char(id, pending, c);
        heap.set_strbuf_pending_len(id, pending + 1);
    }
}

pub(crate) fn strbuf_append_char(heap: &mut Heap, id: u32, c: Char) -> bool {
    let format = heap.strbuf_format(id);
    let ok = match format {
        StringFormat::Ucs => c <= CHAR_MAX,
        f => f.fits(c),
    };
    if !ok {
        col_error!(
            ErrorLevel::Error,
            "codepoint {:#x} does not fit string buffer format",
            c
        );
        return false;
    }
    push_char(heap, id, c);
    true
}

/// Effective character width of one leaf of a rope: the nominal width for
/// fixed formats, the widest character actually present for variable ones.
fn leaf_width(heap: &Heap, leaf: Word, first: usize, len: usize) -> usize {
    if leaf.is_char() {
        return StringFormat::fixed_for(leaf.char_value()).unit_width();
    }
    if leaf.is_small_string() {
        return 1;
    }
    if leaf.is_heap() && heap.cell_tag(leaf.cell_id()) == CellType::RopeLeaf {
        let format = heap.leaf_format(leaf.cell_id());
        if format.is_fixed() {
            return format.unit_width();
        }
    }
    // Variable width or custom: measure the actual characters.
    let mut width = 1;
    for i in 0..len {
        let c = crate::rope::rope_char_at(heap, leaf, first + i);
        width = width.max(StringFormat::fixed_for(c).unit_width());
    }
    width
}

pub(crate) fn strbuf_append_rope(heap: &mut Heap, id: u32, rope: Word) -> bool {
    let length = rope_length(heap, rope);
    if length == 0 {
        return true;
    }
    let format = heap.strbuf_format(id);
    if format != StringFormat::Ucs {
        // Reject ropes wider than the buffer's characters.
        let mut ranges = Vec::new();
        collect_leaf_ranges(heap, rope, 0, length, &mut ranges);
        for r in &ranges {
            if leaf_width(heap, r.leaf, r.first, r.len) > format.unit_width() {
                col_error!(
                    ErrorLevel::Error,
                    "rope is wider than the string buffer format"
                );
                return false;
            }
        }
    }
    let mut cursor = CharCursor::new(heap, rope, 0, length);
    loop {
        let c = match cursor.next(heap) {
            Some(c) => c,
            None => break,
        };
        push_char(heap, id, c);
    }
    true
}

/*
 * Public surface.
 */

/// Create a string buffer with the given target format (`Ucs` accepts any
/// character) and pending-chunk capacity in characters.
pub fn new(format: StringFormat, capacity: usize) -> Word {
    with_heap(|heap| new_strbuf_node(heap, format, capacity)).unwrap_or(NIL)
}

/// Total length accumulated so far, in characters.
pub fn length(buffer: Word) -> usize {
    with_heap(|heap| {
        let w = heap.resolve(buffer);
        let id = match expect_strbuf(heap, w) {
            Some(id) => id,
            None => return 0,
        };
        rope_length(heap, heap.strbuf_rope(id)) + heap.strbuf_pending_len(id)
    })
    .unwrap_or(0)
}

/// Append one character; fails when it does not fit the target format.
pub fn append_char(buffer: Word, c: Char) -> bool {
    with_heap(|heap| {
        let w = heap.resolve(buffer);
        let id = match expect_strbuf(heap, w) {
            Some(id) => id,
            None => return false,
        };
        strbuf_append_char(heap, id, c)
    })
    .unwrap_or(false)
}

/// Append a whole rope; fails when the rope is wider than the target format
/// (unless the buffer is `Ucs`).
pub fn append_rope(buffer: Word, rope: Word) -> bool {
    with_heap(|heap| {
        let w = heap.resolve(buffer);
        let rope = heap.resolve(rope);
        let id = match expect_strbuf(heap, w) {
            Some(id) => id,
            None => return false,
        };
        if !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "{:#x} is not a rope", rope.0);
            return false;
        }
        strbuf_append_rope(heap, id, rope)
    })
    .unwrap_or(false)
}

/// Append the characters of `rope` in `first..=last`.
pub fn append_range(buffer: Word, rope: Word, first: usize, last: usize) -> bool {
    with_heap(|heap| {
        let w = heap.resolve(buffer);
        let rope = heap.resolve(rope);
        let id = match expect_strbuf(heap, w) {
            Some(id) => id,
            None => return false,
        };
        if !is_rope_word(heap, rope) || first > last {
            return false;
        }
        let sub = crate::rope::subrope_node(heap, rope, first, last);
        strbuf_append_rope(heap, id, sub)
    })
    .unwrap_or(false)
}

/// The accumulated rope, without disturbing the buffer.
pub fn value(buffer: Word) -> Word {
    with_heap(|heap| {
        let w = heap.resolve(buffer);
        let id = match expect_strbuf(heap, w) {
            Some(id) => id,
            None => return NIL,
        };
        let pending = heap.strbuf_pending_len(id);
        let acc = heap.strbuf_rope(id);
        if pending == 0 {
            return acc;
        }
        let mut chars = Vec::with_capacity(pending);
        for i in 0..pending {
            chars.push(heap.strbuf_pending_char(id, i));
        }
        let format = heap.strbuf_format(id);
        let piece = rope_from_chars(heap, format, &chars);
        concat_ropes(heap, acc, piece)
    })
    .unwrap_or(NIL)
}

/// Emit the accumulated rope. O(1) when the pending chunk is empty,
/// otherwise one final concat. The buffer keeps the frozen value and can be
/// appended to further.
pub fn freeze(buffer: Word) -> Word {
    with_heap(|heap| {
        let w = heap.resolve(buffer);
        let id = match expect_strbuf(heap, w) {
            Some(id) => id,
            None => return EMPTY_ROPE,
        };
        flush(heap, id);
        heap.strbuf_rope(id)
    })
    .unwrap_or(EMPTY_ROPE)
}
