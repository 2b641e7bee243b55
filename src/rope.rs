// Ropes: immutable character sequences over self-balancing binary trees of
// string leaves.
//
// Leaves hold flat string data in one of five encodings; characters and
// 0..=3-char UCS-1 strings ride directly in the word as immediates. Subrope
// and concat nodes follow the same balancing discipline as lists: depth is
// one more than the deepest arm, arms differ by at most one level, sublists
// of sublists collapse to the deepest source.

use crate::error::ErrorLevel;
use crate::format::{
    self, ucs_char_at, utf16_char_at, utf16_offset, utf16_seq_len, utf8_char_at, utf8_offset,
    utf8_seq_len, Char, StringFormat, CHAR_INVALID,
};
use crate::gc::CustomChunk;
use crate::pages::{Heap, AVAILABLE_CELLS, CELL_SIZE};
use crate::runtime::with_heap;
use crate::word::{
    cells_for_bytes, CellType, Word, EMPTY_ROPE, NIL, SMALL_STRING_MAX_LENGTH,
};

/// Maximum data bytes of a single leaf (single-page object).
pub(crate) const MAX_LEAF_BYTES: usize = (AVAILABLE_CELLS - 1) * CELL_SIZE;

/// Ranges at most this many characters long are materialized as flat leaves
/// instead of tree nodes.
pub(crate) const MAX_SHORT_LEAF_CHARS: usize = 24;

/// Iterator leaf caches cover subtrees at most this deep.
const MAX_ITERATOR_SUBNODE_DEPTH: u8 = 3;

/*
 * Classification and length.
 */

pub(crate) fn is_rope_word(heap: &Heap, w: Word) -> bool {
    if w == EMPTY_ROPE || w.is_char() || w.is_small_string() {
        return true;
    }
    if w.is_heap() {
        let id = w.cell_id();
        return match heap.cell_tag(id) {
            CellType::RopeLeaf | CellType::Subrope | CellType::ConcatRope => true,
            CellType::Custom => heap.word_types[heap.custom_type_id(id) as usize]
                .rope
                .is_some(),
            _ => false,
        };
    }
    false
}

/// Get or compute the length of a rope, in characters.
pub(crate) fn rope_length(heap: &Heap, w: Word) -> usize {
    if w.is_char() {
        return 1;
    }
    if w.is_small_string() {
        return w.small_string_length();
    }
    if w.is_heap() {
        let id = w.cell_id();
        match heap.cell_tag(id) {
            CellType::RopeLeaf => return heap.leaf_char_len(id),
            CellType::Subrope => return heap.sub_last(id) - heap.sub_first(id) + 1,
            CellType::ConcatRope => return heap.concat_length(id),
            CellType::Custom => {
                if let Some(procs) = heap.word_types[heap.custom_type_id(id) as usize].rope {
                    let n = heap.custom_data_cells(id);
                    return (procs.length)(heap.data_words(id, n * 2));
                }
            }
            _ => {}
        }
    }
    col_error!(ErrorLevel::Error, "{:#x} is not a rope", w.0);
    0
}

fn depth_of(heap: &Heap, w: Word) -> u8 {
    if w.is_heap() {
        let id = w.cell_id();
        match heap.cell_tag(id) {
            CellType::Subrope | CellType::ConcatRope => return heap.node_depth(id),
            _ => {}
        }
    }
    0
}

fn left_length(heap: &Heap, id: u32) -> usize {
    rope_length(heap, heap.concat_left(id))
}

/// Character of a leaf-level rope at a leaf-relative index.
fn leaf_char_at(heap: &Heap, leaf: Word, index: usize) -> Char {
    if leaf.is_char() {
        debug_assert!(index == 0);
        return leaf.char_value();
    }
    if leaf.is_small_string() {
        return leaf.small_string_byte(index) as Char;
    }
    let id = leaf.cell_id();
    match heap.cell_tag(id) {
        CellType::RopeLeaf => {
            let data = heap.leaf_bytes(id);
            match heap.leaf_format(id) {
                StringFormat::Utf8 => utf8_char_at(&data[utf8_offset(data, index)..]),
                StringFormat::Utf16 => utf16_char_at(data, utf16_offset(data, index)),
                f => ucs_char_at(f, data, index),
            }
        }
        CellType::Custom => {
            let procs = heap.word_types[heap.custom_type_id(id) as usize]
                .rope
                .expect("custom word is not a rope");
            let n = heap.custom_data_cells(id);
            (procs.char_at)(heap.data_words(id, n * 2), index)
        }
        _ => CHAR_INVALID,
    }
}

/// Character at `index`, `CHAR_INVALID` when out of range.
pub(crate) fn rope_char_at(heap: &Heap, w: Word, mut index: usize) -> Char {
    if index >= rope_length(heap, w) {
        return CHAR_INVALID;
    }
    let mut node = w;
    loop {
        if !node.is_heap() {
            return leaf_char_at(heap, node, index);
        }
        let id = node.cell_id();
        match heap.cell_tag(id) {
            CellType::Subrope => {
                index += heap.sub_first(id);
                node = heap.sub_source(id);
            }
            CellType::ConcatRope => {
                let ll = left_length(heap, id);
                if index < ll {
                    node = heap.concat_left(id);
                } else {
                    index -= ll;
                    node = heap.concat_right(id);
                }
            }
            _ => return leaf_char_at(heap, node, index),
        }
    }
}

/*
 * Leaf ranges: the flat pieces covering a range of a rope, used by
 * traversal, comparison, materialization and normalization.
 */

#[derive(Debug, Clone, Copy)]
pub(crate) struct LeafRange {
    pub(crate) leaf: Word,
    pub(crate) first: usize,
    pub(crate) len: usize,
}

pub(crate) fn collect_leaf_ranges(
    heap: &Heap,
    node: Word,
    start: usize,
    max: usize,
    out: &mut Vec<LeafRange>,
) {
    if max == 0 {
        return;
    }
    if node.is_heap() {
        let id = node.cell_id();
        match heap.cell_tag(id) {
            CellType::Subrope => {
                return collect_leaf_ranges(
                    heap,
                    heap.sub_source(id),
                    heap.sub_first(id) + start,
                    max,
                    out,
                );
            }
            CellType::ConcatRope => {
                let ll = left_length(heap, id);
                if start >= ll {
                    collect_leaf_ranges(heap, heap.concat_right(id), start - ll, max, out);
                } else if start + max <= ll {
                    collect_leaf_ranges(heap, heap.concat_left(id), start, max, out);
                } else {
                    collect_leaf_ranges(heap, heap.concat_left(id), start, ll - start, out);
                    collect_leaf_ranges(heap, heap.concat_right(id), 0, start + max - ll, out);
                }
                return;
            }
            _ => {}
        }
    }
    out.push(LeafRange {
        leaf: node,
        first: start,
        len: max,
    });
}

/// Decode a leaf range into codepoints.
fn range_chars(heap: &Heap, r: &LeafRange, out: &mut Vec<Char>) {
    for i in 0..r.len {
        out.push(leaf_char_at(heap, r.leaf, r.first + i));
    }
}

/// Decode a whole range of a rope into codepoints.
pub(crate) fn collect_chars(heap: &Heap, rope: Word, start: usize, max: usize) -> Vec<Char> {
    let mut ranges = Vec::new();
    collect_leaf_ranges(heap, rope, start, max, &mut ranges);
    let mut chars = Vec::with_capacity(max);
    for r in &ranges {
        range_chars(heap, r, &mut chars);
    }
    chars
}

/*
 * Construction.
 */

/// Allocate a leaf cell holding `bytes` in `format`.
pub(crate) fn new_leaf(heap: &mut Heap, format: StringFormat, bytes: &[u8]) -> Word {
    debug_assert!(bytes.len() <= MAX_LEAF_BYTES);
    let char_len = format::char_length(format, bytes);
    let id = heap.alloc_cells(1 + cells_for_bytes(bytes.len()));
    heap.init_rope_leaf(id, format, bytes.len(), char_len);
    heap.data_bytes_mut(id, bytes.len()).copy_from_slice(bytes);
    Word::from_cell(id)
}

/// Build a rope out of codepoints, choosing immediates when they fit and
/// splitting into a balanced tree of leaves beyond the single-leaf limit.
pub(crate) fn rope_from_chars(heap: &mut Heap, format: StringFormat, chars: &[Char]) -> Word {
    if chars.is_empty() {
        return EMPTY_ROPE;
    }
    let format = match format {
        StringFormat::Ucs => {
            let widest = chars
                .iter()
                .map(|&c| StringFormat::fixed_for(c))
                .fold(StringFormat::Ucs1, StringFormat::widest);
            widest
        }
        f => f,
    };
    if format == StringFormat::Ucs1 && chars.len() <= SMALL_STRING_MAX_LENGTH {
        let bytes: Vec<u8> = chars.iter().map(|&c| c as u8).collect();
        if let Some(w) = Word::new_small_string(&bytes) {
            return w;
        }
    }
    if chars.len() == 1 && chars[0] <= crate::format::CHAR_MAX {
        return Word::new_char(chars[0]);
    }
    let mut bytes = Vec::with_capacity(chars.len() * format.unit_width());
    for &c in chars {
        format::encode_char(format, c, &mut bytes);
    }
    if bytes.len() <= MAX_LEAF_BYTES {
        return new_leaf(heap, format, &bytes);
    }
    let half = chars.len() / 2;
    let left = rope_from_chars(heap, format, &chars[..half]);
    let right = rope_from_chars(heap, format, &chars[half..]);
    concat_ropes(heap, left, right)
}

/// Create a rope from raw string data in the given format. Malformed UTF is
/// the caller's responsibility.
pub(crate) fn new_rope_node(heap: &mut Heap, format: StringFormat, data: &[u8]) -> Word {
    if data.is_empty() {
        return EMPTY_ROPE;
    }
    if format == StringFormat::Ucs {
        col_error!(ErrorLevel::Error, "rope data needs a concrete format");
        return NIL;
    }
    let char_len = format::char_length(format, data);
    if format == StringFormat::Ucs1 && char_len <= SMALL_STRING_MAX_LENGTH {
        if let Some(w) = Word::new_small_string(data) {
            return w;
        }
    }
    if char_len == 1 {
        let c = match format {
            StringFormat::Utf8 => utf8_char_at(data),
            StringFormat::Utf16 => utf16_char_at(data, 0),
            f => ucs_char_at(f, data, 0),
        };
        if c <= crate::format::CHAR_MAX {
            return Word::new_char(c);
        }
    }
    if data.len() <= MAX_LEAF_BYTES {
        return new_leaf(heap, format, data);
    }
    // Split at a character boundary near the middle.
    let half_char = char_len / 2;
    let half_bytes = match format {
        StringFormat::Utf8 => utf8_offset(data, half_char),
        StringFormat::Utf16 => utf16_offset(data, half_char) * 2,
        f => half_char * f.unit_width(),
    };
    let left = new_rope_node(heap, format, &data[..half_bytes]);
    let right = new_rope_node(heap, format, &data[half_bytes..]);
    concat_ropes(heap, left, right)
}

/// Materialize a short range as a flat leaf or immediate, preserving the
/// narrowest encoding that fits.
fn materialize_range(heap: &mut Heap, rope: Word, start: usize, len: usize) -> Word {
    let chars = collect_chars(heap, rope, start, len);
    rope_from_chars(heap, StringFormat::Ucs, &chars)
}

/*
 * Subrope.
 */

pub(crate) fn subrope_node(heap: &mut Heap, rope: Word, first: usize, mut last: usize) -> Word {
    let length = rope_length(heap, rope);
    if last < first || first >= length {
        return EMPTY_ROPE;
    }
    if last >= length {
        last = length - 1;
    }
    let sub_length = last - first + 1;

    if first == 0 && sub_length == length {
        return rope;
    }

    let mut depth = 0;
    if rope.is_heap() {
        let id = rope.cell_id();
        match heap.cell_tag(id) {
            CellType::Subrope => {
                // Point to the deepest source.
                let source = heap.sub_source(id);
                let delta = heap.sub_first(id);
                return subrope_node(heap, source, delta + first, delta + last);
            }
            CellType::ConcatRope => {
                let ll = left_length(heap, id);
                if last < ll {
                    return subrope_node(heap, heap.concat_left(id), first, last);
                } else if first >= ll {
                    return subrope_node(heap, heap.concat_right(id), first - ll, last - ll);
                }
                depth = heap.node_depth(id);
            }
            _ => {}
        }
    }

    if sub_length <= MAX_SHORT_LEAF_CHARS || !rope.is_heap() {
        // Short results and immediates materialize as flat copies.
        return materialize_range(heap, rope, first, sub_length);
    }

    // General case: share the source through a subrope node of equal depth.
    let sub = heap.alloc_cells(2);
    heap.init_subnode(sub, CellType::Subrope, depth, rope, first, last);
    Word::from_cell(sub)
}

/*
 * Concatenation.
 */

fn get_arms(heap: &mut Heap, node: Word) -> (Word, Word) {
    let id = node.cell_id();
    if heap.cell_tag(id) == CellType::Subrope {
        let source = heap.sub_source(id);
        debug_assert!(heap.cell_tag(source.cell_id()) == CellType::ConcatRope);
        let ll = left_length(heap, source.cell_id());
        let first = heap.sub_first(id);
        let last = heap.sub_last(id);
        let src_left = heap.concat_left(source.cell_id());
        let src_right = heap.concat_right(source.cell_id());
        let left = subrope_node(heap, src_left, first, ll - 1);
        let right = subrope_node(heap, src_right, 0, last - ll);
        (left, right)
    } else {
        debug_assert!(heap.cell_tag(id) == CellType::ConcatRope);
        (heap.concat_left(id), heap.concat_right(id))
    }
}

pub(crate) fn concat_ropes(heap: &mut Heap, left: Word, right: Word) -> Word {
    let left_len = rope_length(heap, left);
    let right_len = rope_length(heap, right);

    if left_len.checked_add(right_len).is_none() {
        col_error!(
            ErrorLevel::Error,
            "combined length {}+{} exceeds the maximum allowed value for ropes",
            left_len,
            right_len
        );
        return NIL;
    }
    if left_len == 0 {
        return right;
    }
    if right_len == 0 {
        return left;
    }

    // Merge adjacent subropes of one source.
    if left.is_heap() && right.is_heap() {
        let lid = left.cell_id();
        let rid = right.cell_id();
        if heap.cell_tag(lid) == CellType::Subrope
            && heap.cell_tag(rid) == CellType::Subrope
            && heap.sub_source(lid) == heap.sub_source(rid)
            && heap.sub_last(lid) + 1 == heap.sub_first(rid)
        {
            let source = heap.sub_source(lid);
            let first = heap.sub_first(lid);
            let last = heap.sub_last(rid);
            return subrope_node(heap, source, first, last);
        }
    }

    let total = left_len + right_len;
    if total <= MAX_SHORT_LEAF_CHARS {
        let mut chars = collect_chars(heap, left, 0, left_len);
        chars.extend(collect_chars(heap, right, 0, right_len));
        return rope_from_chars(heap, StringFormat::Ucs, &chars);
    }

    let left_depth = depth_of(heap, left);
    let right_depth = depth_of(heap, right);

    if left_depth > right_depth + 1 {
        debug_assert!(left_depth >= 2);
        let (left1, left2) = get_arms(heap, left);
        if depth_of(heap, left1) < depth_of(heap, left2) {
            // Double rotation: split the deeper inner arm.
            let (left21, left22) = get_arms(heap, left2);
            let a = concat_ropes(heap, left1, left21);
            let b = concat_ropes(heap, left22, right);
            return concat_ropes(heap, a, b);
        } else {
            // Single rotation to the right.
            let b = concat_ropes(heap, left2, right);
            return concat_ropes(heap, left1, b);
        }
    } else if right_depth > left_depth + 1 {
        debug_assert!(right_depth >= 2);
        let (right1, right2) = get_arms(heap, right);
        if depth_of(heap, right2) < depth_of(heap, right1) {
            let (right11, right12) = get_arms(heap, right1);
            let a = concat_ropes(heap, left, right11);
            let b = concat_ropes(heap, right12, right2);
            return concat_ropes(heap, a, b);
        } else {
            let a = concat_ropes(heap, left, right1);
            return concat_ropes(heap, a, right2);
        }
    }

    let depth = left_depth.max(right_depth) + 1;
    let id = heap.alloc_cells(2);
    heap.init_concat(id, CellType::ConcatRope, depth, total, left, right);
    Word::from_cell(id)
}

pub(crate) fn repeat_rope(heap: &mut Heap, rope: Word, count: usize) -> Word {
    if count == 0 || rope_length(heap, rope) == 0 {
        return EMPTY_ROPE;
    }
    if count == 1 {
        return rope;
    }
    if count == 2 {
        return concat_ropes(heap, rope, rope);
    }
    if count & 1 != 0 {
        let rest = repeat_rope(heap, rope, count - 1);
        concat_ropes(heap, rope, rest)
    } else {
        let doubled = concat_ropes(heap, rope, rope);
        repeat_rope(heap, doubled, count >> 1)
    }
}

pub(crate) fn rope_insert(heap: &mut Heap, into: Word, index: usize, rope: Word) -> Word {
    if rope_length(heap, rope) == 0 {
        return into;
    }
    if index == 0 {
        return concat_ropes(heap, rope, into);
    }
    let length = rope_length(heap, into);
    if index >= length {
        return concat_ropes(heap, into, rope);
    }
    let head = subrope_node(heap, into, 0, index - 1);
    let mid = concat_ropes(heap, head, rope);
    let tail = subrope_node(heap, into, index, length - 1);
    concat_ropes(heap, mid, tail)
}

pub(crate) fn rope_remove(heap: &mut Heap, rope: Word, first: usize, mut last: usize) -> Word {
    if first > last {
        return rope;
    }
    let length = rope_length(heap, rope);
    if length == 0 || first >= length {
        return rope;
    }
    if last >= length {
        last = length - 1;
    }
    let mut root = EMPTY_ROPE;
    if first > 0 {
        root = subrope_node(heap, rope, 0, first - 1);
    }
    if last < length - 1 {
        let tail = subrope_node(heap, rope, last + 1, length - 1);
        root = concat_ropes(heap, root, tail);
    }
    root
}

pub(crate) fn rope_replace(
    heap: &mut Heap,
    rope: Word,
    first: usize,
    last: usize,
    with: Word,
) -> Word {
    if first > last {
        return rope;
    }
    let removed = rope_remove(heap, rope, first, last);
    rope_insert(heap, removed, first, with)
}

/*
 * Comparison, hashing, searching.
 */

/// Streaming codepoint cursor over a rope, decoding one leaf range at a
/// time.
pub(crate) struct CharCursor {
    ranges: Vec<LeafRange>,
    next_range: usize,
    chars: Vec<Char>,
    next_char: usize,
}

impl CharCursor {
    pub(crate) fn new(heap: &Heap, rope: Word, start: usize, max: usize) -> CharCursor {
        let mut ranges = Vec::new();
        collect_leaf_ranges(heap, rope, start, max, &mut ranges);
        CharCursor {
            ranges,
            next_range: 0,
            chars: Vec::new(),
            next_char: 0,
        }
    }

    pub(crate) fn next(&mut self, heap: &Heap) -> Option<Char> {
        while self.next_char >= self.chars.len() {
            if self.next_range >= self.ranges.len() {
                return None;
            }
            self.chars.clear();
            self.next_char = 0;
            let r = self.ranges[self.next_range];
            self.next_range += 1;
            range_chars(heap, &r, &mut self.chars);
        }
        let c = self.chars[self.next_char];
        self.next_char += 1;
        Some(c)
    }
}

/// Codepoint-wise three-way comparison.
pub(crate) fn rope_compare(heap: &Heap, a: Word, b: Word) -> i32 {
    if a == b {
        return 0;
    }
    let alen = rope_length(heap, a);
    let blen = rope_length(heap, b);
    let mut ca = CharCursor::new(heap, a, 0, alen);
    let mut cb = CharCursor::new(heap, b, 0, blen);
    loop {
        match (ca.next(heap), cb.next(heap)) {
            (None, None) => return 0,
            (None, Some(_)) => return -1,
            (Some(_), None) => return 1,
            (Some(x), Some(y)) => {
                if x < y {
                    return -1;
                }
                if x > y {
                    return 1;
                }
            }
        }
    }
}

/// Simple multiplicative hash over the codepoints; hash maps rely on equal
/// ropes hashing equally regardless of representation.
pub(crate) fn rope_hash(heap: &Heap, rope: Word) -> u64 {
    let length = rope_length(heap, rope);
    let mut cursor = CharCursor::new(heap, rope, 0, length);
    let mut h: u64 = 0;
    while let Some(c) = cursor.next(heap) {
        h = h.wrapping_mul(31).wrapping_add(c as u64);
    }
    h
}

/// First occurrence of codepoint `c` at or after `start` (at or before
/// `start` when `reverse`).
pub(crate) fn rope_find(
    heap: &Heap,
    rope: Word,
    c: Char,
    start: usize,
    reverse: bool,
) -> Option<usize> {
    let length = rope_length(heap, rope);
    if length == 0 {
        return None;
    }
    if reverse {
        let start = start.min(length - 1);
        let chars = collect_chars(heap, rope, 0, start + 1);
        chars.iter().rposition(|&x| x == c)
    } else {
        if start >= length {
            return None;
        }
        let mut cursor = CharCursor::new(heap, rope, start, length - start);
        let mut i = start;
        while let Some(x) = cursor.next(heap) {
            if x == c {
                return Some(i);
            }
            i += 1;
        }
        None
    }
}

/// First occurrence of `needle` at or after `start`.
pub(crate) fn rope_search(heap: &Heap, rope: Word, needle: Word, start: usize) -> Option<usize> {
    let length = rope_length(heap, rope);
    let nlen = rope_length(heap, needle);
    if nlen == 0 || nlen > length || start > length - nlen {
        return None;
    }
    let hay = collect_chars(heap, rope, start, length - start);
    let pat = collect_chars(heap, needle, 0, nlen);
    hay.windows(nlen).position(|w| w == &pat[..]).map(|p| p + start)
}

/*
 * Normalization.
 */

fn convert_chars(chars: &[Char], format: StringFormat, replacement: Option<Char>) -> Option<Vec<Char>> {
    let mut out = Vec::with_capacity(chars.len());
    for &c in chars {
        if format.fits(c) {
            out.push(c);
        } else {
            match replacement {
                Some(r) => out.push(r),
                None => return None,
            }
        }
    }
    Some(out)
}

/// Convert a rope to `format`. With `flatten`, produce a single flat rope;
/// otherwise convert leaf by leaf, preserving the chunking. Characters that
/// do not fit are replaced by `replacement`, or the whole conversion yields
/// the empty rope when no replacement is given.
pub(crate) fn rope_normalize(
    heap: &mut Heap,
    rope: Word,
    format: StringFormat,
    replacement: Option<Char>,
    flatten: bool,
) -> Word {
    let length = rope_length(heap, rope);
    if length == 0 {
        return EMPTY_ROPE;
    }
    if flatten {
        let chars = collect_chars(heap, rope, 0, length);
        return match convert_chars(&chars, format, replacement) {
            Some(chars) => rope_from_chars(heap, format, &chars),
            None => EMPTY_ROPE,
        };
    }
    let mut ranges = Vec::new();
    collect_leaf_ranges(heap, rope, 0, length, &mut ranges);
    let mut result = EMPTY_ROPE;
    for r in ranges {
        let mut chars = Vec::with_capacity(r.len);
        range_chars(heap, &r, &mut chars);
        let converted = match convert_chars(&chars, format, replacement) {
            Some(chars) => chars,
            None => return EMPTY_ROPE,
        };
        let piece = rope_from_chars(heap, format, &converted);
        result = concat_ropes(heap, result, piece);
    }
    result
}

/*
 * Chunk traversal.
 */

/// A contiguous chunk of string data seen during traversal.
#[derive(Debug, Clone, Copy)]
pub struct RopeChunk<'a> {
    pub format: StringFormat,
    pub data: &'a [u8],
    pub char_length: usize,
}

/// Traverse the flat chunks covering `start..start+max` in order (reverse
/// order when `reverse`). The proc halts the traversal by returning `true`.
/// Returns the number of characters covered.
pub fn traverse_chunks<F>(rope: Word, start: usize, max: usize, reverse: bool, mut proc: F) -> usize
where
    F: FnMut(usize, &RopeChunk) -> bool,
{
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        if !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "{:#x} is not a rope", rope.0);
            return 0;
        }
        let length = rope_length(heap, rope);
        if start >= length || max == 0 {
            return 0;
        }
        let max = max.min(length - start);
        let mut ranges = Vec::new();
        collect_leaf_ranges(heap, rope, start, max, &mut ranges);
        let mut indexed = Vec::with_capacity(ranges.len());
        let mut pos = start;
        for r in ranges {
            indexed.push((pos, r));
            pos += r.len;
        }
        if reverse {
            indexed.reverse();
        }
        let mut total = 0;
        let mut buf: Vec<u8> = Vec::new();
        for (index, r) in indexed {
            total += r.len;
            buf.clear();
            let halt = if r.leaf.is_heap() && heap.cell_tag(r.leaf.cell_id()) == CellType::RopeLeaf
            {
                let id = r.leaf.cell_id();
                let format = heap.leaf_format(id);
                let data = heap.leaf_bytes(id);
                let (lo, hi) = match format {
                    StringFormat::Utf8 => (
                        utf8_offset(data, r.first),
                        utf8_offset(data, r.first + r.len),
                    ),
                    StringFormat::Utf16 => (
                        utf16_offset(data, r.first) * 2,
                        utf16_offset(data, r.first + r.len) * 2,
                    ),
                    f => (r.first * f.unit_width(), (r.first + r.len) * f.unit_width()),
                };
                proc(
                    index,
                    &RopeChunk {
                        format,
                        data: &data[lo..hi],
                        char_length: r.len,
                    },
                )
            } else if r.leaf.is_heap()
                && heap.cell_tag(r.leaf.cell_id()) == CellType::Custom
            {
                let id = r.leaf.cell_id();
                let procs = heap.word_types[heap.custom_type_id(id) as usize]
                    .rope
                    .expect("custom word is not a rope");
                match procs.chunk_at {
                    Some(chunk_at) => {
                        let n = heap.custom_data_cells(id);
                        let chunk: CustomChunk =
                            chunk_at(heap.data_words(id, n * 2), r.first, r.len);
                        let data = heap.data_bytes(
                            id,
                            chunk.byte_offset + chunk.byte_len,
                        );
                        proc(
                            index,
                            &RopeChunk {
                                format: chunk.format,
                                data: &data[chunk.byte_offset..],
                                char_length: chunk.char_len,
                            },
                        )
                    }
                    None => {
                        // No chunk accessor: traverse character by character.
                        let mut halted = false;
                        for i in 0..r.len {
                            let c = leaf_char_at(heap, r.leaf, r.first + i);
                            buf.clear();
                            format::ucs_encode(StringFormat::Ucs4, c, &mut buf);
                            if proc(
                                index + i,
                                &RopeChunk {
                                    format: StringFormat::Ucs4,
                                    data: &buf,
                                    char_length: 1,
                                },
                            ) {
                                halted = true;
                                break;
                            }
                        }
                        halted
                    }
                }
            } else {
                // Immediate leaf: stage its characters in a small buffer.
                for i in 0..r.len {
                    let c = leaf_char_at(heap, r.leaf, r.first + i);
                    format::ucs_encode(StringFormat::Ucs4, c, &mut buf);
                }
                proc(
                    index,
                    &RopeChunk {
                        format: StringFormat::Ucs4,
                        data: &buf,
                        char_length: r.len,
                    },
                )
            };
            if halt {
                break;
            }
        }
        total
    })
    .unwrap_or(0)
}

/*
 * Public surface.
 */

/// The empty rope.
pub fn empty() -> Word {
    EMPTY_ROPE
}

/// Create a rope from raw string data in the given format.
pub fn new(format: StringFormat, data: &[u8]) -> Word {
    with_heap(|heap| new_rope_node(heap, format, data)).unwrap_or(NIL)
}

/// Create a rope from UTF-8 text.
pub fn from_str(s: &str) -> Word {
    with_heap(|heap| new_rope_node(heap, StringFormat::Utf8, s.as_bytes())).unwrap_or(NIL)
}

/// Single-character rope.
pub fn from_char(c: Char) -> Word {
    Word::new_char(c)
}

pub fn length(rope: Word) -> usize {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        rope_length(heap, rope)
    })
    .unwrap_or(0)
}

/// Codepoint at `index`, `CHAR_INVALID` when out of range.
pub fn at(rope: Word, index: usize) -> Char {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        rope_char_at(heap, rope, index)
    })
    .unwrap_or(CHAR_INVALID)
}

/// Subrope over an inclusive range.
pub fn subrope(rope: Word, first: usize, last: usize) -> Word {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        if !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "{:#x} is not a rope", rope.0);
            return NIL;
        }
        subrope_node(heap, rope, first, last)
    })
    .unwrap_or(NIL)
}

pub fn concat(left: Word, right: Word) -> Word {
    with_heap(|heap| {
        let left = heap.resolve(left);
        let right = heap.resolve(right);
        if !is_rope_word(heap, left) || !is_rope_word(heap, right) {
            col_error!(ErrorLevel::Error, "concat arguments must be ropes");
            return NIL;
        }
        concat_ropes(heap, left, right)
    })
    .unwrap_or(NIL)
}

/// Concatenate several ropes by recursive halving.
pub fn concat_all(ropes: &[Word]) -> Word {
    match ropes.len() {
        0 => EMPTY_ROPE,
        1 => ropes[0],
        _ => {
            let half = ropes.len() / 2;
            let left = concat_all(&ropes[..half]);
            let right = concat_all(&ropes[half..]);
            concat(left, right)
        }
    }
}

pub fn repeat(rope: Word, count: usize) -> Word {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        if !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "{:#x} is not a rope", rope.0);
            return NIL;
        }
        repeat_rope(heap, rope, count)
    })
    .unwrap_or(NIL)
}

/// Insert a rope before `index`; insertion past the end concatenates.
pub fn insert(into: Word, index: usize, rope: Word) -> Word {
    with_heap(|heap| {
        let into = heap.resolve(into);
        let rope = heap.resolve(rope);
        if !is_rope_word(heap, into) || !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "insert arguments must be ropes");
            return NIL;
        }
        rope_insert(heap, into, index, rope)
    })
    .unwrap_or(NIL)
}

pub fn remove(rope: Word, first: usize, last: usize) -> Word {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        if !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "{:#x} is not a rope", rope.0);
            return NIL;
        }
        rope_remove(heap, rope, first, last)
    })
    .unwrap_or(NIL)
}

pub fn replace(rope: Word, first: usize, last: usize, with: Word) -> Word {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        let with = heap.resolve(with);
        if !is_rope_word(heap, rope) || !is_rope_word(heap, with) {
            col_error!(ErrorLevel::Error, "replace arguments must be ropes");
            return NIL;
        }
        rope_replace(heap, rope, first, last, with)
    })
    .unwrap_or(NIL)
}

/// Codepoint-wise three-way comparison.
pub fn compare(a: Word, b: Word) -> i32 {
    with_heap(|heap| {
        let a = heap.resolve(a);
        let b = heap.resolve(b);
        if !is_rope_word(heap, a) || !is_rope_word(heap, b) {
            col_error!(ErrorLevel::Error, "compare arguments must be ropes");
            return 0;
        }
        rope_compare(heap, a, b)
    })
    .unwrap_or(0)
}

/// First index of codepoint `c` at or after `start`, searching backward
/// from `start` when `reverse`.
pub fn find(rope: Word, c: Char, start: usize, reverse: bool) -> Option<usize> {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        if !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "{:#x} is not a rope", rope.0);
            return None;
        }
        rope_find(heap, rope, c, start, reverse)
    })
    .unwrap_or(None)
}

/// First index of `needle` at or after `start`.
pub fn search(rope: Word, needle: Word, start: usize) -> Option<usize> {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        let needle = heap.resolve(needle);
        if !is_rope_word(heap, rope) || !is_rope_word(heap, needle) {
            col_error!(ErrorLevel::Error, "search arguments must be ropes");
            return None;
        }
        rope_search(heap, rope, needle, start)
    })
    .unwrap_or(None)
}

/// Convert to another format; see `rope_normalize`.
pub fn normalize(
    rope: Word,
    format: StringFormat,
    replacement: Option<Char>,
    flatten: bool,
) -> Word {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        if !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "{:#x} is not a rope", rope.0);
            return NIL;
        }
        rope_normalize(heap, rope, format, replacement, flatten)
    })
    .unwrap_or(NIL)
}

/*
 * Iterators.
 */

/// Rope iterator with a cached leaf and a covering subnode window. For
/// variable-width leaves the unit index is tracked alongside the character
/// index, so stepping is O(1) amortized.
#[derive(Debug, Clone)]
pub struct RopeIter {
    rope: Word,
    index: usize,
    subnode: Word,
    first: usize,
    last: usize,
    offset: usize,
    leaf: Word,
    leaf_index: usize,
    /// Unit index within the leaf data (bytes for UTF-8, 16-bit units for
    /// UTF-16); unused for fixed-width leaves.
    leaf_unit: usize,
}

/// Start iterating at `index`; past the end yields the end iterator.
pub fn iter(rope: Word, index: usize) -> RopeIter {
    with_heap(|heap| {
        let rope = heap.resolve(rope);
        if !is_rope_word(heap, rope) {
            col_error!(ErrorLevel::Error, "{:#x} is not a rope", rope.0);
            return RopeIter::at_end();
        }
        if index >= rope_length(heap, rope) {
            return RopeIter::at_end();
        }
        RopeIter {
            rope,
            index,
            subnode: NIL,
            first: 0,
            last: usize::MAX,
            offset: 0,
            leaf: NIL,
            leaf_index: 0,
            leaf_unit: 0,
        }
    })
    .unwrap_or_else(RopeIter::at_end)
}

fn update_traversal_info(heap: &Heap, it: &mut RopeIter) {
    if !it.subnode.is_nil() && (it.index < it.first || it.index > it.last) {
        it.subnode = NIL;
    }
    let mut node;
    if !it.subnode.is_nil() {
        node = it.subnode;
    } else {
        node = it.rope;
        it.first = 0;
        it.last = usize::MAX;
        it.offset = 0;
    }
    let mut first = it.first;
    let mut last = it.last;
    let mut offset = it.offset;

    it.leaf = NIL;
    while it.leaf.is_nil() {
        let mut sub_first = first;
        let mut sub_last = last;
        let mut is_leaf = true;
        if node.is_heap() {
            let id = node.cell_id();
            match heap.cell_tag(id) {
                CellType::Subrope => {
                    it.subnode = node;
                    it.first = first;
                    it.last = last;
                    it.offset = offset;
                    offset = offset.wrapping_sub(heap.sub_first(id));
                    sub_last = first
                        .wrapping_sub(heap.sub_first(id))
                        .wrapping_add(heap.sub_last(id));
                    node = heap.sub_source(id);
                    is_leaf = false;
                }
                CellType::ConcatRope => {
                    let ll = left_length(heap, id);
                    if heap.node_depth(id) == MAX_ITERATOR_SUBNODE_DEPTH || it.subnode.is_nil() {
                        it.subnode = node;
                        it.first = first;
                        it.last = last;
                        it.offset = offset;
                    }
                    if it.index.wrapping_sub(offset) < ll {
                        sub_last = offset.wrapping_add(ll - 1);
                        node = heap.concat_left(id);
                    } else {
                        sub_first = offset.wrapping_add(ll);
                        offset = offset.wrapping_add(ll);
                        node = heap.concat_right(id);
                    }
                    is_leaf = false;
                }
                _ => {}
            }
        }
        if is_leaf {
            it.leaf = node;
            it.leaf_index = it.index.wrapping_sub(offset);
            it.leaf_unit = leaf_unit_of(heap, node, it.leaf_index);
        }
        if sub_first > first {
            first = sub_first;
        }
        if sub_last < last {
            last = sub_last;
        }
    }
    if it.subnode.is_nil() {
        it.subnode = it.leaf;
        it.first = first;
        it.last = last;
        it.offset = offset;
    }
}

fn leaf_unit_of(heap: &Heap, leaf: Word, char_index: usize) -> usize {
    if leaf.is_heap() && heap.cell_tag(leaf.cell_id()) == CellType::RopeLeaf {
        let id = leaf.cell_id();
        let data = heap.leaf_bytes(id);
        match heap.leaf_format(id) {
            StringFormat::Utf8 => utf8_offset(data, char_index),
            StringFormat::Utf16 => utf16_offset(data, char_index),
            _ => char_index,
        }
    } else {
        char_index
    }
}

fn leaf_length_of(heap: &Heap, leaf: Word) -> usize {
    if leaf.is_char() {
        1
    } else if leaf.is_small_string() {
        leaf.small_string_length()
    } else if leaf.is_heap() {
        let id = leaf.cell_id();
        match heap.cell_tag(id) {
            CellType::RopeLeaf => heap.leaf_char_len(id),
            CellType::Custom => rope_length(heap, leaf),
            _ => 0,
        }
    } else {
        0
    }
}

impl RopeIter {
    fn at_end() -> RopeIter {
        RopeIter {
            rope: NIL,
            index: 0,
            subnode: NIL,
            first: 0,
            last: 0,
            offset: 0,
            leaf: NIL,
            leaf_index: 0,
            leaf_unit: 0,
        }
    }

    pub fn end(&self) -> bool {
        self.rope.is_nil()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn rope(&self) -> Word {
        self.rope
    }

    /// Codepoint at the current position.
    pub fn at(&mut self) -> Char {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid rope iterator");
            return CHAR_INVALID;
        }
        with_heap(|heap| {
            if self.leaf.is_nil() {
                update_traversal_info(heap, self);
            }
            if self.leaf.is_nil() {
                return CHAR_INVALID;
            }
            if self.leaf.is_heap() && heap.cell_tag(self.leaf.cell_id()) == CellType::RopeLeaf {
                let id = self.leaf.cell_id();
                let data = heap.leaf_bytes(id);
                match heap.leaf_format(id) {
                    StringFormat::Utf8 => utf8_char_at(&data[self.leaf_unit..]),
                    StringFormat::Utf16 => utf16_char_at(data, self.leaf_unit),
                    f => ucs_char_at(f, data, self.leaf_index),
                }
            } else {
                leaf_char_at(heap, self.leaf, self.leaf_index)
            }
        })
        .unwrap_or(CHAR_INVALID)
    }

    /// Move forward `n` characters.
    pub fn forward(&mut self, n: usize) {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid rope iterator");
            return;
        }
        if n == 0 {
            return;
        }
        let ended = with_heap(|heap| {
            let length = rope_length(heap, self.rope);
            if n >= length - self.index {
                return true;
            }
            self.index += n;
            if self.subnode.is_nil() || self.leaf.is_nil() {
                return false;
            }
            if self.index > self.last {
                self.leaf = NIL;
                return false;
            }
            let leaf_len = leaf_length_of(heap, self.leaf);
            if n >= leaf_len - self.leaf_index {
                self.leaf = NIL;
                return false;
            }
            // Step the unit index through variable-width data.
            if self.leaf.is_heap() && heap.cell_tag(self.leaf.cell_id()) == CellType::RopeLeaf {
                let id = self.leaf.cell_id();
                match heap.leaf_format(id) {
                    StringFormat::Utf8 => {
                        let data = heap.leaf_bytes(id);
                        for _ in 0..n {
                            self.leaf_unit += utf8_seq_len(data[self.leaf_unit]);
                        }
                    }
                    StringFormat::Utf16 => {
                        let data = heap.leaf_bytes(id);
                        for _ in 0..n {
                            self.leaf_unit += utf16_seq_len(data, self.leaf_unit);
                        }
                    }
                    _ => self.leaf_unit += n,
                }
            } else {
                self.leaf_unit += n;
            }
            self.leaf_index += n;
            false
        })
        .unwrap_or(true);
        if ended {
            self.rope = NIL;
        }
    }

    /// Move backward `n` characters; the beginning is an end state.
    pub fn backward(&mut self, n: usize) {
        if self.end() {
            col_error!(ErrorLevel::Error, "invalid rope iterator");
            return;
        }
        if n == 0 {
            return;
        }
        if self.index < n {
            self.rope = NIL;
            return;
        }
        self.index -= n;
        if self.subnode.is_nil() || self.leaf.is_nil() {
            return;
        }
        if self.index < self.first || self.leaf_index < n {
            self.leaf = NIL;
            return;
        }
        with_heap(|heap| {
            if self.leaf.is_heap() && heap.cell_tag(self.leaf.cell_id()) == CellType::RopeLeaf {
                let id = self.leaf.cell_id();
                match heap.leaf_format(id) {
                    StringFormat::Utf8 | StringFormat::Utf16 => {
                        self.leaf_unit = leaf_unit_of(heap, self.leaf, self.leaf_index - n);
                    }
                    _ => self.leaf_unit -= n,
                }
            } else {
                self.leaf_unit -= n;
            }
        });
        self.leaf_index -= n;
    }

    pub fn next(&mut self) {
        self.forward(1);
    }

    pub fn prev(&mut self) {
        self.backward(1);
    }

    pub fn move_to(&mut self, index: usize) {
        if index > self.index {
            self.forward(index - self.index);
        } else if index < self.index {
            self.backward(self.index - index);
        }
    }

    /// Order two iterators by position; the end iterator sorts last.
    pub fn compare(&self, other: &RopeIter) -> i32 {
        match (self.end(), other.end()) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => -1,
            _ => {
                if self.index < other.index {
                    -1
                } else if self.index > other.index {
                    1
                } else {
                    0
                }
            }
        }
    }
}

#[cfg(test)]
mod rope_tests {
    use super::*;

    fn leaf(heap: &mut Heap, s: &str) -> Word {
        new_rope_node(heap, StringFormat::Utf8, s.as_bytes())
    }

    fn to_string(heap: &Heap, r: Word) -> String {
        let n = rope_length(heap, r);
        collect_chars(heap, r, 0, n)
            .into_iter()
            .map(|c| char::from_u32(c).unwrap())
            .collect()
    }

    fn assert_balanced(heap: &Heap, node: Word) {
        if !node.is_heap() {
            return;
        }
        let id = node.cell_id();
        if heap.cell_tag(id) == CellType::ConcatRope {
            let left = heap.concat_left(id);
            let right = heap.concat_right(id);
            let ld = depth_of(heap, left) as i32;
            let rd = depth_of(heap, right) as i32;
            assert!((ld - rd).abs() <= 1, "unbalanced: {} vs {}", ld, rd);
            assert_eq!(heap.node_depth(id) as i32, ld.max(rd) + 1);
            assert_eq!(
                heap.concat_length(id),
                rope_length(heap, left) + rope_length(heap, right)
            );
            assert_balanced(heap, left);
            assert_balanced(heap, right);
        }
    }

    #[test]
    fn test_new_rope_picks_immediates() {
        let mut heap = Heap::new();
        assert_eq!(new_rope_node(&mut heap, StringFormat::Ucs1, b""), EMPTY_ROPE);
        let s = new_rope_node(&mut heap, StringFormat::Ucs1, b"abc");
        assert!(s.is_small_string());
        let c = new_rope_node(&mut heap, StringFormat::Ucs4, &0x1F600u32.to_ne_bytes());
        assert!(c.is_char());
        assert_eq!(rope_length(&heap, c), 1);
        let l = new_rope_node(&mut heap, StringFormat::Ucs1, b"abcdefgh");
        assert_eq!(heap.cell_tag(l.cell_id()), CellType::RopeLeaf);
        assert_eq!(rope_length(&heap, l), 8);
    }

    #[test]
    fn test_long_data_splits_into_balanced_leaves() {
        let mut heap = Heap::new();
        let data: Vec<u8> = (0..4000u32).map(|i| (i % 26) as u8 + b'a').collect();
        let r = new_rope_node(&mut heap, StringFormat::Ucs1, &data);
        assert_eq!(rope_length(&heap, r), 4000);
        assert_balanced(&heap, r);
        for i in (0..4000).step_by(333) {
            assert_eq!(rope_char_at(&heap, r, i), (i % 26) as u32 + 'a' as u32);
        }
    }

    #[test]
    fn test_subrope_collapse_and_merge() {
        let mut heap = Heap::new();
        let data: Vec<u8> = (0..2000u32).map(|i| (i % 26) as u8 + b'a').collect();
        let r = new_rope_node(&mut heap, StringFormat::Ucs1, &data);
        let s1 = subrope_node(&mut heap, r, 100, 1899);
        let s2 = subrope_node(&mut heap, s1, 100, 1699);
        if heap.cell_tag(s2.cell_id()) == CellType::Subrope {
            // Nested subropes point at the deepest source.
            let src = heap.sub_source(s2.cell_id());
            assert_ne!(src, s1);
        }
        assert_eq!(rope_char_at(&heap, s2, 0), rope_char_at(&heap, r, 200));

        // Short ranges materialize as flat leaves or immediates.
        let short = subrope_node(&mut heap, r, 500, 502);
        assert!(short.is_small_string());
    }

    #[test]
    fn test_concat_mixed_formats() {
        let mut heap = Heap::new();
        let a = leaf(&mut heap, "ascii ");
        let wide = "\u{4E16}\u{754C}\u{1F600}";
        let b = leaf(&mut heap, wide);
        let r = concat_ropes(&mut heap, a, b);
        assert_eq!(rope_length(&heap, r), 9);
        assert_eq!(to_string(&heap, r), format!("ascii {}", wide));
        assert_eq!(rope_char_at(&heap, r, 8), 0x1F600);
    }

    #[test]
    fn test_compare_across_representations() {
        let mut heap = Heap::new();
        let a = leaf(&mut heap, "hello world");
        let h = leaf(&mut heap, "hello ");
        let w = leaf(&mut heap, "world");
        let b = concat_ropes(&mut heap, h, w);
        assert_eq!(rope_compare(&heap, a, b), 0);
        assert_eq!(rope_hash(&heap, a), rope_hash(&heap, b));
        let c = leaf(&mut heap, "hello worle");
        assert!(rope_compare(&heap, a, c) < 0);
        assert!(rope_compare(&heap, c, a) > 0);
        let prefix = leaf(&mut heap, "hello");
        assert!(rope_compare(&heap, prefix, a) < 0);
    }

    #[test]
    fn test_insert_remove_replace() {
        let mut heap = Heap::new();
        let r = leaf(&mut heap, "hello world");
        let x = leaf(&mut heap, "big ");
        let ins = rope_insert(&mut heap, r, 6, x);
        assert_eq!(to_string(&heap, ins), "hello big world");
        let rem = rope_remove(&mut heap, ins, 6, 9);
        assert_eq!(rope_compare(&heap, rem, r), 0);
        let y = leaf(&mut heap, "there");
        let rep = rope_replace(&mut heap, r, 6, 10, y);
        assert_eq!(to_string(&heap, rep), "hello there");
    }

    #[test]
    fn test_utf8_leaf_access_and_offsets() {
        let mut heap = Heap::new();
        let s = "a\u{E9}\u{20AC}\u{1D11E}b";
        let r = leaf(&mut heap, s);
        assert_eq!(rope_length(&heap, r), 5);
        assert_eq!(rope_char_at(&heap, r, 0), 'a' as u32);
        assert_eq!(rope_char_at(&heap, r, 1), 0xE9);
        assert_eq!(rope_char_at(&heap, r, 2), 0x20AC);
        assert_eq!(rope_char_at(&heap, r, 3), 0x1D11E);
        assert_eq!(rope_char_at(&heap, r, 4), 'b' as u32);
        assert_eq!(rope_char_at(&heap, r, 5), CHAR_INVALID);
    }

    #[test]
    fn test_normalize_formats() {
        let mut heap = Heap::new();
        let s = "a\u{E9}\u{20AC}b";
        let r = leaf(&mut heap, s);
        let ucs4 = rope_normalize(&mut heap, r, StringFormat::Ucs4, None, true);
        assert_eq!(rope_compare(&heap, ucs4, r), 0);
        let ucs1 = rope_normalize(&mut heap, r, StringFormat::Ucs1, Some(b'?' as u32), true);
        assert_eq!(to_string(&heap, ucs1), "a\u{E9}?b");
        assert_eq!(
            rope_normalize(&mut heap, r, StringFormat::Ucs1, None, true),
            EMPTY_ROPE
        );
    }

    #[test]
    fn test_find_and_search_nodes() {
        let mut heap = Heap::new();
        let h = leaf(&mut heap, "abcabc");
        let t = leaf(&mut heap, "abc");
        let r = concat_ropes(&mut heap, h, t);
        assert_eq!(rope_find(&heap, r, 'c' as u32, 0, false), Some(2));
        assert_eq!(rope_find(&heap, r, 'c' as u32, 3, false), Some(5));
        assert_eq!(rope_find(&heap, r, 'c' as u32, 8, true), Some(8));
        let needle = leaf(&mut heap, "cab");
        assert_eq!(rope_search(&heap, r, needle, 0), Some(2));
        assert_eq!(rope_search(&heap, r, needle, 3), Some(5));
        assert_eq!(rope_search(&heap, r, needle, 6), None);
    }

    #[test]
    fn test_repeat_rope_lengths() {
        let mut heap = Heap::new();
        let r = leaf(&mut heap, "0123456789");
        let rep = repeat_rope(&mut heap, r, 100);
        assert_eq!(rope_length(&heap, rep), 1000);
        assert_balanced(&heap, rep);
        assert_eq!(rope_char_at(&heap, rep, 995), '5' as u32);
    }
}
