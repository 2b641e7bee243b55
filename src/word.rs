// Tagged word values and cell layouts.
//
// A word is a machine-word-sized tagged reference. Cells are 16-byte aligned,
// so heap references keep their low 4 bits zero and immediate values are
// distinguished by setting some of those bits:
//
//   0...................0   nil
//   c..............c0000    heap cell reference (cell id << 4), nonzero
//   v.................v1    small signed integer (value = word >> 1)
//   c......c11111110        character (24-bit codepoint in bits 8..32)
//   b......bL....L10        small string, length L in 0..=3, UCS-1 bytes
//                           stored from bit 8 upward
//   l.............l00100    void list (length in bits 5..)
//
// Heap cells use the low byte of their first machine word as the type tag;
// bit 8 is the 1-bit generation counter ("age") and bit 9 flags cells
// recorded in the remembered parent list. The remaining bits and words are
// type-specific, documented per accessor group below.

use core::convert::TryFrom;

use bit_field::BitField;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::ErrorLevel;
use crate::format::{Char, StringFormat, CHAR_MAX};
use crate::pages::{Heap, CELL_SIZE};

/// Maximum length of a small string immediate.
pub const SMALL_STRING_MAX_LENGTH: usize = 3;

/// Maximum length of a void list immediate.
pub const VOID_LIST_MAX_LENGTH: usize = usize::MAX >> 5;

/// An opaque tagged value. Words are only meaningful against the heap of the
/// thread (or shared group) that created them and must not flow anywhere
/// else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Word(pub(crate) usize);

/// The empty rope (a zero-length small string immediate).
pub const EMPTY_ROPE: Word = Word(0b10);

/// The empty list (a zero-length void list immediate).
pub const EMPTY_LIST: Word = Word(0b00100);

/// Nil.
pub const NIL: Word = Word(0);

impl Word {
    pub(crate) fn from_cell(id: u32) -> Word {
        debug_assert!(id != 0);
        Word((id as usize) << 4)
    }

    pub(crate) fn cell_id(self) -> u32 {
        debug_assert!(self.is_heap());
        (self.0 >> 4) as u32
    }

    pub fn is_nil(self) -> bool {
        self.0 == 0
    }

    pub fn is_immediate(self) -> bool {
        self.0 & 0xF != 0
    }

    pub(crate) fn is_heap(self) -> bool {
        self.0 != 0 && self.0 & 0xF == 0
    }

    /*
     * Small integers. Bit 0 set, value in the remaining bits.
     */

    pub fn new_int(value: isize) -> Word {
        if value > isize::MAX >> 1 || value < isize::MIN >> 1 {
            col_error!(ErrorLevel::Error, "integer {} out of small int range", value);
            return NIL;
        }
        Word(((value << 1) | 1) as usize)
    }

    pub fn is_int(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn int_value(self) -> isize {
        debug_assert!(self.is_int());
        (self.0 as isize) >> 1
    }

    /*
     * Characters. Low byte 0xFE, codepoint in bits 8..32.
     */

    pub fn new_char(c: Char) -> Word {
        if c > CHAR_MAX {
            col_error!(ErrorLevel::Error, "codepoint {:#x} out of range", c);
            return NIL;
        }
        Word(((c as usize) << 8) | 0xFE)
    }

    pub fn is_char(self) -> bool {
        self.0 & 0xFF == 0xFE
    }

    pub fn char_value(self) -> Char {
        debug_assert!(self.is_char());
        ((self.0 >> 8) & 0xFF_FFFF) as Char
    }

    /*
     * Small strings. Low two bits 10, length in bits 2..8 (0..=3; the
     * all-ones length is the character tag), bytes from bit 8.
     */

    pub fn new_small_string(bytes: &[u8]) -> Option<Word> {
        if bytes.len() > SMALL_STRING_MAX_LENGTH {
            return None;
        }
        let mut w = (bytes.len() << 2) | 0b10;
        for (i, &b) in bytes.iter().enumerate() {
            w |= (b as usize) << (8 + 8 * i);
        }
        Some(Word(w))
    }

    pub fn is_small_string(self) -> bool {
        self.0 & 0b11 == 0b10 && !self.is_char()
    }

    pub(crate) fn small_string_length(self) -> usize {
        debug_assert!(self.is_small_string());
        (self.0 >> 2) & 0x3F
    }

    pub(crate) fn small_string_byte(self, i: usize) -> u8 {
        debug_assert!(i < self.small_string_length());
        (self.0 >> (8 + 8 * i)) as u8
    }

    pub(crate) fn small_string_bytes(self) -> [u8; SMALL_STRING_MAX_LENGTH] {
        let mut b = [0u8; SMALL_STRING_MAX_LENGTH];
        for (i, slot) in b.iter_mut().enumerate().take(self.small_string_length()) {
            *slot = self.small_string_byte(i);
        }
        b
    }

    /*
     * Void lists: a run of nils carried entirely in the word.
     */

    pub fn new_void_list(length: usize) -> Word {
        debug_assert!(length <= VOID_LIST_MAX_LENGTH);
        Word((length << 5) | 0b00100)
    }

    pub fn is_void_list(self) -> bool {
        self.0 & 0x1F == 0b00100
    }

    pub(crate) fn void_list_length(self) -> usize {
        debug_assert!(self.is_void_list());
        self.0 >> 5
    }
}

/// Public classification of a word, driving dispatch everywhere in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordType {
    Nil,
    SmallInt,
    Char,
    SmallStr,
    RopeLeaf,
    Vector,
    MVector,
    Sublist,
    ConcatList,
    MConcatList,
    ListWrapper,
    MListWrapper,
    VoidList,
    StrBuf,
    Custom,
    Root,
    Redirect,
    Ref,
}

/// Heap cell discriminant, stored in the low byte of the first header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub(crate) enum CellType {
    RopeLeaf = 1,
    Subrope = 2,
    ConcatRope = 3,
    Vector = 4,
    MVector = 5,
    Sublist = 6,
    ConcatList = 7,
    MConcatList = 8,
    List = 9,
    MList = 10,
    StrBuf = 11,
    MapEntry = 12,
    IntMapEntry = 13,
    StrHashMap = 14,
    IntHashMap = 15,
    StrTrieMap = 16,
    IntTrieMap = 17,
    StrTrieNode = 18,
    IntTrieNode = 19,
    Custom = 20,
    Root = 21,
    Redirect = 22,
}

const AGE_BIT: usize = 8;
const PARENT_BIT: usize = 9;

impl Heap {
    pub(crate) fn cell_tag(&self, id: u32) -> CellType {
        let raw = (self.word(id, 0) & 0xFF) as u8;
        CellType::try_from(raw).expect("memory corruption: bad cell tag")
    }

    /// Rewrite the type tag, preserving every other header bit. Used by
    /// freezing, which flips mutable discriminants in place.
    pub(crate) fn set_cell_tag(&mut self, id: u32, tag: CellType) {
        let w = self.word(id, 0);
        let raw: u8 = tag.into();
        self.set_word(id, 0, (w & !0xFF) | raw as u64);
    }

    pub(crate) fn cell_age(&self, id: u32) -> bool {
        self.word(id, 0).get_bit(AGE_BIT)
    }

    pub(crate) fn set_cell_age(&mut self, id: u32, age: bool) {
        let mut w = self.word(id, 0);
        w.set_bit(AGE_BIT, age);
        self.set_word(id, 0, w);
    }

    pub(crate) fn cell_parent_flag(&self, id: u32) -> bool {
        self.word(id, 0).get_bit(PARENT_BIT)
    }

    pub(crate) fn set_cell_parent_flag(&mut self, id: u32, flag: bool) {
        let mut w = self.word(id, 0);
        w.set_bit(PARENT_BIT, flag);
        self.set_word(id, 0, w);
    }

    /// Public word classification.
    pub(crate) fn word_type(&self, w: Word) -> WordType {
        if w.is_nil() {
            return WordType::Nil;
        }
        if w.is_int() {
            return WordType::SmallInt;
        }
        if w.is_char() {
            return WordType::Char;
        }
        if w.is_small_string() {
            return WordType::SmallStr;
        }
        if w.is_void_list() {
            return WordType::VoidList;
        }
        if !w.is_heap() {
            return WordType::Nil;
        }
        match self.cell_tag(w.cell_id()) {
            CellType::RopeLeaf | CellType::Subrope | CellType::ConcatRope => WordType::RopeLeaf,
            CellType::Vector => WordType::Vector,
            CellType::MVector => WordType::MVector,
            CellType::Sublist => WordType::Sublist,
            CellType::ConcatList => WordType::ConcatList,
            CellType::MConcatList => WordType::MConcatList,
            CellType::List => WordType::ListWrapper,
            CellType::MList => WordType::MListWrapper,
            CellType::StrBuf => WordType::StrBuf,
            CellType::Root => WordType::Root,
            CellType::Redirect => WordType::Redirect,
            _ => WordType::Custom,
        }
    }

    /*
     * Rope leaves.
     *
     *   word 0: tag | age/parent | format (bits 16..24) | byte length (32..64)
     *   word 1: character length
     *   data:   bytes from the second cell onward
     */

    pub(crate) fn init_rope_leaf(
        &mut self,
        id: u32,
        format: StringFormat,
        byte_len: usize,
        char_len: usize,
    ) {
        let raw: i8 = format.into();
        let w0 = CellType::RopeLeaf as u64
            | ((raw as u8 as u64) << 16)
            | ((byte_len as u64) << 32);
        self.set_word(id, 0, w0);
        self.set_word(id, 1, char_len as u64);
    }

    pub(crate) fn leaf_format(&self, id: u32) -> StringFormat {
        StringFormat::from_raw(self.word(id, 0).get_bits(16..24) as u8 as i8)
    }

    pub(crate) fn leaf_byte_len(&self, id: u32) -> usize {
        self.word(id, 0).get_bits(32..64) as usize
    }

    pub(crate) fn leaf_char_len(&self, id: u32) -> usize {
        self.word(id, 1) as usize
    }

    pub(crate) fn leaf_bytes(&self, id: u32) -> &[u8] {
        self.data_bytes(id, self.leaf_byte_len(id))
    }

    /*
     * Subrope and sublist nodes (two cells).
     *
     *   word 0: tag | depth (bits 16..24)
     *   word 1: source
     *   word 2: first
     *   word 3: last
     */

    pub(crate) fn init_subnode(
        &mut self,
        id: u32,
        tag: CellType,
        depth: u8,
        source: Word,
        first: usize,
        last: usize,
    ) {
        self.set_word(id, 0, tag as u64 | ((depth as u64) << 16));
        self.set_word(id, 1, source.0 as u64);
        self.set_word(id, 2, first as u64);
        self.set_word(id, 3, last as u64);
    }

    pub(crate) fn node_depth(&self, id: u32) -> u8 {
        self.word(id, 0).get_bits(16..24) as u8
    }

    pub(crate) fn sub_source(&self, id: u32) -> Word {
        Word(self.word(id, 1) as usize)
    }

    pub(crate) fn sub_first(&self, id: u32) -> usize {
        self.word(id, 2) as usize
    }

    pub(crate) fn sub_last(&self, id: u32) -> usize {
        self.word(id, 3) as usize
    }

    /*
     * Concat nodes, rope and list flavors (two cells).
     *
     *   word 0: tag | depth (bits 16..24)
     *   word 1: total length
     *   word 2: left
     *   word 3: right
     */

    pub(crate) fn init_concat(
        &mut self,
        id: u32,
        tag: CellType,
        depth: u8,
        length: usize,
        left: Word,
        right: Word,
    ) {
        self.set_word(id, 0, tag as u64 | ((depth as u64) << 16));
        self.set_word(id, 1, length as u64);
        self.set_word(id, 2, left.0 as u64);
        self.set_word(id, 3, right.0 as u64);
    }

    pub(crate) fn concat_length(&self, id: u32) -> usize {
        self.word(id, 1) as usize
    }

    pub(crate) fn concat_left(&self, id: u32) -> Word {
        Word(self.word(id, 2) as usize)
    }

    pub(crate) fn concat_right(&self, id: u32) -> Word {
        Word(self.word(id, 3) as usize)
    }

    /*
     * Vectors.
     *
     *   word 0: tag; mutable vectors keep their total cell count in bits
     *           16..32
     *   word 1: length
     *   elements: one per machine word slot from word 2 onward
     */

    pub(crate) fn init_vector(&mut self, id: u32, length: usize) {
        self.set_word(id, 0, CellType::Vector as u64);
        self.set_word(id, 1, length as u64);
    }

    pub(crate) fn init_mvector(&mut self, id: u32, size_cells: usize, length: usize) {
        self.set_word(
            id,
            0,
            CellType::MVector as u64 | ((size_cells as u64) << 16),
        );
        self.set_word(id, 1, length as u64);
    }

    pub(crate) fn vector_length(&self, id: u32) -> usize {
        self.word(id, 1) as usize
    }

    pub(crate) fn set_vector_length(&mut self, id: u32, length: usize) {
        self.set_word(id, 1, length as u64);
    }

    pub(crate) fn mvector_size_cells(&self, id: u32) -> usize {
        self.word(id, 0).get_bits(16..32) as usize
    }

    /// Capacity in elements of a mutable vector.
    pub(crate) fn mvector_max_length(&self, id: u32) -> usize {
        (self.mvector_size_cells(id) - 1) * ELEMS_PER_CELL
    }

    pub(crate) fn vector_elem(&self, id: u32, i: usize) -> Word {
        Word(self.word(id, 2 + i) as usize)
    }

    pub(crate) fn set_vector_elem(&mut self, id: u32, i: usize, w: Word) {
        self.set_word(id, 2 + i, w.0 as u64);
    }

    /*
     * List words (one cell).
     *
     *   word 0: tag | loop length (bits 16..64)
     *   word 1: root node
     */

    pub(crate) fn init_list(&mut self, id: u32, tag: CellType, root: Word, loop_len: usize) {
        self.set_word(id, 0, tag as u64 | ((loop_len as u64) << 16));
        self.set_word(id, 1, root.0 as u64);
    }

    pub(crate) fn list_root(&self, id: u32) -> Word {
        Word(self.word(id, 1) as usize)
    }

    pub(crate) fn set_list_root(&mut self, id: u32, root: Word) {
        self.set_word(id, 1, root.0 as u64);
    }

    pub(crate) fn list_loop(&self, id: u32) -> usize {
        self.word(id, 0).get_bits(16..64) as usize
    }

    pub(crate) fn set_list_loop(&mut self, id: u32, loop_len: usize) {
        let mut w = self.word(id, 0);
        w.set_bits(16..64, loop_len as u64);
        self.set_word(id, 0, w);
    }

    /*
     * String buffers.
     *
     *   word 0: tag | format (16..24) | total cells (24..32) | pending
     *           length in characters (32..64)
     *   word 1: accumulated rope
     *   data:   pending codepoints, 4 bytes each, from the second cell
     */

    pub(crate) fn init_strbuf(&mut self, id: u32, format: StringFormat, size_cells: usize) {
        let raw: i8 = format.into();
        self.set_word(
            id,
            0,
            CellType::StrBuf as u64 | ((raw as u8 as u64) << 16) | ((size_cells as u64) << 24),
        );
        self.set_word(id, 1, EMPTY_ROPE.0 as u64);
    }

    pub(crate) fn strbuf_format(&self, id: u32) -> StringFormat {
        StringFormat::from_raw(self.word(id, 0).get_bits(16..24) as u8 as i8)
    }

    pub(crate) fn strbuf_size_cells(&self, id: u32) -> usize {
        self.word(id, 0).get_bits(24..32) as usize
    }

    pub(crate) fn strbuf_pending_len(&self, id: u32) -> usize {
        self.word(id, 0).get_bits(32..64) as usize
    }

    pub(crate) fn set_strbuf_pending_len(&mut self, id: u32, len: usize) {
        let mut w = self.word(id, 0);
        w.set_bits(32..64, len as u64);
        self.set_word(id, 0, w);
    }

    pub(crate) fn strbuf_rope(&self, id: u32) -> Word {
        Word(self.word(id, 1) as usize)
    }

    pub(crate) fn set_strbuf_rope(&mut self, id: u32, rope: Word) {
        self.set_word(id, 1, rope.0 as u64);
    }

    /// Pending chunk capacity in characters.
    pub(crate) fn strbuf_capacity(&self, id: u32) -> usize {
        (self.strbuf_size_cells(id) - 1) * (CELL_SIZE / 4)
    }

    pub(crate) fn strbuf_pending_char(&self, id: u32, i: usize) -> Char {
        let data = self.data_bytes(id, (i + 1) * 4);
        let o = i * 4;
        u32::from_ne_bytes([data[o], data[o + 1], data[o + 2], data[o + 3]])
    }

    pub(crate) fn set_strbuf_pending_char(&mut self, id: u32, i: usize, c: Char) {
        let o = i * 4;
        let data = self.data_bytes_mut(id, (i + 1) * 4);
        data[o..o + 4].copy_from_slice(&c.to_ne_bytes());
    }

    /*
     * Map entries (two cells). String-keyed entries cache the key hash;
     * integer-keyed entries store the raw key bits instead of a word.
     *
     *   word 0: tag | hash (bits 16..64)
     *   word 1: next entry in bucket / overflow chain
     *   word 2: key
     *   word 3: value
     */

    pub(crate) fn init_map_entry(
        &mut self,
        id: u32,
        tag: CellType,
        hash: u64,
        next: Word,
        key: u64,
        value: Word,
    ) {
        self.set_word(id, 0, tag as u64 | (hash << 16));
        self.set_word(id, 1, next.0 as u64);
        self.set_word(id, 2, key);
        self.set_word(id, 3, value.0 as u64);
    }

    pub(crate) fn entry_hash(&self, id: u32) -> u64 {
        self.word(id, 0).get_bits(16..64)
    }

    pub(crate) fn entry_next(&self, id: u32) -> Word {
        Word(self.word(id, 1) as usize)
    }

    pub(crate) fn set_entry_next(&mut self, id: u32, next: Word) {
        self.set_word(id, 1, next.0 as u64);
    }

    pub(crate) fn entry_key(&self, id: u32) -> Word {
        Word(self.word(id, 2) as usize)
    }

    pub(crate) fn entry_int_key(&self, id: u32) -> isize {
        self.word(id, 2) as i64 as isize
    }

    pub(crate) fn entry_value(&self, id: u32) -> Word {
        Word(self.word(id, 3) as usize)
    }

    pub(crate) fn set_entry_value(&mut self, id: u32, value: Word) {
        self.set_word(id, 3, value.0 as u64);
    }

    /*
     * Map headers (one cell): hash maps hold their bucket vector in word 1,
     * trie maps their root node.
     *
     *   word 0: tag | entry count (bits 16..64)
     *   word 1: buckets / root
     */

    pub(crate) fn init_map(&mut self, id: u32, tag: CellType) {
        self.set_word(id, 0, tag as u64);
        self.set_word(id, 1, NIL.0 as u64);
    }

    pub(crate) fn map_size(&self, id: u32) -> usize {
        self.word(id, 0).get_bits(16..64) as usize
    }

    pub(crate) fn set_map_size(&mut self, id: u32, size: usize) {
        let mut w = self.word(id, 0);
        w.set_bits(16..64, size as u64);
        self.set_word(id, 0, w);
    }

    pub(crate) fn map_root(&self, id: u32) -> Word {
        Word(self.word(id, 1) as usize)
    }

    pub(crate) fn set_map_root(&mut self, id: u32, root: Word) {
        self.set_word(id, 1, root.0 as u64);
    }

    /*
     * Trie nodes (two cells). String nodes discriminate on a codepoint bit
     * at a character index; integer nodes on a bit of the sign-flipped key.
     *
     *   word 0: tag | codepoint bit mask for string nodes (bits 16..48)
     *   word 1: character index (string) / key bit mask (integer)
     *   word 2: left (bit clear)
     *   word 3: right (bit set)
     */

    pub(crate) fn init_str_trie_node(
        &mut self,
        id: u32,
        mask: u32,
        index: usize,
        left: Word,
        right: Word,
    ) {
        self.set_word(id, 0, CellType::StrTrieNode as u64 | ((mask as u64) << 16));
        self.set_word(id, 1, index as u64);
        self.set_word(id, 2, left.0 as u64);
        self.set_word(id, 3, right.0 as u64);
    }

    pub(crate) fn init_int_trie_node(&mut self, id: u32, mask: u64, left: Word, right: Word) {
        self.set_word(id, 0, CellType::IntTrieNode as u64);
        self.set_word(id, 1, mask);
        self.set_word(id, 2, left.0 as u64);
        self.set_word(id, 3, right.0 as u64);
    }

    pub(crate) fn trie_str_mask(&self, id: u32) -> u32 {
        self.word(id, 0).get_bits(16..48) as u32
    }

    pub(crate) fn trie_str_index(&self, id: u32) -> usize {
        self.word(id, 1) as usize
    }

    pub(crate) fn trie_int_mask(&self, id: u32) -> u64 {
        self.word(id, 1)
    }

    pub(crate) fn trie_left(&self, id: u32) -> Word {
        Word(self.word(id, 2) as usize)
    }

    pub(crate) fn trie_right(&self, id: u32) -> Word {
        Word(self.word(id, 3) as usize)
    }

    pub(crate) fn set_trie_left(&mut self, id: u32, w: Word) {
        self.set_word(id, 2, w.0 as u64);
    }

    pub(crate) fn set_trie_right(&mut self, id: u32, w: Word) {
        self.set_word(id, 3, w.0 as u64);
    }

    /*
     * Custom words.
     *
     *   word 0: tag | type id (bits 16..32) | data cells (32..40)
     *   word 1: reserved
     *   data:   type-owned machine words from the second cell
     */

    pub(crate) fn init_custom(&mut self, id: u32, type_id: u16, data_cells: usize) {
        self.set_word(
            id,
            0,
            CellType::Custom as u64 | ((type_id as u64) << 16) | ((data_cells as u64) << 32),
        );
        self.set_word(id, 1, 0);
    }

    pub(crate) fn custom_type_id(&self, id: u32) -> u16 {
        self.word(id, 0).get_bits(16..32) as u16
    }

    pub(crate) fn custom_data_cells(&self, id: u32) -> usize {
        self.word(id, 0).get_bits(32..40) as usize
    }

    pub(crate) fn custom_data_word(&self, id: u32, k: usize) -> u64 {
        self.word(id, 2 + k)
    }

    pub(crate) fn set_custom_data_word(&mut self, id: u32, k: usize, v: u64) {
        self.set_word(id, 2 + k, v);
    }

    /*
     * Roots (one cell).
     *
     *   word 0: tag | refcount (bits 16..32) | next root cell id (32..64)
     *   word 1: preserved source
     */

    pub(crate) fn init_root(&mut self, id: u32, refcount: u32, next: u32, source: Word) {
        self.set_word(
            id,
            0,
            CellType::Root as u64 | ((refcount as u64) << 16) | ((next as u64) << 32),
        );
        self.set_word(id, 1, source.0 as u64);
    }

    pub(crate) fn root_refcount(&self, id: u32) -> u32 {
        self.word(id, 0).get_bits(16..32) as u32
    }

    pub(crate) fn set_root_refcount(&mut self, id: u32, rc: u32) {
        let mut w = self.word(id, 0);
        w.set_bits(16..32, rc as u64);
        self.set_word(id, 0, w);
    }

    pub(crate) fn root_next(&self, id: u32) -> u32 {
        self.word(id, 0).get_bits(32..64) as u32
    }

    pub(crate) fn set_root_next(&mut self, id: u32, next: u32) {
        let mut w = self.word(id, 0);
        w.set_bits(32..64, next as u64);
        self.set_word(id, 0, w);
    }

    pub(crate) fn root_source(&self, id: u32) -> Word {
        Word(self.word(id, 1) as usize)
    }

    /*
     * Redirects (one cell), installed by promotion.
     *
     *   word 0: tag
     *   word 1: forwarding target
     */

    pub(crate) fn init_redirect(&mut self, id: u32, target: Word) {
        self.set_word(id, 0, CellType::Redirect as u64);
        self.set_word(id, 1, target.0 as u64);
    }

    pub(crate) fn redirect_target(&self, id: u32) -> Word {
        Word(self.word(id, 1) as usize)
    }

    /// Number of cells occupied by the object whose header is at `id`.
    pub(crate) fn object_cells(&self, id: u32) -> usize {
        match self.cell_tag(id) {
            CellType::RopeLeaf => 1 + cells_for_bytes(self.leaf_byte_len(id)),
            CellType::Subrope
            | CellType::Sublist
            | CellType::ConcatRope
            | CellType::ConcatList
            | CellType::MConcatList
            | CellType::MapEntry
            | CellType::IntMapEntry
            | CellType::StrTrieNode
            | CellType::IntTrieNode => 2,
            CellType::Vector => 1 + cells_for_elems(self.vector_length(id)),
            CellType::MVector => self.mvector_size_cells(id),
            CellType::StrBuf => self.strbuf_size_cells(id),
            CellType::Custom => 1 + self.custom_data_cells(id),
            CellType::List
            | CellType::MList
            | CellType::StrHashMap
            | CellType::IntHashMap
            | CellType::StrTrieMap
            | CellType::IntTrieMap
            | CellType::Root
            | CellType::Redirect => 1,
        }
    }
}

/// Element slots per cell: elements occupy one 8-byte slot each.
pub(crate) const ELEMS_PER_CELL: usize = CELL_SIZE / 8;

pub(crate) fn cells_for_bytes(n: usize) -> usize {
    (n + CELL_SIZE - 1) / CELL_SIZE
}

pub(crate) fn cells_for_elems(n: usize) -> usize {
    (n + ELEMS_PER_CELL - 1) / ELEMS_PER_CELL
}
