// Flat vectors of words. Immutable vectors are bounded by what fits in one
// page; mutable vectors reserve their maximum size at creation and can be
// frozen in place.

use crate::error::ErrorLevel;
use crate::pages::{Heap, AVAILABLE_CELLS};
use crate::runtime::with_heap;
use crate::word::{cells_for_elems, CellType, Word, ELEMS_PER_CELL, EMPTY_LIST, NIL};

/// Maximum length of an immutable vector (single-page capacity).
pub const VECTOR_MAX_LENGTH: usize = (AVAILABLE_CELLS - 1) * ELEMS_PER_CELL;

/// Maximum length of a mutable vector: one cell is reserved for the header.
pub const MVECTOR_MAX_LENGTH: usize = VECTOR_MAX_LENGTH;

pub(crate) fn new_vector_node(heap: &mut Heap, elements: &[Word]) -> Word {
    if elements.is_empty() {
        return EMPTY_LIST;
    }
    if elements.len() > VECTOR_MAX_LENGTH {
        col_error!(
            ErrorLevel::Error,
            "vector length {} exceeds the maximum ({})",
            elements.len(),
            VECTOR_MAX_LENGTH
        );
        return NIL;
    }
    let id = heap.alloc_cells(1 + cells_for_elems(elements.len()));
    heap.init_vector(id, elements.len());
    for (i, &w) in elements.iter().enumerate() {
        heap.set_vector_elem(id, i, w);
    }
    Word::from_cell(id)
}

/// Allocate a mutable vector of capacity `max_length`, `length` slots of
/// which are live and nil-initialized.
pub(crate) fn new_mvector_node(heap: &mut Heap, max_length: usize, length: usize) -> Word {
    debug_assert!(length <= max_length);
    if max_length > MVECTOR_MAX_LENGTH {
        col_error!(
            ErrorLevel::Error,
            "mutable vector capacity {} exceeds the maximum ({})",
            max_length,
            MVECTOR_MAX_LENGTH
        );
        return NIL;
    }
    let size_cells = 1 + cells_for_elems(max_length.max(1));
    let id = heap.alloc_cells(size_cells);
    heap.init_mvector(id, size_cells, length);
    for i in 0..length {
        heap.set_vector_elem(id, i, NIL);
    }
    Word::from_cell(id)
}

/// Copy an immutable snapshot of a mutable vector.
pub(crate) fn frozen_vector_copy(heap: &mut Heap, id: u32) -> Word {
    let length = heap.vector_length(id);
    if length == 0 {
        return EMPTY_LIST;
    }
    let copy = heap.alloc_cells(1 + cells_for_elems(length));
    heap.init_vector(copy, length);
    for i in 0..length {
        let w = heap.vector_elem(id, i);
        heap.set_vector_elem(copy, i, w);
    }
    Word::from_cell(copy)
}

pub(crate) fn mvector_set_length(heap: &mut Heap, id: u32, length: usize) {
    let max = heap.mvector_max_length(id);
    if length > max {
        col_error!(
            ErrorLevel::Error,
            "length {} exceeds mutable vector capacity {}",
            length,
            max
        );
        return;
    }
    let old = heap.vector_length(id);
    for i in old..length {
        heap.set_vector_elem(id, i, NIL);
    }
    heap.set_vector_length(id, length);
}

/*
 * Public surface.
 */

/// Maximum length of an immutable vector.
pub fn max_length() -> usize {
    VECTOR_MAX_LENGTH
}

/// Create an immutable vector holding copies of `elements`. Length overflow
/// reports an error and returns nil.
pub fn new(elements: &[Word]) -> Word {
    with_heap(|heap| {
        let mut resolved: Vec<Word> = Vec::with_capacity(elements.len());
        for &e in elements {
            resolved.push(heap.resolve(e));
        }
        new_vector_node(heap, &resolved)
    })
    .unwrap_or(NIL)
}

/// Create a mutable vector of zero length able to grow up to `max_length`.
pub fn new_mvector(max_length: usize) -> Word {
    with_heap(|heap| new_mvector_node(heap, max_length, 0)).unwrap_or(NIL)
}

/// Resize a mutable vector within its capacity; new slots are nil.
pub fn set_length(mvector: Word, length: usize) {
    with_heap(|heap| {
        let w = heap.resolve(mvector);
        if !w.is_heap() || heap.cell_tag(w.cell_id()) != CellType::MVector {
            col_error!(ErrorLevel::Error, "{:#x} is not a mutable vector", w.0);
            return;
        }
        mvector_set_length(heap, w.cell_id(), length);
    });
}

/// Turn a mutable vector into an immutable one in place. Extraneous reserved
/// cells are reclaimed by the next sweep.
pub fn freeze(mvector: Word) {
    with_heap(|heap| {
        let w = heap.resolve(mvector);
        if !w.is_heap() {
            col_error!(ErrorLevel::Error, "{:#x} is not a mutable vector", w.0);
            return;
        }
        let id = w.cell_id();
        match heap.cell_tag(id) {
            CellType::MVector => heap.set_cell_tag(id, CellType::Vector),
            CellType::Vector => {} /* no-op */
            _ => col_error!(ErrorLevel::Error, "{:#x} is not a mutable vector", w.0),
        }
    });
}

#[cfg(test)]
mod vector_tests {
    use super::*;

    #[test]
    fn test_new_vector_node() {
        let mut heap = Heap::new();
        let v = new_vector_node(&mut heap, &[Word::new_int(1), Word::new_int(2)]);
        let id = v.cell_id();
        assert_eq!(heap.cell_tag(id), CellType::Vector);
        assert_eq!(heap.vector_length(id), 2);
        assert_eq!(heap.vector_elem(id, 1).int_value(), 2);
    }

    #[test]
    fn test_empty_vector_is_empty_list() {
        let mut heap = Heap::new();
        assert_eq!(new_vector_node(&mut heap, &[]), EMPTY_LIST);
    }

    #[test]
    fn test_overflow_returns_nil() {
        let mut heap = Heap::new();
        let too_long = vec![NIL; VECTOR_MAX_LENGTH + 1];
        assert_eq!(new_vector_node(&mut heap, &too_long), NIL);
        let ok = vec![NIL; VECTOR_MAX_LENGTH];
        assert!(new_vector_node(&mut heap, &ok).is_heap());
    }

    #[test]
    fn test_mvector_grow_and_freeze() {
        let mut heap = Heap::new();
        let v = new_mvector_node(&mut heap, 16, 0);
        let id = v.cell_id();
        assert_eq!(heap.vector_length(id), 0);
        assert_eq!(heap.mvector_max_length(id), 16);
        mvector_set_length(&mut heap, id, 10);
        assert_eq!(heap.vector_length(id), 10);
        assert!(heap.vector_elem(id, 9).is_nil());
        heap.set_vector_elem(id, 3, Word::new_int(7));
        mvector_set_length(&mut heap, id, 20); /* beyond capacity: error */
        assert_eq!(heap.vector_length(id), 10);
        heap.set_cell_tag(id, CellType::Vector);
        assert_eq!(heap.cell_tag(id), CellType::Vector);
        assert_eq!(heap.vector_elem(id, 3).int_value(), 7);
    }
}
