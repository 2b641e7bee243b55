// End-to-end scenarios against the public surface. Each test owns a fresh
// per-thread session.

use crate::format::StringFormat;
use crate::word::{Word, WordType, NIL};
use crate::{list, map, rope, strbuf, vector, Mode};

fn with_session<F: FnOnce()>(f: F) {
    crate::init(Mode::Single);
    f();
    crate::cleanup();
}

fn str_rope(s: &str) -> Word {
    rope::from_str(s)
}

fn rope_to_string(r: Word) -> String {
    let mut out = String::new();
    for i in 0..rope::length(r) {
        out.push(char::from_u32(rope::at(r, i)).unwrap());
    }
    out
}

#[test]
fn test_hello_world_scenario() {
    with_session(|| {
        let r = rope::concat(str_rope("hello "), str_rope("world"));
        assert_eq!(rope::length(r), 11);
        let sub = rope::subrope(r, 3, 7);
        assert_eq!(rope::length(sub), 5);
        assert_eq!(rope_to_string(sub), "lo wo");
        assert_eq!(rope::compare(sub, str_rope("lo wo")), 0);
    });
}

#[test]
fn test_sparse_mutable_list_scenario() {
    with_session(|| {
        let ml = list::new_mlist();
        crate::preserve(ml);
        list::set_length(ml, 1_000);
        list::set_at(ml, 500, Word::new_int(42));
        assert_eq!(list::length(ml), 1_000);
        assert_eq!(list::at(ml, 500).int_value(), 42);
        assert!(list::at(ml, 499).is_nil());
        assert!(list::at(ml, 501).is_nil());
        assert!(list::at(ml, 999).is_nil());
        crate::release(ml);
    });
}

#[test]
fn test_cyclic_list_scenario() {
    with_session(|| {
        let elements: Vec<Word> = (0..10).map(Word::new_int).collect();
        let ml = list::new_mlist();
        list::mlist_insert_at(ml, 0, list::new(&elements));
        list::set_loop(ml, 3);
        assert_eq!(list::length(ml), 10);
        assert_eq!(list::loop_length(ml), 3);
        assert_eq!(list::at(ml, 9).int_value(), 9);
        assert_eq!(list::at(ml, 12).int_value(), 9);
        assert_eq!(list::at(ml, 15).int_value(), 9);
        assert_eq!(list::at(ml, 7).int_value(), 7);
        assert_eq!(list::at(ml, 10).int_value(), 7);
    });
}

#[test]
fn test_hash_map_scenario() {
    with_session(|| {
        let m = map::new_hash_map(0);
        crate::preserve(m);
        let keys: Vec<Word> = (0..1000).map(|i| str_rope(&i.to_string())).collect();
        for (i, &k) in keys.iter().enumerate() {
            assert!(map::set(m, k, Word::new_int(i as isize + 1000)));
        }
        for (i, &k) in keys.iter().enumerate() {
            assert!(!map::set(m, k, Word::new_int(i as isize + 2000)));
        }
        assert_eq!(map::size(m), 1000);

        let mut seen = 0;
        let mut it = map::iter(m);
        while !it.end() {
            let key = rope_to_string(it.key());
            let i: isize = key.parse().unwrap();
            assert_eq!(it.value().int_value(), i + 2000);
            seen += 1;
            it.next();
        }
        assert_eq!(seen, 1000);

        for (i, &k) in keys.iter().enumerate() {
            let v = map::get(m, k).unwrap();
            assert_eq!(v.int_value(), i as isize + 2000);
        }
        for &k in &keys {
            assert!(map::unset(m, k));
        }
        assert_eq!(map::size(m), 0);
        assert!(map::get(m, keys[17]).is_none());
        crate::release(m);
    });
}

#[test]
fn test_int_trie_map_scenario() {
    with_session(|| {
        let m = map::new_int_trie_map();
        crate::preserve(m);
        for i in (0..1000).rev() {
            assert!(map::int_set(m, i, Word::new_int(i)));
        }
        assert_eq!(map::size(m), 1000);

        let mut it = map::iter(m);
        let mut prev = isize::MIN;
        let mut count = 0;
        while !it.end() {
            let k = it.int_key();
            assert!(k > prev, "forward iteration must be strictly increasing");
            prev = k;
            count += 1;
            it.next();
        }
        assert_eq!(count, 1000);

        let mut it = map::iter_last(m);
        let mut prev = isize::MAX;
        let mut count = 0;
        while !it.end() {
            let k = it.int_key();
            assert!(k < prev, "backward iteration must be strictly decreasing");
            prev = k;
            count += 1;
            it.prev();
        }
        assert_eq!(count, 1000);
        crate::release(m);
    });
}

#[test]
fn test_string_buffer_scenario() {
    with_session(|| {
        let buf = strbuf::new(StringFormat::Ucs1, strbuf::DEFAULT_CAPACITY);

        // A UCS-2 rope is wider than the buffer and must be rejected.
        let wide_data: Vec<u8> = [0x20ACu16, 0x20AD, 0x20AE]
            .iter()
            .flat_map(|u| u.to_ne_bytes().to_vec())
            .collect();
        let wide = rope::new(StringFormat::Ucs2, &wide_data);
        assert!(!strbuf::append_rope(buf, wide));
        assert_eq!(strbuf::length(buf), 0);

        let piece = rope::new(StringFormat::Ucs1, &[b'x'; 64]);
        for _ in 0..3 {
            assert!(strbuf::append_rope(buf, piece));
        }
        assert_eq!(strbuf::length(buf), 192);
        let frozen = strbuf::freeze(buf);
        assert_eq!(rope::length(frozen), 192);
        let triple = rope::concat_all(&[piece, piece, piece]);
        assert_eq!(rope::compare(frozen, triple), 0);
    });
}

/*
 * Invariants and laws.
 */

#[test]
fn test_rope_identity_laws() {
    with_session(|| {
        let r = rope::concat(str_rope("abcdefghij"), rope::repeat(str_rope("klmnopqrst"), 7));
        let n = rope::length(r);
        assert_eq!(n, 80);

        // replace(r, i, j, subrope(r, i, j)) == r
        let sub = rope::subrope(r, 10, 30);
        let replaced = rope::replace(r, 10, 30, sub);
        assert_eq!(rope::compare(replaced, r), 0);

        // insert(r, i, empty) == r
        assert_eq!(rope::insert(r, 5, rope::empty()), r);

        // remove(r, i, i-1) == r
        assert_eq!(rope::remove(r, 5, 4), r);

        // subrope identity and clamping
        assert_eq!(rope::subrope(r, 0, n - 1), r);
        assert_eq!(rope::length(rope::subrope(r, 50, 10_000)), n - 50);
        assert_eq!(rope::subrope(r, n, n + 3), rope::empty());
        assert_eq!(rope::length(rope::subrope(r, 3, 2)), 0);
    });
}

#[test]
fn test_concat_length_law_and_balance() {
    with_session(|| {
        // A long right-heavy build must stay usable: rotations keep depth
        // logarithmic, and every character stays reachable.
        let piece = str_rope("abcdefghijklmnopqrstuvwxyz0123"); /* 30 chars */
        let mut r = rope::empty();
        for _ in 0..50 {
            r = rope::concat(piece, r);
        }
        assert_eq!(rope::length(r), 30 * 50);
        for k in 0..50 {
            assert_eq!(rope::at(r, k * 30), 'a' as u32);
            assert_eq!(rope::at(r, k * 30 + 29), '3' as u32);
        }
        // Iterator agrees with direct access along the whole rope.
        let mut it = rope::iter(r, 0);
        let mut i = 0;
        while !it.end() {
            assert_eq!(it.at(), rope::at(r, i));
            it.next();
            i += 1;
        }
        assert_eq!(i, 1500);
    });
}

#[test]
fn test_traverse_chunks_covers_range_once() {
    with_session(|| {
        let r = rope::concat(str_rope("hello "), rope::repeat(str_rope("world "), 20));
        let n = rope::length(r);
        let mut covered = 0;
        let total = rope::traverse_chunks(r, 0, n, false, |_, chunk| {
            covered += chunk.char_length;
            false
        });
        assert_eq!(total, n);
        assert_eq!(covered, n);

        // Reverse traversal covers the same range.
        let mut covered_rev = 0;
        rope::traverse_chunks(r, 3, 50, true, |_, chunk| {
            covered_rev += chunk.char_length;
            false
        });
        assert_eq!(covered_rev, 50);

        // Halting stops early.
        let mut first = 0;
        rope::traverse_chunks(r, 0, n, false, |_, chunk| {
            first = chunk.char_length;
            true
        });
        assert!(first > 0 && first < n);
    });
}

#[test]
fn test_normalize_round_trips() {
    with_session(|| {
        // Crosses the UTF-16 surrogate and UTF-8 4-byte boundaries.
        let s = "A\u{E9}\u{20AC}\u{1D11E}z";
        let r = str_rope(s);
        assert_eq!(rope::length(r), 5);
        assert_eq!(rope::at(r, 3), 0x1D11E);

        let utf16 = rope::normalize(r, StringFormat::Utf16, None, true);
        assert_eq!(rope::compare(utf16, r), 0);
        let back = rope::normalize(utf16, StringFormat::Utf8, None, true);
        assert_eq!(rope::compare(back, r), 0);

        // Idempotence.
        let once = rope::normalize(r, StringFormat::Ucs4, None, false);
        let twice = rope::normalize(once, StringFormat::Ucs4, None, false);
        assert_eq!(rope::compare(once, twice), 0);

        // Unrepresentable characters: replacement or empty.
        let narrowed = rope::normalize(r, StringFormat::Ucs1, Some(b'?' as u32), true);
        assert_eq!(rope_to_string(narrowed), "A\u{E9}??z");
        assert_eq!(
            rope::normalize(r, StringFormat::Ucs1, None, true),
            rope::empty()
        );
    });
}

#[test]
fn test_find_and_search() {
    with_session(|| {
        let r = rope::concat(str_rope("needle in a "), str_rope("haystack, needle"));
        assert_eq!(rope::find(r, 'n' as u32, 0, false), Some(0));
        assert_eq!(rope::find(r, 'n' as u32, 1, false), Some(8));
        assert_eq!(rope::find(r, 'z' as u32, 0, false), None);
        assert_eq!(rope::find(r, 'n' as u32, rope::length(r) - 1, true), Some(22));
        assert_eq!(rope::search(r, str_rope("needle"), 0), Some(0));
        assert_eq!(rope::search(r, str_rope("needle"), 1), Some(22));
        assert_eq!(rope::search(r, str_rope("missing"), 0), None);
    });
}

#[test]
fn test_small_string_boundaries() {
    with_session(|| {
        for len in 0..=3usize {
            let data = &b"abc"[..len];
            let r = rope::new(StringFormat::Ucs1, data);
            assert_eq!(crate::word_type(r), WordType::SmallStr);
            assert_eq!(rope::length(r), len);
        }
        let r = rope::new(StringFormat::Ucs1, b"abcd");
        assert_eq!(crate::word_type(r), WordType::RopeLeaf);
        assert_eq!(rope::length(r), 4);

        // Single characters use the char immediate.
        let c = rope::new(StringFormat::Ucs2, &0x20ACu16.to_ne_bytes());
        assert_eq!(crate::word_type(c), WordType::Char);
        assert_eq!(rope::length(c), 1);
        assert_eq!(rope::at(c, 0), 0x20AC);
        assert_eq!(rope_to_string(rope::concat(c, str_rope("!"))), "\u{20AC}!");
    });
}

#[test]
fn test_empty_inputs_everywhere() {
    with_session(|| {
        let e = rope::empty();
        assert_eq!(rope::length(e), 0);
        assert_eq!(rope::at(e, 0), crate::CHAR_INVALID);
        assert_eq!(rope::concat(e, e), e);
        assert_eq!(rope::subrope(e, 0, 10), e);
        assert_eq!(rope::repeat(e, 10), e);
        assert_eq!(rope::compare(e, str_rope("")), 0);

        let el = crate::EMPTY_LIST;
        assert_eq!(list::length(el), 0);
        assert!(list::at(el, 0).is_nil());
        assert_eq!(list::length(list::concat(el, el)), 0);
        assert_eq!(list::length(list::sublist(el, 0, 5)), 0);
        let it = list::iter(el, 0);
        assert!(it.end());
    });
}

#[test]
fn test_sublist_collapse_and_adjacent_merge() {
    with_session(|| {
        let elements: Vec<Word> = (0..200).map(Word::new_int).collect();
        let l = list::new(&elements);
        let s1 = list::sublist(l, 20, 179);
        let s2 = list::sublist(s1, 10, 109); /* sublist of sublist */
        assert_eq!(list::length(s2), 100);
        for i in 0..100 {
            assert_eq!(list::at(s2, i).int_value(), 30 + i as isize);
        }
        // Adjacent sublists of one source merge back into the source.
        let v: Vec<Word> = (0..120).map(Word::new_int).collect();
        let flat = list::new(&v);
        let left = list::sublist(flat, 0, 59);
        let right = list::sublist(flat, 60, 119);
        let joined = list::concat(left, right);
        assert_eq!(joined, flat);
        for i in (0..120).step_by(17) {
            assert_eq!(list::at(joined, i).int_value(), i as isize);
        }
    });
}

#[test]
fn test_cyclic_insert_and_remove_laws() {
    with_session(|| {
        // at(L, i) = at(L, ((i - (n-k)) mod k) + (n-k)) for i >= n-k.
        let elements: Vec<Word> = (0..10).map(Word::new_int).collect();
        let ml = list::new_mlist();
        list::mlist_insert_at(ml, 0, list::new(&elements));
        list::set_loop(ml, 3);
        let n = 10;
        let k = 3;
        for i in n - k..n + 2 * k {
            let canonical = ((i - (n - k)) % k) + (n - k);
            assert_eq!(
                list::at(ml, i).int_value(),
                list::at(ml, canonical).int_value()
            );
        }

        // Insertion within the loop grows the loop.
        list::mlist_insert_at(ml, 12, list::new(&[Word::new_int(100)]));
        assert_eq!(list::length(ml), 11);
        assert_eq!(list::loop_length(ml), 4);
        assert_eq!(list::at(ml, 9).int_value(), 100);
        assert_eq!(list::at(ml, 10).int_value(), 9);
        assert_eq!(list::at(ml, 11).int_value(), list::at(ml, 7).int_value());

        // Removal spanning the loop boundary rotates the loop start and
        // keeps its length.
        let ml2 = list::new_mlist();
        list::mlist_insert_at(ml2, 0, list::new(&elements));
        list::set_loop(ml2, 3);
        list::mlist_remove_range(ml2, 5, 8);
        assert_eq!(list::loop_length(ml2), 3);
        assert_eq!(list::length(ml2), 8);
        let expect = [0, 1, 2, 3, 4, 9, 7, 8];
        for (i, &e) in expect.iter().enumerate() {
            assert_eq!(list::at(ml2, i).int_value(), e);
        }
        // The loop now runs 9, 7, 8, 9, ...
        assert_eq!(list::at(ml2, 8).int_value(), 9);
        assert_eq!(list::at(ml2, 11).int_value(), 9);
    });
}

#[test]
fn test_immutable_list_ops() {
    with_session(|| {
        let elements: Vec<Word> = (0..50).map(Word::new_int).collect();
        let l = list::new(&elements);

        let inserted = list::insert(l, 10, list::new(&[Word::new_int(-1), Word::new_int(-2)]));
        assert_eq!(list::length(inserted), 52);
        assert_eq!(list::at(inserted, 9).int_value(), 9);
        assert_eq!(list::at(inserted, 10).int_value(), -1);
        assert_eq!(list::at(inserted, 12).int_value(), 10);

        let removed = list::remove(inserted, 10, 11);
        assert_eq!(list::length(removed), 50);
        for i in (0..50).step_by(7) {
            assert_eq!(list::at(removed, i).int_value(), i as isize);
        }

        let replaced = list::replace(l, 0, 48, list::new(&[Word::new_int(7)]));
        assert_eq!(list::length(replaced), 2);
        assert_eq!(list::at(replaced, 0).int_value(), 7);
        assert_eq!(list::at(replaced, 1).int_value(), 49);

        // Past-the-end insertion concatenates.
        let appended = list::insert(l, 1_000, list::new(&[Word::new_int(50)]));
        assert_eq!(list::length(appended), 51);
        assert_eq!(list::at(appended, 50).int_value(), 50);
    });
}

#[test]
fn test_freeze_mlist_preserves_content() {
    with_session(|| {
        let ml = list::new_mlist();
        crate::preserve(ml);
        list::set_length(ml, 300);
        for i in (0..300).step_by(11) {
            list::set_at(ml, i, Word::new_int(i as isize));
        }
        assert_eq!(crate::word_type(ml), WordType::MListWrapper);
        let before: Vec<Word> = (0..300).map(|i| list::at(ml, i)).collect();
        list::freeze_mlist(ml);
        assert_eq!(crate::word_type(ml), WordType::ListWrapper);
        assert_eq!(list::length(ml), 300);
        for (i, &w) in before.iter().enumerate() {
            assert_eq!(list::at(ml, i), w);
        }
        // Frozen lists reject mutation.
        list::set_at(ml, 0, Word::new_int(-1));
        assert_eq!(list::at(ml, 0), before[0]);
        crate::release(ml);
    });
}

#[test]
fn test_list_iterator_matches_at() {
    with_session(|| {
        let ml = list::new_mlist();
        crate::preserve(ml);
        list::set_length(ml, 500);
        for i in (0..500).step_by(3) {
            list::set_at(ml, i, Word::new_int(i as isize));
        }
        let mut it = list::iter(ml, 0);
        let mut i = 0;
        while !it.end() {
            assert_eq!(it.at(), list::at(ml, i));
            it.next();
            i += 1;
        }
        assert_eq!(i, 500);

        // Backward from the end.
        let mut it = list::iter(ml, 499);
        let mut i = 499i64;
        loop {
            assert_eq!(it.at(), list::at(ml, i as usize));
            if i == 0 {
                break;
            }
            it.prev();
            assert!(!it.end());
            i -= 1;
        }

        // move_to and compare.
        let mut a = list::iter(ml, 3);
        let b = list::iter(ml, 400);
        assert_eq!(a.compare(&b), -1);
        a.move_to(400);
        assert_eq!(a.compare(&b), 0);
        assert_eq!(a.at(), list::at(ml, 400));
        crate::release(ml);
    });
}

#[test]
fn test_cyclic_iterator_wraps() {
    with_session(|| {
        let elements: Vec<Word> = (0..10).map(Word::new_int).collect();
        let ml = list::new_mlist();
        list::mlist_insert_at(ml, 0, list::new(&elements));
        list::set_loop(ml, 3);
        let mut it = list::iter(ml, 8);
        it.forward(4); /* 8 -> 12 == 9 */
        assert!(!it.end());
        assert_eq!(it.at().int_value(), list::at(ml, 12).int_value());
    });
}

#[test]
fn test_vector_surface() {
    with_session(|| {
        assert_eq!(vector::max_length(), 124);
        let v = vector::new(&[Word::new_int(1), Word::new_int(2), Word::new_int(3)]);
        assert_eq!(crate::word_type(v), WordType::Vector);
        assert_eq!(list::length(v), 3);
        assert_eq!(list::at(v, 2).int_value(), 3);

        let mv = vector::new_mvector(10);
        assert_eq!(crate::word_type(mv), WordType::MVector);
        vector::set_length(mv, 5);
        assert_eq!(list::length(mv), 5);
        vector::freeze(mv);
        assert_eq!(crate::word_type(mv), WordType::Vector);

        // Length overflow yields nil plus an error.
        let too_long = vec![NIL; vector::max_length() + 1];
        assert!(vector::new(&too_long).is_nil());
    });
}

#[test]
fn test_gc_preserved_structures_survive_pressure() {
    with_session(|| {
        let keep_rope = rope::concat(str_rope("keep "), rope::repeat(str_rope("me "), 100));
        let elements: Vec<Word> = (0..200).map(Word::new_int).collect();
        let keep_list = list::new(&elements);
        crate::preserve(keep_rope);
        crate::preserve(keep_list);

        // Churn enough garbage to force several collections. Unpreserved
        // words are only valid until the next collection point, so each
        // round inspects its temporaries inside a pause.
        for round in 0..200 {
            crate::pause_gc();
            let junk: Vec<Word> = (0..100).map(Word::new_int).collect();
            let l = list::new(&junk);
            let r = rope::repeat(str_rope("garbage"), 50 + round % 7);
            assert_eq!(list::length(l), 100);
            assert!(rope::length(r) > 0);
            crate::resume_gc();
        }
        let stats = crate::gc_stats().unwrap();
        assert!(stats.cycles > 0, "expected at least one collection");

        assert_eq!(rope::length(keep_rope), 305);
        assert_eq!(rope::at(keep_rope, 0), 'k' as u32);
        assert_eq!(list::length(keep_list), 200);
        for i in (0..200).step_by(13) {
            assert_eq!(list::at(keep_list, i).int_value(), i as isize);
        }
        crate::release(keep_rope);
        crate::release(keep_list);
    });
}

#[test]
fn test_pause_defers_collection() {
    with_session(|| {
        crate::pause_gc();
        let before = crate::gc_stats().unwrap().cycles;
        for _ in 0..200 {
            let junk: Vec<Word> = (0..100).map(Word::new_int).collect();
            let _ = list::new(&junk);
        }
        assert_eq!(crate::gc_stats().unwrap().cycles, before);
        crate::resume_gc();
        // The deferred collection ran at resume.
        assert!(crate::gc_stats().unwrap().cycles > before);
    });
}

#[test]
fn test_async_mode_collects() {
    crate::init(Mode::Async);
    let keep = rope::repeat(str_rope("async "), 64);
    crate::preserve(keep);
    for _ in 0..300 {
        let junk: Vec<Word> = (0..100).map(Word::new_int).collect();
        let _ = list::new(&junk);
    }
    // Give the worker a moment, then check the kept value is intact.
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(rope::length(keep), 6 * 64);
    crate::release(keep);
    crate::cleanup();
}

#[test]
fn test_shared_group_mode() {
    use std::sync::mpsc;

    crate::init(Mode::Shared(42));
    let keep = list::new(&[Word::new_int(1), Word::new_int(2)]);
    crate::preserve(keep);

    let (tx, rx) = mpsc::channel();
    let handle = std::thread::spawn(move || {
        crate::init(Mode::Shared(42));
        // Words flow between threads of the same group.
        let w: Word = rx.recv().unwrap();
        let len = list::length(w);
        crate::cleanup();
        len
    });
    tx.send(keep).unwrap();
    assert_eq!(handle.join().unwrap(), 2);
    crate::release(keep);
    crate::cleanup();
}

fn pair_children(_data: &[u64]) -> Vec<usize> {
    vec![0, 1]
}

#[test]
fn test_custom_words() {
    with_session(|| {
        let tid = crate::register_word_type(crate::WordTypeDesc {
            name: "pair",
            free: None,
            children: Some(pair_children),
            rope: None,
        });
        let w = crate::new_custom_word(tid, 1);
        assert_eq!(crate::word_type(w), WordType::Custom);
        let a = list::new(&[Word::new_int(5)]);
        crate::set_custom_data(w, 0, a.0 as u64);
        crate::declare_child(w, a);
        crate::preserve(w);
        for _ in 0..200 {
            let junk: Vec<Word> = (0..100).map(Word::new_int).collect();
            let _ = list::new(&junk);
        }
        // The child list survived through the custom children proc.
        let a = Word(crate::custom_data(w, 0) as usize);
        assert_eq!(list::at(a, 0).int_value(), 5);
        crate::release(w);
    });
}
