//! Integration tests across the memory crate and its consumers.

use std::sync::atomic::Ordering;
use std::thread;

use pagebump_lib::split::split_in_arena;
use pagebump_memory::{Arena, HeapRegion, Shadow, ShadowPoisoner};
use pagebump_tests::counting_arena;

#[test]
fn arenas_are_independent() {
    let (a, a_calls) = counting_arena(32).unwrap();
    let (b, b_calls) = counting_arena(32).unwrap();

    a.alloc_bytes(32, 1).unwrap();
    assert_eq!(a.remaining(), 0);
    assert_eq!(b.remaining(), 32);

    assert!(a.alloc_bytes(1, 1).is_err());
    assert_eq!(a_calls.load(Ordering::Relaxed), 1);
    assert_eq!(b_calls.load(Ordering::Relaxed), 0);

    let p = b.alloc_bytes(16, 8).unwrap().as_ptr();
    assert!(b.owns(p));
    assert!(!a.owns(p));
}

#[test]
fn one_arena_per_thread() {
    let results: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..8usize)
            .map(|i| {
                s.spawn(move || {
                    let (arena, calls) = counting_arena(4096).unwrap();
                    for n in 0..=i {
                        let v = arena.alloc(n as u64).unwrap();
                        assert_eq!(*v, n as u64);
                    }
                    assert_eq!(calls.load(Ordering::Relaxed), 0);
                    arena.used()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, used) in results.into_iter().enumerate() {
        assert!(used >= (i + 1) * 8, "thread {i} used {used}");
    }
}

#[test]
fn arena_moves_to_another_thread() {
    let (arena, calls) = counting_arena(128).unwrap();
    arena.alloc_bytes(100, 1).unwrap();

    let remaining = thread::spawn(move || {
        assert!(arena.alloc_bytes(64, 1).is_err());
        let left = arena.remaining();
        arena.release();
        left
    })
    .join()
    .unwrap();

    assert_eq!(remaining, 28);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn split_reports_exhaustion_through_handler() {
    let (arena, calls) = counting_arena(8).unwrap();
    let err = split_in_arena("far too many words here", " ", &arena).unwrap_err();
    assert!(err.is_exhausted());
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(arena.stats().exhaustions, 1);
}

#[test]
fn split_words_stay_valid_until_release() {
    let shadow = ShadowPoisoner::new();
    let arena = Arena::builder(1024)
        .region::<HeapRegion>()
        .poisoner(shadow.clone())
        .build()
        .unwrap();

    let words = split_in_arena("keep these words", " ", &arena).unwrap();
    assert_eq!(words, &["keep", "these", "words"]);
    for w in words {
        assert!(arena.owns(w.as_ptr()));
        assert!(shadow.range_is(w.as_ptr(), w.len(), Shadow::Unpoisoned));
    }

    let first = (words[0].as_ptr() as usize, words[0].len());
    arena.release();
    assert!(shadow.range_is(first.0 as *const u8, first.1, Shadow::Retired));
}
