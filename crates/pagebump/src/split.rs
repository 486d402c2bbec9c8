//! Word splitting on top of an arena.
//!
//! The word table and a copy of the input both live in the arena, so the
//! result costs two bump allocations no matter how many words there are.

use std::mem;

use pagebump_memory::{Arena, ArenaError, Poisoner, Region};

/// Number of words in `text`: maximal runs of characters not in `separators`.
#[must_use]
pub fn count_words(text: &str, separators: &str) -> usize {
    text.split(|c: char| separators.contains(c))
        .filter(|w| !w.is_empty())
        .count()
}

/// Split `text` into words stored in `arena`.
///
/// Allocates a table of exactly as many `&str` as there are words, then a
/// copy of `text`, and points each table entry into the copy.
pub fn split_in_arena<'a, R: Region, P: Poisoner>(
    text: &str,
    separators: &str,
    arena: &'a Arena<R, P>,
) -> Result<&'a [&'a str], ArenaError> {
    let count = count_words(text, separators);
    let table: &'a mut [&'a str] = arena.alloc_slice_fill_with(count, |_| "")?;
    let copy: &'a str = arena.alloc_str(text)?;
    let words = copy
        .split(|c: char| separators.contains(c))
        .filter(|w| !w.is_empty());
    for (slot, word) in table.iter_mut().zip(words) {
        *slot = word;
    }
    Ok(table)
}

/// Arena bytes needed to split `text` starting from a fresh arena, assuming
/// the worst-case padding before the word table.
#[must_use]
pub fn required_capacity(text: &str, separators: &str) -> usize {
    let table = count_words(text, separators) * mem::size_of::<&str>();
    table + (mem::align_of::<&str>() - 1) + text.len()
}
