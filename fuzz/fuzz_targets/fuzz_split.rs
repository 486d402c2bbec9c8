#![no_main]

use libfuzzer_sys::fuzz_target;

use pagebump_lib::split::{count_words, required_capacity, split_in_arena};
use pagebump_memory::{Arena, ReportExhaustion};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let separators = " ,;\t\n";
    let capacity = required_capacity(text, separators);
    let Ok(arena) = Arena::with_failure_handler(capacity, ReportExhaustion) else {
        return;
    };

    // Sized by required_capacity, so the split must fit
    let words = split_in_arena(text, separators, &arena).expect("split should fit");
    assert_eq!(words.len(), count_words(text, separators));
    for word in words {
        assert!(!word.is_empty());
        assert!(!word.contains(|c: char| separators.contains(c)));
    }
});
