#![no_main]

use libfuzzer_sys::fuzz_target;

use pagebump_memory::{Arena, HeapRegion, ReportExhaustion, Shadow, ShadowPoisoner};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    // First two bytes pick the capacity, the rest are (size, align-exponent) pairs
    let capacity = usize::from(u16::from_le_bytes([data[0], data[1]])) % 8192;
    let shadow = ShadowPoisoner::new();
    let Ok(arena) = Arena::builder(capacity)
        .failure_handler(ReportExhaustion)
        .region::<HeapRegion>()
        .poisoner(shadow.clone())
        .build()
    else {
        return;
    };

    let mut last_end = 0usize;
    for pair in data[2..].chunks_exact(2) {
        let size = usize::from(pair[0]) * 4;
        let align = 1usize << (pair[1] % 8);
        let before = arena.remaining();
        match arena.alloc_raw(size, align) {
            Ok(ptr) => {
                let addr = ptr.as_ptr() as usize;
                assert_eq!(addr % align, 0);
                assert!(addr >= last_end);
                assert!(arena.owns(ptr.as_ptr()) || size == 0);
                assert!(shadow.range_is(ptr.as_ptr(), size, Shadow::Unpoisoned));
                last_end = addr + size;
            }
            Err(err) => {
                assert!(err.is_exhausted());
                assert_eq!(arena.remaining(), before);
            }
        }
        assert_eq!(arena.used() + arena.remaining(), capacity);
    }
});
