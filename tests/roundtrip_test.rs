use argstack::{HeapStack, StackMemory};
use greenstack::{Continuation, Switcher};

// Three continuations claim the same argument stack region, suspend twice
// each in round-robin order, and every one reads back exactly the bytes it
// wrote, byte for byte.
#[test]
fn round_robin_round_trip() {
    let switcher: Switcher<u8, _, _> = Switcher::threaded(HeapStack::new(4096));

    let mut conts = Vec::new();
    for i in 0..3u8 {
        let sw = switcher.clone();
        conts.push(Continuation::new(&switcher, move |this| {
            let pattern = vec![0x10 + i, 0x20 + i, 0x30 + i, 0x40 + i]
                .into_iter()
                .cycle()
                .take(256)
                .collect::<Vec<u8>>();
            let addr = sw.with_stack(|mem| mem.push_bytes(&pattern));
            this.switch(None)?;
            this.switch(None)?;
            let bytes = sw.with_stack(|mem| mem.copy_bytes(addr..addr + 256));
            assert_eq!(bytes, pattern, "continuation {} lost its bytes", i);
            Ok(Some(i))
        }));
    }

    // Two suspensions each, round-robin, then the final results in order.
    for cont in &conts {
        assert_eq!(cont.switch(None), Ok(None));
    }
    for cont in &conts {
        assert_eq!(cont.switch(None), Ok(None));
    }
    for (i, cont) in conts.iter().enumerate() {
        assert_eq!(cont.switch(None), Ok(Some(i as u8)));
        assert!(cont.finished());
    }
    assert_eq!(switcher.resident_windows(), 0);
}

// An inner chain claims addresses directly below a live outer chain; the
// windows stay disjoint and both sides keep their bytes across suspensions.
#[test]
fn nested_chains_keep_disjoint_windows() {
    let switcher: Switcher<u8, _, _> = Switcher::threaded(HeapStack::new(4096));

    let sw = switcher.clone();
    let inner = Continuation::new(&switcher, move |this| {
        let addr = sw.with_stack(|mem| mem.push_bytes(&[0xCD; 64]));
        this.switch(None)?;
        let bytes = sw.with_stack(|mem| mem.copy_bytes(addr..addr + 64));
        assert_eq!(bytes, vec![0xCD; 64]);
        Ok(None)
    });

    let sw = switcher.clone();
    let inner_handle = inner.clone();
    let outer = Continuation::new(&switcher, move |this| {
        let addr = sw.with_stack(|mem| mem.push_bytes(&[0xAB; 128]));
        // Start the inner chain right below our claim; it yields back here.
        inner_handle.switch(None)?;
        let bytes = sw.with_stack(|mem| mem.copy_bytes(addr..addr + 128));
        assert_eq!(bytes, vec![0xAB; 128]);
        this.switch(None)?;
        let bytes = sw.with_stack(|mem| mem.copy_bytes(addr..addr + 128));
        assert_eq!(bytes, vec![0xAB; 128]);
        Ok(None)
    });

    assert_eq!(outer.switch(None), Ok(None)); // outer saw inner's yield, then parked
    assert_eq!(inner.switch(None), Ok(None)); // inner read its bytes and finished
    assert!(inner.finished());
    assert_eq!(outer.switch(None), Ok(None)); // outer read its bytes twice and finished
    assert!(outer.finished());
    assert_eq!(switcher.resident_windows(), 0);
}
