use argstack::{HeapStack, StackMemory, WindowRegistry};

#[test]
fn push_and_read_back() {
    let mut mem = HeapStack::new(256);
    let addr = mem.push_bytes(&[7; 32]);
    assert_eq!(addr, 224);
    assert_eq!(mem.stack_pointer(), 224);
    assert_eq!(mem.copy_bytes(addr..addr + 32), vec![7; 32]);
}

#[test]
fn zero_size_window_is_never_tracked() {
    let mem = HeapStack::new(256);
    let mut reg = WindowRegistry::new(mem.stack_pointer());
    let win = reg.suspend_current(&mem, 1);
    assert!(!win.lock().claims_memory());
    assert_eq!(reg.resident_count(), 0);
}

// Two chains reuse the same addresses; each one reads back exactly the bytes
// it wrote even though the other clobbered the region in between.
#[test]
fn evict_and_restore_round_trip() {
    let mut mem = HeapStack::new(1024);
    let mut reg = WindowRegistry::new(mem.stack_pointer());

    // The driving chain owns no bytes yet and switches away.
    let win_main = reg.suspend_current(&mem, 0);
    assert_eq!(reg.resident_count(), 0);

    // First chain claims 64 bytes and suspends.
    reg.begin_chain(mem.stack_pointer());
    let a_addr = mem.push_bytes(&[0xAA; 64]);
    let win_a = reg.suspend_current(&mem, 1);
    assert_eq!(reg.resident_count(), 1);

    // Driver resumes: the whole first window conflicts and is displaced.
    let moved = reg.restore(&mut mem, &win_main);
    assert_eq!(moved, 64);
    assert_eq!(reg.resident_count(), 0);
    assert!(!win_a.lock().is_resident());
    assert_eq!(win_a.lock().evicted_len(), 64);
    assert_eq!(mem.stack_pointer(), 1024);

    // Second chain scribbles over the same region and suspends.
    reg.begin_chain(mem.stack_pointer());
    let b_addr = mem.push_bytes(&[0xBB; 64]);
    assert_eq!(b_addr, a_addr);
    let win_b = reg.suspend_current(&mem, 2);

    // First chain comes back: the second window is displaced and the first
    // chain's bytes reappear untouched.
    let moved = reg.restore(&mut mem, &win_a);
    assert_eq!(moved, 64 + 64); // second window out, first window in
    assert!(win_a.lock().is_resident());
    assert_eq!(mem.copy_bytes(a_addr..a_addr + 64), vec![0xAA; 64]);
    assert_eq!(mem.stack_pointer(), a_addr);

    // And symmetrically for the second chain.
    let win_a = reg.suspend_current(&mem, 1);
    let moved = reg.restore(&mut mem, &win_b);
    assert_eq!(moved, 64 + 64);
    assert_eq!(mem.copy_bytes(b_addr..b_addr + 64), vec![0xBB; 64]);
    drop(win_a);
}

#[test]
fn restore_is_idempotent() {
    let mut mem = HeapStack::new(512);
    let mut reg = WindowRegistry::new(mem.stack_pointer());

    reg.begin_chain(mem.stack_pointer());
    mem.push_bytes(&[1, 2, 3, 4]);
    let win = reg.suspend_current(&mem, 1);

    let first = reg.restore(&mut mem, &win);
    assert_eq!(first, 0); // still resident, nothing conflicted
    let sp = mem.stack_pointer();
    let stop = reg.stack_stop();

    let second = reg.restore(&mut mem, &win);
    assert_eq!(second, 0);
    assert_eq!(mem.stack_pointer(), sp);
    assert_eq!(reg.stack_stop(), stop);
}

// An outer chain that ran deeper into addresses an inner chain claimed gets
// only its overlapping suffix displaced, and the eviction extent never
// shrinks afterwards.
#[test]
fn straddling_window_is_partially_evicted() {
    let mut mem = HeapStack::new(1024);
    let mut reg = WindowRegistry::new(mem.stack_pointer());

    // Outer chain writes 124 bytes, then spawns an inner chain.
    let e1_addr = mem.push_bytes(&[0xE1; 124]);
    assert_eq!(e1_addr, 900);
    let win_e = reg.suspend_current(&mem, 1);

    reg.begin_chain(mem.stack_pointer());
    let c_addr = mem.push_bytes(&[0xC1; 64]);
    assert_eq!(c_addr, 836);
    let win_c = reg.suspend_current(&mem, 2);

    // Outer resumes (inner window is fully displaced), then runs 50 bytes
    // deeper into the inner chain's old claim and suspends again.
    reg.restore(&mut mem, &win_e);
    assert!(!win_c.lock().is_resident());
    mem.push_bytes(&[0xE2; 50]);
    let win_e = reg.suspend_current(&mem, 1);
    assert_eq!(win_e.lock().start(), 850);

    // Inner chain resumes: only the outer window's 50-byte suffix moves.
    let moved = reg.restore(&mut mem, &win_c);
    assert_eq!(moved, 50 + 64);
    assert_eq!(win_e.lock().evicted_len(), 50);
    assert_eq!(win_e.lock().resident_start(), 900);
    assert_eq!(reg.resident_count(), 1); // straddler stays tracked
    assert_eq!(mem.copy_bytes(c_addr..c_addr + 64), vec![0xC1; 64]);

    // Monotonic growth: restoring the same window again moves nothing and
    // the straddler's eviction extent is unchanged.
    assert_eq!(reg.restore(&mut mem, &win_c), 0);
    assert_eq!(win_e.lock().evicted_len(), 50);

    // The outer chain still sees every byte it wrote, from both writes.
    let win_c = reg.suspend_current(&mem, 2);
    let moved = reg.restore(&mut mem, &win_e);
    assert!(moved >= 50);
    assert_eq!(mem.copy_bytes(850..900), vec![0xE2; 50]);
    assert_eq!(mem.copy_bytes(900..1024), vec![0xE1; 124]);
    drop(win_c);
}

#[test]
fn discard_owner_drops_windows() {
    let mut mem = HeapStack::new(512);
    let mut reg = WindowRegistry::new(mem.stack_pointer());

    mem.push_bytes(&[1; 16]);
    reg.suspend_current(&mem, 1);
    reg.begin_chain(mem.stack_pointer());
    mem.push_bytes(&[2; 16]);
    reg.suspend_current(&mem, 2);

    assert_eq!(reg.resident_count(), 2);
    reg.discard_owner(1);
    assert_eq!(reg.resident_count(), 1);
    reg.discard_owner(2);
    assert_eq!(reg.resident_count(), 0);
}
