use crate::StackMemory;

/// One continuation's claim over the argument stack.
///
/// `start` is the stack pointer at the moment the continuation suspended,
/// `stop` the stack pointer value recorded when its chain was entered. The
/// claim is the half-open range `[start, stop)`. Any prefix of the claim may
/// have been displaced into the owned `evicted` buffer by another
/// continuation that needed the same addresses:
///
/// ```text
///                 |      ^^^      |
///                 |  older frames |
///    window.stop  |_______________|
///                 |               |
///                 |   resident    |
///                 |     bytes     |
///                 |_______________|  . . . ________  start + evicted.len()
///                 |               |      |        |
///                 |  displaced by |      | evicted|
///                 |    another    |      | buffer |
///   window.start  |_______________| . . .|________|  window.start
///                 |  newer frames |
///                 |      vvv      |
/// ```
///
/// The evicted extent only ever grows while the window sits in the registry;
/// it is cleared wholesale when the owning chain resumes.
pub struct StackWindow {
    start: usize,
    stop: usize,
    evicted: Vec<u8>,
    owner: u64,
}

impl StackWindow {
    pub(crate) fn capture(start: usize, stop: usize, owner: u64) -> StackWindow {
        assert!(
            start <= stop,
            "stack pointer {:#x} above chain entry mark {:#x}",
            start,
            stop
        );
        StackWindow {
            start,
            stop,
            evicted: Vec::new(),
            owner,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn stop(&self) -> usize {
        self.stop
    }

    /// Continuation this window was captured for.
    pub fn owner(&self) -> u64 {
        self.owner
    }

    /// True if no bytes have been displaced into the eviction buffer.
    pub fn is_resident(&self) -> bool {
        self.evicted.is_empty()
    }

    /// A window with `start == stop` occupies no argument stack bytes and is
    /// never tracked.
    pub fn claims_memory(&self) -> bool {
        self.start != self.stop
    }

    /// Bytes currently displaced into the eviction buffer.
    pub fn evicted_len(&self) -> usize {
        self.evicted.len()
    }

    /// Lowest address still resident on the argument stack. The claim below
    /// this mark lives in the eviction buffer and may be reused by others.
    pub fn resident_start(&self) -> usize {
        self.start + self.evicted.len()
    }

    /// Displace the resident bytes below `stop` into the eviction buffer.
    ///
    /// The buffer already covers `[start, start + evicted.len())`, so only
    /// the slice between that mark and `stop` moves; a boundary at or below
    /// the mark is a no-op. Returns the number of bytes moved.
    pub(crate) fn save_up_to<M: StackMemory>(&mut self, mem: &M, stop: usize) -> usize {
        let saved = self.evicted.len();
        let wanted = stop.saturating_sub(self.start);
        if wanted <= saved {
            return 0;
        }
        let segment = mem.copy_bytes(self.start + saved..self.start + wanted);
        self.evicted.extend_from_slice(&segment);
        wanted - saved
    }

    /// Displace the entire claim.
    pub(crate) fn save_all<M: StackMemory>(&mut self, mem: &M) -> usize {
        let stop = self.stop;
        self.save_up_to(mem, stop)
    }

    /// Copy the eviction buffer back to its place and drop it.
    pub(crate) fn restore_into<M: StackMemory>(&mut self, mem: &mut M) -> usize {
        if self.evicted.is_empty() {
            return 0;
        }
        mem.write_bytes(self.start, &self.evicted);
        let moved = self.evicted.len();
        self.evicted = Vec::new();
        moved
    }
}
