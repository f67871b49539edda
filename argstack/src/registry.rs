//! Registry of argument stack windows that are at least partially resident.
//!
//! The registry lists a window for every suspended continuation that still
//! occupies argument stack memory, except the one currently executing. The
//! entries are sorted by `stop` descending: earlier entries claim addresses
//! further from the growth origin ("older", outer chains), later entries
//! closer to it ("newer", inner chains). Restoring a window may need to
//! displace other continuations' bytes, and the sort order guarantees that
//! only a suffix of the list can conflict, so each restore visits every
//! entry at most once.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::window::StackWindow;
use crate::StackMemory;

/// A window shared between the registry and the suspended chain that owns
/// it. The scheduler lock of the engine serializes all access; the mutex
/// only makes the sharing safe to express.
pub type SharedWindow = Arc<Mutex<StackWindow>>;

/// Ordered registry of resident windows plus the engine's stack registers.
///
/// `stack_stop` tracks the stack pointer value the running chain had when it
/// was entered; a window captured at suspend time spans from the current
/// stack pointer up to this mark.
pub struct WindowRegistry {
    entries: Vec<SharedWindow>,
    stack_stop: usize,
}

impl WindowRegistry {
    pub fn new(stack_stop: usize) -> WindowRegistry {
        WindowRegistry {
            entries: Vec::new(),
            stack_stop,
        }
    }

    pub fn stack_stop(&self) -> usize {
        self.stack_stop
    }

    /// Number of windows currently tracked.
    pub fn resident_count(&self) -> usize {
        self.entries.len()
    }

    /// A fresh chain starts claiming memory below the current stack pointer.
    pub fn begin_chain(&mut self, sp: usize) {
        self.stack_stop = sp;
    }

    /// Capture the running chain's window just before it suspends and track
    /// it if it occupies any memory. This is the pre-suspend hook of the
    /// native suspend primitive.
    pub fn suspend_current<M: StackMemory>(&mut self, mem: &M, owner: u64) -> SharedWindow {
        let window = StackWindow::capture(mem.stack_pointer(), self.stack_stop, owner);
        let shared = Arc::new(Mutex::new(window));
        if shared.lock().claims_memory() {
            self.track(Arc::clone(&shared));
        }
        shared
    }

    /// Append a suspended window as the new innermost entry.
    ///
    /// The newly suspended chain always ran below every tracked window, so
    /// an append keeps the registry sorted; anything else means two chains
    /// claimed the same addresses and the memory is already corrupt.
    pub fn track(&mut self, window: SharedWindow) {
        {
            let w = window.lock();
            debug_assert!(w.claims_memory());
            if let Some(last) = self.entries.last() {
                // Claims may overlap once a straddling window was partially
                // evicted; the resident portions never do.
                let prev = last.lock();
                assert!(
                    prev.resident_start() >= w.stop(),
                    "argument stack windows overlap: [{:#x}, {:#x}) tracked under resident [{:#x}, {:#x})",
                    w.start(),
                    w.stop(),
                    prev.resident_start(),
                    prev.stop()
                );
            }
        }
        self.entries.push(window);
    }

    /// Put the argument stack into the state `current`'s chain expects.
    ///
    /// Every byte of `[current.start, current.stop)` holds exactly what that
    /// chain last wrote there once this returns. Returns the number of bytes
    /// moved, for diagnostics.
    pub fn restore<M: StackMemory>(&mut self, mem: &mut M, current: &SharedWindow) -> usize {
        let (start, stop) = {
            let w = current.lock();
            (w.start(), w.stop())
        };
        let mut moved = 0;

        // Entries whose claim lies entirely below the reclaimed region are
        // displaced in full, innermost first.
        while let Some(last) = self.entries.last() {
            if last.lock().stop() >= stop {
                break;
            }
            let evictee = self.entries.pop().unwrap();
            moved += evictee.lock().save_all(mem);
        }

        // At most one more window can straddle the boundary; displace only
        // its overlapping suffix.
        if let Some(last) = self.entries.last() {
            if !Arc::ptr_eq(last, current) {
                moved += last.lock().save_up_to(mem, stop);
            }
            // A fully consumed straddler leaves the registry, and so does
            // `current` itself if it was still listed.
            if last.lock().stop() == stop {
                self.entries.pop();
            }
        }

        moved += current.lock().restore_into(mem);

        self.stack_stop = stop;
        // The stack pointer write is the last step of a restore.
        mem.set_stack_pointer(start);
        log::trace!(
            "restored window [{:#x}, {:#x}), moved {} bytes, {} still resident",
            start,
            stop,
            moved,
            self.entries.len()
        );
        moved
    }

    /// Drop every window captured for a torn-down continuation.
    pub fn discard_owner(&mut self, owner: u64) {
        self.entries.retain(|w| w.lock().owner() != owner);
    }
}
