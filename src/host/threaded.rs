use std::collections::HashSet;
use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::ThreadId;

use crossbeam::channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};

use super::{Abandoned, Host, Target};

/// Reference host: every chain is an operating system thread parked on a
/// channel.
///
/// This emulates the opaque suspend/resume primitive without any assembler:
/// a chain suspends by blocking on a capacity-1 channel and is reactivated
/// by a send to it. A run token keeps execution cooperative: a chain holds
/// it from the moment it wakes until its next suspension, so at most one
/// chain runs between suspension points no matter how wake-ups interleave.
///
/// Snapshot tokens stand in for interpreter-private state. They are
/// use-once: restoring a token twice, or one this host never issued, is a
/// protocol violation and panics rather than limp along with corrupt state.
pub struct ThreadHost {
    run: Arc<RunToken>,
    live_snapshots: Mutex<HashSet<u64>>,
    next_snapshot: AtomicU64,
}

/// Use-once execution state token. Deliberately neither `Clone` nor `Copy`.
pub struct SnapshotToken(u64);

/// Binary run permit with holder identity. The driving thread enters the
/// engine without ever having acquired it, so release is a no-op for
/// non-holders; from its first wake-up onward every chain participates.
struct RunToken {
    holder: Mutex<Option<ThreadId>>,
    turned: Condvar,
}

impl RunToken {
    fn new() -> RunToken {
        RunToken {
            holder: Mutex::new(None),
            turned: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut holder = self.holder.lock();
        while holder.is_some() {
            self.turned.wait(&mut holder);
        }
        *holder = Some(thread::current().id());
    }

    fn release(&self) {
        let mut holder = self.holder.lock();
        if *holder == Some(thread::current().id()) {
            *holder = None;
            self.turned.notify_one();
        }
    }
}

impl ThreadHost {
    pub fn new() -> ThreadHost {
        ThreadHost {
            run: Arc::new(RunToken::new()),
            live_snapshots: Mutex::new(HashSet::new()),
            next_snapshot: AtomicU64::new(0),
        }
    }
}

impl Default for ThreadHost {
    fn default() -> ThreadHost {
        ThreadHost::new()
    }
}

impl<P: Send + 'static> Host<P> for ThreadHost {
    type ResumePoint = Sender<P>;
    type Snapshot = SnapshotToken;

    fn capture_execution_state(&self) -> SnapshotToken {
        let id = self.next_snapshot.fetch_add(1, Ordering::Relaxed);
        self.live_snapshots.lock().insert(id);
        SnapshotToken(id)
    }

    fn restore_execution_state(&self, token: SnapshotToken) {
        if !self.live_snapshots.lock().remove(&token.0) {
            panic!(
                "execution snapshot {} is stale or foreign; aborting instead of corrupting state",
                token.0
            );
        }
    }

    fn activate(&self, target: Target<Sender<P>, P>, payload: P) {
        match target {
            Target::Parked(point) => {
                // The receiver is gone only if its chain was already torn
                // down; the payload is dropped with it.
                let _ = point.send(payload);
            }
            Target::Entry(entry) => {
                let token = Arc::clone(&self.run);
                thread::Builder::new()
                    .name("greenstack-chain".into())
                    .spawn(move || {
                        token.acquire();
                        entry(payload);
                        token.release();
                    })
                    .expect("failed to spawn a continuation chain");
            }
        }
    }

    fn suspend_and_resume(
        &self,
        publish: &mut dyn FnMut(Sender<P>),
        target: Target<Sender<P>, P>,
        payload: P,
    ) -> P {
        let (point, parked) = bounded(1);
        publish(point);
        self.activate(target, payload);
        // The handoff is published; this chain's turn is over.
        self.run.release();
        let payload = match parked.recv() {
            Ok(payload) => payload,
            Err(_) => {
                // Every sender is gone: the engine was dropped while this
                // chain was parked. Unwind to the chain boundary.
                self.run.acquire();
                panic::panic_any(Abandoned)
            }
        };
        self.run.acquire();
        payload
    }
}
