//! The opaque native call-stack multiplexing capability.
//!
//! The engine cannot inspect or relocate the native call stack; it can only
//! ask a host to park the running call chain and reactivate another one.
//! Everything the engine needs from that machinery is collected in the
//! [Host](trait.Host.html) trait so the switch protocol stays host-agnostic.
//! [threaded::ThreadHost](threaded/struct.ThreadHost.html) is the reference
//! implementation.

pub mod threaded;

/// First activation of a continuation body, boxed up to run on a fresh
/// chain. The argument is the payload of the switch that started it; it is
/// always the empty value, validated before the transfer.
pub type Entry<P> = Box<dyn FnOnce(P) + Send + 'static>;

/// Where a transfer lands.
pub enum Target<R, P> {
    /// A chain parked inside `suspend_and_resume`.
    Parked(R),
    /// A continuation body that has never run.
    Entry(Entry<P>),
}

/// Panic payload used to unwind a parked chain that can never be resumed
/// because its engine is gone. The chain boundary swallows it silently.
pub struct Abandoned;

/// Native call-stack suspend/resume, injected into the engine.
///
/// A host must guarantee exactly-once delivery: every resume point handed
/// out by `suspend_and_resume` is reactivated at most once, and a payload
/// delivered to it is observed by exactly one wake-up.
pub trait Host<P: Send + 'static>: Send + Sync + 'static {
    /// Handle to a parked chain; delivering a payload reactivates it.
    type ResumePoint: Send + 'static;
    /// Interpreter-private execution state captured around a suspension.
    type Snapshot: Send + 'static;

    /// Snapshot interpreter-private state just before suspending. The
    /// token must be restored exactly once.
    fn capture_execution_state(&self) -> Self::Snapshot;

    /// Reinstate a previously captured snapshot. A stale or foreign token
    /// is a protocol violation: the host must fail fatally rather than
    /// silently corrupt state.
    fn restore_execution_state(&self, token: Self::Snapshot);

    /// Activate `target` with `payload` without suspending the calling
    /// chain. Used for completion and teardown deliveries, where the
    /// calling chain is about to end or keeps running.
    fn activate(&self, target: Target<Self::ResumePoint, P>, payload: P);

    /// Park the calling chain: hand its resume point to `publish`, then
    /// activate `target` with `payload`, and block until a payload is
    /// delivered back to the published point. `publish` runs before the
    /// target can possibly execute.
    fn suspend_and_resume(
        &self,
        publish: &mut dyn FnMut(Self::ResumePoint),
        target: Target<Self::ResumePoint, P>,
        payload: P,
    ) -> P;
}
