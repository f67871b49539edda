use std::fmt;
use std::sync::Arc;

use argstack::StackMemory;

use crate::error::{Fault, Outcome};
use crate::host::Host;
use crate::switcher::{self, Shared, Switcher};

/// Handle to one logical thread multiplexed over the native call stack.
///
/// A continuation is created unstarted with a body; the first switch into
/// it runs the body on a fresh chain. Handles are cheap to clone and
/// compare by identity. The body itself receives a handle to its own
/// continuation, which is how it yields values back out.
pub struct Continuation<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    pub(crate) shared: Arc<Shared<V, M, H>>,
    pub(crate) id: u64,
}

impl<V, M, H> Continuation<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    /// Create a new continuation from a body closure. The body does not run
    /// until the first switch into the continuation.
    pub fn new<F>(switcher: &Switcher<V, M, H>, body: F) -> Continuation<V, M, H>
    where
        F: FnOnce(Continuation<V, M, H>) -> Outcome<V> + Send + 'static,
    {
        switcher.create(Box::new(body))
    }

    /// Switch into this continuation, sending `value`, and block
    /// cooperatively until a result is produced for the calling chain.
    ///
    /// Starts the body if it never ran (in which case only `None` is a
    /// valid value to send). From inside the body, switching on the own
    /// handle yields `value` to whoever resumed the continuation last.
    pub fn switch(&self, value: Option<V>) -> Outcome<V> {
        switcher::switch(&self.shared, self.id, Ok(value), None)
    }

    /// Like [switch](#method.switch), but sends an error pair. The target's
    /// suspended switch call returns `Err(Fault::Raised(error))`.
    pub fn throw(&self, error: V) -> Outcome<V> {
        switcher::switch(&self.shared, self.id, Err(Fault::Raised(error)), None)
    }

    /// Switch into `to`, re-threading this continuation's pending resume
    /// path onto it. A never-started `self` is queued to run once `to`
    /// next produces an empty result. A `to` handle from a different
    /// engine degrades to a plain switch.
    pub fn switch_to(&self, value: Option<V>, to: &Continuation<V, M, H>) -> Outcome<V> {
        let to_id = if Arc::ptr_eq(&self.shared, &to.shared) {
            Some(to.id)
        } else {
            None
        };
        switcher::switch(&self.shared, self.id, Ok(value), to_id)
    }

    /// True once the body has been started (or the continuation is gone).
    pub fn started(&self) -> bool {
        switcher::started(&self.shared, self.id)
    }

    /// True once the continuation ran to completion or was torn down.
    pub fn finished(&self) -> bool {
        switcher::finished(&self.shared, self.id)
    }

    /// True while the continuation can still be switched into.
    pub fn is_pending(&self) -> bool {
        switcher::is_pending(&self.shared, self.id)
    }

    /// Tear the continuation down: mark it finished, drop its argument
    /// stack windows, and release whichever side was left waiting on it
    /// with [Fault::Destroyed](enum.Fault.html). Returns false if it was
    /// already gone or is the chain currently running.
    pub fn destroy(&self) -> bool {
        switcher::destroy(&self.shared, self.id)
    }
}

impl<V, M, H> Clone for Continuation<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    fn clone(&self) -> Continuation<V, M, H> {
        Continuation {
            shared: Arc::clone(&self.shared),
            id: self.id,
        }
    }
}

impl<V, M, H> PartialEq for Continuation<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    fn eq(&self, other: &Continuation<V, M, H>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) && self.id == other.id
    }
}

impl<V, M, H> Eq for Continuation<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
}

impl<V, M, H> fmt::Debug for Continuation<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Continuation").field(&self.id).finish()
    }
}
