use std::collections::HashMap;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use argstack::{StackMemory, WindowRegistry};
use parking_lot::Mutex;

use crate::continuation::Continuation;
use crate::error::{Fault, Outcome};
use crate::host::{Abandoned, Entry, Host, Target};

/// Id of the root handle. The driving chain is not a continuation of this
/// engine; switches on the root handle collapse onto their target.
pub(crate) const ROOT_ID: u64 = 0;

type Body<V, M, H> = Box<dyn FnOnce(Continuation<V, M, H>) -> Outcome<V> + Send + 'static>;

/// What a continuation will do with the next result produced through it.
///
/// Every switch into a continuation takes the slot and installs the
/// caller's parked chain in its place, so results drain in the order the
/// switches were issued.
enum Pending<R> {
    /// Nothing is waiting.
    Idle,
    /// A parked chain waits for the next result.
    Awaiting(R),
    /// A never-started continuation queued to run once this slot fires
    /// with an empty value.
    Chained(u64),
}

impl<R> Pending<R> {
    fn take(&mut self) -> Pending<R> {
        mem::replace(self, Pending::Idle)
    }
}

struct ContState<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    body: Option<Body<V, M, H>>,
    pending: Pending<H::ResumePoint>,
    started: bool,
}

pub(crate) struct Core<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    conts: HashMap<u64, ContState<V, M, H>>,
    next_id: u64,
    registry: WindowRegistry,
    mem: M,
    /// Continuation whose chain is executing right now.
    current: u64,
    /// Teardown deliveries, handed to the host at the next transfer so the
    /// released chain reschedules cooperatively.
    deferred: Vec<(H::ResumePoint, Outcome<V>)>,
}

pub(crate) struct Shared<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    host: H,
    core: Mutex<Core<V, M, H>>,
}

/// The scheduler context: owns the argument stack, the window registry and
/// every continuation, and implements the switch protocol over an injected
/// [Host](host/trait.Host.html).
pub struct Switcher<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    shared: Arc<Shared<V, M, H>>,
}

impl<V, M, H> Switcher<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    pub fn new(mem: M, host: H) -> Switcher<V, M, H> {
        let registry = WindowRegistry::new(mem.stack_pointer());
        Switcher {
            shared: Arc::new(Shared {
                host,
                core: Mutex::new(Core {
                    conts: HashMap::new(),
                    next_id: ROOT_ID + 1,
                    registry,
                    mem,
                    current: ROOT_ID,
                    deferred: Vec::new(),
                }),
            }),
        }
    }

    /// Handle standing for the driving chain. It is not a continuation of
    /// this engine: switching on it degrades per the protocol (an explicit
    /// target becomes the subject, otherwise the switch resolves onto
    /// itself immediately).
    pub fn root(&self) -> Continuation<V, M, H> {
        Continuation {
            shared: Arc::clone(&self.shared),
            id: ROOT_ID,
        }
    }

    /// Run `f` against the argument stack memory. This is how continuation
    /// bodies claim and read back explicit stack bytes.
    pub fn with_stack<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        let mut core = self.shared.core.lock();
        f(&mut core.mem)
    }

    /// Windows currently resident in the registry (diagnostic).
    pub fn resident_windows(&self) -> usize {
        self.shared.core.lock().registry.resident_count()
    }

    pub(crate) fn create(&self, body: Body<V, M, H>) -> Continuation<V, M, H> {
        let mut core = self.shared.core.lock();
        let id = core.next_id;
        core.next_id += 1;
        core.conts.insert(
            id,
            ContState {
                body: Some(body),
                pending: Pending::Idle,
                started: false,
            },
        );
        log::debug!("continuation {} created", id);
        Continuation {
            shared: Arc::clone(&self.shared),
            id,
        }
    }
}

impl<V, M> Switcher<V, M, crate::host::threaded::ThreadHost>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
{
    /// Engine over the reference thread-per-chain host.
    pub fn threaded(mem: M) -> Switcher<V, M, crate::host::threaded::ThreadHost> {
        Switcher::new(mem, crate::host::threaded::ThreadHost::new())
    }
}

impl<V, M, H> Clone for Switcher<V, M, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    fn clone(&self) -> Switcher<V, M, H> {
        Switcher {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Resolution of the locked part of a switch.
enum Action<V, H>
where
    V: Send + 'static,
    H: Host<Outcome<V>>,
{
    /// Resolved without leaving the calling chain.
    Immediate(Outcome<V>),
    /// Park the calling chain and activate the target.
    Transfer(Target<H::ResumePoint, Outcome<V>>, Outcome<V>),
}

/// Resolution of a payload delivery into a pending slot.
enum Delivery<V, H>
where
    V: Send + 'static,
    H: Host<Outcome<V>>,
{
    Activate(Target<H::ResumePoint, Outcome<V>>, Outcome<V>),
    /// Nothing was waiting; the payload comes back to the caller (or is
    /// discarded by completion).
    Dropped(Outcome<V>),
}

/// The switch protocol entry point. `subject` is the continuation the
/// switch was invoked on; `to` an optional explicit target of the same
/// engine.
pub(crate) fn switch<V, M, H>(
    shared: &Arc<Shared<V, M, H>>,
    mut subject: u64,
    payload: Outcome<V>,
    mut to: Option<u64>,
) -> Outcome<V>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    // Switching to self resolves immediately; no stack work happens.
    if to == Some(subject) {
        return payload;
    }
    // The root handle is not a continuation: as a target it means "no
    // explicit target", as a subject the switch collapses onto the target.
    if to == Some(ROOT_ID) {
        to = None;
    }
    if subject == ROOT_ID {
        match to.take() {
            Some(target) => subject = target,
            None => return payload,
        }
    }

    let action = {
        let mut core = shared.core.lock();
        resolve_switch(&mut *core, shared, subject, to, payload)
    };
    match action {
        Action::Immediate(outcome) => outcome,
        Action::Transfer(target, payload) => transfer(shared, subject, target, payload),
    }
}

fn resolve_switch<V, M, H>(
    core: &mut Core<V, M, H>,
    shared: &Arc<Shared<V, M, H>>,
    subject: u64,
    to: Option<u64>,
    payload: Outcome<V>,
) -> Action<V, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    // Finished subjects and targets are terminal.
    if !core.conts.contains_key(&subject) {
        return Action::Immediate(Err(Fault::AlreadyFinished));
    }
    if let Some(target) = to {
        if !core.conts.contains_key(&target) {
            return Action::Immediate(Err(Fault::AlreadyFinished));
        }
    }

    let slot_owner = to.unwrap_or(subject);

    // A continuation that never ran accepts only the empty value as its
    // first input; anything else consumes it before any slot changes.
    {
        let state = &core.conts[&slot_owner];
        if !state.started && matches!(state.pending, Pending::Idle) {
            match payload {
                Ok(None) => {}
                Ok(Some(_)) => {
                    core.conts.remove(&slot_owner);
                    log::debug!(
                        "continuation {} consumed by a non-empty first resume value",
                        slot_owner
                    );
                    return Action::Immediate(Err(Fault::InvalidResumeValue));
                }
                Err(fault) => {
                    core.conts.remove(&slot_owner);
                    log::debug!("continuation {} consumed by a thrown error", slot_owner);
                    return Action::Immediate(Err(fault));
                }
            }
        }
    }

    let slot = core
        .conts
        .get_mut(&slot_owner)
        .expect("slot owner vanished")
        .pending
        .take();

    // An explicit target inherits the subject's pending resume path; a
    // subject that never ran threads itself behind the target instead
    // (queued lazy start).
    if let Some(target) = to {
        let moved = {
            let subject_state = core.conts.get_mut(&subject).expect("subject vanished");
            match subject_state.pending.take() {
                Pending::Idle if !subject_state.started => Pending::Chained(subject),
                other => other,
            }
        };
        core.conts.get_mut(&target).expect("target vanished").pending = moved;
    }

    match resolve_delivery(core, shared, slot, payload, Some(slot_owner)) {
        Delivery::Activate(target, payload) => Action::Transfer(target, payload),
        // Nobody can ever answer this switch; hand the payload back instead
        // of parking the caller forever.
        Delivery::Dropped(payload) => Action::Immediate(payload),
    }
}

/// Deliver `payload` into a taken pending slot, following chained lazy
/// starts. `fresh` names the slot owner when an `Idle` slot means "never
/// started, run the body now" rather than "nothing is waiting".
fn resolve_delivery<V, M, H>(
    core: &mut Core<V, M, H>,
    shared: &Arc<Shared<V, M, H>>,
    mut slot: Pending<H::ResumePoint>,
    mut payload: Outcome<V>,
    fresh: Option<u64>,
) -> Delivery<V, H>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    let mut fresh = fresh;
    loop {
        match slot {
            Pending::Awaiting(point) => {
                return Delivery::Activate(Target::Parked(point), payload);
            }
            Pending::Idle => {
                if let Some(id) = fresh {
                    let state = core.conts.get_mut(&id).expect("fresh state vanished");
                    debug_assert!(!state.started, "idle slot on a started continuation");
                    state.started = true;
                    let body = state.body.take().expect("continuation body already taken");
                    log::debug!("continuation {} starting", id);
                    return Delivery::Activate(Target::Entry(make_entry(shared, id, body)), payload);
                }
                log::warn!("continuation result dropped: nothing is waiting for it");
                return Delivery::Dropped(payload);
            }
            Pending::Chained(id) => {
                fresh = None;
                if !core.conts.contains_key(&id) {
                    log::warn!("chained continuation {} is gone; dropping the result", id);
                    return Delivery::Dropped(payload);
                }
                match payload {
                    Ok(None) => {
                        let state = core.conts.get_mut(&id).expect("chained state vanished");
                        state.started = true;
                        let body = state.body.take().expect("continuation body already taken");
                        log::debug!("continuation {} starting (chained)", id);
                        return Delivery::Activate(
                            Target::Entry(make_entry(shared, id, body)),
                            Ok(None),
                        );
                    }
                    other => {
                        // A queued start accepts only the empty value; the
                        // queued continuation is consumed and the (possibly
                        // rewritten) error moves down the chain.
                        let state = core.conts.get_mut(&id).expect("chained state vanished");
                        let next = state.pending.take();
                        core.conts.remove(&id);
                        log::debug!("chained continuation {} consumed", id);
                        payload = match other {
                            Ok(Some(_)) => Err(Fault::InvalidResumeValue),
                            Err(fault) => Err(fault),
                            Ok(None) => unreachable!(),
                        };
                        slot = next;
                    }
                }
            }
        }
    }
}

fn make_entry<V, M, H>(
    shared: &Arc<Shared<V, M, H>>,
    id: u64,
    body: Body<V, M, H>,
) -> Entry<Outcome<V>>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    let shared = Arc::clone(shared);
    Box::new(move |first: Outcome<V>| {
        // The first resume input was validated before the transfer.
        drop(first);
        run_chain(shared, id, body);
    })
}

/// Body of a fresh chain: establish the chain's stack claim, run the
/// continuation body with panics contained, deliver the result.
fn run_chain<V, M, H>(shared: Arc<Shared<V, M, H>>, id: u64, body: Body<V, M, H>)
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    {
        let mut core = shared.core.lock();
        let core = &mut *core;
        core.current = id;
        let sp = core.mem.stack_pointer();
        core.registry.begin_chain(sp);
    }
    let handle = Continuation {
        shared: Arc::clone(&shared),
        id,
    };
    let outcome = match catch_unwind(AssertUnwindSafe(move || body(handle))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            if panic.downcast_ref::<Abandoned>().is_some() {
                // Parked chain of a dropped engine; nothing left to tell.
                return;
            }
            Err(Fault::Panicked(panic))
        }
    };
    complete(&shared, id, outcome);
}

/// Deliver a finished continuation's outcome and tear its entry down.
fn complete<V, M, H>(shared: &Arc<Shared<V, M, H>>, id: u64, outcome: Outcome<V>)
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    let (drained, delivery) = {
        let mut core = shared.core.lock();
        let state = match core.conts.remove(&id) {
            Some(state) => state,
            None => {
                // Torn down while running; the outcome has no audience.
                log::debug!("continuation {} finished after teardown", id);
                return;
            }
        };
        log::debug!("continuation {} finished", id);
        let delivery = resolve_delivery(&mut *core, shared, state.pending, outcome, None);
        (mem::take(&mut core.deferred), delivery)
    };
    for (point, payload) in drained {
        shared.host.activate(Target::Parked(point), payload);
    }
    match delivery {
        Delivery::Activate(target, payload) => shared.host.activate(target, payload),
        Delivery::Dropped(_) => {}
    }
}

/// Park the calling chain and transfer control. Runs the pre-suspend hooks
/// (snapshot + window capture) on the way out and the restore pass on the
/// way back in.
fn transfer<V, M, H>(
    shared: &Arc<Shared<V, M, H>>,
    subject: u64,
    target: Target<H::ResumePoint, Outcome<V>>,
    payload: Outcome<V>,
) -> Outcome<V>
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    let snapshot = shared.host.capture_execution_state();
    let (window, chain, drained) = {
        let mut core = shared.core.lock();
        let core = &mut *core;
        let window = core.registry.suspend_current(&core.mem, core.current);
        (window, core.current, mem::take(&mut core.deferred))
    };
    // Chains released by a teardown wake now, while this chain is parking.
    for (point, payload) in drained {
        shared.host.activate(Target::Parked(point), payload);
    }

    let back = shared.host.suspend_and_resume(
        &mut |point| {
            let mut core = shared.core.lock();
            if let Some(state) = core.conts.get_mut(&subject) {
                state.pending = Pending::Awaiting(point);
            }
        },
        target,
        payload,
    );

    // Incoming side: the argument stack must be ours again before anything
    // else can look at it. A chain whose continuation was torn down while
    // it was parked skips the restore and just winds down.
    let defunct = {
        let mut core = shared.core.lock();
        let core = &mut *core;
        let defunct = chain != ROOT_ID && !core.conts.contains_key(&chain);
        if !defunct {
            core.current = chain;
            core.registry.restore(&mut core.mem, &window);
        }
        defunct
    };
    shared.host.restore_execution_state(snapshot);
    if defunct {
        log::debug!("chain of torn-down continuation {} woke; winding down", chain);
        return Err(Fault::Destroyed);
    }
    back
}

/// Teardown. Releases whoever the pending slot left waiting with
/// `Fault::Destroyed`; the delivery itself happens at the next transfer so
/// the released chain reschedules cooperatively.
pub(crate) fn destroy<V, M, H>(shared: &Arc<Shared<V, M, H>>, id: u64) -> bool
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    if id == ROOT_ID {
        return false;
    }
    let mut core = shared.core.lock();
    if core.current == id {
        log::warn!("refusing to destroy the running continuation {}", id);
        return false;
    }
    let state = match core.conts.remove(&id) {
        Some(state) => state,
        None => return false,
    };
    core.registry.discard_owner(id);
    log::debug!("continuation {} destroyed", id);
    match state.pending {
        Pending::Idle => {}
        slot => {
            match resolve_delivery(&mut *core, shared, slot, Err(Fault::Destroyed), None) {
                Delivery::Activate(Target::Parked(point), payload) => {
                    core.deferred.push((point, payload));
                }
                // An error payload never starts a chained body.
                Delivery::Activate(Target::Entry(_), _) => unreachable!(),
                Delivery::Dropped(_) => {}
            }
        }
    }
    true
}

pub(crate) fn started<V, M, H>(shared: &Arc<Shared<V, M, H>>, id: u64) -> bool
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    match shared.core.lock().conts.get(&id) {
        Some(state) => state.started,
        None => true,
    }
}

pub(crate) fn finished<V, M, H>(shared: &Arc<Shared<V, M, H>>, id: u64) -> bool
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    id != ROOT_ID && !shared.core.lock().conts.contains_key(&id)
}

pub(crate) fn is_pending<V, M, H>(shared: &Arc<Shared<V, M, H>>, id: u64) -> bool
where
    V: Send + 'static,
    M: StackMemory + Send + 'static,
    H: Host<Outcome<V>>,
{
    shared.core.lock().conts.contains_key(&id)
}
