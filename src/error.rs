use std::any::Any;
use std::error;
use std::fmt;

/// What a completed switch hands back: the `(isError, value)` pair of the
/// protocol, with `None` standing for the empty value.
pub type Outcome<V> = Result<Option<V>, Fault<V>>;

/// Error side of a switch. Faults travel between continuations as data;
/// nothing unwinds across a switch boundary.
pub enum Fault<V> {
    /// The switch subject already ran to completion.
    AlreadyFinished,
    /// A non-empty value was sent to a continuation that never started.
    /// The continuation is consumed without running.
    InvalidResumeValue,
    /// An error value raised inside a continuation body, forwarded verbatim
    /// to whoever was waiting.
    Raised(V),
    /// A continuation body panicked; the panic payload is carried across
    /// the switch boundary instead of unwinding through it.
    Panicked(Box<dyn Any + Send + 'static>),
    /// The continuation was torn down while this side was waiting on it.
    Destroyed,
}

impl<V: fmt::Debug> fmt::Debug for Fault<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fault::AlreadyFinished => f.write_str("AlreadyFinished"),
            Fault::InvalidResumeValue => f.write_str("InvalidResumeValue"),
            Fault::Raised(value) => f.debug_tuple("Raised").field(value).finish(),
            Fault::Panicked(_) => f.write_str("Panicked(..)"),
            Fault::Destroyed => f.write_str("Destroyed"),
        }
    }
}

impl<V> fmt::Display for Fault<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fault::AlreadyFinished => f.write_str("continuation already finished"),
            Fault::InvalidResumeValue => {
                f.write_str("can't send a non-empty value to a just-started continuation")
            }
            Fault::Raised(_) => f.write_str("error raised inside a continuation"),
            Fault::Panicked(_) => f.write_str("continuation body panicked"),
            Fault::Destroyed => f.write_str("continuation destroyed while in use"),
        }
    }
}

impl<V: PartialEq> PartialEq for Fault<V> {
    fn eq(&self, other: &Fault<V>) -> bool {
        match (self, other) {
            (Fault::AlreadyFinished, Fault::AlreadyFinished) => true,
            (Fault::InvalidResumeValue, Fault::InvalidResumeValue) => true,
            (Fault::Destroyed, Fault::Destroyed) => true,
            (Fault::Raised(a), Fault::Raised(b)) => a == b,
            // Panic payloads are opaque and never compare equal.
            _ => false,
        }
    }
}

impl<V: fmt::Debug> error::Error for Fault<V> {}
