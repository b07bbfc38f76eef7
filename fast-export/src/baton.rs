//! A cooperative cancellation flag for long-running repository mutations: a caller on
//! another thread trips it with [`Baton::cancel`]; the operation holding it polls
//! [`Baton::is_cancelled`] between units of work and aborts as soon as it sees it tripped.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct Baton(AtomicBool);

impl Baton {
    pub fn new() -> Baton {
        Baton::default()
    }

    /// Requests that the operation holding this baton abort at its next check-in.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled_and_trips_on_cancel() {
        let baton = Baton::new();
        assert!(!baton.is_cancelled());
        baton.cancel();
        assert!(baton.is_cancelled());
    }

    #[test]
    fn default_is_uncancelled() {
        assert!(!Baton::default().is_cancelled());
    }
}
