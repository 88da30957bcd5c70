// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

//! Pull-style generators.
//!
//! A generator runs a producer fiber that emits values through a
//! [`Yielder`]; the consuming iterator resumes the producer exactly one
//! step per value, inside a private scheduler, so values are pulled
//! synchronously by the consumer.
//!
//! # Example
//!
//! ```
//! let mut sum = 0;
//! for n in weft::Generator::new(|y| {
//!     let mut n = 0u64;
//!     loop {
//!         y.yield_value(n);
//!         n += 1;
//!     }
//! }) {
//!     sum += n;
//!     if sum > 100 {
//!         break;
//!     }
//! }
//! assert!(sum > 100);
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use log::trace;

use crate::context::{Action, ActionKind, Context, Watch};
use crate::error::{Error, Result};
use crate::scheduler::{self, scheduler_run, FiberScheduler};

/// Hands values from a generator's producer to its consumer.
///
/// Only the generator machinery constructs a `Yielder`, and it is passed to
/// the producer by reference, so the value type always matches the
/// generator's item type.
pub struct Yielder<R> {
    _marker: PhantomData<*mut R>,
}

impl<R> Yielder<R> {
    fn new() -> Yielder<R> {
        Yielder { _marker: PhantomData }
    }

    /// Suspends the producer, publishing `value` to the consuming iterator.
    /// Returns when the iterator asks for the next value.
    pub fn yield_value(&self, value: R) {
        let mut slot = Some(value);
        scheduler::yield_with(&mut slot as *mut Option<R> as *mut ())
            .expect("yield_value outside a generator fiber");
        // If the watch did not take the value, it is dropped with the slot.
    }
}

struct GenState<R> {
    pending: Option<R>,
    stolen: Option<Context>,
    done: bool,
}

// Watches the producer from inside the private per-step scheduler: captures
// the yielded value, rewrites Sched to Stop so the producer is not requeued,
// and takes the context back for the iterator.
struct GeneratorWatch<R> {
    state: Rc<RefCell<GenState<R>>>,
}

impl<R> Watch for GeneratorWatch<R> {
    fn observe(&self, action: &mut Action, context: &mut Option<Context>) {
        let mut state = self.state.borrow_mut();
        state.pending = if action.data.is_null() {
            None
        } else {
            // SAFETY: the pointer was published by Yielder::<R>::yield_value
            // in the fiber this watch is installed on, and that fiber stays
            // suspended until we return, so the slot is alive and the type
            // matches.
            unsafe { (*(action.data as *mut Option<R>)).take() }
        };
        match action.kind {
            ActionKind::Stop => state.done = true,
            ActionKind::Sched => {
                action.kind = ActionKind::Stop;
                state.stolen = context.take();
            }
            ActionKind::Start => {}
        }
    }
}

/// A lazy sequence produced by a fiber.
///
/// The producer is single-use: [`begin`](Generator::begin) consumes it, and
/// a second call fails with [`Error::DuplicatedRun`]. Iterating the
/// generator by value begins it implicitly.
pub struct Generator<R> {
    func: Option<Box<dyn FnOnce(&Yielder<R>)>>,
}

impl<R: 'static> Generator<R> {
    pub fn new<F>(f: F) -> Generator<R>
    where
        F: FnOnce(&Yielder<R>) + 'static,
    {
        Generator { func: Some(Box::new(f)) }
    }

    /// Starts the producer and returns the consuming iterator.
    ///
    /// The producer runs up to its first yield before this returns, so the
    /// iterator already knows whether the sequence is empty.
    pub fn begin(&mut self) -> Result<GeneratorIter<R>> {
        let f = self.func.take().ok_or(Error::DuplicatedRun)?;
        GeneratorIter::start(f)
    }
}

impl<R: 'static> IntoIterator for Generator<R> {
    type Item = R;
    type IntoIter = GeneratorIter<R>;

    fn into_iter(mut self) -> GeneratorIter<R> {
        // Ownership rules out DuplicatedRun; only stack allocation can fail.
        self.begin().expect("cannot start generator fiber")
    }
}

/// Consuming iterator over a generator's values.
///
/// Dropping the iterator abandons a suspended producer: its context is
/// dropped without resuming it, so nothing held on the producer's stack is
/// unwound.
pub struct GeneratorIter<R> {
    context: Option<Context>,
    state: Rc<RefCell<GenState<R>>>,
}

impl<R: 'static> GeneratorIter<R> {
    fn start(f: Box<dyn FnOnce(&Yielder<R>)>) -> Result<GeneratorIter<R>> {
        let state = Rc::new(RefCell::new(GenState {
            pending: None,
            stolen: None,
            done: false,
        }));

        let watch_state = Rc::clone(&state);
        let body = move || {
            let watch = Rc::new(GeneratorWatch { state: watch_state });
            scheduler::install_watch(watch).expect("generator fiber without a scheduler");
            f(&Yielder::new());
        };

        let mut iter = GeneratorIter {
            context: Some(Context::new(Box::new(body))?),
            state,
        };
        iter.advance();
        Ok(iter)
    }

    /// Runs the producer for exactly one step inside a private scheduler.
    fn advance(&mut self) {
        if self.state.borrow().done {
            return;
        }
        let Some(context) = self.context.take() else {
            self.state.borrow_mut().done = true;
            return;
        };

        trace!("advancing generator producer");
        let sched = FiberScheduler::new();
        sched.schedule_context(context);
        scheduler_run(&sched);

        // The watch either stole the context back (producer yielded) or
        // left it to be dropped with the private scheduler (producer done).
        self.context = self.state.borrow_mut().stolen.take();
    }

    /// Takes the value the producer last yielded and prefetches the next
    /// one. Fails with [`Error::EmptyGenerator`] once the producer has
    /// finished.
    pub fn value(&mut self) -> Result<R> {
        let value = self
            .state
            .borrow_mut()
            .pending
            .take()
            .ok_or(Error::EmptyGenerator)?;
        self.advance();
        Ok(value)
    }
}

impl<R: 'static> Iterator for GeneratorIter<R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        self.value().ok()
    }
}
