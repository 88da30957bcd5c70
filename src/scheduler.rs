// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

//! The FIFO fiber scheduler and the per-thread current-scheduler slot.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic;
use std::ptr;
use std::rc::Rc;

use log::trace;

use crate::context::{Action, ActionKind, Context, Watch};
use crate::error::{Error, Result};

thread_local! {
    // Which scheduler owns the thread right now. Set for the duration of
    // scheduler_run and restored around nested runs.
    static CURRENT: Cell<*const FiberScheduler> = const { Cell::new(ptr::null()) };
}

// SAFETY: the pointer is installed by scheduler_run for the lifetime of a
// borrow of the scheduler and cleared (or restored to an outer scheduler
// with the same property) on exit, panicking or not. Everything is confined
// to one thread.
fn current<'a>() -> Option<&'a FiberScheduler> {
    let sched = CURRENT.get();
    if sched.is_null() {
        None
    } else {
        Some(unsafe { &*sched })
    }
}

/// Runs a FIFO queue of fibers to completion on the current thread.
///
/// A scheduler drains its queue inside [`scheduler_run`]: each fiber runs
/// until it finishes or yields, and yielded fibers go to the back of the
/// queue. Fibers may enqueue further work with [`schedule`] and may run
/// nested schedulers of their own. After a normal run the queue is empty
/// and the scheduler can be reused.
pub struct FiberScheduler {
    queue: RefCell<VecDeque<Context>>,
    // Holds the running fiber's context; while that fiber is on CPU the
    // same slot carries the scheduler's own saved state, and every switch
    // between the two sides exchanges through it.
    current: RefCell<Option<Context>>,
}

impl FiberScheduler {
    pub fn new() -> FiberScheduler {
        FiberScheduler {
            queue: RefCell::new(VecDeque::new()),
            current: RefCell::new(None),
        }
    }

    /// Enqueues a fiber behind everything already queued.
    pub fn schedule<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        self.schedule_context(Context::new(Box::new(f))?);
        Ok(())
    }

    /// Enqueues an already-suspended context.
    pub fn schedule_context(&self, context: Context) {
        self.queue.borrow_mut().push_back(context);
    }

    fn run(&self) {
        loop {
            let context = self.queue.borrow_mut().pop_front();
            let Some(mut context) = context else { break };
            context.take_panic();
            trace!("resuming fiber, {} queued behind it", self.queue.borrow().len());

            *self.current.borrow_mut() = Some(context);
            let mut action = self.exchange(Action::start());

            if let Some(panic) = self.take_current_panic() {
                // The failed fiber's context is dropped here; fibers still
                // queued are released when the scheduler itself goes away.
                self.current.borrow_mut().take();
                panic::resume_unwind(panic);
            }

            let watch = self.current.borrow().as_ref().and_then(Context::watch);
            if let Some(watch) = watch {
                watch.observe(&mut action, &mut *self.current.borrow_mut());
            }

            let requeue = action.kind == ActionKind::Sched;
            let context = self.current.borrow_mut().take();
            if let Some(context) = context {
                if requeue {
                    self.queue.borrow_mut().push_back(context);
                }
                // Otherwise dropping the context returns its stack to the
                // pool.
            }
        }
    }

    /// Switches between the scheduler's frame and the fiber suspended in
    /// the current slot, whichever side we are on.
    fn exchange(&self, action: Action) -> Action {
        let mut borrow = self.current.borrow_mut();
        let context: *mut Context = borrow.as_mut().expect("no context to switch through");
        drop(borrow);
        // SAFETY: the context stays pinned in `current` while either side
        // of the exchange is suspended, and no RefCell borrow is held
        // across the switch.
        unsafe { Context::switch(context, action) }
    }

    fn yield_current(&self, data: *mut ()) {
        self.exchange(Action::sched(data));
    }

    fn watch_current(&self, watch: Rc<dyn Watch>) {
        self.current
            .borrow_mut()
            .as_mut()
            .expect("no fiber is running")
            .set_watch(watch);
    }

    fn take_current_panic(&self) -> Option<Box<dyn Any + Send>> {
        self.current.borrow_mut().as_mut().and_then(Context::take_panic)
    }
}

impl Default for FiberScheduler {
    fn default() -> FiberScheduler {
        FiberScheduler::new()
    }
}

impl Drop for FiberScheduler {
    fn drop(&mut self) {
        // A run that ends by panic may leave fibers queued; their contexts
        // are dropped with the queue either way, releasing the stacks.
        if !std::thread::panicking() {
            debug_assert!(self.queue.borrow().is_empty());
        }
    }
}

/// Drains `sched`'s queue on the current thread.
///
/// Makes `sched` the thread's current scheduler for the duration. Re-entrant:
/// a fiber may construct a local scheduler and run it, and the previous
/// scheduler is restored on exit even if the run ends by panic. A fiber must
/// not re-run the scheduler that is running it. A panic captured from a
/// fiber body resumes unwinding here.
pub fn scheduler_run(sched: &FiberScheduler) {
    struct Restore(*const FiberScheduler);
    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT.set(self.0);
        }
    }

    let _restore = Restore(CURRENT.replace(sched));
    sched.run();
}

/// Enqueues `f` on the scheduler currently running on this thread.
pub fn schedule<F>(f: F) -> Result<()>
where
    F: FnOnce() + 'static,
{
    current().ok_or(Error::NoCurrentScheduler)?.schedule(f)
}

/// Yields the current fiber to the back of its scheduler's queue; returns
/// once the scheduler resumes it.
pub fn yield_now() -> Result<()> {
    yield_with(ptr::null_mut())
}

/// Like [`yield_now`], publishing `data` to the current fiber's watch. The
/// pointer must stay valid until the fiber is next resumed.
pub(crate) fn yield_with(data: *mut ()) -> Result<()> {
    let sched = current().ok_or(Error::NoCurrentScheduler)?;
    sched.yield_current(data);
    Ok(())
}

/// Installs `watch` on the currently executing fiber's context.
///
/// The watch is shared: the scheduler invokes it through the context while
/// any other holder (a generator iterator) observes the state it captures.
pub fn install_watch(watch: Rc<dyn Watch>) -> Result<()> {
    let sched = current().ok_or(Error::NoCurrentScheduler)?;
    sched.watch_current(watch);
    Ok(())
}

/// Stores a panic captured at the fiber boundary on the context it came
/// from, for `run` to rethrow after the switch back.
pub(crate) fn stash_panic(panic: Box<dyn Any + Send>) {
    current()
        .expect("fiber panicked without a scheduler")
        .current
        .borrow_mut()
        .as_mut()
        .expect("fiber panicked without a context")
        .store_panic(panic);
}

/// Final switch out of a finishing fiber. Never returns.
pub(crate) fn finish_fiber() -> ! {
    let sched = current().expect("fiber finished without a scheduler");
    sched.exchange(Action::stop());
    unreachable!("finished fiber was resumed")
}
