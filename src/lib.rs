// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

//! weft is a cooperative, single-threaded, stackful fiber runtime.
//!
//! A [`FiberScheduler`] runs a FIFO queue of fibers to completion on the
//! current thread. Fibers are plain closures that run on their own 4 MiB
//! stacks, suspend with [`yield_now`], and may schedule further fibers or
//! construct nested schedulers of their own. A panic inside a fiber is
//! captured at the fiber boundary and resumed from [`scheduler_run`], so the
//! caller observes it exactly as if the fiber body had been called directly.
//!
//! [`Generator`] layers a pull-style iterator on top of the same machinery:
//! a producer fiber emits values through a [`Yielder`] and is resumed one
//! step at a time, on demand, by the consuming iterator.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use weft::{FiberScheduler, scheduler_run, yield_now};
//!
//! let sched = FiberScheduler::new();
//! let hits = Rc::new(Cell::new(0));
//! for _ in 0..3 {
//!     let hits = Rc::clone(&hits);
//!     sched.schedule(move || {
//!         hits.set(hits.get() + 1);
//!         yield_now().unwrap();
//!         hits.set(hits.get() + 1);
//!     }).unwrap();
//! }
//! scheduler_run(&sched);
//! assert_eq!(hits.get(), 6);
//! ```
//!
//! # Generator example
//!
//! ```
//! let evens: Vec<u32> = weft::Generator::new(|y| {
//!     for i in 0..5 {
//!         y.yield_value(i * 2);
//!     }
//! })
//! .into_iter()
//! .collect();
//! assert_eq!(evens, [0, 2, 4, 6, 8]);
//! ```

mod arch;
mod context;
mod error;
mod generator;
mod pool;
mod scheduler;
pub mod stack;

pub use context::{Action, ActionKind, Context, Watch};
pub use error::{Error, Result};
pub use generator::{Generator, GeneratorIter, Yielder};
pub use pool::{PooledStack, STACK_SIZE};
pub use scheduler::{install_watch, schedule, scheduler_run, yield_now, FiberScheduler};
