// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

//! A per-thread cache of fixed-size fiber stacks.

use std::cell::RefCell;
use std::io;

use crate::stack::{OsStack, Stack};

/// Size of every fiber stack drawn from the pool.
///
/// Large enough to host nested scheduler frames; overflowing it runs into
/// the guard page.
pub const STACK_SIZE: usize = 4 << 20;

thread_local! {
    static POOL: RefCell<Vec<OsStack>> = const { RefCell::new(Vec::new()) };
}

/// A fixed-size stack drawn from the per-thread pool.
///
/// Exclusively owns its buffer. Dropping it returns the buffer to the pool
/// for reuse; reused buffers are not re-zeroed.
#[derive(Debug)]
pub struct PooledStack(Option<OsStack>);

/// Pops a cached stack or maps a fresh one.
pub(crate) fn alloc() -> io::Result<PooledStack> {
    let cached = POOL.with(|pool| pool.borrow_mut().pop());
    let stack = match cached {
        Some(stack) => stack,
        None => OsStack::new(STACK_SIZE)?,
    };
    Ok(PooledStack(Some(stack)))
}

impl Stack for PooledStack {
    fn base(&self) -> *mut u8 {
        self.0.as_ref().expect("stack already freed").base()
    }

    fn limit(&self) -> *mut u8 {
        self.0.as_ref().expect("stack already freed").limit()
    }
}

impl Drop for PooledStack {
    fn drop(&mut self) {
        if let Some(stack) = self.0.take() {
            // During thread teardown the pool may already be gone; the stack
            // then unmaps itself.
            let _ = POOL.try_with(|pool| pool.borrow_mut().push(stack));
        }
    }
}
