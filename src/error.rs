// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

use thiserror::Error;

/// Errors surfaced at the runtime's call sites.
///
/// A panic inside a fiber body is not an `Error`: it is captured at the
/// fiber boundary and resumed from [`scheduler_run`](crate::scheduler_run)
/// with its payload intact.
#[derive(Debug, Error)]
pub enum Error {
    /// `schedule`, `yield_now` or `install_watch` was called outside of any
    /// `scheduler_run` on this thread.
    #[error("no scheduler is running on this thread")]
    NoCurrentScheduler,

    /// A generator iterator was dereferenced after the producer finished.
    #[error("generator is exhausted")]
    EmptyGenerator,

    /// `Generator::begin` was called a second time.
    #[error("generator was already started")]
    DuplicatedRun,

    /// The operating system refused to map a fiber stack.
    #[error("cannot allocate fiber stack")]
    Stack(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
