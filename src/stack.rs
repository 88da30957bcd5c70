// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

//! Stack ownership and the mmap-backed stacks the pool hands out.

use std::io;
use std::ptr;

#[cfg(not(unix))]
compile_error!("weft requires a unix-like OS to map fiber stacks");

/// A trait for objects that hold ownership of a stack.
///
/// To preserve memory safety, an implementation of this trait must fulfill
/// the following contract:
///
///   * The base address of the stack must be aligned to a 16-byte boundary.
///   * Every address between the base and the limit must be readable and
///     writable.
pub trait Stack {
    /// Returns the base address of the stack. Stacks grow downwards, so this
    /// is the highest address.
    fn base(&self) -> *mut u8;
    /// Returns the limit address of the stack, the lowest usable address.
    fn limit(&self) -> *mut u8;
}

/// OsStack holds a stack allocated with the operating system's anonymous
/// memory mapping facility.
///
/// The mapping comes with a guard page below the limit, which is not part of
/// the usable stack. Anonymous mappings are zero-filled, so a fresh OsStack
/// satisfies the zero-initialization the trampoline setup relies on.
#[derive(Debug)]
pub struct OsStack {
    ptr: *mut u8,
    len: usize,
}

impl OsStack {
    /// Allocates a new stack with at least `size` accessible bytes.
    /// `size` is rounded up to a whole number of pages.
    pub fn new(size: usize) -> io::Result<OsStack> {
        let page = page_size();

        // Round the length one page up, then add the guard page.
        let len = (size + page - 1) & !(page - 1);
        let len = len + page;

        // If marking the guard page fails, `stack` is dropped and the
        // mapping released.
        let stack = OsStack {
            ptr: unsafe { map_stack(len)? },
            len,
        };
        unsafe { protect_guard(stack.ptr)? };

        Ok(stack)
    }
}

impl Stack for OsStack {
    #[inline]
    fn base(&self) -> *mut u8 {
        unsafe { self.ptr.add(self.len) }
    }

    #[inline]
    fn limit(&self) -> *mut u8 {
        unsafe { self.ptr.add(page_size()) }
    }
}

impl Drop for OsStack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.cast(), self.len);
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[cfg(not(target_os = "macos"))]
const MAP_STACK: libc::c_int = libc::MAP_STACK;
#[cfg(target_os = "macos")]
const MAP_STACK: libc::c_int = 0;

unsafe fn map_stack(len: usize) -> io::Result<*mut u8> {
    let ptr = libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANON | MAP_STACK,
        -1,
        0,
    );
    if ptr == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(ptr.cast())
    }
}

unsafe fn protect_guard(ptr: *mut u8) -> io::Result<()> {
    if libc::mprotect(ptr.cast(), page_size(), libc::PROT_NONE) == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
