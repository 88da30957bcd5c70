// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

// To understand the code in this file, keep in mind these facts:
// * The x86_64 SysV C ABI requires the stack to be aligned at function
//   entry, so that (%rsp+8) is a multiple of 16. The fresh-stack layout
//   below is arranged so the thunk enters the fiber body with exactly that
//   alignment.
// * The SysV ABI passes the first argument in %rdi and the second in %rsi.
//   `switch` never touches %rsi, so the resumed side finds the switcher's
//   argument there after its own registers are restored; this is what
//   carries the Action pointer across the switch.
// * Only the callee-saved registers (%rbp, %rbx, %r12-%r15) need to be
//   preserved explicitly; everything else is clobbered by the call itself.

use core::arch::naked_asm;

// Words pushed below the thunk slot on a fresh stack, one per callee-saved
// register popped by `switch`.
const FRAME_WORDS: usize = 6;

/// Exchanges execution with the context suspended in `slot`.
///
/// On return, `slot` holds the caller's saved state and the return value is
/// the `arg` of whichever `switch` call resumed us.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch(_slot: *mut *mut u8, _arg: *mut u8) -> *mut u8 {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rax, [rdi]",
        "mov [rdi], rsp",
        "mov rsp, rax",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "mov rax, rsi",
        "ret",
    )
}

// First instructions of a fresh context: the `ret` in `switch` lands here
// with the entry function and its payload on top of the stack.
#[unsafe(naked)]
unsafe extern "C" fn thunk() {
    naked_asm!(
        "pop rax",
        "pop rdi",
        "call rax",
        // The entry function never returns.
        "ud2",
    )
}

unsafe fn push(sp: &mut *mut usize, val: usize) {
    *sp = sp.sub(1);
    sp.write(val);
}

/// Prepares a fresh stack whose first resume calls `entry(payload)`.
pub(crate) unsafe fn init_stack(
    base: *mut u8,
    entry: unsafe extern "C" fn(*mut u8) -> !,
    payload: *mut u8,
) -> *mut u8 {
    let mut sp = base as *mut usize;
    push(&mut sp, payload as usize);
    push(&mut sp, entry as usize);
    push(&mut sp, thunk as usize);
    for _ in 0..FRAME_WORDS {
        push(&mut sp, 0);
    }
    sp as *mut u8
}
