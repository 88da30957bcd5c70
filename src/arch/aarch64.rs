// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

// To understand the code in this file, keep in mind these facts:
// * The AArch64 ABI requires the stack pointer to be a multiple of 16 at
//   all times. The saved-register frame is 160 bytes and the fresh-stack
//   layout keeps the thunk's view of the stack 16-aligned.
// * The ABI passes the first argument in x0 and the second in x1. `switch`
//   never touches x1, so the resumed side finds the switcher's argument
//   there after its registers are restored; this carries the Action pointer
//   across the switch.
// * The callee-saved state is x19-x28, the frame pointer x29, the link
//   register x30, and the low halves of v8-v15 (d8-d15).

use core::arch::naked_asm;

// x19-x28, x29, x30, d8-d15: twenty 8-byte slots.
const FRAME_SIZE: usize = 0xa0;
// Offset of the x30 slot inside the frame; a fresh frame points it at the
// thunk.
const LR_OFFSET: usize = 0x58;

/// Exchanges execution with the context suspended in `slot`.
///
/// On return, `slot` holds the caller's saved state and the return value is
/// the `arg` of whichever `switch` call resumed us.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch(_slot: *mut *mut u8, _arg: *mut u8) -> *mut u8 {
    naked_asm!(
        "sub sp, sp, #0xa0",
        "stp x19, x20, [sp, #0x00]",
        "stp x21, x22, [sp, #0x10]",
        "stp x23, x24, [sp, #0x20]",
        "stp x25, x26, [sp, #0x30]",
        "stp x27, x28, [sp, #0x40]",
        "stp x29, x30, [sp, #0x50]",
        "stp d8,  d9,  [sp, #0x60]",
        "stp d10, d11, [sp, #0x70]",
        "stp d12, d13, [sp, #0x80]",
        "stp d14, d15, [sp, #0x90]",
        "mov x2, sp",
        "ldr x3, [x0]",
        "str x2, [x0]",
        "mov sp, x3",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8,  d9,  [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #0xa0",
        "mov x0, x1",
        "ret",
    )
}

// First instructions of a fresh context: the restored x30 points here, with
// the entry function and its payload in the 16-byte slot above the frame.
#[unsafe(naked)]
unsafe extern "C" fn thunk() {
    naked_asm!(
        "ldp x9, x0, [sp], #16",
        "blr x9",
        // The entry function never returns.
        "brk #0x1",
    )
}

/// Prepares a fresh stack whose first resume calls `entry(payload)`.
pub(crate) unsafe fn init_stack(
    base: *mut u8,
    entry: unsafe extern "C" fn(*mut u8) -> !,
    payload: *mut u8,
) -> *mut u8 {
    let top = base as *mut usize;
    top.sub(2).write(entry as usize);
    top.sub(1).write(payload as usize);

    let frame = base.sub(16 + FRAME_SIZE) as *mut usize;
    for word in 0..FRAME_SIZE / 8 {
        frame.add(word).write(0);
    }
    frame.add(LR_OFFSET / 8).write(thunk as usize);

    frame as *mut u8
}
