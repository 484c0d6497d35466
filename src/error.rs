// spec.md §7's error taxonomy, collapsed into one small enum in the
// teacher's own style (e.g. `Procstate`) rather than a `thiserror`/`anyhow`
// hierarchy — no crate in the retrieved pack reaches for either inside a
// `no_std` kernel, so none is added here.
//
// Fatal kinds (`InvalidFree`, `SchedulerInvariantViolation`, `InitExiting`,
// `UnknownApic`) are never returned to a caller: the operation that detects
// them panics immediately, matching spec.md §7's propagation policy. The
// rest flow back as `Result`/`Option` and are turned into `-1`/`None` at the
// syscall boundary.

use core::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A page handed to `kfree` was mis-aligned, below `kernel_end`, or at
    /// or past `PHYSTOP`. Fatal.
    InvalidFree,
    /// `kalloc` found the page free list empty.
    OutOfFrames,
    /// `k_malloc` exhausted the fixed-capacity heap (spec.md §4.B, §9
    /// "Heap sizing").
    OutOfHeap,
    /// `sched()` was entered without exactly one `ptable.lock` held, with
    /// interrupts enabled, or while the caller's state was RUNNING. Fatal.
    SchedulerInvariantViolation,
    /// `exit()` was called by pid 1. Fatal.
    InitExiting,
    /// CPU identification failed to find a matching entry in `cpus[]`.
    /// Fatal.
    UnknownApic,
    /// `kill(pid)` found no such process.
    NoSuchPid,
    /// `wait()` found no children of the caller.
    NoChildren,
    /// `wait()`'s caller has been killed.
    Killed,
    /// `assign_tickets(0)` was requested (spec.md §9 item 4: rejected
    /// rather than dividing by zero or silently clamping).
    InvalidTickets,
    /// `growproc`/`fork`'s user-VM allocation failed.
    OutOfMemory,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::InvalidFree => "invalid free",
            KernelError::OutOfFrames => "out of frames",
            KernelError::OutOfHeap => "out of heap",
            KernelError::SchedulerInvariantViolation => "scheduler invariant violation",
            KernelError::InitExiting => "init exiting",
            KernelError::UnknownApic => "unknown apic id",
            KernelError::NoSuchPid => "no such pid",
            KernelError::NoChildren => "no children",
            KernelError::Killed => "killed",
            KernelError::InvalidTickets => "invalid ticket count",
            KernelError::OutOfMemory => "out of memory",
        };
        f.write_str(msg)
    }
}
