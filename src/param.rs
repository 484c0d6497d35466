// Compile-time limits and stride-scheduling constants.
//
// Recovered from `proc.rs`'s `use crate::param::{NCPU, NOFILE, NPROC, ROOTDEV}`
// (the module itself was missing from the retrieved tree) and cross-checked
// against the sibling fork's `param.rs`, which carries the same names and
// defaults.

// Process and CPU related
pub const NPROC: usize = 64; // maximum number of processes
pub const NCPU: usize = 8; // maximum number of CPUs
pub const NOFILE: usize = 16; // open files per process
pub const ROOTDEV: usize = 1; // device number of file system root disk

// Debug name buffer width (spec.md §3, §6).
pub const NAME_LEN: usize = 16;

// Stride scheduling (spec.md §3, §4.D).
pub const LARGE: i64 = 10000; // numerator for stride = LARGE / tickets
pub const DEFAULT_TICKETS: i64 = 100; // tickets assigned by allocproc()

// Two-tier allocator (spec.md §4.B, §9 "Heap sizing").
pub const HEAP_FRAMES: usize = 9; // total frames claimed by k_malloc's first call
pub const HEAP_PAYLOAD_FRAMES: usize = 8; // of which this many become usable payload
