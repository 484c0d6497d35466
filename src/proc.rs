// Process table, stride scheduler, and process lifecycle (spec.md
// §4.C/§4.D/§4.E/§4.F). The teacher's own `proc.rs` never grew past the
// xv6-riscv `allocproc`/`userinit`/`forkret` skeleton it was ported from —
// no stride fields, no `fork`/`exit`/`wait`/`sleep`/`wakeup`/`kill`, no
// `EMBRYO` state. Everything below is grounded in
// `examples/original_source/proc.c`, `proc.h`, and `stride.c`, rewritten
// against this crate's own collaborators (`mmu::AddressSpace`,
// `swtch::ContextSwitch`, `kalloc::KMem`, `kheap::KHeap`) instead of a real
// MMU and trapframe/trampoline assembly.
//
// Process slots are heap-allocated through §4.B (`KHeap::k_malloc`) rather
// than carved out of a static `[Proc; NPROC]` array, and returned to the
// heap by `wait()`'s reaping — spec.md's data model calls for exactly this.
// Table membership itself is a `Vec<*mut Proc>` rather than an intrusive
// linked list; spec.md's design notes explicitly allow a non-intrusive
// container "provided tie-breaking remains stable", and a `Vec` gets that
// for free from iteration order.

use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::KernelError;
use crate::kalloc::{KMem, KMEM};
use crate::kheap::{KHeap, KHEAP};
use crate::mmu::{AddressSpace, FrameListSpace};
use crate::param::{DEFAULT_TICKETS, LARGE, NAME_LEN, NCPU, NOFILE};
use crate::riscv::{intr_get, intr_on, r_tp};
use crate::spinlock::Spinlock;
use crate::string::safestrcpy;
use crate::swtch::{Context, ContextSwitch};

/// Stand-in for the real trapframe (spec.md §1/§6 place trap-frame
/// construction out of scope). The only field any lifecycle operation
/// touches is the return-value register, which `fork` zeroes in the child.
#[derive(Copy, Clone, Default)]
pub struct TrapFrame {
    pub a0: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl ProcState {
    /// Debug labels, spec.md §6: `unused/embryo/sleep/runble/run/zombie`.
    pub fn label(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Embryo => "embryo",
            ProcState::Sleeping => "sleep",
            ProcState::Runnable => "runble",
            ProcState::Running => "run",
            ProcState::Zombie => "zombie",
        }
    }
}

/// spec.md §3/§4.D stride bookkeeping. `stride = LARGE / tickets`;
/// `pass_value` only ever grows (or is floored at a rejoin point), never
/// decreases within a process's lifetime.
#[derive(Copy, Clone)]
pub struct StrideInfo {
    pub tickets: i64,
    pub stride: i64,
    pub pass_value: i64,
}

impl StrideInfo {
    fn new(tickets: i64) -> Self {
        StrideInfo {
            tickets,
            stride: LARGE / tickets,
            pass_value: 0,
        }
    }
}

pub struct Proc {
    state: ProcState,
    pid: u32,
    parent: *mut Proc,
    size: usize,
    space: Option<FrameListSpace>,
    kstack: Option<*mut u8>,
    trapframe: TrapFrame,
    context: Context,
    chan: Option<usize>,
    killed: bool,
    ofile: [bool; NOFILE],
    cwd: bool,
    name: [u8; NAME_LEN],
    stride: StrideInfo,
}

impl Proc {
    fn zeroed() -> Self {
        Proc {
            state: ProcState::Unused,
            pid: 0,
            parent: ptr::null_mut(),
            size: 0,
            space: None,
            kstack: None,
            trapframe: TrapFrame::default(),
            context: Context::zeroed(),
            chan: None,
            killed: false,
            ofile: [false; NOFILE],
            cwd: false,
            name: [0; NAME_LEN],
            stride: StrideInfo::new(DEFAULT_TICKETS),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> ProcState {
        self.state
    }

    pub fn killed(&self) -> bool {
        self.killed
    }

    pub fn tickets(&self) -> i64 {
        self.stride.tickets
    }

    pub fn stride_len(&self) -> i64 {
        self.stride.stride
    }

    pub fn pass_value(&self) -> i64 {
        self.stride.pass_value
    }

    pub fn name(&self) -> &[u8; NAME_LEN] {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Per-CPU record (spec.md §3): the scheduler's own saved context, which
/// process (if any) is running here, and the interrupt-nesting counters
/// `push_off`/`pop_off` maintain.
pub struct Cpu {
    proc: Option<*mut Proc>,
    context: Context,
    pub noff: u32,
    pub intena: bool,
}

impl Cpu {
    const fn create() -> Self {
        Cpu {
            proc: None,
            context: Context::zeroed(),
            noff: 0,
            intena: false,
        }
    }
}

const CPU_INIT: Cpu = Cpu::create();
static mut CPUS: [Cpu; NCPU] = [CPU_INIT; NCPU];

/// Identify this hart as an index into `CPUS`. Fatal (`UnknownApic`,
/// spec.md §7) if the hart id read from `tp` doesn't name a configured CPU —
/// the Rust-native analogue of the teacher's "scan `cpus[]` for a matching
/// apicid, panic if none found".
pub fn cpuid() -> usize {
    let id = r_tp() as usize;
    if id >= NCPU {
        panic!("cpuid: {}", KernelError::UnknownApic);
    }
    id
}

pub fn mycpu() -> &'static mut Cpu {
    unsafe { &mut CPUS[cpuid()] }
}

/// Current process on this CPU, or null outside any process context
/// (matches the teacher's `myproc()` disable-interrupts-while-reading
/// shape).
pub fn myproc() -> *mut Proc {
    crate::spinlock::push_off();
    let p = mycpu().proc;
    crate::spinlock::pop_off();
    p.unwrap_or(ptr::null_mut())
}

/// Monotonic tick counter. Real timer-interrupt wiring is out of scope
/// (spec.md §1's trap handling); this just gives `uptime()` something to
/// report so callers that expect the symbol to exist (spec.md §6) compile.
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn uptime() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Process table (spec.md §4.C). `list` holds pointers to heap-allocated
/// `Proc`s in insertion order; `min_pass_value` is the table-wide floor
/// `assign_min_pass_value`/`wakeup1` use to rejoin a process fairly rather
/// than let it bank credit while off the runnable set (spec.md §4.D,
/// §9 item 5).
pub struct PTable {
    lock: Spinlock,
    list: Vec<*mut Proc>,
    min_pass_value: i64,
    next_pid: u32,
}

unsafe impl Sync for PTable {}

pub static mut PTABLE: PTable = PTable::create();
static mut INIT_PROC: *mut Proc = ptr::null_mut();

impl PTable {
    pub const fn create() -> Self {
        PTable {
            lock: Spinlock::init_lock("ptable"),
            list: Vec::new(),
            min_pass_value: 0,
            next_pid: 1,
        }
    }

    pub fn min_pass_value(&self) -> i64 {
        self.min_pass_value
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    fn alloc_pid(&mut self) -> u32 {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    fn insert_tail(&mut self, p: *mut Proc) {
        self.list.push(p);
    }

    fn unlink(&mut self, p: *mut Proc) {
        self.list.retain(|&q| q != p);
    }

    /// spec.md §4.D `remove_min`: unlink and return the RUNNABLE process
    /// with the lowest pass value. Ties go to the one encountered first in
    /// traversal order (insertion order here), matching the stability the
    /// intrusive list gave the teacher's original for free.
    fn remove_min(&mut self) -> Option<*mut Proc> {
        let mut best: Option<*mut Proc> = None;
        for &p in &self.list {
            if unsafe { (*p).state } != ProcState::Runnable {
                continue;
            }
            best = match best {
                None => Some(p),
                Some(b) if unsafe { (*p).stride.pass_value } < unsafe { (*b).stride.pass_value } => Some(p),
                Some(b) => Some(b),
            };
        }
        if let Some(p) = best {
            self.unlink(p);
        }
        best
    }

    /// spec.md §4.D: recompute the table-wide floor over every RUNNABLE
    /// process. Floors to 0 if none are runnable (spec.md §9 item 5 —
    /// documented-intentional, not a bug: the next process to join starts
    /// from scratch rather than inheriting a stale high floor).
    fn update_min_pass_value(&mut self) {
        let mut min = 0i64;
        let mut seen = false;
        for &p in &self.list {
            if unsafe { (*p).state } != ProcState::Runnable {
                continue;
            }
            let pv = unsafe { (*p).stride.pass_value };
            if !seen || pv < min {
                min = pv;
                seen = true;
            }
        }
        self.min_pass_value = min;
    }

    fn assign_min_pass_value(&self, p: *mut Proc) {
        unsafe {
            (*p).stride.pass_value = self.min_pass_value;
        }
    }

    /// spec.md §4.E `wakeup`: move every SLEEPING process waiting on `chan`
    /// to RUNNABLE, rejoining it at the current pass-value floor.
    fn wakeup1(&mut self, chan: usize) {
        for &p in &self.list {
            let proc = unsafe { &mut *p };
            if proc.state == ProcState::Sleeping && proc.chan == Some(chan) {
                proc.state = ProcState::Runnable;
                self.assign_min_pass_value(p);
            }
        }
    }
}

/// Called once at boot. The table itself needs no setup beyond its
/// `const` initializer; kept as a named entry point to mirror the
/// teacher's `procinit()`.
pub fn procinit() {}

/// spec.md §4.E `allocproc`. Returns `None` if the heap has no room for a
/// slot, or if the subsequent kernel-stack frame can't be obtained — in the
/// latter case the slot is left linked in the table in state UNUSED rather
/// than freed back to the heap (spec.md §9 item 1, preserved faithfully:
/// a documented rough edge, not something this rewrite silently fixes).
fn allocproc(t: &mut PTable, kmem: &mut KMem, heap: &mut KHeap) -> Option<*mut Proc> {
    t.lock.acquire();

    let raw = match heap.k_malloc(kmem, size_of::<Proc>()) {
        Some(p) => p as *mut Proc,
        None => {
            t.lock.release();
            return None;
        }
    };
    unsafe {
        ptr::write(raw, Proc::zeroed());
    }
    t.insert_tail(raw);

    unsafe {
        (*raw).stride = StrideInfo::new(DEFAULT_TICKETS);
        (*raw).state = ProcState::Embryo;
        (*raw).pid = t.alloc_pid();
    }

    t.lock.release();

    match kmem.kalloc() {
        Some(stack) => unsafe {
            (*raw).kstack = Some(stack);
            (*raw).context = Context::zeroed();
            (*raw).context.sp = stack as u64 + crate::riscv::PGSIZE as u64;
        },
        None => {
            unsafe {
                (*raw).state = ProcState::Unused;
            }
            return None;
        }
    }

    Some(raw)
}

/// Unwind a slot that never made it past `fork`'s VM-copy step: free its
/// kernel stack, unlink it, and return it to the heap. Unlike `reap`, this
/// runs on a slot that was never made RUNNABLE, so there's no pid to return.
fn abandon(t: &mut PTable, kmem: &mut KMem, heap: &mut KHeap, p: *mut Proc) {
    unsafe {
        if let Some(stack) = (*p).kstack.take() {
            kmem.kfree(stack);
        }
        (*p).state = ProcState::Unused;
    }
    t.lock.acquire();
    t.unlink(p);
    t.lock.release();
    heap.k_free(p as *mut u8);
}

/// spec.md §4.E `userinit`: the first process, loaded from the built-in
/// init program. Kept as a small fixed byte blob for continuity with the
/// teacher's own `initcode`, though with no ELF loader left to exec it
/// (spec.md §1's filesystem non-goal), it only exercises `init_user_vm`'s
/// frame accounting, not real user-mode execution.
const INITCODE: [u8; 8] = [0x69, 0x6e, 0x69, 0x74, 0x63, 0x6f, 0x64, 0x65];

pub fn userinit(t: &mut PTable, kmem: &mut KMem, heap: &mut KHeap) -> *mut Proc {
    let p = allocproc(t, kmem, heap).expect("userinit: allocproc failed");

    let mut space = FrameListSpace::setup_kernel_vm();
    if !space.init_user_vm(kmem, &INITCODE) {
        panic!("userinit: out of frames");
    }

    unsafe {
        (*p).space = Some(space);
        (*p).size = INITCODE.len();
        (*p).trapframe = TrapFrame::default();
        (*p).cwd = true;
        safestrcpy(&mut (*p).name, "initcode");
    }

    t.lock.acquire();
    unsafe {
        (*p).state = ProcState::Runnable;
    }
    t.lock.release();

    unsafe {
        INIT_PROC = p;
    }
    p
}

/// spec.md §4.E `fork`. Allocates a child slot, copies the parent's address
/// space/size/open-file table/cwd/name, zeroes the child's return-value
/// register, and joins it at the table's current pass-value floor (so it
/// competes immediately rather than banking any of the parent's progress).
/// Any failure fully unwinds whatever the call had already allocated.
fn fork_for(t: &mut PTable, kmem: &mut KMem, heap: &mut KHeap, parent: *mut Proc) -> Option<u32> {
    let child = allocproc(t, kmem, heap)?;

    let (parent_size, parent_space_copy) = unsafe {
        let pp = &*parent;
        match &pp.space {
            Some(s) => (pp.size, s.copy_user_vm(kmem, pp.size)),
            None => (pp.size, Some(FrameListSpace::setup_kernel_vm())),
        }
    };

    let space = match parent_space_copy {
        Some(s) => s,
        None => {
            abandon(t, kmem, heap, child);
            return None;
        }
    };

    unsafe {
        let pp = &*parent;
        (*child).space = Some(space);
        (*child).size = parent_size;
        (*child).parent = parent;
        (*child).trapframe = pp.trapframe;
        (*child).trapframe.a0 = 0; // fork returns 0 in the child
        (*child).ofile = pp.ofile;
        (*child).cwd = pp.cwd;
        (*child).name = pp.name;
    }

    let pid = unsafe { (*child).pid };

    t.lock.acquire();
    unsafe {
        (*child).state = ProcState::Runnable;
    }
    t.assign_min_pass_value(child);
    t.lock.release();

    Some(pid)
}

/// Free a ZOMBIE child's resources and return its pid — the reaping half
/// of `wait()`. The slot is unlinked and returned to the heap here, per
/// spec.md's data model.
fn reap(t: &mut PTable, kmem: &mut KMem, heap: &mut KHeap, p: *mut Proc) -> u32 {
    let pid = unsafe { (*p).pid };
    unsafe {
        if let Some(stack) = (*p).kstack.take() {
            kmem.kfree(stack);
        }
        if let Some(mut space) = (*p).space.take() {
            space.free_vm(kmem);
        }
        (*p).pid = 0;
        (*p).parent = ptr::null_mut();
        (*p).name = [0; NAME_LEN];
        (*p).killed = false;
        (*p).state = ProcState::Unused;
    }
    t.unlink(p);
    heap.k_free(p as *mut u8);
    pid
}

/// spec.md §4.E `wait`: block until a child becomes ZOMBIE, reap it, and
/// return its pid. `Err(NoChildren)` if the caller has none;
/// `Err(Killed)` if the caller was killed while waiting.
fn wait_for(
    t: &mut PTable,
    kmem: &mut KMem,
    heap: &mut KHeap,
    switcher: &mut dyn ContextSwitch,
    caller: *mut Proc,
) -> Result<u32, KernelError> {
    t.lock.acquire();
    loop {
        let mut have_kids = false;
        let mut zombie = None;
        for &p in &t.list {
            if unsafe { (*p).parent } != caller {
                continue;
            }
            have_kids = true;
            if unsafe { (*p).state } == ProcState::Zombie {
                zombie = Some(p);
                break;
            }
        }

        if let Some(p) = zombie {
            let pid = reap(t, kmem, heap, p);
            t.lock.release();
            return Ok(pid);
        }

        if !have_kids {
            t.lock.release();
            return Err(KernelError::NoChildren);
        }
        if unsafe { (*caller).killed } {
            t.lock.release();
            return Err(KernelError::Killed);
        }

        sleep_locked(t, caller, caller as usize, switcher);
    }
}

/// spec.md §4.E `sleep`: block the caller on `chan`. Every caller in this
/// core already holds `ptable.lock` — the only lock this kernel's lifecycle
/// operations serialize through — so unlike the teacher's generic "any
/// lock" `sleep`, there is no lock-swap to perform here: the invariant it
/// protects (no wakeup lost between marking SLEEPING and actually
/// yielding the CPU) is preserved by simply never releasing `ptable.lock`
/// before the state change below.
fn sleep_locked(t: &mut PTable, p: *mut Proc, chan: usize, switcher: &mut dyn ContextSwitch) {
    unsafe {
        (*p).chan = Some(chan);
        (*p).state = ProcState::Sleeping;
    }
    sched(t, p, switcher);
    unsafe {
        (*p).chan = None;
    }
}

/// spec.md §4.E `sched`: hand control to the per-CPU scheduler loop.
/// Panics with `SchedulerInvariantViolation` if any of its invariants are
/// violated — not holding exactly one `ptable.lock`, the caller still
/// RUNNING, or interrupts enabled across the switch.
fn sched(t: &PTable, p: *mut Proc, switcher: &mut dyn ContextSwitch) {
    if !t.lock.holding() {
        panic!("sched: {} (lock not held)", KernelError::SchedulerInvariantViolation);
    }
    let cpu = mycpu();
    if cpu.noff != 1 {
        panic!("sched: {} (noff != 1)", KernelError::SchedulerInvariantViolation);
    }
    if unsafe { (*p).state } == ProcState::Running {
        panic!("sched: {} (still running)", KernelError::SchedulerInvariantViolation);
    }
    if intr_get() {
        panic!("sched: {} (interrupts enabled)", KernelError::SchedulerInvariantViolation);
    }

    let intena = cpu.intena;
    switcher.swtch(unsafe { &mut (*p).context }, &cpu.context);
    mycpu().intena = intena;
}

/// spec.md §4.E `yield`: mark the caller RUNNABLE again and hand off to the
/// scheduler. Returns once some future scheduler pass dispatches it again.
fn yield_for(t: &mut PTable, p: *mut Proc, switcher: &mut dyn ContextSwitch) {
    t.lock.acquire();
    unsafe {
        (*p).state = ProcState::Runnable;
    }
    sched(t, p, switcher);
    t.lock.release();
}

/// spec.md §4.E `exit`. Fatal (`InitExiting`) if called by the init
/// process. Wakes the caller's parent (which may be blocked in `wait`),
/// reparents any children to init — waking init if one of them is already
/// a ZOMBIE — and transitions to ZOMBIE before handing off to the
/// scheduler. The scheduler must never dispatch a ZOMBIE process again, so
/// control reaching past `sched()` here is itself an invariant violation.
fn exit_for(t: &mut PTable, switcher: &mut dyn ContextSwitch, p: *mut Proc) -> ! {
    let init = unsafe { INIT_PROC };
    if unsafe { (*p).pid } == unsafe { (*init).pid } {
        panic!("exit: {}", KernelError::InitExiting);
    }

    unsafe {
        (*p).ofile = [false; NOFILE];
        (*p).cwd = false;
    }

    t.lock.acquire();

    let parent = unsafe { (*p).parent };
    if !parent.is_null() {
        t.wakeup1(parent as usize);
    }

    let mut wake_init = false;
    for &q in &t.list {
        if unsafe { (*q).parent } == p {
            unsafe {
                (*q).parent = init;
            }
            if unsafe { (*q).state } == ProcState::Zombie {
                wake_init = true;
            }
        }
    }
    if wake_init {
        t.wakeup1(init as usize);
    }

    unsafe {
        (*p).state = ProcState::Zombie;
    }
    sched(t, p, switcher);
    unreachable!("exit: scheduler resumed a zombie process");
}

/// spec.md §4.E `kill`: mark the target killed, and if it's currently
/// SLEEPING, wake it so it observes the flag promptly instead of sleeping
/// indefinitely.
fn kill_in(t: &mut PTable, pid: u32) -> Result<(), KernelError> {
    t.lock.acquire();
    for &p in &t.list {
        if unsafe { (*p).pid } == pid {
            unsafe {
                (*p).killed = true;
                if (*p).state == ProcState::Sleeping {
                    (*p).state = ProcState::Runnable;
                }
            }
            t.lock.release();
            return Ok(());
        }
    }
    t.lock.release();
    Err(KernelError::NoSuchPid)
}

/// spec.md §4.D `assign_tickets`: recompute `stride` for a new ticket
/// count without resetting `pass_value` — a process that has already made
/// progress keeps it, it just accrues pass value at a different rate from
/// here on. Rejects `tickets < 1` (spec.md §9 item 4) rather than dividing
/// by zero or silently clamping.
pub fn assign_tickets(p: *mut Proc, tickets: i64) -> Result<(), KernelError> {
    if tickets < 1 {
        return Err(KernelError::InvalidTickets);
    }
    unsafe {
        (*p).stride.tickets = tickets;
        (*p).stride.stride = LARGE / tickets;
    }
    Ok(())
}

/// spec.md §4.E `growproc`: grow or shrink the caller's address space by
/// `n` bytes (negative shrinks).
pub fn growproc(kmem: &mut KMem, p: *mut Proc, n: isize) -> Result<usize, KernelError> {
    let proc = unsafe { &mut *p };
    let old = proc.size;
    let new = if n >= 0 {
        old + n as usize
    } else {
        old - (-n) as usize
    };
    let space = proc.space.as_mut().expect("growproc: process has no address space");
    let result = if n >= 0 {
        space.alloc_user_vm(kmem, old, new)
    } else {
        Some(space.dealloc_user_vm(kmem, old, new))
    };
    match result {
        Some(sz) => {
            proc.size = sz;
            space.switch_user_vm();
            Ok(sz)
        }
        None => Err(KernelError::OutOfMemory),
    }
}

/// spec.md §4.F: one pass of the per-CPU scheduler loop — pick the
/// RUNNABLE process with the lowest pass value, run it until it yields or
/// blocks, charge it `stride`, and rejoin it at the tail before
/// recomputing the table-wide floor. A no-op (beyond releasing the lock)
/// if nothing is RUNNABLE.
pub fn scheduler_step(t: &mut PTable, cpu: &mut Cpu, switcher: &mut dyn ContextSwitch) {
    t.lock.acquire();
    if let Some(p) = t.remove_min() {
        cpu.proc = Some(p);
        unsafe {
            if let Some(space) = (*p).space.as_ref() {
                space.switch_user_vm();
            }
            (*p).state = ProcState::Running;
        }

        switcher.swtch(&mut cpu.context, unsafe { &(*p).context });
        FrameListSpace::switch_kernel_vm();

        cpu.proc = None;
        unsafe {
            (*p).stride.pass_value += (*p).stride.stride;
        }
        t.insert_tail(p);
        t.update_min_pass_value();
    }
    t.lock.release();
}

/// spec.md §4.F: runs once per CPU after bring-up; never returns.
pub fn scheduler(switcher: &mut dyn ContextSwitch) -> ! {
    let cpu = mycpu();
    cpu.proc = None;
    loop {
        intr_on();
        scheduler_step(unsafe { &mut PTABLE }, cpu, switcher);
    }
}

/// Enumerate every process's pid/state/name for debugging (spec.md §6's
/// "debug dump maps them to short labels").
pub fn procdump(t: &PTable) {
    for &p in &t.list {
        let proc = unsafe { &*p };
        let name_len = proc.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let name = core::str::from_utf8(&proc.name[..name_len]).unwrap_or("?");
        crate::printf!("{} {} {}\n", proc.pid, proc.state().label(), name);
    }
}

// --- Public syscall-facing surface (spec.md §6), wired to the global
// PTABLE/KMEM/KHEAP singletons and the current process. ---

pub fn fork() -> i64 {
    match fork_for(unsafe { &mut PTABLE }, unsafe { &mut KMEM }, unsafe { &mut KHEAP }, myproc()) {
        Some(pid) => pid as i64,
        None => -1,
    }
}

pub fn exit(status: i32, switcher: &mut dyn ContextSwitch) -> ! {
    let _ = status;
    exit_for(unsafe { &mut PTABLE }, switcher, myproc())
}

pub fn wait(switcher: &mut dyn ContextSwitch) -> i64 {
    match wait_for(unsafe { &mut PTABLE }, unsafe { &mut KMEM }, unsafe { &mut KHEAP }, switcher, myproc()) {
        Ok(pid) => pid as i64,
        Err(_) => -1,
    }
}

pub fn yield_now(switcher: &mut dyn ContextSwitch) {
    yield_for(unsafe { &mut PTABLE }, myproc(), switcher)
}

pub fn stride(tickets: i64) -> i64 {
    match assign_tickets(myproc(), tickets) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

pub fn getpid() -> u32 {
    unsafe { (*myproc()).pid }
}

pub fn kill(pid: u32) -> i64 {
    match kill_in(unsafe { &mut PTABLE }, pid) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riscv::PGSIZE;
    use crate::swtch::SimSwitch;

    const ARENA_PAGES: usize = 64;

    #[repr(align(4096))]
    struct Arena([u8; ARENA_PAGES * PGSIZE]);

    // `static mut`, not `Box`: `Box` would allocate through the global
    // `LockedHeap`/`KHEAP` pair, whose fixed 32 KiB capacity can't satisfy
    // this 256 KiB arena (and these tests exercise `KHeap` themselves, via
    // `allocproc`'s own `k_malloc` calls, independently of the global one).
    static mut ARENA: Arena = Arena([0u8; ARENA_PAGES * PGSIZE]);

    /// Fresh, independent KMem/KHeap/PTable triple per test, mirroring
    /// kalloc.rs/kheap.rs's own `fresh()` helpers so tests never share
    /// free-list or table state.
    fn fresh() -> (KMem, KHeap, PTable) {
        let lo = unsafe { ARENA.0.as_mut_ptr() };
        let hi = unsafe { lo.add(ARENA_PAGES * PGSIZE) };
        let mut kmem = KMem::create();
        kmem.kinit1(lo, hi);
        (kmem, KHeap::create(), PTable::create())
    }

    #[test_case]
    fn allocproc_assigns_unique_increasing_pids() {
        let (mut kmem, mut heap, mut t) = fresh();
        let a = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        let b = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        unsafe {
            assert!((*b).pid > (*a).pid);
            assert_eq!((*a).stride.tickets, DEFAULT_TICKETS);
            assert_eq!((*a).stride.stride, LARGE / DEFAULT_TICKETS);
        }
    }

    #[test_case]
    fn assign_tickets_rejects_zero() {
        let (mut kmem, mut heap, mut t) = fresh();
        let p = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        assert_eq!(assign_tickets(p, 0), Err(KernelError::InvalidTickets));
        assert_eq!(assign_tickets(p, -5), Err(KernelError::InvalidTickets));
        assert!(assign_tickets(p, 50).is_ok());
        unsafe {
            assert_eq!((*p).stride.stride, LARGE / 50);
        }
    }

    #[test_case]
    fn assign_tickets_does_not_reset_pass_value() {
        let (mut kmem, mut heap, mut t) = fresh();
        let p = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        unsafe {
            (*p).stride.pass_value = 500;
        }
        assign_tickets(p, 25).unwrap();
        unsafe {
            assert_eq!((*p).stride.pass_value, 500);
        }
    }

    #[test_case]
    fn remove_min_prefers_lowest_pass_value_with_stable_ties() {
        let (mut kmem, mut heap, mut t) = fresh();
        let a = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        let b = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        let c = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        unsafe {
            (*a).state = ProcState::Runnable;
            (*b).state = ProcState::Runnable;
            (*c).state = ProcState::Runnable;
            (*a).stride.pass_value = 10;
            (*b).stride.pass_value = 10;
            (*c).stride.pass_value = 20;
        }
        // a and b tie at 10; a was inserted first, so it wins.
        let picked = t.remove_min().unwrap();
        assert_eq!(picked, a);
        assert_eq!(t.len(), 2);
    }

    #[test_case]
    fn update_min_pass_value_floors_to_zero_when_nothing_runnable() {
        let (mut kmem, mut heap, mut t) = fresh();
        let p = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        unsafe {
            (*p).state = ProcState::Sleeping;
            (*p).stride.pass_value = 999;
        }
        t.update_min_pass_value();
        assert_eq!(t.min_pass_value(), 0);
    }

    #[test_case]
    fn higher_tickets_get_dispatched_more_often() {
        let (mut kmem, mut heap, mut t) = fresh();
        let low = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        let high = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        assign_tickets(low, 50).unwrap();
        assign_tickets(high, 300).unwrap();
        unsafe {
            (*low).state = ProcState::Runnable;
            (*high).state = ProcState::Runnable;
        }

        let mut cpu = Cpu::create();
        let mut sw = SimSwitch::default();
        let mut low_runs = 0;
        let mut high_runs = 0;
        for _ in 0..400 {
            // Re-mark runnable: scheduler_step leaves the dispatched
            // process RUNNING, and SimSwitch never really "returns" into
            // its own code to mark itself RUNNABLE again.
            for &p in &t.list {
                unsafe {
                    if (*p).state != ProcState::Zombie {
                        (*p).state = ProcState::Runnable;
                    }
                }
            }
            let before_low = unsafe { (*low).pass_value() };
            let before_high = unsafe { (*high).pass_value() };
            scheduler_step(&mut t, &mut cpu, &mut sw);
            unsafe {
                if (*low).pass_value() != before_low {
                    low_runs += 1;
                }
                if (*high).pass_value() != before_high {
                    high_runs += 1;
                }
            }
        }
        assert!(high_runs > low_runs, "high={} low={}", high_runs, low_runs);
    }

    #[test_case]
    fn fork_joins_at_current_pass_value_floor() {
        let (mut kmem, mut heap, mut t) = fresh();
        let parent = userinit(&mut t, &mut kmem, &mut heap);
        unsafe {
            (*parent).state = ProcState::Running;
        }
        t.min_pass_value = 777;

        let pid = fork_for(&mut t, &mut kmem, &mut heap, parent).unwrap();
        let child = t.list.iter().copied().find(|&p| unsafe { (*p).pid } == pid).unwrap();
        unsafe {
            assert_eq!((*child).pass_value(), 777);
            assert_eq!((*child).parent, parent);
            assert_eq!((*child).trapframe.a0, 0);
            assert_eq!((*child).state, ProcState::Runnable);
        }
    }

    #[test_case]
    fn wait_with_no_children_fails_immediately() {
        let (mut kmem, mut heap, mut t) = fresh();
        let p = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        let mut sw = SimSwitch::default();
        let result = wait_for(&mut t, &mut kmem, &mut heap, &mut sw, p);
        assert_eq!(result, Err(KernelError::NoChildren));
    }

    #[test_case]
    fn wait_reaps_zombie_child_and_returns_its_pid() {
        let (mut kmem, mut heap, mut t) = fresh();
        let parent = userinit(&mut t, &mut kmem, &mut heap);
        let child_pid = fork_for(&mut t, &mut kmem, &mut heap, parent).unwrap();
        let child = t.list.iter().copied().find(|&p| unsafe { (*p).pid } == child_pid).unwrap();
        unsafe {
            (*child).state = ProcState::Zombie;
        }

        let before_len = t.len();
        let mut sw = SimSwitch::default();
        let result = wait_for(&mut t, &mut kmem, &mut heap, &mut sw, parent);
        assert_eq!(result, Ok(child_pid));
        assert_eq!(t.len(), before_len - 1);
    }

    #[test_case]
    fn kill_wakes_a_sleeping_process() {
        let (mut kmem, mut heap, mut t) = fresh();
        let p = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        unsafe {
            (*p).state = ProcState::Sleeping;
            (*p).chan = Some(0x1234);
        }
        let pid = unsafe { (*p).pid };
        kill_in(&mut t, pid).unwrap();
        unsafe {
            assert!((*p).killed);
            assert_eq!((*p).state, ProcState::Runnable);
        }
    }

    #[test_case]
    fn kill_unknown_pid_fails() {
        let (mut _kmem, mut _heap, mut t) = fresh();
        assert_eq!(kill_in(&mut t, 9999), Err(KernelError::NoSuchPid));
    }

    #[test_case]
    fn wakeup_only_disturbs_matching_channel() {
        let (mut kmem, mut heap, mut t) = fresh();
        let a = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        let b = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        unsafe {
            (*a).state = ProcState::Sleeping;
            (*a).chan = Some(1);
            (*b).state = ProcState::Sleeping;
            (*b).chan = Some(2);
        }
        t.wakeup1(1);
        unsafe {
            assert_eq!((*a).state, ProcState::Runnable);
            assert_eq!((*b).state, ProcState::Sleeping);
        }
    }

    #[test_case]
    #[should_panic]
    fn exit_by_init_process_panics() {
        let (mut kmem, mut heap, mut t) = fresh();
        let init = userinit(&mut t, &mut kmem, &mut heap);
        let mut sw = SimSwitch::default();
        exit_for(&mut t, &mut sw, init);
    }

    #[test_case]
    fn allocproc_exhausts_heap_and_recovers_on_free() {
        let (mut kmem, mut heap, mut t) = fresh();
        let mut procs = Vec::new();
        while let Some(p) = allocproc(&mut t, &mut kmem, &mut heap) {
            procs.push(p);
        }
        assert!(!procs.is_empty());
        let last = procs.pop().unwrap();
        abandon(&mut t, &mut kmem, &mut heap, last);
        assert!(allocproc(&mut t, &mut kmem, &mut heap).is_some());
    }

    /// S2: a parent that forks three children can `wait()` each of their
    /// pids back exactly once, in any order, and a fourth `wait()` once
    /// they're all reaped returns `NoChildren`.
    #[test_case]
    fn wait_collects_every_child_exactly_once_then_fails() {
        let (mut kmem, mut heap, mut t) = fresh();
        let parent = userinit(&mut t, &mut kmem, &mut heap);
        unsafe {
            (*parent).state = ProcState::Running;
        }

        let mut pids = Vec::new();
        for _ in 0..3 {
            let pid = fork_for(&mut t, &mut kmem, &mut heap, parent).unwrap();
            pids.push(pid);
            let child = t.list.iter().copied().find(|&p| unsafe { (*p).pid } == pid).unwrap();
            unsafe {
                (*child).state = ProcState::Zombie;
            }
        }

        let mut sw = SimSwitch::default();
        let mut reaped = Vec::new();
        for _ in 0..3 {
            reaped.push(wait_for(&mut t, &mut kmem, &mut heap, &mut sw, parent).unwrap());
        }
        reaped.sort();
        pids.sort();
        assert_eq!(reaped, pids);

        assert_eq!(wait_for(&mut t, &mut kmem, &mut heap, &mut sw, parent), Err(KernelError::NoChildren));
    }

    /// S3: sleep/wakeup never loses a wakeup across many repeated cycles —
    /// each time a process sleeps on a channel, a `wakeup1` targeting that
    /// same channel moves it back to RUNNABLE.
    #[test_case]
    fn repeated_sleep_wakeup_cycles_never_lose_a_wakeup() {
        let (mut kmem, mut heap, mut t) = fresh();
        let p = allocproc(&mut t, &mut kmem, &mut heap).unwrap();
        let chan = 0xfeed;
        for _ in 0..1000 {
            unsafe {
                (*p).state = ProcState::Sleeping;
                (*p).chan = Some(chan);
            }
            t.wakeup1(chan);
            unsafe {
                assert_eq!((*p).state, ProcState::Runnable);
            }
        }
    }
}
