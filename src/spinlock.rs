// Mutual-exclusion spin lock, ported from the one generation of the teacher
// tree that implements this completely (`src/kernel/spinlock.rs`), adapted
// to identify the holding CPU by its stable index into `CPUS` rather than a
// raw `*mut Cpu`, matching this crate's slab-of-processes/array-of-cpus
// design (spec.md §9's "single owning container... stable indices").

use crate::proc::cpuid;
use crate::riscv::{__sync_lock_release, __sync_lock_test_and_set, __sync_synchronize, intr_get, intr_off, intr_on};

#[derive(Copy, Clone)]
pub struct Spinlock {
    locked: u64, // Is the lock held?

    // For debugging:
    name: &'static str, // Name of lock.
    cpu: Option<usize>, // Index of the cpu holding the lock.
}

impl Spinlock {
    pub const fn init_lock(name: &'static str) -> Self {
        Spinlock {
            locked: 0,
            name,
            cpu: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock. Loops (spins) until the lock is acquired.
    pub fn acquire(&mut self) {
        push_off(); // disable interrupts to avoid deadlock.
        if self.holding() {
            panic!("acquire");
        }

        // On RISC-V, sync_lock_test_and_set turns into an atomic swap.
        while __sync_lock_test_and_set(&mut self.locked, 1) != 0 {}

        // Ensure the critical section's memory references happen strictly
        // after the lock is acquired.
        __sync_synchronize();

        self.cpu = Some(cpuid());
    }

    /// Release the lock.
    pub fn release(&mut self) {
        if !self.holding() {
            panic!("release");
        }

        self.cpu = None;

        __sync_synchronize();
        __sync_lock_release(&self.locked);

        pop_off();
    }

    /// Check whether this cpu is holding the lock. Interrupts must be off.
    pub fn holding(&self) -> bool {
        self.locked == 1 && self.cpu == Some(cpuid())
    }
}

/// push_off/pop_off are like intr_off()/intr_on() except that they are
/// matched: it takes two pop_off()s to undo two push_off()s. Also, if
/// interrupts are initially off, then push_off, pop_off leaves them off.
pub fn push_off() {
    let old = intr_get();

    intr_off();
    let cpu = crate::proc::mycpu();
    if cpu.noff == 0 {
        cpu.intena = old;
    }
    cpu.noff += 1;
}

pub fn pop_off() {
    let cpu = crate::proc::mycpu();
    if intr_get() {
        panic!("pop_off - interruptible");
    }

    if cpu.noff < 1 {
        panic!("pop_off");
    }
    cpu.noff -= 1;
    if cpu.noff == 0 && cpu.intena {
        intr_on();
    }
}
