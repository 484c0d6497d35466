// Context switch collaborator (ambient — spec.md §6 names `swtch`,
// `forkret`, `trapret` as out-of-scope external collaborators). This
// module defines the saved-register record and a trait the scheduler loop
// (`proc.rs`) is written against, so its lock-discipline and state-machine
// logic is exercised the same way whether the switcher is the real
// asm-based one or a test double.
//
// `Context`'s field layout is lifted verbatim from the teacher's
// `kernel/src/proc.rs` (`ra`, `sp`, twelve callee-saved `s` registers) —
// the RISC-V calling convention's callee-saved set, the same set
// `switch.S` would spill/restore in the teacher's intended (never
// completed) hookup.

#[derive(Copy, Clone, Default)]
#[repr(C)]
pub struct Context {
    pub ra: u64,
    pub sp: u64,

    // callee-saved
    pub s0: u64,
    pub s1: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
}

impl Context {
    pub const fn zeroed() -> Self {
        Context {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
        }
    }
}

/// Swap the current callee-saved register set for another, transferring
/// control to the code whose registers `to` describes. `proc.rs`'s
/// scheduler loop and `sched()` are written against this trait rather than
/// a concrete switcher.
pub trait ContextSwitch {
    fn swtch(&mut self, from: &mut Context, to: &Context);
}

/// The freestanding kernel's switcher: a real asm trampoline that spills
/// the current callee-saved registers into `from` and loads `to`'s,
/// exactly like the teacher's intended `switch.S`. The trampoline itself
/// (`asm/switch.S`) is one of the `.S` files the retrieved teacher tree
/// never carried; this struct is the Rust-side half of that hookup and
/// compiles against the `extern "C"` symbol regardless of whether the
/// assembly file is present at link time.
pub struct AsmSwitch;

extern "C" {
    fn swtch(from: *mut Context, to: *const Context);
}

impl ContextSwitch for AsmSwitch {
    fn swtch(&mut self, from: &mut Context, to: &Context) {
        unsafe {
            swtch(from as *mut Context, to as *const Context);
        }
    }
}

/// Test double used by `proc.rs`'s `#[test_case]` functions. Real stackful
/// context switching can't be exercised meaningfully inside a
/// single-threaded host test runner, so this records the transition
/// instead of touching any stack: `from` is overwritten with a sentinel
/// marking "resumed here", and `to` is copied out so tests can assert on
/// which context was switched to without ever jumping through it.
#[derive(Default)]
pub struct SimSwitch {
    pub switches: usize,
    pub last_to: Context,
}

impl ContextSwitch for SimSwitch {
    fn swtch(&mut self, from: &mut Context, to: &Context) {
        *from = Context::zeroed();
        self.last_to = *to;
        self.switches += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn sim_switch_records_each_transition() {
        let mut sw = SimSwitch::default();
        let mut a = Context { ra: 1, ..Context::zeroed() };
        let b = Context { ra: 2, ..Context::zeroed() };
        sw.swtch(&mut a, &b);
        assert_eq!(sw.switches, 1);
        assert_eq!(sw.last_to.ra, 2);
        assert_eq!(a.ra, 0);
    }
}
