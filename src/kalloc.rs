// Page frame allocator (spec.md §4.A): a LIFO free list of 4 KiB frames,
// two-phase init (`kinit1` populates the early-mapped range with locking
// disabled; `kinit2` populates the rest with locking enabled), `0x01`
// poisoning on free, no zeroing on alloc.
//
// Grounded on the teacher's `kernel/src/kalloc.rs` (`KMem`/`Run`/
// `freerange` shape), with the two-phase `use_lock` split and the exact
// `InvalidFree` bounds check recovered from
// `examples/original_source/kalloc.c`'s `kinit1`/`kinit2`/`kfree`, which the
// teacher's port had collapsed into a single always-locked `kinit()`.
//
// `kfree`'s bounds check is against a caller-supplied `[lo, hi)` range
// (stored at `kinit1` time) rather than the hardcoded `kernel_end`/`PHYSTOP`
// globals, so the same code path exercises both the real boot range and a
// host-side byte arena in tests.

use core::ptr;

use crate::riscv::PGSIZE;
use crate::spinlock::Spinlock;
use crate::string::memset;

struct Run {
    next: *mut Run,
}

pub struct KMem {
    lock: Spinlock,
    freelist: *mut Run,
    use_lock: bool,
    lo_bound: usize,
    hi_bound: usize,
    free_count: usize,
}

unsafe impl Sync for KMem {}

pub static mut KMEM: KMem = KMem::create();

impl KMem {
    pub const fn create() -> Self {
        Self {
            lock: Spinlock::init_lock("kmem"),
            freelist: ptr::null_mut(),
            use_lock: false,
            lo_bound: 0,
            hi_bound: 0,
            free_count: 0,
        }
    }

    /// Phase 1: populate frames covered by the early page mapping, with
    /// locking disabled (single CPU, interrupts off). Records `[lo, hi)` as
    /// the range every subsequent `kfree` is validated against.
    pub fn kinit1(&mut self, lo: *mut u8, hi: *mut u8) {
        self.use_lock = false;
        self.lo_bound = lo as usize;
        self.hi_bound = core::cmp::max(self.hi_bound, hi as usize);
        self.freerange(lo, hi);
    }

    /// Phase 2: populate the rest of physical memory, then turn locking on
    /// for every `kalloc`/`kfree` after this point.
    pub fn kinit2(&mut self, lo: *mut u8, hi: *mut u8) {
        self.hi_bound = core::cmp::max(self.hi_bound, hi as usize);
        self.freerange(lo, hi);
        self.use_lock = true;
    }

    fn freerange(&mut self, pa_start: *mut u8, pa_end: *mut u8) {
        let mut p = pgroundup(pa_start as usize);
        let end = pa_end as usize;
        while p + PGSIZE <= end {
            self.kfree(p as *mut u8);
            p += PGSIZE;
        }
    }

    /// Free the page of physical memory pointed at by `pa`, which normally
    /// should have been returned by a call to `kalloc`. Fatal
    /// (`InvalidFree`, spec.md §7) if `pa` is mis-aligned or outside the
    /// range established at init.
    pub fn kfree(&mut self, pa: *mut u8) {
        let addr = pa as usize;
        if addr % PGSIZE != 0 || addr < self.lo_bound || addr >= self.hi_bound {
            panic!("kfree: invalid free");
        }

        // Fill with junk to catch dangling refs (spec.md §3's poison byte).
        memset(pa, 0x01, PGSIZE);

        let r = pa as *mut Run;

        if self.use_lock {
            self.lock.acquire();
        }
        unsafe {
            (*r).next = self.freelist;
        }
        self.freelist = r;
        self.free_count += 1;
        if self.use_lock {
            self.lock.release();
        }
    }

    /// Allocate one 4096-byte page of physical memory. Returns `None` if
    /// the free list is empty. Never zeroes the returned page.
    pub fn kalloc(&mut self) -> Option<*mut u8> {
        if self.use_lock {
            self.lock.acquire();
        }
        let r = self.freelist;
        if !r.is_null() {
            unsafe {
                self.freelist = (*r).next;
            }
            self.free_count -= 1;
        }
        if self.use_lock {
            self.lock.release();
        }

        if r.is_null() {
            None
        } else {
            Some(r as *mut u8)
        }
    }

    /// Number of frames currently on the free list. Ambient debugging aid,
    /// not part of the original source.
    pub fn frames_free(&self) -> usize {
        self.free_count
    }
}

fn pgroundup(addr: usize) -> usize {
    (addr + PGSIZE - 1) & !(PGSIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARENA_PAGES: usize = 8;

    #[repr(align(4096))]
    struct Arena([u8; ARENA_PAGES * PGSIZE]);

    // Backed by a `static mut`, not the `alloc` crate: the global allocator
    // under test (`kheap::LockedHeap`, wired to the fixed 32 KiB `KHEAP`)
    // cannot itself satisfy a request this large, so routing the test
    // arena through `Box` would deadlock the suite it's meant to exercise.
    // `kinit1` rebuilds the free list from scratch each call, so reusing
    // the same backing storage across the (sequential, single-threaded)
    // test runner is safe.
    static mut ARENA: Arena = Arena([0u8; ARENA_PAGES * PGSIZE]);

    fn fresh_kmem() -> (KMem, *mut u8, *mut u8) {
        let lo = unsafe { ARENA.0.as_mut_ptr() };
        let hi = unsafe { lo.add(ARENA_PAGES * PGSIZE) };
        let mut kmem = KMem::create();
        kmem.kinit1(lo, hi);
        (kmem, lo, hi)
    }

    #[test_case]
    fn kalloc_hands_out_every_arena_frame_then_none() {
        let (mut kmem, ..) = fresh_kmem();
        let mut got = 0;
        while kmem.kalloc().is_some() {
            got += 1;
        }
        assert_eq!(got, ARENA_PAGES);
        assert!(kmem.kalloc().is_none());
    }

    #[test_case]
    fn kfree_after_exhaustion_restores_availability() {
        let (mut kmem, ..) = fresh_kmem();
        let mut frames = alloc::vec::Vec::new();
        while let Some(f) = kmem.kalloc() {
            frames.push(f);
        }
        assert!(kmem.kalloc().is_none());
        let f = frames.pop().unwrap();
        kmem.kfree(f);
        assert!(kmem.kalloc().is_some());
    }

    #[test_case]
    fn freed_frame_reads_as_poison_byte() {
        // S5: allocate a frame, scribble a non-0x01 pattern, free it,
        // reallocate (guaranteed to be the same frame by LIFO ordering),
        // and check every byte reads 0x01.
        let (mut kmem, ..) = fresh_kmem();
        let f = kmem.kalloc().unwrap();
        memset(f, 0xAB, PGSIZE);
        kmem.kfree(f);
        let f2 = kmem.kalloc().unwrap();
        assert_eq!(f2 as usize, f as usize);
        for i in 0..PGSIZE {
            assert_eq!(unsafe { *f2.add(i) }, 0x01);
        }
    }

    #[test_case]
    #[should_panic]
    fn kfree_rejects_misaligned_pointer() {
        let (mut kmem, lo, _hi) = fresh_kmem();
        kmem.kfree(unsafe { lo.add(1) });
    }

    #[test_case]
    #[should_panic]
    fn kfree_rejects_out_of_range_pointer() {
        let (mut kmem, _lo, hi) = fresh_kmem();
        kmem.kfree(hi);
    }

    #[test_case]
    fn no_frame_appears_twice_on_the_free_list() {
        let (mut kmem, ..) = fresh_kmem();
        let mut seen = alloc::vec::Vec::new();
        while let Some(f) = kmem.kalloc() {
            assert!(!seen.contains(&(f as usize)));
            seen.push(f as usize);
        }
    }
}
