// Object heap allocator (spec.md §4.B): a K&R boundary-tag first-fit
// allocator rearchitected on top of §4.A's page allocator instead of
// `sbrk`. Grounded entirely in `examples/original_source/kalloc.c`'s
// `k_malloc`/`k_free`/`kmorecore` — the teacher's Rust port never carried
// this half of the original allocator over, only the page allocator
// survived.
//
// Deliberately unlocked (spec.md §4.B): every current caller
// (`proc.rs::allocproc`) already serializes through `ptable.lock`. A
// `GlobalAlloc` adapter below gives the `alloc` crate (used by tests, and
// by any future caller outside `ptable.lock`) its own lock rather than
// reaching into the unlocked fast path `proc.rs` relies on.

use core::alloc::{GlobalAlloc, Layout};
use core::mem::size_of;
use core::ptr;

use crate::kalloc::KMem;
use crate::param::{HEAP_FRAMES, HEAP_PAYLOAD_FRAMES};
use crate::riscv::PGSIZE;
use crate::spinlock::Spinlock;

#[repr(C)]
struct Header {
    next: *mut Header,
    size: usize, // in units of size_of::<Header>(), including this header's own unit
}

const UNIT_SIZE: usize = size_of::<Header>();

/// Units handed out by the first (and only) successful `morecore` call:
/// all `HEAP_PAYLOAD_FRAMES` frames' worth of bytes, expressed in units of
/// this platform's `Header` size. spec.md's original (32-bit, 8-byte
/// `Header`) source hardcodes this as 4096; a 64-bit `Header` is larger, so
/// the unit count differs, but the invariant it encodes — one free chunk
/// spanning exactly the heap's fixed payload capacity — is preserved.
const FIRST_GROWTH_UNITS: usize = (HEAP_PAYLOAD_FRAMES * PGSIZE) / UNIT_SIZE;

pub struct KHeap {
    freep: *mut Header,
    base_p: *mut Header,
    sbrk_addr: *mut u8,
    grown: bool,
}

unsafe impl Sync for KHeap {}

pub static mut KHEAP: KHeap = KHeap::create();

impl KHeap {
    pub const fn create() -> Self {
        Self {
            freep: ptr::null_mut(),
            base_p: ptr::null_mut(),
            sbrk_addr: ptr::null_mut(),
            grown: false,
        }
    }

    /// Claim the nine bootstrap frames from `kmem` and install the anchor
    /// chunk. Only ever runs once (guarded by `freep.is_null()`); a caller
    /// that races this on two CPUs must already hold `ptable.lock`, per
    /// this module's unlocked design.
    fn bootstrap(&mut self, kmem: &mut KMem) -> bool {
        let mut frames = [ptr::null_mut::<u8>(); HEAP_FRAMES];
        for slot in frames.iter_mut() {
            match kmem.kalloc() {
                Some(f) => *slot = f,
                None => return false,
            }
        }
        self.sbrk_addr = frames[HEAP_PAYLOAD_FRAMES - 1];
        self.base_p = frames[HEAP_FRAMES - 1] as *mut Header;
        unsafe {
            (*self.base_p).next = self.base_p;
            (*self.base_p).size = 0;
        }
        self.freep = self.base_p;
        true
    }

    /// Extend the heap by splicing `sbrk_addr`'s frames into the free list
    /// as one large chunk. Succeeds exactly once; every later call (the
    /// heap is fixed-capacity, spec.md §9 "Heap sizing") returns `None`.
    fn morecore(&mut self, nunits: usize) -> Option<*mut Header> {
        if self.grown {
            return None;
        }
        self.grown = true;

        let nu = core::cmp::max(nunits, FIRST_GROWTH_UNITS);
        let hp = self.sbrk_addr as *mut Header;
        unsafe {
            (*hp).size = nu;
        }
        self.k_free(unsafe { hp.add(1) } as *mut u8);
        Some(self.freep)
    }

    /// Allocate `nbytes` of kernel memory. Rounds up to whole units and
    /// adds one unit of header overhead; a zero-byte request still
    /// consumes a full header-plus-payload unit pair (spec.md §8's boundary
    /// behavior) rather than returning a pointer into the anchor chunk.
    pub fn k_malloc(&mut self, kmem: &mut KMem, nbytes: usize) -> Option<*mut u8> {
        let payload_units = if nbytes == 0 {
            1
        } else {
            (nbytes + UNIT_SIZE - 1) / UNIT_SIZE
        };
        let nunits = payload_units + 1;

        if self.freep.is_null() && !self.bootstrap(kmem) {
            return None;
        }

        let mut prevp = self.freep;
        let mut p = unsafe { (*prevp).next };
        loop {
            unsafe {
                if (*p).size >= nunits {
                    if (*p).size == nunits {
                        (*prevp).next = (*p).next;
                    } else {
                        (*p).size -= nunits;
                        p = (p as *mut u8).add((*p).size * UNIT_SIZE) as *mut Header;
                        (*p).size = nunits;
                    }
                    self.freep = prevp;
                    return Some(p.add(1) as *mut u8);
                }
            }

            if p == self.freep {
                match self.morecore(nunits) {
                    Some(new_p) => p = new_p,
                    None => return None,
                }
            }

            prevp = p;
            p = unsafe { (*p).next };
        }
    }

    /// Free a chunk previously returned by `k_malloc`, coalescing with
    /// physically adjacent free neighbors and leaving `freep` at the
    /// predecessor.
    pub fn k_free(&mut self, ap: *mut u8) {
        let bp = unsafe { (ap as *mut Header).sub(1) };

        let mut p = self.freep;
        loop {
            let p_next = unsafe { (*p).next };
            if bp > p && bp < p_next {
                break;
            }
            if p >= p_next && (bp > p || bp < p_next) {
                break;
            }
            p = p_next;
        }

        unsafe {
            let p_next = (*p).next;
            if bp.add((*bp).size) == p_next {
                (*bp).size += (*p_next).size;
                (*bp).next = (*p_next).next;
            } else {
                (*bp).next = p_next;
            }

            if p.add((*p).size) == bp {
                (*p).size += (*bp).size;
                (*p).next = (*bp).next;
            } else {
                (*p).next = bp;
            }
        }

        self.freep = p;
    }
}

/// `GlobalAlloc` adapter so the `alloc` crate (tests, and any caller
/// outside `ptable.lock`) can use this heap without relying on the
/// ambient `ptable.lock` the process lifecycle code serializes through.
pub struct LockedHeap {
    lock: Spinlock,
}

impl LockedHeap {
    pub const fn new() -> Self {
        Self {
            lock: Spinlock::init_lock("kheap"),
        }
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // Every chunk `k_malloc` hands back sits at a multiple of
        // `UNIT_SIZE` from a frame-aligned `base_p`, so that's the
        // strictest alignment this heap can promise. A caller asking for
        // more (e.g. a page-aligned buffer) can't be satisfied here; fail
        // cleanly rather than silently hand back an under-aligned
        // pointer, which the `GlobalAlloc` contract forbids.
        if layout.align() > UNIT_SIZE {
            return ptr::null_mut();
        }
        let lock = &mut *(&self.lock as *const Spinlock as *mut Spinlock);
        lock.acquire();
        let out = KHEAP.k_malloc(&mut crate::kalloc::KMEM, layout.size());
        lock.release();
        out.unwrap_or(ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let lock = &mut *(&self.lock as *const Spinlock as *mut Spinlock);
        lock.acquire();
        KHEAP.k_free(ptr);
        lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARENA_PAGES: usize = HEAP_FRAMES + 2;

    #[repr(align(4096))]
    struct Arena([u8; ARENA_PAGES * PGSIZE]);

    // `static mut`, not `Box`: this is the arena backing the very heap
    // `LockedHeap::alloc` routes the `alloc` crate through, so a `Box`
    // allocation here would recurse into the allocator under test at a
    // size (44 KiB) its fixed 32 KiB capacity can never satisfy.
    static mut ARENA: Arena = Arena([0u8; ARENA_PAGES * PGSIZE]);

    fn fresh() -> (KMem, KHeap) {
        let lo = unsafe { ARENA.0.as_mut_ptr() };
        let hi = unsafe { lo.add(ARENA_PAGES * PGSIZE) };
        let mut kmem = KMem::create();
        kmem.kinit1(lo, hi);
        (kmem, KHeap::create())
    }

    #[test_case]
    fn malloc_zero_consumes_one_unit_pair_not_the_anchor() {
        let (mut kmem, mut heap) = fresh();
        let p = heap.k_malloc(&mut kmem, 0).unwrap();
        assert_ne!(p as *mut Header, heap.base_p);
    }

    #[test_case]
    fn malloc_then_free_round_trips() {
        let (mut kmem, mut heap) = fresh();
        let p = heap.k_malloc(&mut kmem, 64).unwrap();
        unsafe {
            ptr::write_bytes(p, 0x42, 64);
        }
        heap.k_free(p);
        // the same request should succeed again, proving the space came back
        let p2 = heap.k_malloc(&mut kmem, 64).unwrap();
        assert_eq!(p, p2);
    }

    #[test_case]
    fn exhaustion_is_bounded_by_nine_frames_and_recovers_on_free() {
        let (mut kmem, mut heap) = fresh();
        let chunk = 256usize;
        let mut handed_out = alloc::vec::Vec::new();
        loop {
            match heap.k_malloc(&mut kmem, chunk) {
                Some(p) => handed_out.push(p),
                None => break,
            }
        }
        assert!(!handed_out.is_empty());
        let total_bytes: usize = handed_out.len() * (chunk + UNIT_SIZE);
        assert!(total_bytes <= HEAP_PAYLOAD_FRAMES * PGSIZE + UNIT_SIZE);

        let freed = handed_out.pop().unwrap();
        heap.k_free(freed);
        assert!(heap.k_malloc(&mut kmem, chunk).is_some());
    }

    #[test_case]
    fn adjacent_frees_coalesce() {
        let (mut kmem, mut heap) = fresh();
        let a = heap.k_malloc(&mut kmem, 32).unwrap();
        let b = heap.k_malloc(&mut kmem, 32).unwrap();
        let c = heap.k_malloc(&mut kmem, 32).unwrap();
        heap.k_free(a);
        heap.k_free(b);
        heap.k_free(c);
        // fully coalesced back to (close to) the original single big chunk:
        // a request for all three payloads back-to-back must succeed.
        let big = heap.k_malloc(&mut kmem, 32 * 3 + UNIT_SIZE * 2);
        assert!(big.is_some());
    }
}
