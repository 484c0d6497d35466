// MMU / address-space collaborator (ambient — spec.md §6 keeps the MMU
// abstract: "out of scope... implementers should provide equivalents").
// `AddressSpace` names exactly the operations spec.md §6 lists
// (`setup_kernel_vm`, `init_user_vm`, `alloc_user_vm`, `dealloc_user_vm`,
// `copy_user_vm`, `free_vm`, `switch_user_vm`, `switch_kernel_vm`).
//
// `FrameListSpace` is grounded in the teacher's `vm.rs`, which backs every
// page-table page through `KMEM.kalloc()`/`KMEM.kfree()`; this keeps the
// same backing mechanism without the Sv39 page-table-walk bookkeeping
// spec.md declares out of scope, which lets `fork`/`growproc`/`wait`/`exit`
// exercise real frame accounting end-to-end (spec.md §8 invariant 1).

use alloc::vec::Vec;

use crate::kalloc::KMem;
use crate::riscv::PGSIZE;

pub trait AddressSpace {
    fn setup_kernel_vm() -> Self;
    fn init_user_vm(&mut self, kmem: &mut KMem, image: &[u8]) -> bool;
    fn alloc_user_vm(&mut self, kmem: &mut KMem, old_sz: usize, new_sz: usize) -> Option<usize>;
    fn dealloc_user_vm(&mut self, kmem: &mut KMem, old_sz: usize, new_sz: usize) -> usize;
    fn copy_user_vm(&self, kmem: &mut KMem, sz: usize) -> Option<Self>
    where
        Self: Sized;
    fn free_vm(&mut self, kmem: &mut KMem);
    fn switch_user_vm(&self);
    fn switch_kernel_vm();
}

/// A process's user virtual memory, represented as the list of physical
/// frames backing it rather than a real Sv39 page table. `frames.len() *
/// PGSIZE` is always `>= size` and `< size + PGSIZE`.
pub struct FrameListSpace {
    frames: Vec<*mut u8>,
    size: usize,
}

fn frames_for(bytes: usize) -> usize {
    (bytes + PGSIZE - 1) / PGSIZE
}

impl AddressSpace for FrameListSpace {
    /// The kernel's own address space owns no user frames; it's
    /// represented here purely so `switch_kernel_vm` has a symmetrical
    /// counterpart to call.
    fn setup_kernel_vm() -> Self {
        FrameListSpace {
            frames: Vec::new(),
            size: 0,
        }
    }

    /// Load the built-in init program's image into a freshly allocated
    /// single frame, matching `userinit`'s "fresh user VM" step.
    fn init_user_vm(&mut self, kmem: &mut KMem, image: &[u8]) -> bool {
        debug_assert!(self.frames.is_empty());
        let frame = match kmem.kalloc() {
            Some(f) => f,
            None => return false,
        };
        unsafe {
            core::ptr::write_bytes(frame, 0, PGSIZE);
            let n = core::cmp::min(image.len(), PGSIZE);
            core::ptr::copy_nonoverlapping(image.as_ptr(), frame, n);
        }
        self.frames.push(frame);
        self.size = image.len();
        true
    }

    /// Grow (`new_sz > old_sz`) or shrink (`new_sz < old_sz`) the frame
    /// list to cover `new_sz` bytes. Returns `None` (`growproc`'s
    /// `OutOfMemory`) if a frame can't be obtained, after releasing any
    /// frames it had already added for this call.
    fn alloc_user_vm(&mut self, kmem: &mut KMem, old_sz: usize, new_sz: usize) -> Option<usize> {
        debug_assert_eq!(old_sz, self.size);
        if new_sz < old_sz {
            return Some(self.dealloc_user_vm(kmem, old_sz, new_sz));
        }

        let target_frames = frames_for(new_sz);
        let mut added = Vec::new();
        while self.frames.len() + added.len() < target_frames {
            match kmem.kalloc() {
                Some(f) => added.push(f),
                None => {
                    for f in added {
                        kmem.kfree(f);
                    }
                    return None;
                }
            }
        }
        self.frames.extend(added);
        self.size = new_sz;
        Some(new_sz)
    }

    /// Shrink the frame list, freeing every frame no longer covered by
    /// `new_sz`.
    fn dealloc_user_vm(&mut self, kmem: &mut KMem, old_sz: usize, new_sz: usize) -> usize {
        debug_assert_eq!(old_sz, self.size);
        let target_frames = frames_for(new_sz);
        while self.frames.len() > target_frames {
            if let Some(f) = self.frames.pop() {
                kmem.kfree(f);
            }
        }
        self.size = new_sz;
        new_sz
    }

    /// `fork`'s VM copy: a fresh frame list of the same length, each frame
    /// byte-for-byte identical to this one's. Returns `None` if a frame
    /// can't be obtained partway through, after releasing whatever it had
    /// already allocated.
    fn copy_user_vm(&self, kmem: &mut KMem, sz: usize) -> Option<Self> {
        let mut copy = Vec::with_capacity(self.frames.len());
        for &src in &self.frames {
            match kmem.kalloc() {
                Some(dst) => {
                    unsafe {
                        core::ptr::copy_nonoverlapping(src, dst, PGSIZE);
                    }
                    copy.push(dst);
                }
                None => {
                    for f in copy {
                        kmem.kfree(f);
                    }
                    return None;
                }
            }
        }
        Some(FrameListSpace { frames: copy, size: sz })
    }

    /// Release every frame this address space owns. Called by `exit`/
    /// `wait` when tearing down a process's user VM.
    fn free_vm(&mut self, kmem: &mut KMem) {
        for f in self.frames.drain(..) {
            kmem.kfree(f);
        }
        self.size = 0;
    }

    /// Real Sv39 `satp` reprogramming is out of scope (spec.md §1); this
    /// is a deliberate no-op standing in for it so `proc.rs`'s call sites
    /// compile and exercise their surrounding lock discipline.
    fn switch_user_vm(&self) {}

    fn switch_kernel_vm() {}
}
