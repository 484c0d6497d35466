#![no_std]
#![no_main]
#![feature(panic_info_message)]
#![feature(strict_provenance)]
#![feature(const_mut_refs)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

mod asm;
mod riscv;
mod memlayout;
mod param;
mod uart;
mod start;
mod spinlock;
mod proc;
mod console;
mod printf;
mod kalloc;
mod kheap;
mod mmu;
mod swtch;
mod string;
mod error;
mod logger;

#[cfg(test)]
mod test;
#[cfg(test)]
mod test_device;

use core::sync::atomic::{AtomicBool, Ordering};

use crate::kheap::LockedHeap;
use crate::printf::Printer;
use crate::proc::cpuid;
use crate::riscv::__sync_synchronize;
use crate::swtch::AsmSwitch;

#[no_mangle]
extern "C" fn eh_personality() {}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    #[cfg(test)]
    {
        test::test_panic_handler(info);
    }
    #[cfg(not(test))]
    {
        printf!("Aborting: \n");
        if let Some(p) = info.location() {
            printf!(
                "line {}, file {}: {}\n",
                p.line(),
                p.file(),
                info.message().unwrap()
            );
        } else {
            printf!("no information available.\n");
        }
        abort();
    }
}

#[no_mangle]
extern "C" fn abort() -> ! {
    loop {
        unsafe { core::arch::asm!("wfi") }
    }
}

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::new();

static STARTED: AtomicBool = AtomicBool::new(false);

#[no_mangle]
pub extern "C" fn kmain() {
    if cpuid() == 0 {
        Printer::init();
        logger::init();
        printf!("\nkernel is booting...\n\n");

        let early_stop = core::cmp::min(memlayout::EARLY_PHYSTOP, memlayout::PHYSTOP);
        unsafe {
            kalloc::KMEM.kinit1(memlayout::end_of_kernel(), early_stop as *mut u8);
            kalloc::KMEM.kinit2(early_stop as *mut u8, memlayout::PHYSTOP as *mut u8);
        }
        log::debug!("Kernel memory initialized.");

        proc::procinit(); // process table
        log::debug!("Processes initialized");

        unsafe {
            proc::userinit(&mut proc::PTABLE, &mut kalloc::KMEM, &mut kheap::KHEAP);
        }
        log::debug!("First user process initialized");

        __sync_synchronize();
        STARTED.store(true, Ordering::Relaxed);
        printf!("\nsystem boot successful\n");
    } else {
        while !STARTED.load(Ordering::Relaxed) {}

        __sync_synchronize();
        printf!("hart {} starting\n", cpuid());
    }

    #[cfg(test)]
    test_main();

    let mut switcher = AsmSwitch;
    proc::scheduler(&mut switcher);
}