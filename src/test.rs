// Custom test-framework harness (`#![feature(custom_test_frameworks)]`,
// used throughout kalloc.rs/kheap.rs/mmu.rs/swtch.rs/proc.rs's `#[test_case]`
// modules). Grounded in
// `examples/Erio-Harrison-rust-os/src/test.rs`, adapted to this crate's
// `printf!` macro instead of `println!`/`print!`.

pub trait Testable {
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        crate::printf!("{}...\t", core::any::type_name::<T>());
        self();
        crate::printf!("[ok]\n");
    }
}

pub fn test_runner(tests: &[&dyn Testable]) {
    crate::printf!("running {} tests\n", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

pub fn test_panic_handler(info: &core::panic::PanicInfo) -> ! {
    crate::printf!("[failed]\n");
    crate::printf!("{}\n", info);
    exit_qemu(QemuExitCode::Failed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub fn exit_qemu(code: QemuExitCode) -> ! {
    match code {
        QemuExitCode::Success => crate::test_device::exit_pass(),
        QemuExitCode::Failed => crate::test_device::exit_fail(),
    }
}
