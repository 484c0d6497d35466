// SiFive test-exit MMIO device (QEMU `virt` machine), used only by the
// custom test runner to end a QEMU run with a pass/fail status. Grounded
// in `examples/Erio-Harrison-rust-os/src/test_device.rs`.

use core::ptr::write_volatile;

const SIFIVE_TEST_BASE: usize = 0x10_0000;

const TEST_EXIT_PASS: u32 = 0x5555;
const TEST_EXIT_FAIL: u32 = 0x3333;

pub fn exit_pass() -> ! {
    crate::printf!("test run passed, exiting qemu\n");
    unsafe {
        write_reg(TEST_EXIT_PASS);
    }
    loop {}
}

pub fn exit_fail() -> ! {
    crate::printf!("test run failed, exiting qemu\n");
    unsafe {
        write_reg(TEST_EXIT_FAIL);
    }
    loop {}
}

unsafe fn write_reg(val: u32) {
    write_volatile(SIFIVE_TEST_BASE as *mut u32, val)
}
