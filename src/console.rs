// Locked console writer over the UART, trimmed from the teacher's newer
// generation (`kernel/src/console.rs`) down to the write side: the
// `Devsw`/file-table plumbing and line-buffered input path belong to the
// filesystem/device layer spec.md §1 places out of scope, so only `putc`
// and the `core::fmt::Write` impl `printf!` needs survive.

use core::fmt::{Error, Write};

use crate::uart::Uart;

const BACKSPACE: u16 = 0x100;

pub struct Console {
    uart: Uart,
}

impl Console {
    pub const fn create() -> Self {
        Self {
            uart: Uart::create(),
        }
    }

    pub fn init() {
        Uart::init();
    }

    /// Send one character to the uart. Called by `printf!` and to echo
    /// input characters.
    pub fn putc(&mut self, c: u16) {
        if c == BACKSPACE {
            self.uart.putc_sync(0x08); // ascii \b
            self.uart.putc_sync(0x20); // ascii space
            self.uart.putc_sync(0x08); // ascii \b
        } else {
            self.uart.putc_sync(c as u8);
        }
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> Result<(), Error> {
        for c in s.bytes() {
            self.putc(c as u16);
        }
        Ok(())
    }
}
