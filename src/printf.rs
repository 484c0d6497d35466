use core::fmt::{Arguments, Write};
use crate::console::Console;
use crate::spinlock::Spinlock;

pub static mut PRINTER: Printer = Printer {
    lock: Spinlock::init_lock("pr"),
    console: Console::create(),
    locking: true,
};

#[macro_export]
macro_rules! printf
{
	($($arg:tt)*) => {
        unsafe {
            crate::printf::PRINTER.printf(core::format_args!($($arg)*))
        }
    };
}

/// Lock to avoid interleaving concurrent `printf!`s.
pub struct Printer {
    lock: Spinlock,
    console: Console,
    locking: bool,
}

impl Printer {
    pub fn init() {
        Console::init();
    }

    pub fn printf(&mut self, args: Arguments<'_>) {
        let locking = self.locking;
        if locking {
            self.lock.acquire();
        }

        let _ = self.console.write_fmt(args);

        if locking {
            self.lock.release()
        }
    }
}
