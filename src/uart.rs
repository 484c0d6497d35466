// 16550 UART driver, ported from the teacher's earlier generation
// (`src/kernel/uart.rs`), which implements the polling `putc_sync` path this
// crate's console needs; the interrupt-driven `putc`/`intr` path is kept for
// fidelity but has no caller here (console input, like the rest of the
// file/device layer, is out of scope for this core).

use crate::memlayout::UART0;
use crate::spinlock::Spinlock;

#[macro_export]
macro_rules! Reg {
    ( $reg:expr ) => {
        $crate::memlayout::UART0 + ($reg as usize)
    };
}

// the UART control registers.
pub const RHR: u8 = 0; // receive holding register (for input bytes)
pub const THR: u8 = 0; // transmit holding register (for output bytes)
pub const IER: u8 = 1; // interrupt enable register
pub const IER_RX_ENABLE: u8 = 1 << 0;
pub const IER_TX_ENABLE: u8 = 1 << 1;
pub const FCR: u8 = 2; // FIFO control register
pub const FCR_FIFO_ENABLE: u8 = 1 << 0;
pub const FCR_FIFO_CLEAR: u8 = 3 << 1; // clear the content of the two FIFOs
pub const LCR: u8 = 3; // line control register
pub const LCR_EIGHT_BITS: u8 = 3 << 0;
pub const LCR_BAUD_LATCH: u8 = 1 << 7; // special mode to set baud rate
pub const LSR: u8 = 5; // line status register
pub const LSR_RX_READY: u8 = 1 << 0; // input is waiting to be read from RHR
pub const LSR_TX_IDLE: u8 = 1 << 5; // THR can accept another character to send
pub const UART_TX_BUF_SIZE: usize = 32;

#[macro_export]
macro_rules! ReadReg {
    ( $reg:expr ) => {
        unsafe { ($crate::Reg!($reg) as *mut u8).read_volatile() }
    };
}

#[macro_export]
macro_rules! WriteReg {
    ( $reg:expr, $val:expr ) => {
        unsafe { ($crate::Reg!($reg) as *mut u8).write_volatile($val) }
    };
}

pub struct Uart {
    uart_tx_lock: Spinlock,
    uart_tx_buf: [u8; UART_TX_BUF_SIZE],
    uart_tx_w: usize,
    uart_tx_r: usize,
}

impl Uart {
    pub const fn create() -> Self {
        Self {
            uart_tx_lock: Spinlock::init_lock("uart"),
            uart_tx_buf: [0; UART_TX_BUF_SIZE],
            uart_tx_w: 0,
            uart_tx_r: 0,
        }
    }

    pub fn init() {
        WriteReg!(IER, 0x00); // disable interrupts.
        WriteReg!(LCR, LCR_BAUD_LATCH); // special mode to set baud rate.
        WriteReg!(0, 0x03); // LSB for baud rate of 38.4K.
        WriteReg!(1, 0x00); // MSB for baud rate of 38.4K.
        WriteReg!(LCR, LCR_EIGHT_BITS); // leave set-baud mode, 8 bits, no parity.
        WriteReg!(FCR, FCR_FIFO_ENABLE | FCR_FIFO_CLEAR); // reset and enable FIFOs.
        WriteReg!(IER, IER_TX_ENABLE | IER_RX_ENABLE); // enable tx/rx interrupts.
    }

    /// Alternate version of `putc` that doesn't use interrupts, for use by
    /// the kernel's `printf!`. Spins waiting for the transmit register to
    /// drain.
    pub fn putc_sync(&mut self, c: u8) {
        crate::spinlock::push_off();
        while (ReadReg!(LSR) & LSR_TX_IDLE) == 0 {}
        WriteReg!(THR, c);
        crate::spinlock::pop_off();
    }
}
