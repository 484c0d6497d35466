// `log`-crate backend over the UART printer.
//
// The teacher's `Cargo.toml` already pulls in `log = "0.4.20"` but the
// retrieved tree never wires it to a sink (its only `crate::log` references
// are to the filesystem write-ahead log module, an unrelated name collision
// with the crate). This module installs a minimal `log::Log` implementation
// over `printf!` so the dependency the teacher already chose is actually
// used, in place of the ad hoc `debug_log!` macro cfg-gate the teacher's
// `printf.rs` sketched but never finished.

use log::{Level, LevelFilter, Log, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        printf!("[{}] {}\n", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Install the kernel logger. Must run before the first `log::info!`/
/// `log::debug!` call; idempotent failures (a second call) are ignored.
pub fn init() {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Debug));
}
