//! Diagnostic log drain.
//!
//! The framework emits diagnostics through the `log` facade. This module
//! provides the byte-stream contract a platform implements to carry that
//! text ([`LogDrain`]) and a [`log::Log`] implementation over any drain.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use crate::error::Result;

/// A byte-stream sink for diagnostic text.
///
/// Drains may buffer internally; `flush` pushes buffered bytes to the
/// device. `open` and `close` bracket the drain's lifetime for platforms
/// that need them.
pub trait LogDrain: Sync {
    /// Prepares the drain for writing.
    fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Writes a chunk of diagnostic text.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Pushes any buffered bytes to the device.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Releases the drain.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A [`log::Log`] implementation writing formatted records through a
/// [`LogDrain`].
pub struct DrainLogger<D: LogDrain> {
    drain: D,
    max_level: log::LevelFilter,
}

struct DrainWriter<'a>(&'a dyn LogDrain);

impl core::fmt::Write for DrainWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}

impl<D: LogDrain + Send> DrainLogger<D> {
    /// A logger over `drain`, discarding records above `max_level`.
    pub const fn new(drain: D, max_level: log::LevelFilter) -> Self {
        DrainLogger { drain, max_level }
    }

    /// Installs this logger as the global `log` sink.
    pub fn init(&'static self) -> core::result::Result<(), log::SetLoggerError> {
        log::set_logger(self).map(|()| log::set_max_level(self.max_level))
    }
}

impl<D: LogDrain + Send> log::Log for DrainLogger<D> {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        use core::fmt::Write;
        let mut writer = DrainWriter(&self.drain);
        // A drain failure cannot be reported anywhere; drop the record.
        let _ = writeln!(writer, "{} - {}", record.level(), record.args());
    }

    fn flush(&self) {
        let _ = self.drain.flush();
    }
}

/// A drain writing to the process standard output, for host builds.
#[cfg(any(feature = "std", test))]
pub struct Terminal;

#[cfg(any(feature = "std", test))]
impl LogDrain for Terminal {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        use std::io::Write;
        std::io::stdout().write_all(bytes).map_err(|_| crate::error::FwkError::Device)
    }

    fn flush(&self) -> Result<()> {
        use std::io::Write;
        std::io::stdout().flush().map_err(|_| crate::error::FwkError::Device)
    }
}
