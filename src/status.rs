//! Status values and the receiver call discipline shared by every decoder.
//!
//! A [`Status`] is a tagged value distinguishing four flavors by the first
//! byte of its identifier string:
//!
//! - ok: the empty identifier; the operation completed.
//! - `@` notes: informational, the operation is complete.
//! - `$` suspensions: the operation is incomplete; refill or drain the
//!   caller-owned buffers and call the same method again.
//! - `#` errors: fatal; the receiver is disabled and every subsequent call
//!   returns [`ERROR_DISABLED_BY_PREVIOUS_ERROR`].
//!
//! Equality is on the identifier, so `status == SUSPENSION_SHORT_READ` is
//! the discrimination idiom throughout the crate and its tests.

use core::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Library version
// ─────────────────────────────────────────────────────────────────────────────

pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 0;

/// Packed version passed to `initialize`: major in the high 16 bits, minor in
/// the low 16.
pub const VERSION: u32 = (VERSION_MAJOR << 16) | VERSION_MINOR;

/// `initialize` flag: the caller guarantees the receiver memory is all-zero,
/// letting `initialize` skip its own clearing pass.
pub const INITIALIZE_ALREADY_ZEROED: u32 = 0x01;

/// `initialize` flag: leave internal buffers (history windows, dictionaries)
/// with whatever contents they had. Harmless in this implementation, where
/// receivers are always fully constructed, but accepted for API parity.
pub const INITIALIZE_LEAVE_INTERNAL_BUFFERS_UNINITIALIZED: u32 = 0x02;

const INITIALIZE_ALL_FLAGS: u32 =
    INITIALIZE_ALREADY_ZEROED | INITIALIZE_LEAVE_INTERNAL_BUFFERS_UNINITIALIZED;

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// A decode-time status: ok, note (`@`), suspension (`$`) or error (`#`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Note(&'static str),
    Suspension(&'static str),
    Error(&'static str),
}

impl Status {
    /// The identifier string; empty for ok.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "",
            Status::Note(m) | Status::Suspension(m) | Status::Error(m) => m,
        }
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    #[must_use]
    pub fn is_note(self) -> bool {
        matches!(self, Status::Note(_))
    }

    #[must_use]
    pub fn is_suspension(self) -> bool {
        matches!(self, Status::Suspension(_))
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Status::Error(_))
    }

    /// Ok or note: the operation finished this call.
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(self, Status::Ok | Status::Note(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => f.write_str("ok"),
            Status::Note(m) | Status::Suspension(m) | Status::Error(m) => f.write_str(m),
        }
    }
}

impl std::error::Error for Status {}

// ─────────────────────────────────────────────────────────────────────────────
// Base status constants
// ─────────────────────────────────────────────────────────────────────────────

pub const SUSPENSION_SHORT_READ: Status = Status::Suspension("$short read");
pub const SUSPENSION_SHORT_WRITE: Status = Status::Suspension("$short write");
pub const SUSPENSION_MISPOSITIONED_READ: Status = Status::Suspension("$mispositioned read");
pub const SUSPENSION_MISPOSITIONED_WRITE: Status = Status::Suspension("$mispositioned write");
pub const SUSPENSION_EVEN_MORE_INFORMATION: Status = Status::Suspension("$even more information");

pub const NOTE_END_OF_DATA: Status = Status::Note("@end of data");
pub const NOTE_METADATA_REPORTED: Status = Status::Note("@metadata reported");
pub const NOTE_I_O_REDIRECT: Status = Status::Note("@I/O redirect");

pub const ERROR_BAD_ARGUMENT: Status = Status::Error("#bad argument");
pub const ERROR_BAD_CALL_SEQUENCE: Status = Status::Error("#bad call sequence");
pub const ERROR_BAD_RECEIVER: Status = Status::Error("#bad receiver");
pub const ERROR_BAD_RESTART: Status = Status::Error("#bad restart");
pub const ERROR_BAD_SIZEOF_RECEIVER: Status = Status::Error("#bad sizeof receiver");
pub const ERROR_BAD_VERSION: Status = Status::Error("#bad version");
pub const ERROR_BAD_VTABLE: Status = Status::Error("#bad vtable");
pub const ERROR_BAD_WORKBUF_LENGTH: Status = Status::Error("#bad workbuf length");
pub const ERROR_CANNOT_RETURN_A_SUSPENSION: Status =
    Status::Error("#cannot return a suspension");
pub const ERROR_DISABLED_BY_PREVIOUS_ERROR: Status =
    Status::Error("#disabled by previous error");
pub const ERROR_INITIALIZE_FALSELY_CLAIMED_ALREADY_ZEROED: Status =
    Status::Error("#initialize falsely claimed already zeroed");
pub const ERROR_INITIALIZE_NOT_CALLED: Status = Status::Error("#initialize not called");
pub const ERROR_INTERLEAVED_COROUTINE_CALLS: Status =
    Status::Error("#interleaved coroutine calls");
pub const ERROR_NO_MORE_INFORMATION: Status = Status::Error("#no more information");
pub const ERROR_NOT_ENOUGH_DATA: Status = Status::Error("#not enough data");
pub const ERROR_OUT_OF_BOUNDS: Status = Status::Error("#out of bounds");
pub const ERROR_TOO_MUCH_DATA: Status = Status::Error("#too much data");
pub const ERROR_UNSUPPORTED_METHOD: Status = Status::Error("#unsupported method");
pub const ERROR_UNSUPPORTED_OPTION: Status = Status::Error("#unsupported option");
pub const ERROR_UNSUPPORTED_PIXEL_SWIZZLER_OPTION: Status =
    Status::Error("#unsupported pixel swizzler option");

// ─────────────────────────────────────────────────────────────────────────────
// Receiver control block
// ─────────────────────────────────────────────────────────────────────────────

/// Receiver state is live: `initialize` succeeded and no error has occurred.
pub(crate) const MAGIC: u32 = 0x0DEC_0DE5;

/// Receiver state after any fatal error. Every later call fails with
/// [`ERROR_DISABLED_BY_PREVIOUS_ERROR`].
pub(crate) const DISABLED: u32 = 0x0D15_AB1E;

/// The `magic` / `active_coroutine` pair embedded in every receiver, plus a
/// call-sequence counter that lets `set_quirk_enabled` style configuration be
/// uniformly rejected once decoding has begun.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Control {
    magic: u32,
    active_coroutine: u32,
    calls_made: bool,
}

impl Control {
    /// Validates the `initialize` handshake arguments. `sizeof_receiver` and
    /// `sizeof_expected` come from the concrete decoder.
    pub(crate) fn initialize(
        &mut self,
        sizeof_receiver: usize,
        sizeof_expected: usize,
        version: u32,
        flags: u32,
    ) -> Status {
        if sizeof_receiver != sizeof_expected {
            return ERROR_BAD_SIZEOF_RECEIVER;
        }
        if (version >> 16) != VERSION_MAJOR || (version & 0xFFFF) > VERSION_MINOR {
            return ERROR_BAD_VERSION;
        }
        if (flags & !INITIALIZE_ALL_FLAGS) != 0 {
            return ERROR_BAD_ARGUMENT;
        }
        if (flags & INITIALIZE_ALREADY_ZEROED) != 0 && self.magic != 0 {
            return ERROR_INITIALIZE_FALSELY_CLAIMED_ALREADY_ZEROED;
        }
        self.magic = MAGIC;
        self.active_coroutine = 0;
        self.calls_made = false;
        Status::Ok
    }

    /// Entry check for a coroutine method identified by `coroutine_id`
    /// (non-zero, unique per method within a receiver). Returns an error
    /// status if the call must not proceed.
    pub(crate) fn begin(&mut self, coroutine_id: u32) -> Status {
        match self.magic {
            MAGIC => {}
            DISABLED => return ERROR_DISABLED_BY_PREVIOUS_ERROR,
            _ => return ERROR_INITIALIZE_NOT_CALLED,
        }
        if self.active_coroutine != 0 && self.active_coroutine != coroutine_id {
            self.magic = DISABLED;
            return ERROR_INTERLEAVED_COROUTINE_CALLS;
        }
        self.calls_made = true;
        Status::Ok
    }

    /// Entry check for a plain (non-suspending) method.
    pub(crate) fn begin_plain(&mut self) -> Status {
        self.begin(u32::MAX)
    }

    /// Records the outcome of a coroutine call: suspensions keep the
    /// coroutine active, errors poison the receiver, anything else clears
    /// the active-coroutine guard.
    pub(crate) fn settle(&mut self, coroutine_id: u32, status: Status) -> Status {
        match status {
            Status::Suspension(_) => self.active_coroutine = coroutine_id,
            Status::Error(_) => {
                self.active_coroutine = 0;
                self.magic = DISABLED;
            }
            _ => self.active_coroutine = 0,
        }
        status
    }

    /// True once any coroutine method has been entered. Configuration calls
    /// (`set_quirk_enabled`, `set_ignore_checksum`) are rejected after this.
    pub(crate) fn configured_too_late(&self) -> bool {
        self.calls_made
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.magic == MAGIC
    }
}
