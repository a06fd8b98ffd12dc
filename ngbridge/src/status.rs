//! Status and change codes shared with the native engine.
//!
//! Both travel across the boundary as plain integers. Status codes decode to
//! [`StatusCode::Unknown`] when the engine sends a value this side does not
//! know; change codes keep unknown bits so veto masks still see them.

use std::fmt;

use bitflags::bitflags;

/// Operation status reported by the native engine.
///
/// Carried as an `i32` wire value in progress callbacks and as the return
/// value of asynchronous operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Unknown = 0,
    Continue = 1,
    Pending = 2,
    InProcess = 3,
    Success = 4,
    Canceled = 5,
    Finished = 6,
    Warning = 7,
    CreateFailed = 8,
    DeleteFailed = 9,
    SaveFailed = 10,
    OpenFailed = 11,
    CloseFailed = 12,
    InsertFailed = 13,
    UpdateFailed = 14,
    CopyFailed = 15,
    MoveFailed = 16,
    RequestFailed = 17,
    RenameFailed = 18,
    ConcurrentFailed = 19,
    UnexpectedError = 20,
    UnsupportedFailed = 21,
}

impl StatusCode {
    const ALL: [StatusCode; 22] = [
        StatusCode::Unknown,
        StatusCode::Continue,
        StatusCode::Pending,
        StatusCode::InProcess,
        StatusCode::Success,
        StatusCode::Canceled,
        StatusCode::Finished,
        StatusCode::Warning,
        StatusCode::CreateFailed,
        StatusCode::DeleteFailed,
        StatusCode::SaveFailed,
        StatusCode::OpenFailed,
        StatusCode::CloseFailed,
        StatusCode::InsertFailed,
        StatusCode::UpdateFailed,
        StatusCode::CopyFailed,
        StatusCode::MoveFailed,
        StatusCode::RequestFailed,
        StatusCode::RenameFailed,
        StatusCode::ConcurrentFailed,
        StatusCode::UnexpectedError,
        StatusCode::UnsupportedFailed,
    ];

    /// Decode a wire value. Unknown values map to [`StatusCode::Unknown`].
    pub fn from_wire(value: i32) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .unwrap_or(StatusCode::Unknown)
    }

    /// The integer sent across the boundary.
    pub fn wire(self) -> i32 {
        self as i32
    }

    /// Returns true for the `*Failed` family and unexpected errors.
    pub fn is_failure(self) -> bool {
        self.wire() >= StatusCode::CreateFailed.wire()
    }

    /// Returns true if the operation ended well.
    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::Success | StatusCode::Finished)
    }

    /// Returns true if no further progress will be reported after this status.
    pub fn is_terminal(self) -> bool {
        self.is_success() || self == StatusCode::Canceled || self.is_failure()
    }

    /// Short name for logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Unknown => "unknown",
            StatusCode::Continue => "continue",
            StatusCode::Pending => "pending",
            StatusCode::InProcess => "in-process",
            StatusCode::Success => "success",
            StatusCode::Canceled => "canceled",
            StatusCode::Finished => "finished",
            StatusCode::Warning => "warning",
            StatusCode::CreateFailed => "create-failed",
            StatusCode::DeleteFailed => "delete-failed",
            StatusCode::SaveFailed => "save-failed",
            StatusCode::OpenFailed => "open-failed",
            StatusCode::CloseFailed => "close-failed",
            StatusCode::InsertFailed => "insert-failed",
            StatusCode::UpdateFailed => "update-failed",
            StatusCode::CopyFailed => "copy-failed",
            StatusCode::MoveFailed => "move-failed",
            StatusCode::RequestFailed => "request-failed",
            StatusCode::RenameFailed => "rename-failed",
            StatusCode::ConcurrentFailed => "concurrent-failed",
            StatusCode::UnexpectedError => "unexpected-error",
            StatusCode::UnsupportedFailed => "unsupported",
        }
    }
}

impl From<i32> for StatusCode {
    fn from(value: i32) -> Self {
        Self::from_wire(value)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

bitflags! {
    /// Kind of mutation reported by a native change event.
    ///
    /// Listener masks use the same bits. Bits this side does not name are
    /// retained when decoding so that mask tests still apply to them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeCode: u32 {
        const CREATE_DATASTORE = 1 << 0;
        const DELETE_DATASTORE = 1 << 1;
        const CREATE_OBJECT = 1 << 2;
        const DELETE_OBJECT = 1 << 3;
        const CHANGE_OBJECT = 1 << 4;
        const CREATE_FEATURE = 1 << 5;
        const CHANGE_FEATURE = 1 << 6;
        const DELETE_FEATURE = 1 << 7;
        const DELETEALL_FEATURES = 1 << 8;
        const CREATE_ATTACHMENT = 1 << 9;
        const CHANGE_ATTACHMENT = 1 << 10;
        const DELETE_ATTACHMENT = 1 << 11;
        const DELETEALL_ATTACHMENTS = 1 << 12;
        const CREATE_MAP = 1 << 13;
        const CHANGE_MAP = 1 << 14;
        const CREATE_LAYER = 1 << 15;
        const DELETE_LAYER = 1 << 16;
        const CHANGE_LAYER = 1 << 17;
        const TOKEN_EXPIRED = 1 << 18;
        const TOKEN_CHANGED = 1 << 19;

        /// Authentication events, routed away from the redraw path.
        const TOKEN_EVENTS = Self::TOKEN_EXPIRED.bits() | Self::TOKEN_CHANGED.bits();
    }
}

impl ChangeCode {
    /// Decode a wire value, keeping unknown bits.
    pub fn from_wire(value: i32) -> Self {
        Self::from_bits_retain(value as u32)
    }

    /// The integer sent across the boundary.
    pub fn wire(self) -> i32 {
        self.bits() as i32
    }

    /// Returns true if this event concerns authentication rather than map content.
    pub fn is_token_event(self) -> bool {
        self.intersects(Self::TOKEN_EVENTS)
    }
}
