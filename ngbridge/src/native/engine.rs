//! Traits and value types describing the native engine.

use std::fmt;

use parking_lot::Mutex;

use crate::callback::CallbackKey;
use crate::status::StatusCode;

/// Opaque identifier of a native engine object (map, datastore, raster).
///
/// Never dereferenced on this side. Zero and negative values are the
/// engine's "no object" results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(i64);

impl Handle {
    pub const INVALID: Handle = Handle(0);

    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// A long-running engine operation that reports progress through a
/// callback key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncOp {
    /// Copy a dataset between two catalog paths.
    Copy { source: String, destination: String },
    /// Back up a datastore to an archive path.
    Backup { datastore: String, archive: String },
    /// Download a URL into a file.
    UrlFetch { url: String, destination: String },
    /// Build the overview pyramid of a raster.
    BuildOverviews { raster: Handle },
}

impl AsyncOp {
    pub fn copy(source: impl Into<String>, destination: impl Into<String>) -> Self {
        AsyncOp::Copy {
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn backup(datastore: impl Into<String>, archive: impl Into<String>) -> Self {
        AsyncOp::Backup {
            datastore: datastore.into(),
            archive: archive.into(),
        }
    }

    pub fn url_fetch(url: impl Into<String>, destination: impl Into<String>) -> Self {
        AsyncOp::UrlFetch {
            url: url.into(),
            destination: destination.into(),
        }
    }

    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            AsyncOp::Copy { .. } => "copy",
            AsyncOp::Backup { .. } => "backup",
            AsyncOp::UrlFetch { .. } => "url-fetch",
            AsyncOp::BuildOverviews { .. } => "build-overviews",
        }
    }

    /// Status reported when the engine fails without saying why.
    pub fn failure_status(&self) -> StatusCode {
        match self {
            AsyncOp::Copy { .. } => StatusCode::CopyFailed,
            AsyncOp::Backup { .. } => StatusCode::SaveFailed,
            AsyncOp::UrlFetch { .. } => StatusCode::RequestFailed,
            AsyncOp::BuildOverviews { .. } => StatusCode::CreateFailed,
        }
    }
}

impl fmt::Display for AsyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncOp::Copy {
                source,
                destination,
            } => write!(f, "copy {} -> {}", source, destination),
            AsyncOp::Backup { datastore, archive } => {
                write!(f, "backup {} -> {}", datastore, archive)
            }
            AsyncOp::UrlFetch { url, destination } => {
                write!(f, "fetch {} -> {}", url, destination)
            }
            AsyncOp::BuildOverviews { raster } => write!(f, "build overviews of {}", raster),
        }
    }
}

/// Entry points of the native engine used by this crate.
///
/// `start_async_op` blocks the calling thread until the operation is over.
/// While it runs, the engine reports progress from its own worker thread(s)
/// through [`super::ProgressBridge::on_progress`] with `callback`, unless
/// `callback` is [`CallbackKey::NONE`].
pub trait NativeEngine: Send + Sync {
    /// Run `op`. Returns a positive value on success, zero or a negative
    /// value on failure.
    fn start_async_op(&self, op: &AsyncOp, callback: CallbackKey) -> i32;

    /// Message of the most recent failure on this engine instance.
    ///
    /// Overwritten by the next failing call; read it straight after the
    /// failure.
    fn last_error(&self) -> Option<String>;
}

/// Last-error slot for engine implementations.
#[derive(Debug, Default)]
pub struct LastError(Mutex<Option<String>>);

impl LastError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, message: impl Into<String>) {
        *self.0.lock() = Some(message.into());
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        *self.0.lock() = None;
    }
}
