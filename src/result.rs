//! Error types and the related `Result<T>`

use thiserror::Error;

pub type TarResult<T> = Result<T, TarError>;

#[derive(Debug, Error)]
pub enum TarError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The header's magic tag failed the configured check,
    /// or its type byte is below `'0'`.
    #[error("This does not look like a tar archive")]
    BadMagic,

    /// The header describes something other than a regular file.
    /// (The u8 is the raw type byte.)
    #[error("Unsupported header type: {0}")]
    UnsupportedType(u8),

    /// A numeric header field couldn't be decoded.
    #[error("Invalid tar header: {0}")]
    InvalidHeader(&'static str),

    /// Decoding an entry name as UTF-8 failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// An entry name that can't be extracted safely (`..`, prefixes, ...)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The archive ends before the data its headers promise.
    #[error("Unexpected EOF in archive")]
    TruncatedArchive,

    /// Windows must be a positive multiple of the record size.
    #[error("Window size {0} is not a positive multiple of 512")]
    InvalidWindowSize(usize),

    /// Requested names that never showed up in the archive.
    ///
    /// Scans never fail with this; it comes from [`ScanReport::into_result()`]
    /// once a scan has run to the end.
    ///
    /// [`ScanReport::into_result()`]: ../scan/struct.ScanReport.html#method.into_result
    #[error("Not found in archive: {}", .0.join(", "))]
    NotFound(Vec<String>),
}
