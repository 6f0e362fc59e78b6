//! Code specific to the tar format.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] module.
//!
//! Only the handful of header fields we act on are decoded.
//! The layout follows POSIX.1-1988 "ustar"; see [`tar(5)`] or
//! [_Basic Tar Format_] for the full record.
//!
//! [`read`]: ../read/index.html
//! [`tar(5)`]: https://man.freebsd.org/cgi/man.cgi?query=tar&sektion=5
//! [_Basic Tar Format_]: https://www.gnu.org/software/tar/manual/html_node/Standard.html

use std::fmt;

use camino::Utf8PathBuf;
use chrono::{DateTime, NaiveDateTime};
use log::*;
use memchr::memchr;

use crate::read::{ContentSpan, HeaderRecord};
use crate::result::*;

/// Everything in a tar archive is laid out in 512-byte records.
pub const RECORD_SIZE: usize = 512;

/// Type byte of a regular file
pub const REGULAR_TYPE: u8 = b'0';

/// Both POSIX (`"ustar\0"`) and GNU (`"ustar "`) magic start with this.
const USTAR_MAGIC: &[u8] = b"ustar";

/// Where a field lives in a header record
#[derive(Debug, Clone, Copy)]
struct Field {
    offset: usize,
    len: usize,
}

impl Field {
    const fn new(offset: usize, len: usize) -> Self {
        assert!(offset + len <= RECORD_SIZE);
        Self { offset, len }
    }

    fn of(self, record: &[u8; RECORD_SIZE]) -> &[u8] {
        &record[self.offset..self.offset + self.len]
    }
}

// Header record layout:
//
// name      100 bytes  NUL-terminated path
// mode        8 bytes  octal
// uid         8 bytes
// gid         8 bytes
// size       12 bytes  octal (or GNU base-256)
// mtime      12 bytes  octal seconds since the epoch
// chksum      8 bytes
// typeflag    1 byte
// linkname  100 bytes
// magic       6 bytes
// ...and 249 more bytes we don't look at.
const NAME: Field = Field::new(0, 100);
const MODE: Field = Field::new(100, 8);
const SIZE: Field = Field::new(124, 12);
const MTIME: Field = Field::new(136, 12);
const TYPEFLAG: Field = Field::new(156, 1);
const MAGIC: Field = Field::new(257, 6);

/// How strictly to check the magic field of each header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MagicCheck {
    /// Headers must carry a ustar magic (POSIX or GNU flavor).
    /// A NUL type byte is taken as an old-style regular file.
    #[default]
    Ustar,
    /// The inverted check some minimal tar readers make:
    /// reject headers whose magic is exactly `"ustar\0"` (so GNU-flavored
    /// archives pass and POSIX ones don't), and reject every type byte below
    /// `'0'`, NUL included. Type bytes are compared as signed,
    /// so 0x80 and up count as below `'0'` too.
    Legacy,
}

/// A header record, viewed in place.
///
/// This borrows the scan window, so it can't outlive the next advance.
/// Copy out what you need with [`HeaderRecord`].
#[derive(Clone, Copy)]
pub struct RawHeader<'a> {
    record: &'a [u8; RECORD_SIZE],
}

impl<'a> RawHeader<'a> {
    /// Views the first record of `bytes`,
    /// or returns `None` if there isn't a whole one.
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        let record = bytes.get(..RECORD_SIZE)?.try_into().ok()?;
        Some(Self { record })
    }

    /// True for the all-zero records that end an archive
    pub fn is_zero(&self) -> bool {
        self.record.iter().all(|&b| b == 0)
    }

    /// The name, up to (not including) its NUL terminator
    pub fn name(&self) -> &'a [u8] {
        let field = NAME.of(self.record);
        &field[..memchr(0, field).unwrap_or(field.len())]
    }

    pub fn typeflag(&self) -> u8 {
        TYPEFLAG.of(self.record)[0]
    }

    pub fn magic(&self) -> &'a [u8] {
        MAGIC.of(self.record)
    }

    /// The declared content size in bytes
    pub fn size(&self) -> TarResult<u64> {
        parse_numeric(SIZE.of(self.record))
    }

    pub fn mode(&self) -> TarResult<u32> {
        parse_numeric(MODE.of(self.record))?
            .try_into()
            .map_err(|_| TarError::InvalidHeader("Mode doesn't fit in 32 bits"))
    }

    /// Modification time in seconds since the epoch
    pub fn mtime(&self) -> TarResult<u64> {
        parse_numeric(MTIME.of(self.record))
    }
}

impl fmt::Debug for RawHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawHeader")
            .field("name", &String::from_utf8_lossy(self.name()))
            .field("size", &String::from_utf8_lossy(SIZE.of(self.record)))
            .field("typeflag", &self.typeflag())
            .field("magic", &self.magic())
            .finish()
    }
}

/// Checks the header's magic and type fields.
///
/// Anything failing the magic check, or with a type byte below `'0'`,
/// isn't a header at all. Past that, only regular files are supported.
pub fn validate(header: &RawHeader, check: MagicCheck) -> TarResult<()> {
    let magic = header.magic();
    let typeflag = header.typeflag();

    let (bad_magic, below_zero, nul_is_regular) = match check {
        MagicCheck::Ustar => (!magic.starts_with(USTAR_MAGIC), typeflag < b'0', true),
        MagicCheck::Legacy => (magic == b"ustar\0", (typeflag as i8) < b'0' as i8, false),
    };
    let old_style_regular = nul_is_regular && typeflag == 0;

    if bad_magic || (below_zero && !old_style_regular) {
        trace!("Rejecting {:?}", header);
        return Err(TarError::BadMagic);
    }
    if typeflag != REGULAR_TYPE && !old_style_regular {
        return Err(TarError::UnsupportedType(typeflag));
    }
    Ok(())
}

/// How many records to move past a header with the given content size
/// to land on the next header.
///
/// One for the header itself, one per whole record of content,
/// and one more for a partial trailing record.
pub fn records_to_skip(size: u64) -> u64 {
    let record = RECORD_SIZE as u64;
    size / record + 1 + (size % record != 0) as u64
}

/// Decodes a numeric header field.
///
/// Most are octal ASCII, but GNU tar stores values too big for the field
/// in base-256, flagged by the high bit of the first byte.
fn parse_numeric(field: &[u8]) -> TarResult<u64> {
    match field.first() {
        Some(&first) if first & 0x80 != 0 => parse_base256(first, &field[1..]),
        _ => parse_octal(field),
    }
}

fn parse_octal(field: &[u8]) -> TarResult<u64> {
    // Leading spaces or NULs are padding; the number ends at the next one.
    let start = field
        .iter()
        .position(|&b| b != b' ' && b != 0)
        .unwrap_or(field.len());
    let digits = &field[start..];
    let end = digits
        .iter()
        .position(|&b| b == b' ' || b == 0)
        .unwrap_or(digits.len());

    digits[..end].iter().try_fold(0u64, |value, &digit| {
        if !(b'0'..=b'7').contains(&digit) {
            return Err(TarError::InvalidHeader("Non-octal digit in numeric field"));
        }
        value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(digit - b'0')))
            .ok_or(TarError::InvalidHeader("Numeric field overflows 64 bits"))
    })
}

fn parse_base256(first: u8, rest: &[u8]) -> TarResult<u64> {
    // The next bit down is the sign.
    if first & 0x40 != 0 {
        return Err(TarError::InvalidHeader("Negative base-256 field"));
    }
    rest.iter().try_fold(u64::from(first & 0x3f), |value, &byte| {
        value
            .checked_mul(256)
            .and_then(|v| v.checked_add(u64::from(byte)))
            .ok_or(TarError::InvalidHeader("Numeric field overflows 64 bits"))
    })
}

impl HeaderRecord {
    /// Copies a header out of the scan window.
    ///
    /// `header_offset` is where the record sits in the archive;
    /// `archive_len` tells us how much of the content actually made it to disk.
    pub(crate) fn from_raw(
        raw: &RawHeader,
        header_offset: u64,
        archive_len: u64,
    ) -> TarResult<Self> {
        let path = Utf8PathBuf::from(std::str::from_utf8(raw.name())?);
        let size = raw.size()?;
        // Neither is needed to list or extract, so don't fail over them.
        let mode = raw.mode().unwrap_or_else(|e| {
            warn!("{}: bad mode ({}), using 0", path, e);
            0
        });
        let last_modified = match raw.mtime() {
            Ok(seconds) => to_datetime(seconds),
            Err(e) => {
                warn!("{}: bad modification time ({}), using the epoch", path, e);
                NaiveDateTime::default()
            }
        };

        let content_offset = header_offset + RECORD_SIZE as u64;
        let content = ContentSpan {
            offset: content_offset,
            declared: size,
            available: archive_len.saturating_sub(content_offset).min(size),
        };

        let mut magic = [0; 6];
        magic.copy_from_slice(raw.magic());

        Ok(Self {
            path,
            size,
            typeflag: raw.typeflag(),
            magic,
            mode,
            last_modified,
            header_offset,
            content,
        })
    }
}

/// Unrepresentable times come back as the epoch.
fn to_datetime(seconds: u64) -> NaiveDateTime {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}
