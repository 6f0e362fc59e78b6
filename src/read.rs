//! Tools for reading a tar archive.
//!
//! A [`HeaderIterator`] walks the archive's headers through a
//! [`WindowedReader`]. Entry contents are never read through the window:
//! [`extract()`] and [`copy_content()`] pull them straight from the file,
//! so the scan can pick up where it left off.
//!
//! [`HeaderIterator`]: struct.HeaderIterator.html
//! [`WindowedReader`]: ../window/struct.WindowedReader.html
//! [`extract()`]: fn.extract.html
//! [`copy_content()`]: fn.copy_content.html

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use log::*;

use crate::result::*;
use crate::spec::{RawHeader, RECORD_SIZE};
use crate::window::WindowedReader;

/// Where an entry's content lives in the archive file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentSpan {
    /// Absolute offset of the first content byte
    pub offset: u64,

    /// Content size according to the header
    pub declared: u64,

    /// How much of it is actually in the file (never more than `declared`)
    pub available: u64,
}

impl ContentSpan {
    /// Returns true if the archive ends before the content does
    pub fn is_truncated(&self) -> bool {
        self.available < self.declared
    }
}

/// An entry's header, copied out of the scan window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// The entry's path, as stored in the archive
    pub path: Utf8PathBuf,

    /// Content size in bytes
    pub size: u64,

    /// The raw type byte (`'0'` or NUL for regular files)
    pub typeflag: u8,

    /// The raw magic field
    pub magic: [u8; 6],

    /// Unix mode bits
    pub mode: u32,

    /// Last modification time, in UTC
    pub last_modified: NaiveDateTime,

    /// Absolute offset of the header record itself
    pub header_offset: u64,

    pub content: ContentSpan,
}

/// Walks the header records of an archive,
/// loading new windows as it goes.
pub struct HeaderIterator {
    reader: WindowedReader,
    /// Record index from the start of the loaded window.
    /// Only in the final window can this run past the window's edge.
    record: u64,
}

impl HeaderIterator {
    /// Starts at the beginning of the archive.
    ///
    /// The reader should still be on its first window.
    pub fn new(reader: WindowedReader) -> Self {
        debug_assert_eq!(reader.window_index(), 0);
        Self { reader, record: 0 }
    }

    pub fn reader(&self) -> &WindowedReader {
        &self.reader
    }

    /// Lends out the reader for extraction.
    ///
    /// Offset-addressed reads don't move the cursor,
    /// but advancing the window from here will confuse it.
    pub fn reader_mut(&mut self) -> &mut WindowedReader {
        &mut self.reader
    }

    /// Absolute offset of the cursor
    pub fn position(&self) -> u64 {
        self.reader.window_start() + self.record * RECORD_SIZE as u64
    }

    /// Returns the header under the cursor,
    /// or `None` at the end of the archive: a zero record,
    /// or no complete record left in the file.
    pub fn current(&self) -> Option<RawHeader<'_>> {
        let start = usize::try_from(self.record)
            .ok()?
            .checked_mul(RECORD_SIZE)?;
        let raw = RawHeader::new(self.reader.current_slice().get(start..)?)?;
        if raw.is_zero() {
            None
        } else {
            Some(raw)
        }
    }

    /// Moves the cursor forward `records` records.
    ///
    /// Windows passed over entirely are never loaded.
    /// Moving past the end of the file leaves the cursor hanging off
    /// the final window, where `current()` returns `None`.
    /// The cursor never goes further than one record past the end,
    /// however many records were asked for.
    pub fn advance_by(&mut self, records: u64) -> TarResult<()> {
        let record_size = RECORD_SIZE as u64;
        let window_records = (self.reader.window_size() / RECORD_SIZE) as u64;

        // Absolute record indexes from here on.
        let past_end = self.reader.len() / record_size + 1;
        let target = (self.position() / record_size)
            .saturating_add(records)
            .min(past_end);

        let window = (target / window_records).min(self.reader.final_window_index());
        let crossed = window - self.reader.window_index();
        if crossed > 0 {
            self.reader.advance_windows(crossed)?;
        }
        self.record = target - window * window_records;
        trace!("Cursor at {}", self.position());
        Ok(())
    }
}

/// How a scan came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Two or more zero records, or the file simply ran out between entries
    Clean,
    /// Only one zero record at the end. Worth a warning, but not an error.
    /// (The u64 is the lone record's index.)
    LoneZeroBlock { record: u64 },
    /// The last entry needs data past the end of the file.
    Truncated,
}

/// Decides how a scan ended from where it stopped
/// and the length of the archive.
pub fn classify_termination(position: u64, archive_len: u64) -> Termination {
    let record = RECORD_SIZE as u64;
    match archive_len.checked_sub(position) {
        None => Termination::Truncated,
        Some(0) => Termination::Clean,
        Some(left) if left < record => Termination::Truncated,
        Some(left) if left == record => Termination::LoneZeroBlock {
            record: position / record,
        },
        Some(_) => Termination::Clean,
    }
}

/// Streams an entry's content from the archive into `sink`.
///
/// If the archive ends early, whatever is there gets written
/// before this fails with `TruncatedArchive`.
pub fn copy_content<W: io::Write + ?Sized>(
    reader: &mut WindowedReader,
    span: &ContentSpan,
    sink: &mut W,
) -> TarResult<u64> {
    debug!("Copying {:?}", span);
    let copied = reader.read_absolute(span.offset, span.available, sink)?;
    if copied < span.declared {
        warn!(
            "Only {} of {} bytes at offset {} are in the archive",
            copied, span.declared, span.offset
        );
        return Err(TarError::TruncatedArchive);
    }
    Ok(copied)
}

/// Writes an entry's content to `destination`, replacing any file there.
///
/// A truncated entry leaves a partial file behind.
pub fn extract(
    reader: &mut WindowedReader,
    span: &ContentSpan,
    destination: &Path,
) -> TarResult<u64> {
    let mut file = File::create(destination)?;
    let written = copy_content(reader, span, &mut file)?;
    info!("Extracted {} ({} bytes)", destination.display(), written);
    Ok(written)
}

/// Where an entry gets extracted to, under `output_dir`.
///
/// Entry paths come from the archive, so refuse any that would climb out.
/// A leading `/` is dropped.
pub fn destination(header: &HeaderRecord, output_dir: &Path) -> TarResult<PathBuf> {
    Ok(output_dir.join(relative_path(&header.path)?))
}

fn relative_path(path: &Utf8Path) -> TarResult<Utf8PathBuf> {
    let mut relative = Utf8PathBuf::new();

    for component in path.components() {
        match component {
            Utf8Component::Prefix(prefix) => {
                return Err(TarError::InvalidPath(format!(
                    "Prefix {prefix} found in path {path}",
                )));
            }
            Utf8Component::RootDir => {
                warn!("Root directory found in path {path}");
                // Extract it relative to the output directory anyways.
            }
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                return Err(TarError::InvalidPath(format!(
                    "Parent dir (..) found in path {path}",
                )));
            }
            Utf8Component::Normal(component) => relative.push(component),
        }
    }

    if relative.as_str().is_empty() {
        return Err(TarError::InvalidPath(format!("{path:?} doesn't name a file")));
    }
    Ok(relative)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spec::{records_to_skip, REGULAR_TYPE};
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// A header record for a regular file
    fn header(name: &str, size: u64) -> Vec<u8> {
        let mut record = vec![0; RECORD_SIZE];
        record[..name.len()].copy_from_slice(name.as_bytes());
        record[124..136].copy_from_slice(format!("{:011o}\0", size).as_bytes());
        record[156] = REGULAR_TYPE;
        record[257..263].copy_from_slice(b"ustar\0");
        record
    }

    fn entry(name: &str, content: &[u8]) -> Vec<u8> {
        let mut bytes = header(name, content.len() as u64);
        bytes.extend_from_slice(content);
        let padded = (bytes.len() + RECORD_SIZE - 1) / RECORD_SIZE * RECORD_SIZE;
        bytes.resize(padded, 0);
        bytes
    }

    fn write_archive(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    /// Names and offsets of every header, found by walking the archive
    fn walk(file: &NamedTempFile, window_size: usize) -> (Vec<(String, u64)>, u64) {
        let reader = WindowedReader::open(file.path(), window_size).unwrap();
        let mut headers = HeaderIterator::new(reader);
        let mut seen = Vec::new();
        while let Some(raw) = headers.current() {
            let record =
                HeaderRecord::from_raw(&raw, headers.position(), headers.reader().len()).unwrap();
            seen.push((record.path.to_string(), record.header_offset));
            headers.advance_by(records_to_skip(record.size)).unwrap();
        }
        (seen, headers.position())
    }

    #[test]
    fn test_walk_across_windows() {
        let mut bytes = entry("one", &[1; 100]);
        bytes.extend(entry("two", &[2; 1024]));
        bytes.extend(entry("three", &[3; 3000]));
        bytes.extend(entry("four", &[]));
        bytes.extend([0; 2 * RECORD_SIZE]);
        let file = write_archive(&bytes);

        let expected = vec![
            ("one".to_string(), 0),
            ("two".to_string(), 1024),
            ("three".to_string(), 2560),
            ("four".to_string(), 6144),
        ];
        for window_size in [512, 1024, 4096, 1 << 20] {
            let (seen, stop) = walk(&file, window_size);
            assert_eq!(seen, expected, "window size {}", window_size);
            assert_eq!(stop, 6656, "window size {}", window_size);
            assert_eq!(
                classify_termination(stop, bytes.len() as u64),
                Termination::Clean
            );
        }
    }

    #[test]
    fn test_advance_lands_exactly_on_window_edge() {
        let mut bytes = entry("a", &[7; 1536]);
        bytes.extend([0; 2 * RECORD_SIZE]);
        let file = write_archive(&bytes);

        let reader = WindowedReader::open(file.path(), 2048).unwrap();
        let mut headers = HeaderIterator::new(reader);
        headers.advance_by(4).unwrap();
        assert_eq!(headers.reader().window_index(), 1);
        assert_eq!(headers.position(), 2048);
        assert!(headers.current().is_none());
    }

    #[test]
    fn test_advance_past_end() {
        let bytes = entry("a", &[7; 100]);
        let file = write_archive(&bytes[..RECORD_SIZE]);

        let reader = WindowedReader::open(file.path(), 512).unwrap();
        let mut headers = HeaderIterator::new(reader);
        headers.advance_by(records_to_skip(100)).unwrap();
        assert_eq!(headers.position(), 1024);
        assert!(headers.current().is_none());
        assert_eq!(classify_termination(1024, 512), Termination::Truncated);
    }

    #[test]
    fn test_advance_absurdly_far() {
        let mut bytes = entry("a", &[7; 100]);
        bytes.extend([0; 2 * RECORD_SIZE]);
        let file = write_archive(&bytes);

        for window_size in [512, 2048] {
            let reader = WindowedReader::open(file.path(), window_size).unwrap();
            let mut headers = HeaderIterator::new(reader);
            headers.advance_by(records_to_skip(u64::MAX)).unwrap();
            assert_eq!(headers.position(), bytes.len() as u64 + 512);
            assert!(headers.current().is_none());
            assert_eq!(
                classify_termination(headers.position(), bytes.len() as u64),
                Termination::Truncated
            );

            // Still stuck just past the end
            headers.advance_by(u64::MAX).unwrap();
            assert_eq!(headers.position(), bytes.len() as u64 + 512);
        }
    }

    #[test]
    fn test_empty_archive() {
        let file = write_archive(&[]);
        let (seen, stop) = walk(&file, 512);
        assert!(seen.is_empty());
        assert_eq!(classify_termination(stop, 0), Termination::Clean);
    }

    #[test]
    fn test_classify_termination() {
        assert_eq!(classify_termination(1024, 2048), Termination::Clean);
        assert_eq!(classify_termination(1024, 10240), Termination::Clean);
        assert_eq!(classify_termination(2048, 2048), Termination::Clean);
        assert_eq!(
            classify_termination(1536, 2048),
            Termination::LoneZeroBlock { record: 3 }
        );
        assert_eq!(classify_termination(1536, 1600), Termination::Truncated);
        assert_eq!(classify_termination(2560, 2048), Termination::Truncated);
    }

    #[test]
    fn test_copy_content() {
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        let mut bytes = entry("big", &content);
        bytes.extend([0; 2 * RECORD_SIZE]);
        let file = write_archive(&bytes);

        let mut reader = WindowedReader::open(file.path(), 512).unwrap();
        let raw = RawHeader::new(reader.current_slice()).unwrap();
        let record = HeaderRecord::from_raw(&raw, 0, reader.len()).unwrap();

        let mut out = Vec::new();
        assert_eq!(
            copy_content(&mut reader, &record.content, &mut out).unwrap(),
            5000
        );
        assert_eq!(out, content);
        assert_eq!(reader.window_index(), 0);
    }

    #[test]
    fn test_copy_truncated_content() {
        let bytes = entry("big", &[9; 5000]);
        let file = write_archive(&bytes[..RECORD_SIZE + 1000]);

        let mut reader = WindowedReader::open(file.path(), 512).unwrap();
        let raw = RawHeader::new(reader.current_slice()).unwrap();
        let record = HeaderRecord::from_raw(&raw, 0, reader.len()).unwrap();
        assert!(record.content.is_truncated());

        let mut out = Vec::new();
        assert!(matches!(
            copy_content(&mut reader, &record.content, &mut out),
            Err(TarError::TruncatedArchive)
        ));
        assert_eq!(out, vec![9; 1000]);
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path(Utf8Path::new("a.txt")).unwrap(), "a.txt");
        assert_eq!(relative_path(Utf8Path::new("./a/b")).unwrap(), "a/b");
        assert_eq!(relative_path(Utf8Path::new("/etc/passwd")).unwrap(), "etc/passwd");
        assert!(matches!(
            relative_path(Utf8Path::new("../nope")),
            Err(TarError::InvalidPath(_))
        ));
        assert!(matches!(
            relative_path(Utf8Path::new("a/../../nope")),
            Err(TarError::InvalidPath(_))
        ));
        assert!(matches!(
            relative_path(Utf8Path::new("")),
            Err(TarError::InvalidPath(_))
        ));
    }
}
