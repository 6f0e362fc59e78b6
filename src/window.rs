//! A fixed-size window sliding over an archive file.
//!
//! The scan only ever needs one window of the archive in memory at a time.
//! Extraction reads content through [`WindowedReader::read_absolute()`],
//! which goes straight to the file with its own scratch buffer,
//! so it never disturbs whatever window the scan is sitting on.

use std::fs::File;
use std::io::{self, prelude::*, SeekFrom};
use std::path::Path;

use log::*;

use crate::result::*;
use crate::spec::RECORD_SIZE;

/// The window size used unless told otherwise: 1 MiB
pub const DEFAULT_WINDOW_SIZE: usize = 1 << 20;

/// Size of the scratch buffer `read_absolute()` moves data through
const TRANSFER_CHUNK: usize = 64 * 1024;

/// Owns the archive file and the window currently loaded from it.
///
/// Window `i` holds the bytes `[i * window_size, i * window_size + valid_len)`.
/// Every window but the last is full.
pub struct WindowedReader {
    file: File,
    /// Total length of the archive, taken when it was opened
    len: u64,
    window_size: usize,
    /// Index of the loaded window
    index: u64,
    /// Allocated once at `window_size` and reloaded in place
    window: Vec<u8>,
    /// Bytes of `window` holding archive data
    valid: usize,
    /// Transfer buffer for offset-addressed reads
    scratch: Vec<u8>,
}

impl WindowedReader {
    /// Opens the archive at `path` and loads its first window.
    pub fn open<P: AsRef<Path>>(path: P, window_size: usize) -> TarResult<Self> {
        // Check the size before touching the file system.
        check_window_size(window_size)?;
        let file = File::open(path.as_ref())?;
        Self::from_file(file, window_size)
    }

    /// Like `WindowedReader::open()`, but for an already-open file.
    pub fn from_file(file: File, window_size: usize) -> TarResult<Self> {
        check_window_size(window_size)?;
        let len = file.metadata()?.len();

        let mut reader = Self {
            file,
            len,
            window_size,
            index: 0,
            window: vec![0; window_size],
            valid: 0,
            scratch: vec![0; TRANSFER_CHUNK],
        };
        reader.load(0)?;
        Ok(reader)
    }

    /// Total length of the archive in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Index of the loaded window
    pub fn window_index(&self) -> u64 {
        self.index
    }

    /// Absolute offset of the loaded window's first byte
    pub fn window_start(&self) -> u64 {
        self.index * self.window_size as u64
    }

    /// Index of the last window. An empty archive has one (empty) window.
    pub fn final_window_index(&self) -> u64 {
        match self.len {
            0 => 0,
            len => (len - 1) / self.window_size as u64,
        }
    }

    pub fn is_final_window(&self) -> bool {
        self.index == self.final_window_index()
    }

    /// The archive bytes held by the current window
    pub fn current_slice(&self) -> &[u8] {
        &self.window[..self.valid]
    }

    /// Loads the next window in sequence.
    pub fn advance_window(&mut self) -> TarResult<()> {
        self.advance_windows(1)
    }

    /// Moves `count` windows forward, loading only the one we land on.
    pub(crate) fn advance_windows(&mut self, count: u64) -> TarResult<()> {
        if count == 0 {
            return Ok(());
        }
        let target = self.index + count;
        if target > self.final_window_index() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "No window {} in a {}-byte archive (last is {})",
                    target,
                    self.len,
                    self.final_window_index()
                ),
            )
            .into());
        }
        self.load(target)
    }

    /// Reads up to `length` bytes starting at `offset` into `sink`,
    /// returning how many bytes were actually available.
    ///
    /// This doesn't touch the scan window.
    pub fn read_absolute<W: Write + ?Sized>(
        &mut self,
        offset: u64,
        length: u64,
        sink: &mut W,
    ) -> TarResult<u64> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut remaining = length;
        while remaining > 0 {
            let wanted = remaining.min(self.scratch.len() as u64) as usize;
            let got = read_fully(&mut self.file, &mut self.scratch[..wanted])?;
            sink.write_all(&self.scratch[..got])?;
            remaining -= got as u64;
            if got < wanted {
                debug!(
                    "File ended {} bytes short reading {} bytes at {}",
                    remaining, length, offset
                );
                break;
            }
        }
        Ok(length - remaining)
    }

    /// How many bytes of the archive window `index` covers
    fn valid_len_of(&self, index: u64) -> usize {
        let start = index * self.window_size as u64;
        // Never more than window_size, so the cast can't truncate.
        self.len.saturating_sub(start).min(self.window_size as u64) as usize
    }

    fn load(&mut self, index: u64) -> TarResult<()> {
        let start = index * self.window_size as u64;
        let expected = self.valid_len_of(index);

        self.file.seek(SeekFrom::Start(start))?;
        let got = read_fully(&mut self.file, &mut self.window[..expected])?;
        if got < expected {
            // The archive shrank out from under us.
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Window {} ended after {} of {} bytes",
                    index, got, expected
                ),
            )
            .into());
        }
        debug!("Loaded window {} ({} bytes at {})", index, expected, start);

        self.index = index;
        self.valid = expected;
        Ok(())
    }
}

fn check_window_size(window_size: usize) -> TarResult<()> {
    if window_size == 0 || window_size % RECORD_SIZE != 0 {
        return Err(TarError::InvalidWindowSize(window_size));
    }
    Ok(())
}

/// Reads until `buf` is full or the reader hits EOF, returning the bytes read.
fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
