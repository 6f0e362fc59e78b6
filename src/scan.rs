//! Drives a whole list or extract run over an archive.
//!
//! ```no_run
//! # use chunktar::scan::*;
//! # use chunktar::read::HeaderRecord;
//! struct Printer;
//!
//! impl Observer for Printer {
//!     fn matched(&mut self, header: &HeaderRecord, _destination: Option<&std::path::Path>) {
//!         println!("{}", header.path);
//!     }
//!
//!     fn not_found(&mut self, name: &str) {
//!         println!("{}: Not found in archive", name);
//!     }
//! }
//!
//! let requested = vec![String::from("notes.txt")];
//! let report = scan(
//!     "foo.tar",
//!     Action::List,
//!     &requested,
//!     &ScanOptions::default(),
//!     &mut Printer,
//! )?;
//! report.into_result()?;
//! # Ok::<(), chunktar::result::TarError>(())
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::*;

use crate::read::*;
use crate::result::*;
use crate::spec::{self, MagicCheck};
use crate::window::{WindowedReader, DEFAULT_WINDOW_SIZE};

/// What to do with each matching entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Extract,
}

/// Knobs for a scan
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Bytes of archive held in memory at once.
    /// Must be a positive multiple of 512.
    pub window_size: usize,

    pub magic_check: MagicCheck,

    /// Where extracted files go
    pub output_dir: PathBuf,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            magic_check: MagicCheck::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Receives the results of a scan as they happen.
pub trait Observer {
    /// Called for each matching entry, in archive order,
    /// before the entry is extracted.
    /// `destination` is where it will be written (`None` when listing).
    fn matched(&mut self, _header: &HeaderRecord, _destination: Option<&Path>) {}

    /// Called once per requested name that never matched,
    /// after the last entry and before the end of the archive is checked.
    fn not_found(&mut self, _name: &str) {}
}

impl Observer for () {}

/// A summary of a scan that made it to the end of the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// How many entries matched (and were listed or extracted)
    pub matched: usize,

    /// Requested names that weren't in the archive
    pub not_found: Vec<String>,

    /// `Clean` or `LoneZeroBlock`; truncated archives are errors instead.
    pub termination: Termination,
}

impl ScanReport {
    /// Returns true if every requested name was found.
    pub fn is_success(&self) -> bool {
        self.not_found.is_empty()
    }

    /// Turns missing names into a `NotFound` error.
    pub fn into_result(self) -> TarResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TarError::NotFound(self.not_found))
        }
    }
}

/// Everything a run carries from one entry to the next
pub struct ScanContext<'a> {
    headers: HeaderIterator,
    action: Action,
    options: &'a ScanOptions,
    /// Empty means everything matches.
    requested: &'a [String],
    /// Requested names matched so far
    found: HashSet<&'a str>,
    matched: usize,
}

impl<'a> ScanContext<'a> {
    /// Opens the archive and gets ready to scan it.
    pub fn new<P: AsRef<Path>>(
        archive: P,
        action: Action,
        requested: &'a [String],
        options: &'a ScanOptions,
    ) -> TarResult<Self> {
        let archive = archive.as_ref();
        debug!(
            "Opening {} with {}-byte windows",
            archive.display(),
            options.window_size
        );
        let reader = WindowedReader::open(archive, options.window_size)?;

        Ok(Self {
            headers: HeaderIterator::new(reader),
            action,
            options,
            requested,
            found: HashSet::new(),
            matched: 0,
        })
    }

    /// Visits every entry in archive order, then checks how the archive ends.
    ///
    /// Any bad header, I/O error, or truncation stops the run on the spot.
    pub fn run<O: Observer + ?Sized>(mut self, observer: &mut O) -> TarResult<ScanReport> {
        while let Some(raw) = self.headers.current() {
            spec::validate(&raw, self.options.magic_check)?;
            let header = HeaderRecord::from_raw(
                &raw,
                self.headers.position(),
                self.headers.reader().len(),
            )?;
            trace!("{:?}", header);

            if self.wants(header.path.as_str()) {
                self.act(&header, observer)?;
            }

            self.headers.advance_by(spec::records_to_skip(header.size))?;
        }

        let not_found: Vec<String> = self
            .requested
            .iter()
            .filter(|name| !self.found.contains(name.as_str()))
            .cloned()
            .collect();
        for name in &not_found {
            observer.not_found(name);
        }

        let position = self.headers.position();
        let termination = classify_termination(position, self.headers.reader().len());
        match termination {
            Termination::Clean => debug!("Archive ended cleanly at {}", position),
            Termination::LoneZeroBlock { record } => warn!("A lone zero block at {}", record),
            Termination::Truncated => {
                error!("Archive ended in the middle of an entry");
                return Err(TarError::TruncatedArchive);
            }
        }

        Ok(ScanReport {
            matched: self.matched,
            not_found,
            termination,
        })
    }

    /// Checks `name` against the requested names, noting it if found.
    fn wants(&mut self, name: &str) -> bool {
        if self.requested.is_empty() {
            return true;
        }
        let requested: &'a [String] = self.requested;
        match requested.iter().find(|r| r.as_str() == name) {
            Some(requested) => {
                self.found.insert(requested.as_str());
                true
            }
            None => false,
        }
    }

    fn act<O: Observer + ?Sized>(
        &mut self,
        header: &HeaderRecord,
        observer: &mut O,
    ) -> TarResult<()> {
        match self.action {
            Action::List => observer.matched(header, None),
            Action::Extract => {
                let destination = destination(header, &self.options.output_dir)?;
                observer.matched(header, Some(&destination));
                extract(self.headers.reader_mut(), &header.content, &destination)?;
            }
        }
        self.matched += 1;
        Ok(())
    }
}

/// Opens `archive` and runs `action` on every entry named in `requested`
/// (or on every entry, if `requested` is empty).
pub fn scan<P: AsRef<Path>, O: Observer + ?Sized>(
    archive: P,
    action: Action,
    requested: &[String],
    options: &ScanOptions,
    observer: &mut O,
) -> TarResult<ScanReport> {
    ScanContext::new(archive, action, requested, options)?.run(observer)
}
