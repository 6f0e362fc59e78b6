//! chunktar lists and extracts tar archives without ever holding more than
//! a fixed-size window of them in memory:
//!
//! ```no_run
//! # use chunktar::*;
//! // List everything in the archive.
//! let report = scan("foo.tar", Action::List, &[], &ScanOptions::default(), &mut ())?;
//! println!("{} entries", report.matched);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! To see entries as they go by, implement [`Observer`]:
//!
//! ```no_run
//! # use std::path::Path;
//! # use chunktar::*;
//! # use chunktar::read::HeaderRecord;
//! struct Echo;
//!
//! impl Observer for Echo {
//!     fn matched(&mut self, header: &HeaderRecord, destination: Option<&Path>) {
//!         if let Some(to) = destination {
//!             println!("{} -> {}", header.path, to.display());
//!         }
//!     }
//! }
//!
//! // Extract two files into out/ with 64 KiB windows.
//! let options = ScanOptions {
//!     window_size: 64 * 1024,
//!     output_dir: "out".into(),
//!     ..ScanOptions::default()
//! };
//! let wanted = vec![String::from("a.txt"), String::from("b.txt")];
//! scan("foo.tar", Action::Extract, &wanted, &options, &mut Echo)?
//!     // Complain if either wasn't there.
//!     .into_result()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The lower-level pieces are public too.
//! A [`WindowedReader`] keeps one window of the file loaded,
//! a [`HeaderIterator`] walks headers through it (loading windows as needed),
//! and [`read::extract()`] copies an entry's content straight from the file
//! so the scan doesn't lose its place.
//!
//! Only regular files are supported. Directories, links, and other entry types
//! stop the scan with [`TarError::UnsupportedType`],
//! since nothing after an entry we don't understand can be trusted.
//!
//! [`Observer`]: scan/trait.Observer.html
//! [`WindowedReader`]: window/struct.WindowedReader.html
//! [`HeaderIterator`]: read/struct.HeaderIterator.html
//! [`read::extract()`]: read/fn.extract.html
//! [`TarError::UnsupportedType`]: result/enum.TarError.html#variant.UnsupportedType

pub mod read;
pub mod result;
pub mod scan;
pub mod spec;
pub mod window;

pub use read::{HeaderIterator, HeaderRecord};
pub use result::{TarError, TarResult};
pub use scan::{scan, Action, Observer, ScanOptions, ScanReport};
pub use spec::MagicCheck;
pub use window::WindowedReader;
