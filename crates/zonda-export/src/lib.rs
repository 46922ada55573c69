//! Export formats for the zonda exchange history exporter.
//!
//! Normalized records leave the fetch pipeline as per-unit streams; this
//! crate writes them out:
//!
//! - [`ExportFormat`] - CSV or NDJSON selection
//! - [`RecordWriter`] - streaming serialization into any `io::Write` sink
//! - [`Exporter`] - the on-disk unit file layout

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/zonda/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod exporter;
mod format;
mod writer;

pub use exporter::Exporter;
pub use format::{ExportError, ExportFormat};
pub use writer::{RecordWriter, csv_header};
