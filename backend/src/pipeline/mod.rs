//! The CSV-to-catalog import pipeline.
//!
//! Flow of a run:
//! 1. [`importer::CsvImporter`] reads the file, maps each row with
//!    [`mapper::ColumnMapper`] and checks it with [`validator::RowValidator`].
//! 2. Valid rows are buffered by [`batch::BatchQueue`] and written to the
//!    persistent queue one batch per transaction.
//! 3. [`worker::ImportWorker`] drains the queue in bounded passes, resolving
//!    each raw id with [`resolver::IdentifierResolver`], saving the product and
//!    attaching its image through [`images::ImageAssociator`].
//! 4. [`progress::ProgressTracker`] keeps the run counters and log, and marks
//!    the run completed once every row is accounted for.

pub mod batch;
pub mod images;
pub mod importer;
pub mod mapper;
pub mod progress;
pub mod resolver;
pub mod validator;
pub mod worker;
