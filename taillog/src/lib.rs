/// Incremental ingestion of database server logs.
///
/// A *config file* names one or more log files, possibly through templates
/// that rotate by time or by directory contents, and records for each one
/// the concrete file and byte offset a previous run stopped at.  This
/// library resolves the templates to the files that need reading now, reads
/// each file from its saved offset, reassembles physical lines into logical
/// *records* (a statement plus its DETAIL/HINT/CONTEXT continuations),
/// filters them, and folds them into *clusters* keyed by a canonical form
/// of the statement, so that ten thousand inserts differing only in their
/// literal values arrive as one reportable item with a count.
///
/// The config file is the only persistent state.  After a successful run
/// the caller pushes the new offsets back into the model and rewrites the
/// file; the rewrite preserves comments and ordering, and a run that read
/// nothing rewrites it byte-identically.
///
/// The library has no opinions about presentation or delivery; rendering
/// the cluster set and mailing it are the binary's business.
mod cluster;
mod confile;
mod filter;
mod flatten;
mod prefix;
mod reader;
mod resolver;

// The configuration model: one parsed config file plus the state of each
// watched file entry, and the rewrite that persists offsets for next time.

pub use confile::Config;
pub use confile::FileEntry;
pub use confile::LogKind;
pub use confile::ReportType;
pub use confile::SortBy;
pub use confile::DEFAULT_SUBJECT;

// Prefix grammar: compile a log_line_prefix format into the strict,
// cluster-notice and timestamp-only matchers the reader classifies with.

pub use prefix::PrefixSet;
pub use prefix::StrictMatch;

// File resolution: template expansion and the ordered queue of concrete
// files to read for one entry.

pub use resolver::current_path;
pub use resolver::expand_env;
pub use resolver::has_time_directives;
pub use resolver::render_template;
pub use resolver::resolve;
pub use resolver::warped_now;

// Reading and multi-line reassembly.

pub use reader::read_file;
pub use reader::LogRecord;
pub use reader::ReadOptions;
pub use reader::ReadOutcome;

// Record filtering and the squashed single-line body.

pub use filter::squash;
pub use filter::statement_tail;
pub use filter::FilterCache;
pub use filter::FilterSet;

// Statement canonicalization.

pub use flatten::Flattener;

// Cluster statistics.

pub use cluster::Cluster;
pub use cluster::ClusterSet;
pub use cluster::Occurrence;
