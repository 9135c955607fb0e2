//! Search engine components and shared types.
//!
//! Both engines drive an external ripgrep process: [`args`] builds the
//! invocation, [`process`] supervises the child, [`decoder`] turns stdout
//! chunks into lines, [`classify`] decides the outcome from the exit status
//! and stderr, and [`engine`] ties them together with cancellation.

pub mod args;
pub mod classify;
pub mod decoder;
pub mod engine;
pub mod file;
pub mod normalize;
pub mod process;
pub mod text;

use std::ops::{Range, RangeInclusive};
use std::path::PathBuf;

/// Options shared by file and text search.
///
/// Consumed as already-validated configuration; invalid globs are reported
/// by ripgrep itself and surface as [`SearchError::Tool`].
#[derive(Debug, Clone, Default)]
pub struct FileSearchOptions {
    /// Directory the search runs in. Results are relative to it.
    pub folder: PathBuf,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub follow_symlinks: bool,
    /// Honor `.gitignore`/`.ignore` files inside the folder.
    pub use_ignore_files: bool,
    /// Honor the user's global gitignore.
    pub use_global_ignore_files: bool,
    /// Stop after this many paths and report `limit_hit`.
    pub max_results: Option<usize>,
}

/// What to look for in file contents.
#[derive(Debug, Clone, Default)]
pub struct TextQuery {
    pub pattern: String,
    pub is_regex: bool,
    pub is_case_sensitive: bool,
    pub is_word_match: bool,
    pub is_multiline: bool,
}

/// Options for text search.
#[derive(Debug, Clone, Default)]
pub struct TextSearchOptions {
    pub files: FileSearchOptions,
    /// Stop after this many matches across all files.
    pub max_results: Option<usize>,
    /// Passed to ripgrep as `--max-count`.
    pub max_results_per_file: Option<usize>,
    /// Skip files larger than this many bytes.
    pub max_file_size: Option<u64>,
    /// Encoding label understood by ripgrep (e.g. `utf-16le`).
    pub encoding: Option<String>,
    pub before_context: Option<usize>,
    pub after_context: Option<usize>,
}

/// A single content match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSearchMatch {
    /// Path relative to the search folder.
    pub path: String,
    /// 1-based line numbers covered by the preview.
    pub lines: RangeInclusive<u64>,
    /// Matched line(s) without the trailing line break.
    pub preview: String,
    /// Byte ranges of each submatch within `preview`.
    pub ranges: Vec<Range<usize>>,
}

/// A context line emitted around a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSearchContext {
    pub path: String,
    pub line_number: u64,
    pub text: String,
}

/// A record delivered by the text search engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSearchResult {
    Match(TextSearchMatch),
    Context(TextSearchContext),
}

/// Successful terminal outcome of one search call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchComplete {
    /// The result limit was reached and the process stopped early.
    pub limit_hit: bool,
}

/// Errors that can end a search call.
///
/// Results delivered before the error stay valid.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("failed to start {program}: {source}{hint}")]
    Spawn {
        program: String,
        hint: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{reason}")]
    Tool {
        code: Option<i32>,
        reason: String,
        stderr: String,
    },

    #[error("malformed output stream: {0}")]
    MalformedStream(String),

    #[error("search cancelled")]
    Cancelled,

    #[error("search task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SearchError {
    /// True for caller-initiated cancellation, which is not logged as an error.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
