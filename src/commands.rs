//! Command implementations for the CLI.

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::cli::{Commands, FilterArgs};
use crate::config::{Config, SearchConfig};
use crate::provider::SearchProvider;
use crate::search::{
    FileSearchOptions, SearchComplete, SearchError, TextQuery, TextSearchOptions, TextSearchResult,
};

/// Maximum length for a search pattern.
const MAX_PATTERN_LENGTH: usize = 1000;

/// What a finished command reports back to `main`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Results written to the output.
    pub results: usize,
    pub limit_hit: bool,
    /// The search was interrupted; `results` were written before that.
    pub cancelled: bool,
}

/// Validate the directory a search runs in.
fn validate_root(root: &Path) -> anyhow::Result<PathBuf> {
    if !root.exists() {
        anyhow::bail!("Search root does not exist: {}", root.display());
    }
    if !root.is_dir() {
        anyhow::bail!("Search root is not a directory: {}", root.display());
    }
    Ok(root.to_path_buf())
}

/// Validate a user-provided text search pattern.
fn validate_pattern(pattern: &str) -> anyhow::Result<()> {
    if pattern.is_empty() {
        anyhow::bail!("Pattern cannot be empty");
    }

    if pattern.len() > MAX_PATTERN_LENGTH {
        anyhow::bail!(
            "Pattern too long: {} chars (max {MAX_PATTERN_LENGTH})",
            pattern.len()
        );
    }

    Ok(())
}

/// Merge configured defaults with command-line filters.
///
/// Excludes from both sources apply; flags on the command line can only
/// widen what the config allows.
#[must_use]
pub fn file_options(config: &SearchConfig, folder: PathBuf, filters: &FilterArgs) -> FileSearchOptions {
    FileSearchOptions {
        folder,
        includes: filters.includes.clone(),
        excludes: config
            .excludes
            .iter()
            .chain(&filters.excludes)
            .cloned()
            .collect(),
        follow_symlinks: config.follow_symlinks || filters.follow,
        use_ignore_files: config.use_ignore_files && !filters.no_ignore,
        use_global_ignore_files: config.use_global_ignore_files || filters.global_ignore,
        max_results: filters.max_results.or(config.max_results),
    }
}

/// Turn a search outcome into a summary, treating cancellation as quiet.
fn summarize(
    results: usize,
    outcome: Result<SearchComplete, SearchError>,
) -> anyhow::Result<SearchSummary> {
    match outcome {
        Ok(complete) => Ok(SearchSummary {
            results,
            limit_hit: complete.limit_hit,
            cancelled: false,
        }),
        Err(SearchError::Cancelled) => Ok(SearchSummary {
            results,
            limit_hit: false,
            cancelled: true,
        }),
        Err(e) => Err(e.into()),
    }
}

/// List files, writing one relative path per line to `out` as they arrive.
///
/// # Errors
///
/// Returns an error if ripgrep cannot be started, fails, or `out` cannot be
/// written. Cancellation is reported through [`SearchSummary::cancelled`].
pub async fn files<W: Write>(
    provider: &SearchProvider,
    options: FileSearchOptions,
    token: &CancellationToken,
    out: &mut W,
) -> anyhow::Result<SearchSummary> {
    let mut results = provider.search_files(options, token);
    let mut count = 0;

    while let Some(path) = results.next().await {
        writeln!(out, "{path}")?;
        count += 1;
    }

    summarize(count, results.finish().await)
}

/// Search contents, writing `path:line:text` for matches and
/// `path-line-text` for context lines.
///
/// # Errors
///
/// As [`files`].
pub async fn text<W: Write>(
    provider: &SearchProvider,
    query: TextQuery,
    options: TextSearchOptions,
    token: &CancellationToken,
    out: &mut W,
) -> anyhow::Result<SearchSummary> {
    validate_pattern(&query.pattern)?;

    let mut results = provider.search_text(query, options, token);
    let mut count = 0;

    while let Some(result) = results.next().await {
        match result {
            TextSearchResult::Match(m) => {
                for (offset, line) in m.preview.lines().enumerate() {
                    writeln!(out, "{}:{}:{line}", m.path, *m.lines.start() + offset as u64)?;
                }
                count += 1;
            }
            TextSearchResult::Context(c) => {
                writeln!(out, "{}-{}-{}", c.path, c.line_number, c.text)?;
            }
        }
    }

    summarize(count, results.finish().await)
}

/// Run a parsed CLI command, cancelling on Ctrl-C.
///
/// # Errors
///
/// Returns an error if arguments are invalid or the search fails.
pub async fn run(command: Commands, config: &Config) -> anyhow::Result<SearchSummary> {
    let provider = SearchProvider::from_config(config);
    let token = CancellationToken::new();

    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let summary = match command {
        Commands::Files { root, filters } => {
            let folder = validate_root(&root.unwrap_or_else(|| PathBuf::from(".")))?;
            let options = file_options(&config.search, folder, &filters);
            files(&provider, options, &token, &mut out).await?
        }
        Commands::Text {
            pattern,
            root,
            regex,
            word,
            case_sensitive,
            multiline,
            max_per_file,
            context,
            filters,
        } => {
            let folder = validate_root(&root.unwrap_or_else(|| PathBuf::from(".")))?;
            let scope = file_options(&config.search, folder, &filters);
            let query = TextQuery {
                pattern,
                is_regex: regex,
                is_case_sensitive: case_sensitive,
                is_word_match: word,
                is_multiline: multiline,
            };
            let options = TextSearchOptions {
                max_results: scope.max_results,
                max_results_per_file: max_per_file,
                before_context: context,
                after_context: context,
                files: scope,
                ..TextSearchOptions::default()
            };
            text(&provider, query, options, &token, &mut out).await?
        }
    };

    out.flush()?;
    Ok(summary)
}
