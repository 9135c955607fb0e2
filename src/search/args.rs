//! Ripgrep command-line construction.

use std::fmt::Write;
use std::path::PathBuf;

use crate::search::normalize::to_nfd;
use crate::search::{FileSearchOptions, TextQuery, TextSearchOptions};

/// A fully resolved ripgrep command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    /// Best-effort rendering for the diagnostic log. Not shell-safe.
    #[must_use]
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            if arg.starts_with('-') {
                let _ = write!(line, " {arg}");
            } else {
                let _ = write!(line, " '{arg}'");
            }
        }
        let _ = write!(line, "\n - cwd: {}", self.cwd.display());
        line
    }
}

/// Rewrite a glob so ripgrep matches it relative to the search root.
#[must_use]
pub fn anchor_glob(glob: &str) -> String {
    let mut anchored = if glob.starts_with('/') {
        glob.to_string()
    } else {
        format!("/{glob}")
    };
    if anchored.ends_with('/') {
        anchored.push_str("**");
    }
    anchored
}

/// Arguments for `rg --files`.
#[must_use]
pub fn file_search_args(options: &FileSearchOptions, decompose: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--files".into(),
        "--hidden".into(),
        "--case-sensitive".into(),
    ];
    push_globs(&mut args, options, decompose);
    push_ignore_flags(&mut args, options);
    args
}

/// Arguments for `rg --json` content search.
#[must_use]
pub fn text_search_args(
    query: &TextQuery,
    options: &TextSearchOptions,
    decompose: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["--hidden".into()];
    args.push(if query.is_case_sensitive {
        "--case-sensitive".into()
    } else {
        "--ignore-case".into()
    });

    push_globs(&mut args, &options.files, decompose);

    if let Some(size) = options.max_file_size {
        args.push("--max-filesize".into());
        args.push(size.to_string());
    }

    push_ignore_flags(&mut args, &options.files);

    if let Some(encoding) = options
        .encoding
        .as_deref()
        .filter(|e| !e.eq_ignore_ascii_case("utf8") && !e.eq_ignore_ascii_case("utf-8"))
    {
        args.push("--encoding".into());
        args.push(encoding.to_string());
    }

    args.push("--json".into());

    if query.is_multiline {
        args.push("--multiline".into());
    }
    if let Some(n) = options.before_context.filter(|n| *n > 0) {
        args.push("--before-context".into());
        args.push(n.to_string());
    }
    if let Some(n) = options.after_context.filter(|n| *n > 0) {
        args.push("--after-context".into());
        args.push(n.to_string());
    }
    if let Some(n) = options.max_results_per_file {
        args.push("--max-count".into());
        args.push(n.to_string());
    }

    if !query.is_regex {
        args.push("--fixed-strings".into());
    }
    if query.is_word_match {
        args.push("--word-regexp".into());
    }

    args.push("--".into());
    args.push(query.pattern.clone());
    args.push(".".into());
    args
}

fn push_globs(args: &mut Vec<String>, options: &FileSearchOptions, decompose: bool) {
    let inclusions = options.includes.iter().map(|g| anchor_glob(g));
    let exclusions = options.excludes.iter().map(|g| format!("!{}", anchor_glob(g)));

    for glob in inclusions.chain(exclusions) {
        // Names may be stored decomposed on disk; match both forms.
        let decomposed = decompose
            .then(|| to_nfd(&glob).into_owned())
            .filter(|d| *d != glob);
        args.push("-g".into());
        args.push(glob);
        if let Some(decomposed) = decomposed {
            args.push("-g".into());
            args.push(decomposed);
        }
    }
}

fn push_ignore_flags(args: &mut Vec<String>, options: &FileSearchOptions) {
    if options.use_ignore_files {
        args.push("--no-ignore-parent".into());
    } else {
        args.push("--no-ignore".into());
    }

    if options.follow_symlinks {
        args.push("--follow".into());
    }

    args.push("--no-config".into());
    if !options.use_global_ignore_files {
        args.push("--no-ignore-global".into());
    }
}
