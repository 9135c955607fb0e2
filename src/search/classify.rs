//! Exit classification for ripgrep runs.
//!
//! Ripgrep exits with 1 both when nothing matched and, on some versions,
//! alongside real errors, so the decision leans on stderr text. All knowledge
//! of ripgrep's message wording lives here.

use crate::search::process::ExitInfo;

/// How a finished (not cancelled) run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Output was produced.
    Completed,
    /// Nothing was found and nothing went wrong.
    NoMatches,
    Failed { reason: String },
}

/// Messages ripgrep prints when a search legitimately finds nothing.
const BENIGN: &[&str] = &[
    "No files were searched",
    "Running with --debug will show why files are being skipped",
];

/// Decide the outcome of a run from its exit status, whether stdout ever
/// produced a byte, and the accumulated stderr text.
#[must_use]
pub fn classify(exit: &ExitInfo, saw_stdout: bool, stderr: &str) -> Classification {
    if saw_stdout {
        return Classification::Completed;
    }

    let stderr = stderr.trim();
    if stderr.is_empty() {
        return match exit.code {
            Some(0 | 1) => Classification::NoMatches,
            Some(code) => Classification::Failed {
                reason: format!("ripgrep exited with code {code}"),
            },
            None => Classification::Failed {
                reason: "ripgrep was terminated by a signal".to_string(),
            },
        };
    }

    if is_benign(stderr) {
        return Classification::NoMatches;
    }

    Classification::Failed {
        reason: error_label(stderr).unwrap_or_else(|| stderr.to_string()),
    }
}

fn is_benign(stderr: &str) -> bool {
    stderr
        .lines()
        .map(strip_prefix)
        .filter(|line| !line.is_empty())
        .all(|line| BENIGN.iter().any(|b| line.starts_with(b)))
}

/// Short display label for recognizable ripgrep errors.
#[must_use]
pub fn error_label(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr.lines().map(strip_prefix).collect();
    let first = lines.iter().copied().find(|l| !l.is_empty())?;

    if lines.iter().any(|l| l.starts_with("regex parse error")) {
        return Some(regex_parse_error(&lines));
    }

    if first.starts_with("PCRE2: error compiling pattern") {
        return Some(first.to_string());
    }

    if let Some(encoding) = first
        .split_once("unknown encoding: ")
        .map(|(_, encoding)| encoding.trim())
    {
        return Some(format!("Unknown encoding: {encoding}"));
    }

    if first.starts_with("error parsing glob") || first.starts_with("the literal") {
        return Some(uppercase_first(first));
    }

    if let Some(line) = lines.iter().find(|l| l.contains("Permission denied")) {
        return Some(format!("Permission denied: {line}"));
    }

    if lines
        .iter()
        .any(|l| l.contains("unexpected argument") || l.contains("unrecognized flag"))
    {
        return Some(format!("Unsupported ripgrep option: {first}"));
    }

    None
}

fn regex_parse_error(lines: &[&str]) -> String {
    let detail = lines
        .iter()
        .find_map(|l| l.strip_prefix("error:"))
        .or_else(|| {
            lines
                .iter()
                .find_map(|l| l.strip_prefix("PCRE2:"))
                .and_then(|l| l.split_once(':').map(|(_, msg)| msg))
        })
        .map(str::trim);

    match detail {
        Some(detail) if !detail.is_empty() => format!("Regex parse error: {detail}"),
        _ => "Regex parse error".to_string(),
    }
}

fn strip_prefix(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix("rg: ").unwrap_or(line)
}

fn uppercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGEX_ERROR: &str = "rg: regex parse error:\n    (?:foo(\n    ^\nerror: unclosed group\n";

    fn exit(code: i32) -> ExitInfo {
        ExitInfo { code: Some(code) }
    }

    #[test]
    fn stdout_always_completes() {
        assert_eq!(
            classify(&exit(2), true, REGEX_ERROR),
            Classification::Completed
        );
        assert_eq!(
            classify(&ExitInfo { code: None }, true, ""),
            Classification::Completed
        );
    }

    #[test]
    fn no_output_and_exit_one_is_no_matches() {
        assert_eq!(classify(&exit(1), false, ""), Classification::NoMatches);
        assert_eq!(classify(&exit(0), false, "  \n"), Classification::NoMatches);
    }

    #[test]
    fn benign_stderr_is_no_matches() {
        let stderr = "rg: No files were searched, which means ripgrep probably applied a filter you didn't expect.\nRunning with --debug will show why files are being skipped.\n";
        assert_eq!(classify(&exit(1), false, stderr), Classification::NoMatches);
    }

    #[test]
    fn benign_line_mixed_with_errors_fails() {
        let stderr = "rg: No files were searched\nrg: something broke";
        assert!(matches!(
            classify(&exit(2), false, stderr),
            Classification::Failed { .. }
        ));
    }

    #[test]
    fn regex_error_fails_with_label() {
        assert_eq!(
            classify(&exit(2), false, REGEX_ERROR),
            Classification::Failed {
                reason: "Regex parse error: unclosed group".to_string()
            }
        );
    }

    #[test]
    fn pcre2_detail_is_used_without_error_line() {
        let stderr = "regex parse error:\nPCRE2: error compiling pattern at offset 3: missing closing parenthesis";
        assert_eq!(
            error_label(stderr).as_deref(),
            Some("Regex parse error: missing closing parenthesis")
        );
    }

    #[test]
    fn glob_error_is_capitalized() {
        let stderr = "rg: error parsing glob '/[': unclosed character class; missing ']'";
        assert_eq!(
            error_label(stderr).as_deref(),
            Some("Error parsing glob '/[': unclosed character class; missing ']'")
        );
    }

    #[test]
    fn unknown_encoding_is_labelled() {
        let stderr = "rg: grep config error: unknown encoding: klingon";
        assert_eq!(
            error_label(stderr).as_deref(),
            Some("Unknown encoding: klingon")
        );
    }

    #[test]
    fn literal_newline_is_labelled() {
        let stderr = "the literal '\"\\n\"' is not allowed in a regex";
        assert_eq!(
            error_label(stderr).as_deref(),
            Some("The literal '\"\\n\"' is not allowed in a regex")
        );
    }

    #[test]
    fn permission_errors_are_labelled() {
        let stderr = "rg: ./secret: Permission denied (os error 13)";
        assert_eq!(
            classify(&exit(2), false, stderr),
            Classification::Failed {
                reason: "Permission denied: ./secret: Permission denied (os error 13)"
                    .to_string()
            }
        );
    }

    #[test]
    fn unknown_stderr_is_passed_through() {
        assert_eq!(
            classify(&exit(2), false, "  something odd happened\n"),
            Classification::Failed {
                reason: "something odd happened".to_string()
            }
        );
    }

    #[test]
    fn silent_failures_mention_exit_status() {
        assert_eq!(
            classify(&exit(2), false, ""),
            Classification::Failed {
                reason: "ripgrep exited with code 2".to_string()
            }
        );
        assert!(matches!(
            classify(&ExitInfo { code: None }, false, ""),
            Classification::Failed { .. }
        ));
    }
}
