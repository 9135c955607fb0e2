//! Content search via `rg --json`.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::search::args::{Invocation, text_search_args};
use crate::search::engine::{self, Flow};
use crate::search::normalize::{decomposing_filesystem, to_nfc};
use crate::search::process::Launcher;
use crate::search::{
    SearchComplete, SearchError, TextQuery, TextSearchContext, TextSearchMatch, TextSearchOptions,
    TextSearchResult,
};

/// Finds pattern matches in file contents.
#[derive(Clone)]
pub struct TextSearchEngine {
    launcher: Arc<dyn Launcher>,
    normalize: bool,
}

impl TextSearchEngine {
    #[must_use]
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            normalize: decomposing_filesystem(),
        }
    }

    /// Force Unicode normalization of paths and globs on or off.
    #[must_use]
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    #[must_use]
    pub fn invocation(&self, query: &TextQuery, options: &TextSearchOptions) -> Invocation {
        Invocation {
            program: self.launcher.program().to_path_buf(),
            args: text_search_args(query, options, self.normalize),
            cwd: options.files.folder.clone(),
        }
    }

    /// Report matches (and requested context lines) to `on_result`.
    ///
    /// `max_results` counts matches only.
    ///
    /// # Errors
    ///
    /// See [`engine::run`].
    pub async fn search<F>(
        &self,
        query: &TextQuery,
        options: &TextSearchOptions,
        cancel: &CancellationToken,
        mut on_result: F,
    ) -> Result<SearchComplete, SearchError>
    where
        F: FnMut(TextSearchResult),
    {
        let invocation = self.invocation(query, options);
        let max = options.max_results;
        let mut found = 0usize;

        engine::run(self.launcher.as_ref(), &invocation, cancel, |line| {
            let Some(result) = parse_line(&line, self.normalize) else {
                return Ok(Flow::Continue);
            };
            if matches!(result, TextSearchResult::Match(_)) {
                if max.is_some_and(|max| found >= max) {
                    return Ok(Flow::Stop);
                }
                found += 1;
            }
            on_result(result);
            Ok(if max.is_some_and(|max| found >= max) {
                Flow::Stop
            } else {
                Flow::Continue
            })
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct RgMessage {
    #[serde(rename = "type")]
    msg_type: String,
    data: Option<RgData>,
}

#[derive(Debug, Deserialize)]
struct RgData {
    path: Option<RgText>,
    lines: Option<RgText>,
    line_number: Option<u64>,
    #[serde(default)]
    submatches: Vec<RgSubmatch>,
}

/// Ripgrep sends `text` for UTF-8 data and base64 `bytes` otherwise.
#[derive(Debug, Deserialize)]
struct RgText {
    text: Option<String>,
    bytes: Option<String>,
}

impl RgText {
    /// The payload as text, decoding `bytes` lossily.
    fn into_string(self) -> Option<String> {
        if let Some(text) = self.text {
            return Some(text);
        }
        let encoded = self.bytes?;
        match STANDARD.decode(encoded) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!("skipping undecodable ripgrep bytes: {e}");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RgSubmatch {
    start: usize,
    end: usize,
}

/// Turn one line of `rg --json` output into a result, if it is one.
fn parse_line(line: &str, normalize: bool) -> Option<TextSearchResult> {
    if line.is_empty() {
        return None;
    }

    let msg: RgMessage = match serde_json::from_str(line) {
        Ok(m) => m,
        Err(e) => {
            warn!("skipping unparseable ripgrep output: {e}");
            return None;
        }
    };

    let is_match = match msg.msg_type.as_str() {
        "match" => true,
        "context" => false,
        _ => return None,
    };

    let data = msg.data?;
    let Some(path) = data.path.and_then(RgText::into_string) else {
        warn!("skipping {} without a path", msg.msg_type);
        return None;
    };
    let Some(text) = data.lines.and_then(RgText::into_string) else {
        warn!("skipping {} in {path} without line text", msg.msg_type);
        return None;
    };
    let Some(line_number) = data.line_number else {
        warn!("skipping {} in {path} without a line number", msg.msg_type);
        return None;
    };

    let path = path.strip_prefix("./").unwrap_or(&path);
    let path = if normalize {
        to_nfc(path).into_owned()
    } else {
        path.to_string()
    };
    let preview = trim_line_break(&text);

    if !is_match {
        return Some(TextSearchResult::Context(TextSearchContext {
            path,
            line_number,
            text: preview.to_string(),
        }));
    }

    let extra_lines = preview.matches('\n').count() as u64;
    let ranges = data
        .submatches
        .iter()
        .map(|m| clamp(preview, m.start)..clamp(preview, m.end))
        .collect();

    Some(TextSearchResult::Match(TextSearchMatch {
        path,
        lines: line_number..=line_number + extra_lines,
        preview: preview.to_string(),
        ranges,
    }))
}

/// Clamp a byte offset into `text`, backing off to a char boundary.
fn clamp(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

fn trim_line_break(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}
