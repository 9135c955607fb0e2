//! File name search via `rg --files`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::search::args::{Invocation, file_search_args};
use crate::search::engine::{self, Flow};
use crate::search::normalize::{decomposing_filesystem, to_nfc};
use crate::search::process::Launcher;
use crate::search::{FileSearchOptions, SearchComplete, SearchError};

/// Lists files under a folder, relative to it, in the order ripgrep walks them.
#[derive(Clone)]
pub struct FileSearchEngine {
    launcher: Arc<dyn Launcher>,
    normalize: bool,
}

impl FileSearchEngine {
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
    pub fn invocation(&self, options: &FileSearchOptions) -> Invocation {
        Invocation {
            program: self.launcher.program().to_path_buf(),
            args: file_search_args(options, self.normalize),
            cwd: options.folder.clone(),
        }
    }

    /// Report every matching relative path to `on_result`.
    ///
    /// # Errors
    ///
    /// See [`engine::run`].
    pub async fn search<F>(
        &self,
        options: &FileSearchOptions,
        cancel: &CancellationToken,
        mut on_result: F,
    ) -> Result<SearchComplete, SearchError>
    where
        F: FnMut(String),
    {
        let invocation = self.invocation(options);
        let max = options.max_results;
        let mut count = 0usize;

        engine::run(self.launcher.as_ref(), &invocation, cancel, |line| {
            if max.is_some_and(|max| count >= max) {
                return Ok(Flow::Stop);
            }
            let path = if self.normalize {
                to_nfc(&line).into_owned()
            } else {
                line
            };
            on_result(path);
            count += 1;
            Ok(if max.is_some_and(|max| count >= max) {
                Flow::Stop
            } else {
                Flow::Continue
            })
        })
        .await
    }
}
