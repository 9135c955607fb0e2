//! Host-facing search provider.
//!
//! Wraps the engines behind the caller's cancellation token, keeps a registry
//! of in-flight searches so they can all be cancelled at shutdown, and hands
//! results back as lazy [`SearchResults`] streams.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::search::file::FileSearchEngine;
use crate::search::normalize::decomposing_filesystem;
use crate::search::process::{Launcher, RipgrepLauncher};
use crate::search::text::TextSearchEngine;
use crate::search::{
    FileSearchOptions, SearchComplete, SearchError, TextQuery, TextSearchOptions, TextSearchResult,
};

type Registry = Arc<Mutex<HashMap<u64, CancellationToken>>>;

/// Results of one search, delivered in the order ripgrep produced them.
///
/// Dropping it cancels the search.
#[derive(Debug)]
pub struct SearchResults<T> {
    results: mpsc::UnboundedReceiver<T>,
    task: JoinHandle<Result<SearchComplete, SearchError>>,
    cancel: CancellationToken,
}

impl<T> SearchResults<T> {
    /// Next result, or `None` once the search has settled and every result
    /// was taken.
    pub async fn next(&mut self) -> Option<T> {
        self.results.recv().await
    }

    /// Wait for the search to settle. Results not yet taken are discarded.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the search, including
    /// `SearchError::Cancelled`.
    pub async fn finish(mut self) -> Result<SearchComplete, SearchError> {
        (&mut self.task).await?
    }

    /// Drain every result, then settle.
    ///
    /// # Errors
    ///
    /// As [`finish`](Self::finish). Results already collected are lost on error.
    pub async fn collect(mut self) -> Result<(Vec<T>, SearchComplete), SearchError> {
        let mut all = Vec::new();
        while let Some(result) = self.next().await {
            all.push(result);
        }
        let complete = self.finish().await?;
        Ok((all, complete))
    }

    /// Cancel the search. Results already delivered stay valid.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for SearchResults<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Removes a search from the registry when it settles.
struct InFlight {
    id: u64,
    registry: Registry,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

/// Entry point for file and text searches.
pub struct SearchProvider {
    launcher: Arc<dyn Launcher>,
    normalize: bool,
    in_progress: Registry,
    next_id: AtomicU64,
}

impl SearchProvider {
    #[must_use]
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            normalize: decomposing_filesystem(),
            in_progress: Registry::default(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Provider running the ripgrep binary named in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(RipgrepLauncher::new(config.ripgrep_path())))
    }

    /// Force Unicode normalization of paths and globs on or off.
    #[must_use]
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    #[must_use]
    pub fn file_engine(&self) -> FileSearchEngine {
        FileSearchEngine::new(Arc::clone(&self.launcher)).with_normalization(self.normalize)
    }

    #[must_use]
    pub fn text_engine(&self) -> TextSearchEngine {
        TextSearchEngine::new(Arc::clone(&self.launcher)).with_normalization(self.normalize)
    }

    /// Stream relative paths of files under `options.folder`.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn search_files(
        &self,
        options: FileSearchOptions,
        token: &CancellationToken,
    ) -> SearchResults<String> {
        let engine = self.file_engine();
        self.spawn(token, move |cancel, tx| async move {
            engine
                .search(&options, &cancel, |path| {
                    let _ = tx.send(path);
                })
                .await
        })
    }

    /// Collect absolute paths of every file under `options.folder`.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the search.
    pub async fn file_index(
        &self,
        options: FileSearchOptions,
        token: &CancellationToken,
    ) -> Result<Vec<PathBuf>, SearchError> {
        let folder = options.folder.clone();
        let (paths, _) = self.search_files(options, token).collect().await?;
        Ok(paths.into_iter().map(|p| folder.join(p)).collect())
    }

    /// Stream content matches for `query`.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn search_text(
        &self,
        query: TextQuery,
        options: TextSearchOptions,
        token: &CancellationToken,
    ) -> SearchResults<TextSearchResult> {
        let engine = self.text_engine();
        self.spawn(token, move |cancel, tx| async move {
            engine
                .search(&query, &options, &cancel, |result| {
                    let _ = tx.send(result);
                })
                .await
        })
    }

    /// Number of searches that have not settled yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_progress.lock().len()
    }

    /// Cancel every in-flight search.
    pub fn dispose(&self) {
        let tokens: Vec<CancellationToken> = self.in_progress.lock().values().cloned().collect();
        debug!(count = tokens.len(), "cancelling in-flight searches");
        for token in tokens {
            token.cancel();
        }
    }

    fn spawn<T, F, Fut>(&self, token: &CancellationToken, run: F) -> SearchResults<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken, mpsc::UnboundedSender<T>) -> Fut,
        Fut: Future<Output = Result<SearchComplete, SearchError>> + Send + 'static,
    {
        // Child of the caller's token, so either side can cancel it.
        let cancel = token.child_token();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.in_progress.lock().insert(id, cancel.clone());
        let in_flight = InFlight {
            id,
            registry: Arc::clone(&self.in_progress),
        };

        let (tx, results) = mpsc::unbounded_channel();
        let search = run(cancel.clone(), tx);
        let task = tokio::spawn(async move {
            let _in_flight = in_flight;
            search.await
        });

        SearchResults {
            results,
            task,
            cancel,
        }
    }
}

impl Drop for SearchProvider {
    fn drop(&mut self) {
        self.dispose();
    }
}
