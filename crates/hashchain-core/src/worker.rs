//! Off-thread mining for interactive callers.
//!
//! [`SharedChain`] owns one [`Chain`] behind a tokio `RwLock`. Appends hold
//! the write lock for the whole search, so at most one append is in flight
//! and readers wait for it; readers share the read lock with each other.
//! All methods must be called from inside a tokio runtime.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::block::{Block, BlockData};
use crate::chain::{Chain, SearchHit, ValidationReport};
use crate::error::{ChainError, Result};
use crate::mine::CancelToken;

#[derive(Clone, Debug)]
pub struct SharedChain {
    inner: Arc<RwLock<Chain>>,
}

/// An append running on a worker. Resolves to the appended block, or to
/// `ChainError::Cancelled` after [`PendingAppend::cancel`]. Dropping it
/// does not stop the search.
#[derive(Debug)]
pub struct PendingAppend {
    cancel: CancelToken,
    handle: JoinHandle<Result<Block>>,
}

impl PendingAppend {
    /// Abandons the search. The chain keeps its pre-append state unless the
    /// block was already appended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for PendingAppend {
    type Output = Result<Block>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(join_err)) => {
                Poll::Ready(Err(ChainError::WorkerFailed(join_err.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl SharedChain {
    pub fn new(chain: Chain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(chain)),
        }
    }

    /// Starts mining a block for `data` on a blocking worker.
    pub fn append(&self, data: impl Into<BlockData>) -> PendingAppend {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let data = data.into();
        let chain = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut guard = chain.write_owned().await;
            token_check(&token)?;
            let worker = tokio::task::spawn_blocking(move || {
                guard.append_cancellable(data, &token).cloned()
            });
            worker
                .await
                .map_err(|e| ChainError::WorkerFailed(e.to_string()))?
        });
        PendingAppend { cancel, handle }
    }

    /// Appends, cancelling the search if it outlives `limit`.
    pub async fn append_with_timeout(
        &self,
        data: impl Into<BlockData>,
        limit: Duration,
    ) -> Result<Block> {
        let mut pending = self.append(data);
        match tokio::time::timeout(limit, &mut pending).await {
            Ok(res) => res,
            Err(_) => {
                pending.cancel();
                match pending.await {
                    // Finished between the deadline and the cancel.
                    Ok(block) => Ok(block),
                    Err(ChainError::Cancelled) => {
                        debug!(?limit, "append timed out");
                        Err(ChainError::MiningTimeout(limit))
                    }
                    Err(other) => Err(other),
                }
            }
        }
    }

    pub async fn blocks(&self) -> Vec<Block> {
        self.inner.read().await.blocks().to_vec()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn difficulty(&self) -> u32 {
        self.inner.read().await.difficulty()
    }

    pub async fn set_difficulty(&self, difficulty: u32) -> Result<()> {
        self.inner.write().await.set_difficulty(difficulty)
    }

    pub async fn validate(&self) -> ValidationReport {
        self.inner.read().await.validate()
    }

    pub async fn search(&self, keyword: &str) -> Vec<SearchHit> {
        self.inner.read().await.search(keyword)
    }

    pub async fn tamper(&self, index: usize) -> Result<()> {
        self.inner.write().await.tamper(index)
    }

    /// Exports on a blocking worker while holding the read lock.
    pub async fn export_to_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        let guard = Arc::clone(&self.inner).read_owned().await;
        let path = path.into();
        tokio::task::spawn_blocking(move || guard.export_to_path(path))
            .await
            .map_err(|e| ChainError::WorkerFailed(e.to_string()))?
    }

    /// Replaces the held chain, e.g. after an import. Waits for any
    /// in-flight append.
    pub async fn replace(&self, chain: Chain) {
        *self.inner.write().await = chain;
    }
}

fn token_check(token: &CancelToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(ChainError::Cancelled);
    }
    Ok(())
}
