//! Replication pipeline stages.
//!
//! - [`infer`]: row type inference and cell scanning
//! - [`extract`]: batching extraction from the source
//! - [`copy`]: COPY text encoding of batches
//! - [`stage`]: per-batch staging tables
//! - [`merge`]: staging → destination upsert
//! - [`ddl`]: destination "ensure schema"

pub mod copy;
pub mod ddl;
pub mod extract;
pub mod infer;
pub mod merge;
pub mod stage;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};

pub use extract::{ExtractStrategy, ExtractSummary, Extractor};
pub use infer::{infer_scan_targets, ScanTarget, ScanType};
pub use stage::StagingTable;

/// Race a store operation against the run's cancellation token.
pub async fn with_cancel<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_with_cancel_passes_result_through() {
        let cancel = CancellationToken::new();
        let value = with_cancel(&cancel, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_with_cancel_interrupts_pending_operation() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let res: Result<()> = with_cancel(&cancel, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(SyncError::Cancelled)));
    }
}
