//! Concurrent block transfer for block-backed nodes.
//!
//! A pool dispatches work onto spawned tasks while it has free permits and
//! runs it inline on the caller otherwise, so a saturated pool degrades to
//! serial transfer instead of queueing without bound.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::ReplicaContext;
use crate::error::{ReplError, ReplResult};
use crate::model::{BlockNode, NodeInfo};
use crate::push::BlobPusher;
use crate::request::{BlobPushRequest, BlockNodeCreateRequest, BlockNodeFinishRequest, PushMode};

/// Bounded worker pool for block pushes.
#[derive(Debug)]
pub struct BlockTransferPool {
    name: &'static str,
    concurrency: usize,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl BlockTransferPool {
    /// Create a pool running at most `concurrency` spawned jobs.
    pub fn new(name: &'static str, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            name,
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency)),
            closed: AtomicBool::new(false),
        }
    }

    /// Pool name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Configured concurrency.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Permits not held by running jobs.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop spawning; later dispatches run inline, running jobs finish.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(pool = self.name, "block transfer pool shut down");
        }
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Run every job and collect results in job order.
    pub async fn run_all<T, F>(&self, jobs: Vec<F>) -> Vec<ReplResult<T>>
    where
        T: Send + 'static,
        F: Future<Output = ReplResult<T>> + Send + 'static,
    {
        let mut results: Vec<Option<ReplResult<T>>> = Vec::with_capacity(jobs.len());
        results.resize_with(jobs.len(), || None);
        let mut set = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let permit = if self.is_shutdown() {
                None
            } else {
                Arc::clone(&self.permits).try_acquire_owned().ok()
            };
            match permit {
                Some(permit) => {
                    set.spawn(async move {
                        let _permit = permit;
                        (index, job.await)
                    });
                }
                None => {
                    debug!(pool = self.name, index, "pool saturated, running inline");
                    results[index] = Some(job.await);
                }
            }
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!(pool = self.name, error = %e, "block job aborted"),
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(ReplError::remote("block job aborted"))))
            .collect()
    }
}

/// Pools owned by a driver, one per topology family.
#[derive(Debug, Clone)]
pub struct TransferPools {
    /// Pool for peer clusters.
    pub cluster: Arc<BlockTransferPool>,
    /// Pool for federation.
    pub federation: Arc<BlockTransferPool>,
}

impl TransferPools {
    /// Create both pools.
    pub fn new(cluster_concurrency: usize, federation_concurrency: usize) -> Self {
        Self {
            cluster: Arc::new(BlockTransferPool::new("cluster", cluster_concurrency)),
            federation: Arc::new(BlockTransferPool::new("federation", federation_concurrency)),
        }
    }

    /// Shut down both pools.
    pub fn shutdown(&self) {
        self.cluster.shutdown();
        self.federation.shutdown();
    }
}

/// Check that half-open `ranges` tile `[0, size)` exactly.
///
/// `ranges` must be sorted by start position.
pub fn verify_block_coverage(size: u64, ranges: &[(u64, u64)]) -> Result<(), String> {
    let mut expected = 0u64;
    for &(start, end) in ranges {
        if end <= start {
            return Err(format!("empty or inverted block [{}, {})", start, end));
        }
        if start > expected {
            return Err(format!("gap [{}, {})", expected, start));
        }
        if start < expected {
            return Err(format!("overlap at {}", start));
        }
        expected = end;
    }
    if expected != size {
        return Err(format!("blocks cover {} of {} bytes", expected, size));
    }
    Ok(())
}

/// Live blocks of `node` sorted by position, after verifying their layout.
pub fn ordered_blocks(node: &NodeInfo, blocks: Vec<BlockNode>) -> ReplResult<Vec<BlockNode>> {
    let mut blocks: Vec<BlockNode> = blocks.into_iter().filter(|b| b.deleted.is_none()).collect();
    blocks.sort_by_key(|b| b.start_pos);
    let ranges: Vec<(u64, u64)> = blocks.iter().map(|b| (b.start_pos, b.end_pos)).collect();
    verify_block_coverage(node.size, &ranges).map_err(|reason| ReplError::BlockLayout {
        full_path: node.full_path.clone(),
        reason,
    })?;
    Ok(blocks)
}

/// Outcome of pushing the blocks of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTransferReport {
    /// Upload session id, empty when nothing was sent.
    pub upload_id: String,
    /// Number of blocks attempted.
    pub total: usize,
    /// Ids of blocks that failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Whether the session was sealed.
    pub finished: bool,
}

impl BlockTransferReport {
    /// Every block landed and the session was sealed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && (self.finished || self.total == 0)
    }
}

/// Upload session id for `node`.
pub fn new_upload_id(node: &NodeInfo) -> String {
    format!("{}/{}", Uuid::new_v4().simple(), node.id)
}

/// Pushes the blocks of a block-backed node through the context's pool.
pub struct BlockFileTransfer<'a> {
    ctx: &'a ReplicaContext,
    pusher: BlobPusher,
    source: Option<String>,
}

impl<'a> BlockFileTransfer<'a> {
    /// Transfer using `pusher` for the block blobs; `source` tags each block request.
    pub fn new(ctx: &'a ReplicaContext, pusher: BlobPusher, source: Option<String>) -> Self {
        Self { ctx, pusher, source }
    }

    /// Push every block and seal the session once all of them landed.
    ///
    /// Any failed block leaves the session unsealed and the node failed.
    pub async fn transfer(&self, node: &NodeInfo) -> ReplResult<BlockTransferReport> {
        let Some((project_id, repo_name)) = self.ctx.remote_coordinates() else {
            return Ok(BlockTransferReport::default());
        };
        let blocks = self.ctx.local.list_blocks(node).await?;
        if blocks.iter().all(|b| b.deleted.is_some()) {
            debug!(path = %node.full_path, "block node has no blocks");
            return Ok(BlockTransferReport::default());
        }
        let blocks = ordered_blocks(node, blocks)?;
        let upload_id = new_upload_id(node);
        let total = blocks.len();

        let jobs: Vec<_> = blocks
            .iter()
            .map(|block| {
                let client = Arc::clone(&self.ctx.client);
                let pusher = self.pusher.clone();
                let repo_type = self.ctx.remote_repo_type;
                let storage_key = self.ctx.remote_storage_key().map(str::to_string);
                let push = BlobPushRequest {
                    name: node.full_path.clone(),
                    sha256: block.sha256.clone(),
                    size: block.size(),
                    md5: None,
                    local_project_id: self.ctx.local_project_id.clone(),
                    local_repo_name: self.ctx.local_repo_name.clone(),
                    storage_key: storage_key.clone(),
                };
                let create = BlockNodeCreateRequest {
                    project_id: project_id.to_string(),
                    repo_name: repo_name.to_string(),
                    full_path: node.full_path.clone(),
                    start_pos: block.start_pos,
                    end_pos: block.end_pos,
                    size: block.size(),
                    sha256: block.sha256.clone(),
                    crc64ecma: block.crc64ecma.clone(),
                    upload_id: upload_id.clone(),
                    created_by: block.created_by.clone(),
                    created_date: block.created_date,
                    expire_date: block.expire_date,
                    deleted: block.deleted,
                    source: self.source.clone(),
                };
                async move {
                    let present = client
                        .check(&push.sha256, storage_key.as_deref(), repo_type)
                        .await
                        .unwrap_or(false);
                    if !present {
                        pusher.push(client.as_ref(), &push).await?;
                    }
                    client.create_block_node(&create).await
                }
            })
            .collect();

        let mut jobs = jobs.into_iter();
        let mut results = Vec::with_capacity(total);
        if self.pusher.mode() == PushMode::Chunked {
            // The first block settles the push mode for the rest of the node.
            if let Some(first) = jobs.next() {
                results.push(first.await);
            }
        }
        results.extend(self.ctx.pool.run_all(jobs.collect()).await);
        let failed: Vec<(String, String)> = blocks
            .iter()
            .zip(results)
            .filter_map(|(block, result)| result.err().map(|e| (block.id.clone(), e.to_string())))
            .collect();

        let mut report = BlockTransferReport {
            upload_id: upload_id.clone(),
            total,
            failed,
            finished: false,
        };
        if !report.failed.is_empty() {
            warn!(
                path = %node.full_path,
                failed = report.failed.len(),
                total,
                "block transfer incomplete, session left open"
            );
            return Ok(report);
        }

        self.ctx
            .client
            .finish_block_node(&BlockNodeFinishRequest {
                project_id: project_id.to_string(),
                repo_name: repo_name.to_string(),
                upload_id,
                full_path: node.full_path.clone(),
            })
            .await?;
        report.finished = true;
        info!(path = %node.full_path, blocks = total, "block node replicated");
        Ok(report)
    }

    /// [`transfer`](Self::transfer), failing with `BlockTransfer` when blocks are missing.
    pub async fn transfer_all(&self, node: &NodeInfo) -> ReplResult<BlockTransferReport> {
        let report = self.transfer(node).await?;
        if !report.failed.is_empty() {
            return Err(ReplError::BlockTransfer {
                full_path: node.full_path.clone(),
                failed: report.failed.len(),
                total: report.total,
            });
        }
        Ok(report)
    }
}
