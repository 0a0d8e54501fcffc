//! DOM Mutation Watcher
//!
//! Turns raw mutation batches into incremental passes. Only structural
//! (`ChildList`) records are looked at; attribute and character-data records are
//! ignored. Batches are queued on a bounded channel and drained by a single task,
//! which folds everything already waiting into one pass so a burst of host
//! updates never triggers overlapping re-indexing runs.

use crate::dom::{MutationKind, MutationRecord, NodeId, Page, Selector};
use crate::error::WatchError;
use crate::graph::{is_owned_ui, BACKLINK_CLASS};
use crate::site::SiteSchema;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a batch of mutations introduced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub new_posts: Vec<NodeId>,
    pub new_quotes: Vec<NodeId>,
    pub new_backlinks: Vec<NodeId>,
    /// Topmost added elements; re-indexing starts here.
    pub roots: Vec<NodeId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Whether anything in the batch concerns posts or links.
    pub fn is_relevant(&self) -> bool {
        !(self.new_posts.is_empty() && self.new_quotes.is_empty() && self.new_backlinks.is_empty())
    }
}

/// Classify `records` against the page as it is now.
///
/// Added text nodes, nodes that have since been detached, nodes inside owned UI
/// and nodes nested under another added root are dropped. Work is proportional
/// to the size of the added subtrees, not the page.
pub fn classify(page: &Page, schema: &dyn SiteSchema, records: &[MutationRecord]) -> ChangeSet {
    let mut candidates: Vec<NodeId> = Vec::new();
    let mut seen: HashSet<NodeId> = HashSet::new();
    for record in records {
        if record.kind != MutationKind::ChildList {
            continue;
        }
        for &node in &record.added {
            if page.is_element(node) && seen.insert(node) {
                candidates.push(node);
            }
        }
    }

    let mut changes = ChangeSet::default();
    if candidates.is_empty() {
        return changes;
    }

    changes.roots = candidates
        .iter()
        .copied()
        .filter(|&n| page.is_attached(n) && !is_owned_ui(page, n))
        .filter(|&n| !has_added_ancestor(page, n, &seen))
        .collect();

    let post_selector = selector_or_warn(schema.post_selector(page));
    let quote_selector = selector_or_warn(schema.quote_link_selector(page));
    let backlink_selector = selector_or_warn(&format!(".{}", BACKLINK_CLASS));

    for &root in &changes.roots {
        collect(page, root, post_selector.as_ref(), &mut changes.new_posts);
        collect(page, root, quote_selector.as_ref(), &mut changes.new_quotes);
        collect(page, root, backlink_selector.as_ref(), &mut changes.new_backlinks);
    }
    changes
}

fn has_added_ancestor(page: &Page, node: NodeId, added: &HashSet<NodeId>) -> bool {
    let mut cur = page.parent(node);
    while let Some(n) = cur {
        if added.contains(&n) {
            return true;
        }
        cur = page.parent(n);
    }
    false
}

fn selector_or_warn(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(error = %e, "Selector rejected during classification");
            None
        }
    }
}

fn collect(page: &Page, root: NodeId, selector: Option<&Selector>, out: &mut Vec<NodeId>) {
    let Some(selector) = selector else {
        return;
    };
    if page.matches(root, selector) {
        out.push(root);
    }
    out.extend(
        page.select(root, selector)
            .into_iter()
            .filter(|&n| !is_owned_ui(page, n)),
    );
}

/// Receiver of coalesced mutation batches.
#[async_trait]
pub trait MutationSink: Send + Sync {
    /// Run one incremental pass over `records`.
    async fn process(&self, records: Vec<MutationRecord>);
}

/// Watcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatcherStats {
    pub batches_received: u64,
    pub records_received: u64,
    /// Passes handed to the sink
    pub passes: u64,
    /// Coalesced batches with no structural change
    pub skipped: u64,
}

/// Bounded queue feeding a single-flight processing task.
pub struct MutationWatcher {
    sender: mpsc::Sender<Vec<MutationRecord>>,
    handle: JoinHandle<()>,
    stats: Arc<RwLock<WatcherStats>>,
    capacity: usize,
}

impl MutationWatcher {
    /// Start the drain task on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn MutationSink>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let stats = Arc::new(RwLock::new(WatcherStats::default()));
        let handle = tokio::spawn(Self::drain_loop(receiver, sink, Arc::clone(&stats)));
        info!(capacity, "Started mutation watcher");
        Self {
            sender,
            handle,
            stats,
            capacity,
        }
    }

    /// Queue a batch, waiting while the queue is full.
    pub async fn observe(&self, batch: Vec<MutationRecord>) -> Result<(), WatchError> {
        self.sender
            .send(batch)
            .await
            .map_err(|_| WatchError::Closed)
    }

    /// Queue a batch without waiting.
    pub fn try_observe(&self, batch: Vec<MutationRecord>) -> Result<(), WatchError> {
        self.sender.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WatchError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => WatchError::Closed,
        })
    }

    pub fn stats(&self) -> WatcherStats {
        self.stats.read().clone()
    }

    /// Process everything already queued, then stop.
    pub async fn shutdown(self) -> WatcherStats {
        let Self {
            sender,
            handle,
            stats,
            ..
        } = self;
        drop(sender);
        if let Err(e) = handle.await {
            warn!(error = %e, "Mutation watcher task ended abnormally");
        }
        let stats = stats.read().clone();
        info!(passes = stats.passes, skipped = stats.skipped, "Stopped mutation watcher");
        stats
    }

    async fn drain_loop(
        mut receiver: mpsc::Receiver<Vec<MutationRecord>>,
        sink: Arc<dyn MutationSink>,
        stats: Arc<RwLock<WatcherStats>>,
    ) {
        while let Some(first) = receiver.recv().await {
            let mut records = first;
            let mut batches = 1u64;
            while let Ok(more) = receiver.try_recv() {
                records.extend(more);
                batches += 1;
            }

            let structural = records
                .iter()
                .any(|r| r.kind == MutationKind::ChildList && !r.added.is_empty());
            {
                let mut s = stats.write();
                s.batches_received += batches;
                s.records_received += records.len() as u64;
                if !structural {
                    s.skipped += 1;
                }
            }
            if !structural {
                debug!(batches, "No structural mutations, pass skipped");
                continue;
            }

            debug!(batches, records = records.len(), "Processing coalesced mutations");
            sink.process(records).await;
            stats.write().passes += 1;
        }
    }
}
