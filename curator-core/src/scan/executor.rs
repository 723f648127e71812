//! Consumes rescan requests and runs the scanner for every library item
//! under the requested roots.

use curator_model::{FilterFilesType, LibraryItem, LibraryItemId, RescanRequest, ScanOutcome};
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::scanner::Scanner;
use crate::catalog::LibraryItemRepository;
use crate::error::Result;

/// Per-request tally.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RescanSummary {
    pub scanned: usize,
    pub skipped: usize,
    /// Items already being scanned; the running scan was asked for one
    /// more pass instead.
    pub coalesced: usize,
    pub failed: usize,
}

/// Items being scanned, each with the filter of a follow-up pass requested
/// while it ran.
type InFlight = DashMap<LibraryItemId, Option<FilterFilesType>>;

/// Wider of two filters: a full pass wins over a known-files pass.
fn merge_filters(queued: Option<FilterFilesType>, requested: FilterFilesType) -> FilterFilesType {
    match queued {
        Some(FilterFilesType::None) => FilterFilesType::None,
        _ => requested,
    }
}

/// Holds a claim on one item in the in-flight map; released on drop.
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    item_id: LibraryItemId,
    released: bool,
}

impl InFlightGuard {
    /// Claim `item_id`, or queue a follow-up pass with `filter` on the
    /// current owner and return `None`.
    fn claim(
        in_flight: &Arc<InFlight>,
        item_id: LibraryItemId,
        filter: FilterFilesType,
    ) -> Option<Self> {
        use dashmap::mapref::entry::Entry;
        match in_flight.entry(item_id) {
            Entry::Occupied(mut slot) => {
                let queued = *slot.get();
                slot.insert(Some(merge_filters(queued, filter)));
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(None);
                Some(Self {
                    in_flight: Arc::clone(in_flight),
                    item_id,
                    released: false,
                })
            }
        }
    }

    /// Release the claim unless a follow-up pass was queued; then return
    /// its filter and keep holding the claim.
    fn next_pass(&mut self) -> Option<FilterFilesType> {
        let released = self
            .in_flight
            .remove_if(&self.item_id, |_, queued| queued.is_none())
            .is_some();
        if released {
            self.released = true;
            return None;
        }
        self.in_flight
            .get_mut(&self.item_id)
            .and_then(|mut queued| queued.take())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.released {
            self.in_flight.remove(&self.item_id);
        }
    }
}

enum ItemScan {
    Done(ScanOutcome),
    Coalesced,
    Failed,
}

pub struct RescanExecutor {
    scanner: Arc<Scanner>,
    items: Arc<dyn LibraryItemRepository>,
    in_flight: Arc<InFlight>,
    max_parallel: usize,
}

impl fmt::Debug for RescanExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RescanExecutor")
            .field("in_flight", &self.in_flight.len())
            .field("max_parallel", &self.max_parallel)
            .finish()
    }
}

impl RescanExecutor {
    pub fn new(
        scanner: Arc<Scanner>,
        items: Arc<dyn LibraryItemRepository>,
        max_parallel: usize,
    ) -> Self {
        Self {
            scanner,
            items,
            in_flight: Arc::new(DashMap::new()),
            max_parallel: max_parallel.max(1),
        }
    }

    /// Whether a scan of `item_id` is currently running.
    pub fn is_scanning(&self, item_id: LibraryItemId) -> bool {
        self.in_flight.contains_key(&item_id)
    }

    /// Scan one item. Scans of the same item never overlap: when one is
    /// already running, it is asked to scan once more after it finishes and
    /// this call returns `None` straight away. Repeated requests during one
    /// scan fold into a single extra pass.
    pub async fn scan_item(
        &self,
        item: &LibraryItem,
        filter: FilterFilesType,
    ) -> Result<Option<ScanOutcome>> {
        let Some(mut guard) = InFlightGuard::claim(&self.in_flight, item.id, filter) else {
            debug!("Scan of {} already in progress, queued another pass", item);
            return Ok(None);
        };

        let mut filter = filter;
        loop {
            let result = self.scanner.scan(item, filter).await;
            let Some(next) = guard.next_pass() else {
                return result.map(Some);
            };
            if let Err(err) = &result {
                warn!(error = %err, "Scan of {} failed, running the queued pass anyway", item);
            }
            debug!("Rescanning {} for changes requested during the last scan", item);
            filter = next;
        }
    }

    pub async fn execute(&self, request: RescanRequest) -> Result<RescanSummary> {
        let filter = if request.force_full_rescan {
            FilterFilesType::None
        } else {
            request.filter
        };

        let mut items = Vec::new();
        for root in &request.roots {
            items.extend(self.items.items_under_root(root).await?);
        }
        items.sort_by(|a, b| a.path.cmp(&b.path));
        items.dedup_by_key(|item| item.id);

        info!(
            "Rescanning {} items under {} root folders",
            items.len(),
            request.roots.len()
        );

        let results: Vec<ItemScan> = stream::iter(items)
            .map(|item| async move {
                match self.scan_item(&item, filter).await {
                    Ok(Some(outcome)) => ItemScan::Done(outcome),
                    Ok(None) => ItemScan::Coalesced,
                    Err(err) => {
                        error!(error = %err, "Scan of {} failed", item);
                        ItemScan::Failed
                    }
                }
            })
            .buffer_unordered(self.max_parallel)
            .collect()
            .await;

        let mut summary = RescanSummary::default();
        for result in results {
            match result {
                ItemScan::Done(ScanOutcome::Scanned) => summary.scanned += 1,
                ItemScan::Done(ScanOutcome::Skipped(_)) => summary.skipped += 1,
                ItemScan::Coalesced => summary.coalesced += 1,
                ItemScan::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// Drain `requests` until the channel closes or `cancel` fires.
    pub fn spawn(
        self: Arc<Self>,
        mut requests: mpsc::Receiver<RescanRequest>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = cancel.cancelled() => break,
                    request = requests.recv() => match request {
                        Some(request) => request,
                        None => break,
                    },
                };

                match self.execute(request).await {
                    Ok(summary) => info!(
                        scanned = summary.scanned,
                        skipped = summary.skipped,
                        coalesced = summary.coalesced,
                        failed = summary.failed,
                        "Rescan finished"
                    ),
                    Err(err) => warn!(error = %err, "Rescan request failed"),
                }
            }
            debug!("Rescan executor stopped");
        })
    }
}
