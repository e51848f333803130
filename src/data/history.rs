use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::data::error::ExplorerError;
use crate::data::explorer::{ExplorerApi, TxListQuery};
use crate::data::types::{SortOrder, Transaction, TxHistoryRequest};

/// Explorer-imposed ceiling on rows per `txlist` call.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// The block range still to be read. Ascending reads move `start` up,
/// descending reads move `end` down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: u64,
    end: u64,
    sort: SortOrder,
}

impl Window {
    /// Narrow the window after a full page whose last row is in `last_block`.
    /// The new window overlaps that page by one block so rows sharing the
    /// boundary are read again rather than lost. Returns false once the window
    /// is empty.
    fn advance(&mut self, last_block: u64) -> bool {
        match self.sort {
            SortOrder::Asc => {
                let next = if last_block > self.start.saturating_add(1) {
                    last_block - 1
                } else if last_block > self.start {
                    last_block
                } else {
                    warn!(
                        block = self.start,
                        "A full page did not leave block {}; remaining rows in it are skipped.",
                        self.start
                    );
                    self.start.saturating_add(1)
                };
                if next > self.end || next == self.start {
                    return false;
                }
                self.start = next;
            }
            SortOrder::Desc => {
                let next = if last_block.saturating_add(1) < self.end {
                    last_block + 1
                } else if last_block < self.end {
                    last_block
                } else {
                    warn!(
                        block = self.end,
                        "A full page did not leave block {}; remaining rows in it are skipped.",
                        self.end
                    );
                    match self.end.checked_sub(1) {
                        Some(next) => next,
                        None => return false,
                    }
                };
                if next < self.start || next == self.end {
                    return false;
                }
                self.end = next;
            }
        }
        true
    }
}

/// Read an address's complete transaction list, page after page, until the
/// explorer returns a short page.
///
/// Pages are requested strictly one after another because each window
/// depends on the previous page's last row. Rows are de-duplicated by hash,
/// which absorbs the one-block overlap between consecutive windows. Any
/// failed or malformed page fails the whole fetch; no partial list is
/// returned.
pub async fn fetch_history(
    explorer: &dyn ExplorerApi,
    request: &TxHistoryRequest,
) -> Result<Vec<Transaction>, ExplorerError> {
    let end = match request.end_block {
        Some(end) => end,
        None => explorer.latest_block(request.chain_id).await?,
    };
    let mut window = Window {
        start: request.start_block,
        end,
        sort: request.sort,
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut history: Vec<Transaction> = Vec::new();
    let mut pages = 0u64;

    loop {
        let query = TxListQuery {
            address: request.address.clone(),
            chain_id: request.chain_id,
            start_block: window.start,
            end_block: window.end,
            page: request.page,
            offset: request.offset,
            sort: request.sort,
        };
        let page = explorer.transactions(&query).await?;
        pages += 1;

        let rows = page.len() as u64;
        let last_block = page.last().map(|tx| tx.block_number);
        let before = history.len();
        for tx in page {
            if seen.insert(tx.hash.clone()) {
                history.push(tx);
            }
        }
        debug!(
            page = pages,
            rows,
            new_rows = history.len() - before,
            start = window.start,
            end = window.end,
            "Fetched history page."
        );

        if rows < request.offset {
            break;
        }
        let Some(last_block) = last_block else {
            break;
        };
        if !window.advance(last_block) {
            break;
        }
    }

    info!(
        address = %request.address,
        chain_id = request.chain_id,
        pages,
        transactions = history.len(),
        failed = history.iter().filter(|tx| !tx.is_success()).count(),
        "Transaction history fetched."
    );
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::{FakeExplorer, HOLDER, txs};
    use std::sync::atomic::Ordering;

    fn request(offset: u64) -> TxHistoryRequest {
        let mut req = TxHistoryRequest::new(HOLDER, 1);
        req.offset = offset;
        req
    }

    fn hashes(list: &[Transaction]) -> Vec<String> {
        list.iter().map(|t| t.hash.clone()).collect()
    }

    #[tokio::test]
    async fn test_empty_address() {
        let explorer = FakeExplorer::with_txs(vec![]);
        let history = fetch_history(&explorer, &request(1000)).await.unwrap();
        assert!(history.is_empty());
        assert_eq!(explorer.page_requests(), 1);
    }

    #[tokio::test]
    async fn test_returns_every_transaction_for_many_page_sizes() {
        for per_block in [1usize, 2] {
            for total in [0usize, 1, 7, 25, 64] {
                for offset in [3u64, 4, 5, 10, 1000] {
                    let all = txs(total, per_block);
                    let explorer = FakeExplorer::with_txs(all.clone());
                    let history = fetch_history(&explorer, &request(offset)).await.unwrap();
                    assert_eq!(
                        hashes(&history),
                        hashes(&all),
                        "per_block={per_block} total={total} offset={offset}"
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_single_row_pages_with_distinct_blocks() {
        let all = txs(6, 1);
        let explorer = FakeExplorer::with_txs(all.clone());
        let history = fetch_history(&explorer, &request(1)).await.unwrap();
        assert_eq!(hashes(&history), hashes(&all));
    }

    #[tokio::test]
    async fn test_windows_overlap_by_one_block() {
        let explorer = FakeExplorer::with_txs(txs(10, 1));
        fetch_history(&explorer, &request(4)).await.unwrap();

        let queries = explorer.queries.lock().unwrap();
        // Blocks 1..=10; first page ends at block 4, so the next starts at 3.
        assert_eq!(queries[0].start_block, 0);
        assert_eq!(queries[1].start_block, 3);
        assert_eq!(queries[2].start_block, 5);
        assert!(queries.iter().all(|q| q.end_block == 20));
    }

    #[tokio::test]
    async fn test_end_block_resolved_from_chain_head() {
        let explorer = FakeExplorer::with_txs(txs(3, 1));
        fetch_history(&explorer, &request(1000)).await.unwrap();
        assert_eq!(explorer.head_lookups.load(Ordering::SeqCst), 1);

        let explorer = FakeExplorer::with_txs(txs(3, 1));
        let mut req = request(1000);
        req.end_block = Some(2);
        let history = fetch_history(&explorer, &req).await.unwrap();
        assert_eq!(explorer.head_lookups.load(Ordering::SeqCst), 0);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_past_end_block_with_short_first_page_terminates() {
        let explorer = FakeExplorer::with_txs(txs(50, 1));
        let mut req = request(100);
        req.start_block = 0;
        req.end_block = Some(5);
        let history = fetch_history(&explorer, &req).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(explorer.page_requests(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_fails_the_whole_fetch() {
        let mut explorer = FakeExplorer::with_txs(txs(30, 1));
        explorer.fail_on_page = Some(2);
        let result = fetch_history(&explorer, &request(10)).await;
        assert!(matches!(result, Err(ExplorerError::Api { .. })));
        assert_eq!(explorer.page_requests(), 2);
    }

    #[tokio::test]
    async fn test_descending_order() {
        let all = txs(23, 2);
        let explorer = FakeExplorer::with_txs(all.clone());
        let mut req = request(5);
        req.sort = SortOrder::Desc;
        let history = fetch_history(&explorer, &req).await.unwrap();

        let mut expected = hashes(&all);
        expected.reverse();
        let mut got = hashes(&history);
        // Rows inside one block come back in reverse insertion order either way.
        got.sort();
        expected.sort();
        assert_eq!(got, expected);
        assert!(history.windows(2).all(|w| w[0].block_number >= w[1].block_number));
    }

    #[tokio::test]
    async fn test_block_larger_than_page_skips_rest_of_block() {
        // Five rows in block 1, page size 2: the window cannot leave block 1.
        let all = txs(5, 5);
        let explorer = FakeExplorer::with_txs(all.clone());
        let history = fetch_history(&explorer, &request(2)).await.unwrap();

        assert_eq!(hashes(&history), hashes(&all[..2]));
        let starts: Vec<u64> = explorer
            .queries
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.start_block)
            .collect();
        assert_eq!(starts, vec![0, 1, 2]);
    }

    #[test]
    fn test_window_advance_ascending() {
        let mut w = Window { start: 0, end: 100, sort: SortOrder::Asc };
        assert!(w.advance(10));
        assert_eq!(w.start, 9);
        assert!(w.advance(10));
        assert_eq!(w.start, 10);
        assert!(w.advance(10));
        assert_eq!(w.start, 11);
        assert!(!w.advance(102));
    }

    #[test]
    fn test_window_advance_descending() {
        let mut w = Window { start: 0, end: 100, sort: SortOrder::Desc };
        assert!(w.advance(50));
        assert_eq!(w.end, 51);
        assert!(w.advance(50));
        assert_eq!(w.end, 50);
        assert!(w.advance(50));
        assert_eq!(w.end, 49);

        let mut bottom = Window { start: 0, end: 0, sort: SortOrder::Desc };
        assert!(!bottom.advance(0));
    }
}
