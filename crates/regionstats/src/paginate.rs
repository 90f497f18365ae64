// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Chunked retrieval under the backend's per-call record cap

use crate::backend::{Page, RasterBackend, RawRecord, RegionReduction};
use crate::context::ExtractContext;
use crate::error::{ExtractError, Result};
use diagnostics::*;
use futures::future::try_join_all;

/// Pages covering `total` records: a single page when they fit in one call,
/// otherwise `ceil(total / limit)` pages at offsets `i * limit`.
#[must_use]
pub fn page_plan(total: usize, limit: usize) -> Vec<Page> {
    if total <= limit {
        return vec![Page { offset: 0, limit }];
    }
    (0..total.div_ceil(limit))
        .map(|i| Page {
            offset: i * limit,
            limit,
        })
        .collect()
}

/// Evaluate a region reduction completely.
///
/// Pages are fetched concurrently and concatenated in offset order. The
/// first failing page fails the whole retrieval; pages still in flight are
/// dropped.
pub async fn fetch_all<B: RasterBackend + ?Sized>(
    backend: &B,
    ctx: &ExtractContext,
    reduction: &RegionReduction,
    limit: usize,
) -> Result<Vec<RawRecord>> {
    let total = ctx.remote(backend.record_count(reduction)).await?;
    let pages = page_plan(total, limit);
    let chunks = pages.len();
    debug!(
        "Fetching {total} records in {chunks} chunks of {limit}",
        total: total,
        chunks: chunks,
        limit: limit
    );

    if chunks == 1 {
        return Ok(ctx.remote(backend.fetch_records(reduction, pages[0])).await?);
    }

    let fetches = pages.into_iter().map(|page| async move {
        ctx.remote(backend.fetch_records(reduction, page))
            .await
            .map_err(|source| {
                let offset = page.offset;
                let reason = source.to_string();
                error!(
                    "Chunk at offset {offset} failed: {reason}",
                    offset: offset,
                    reason: reason
                );
                ExtractError::PartialPage {
                    offset: page.offset,
                    limit: page.limit,
                    source,
                }
            })
    });
    let pages = try_join_all(fetches).await?;
    Ok(pages.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(pages: &[Page]) -> Vec<usize> {
        pages.iter().map(|p| p.offset).collect()
    }

    #[test]
    fn test_single_page_when_total_fits() {
        assert_eq!(page_plan(0, 5000), vec![Page { offset: 0, limit: 5000 }]);
        assert_eq!(page_plan(5000, 5000).len(), 1);
    }

    #[test]
    fn test_chunk_offsets() {
        let pages = page_plan(12000, 5000);
        assert_eq!(offsets(&pages), vec![0, 5000, 10000]);
        assert!(pages.iter().all(|p| p.limit == 5000));
        assert_eq!(page_plan(5001, 5000).len(), 2);
        assert_eq!(page_plan(10000, 5000).len(), 2);
    }

    #[test]
    fn test_pages_cover_every_record_once() {
        for total in [1usize, 7, 99, 100, 101, 1234] {
            let pages = page_plan(total, 100);
            let covered: usize = pages
                .iter()
                .map(|p| p.limit.min(total.saturating_sub(p.offset)))
                .sum();
            assert_eq!(covered, total, "total {total}");
        }
    }
}
