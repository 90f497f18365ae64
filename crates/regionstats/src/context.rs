// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Request-scoped bookkeeping
//!
//! Counters live here rather than in module state so that concurrent
//! requests never share them.

use crate::error::BackendError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct ExtractContext {
    request_id: String,
    remote_calls: AtomicUsize,
    unmapped_records: AtomicUsize,
}

/// Snapshot of an [`ExtractContext`]'s counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextStats {
    pub remote_calls: usize,
    pub unmapped_records: usize,
}

impl Default for ExtractContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: uuid7::uuid7().to_string(),
            remote_calls: AtomicUsize::new(0),
            unmapped_records: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Await one remote evaluation, counting it
    pub async fn remote<T, F>(&self, evaluation: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let _ = self.remote_calls.fetch_add(1, Ordering::Relaxed);
        evaluation.await
    }

    pub fn note_unmapped(&self, count: usize) {
        let _ = self.unmapped_records.fetch_add(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn stats(&self) -> ContextStats {
        ContextStats {
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            unmapped_records: self.unmapped_records.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remote_calls_counted_even_on_failure() {
        let ctx = ExtractContext::new();
        let ok: Result<usize, BackendError> = ctx.remote(async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));
        let err: Result<usize, BackendError> = ctx
            .remote(async { Err(BackendError::Transport("reset".to_string())) })
            .await;
        assert!(err.is_err());
        ctx.note_unmapped(2);
        assert_eq!(
            ctx.stats(),
            ContextStats {
                remote_calls: 2,
                unmapped_records: 2
            }
        );
    }

    #[test]
    fn test_request_ids_are_distinct() {
        assert_ne!(
            ExtractContext::new().request_id(),
            ExtractContext::new().request_id()
        );
    }
}
