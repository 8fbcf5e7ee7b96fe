//! Demand descriptors
//!
//! A `Call` tells a block how much work its consumer still wants: rows to
//! skip, rows to produce, and whether rows past the hard limit must still be
//! counted ("full count"). Calls flow upstream; every executor derives the
//! call for its own upstream from the one it is serving.

use crate::error::{QueryError, Result};

/// Remaining demand for one pull
///
/// # Invariants
///
/// - `offset` only shrinks through `did_skip`, never through `did_produce`
/// - limits only shrink through `did_produce`
/// - with `hard_limit == Some(0)` and `full_count`, the call is in
///   full-count mode: nothing more may be produced, everything left is
///   skipped and counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Call {
    /// Rows still to skip before producing
    offset: usize,
    /// Prefetch hint; `None` = unlimited
    soft_limit: Option<usize>,
    /// Upper bound on rows produced; `None` = unlimited
    hard_limit: Option<usize>,
    /// Count rows past the hard limit instead of dropping them silently
    full_count: bool,
    /// Rows skipped so far while serving this call
    skip_count: usize,
}

impl Call {
    /// Skip amount meaning "everything that is left"
    pub const SKIP_TO_END: usize = usize::MAX;

    /// Produce everything, skip nothing
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Produce at most `limit` rows
    pub fn with_limit(limit: usize) -> Self {
        Self {
            hard_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Produce about `limit` rows; a hint, not a bound
    pub fn with_soft_limit(limit: usize) -> Self {
        Self {
            soft_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Skip and count everything that is left, produce nothing
    pub fn skip_to_end() -> Self {
        Self {
            hard_limit: Some(0),
            full_count: true,
            ..Self::default()
        }
    }

    /// Set rows to skip first
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Set the hard limit
    pub fn with_hard_limit(mut self, limit: usize) -> Self {
        self.hard_limit = Some(limit);
        self
    }

    /// Set the soft limit
    pub fn with_soft_limit_hint(mut self, limit: usize) -> Self {
        self.soft_limit = Some(limit);
        self
    }

    /// Request full count
    pub fn with_full_count(mut self, full_count: bool) -> Self {
        self.full_count = full_count;
        self
    }

    /// Rows still to skip
    pub fn get_offset(&self) -> usize {
        self.offset
    }

    pub fn soft_limit(&self) -> Option<usize> {
        self.soft_limit
    }

    pub fn hard_limit(&self) -> Option<usize> {
        self.hard_limit
    }

    pub fn needs_full_count(&self) -> bool {
        self.full_count
    }

    /// Rows skipped so far while serving this call
    pub fn skip_count(&self) -> usize {
        self.skip_count
    }

    /// Remaining producible rows: `min(soft, hard)`, `usize::MAX` when unlimited
    pub fn get_limit(&self) -> usize {
        match (self.soft_limit, self.hard_limit) {
            (Some(soft), Some(hard)) => soft.min(hard),
            (Some(limit), None) | (None, Some(limit)) => limit,
            (None, None) => usize::MAX,
        }
    }

    /// Whether any limit is set
    pub fn has_limit(&self) -> bool {
        self.soft_limit.is_some() || self.hard_limit.is_some()
    }

    /// Hard limit reached but rows past it must still be counted
    pub fn is_full_count_mode(&self) -> bool {
        self.full_count && self.hard_limit == Some(0)
    }

    /// Offset still positive
    pub fn need_skip_more(&self) -> bool {
        self.offset > 0
    }

    /// Work must go into skipping before (or instead of) producing
    pub fn should_skip(&self) -> bool {
        self.need_skip_more() || self.is_full_count_mode()
    }

    /// Rows the executor should try to skip now
    ///
    /// The offset while one is left; `SKIP_TO_END` in full-count mode; else 0.
    pub fn skip_amount(&self) -> usize {
        if self.offset > 0 {
            self.offset
        } else if self.is_full_count_mode() {
            Self::SKIP_TO_END
        } else {
            0
        }
    }

    /// Nothing left to skip, limit exhausted, no counting pending
    pub fn is_satisfied(&self) -> bool {
        self.offset == 0 && self.get_limit() == 0 && !self.is_full_count_mode()
    }

    /// Record `n` skipped rows
    ///
    /// Fails if `n` exceeds the offset, unless the call is in full-count mode.
    pub fn did_skip(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if n > self.offset && !self.is_full_count_mode() {
            return Err(QueryError::internal(format!(
                "skipped {} rows with only {} left to skip",
                n, self.offset
            )));
        }
        self.offset = self.offset.saturating_sub(n);
        self.skip_count = self.skip_count.saturating_add(n);
        Ok(())
    }

    /// Record `n` produced rows
    pub fn did_produce(&mut self, n: usize) -> Result<()> {
        if let Some(hard) = self.hard_limit {
            if n > hard {
                return Err(QueryError::internal(format!(
                    "produced {} rows with a remaining hard limit of {}",
                    n, hard
                )));
            }
            self.hard_limit = Some(hard - n);
        }
        if let Some(soft) = self.soft_limit {
            self.soft_limit = Some(soft.saturating_sub(n));
        }
        Ok(())
    }

    /// Forget rows skipped so far (used when a call is re-issued)
    pub fn reset_skip_count(&mut self) {
        self.skip_count = 0;
    }
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_limit = |l: Option<usize>| l.map(|v| v.to_string()).unwrap_or_else(|| "inf".into());
        write!(
            f,
            "{{skip: {}, soft: {}, hard: {}, fullCount: {}}}",
            self.offset,
            fmt_limit(self.soft_limit),
            fmt_limit(self.hard_limit),
            self.full_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_skip_decrements_offset_only() {
        let mut call = Call::with_limit(5).with_offset(3);
        call.did_skip(2).unwrap();
        assert_eq!(call.get_offset(), 1);
        assert_eq!(call.get_limit(), 5);
        assert_eq!(call.skip_count(), 2);
        assert!(call.need_skip_more());
    }

    #[test]
    fn test_did_skip_past_offset_is_logic_error() {
        let mut call = Call::with_limit(5).with_offset(1);
        let err = call.did_skip(2).unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
        assert_eq!(call.get_offset(), 1);
    }

    #[test]
    fn test_did_produce_decrements_limits() {
        let mut call = Call::with_limit(5).with_soft_limit_hint(3).with_offset(2);
        call.did_produce(2).unwrap();
        assert_eq!(call.hard_limit(), Some(3));
        assert_eq!(call.soft_limit(), Some(1));
        assert_eq!(call.get_limit(), 1);
        assert_eq!(call.get_offset(), 2);
    }

    #[test]
    fn test_did_produce_past_hard_limit_is_logic_error() {
        let mut call = Call::with_limit(1);
        assert!(call.did_produce(2).is_err());
    }

    #[test]
    fn test_unlimited_limit() {
        let call = Call::unlimited();
        assert_eq!(call.get_limit(), usize::MAX);
        assert!(!call.has_limit());
        assert!(!call.should_skip());
        assert!(!call.is_satisfied());
    }

    #[test]
    fn test_full_count_mode_after_limit_exhausted() {
        let mut call = Call::with_limit(2).with_full_count(true);
        assert!(!call.should_skip());
        call.did_produce(2).unwrap();

        assert_eq!(call.get_limit(), 0);
        assert!(call.is_full_count_mode());
        assert!(call.should_skip());
        assert!(!call.is_satisfied());
        assert_eq!(call.skip_amount(), Call::SKIP_TO_END);

        // Any amount may be counted in full-count mode
        call.did_skip(1000).unwrap();
        assert_eq!(call.skip_count(), 1000);
    }

    #[test]
    fn test_satisfied_without_full_count() {
        let mut call = Call::with_limit(1).with_offset(1);
        assert!(!call.is_satisfied());
        call.did_skip(1).unwrap();
        call.did_produce(1).unwrap();
        assert!(call.is_satisfied());
        assert!(!call.should_skip());
        assert_eq!(call.skip_amount(), 0);
    }

    #[test]
    fn test_skip_to_end() {
        let call = Call::skip_to_end();
        assert!(call.should_skip());
        assert_eq!(call.get_limit(), 0);
        assert_eq!(call.skip_amount(), Call::SKIP_TO_END);
    }

    #[test]
    fn test_display() {
        let call = Call::with_limit(3).with_offset(1);
        assert_eq!(call.to_string(), "{skip: 1, soft: inf, hard: 3, fullCount: false}");
    }
}
