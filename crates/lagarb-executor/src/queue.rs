//! Bounded trade priority queue.
//!
//! Candidates are ordered by `(priority_score, created_at, seq)`, lowest
//! first. The score is computed once on admission. When full, a new
//! candidate is admitted only if it strictly beats the current worst entry,
//! which is then evicted.

use crate::scorer::PriorityScorer;
use chrono::{DateTime, Utc};
use lagarb_core::{MarketId, MarketSide, Price, Size, TokenId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Caller-supplied fields of a candidate, before scoring.
#[derive(Debug, Clone)]
pub struct CandidateDraft {
    pub market_id: MarketId,
    pub token_id: TokenId,
    pub side: MarketSide,
    /// Limit price for the order.
    pub price: Price,
    /// Notional in USD.
    pub amount: Size,
    /// 0-100.
    pub confidence: f64,
    pub edge: f64,
    pub hours_to_resolution: f64,
    pub volume_24h: f64,
    /// Originating trigger.
    pub source: String,
}

/// An admitted candidate. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCandidate {
    pub id: Uuid,
    pub priority_score: f64,
    pub market_id: MarketId,
    pub token_id: TokenId,
    pub side: MarketSide,
    pub price: Price,
    pub amount: Size,
    pub confidence: f64,
    pub edge: f64,
    pub hours_to_resolution: f64,
    pub volume_24h: f64,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidInput(String),
    /// Queue is full and the candidate does not beat the worst entry.
    BelowWorst,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::BelowWorst => "below_worst",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Admitted { id: Uuid, priority_score: f64 },
    AdmittedWithEviction {
        id: Uuid,
        priority_score: f64,
        evicted: TradeCandidate,
    },
    Rejected(RejectReason),
}

impl EnqueueOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted { .. } => "admitted",
            Self::AdmittedWithEviction { .. } => "admitted_with_eviction",
            Self::Rejected(_) => "rejected",
        }
    }

    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub admitted: u64,
    pub evicted: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Copy)]
struct ScoreKey(f64);

impl PartialEq for ScoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoreKey {}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    score: ScoreKey,
    created_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Default)]
struct QueueInner {
    entries: BTreeMap<QueueKey, TradeCandidate>,
    next_seq: u64,
    stats: QueueStats,
}

pub struct TradePriorityQueue {
    scorer: PriorityScorer,
    capacity: usize,
    inner: Mutex<QueueInner>,
}

impl TradePriorityQueue {
    /// `capacity` is clamped to at least 1.
    pub fn new(scorer: PriorityScorer, capacity: usize) -> Self {
        Self {
            scorer,
            capacity: capacity.max(1),
            inner: Mutex::new(QueueInner::default()),
        }
    }

    pub fn enqueue(&self, draft: CandidateDraft) -> EnqueueOutcome {
        self.enqueue_at(draft, Utc::now())
    }

    pub fn enqueue_at(&self, draft: CandidateDraft, now: DateTime<Utc>) -> EnqueueOutcome {
        let mut inner = self.inner.lock();

        let priority_score = match self.validate_and_score(&draft) {
            Ok(score) => score,
            Err(reason) => {
                inner.stats.rejected += 1;
                warn!(market_id = %draft.market_id, reason = ?reason, "Candidate rejected");
                return EnqueueOutcome::Rejected(reason);
            }
        };

        let key = QueueKey {
            score: ScoreKey(priority_score),
            created_at: now,
            seq: inner.next_seq,
        };

        let mut evicted = None;
        if inner.entries.len() >= self.capacity {
            let worst = inner.entries.keys().next_back().copied();
            match worst {
                Some(worst) if key < worst => {
                    evicted = inner.entries.remove(&worst);
                    inner.stats.evicted += 1;
                }
                _ => {
                    inner.stats.rejected += 1;
                    debug!(
                        market_id = %draft.market_id,
                        priority_score,
                        "Queue full, candidate below worst entry"
                    );
                    return EnqueueOutcome::Rejected(RejectReason::BelowWorst);
                }
            }
        }

        let id = Uuid::new_v4();
        let candidate = TradeCandidate {
            id,
            priority_score,
            market_id: draft.market_id,
            token_id: draft.token_id,
            side: draft.side,
            price: draft.price,
            amount: draft.amount,
            confidence: draft.confidence,
            edge: draft.edge,
            hours_to_resolution: draft.hours_to_resolution,
            volume_24h: draft.volume_24h,
            source: draft.source,
            created_at: now,
        };
        inner.next_seq += 1;
        inner.entries.insert(key, candidate);
        inner.stats.admitted += 1;

        match evicted {
            Some(evicted) => {
                debug!(evicted_id = %evicted.id, %id, "Evicted worst candidate");
                EnqueueOutcome::AdmittedWithEviction {
                    id,
                    priority_score,
                    evicted,
                }
            }
            None => EnqueueOutcome::Admitted { id, priority_score },
        }
    }

    /// Remove and return the best candidate.
    pub fn dequeue(&self) -> Option<TradeCandidate> {
        self.inner.lock().entries.pop_first().map(|(_, c)| c)
    }

    /// Remove up to `n` candidates, best first.
    pub fn dequeue_batch(&self, n: usize) -> Vec<TradeCandidate> {
        let mut inner = self.inner.lock();
        let mut batch = Vec::with_capacity(n.min(inner.entries.len()));
        while batch.len() < n {
            match inner.entries.pop_first() {
                Some((_, c)) => batch.push(c),
                None => break,
            }
        }
        batch
    }

    #[must_use]
    pub fn peek(&self) -> Option<TradeCandidate> {
        self.inner.lock().entries.values().next().cloned()
    }

    /// Remove everything, best first.
    pub fn drain(&self) -> Vec<TradeCandidate> {
        std::mem::take(&mut self.inner.lock().entries)
            .into_values()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats
    }

    fn validate_and_score(&self, draft: &CandidateDraft) -> Result<f64, RejectReason> {
        if !(0.0..=100.0).contains(&draft.confidence) {
            return Err(RejectReason::InvalidInput(format!(
                "confidence {} outside [0, 100]",
                draft.confidence
            )));
        }
        if !draft.amount.is_positive() {
            return Err(RejectReason::InvalidInput(format!(
                "amount {} must be positive",
                draft.amount
            )));
        }
        if !draft.price.is_probability() {
            return Err(RejectReason::InvalidInput(format!(
                "price {} outside (0, 1)",
                draft.price
            )));
        }
        self.scorer
            .score(
                draft.confidence,
                draft.edge,
                draft.hours_to_resolution,
                draft.volume_24h,
            )
            .ok_or_else(|| RejectReason::InvalidInput("non-finite scoring input".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn draft(market: &str, confidence: f64) -> CandidateDraft {
        CandidateDraft {
            market_id: MarketId::new(market),
            token_id: TokenId::new(format!("{market}-yes")),
            side: MarketSide::Yes,
            price: Price::new(dec!(0.45)),
            amount: Size::new(dec!(25)),
            confidence,
            edge: 0.05,
            hours_to_resolution: 48.0,
            volume_24h: 100_000.0,
            source: "oracle_lag".to_string(),
        }
    }

    fn queue(capacity: usize) -> TradePriorityQueue {
        TradePriorityQueue::new(PriorityScorer::default(), capacity)
    }

    #[test]
    fn test_dequeue_by_confidence() {
        let q = queue(10);
        q.enqueue(draft("a", 90.0));
        q.enqueue(draft("b", 70.0));
        q.enqueue(draft("c", 95.0));

        let order: Vec<f64> = q.dequeue_batch(3).iter().map(|c| c.confidence).collect();
        assert_eq!(order, vec![95.0, 90.0, 70.0]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_ties_are_fifo() {
        let q = queue(10);
        let t0 = Utc::now();
        q.enqueue_at(draft("first", 80.0), t0);
        q.enqueue_at(draft("second", 80.0), t0);
        q.enqueue_at(draft("earlier", 80.0), t0 - Duration::seconds(1));

        assert_eq!(q.dequeue().unwrap().market_id.as_str(), "earlier");
        assert_eq!(q.dequeue().unwrap().market_id.as_str(), "first");
        assert_eq!(q.dequeue().unwrap().market_id.as_str(), "second");
    }

    #[test]
    fn test_full_queue_evicts_worst() {
        let q = queue(2);
        q.enqueue(draft("a", 60.0));
        q.enqueue(draft("b", 80.0));

        match q.enqueue(draft("c", 90.0)) {
            EnqueueOutcome::AdmittedWithEviction { evicted, .. } => {
                assert_eq!(evicted.market_id.as_str(), "a");
            }
            other => panic!("expected eviction, got {other:?}"),
        }
        assert_eq!(q.len(), 2);
        assert_eq!(q.peek().unwrap().market_id.as_str(), "c");
    }

    #[test]
    fn test_full_queue_rejects_weaker_and_equal() {
        let q = queue(2);
        q.enqueue(draft("a", 60.0));
        q.enqueue(draft("b", 80.0));

        assert_eq!(
            q.enqueue(draft("weak", 50.0)),
            EnqueueOutcome::Rejected(RejectReason::BelowWorst)
        );
        assert_eq!(
            q.enqueue(draft("tie", 60.0)),
            EnqueueOutcome::Rejected(RejectReason::BelowWorst)
        );
        assert_eq!(q.len(), 2);
        assert_eq!(
            q.stats(),
            QueueStats {
                admitted: 2,
                evicted: 0,
                rejected: 2
            }
        );
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let q = queue(5);
        let mut bad = draft("nan", 80.0);
        bad.edge = f64::NAN;
        assert!(matches!(
            q.enqueue(bad),
            EnqueueOutcome::Rejected(RejectReason::InvalidInput(_))
        ));

        let mut bad = draft("conf", 120.0);
        assert!(!q.enqueue(bad.clone()).is_admitted());
        bad.confidence = 50.0;
        bad.amount = Size::new(dec!(0));
        assert!(!q.enqueue(bad).is_admitted());
        assert!(q.is_empty());
    }

    #[test]
    fn test_score_fixed_at_admission() {
        let q = queue(5);
        let outcome = q.enqueue(draft("a", 75.0));
        let EnqueueOutcome::Admitted { priority_score, .. } = outcome else {
            panic!("expected admission");
        };
        assert_eq!(q.peek().unwrap().priority_score, priority_score);
    }

    #[test]
    fn test_drain_best_first() {
        let q = queue(5);
        q.enqueue(draft("low", 55.0));
        q.enqueue(draft("high", 99.0));
        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].market_id.as_str(), "high");
        assert!(q.is_empty());
        assert!(q.dequeue().is_none());
    }
}
