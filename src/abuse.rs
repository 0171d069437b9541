//! Abuse detection & ban escalation.
//!
//! One sweep reads the request-history window, mines it for volume
//! anomalies per credential header and per network origin, carries recent
//! bans forward as the recidivism signal, and replaces the whole ban list
//! in a single write. Read-then-replace: a failed read aborts the run with
//! the ban list untouched, and stale bans are garbage-collected by the
//! rebuild itself.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::errors::AccessError;
use crate::models::ban::BanRecord;
use crate::store::Backend;

/// Sweep parameters.
///
/// `window` (T) is both the scheduler interval and the history read window;
/// `bucket_width` (W) is the sliding-window bucket; `threshold` (N) is the
/// per-bucket request count above which (strictly) an identity is a
/// violator; `ban_duration` (D) the base ban; `recidivism_factor` (M, >= 1)
/// scales both the escalated ban and the lookback that remembers expired
/// bans.
#[derive(Debug, Clone)]
pub struct AbuseParams {
    pub window: Duration,
    pub bucket_width: Duration,
    pub threshold: u64,
    pub ban_duration: Duration,
    pub recidivism_factor: i32,
}

impl Default for AbuseParams {
    fn default() -> Self {
        Self {
            window: Duration::seconds(300),
            bucket_width: Duration::seconds(60),
            threshold: 100,
            ban_duration: Duration::seconds(900),
            recidivism_factor: 3,
        }
    }
}

impl AbuseParams {
    /// Escalated ban duration, D*M.
    fn escalated(&self) -> Duration {
        self.ban_duration * self.recidivism_factor.max(1)
    }
}

/// What one sweep did; logged by the sweeper job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub header_violations: usize,
    pub origin_violations: usize,
    pub carried_forward: usize,
    pub escalated: usize,
    pub total_bans: usize,
}

pub struct AbuseEngine {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    params: AbuseParams,
}

impl AbuseEngine {
    pub fn new(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>, params: AbuseParams) -> Self {
        Self {
            backend,
            clock,
            params,
        }
    }

    /// One full read → compute → replace cycle.
    pub async fn sweep(&self) -> Result<SweepSummary, AccessError> {
        let now = self.clock.now();
        let entries = self
            .backend
            .request_history_since(now - self.params.window)
            .await?;
        let prior = self.backend.load_bans().await?;

        let fresh_until = now + self.params.ban_duration;

        // Step 1: header violations, only entries that presented a header.
        let header_offenders = offenders(
            entries
                .iter()
                .filter_map(|e| e.header.as_deref().map(|h| (h, e.created_at))),
            self.params.bucket_width,
            self.params.threshold,
        );
        let header_candidates: Vec<BanRecord> = header_offenders
            .iter()
            .map(|h| BanRecord::for_header(h, fresh_until))
            .collect();

        // Step 2: origin violations over all entries, header or not.
        let origin_offenders = offenders(
            entries.iter().map(|e| (e.ip.as_str(), e.created_at)),
            self.params.bucket_width,
            self.params.threshold,
        );
        let origin_candidates: Vec<BanRecord> = origin_offenders
            .iter()
            .map(|ip| BanRecord::for_ip(ip, fresh_until))
            .collect();

        // Step 3: carry forward every ban still inside the recidivism
        // lookback. Active bans always qualify (their until is at most
        // D*M ahead); recently-expired ones are the recidivism memory.
        let lookback_floor = now - self.params.escalated();
        let carried = dedupe_by_identity(
            prior
                .into_iter()
                .filter(|ban| ban.until >= lookback_floor),
        );

        // Step 4: union and reconcile per identity. A single source keeps
        // its until; multiple sources mean recidivism and escalate.
        let mut grouped: HashMap<(Option<String>, Option<String>), Vec<DateTime<Utc>>> =
            HashMap::new();
        let sources = [&header_candidates, &origin_candidates, &carried];
        for ban in sources.into_iter().flatten() {
            grouped
                .entry((ban.ip.clone(), ban.header.clone()))
                .or_default()
                .push(ban.until);
        }

        let mut escalated = 0;
        let mut next: Vec<BanRecord> = grouped
            .into_iter()
            .map(|((ip, header), untils)| {
                let until = if untils.len() == 1 {
                    untils[0]
                } else {
                    escalated += 1;
                    let max_until = untils.iter().copied().max().unwrap_or(fresh_until);
                    (now + self.params.escalated()).max(max_until)
                };
                BanRecord { header, ip, until }
            })
            .collect();
        next.sort_by(|a, b| (&a.ip, &a.header).cmp(&(&b.ip, &b.header)));

        // Step 5: replace wholesale. Identities that aged out of step 3
        // with no fresh violation are gone.
        self.backend.replace_bans(&next).await?;

        let summary = SweepSummary {
            header_violations: header_candidates.len(),
            origin_violations: origin_candidates.len(),
            carried_forward: carried.len(),
            escalated,
            total_bans: next.len(),
        };
        tracing::info!(
            header_violations = summary.header_violations,
            origin_violations = summary.origin_violations,
            carried_forward = summary.carried_forward,
            escalated = summary.escalated,
            total_bans = summary.total_bans,
            "abuse sweep complete"
        );
        Ok(summary)
    }
}

/// Identities whose per-bucket request count strictly exceeds `threshold`.
/// Returns one entry per identity no matter how many buckets it tripped.
fn offenders<'a, I>(events: I, bucket_width: Duration, threshold: u64) -> BTreeSet<String>
where
    I: Iterator<Item = (&'a str, DateTime<Utc>)>,
{
    let mut counts: HashMap<(&str, i64), u64> = HashMap::new();
    for (identity, at) in events {
        *counts
            .entry((identity, bucket_of(at, bucket_width)))
            .or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > threshold)
        .map(|((identity, _), _)| identity.to_string())
        .collect()
}

/// Fixed-width sliding-window bucket index.
fn bucket_of(at: DateTime<Utc>, width: Duration) -> i64 {
    at.timestamp_millis()
        .div_euclid(width.num_milliseconds().max(1))
}

/// One record per identity, keeping the latest `until`. The prior list is
/// supposed to hold one record per identity already; this keeps a corrupt
/// list from counting as multiple reconcile sources.
fn dedupe_by_identity<I: Iterator<Item = BanRecord>>(bans: I) -> Vec<BanRecord> {
    let mut best: HashMap<(Option<String>, Option<String>), BanRecord> = HashMap::new();
    for ban in bans {
        let key = (ban.ip.clone(), ban.header.clone());
        match best.get(&key) {
            Some(existing) if existing.until >= ban.until => {}
            _ => {
                best.insert(key, ban);
            }
        }
    }
    best.into_values().collect()
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid ts")
    }

    #[test]
    fn bucket_boundaries_are_half_open() {
        let width = Duration::seconds(60);
        assert_eq!(bucket_of(at(0), width), 0);
        assert_eq!(bucket_of(at(59), width), 0);
        assert_eq!(bucket_of(at(60), width), 1);
    }

    #[test]
    fn offenders_requires_strictly_more_than_threshold_in_one_bucket() {
        let width = Duration::seconds(60);
        // 3 requests in one bucket: not > 3.
        let exactly: Vec<(&str, DateTime<Utc>)> =
            (0..3).map(|i| ("1.1.1.1", at(i))).collect();
        assert!(offenders(exactly.into_iter(), width, 3).is_empty());

        // 4 in one bucket: offender.
        let over: Vec<(&str, DateTime<Utc>)> = (0..4).map(|i| ("1.1.1.1", at(i))).collect();
        let hit = offenders(over.into_iter(), width, 3);
        assert_eq!(hit.into_iter().collect::<Vec<_>>(), vec!["1.1.1.1"]);
    }

    #[test]
    fn volume_spread_across_buckets_is_not_a_violation() {
        let width = Duration::seconds(60);
        // 6 requests, 2 per bucket: never above 3 in any single bucket.
        let spread: Vec<(&str, DateTime<Utc>)> = (0..6)
            .map(|i| ("2.2.2.2", at(i / 2 * 60 + i % 2)))
            .collect();
        assert!(offenders(spread.into_iter(), width, 3).is_empty());
    }

    #[test]
    fn offender_tripping_two_buckets_appears_once() {
        let width = Duration::seconds(60);
        let mut events: Vec<(&str, DateTime<Utc>)> = Vec::new();
        for i in 0..5 {
            events.push(("3.3.3.3", at(i)));
            events.push(("3.3.3.3", at(60 + i)));
        }
        let hit = offenders(events.into_iter(), width, 4);
        assert_eq!(hit.len(), 1);
    }

    #[test]
    fn dedupe_keeps_latest_until_per_identity() {
        let a = BanRecord::for_ip("9.9.9.9", at(100));
        let b = BanRecord::for_ip("9.9.9.9", at(200));
        let c = BanRecord::for_header("bearer x", at(50));
        let deduped = dedupe_by_identity(vec![a, b.clone(), c.clone()].into_iter());
        assert_eq!(deduped.len(), 2);
        assert!(deduped.contains(&b));
        assert!(deduped.contains(&c));
    }
}
