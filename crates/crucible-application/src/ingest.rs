use chrono::Utc;
use crucible_domain::repositories::generation::{CandidateStrategy, GenerationClient};
use crucible_domain::repositories::work_items::WorkItemStore;
use crucible_domain::value_objects::work_item::{StrategyPayload, WorkItem};
use sha2::{Digest, Sha256};
use tracing::info_span;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub received: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Pulls a bounded batch of fresh candidates from the generation collaborator
/// and seeds them as NEW work items, deduplicated by source fingerprint.
pub fn ingest_candidates(
    generation: &dyn GenerationClient,
    store: &dyn WorkItemStore,
    limit: usize,
) -> Result<IngestReport, String> {
    let _span = info_span!("ingest_candidates", limit).entered();
    let mut report = IngestReport::default();
    if limit == 0 {
        return Ok(report);
    }

    let batch = generation.next_batch(limit)?;
    report.received = batch.len();
    let now_ts = Utc::now().timestamp();

    for candidate in batch {
        let id = match fingerprint(&candidate) {
            Ok(id) => id,
            Err(err) => {
                report.rejected += 1;
                tracing::warn!(error = %err, "dropping unfingerprintable candidate");
                continue;
            }
        };
        let item = WorkItem::new(
            id,
            StrategyPayload {
                source: candidate.source,
                kind: candidate.kind,
                timeframe: candidate.timeframe,
            },
            now_ts,
        );
        if store.insert(item)? {
            report.inserted += 1;
        } else {
            report.duplicates += 1;
        }
    }

    metrics::counter!("crucible.ingest.inserted_total").increment(report.inserted as u64);
    metrics::counter!("crucible.ingest.duplicates_total").increment(report.duplicates as u64);
    tracing::info!(
        received = report.received,
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected,
        "ingested candidate batch"
    );
    Ok(report)
}

/// Stable identity of a candidate: hash of canonical source JSON plus the
/// metadata that changes what the pipeline would do with it.
pub fn fingerprint(candidate: &CandidateStrategy) -> Result<String, String> {
    let canonical = candidate.source.canonical_json()?;
    let mut hasher = Sha256::new();
    hasher.update(candidate.kind.as_bytes());
    hasher.update(b"\n");
    hasher.update(candidate.timeframe.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical.as_bytes());
    let bytes = hasher.finalize();
    Ok(to_hex(&bytes[..16]))
}

fn to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{fingerprint, to_hex};
    use crucible_domain::repositories::generation::CandidateStrategy;
    use crucible_domain::value_objects::strategy_ir::{
        Cmp, Expr, PriceField, Rule, StrategyIr,
    };
    use std::collections::BTreeMap;

    fn candidate(timeframe: &str) -> CandidateStrategy {
        CandidateStrategy {
            source: StrategyIr {
                entry: Rule {
                    lhs: Expr::Price {
                        field: PriceField::Close,
                    },
                    cmp: Cmp::Gt,
                    rhs: Expr::Const { value: 1.0 },
                },
                exit: Rule {
                    lhs: Expr::Price {
                        field: PriceField::Close,
                    },
                    cmp: Cmp::Lt,
                    rhs: Expr::Const { value: 1.0 },
                },
                params: BTreeMap::new(),
            },
            kind: "breakout".to_string(),
            timeframe: timeframe.to_string(),
        }
    }

    #[test]
    fn fingerprint_is_stable_and_metadata_sensitive() {
        let a = fingerprint(&candidate("1hour")).unwrap();
        let b = fingerprint(&candidate("1hour")).unwrap();
        let c = fingerprint(&candidate("4hour")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn hex_encoding_is_lowercase() {
        assert_eq!(to_hex(&[0x00, 0xff, 0x1a]), "00ff1a");
    }
}
