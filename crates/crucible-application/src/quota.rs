use chrono::{NaiveDate, Utc};
use crucible_domain::value_objects::work_item::Stage;
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct QuotaCounter {
    day: NaiveDate,
    used: u32,
}

/// Per-stage daily quota. Reservation happens strictly before work begins;
/// `release` hands the slot back only when reserved work failed before
/// producing a result. The daily boundary is a date comparison made on the
/// next reserve, not a timer. A limit of zero disables the quota for that
/// stage.
pub struct QuotaGate {
    limits: BTreeMap<Stage, u32>,
    counters: Mutex<BTreeMap<Stage, QuotaCounter>>,
}

impl QuotaGate {
    pub fn new(validate_daily_limit: u32, score_daily_limit: u32) -> Self {
        let mut limits = BTreeMap::new();
        limits.insert(Stage::Validate, validate_daily_limit);
        limits.insert(Stage::Score, score_daily_limit);
        Self {
            limits,
            counters: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn reserve(&self, stage: Stage) -> bool {
        self.reserve_on(stage, Utc::now().date_naive())
    }

    pub fn release(&self, stage: Stage) {
        let mut counters = self.counters.lock();
        if let Some(counter) = counters.get_mut(&stage) {
            counter.used = counter.used.saturating_sub(1);
        }
    }

    pub fn used(&self, stage: Stage) -> u32 {
        self.counters
            .lock()
            .get(&stage)
            .map(|counter| counter.used)
            .unwrap_or(0)
    }

    fn limit(&self, stage: Stage) -> u32 {
        self.limits.get(&stage).copied().unwrap_or(0)
    }

    pub(crate) fn reserve_on(&self, stage: Stage, today: NaiveDate) -> bool {
        let limit = self.limit(stage);
        let mut counters = self.counters.lock();
        let counter = counters.entry(stage).or_insert(QuotaCounter {
            day: today,
            used: 0,
        });
        if counter.day != today {
            counter.day = today;
            counter.used = 0;
        }
        if limit > 0 && counter.used >= limit {
            metrics::counter!("crucible.quota.denied_total", "stage" => stage.as_str())
                .increment(1);
            return false;
        }
        counter.used += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::QuotaGate;
    use chrono::NaiveDate;
    use crucible_domain::value_objects::work_item::Stage;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
    }

    #[test]
    fn reserve_denies_at_daily_limit() {
        let gate = QuotaGate::new(2, 0);
        assert!(gate.reserve_on(Stage::Validate, day(1)));
        assert!(gate.reserve_on(Stage::Validate, day(1)));
        assert!(!gate.reserve_on(Stage::Validate, day(1)));
        assert_eq!(gate.used(Stage::Validate), 2);
    }

    #[test]
    fn counter_resets_on_first_reserve_after_day_boundary() {
        let gate = QuotaGate::new(1, 0);
        assert!(gate.reserve_on(Stage::Validate, day(1)));
        assert!(!gate.reserve_on(Stage::Validate, day(1)));
        assert!(gate.reserve_on(Stage::Validate, day(2)));
        assert_eq!(gate.used(Stage::Validate), 1);
    }

    #[test]
    fn release_returns_a_slot() {
        let gate = QuotaGate::new(1, 0);
        assert!(gate.reserve_on(Stage::Validate, day(1)));
        assert!(!gate.reserve_on(Stage::Validate, day(1)));
        gate.release(Stage::Validate);
        assert!(gate.reserve_on(Stage::Validate, day(1)));
    }

    #[test]
    fn zero_limit_never_denies() {
        let gate = QuotaGate::new(0, 0);
        for _ in 0..1000 {
            assert!(gate.reserve_on(Stage::Score, day(1)));
        }
    }

    #[test]
    fn stages_have_independent_counters() {
        let gate = QuotaGate::new(1, 1);
        assert!(gate.reserve_on(Stage::Validate, day(1)));
        assert!(gate.reserve_on(Stage::Score, day(1)));
        assert!(!gate.reserve_on(Stage::Validate, day(1)));
        assert!(!gate.reserve_on(Stage::Score, day(1)));
    }

    #[test]
    fn release_does_not_underflow() {
        let gate = QuotaGate::new(1, 0);
        gate.release(Stage::Validate);
        assert_eq!(gate.used(Stage::Validate), 0);
        assert!(gate.reserve_on(Stage::Validate, day(1)));
    }
}
