//! Multi-source quantity reconciliation.
//!
//! Three independent counts exist for each code:
//! - text: mentions in native plan text
//! - primary: the schedule or legend quantity, when one is stated
//! - verify: placements found by tiled OCR
//!
//! They are merged into one final quantity. The schedule is an upper bound
//! whenever it is present.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ReconcileConfig;
use crate::models::ReconciledQuantity;

/// Combine the three counts for one code.
///
/// Pure and deterministic. Whenever `primary_qty > 0` the result never
/// exceeds it.
pub fn reconcile_counts(
    text_qty: u32,
    primary_qty: u32,
    verify_qty: u32,
    config: &ReconcileConfig,
) -> u32 {
    let base = scale(verify_qty, config.verify_uplift);
    let mut best = text_qty.max(base);

    if primary_qty > 0 {
        best = best.min(primary_qty);
    }

    if verify_qty == 0 && text_qty == 0 && primary_qty > 0 {
        // Schedule entry with no plan evidence.
        best = scale(primary_qty, config.schedule_only_ratio)
            .max(1)
            .min(primary_qty);
    }

    best
}

fn scale(qty: u32, factor: f64) -> u32 {
    let scaled = (qty as f64 * factor.max(0.0)).round();
    if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Counts gathered for one code before reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CodeTally {
    pub text_qty: u32,
    pub primary_qty: u32,
    pub verify_qty: u32,
}

impl CodeTally {
    /// Fold another page's counts in. Text and verify counts add up; the
    /// schedule quantity is the largest stated anywhere.
    pub fn absorb(&mut self, other: CodeTally) {
        self.text_qty = self.text_qty.saturating_add(other.text_qty);
        self.verify_qty = self.verify_qty.saturating_add(other.verify_qty);
        self.primary_qty = self.primary_qty.max(other.primary_qty);
    }

    pub fn reconcile(&self, config: &ReconcileConfig) -> ReconciledQuantity {
        ReconciledQuantity {
            text_qty: self.text_qty,
            primary_qty: self.primary_qty,
            verify_qty: self.verify_qty,
            final_qty: reconcile_counts(self.text_qty, self.primary_qty, self.verify_qty, config),
        }
    }
}

/// Reconcile every code. Arrival order of the tallies does not matter.
pub fn reconcile_all(
    tallies: &BTreeMap<String, CodeTally>,
    config: &ReconcileConfig,
) -> BTreeMap<String, ReconciledQuantity> {
    tallies
        .iter()
        .map(|(code, tally)| (code.clone(), tally.reconcile(config)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc(text: u32, primary: u32, verify: u32) -> u32 {
        reconcile_counts(text, primary, verify, &ReconcileConfig::default())
    }

    #[test]
    fn test_documented_cases() {
        assert_eq!(rc(0, 0, 0), 0);
        assert_eq!(rc(0, 10, 0), 4);
        assert_eq!(rc(5, 3, 0), 3);
    }

    #[test]
    fn test_verify_uplift() {
        assert_eq!(rc(0, 0, 10), 12); // 11.5 rounds up
        assert_eq!(rc(20, 0, 10), 20);
        assert_eq!(rc(0, 8, 10), 8);
    }

    #[test]
    fn test_schedule_only_floor() {
        assert_eq!(rc(0, 1, 0), 1);
        assert_eq!(rc(0, 2, 0), 1);
        assert_eq!(rc(0, 5, 0), 2);
    }

    #[test]
    fn test_primary_is_ceiling() {
        for text in 0..30 {
            for primary in 1..30 {
                for verify in 0..30 {
                    assert!(rc(text, primary, verify) <= primary);
                }
            }
        }
    }

    #[test]
    fn test_tunable_constants() {
        let config = ReconcileConfig {
            verify_uplift: 1.0,
            schedule_only_ratio: 2.0,
        };
        assert_eq!(reconcile_counts(0, 0, 7, &config), 7);
        assert_eq!(reconcile_counts(0, 3, 0, &config), 3);
    }

    #[test]
    fn test_tally_absorb() {
        let mut tally = CodeTally::default();
        tally.absorb(CodeTally { text_qty: 1, primary_qty: 4, verify_qty: 2 });
        tally.absorb(CodeTally { text_qty: 2, primary_qty: 6, verify_qty: 0 });
        assert_eq!(tally, CodeTally { text_qty: 3, primary_qty: 6, verify_qty: 2 });
        assert_eq!(tally.reconcile(&ReconcileConfig::default()).final_qty, 3);
    }
}
