//! Inspection-level roll-up of parameter verdicts

use serde::{Deserialize, Serialize};

use crate::core::compliance::ResultStatus;
use crate::core::entity::Severity;

/// Counts of result statuses across one inspection
///
/// `checked` is always `passed + failed`; warnings, not-applicable and
/// pending results are counted on the side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub checked: u32,
    pub passed: u32,
    pub failed: u32,
    #[serde(default)]
    pub warning: u32,
    #[serde(default)]
    pub not_applicable: u32,
    #[serde(default)]
    pub pending: u32,
}

impl Tally {
    pub fn from_statuses(statuses: impl IntoIterator<Item = ResultStatus>) -> Self {
        let mut tally = Tally::default();
        for status in statuses {
            match status {
                ResultStatus::Pass => tally.passed += 1,
                ResultStatus::Fail => tally.failed += 1,
                ResultStatus::Warning => tally.warning += 1,
                ResultStatus::NotApplicable => tally.not_applicable += 1,
                ResultStatus::Pending => tally.pending += 1,
            }
        }
        tally.checked = tally.passed + tally.failed;
        tally
    }

    pub fn pass_rate(&self) -> f64 {
        rate(self.passed, self.checked)
    }

    pub fn fail_rate(&self) -> f64 {
        rate(self.failed, self.checked)
    }
}

/// `part / whole * 100` rounded to two decimals, `0` for an empty whole
pub fn rate(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(f64::from(part) / f64::from(whole) * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Stored defect counters, maintained as results change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectCounts {
    pub critical: u32,
    pub major: u32,
    pub minor: u32,
}

impl DefectCounts {
    pub fn record(&mut self, severity: Severity) {
        *self.slot(severity) += 1;
    }

    pub fn retract(&mut self, severity: Severity) {
        let slot = self.slot(severity);
        *slot = slot.saturating_sub(1);
    }

    pub fn total(&self) -> u32 {
        self.critical + self.major + self.minor
    }

    fn slot(&mut self, severity: Severity) -> &mut u32 {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::Major => &mut self.major,
            Severity::Minor => &mut self.minor,
        }
    }
}

/// The defect a result contributes: failing results count at their severity
pub fn defect_contribution(status: ResultStatus, severity: Option<Severity>) -> Option<Severity> {
    (status == ResultStatus::Fail).then(|| severity.unwrap_or_default())
}

/// Inspection verdict derived when results are submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverallResult {
    Pass,
    Fail,
    /// No failures, but at least one warning
    Conditional,
    #[default]
    Pending,
}

impl OverallResult {
    pub fn from_tally(tally: &Tally) -> Self {
        if tally.failed > 0 {
            OverallResult::Fail
        } else if tally.warning > 0 {
            OverallResult::Conditional
        } else if tally.passed > 0 {
            OverallResult::Pass
        } else {
            OverallResult::Pending
        }
    }
}

impl std::fmt::Display for OverallResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallResult::Pass => write!(f, "pass"),
            OverallResult::Fail => write!(f, "fail"),
            OverallResult::Conditional => write!(f, "conditional"),
            OverallResult::Pending => write!(f, "pending"),
        }
    }
}

/// Lot disposition quantities recorded on an inspection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotQuantities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u32>,
    #[serde(default)]
    pub accepted: u32,
    #[serde(default)]
    pub rejected: u32,
    #[serde(default)]
    pub rework: u32,
    #[serde(default)]
    pub scrap: u32,
}

impl LotQuantities {
    /// Sum of all dispositioned units
    pub fn dispositioned(&self) -> u64 {
        u64::from(self.accepted)
            + u64::from(self.rejected)
            + u64::from(self.rework)
            + u64::from(self.scrap)
    }

    /// Check that dispositions never exceed the lot
    pub fn validate(&self) -> Result<(), String> {
        if let Some(lot) = self.lot_quantity {
            if self.dispositioned() > u64::from(lot) {
                return Err(format!(
                    "accepted + rejected + rework + scrap ({}) exceeds lot quantity ({})",
                    self.dispositioned(),
                    lot
                ));
            }
            if self.sample_size.is_some_and(|s| s > lot) {
                return Err(format!("sample size exceeds lot quantity ({})", lot));
            }
        }
        Ok(())
    }

    /// Accepted share of the lot, when the lot size is known
    pub fn acceptance_rate(&self) -> Option<f64> {
        self.lot_quantity
            .map(|lot| rate(self.accepted, lot))
    }
}

/// Read-only statistics for one inspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionStatistics {
    pub inspection_id: String,
    pub parameters_checked: u32,
    pub parameters_passed: u32,
    pub parameters_failed: u32,
    pub parameters_warning: u32,
    pub parameters_not_applicable: u32,
    pub parameters_pending: u32,
    pub pass_rate: f64,
    pub fail_rate: f64,
    pub critical_defects: u32,
    pub major_defects: u32,
    pub minor_defects: u32,
    pub total_defects: u32,
    pub quantities: LotQuantities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_rate: Option<f64>,
    pub overall_result: OverallResult,
}

impl InspectionStatistics {
    pub fn compute(
        inspection_id: impl Into<String>,
        tally: &Tally,
        defects: &DefectCounts,
        quantities: &LotQuantities,
        overall_result: OverallResult,
    ) -> Self {
        Self {
            inspection_id: inspection_id.into(),
            parameters_checked: tally.checked,
            parameters_passed: tally.passed,
            parameters_failed: tally.failed,
            parameters_warning: tally.warning,
            parameters_not_applicable: tally.not_applicable,
            parameters_pending: tally.pending,
            pass_rate: tally.pass_rate(),
            fail_rate: tally.fail_rate(),
            critical_defects: defects.critical,
            major_defects: defects.major,
            minor_defects: defects.minor,
            total_defects: defects.total(),
            quantities: *quantities,
            acceptance_rate: quantities.acceptance_rate(),
            overall_result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResultStatus::*;

    #[test]
    fn test_rates_are_zero_when_nothing_checked() {
        let tally = Tally::from_statuses([Warning, NotApplicable, Pending]);
        assert_eq!(tally.checked, 0);
        assert_eq!(tally.pass_rate(), 0.0);
        assert_eq!(tally.fail_rate(), 0.0);
    }

    #[test]
    fn test_checked_excludes_warning_and_na() {
        let tally = Tally::from_statuses([Pass, Pass, Fail, Warning, NotApplicable]);
        assert_eq!(tally.checked, 3);
        assert_eq!(tally.checked, tally.passed + tally.failed);
        assert_eq!(tally.pass_rate(), 66.67);
        assert_eq!(tally.fail_rate(), 33.33);
    }

    #[test]
    fn test_defect_counters() {
        let mut defects = DefectCounts::default();
        defects.record(Severity::Critical);
        defects.record(Severity::Minor);
        defects.retract(Severity::Major);
        assert_eq!(defects.total(), 2);
        defects.retract(Severity::Critical);
        assert_eq!(defects.critical, 0);
    }

    #[test]
    fn test_defect_contribution() {
        assert_eq!(defect_contribution(Fail, None), Some(Severity::Minor));
        assert_eq!(defect_contribution(Fail, Some(Severity::Major)), Some(Severity::Major));
        assert_eq!(defect_contribution(Warning, Some(Severity::Critical)), None);
    }

    #[test]
    fn test_overall_result() {
        assert_eq!(OverallResult::from_tally(&Tally::from_statuses([Pass, Fail])), OverallResult::Fail);
        assert_eq!(
            OverallResult::from_tally(&Tally::from_statuses([Pass, Warning])),
            OverallResult::Conditional
        );
        assert_eq!(OverallResult::from_tally(&Tally::from_statuses([Pass])), OverallResult::Pass);
        assert_eq!(OverallResult::from_tally(&Tally::default()), OverallResult::Pending);
    }

    #[test]
    fn test_quantities_bound_by_lot() {
        let mut q = LotQuantities {
            lot_quantity: Some(100),
            accepted: 90,
            rejected: 5,
            rework: 3,
            scrap: 2,
            ..Default::default()
        };
        assert!(q.validate().is_ok());
        assert_eq!(q.acceptance_rate(), Some(90.0));
        q.scrap = 3;
        assert!(q.validate().is_err());
    }
}
