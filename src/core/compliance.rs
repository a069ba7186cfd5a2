//! Spec-compliance evaluation of measured values against tolerance limits

use serde::{Deserialize, Serialize};

/// Outcome of one checked parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pass,
    Fail,
    Warning,
    NotApplicable,
    #[default]
    Pending,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultStatus::Pass => write!(f, "pass"),
            ResultStatus::Fail => write!(f, "fail"),
            ResultStatus::Warning => write!(f, "warning"),
            ResultStatus::NotApplicable => write!(f, "not_applicable"),
            ResultStatus::Pending => write!(f, "pending"),
        }
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pass" => Ok(ResultStatus::Pass),
            "fail" => Ok(ResultStatus::Fail),
            "warning" | "warn" => Ok(ResultStatus::Warning),
            "not_applicable" | "na" | "n/a" => Ok(ResultStatus::NotApplicable),
            "pending" => Ok(ResultStatus::Pending),
            _ => Err(format!(
                "Invalid result status: {}. Use pass, fail, warning, not_applicable, or pending",
                s
            )),
        }
    }
}

/// Computed verdict for one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// `None` when no value has been measured
    pub within_spec: Option<bool>,
    pub status: ResultStatus,
}

impl Verdict {
    pub const PENDING: Verdict = Verdict {
        within_spec: None,
        status: ResultStatus::Pending,
    };
}

/// Evaluate a numeric measurement against optional inclusive limits
///
/// Either limit may be absent for a one-sided tolerance; with both absent the
/// value is always within spec.
pub fn evaluate(value: Option<f64>, lower: Option<f64>, upper: Option<f64>) -> Verdict {
    let Some(value) = value else {
        return Verdict::PENDING;
    };

    // NaN fails every comparison, so it is never within spec
    let within = lower.map_or(true, |lsl| value >= lsl) && upper.map_or(true, |usl| value <= usl);

    Verdict {
        within_spec: Some(within),
        status: if within {
            ResultStatus::Pass
        } else {
            ResultStatus::Fail
        },
    }
}

/// Verdict for a result that may be numeric or textual
///
/// Numeric values are always evaluated. Textual results keep the status the
/// inspector recorded, or stay pending when none was given.
pub fn resolve(
    numeric: Option<f64>,
    lower: Option<f64>,
    upper: Option<f64>,
    manual: Option<ResultStatus>,
) -> Verdict {
    if numeric.is_some() {
        return evaluate(numeric, lower, upper);
    }

    match manual {
        Some(ResultStatus::Pass) => Verdict {
            within_spec: Some(true),
            status: ResultStatus::Pass,
        },
        Some(ResultStatus::Fail) => Verdict {
            within_spec: Some(false),
            status: ResultStatus::Fail,
        },
        Some(status) => Verdict {
            within_spec: None,
            status,
        },
        None => Verdict::PENDING,
    }
}

/// Reject NaN and infinities in a measured value or limit
pub fn ensure_finite(field: &str, value: Option<f64>) -> Result<(), String> {
    match value {
        Some(v) if !v.is_finite() => Err(format!("{} must be a finite number, got {}", field, v)),
        _ => Ok(()),
    }
}

/// Signed distance of `value` from the nominal target
pub fn deviation(value: f64, target: Option<f64>) -> Option<f64> {
    target.map(|t| value - t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_lower_limit_fails() {
        let v = evaluate(Some(5.0), Some(10.0), None);
        assert_eq!(v.within_spec, Some(false));
        assert_eq!(v.status, ResultStatus::Fail);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(evaluate(Some(10.0), Some(10.0), Some(20.0)).status, ResultStatus::Pass);
        assert_eq!(evaluate(Some(20.0), Some(10.0), Some(20.0)).status, ResultStatus::Pass);
        assert_eq!(evaluate(Some(20.001), Some(10.0), Some(20.0)).status, ResultStatus::Fail);
    }

    #[test]
    fn test_one_sided_and_unbounded() {
        assert_eq!(evaluate(Some(1e9), Some(0.0), None).within_spec, Some(true));
        assert_eq!(evaluate(Some(-3.0), None, Some(-4.0)).within_spec, Some(false));
        assert_eq!(evaluate(Some(-1e9), None, None).within_spec, Some(true));
    }

    #[test]
    fn test_missing_value_is_pending() {
        assert_eq!(evaluate(None, Some(1.0), Some(2.0)), Verdict::PENDING);
    }

    #[test]
    fn test_within_spec_matches_formula() {
        let limits = [None, Some(-1.0), Some(0.0), Some(2.5)];
        let values = [-2.0, -1.0, 0.0, 1.0, 2.5, 3.0];
        for lsl in limits {
            for usl in limits {
                for v in values {
                    let expected = lsl.map_or(true, |l| v >= l) && usl.map_or(true, |u| v <= u);
                    assert_eq!(evaluate(Some(v), lsl, usl).within_spec, Some(expected));
                }
            }
        }
    }

    #[test]
    fn test_nan_is_never_within_spec() {
        let v = evaluate(Some(f64::NAN), Some(10.0), Some(20.0));
        assert_eq!(v.within_spec, Some(false));
        assert_eq!(v.status, ResultStatus::Fail);
        assert_eq!(evaluate(Some(15.0), Some(f64::NAN), None).status, ResultStatus::Fail);
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite("value", Some(1.5)).is_ok());
        assert!(ensure_finite("value", None).is_ok());
        assert!(ensure_finite("value", Some(f64::NAN)).is_err());
        assert!(ensure_finite("upper_limit", Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_textual_results_keep_manual_status() {
        assert_eq!(resolve(None, None, None, None), Verdict::PENDING);
        assert_eq!(
            resolve(None, None, None, Some(ResultStatus::Warning)).status,
            ResultStatus::Warning
        );
        assert_eq!(
            resolve(None, None, None, Some(ResultStatus::Fail)).within_spec,
            Some(false)
        );
        // A numeric value always wins over a manual status
        assert_eq!(
            resolve(Some(5.0), Some(10.0), None, Some(ResultStatus::Pass)).status,
            ResultStatus::Fail
        );
    }

    #[test]
    fn test_deviation() {
        assert_eq!(deviation(10.5, Some(10.0)), Some(0.5));
        assert_eq!(deviation(10.5, None), None);
    }
}
