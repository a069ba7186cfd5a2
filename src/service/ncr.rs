//! NCR numbering and summary

use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::error::{QualityError, QualityResult};
use crate::core::store::RecordStore;
use crate::core::workflow::State;
use crate::entities::{Ncr, NcrStatus};
use crate::service::QualityService;

/// Counts across all NCRs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NcrSummary {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    /// Mean days from creation to closure over closed NCRs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_resolution_days: Option<f64>,
}

impl<S: RecordStore> QualityService<S> {
    /// Create an NCR, generating `<prefix>-<year>-<seq>` when no number is given
    ///
    /// Generated numbers come from the sequence generator keyed by prefix
    /// and year, never lower than the current NCR count; a number already
    /// taken by a hand-entered NCR is skipped.
    pub fn create_ncr(&mut self, mut ncr: Ncr) -> QualityResult<Ncr> {
        if ncr.ncr_number.trim().is_empty() {
            ncr.ncr_number = self.next_ncr_number(ncr.created.year())?;
        }
        self.create(ncr)
    }

    fn next_ncr_number(&mut self, year: i32) -> QualityResult<String> {
        let key = format!("{}-{}", self.ncr_prefix, year);
        let floor = self.store.count::<Ncr>()? as u64;
        loop {
            let seq = self.sequence.next(&key, floor)?;
            let number = format!("{}-{:0width$}", key, seq, width = self.number_width);
            if self.find_by_number::<Ncr>(&number)?.is_none() {
                tracing::debug!(%number, "assigned NCR number");
                return Ok(number);
            }
            tracing::warn!(%number, "NCR number already taken, skipping");
        }
    }

    pub fn ncr_summary(&self) -> QualityResult<NcrSummary> {
        let ncrs = self.store.fetch_all::<Ncr>().map_err(QualityError::from)?;
        let mut summary = NcrSummary {
            total: ncrs.len(),
            ..Default::default()
        };

        let mut resolution_total = 0.0;
        let mut resolved = 0usize;
        for ncr in &ncrs {
            *summary
                .by_status
                .entry(ncr.status.as_str().to_string())
                .or_default() += 1;
            *summary
                .by_severity
                .entry(ncr.severity.to_string())
                .or_default() += 1;

            if ncr.status == NcrStatus::Closed {
                summary.closed += 1;
            } else {
                summary.open += 1;
            }
            if let Some(days) = ncr.resolution_days() {
                resolution_total += days;
                resolved += 1;
            }
        }

        if resolved > 0 {
            let mean = resolution_total / resolved as f64;
            summary.average_resolution_days = Some((mean * 100.0).round() / 100.0);
        }
        Ok(summary)
    }
}
