//! CAPA action items, effectiveness reviews and summary

use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::error::{QualityError, QualityResult};
use crate::core::identity::EntityId;
use crate::core::store::RecordStore;
use crate::core::workflow::{Lifecycle, State};
use crate::entities::{ActionItem, ActionStatus, Capa, EffectivenessReview, ItemStatus};
use crate::service::QualityService;

/// Counts across all CAPAs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapaSummary {
    pub total: usize,
    /// Not yet closed, rejected or cancelled
    pub open: usize,
    pub closed: usize,
    /// Open with a due date already past
    pub overdue: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    /// Mean days from creation to closure over closed CAPAs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_completion_days: Option<f64>,
    /// Percent of closed CAPAs verified effective
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effectiveness_rate: Option<f64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl<S: RecordStore> QualityService<S> {
    /// Append a planned task to an open CAPA
    pub fn add_action_item(&mut self, capa_id: &EntityId, item: ActionItem) -> QualityResult<Capa> {
        let capa = self.amend::<Capa, _>(capa_id, |capa, _| {
            if item.description.trim().is_empty() {
                return Err(QualityError::validation("action item needs a description"));
            }
            capa.add_item(item);
            Ok(())
        })?;
        tracing::info!(capa = %capa_id, items = capa.action_items.len(), "action item added");
        Ok(capa)
    }

    /// Move action item `sequence` to `status`
    pub fn set_action_item_status(
        &mut self,
        capa_id: &EntityId,
        sequence: u32,
        status: ItemStatus,
        actor: &str,
        evidence: Option<String>,
    ) -> QualityResult<Capa> {
        let capa = self.amend::<Capa, _>(capa_id, |capa, now| {
            let item = capa
                .item_mut(sequence)
                .ok_or_else(|| QualityError::not_found("action item", sequence))?;
            item.set_status(status, actor, now, evidence)?;
            Ok(())
        })?;
        tracing::info!(
            capa = %capa_id,
            sequence,
            %status,
            percent = capa.item_progress().percent,
            "action item updated"
        );
        Ok(capa)
    }

    /// Record an effectiveness review on an implemented CAPA
    pub fn add_effectiveness_review(
        &mut self,
        capa_id: &EntityId,
        mut review: EffectivenessReview,
    ) -> QualityResult<Capa> {
        let effective = review.effective;
        let capa = self.amend::<Capa, _>(capa_id, |capa, now| {
            if review.conclusion.trim().is_empty() {
                return Err(QualityError::validation("effectiveness review needs a conclusion"));
            }
            review.reviewed.at = now;
            capa.add_review(review)?;
            Ok(())
        })?;
        tracing::info!(capa = %capa_id, effective, "effectiveness review recorded");
        Ok(capa)
    }

    pub fn capa_summary(&self) -> QualityResult<CapaSummary> {
        let capas = self.store.fetch_all::<Capa>()?;
        let today = self.now().date_naive();
        let mut summary = CapaSummary {
            total: capas.len(),
            ..Default::default()
        };

        let mut completion_total = 0.0;
        let mut timed = 0usize;
        let mut effective = 0usize;
        for capa in &capas {
            *summary
                .by_status
                .entry(capa.status.as_str().to_string())
                .or_default() += 1;
            *summary.by_type.entry(capa.capa_type.to_string()).or_default() += 1;
            *summary
                .by_priority
                .entry(capa.priority.to_string())
                .or_default() += 1;

            if !capa.is_terminal() {
                summary.open += 1;
                if capa.due_date.is_some_and(|due| due < today) {
                    summary.overdue += 1;
                }
            }
            if capa.status != ActionStatus::Closed {
                continue;
            }
            summary.closed += 1;
            if capa.progress.is_effective.is_set() {
                effective += 1;
            }
            if let Some(closed) = &capa.progress.closed {
                completion_total += (closed.at - capa.created).num_seconds() as f64 / 86_400.0;
                timed += 1;
            }
        }

        if timed > 0 {
            summary.average_completion_days = Some(round2(completion_total / timed as f64));
        }
        if summary.closed > 0 {
            summary.effectiveness_rate =
                Some(round2(effective as f64 / summary.closed as f64 * 100.0));
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Priority;
    use crate::core::sequence::MemorySequence;
    use crate::core::store::MemoryStore;
    use crate::core::workflow::Action;
    use crate::entities::{ActionRecord, CapaType, ItemKind};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn service() -> QualityService<MemoryStore> {
        QualityService::new(MemoryStore::new(), Box::new(MemorySequence::new())).with_clock(fixed_now)
    }

    fn capa(svc: &mut QualityService<MemoryStore>, number: &str) -> Capa {
        let mut capa = Capa::new(number, "Bore defects", CapaType::Corrective, "t");
        capa.created = fixed_now() - chrono::Duration::days(10);
        svc.create(capa).unwrap()
    }

    fn implement(svc: &mut QualityService<MemoryStore>, id: &EntityId) {
        svc.transition::<Capa, _>(id, Action::Submit, |c, now| c.submit("a", now)).unwrap();
        svc.transition::<Capa, _>(id, Action::Approve, |c, now| c.approve("b", now, None))
            .unwrap();
        svc.transition::<Capa, _>(id, Action::Implement, |c, now| c.implement("a", now))
            .unwrap();
    }

    #[test]
    fn test_action_items_track_progress() {
        let mut svc = service();
        let created = capa(&mut svc, "CAPA-2025-020");
        svc.add_action_item(&created.id, ActionItem::new("Root cause", ItemKind::RootCause))
            .unwrap();
        svc.add_action_item(&created.id, ActionItem::new("Replace pin", ItemKind::Corrective))
            .unwrap();

        let capa = svc
            .set_action_item_status(&created.id, 1, ItemStatus::Completed, "a", None)
            .unwrap();
        assert_eq!(capa.item_progress().percent, 50);
        assert_eq!(
            capa.action_items[0].completed.as_ref().map(|s| s.at),
            Some(fixed_now())
        );

        assert!(matches!(
            svc.set_action_item_status(&created.id, 5, ItemStatus::Completed, "a", None),
            Err(QualityError::NotFound { .. })
        ));
        // action_items only change through these operations
        assert!(svc
            .update::<Capa>(&created.id, serde_json::json!({"action_items": []}))
            .is_err());
    }

    #[test]
    fn test_review_requires_implementation() {
        let mut svc = service();
        let created = capa(&mut svc, "CAPA-2025-021");
        let review = EffectivenessReview::new(true, "no recurrence", "qa", fixed_now());

        assert!(svc
            .add_effectiveness_review(&created.id, review.clone())
            .unwrap_err()
            .is_precondition());
        implement(&mut svc, &created.id);
        let capa = svc.add_effectiveness_review(&created.id, review).unwrap();
        assert_eq!(capa.effectiveness_reviews.len(), 1);
        assert_eq!(capa.status, ActionStatus::Implemented);
    }

    #[test]
    fn test_summary_counts_overdue_and_effectiveness() {
        let mut svc = service();
        let mut late = Capa::new("CAPA-2025-030", "Late", CapaType::Preventive, "t");
        late.due_date = NaiveDate::from_ymd_opt(2025, 5, 1);
        late.priority = Priority::High;
        svc.create(late).unwrap();

        let done = capa(&mut svc, "CAPA-2025-031");
        implement(&mut svc, &done.id);
        svc.transition::<Capa, _>(&done.id, Action::Verify, |c, now| c.verify("q", now, true, None))
            .unwrap();
        svc.transition::<Capa, _>(&done.id, Action::Close, |c, now| c.close("q", now, None))
            .unwrap();

        let summary = svc.capa_summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!((summary.open, summary.closed, summary.overdue), (1, 1, 1));
        assert_eq!(summary.by_type.get("preventive"), Some(&1));
        assert_eq!(summary.by_priority.get("high"), Some(&1));
        assert_eq!(summary.average_completion_days, Some(10.0));
        assert_eq!(summary.effectiveness_rate, Some(100.0));
    }
}
