//! List filters shared by every record family

use crate::core::entity::{Entity, ListOrder};

/// Optional status plus reference-field equalities
///
/// Every populated criterion must match. Comparisons ignore case.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<String>,
    pub refs: Vec<(String, String)>,
    pub author: Option<String>,
    /// Substring of the title or business number
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Require `field` (e.g. `inspection_id`) to equal `value`
    pub fn with_ref(mut self, field: impl Into<String>, value: impl ToString) -> Self {
        self.refs.push((field.into(), value.to_string()));
        self
    }

    pub fn matches<R: Entity>(&self, record: &R) -> bool {
        if let Some(status) = &self.status {
            if !record.status().eq_ignore_ascii_case(status) {
                return false;
            }
        }

        if let Some(author) = &self.author {
            if !record.author().to_lowercase().contains(&author.to_lowercase()) {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_title = record.title().to_lowercase().contains(&needle);
            let in_number = record
                .business_number()
                .is_some_and(|n| n.to_lowercase().contains(&needle));
            if !in_title && !in_number {
                return false;
            }
        }

        if self.refs.is_empty() {
            return true;
        }
        let refs = record.references();
        self.refs.iter().all(|(field, value)| {
            refs.iter()
                .any(|(f, v)| f == field && v.eq_ignore_ascii_case(value))
        })
    }

    /// Filter, order by the family's list order, and truncate
    pub fn apply<R: Entity>(&self, records: Vec<R>) -> Vec<R> {
        let mut kept: Vec<R> = records.into_iter().filter(|r| self.matches(r)).collect();
        sort_records(&mut kept);
        if let Some(limit) = self.limit {
            kept.truncate(limit);
        }
        kept
    }
}

/// Sort in the family's list order; ties fall back to ID for stability
pub fn sort_records<R: Entity>(records: &mut [R]) {
    match R::ORDER {
        ListOrder::NewestFirst => records.sort_by(|a, b| {
            b.created()
                .cmp(&a.created())
                .then_with(|| b.id().cmp(a.id()))
        }),
        ListOrder::SequenceAscending => records.sort_by(|a, b| {
            a.sequence()
                .cmp(&b.sequence())
                .then_with(|| a.created().cmp(&b.created()))
                .then_with(|| a.id().cmp(b.id()))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{EntityId, EntityPrefix};
    use crate::entities::{InspectionResult, Ncr};
    use crate::core::entity::Severity;
    use chrono::Duration;

    #[test]
    fn test_status_filter_ignores_case() {
        let ncr = Ncr::new("Burr on edge", Severity::Minor, "test");
        assert!(RecordFilter::new().status("OPEN").matches(&ncr));
        assert!(!RecordFilter::new().status("closed").matches(&ncr));
    }

    #[test]
    fn test_reference_filter() {
        let insp = EntityId::new(EntityPrefix::Insp);
        let other = EntityId::new(EntityPrefix::Insp);
        let result = InspectionResult::new(insp.clone(), 1, "Length", "test");

        assert!(RecordFilter::new().with_ref("inspection_id", &insp).matches(&result));
        assert!(!RecordFilter::new().with_ref("inspection_id", &other).matches(&result));
        assert!(!RecordFilter::new().with_ref("template_id", &insp).matches(&result));
    }

    #[test]
    fn test_newest_first_order() {
        let mut older = Ncr::new("first", Severity::Minor, "test");
        older.created -= Duration::hours(1);
        let newer = Ncr::new("second", Severity::Minor, "test");

        let listed = RecordFilter::new().apply(vec![older, newer]);
        assert_eq!(listed[0].title, "second");
    }

    #[test]
    fn test_sequence_order_and_limit() {
        let insp = EntityId::new(EntityPrefix::Insp);
        let results = vec![
            InspectionResult::new(insp.clone(), 3, "c", "test"),
            InspectionResult::new(insp.clone(), 1, "a", "test"),
            InspectionResult::new(insp, 2, "b", "test"),
        ];
        let filter = RecordFilter {
            limit: Some(2),
            ..Default::default()
        };
        let names: Vec<_> = filter
            .apply(results)
            .into_iter()
            .map(|r| r.parameter_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_search_matches_number() {
        let mut ncr = Ncr::new("Porosity", Severity::Major, "test");
        ncr.ncr_number = "NCR-2025-007".to_string();
        let filter = RecordFilter {
            search: Some("2025-007".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&ncr));
    }
}
