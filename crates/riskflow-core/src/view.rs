use serde::{Deserialize, Serialize};

use crate::record::ChecklistRecord;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const UNCLASSIFIED_DOMAIN: &str = "미분류";

/// Display filter for a stage list. Filters only ever narrow what is shown;
/// progress is computed from the full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewFilter {
    pub domain: Option<String>,
    pub query: Option<String>,
}

impl ViewFilter {
    pub fn matches(&self, record: &ChecklistRecord) -> bool {
        if let Some(domain) = self
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
        {
            if record.domain.trim() != domain {
                return false;
            }
        }

        let Some(needle) = self
            .query
            .as_deref()
            .map(|query| query.trim().to_lowercase())
            .filter(|query| !query.is_empty())
        else {
            return true;
        };

        [
            &record.kind,
            &record.area,
            &record.domain,
            &record.code,
            &record.item_code,
            &record.status,
            &record.result,
        ]
        .iter()
        .any(|value| value.to_lowercase().contains(&needle))
    }
}

pub fn filter_records<'a>(
    records: impl IntoIterator<Item = &'a ChecklistRecord>,
    filter: &ViewFilter,
) -> Vec<&'a ChecklistRecord> {
    records
        .into_iter()
        .filter(|record| filter.matches(record))
        .collect()
}

pub fn domains(records: &[ChecklistRecord]) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for record in records {
        let domain = record.domain.trim();
        if !domain.is_empty() && !seen.iter().any(|existing| existing == domain) {
            seen.push(domain.to_owned());
        }
    }
    seen
}

pub fn group_by_domain<'a>(records: &[&'a ChecklistRecord]) -> Vec<(String, Vec<&'a ChecklistRecord>)> {
    let mut groups: Vec<(String, Vec<&'a ChecklistRecord>)> = Vec::new();
    for record in records {
        let key = match record.domain.trim() {
            "" => UNCLASSIFIED_DOMAIN,
            domain => domain,
        };
        match groups.iter_mut().find(|(domain, _)| domain == key) {
            Some((_, members)) => members.push(*record),
            None => groups.push((key.to_owned(), vec![*record])),
        }
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based, clamped into `1..=page_count`.
    pub page: usize,
    pub page_count: usize,
}

pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let page_count = items.len().div_ceil(page_size).max(1);
    let page = page.clamp(1, page_count);
    let start = (page - 1) * page_size;
    let items = items.iter().skip(start).take(page_size).cloned().collect();

    Page {
        items,
        page,
        page_count,
    }
}
