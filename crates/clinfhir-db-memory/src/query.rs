//! Ordering and paging over in-memory rows.

use crate::row::Row;
use clinfhir_search::{Record, SortDirection, SortSpecification};
use std::cmp::Ordering;

/// Compare two rows by `sort`, nulls last in both directions.
pub fn compare_rows(a: &Row, b: &Row, sort: &SortSpecification) -> Ordering {
    for key in sort.keys() {
        let left = a.field(&key.field);
        let right = b.field(&key.field);
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = left.compare(&right).unwrap_or(Ordering::Equal);
                match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

pub fn sort_rows(rows: &mut [Row], sort: &SortSpecification) {
    rows.sort_by(|a, b| compare_rows(a, b, sort));
}

/// Slice one page out of sorted rows.
///
/// Returns the page and whether rows remain after it.
pub fn select_page(rows: Vec<Row>, offset: usize, limit: usize) -> (Vec<Row>, bool) {
    let remaining = rows.len().saturating_sub(offset);
    let has_more = remaining > limit;
    let page = rows.into_iter().skip(offset).take(limit).collect();
    (page, has_more)
}
