//! Comma-separated preference lists used for platform negotiation.

use std::collections::BTreeSet;

use indexmap::IndexSet;

use crate::DomainError;

/// Wildcard accepted in place of an explicit platform list.
pub const ANY: &str = "any";

fn tokens(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Intersects two platform lists.
///
/// When either side is exactly [`ANY`] the other side is returned verbatim.
/// Otherwise the result is the sorted, de-duplicated set of common entries;
/// it does not follow either input's preference order.
pub fn intersect(left: &str, right: &str) -> Result<String, DomainError> {
    let empty = || DomainError::EmptyIntersection {
        left: left.to_string(),
        right: right.to_string(),
    };
    if left.trim().is_empty() || right.trim().is_empty() {
        return Err(empty());
    }
    if left == ANY {
        return Ok(right.to_string());
    }
    if right == ANY {
        return Ok(left.to_string());
    }
    let wanted: BTreeSet<&str> = tokens(right).collect();
    let common: BTreeSet<&str> = tokens(left).filter(|t| wanted.contains(t)).collect();
    if common.is_empty() {
        return Err(empty());
    }
    Ok(common.into_iter().collect::<Vec<_>>().join(","))
}

/// Ordered union of several lists; the first occurrence of an entry wins.
#[must_use]
pub fn merge_lists(lists: &[&str]) -> String {
    let merged: IndexSet<&str> = lists.iter().flat_map(|list| tokens(list)).collect();
    merged.into_iter().collect::<Vec<_>>().join(",")
}

/// True when `token` is one of the entries of `list`.
#[must_use]
pub fn list_contains(list: &str, token: &str) -> bool {
    tokens(list).any(|entry| entry == token)
}
