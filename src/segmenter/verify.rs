use std::collections::HashSet;

use super::error::SegmentError;
use super::keys::{KeyedPage, KEY_BASE, ROOT_PARENT};

/// Final structural check before any record leaves the engine.
///
/// `expected_pages` is the document's page count; pages were validated as
/// `1..=n` on the way in so every page number must come back exactly once and in order.
pub fn verify_partition(keyed: &[KeyedPage<'_>], expected_pages: usize) -> Result<(), SegmentError> {
    if keyed.len() != expected_pages {
        return Err(SegmentError::InvariantViolation(format!(
            "{} pages in, {} pages grouped",
            expected_pages,
            keyed.len()
        )));
    }

    let mut closed_groups = HashSet::new();
    let mut group_first_key = None;
    let mut previous_group = None;

    for (idx, entry) in keyed.iter().enumerate() {
        let expected_number = idx as u32 + 1;
        if entry.page.number != expected_number {
            return Err(SegmentError::InvariantViolation(format!(
                "position {} holds page {}, expected {}",
                idx, entry.page.number, expected_number
            )));
        }

        if entry.page.group != Some(entry.group) {
            return Err(SegmentError::InvariantViolation(format!(
                "page {} stamped with group {:?} but listed under {}",
                entry.page.number, entry.page.group, entry.group.0
            )));
        }

        let expected_key = KEY_BASE + idx as u64;
        if entry.reference_key != expected_key {
            return Err(SegmentError::InvariantViolation(format!(
                "page {} has reference key {}, expected {}",
                entry.page.number, entry.reference_key, expected_key
            )));
        }

        let starts_group = previous_group != Some(entry.group);
        if starts_group {
            if let Some(prev) = previous_group {
                closed_groups.insert(prev);
            }
            if closed_groups.contains(&entry.group) {
                return Err(SegmentError::InvariantViolation(format!(
                    "group {} is not contiguous (resumes at page {})",
                    entry.group.0, entry.page.number
                )));
            }
            group_first_key = Some(entry.reference_key);
            previous_group = Some(entry.group);
        }

        let expected_parent = if starts_group {
            ROOT_PARENT
        } else {
            group_first_key.unwrap_or(ROOT_PARENT)
        };
        if entry.parent_key != expected_parent {
            return Err(SegmentError::InvariantViolation(format!(
                "page {} has parent key {}, expected {}",
                entry.page.number, entry.parent_key, expected_parent
            )));
        }
    }

    Ok(())
}
