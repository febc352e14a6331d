use chrono::NaiveDate;
use tracing::{debug, warn};

use super::classify::{CategoryCode, UNCLASSIFIED};
use super::group::ClosedGroup;
use super::page::{GroupId, Page};

/// Majority values of a closed group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consensus {
    pub header: String,
    pub dos: Option<NaiveDate>,
    pub provider: String,
    pub category: CategoryCode,
}

/// A closed group after reconciliation; every page carries the consensus values.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub pages: Vec<Page>,
    pub consensus: Consensus,
}

impl Group {
    pub fn first_page(&self) -> Option<&Page> {
        self.pages.first()
    }
}

/// Propagates group consensus onto member pages.
///
/// Holds the previous group's category so a group of pages with no metadata at
/// all can borrow it instead of staying unclassified.
#[derive(Debug, Default)]
pub struct Reconciler {
    previous_category: Option<CategoryCode>,
}

impl Reconciler {
    pub fn reconcile(&mut self, group: ClosedGroup) -> Group {
        let ClosedGroup { id, mut pages } = group;

        let header = majority(pages.iter().map(|p| p.meta.header.clone()).filter(|h| !h.is_empty()));
        let dos = majority(pages.iter().filter_map(|p| p.meta.dos));
        let provider = majority(pages.iter().map(|p| p.meta.provider.clone()).filter(|v| !v.is_empty()));
        let mut category = majority(pages.iter().map(|p| p.category).filter(|c| *c != UNCLASSIFIED))
            .unwrap_or(UNCLASSIFIED);

        let orphan = pages.iter().all(|p| p.meta.is_empty());
        if category == UNCLASSIFIED && orphan {
            if let Some(prev) = self.previous_category {
                debug!(group = id.0, category = prev, "orphan group takes neighbouring category");
                category = prev;
            }
        }
        if category == UNCLASSIFIED {
            warn!(
                group = id.0,
                first_page = pages.first().map(|p| p.number),
                "group could not be categorized"
            );
        }

        let consensus = Consensus {
            header: header.unwrap_or_default(),
            dos,
            provider: provider.unwrap_or_default(),
            category,
        };

        for page in &mut pages {
            page.meta.header = consensus.header.clone();
            page.meta.dos = consensus.dos;
            page.meta.provider = consensus.provider.clone();
            page.category = consensus.category;
        }

        if category != UNCLASSIFIED {
            self.previous_category = Some(category);
        }

        Group { id, pages, consensus }
    }
}

/// Most frequent value; ties go to the value seen first.
fn majority<T: PartialEq>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut tally: Vec<(T, usize)> = Vec::new();
    for value in values {
        match tally.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => tally.push((value, 1)),
        }
    }
    let mut best: Option<(T, usize)> = None;
    for (value, count) in tally {
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::page::PageMetadata;

    fn page(n: u32, header: &str, dos: Option<(i32, u32, u32)>, provider: &str, category: CategoryCode) -> Page {
        Page::new(
            n,
            "",
            PageMetadata {
                header: header.into(),
                continued: false,
                dos: dos.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
                provider: provider.into(),
            },
        )
        .with_category(category)
    }

    fn closed(id: u32, pages: Vec<Page>) -> ClosedGroup {
        ClosedGroup { id: GroupId(id), pages }
    }

    #[test]
    fn majority_header_corrects_noise() {
        let group = closed(
            1,
            vec![
                page(1, "Lab Report", None, "", 24),
                page(2, "Lab Rep0rt", None, "", 24),
                page(3, "Lab Report", None, "", 24),
                page(4, "Lab Report", None, "", 24),
            ],
        );
        let group = Reconciler::default().reconcile(group);
        assert_eq!(group.consensus.header, "Lab Report");
        assert!(group.pages.iter().all(|p| p.meta.header == "Lab Report"));
    }

    #[test]
    fn ties_prefer_first_page() {
        let group = closed(
            1,
            vec![
                page(1, "A", Some((2024, 1, 1)), "P1", 16),
                page(2, "B", Some((2024, 2, 2)), "P2", 24),
            ],
        );
        let c = Reconciler::default().reconcile(group).consensus;
        assert_eq!(c.header, "A");
        assert_eq!(c.dos, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(c.provider, "P1");
        assert_eq!(c.category, 16);
    }

    #[test]
    fn empty_values_do_not_vote() {
        let group = closed(
            1,
            vec![
                page(1, "", None, "", UNCLASSIFIED),
                page(2, "", None, "", UNCLASSIFIED),
                page(3, "Progress Note", Some((2024, 3, 3)), "Dr. X", 16),
            ],
        );
        let group = Reconciler::default().reconcile(group);
        for p in &group.pages {
            assert_eq!(p.meta.header, "Progress Note");
            assert_eq!(p.meta.dos, NaiveDate::from_ymd_opt(2024, 3, 3));
            assert_eq!(p.meta.provider, "Dr. X");
            assert_eq!(p.category, 16);
        }
    }

    #[test]
    fn tie_without_first_page_value_goes_to_earliest() {
        let group = closed(
            1,
            vec![page(1, "", None, "", 0), page(2, "B", None, "", 0), page(3, "C", None, "", 0)],
        );
        assert_eq!(Reconciler::default().reconcile(group).consensus.header, "B");
    }

    #[test]
    fn orphan_group_inherits_previous_category() {
        let mut reconciler = Reconciler::default();
        reconciler.reconcile(closed(1, vec![page(1, "Lab Report", None, "", 24)]));
        let orphan = reconciler.reconcile(closed(2, vec![page(2, "", None, "", UNCLASSIFIED)]));
        assert_eq!(orphan.consensus.category, 24);
        assert_eq!(orphan.consensus.header, "");
    }

    #[test]
    fn non_orphan_stays_unclassified() {
        let mut reconciler = Reconciler::default();
        reconciler.reconcile(closed(1, vec![page(1, "Lab Report", None, "", 24)]));
        let group = reconciler.reconcile(closed(2, vec![page(2, "Misc", None, "", UNCLASSIFIED)]));
        assert_eq!(group.consensus.category, UNCLASSIFIED);
    }

    #[test]
    fn first_orphan_has_nothing_to_inherit() {
        let group = Reconciler::default().reconcile(closed(1, vec![page(1, "", None, "", 0)]));
        assert_eq!(group.consensus.category, UNCLASSIFIED);
    }
}
