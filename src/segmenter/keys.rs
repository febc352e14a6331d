use super::page::{GroupId, Page};
use super::reconcile::Group;

pub const KEY_BASE: u64 = 120_991;

/// Parent key of a group's first page.
pub const ROOT_PARENT: u64 = 0;

/// Per-document reference key counter. One per run, never shared.
#[derive(Debug, Clone)]
pub struct KeySequence {
    next: u64,
}

impl KeySequence {
    pub fn new() -> Self {
        Self::starting_at(KEY_BASE)
    }

    pub fn starting_at(base: u64) -> Self {
        Self { next: base }
    }

    pub fn next_key(&mut self) -> u64 {
        let key = self.next;
        self.next += 1;
        key
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for KeySequence {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyedPage<'a> {
    pub page: &'a Page,
    pub group: GroupId,
    pub reference_key: u64,
    pub parent_key: u64,
}

/// Walks groups in document order handing out reference keys page by page.
pub fn assign<'a>(groups: &'a [Group], keys: &mut KeySequence) -> Vec<KeyedPage<'a>> {
    let mut out = Vec::with_capacity(groups.iter().map(|g| g.pages.len()).sum());
    for group in groups {
        let mut first_key = None;
        for page in &group.pages {
            let reference_key = keys.next_key();
            let parent_key = match first_key {
                None => {
                    first_key = Some(reference_key);
                    ROOT_PARENT
                }
                Some(first) => first,
            };
            out.push(KeyedPage {
                page,
                group: group.id,
                reference_key,
                parent_key,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::page::PageMetadata;
    use crate::segmenter::reconcile::Consensus;

    fn group(id: u32, numbers: &[u32]) -> Group {
        Group {
            id: GroupId(id),
            pages: numbers
                .iter()
                .map(|n| Page::new(*n, "", PageMetadata::default()))
                .collect(),
            consensus: Consensus {
                header: String::new(),
                dos: None,
                provider: String::new(),
                category: 0,
            },
        }
    }

    #[test]
    fn keys_dense_from_base() {
        let groups = vec![group(1, &[1, 2, 3]), group(2, &[4, 5])];
        let keyed = assign(&groups, &mut KeySequence::new());
        let refs: Vec<u64> = keyed.iter().map(|k| k.reference_key).collect();
        let parents: Vec<u64> = keyed.iter().map(|k| k.parent_key).collect();
        assert_eq!(refs, vec![120991, 120992, 120993, 120994, 120995]);
        assert_eq!(parents, vec![0, 120991, 120991, 0, 120994]);
    }

    #[test]
    fn singletons_all_root() {
        let groups = vec![group(1, &[1]), group(2, &[2]), group(3, &[3])];
        let keyed = assign(&groups, &mut KeySequence::new());
        assert!(keyed.iter().all(|k| k.parent_key == ROOT_PARENT));
    }

    #[test]
    fn sequence_is_threaded_not_global() {
        let groups = vec![group(1, &[1, 2])];
        let mut seq = KeySequence::new();
        assign(&groups, &mut seq);
        assert_eq!(seq.peek(), KEY_BASE + 2);

        // A fresh run starts over.
        let again = assign(&groups, &mut KeySequence::new());
        assert_eq!(again[0].reference_key, KEY_BASE);
    }
}
