pub mod classify;
pub mod error;
pub mod extract;
pub mod group;
pub mod keys;
pub mod page;
pub mod reconcile;
pub mod record;
pub mod similarity;
pub mod verify;

use tracing::{debug, info};

use crate::config::SegmenterConfig;

pub use classify::{CategoryCode, CategoryRule, CategoryTable, UNCLASSIFIED};
pub use error::SegmentError;
pub use extract::{ExtractionConfig, MetadataExtractor};
pub use group::{BoundaryDecision, GroupingPolicy, Grouper, Verdict};
pub use keys::{KeySequence, KEY_BASE};
pub use page::{GroupId, Page, PageMetadata, PositionHints, SourceDocument, SourcePage};
pub use reconcile::{Consensus, Group, Reconciler};
pub use record::{PageRecord, RecordDefaults};
pub use similarity::{ContentSimilarity, SimilarityMetric};

/// Everything one run over a document produces.
#[derive(Debug)]
pub struct Segmentation {
    pub groups: Vec<Group>,
    pub records: Vec<PageRecord>,
    pub decisions: Vec<BoundaryDecision>,
}

/// Immutable, shareable engine. Every call to [`Segmenter::segment`] owns its
/// own grouper state and key sequence.
pub struct Segmenter {
    extractor: MetadataExtractor,
    categories: CategoryTable,
    similarity: Box<dyn ContentSimilarity>,
    policy: GroupingPolicy,
    defaults: RecordDefaults,
}

impl Segmenter {
    pub fn new(config: &SegmenterConfig) -> Result<Self, SegmentError> {
        config.validate()?;
        Ok(Self {
            extractor: MetadataExtractor::new(config.extraction),
            categories: CategoryTable::new(&config.categories, config.extraction.body_window)?,
            similarity: config.similarity.metric.scorer(config.similarity.shingle_width),
            policy: config.grouping,
            defaults: config.record_defaults.clone(),
        })
    }

    pub fn segment(&self, doc: &SourceDocument) -> Result<Segmentation, SegmentError> {
        check_page_sequence(&doc.pages)?;

        let mut grouper = Grouper::new(self.policy, self.similarity.as_ref());
        let mut reconciler = Reconciler::default();
        let mut groups = Vec::new();

        for source in &doc.pages {
            let meta = self.extractor.extract(&source.text, source.layout.as_ref());
            let category = self.categories.classify(&meta.header, &source.text);
            debug!(
                page = source.page_number,
                header = %meta.header,
                dos = ?meta.dos,
                provider = %meta.provider,
                category,
                "page metadata"
            );
            let page = Page::new(source.page_number, source.text.as_str(), meta).with_category(category);
            if let Some(closed) = grouper.push(page) {
                groups.push(reconciler.reconcile(closed));
            }
        }
        let (last, decisions) = grouper.finish();
        if let Some(closed) = last {
            groups.push(reconciler.reconcile(closed));
        }

        let mut keys = KeySequence::new();
        let keyed = keys::assign(&groups, &mut keys);
        verify::verify_partition(&keyed, doc.pages.len())?;

        let records = keyed
            .iter()
            .map(|k| PageRecord::new(k, &self.defaults))
            .collect();

        let unclassified = groups
            .iter()
            .filter(|g| g.consensus.category == UNCLASSIFIED)
            .count();
        info!(
            source = %doc.source,
            pages = doc.pages.len(),
            groups = groups.len(),
            unclassified,
            "segmented document"
        );

        Ok(Segmentation {
            groups,
            records,
            decisions,
        })
    }
}

/// Pages must arrive numbered `1..=n` in order.
fn check_page_sequence(pages: &[SourcePage]) -> Result<(), SegmentError> {
    if pages.is_empty() {
        return Err(SegmentError::EmptyDocument);
    }
    for (position, page) in pages.iter().enumerate() {
        let expected = position as u32 + 1;
        if page.page_number != expected {
            return Err(SegmentError::PageSequence {
                position,
                expected,
                found: page.page_number,
            });
        }
    }
    Ok(())
}
