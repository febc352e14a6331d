use serde::{Deserialize, Serialize};
use tracing::debug;

use super::extract::normalize_header;
use super::page::{GroupId, Page, PageMetadata};
use super::similarity::ContentSimilarity;

/// Tunable boundary policy.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct GroupingPolicy {
    /// Content similarity above this continues the current record.
    pub continuation_threshold: f64,
    /// Same, for pages whose header carries a "(continued)" marker.
    pub continued_threshold: f64,
    /// Anchor metadata agreements (header, dos, provider) needed to continue.
    pub min_metadata_matches: usize,
    /// Header similarity at or above this counts as a partial match.
    pub header_match_threshold: f64,
    /// Provider similarity at or above this counts as a match.
    pub provider_match_threshold: f64,
}

impl Default for GroupingPolicy {
    fn default() -> Self {
        Self {
            continuation_threshold: 0.5,
            continued_threshold: 0.35,
            min_metadata_matches: 2,
            header_match_threshold: 0.85,
            provider_match_threshold: 0.85,
        }
    }
}

/// Which anchor fields the incoming page agreed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetadataMatches {
    pub header: bool,
    pub dos: bool,
    pub provider: bool,
}

impl MetadataMatches {
    pub fn count(&self) -> usize {
        [self.header, self.dos, self.provider]
            .iter()
            .filter(|m| **m)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// First page of a new group with no open group before it.
    Opened,
    ContinuedByContent,
    ContinuedByMetadata,
    /// Exactly one metadata field agreed and content was weak.
    SplitSingleMatch,
    /// Page carried no metadata and content was weak.
    SplitOrphan,
    SplitNoAgreement,
}

impl Verdict {
    pub fn continues(self) -> bool {
        matches!(self, Verdict::ContinuedByContent | Verdict::ContinuedByMetadata)
    }
}

/// Diagnostic record of one boundary decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryDecision {
    pub page: u32,
    pub group: GroupId,
    pub content_score: Option<f64>,
    pub matches: MetadataMatches,
    pub verdict: Verdict,
}

/// A group the grouper will accept no more pages into.
#[derive(Debug, Clone)]
pub struct ClosedGroup {
    pub id: GroupId,
    pub pages: Vec<Page>,
}

struct OpenGroup {
    id: GroupId,
    anchor: PageMetadata,
    pages: Vec<Page>,
}

/// Forward-only state machine that cuts the page stream into groups.
///
/// `push` returns the previous group when the incoming page starts a new one;
/// `finish` closes whatever is left. Decisions are final once made.
pub struct Grouper<'a> {
    policy: GroupingPolicy,
    similarity: &'a dyn ContentSimilarity,
    current: Option<OpenGroup>,
    next_id: u32,
    decisions: Vec<BoundaryDecision>,
}

impl<'a> Grouper<'a> {
    pub fn new(policy: GroupingPolicy, similarity: &'a dyn ContentSimilarity) -> Self {
        Self {
            policy,
            similarity,
            current: None,
            next_id: 1,
            decisions: Vec::new(),
        }
    }

    pub fn push(&mut self, page: Page) -> Option<ClosedGroup> {
        if self.current.is_none() {
            self.open(page, None, MetadataMatches::default(), Verdict::Opened);
            return None;
        }
        let open = self.current.as_mut()?;

        // An open group is never empty.
        let last = open.pages.last()?;
        let score = self.similarity.score(&last.text, &page.text);
        let matches = compare_to_anchor(&open.anchor, &page.meta, &self.policy);
        let verdict = decide(&self.policy, score, matches, &page.meta);

        debug!(
            page = page.number,
            group = open.id.0,
            score,
            header = matches.header,
            dos = matches.dos,
            provider = matches.provider,
            ?verdict,
            "boundary decision"
        );

        if verdict.continues() {
            self.decisions.push(BoundaryDecision {
                page: page.number,
                group: open.id,
                content_score: Some(score),
                matches,
                verdict,
            });
            let mut page = page;
            page.group = Some(open.id);
            open.pages.push(page);
            return None;
        }

        let closed = self.close();
        self.open(page, Some(score), matches, verdict);
        closed
    }

    pub fn finish(mut self) -> (Option<ClosedGroup>, Vec<BoundaryDecision>) {
        let closed = self.close();
        (closed, self.decisions)
    }

    fn open(&mut self, mut page: Page, score: Option<f64>, matches: MetadataMatches, verdict: Verdict) {
        let id = GroupId(self.next_id);
        self.next_id += 1;
        page.group = Some(id);
        self.decisions.push(BoundaryDecision {
            page: page.number,
            group: id,
            content_score: score,
            matches,
            verdict,
        });
        self.current = Some(OpenGroup {
            id,
            anchor: page.meta.clone(),
            pages: vec![page],
        });
    }

    fn close(&mut self) -> Option<ClosedGroup> {
        self.current.take().map(|open| ClosedGroup {
            id: open.id,
            pages: open.pages,
        })
    }
}

fn decide(policy: &GroupingPolicy, score: f64, matches: MetadataMatches, meta: &PageMetadata) -> Verdict {
    let threshold = if meta.continued {
        policy.continued_threshold
    } else {
        policy.continuation_threshold
    };
    if score > threshold {
        return Verdict::ContinuedByContent;
    }
    if meta.is_empty() {
        return Verdict::SplitOrphan;
    }
    match matches.count() {
        n if n >= policy.min_metadata_matches => Verdict::ContinuedByMetadata,
        1 => Verdict::SplitSingleMatch,
        _ => Verdict::SplitNoAgreement,
    }
}

/// Missing values on either side never count as agreement.
pub fn compare_to_anchor(anchor: &PageMetadata, page: &PageMetadata, policy: &GroupingPolicy) -> MetadataMatches {
    MetadataMatches {
        header: headers_match(&anchor.header, &page.header, policy.header_match_threshold),
        dos: matches!((anchor.dos, page.dos), (Some(a), Some(b)) if a == b),
        provider: fuzzy_equal(&anchor.provider, &page.provider, policy.provider_match_threshold),
    }
}

fn headers_match(a: &str, b: &str, threshold: f64) -> bool {
    let a = normalize_header(a).0.to_uppercase();
    let b = normalize_header(b).0.to_uppercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    // Partial match: "LABORATORY REPORT" inside "LABORATORY REPORT - HEMATOLOGY".
    if short.split_whitespace().count() >= 2 && long.contains(short.as_str()) {
        return true;
    }
    strsim::normalized_levenshtein(&a, &b) >= threshold
}

fn fuzzy_equal(a: &str, b: &str, threshold: f64) -> bool {
    let a = squash_upper(a);
    let b = squash_upper(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || strsim::normalized_levenshtein(&a, &b) >= threshold
}

fn squash_upper(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}
