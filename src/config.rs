use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::segmenter::classify::{default_rules, CategoryRule};
use crate::segmenter::{ExtractionConfig, GroupingPolicy, RecordDefaults, SegmentError, SimilarityMetric};

pub const DEFAULT_SHINGLE_WIDTH: usize = 3;

/// Engine settings. Every section is optional in the TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub grouping: GroupingPolicy,
    pub similarity: SimilarityConfig,
    pub extraction: ExtractionConfig,
    /// Replaces the built-in table when present. Order matters: first match wins.
    pub categories: Vec<CategoryRule>,
    pub record_defaults: RecordDefaults,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            grouping: GroupingPolicy::default(),
            similarity: SimilarityConfig::default(),
            extraction: ExtractionConfig::default(),
            categories: default_rules(),
            record_defaults: RecordDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub metric: SimilarityMetric,
    /// Words per shingle for the `shingles` metric.
    pub shingle_width: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::default(),
            shingle_width: DEFAULT_SHINGLE_WIDTH,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), SegmentError> {
        let g = &self.grouping;
        for (name, value) in [
            ("grouping.continuation_threshold", g.continuation_threshold),
            ("grouping.continued_threshold", g.continued_threshold),
            ("grouping.header_match_threshold", g.header_match_threshold),
            ("grouping.provider_match_threshold", g.provider_match_threshold),
            ("extraction.header_band", f64::from(self.extraction.header_band)),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SegmentError::Config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if !(1..=3).contains(&g.min_metadata_matches) {
            return Err(SegmentError::Config(format!(
                "grouping.min_metadata_matches must be 1..=3, got {}",
                g.min_metadata_matches
            )));
        }

        let e = &self.extraction;
        if e.header_scan_lines == 0 || e.provider_scan_lines == 0 || e.body_window == 0 {
            return Err(SegmentError::Config("extraction scan windows must be non-zero".into()));
        }
        if self.similarity.shingle_width == 0 {
            return Err(SegmentError::Config("similarity.shingle_width must be non-zero".into()));
        }
        if let Some(rule) = self.categories.iter().find(|r| r.pattern.trim().is_empty()) {
            return Err(SegmentError::Config(format!("category {} has an empty pattern", rule.code)));
        }
        Ok(())
    }
}

/// Reads and validates the config file; no path means built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<SegmenterConfig> {
    let Some(path) = path else {
        return Ok(SegmenterConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: SegmenterConfig =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    config.validate()?;
    Ok(config)
}
