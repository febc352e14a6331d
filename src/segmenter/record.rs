use serde::{Deserialize, Serialize};

use super::classify::CategoryCode;
use super::keys::KeyedPage;
use super::page::format_dos;

/// Values for the review-workflow columns this engine does not compute.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecordDefaults {
    pub isreviewable: bool,
    pub lockstatus: String,
    pub facilitygroup: String,
    pub reviewerid: Option<u32>,
    pub qcreviewerid: Option<u32>,
    pub isduplicate: bool,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Self {
            isreviewable: true,
            lockstatus: String::new(),
            facilitygroup: String::new(),
            reviewerid: None,
            qcreviewerid: None,
            isduplicate: false,
        }
    }
}

/// One output row. Field order is the column order downstream tools expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub pagenumber: u32,
    pub category: CategoryCode,
    pub isreviewable: bool,
    pub dos: String,
    pub provider: String,
    pub referencekey: u64,
    pub parentkey: u64,
    pub lockstatus: String,
    pub header: String,
    pub facilitygroup: String,
    pub reviewerid: Option<u32>,
    pub qcreviewerid: Option<u32>,
    pub isduplicate: bool,
}

pub const COLUMNS: [&str; 13] = [
    "pagenumber",
    "category",
    "isreviewable",
    "dos",
    "provider",
    "referencekey",
    "parentkey",
    "lockstatus",
    "header",
    "facilitygroup",
    "reviewerid",
    "qcreviewerid",
    "isduplicate",
];

impl PageRecord {
    pub fn new(keyed: &KeyedPage<'_>, defaults: &RecordDefaults) -> Self {
        let page = keyed.page;
        Self {
            pagenumber: page.number,
            category: page.category,
            isreviewable: defaults.isreviewable,
            dos: format_dos(page.meta.dos),
            provider: page.meta.provider.clone(),
            referencekey: keyed.reference_key,
            parentkey: keyed.parent_key,
            lockstatus: defaults.lockstatus.clone(),
            header: page.meta.header.clone(),
            facilitygroup: defaults.facilitygroup.clone(),
            reviewerid: defaults.reviewerid,
            qcreviewerid: defaults.qcreviewerid,
            isduplicate: defaults.isduplicate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::page::{GroupId, Page, PageMetadata};
    use chrono::NaiveDate;

    #[test]
    fn record_from_keyed_page() {
        let page = Page::new(
            3,
            "text",
            PageMetadata {
                header: "Progress Note".into(),
                continued: false,
                dos: NaiveDate::from_ymd_opt(2024, 6, 1),
                provider: "Dr. Who".into(),
            },
        )
        .with_category(16);
        let keyed = KeyedPage {
            page: &page,
            group: GroupId(1),
            reference_key: 120993,
            parent_key: 120991,
        };
        let record = PageRecord::new(&keyed, &RecordDefaults::default());
        assert_eq!(record.pagenumber, 3);
        assert_eq!(record.category, 16);
        assert_eq!(record.dos, "06/01/2024");
        assert_eq!(record.parentkey, 120991);
        assert!(record.isreviewable);
        assert!(!record.isduplicate);
        assert_eq!(record.reviewerid, None);
    }

    #[test]
    fn serialized_field_order_matches_columns() {
        let record = PageRecord {
            pagenumber: 1,
            category: 0,
            isreviewable: true,
            dos: String::new(),
            provider: String::new(),
            referencekey: 120991,
            parentkey: 0,
            lockstatus: String::new(),
            header: String::new(),
            facilitygroup: String::new(),
            reviewerid: None,
            qcreviewerid: None,
            isduplicate: false,
        };
        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        let mut sorted_columns = COLUMNS.to_vec();
        sorted_columns.sort_unstable();
        let mut sorted_keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        sorted_keys.sort_unstable();
        assert_eq!(sorted_keys, sorted_columns);
    }
}
