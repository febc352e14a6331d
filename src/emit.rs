use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;

use crate::segmenter::PageRecord;

/// CSV to `output`, or stdout when no path is given. Columns follow `PageRecord`'s field order.
pub fn write_csv(records: &[PageRecord], output: Option<&Path>) -> Result<()> {
    let mut writer = csv_writer(output)?;
    write_records(&mut writer, records)?;
    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn write_records<W: Write>(writer: &mut csv::Writer<W>, records: &[PageRecord]) -> Result<()> {
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("Failed to write record for page {}", record.pagenumber))?;
    }
    Ok(())
}

/// Pretty-printed JSON array of records.
pub fn write_json(records: &[PageRecord], output: Option<&Path>) -> Result<()> {
    let mut writer = output_writer(output)?;
    serde_json::to_writer_pretty(&mut writer, records).context("Failed to write JSON output")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn csv_writer(output: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    Ok(WriterBuilder::new().from_writer(output_writer(output)?))
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = if let Some(path) = output {
        Box::new(io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        ))
    } else {
        Box::new(io::stdout())
    };
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::record::COLUMNS;

    fn record(page: u32, parent: u64) -> PageRecord {
        PageRecord {
            pagenumber: page,
            category: 24,
            isreviewable: true,
            dos: "03/14/2024".into(),
            provider: "Dr. Maria Lopez - Riverside Medical Center".into(),
            referencekey: 120990 + page as u64,
            parentkey: parent,
            lockstatus: String::new(),
            header: "LABORATORY REPORT".into(),
            facilitygroup: String::new(),
            reviewerid: None,
            qcreviewerid: Some(322),
            isduplicate: false,
        }
    }

    #[test]
    fn csv_header_is_column_order() {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        write_records(&mut writer, &[record(1, 0), record(2, 120991)]).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "1,24,true,03/14/2024,Dr. Maria Lopez - Riverside Medical Center,120991,0,,LABORATORY REPORT,,,322,false"
        );
        assert!(lines.next().unwrap().starts_with("2,24,"));
    }

    #[test]
    fn csv_and_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![record(1, 0)];

        let csv_path = dir.path().join("out.csv");
        write_csv(&records, Some(&csv_path)).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let back: Vec<PageRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(back, records);

        let json_path = dir.path().join("out.json");
        write_json(&records, Some(&json_path)).unwrap();
        let text = std::fs::read_to_string(&json_path).unwrap();
        let back: Vec<PageRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, records);
    }
}
