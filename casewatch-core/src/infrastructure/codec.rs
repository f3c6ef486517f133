// casewatch-core/src/infrastructure/codec.rs
//
// CSV in (source payload -> RawTable) and CSV out (CaseRecord -> snapshot bytes).

use flate2::read::GzDecoder;
use std::borrow::Cow;
use std::io::Read;

use crate::domain::configuration::{ColumnMapping, Compression};
use crate::domain::record::{CaseRecord, QualityFlag, RawRecord, RawTable};
use crate::infrastructure::error::InfrastructureError;

pub const SNAPSHOT_HEADER: [&str; 10] = [
    "region_code",
    "date",
    "confirmed_cases",
    "deaths",
    "population",
    "incidence_per_100k",
    "new_cases",
    "new_deaths",
    "new_cases_avg_7d",
    "quality_flags",
];

/// Undo the transport compression of a source body.
///
/// A body that does not inflate is malformed, same as a broken CSV.
pub fn inflate(body: &[u8], compression: Option<Compression>) -> Result<Cow<'_, [u8]>, InfrastructureError> {
    match compression {
        None => Ok(Cow::Borrowed(body)),
        Some(Compression::Gzip) => {
            let mut decoder = GzDecoder::new(body);
            let mut inflated = Vec::new();
            decoder
                .read_to_end(&mut inflated)
                .map_err(|e| InfrastructureError::MalformedPayload(format!("gzip: {}", e)))?;
            Ok(Cow::Owned(inflated))
        }
    }
}

/// Strict parse of a delimited payload.
///
/// Ragged rows and broken quoting are errors, and so is a header that misses
/// a column the mapping points at. Any of those sends the fetcher to the next
/// source.
pub fn parse_table(body: &[u8], mapping: &ColumnMapping) -> Result<RawTable, InfrastructureError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(body);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut table = RawTable {
        columns,
        records: Vec::new(),
        mapping: mapping.clone(),
    };

    let missing = table.missing_columns();
    if !missing.is_empty() {
        return Err(InfrastructureError::MalformedPayload(format!(
            "header lacks mapped column(s) [{}]",
            missing.join(", ")
        )));
    }

    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        table.records.push(RawRecord {
            line,
            values: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(table)
}

/// Render records in snapshot layout. Absent values are empty fields.
pub fn render_snapshot(records: &[CaseRecord]) -> Result<Vec<u8>, InfrastructureError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(SNAPSHOT_HEADER)?;

    for r in records {
        writer.write_record([
            r.region_code.clone(),
            r.date.format("%Y-%m-%d").to_string(),
            r.confirmed_cases.to_string(),
            r.deaths.to_string(),
            opt_int(r.population),
            opt_float(r.incidence_per_100k),
            opt_int(r.new_cases),
            opt_int(r.new_deaths),
            opt_float(r.new_cases_avg_7d),
            QualityFlag::join(&r.quality_flags),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| InfrastructureError::Io(e.into_error()))
}

fn opt_int(v: Option<i64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_float(v: Option<f64>) -> String {
    v.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const OWID: &str = "iso_code,location,date,total_cases,total_deaths,population\n\
                        BRA,Brazil,2021-01-01,10,1,212559409\n\
                        BRA,Brazil,2021-01-02,12,1,212559409\n";

    #[test]
    fn test_parse_keeps_all_columns_and_lines() {
        let table = parse_table(OWID.as_bytes(), &ColumnMapping::default()).unwrap();
        assert_eq!(table.columns.len(), 6);
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].line, 2);
        assert_eq!(table.records[1].line, 3);
        assert_eq!(table.records[1].values[3], "12");
    }

    #[test]
    fn test_header_only_payload_is_an_empty_table() {
        let body = "iso_code,location,date,total_cases,total_deaths,population\n";
        let table = parse_table(body.as_bytes(), &ColumnMapping::default()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_missing_mapped_column_is_malformed() {
        let body = "location,date,total_cases\nBrazil,2021-01-01,3\n";
        let err = parse_table(body.as_bytes(), &ColumnMapping::default()).unwrap_err();
        match err {
            InfrastructureError::MalformedPayload(msg) => {
                assert!(msg.contains("total_deaths"));
                assert!(msg.contains("population"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Empty body: no header at all.
        assert!(parse_table(b"", &ColumnMapping::default()).is_err());
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let body = format!("{}BRA,Brazil,2021-01-03,15\n", OWID);
        let err = parse_table(body.as_bytes(), &ColumnMapping::default()).unwrap_err();
        assert!(matches!(err, InfrastructureError::Csv(_)));
    }

    #[test]
    fn test_inflate_gzip_then_parse() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(OWID.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let body = inflate(&compressed, Some(Compression::Gzip)).unwrap();
        let table = parse_table(&body, &ColumnMapping::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].values[1], "Brazil");

        assert!(matches!(inflate(OWID.as_bytes(), None).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_plain_body_under_gzip_is_malformed() {
        let err = inflate(OWID.as_bytes(), Some(Compression::Gzip)).unwrap_err();
        assert!(matches!(err, InfrastructureError::MalformedPayload(msg) if msg.starts_with("gzip")));
    }

    #[test]
    fn test_render_snapshot_layout() {
        let mut record = CaseRecord::new(
            "BR",
            NaiveDate::from_ymd_opt(2021, 1, 2).unwrap(),
            12,
            1,
            None,
        );
        record.new_cases = Some(2);
        record.flag(QualityFlag::PopulationUnavailable);
        record.flag(QualityFlag::MissingDateFilled);

        let bytes = render_snapshot(&[record]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], SNAPSHOT_HEADER.join(","));
        assert_eq!(
            lines[1],
            "BR,2021-01-02,12,1,,,2,,,missing_date_filled|population_unavailable"
        );
    }
}
