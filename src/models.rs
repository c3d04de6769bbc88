//! Row types written to and read from the reporting CSV files.
//!
//! Column names follow the warehouse schema, which is why the serde renames
//! are not snake_case.
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Format of `dwh_partitiondate` as written to CSV and accepted by BigQuery DATETIME.
pub const PARTITION_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One company as fetched from the search API. Field order is the CSV column
/// order and must match `warehouse::schema::company_schema()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    #[serde(rename = "dwh_partitiondate")]
    pub partition_date: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Creation_Date")]
    pub creation_date: Option<String>,
    #[serde(rename = "Entity_Type")]
    pub entity_type: Option<String>,
    #[serde(rename = "Facebook_Link")]
    pub facebook_link: Option<String>,
    #[serde(rename = "Facet_IDs")]
    pub facet_ids: Option<String>,
    #[serde(rename = "Identifier")]
    pub identifier: Option<String>,
    #[serde(rename = "Image_ID")]
    pub image_id: Option<String>,
    #[serde(rename = "Image_URL")]
    pub image_url: Option<String>,
    #[serde(rename = "LinkedIn_Link")]
    pub linkedin_link: Option<String>,
    #[serde(rename = "Permalink")]
    pub permalink: Option<String>,
    #[serde(rename = "Short_Description")]
    pub short_description: Option<String>,
    #[serde(rename = "Stock_Exchange_Symbol")]
    pub stock_exchange_symbol: Option<String>,
    #[serde(rename = "Twitter_Link")]
    pub twitter_link: Option<String>,
    #[serde(rename = "Updated_Date")]
    pub updated_date: Option<String>,
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "Website_URL")]
    pub website_url: Option<String>,
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "Region")]
    pub region: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
    #[serde(rename = "Continent")]
    pub continent: Option<String>,
}

impl CompanyRecord {
    pub fn partition_timestamp(&self) -> Option<NaiveDateTime> {
        parse_partition_date(&self.partition_date)
    }
}

/// Accepts both the full microsecond form and the plain seconds form.
pub fn parse_partition_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, PARTITION_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// A company that matched at least one strategy, with its address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizedCompany {
    #[serde(rename = "Company_Name")]
    pub company_name: String,
    #[serde(rename = "Short_Description")]
    pub short_description: String,
    #[serde(rename = "RE_Strategy_Codes")]
    pub strategy_codes: String,
    #[serde(rename = "RE_Strategy_Names")]
    pub strategy_names: String,
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "Region")]
    pub region: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
}

impl CategorizedCompany {
    /// Columns the validation and mapping tasks rely on.
    pub const REQUIRED_COLUMNS: [&'static str; 6] = [
        "Company_Name",
        "City",
        "Country",
        "RE_Strategy_Codes",
        "RE_Strategy_Names",
        "Short_Description",
    ];

    /// `(code, name)` pairs in the order they were matched.
    pub fn strategy_pairs(&self) -> Vec<(String, String)> {
        let codes = split_joined(&self.strategy_codes);
        let names = split_joined(&self.strategy_names);
        codes.into_iter().zip(names).collect()
    }

    pub fn codes(&self) -> Vec<String> {
        split_joined(&self.strategy_codes)
    }
}

/// A categorized company plus the LLM verdict for each of its strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCompany {
    #[serde(rename = "Company_Name")]
    pub company_name: String,
    #[serde(rename = "Short_Description")]
    pub short_description: String,
    #[serde(rename = "RE_Strategy_Codes")]
    pub strategy_codes: String,
    #[serde(rename = "RE_Strategy_Names")]
    pub strategy_names: String,
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "Region")]
    pub region: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
    pub openai_answer: String,
}

impl ValidatedCompany {
    pub fn new(row: CategorizedCompany, openai_answer: String) -> Self {
        Self {
            company_name: row.company_name,
            short_description: row.short_description,
            strategy_codes: row.strategy_codes,
            strategy_names: row.strategy_names,
            city: row.city,
            region: row.region,
            country: row.country,
            openai_answer,
        }
    }
}

fn split_joined(raw: &str) -> Vec<String> {
    raw.split(", ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Row types with a fixed column list, so an empty batch still gets a header.
pub trait CsvRow: Serialize {
    const HEADER: &'static [&'static str];
}

impl CsvRow for CompanyRecord {
    const HEADER: &'static [&'static str] = &[
        "dwh_partitiondate",
        "Name",
        "Creation_Date",
        "Entity_Type",
        "Facebook_Link",
        "Facet_IDs",
        "Identifier",
        "Image_ID",
        "Image_URL",
        "LinkedIn_Link",
        "Permalink",
        "Short_Description",
        "Stock_Exchange_Symbol",
        "Twitter_Link",
        "Updated_Date",
        "UUID",
        "Website_URL",
        "City",
        "Region",
        "Country",
        "Continent",
    ];
}

impl CsvRow for CategorizedCompany {
    const HEADER: &'static [&'static str] = &[
        "Company_Name",
        "Short_Description",
        "RE_Strategy_Codes",
        "RE_Strategy_Names",
        "City",
        "Region",
        "Country",
    ];
}

impl CsvRow for ValidatedCompany {
    const HEADER: &'static [&'static str] = &[
        "Company_Name",
        "Short_Description",
        "RE_Strategy_Codes",
        "RE_Strategy_Names",
        "City",
        "Region",
        "Country",
        "openai_answer",
    ];
}

fn write_rows<W, T>(writer: &mut csv::Writer<W>, rows: &[T]) -> Result<()>
where
    W: std::io::Write,
    T: CsvRow,
{
    // serialize only emits the header alongside the first row
    if rows.is_empty() {
        writer.write_record(T::HEADER)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    Ok(())
}

/// Read every row of a headered CSV file.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (idx, row) in reader.deserialize().enumerate() {
        let row: T = row.with_context(|| format!("{} row {}", path.display(), idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Header names of a CSV file, without reading the body.
pub fn read_csv_headers(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}

/// Write rows (with a header) to `path`, creating parent directories.
pub fn write_csv<T: CsvRow>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    write_rows(&mut writer, rows)?;
    writer.flush()?;
    Ok(())
}

/// Serialize rows to in-memory CSV bytes (header included).
pub fn to_csv_bytes<T: CsvRow>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_rows(&mut writer, rows)?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing csv buffer: {}", e.error()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_pairs_follow_joined_columns() {
        let row = CategorizedCompany {
            strategy_codes: "R3, R8".into(),
            strategy_names: "Reuse, Recycle".into(),
            ..Default::default()
        };
        assert_eq!(
            row.strategy_pairs(),
            vec![
                ("R3".to_string(), "Reuse".to_string()),
                ("R8".to_string(), "Recycle".to_string())
            ]
        );
    }

    #[test]
    fn partition_date_accepts_both_precisions() {
        assert!(parse_partition_date("2024-05-01 10:11:12.123456").is_some());
        assert!(parse_partition_date("2024-05-01 10:11:12").is_some());
        assert!(parse_partition_date("yesterday").is_none());
    }

    #[test]
    fn company_csv_header_matches_schema_order() {
        let bytes = to_csv_bytes(&[CompanyRecord::default()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();
        let expected: Vec<&str> = crate::warehouse::schema::company_schema()
            .iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(header.split(',').collect::<Vec<_>>(), expected);
    }

    fn serialized_header<T: CsvRow>(row: T) -> Vec<String> {
        let bytes = to_csv_bytes(&[row]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        text.lines().next().unwrap().split(',').map(str::to_string).collect()
    }

    #[test]
    fn header_constants_match_serialized_columns() {
        assert_eq!(serialized_header(CompanyRecord::default()), CompanyRecord::HEADER);
        assert_eq!(serialized_header(CategorizedCompany::default()), CategorizedCompany::HEADER);
        assert_eq!(serialized_header(ValidatedCompany::default()), ValidatedCompany::HEADER);
    }

    #[test]
    fn empty_batch_still_writes_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crunchbase.csv");
        write_csv::<CompanyRecord>(&path, &[]).unwrap();
        assert_eq!(read_csv_headers(&path).unwrap(), CompanyRecord::HEADER);
        assert!(read_csv::<CompanyRecord>(&path).unwrap().is_empty());
    }

    #[test]
    fn csv_roundtrip_through_disk_keeps_missing_fields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reporting").join("crunchbase.csv");
        let record = CompanyRecord {
            partition_date: "2024-05-01 10:11:12.000000".into(),
            name: "Acme".into(),
            uuid: "u-1".into(),
            city: Some("Berlin".into()),
            ..Default::default()
        };
        write_csv(&path, &[record.clone()]).unwrap();
        let back: Vec<CompanyRecord> = read_csv(&path).unwrap();
        assert_eq!(back, vec![record]);
    }
}
