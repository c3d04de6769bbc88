use std::path::Path;

use anyhow::Result;
use itertools::Itertools;
use tracing::info;

use crate::categorization::{categorize_record, to_categorized_row};
use crate::models::{read_csv, write_csv, CategorizedCompany, CompanyRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub total: usize,
    pub categorized: usize,
    pub multi_strategy: usize,
}

/// Categorize every fetched company and write the ones that matched at least
/// one strategy (with their address) to `output`.
pub fn run(input: &Path, output: &Path) -> Result<AnalysisSummary> {
    info!(path = %input.display(), "loading fetched companies");
    let records: Vec<CompanyRecord> = read_csv(input)?;

    let mut rows: Vec<CategorizedCompany> = Vec::new();
    let mut multi_strategy = 0;
    for record in &records {
        let cat = categorize_record(record);
        if cat.count() > 1 {
            multi_strategy += 1;
        }
        if !cat.is_uncategorized() {
            rows.push(to_categorized_row(record, &cat));
        }
    }
    info!(count = multi_strategy, "entries with more than one strategy");

    let per_code = rows.iter().flat_map(|r| r.codes()).counts();
    for (code, n) in per_code.iter().sorted() {
        info!(%code, companies = n, "strategy matches");
    }

    write_csv(output, &rows)?;
    info!(path = %output.display(), rows = rows.len(), "saved categorized companies");

    Ok(AnalysisSummary {
        total: records.len(),
        categorized: rows.len(),
        multi_strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(name: &str, desc: Option<&str>, city: &str) -> CompanyRecord {
        CompanyRecord {
            partition_date: "2024-05-01 10:00:00.000000".into(),
            name: name.into(),
            uuid: format!("uuid-{name}"),
            short_description: desc.map(str::to_string),
            city: Some(city.into()),
            country: Some("Germany".into()),
            ..Default::default()
        }
    }

    #[test]
    fn uncategorized_companies_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("crunchbase.csv");
        let output = dir.path().join("categorized.csv");
        write_csv(
            &input,
            &[
                company("ReTech", Some("We refurbish used electronics for resale"), "Berlin"),
                company("Ledger", Some("Accounting software"), "Munich"),
                company("Loop", Some("Refill station that recycles packaging"), "Hamburg"),
                company("Ghost", None, "Cologne"),
            ],
        )
        .unwrap();

        let summary = run(&input, &output).unwrap();
        assert_eq!(
            summary,
            AnalysisSummary {
                total: 4,
                categorized: 2,
                multi_strategy: 1
            }
        );

        let rows: Vec<CategorizedCompany> = read_csv(&output).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].company_name, "ReTech");
        assert_eq!(rows[0].strategy_codes, "R5");
        assert_eq!(rows[1].strategy_codes, "R3, R8");
        assert_eq!(rows[1].strategy_names, "Reuse, Recycle");
        assert_eq!(rows[1].city.as_deref(), Some("Hamburg"));
    }
}
