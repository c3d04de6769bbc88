use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::models::{read_csv, read_csv_headers, write_csv, CategorizedCompany, ValidatedCompany};
use crate::providers::openai::{build_messages, ChatMessage, OpenAiClient};
use crate::taxonomy::by_code;
use crate::util::cache::JsonFileCache;

/// Row answer when the LLM could not be reached for one of its strategies.
pub const ROW_ERROR_ANSWER: &str = "Error in OpenAI response";

/// Anything that can answer a chat prompt.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn answer(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[async_trait]
impl Validator for OpenAiClient {
    async fn answer(&self, messages: &[ChatMessage]) -> Result<String> {
        self.complete(messages).await
    }
}

pub fn cache_key(company: &str, city: &str, country: &str, code: &str) -> String {
    format!("{company}_{city}_{country}_{code}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub rows: usize,
    pub requests: usize,
    pub cache_hits: usize,
    pub failed_rows: usize,
}

struct Session<'a> {
    llm: &'a dyn Validator,
    cache: &'a mut JsonFileCache<String>,
    delay: Duration,
    summary: ValidationSummary,
}

impl Session<'_> {
    async fn answer_row(&mut self, row: &CategorizedCompany) -> Result<String> {
        let city = row.city.as_deref().unwrap_or_default();
        let country = row.country.as_deref().unwrap_or_default();
        let mut answers = Vec::new();
        for (code, _name) in row.strategy_pairs() {
            let Some(strategy) = by_code(&code) else {
                error!(%code, company = %row.company_name, "strategy code is not valid");
                answers.push(format!("Invalid strategy code: {code}"));
                continue;
            };
            let key = cache_key(&row.company_name, city, country, &code);
            if let Some(cached) = self.cache.get(&key) {
                info!(company = %row.company_name, %code, "using cached response");
                self.summary.cache_hits += 1;
                answers.push(cached.clone());
                continue;
            }

            let messages = build_messages(
                &row.company_name,
                city,
                country,
                &row.short_description,
                strategy,
            );
            info!(company = %row.company_name, %code, "sending validation request");
            self.summary.requests += 1;
            let answer = self.llm.answer(&messages).await?;
            self.cache.insert(key, answer.clone());
            if let Err(err) = self.cache.save() {
                warn!(%err, "could not persist LLM cache");
            }
            answers.push(answer);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        Ok(answers.join(" | "))
    }
}

/// Ask the LLM about every (company, strategy) pair in the categorized CSV and
/// write the answers next to each row.
///
/// Returns `Ok(None)` without writing anything when required columns are
/// missing from the input.
pub async fn run(
    llm: &dyn Validator,
    input: &Path,
    output: &Path,
    cache: &mut JsonFileCache<String>,
    delay: Duration,
) -> Result<Option<ValidationSummary>> {
    info!(path = %input.display(), "loading categorized companies");
    let headers = read_csv_headers(input)?;
    let missing: Vec<&str> = CategorizedCompany::REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h == c))
        .collect();
    if !missing.is_empty() {
        error!(?missing, "missing required columns");
        return Ok(None);
    }
    let rows: Vec<CategorizedCompany> = read_csv(input)?;

    let mut session = Session {
        llm,
        cache: &mut *cache,
        delay,
        summary: ValidationSummary::default(),
    };
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let answer = match session.answer_row(&row).await {
            Ok(answer) => answer,
            Err(err) => {
                error!(company = %row.company_name, %err, "error processing row");
                session.summary.failed_rows += 1;
                ROW_ERROR_ANSWER.to_string()
            }
        };
        out.push(ValidatedCompany::new(row, answer));
    }
    let mut summary = session.summary;
    summary.rows = out.len();

    write_csv(output, &out)?;
    info!(path = %output.display(), rows = out.len(), "saved LLM responses");
    cache.save()?;
    info!(
        requests = summary.requests,
        cache_hits = summary.cache_hits,
        failed_rows = summary.failed_rows,
        "validation job complete"
    );
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CsvRow;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Validator for Scripted {
        async fn answer(&self, messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &messages[1].content;
            if prompt.contains("'Broken Co'") {
                return Err(anyhow!("upstream 500"));
            }
            if prompt.contains("'Refurbish'") {
                Ok("R5: Refurbish".into())
            } else {
                Ok("Disagree, not applicable.".into())
            }
        }
    }

    fn row(name: &str, codes: &str, names: &str) -> CategorizedCompany {
        CategorizedCompany {
            company_name: name.into(),
            short_description: "desc".into(),
            strategy_codes: codes.into(),
            strategy_names: names.into(),
            city: Some("Berlin".into()),
            region: None,
            country: Some("Germany".into()),
        }
    }

    #[tokio::test]
    async fn answers_are_cached_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("categorized.csv");
        let output = dir.path().join("validated.csv");
        let cache_path = dir.path().join("openai_cache.json");
        write_csv(
            &input,
            &[
                row("ReTech", "R5, R8", "Refurbish, Recycle"),
                row("Odd", "R42", "Mystery"),
                row("Broken Co", "R3", "Reuse"),
            ],
        )
        .unwrap();

        let llm = Scripted {
            calls: AtomicUsize::new(0),
        };
        let mut cache: JsonFileCache<String> = JsonFileCache::load(&cache_path, None).unwrap();
        let summary = run(&llm, &input, &output, &mut cache, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.failed_rows, 1);

        let out: Vec<ValidatedCompany> = read_csv(&output).unwrap();
        assert_eq!(out[0].openai_answer, "R5: Refurbish | Disagree, not applicable.");
        assert_eq!(out[1].openai_answer, "Invalid strategy code: R42");
        assert_eq!(out[2].openai_answer, ROW_ERROR_ANSWER);

        // second pass: everything that succeeded comes from the cache file
        let mut reloaded: JsonFileCache<String> = JsonFileCache::load(&cache_path, None).unwrap();
        assert!(reloaded.contains(&cache_key("ReTech", "Berlin", "Germany", "R5")));
        let summary = run(&llm, &input, &output, &mut reloaded, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.cache_hits, 2);
        assert_eq!(summary.requests, 1);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn missing_columns_skip_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.csv");
        let output = dir.path().join("validated.csv");
        std::fs::write(&input, "Company_Name,City\nAcme,Berlin\n").unwrap();
        let llm = Scripted {
            calls: AtomicUsize::new(0),
        };
        let mut cache: JsonFileCache<String> =
            JsonFileCache::load(dir.path().join("c.json"), None).unwrap();
        let result = run(&llm, &input, &output, &mut cache, Duration::ZERO)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(!output.exists());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn header_only_input_validates_zero_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("categorized.csv");
        let output = dir.path().join("validated.csv");
        write_csv::<CategorizedCompany>(&input, &[]).unwrap();
        let llm = Scripted {
            calls: AtomicUsize::new(0),
        };
        let mut cache: JsonFileCache<String> =
            JsonFileCache::load(dir.path().join("c.json"), None).unwrap();
        let summary = run(&llm, &input, &output, &mut cache, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.rows, 0);
        assert_eq!(read_csv_headers(&output).unwrap(), ValidatedCompany::HEADER);
    }
}
