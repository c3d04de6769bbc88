//! BigQuery REST v2 implementation of [`Warehouse`].
//!
//! Endpoints used:
//! - GET/POST `projects/{p}/datasets[/{d}]`
//! - GET/POST `projects/{p}/datasets/{d}/tables[/{t}]`
//! - POST `projects/{p}/queries`, polled with GET `queries/{jobId}`
//! - POST `upload/.../jobs?uploadType=multipart` (CSV load), polled with GET `jobs/{jobId}`
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::auth::{ServiceAccountKey, TokenSource};
use super::schema::{SchemaField, EXPIRATION_MS, PARTITION_COLUMN};
use super::{JobError, LoadJob, Row, Warehouse, WarehouseError};
use crate::util::env::env_opt;
use crate::util::http::{build_client, truncate_for_log, USER_AGENT};
use crate::util::retry::{retry, RetryPolicy};

pub const DEFAULT_API_ROOT: &str = "https://bigquery.googleapis.com";
pub const DEFAULT_LOCATION: &str = "europe-west3";

#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub location: String,
    pub api_root: String,
    pub poll_interval: Duration,
}

impl BigQueryConfig {
    pub fn new(project_id: &str, dataset_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            dataset_id: dataset_id.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            api_root: env_opt("BIGQUERY_API_ROOT")
                .unwrap_or_else(|| DEFAULT_API_ROOT.to_string())
                .trim_end_matches('/')
                .to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_api_root(mut self, api_root: &str) -> Self {
        self.api_root = api_root.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub struct BigQueryClient {
    cfg: BigQueryConfig,
    http: Client,
    token: TokenSource,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<JobError>,
    #[serde(default)]
    errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: JobReference,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

impl TableCell {
    fn into_option(self) -> Option<String> {
        match self.v {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

impl BigQueryClient {
    pub fn new(
        cfg: BigQueryConfig,
        token: TokenSource,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = build_client(USER_AGENT, timeout_secs)?;
        Ok(Self {
            cfg,
            http,
            token,
            retry,
        })
    }

    /// Service-account credentials from the `GOOGLE_*` environment fields.
    pub fn from_env(cfg: BigQueryConfig, timeout_secs: u64, retry: RetryPolicy) -> Result<Self> {
        let key = ServiceAccountKey::from_env()
            .context("BigQuery credentials are required for upload")?;
        let token_http = build_client(USER_AGENT, timeout_secs)?;
        Self::new(
            cfg,
            TokenSource::service_account(key, token_http),
            timeout_secs,
            retry,
        )
    }

    fn project_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}",
            self.cfg.api_root, self.cfg.project_id
        )
    }

    fn dataset_url(&self) -> String {
        format!("{}/datasets/{}", self.project_url(), self.cfg.dataset_id)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/tables/{}", self.dataset_url(), table)
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.cfg.api_root, self.cfg.project_id
        )
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let token = self.token.bearer().await?;
        Ok(req.bearer_auth(token).send().await?)
    }

    async fn http_error(op: &'static str, resp: Response) -> anyhow::Error {
        let status = resp.status().as_u16();
        let body = truncate_for_log(resp.text().await.unwrap_or_default(), 800);
        WarehouseError::Http { op, status, body }.into()
    }

    /// GET returning true on 200 and false on 404.
    async fn exists(&self, op: &'static str, url: &str) -> Result<bool> {
        retry(&self.retry, op, move || async move {
            let resp = self.send(self.http.get(url)).await?;
            match resp.status() {
                s if s.is_success() => Ok(true),
                StatusCode::NOT_FOUND => Ok(false),
                _ => Err(Self::http_error(op, resp).await),
            }
        })
        .await
    }

    /// POST a resource; 409 means it already exists and counts as success.
    async fn create(&self, op: &'static str, url: &str, body: &Value) -> Result<()> {
        retry(&self.retry, op, move || async move {
            let resp = self.send(self.http.post(url).json(body)).await?;
            match resp.status() {
                s if s.is_success() => Ok(()),
                StatusCode::CONFLICT => {
                    info!(op, "resource already exists");
                    Ok(())
                }
                _ => Err(Self::http_error(op, resp).await),
            }
        })
        .await
    }

    fn time_partitioning() -> Value {
        json!({
            "type": "HOUR",
            "field": PARTITION_COLUMN,
            "expirationMs": EXPIRATION_MS.to_string(),
        })
    }

    fn load_metadata(&self, job_id: &str, table: &str, schema: &[SchemaField]) -> Value {
        json!({
            "jobReference": {
                "projectId": self.cfg.project_id,
                "jobId": job_id,
                "location": self.cfg.location,
            },
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": self.cfg.project_id,
                        "datasetId": self.cfg.dataset_id,
                        "tableId": table,
                    },
                    "sourceFormat": "CSV",
                    "skipLeadingRows": 1,
                    "writeDisposition": "WRITE_APPEND",
                    "schemaUpdateOptions": ["ALLOW_FIELD_ADDITION"],
                    "autodetect": false,
                    "schema": { "fields": schema },
                    "timePartitioning": Self::time_partitioning(),
                }
            }
        })
    }

    async fn poll_query(&self, mut page: QueryResponse) -> Result<QueryResponse> {
        while !page.job_complete {
            tokio::time::sleep(self.cfg.poll_interval).await;
            let job_id = page.job_reference.job_id.clone();
            let location = page
                .job_reference
                .location
                .clone()
                .unwrap_or_else(|| self.cfg.location.clone());
            let url = format!("{}/queries/{}", self.project_url(), job_id);
            debug!(%job_id, "query not complete yet, polling");
            let resp = self
                .send(self.http.get(&url).query(&[
                    ("location", location.as_str()),
                    ("timeoutMs", "10000"),
                ]))
                .await?;
            if !resp.status().is_success() {
                return Err(Self::http_error("getQueryResults", resp).await);
            }
            page = resp.json().await.context("decoding getQueryResults")?;
        }
        Ok(page)
    }
}

pub(crate) fn multipart_related(boundary: &str, metadata: &Value, csv: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(csv.len() + 1024);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(csv);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl Warehouse for BigQueryClient {
    fn project_id(&self) -> &str {
        &self.cfg.project_id
    }

    fn dataset_id(&self) -> &str {
        &self.cfg.dataset_id
    }

    async fn dataset_exists(&self) -> Result<bool> {
        self.exists("datasets.get", &self.dataset_url()).await
    }

    async fn create_dataset(&self) -> Result<()> {
        let body = json!({
            "datasetReference": {
                "projectId": self.cfg.project_id,
                "datasetId": self.cfg.dataset_id,
            },
            "location": self.cfg.location,
            "defaultTableExpirationMs": EXPIRATION_MS.to_string(),
        });
        let url = format!("{}/datasets", self.project_url());
        self.create("datasets.insert", &url, &body).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.exists("tables.get", &self.table_url(table)).await
    }

    async fn create_table(&self, table: &str, schema: &[SchemaField]) -> Result<()> {
        let body = json!({
            "tableReference": {
                "projectId": self.cfg.project_id,
                "datasetId": self.cfg.dataset_id,
                "tableId": table,
            },
            "schema": { "fields": schema },
            "timePartitioning": Self::time_partitioning(),
        });
        let url = format!("{}/tables", self.dataset_url());
        self.create("tables.insert", &url, &body).await?;
        info!(table = %self.table_id(table), "created table");
        Ok(())
    }

    async fn submit_csv_load(
        &self,
        table: &str,
        schema: &[SchemaField],
        csv: Vec<u8>,
    ) -> Result<LoadJob> {
        // Fixed id across retries so a resubmission after a lost response hits 409.
        let job_id = format!("circular_radar_load_{}", uuid::Uuid::new_v4().simple());
        let boundary = format!("circular_radar_{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &self.load_metadata(&job_id, table, schema), &csv);
        let content_type = format!("multipart/related; boundary={boundary}");
        let url = self.upload_url();
        let (url, body, content_type, job_id) = (&url, &body, content_type.as_str(), job_id.as_str());

        retry(&self.retry, "jobs.insert (load)", move || async move {
            let resp = self
                .send(
                    self.http
                        .post(url)
                        .header(reqwest::header::CONTENT_TYPE, content_type)
                        .body(body.clone()),
                )
                .await?;
            match resp.status() {
                s if s.is_success() => {
                    let job: JobResource = resp.json().await.context("decoding load job")?;
                    Ok(LoadJob {
                        job_id: job.job_reference.job_id,
                        location: job.job_reference.location,
                    })
                }
                StatusCode::CONFLICT => {
                    warn!(%job_id, "load job already submitted");
                    Ok(LoadJob {
                        job_id: job_id.to_string(),
                        location: Some(self.cfg.location.clone()),
                    })
                }
                _ => Err(Self::http_error("jobs.insert", resp).await),
            }
        })
        .await
    }

    async fn wait_for_job(&self, job: &LoadJob) -> Result<Vec<JobError>> {
        let url = format!("{}/jobs/{}", self.project_url(), job.job_id);
        let location = job
            .location
            .clone()
            .unwrap_or_else(|| self.cfg.location.clone());
        loop {
            let resp = self
                .send(self.http.get(&url).query(&[("location", location.as_str())]))
                .await?;
            if !resp.status().is_success() {
                return Err(Self::http_error("jobs.get", resp).await);
            }
            let resource: JobResource = resp.json().await.context("decoding job status")?;
            if resource.status.state == "DONE" {
                let mut errors = resource.status.errors;
                if let Some(fatal) = resource.status.error_result {
                    if !errors.contains(&fatal) {
                        errors.insert(0, fatal);
                    }
                }
                return Ok(errors);
            }
            debug!(job_id = %job.job_id, state = %resource.status.state, "waiting for job");
            tokio::time::sleep(self.cfg.poll_interval).await;
        }
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let url = format!("{}/queries", self.project_url());
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "location": self.cfg.location,
            "timeoutMs": 10000,
        });
        let (url, body) = (&url, &body);
        let first: QueryResponse = retry(&self.retry, "jobs.query", move || async move {
            let resp = self.send(self.http.post(url).json(body)).await?;
            if !resp.status().is_success() {
                return Err(Self::http_error("jobs.query", resp).await);
            }
            resp.json::<QueryResponse>()
                .await
                .map_err(|e| anyhow!("decoding jobs.query response: {e}"))
        })
        .await?;
        let done = self.poll_query(first).await?;
        if !done.errors.is_empty() {
            let message = done
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(WarehouseError::QueryFailed {
                job_id: done.job_reference.job_id,
                message,
            }
            .into());
        }
        Ok(done
            .rows
            .into_iter()
            .map(|row| row.f.into_iter().map(TableCell::into_option).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BigQueryClient {
        BigQueryClient::new(
            BigQueryConfig::new("proj", "ds").with_api_root("http://localhost:1/"),
            TokenSource::Static("t".into()),
            5,
            RetryPolicy::once(),
        )
        .unwrap()
    }

    #[test]
    fn urls_follow_rest_layout() {
        let c = client();
        assert_eq!(
            c.dataset_url(),
            "http://localhost:1/bigquery/v2/projects/proj/datasets/ds"
        );
        assert_eq!(
            c.table_url("Crunchbasedownload"),
            "http://localhost:1/bigquery/v2/projects/proj/datasets/ds/tables/Crunchbasedownload"
        );
        assert_eq!(
            c.upload_url(),
            "http://localhost:1/upload/bigquery/v2/projects/proj/jobs?uploadType=multipart"
        );
        assert_eq!(c.table_id("t"), "proj.ds.t");
    }

    #[test]
    fn load_metadata_appends_csv_with_hour_partitions() {
        let c = client();
        let meta = c.load_metadata("job-1", "t", &crate::warehouse::schema::company_schema());
        let load = &meta["configuration"]["load"];
        assert_eq!(load["writeDisposition"], "WRITE_APPEND");
        assert_eq!(load["skipLeadingRows"], 1);
        assert_eq!(load["autodetect"], false);
        assert_eq!(load["schemaUpdateOptions"][0], "ALLOW_FIELD_ADDITION");
        assert_eq!(load["timePartitioning"]["type"], "HOUR");
        assert_eq!(load["timePartitioning"]["field"], "dwh_partitiondate");
        assert_eq!(meta["jobReference"]["location"], "europe-west3");
    }

    #[test]
    fn multipart_body_has_both_parts() {
        let body = multipart_related("b0", &json!({"k": 1}), b"a,b\n1,2\n");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--b0\r\nContent-Type: application/json"));
        assert!(text.contains("{\"k\":1}"));
        assert!(text.contains("application/octet-stream\r\n\r\na,b\n1,2\n"));
        assert!(text.ends_with("--b0--\r\n"));
    }

    #[test]
    fn null_cells_become_none() {
        let row: TableRow =
            serde_json::from_value(json!({"f": [{"v": "x"}, {"v": null}, {"v": 3}]})).unwrap();
        let cells: Vec<Option<String>> = row.f.into_iter().map(TableCell::into_option).collect();
        assert_eq!(cells, vec![Some("x".into()), None, Some("3".into())]);
    }
}
