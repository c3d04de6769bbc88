use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use serde_json::Value;
use tracing::{info, warn};

use super::client::{CrunchbaseClient, Entity, MAX_PAGE_SIZE};
use super::location::parse_locations;
use super::query::SearchQuery;
use crate::models::{CompanyRecord, PARTITION_FORMAT};

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb
}

/// Fetch every organization matching `query`, following the `after_id`
/// cursor until the reported count is reached.
///
/// A failed count is an error. A zero count returns an empty batch. A page
/// with no entities before the count is reached stops the loop with what has
/// been collected so far.
pub async fn fetch_all(client: &CrunchbaseClient, query: &SearchQuery) -> Result<Vec<CompanyRecord>> {
    let started = Instant::now();
    let count = client.company_count(query).await?;
    info!(count, "companies found");
    if count == 0 {
        return Ok(Vec::new());
    }

    let pb = progress_bar(count);
    let mut entities: Vec<Entity> = Vec::with_capacity(count.min(100_000) as usize);
    while (entities.len() as u64) < count {
        let after_id = entities.last().map(|e| e.uuid.clone());
        let page = client
            .get_data(query, after_id.as_deref(), MAX_PAGE_SIZE)
            .await?;
        if page.entities.is_empty() {
            warn!(
                fetched = entities.len(),
                expected = count,
                "empty page before reaching the reported count, stopping"
            );
            break;
        }
        pb.inc(page.entities.len() as u64);
        entities.extend(page.entities);
    }
    pb.finish_and_clear();

    let records = to_records(entities, Local::now());
    info!(
        rows = records.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fetch finished"
    );
    Ok(records)
}

/// Flatten entities and stamp them all with the same partition timestamp.
pub fn to_records(entities: Vec<Entity>, fetched_at: DateTime<Local>) -> Vec<CompanyRecord> {
    let stamp = fetched_at.naive_local().format(PARTITION_FORMAT).to_string();
    entities
        .into_iter()
        .map(|e| to_record(e, &stamp))
        .collect()
}

fn to_record(entity: Entity, partition_date: &str) -> CompanyRecord {
    let props = &entity.properties;
    let text = |key: &str| props.get(key).and_then(scalar);
    let location = props
        .get("location_identifiers")
        .map(parse_locations)
        .unwrap_or_default();
    let uuid = if entity.uuid.is_empty() {
        text("uuid").unwrap_or_default()
    } else {
        entity.uuid.clone()
    };
    CompanyRecord {
        partition_date: partition_date.to_string(),
        name: text("name").unwrap_or_default(),
        creation_date: text("created_at"),
        entity_type: text("entity_def_id"),
        facebook_link: text("facebook"),
        facet_ids: text("facet_ids"),
        identifier: text("identifier"),
        image_id: text("image_id"),
        image_url: text("image_url"),
        linkedin_link: text("linkedin"),
        permalink: text("permalink"),
        short_description: text("short_description"),
        stock_exchange_symbol: text("stock_exchange_symbol"),
        twitter_link: text("twitter"),
        updated_date: text("updated_at"),
        uuid,
        website_url: text("website_url"),
        city: location.city,
        region: location.region,
        country: location.country,
        continent: location.continent,
    }
}

/// Render a property as a single CSV cell. Link and identifier objects
/// collapse to their `value`; lists are joined with `", "`.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let joined = items.iter().filter_map(scalar).join(", ");
            (!joined.is_empty()).then_some(joined)
        }
        Value::Object(obj) => obj
            .get("value")
            .and_then(scalar)
            .or_else(|| obj.get("permalink").and_then(scalar)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn entity(v: Value) -> Entity {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn entity_properties_flatten_into_columns() {
        let e = entity(json!({
            "uuid": "u-1",
            "properties": {
                "name": "Acme Recycling GmbH",
                "identifier": {"uuid": "u-1", "value": "Acme Recycling", "permalink": "acme"},
                "facebook": {"value": "https://facebook.com/acme"},
                "facet_ids": ["company", "operating"],
                "short_description": "We recycle batteries.",
                "created_at": "2020-01-01T00:00:00Z",
                "location_identifiers": [
                    {"location_type": "city", "value": "Leipzig"},
                    {"location_type": "country", "value": "Germany"}
                ],
                "rank_org": 123
            }
        }));
        let at = Local.with_ymd_and_hms(2024, 5, 1, 10, 11, 12).unwrap();
        let records = to_records(vec![e], at);
        let r = &records[0];
        assert_eq!(r.partition_date, "2024-05-01 10:11:12.000000");
        assert_eq!(r.uuid, "u-1");
        assert_eq!(r.name, "Acme Recycling GmbH");
        assert_eq!(r.identifier.as_deref(), Some("Acme Recycling"));
        assert_eq!(r.facebook_link.as_deref(), Some("https://facebook.com/acme"));
        assert_eq!(r.facet_ids.as_deref(), Some("company, operating"));
        assert_eq!(r.city.as_deref(), Some("Leipzig"));
        assert_eq!(r.country.as_deref(), Some("Germany"));
        assert_eq!(r.region, None);
        assert_eq!(r.twitter_link, None);
    }

    #[test]
    fn whole_batch_shares_one_partition_stamp() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let records = to_records(
            vec![
                entity(json!({"uuid": "a", "properties": {"name": "A"}})),
                entity(json!({"uuid": "b", "properties": {"name": "B"}})),
            ],
            at,
        );
        assert!(records.iter().map(|r| &r.partition_date).all_equal());
    }
}
