use serde_json::Value;
use tracing::error;

/// City / region / country / continent picked from `location_identifiers`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub continent: Option<String>,
}

/// Parse a `location_identifiers` value.
///
/// Accepts the JSON array the API returns, or the same array rendered as a
/// string with single quotes (as found in older CSV exports). Anything
/// unparsable is logged and yields an empty location.
pub fn parse_locations(raw: &Value) -> Location {
    match raw {
        Value::Null => Location::default(),
        Value::Array(items) => from_items(items),
        Value::String(s) => match serde_json::from_str::<Value>(&s.replace('\'', "\"")) {
            Ok(Value::Array(items)) => from_items(&items),
            Ok(other) => {
                error!(value = %other, "location identifiers are not a list");
                Location::default()
            }
            Err(err) => {
                error!(%err, "error extracting location data");
                Location::default()
            }
        },
        other => {
            error!(value = %other, "location identifiers are not a list");
            Location::default()
        }
    }
}

fn from_items(items: &[Value]) -> Location {
    let pick = |kind: &str| {
        items
            .iter()
            .find(|item| item.get("location_type").and_then(Value::as_str) == Some(kind))
            .and_then(|item| item.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    Location {
        city: pick("city"),
        region: pick("region"),
        country: pick("country"),
        continent: pick("continent"),
    }
}
