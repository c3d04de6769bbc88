use serde::Serialize;

/// Location UUID for Germany. Europe is `6106f5dc-823e-5da8-40d7-51612c0b2c4e`.
pub const GERMANY_LOCATION_ID: &str = "6085b4bf-b18a-1763-a04e-fdde3f6aba94";

pub const DEFAULT_FIELD_IDS: &[&str] = &[
    "name",
    "created_at",
    "entity_def_id",
    "facebook",
    "facet_ids",
    "identifier",
    "image_id",
    "image_url",
    "linkedin",
    "location_identifiers",
    "permalink",
    "short_description",
    "stock_exchange_symbol",
    "twitter",
    "updated_at",
    "uuid",
    "founded_on",
    "website_url",
    "rank_org",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortOrder {
    pub field_id: String,
    pub sort: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Predicate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub field_id: String,
    pub operator_id: String,
    pub values: Vec<String>,
}

impl Predicate {
    pub fn includes(field_id: &str, values: &[&str]) -> Self {
        Self {
            kind: "predicate",
            field_id: field_id.to_string(),
            operator_id: "includes".to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Organization search body: which fields, in what order, filtered how.
/// `limit` and `after_id` are set per request by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    pub field_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<SortOrder>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<Predicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_id: Option<String>,
}

impl SearchQuery {
    /// Organizations located in `location_id`, ranked by `rank_org` ascending.
    pub fn organizations_in(location_id: &str) -> Self {
        Self {
            field_ids: DEFAULT_FIELD_IDS.iter().map(|f| f.to_string()).collect(),
            order: vec![SortOrder {
                field_id: "rank_org".into(),
                sort: SortDirection::Asc,
            }],
            query: vec![Predicate::includes("location_identifiers", &[location_id])],
            limit: None,
            after_id: None,
        }
    }

    /// Minimal body used to probe credentials.
    pub fn probe() -> Self {
        Self {
            field_ids: vec!["name".into()],
            order: Vec::new(),
            query: Vec::new(),
            limit: Some(1),
            after_id: None,
        }
    }

    /// Copy of this query for one page.
    pub fn page(&self, limit: u32, after_id: Option<&str>) -> Self {
        Self {
            limit: Some(limit),
            after_id: after_id.map(str::to_string),
            ..self.clone()
        }
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::organizations_in(GERMANY_LOCATION_ID)
    }
}
