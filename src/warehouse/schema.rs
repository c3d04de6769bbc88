use serde::Serialize;

/// Table fetched companies are appended to.
pub const COMPANY_TABLE: &str = "Crunchbasedownload";

/// Hour-partitioning column present in every pipeline table.
pub const PARTITION_COLUMN: &str = "dwh_partitiondate";

/// Thirty days, used for both partition and default table expiration.
pub const EXPIRATION_MS: i64 = 1000 * 60 * 60 * 24 * 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Int64,
    Float64,
    Bool,
    Datetime,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Nullable,
    Required,
}

/// One column in the BigQuery REST representation (`{"name","type","mode"}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
}

impl SchemaField {
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            mode: FieldMode::Nullable,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub const fn datetime(name: &'static str) -> Self {
        Self::new(name, FieldType::Datetime)
    }

    pub const fn required(mut self) -> Self {
        self.mode = FieldMode::Required;
        self
    }
}

/// Columns of the company table, in CSV order.
pub fn company_schema() -> Vec<SchemaField> {
    vec![
        SchemaField::datetime(PARTITION_COLUMN),
        SchemaField::string("Name"),
        SchemaField::string("Creation_Date"),
        SchemaField::string("Entity_Type"),
        SchemaField::string("Facebook_Link"),
        SchemaField::string("Facet_IDs"),
        SchemaField::string("Identifier"),
        SchemaField::string("Image_ID"),
        SchemaField::string("Image_URL"),
        SchemaField::string("LinkedIn_Link"),
        SchemaField::string("Permalink"),
        SchemaField::string("Short_Description"),
        SchemaField::string("Stock_Exchange_Symbol"),
        SchemaField::string("Twitter_Link"),
        SchemaField::string("Updated_Date"),
        SchemaField::string("UUID"),
        SchemaField::string("Website_URL"),
        SchemaField::string("City"),
        SchemaField::string("Region"),
        SchemaField::string("Country"),
        SchemaField::string("Continent"),
    ]
}
