use crate::models::{CategorizedCompany, CompanyRecord};
use crate::taxonomy::{Strategy, STRATEGIES, UNCATEGORIZED};

/// Strategies matched for one company description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorization {
    pub matched: Vec<&'static Strategy>,
}

impl Categorization {
    pub fn codes(&self) -> Vec<&'static str> {
        self.matched.iter().map(|s| s.code).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.matched.iter().map(|s| s.name).collect()
    }

    pub fn count(&self) -> usize {
        self.matched.len()
    }

    pub fn is_uncategorized(&self) -> bool {
        self.matched.is_empty()
    }

    /// `"R3, R8"` or `"Uncategorized"`.
    pub fn codes_label(&self) -> String {
        if self.is_uncategorized() {
            UNCATEGORIZED.to_string()
        } else {
            self.codes().join(", ")
        }
    }

    /// `"Reuse, Recycle"` or `"Uncategorized"`.
    pub fn names_label(&self) -> String {
        if self.is_uncategorized() {
            UNCATEGORIZED.to_string()
        } else {
            self.names().join(", ")
        }
    }
}

/// Match a free-text description against the given strategies.
///
/// A strategy matches when its lowercase name or any of its keywords occurs as
/// a substring of the lowercased description. Results keep taxonomy order.
pub fn categorize_with(description: &str, strategies: &'static [Strategy]) -> Categorization {
    let text = description.to_lowercase();
    let matched = strategies
        .iter()
        .filter(|s| {
            text.contains(&s.name.to_lowercase()) || s.keywords.iter().any(|kw| text.contains(kw))
        })
        .collect();
    Categorization { matched }
}

/// Match against the built-in 9R taxonomy.
pub fn categorize(description: &str) -> Categorization {
    categorize_with(description, &STRATEGIES)
}

/// Categorize a fetched company; a missing description is uncategorized.
pub fn categorize_record(record: &CompanyRecord) -> Categorization {
    categorize(record.short_description.as_deref().unwrap_or_default())
}

/// Build the reporting row for a categorized company.
pub fn to_categorized_row(record: &CompanyRecord, cat: &Categorization) -> CategorizedCompany {
    CategorizedCompany {
        company_name: record.name.clone(),
        short_description: record.short_description.clone().unwrap_or_default(),
        strategy_codes: cat.codes_label(),
        strategy_names: cat.names_label(),
        city: record.city.clone(),
        region: record.region.clone(),
        country: record.country.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refurbished_electronics_match_only_refurbish() {
        let cat = categorize("we refurbish used electronics for resale");
        assert_eq!(cat.codes(), vec!["R5"]);
        assert_eq!(cat.names_label(), "Refurbish");
        assert_eq!(cat.count(), 1);
    }

    #[test]
    fn categorization_is_deterministic() {
        let text = "Zero waste refill shop that also recycles glass and repairs bikes";
        let first = categorize(text);
        let second = categorize(text);
        assert_eq!(first, second);
        assert_eq!(first.codes(), vec!["R0", "R3", "R4", "R8"]);
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(categorize("RECYCLING of PET bottles").codes(), vec!["R8"]);
    }

    #[test]
    fn no_match_is_uncategorized() {
        let cat = categorize("cloud accounting software for small businesses");
        assert!(cat.is_uncategorized());
        assert_eq!(cat.codes_label(), "Uncategorized");
        assert_eq!(cat.names_label(), "Uncategorized");
        assert_eq!(cat.count(), 0);
    }

    #[test]
    fn substring_collisions_are_accepted() {
        // "recovery" contains "recover" even in an unrelated sense.
        assert_eq!(categorize("data recovery services").codes(), vec!["R9"]);
    }

    #[test]
    fn missing_description_is_uncategorized() {
        let record = CompanyRecord {
            name: "Quiet GmbH".into(),
            ..Default::default()
        };
        let cat = categorize_record(&record);
        assert!(cat.is_uncategorized());
        let row = to_categorized_row(&record, &cat);
        assert_eq!(row.strategy_codes, "Uncategorized");
        assert_eq!(row.short_description, "");
    }
}
