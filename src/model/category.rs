use crate::error::{tagged, ErrorType, Res};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The bucket that every category without a mapping falls into.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// What a category represents for the period metrics.
#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Income,
    #[default]
    Expense,
    Saving,
    Investment,
    Uncategorized,
}

serde_plain::derive_display_from_serialize!(CategoryKind);
serde_plain::derive_fromstr_from_deserialize!(CategoryKind);

/// One entry of the category mapping table in `config.json`.
///
/// ```json
/// { "name": "Groceries", "kind": "expense", "aliases": ["supermarket", "food"] }
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// The canonical category name written to the report.
    pub name: String,
    pub kind: CategoryKind,
    /// Other spellings that map to `name`. Matching ignores case and repeated whitespace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl CategoryRule {
    pub fn new<S: Into<String>>(name: S, kind: CategoryKind, aliases: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// The fixed, case-insensitive mapping from raw category text to the closed set of categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryMap {
    rules: Vec<CategoryRule>,
    lookup: HashMap<String, usize>,
}

impl CategoryMap {
    /// Builds the lookup table. Fails if one spelling would map to two different categories.
    pub fn new(rules: &[CategoryRule]) -> Res<Self> {
        let mut lookup = HashMap::new();
        for (ix, rule) in rules.iter().enumerate() {
            if rule.name.trim().is_empty() {
                return Err(tagged(ErrorType::Config, "A category has an empty name"));
            }
            for spelling in std::iter::once(&rule.name).chain(rule.aliases.iter()) {
                let key = fold(spelling);
                if let Some(existing) = lookup.insert(key, ix) {
                    if existing != ix {
                        return Err(tagged(
                            ErrorType::Config,
                            format!(
                                "'{spelling}' maps to both '{}' and '{}'",
                                rules[existing].name, rule.name
                            ),
                        ));
                    }
                }
            }
        }
        Ok(Self {
            rules: rules.to_vec(),
            lookup,
        })
    }

    /// Maps raw cell text onto a canonical category. Unknown text becomes `Uncategorized`.
    pub fn normalize(&self, raw: &str) -> (&str, CategoryKind) {
        match self.lookup.get(&fold(raw)) {
            Some(&ix) => (self.rules[ix].name.as_str(), self.rules[ix].kind),
            None => (UNCATEGORIZED, CategoryKind::Uncategorized),
        }
    }

    #[cfg(test)]
    pub(crate) fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }
}

/// Lowercase with whitespace collapsed, so `" Gas  &  Fuel"` and `"gas & fuel"` match.
pub(crate) fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The mapping table used when `config.json` does not specify one.
pub fn default_rules() -> Vec<CategoryRule> {
    use CategoryKind::*;
    vec![
        CategoryRule::new("Salary", Income, &["paycheck", "payroll", "wages"]),
        CategoryRule::new("Other Income", Income, &["interest", "refund", "bonus", "gift"]),
        CategoryRule::new("Groceries", Expense, &["grocery", "supermarket", "food"]),
        CategoryRule::new("Restaurants", Expense, &["dining", "eating out", "restaurant"]),
        CategoryRule::new("Coffee Shops", Expense, &["coffee", "cafe"]),
        CategoryRule::new("Housing", Expense, &["rent", "mortgage"]),
        CategoryRule::new(
            "Utilities",
            Expense,
            &["electricity", "water", "internet", "phone"],
        ),
        CategoryRule::new(
            "Transport",
            Expense,
            &["gas", "fuel", "gas & fuel", "transportation", "public transport"],
        ),
        CategoryRule::new("Health", Expense, &["medical", "pharmacy", "doctor"]),
        CategoryRule::new("Entertainment", Expense, &["fun", "subscriptions", "hobbies"]),
        CategoryRule::new("Shopping", Expense, &["clothing", "household"]),
        CategoryRule::new("Savings", Saving, &["saving", "emergency fund"]),
        CategoryRule::new("Investments", Investment, &["investing", "stocks", "etf", "brokerage"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_insensitive() {
        let map = CategoryMap::new(&default_rules()).unwrap();
        assert_eq!(map.normalize("groceries"), ("Groceries", CategoryKind::Expense));
        assert_eq!(map.normalize("  GROCERIES "), ("Groceries", CategoryKind::Expense));
        assert_eq!(map.normalize("Gas  &  Fuel"), ("Transport", CategoryKind::Expense));
        assert_eq!(map.normalize("Paycheck"), ("Salary", CategoryKind::Income));
    }

    #[test]
    fn test_unmapped_is_uncategorized() {
        let map = CategoryMap::new(&default_rules()).unwrap();
        assert_eq!(
            map.normalize("Llama grooming"),
            (UNCATEGORIZED, CategoryKind::Uncategorized)
        );
        assert_eq!(map.normalize(""), (UNCATEGORIZED, CategoryKind::Uncategorized));
    }

    #[test]
    fn test_conflicting_alias() {
        let rules = vec![
            CategoryRule::new("Food", CategoryKind::Expense, &["market"]),
            CategoryRule::new("Shopping", CategoryKind::Expense, &["Market"]),
        ];
        let err = CategoryMap::new(&rules).unwrap_err();
        assert!(err.to_string().contains("maps to both 'Food' and 'Shopping'"));
    }

    #[test]
    fn test_alias_repeating_its_own_name_is_fine() {
        let rules = vec![CategoryRule::new("Food", CategoryKind::Expense, &["food"])];
        assert!(CategoryMap::new(&rules).is_ok());
    }

    #[test]
    fn test_empty_map() {
        let map = CategoryMap::new(&[]).unwrap();
        assert_eq!(map.normalize("Groceries").0, UNCATEGORIZED);
    }

    #[test]
    fn test_rule_serde() {
        let json = r#"{ "name": "Groceries", "kind": "expense", "aliases": ["food"] }"#;
        let rule: CategoryRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.kind, CategoryKind::Expense);
        assert_eq!(rule.aliases, vec!["food".to_string()]);
        let no_aliases: CategoryRule =
            serde_json::from_str(r#"{ "name": "Salary", "kind": "income" }"#).unwrap();
        assert!(no_aliases.aliases.is_empty());
    }
}
