use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Broad classification an incident type belongs to.
///
/// `General` is never a catalog key; it is the fallback for types the
/// catalog does not know about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Medical,
    Fire,
    Police,
    Traffic,
    NaturalDisaster,
    HazardousMaterial,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Medical => "medical",
            Category::Fire => "fire",
            Category::Police => "police",
            Category::Traffic => "traffic",
            Category::NaturalDisaster => "natural_disaster",
            Category::HazardousMaterial => "hazardous_material",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency ranking, P1 (Critical) through P5 (Minimal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

impl Priority {
    /// Numeric rank, 1 = most urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
            Priority::Minimal => 5,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Priority::Critical => "P1",
            Priority::High => "P2",
            Priority::Medium => "P3",
            Priority::Low => "P4",
            Priority::Minimal => "P5",
        }
    }

    /// One step toward Critical. Critical is a ceiling.
    pub fn escalate(&self) -> Priority {
        match self {
            Priority::Critical | Priority::High => Priority::Critical,
            Priority::Medium => Priority::High,
            Priority::Low => Priority::Medium,
            Priority::Minimal => Priority::Low,
        }
    }

    /// The more urgent of the two. Raising never lowers.
    pub fn raise_to(&self, other: Priority) -> Priority {
        if other.rank() < self.rank() {
            other
        } else {
            *self
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Minimal => "Minimal",
        };
        f.write_str(label)
    }
}

/// Everything the catalog knows about one category.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategorySpec {
    pub default_priority: Priority,
    #[serde(default)]
    pub type_priorities: BTreeMap<String, Priority>,
    #[serde(default)]
    pub recommended_roles: Vec<String>,
    #[serde(default)]
    pub auto_deploy: BTreeMap<String, u32>,
}

/// Static, read-only lookup data consumed by the dispatch core: incident
/// types, their categories, base priorities, recommended responder roles,
/// auto-deploy quantities, and the fixed resource inventory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceCatalog {
    pub schema: String,
    pub inventory: BTreeMap<String, u32>,
    pub categories: BTreeMap<Category, CategorySpec>,
}

impl ReferenceCatalog {
    /// The catalog asset compiled into the crate.
    pub fn builtin() -> Self {
        Self::from_json(include_str!("../data/catalog.json"))
            .expect("embedded catalog asset is valid")
    }

    /// Parse and validate a catalog document.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let catalog: ReferenceCatalog = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        validate_catalog(&catalog)?;
        Ok(catalog)
    }

    /// Category a specific incident type belongs to, if the catalog knows it.
    pub fn category_of(&self, incident_type: &str) -> Option<Category> {
        self.categories
            .iter()
            .find(|(_, spec)| spec.type_priorities.contains_key(incident_type))
            .map(|(category, _)| *category)
    }

    /// Base priority for a type: per-type entry, then the category default,
    /// then the global Medium default. Unknown input never fails.
    pub fn base_priority(&self, category: Category, incident_type: &str) -> Priority {
        let Some(spec) = self.categories.get(&category) else {
            return Priority::Medium;
        };
        spec.type_priorities
            .get(incident_type)
            .copied()
            .unwrap_or(spec.default_priority)
    }

    pub fn recommended_roles(&self, category: Category) -> &[String] {
        self.categories
            .get(&category)
            .map(|spec| spec.recommended_roles.as_slice())
            .unwrap_or(&[])
    }

    /// Resource quantities to attempt on dispatch for this category.
    pub fn auto_deploy(&self, category: Category) -> BTreeMap<String, u32> {
        self.categories
            .get(&category)
            .map(|spec| spec.auto_deploy.clone())
            .unwrap_or_default()
    }

    pub fn inventory(&self) -> &BTreeMap<String, u32> {
        &self.inventory
    }
}

pub fn validate_catalog(catalog: &ReferenceCatalog) -> Result<(), String> {
    if catalog.schema != "catalog.v1" {
        return Err(format!("unsupported schema '{}'", catalog.schema));
    }
    if catalog.inventory.is_empty() {
        return Err("inventory is required".into());
    }
    if catalog.categories.is_empty() {
        return Err("at least one category is required".into());
    }
    if catalog.categories.contains_key(&Category::General) {
        return Err("'general' is the fallback category and cannot be cataloged".into());
    }
    for (category, spec) in &catalog.categories {
        for (resource, quantity) in &spec.auto_deploy {
            if !catalog.inventory.contains_key(resource) {
                return Err(format!(
                    "category '{category}' auto-deploys unknown resource '{resource}'"
                ));
            }
            if *quantity == 0 {
                return Err(format!("category '{category}' auto-deploys zero '{resource}'"));
            }
        }
    }
    Ok(())
}
