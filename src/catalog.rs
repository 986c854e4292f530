//! Catalog objects and the catalog schema descriptor.
//!
//! The catalog is owned by the surrounding application; the engine only
//! reads it. Deployments name their columns differently, so the mapping from
//! logical fields to physical columns is an explicit [`SchemaDescriptor`]
//! validated once when a universe is opened.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::ObjectId;
use crate::error::ValidationError;
use crate::params::positive_coefficient;

/// Growth coefficient used when an object does not declare one.
pub const DEFAULT_GROWTH_COEFFICIENT: f64 = 1.02;

/// How speculative the market for an object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speculation {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl Speculation {
    /// Parses a catalog label. Unknown labels map to `Medium`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Très faible" | "Tres faible" | "very_low" => Self::VeryLow,
            "Faible" | "low" => Self::Low,
            "Forte" | "high" => Self::High,
            "Hyper Forte" | "very_high" => Self::VeryHigh,
            _ => Self::Medium,
        }
    }

    /// Annual growth multiplier.
    #[must_use]
    pub const fn factor(self) -> f64 {
        match self {
            Self::VeryLow => 0.95,
            Self::Low => 0.98,
            Self::Medium => 1.00,
            Self::High => 1.08,
            Self::VeryHigh => 1.20,
        }
    }
}

/// How often an object is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageFrequency {
    DailyPlus,
    Daily,
    #[default]
    Average,
    Occasional,
    Rare,
}

impl UsageFrequency {
    /// Parses a catalog label. Unknown labels map to `Average`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Quotidien +" | "Quotidien+" | "daily_plus" => Self::DailyPlus,
            "Quotidien" | "daily" => Self::Daily,
            "Occasionnelle" | "occasional" => Self::Occasional,
            "Rarissime" | "rare" => Self::Rare,
            _ => Self::Average,
        }
    }

    /// Annual growth multiplier.
    #[must_use]
    pub const fn factor(self) -> f64 {
        match self {
            Self::DailyPlus => 0.97,
            Self::Daily => 0.99,
            Self::Average => 1.00,
            Self::Occasional => 1.05,
            Self::Rare => 1.15,
        }
    }
}

/// One row of the object catalog, with numeric cells already normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogObject {
    pub id: ObjectId,
    pub name: String,
    pub price_mean: f64,
    pub price_min: f64,
    pub price_max: f64,
    pub revenue: f64,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub object_type: String,
    #[serde(default)]
    pub speculation: Speculation,
    #[serde(default)]
    pub usage: UsageFrequency,
    /// Expected annual growth, as a multiplier (1.02 = +2 %/year).
    pub growth_coefficient: f64,
}

impl CatalogObject {
    /// Creates an object with a single mean price; min/max follow the mean.
    #[must_use]
    pub fn new(id: ObjectId, name: impl Into<String>, price_mean: f64) -> Self {
        Self {
            id,
            name: name.into(),
            price_mean,
            price_min: price_mean,
            price_max: price_mean,
            revenue: 0.0,
            family: String::new(),
            object_type: String::new(),
            speculation: Speculation::default(),
            usage: UsageFrequency::default(),
            growth_coefficient: DEFAULT_GROWTH_COEFFICIENT,
        }
    }

    #[must_use]
    pub fn with_price_range(mut self, min: f64, max: f64) -> Self {
        self.price_min = min;
        self.price_max = max;
        self
    }

    #[must_use]
    pub fn with_revenue(mut self, revenue: f64) -> Self {
        self.revenue = revenue;
        self
    }

    #[must_use]
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }

    #[must_use]
    pub fn with_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = object_type.into();
        self
    }

    #[must_use]
    pub fn with_growth(mut self, coefficient: f64) -> Self {
        self.growth_coefficient = coefficient;
        self
    }

    #[must_use]
    pub fn with_classifiers(mut self, speculation: Speculation, usage: UsageFrequency) -> Self {
        self.speculation = speculation;
        self.usage = usage;
        self
    }

    /// Yearly price multiplier: expected growth adjusted by the speculation
    /// and usage factors. Never zero or negative.
    #[must_use]
    pub fn annual_price_coefficient(&self) -> f64 {
        positive_coefficient(
            positive_coefficient(self.growth_coefficient)
                * self.speculation.factor()
                * self.usage.factor(),
        )
    }
}

/// Logical catalog fields the engine knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogField {
    Id,
    Name,
    PriceMean,
    PriceMin,
    PriceMax,
    Revenue,
    Family,
    ObjectType,
    Speculation,
    Usage,
    Growth,
}

impl CatalogField {
    const ALL: [Self; 11] = [
        Self::Id,
        Self::Name,
        Self::PriceMean,
        Self::PriceMin,
        Self::PriceMax,
        Self::Revenue,
        Self::Family,
        Self::ObjectType,
        Self::Speculation,
        Self::Usage,
        Self::Growth,
    ];

    /// Column names this field is known under, in priority order.
    #[must_use]
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Id => &["id"],
            Self::Name => &["objet", "nom", "name"],
            Self::PriceMean => &["prix_moyen", "prix_moyen_actuel", "prixmoyen", "prix"],
            Self::PriceMin => &["prix_min", "prix_min_eur", "min", "prixmin"],
            Self::PriceMax => &["prix_max", "prix_max_eur", "max", "prixmax"],
            Self::Revenue => &["ca", "ca_2025_2035_mdeur", "chiffre_affaires", "chiffreaffaires"],
            Self::Family => &["famille"],
            Self::ObjectType => &["type"],
            Self::Speculation => &["speculation"],
            Self::Usage => &["taux_utilisation", "utilisation"],
            Self::Growth => &["coef_aug_prev", "coef_augmentation", "coef"],
        }
    }
}

impl fmt::Display for CatalogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::PriceMean => "price_mean",
            Self::PriceMin => "price_min",
            Self::PriceMax => "price_max",
            Self::Revenue => "revenue",
            Self::Family => "family",
            Self::ObjectType => "type",
            Self::Speculation => "speculation",
            Self::Usage => "usage",
            Self::Growth => "growth",
        };
        f.write_str(name)
    }
}

/// Physical layout of the catalog table.
///
/// `id` and `name` are mandatory; every other field is optional and falls
/// back to a documented default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub table: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price_mean: Option<String>,
    #[serde(default)]
    pub price_min: Option<String>,
    #[serde(default)]
    pub price_max: Option<String>,
    #[serde(default)]
    pub revenue: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub speculation: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub growth: Option<String>,
}

impl SchemaDescriptor {
    /// Default catalog table name.
    pub const DEFAULT_TABLE: &'static str = "stat_objects";

    /// Creates a descriptor with only the mandatory columns.
    #[must_use]
    pub fn new(table: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            name: name.into(),
            price_mean: None,
            price_min: None,
            price_max: None,
            revenue: None,
            family: None,
            object_type: None,
            speculation: None,
            usage: None,
            growth: None,
        }
    }

    /// Builds a descriptor from the physical column list of `table`, matching
    /// the known aliases case-insensitively.
    ///
    /// # Errors
    /// `InvalidSchema` when no id or name column can be found.
    pub fn discover<S: AsRef<str>>(
        table: impl Into<String>,
        columns: &[S],
    ) -> Result<Self, ValidationError> {
        let table = table.into();
        let pick = |field: CatalogField| -> Option<String> {
            field.aliases().iter().find_map(|alias| {
                columns
                    .iter()
                    .map(AsRef::as_ref)
                    .find(|c| c.eq_ignore_ascii_case(alias))
                    .map(str::to_string)
            })
        };

        let id = pick(CatalogField::Id).ok_or_else(|| ValidationError::InvalidSchema {
            reason: format!("table '{table}' has no id column"),
        })?;
        let name = pick(CatalogField::Name).ok_or_else(|| ValidationError::InvalidSchema {
            reason: format!("table '{table}' has no name column (objet/nom/name)"),
        })?;

        let mut descriptor = Self::new(table, id, name);
        descriptor.price_mean = pick(CatalogField::PriceMean);
        descriptor.price_min = pick(CatalogField::PriceMin);
        descriptor.price_max = pick(CatalogField::PriceMax);
        descriptor.revenue = pick(CatalogField::Revenue);
        descriptor.family = pick(CatalogField::Family);
        descriptor.object_type = pick(CatalogField::ObjectType);
        descriptor.speculation = pick(CatalogField::Speculation);
        descriptor.usage = pick(CatalogField::Usage);
        descriptor.growth = pick(CatalogField::Growth);
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Returns the column mapped to `field`, if any.
    #[must_use]
    pub fn column(&self, field: CatalogField) -> Option<&str> {
        match field {
            CatalogField::Id => Some(&self.id),
            CatalogField::Name => Some(&self.name),
            CatalogField::PriceMean => self.price_mean.as_deref(),
            CatalogField::PriceMin => self.price_min.as_deref(),
            CatalogField::PriceMax => self.price_max.as_deref(),
            CatalogField::Revenue => self.revenue.as_deref(),
            CatalogField::Family => self.family.as_deref(),
            CatalogField::ObjectType => self.object_type.as_deref(),
            CatalogField::Speculation => self.speculation.as_deref(),
            CatalogField::Usage => self.usage.as_deref(),
            CatalogField::Growth => self.growth.as_deref(),
        }
    }

    /// Mapped `(field, column)` pairs, mandatory fields first.
    #[must_use]
    pub fn mapped(&self) -> Vec<(CatalogField, &str)> {
        CatalogField::ALL
            .iter()
            .filter_map(|f| self.column(*f).map(|c| (*f, c)))
            .collect()
    }

    /// Checks that every mapped identifier is usable.
    ///
    /// # Errors
    /// `InvalidSchema` on an empty table/column name or a column mapped twice.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.trim().is_empty() {
            return Err(ValidationError::InvalidSchema {
                reason: "table name is empty".to_string(),
            });
        }
        let mapped = self.mapped();
        for (field, column) in &mapped {
            if column.trim().is_empty() {
                return Err(ValidationError::InvalidSchema {
                    reason: format!("column for '{field}' is empty"),
                });
            }
        }
        for (i, (field, column)) in mapped.iter().enumerate() {
            if let Some((other, _)) = mapped[i + 1..]
                .iter()
                .find(|(_, c)| c.eq_ignore_ascii_case(column))
            {
                return Err(ValidationError::InvalidSchema {
                    reason: format!("column '{column}' is mapped to both '{field}' and '{other}'"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_labels_map_to_factors() {
        assert_eq!(Speculation::from_label("Très faible").factor(), 0.95);
        assert_eq!(Speculation::from_label("Hyper Forte").factor(), 1.20);
        assert_eq!(Speculation::from_label("???").factor(), 1.00);
        assert_eq!(UsageFrequency::from_label("Quotidien +").factor(), 0.97);
        assert_eq!(UsageFrequency::from_label("Rarissime").factor(), 1.15);
        assert_eq!(UsageFrequency::from_label("").factor(), 1.00);
    }

    #[test]
    fn annual_coefficient_combines_factors() {
        let obj = CatalogObject::new(ObjectId::new(1), "gold", 100.0)
            .with_growth(1.05)
            .with_classifiers(Speculation::High, UsageFrequency::Rare);
        let expected = 1.05 * 1.08 * 1.15;
        assert!((obj.annual_price_coefficient() - expected).abs() < 1e-12);
    }

    #[test]
    fn non_positive_growth_is_a_no_op() {
        let obj = CatalogObject::new(ObjectId::new(1), "x", 10.0).with_growth(0.0);
        assert_eq!(obj.annual_price_coefficient(), 1.0);
        let obj = obj.with_growth(-3.0);
        assert_eq!(obj.annual_price_coefficient(), 1.0);
    }

    #[test]
    fn discover_matches_known_aliases() {
        let cols = ["ID", "Objet", "Prix_Moyen_Actuel", "Famille", "Type", "CA_2025_2035_MDEUR"];
        let d = SchemaDescriptor::discover("stat_objects", &cols).unwrap();
        assert_eq!(d.id, "ID");
        assert_eq!(d.name, "Objet");
        assert_eq!(d.price_mean.as_deref(), Some("Prix_Moyen_Actuel"));
        assert_eq!(d.revenue.as_deref(), Some("CA_2025_2035_MDEUR"));
        assert_eq!(d.family.as_deref(), Some("Famille"));
        assert!(d.price_min.is_none());
    }

    #[test]
    fn discover_fails_fast_without_name_column() {
        let err = SchemaDescriptor::discover("stat_objects", &["id", "prix"]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSchema { .. }));
        assert!(err.to_string().contains("name column"));
    }

    #[test]
    fn validate_rejects_duplicate_mapping() {
        let mut d = SchemaDescriptor::new("t", "id", "nom");
        d.price_mean = Some("NOM".to_string());
        assert!(d.validate().is_err());
    }
}
