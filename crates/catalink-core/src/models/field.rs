use serde::{Deserialize, Serialize};

/// Every product field the matcher and merger know about.
///
/// The string form is the canonical key used for confidence maps, JSON
/// output and database columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductField {
    DefaultCode,
    Barcode,
    CodeEan,
    Name,
    Manufacturer,
    ManufacturerRef,
    Category,
    CountryOfOrigin,
    ShortDescription,
    EcommerceDescription,
    FeaturesDescription,
    HsCode,
    Length,
    Width,
    Height,
    Weight,
    ListPrice,
}

impl ProductField {
    pub const ALL: [ProductField; 17] = [
        Self::DefaultCode,
        Self::Barcode,
        Self::CodeEan,
        Self::Name,
        Self::Manufacturer,
        Self::ManufacturerRef,
        Self::Category,
        Self::CountryOfOrigin,
        Self::ShortDescription,
        Self::EcommerceDescription,
        Self::FeaturesDescription,
        Self::HsCode,
        Self::Length,
        Self::Width,
        Self::Height,
        Self::Weight,
        Self::ListPrice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefaultCode => "default_code",
            Self::Barcode => "barcode",
            Self::CodeEan => "code_ean",
            Self::Name => "name",
            Self::Manufacturer => "manufacturer",
            Self::ManufacturerRef => "manufacturer_ref",
            Self::Category => "category",
            Self::CountryOfOrigin => "country_of_origin",
            Self::ShortDescription => "short_description",
            Self::EcommerceDescription => "ecommerce_description",
            Self::FeaturesDescription => "features_description",
            Self::HsCode => "hs_code",
            Self::Length => "length",
            Self::Width => "width",
            Self::Height => "height",
            Self::Weight => "weight",
            Self::ListPrice => "list_price",
        }
    }

    /// Key spellings used by the upstream catalog and extraction pipeline.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::CodeEan => &["Code_EAN"],
            Self::Manufacturer => &["constructeur"],
            Self::ManufacturerRef => &["refConstructeur", "ref_constructeur"],
            Self::Category => &["categ_id"],
            Self::ShortDescription => &["description_courte"],
            Self::EcommerceDescription => &["description_ecommerce"],
            Self::ListPrice => &["lst_price"],
            _ => &[],
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Length | Self::Width | Self::Height | Self::Weight | Self::ListPrice
        )
    }

    pub fn identity(&self) -> Option<IdentityField> {
        match self {
            Self::DefaultCode => Some(IdentityField::DefaultCode),
            Self::Barcode => Some(IdentityField::Barcode),
            Self::CodeEan => Some(IdentityField::CodeEan),
            _ => None,
        }
    }

    /// Resolve a canonical key or one of its aliases.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == key || field.aliases().contains(&key))
    }
}

impl std::fmt::Display for ProductField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| format!("Invalid ProductField: {s}"))
    }
}

/// Fields whose value identifies a physical product; unique in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    DefaultCode,
    Barcode,
    CodeEan,
}

impl IdentityField {
    /// Lookup order when resolving the record a collision refers to.
    pub const PRECEDENCE: [IdentityField; 3] = [Self::DefaultCode, Self::Barcode, Self::CodeEan];

    pub fn field(&self) -> ProductField {
        match self {
            Self::DefaultCode => ProductField::DefaultCode,
            Self::Barcode => ProductField::Barcode,
            Self::CodeEan => ProductField::CodeEan,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.field().as_str()
    }
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IdentityField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductField::from_key(s)
            .and_then(|field| field.identity())
            .ok_or_else(|| format!("Invalid IdentityField: {s}"))
    }
}

/// A single field value, as read from or written to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    /// Blank text and the literal `"null"` left behind by extraction count as absent.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => is_blank_text(s),
            Self::Number(n) => !n.is_finite(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

pub fn is_blank_text(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty() || trimmed == "null"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_keys_and_aliases() {
        assert_eq!(ProductField::from_key("constructeur"), Some(ProductField::Manufacturer));
        assert_eq!(
            ProductField::from_key("refConstructeur"),
            Some(ProductField::ManufacturerRef)
        );
        assert_eq!(ProductField::from_key("Code_EAN"), Some(ProductField::CodeEan));
        assert_eq!(ProductField::from_key("name"), Some(ProductField::Name));
        assert_eq!(ProductField::from_key("colour"), None);
    }

    #[test]
    fn test_every_field_roundtrips_through_its_key() {
        for field in ProductField::ALL {
            assert_eq!(field.as_str().parse::<ProductField>().unwrap(), field);
        }
    }

    #[test]
    fn test_identity_field_from_str() {
        assert_eq!("barcode".parse::<IdentityField>().unwrap(), IdentityField::Barcode);
        assert_eq!("Code_EAN".parse::<IdentityField>().unwrap(), IdentityField::CodeEan);
        assert!("name".parse::<IdentityField>().is_err());
    }

    #[test]
    fn test_blank_values() {
        assert!(FieldValue::Text("   ".to_string()).is_blank());
        assert!(FieldValue::Text("null".to_string()).is_blank());
        assert!(FieldValue::Number(f64::NAN).is_blank());
        assert!(!FieldValue::Text("Widget".to_string()).is_blank());
        assert!(!FieldValue::Number(0.0).is_blank());
    }
}
