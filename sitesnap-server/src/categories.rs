use std::path::Path;

use serde::{Deserialize, Serialize};

/// What a category requires beyond the photo itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryKind {
    #[serde(rename = "photo")]
    Photo,
    #[serde(rename = "photo+serialNumber")]
    PhotoSerialNumber,
    #[serde(rename = "photo+cableLength")]
    PhotoCableLength,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Photo => "photo",
            CategoryKind::PhotoSerialNumber => "photo+serialNumber",
            CategoryKind::PhotoCableLength => "photo+cableLength",
        }
    }
}

/// One required photo category. The catalog is static configuration, not
/// per-job state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTemplate {
    pub id: String,
    pub name: String,
    pub kind: CategoryKind,
}

impl CategoryTemplate {
    /// Completion requires a non-empty serial number for this category.
    pub fn requires_serial_number(&self) -> bool {
        self.kind == CategoryKind::PhotoSerialNumber
    }

    /// The meter reading is collected but informational only; it never
    /// blocks completion.
    pub fn requires_cable(&self) -> bool {
        self.kind == CategoryKind::PhotoCableLength
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    categories: Vec<CategoryTemplate>,
}

/// Ordered list of required photo categories.
#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    categories: Vec<CategoryTemplate>,
}

impl CategoryCatalog {
    pub fn new(categories: Vec<CategoryTemplate>) -> Self {
        Self { categories }
    }

    /// Parse a catalog from TOML:
    ///
    /// ```toml
    /// [[categories]]
    /// id = "equipment-label"
    /// name = "Equipment label"
    /// kind = "photo+serialNumber"
    /// ```
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        let file: CatalogFile = toml::from_str(input)?;
        Ok(Self::new(file.categories))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Built-in catalog for a standard installation job.
    pub fn default_catalog() -> Self {
        Self::new(vec![
            CategoryTemplate {
                id: "site-overview".to_string(),
                name: "Site overview".to_string(),
                kind: CategoryKind::Photo,
            },
            CategoryTemplate {
                id: "equipment-label".to_string(),
                name: "Equipment label".to_string(),
                kind: CategoryKind::PhotoSerialNumber,
            },
            CategoryTemplate {
                id: "cable-run".to_string(),
                name: "Cable run".to_string(),
                kind: CategoryKind::PhotoCableLength,
            },
            CategoryTemplate {
                id: "final-install".to_string(),
                name: "Final installation".to_string(),
                kind: CategoryKind::Photo,
            },
        ])
    }

    pub fn get(&self, id: &str) -> Option<&CategoryTemplate> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryTemplate> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
