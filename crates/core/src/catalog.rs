//! Template catalog loading.
//!
//! Each subdirectory of the templates root holds one template: a
//! `template.json` descriptor and a `template.pptx` asset whose placeholder
//! texts carry the slot names.

use crate::{Error, Result, SlotSpec, TemplateDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Descriptor filename inside a template directory.
pub const DESCRIPTOR_FILE: &str = "template.json";

/// Asset filename inside a template directory.
pub const ASSET_FILE: &str = "template.pptx";

/// On-disk descriptor. Fields are optional so missing ones can be reported by name.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    id: Option<String>,
    #[serde(alias = "template_name")]
    name: Option<String>,
    description: Option<String>,
    use_case_examples: Option<Vec<String>>,
    #[serde(alias = "objects")]
    slots: Option<Vec<SlotSpec>>,
}

/// Template metadata shown to the decision service when choosing a layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub use_case_examples: Vec<String>,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    descriptor: TemplateDescriptor,
    asset_path: PathBuf,
}

/// Immutable set of templates keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl TemplateCatalog {
    /// Load every template under `root`.
    ///
    /// Subdirectories holding neither file are skipped. A descriptor missing a
    /// required field, declaring no slots or duplicate slot names, or lacking
    /// its asset file is a [`Error::TemplateSchema`]. Two directories resolving
    /// to one id is a [`Error::DuplicateTemplateId`].
    pub fn load(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::TemplateSchema {
                template: root.display().to_string(),
                reason: "templates directory not found".to_string(),
            });
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        let mut catalog = Self::default();
        for dir in dirs {
            let descriptor_path = dir.join(DESCRIPTOR_FILE);
            let asset_path = dir.join(ASSET_FILE);
            if !descriptor_path.is_file() {
                if asset_path.is_file() {
                    return Err(Error::TemplateSchema {
                        template: dir.display().to_string(),
                        reason: format!("missing descriptor file {}", DESCRIPTOR_FILE),
                    });
                }
                log::debug!("Skipping {}: not a template directory", dir.display());
                continue;
            }

            let descriptor = load_descriptor(&dir, &descriptor_path)?;
            if !asset_path.is_file() {
                return Err(Error::TemplateSchema {
                    template: descriptor.id,
                    reason: format!("missing asset file {}", ASSET_FILE),
                });
            }

            log::debug!(
                "Loaded template '{}' with {} slots",
                descriptor.id,
                descriptor.slots.len()
            );
            catalog.insert(descriptor, asset_path)?;
        }

        if catalog.is_empty() {
            return Err(Error::TemplateSchema {
                template: root.display().to_string(),
                reason: "templates directory holds no templates".to_string(),
            });
        }

        log::info!("Loaded {} templates from {}", catalog.len(), root.display());
        Ok(catalog)
    }

    /// Build a catalog from descriptors already in memory, applying the same validation.
    pub fn from_descriptors(
        templates: impl IntoIterator<Item = (TemplateDescriptor, PathBuf)>,
    ) -> Result<Self> {
        let mut catalog = Self::default();
        for (descriptor, asset_path) in templates {
            validate_descriptor(&descriptor)?;
            catalog.insert(descriptor, asset_path)?;
        }
        Ok(catalog)
    }

    fn insert(&mut self, descriptor: TemplateDescriptor, asset_path: PathBuf) -> Result<()> {
        if self.entries.contains_key(&descriptor.id) {
            return Err(Error::DuplicateTemplateId(descriptor.id));
        }
        self.entries.insert(
            descriptor.id.clone(),
            CatalogEntry {
                descriptor,
                asset_path,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TemplateDescriptor> {
        self.entries.get(id).map(|e| &e.descriptor)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Path of the binary asset for a template.
    pub fn asset_path(&self, id: &str) -> Option<&Path> {
        self.entries.get(id).map(|e| e.asset_path.as_path())
    }

    /// Template ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateDescriptor> {
        self.entries.values().map(|e| &e.descriptor)
    }

    /// Selection metadata for every template.
    pub fn summaries(&self) -> Vec<TemplateSummary> {
        self.iter()
            .map(|d| TemplateSummary {
                id: d.id.clone(),
                name: d.name.clone(),
                description: d.description.clone(),
                use_case_examples: d.use_case_examples.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalize a template id so visually identical names compare equal.
pub fn normalize_id(raw: &str) -> String {
    raw.trim().nfc().collect()
}

fn load_descriptor(dir: &Path, descriptor_path: &Path) -> Result<TemplateDescriptor> {
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let schema_error = |reason: String| Error::TemplateSchema {
        template: dir_name.clone(),
        reason,
    };

    let content = fs::read_to_string(descriptor_path)?;
    let raw: RawDescriptor = serde_json::from_str(&content)
        .map_err(|e| schema_error(format!("invalid {}: {}", DESCRIPTOR_FILE, e)))?;

    let missing = |field: &str| schema_error(format!("missing required field '{}'", field));

    let id = normalize_id(raw.id.as_deref().unwrap_or(&dir_name));
    let descriptor = TemplateDescriptor {
        id,
        name: raw.name.ok_or_else(|| missing("template_name"))?,
        description: raw.description.ok_or_else(|| missing("description"))?,
        use_case_examples: raw
            .use_case_examples
            .ok_or_else(|| missing("use_case_examples"))?,
        slots: raw.slots.ok_or_else(|| missing("objects"))?,
    };

    validate_descriptor(&descriptor)?;
    Ok(descriptor)
}

/// Check the descriptor invariants: a non-empty id, at least one slot, unique non-empty slot names.
fn validate_descriptor(descriptor: &TemplateDescriptor) -> Result<()> {
    let schema_error = |reason: String| Error::TemplateSchema {
        template: descriptor.id.clone(),
        reason,
    };

    if descriptor.id.is_empty() {
        return Err(schema_error("empty template id".to_string()));
    }
    if descriptor.slots.is_empty() {
        return Err(schema_error("template declares no slots".to_string()));
    }

    let mut seen = HashSet::new();
    for slot in &descriptor.slots {
        if slot.name.trim().is_empty() {
            return Err(schema_error("slot with empty name".to_string()));
        }
        if !seen.insert(slot.name.as_str()) {
            return Err(schema_error(format!("duplicate slot name '{}'", slot.name)));
        }
    }

    Ok(())
}
