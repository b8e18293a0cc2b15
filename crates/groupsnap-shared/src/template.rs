//! Collage layout templates.
//!
//! Templates are read-only reference data. The catalog is loaded once from
//! a JSON array and looked up by template id, the same key a session binds
//! when its countdown starts.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

/// Id prefix of layouts generated for photo counts the catalog lacks.
pub const GRID_PREFIX: &str = "grid-";

/// Edge length, in pixels, of one cell of a generated grid.
pub const GRID_CELL: u32 = 400;

/// Target rectangle of one photo on the canvas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Frame {
    pub x: u32,
    pub y: u32,
    /// Zero means "use the photo's own width".
    pub width: u32,
    /// Zero means "use the photo's own height".
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub photo_count: u32,
    pub width: u32,
    pub height: u32,
    /// Photos fill frames positionally: the Nth photo goes in the Nth frame.
    pub frames: Vec<Frame>,
}

impl Template {
    /// Near-square grid of `count` cells, filled row by row.
    pub fn grid(count: u32) -> Self {
        let mut columns = 1;
        while columns * columns < count {
            columns += 1;
        }
        let rows = count.div_ceil(columns).max(1);

        Self {
            id: format!("{GRID_PREFIX}{count}"),
            name: format!("Grid of {count}"),
            photo_count: count,
            width: columns * GRID_CELL,
            height: rows * GRID_CELL,
            frames: (0..count)
                .map(|i| Frame {
                    x: (i % columns) * GRID_CELL,
                    y: (i / columns) * GRID_CELL,
                    width: GRID_CELL,
                    height: GRID_CELL,
                })
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), TemplateError> {
        let invalid = |reason: &str| TemplateError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("empty id"));
        }
        if self.id.starts_with(GRID_PREFIX) {
            return Err(invalid("id prefix is reserved for generated grids"));
        }
        if self.photo_count == 0 {
            return Err(invalid("photo_count must be at least 1"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(invalid("canvas must have a non-zero size"));
        }
        if self.frames.len() != self.photo_count as usize {
            return Err(invalid("frame count differs from photo_count"));
        }
        Ok(())
    }
}

/// Ordered, validated set of templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    pub fn from_templates(templates: Vec<Template>) -> Result<Self, TemplateError> {
        let mut seen = HashSet::new();
        for template in &templates {
            template.validate()?;
            if !seen.insert(template.id.clone()) {
                return Err(TemplateError::Duplicate(template.id.clone()));
            }
        }
        Ok(Self { templates })
    }

    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        let templates: Vec<Template> = serde_json::from_str(json)?;
        Self::from_templates(templates)
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// First template, in catalog order, laying out exactly `count` photos.
    pub fn find_for_count(&self, count: u32) -> Option<&Template> {
        self.templates.iter().find(|t| t.photo_count == count)
    }

    /// Catalog layout for `count` photos, or a generated grid when the
    /// catalog has none.
    pub fn layout_for_count(&self, count: u32) -> Cow<'_, Template> {
        match self.find_for_count(count) {
            Some(template) => Cow::Borrowed(template),
            None => Cow::Owned(Template::grid(count)),
        }
    }

    /// Look up a layout by the id a session bound, generated grids included.
    pub fn resolve(&self, id: &str) -> Option<Cow<'_, Template>> {
        if let Some(template) = self.get(id) {
            return Some(Cow::Borrowed(template));
        }
        let count: u32 = id.strip_prefix(GRID_PREFIX)?.parse().ok()?;
        (count > 0).then(|| Cow::Owned(Template::grid(count)))
    }

    pub fn with_photo_count(&self, count: u32) -> Vec<&Template> {
        self.templates
            .iter()
            .filter(|t| t.photo_count == count)
            .collect()
    }

    pub fn list(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
