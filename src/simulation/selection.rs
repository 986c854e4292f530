//! Which objects a projection simulates.

use serde::{Deserialize, Serialize};

use crate::entity::ObjectId;
use crate::error::{ValidationError, WhatIfResult};
use crate::storage::CatalogStore;

/// Object selection: explicit ids win, then family, then type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub objects: Vec<ObjectId>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub object_type: Option<String>,
}

impl Selection {
    #[must_use]
    pub fn objects(ids: impl IntoIterator<Item = ObjectId>) -> Self {
        Self {
            objects: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn family(family: impl Into<String>) -> Self {
        Self {
            family: Some(family.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn object_type(object_type: impl Into<String>) -> Self {
        Self {
            object_type: Some(object_type.into()),
            ..Self::default()
        }
    }

    /// Resolves to catalog ids.
    ///
    /// # Errors
    /// `NothingToSimulate` when no rule yields a non-empty set.
    pub fn resolve(&self, catalog: &dyn CatalogStore) -> WhatIfResult<Vec<ObjectId>> {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let ids = if !self.objects.is_empty() {
            catalog
                .get_many(&self.objects)?
                .into_iter()
                .map(|o| o.id)
                .collect()
        } else if let Some(family) = non_blank(&self.family) {
            catalog.ids_by_family(&family)?
        } else if let Some(object_type) = non_blank(&self.object_type) {
            catalog.ids_by_type(&object_type)?
        } else {
            Vec::new()
        };

        if ids.is_empty() {
            return Err(ValidationError::NothingToSimulate.into());
        }
        Ok(ids)
    }
}
