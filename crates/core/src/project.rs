use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainResult, require_non_blank};
use crate::id::{InternalProjectId, ProductId};

/// An organizational initiative consuming one or more products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalProject {
    pub id: InternalProjectId,
    pub name: String,
    pub description: Option<String>,
}

impl InternalProject {
    pub fn from_create(id: InternalProjectId, input: &CreateProject) -> Self {
        Self {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
        }
    }

    pub fn apply_update(&mut self, update: &UpdateProject) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub product_ids: Option<BTreeSet<ProductId>>,
}

impl CreateProject {
    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("name", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub product_ids: Option<BTreeSet<ProductId>>,
}

impl UpdateProject {
    pub fn validate(&self) -> DomainResult<()> {
        match &self.name {
            Some(name) => require_non_blank("name", name),
            None => Ok(()),
        }
    }
}
