use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult, require_non_blank};
use crate::id::{InternalProjectId, MetricGroupId, ProductId};

/// Governance status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    #[default]
    UnderEvaluation,
    Approved,
    Standard,
    Sunset,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnderEvaluation => "UNDER_EVALUATION",
            Self::Approved => "APPROVED",
            Self::Standard => "STANDARD",
            Self::Sunset => "SUNSET",
        }
    }
}

impl core::str::FromStr for ProductStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNDER_EVALUATION" => Ok(Self::UnderEvaluation),
            "APPROVED" => Ok(Self::Approved),
            "STANDARD" => Ok(Self::Standard),
            "SUNSET" => Ok(Self::Sunset),
            other => Err(DomainError::validation(format!("unknown product status: {other}"))),
        }
    }
}

/// A tracked software product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub links: Vec<String>,
    pub status: ProductStatus,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Result of a soft-delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftDelete {
    /// The product was active and is now flagged deleted.
    Deleted,
    /// The product had already been soft-deleted; nothing changed.
    AlreadyDeleted,
}

impl Product {
    /// Build a product from a create request once the store has assigned an id.
    pub fn from_create(id: ProductId, input: &CreateProduct) -> Self {
        Self {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
            links: input.links.clone(),
            status: input.status,
            is_deleted: false,
            deleted_at: None,
        }
    }

    /// Overwrite the fields present in `update`. Deletion state is not writable.
    pub fn apply_update(&mut self, update: &UpdateProduct) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(links) = &update.links {
            self.links = links.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
    }

    /// Flag the product deleted. Idempotent: `deleted_at` keeps its first value.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) -> SoftDelete {
        if self.is_deleted {
            return SoftDelete::AlreadyDeleted;
        }
        self.is_deleted = true;
        self.deleted_at = Some(at);
        SoftDelete::Deleted
    }
}

/// Create request for a product.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateProduct {
    pub name: String,
    pub description: Option<String>,
    pub links: Vec<String>,
    pub status: ProductStatus,
    pub metric_group_ids: Option<BTreeSet<MetricGroupId>>,
    pub internal_project_ids: Option<BTreeSet<InternalProjectId>>,
}

impl CreateProduct {
    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("name", &self.name)
    }
}

/// Update request for a product. `None` leaves a field untouched;
/// `Some(None)` clears the description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub links: Option<Vec<String>>,
    pub status: Option<ProductStatus>,
    pub metric_group_ids: Option<BTreeSet<MetricGroupId>>,
    pub internal_project_ids: Option<BTreeSet<InternalProjectId>>,
}

impl UpdateProduct {
    pub fn validate(&self) -> DomainResult<()> {
        match &self.name {
            Some(name) => require_non_blank("name", name),
            None => Ok(()),
        }
    }
}

/// Listing filter for products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProductFilter {
    pub include_deleted: bool,
}

impl ProductFilter {
    pub fn admits(&self, product: &Product) -> bool {
        self.include_deleted || !product.is_deleted
    }
}
