use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainResult, require_non_blank};
use crate::id::{CommentId, ProductId};

/// Free-form note attached to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub product_id: ProductId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub product_id: ProductId,
    pub content: String,
}

impl NewComment {
    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("content", &self.content)
    }
}
