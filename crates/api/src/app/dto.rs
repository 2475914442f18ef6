use serde::Deserialize;

use govportal_core::relation::id_set;
use govportal_core::{
    CreateMetric, CreateMetricGroup, CreateProduct, CreateProject, DomainResult, MetricId, MetricType,
    NewComment, NewEvaluation, NewUser, ProductFilter, ProductId, ProductStatus, UpdateEvaluation,
    UpdateMetric, UpdateMetricGroup, UpdateProduct, UpdateProject,
};

// -------------------------
// Request DTOs
// -------------------------
//
// Relation id lists are tri-state: absent leaves memberships alone, `[]` clears
// them on update. `Option<Vec<i64>>` keeps that distinction until conversion.
// Nullable text on update is tri-state too: absent keeps, `null` clears.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

impl From<ProductListQuery> for ProductFilter {
    fn from(q: ProductListQuery) -> Self {
        ProductFilter {
            include_deleted: q.include_deleted,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    pub status: Option<ProductStatus>,
    pub metric_group_ids: Option<Vec<i64>>,
    pub internal_project_ids: Option<Vec<i64>>,
}

impl CreateProductRequest {
    pub fn into_command(self) -> DomainResult<CreateProduct> {
        let cmd = CreateProduct {
            name: self.name,
            description: self.description,
            links: self.links,
            status: self.status.unwrap_or_default(),
            metric_group_ids: self.metric_group_ids.map(id_set),
            internal_project_ids: self.internal_project_ids.map(id_set),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    pub links: Option<Vec<String>>,
    pub status: Option<ProductStatus>,
    pub metric_group_ids: Option<Vec<i64>>,
    pub internal_project_ids: Option<Vec<i64>>,
}

impl UpdateProductRequest {
    pub fn into_command(self) -> DomainResult<UpdateProduct> {
        let cmd = UpdateProduct {
            name: self.name,
            description: self.description,
            links: self.links,
            status: self.status,
            metric_group_ids: self.metric_group_ids.map(id_set),
            internal_project_ids: self.internal_project_ids.map(id_set),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMetricRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: Option<MetricType>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
    pub group_ids: Option<Vec<i64>>,
}

impl CreateMetricRequest {
    pub fn into_command(self) -> DomainResult<CreateMetric> {
        let defaults = CreateMetric::default();
        let cmd = CreateMetric {
            name: self.name,
            description: self.description,
            metric_type: self.metric_type.unwrap_or(defaults.metric_type),
            min_score: self.min_score.unwrap_or(defaults.min_score),
            max_score: self.max_score.unwrap_or(defaults.max_score),
            group_ids: self.group_ids.map(id_set),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMetricRequest {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    #[serde(rename = "type")]
    pub metric_type: Option<MetricType>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
    pub group_ids: Option<Vec<i64>>,
}

impl UpdateMetricRequest {
    pub fn into_command(self) -> DomainResult<UpdateMetric> {
        let cmd = UpdateMetric {
            name: self.name,
            description: self.description,
            metric_type: self.metric_type,
            min_score: self.min_score,
            max_score: self.max_score,
            group_ids: self.group_ids.map(id_set),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMetricGroupRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub metric_ids: Option<Vec<i64>>,
}

impl CreateMetricGroupRequest {
    pub fn into_command(self) -> DomainResult<CreateMetricGroup> {
        let cmd = CreateMetricGroup {
            name: self.name,
            description: self.description,
            metric_ids: self.metric_ids.map(id_set),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMetricGroupRequest {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    pub metric_ids: Option<Vec<i64>>,
}

impl UpdateMetricGroupRequest {
    pub fn into_command(self) -> DomainResult<UpdateMetricGroup> {
        let cmd = UpdateMetricGroup {
            name: self.name,
            description: self.description,
            metric_ids: self.metric_ids.map(id_set),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvaluationRequest {
    pub product_id: i64,
    pub metric_id: i64,
    pub score: i32,
    pub comments: Option<String>,
    #[serde(default)]
    pub stakeholders: Vec<String>,
}

impl From<CreateEvaluationRequest> for NewEvaluation {
    fn from(req: CreateEvaluationRequest) -> Self {
        NewEvaluation {
            product_id: ProductId::new(req.product_id),
            metric_id: MetricId::new(req.metric_id),
            score: req.score,
            comments: req.comments,
            stakeholders: req.stakeholders,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvaluationRequest {
    pub product_id: Option<i64>,
    pub metric_id: Option<i64>,
    pub score: Option<i32>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub comments: Option<Option<String>>,
    pub stakeholders: Option<Vec<String>>,
}

impl From<UpdateEvaluationRequest> for UpdateEvaluation {
    fn from(req: UpdateEvaluationRequest) -> Self {
        UpdateEvaluation {
            product_id: req.product_id.map(ProductId::new),
            metric_id: req.metric_id.map(MetricId::new),
            score: req.score,
            comments: req.comments,
            stakeholders: req.stakeholders,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub product_ids: Option<Vec<i64>>,
}

impl CreateProjectRequest {
    pub fn into_command(self) -> DomainResult<CreateProject> {
        let cmd = CreateProject {
            name: self.name,
            description: self.description,
            product_ids: self.product_ids.map(id_set),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    pub product_ids: Option<Vec<i64>>,
}

impl UpdateProjectRequest {
    pub fn into_command(self) -> DomainResult<UpdateProject> {
        let cmd = UpdateProject {
            name: self.name,
            description: self.description,
            product_ids: self.product_ids.map(id_set),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub product_id: i64,
    #[serde(default)]
    pub content: String,
}

impl CreateCommentRequest {
    pub fn into_command(self) -> DomainResult<NewComment> {
        let cmd = NewComment {
            product_id: ProductId::new(self.product_id),
            content: self.content,
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    pub name: Option<String>,
}

impl CreateUserRequest {
    pub fn into_command(self) -> DomainResult<NewUser> {
        let cmd = NewUser {
            email: self.email,
            name: self.name,
        };
        cmd.validate()?;
        Ok(cmd)
    }
}
