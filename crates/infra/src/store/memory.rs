//! In-memory store for tests/dev.
//!
//! A single `RwLock` guards the whole state, so each operation observes and
//! mutates a consistent snapshot. Writes validate every reference before the
//! first mutation, which gives them the same all-or-nothing behaviour as the
//! Postgres transactions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use govportal_core::dashboard::recent_activity;
use govportal_core::{
    Comment, CommentId, CreateMetric, CreateMetricGroup, CreateProduct, CreateProject, Evaluation,
    EvaluationId, EvaluationWithRefs, InternalProject, InternalProjectId, Metric, MetricGroup,
    MetricGroupId, MetricGroupWithMetrics, MetricId, MetricWithGroups, NewComment, NewEvaluation,
    NewUser, Product, ProductDetails, ProductFilter, ProductId, ProjectWithProducts, RelationWrite,
    ScoreSummary, UpdateEvaluation, UpdateMetric, UpdateMetricGroup, UpdateProduct, UpdateProject,
    User, UserId,
};

use super::{PortalStore, SoftDeletion};
use crate::error::{StoreError, StoreResult};

/// Rows of one entity plus its id sequence.
#[derive(Debug)]
struct Table<Id, T> {
    rows: BTreeMap<Id, T>,
    last_id: i64,
}

impl<Id: Ord + Copy + From<i64>, T> Table<Id, T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }

    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        Id::from(self.last_id)
    }

    fn contains(&self, id: &Id) -> bool {
        self.rows.contains_key(id)
    }
}

/// Join table of a many-to-many relation.
#[derive(Debug)]
struct Links<L, R> {
    pairs: BTreeSet<(L, R)>,
}

impl<L: Ord + Copy, R: Ord + Copy> Links<L, R> {
    fn new() -> Self {
        Self {
            pairs: BTreeSet::new(),
        }
    }

    fn right_of(&self, left: L) -> BTreeSet<R> {
        self.pairs
            .iter()
            .filter(|(l, _)| *l == left)
            .map(|(_, r)| *r)
            .collect()
    }

    fn left_of(&self, right: R) -> BTreeSet<L> {
        self.pairs
            .iter()
            .filter(|(_, r)| *r == right)
            .map(|(l, _)| *l)
            .collect()
    }

    fn reconcile_left(&mut self, left: L, write: &RelationWrite<R>) {
        let plan = write.plan(&self.right_of(left));
        for r in plan.detach {
            self.pairs.remove(&(left, r));
        }
        for r in plan.attach {
            self.pairs.insert((left, r));
        }
    }

    fn reconcile_right(&mut self, right: R, write: &RelationWrite<L>) {
        let plan = write.plan(&self.left_of(right));
        for l in plan.detach {
            self.pairs.remove(&(l, right));
        }
        for l in plan.attach {
            self.pairs.insert((l, right));
        }
    }

    fn remove_left(&mut self, left: L) {
        self.pairs.retain(|(l, _)| *l != left);
    }

    fn remove_right(&mut self, right: R) {
        self.pairs.retain(|(_, r)| *r != right);
    }
}

#[derive(Debug)]
struct State {
    products: Table<ProductId, Product>,
    metrics: Table<MetricId, Metric>,
    groups: Table<MetricGroupId, MetricGroup>,
    evaluations: Table<EvaluationId, Evaluation>,
    projects: Table<InternalProjectId, InternalProject>,
    comments: Table<CommentId, Comment>,
    users: Table<UserId, User>,
    product_groups: Links<ProductId, MetricGroupId>,
    product_projects: Links<ProductId, InternalProjectId>,
    group_metrics: Links<MetricGroupId, MetricId>,
}

impl State {
    fn new() -> Self {
        Self {
            products: Table::new(),
            metrics: Table::new(),
            groups: Table::new(),
            evaluations: Table::new(),
            projects: Table::new(),
            comments: Table::new(),
            users: Table::new(),
            product_groups: Links::new(),
            product_projects: Links::new(),
            group_metrics: Links::new(),
        }
    }

    fn product_details(&self, product: &Product) -> ProductDetails {
        let metric_groups = self
            .product_groups
            .right_of(product.id)
            .into_iter()
            .filter_map(|gid| self.groups.rows.get(&gid))
            .map(|g| self.group_with_metrics(g))
            .collect();
        let internal_projects = self
            .product_projects
            .right_of(product.id)
            .into_iter()
            .filter_map(|pid| self.projects.rows.get(&pid).cloned())
            .collect();
        let evaluations = self
            .evaluations
            .rows
            .values()
            .rev()
            .filter(|e| e.product_id == product.id)
            .cloned()
            .collect();
        let comments = self
            .comments
            .rows
            .values()
            .filter(|c| c.product_id == product.id)
            .cloned()
            .collect();
        ProductDetails {
            product: product.clone(),
            metric_groups,
            internal_projects,
            evaluations,
            comments,
        }
    }

    fn group_with_metrics(&self, group: &MetricGroup) -> MetricGroupWithMetrics {
        MetricGroupWithMetrics {
            group: group.clone(),
            metrics: self
                .group_metrics
                .right_of(group.id)
                .into_iter()
                .filter_map(|mid| self.metrics.rows.get(&mid).cloned())
                .collect(),
        }
    }

    fn evaluation_with_refs(&self, evaluation: &Evaluation) -> StoreResult<EvaluationWithRefs> {
        let product = self
            .products
            .rows
            .get(&evaluation.product_id)
            .cloned()
            .ok_or_else(|| dangling("product", evaluation))?;
        let metric = self
            .metrics
            .rows
            .get(&evaluation.metric_id)
            .cloned()
            .ok_or_else(|| dangling("metric", evaluation))?;
        Ok(EvaluationWithRefs {
            evaluation: evaluation.clone(),
            product,
            metric,
        })
    }

    fn all_evaluations_with_refs(&self) -> StoreResult<Vec<EvaluationWithRefs>> {
        self.evaluations
            .rows
            .values()
            .map(|e| self.evaluation_with_refs(e))
            .collect()
    }

    fn check_evaluation_refs(&self, product_id: Option<ProductId>, metric_id: Option<MetricId>) -> StoreResult<()> {
        if let Some(pid) = product_id.filter(|pid| !self.products.contains(pid)) {
            return Err(StoreError::missing_related("product", &[pid]));
        }
        if let Some(mid) = metric_id.filter(|mid| !self.metrics.contains(mid)) {
            return Err(StoreError::missing_related("metric", &[mid]));
        }
        Ok(())
    }
}

fn dangling(what: &str, evaluation: &Evaluation) -> StoreError {
    StoreError::Backend(format!("evaluation {} references a missing {what}", evaluation.id))
}

/// Fail when a relation write names ids that have no row in `table`.
fn check_refs<Id, T>(write: Option<&RelationWrite<Id>>, table: &Table<Id, T>, entity: &str) -> StoreResult<()>
where
    Id: Ord + Copy + From<i64> + core::fmt::Display,
{
    let Some(write) = write else {
        return Ok(());
    };
    let missing = write.missing(|id| table.contains(id));
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::missing_related(entity, &missing))
    }
}

/// In-memory portal store.
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::new()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("in-memory state lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("in-memory state lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PortalStore for InMemoryStore {
    async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<ProductDetails>> {
        let state = self.read()?;
        Ok(state
            .products
            .rows
            .values()
            .filter(|p| filter.admits(p))
            .map(|p| state.product_details(p))
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<ProductDetails> {
        let state = self.read()?;
        let product = state
            .products
            .rows
            .get(&id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        Ok(state.product_details(product))
    }

    async fn create_product(&self, input: CreateProduct) -> StoreResult<Product> {
        let groups = RelationWrite::connect(input.metric_group_ids.clone());
        let projects = RelationWrite::connect(input.internal_project_ids.clone());

        let mut state = self.write()?;
        check_refs(groups.as_ref(), &state.groups, "metric group")?;
        check_refs(projects.as_ref(), &state.projects, "internal project")?;

        let id = state.products.next_id();
        let product = Product::from_create(id, &input);
        state.products.rows.insert(id, product.clone());
        if let Some(write) = &groups {
            state.product_groups.reconcile_left(id, write);
        }
        if let Some(write) = &projects {
            state.product_projects.reconcile_left(id, write);
        }
        Ok(product)
    }

    async fn update_product(&self, id: ProductId, input: UpdateProduct) -> StoreResult<Product> {
        let groups = RelationWrite::set(input.metric_group_ids.clone());
        let projects = RelationWrite::set(input.internal_project_ids.clone());

        let mut state = self.write()?;
        if !state.products.contains(&id) {
            return Err(StoreError::not_found("product", id));
        }
        check_refs(groups.as_ref(), &state.groups, "metric group")?;
        check_refs(projects.as_ref(), &state.projects, "internal project")?;

        if let Some(write) = &groups {
            state.product_groups.reconcile_left(id, write);
        }
        if let Some(write) = &projects {
            state.product_projects.reconcile_left(id, write);
        }
        let product = state
            .products
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        product.apply_update(&input);
        Ok(product.clone())
    }

    async fn soft_delete_product(&self, id: ProductId, at: DateTime<Utc>) -> StoreResult<SoftDeletion> {
        let mut state = self.write()?;
        let product = state
            .products
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        let outcome = product.soft_delete(at);
        Ok(SoftDeletion {
            outcome,
            product: product.clone(),
        })
    }

    async fn list_metrics(&self) -> StoreResult<Vec<MetricWithGroups>> {
        let state = self.read()?;
        Ok(state
            .metrics
            .rows
            .values()
            .map(|m| MetricWithGroups {
                metric: m.clone(),
                groups: state
                    .group_metrics
                    .left_of(m.id)
                    .into_iter()
                    .filter_map(|gid| state.groups.rows.get(&gid).cloned())
                    .collect(),
            })
            .collect())
    }

    async fn create_metric(&self, input: CreateMetric) -> StoreResult<Metric> {
        let groups = RelationWrite::connect(input.group_ids.clone());

        let mut state = self.write()?;
        check_refs(groups.as_ref(), &state.groups, "metric group")?;

        let id = state.metrics.next_id();
        let metric = Metric::from_create(id, &input);
        state.metrics.rows.insert(id, metric.clone());
        if let Some(write) = &groups {
            state.group_metrics.reconcile_right(id, write);
        }
        Ok(metric)
    }

    async fn update_metric(&self, id: MetricId, input: UpdateMetric) -> StoreResult<Metric> {
        let groups = RelationWrite::set(input.group_ids.clone());

        let mut state = self.write()?;
        let metric = state
            .metrics
            .rows
            .get(&id)
            .ok_or_else(|| StoreError::not_found("metric", id))?
            .merged(&input)?;
        check_refs(groups.as_ref(), &state.groups, "metric group")?;

        if let Some(write) = &groups {
            state.group_metrics.reconcile_right(id, write);
        }
        state.metrics.rows.insert(id, metric.clone());
        Ok(metric)
    }

    async fn delete_metric(&self, id: MetricId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.metrics.contains(&id) {
            return Err(StoreError::not_found("metric", id));
        }
        if state.evaluations.rows.values().any(|e| e.metric_id == id) {
            return Err(StoreError::constraint(format!(
                "metric {id} is still referenced by evaluations"
            )));
        }
        state.metrics.rows.remove(&id);
        state.group_metrics.remove_right(id);
        Ok(())
    }

    async fn get_metric(&self, id: MetricId) -> StoreResult<Metric> {
        let state = self.read()?;
        state
            .metrics
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("metric", id))
    }

    async fn list_metric_groups(&self) -> StoreResult<Vec<MetricGroupWithMetrics>> {
        let state = self.read()?;
        Ok(state
            .groups
            .rows
            .values()
            .map(|g| state.group_with_metrics(g))
            .collect())
    }

    async fn create_metric_group(&self, input: CreateMetricGroup) -> StoreResult<MetricGroup> {
        let metrics = RelationWrite::connect(input.metric_ids.clone());

        let mut state = self.write()?;
        check_refs(metrics.as_ref(), &state.metrics, "metric")?;

        let id = state.groups.next_id();
        let group = MetricGroup::from_create(id, &input);
        state.groups.rows.insert(id, group.clone());
        if let Some(write) = &metrics {
            state.group_metrics.reconcile_left(id, write);
        }
        Ok(group)
    }

    async fn update_metric_group(&self, id: MetricGroupId, input: UpdateMetricGroup) -> StoreResult<MetricGroup> {
        let metrics = RelationWrite::set(input.metric_ids.clone());

        let mut state = self.write()?;
        if !state.groups.contains(&id) {
            return Err(StoreError::not_found("metric group", id));
        }
        check_refs(metrics.as_ref(), &state.metrics, "metric")?;

        if let Some(write) = &metrics {
            state.group_metrics.reconcile_left(id, write);
        }
        let group = state
            .groups
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("metric group", id))?;
        group.apply_update(&input);
        Ok(group.clone())
    }

    async fn delete_metric_group(&self, id: MetricGroupId) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.groups.rows.remove(&id).is_none() {
            return Err(StoreError::not_found("metric group", id));
        }
        state.group_metrics.remove_left(id);
        state.product_groups.remove_right(id);
        Ok(())
    }

    async fn list_evaluations(&self) -> StoreResult<Vec<EvaluationWithRefs>> {
        let state = self.read()?;
        let rows = state.all_evaluations_with_refs()?;
        let total = rows.len();
        Ok(recent_activity(rows, total))
    }

    async fn create_evaluation(&self, input: NewEvaluation, at: DateTime<Utc>) -> StoreResult<Evaluation> {
        let mut state = self.write()?;
        state.check_evaluation_refs(Some(input.product_id), Some(input.metric_id))?;

        let id = state.evaluations.next_id();
        let evaluation = Evaluation::from_new(id, &input, at);
        state.evaluations.rows.insert(id, evaluation.clone());
        Ok(evaluation)
    }

    async fn create_evaluations(&self, inputs: Vec<NewEvaluation>, at: DateTime<Utc>) -> StoreResult<usize> {
        let mut state = self.write()?;
        for input in &inputs {
            state.check_evaluation_refs(Some(input.product_id), Some(input.metric_id))?;
        }
        for input in &inputs {
            let id = state.evaluations.next_id();
            state.evaluations.rows.insert(id, Evaluation::from_new(id, input, at));
        }
        Ok(inputs.len())
    }

    async fn update_evaluation(&self, id: EvaluationId, input: UpdateEvaluation) -> StoreResult<Evaluation> {
        let mut state = self.write()?;
        if !state.evaluations.contains(&id) {
            return Err(StoreError::not_found("evaluation", id));
        }
        state.check_evaluation_refs(input.product_id, input.metric_id)?;

        let evaluation = state
            .evaluations
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("evaluation", id))?;
        evaluation.apply_update(&input);
        Ok(evaluation.clone())
    }

    async fn delete_evaluation(&self, id: EvaluationId) -> StoreResult<()> {
        let mut state = self.write()?;
        match state.evaluations.rows.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("evaluation", id)),
        }
    }

    async fn list_projects(&self) -> StoreResult<Vec<ProjectWithProducts>> {
        let state = self.read()?;
        Ok(state
            .projects
            .rows
            .values()
            .map(|p| ProjectWithProducts {
                project: p.clone(),
                products: state
                    .product_projects
                    .left_of(p.id)
                    .into_iter()
                    .filter_map(|pid| state.products.rows.get(&pid).cloned())
                    .collect(),
            })
            .collect())
    }

    async fn create_project(&self, input: CreateProject) -> StoreResult<InternalProject> {
        let products = RelationWrite::connect(input.product_ids.clone());

        let mut state = self.write()?;
        check_refs(products.as_ref(), &state.products, "product")?;

        let id = state.projects.next_id();
        let project = InternalProject::from_create(id, &input);
        state.projects.rows.insert(id, project.clone());
        if let Some(write) = &products {
            state.product_projects.reconcile_right(id, write);
        }
        Ok(project)
    }

    async fn update_project(&self, id: InternalProjectId, input: UpdateProject) -> StoreResult<InternalProject> {
        let products = RelationWrite::set(input.product_ids.clone());

        let mut state = self.write()?;
        if !state.projects.contains(&id) {
            return Err(StoreError::not_found("internal project", id));
        }
        check_refs(products.as_ref(), &state.products, "product")?;

        if let Some(write) = &products {
            state.product_projects.reconcile_right(id, write);
        }
        let project = state
            .projects
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("internal project", id))?;
        project.apply_update(&input);
        Ok(project.clone())
    }

    async fn delete_project(&self, id: InternalProjectId) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.projects.rows.remove(&id).is_none() {
            return Err(StoreError::not_found("internal project", id));
        }
        state.product_projects.remove_right(id);
        Ok(())
    }

    async fn create_comment(&self, input: NewComment, at: DateTime<Utc>) -> StoreResult<Comment> {
        let mut state = self.write()?;
        if !state.products.contains(&input.product_id) {
            return Err(StoreError::missing_related("product", &[input.product_id]));
        }
        let id = state.comments.next_id();
        let comment = Comment {
            id,
            product_id: input.product_id,
            content: input.content,
            created_at: at,
        };
        state.comments.rows.insert(id, comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, id: CommentId) -> StoreResult<()> {
        let mut state = self.write()?;
        match state.comments.rows.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("comment", id)),
        }
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let state = self.read()?;
        Ok(state.users.rows.values().cloned().collect())
    }

    async fn create_user(&self, input: NewUser, at: DateTime<Utc>) -> StoreResult<User> {
        let mut state = self.write()?;
        if state.users.rows.values().any(|u| u.email == input.email) {
            return Err(StoreError::constraint(format!("email {} is already registered", input.email)));
        }
        let id = state.users.next_id();
        let user = User {
            id,
            email: input.email,
            name: input.name,
            created_at: at,
        };
        state.users.rows.insert(id, user.clone());
        Ok(user)
    }

    async fn count_products(&self, filter: ProductFilter) -> StoreResult<u64> {
        let state = self.read()?;
        Ok(state.products.rows.values().filter(|p| filter.admits(p)).count() as u64)
    }

    async fn count_evaluations(&self) -> StoreResult<u64> {
        Ok(self.read()?.evaluations.rows.len() as u64)
    }

    async fn count_projects(&self) -> StoreResult<u64> {
        Ok(self.read()?.projects.rows.len() as u64)
    }

    async fn score_summary(&self) -> StoreResult<ScoreSummary> {
        let state = self.read()?;
        Ok(ScoreSummary::from_scores(state.evaluations.rows.values().map(|e| e.score)))
    }

    async fn recent_evaluations(&self, limit: usize) -> StoreResult<Vec<EvaluationWithRefs>> {
        let state = self.read()?;
        Ok(recent_activity(state.all_evaluations_with_refs()?, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use govportal_core::relation::id_set;
    use govportal_core::{DomainError, MetricType, SoftDelete};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    async fn group(store: &InMemoryStore, name: &str) -> MetricGroupId {
        store
            .create_metric_group(CreateMetricGroup {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn product(store: &InMemoryStore, groups: &[MetricGroupId]) -> ProductId {
        store
            .create_product(CreateProduct {
                name: "Redis".to_string(),
                metric_group_ids: (!groups.is_empty()).then(|| groups.iter().copied().collect()),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn group_ids_of(store: &InMemoryStore, id: ProductId) -> Vec<MetricGroupId> {
        store
            .get_product(id)
            .await
            .unwrap()
            .metric_groups
            .into_iter()
            .map(|g| g.group.id)
            .collect()
    }

    #[tokio::test]
    async fn update_without_relation_field_keeps_membership() {
        let store = InMemoryStore::new();
        let a = group(&store, "A").await;
        let b = group(&store, "B").await;
        let p = product(&store, &[a, b]).await;

        store.update_product(p, UpdateProduct::default()).await.unwrap();
        assert_eq!(group_ids_of(&store, p).await, vec![a, b]);

        store
            .update_product(
                p,
                UpdateProduct {
                    metric_group_ids: Some(BTreeSet::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(group_ids_of(&store, p).await.is_empty());
    }

    #[tokio::test]
    async fn create_with_unknown_group_persists_nothing() {
        let store = InMemoryStore::new();
        let a = group(&store, "A").await;
        let err = store
            .create_product(CreateProduct {
                name: "Orphan".to_string(),
                metric_group_ids: Some(id_set([a.get(), 999])),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert!(store.list_products(ProductFilter { include_deleted: true }).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_update_leaves_scalars_and_membership_untouched() {
        let store = InMemoryStore::new();
        let a = group(&store, "A").await;
        let p = product(&store, &[a]).await;

        let err = store
            .update_product(
                p,
                UpdateProduct {
                    name: Some("Renamed".to_string()),
                    metric_group_ids: Some(id_set([404])),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));

        let details = store.get_product(p).await.unwrap();
        assert_eq!(details.product.name, "Redis");
        assert_eq!(group_ids_of(&store, p).await, vec![a]);
    }

    #[tokio::test]
    async fn soft_delete_is_idempotent_and_hides_from_default_listing() {
        let store = InMemoryStore::new();
        let p = product(&store, &[]).await;
        let first = now();

        let deleted = store.soft_delete_product(p, first).await.unwrap();
        assert_eq!(deleted.outcome, SoftDelete::Deleted);
        assert_eq!(deleted.product.deleted_at, Some(first));

        let again = store.soft_delete_product(p, first + Duration::hours(1)).await.unwrap();
        assert_eq!(again.outcome, SoftDelete::AlreadyDeleted);
        assert_eq!(again.product.deleted_at, Some(first));

        assert!(store.list_products(ProductFilter::default()).await.unwrap().is_empty());
        assert_eq!(store.list_products(ProductFilter { include_deleted: true }).await.unwrap().len(), 1);
        assert!(matches!(
            store.soft_delete_product(ProductId::new(77), first).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn metric_and_group_memberships_are_one_relation() {
        let store = InMemoryStore::new();
        let g = group(&store, "Security").await;
        let m = store
            .create_metric(CreateMetric {
                name: "CVE count".to_string(),
                metric_type: MetricType::CustomNumber,
                group_ids: Some(id_set([g.get()])),
                ..Default::default()
            })
            .await
            .unwrap();

        let groups = store.list_metric_groups().await.unwrap();
        assert_eq!(groups[0].metrics, vec![m.clone()]);

        store
            .update_metric_group(
                g,
                UpdateMetricGroup {
                    metric_ids: Some(BTreeSet::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let metrics = store.list_metrics().await.unwrap();
        assert!(metrics[0].groups.is_empty());
    }

    #[tokio::test]
    async fn hard_delete_detaches_memberships() {
        let store = InMemoryStore::new();
        let g = group(&store, "Ops").await;
        let p = product(&store, &[g]).await;

        store.delete_metric_group(g).await.unwrap();
        assert!(group_ids_of(&store, p).await.is_empty());
        assert!(matches!(
            store.delete_metric_group(g).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn batch_with_one_bad_row_inserts_nothing() {
        let store = InMemoryStore::new();
        let p = product(&store, &[]).await;
        let m = store
            .create_metric(CreateMetric {
                name: "Security".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let good = NewEvaluation {
            product_id: p,
            metric_id: m.id,
            score: 8,
            comments: None,
            stakeholders: vec![],
        };
        let bad = NewEvaluation {
            metric_id: MetricId::new(42),
            ..good.clone()
        };

        let err = store.create_evaluations(vec![good.clone(), bad], now()).await.unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert_eq!(store.count_evaluations().await.unwrap(), 0);

        let created = store
            .create_evaluations(vec![good.clone(), good.clone(), good], now())
            .await
            .unwrap();
        assert_eq!(created, 3);
        assert_eq!(store.count_evaluations().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn metric_update_with_inverted_bounds_changes_nothing() {
        let store = InMemoryStore::new();
        let a = group(&store, "A").await;
        let m = store
            .create_metric(CreateMetric {
                name: "Latency".to_string(),
                group_ids: Some(id_set([a.get()])),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = store
            .update_metric(
                m.id,
                UpdateMetric {
                    min_score: Some(20),
                    group_ids: Some(BTreeSet::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(DomainError::Validation(_))));

        let listed = store.list_metrics().await.unwrap();
        assert_eq!(listed[0].metric, m);
        assert_eq!(listed[0].groups.len(), 1);

        let widened = store
            .update_metric(
                m.id,
                UpdateMetric {
                    min_score: Some(20),
                    max_score: Some(30),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!((widened.min_score, widened.max_score), (20, 30));
    }

    #[tokio::test]
    async fn metric_with_evaluations_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let p = product(&store, &[]).await;
        let m = store
            .create_metric(CreateMetric {
                name: "Uptime".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let e = store
            .create_evaluation(
                NewEvaluation {
                    product_id: p,
                    metric_id: m.id,
                    score: 9,
                    comments: None,
                    stakeholders: vec![],
                },
                now(),
            )
            .await
            .unwrap();

        assert!(matches!(
            store.delete_metric(m.id).await,
            Err(StoreError::ConstraintViolation(_))
        ));
        store.delete_evaluation(e.id).await.unwrap();
        store.delete_metric(m.id).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_user_email_is_a_constraint_violation() {
        let store = InMemoryStore::new();
        let input = NewUser {
            email: "lead@example.com".to_string(),
            name: None,
        };
        store.create_user(input.clone(), now()).await.unwrap();
        assert!(matches!(
            store.create_user(input, now()).await,
            Err(StoreError::ConstraintViolation(_))
        ));
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }
}
