//! Plan repository

use crate::models::Plan;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait PlanRepository: Send + Sync + 'static {
    async fn find_by_id(&self, id: i32) -> Result<Option<Plan>>;

    async fn list_active(&self) -> Result<Vec<Plan>>;

    /// Renewal plan configured on a trial plan's feature bag, if any.
    async fn find_renewal_plan(&self, trial_plan_id: i32) -> Result<Option<Plan>>;
}

/// PostgreSQL implementation of the plan repository
#[derive(Clone)]
pub struct PostgresPlanRepository {
    pool: sqlx::PgPool,
}

impl PostgresPlanRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn find_by_id(&self, id: i32) -> Result<Option<Plan>> {
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    async fn list_active(&self) -> Result<Vec<Plan>> {
        let plans =
            sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE is_active = true ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(plans)
    }

    async fn find_renewal_plan(&self, trial_plan_id: i32) -> Result<Option<Plan>> {
        let trial_plan = match self.find_by_id(trial_plan_id).await? {
            Some(plan) => plan,
            None => return Ok(None),
        };

        match trial_plan.renewal_plan_id() {
            Some(renewal_id) => self.find_by_id(renewal_id).await,
            None => Ok(None),
        }
    }
}
