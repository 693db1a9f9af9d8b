//! Prepaid meal-plan memberships. Consumption is a version-guarded decrement
//! with a bounded retry so two concurrent meal redemptions can never spend
//! the same remaining balance twice. Every balance or status change appends
//! a history row.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        membership_history::{self, Entity as HistoryEntity, HistoryAction},
        user_membership::{self, Entity as MembershipEntity, MembershipStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const CONSUME_RETRY_LIMIT: u32 = 3;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMembershipRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "plan name is required"))]
    pub plan_name: String,
    #[validate(range(min = 1, message = "total meals must be positive"))]
    pub total_meals: i32,
    pub total_price: rust_decimal::Decimal,
    pub payment_mode: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConsumeMealsRequest {
    #[validate(range(min = 1, message = "meals must be positive"))]
    pub meals: i32,
    pub meal_type: Option<String>,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct MembershipService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl MembershipService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request))]
    pub async fn create_membership(
        &self,
        request: CreateMembershipRequest,
    ) -> Result<user_membership::Model, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let membership = user_membership::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(request.user_id),
            plan_name: Set(request.plan_name),
            total_meals: Set(request.total_meals),
            remaining_meals: Set(request.total_meals),
            consumed_meals: Set(0),
            status: Set(MembershipStatus::Active),
            total_price: Set(request.total_price),
            payment_mode: Set(request.payment_mode),
            note: Set(request.note.clone()),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        self.append_history(
            &txn,
            &membership,
            HistoryAction::Created,
            membership.total_meals,
            "plan".to_string(),
            request.note,
        )
        .await?;

        txn.commit().await?;
        info!(membership_id = %membership.id, "Membership created");
        Ok(membership)
    }

    /// Deducts meals from an active membership. The write is guarded on the
    /// version read, so a concurrent consume forces a re-read instead of a
    /// double spend; exhausting the balance completes the plan.
    #[instrument(skip(self, request), fields(membership_id = %membership_id))]
    pub async fn consume_meals(
        &self,
        membership_id: Uuid,
        request: ConsumeMealsRequest,
    ) -> Result<user_membership::Model, ServiceError> {
        request.validate()?;
        let meal_type = request.meal_type.unwrap_or_else(|| "meal".to_string());

        for attempt in 0..CONSUME_RETRY_LIMIT {
            // Balance change and its audit rows commit together.
            let txn = self.db.begin().await?;

            let membership = MembershipEntity::find_by_id(membership_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Membership {} not found", membership_id))
                })?;

            if membership.status != MembershipStatus::Active {
                return Err(ServiceError::BusinessRule(format!(
                    "Membership is {} and cannot consume meals",
                    membership.status.as_str()
                )));
            }
            if request.meals > membership.remaining_meals {
                return Err(ServiceError::BusinessRule(format!(
                    "Cannot consume {} meals; only {} remaining",
                    request.meals, membership.remaining_meals
                )));
            }

            let remaining = membership.remaining_meals - request.meals;
            let consumed = membership.consumed_meals + request.meals;
            let exhausted = remaining == 0;
            let expected_version = membership.version;

            let result = MembershipEntity::update_many()
                .col_expr(
                    user_membership::Column::RemainingMeals,
                    sea_orm::sea_query::Expr::value(remaining),
                )
                .col_expr(
                    user_membership::Column::ConsumedMeals,
                    sea_orm::sea_query::Expr::value(consumed),
                )
                .col_expr(
                    user_membership::Column::Status,
                    sea_orm::sea_query::Expr::value(if exhausted {
                        MembershipStatus::Completed
                    } else {
                        MembershipStatus::Active
                    }),
                )
                .col_expr(
                    user_membership::Column::Version,
                    sea_orm::sea_query::Expr::value(expected_version + 1),
                )
                .col_expr(
                    user_membership::Column::UpdatedAt,
                    sea_orm::sea_query::Expr::value(Utc::now()),
                )
                .filter(user_membership::Column::Id.eq(membership_id))
                .filter(user_membership::Column::Version.eq(expected_version))
                .exec(&txn)
                .await?;

            if result.rows_affected == 0 {
                txn.rollback().await?;
                warn!(attempt, "Concurrent membership update; retrying consume");
                continue;
            }

            let updated = MembershipEntity::find_by_id(membership_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Membership {} not found", membership_id))
                })?;

            self.append_history(
                &txn,
                &updated,
                HistoryAction::Consumed,
                -request.meals,
                meal_type.clone(),
                request.note.clone(),
            )
            .await?;
            if exhausted {
                self.append_history(
                    &txn,
                    &updated,
                    HistoryAction::Completed,
                    0,
                    meal_type.clone(),
                    None,
                )
                .await?;
            }

            txn.commit().await?;

            self.event_sender
                .send_or_log(Event::MembershipConsumed {
                    membership_id,
                    meals: request.meals,
                    remaining,
                })
                .await;
            if exhausted {
                self.event_sender
                    .send_or_log(Event::MembershipStatusChanged {
                        membership_id,
                        old_status: MembershipStatus::Active.as_str().to_string(),
                        new_status: MembershipStatus::Completed.as_str().to_string(),
                    })
                    .await;
            }

            return Ok(updated);
        }

        Err(ServiceError::Conflict(
            "Membership was updated concurrently; please retry".to_string(),
        ))
    }

    /// Puts an active membership on hold.
    pub async fn hold(
        &self,
        membership_id: Uuid,
        note: Option<String>,
    ) -> Result<user_membership::Model, ServiceError> {
        self.transition(
            membership_id,
            &[MembershipStatus::Active],
            MembershipStatus::Hold,
            HistoryAction::Hold,
            note,
        )
        .await
    }

    /// Resumes a held membership.
    pub async fn resume(
        &self,
        membership_id: Uuid,
        note: Option<String>,
    ) -> Result<user_membership::Model, ServiceError> {
        self.transition(
            membership_id,
            &[MembershipStatus::Hold],
            MembershipStatus::Active,
            HistoryAction::Resumed,
            note,
        )
        .await
    }

    /// Cancels a membership that is not already finished.
    pub async fn cancel(
        &self,
        membership_id: Uuid,
        note: Option<String>,
    ) -> Result<user_membership::Model, ServiceError> {
        self.transition(
            membership_id,
            &[MembershipStatus::Active, MembershipStatus::Hold],
            MembershipStatus::Cancelled,
            HistoryAction::Cancelled,
            note,
        )
        .await
    }

    async fn transition(
        &self,
        membership_id: Uuid,
        allowed_from: &[MembershipStatus],
        to: MembershipStatus,
        action: HistoryAction,
        note: Option<String>,
    ) -> Result<user_membership::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let membership = MembershipEntity::find_by_id(membership_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Membership {} not found", membership_id))
            })?;

        if !allowed_from.contains(&membership.status) {
            return Err(ServiceError::BusinessRule(format!(
                "Cannot move membership from {} to {}",
                membership.status.as_str(),
                to.as_str()
            )));
        }

        let old_status = membership.status;
        let version = membership.version;
        let mut active: user_membership::ActiveModel = membership.into();
        active.status = Set(to);
        active.version = Set(version + 1);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        self.append_history(&txn, &updated, action, 0, "status".to_string(), note)
            .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::MembershipStatusChanged {
                membership_id,
                old_status: old_status.as_str().to_string(),
                new_status: to.as_str().to_string(),
            })
            .await;
        Ok(updated)
    }

    pub async fn get_membership(
        &self,
        membership_id: Uuid,
    ) -> Result<(user_membership::Model, Vec<membership_history::Model>), ServiceError> {
        let membership = MembershipEntity::find_by_id(membership_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Membership {} not found", membership_id))
            })?;

        let history = HistoryEntity::find()
            .filter(membership_history::Column::MembershipId.eq(membership_id))
            .order_by_desc(membership_history::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        Ok((membership, history))
    }

    pub async fn list_memberships(
        &self,
        user_id: Option<Uuid>,
        status: Option<MembershipStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<user_membership::Model>, u64), ServiceError> {
        let mut query = MembershipEntity::find();
        if let Some(user_id) = user_id {
            query = query.filter(user_membership::Column::UserId.eq(user_id));
        }
        if let Some(status) = status {
            query = query.filter(user_membership::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(user_membership::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let memberships = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((memberships, total))
    }

    async fn append_history<C: sea_orm::ConnectionTrait>(
        &self,
        conn: &C,
        membership: &user_membership::Model,
        action: HistoryAction,
        meals_changed: i32,
        meal_type: String,
        note: Option<String>,
    ) -> Result<(), ServiceError> {
        membership_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            membership_id: Set(membership.id),
            action: Set(action),
            meals_changed: Set(meals_changed),
            consumed_meals: Set(membership.consumed_meals),
            remaining_meals: Set(membership.remaining_meals),
            meal_type: Set(meal_type),
            note: Set(note),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_validation() {
        let bad = CreateMembershipRequest {
            user_id: Uuid::new_v4(),
            plan_name: String::new(),
            total_meals: 0,
            total_price: rust_decimal_macros::dec!(999),
            payment_mode: None,
            note: None,
        };
        assert!(bad.validate().is_err());

        let good = CreateMembershipRequest {
            user_id: Uuid::new_v4(),
            plan_name: "Monthly 30".to_string(),
            total_meals: 30,
            total_price: rust_decimal_macros::dec!(2999),
            payment_mode: Some("upi".to_string()),
            note: None,
        };
        assert!(good.validate().is_ok());
    }

    #[test]
    fn consume_request_rejects_non_positive() {
        let req = ConsumeMealsRequest {
            meals: 0,
            meal_type: None,
            note: None,
        };
        assert!(req.validate().is_err());
    }
}
