//! Billing repository: plans, subscriptions and payments

use follix_auth::ClinicId;
use tracing::info;
use turso::{Connection, Database};

use super::{id, int, opt_text, opt_timestamp, text, timestamp, ts_param};
use crate::db::{begin, finish};
use crate::error::{ControlError, Result};
use crate::models::{Payment, PaymentStatus, Subscription, SubscriptionPlan, SubscriptionStatus};

const PLAN_COLUMNS: &str =
    "id, name, price_monthly_cents, currency, max_users, max_analyses_per_month, created_at";

const SUBSCRIPTION_COLUMNS: &str = "id, clinic_id, plan_id, status, gateway_reference, current_period_start, current_period_end, created_at, updated_at";

const PAYMENT_COLUMNS: &str =
    "id, subscription_id, amount_cents, currency, status, gateway_reference, processed_at";

/// Repository for billing entities
pub struct BillingRepo<'a> {
    db: &'a Database,
}

impl<'a> BillingRepo<'a> {
    /// Create a new billing repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Plans
    // =========================================================================

    /// Insert a plan
    pub async fn create_plan(&self, plan: &SubscriptionPlan) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute(
            r#"
            INSERT INTO subscription_plans (
                id, name, price_monthly_cents, currency, max_users,
                max_analyses_per_month, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            [
                plan.id.as_str(),
                plan.name.as_str(),
                plan.price_monthly_cents.to_string().as_str(),
                plan.currency.as_str(),
                plan.max_users.to_string().as_str(),
                plan.max_analyses_per_month.to_string().as_str(),
                plan.created_at.to_rfc3339().as_str(),
            ],
        )
        .await?;

        info!(plan_id = %plan.id, name = %plan.name, "Created subscription plan");
        Ok(())
    }

    /// Get a plan by ID
    pub async fn get_plan(&self, id: &str) -> Result<Option<SubscriptionPlan>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM subscription_plans WHERE id = ?1", PLAN_COLUMNS);
        let mut rows = conn.query(&sql, [id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_plan(&row)?)),
            None => Ok(None),
        }
    }

    /// All plans, cheapest first
    pub async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM subscription_plans ORDER BY price_monthly_cents, name",
            PLAN_COLUMNS
        );
        let mut rows = conn.query(&sql, ()).await?;

        let mut plans = Vec::new();
        while let Some(row) = rows.next().await? {
            plans.push(row_to_plan(&row)?);
        }
        Ok(plans)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Insert a subscription
    pub async fn create_subscription(&self, sub: &Subscription) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute(
            r#"
            INSERT INTO subscriptions (
                id, clinic_id, plan_id, status, gateway_reference,
                current_period_start, current_period_end, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, NULLIF(?5, ''), NULLIF(?6, ''), NULLIF(?7, ''), ?8, ?9)
            "#,
            [
                sub.id.as_str(),
                sub.clinic_id.to_string().as_str(),
                sub.plan_id.as_str(),
                sub.status.as_str(),
                sub.gateway_reference.as_deref().unwrap_or(""),
                ts_param(sub.current_period_start).as_str(),
                ts_param(sub.current_period_end).as_str(),
                sub.created_at.to_rfc3339().as_str(),
                sub.updated_at.to_rfc3339().as_str(),
            ],
        )
        .await?;

        info!(subscription_id = %sub.id, clinic_id = %sub.clinic_id, status = %sub.status, "Created subscription");
        Ok(())
    }

    /// Get a subscription by ID
    pub async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        let conn = self.db.connect()?;
        let sql = format!("SELECT {} FROM subscriptions WHERE id = ?1", SUBSCRIPTION_COLUMNS);
        let mut rows = conn.query(&sql, [id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_subscription(&row)?)),
            None => Ok(None),
        }
    }

    /// The clinic's active subscription, if any
    pub async fn active_for_clinic(&self, clinic_id: ClinicId) -> Result<Option<Subscription>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE clinic_id = ?1 AND status = ?2 ORDER BY created_at DESC LIMIT 1",
            SUBSCRIPTION_COLUMNS
        );
        let mut rows = conn
            .query(
                &sql,
                [clinic_id.to_string().as_str(), SubscriptionStatus::Active.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_subscription(&row)?)),
            None => Ok(None),
        }
    }

    /// The clinic's most recent subscription in any status
    pub async fn latest_for_clinic(&self, clinic_id: ClinicId) -> Result<Option<Subscription>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE clinic_id = ?1 ORDER BY created_at DESC LIMIT 1",
            SUBSCRIPTION_COLUMNS
        );
        let mut rows = conn.query(&sql, [clinic_id.to_string().as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_subscription(&row)?)),
            None => Ok(None),
        }
    }

    /// Persist a subscription whose status was `expected` when read
    pub async fn save_subscription(&self, sub: &Subscription, expected: SubscriptionStatus) -> Result<()> {
        let conn = self.db.connect()?;
        update_subscription(&conn, sub, expected).await?;

        info!(subscription_id = %sub.id, status = %sub.status, "Updated subscription");
        Ok(())
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Record a payment
    pub async fn record_payment(&self, payment: &Payment) -> Result<()> {
        let conn = self.db.connect()?;
        insert_payment(&conn, payment).await?;

        info!(
            payment_id = %payment.id,
            subscription_id = %payment.subscription_id,
            status = %payment.status,
            "Recorded payment"
        );
        Ok(())
    }

    /// Record a payment and persist the subscription change it caused
    pub async fn record_payment_for(
        &self,
        payment: &Payment,
        sub: &Subscription,
        expected: SubscriptionStatus,
    ) -> Result<()> {
        let conn = self.db.connect()?;
        begin(&conn).await?;
        let outcome = async {
            insert_payment(&conn, payment).await?;
            update_subscription(&conn, sub, expected).await
        }
        .await;
        finish(&conn, outcome).await?;

        info!(
            payment_id = %payment.id,
            subscription_id = %sub.id,
            status = %sub.status,
            "Applied payment to subscription"
        );
        Ok(())
    }

    /// Payments for a subscription, newest first
    pub async fn list_payments(&self, subscription_id: &str) -> Result<Vec<Payment>> {
        let conn = self.db.connect()?;
        let sql = format!(
            "SELECT {} FROM payments WHERE subscription_id = ?1 ORDER BY processed_at DESC",
            PAYMENT_COLUMNS
        );
        let mut rows = conn.query(&sql, [subscription_id]).await?;

        let mut payments = Vec::new();
        while let Some(row) = rows.next().await? {
            payments.push(row_to_payment(&row)?);
        }
        Ok(payments)
    }
}

async fn update_subscription(conn: &Connection, sub: &Subscription, expected: SubscriptionStatus) -> Result<()> {
    let changed = conn
        .execute(
            r#"
            UPDATE subscriptions SET
                status = ?1,
                gateway_reference = NULLIF(?2, ''),
                current_period_start = NULLIF(?3, ''),
                current_period_end = NULLIF(?4, ''),
                updated_at = ?5
            WHERE id = ?6 AND status = ?7
            "#,
            [
                sub.status.as_str(),
                sub.gateway_reference.as_deref().unwrap_or(""),
                ts_param(sub.current_period_start).as_str(),
                ts_param(sub.current_period_end).as_str(),
                sub.updated_at.to_rfc3339().as_str(),
                sub.id.as_str(),
                expected.as_str(),
            ],
        )
        .await?;

    if changed == 0 {
        return Err(ControlError::transition("subscription", expected.as_str(), sub.status.as_str()));
    }
    Ok(())
}

async fn insert_payment(conn: &Connection, payment: &Payment) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO payments (
            id, subscription_id, amount_cents, currency, status,
            gateway_reference, processed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, NULLIF(?6, ''), ?7)
        "#,
        [
            payment.id.as_str(),
            payment.subscription_id.as_str(),
            payment.amount_cents.to_string().as_str(),
            payment.currency.as_str(),
            payment.status.as_str(),
            payment.gateway_reference.as_deref().unwrap_or(""),
            payment.processed_at.to_rfc3339().as_str(),
        ],
    )
    .await?;
    Ok(())
}

fn row_to_plan(row: &turso::Row) -> Result<SubscriptionPlan> {
    Ok(SubscriptionPlan {
        id: text(row, 0, "plan.id")?,
        name: text(row, 1, "plan.name")?,
        price_monthly_cents: int(row, 2, "plan.price_monthly_cents")?,
        currency: text(row, 3, "plan.currency")?,
        max_users: int(row, 4, "plan.max_users")?,
        max_analyses_per_month: int(row, 5, "plan.max_analyses_per_month")?,
        created_at: timestamp(row, 6, "plan.created_at")?,
    })
}

fn row_to_subscription(row: &turso::Row) -> Result<Subscription> {
    let status_raw = text(row, 3, "subscription.status")?;
    let status = SubscriptionStatus::parse(&status_raw)
        .ok_or_else(|| ControlError::invalid("subscription.status", status_raw))?;

    Ok(Subscription {
        id: text(row, 0, "subscription.id")?,
        clinic_id: id(row, 1, "subscription.clinic_id", ClinicId::parse)?,
        plan_id: text(row, 2, "subscription.plan_id")?,
        status,
        gateway_reference: opt_text(row, 4)?,
        current_period_start: opt_timestamp(row, 5, "subscription.current_period_start")?,
        current_period_end: opt_timestamp(row, 6, "subscription.current_period_end")?,
        created_at: timestamp(row, 7, "subscription.created_at")?,
        updated_at: timestamp(row, 8, "subscription.updated_at")?,
    })
}

fn row_to_payment(row: &turso::Row) -> Result<Payment> {
    let status_raw = text(row, 4, "payment.status")?;
    let status = PaymentStatus::parse(&status_raw)
        .ok_or_else(|| ControlError::invalid("payment.status", status_raw))?;

    Ok(Payment {
        id: text(row, 0, "payment.id")?,
        subscription_id: text(row, 1, "payment.subscription_id")?,
        amount_cents: int(row, 2, "payment.amount_cents")?,
        currency: text(row, 3, "payment.currency")?,
        status,
        gateway_reference: opt_text(row, 5)?,
        processed_at: timestamp(row, 6, "payment.processed_at")?,
    })
}
