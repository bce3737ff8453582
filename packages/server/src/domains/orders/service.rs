//! Order item lifecycle: assignment hand-out, confirm pre-flight and
//! outcome reporting.
//!
//! `report(done)` is where the posting ledger gets written: item update and
//! ledger insert share one transaction, and a unique-violation on the
//! ledger demotes the item to `skipped` instead of surfacing an error
//! (someone else already posted that clip).

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::builder::{JobPayload, OrderBuilder};
use super::models::{ItemStatus, Order, OrderItem, PostingHistory};
use super::{TOPIC_ORDER_COMPLETED, TOPIC_ORDER_DUPLICATE_BLOCKED};
use crate::domains::accounts::ClientAccount;
use crate::domains::catalog::MediaAsset;
use crate::kernel::event_bus::EventBus;

/// Answer to the "can I post?" pre-flight.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Confirmation {
    pub can_post: bool,
    pub reason: String,
}

impl Confirmation {
    fn ok() -> Self {
        Self {
            can_post: true,
            reason: "OK".to_string(),
        }
    }

    fn refuse(reason: impl Into<String>) -> Self {
        Self {
            can_post: false,
            reason: reason.into(),
        }
    }
}

/// Outcome an agent reports for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedOutcome {
    Done,
    Failed,
}

impl ReportedOutcome {
    pub fn parse(s: &str) -> Self {
        match s {
            "failed" => ReportedOutcome::Failed,
            _ => ReportedOutcome::Done,
        }
    }
}

/// What actually happened to a reported job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: i64,
    pub outcome: ItemStatus,
    pub order_completed: bool,
}

/// Lifecycle operations over orders and their items.
pub struct OrderService {
    pool: SqlitePool,
    bus: EventBus,
    builder: Arc<OrderBuilder>,
}

impl OrderService {
    pub fn new(pool: SqlitePool, bus: EventBus, builder: Arc<OrderBuilder>) -> Self {
        Self { pool, bus, builder }
    }

    pub fn builder(&self) -> &Arc<OrderBuilder> {
        &self.builder
    }

    /// Hand out work for an agent: re-offer still-`new` items first, then
    /// fall back to materialising a just-in-time order.
    ///
    /// Returns an empty list for unknown clients and empty pools; both are
    /// the benign "no jobs available" case.
    pub async fn next_jobs(
        &self,
        client_code: &str,
        quantity: u32,
        prod_code: Option<&str>,
    ) -> Result<Vec<JobPayload>> {
        let Some(client) = ClientAccount::find_by_code(client_code, &self.pool).await? else {
            warn!(client_code, "job request from unknown client");
            return Ok(Vec::new());
        };

        let pending =
            OrderItem::next_new_for_client(client.id, client.platform, quantity, &self.pool)
                .await?;
        if !pending.is_empty() {
            let mut payloads = Vec::with_capacity(pending.len());
            for item in pending {
                let media = MediaAsset::find_by_id(item.media_id, &self.pool)
                    .await?
                    .ok_or_else(|| anyhow!("media {} missing for item {}", item.media_id, item.id))?;
                OrderItem::touch_assigned(item.id, &self.pool).await?;
                payloads.push(JobPayload::from_posting_config(
                    item.id,
                    item.media_id,
                    &media.file_hash,
                    &item.posting_config.0,
                ));
            }
            return Ok(payloads);
        }

        let created = self
            .builder
            .create_order(client_code, client.platform, quantity, prod_code)
            .await;
        let Some(order) = created else {
            return Ok(Vec::new());
        };
        for item in &order.items {
            OrderItem::touch_assigned(item.job_id, &self.pool).await?;
        }
        Ok(order.items)
    }

    /// Pre-flight check before an agent publishes.
    ///
    /// `new` items move to `processing`; `processing` is an idempotent OK;
    /// terminal items refuse. Independently of status, a posting-ledger hit
    /// for the item's (client, media, platform) demotes it to `skipped`.
    pub async fn confirm(&self, job_id: i64) -> Result<Confirmation> {
        let mut tx = self.pool.begin().await.context("failed to open transaction")?;

        let Some(item) = OrderItem::find_by_id(job_id, &mut *tx).await? else {
            return Ok(Confirmation::refuse("job not found"));
        };
        let order = Order::find_by_id(item.order_id, &mut *tx)
            .await?
            .ok_or_else(|| anyhow!("order {} missing for item {}", item.order_id, job_id))?;

        if item.status.is_terminal() {
            return Ok(Confirmation::refuse(format!(
                "invalid status: {}",
                serde_json::to_value(item.status)?.as_str().unwrap_or("?")
            )));
        }

        if PostingHistory::exists(order.client_id, item.media_id, order.target_platform, &mut *tx)
            .await?
        {
            OrderItem::mark_skipped(job_id, &mut *tx).await?;
            let order_completed = Self::maybe_complete_order(&order, &mut tx).await?;
            tx.commit().await?;

            self.publish_duplicate_blocked(&order, item.media_id, job_id);
            if order_completed {
                self.publish_order_completed(order.id);
            }
            return Ok(Confirmation::refuse("already posted to this platform"));
        }

        if item.status == ItemStatus::New {
            OrderItem::mark_processing(job_id, &mut *tx).await?;
            tx.commit().await?;
        }
        // Already processing: idempotent OK, nothing to write

        Ok(Confirmation::ok())
    }

    /// Record a job outcome reported by an agent.
    ///
    /// Accepted while the item is non-terminal; agents that skipped the
    /// confirm pre-flight get the `new -> processing` step implied here.
    pub async fn report(
        &self,
        job_id: i64,
        outcome: ReportedOutcome,
        external_id: Option<&str>,
        external_url: Option<&str>,
        log_message: Option<&str>,
    ) -> Result<JobReport> {
        let mut tx = self.pool.begin().await.context("failed to open transaction")?;

        let Some(item) = OrderItem::find_by_id(job_id, &mut *tx).await? else {
            bail!("job {job_id} not found");
        };
        if item.status.is_terminal() {
            bail!(
                "job {job_id} already {}",
                serde_json::to_value(item.status)?.as_str().unwrap_or("?")
            );
        }
        let order = Order::find_by_id(item.order_id, &mut *tx)
            .await?
            .ok_or_else(|| anyhow!("order {} missing for item {}", item.order_id, job_id))?;

        let final_status = match outcome {
            ReportedOutcome::Done => {
                let inserted = PostingHistory::insert(
                    order.client_id,
                    item.media_id,
                    order.target_platform,
                    external_id,
                    external_url,
                    &mut *tx,
                )
                .await;
                match inserted {
                    Ok(_) => {
                        OrderItem::mark_done(job_id, &mut *tx).await?;
                        info!(job_id, "job done, posting recorded");
                        ItemStatus::Done
                    }
                    Err(e) if PostingHistory::is_unique_violation(&e) => {
                        OrderItem::mark_skipped(job_id, &mut *tx).await?;
                        info!(job_id, "duplicate posting blocked, job skipped");
                        ItemStatus::Skipped
                    }
                    Err(e) => return Err(e),
                }
            }
            ReportedOutcome::Failed => {
                OrderItem::mark_failed(job_id, log_message.unwrap_or_default(), &mut *tx).await?;
                warn!(job_id, "job failed: {}", log_message.unwrap_or_default());
                ItemStatus::Failed
            }
        };

        let order_completed = Self::maybe_complete_order(&order, &mut tx).await?;
        tx.commit().await?;

        if final_status == ItemStatus::Skipped {
            self.publish_duplicate_blocked(&order, item.media_id, job_id);
        }
        if order_completed {
            self.publish_order_completed(order.id);
        }

        Ok(JobReport {
            job_id,
            outcome: final_status,
            order_completed,
        })
    }

    /// Flip the order to completed once every item is terminal.
    async fn maybe_complete_order(
        order: &Order,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ) -> Result<bool> {
        if Order::open_item_count(order.id, &mut **tx).await? > 0 {
            return Ok(false);
        }
        Order::mark_completed(order.id, &mut **tx).await?;
        Ok(true)
    }

    fn publish_duplicate_blocked(&self, order: &Order, media_id: i64, job_id: i64) {
        let _ = self.bus.publish(
            TOPIC_ORDER_DUPLICATE_BLOCKED,
            json!({
                "job_id": job_id,
                "order_id": order.id,
                "client_id": order.client_id,
                "media_id": media_id,
                "platform": order.target_platform,
            }),
            Some("OrderService"),
        );
    }

    fn publish_order_completed(&self, order_id: i64) {
        info!(order_id, "order completed");
        let _ = self.bus.publish(
            TOPIC_ORDER_COMPLETED,
            json!({ "order_id": order_id }),
            Some("OrderService"),
        );
    }
}
