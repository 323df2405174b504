//! Handlers for checkout events.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::consumer::{EventHandler, ProcessingError};
use crate::events::envelope::EventEnvelope;

/// Totals of a shopping list as computed by the list service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListSummary {
    pub total_items: u64,
    pub purchased_items: u64,
    pub estimated_total: f64,
}

/// Payload of `list.checkout.completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutEvent {
    pub list_id: Option<String>,
    pub user_id: Option<String>,
    pub list_name: Option<String>,
    pub summary: Option<ListSummary>,
    #[serde(default)]
    pub items: Vec<Value>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CheckoutEvent {
    fn from_envelope(event: &EventEnvelope) -> Result<(Self, ListSummary), ProcessingError> {
        let checkout: CheckoutEvent = event.payload_as()?;
        let summary = checkout.summary.ok_or(ProcessingError::MissingField("summary"))?;
        Ok((checkout, summary))
    }
}

/// Sends (logs) a purchase receipt for every completed checkout.
#[derive(Debug, Default)]
pub struct NotificationHandler {
    sent: AtomicU64,
}

impl NotificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<(), ProcessingError> {
        let (checkout, summary) = CheckoutEvent::from_envelope(event)?;

        tracing::info!(
            list_id = checkout.list_id.as_deref().unwrap_or("-"),
            list_name = checkout.list_name.as_deref().unwrap_or("-"),
            user_id = checkout.user_id.as_deref().unwrap_or("-"),
            total = %format!("{:.2}", summary.estimated_total),
            items = summary.total_items,
            purchased = summary.purchased_items,
            completed_at = ?checkout.completed_at,
            "Purchase receipt sent"
        );

        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// One completed checkout as remembered by analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRecord {
    pub list_id: Option<String>,
    pub list_name: Option<String>,
    pub total: f64,
    pub items: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Checkouts kept in [`AnalyticsStats::recent`].
pub const RECENT_CHECKOUTS: usize = 100;

/// Largest checkouts kept in [`AnalyticsStats::top`].
pub const TOP_PURCHASES: usize = 3;

/// Running totals over every processed checkout.
///
/// Totals cover the whole process lifetime; individual records are only
/// kept for the latest [`RECENT_CHECKOUTS`] and the [`TOP_PURCHASES`] largest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsStats {
    pub total_checkouts: u64,
    pub total_revenue: f64,
    pub total_items: u64,
    /// Newest last.
    pub recent: VecDeque<CheckoutRecord>,
    /// Largest first.
    pub top: Vec<CheckoutRecord>,
}

impl AnalyticsStats {
    fn record(&mut self, record: CheckoutRecord) {
        self.total_checkouts += 1;
        self.total_revenue += record.total;
        self.total_items += record.items;

        let rank = self.top.partition_point(|r| r.total >= record.total);
        if rank < TOP_PURCHASES {
            self.top.insert(rank, record.clone());
            self.top.truncate(TOP_PURCHASES);
        }

        if self.recent.len() == RECENT_CHECKOUTS {
            self.recent.pop_front();
        }
        self.recent.push_back(record);
    }

    /// Revenue per checkout; zero before the first one.
    pub fn average_ticket(&self) -> f64 {
        if self.total_checkouts == 0 {
            0.0
        } else {
            self.total_revenue / self.total_checkouts as f64
        }
    }

    /// Up to `n` (at most [`TOP_PURCHASES`]) largest checkouts, largest first.
    pub fn top_purchases(&self, n: usize) -> &[CheckoutRecord] {
        &self.top[..n.min(self.top.len())]
    }
}

/// Aggregates checkout statistics in memory.
#[derive(Debug, Default)]
pub struct AnalyticsHandler {
    stats: Mutex<AnalyticsStats>,
}

impl AnalyticsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> AnalyticsStats {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AnalyticsStats> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventHandler for AnalyticsHandler {
    fn name(&self) -> &'static str {
        "analytics"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<(), ProcessingError> {
        let (checkout, summary) = CheckoutEvent::from_envelope(event)?;

        let mut stats = self.lock();
        stats.record(CheckoutRecord {
            list_id: checkout.list_id.clone(),
            list_name: checkout.list_name.clone(),
            total: summary.estimated_total,
            items: summary.total_items,
            timestamp: checkout.completed_at,
        });

        tracing::info!(
            checkout = stats.total_checkouts,
            list_id = checkout.list_id.as_deref().unwrap_or("-"),
            amount = %format!("{:.2}", summary.estimated_total),
            total_revenue = %format!("{:.2}", stats.total_revenue),
            total_items = stats.total_items,
            average_ticket = %format!("{:.2}", stats.average_ticket()),
            "Analytics updated"
        );

        if stats.top.len() == TOP_PURCHASES {
            for (rank, record) in stats.top_purchases(TOP_PURCHASES).iter().enumerate() {
                tracing::info!(
                    rank = rank + 1,
                    list_name = record.list_name.as_deref().unwrap_or("-"),
                    total = %format!("{:.2}", record.total),
                    items = record.items,
                    "Top purchase"
                );
            }
        }
        Ok(())
    }
}
