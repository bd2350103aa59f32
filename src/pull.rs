//! Pull the usage stats of one account.
use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    metrics::{Collection, MetricKind, MetricQuery, AVERAGE_METRICS, PEAK_METRICS},
    source::{CostWindow, StatsSource},
};

/// Days of spend covered by the cost query.
pub const COST_PERIOD_DAYS: u64 = 30;

/// Value of one metric for one broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub metric: &'static str,
    pub value: f64,
}

/// Stats of one broker node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerRow {
    pub region: String,
    pub cluster_name: String,
    pub node_id: i32,
    pub node_type: String,
    pub kafka_version: String,

    /// In [`AVERAGE_METRICS`] order.
    pub averages: Vec<MetricValue>,

    /// In [`PEAK_METRICS`] order.
    pub peaks: Vec<MetricValue>,
}

/// MSK spend of one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub region: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub costs: f64,
}

/// Everything pulled for one config section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountReport {
    pub account: String,
    pub region: String,
    pub period_days: u32,

    /// Sorted by cluster name, then node id.
    pub brokers: Vec<BrokerRow>,
    pub costs: CostSummary,
}

/// Pull cluster metrics and costs of one account.
///
/// `today` is the UTC date the metric and cost windows end at.
pub async fn pull_account(
    source: &dyn StatsSource,
    account: &str,
    region: &str,
    collection: &Collection,
    today: NaiveDate,
) -> Result<AccountReport> {
    let clusters = source.active_clusters().await?;
    info!(account, region, clusters = clusters.len(), "found active clusters");

    let window = collection.window(today);
    let mut brokers = vec![];
    for cluster in &clusters {
        for node_id in 1..=cluster.broker_nodes {
            info!(
                account,
                cluster = cluster.name.as_str(),
                node_id,
                node_type = cluster.instance_type.as_str(),
                "pulling broker metrics",
            );

            let mut averages = Vec::with_capacity(AVERAGE_METRICS.len());
            for &metric in AVERAGE_METRICS {
                let query = MetricQuery::new(
                    collection,
                    window,
                    &cluster.name,
                    node_id,
                    metric,
                    MetricKind::Average,
                );
                averages.push(pull_metric(source, &query, &cluster.name, node_id).await?);
            }
            let mut peaks = Vec::with_capacity(PEAK_METRICS.len());
            for &metric in PEAK_METRICS {
                let query = MetricQuery::new(
                    collection,
                    window,
                    &cluster.name,
                    node_id,
                    metric,
                    MetricKind::Peak,
                );
                peaks.push(pull_metric(source, &query, &cluster.name, node_id).await?);
            }

            brokers.push(BrokerRow {
                region: region.to_owned(),
                cluster_name: cluster.name.clone(),
                node_id,
                node_type: cluster.instance_type.clone(),
                kafka_version: cluster.kafka_version.clone(),
                averages,
                peaks,
            });
        }
    }
    brokers.sort_by(|a, b| {
        a.cluster_name
            .cmp(&b.cluster_name)
            .then(a.node_id.cmp(&b.node_id))
    });

    let cost_window = CostWindow {
        start: today
            .checked_sub_days(Days::new(COST_PERIOD_DAYS))
            .unwrap_or(NaiveDate::MIN),
        end: today,
    };
    let costs = source.msk_costs(region, cost_window).await?;
    info!(account, region, costs, "pulled MSK costs");

    Ok(AccountReport {
        account: account.to_owned(),
        region: region.to_owned(),
        period_days: collection.period_days,
        brokers,
        costs: CostSummary {
            region: region.to_owned(),
            start: cost_window.start,
            end: cost_window.end,
            costs,
        },
    })
}

async fn pull_metric(
    source: &dyn StatsSource,
    query: &MetricQuery,
    cluster: &str,
    node_id: i32,
) -> Result<MetricValue> {
    debug!(
        metric = query.metric,
        kind = ?query.kind,
        dimensions = ?query.dimensions,
        "get metric statistics",
    );
    let value = source.metric_max(query).await.with_context(|| {
        format!(
            "metric {} of broker {node_id} in cluster {cluster}",
            query.metric
        )
    })?;
    Ok(MetricValue {
        metric: query.metric,
        value,
    })
}
