//! Where the stats come from.
//!
//! [`StatsSource`] is the seam between the puller and AWS, [`AwsSource`] the
//! real implementation on top of the MSK, CloudWatch and Cost Explorer APIs.
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_cloudwatch::{
    operation::get_metric_statistics::builders::GetMetricStatisticsFluentBuilder,
    primitives::DateTime as AwsDateTime,
    types::{Dimension, Statistic},
};
use aws_sdk_costexplorer::{
    operation::get_cost_and_usage::builders::GetCostAndUsageFluentBuilder,
    types::{DateInterval, Dimension as CostDimension, DimensionValues, Expression, Granularity},
};
use aws_sdk_kafka::types::ClusterState;
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::{
    client::AwsClients,
    metrics::{max_datapoint, MetricQuery, NAMESPACE},
};

/// Service name MSK spend is booked under.
pub const MSK_SERVICE_NAME: &str = "Amazon Managed Streaming for Apache Kafka";

/// Cost metric that is summed up.
pub const COST_METRIC: &str = "UnblendedCost";

/// An active MSK cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSummary {
    pub name: String,
    pub broker_nodes: i32,
    pub instance_type: String,
    pub kafka_version: String,
}

/// Date range of a cost query, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Date format Cost Explorer expects.
pub const COST_DATE_FORMAT: &str = "%Y-%m-%d";

#[async_trait]
pub trait StatsSource: Send + Sync {
    /// All clusters in state `ACTIVE`.
    async fn active_clusters(&self) -> Result<Vec<ClusterSummary>>;

    /// Largest `Average` datapoint of the query, `0` without datapoints.
    async fn metric_max(&self, query: &MetricQuery) -> Result<f64>;

    /// MSK spend within `window` for `region`.
    async fn msk_costs(&self, region: &str, window: CostWindow) -> Result<f64>;
}

/// [`StatsSource`] backed by the AWS APIs.
#[derive(Debug)]
pub struct AwsSource {
    clients: AwsClients,
}

impl AwsSource {
    pub fn new(clients: AwsClients) -> Self {
        Self { clients }
    }

    /// `GetMetricStatistics` request for `query`, Average statistic only.
    fn metric_statistics_request(
        &self,
        query: &MetricQuery,
    ) -> Result<GetMetricStatisticsFluentBuilder> {
        let mut request = self
            .clients
            .cloudwatch
            .get_metric_statistics()
            .namespace(NAMESPACE)
            .metric_name(query.metric)
            .start_time(AwsDateTime::from_secs(query.window.start.timestamp()))
            .end_time(AwsDateTime::from_secs(query.window.end.timestamp()))
            .period(query.period_secs)
            .statistics(Statistic::Average);
        for (name, value) in &query.dimensions {
            request = request.dimensions(
                Dimension::builder()
                    .name(*name)
                    .value(value.clone())
                    .build(),
            );
        }
        Ok(request)
    }

    /// Monthly `UnblendedCost` request for MSK in `region`.
    fn cost_and_usage_request(
        &self,
        region: &str,
        window: CostWindow,
    ) -> Result<GetCostAndUsageFluentBuilder> {
        let time_period = DateInterval::builder()
            .start(window.start.format(COST_DATE_FORMAT).to_string())
            .end(window.end.format(COST_DATE_FORMAT).to_string())
            .build()
            .context("build cost date interval")?;

        Ok(self
            .clients
            .cost_explorer
            .get_cost_and_usage()
            .time_period(time_period)
            .granularity(Granularity::Monthly)
            .filter(msk_cost_filter(region))
            .metrics(COST_METRIC))
    }
}

#[async_trait]
impl StatsSource for AwsSource {
    async fn active_clusters(&self) -> Result<Vec<ClusterSummary>> {
        let mut clusters = vec![];
        let mut pages = self.clients.kafka.list_clusters().into_paginator().send();

        while let Some(page) = pages.next().await {
            let page = page.context("list MSK clusters")?;
            for info in page.cluster_info_list() {
                let Some(name) = info.cluster_name() else {
                    continue;
                };
                if info.state() != Some(&ClusterState::Active) {
                    debug!(cluster = name, state = ?info.state(), "skipping inactive cluster");
                    continue;
                }

                let instance_type = info
                    .broker_node_group_info()
                    .and_then(|group| group.instance_type())
                    .unwrap_or_default()
                    .to_owned();
                let kafka_version = info
                    .current_broker_software_info()
                    .and_then(|software| software.kafka_version())
                    .unwrap_or_default()
                    .to_owned();
                let broker_nodes = info.number_of_broker_nodes().unwrap_or_default();
                if broker_nodes <= 0 {
                    warn!(cluster = name, "active cluster reports no broker nodes");
                }

                clusters.push(ClusterSummary {
                    name: name.to_owned(),
                    broker_nodes,
                    instance_type,
                    kafka_version,
                });
            }
        }

        Ok(clusters)
    }

    async fn metric_max(&self, query: &MetricQuery) -> Result<f64> {
        let response = self
            .metric_statistics_request(query)?
            .send()
            .await
            .with_context(|| format!("get statistics of metric {}", query.metric))?;

        Ok(max_datapoint(
            response
                .datapoints()
                .iter()
                .filter_map(|datapoint| datapoint.average()),
        ))
    }

    async fn msk_costs(&self, region: &str, window: CostWindow) -> Result<f64> {
        let response = self
            .cost_and_usage_request(region, window)?
            .send()
            .await
            .context("get MSK cost and usage")?;

        let amounts = response.results_by_time().iter().filter_map(|result| {
            result
                .total()
                .and_then(|total| total.get(COST_METRIC))
                .and_then(|value| value.amount())
        });
        sum_amounts(amounts)
    }
}

/// MSK spend booked in `region`.
fn msk_cost_filter(region: &str) -> Expression {
    Expression::builder()
        .and(dimension_filter(CostDimension::Region, region))
        .and(dimension_filter(CostDimension::Service, MSK_SERVICE_NAME))
        .build()
}

fn dimension_filter(key: CostDimension, value: &str) -> Expression {
    Expression::builder()
        .dimensions(DimensionValues::builder().key(key).values(value).build())
        .build()
}

/// Sum cost amounts, which Cost Explorer reports as decimal strings.
pub fn sum_amounts<'a>(amounts: impl IntoIterator<Item = &'a str>) -> Result<f64> {
    amounts.into_iter().try_fold(0.0, |sum, amount| {
        let amount: f64 = amount
            .trim()
            .parse()
            .with_context(|| format!("invalid cost amount: {amount:?}"))?;
        Ok::<_, anyhow::Error>(sum + amount)
    })
}
