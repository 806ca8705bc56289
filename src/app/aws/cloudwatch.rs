use super::region;
use super::sdk_errors::{remote_error, remote_failure};
use crate::app::config::CloudWatchSettings;
use crate::app::messaging::alarm::{AlarmDefinition, AlarmProvider, AlarmState};
use crate::app::messaging::errors::MessagingResult;
use crate::app::messaging::provider::{CreatedResource, RemoteHandle, RemoteResourceProvider};
use crate::app::messaging::resource_info::ResourceAttributes;
use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_cloudwatch as cloudwatch;
use aws_types::SdkConfig;
use cloudwatch::types::{ComparisonOperator, Dimension, MetricAlarm, StateValue, Statistic};

const SERVICE: &str = "CloudWatch";

pub struct CloudWatchProvider {
    client: cloudwatch::Client,
}

impl CloudWatchProvider {
    pub fn new(sdk: &SdkConfig, settings: &CloudWatchSettings) -> Self {
        let conf = cloudwatch::config::Builder::from(sdk)
            .region(region(&settings.common.region))
            .build();
        Self {
            client: cloudwatch::Client::from_conf(conf),
        }
    }

    async fn describe(&self, alarm_name: &str) -> MessagingResult<Option<MetricAlarm>> {
        let response = self
            .client
            .describe_alarms()
            .alarm_names(alarm_name)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "DescribeAlarms").for_resource(alarm_name))?;
        Ok(response.metric_alarms.unwrap_or_default().into_iter().next())
    }
}

/// Flatten a metric alarm into string attributes.
fn alarm_attributes(alarm: &MetricAlarm) -> ResourceAttributes {
    let mut attrs = ResourceAttributes::new();
    let mut put = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            attrs.insert(key.to_string(), value);
        }
    };

    put("AlarmName", alarm.alarm_name.clone());
    put("AlarmArn", alarm.alarm_arn.clone());
    put("AlarmDescription", alarm.alarm_description.clone());
    put("Namespace", alarm.namespace.clone());
    put("MetricName", alarm.metric_name.clone());
    put("Period", alarm.period.map(|p| p.to_string()));
    put("EvaluationPeriods", alarm.evaluation_periods.map(|p| p.to_string()));
    put("Threshold", alarm.threshold.map(|t| t.to_string()));
    put(
        "ComparisonOperator",
        alarm.comparison_operator.as_ref().map(|c| c.as_str().to_string()),
    );
    put("Statistic", alarm.statistic.as_ref().map(|s| s.as_str().to_string()));
    put("TreatMissingData", alarm.treat_missing_data.clone());
    put("StateValue", alarm.state_value.as_ref().map(|s| s.as_str().to_string()));
    put("StateReason", alarm.state_reason.clone());
    put(
        "AlarmActions",
        alarm.alarm_actions.as_ref().map(|actions| actions.join(",")),
    );
    if let Some(dimension) = alarm.dimensions.as_ref().and_then(|d| d.first()) {
        put("DimensionName", dimension.name.clone());
        put("DimensionValue", dimension.value.clone());
    }
    attrs
}

#[async_trait]
impl RemoteResourceProvider for CloudWatchProvider {
    fn service(&self) -> &str {
        SERVICE
    }

    async fn list_all(&self) -> MessagingResult<Vec<RemoteHandle>> {
        let mut paginator = self.client.describe_alarms().into_paginator().send();

        let mut handles = Vec::new();
        while let Some(page) = paginator.next().await {
            let page = page.map_err(|e| remote_error(e, SERVICE, "DescribeAlarms"))?;
            for alarm in page.metric_alarms.unwrap_or_default() {
                if let Some(name) = alarm.alarm_name {
                    let mut handle = RemoteHandle::named(name);
                    handle.arn = alarm.alarm_arn;
                    handles.push(handle);
                }
            }
        }
        Ok(handles)
    }

    async fn create_resource(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<CreatedResource> {
        let def = AlarmDefinition::from_attributes(name, attributes)?;
        let dimension = Dimension::builder()
            .name(&def.dimension_name)
            .value(&def.dimension_value)
            .build();

        self.client
            .put_metric_alarm()
            .alarm_name(&def.alarm_name)
            .namespace(&def.namespace)
            .metric_name(&def.metric_name)
            .period(def.period)
            .evaluation_periods(def.evaluation_periods)
            .threshold(def.threshold)
            .comparison_operator(ComparisonOperator::from(def.comparison_operator.as_str()))
            .statistic(Statistic::from(def.statistic.as_str()))
            .treat_missing_data(&def.treat_missing_data)
            .set_alarm_actions(Some(def.alarm_actions.clone()))
            .dimensions(dimension)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "PutMetricAlarm").for_resource(name))?;

        let alarm = self.describe(name).await?.ok_or_else(|| {
            remote_failure(anyhow!("alarm not visible after PutMetricAlarm"), SERVICE, "DescribeAlarms")
                .for_resource(name)
        })?;
        let arn = alarm.alarm_arn.clone().ok_or_else(|| {
            remote_failure(anyhow!("alarm has no ARN"), SERVICE, "DescribeAlarms").for_resource(name)
        })?;
        Ok(CreatedResource {
            arn,
            url: None,
            attributes: alarm_attributes(&alarm),
        })
    }

    async fn delete_resource(&self, handle: &RemoteHandle) -> MessagingResult<()> {
        self.client
            .delete_alarms()
            .alarm_names(&handle.name)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "DeleteAlarms").for_resource(&handle.name))?;
        Ok(())
    }

    async fn get_attributes(&self, handle: &RemoteHandle) -> MessagingResult<ResourceAttributes> {
        self.describe(&handle.name)
            .await?
            .map(|alarm| alarm_attributes(&alarm))
            .ok_or_else(|| {
                remote_failure(anyhow!("ResourceNotFound: no such alarm"), SERVICE, "DescribeAlarms")
                    .for_resource(&handle.name)
            })
    }
}

#[async_trait]
impl AlarmProvider for CloudWatchProvider {
    async fn set_alarm_state(
        &self,
        alarm_name: &str,
        state: AlarmState,
        reason: &str,
        reason_data: &str,
    ) -> MessagingResult<()> {
        self.client
            .set_alarm_state()
            .alarm_name(alarm_name)
            .state_value(StateValue::from(state.as_str()))
            .state_reason(reason)
            .state_reason_data(reason_data)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "SetAlarmState").for_resource(alarm_name))?;
        Ok(())
    }

    async fn describe_alarm(&self, alarm_name: &str) -> MessagingResult<Option<ResourceAttributes>> {
        Ok(self.describe(alarm_name).await?.map(|alarm| alarm_attributes(&alarm)))
    }
}
