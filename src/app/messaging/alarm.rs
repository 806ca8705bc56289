//! CloudWatch metric alarms on queues and topics.

use super::cache::ResourceContext;
use super::errors::{MessagingError, MessagingResult};
use super::provider::RemoteResourceProvider;
use super::queue::QueueClient;
use super::resource_info::{ResourceAttributes, ResourceInfo, ResourceKind};
use super::service_client::{MessagingService, ResourceStrategy, ServiceClient, ServiceClientParts};
use super::topic::TopicClient;
use crate::app::config::CloudWatchSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// Attribute keys an alarm definition travels under on create.
pub const ATTR_NAMESPACE: &str = "Namespace";
pub const ATTR_METRIC_NAME: &str = "MetricName";
pub const ATTR_PERIOD: &str = "Period";
pub const ATTR_EVALUATION_PERIODS: &str = "EvaluationPeriods";
pub const ATTR_THRESHOLD: &str = "Threshold";
pub const ATTR_ALARM_ACTIONS: &str = "AlarmActions";
pub const ATTR_DIMENSION_NAME: &str = "DimensionName";
pub const ATTR_DIMENSION_VALUE: &str = "DimensionValue";
pub const ATTR_COMPARISON_OPERATOR: &str = "ComparisonOperator";
pub const ATTR_STATISTIC: &str = "Statistic";
pub const ATTR_TREAT_MISSING_DATA: &str = "TreatMissingData";

/// Notification protocols the queue-alarm workflow subscribes, in order.
pub const NOTIFICATION_PROTOCOLS: [&str; 6] = ["email", "sqs", "sms", "lambda", "http", "https"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ALARM")]
    Alarm,
    #[serde(rename = "INSUFFICIENT_DATA")]
    InsufficientData,
}

impl AlarmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Ok => "OK",
            AlarmState::Alarm => "ALARM",
            AlarmState::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmState {
    type Err = MessagingError;

    /// Accepts the CloudWatch values in any case, plus `on`/`off`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OK" | "OFF" => Ok(AlarmState::Ok),
            "ALARM" | "ON" => Ok(AlarmState::Alarm),
            "INSUFFICIENT_DATA" => Ok(AlarmState::InsufficientData),
            other => Err(MessagingError::InvalidArgument(format!(
                "unknown alarm state: {}",
                other
            ))),
        }
    }
}

/// Everything needed to put a metric alarm.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmDefinition {
    pub alarm_name: String,
    pub namespace: String,
    pub metric_name: String,
    pub period: i32,
    pub evaluation_periods: i32,
    pub threshold: f64,
    pub alarm_actions: Vec<String>,
    pub dimension_name: String,
    pub dimension_value: String,
    pub comparison_operator: String,
    pub statistic: String,
    pub treat_missing_data: String,
}

impl AlarmDefinition {
    /// Encode as create attributes. Comparison, statistic and missing-data
    /// treatment are left to the configured defaults when empty.
    pub fn to_attributes(&self) -> ResourceAttributes {
        let mut attrs = ResourceAttributes::new();
        attrs.insert(ATTR_NAMESPACE.into(), self.namespace.clone());
        attrs.insert(ATTR_METRIC_NAME.into(), self.metric_name.clone());
        attrs.insert(ATTR_PERIOD.into(), self.period.to_string());
        attrs.insert(ATTR_EVALUATION_PERIODS.into(), self.evaluation_periods.to_string());
        attrs.insert(ATTR_THRESHOLD.into(), self.threshold.to_string());
        attrs.insert(ATTR_ALARM_ACTIONS.into(), self.alarm_actions.join(","));
        attrs.insert(ATTR_DIMENSION_NAME.into(), self.dimension_name.clone());
        attrs.insert(ATTR_DIMENSION_VALUE.into(), self.dimension_value.clone());
        for (key, value) in [
            (ATTR_COMPARISON_OPERATOR, &self.comparison_operator),
            (ATTR_STATISTIC, &self.statistic),
            (ATTR_TREAT_MISSING_DATA, &self.treat_missing_data),
        ] {
            if !value.is_empty() {
                attrs.insert(key.into(), value.clone());
            }
        }
        attrs
    }

    /// Decode what [`to_attributes`](Self::to_attributes) produced, after defaults
    /// were merged in. Used by providers.
    pub fn from_attributes(alarm_name: &str, attrs: &ResourceAttributes) -> MessagingResult<Self> {
        let text = |key: &str| -> MessagingResult<String> {
            attrs.get(key).cloned().ok_or_else(|| {
                MessagingError::InvalidArgument(format!("alarm {} is missing {}", alarm_name, key))
            })
        };
        fn parse<T: FromStr>(alarm_name: &str, key: &str, raw: &str) -> MessagingResult<T> {
            raw.trim().parse::<T>().map_err(|_| {
                MessagingError::InvalidArgument(format!(
                    "alarm {}: {} is not a valid {}: {}",
                    alarm_name,
                    key,
                    std::any::type_name::<T>(),
                    raw
                ))
            })
        }
        let integer = |key: &str| -> MessagingResult<i32> { parse(alarm_name, key, &text(key)?) };
        let number = |key: &str| -> MessagingResult<f64> { parse(alarm_name, key, &text(key)?) };

        Ok(Self {
            alarm_name: alarm_name.to_string(),
            namespace: text(ATTR_NAMESPACE)?,
            metric_name: text(ATTR_METRIC_NAME)?,
            period: integer(ATTR_PERIOD)?,
            evaluation_periods: integer(ATTR_EVALUATION_PERIODS)?,
            threshold: number(ATTR_THRESHOLD)?,
            alarm_actions: attrs
                .get(ATTR_ALARM_ACTIONS)
                .map(|a| {
                    a.split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            dimension_name: text(ATTR_DIMENSION_NAME)?,
            dimension_value: text(ATTR_DIMENSION_VALUE)?,
            comparison_operator: text(ATTR_COMPARISON_OPERATOR)?,
            statistic: text(ATTR_STATISTIC)?,
            treat_missing_data: text(ATTR_TREAT_MISSING_DATA)?,
        })
    }
}

/// Body of the create-alarm-for-queue workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmForQueueRequest {
    pub queue: String,
    pub metric: String,
    #[serde(default = "default_one")]
    pub period: i32,
    #[serde(default = "default_one")]
    pub eval_period: i32,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub topic: String,
    #[serde(default)]
    pub notifications: AlarmNotifications,
}

fn default_one() -> i32 {
    1
}

fn default_threshold() -> f64 {
    1.0
}

/// Endpoints to subscribe to the alarm's notification topic, per protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmNotifications {
    pub emails: Vec<String>,
    pub queues: Vec<String>,
    pub sms: Vec<String>,
    pub lambdas: Vec<String>,
    pub http: Vec<String>,
    pub https: Vec<String>,
}

impl AlarmNotifications {
    /// `(protocol, endpoint)` pairs in subscription order.
    pub fn targets(&self) -> Vec<(&'static str, &str)> {
        let groups = [
            &self.emails,
            &self.queues,
            &self.sms,
            &self.lambdas,
            &self.http,
            &self.https,
        ];
        NOTIFICATION_PROTOCOLS
            .iter()
            .zip(groups)
            .flat_map(|(protocol, endpoints)| endpoints.iter().map(move |e| (*protocol, e.as_str())))
            .collect()
    }
}

#[async_trait]
pub trait AlarmProvider: RemoteResourceProvider {
    async fn set_alarm_state(
        &self,
        alarm_name: &str,
        state: AlarmState,
        reason: &str,
        reason_data: &str,
    ) -> MessagingResult<()>;

    /// Current description of one alarm, `None` if it does not exist.
    async fn describe_alarm(&self, alarm_name: &str) -> MessagingResult<Option<ResourceAttributes>>;
}

/// Alarm defaults: comparison, statistic and missing-data treatment.
pub struct AlarmStrategy {
    comparison_operator: String,
    statistic: String,
    treat_missing_data: String,
}

impl AlarmStrategy {
    pub fn new(settings: &CloudWatchSettings) -> Self {
        Self {
            comparison_operator: settings.comparison_operator.clone(),
            statistic: settings.statistic.clone(),
            treat_missing_data: settings.treat_missing_data.clone(),
        }
    }
}

impl ResourceStrategy for AlarmStrategy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::CloudwatchAlarm
    }

    fn default_attributes(&self) -> ResourceAttributes {
        let mut attrs = ResourceAttributes::new();
        attrs.insert(ATTR_COMPARISON_OPERATOR.into(), self.comparison_operator.clone());
        attrs.insert(ATTR_STATISTIC.into(), self.statistic.clone());
        attrs.insert(ATTR_TREAT_MISSING_DATA.into(), self.treat_missing_data.clone());
        attrs
    }
}

pub struct AlarmClient {
    core: Arc<ServiceClient>,
    alarms: Arc<dyn AlarmProvider>,
}

impl AlarmClient {
    pub fn new<P>(
        name: impl Into<String>,
        provider: Arc<P>,
        settings: CloudWatchSettings,
        context: Arc<ResourceContext>,
    ) -> Self
    where
        P: AlarmProvider + 'static,
    {
        let core = ServiceClient::new(ServiceClientParts {
            name: name.into(),
            service_type: "CloudWatch".into(),
            strategy: Arc::new(AlarmStrategy::new(&settings)),
            provider: provider.clone() as Arc<dyn RemoteResourceProvider>,
            settings: settings.common,
            context,
        });
        Self {
            core,
            alarms: provider,
        }
    }

    /// Alarm on `metric_name` of a queue or topic, notifying `target_arn`.
    ///
    /// The alarm is named `<resource><metric>Alarm`; namespace and dimension follow
    /// the resource kind.
    pub async fn create_alarm(
        &self,
        resource: &ResourceInfo,
        metric_name: &str,
        period: i32,
        evaluation_periods: i32,
        threshold: f64,
        target_arn: &str,
    ) -> MessagingResult<ResourceInfo> {
        let definition = alarm_definition_for(
            resource,
            metric_name,
            period,
            evaluation_periods,
            threshold,
            target_arn,
        )?;
        self.core
            .create(&definition.alarm_name, &definition.to_attributes())
            .await
    }

    /// The queue-alarm workflow: the queue must already exist, the notification
    /// topic is created on demand and every notification endpoint is subscribed
    /// before the alarm is put.
    pub async fn create_alarm_for_queue(
        &self,
        request: &AlarmForQueueRequest,
    ) -> MessagingResult<ResourceInfo> {
        let manager = self.core.manager().ok_or_else(|| {
            MessagingError::UnknownService("no manager registered for alarm client".into())
        })?;
        let queues = manager
            .first_of::<QueueClient>()
            .ok_or_else(|| MessagingError::UnknownService("SQS".into()))?;
        let topics = manager
            .first_of::<TopicClient>()
            .ok_or_else(|| MessagingError::UnknownService("SNS".into()))?;

        let queue = queues
            .get_queue_info(&request.queue, false)
            .await?
            .ok_or_else(|| MessagingError::not_found(ResourceKind::Queue, &request.queue))?;

        let topic = topics
            .get_topic_info(&request.topic, true)
            .await?
            .ok_or_else(|| MessagingError::not_found(ResourceKind::Topic, &request.topic))?;
        let topic_arn = topic.arn.clone().ok_or_else(|| {
            MessagingError::InvalidArgument(format!("topic {} has no ARN", topic.name))
        })?;

        for (protocol, endpoint) in request.notifications.targets() {
            if let Err(e) = topics.subscribe(&topic, protocol, endpoint).await {
                svc_warn!(
                    self.core.name(),
                    "Could not subscribe {} {} to {}: {}",
                    protocol,
                    endpoint,
                    topic.name,
                    e
                );
            }
        }

        self.create_alarm(
            &queue,
            &request.metric,
            request.period,
            request.eval_period,
            request.threshold,
            &topic_arn,
        )
        .await
    }

    pub async fn set_state(
        &self,
        alarm_name: &str,
        state: AlarmState,
        reason: &str,
        reason_data: Option<&str>,
    ) -> MessagingResult<bool> {
        self.alarms
            .set_alarm_state(alarm_name, state, reason, reason_data.unwrap_or("{}"))
            .await
            .map_err(|e| {
                let e = e.for_resource(alarm_name);
                svc_error!(self.core.name(), "set state on {} failed: {}", alarm_name, e);
                e
            })?;
        svc_info!(self.core.name(), "Alarm {} set to {}", alarm_name, state);
        Ok(true)
    }

    pub async fn describe_alarm(&self, alarm_name: &str) -> MessagingResult<ResourceAttributes> {
        self.alarms
            .describe_alarm(alarm_name)
            .await?
            .ok_or_else(|| MessagingError::not_found(ResourceKind::CloudwatchAlarm, alarm_name))
    }

    pub async fn delete_alarm(&self, alarm_name: &str) -> MessagingResult<bool> {
        self.core.delete(alarm_name).await
    }

    pub async fn get_alarm_info(&self, alarm_name: &str) -> MessagingResult<Option<ResourceInfo>> {
        self.core.get_info(alarm_name, false).await
    }
}

impl MessagingService for AlarmClient {
    fn core(&self) -> &Arc<ServiceClient> {
        &self.core
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Derive the alarm definition for a metric on `resource`.
pub fn alarm_definition_for(
    resource: &ResourceInfo,
    metric_name: &str,
    period: i32,
    evaluation_periods: i32,
    threshold: f64,
    target_arn: &str,
) -> MessagingResult<AlarmDefinition> {
    let (namespace, dimension_name) = match (
        resource.kind.metric_namespace(),
        resource.kind.dimension_name(),
    ) {
        (Some(ns), Some(dim)) => (ns, dim),
        _ => {
            return Err(MessagingError::InvalidArgument(format!(
                "cannot alarm on a {}",
                resource.kind
            )))
        }
    };

    Ok(AlarmDefinition {
        alarm_name: format!("{}{}Alarm", resource.name, metric_name),
        namespace: namespace.to_string(),
        metric_name: metric_name.to_string(),
        period,
        evaluation_periods,
        threshold,
        alarm_actions: vec![target_arn.to_string()],
        dimension_name: dimension_name.to_string(),
        dimension_value: resource.name.clone(),
        comparison_operator: String::new(),
        statistic: String::new(),
        treat_missing_data: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_queue_alarm_definition() {
        let queue = ResourceInfo::new(ResourceKind::Queue, "orders").with_arn("arn:q");
        let def =
            alarm_definition_for(&queue, "NumberOfMessagesReceived", 60, 5, 1.0, "arn:t").unwrap();
        assert_eq!(def.alarm_name, "ordersNumberOfMessagesReceivedAlarm");
        assert_eq!(def.namespace, "AWS/SQS");
        assert_eq!(def.dimension_name, "QueueName");
        assert_eq!(def.dimension_value, "orders");
        assert_eq!(def.alarm_actions, vec!["arn:t".to_string()]);
    }

    #[test]
    fn test_topic_alarm_definition() {
        let topic = ResourceInfo::new(ResourceKind::Topic, "alerts").with_arn("arn:t");
        let def = alarm_definition_for(&topic, "NumberOfMessagesPublished", 60, 1, 3.0, "arn:x")
            .unwrap();
        assert_eq!(def.namespace, "AWS/SNS");
        assert_eq!(def.dimension_name, "TopicName");
    }

    #[test]
    fn test_alarm_on_alarm_is_rejected() {
        let alarm = ResourceInfo::new(ResourceKind::CloudwatchAlarm, "a").with_arn("arn:a");
        assert!(matches!(
            alarm_definition_for(&alarm, "M", 1, 1, 1.0, "arn:t"),
            Err(MessagingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_definition_survives_attribute_encoding() {
        let queue = ResourceInfo::new(ResourceKind::Queue, "orders").with_arn("arn:q");
        let def = alarm_definition_for(&queue, "M", 60, 5, 2.5, "arn:t").unwrap();
        let mut attrs = AlarmStrategy::new(&CloudWatchSettings::default()).default_attributes();
        attrs.extend(def.to_attributes());

        let decoded = AlarmDefinition::from_attributes(&def.alarm_name, &attrs).unwrap();
        assert_eq!(decoded.threshold, 2.5);
        assert_eq!(decoded.comparison_operator, "GreaterThanOrEqualToThreshold");
        assert_eq!(decoded.statistic, "Sum");
        assert_eq!(decoded.treat_missing_data, "missing");
    }

    #[test]
    fn test_fractional_or_oversized_periods_are_rejected() {
        let queue = ResourceInfo::new(ResourceKind::Queue, "orders").with_arn("arn:q");
        let def = alarm_definition_for(&queue, "M", 60, 5, 1.0, "arn:t").unwrap();

        for (key, raw) in [(ATTR_PERIOD, "60.5"), (ATTR_EVALUATION_PERIODS, "1e12")] {
            let mut attrs = AlarmStrategy::new(&CloudWatchSettings::default()).default_attributes();
            attrs.extend(def.to_attributes());
            attrs.insert(key.into(), raw.into());
            let err = AlarmDefinition::from_attributes(&def.alarm_name, &attrs).unwrap_err();
            assert!(
                matches!(err, MessagingError::InvalidArgument(ref m) if m.contains(raw)),
                "{}={} gave {:?}",
                key,
                raw,
                err
            );
        }
    }

    #[test]
    fn test_missing_attribute_is_invalid_argument() {
        let err = AlarmDefinition::from_attributes("x", &ResourceAttributes::new()).unwrap_err();
        assert!(matches!(err, MessagingError::InvalidArgument(_)));
    }

    #[test]
    fn test_alarm_state_parsing() {
        assert_eq!("ok".parse::<AlarmState>().unwrap(), AlarmState::Ok);
        assert_eq!("ALARM".parse::<AlarmState>().unwrap(), AlarmState::Alarm);
        assert_eq!("on".parse::<AlarmState>().unwrap(), AlarmState::Alarm);
        assert_eq!(
            "insufficient_data".parse::<AlarmState>().unwrap(),
            AlarmState::InsufficientData
        );
        assert!("maybe".parse::<AlarmState>().is_err());
    }

    #[test]
    fn test_notification_targets_order() {
        let notifications = AlarmNotifications {
            emails: vec!["ops@example.com".into()],
            https: vec!["https://hook".into()],
            queues: vec!["arn:aws:sqs:r:1:q".into()],
            ..Default::default()
        };
        assert_eq!(
            notifications.targets(),
            vec![
                ("email", "ops@example.com"),
                ("sqs", "arn:aws:sqs:r:1:q"),
                ("https", "https://hook"),
            ]
        );
    }

    #[test]
    fn test_request_defaults() {
        let request: AlarmForQueueRequest = serde_json::from_str(
            r#"{"queue": "orders", "metric": "NumberOfMessagesSent", "topic": "ops"}"#,
        )
        .unwrap();
        assert_eq!(request.period, 1);
        assert_eq!(request.eval_period, 1);
        assert_eq!(request.threshold, 1.0);
        assert!(request.notifications.targets().is_empty());
    }
}
