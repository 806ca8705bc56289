//! AWS SDK backed providers.

pub mod cloudwatch;
pub mod sdk_errors;
pub mod sns;
pub mod sqs;

pub use cloudwatch::CloudWatchProvider;
pub use sns::SnsProvider;
pub use sqs::SqsProvider;

use crate::app::config::MessagingConfig;
use aws_config::BehaviorVersion;
use aws_types::region::Region;
use aws_types::SdkConfig;

/// Shared SDK configuration: default credential chain (or the configured profile)
/// and the SQS region as the default. Each provider overrides the region with its
/// own service setting.
pub async fn load_sdk_config(config: &MessagingConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.sqs.common.region.clone()));
    if let Some(profile) = &config.app_settings.profile {
        tracing::info!("Using AWS profile {}", profile);
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

pub(crate) fn region(name: &str) -> Region {
    Region::new(name.to_string())
}
