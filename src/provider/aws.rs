use async_trait::async_trait;
use aws_config::imds;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_autoscaling::error::DisplayErrorContext as AsgErrorContext;
use aws_sdk_ec2::error::DisplayErrorContext as Ec2ErrorContext;
use serde::Deserialize;
use tracing::{debug, info, warn};
use crate::error::{PeerError, Result};
use super::{FleetProvider, InstanceDetails, LifecycleState, ScalingGroup};

const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";
const IDENTITY_DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";

#[derive(Debug, Deserialize)]
struct IdentityDocument {
    region: Option<String>,
}

/// Provider backed by EC2 auto scaling, EC2 and the instance metadata service
#[derive(Debug, Clone)]
pub struct AwsProvider {
    autoscaling: aws_sdk_autoscaling::Client,
    ec2: aws_sdk_ec2::Client,
    imds: imds::Client,
}

impl AwsProvider {
    /// Load SDK configuration from the environment. The region comes from
    /// `region` if given, then the default provider chain, then the instance
    /// identity document.
    pub async fn from_env(region: Option<String>) -> Result<Self> {
        let imds = imds::Client::builder().build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let mut sdk_config = loader.load().await;

        if sdk_config.region().is_none() {
            match identity_region(&imds).await {
                Ok(region) => {
                    info!("Using region {} from instance identity document", region);
                    sdk_config = sdk_config.into_builder().region(Region::new(region)).build();
                }
                Err(e) => warn!("Could not determine AWS region: {}", e),
            }
        }

        Ok(Self {
            autoscaling: aws_sdk_autoscaling::Client::new(&sdk_config),
            ec2: aws_sdk_ec2::Client::new(&sdk_config),
            imds,
        })
    }
}

async fn identity_region(imds: &imds::Client) -> Result<String> {
    let document = imds
        .get(IDENTITY_DOCUMENT_PATH)
        .await
        .map_err(|e| PeerError::provider("identity_document", e))?;
    let document: IdentityDocument = serde_json::from_str(document.as_ref())?;
    document
        .region
        .ok_or_else(|| PeerError::provider("identity_document", "document has no region"))
}

#[async_trait]
impl FleetProvider for AwsProvider {
    async fn instance_id(&self) -> Result<Option<String>> {
        let id = self
            .imds
            .get(INSTANCE_ID_PATH)
            .await
            .map_err(|e| PeerError::provider("instance_id", e))?;
        let id: &str = id.as_ref();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }

    async fn describe_groups(&self, name: Option<&str>) -> Result<Vec<ScalingGroup>> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .autoscaling
                .describe_auto_scaling_groups()
                .set_auto_scaling_group_names(name.map(|n| vec![n.to_string()]))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| PeerError::provider("describe_groups", AsgErrorContext(&e)))?;

            for group in output.auto_scaling_groups() {
                let group_name: Option<&str> = group.auto_scaling_group_name().into();
                let instance_ids = group
                    .instances()
                    .iter()
                    .filter_map(|instance| Option::<&str>::from(instance.instance_id()))
                    .map(str::to_string)
                    .collect();
                groups.push(ScalingGroup {
                    name: group_name.unwrap_or_default().to_string(),
                    instance_ids,
                });
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!("Described {} auto scaling groups", groups.len());
        Ok(groups)
    }

    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<InstanceDetails>> {
        let mut details = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .ec2
                .describe_instances()
                .set_instance_ids(Some(instance_ids.to_vec()))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| PeerError::provider("describe_instances", Ec2ErrorContext(&e)))?;

            for reservation in output.reservations() {
                for instance in reservation.instances() {
                    let Some(instance_id) = instance.instance_id() else {
                        continue;
                    };
                    let state = instance
                        .state()
                        .and_then(|s| s.name())
                        .map(|name| name.as_str().parse().unwrap_or(LifecycleState::Unknown))
                        .unwrap_or(LifecycleState::Unknown);
                    details.push(InstanceDetails {
                        instance_id: instance_id.to_string(),
                        state,
                        private_ip: instance.private_ip_address().map(str::to_string),
                        public_ip: instance.public_ip_address().map(str::to_string),
                    });
                }
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(details)
    }
}
