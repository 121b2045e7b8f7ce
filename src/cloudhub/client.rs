use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::io::StreamReader;
use tracing::{debug, error, instrument};

use crate::config::MulesoftConfig;
use crate::monitoring::source::{AccessToken, CredentialProvider, LogSource, LogStream};
use crate::utils::{MonitorError, MonitorResult};

const CONNECT_TIMEOUT_SECS: u64 = 30;
/// Longest gap between two body chunks before the read is abandoned
const READ_TIMEOUT_SECS: u64 = 120;
/// Longest accepted log line; a longer one ends the stream with a fault
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

const ENV_ID_HEADER: &str = "X-ANYPNT-ENV-ID";
const ORG_ID_HEADER: &str = "X-ANYPNT-ORG-ID";

/// Anypoint Platform client for one organization and environment
#[derive(Debug, Clone)]
pub struct CloudHubClient {
    client: Client,
    config: MulesoftConfig,
}

impl CloudHubClient {
    pub fn new(config: MulesoftConfig) -> MonitorResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()
            .map_err(|e| MonitorError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn deployments_url(&self, app_name: &str) -> String {
        format!(
            "{}/applications/{}/deployments",
            self.config.api_base_url(),
            app_name
        )
    }

    pub fn log_file_url(&self, app_name: &str, instance_id: &str) -> String {
        format!(
            "{}/organizations/{}/environments/{}/applications/{}/instances/{}/log-file",
            self.config.api_base_url(),
            self.config.org_id,
            self.config.env_id,
            app_name,
            instance_id
        )
    }

    fn authorized(&self, request: RequestBuilder, token: &AccessToken) -> RequestBuilder {
        request
            .bearer_auth(token.secret())
            .header(ENV_ID_HEADER, &self.config.env_id)
            .header(ORG_ID_HEADER, &self.config.org_id)
    }
}

/// Instance ids of the most recent deployment in a deployments response
pub fn parse_instance_ids(body: &serde_json::Value) -> MonitorResult<Vec<String>> {
    let deployments = body["data"]
        .as_array()
        .ok_or_else(|| MonitorError::discovery("Response has no deployment list"))?;

    let Some(last) = deployments.last() else {
        return Ok(Vec::new());
    };

    let instances = last["instances"]
        .as_array()
        .ok_or_else(|| MonitorError::discovery("Deployment has no instance list"))?;

    Ok(instances
        .iter()
        .filter_map(|instance| instance["instanceId"].as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl CredentialProvider for CloudHubClient {
    #[instrument(skip(self), fields(control_plane = %self.config.control_plane))]
    async fn authenticate(&self) -> MonitorResult<AccessToken> {
        let url = self.config.auth_url();
        debug!(url = %url, "Requesting access token");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MonitorError::auth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Token request rejected");
            return Err(MonitorError::auth(format!(
                "Token request rejected with status {}",
                status
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MonitorError::auth(format!("Invalid token response: {}", e)))?;

        let token = json["access_token"]
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MonitorError::auth("Token response has no access_token"))?;

        Ok(AccessToken::new(token))
    }
}

#[async_trait]
impl LogSource for CloudHubClient {
    #[instrument(skip(self, token))]
    async fn discover(&self, app_name: &str, token: &AccessToken) -> MonitorResult<Vec<String>> {
        let url = self.deployments_url(app_name);
        debug!(url = %url, "Listing deployments");

        let response = self
            .authorized(self.client.get(&url), token)
            .send()
            .await
            .map_err(|e| MonitorError::discovery(format!("Deployments request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::discovery(format!(
                "Deployments request for {} returned {}",
                app_name, status
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MonitorError::discovery(format!("Invalid deployments response: {}", e)))?;

        let instance_ids = parse_instance_ids(&json)?;
        debug!(count = instance_ids.len(), "Discovered instances");
        Ok(instance_ids)
    }

    #[instrument(skip(self, token))]
    async fn open_log_stream(
        &self,
        app_name: &str,
        instance_id: &str,
        token: &AccessToken,
    ) -> MonitorResult<LogStream> {
        let url = self.log_file_url(app_name, instance_id);
        debug!(url = %url, "Fetching log file");

        let response = self
            .authorized(self.client.get(&url), token)
            .send()
            .await
            .map_err(|e| MonitorError::stream(format!("Log request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::stream(format!(
                "Log request for {} returned {}",
                instance_id, status
            )));
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(split_lines(body, MAX_LINE_BYTES))
    }
}

/// Split a chunked body on `\n`. A line longer than `max_line_bytes` or a
/// transport error ends the stream with an `Err` item.
pub fn split_lines<S>(body: S, max_line_bytes: usize) -> LogStream
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    let codec =
        AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_line_bytes);
    FramedRead::new(StreamReader::new(body), codec)
        .map(|line| {
            line.map(|bytes| bytes.to_vec())
                .map_err(|e| MonitorError::stream(e.to_string()))
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlPlane;
    use futures::stream;
    use serde_json::json;

    async fn collect_lines(
        chunks: Vec<std::io::Result<Bytes>>,
        max: usize,
    ) -> Vec<MonitorResult<Vec<u8>>> {
        split_lines(stream::iter(chunks), max).collect().await
    }

    fn client(control_plane: ControlPlane) -> CloudHubClient {
        CloudHubClient::new(MulesoftConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            org_id: "org-1".to_string(),
            env_id: "env-1".to_string(),
            control_plane,
        })
        .expect("Failed to build client")
    }

    #[test]
    fn should_build_deployments_url() {
        assert_eq!(
            client(ControlPlane::Us).deployments_url("orders-api"),
            "https://anypoint.mulesoft.com/cloudhub/api/v2/applications/orders-api/deployments"
        );
    }

    #[test]
    fn should_build_log_file_url_for_control_plane() {
        assert_eq!(
            client(ControlPlane::Eu).log_file_url("orders-api", "i-1"),
            "https://eu1.anypoint.mulesoft.com/cloudhub/api/v2/organizations/org-1/environments/env-1/applications/orders-api/instances/i-1/log-file"
        );
    }

    #[test]
    fn should_take_instances_of_last_deployment() {
        // Arrange
        let body = json!({
            "data": [
                {"instances": [{"instanceId": "old-1"}]},
                {"instances": [{"instanceId": "i-1"}, {"instanceId": ""}, {"status": "STARTING"}, {"instanceId": "i-2"}]}
            ]
        });

        // Act
        let ids = parse_instance_ids(&body).expect("Failed to parse");

        // Assert
        assert_eq!(ids, vec!["i-1", "i-2"]);
    }

    #[test]
    fn should_return_no_instances_without_deployments() {
        let ids = parse_instance_ids(&json!({"data": []})).expect("Failed to parse");
        assert!(ids.is_empty());
    }

    #[test]
    fn should_fail_on_unexpected_response_shape() {
        // Act
        let result = parse_instance_ids(&json!({"message": "Forbidden"}));

        // Assert
        assert!(matches!(result, Err(MonitorError::Discovery(_))));
    }

    #[tokio::test]
    async fn should_split_lines_across_chunks() {
        // Arrange
        let chunks = vec![
            Ok(Bytes::from_static(b"T1 INFO a\r\nT2 IN")),
            Ok(Bytes::from_static(b"FO b\n\nT3 INFO c")),
        ];

        // Act
        let lines = collect_lines(chunks, MAX_LINE_BYTES).await;

        // Assert
        let lines: Vec<Vec<u8>> = lines.into_iter().map(|l| l.expect("line")).collect();
        assert_eq!(
            lines,
            vec![
                b"T1 INFO a\r".to_vec(),
                b"T2 INFO b".to_vec(),
                Vec::new(),
                b"T3 INFO c".to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn should_fault_on_line_longer_than_limit() {
        // Arrange
        let chunks = vec![Ok(Bytes::from_static(b"short\nthis line has no end in sight"))];

        // Act
        let lines = collect_lines(chunks, 16).await;

        // Assert
        assert_eq!(lines[0].as_ref().expect("first line"), b"short");
        assert!(lines
            .iter()
            .any(|line| matches!(line, Err(MonitorError::Stream(_)))));
    }

    #[tokio::test]
    async fn should_fault_on_transport_error() {
        // Arrange
        let chunks = vec![
            Ok(Bytes::from_static(b"T1 INFO a\n")),
            Err(std::io::Error::other("connection reset")),
        ];

        // Act
        let lines = collect_lines(chunks, MAX_LINE_BYTES).await;

        // Assert
        assert!(lines[0].is_ok());
        assert!(lines
            .iter()
            .any(|line| matches!(line, Err(MonitorError::Stream(_)))));
    }
}
