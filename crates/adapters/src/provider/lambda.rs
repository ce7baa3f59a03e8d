// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lambda Cloud REST client

use super::{CloudApi, CloudError, InstanceInfo, LaunchRequest};
use crate::secrets::Secret;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Marker the provider puts in capacity-shortage error codes
const CAPACITY_MARKER: &str = "insufficient-capacity";

#[derive(Clone)]
pub struct LambdaCloud {
    base_url: String,
    api_key: Secret,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct LaunchData {
    instance_ids: Vec<String>,
}

#[derive(Serialize)]
struct TerminateBody<'a> {
    instance_ids: &'a [String],
}

impl LambdaCloud {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Secret,
        request_timeout: Duration,
    ) -> Result<Self, CloudError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CloudError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        region: Option<&str>,
    ) -> Result<T, CloudError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Envelope<T>>()
                .await
                .map(|envelope| envelope.data)
                .map_err(|e| CloudError::UnexpectedResponse(e.to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CloudError::Transport(format!("failed reading error body: {e}")))?;
        Err(classify(status, region, &body))
    }
}

/// Map a non-success response onto [`CloudError`]
fn classify(status: StatusCode, region: Option<&str>, body: &str) -> CloudError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            let error = value.get("error")?;
            let code = error.get("code").and_then(|v| v.as_str()).unwrap_or("");
            let message = error.get("message").and_then(|v| v.as_str()).unwrap_or("");
            Some(format!("{code}: {message}"))
        })
        .unwrap_or_else(|| body.to_string());

    if status == StatusCode::BAD_REQUEST && body.contains(CAPACITY_MARKER) {
        return CloudError::InsufficientCapacity {
            region: region.unwrap_or_default().to_string(),
            message,
        };
    }
    CloudError::Http {
        status: status.as_u16(),
        message,
    }
}

fn transport(e: reqwest::Error) -> CloudError {
    CloudError::Transport(e.to_string())
}

#[async_trait]
impl CloudApi for LambdaCloud {
    async fn launch(&self, request: &LaunchRequest) -> Result<String, CloudError> {
        let response = self
            .client
            .post(self.url("instance-operations/launch"))
            .bearer_auth(self.api_key.expose())
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let data: LaunchData = Self::decode(response, Some(&request.region_name)).await?;
        data.instance_ids.into_iter().next().ok_or_else(|| {
            CloudError::UnexpectedResponse("launch returned no instance ids".to_string())
        })
    }

    async fn list_instances(&self) -> Result<Vec<InstanceInfo>, CloudError> {
        let response = self
            .client
            .get(self.url("instances"))
            .bearer_auth(self.api_key.expose())
            .send()
            .await
            .map_err(transport)?;

        Self::decode(response, None).await
    }

    async fn terminate(&self, instance_ids: &[String]) -> Result<(), CloudError> {
        let response = self
            .client
            .post(self.url("instance-operations/terminate"))
            .bearer_auth(self.api_key.expose())
            .json(&TerminateBody { instance_ids })
            .send()
            .await
            .map_err(transport)?;

        Self::decode::<serde_json::Value>(response, None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
#[path = "lambda_tests.rs"]
mod tests;
