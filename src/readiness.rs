//! Readiness polling
//!
//! A container counts as ready once its published endpoint answers. Polling is
//! bounded by a wall-clock timeout and sleeps between attempts, so a waiting
//! scenario never spins.

use crate::docker::Container;
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Observed reachability of a running container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    Waiting,
    Reachable,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Container {container} was not ready after {timeout:?} ({attempts} polls)")]
pub struct NotReady {
    pub container: String,
    pub timeout: Duration,
    pub attempts: u32,
}

/// Result of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn is_available(&self, container: &Container) -> bool;
}

/// Treats any HTTP response from the container's endpoint as available
pub struct HttpCheck {
    client: reqwest::Client,
    port: Option<u16>,
}

impl HttpCheck {
    /// Checks the lowest published port.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, port: None })
    }

    /// Checks a specific container port.
    pub fn for_port(port: u16) -> Result<Self, reqwest::Error> {
        Ok(Self {
            port: Some(port),
            ..Self::new()?
        })
    }
}

#[async_trait]
impl ReadinessCheck for HttpCheck {
    async fn is_available(&self, container: &Container) -> bool {
        let url = match self.port {
            Some(port) => container.endpoint(port),
            None => container.host_url(),
        };
        let Some(url) = url else {
            return false;
        };

        match self.client.get(&url).send().await {
            Ok(response) => {
                debug!(%url, status = %response.status(), "Endpoint answered");
                true
            }
            Err(e) => {
                debug!(%url, error = %e, "Endpoint not reachable yet");
                false
            }
        }
    }
}

/// Polls `check` until it reports available or `limit` elapses.
///
/// Stops polling at the first positive answer.
pub async fn wait_until_ready(
    check: &dyn ReadinessCheck,
    container: &Container,
    limit: Duration,
    interval: Duration,
) -> Result<Ready, NotReady> {
    let start = Instant::now();
    let mut attempts = 0u32;

    let poll = async {
        loop {
            attempts += 1;
            if check.is_available(container).await {
                return ReadinessState::Reachable;
            }
            sleep(interval).await;
        }
    };

    let outcome = timeout(limit, poll).await;

    match outcome {
        Ok(_) => {
            let ready = Ready {
                attempts,
                elapsed: start.elapsed(),
            };
            debug!(container = %container.id, attempts, "Container reachable");
            Ok(ready)
        }
        Err(_) => Err(NotReady {
            container: container.id.clone(),
            timeout: limit,
            attempts,
        }),
    }
}
