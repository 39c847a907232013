//! Container runtime port and its Docker Engine adapter

use async_trait::async_trait;
use bollard::container::{Config, RemoveContainerOptions, StartContainerOptions};
use bollard::errors::Error as DockerError;
use bollard::image::RemoveImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::volume::RemoveVolumeOptions;
use bollard::Docker;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

/// Address published ports are bound to on the host
const LOOPBACK: &str = "127.0.0.1";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Failed to connect to the container runtime: {0}")]
    Connect(String),

    #[error("Failed to create container from image {image}: {message}")]
    Create { image: String, message: String },

    #[error("Failed to start container {id}: {message}")]
    Start { id: String, message: String },

    #[error("Failed to inspect {target}: {message}")]
    Inspect { target: String, message: String },

    #[error("Failed to inspect container {id}: {message}")]
    InspectContainer { id: String, message: String },

    #[error("Container {id} does not publish port {port}")]
    PortNotPublished { id: String, port: u16 },

    #[error("Failed to remove {resource} {target}: {message}")]
    Remove {
        resource: &'static str,
        target: String,
        message: String,
    },
}

impl RuntimeError {
    /// ID of a container that exists despite the error, so it can be removed.
    pub fn container_id(&self) -> Option<&str> {
        match self {
            RuntimeError::Start { id, .. }
            | RuntimeError::InspectContainer { id, .. }
            | RuntimeError::PortNotPublished { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// A built image, identified by its image ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub id: String,
}

/// How to start a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub env: BTreeMap<String, String>,
    /// Container ports to publish on random host ports
    pub publish: Vec<u16>,
}

impl RunSpec {
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_publish(mut self, port: u16) -> Self {
        self.publish.push(port);
        self
    }

    fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

/// Handle to a running container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub id: String,
    pub host: String,
    /// Container port to host port
    pub ports: BTreeMap<u16, u16>,
}

impl Container {
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }

    /// `http://host:port` for a published container port.
    pub fn endpoint(&self, container_port: u16) -> Option<String> {
        self.host_port(container_port)
            .map(|port| format!("http://{}:{}", self.host, port))
    }

    /// Endpoint of the lowest published port.
    pub fn host_url(&self) -> Option<String> {
        self.ports
            .values()
            .next()
            .map(|port| format!("http://{}:{}", self.host, port))
    }
}

/// Operations the harness needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates and starts exactly one container. Never retries.
    async fn run(&self, image: &Image, spec: &RunSpec) -> Result<Container, RuntimeError>;

    async fn inspect_image(&self, name: &str) -> Result<Image, RuntimeError>;

    /// Force-removes a container. Missing containers are not an error.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Force-removes volumes. Missing volumes are not an error.
    async fn remove_volumes(&self, names: &[String]) -> Result<(), RuntimeError>;

    /// Force-removes an image. Missing images are not an error.
    async fn remove_image(&self, id: &str) -> Result<(), RuntimeError>;
}

/// Docker Engine API adapter
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using `DOCKER_HOST` or the local socket.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }

    async fn resolve_ports(&self, id: &str, publish: &[u16]) -> Result<BTreeMap<u16, u16>, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| RuntimeError::InspectContainer {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        let bindings = inspect
            .network_settings
            .and_then(|ns| ns.ports)
            .unwrap_or_default();

        let mut ports = BTreeMap::new();
        for &port in publish {
            let host_port = bindings
                .get(&format!("{}/tcp", port))
                .cloned()
                .flatten()
                .and_then(|b| b.into_iter().find_map(|binding| binding.host_port))
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(|| RuntimeError::PortNotPublished {
                    id: id.to_string(),
                    port,
                })?;
            ports.insert(port, host_port);
        }

        Ok(ports)
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, image: &Image, spec: &RunSpec) -> Result<Container, RuntimeError> {
        let exposed_ports = spec
            .publish
            .iter()
            .map(|port| (format!("{}/tcp", port), HashMap::new()))
            .collect();

        // Host port "0" lets the daemon pick a free port
        let port_bindings = spec
            .publish
            .iter()
            .map(|port| {
                (
                    format!("{}/tcp", port),
                    Some(vec![PortBinding {
                        host_ip: Some(LOOPBACK.to_string()),
                        host_port: Some("0".to_string()),
                    }]),
                )
            })
            .collect();

        let config = Config {
            image: Some(image.id.clone()),
            env: Some(spec.env_list()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container::<String, String>(None, config)
            .await
            .map_err(|e| RuntimeError::Create {
                image: image.id.clone(),
                message: e.to_string(),
            })?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::Start {
                id: created.id.clone(),
                message: e.to_string(),
            })?;

        let ports = self.resolve_ports(&created.id, &spec.publish).await?;
        info!(container = %created.id, ?ports, "Container started");

        Ok(Container {
            id: created.id,
            host: LOOPBACK.to_string(),
            ports,
        })
    }

    async fn inspect_image(&self, name: &str) -> Result<Image, RuntimeError> {
        let inspect = self
            .docker
            .inspect_image(name)
            .await
            .map_err(|e| RuntimeError::Inspect {
                target: format!("image {}", name),
                message: e.to_string(),
            })?;

        Ok(Image {
            id: inspect.id.unwrap_or_else(|| name.to_string()),
        })
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(container = %id, "Container already removed");
                Ok(())
            }
            Err(e) => Err(RuntimeError::Remove {
                resource: "container",
                target: id.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn remove_volumes(&self, names: &[String]) -> Result<(), RuntimeError> {
        let mut failures = Vec::new();

        for name in names {
            match self
                .docker
                .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
                .await
            {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => debug!(volume = %name, "Volume not present"),
                Err(e) => failures.push(format!("{}: {}", name, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::Remove {
                resource: "volumes",
                target: names.join(", "),
                message: failures.join("; "),
            })
        }
    }

    async fn remove_image(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_image(id, Some(options), None).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(image = %id, "Image already removed");
                Ok(())
            }
            Err(e) => Err(RuntimeError::Remove {
                resource: "image",
                target: id.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
