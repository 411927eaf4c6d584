/// Execution Engine - isolated process execution for containerized runners
///
/// **Responsibility:**
/// Run one command in a throwaway container and hand back raw stdout, stderr
/// and exit status. The engine knows nothing about harnesses or grading.
///
/// **Container Policy:**
/// - Scratch directory bind-mounted read-only at `/code`
/// - Network disabled, memory (no swap) and CPU share pinned, pid count capped
/// - Wall-clock timeout: the container is killed and the run flagged `timed_out`
/// - Removed on every exit path via `ContainerGuard`
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Stop collecting a stream once it grows past this
const MAX_CAPTURED_OUTPUT_BYTES: usize = 1024 * 1024;
const PIDS_LIMIT: i64 = 128;

/// One container invocation
#[derive(Debug, Clone)]
pub struct ContainerRequest {
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    /// Host directory mounted read-only at `/code`
    pub mount: PathBuf,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    pub timeout: Duration,
}

/// Raw result of a container run
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    /// A stream went past the capture limit and the rest of it was dropped
    pub truncated: bool,
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// An `Err` means the engine itself failed (daemon unreachable, image
    /// missing); a program that crashes is a successful execution with a
    /// non-zero `exit_code`.
    async fn execute(&self, request: &ContainerRequest) -> Result<ProcessOutput>;
}

/// Container cleanup guard - guarantees container removal on drop,
/// including when the execution future is cancelled or panics
struct ContainerGuard<'a> {
    docker: &'a Docker,
    container_id: String,
}

impl<'a> ContainerGuard<'a> {
    fn new(docker: &'a Docker, container_id: String) -> Self {
        Self { docker, container_id }
    }
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            match docker.remove_container(&container_id, Some(remove_options)).await {
                Ok(()) => debug!(container_id = %container_id, "Removed container"),
                Err(e) => error!(container_id = %container_id, error = %e, "Failed to clean up container"),
            }
        });
    }
}

/// Docker-backed engine used in production
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Pull the image if it is not cached locally
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image, "Image cache hit");
            return Ok(());
        }

        warn!(image, "Image cache miss, pulling");
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            progress.with_context(|| format!("Failed to pull image {}", image))?;
        }

        info!(image, "Image pulled");
        Ok(())
    }

    async fn collect_output(&self, container_id: &str) -> ProcessOutput {
        let mut stdout = BoundedBuffer::default();
        let mut stderr = BoundedBuffer::default();

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut logs = self.docker.logs(container_id, logs_options);
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => stdout.push(&message),
                Ok(LogOutput::StdErr { message }) => stderr.push(&message),
                Ok(_) => {}
                Err(e) => {
                    warn!(container_id, error = %e, "Error reading container logs");
                    break;
                }
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let exit_code = match self.docker.wait_container(container_id, Some(wait_options)).next().await {
            Some(Ok(response)) => Some(response.status_code),
            // bollard reports a non-zero exit as a wait error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(e)) => {
                warn!(container_id, error = %e, "Failed to get container exit code");
                None
            }
            None => {
                warn!(container_id, "No wait response from container");
                None
            }
        };

        if stdout.truncated || stderr.truncated {
            warn!(container_id, "Container output exceeded the capture limit");
        }

        ProcessOutput {
            truncated: stdout.truncated || stderr.truncated,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            exit_code,
            timed_out: false,
        }
    }
}

/// Raw bytes of one log stream, capped at `MAX_CAPTURED_OUTPUT_BYTES`.
///
/// Log frames can split a multibyte character, so decoding happens once at
/// the end rather than per frame.
#[derive(Debug, Default)]
struct BoundedBuffer {
    bytes: Vec<u8>,
    truncated: bool,
}

impl BoundedBuffer {
    fn push(&mut self, chunk: &[u8]) {
        let room = MAX_CAPTURED_OUTPUT_BYTES.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn into_string(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

#[async_trait]
impl ExecutionEngine for DockerEngine {
    async fn execute(&self, request: &ContainerRequest) -> Result<ProcessOutput> {
        self.ensure_image(&request.image)
            .await
            .with_context(|| format!("Docker image '{}' is not available", request.image))?;

        let memory = request.memory_limit_mb as i64 * 1024 * 1024;
        let config = Config {
            image: Some(request.image.clone()),
            cmd: Some(request.command.clone()),
            env: Some(request.env.clone()),
            working_dir: Some("/code".to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}:/code:ro", request.mount.display())]),
                memory: Some(memory),
                memory_swap: Some(memory),
                nano_cpus: Some((request.cpu_limit as f64 * 1_000_000_000.0) as i64),
                pids_limit: Some(PIDS_LIMIT),
                network_mode: Some("none".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container_name = format!("grader-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;

        let container_id = container.id;
        let _guard = ContainerGuard::new(&self.docker, container_id.clone());

        let started = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        let output = match tokio::time::timeout(request.timeout, self.collect_output(&container_id)).await {
            Ok(output) => output,
            Err(_) => {
                warn!(container_id = %container_id, timeout_ms = request.timeout.as_millis() as u64, "Container timed out, killing");
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to kill timed-out container");
                }
                ProcessOutput {
                    timed_out: true,
                    ..Default::default()
                }
            }
        };

        debug!(
            container_id = %container_id,
            exit_code = ?output.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Container finished"
        );

        Ok(output)
    }
}
