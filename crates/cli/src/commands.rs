//! Command handlers.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use jobstream_client::{
    Anonymous, AuthClient, ClientConfig, CredentialProvider, FlowApi, HttpStatusSource,
    JobStatusTracker, QueueApi, StaticToken, StatusSource, UploadTarget,
};
use jobstream_core::FlowId;

use crate::args::{AuthArgs, Cli, Command};
use crate::exit_error::{ExitError, EXIT_INTERRUPTED};
use crate::output::{exit_status, render_snapshot};

/// Resolved credentials for this invocation.
struct Identity {
    credentials: Arc<dyn CredentialProvider>,
    /// Set when signed in with email and password.
    user_id: Option<String>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::from_env().context("Invalid configuration")?;
    let identity = sign_in(&cli.auth, &config).await?;

    match cli.command {
        Command::Trigger { track } => {
            let api = QueueApi::new(
                config.request_client()?,
                &config.api_url,
                &config.trigger_path,
                Arc::clone(&identity.credentials),
            )?;
            let job_id = api.trigger_job().await?;
            println!("{job_id}");

            if track {
                track_job(status_source(&config, identity.credentials)?, job_id.as_str()).await?;
            }
        }
        Command::Track { job_id } => {
            track_job(status_source(&config, identity.credentials)?, &job_id).await?;
        }
        Command::Flow => {
            let flow_id = flow_api(&config, identity.credentials)?
                .generate_flow()
                .await?;
            println!("{flow_id}");
        }
        Command::ObjectName {
            file_name,
            flow_id,
            user_id,
            content_type,
        } => {
            let Some(user_id) = user_id.or(identity.user_id) else {
                bail!("--user-id is required unless signed in with --email");
            };
            let target = UploadTarget::new(&config.upload_bucket, user_id, parse_flow_id(&flow_id)?);
            let metadata = target.metadata(&file_name, content_type.as_deref());
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::RegisterFile {
            path,
            flow_id,
            content_type,
        } => {
            let (file_name, file_size) = describe_file(&path).await?;
            let metadata = jobstream_client::FileMetadata {
                flow_id: parse_flow_id(&flow_id)?,
                file_name,
                file_type: content_type,
                file_size,
            };
            let response = flow_api(&config, identity.credentials)?
                .register_file_metadata(&metadata)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

/// Follow `job_id` until it reaches a terminal status, the stream is lost,
/// or the user interrupts.
pub async fn track_job(source: Arc<dyn StatusSource>, job_id: &str) -> Result<()> {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    track_until(source, job_id, interrupt).await
}

/// [`track_job`] with an explicit interrupt signal.
pub async fn track_until(
    source: Arc<dyn StatusSource>,
    job_id: &str,
    interrupt: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(interrupt);

    let mut tracker = JobStatusTracker::new(source);
    let mut rx = tracker.watch();

    if !tracker.bind(job_id) {
        bail!("Job id must not be empty");
    }

    let mut last_line = None;
    let finished = loop {
        let snapshot = rx.borrow_and_update().clone();
        let line = render_snapshot(&snapshot);
        if line.is_some() && line != last_line {
            if let Some(line) = &line {
                println!("{line}");
            }
            last_line = line;
        }
        if snapshot.state.is_closed() {
            break snapshot;
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break snapshot;
                }
            }
            _ = &mut interrupt => {
                tracing::info!(job_id, "Interrupted, closing status stream");
                tracker.shutdown().await;
                return Err(ExitError::new(EXIT_INTERRUPTED, "Interrupted").into());
            }
        }
    };

    tracker.shutdown().await;
    exit_status(&finished)?;
    Ok(())
}

async fn sign_in(auth: &AuthArgs, config: &ClientConfig) -> Result<Identity> {
    if let Some(token) = &auth.token {
        return Ok(Identity {
            credentials: Arc::new(StaticToken::new(token.clone())),
            user_id: None,
        });
    }

    let (Some(email), Some(password)) = (&auth.email, &auth.password) else {
        return Ok(Identity {
            credentials: Arc::new(Anonymous),
            user_id: None,
        });
    };

    let Some(auth_url) = &config.auth_url else {
        bail!("SUPABASE_URL must be set to sign in with --email");
    };

    let client = AuthClient::with_client(config.request_client()?, auth_url, &config.auth_anon_key)?;
    let session = client
        .sign_in_with_password(email, password)
        .await
        .context("Sign-in failed")?;

    Ok(Identity {
        credentials: Arc::new(client),
        user_id: session.user_id,
    })
}

fn status_source(
    config: &ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> Result<Arc<dyn StatusSource>> {
    Ok(Arc::new(HttpStatusSource::new(
        config.stream_client()?,
        config.api_url.clone(),
        credentials,
    )))
}

fn flow_api(config: &ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Result<FlowApi> {
    Ok(FlowApi::new(
        config.request_client()?,
        config.flow_api_url.clone(),
        credentials,
    ))
}

fn parse_flow_id(raw: &str) -> Result<FlowId> {
    FlowId::new(raw).context("Flow id must not be empty")
}

/// File name and size in bytes of a local file.
async fn describe_file(path: &Path) -> Result<(String, u64)> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a file", path.display());
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?
        .to_string();

    Ok((file_name, metadata.len()))
}
