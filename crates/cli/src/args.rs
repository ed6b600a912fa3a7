use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Trigger backend jobs and follow their status live.
#[derive(Debug, Parser)]
#[command(name = "jobstream", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub auth: AuthArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// How requests are authenticated.
///
/// `--token` wins over `--email`/`--password`. With neither, requests go
/// out anonymously.
#[derive(Debug, Default, Args)]
pub struct AuthArgs {
    /// Bearer token to send as-is
    #[arg(long, env = "JOBSTREAM_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Sign in with this email (needs SUPABASE_URL)
    #[arg(long, env = "JOBSTREAM_EMAIL", global = true, requires = "password")]
    pub email: Option<String>,

    /// Password for --email
    #[arg(long, env = "JOBSTREAM_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a background job and print its id
    Trigger {
        /// Follow the new job until it finishes
        #[arg(long)]
        track: bool,
    },
    /// Follow the status of an existing job until it finishes
    Track {
        /// Job id returned by `trigger`
        job_id: String,
    },
    /// Generate a new flow for the signed-in user and print its id
    Flow,
    /// Print the storage object name and upload metadata for a file
    ObjectName {
        /// File name as it will be uploaded
        file_name: String,
        /// Flow the file belongs to
        #[arg(long)]
        flow_id: String,
        /// Owner of the upload (defaults to the signed-in user)
        #[arg(long)]
        user_id: Option<String>,
        /// MIME type of the file
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Register an uploaded file against its flow
    RegisterFile {
        /// Local copy of the uploaded file; name and size are read from it
        path: PathBuf,
        /// Flow the file belongs to
        #[arg(long)]
        flow_id: String,
        /// MIME type of the file
        #[arg(long)]
        content_type: Option<String>,
    },
}
