//! `s3vfs`: browse and edit an S3 bucket as a file system.
//!
//! Every invocation opens one session on the bucket named by the command's
//! URI, runs the command and closes the session (and with it the client).
//!
//! # Usage
//!
//! ```text
//! s3vfs ls s3://bucket/dir
//! s3vfs put ./report.pdf s3://bucket/docs/report.pdf --content-type application/pdf
//! s3vfs acl allow s3://bucket/docs/report.pdf everyone --permission read
//! s3vfs --endpoint-url http://localhost:4566 --path-style stat s3://bucket/docs
//! ```
//!
//! # Environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `S3VFS_REGION` | *(SDK default chain)* |
//! | `S3_ENDPOINT_URL` | *(unset)* |
//! | `S3VFS_FORCE_PATH_STYLE` | `false` |
//! | `S3VFS_SERVER_SIDE_ENCRYPTION` | `false` |
//! | `S3VFS_LIST_PAGE_SIZE` | *(unset)* |
//! | `LOG_LEVEL` | `info` |
//! | `RUST_LOG` | *(overrides `LOG_LEVEL`)* |
//!
//! Logs go to stderr; command output goes to stdout.

mod commands;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use s3vfs_aws::AwsS3Backend;
use s3vfs_core::{FileSystemOptions, S3FileSystem, VirtualPath};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::commands::{Cli, print_capabilities};

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut options = FileSystemOptions::from_env();
    cli.global.apply(&mut options);
    options.shutdown_backend_on_close = true;

    init_tracing(&options.log_level)?;

    let mut stdout = std::io::stdout().lock();

    let Some(uri) = cli.command.primary_uri() else {
        print_capabilities(&mut stdout)?;
        return Ok(());
    };
    let target = VirtualPath::parse(uri).with_context(|| format!("invalid URI: {uri}"))?;
    let root = VirtualPath::root(target.bucket()).to_string();

    debug!(?options, "resolved options");
    let backend = Arc::new(AwsS3Backend::from_options(&options).await);
    let fs = S3FileSystem::connect(&root, backend, options)
        .await
        .with_context(|| format!("cannot open {root}"))?;
    info!(%root, "session opened");

    let result = commands::execute(&cli.command, &fs, &mut stdout).await;
    fs.close().await;
    stdout.flush()?;
    result
}
