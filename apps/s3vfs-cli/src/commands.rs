//! Command definitions and their execution against a session.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand, ValueEnum};
use s3vfs_core::acl::{AclPermission, Actor};
use s3vfs_core::{CapabilitySet, FileHandle, FileSystemOptions, FileType, S3FileSystem};

/// Browse and edit an S3 bucket as a file system.
#[derive(Parser, Debug)]
#[command(name = "s3vfs", version, about)]
pub struct Cli {
    /// Overrides for the file-system options.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Region of the bucket (also used when the bucket has to be created).
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Custom S3 endpoint, e.g. http://localhost:4566.
    #[arg(long, global = true)]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing.
    #[arg(long, global = true)]
    pub path_style: bool,
}

impl GlobalArgs {
    /// Apply the flags on top of `options`.
    pub fn apply(&self, options: &mut FileSystemOptions) {
        if let Some(region) = &self.region {
            options.region = Some(region.clone());
        }
        if let Some(endpoint) = &self.endpoint_url {
            options.endpoint_url = Some(endpoint.clone());
        }
        if self.path_style {
            options.force_path_style = true;
        }
    }
}

/// Available operations.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the children of a directory.
    Ls {
        /// Directory URI, e.g. s3://bucket/dir.
        uri: String,
    },
    /// Print the content of a file.
    Cat {
        /// File URI.
        uri: String,
    },
    /// Upload a local file.
    Put {
        /// Local file to upload.
        local: PathBuf,
        /// Destination URI.
        uri: String,
        /// MIME type stored with the object.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Create a directory.
    Mkdir {
        /// Directory URI.
        uri: String,
    },
    /// Delete a file or directory.
    Rm {
        /// URI to delete.
        uri: String,
        /// Delete a directory and everything below it.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move a file or directory.
    Mv {
        /// Source URI.
        src: String,
        /// Destination URI in the same bucket.
        dst: String,
    },
    /// Copy a file.
    Cp {
        /// Source URI.
        src: String,
        /// Destination URI in the same bucket.
        dst: String,
    },
    /// Show type, size and modification time.
    Stat {
        /// URI to inspect.
        uri: String,
    },
    /// List the operations the provider supports.
    Caps,
    /// Read or change access control lists.
    Acl {
        /// ACL operation.
        #[command(subcommand)]
        command: AclCommand,
    },
}

/// ACL operations.
#[derive(Subcommand, Debug, Clone)]
pub enum AclCommand {
    /// Print the ACL of a file.
    Get {
        /// File URI.
        uri: String,
    },
    /// Allow an actor to read and/or write.
    Allow {
        /// File URI.
        uri: String,
        /// Actor class.
        actor: ActorArg,
        /// Only this permission (default: both).
        #[arg(long)]
        permission: Option<PermissionArg>,
    },
    /// Deny an actor read and/or write.
    Deny {
        /// File URI.
        uri: String,
        /// Actor class.
        actor: ActorArg,
        /// Only this permission (default: both).
        #[arg(long)]
        permission: Option<PermissionArg>,
    },
    /// Deny everything to everyone, including the owner.
    DenyAll {
        /// File URI.
        uri: String,
    },
}

/// Actor class argument.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorArg {
    /// The object owner.
    Owner,
    /// Any authenticated account.
    Authorized,
    /// Anyone.
    Everyone,
}

impl From<ActorArg> for Actor {
    fn from(arg: ActorArg) -> Self {
        match arg {
            ActorArg::Owner => Self::Owner,
            ActorArg::Authorized => Self::AuthorizedUsers,
            ActorArg::Everyone => Self::Everyone,
        }
    }
}

/// Permission argument.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionArg {
    /// Read content.
    Read,
    /// Overwrite or delete.
    Write,
}

impl From<PermissionArg> for AclPermission {
    fn from(arg: PermissionArg) -> Self {
        match arg {
            PermissionArg::Read => Self::Read,
            PermissionArg::Write => Self::Write,
        }
    }
}

impl Command {
    /// The URI whose bucket the session binds to; `None` for `caps`.
    #[must_use]
    pub fn primary_uri(&self) -> Option<&str> {
        match self {
            Self::Ls { uri }
            | Self::Cat { uri }
            | Self::Put { uri, .. }
            | Self::Mkdir { uri }
            | Self::Rm { uri, .. }
            | Self::Stat { uri } => Some(uri),
            Self::Mv { src, .. } | Self::Cp { src, .. } => Some(src),
            Self::Caps => None,
            Self::Acl { command } => Some(match command {
                AclCommand::Get { uri }
                | AclCommand::Allow { uri, .. }
                | AclCommand::Deny { uri, .. }
                | AclCommand::DenyAll { uri } => uri,
            }),
        }
    }
}

/// Print the provider capabilities, one per line.
pub fn print_capabilities(out: &mut impl Write) -> Result<()> {
    for capability in CapabilitySet::provider().iter() {
        writeln!(out, "{capability}")?;
    }
    Ok(())
}

fn handle(fs: &Arc<S3FileSystem>, uri: &str) -> Result<FileHandle> {
    fs.handle(uri).with_context(|| format!("invalid path: {uri}"))
}

/// Run `command` against `fs`, writing results to `out`.
pub async fn execute(command: &Command, fs: &Arc<S3FileSystem>, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Ls { uri } => {
            let dir = handle(fs, uri)?;
            for child in dir.children().await? {
                let suffix = if child.file_type().await? == FileType::Directory {
                    "/"
                } else {
                    ""
                };
                writeln!(out, "{child}{suffix}")?;
            }
        }
        Command::Cat { uri } => {
            let content = handle(fs, uri)?.read().await?;
            out.write_all(&content)?;
        }
        Command::Put {
            local,
            uri,
            content_type,
        } => {
            let content = tokio::fs::read(local)
                .await
                .with_context(|| format!("cannot read {}", local.display()))?;
            handle(fs, uri)?
                .write_with_content_type(Bytes::from(content), content_type.as_deref())
                .await?;
        }
        Command::Mkdir { uri } => handle(fs, uri)?.create_folder().await?,
        Command::Rm { uri, recursive } => {
            let target = handle(fs, uri)?;
            if *recursive {
                let deleted = target.delete_recursive().await?;
                writeln!(out, "deleted {deleted} object(s)")?;
            } else {
                target.delete().await?;
            }
        }
        Command::Mv { src, dst } => {
            handle(fs, src)?.move_to(&handle(fs, dst)?).await?;
        }
        Command::Cp { src, dst } => {
            handle(fs, src)?.copy_to(&handle(fs, dst)?).await?;
        }
        Command::Stat { uri } => {
            let stat = handle(fs, uri)?.stat().await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&stat)?)?;
        }
        Command::Caps => print_capabilities(out)?,
        Command::Acl { command } => execute_acl(command, fs, out).await?,
    }
    Ok(())
}

async fn execute_acl(
    command: &AclCommand,
    fs: &Arc<S3FileSystem>,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        AclCommand::Get { uri } => {
            let acl = handle(fs, uri)?.get_acl().await?;
            writeln!(out, "{acl}")?;
        }
        AclCommand::Allow {
            uri,
            actor,
            permission,
        } => {
            let file = handle(fs, uri)?;
            let mut acl = file.get_acl().await?;
            match permission {
                Some(p) => acl.allow((*actor).into(), (*p).into()),
                None => acl.allow_actor((*actor).into()),
            };
            file.set_acl(&acl).await?;
            writeln!(out, "{acl}")?;
        }
        AclCommand::Deny {
            uri,
            actor,
            permission,
        } => {
            let file = handle(fs, uri)?;
            let mut acl = file.get_acl().await?;
            match permission {
                Some(p) => acl.deny((*actor).into(), (*p).into()),
                None => acl.deny_actor((*actor).into()),
            };
            file.set_acl(&acl).await?;
            writeln!(out, "{acl}")?;
        }
        AclCommand::DenyAll { uri } => {
            let file = handle(fs, uri)?;
            let mut acl = file.get_acl().await?;
            acl.deny_all();
            file.set_acl(&acl).await?;
            writeln!(out, "{acl}")?;
        }
    }
    Ok(())
}
