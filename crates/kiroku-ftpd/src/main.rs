//! kirokud: FTP daemon serving a git working tree, one commit per change.
//!
//! Point it at a checked-out git repository and every upload, delete,
//! rename, and mkdir a client performs becomes a commit:
//!
//! ```bash
//! git init /srv/drop
//! kirokud --root /srv/drop --user admin --pass s3cret
//! ```
//!
//! History stays ordinary git — `git log` in the root shows every change
//! any client ever made.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kiroku_driver::{GitDriverFactory, SimplePerm};

mod auth;
mod storage;

use auth::SingleUserAuth;
use storage::GitStorage;

#[derive(Parser, Debug)]
#[command(name = "kirokud", version, about = "FTP server that commits every change to git")]
struct Args {
    /// Root directory to serve. Must be a non-bare git repository.
    #[arg(long)]
    root: PathBuf,

    /// Username for login.
    #[arg(long, default_value = "admin")]
    user: String,

    /// Password for login.
    #[arg(long, default_value = "123456")]
    pass: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 2121)]
    port: u16,

    /// Host to bind.
    #[arg(long, default_value = "localhost")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // Fail fast on an unusable root; every driver call re-opens afterwards.
    let repo = git2::Repository::open(&args.root)
        .with_context(|| format!("{} is not a git repository", args.root.display()))?;
    if repo.workdir().is_none() {
        bail!(
            "{} is a bare repository; kirokud needs a working tree to serve",
            args.root.display()
        );
    }
    drop(repo);

    let factory = GitDriverFactory::new(&args.root, Arc::new(SimplePerm::new("user", "group")));
    let server = libunftp::ServerBuilder::with_authenticator(
        Box::new(move || GitStorage::new(&factory)),
        Arc::new(SingleUserAuth::new(&args.user, &args.pass)),
    )
    .greeting("kiroku: every change becomes a commit")
    .build()
    .context("building FTP server")?;

    let bind = format!("{}:{}", args.host, args.port);
    info!(root = %args.root.display(), %bind, user = %args.user, "starting ftp server");
    server
        .listen(bind)
        .await
        .context("FTP server failed")?;
    Ok(())
}
