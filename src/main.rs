//! Bucket Provisioner - CRD manifest generator
//!
//! The reconciler needs a provisioner plugin, so the controller itself runs
//! inside the integrator's binary (see `bucket_provisioner::dispatch::run_controller`).
//! This binary prints or writes the CRDs that binary depends on.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bucket_provisioner::crd::{ObjectBucket, ObjectBucketClaim};

/// Bucket Provisioner - ObjectBucketClaim reconciler tooling
#[derive(Parser, Debug)]
#[command(name = "bucket-provisioner", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write CRD manifests to a file instead of stdout
    Crds {
        /// Output path for the multi-document YAML
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Crds { output }) => {
            std::fs::write(&output, crd_manifests()?)
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", output.display(), e))?;
            tracing::info!(path = %output.display(), "CRD manifests written");
            Ok(())
        }
        None if cli.crd => {
            print!("{}", crd_manifests()?);
            Ok(())
        }
        None => {
            eprintln!("nothing to do: pass --crd or a subcommand (see --help)");
            std::process::exit(2);
        }
    }
}

/// Both CRDs as one multi-document YAML string
fn crd_manifests() -> anyhow::Result<String> {
    let claim = serde_yaml::to_string(&ObjectBucketClaim::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
    let bucket = serde_yaml::to_string(&ObjectBucket::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
    Ok(format!("{claim}---\n{bucket}"))
}
