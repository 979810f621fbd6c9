use std::path::Path;

use anyhow::Context;
use kube::CustomResourceExt;
use operator::{crd::User, rbac::operator_cluster_role};

use clap::Parser;
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    // Output directory
    #[arg(short, long, default_value = ".")]
    output: String,
}

fn write_yaml<T: serde::Serialize>(dir: &Path, file: &str, value: &T) -> anyhow::Result<()> {
    let path = dir.join(file);
    std::fs::write(&path, serde_yaml::to_string(value)?)
        .with_context(|| format!("writing {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let dir = Path::new(&args.output);
    // Create directory if it does not exist
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    write_yaml(dir, "user.yaml", &User::crd())?;
    write_yaml(dir, "role.yaml", &operator_cluster_role())?;
    Ok(())
}
