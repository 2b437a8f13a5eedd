use anyhow::{
    Context,
    Result,
    ensure,
};
use clap::{
    Parser,
    Subcommand,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Prediction client helper tasks (ABI check, clippy, tests)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompile the sol! bindings in prediction_abi
    Abi,
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Run unit and integration tests
    Test {
        /// Only run the integration-tests crate
        #[arg(long)]
        integration_only: bool,
        /// Skip recompiling prediction_abi first
        #[arg(long)]
        skip_abi: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root()?;

    match cli.command {
        Commands::Abi => check_abi(&root)?,
        Commands::Clippy => run_clippy(&root)?,
        Commands::Test {
            integration_only,
            skip_abi,
        } => {
            if !skip_abi {
                check_abi(&root)?;
            }
            if !integration_only {
                run_unit_tests(&root)?;
            }
            run_integration_tests(&root)?;
        }
    }

    Ok(())
}

fn repo_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn check_abi(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("check")
        .arg("-p")
        .arg("prediction_abi")
        .arg("--quiet")
        .current_dir(root);
    run_command(cmd, "cargo check -p prediction_abi")
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--all-features")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")
}

fn run_unit_tests(root: &Path) -> Result<()> {
    for package in ["client", "deployments"] {
        let mut cmd = Command::new("cargo");
        cmd.arg("test").arg("-p").arg(package).current_dir(root);
        run_command(cmd, &format!("cargo test -p {package}"))?;
    }
    Ok(())
}

fn run_integration_tests(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test")
        .arg("-p")
        .arg("integration-tests")
        .current_dir(root);
    run_command(cmd, "cargo test -p integration-tests")
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {label}");
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}
