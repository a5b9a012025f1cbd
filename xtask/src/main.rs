use std::process::Command;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for splitcube")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fmt, clippy, tests and docs in sequence
    Check,
    /// Check formatting on all crates
    Fmt,
    /// Lint every target with warnings denied
    Clippy,
    /// Run tests, optionally for a single package
    Test {
        #[arg(short, long)]
        package: Option<String>,
    },
    /// Build rustdoc for the workspace
    Doc,
    /// Headless session plus a scripted replay through the CLI
    Smoke,
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Commands::Check => {
            fmt()?;
            clippy()?;
            test(None)?;
            doc()?;
        }
        Commands::Fmt => fmt()?,
        Commands::Clippy => clippy()?,
        Commands::Test { package } => test(package.as_deref())?,
        Commands::Doc => doc()?,
        Commands::Smoke => smoke()?,
    }
    Ok(())
}

fn cargo(step: &str, args: &[&str]) -> Result<()> {
    println!("==> cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        bail!("{step} failed ({status})");
    }
    Ok(())
}

fn fmt() -> Result<()> {
    cargo("fmt", &["fmt", "--all", "--", "--check"])
}

fn clippy() -> Result<()> {
    cargo(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn test(package: Option<&str>) -> Result<()> {
    match package {
        Some(package) => cargo("test", &["test", "-p", package]),
        None => cargo("test", &["test", "--workspace"]),
    }
}

fn doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}

fn smoke() -> Result<()> {
    let cli = ["run", "-q", "-p", "splitcube-cli", "--"];
    let session = [&cli[..], &["run", "--ticks", "30", "--rate", "120"]].concat();
    cargo("smoke session", &session)?;
    let replay = [&cli[..], &["script", "demos/smoke.jsonl"]].concat();
    cargo("smoke replay", &replay)
}
