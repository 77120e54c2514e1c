//! OVFKit CLI - Maintain vApp templates in a lab template library.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ovfkit_core::{
    apply_time_bubble, map_disks, remap_ovf, scrub_ovf, update_manifest, validate_ovf,
    BubbleOutcome, BubbleReport, FileStatus, ManifestStatus, RemapCallback, RemapProgress,
};
use tracing_subscriber::EnvFilter;

/// Library maintenance for exported vApp templates.
#[derive(Parser)]
#[command(name = "ovfkit")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that every file an OVF references is present.
    Validate {
        /// Path to the OVF descriptor.
        ovf_file: PathBuf,

        /// Also fail when a file's size differs from the declared size.
        #[arg(long)]
        strict: bool,
    },

    /// Prepare an exported OVF for re-import.
    Scrub {
        /// Path to the OVF descriptor.
        ovf_file: PathBuf,

        /// Backup file path. Defaults to <OVF>.backup.
        #[arg(short, long)]
        backup: Option<PathBuf>,

        /// Do not refresh the descriptor's manifest entry afterwards.
        #[arg(long)]
        no_manifest: bool,
    },

    /// Pin a library template to a fixed RTC start time, or release it.
    Bubble {
        /// Name of the vApp template (OVF base name).
        template: String,

        /// Epoch seconds for the bubble start. 0 removes the bubble.
        #[arg(long)]
        rtc_start_time: u64,

        /// Path to the template library.
        #[arg(long, default_value = "/hol/lib")]
        repository: PathBuf,
    },

    /// Refresh the OVF's hash in its manifest.
    Manifest {
        /// Path to the OVF descriptor.
        ovf_file: PathBuf,

        /// Manifest path. Defaults to the OVF path with a .mf extension.
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// Print the VM:disk to file name mapping of an OVF.
    Map {
        /// Path to the OVF descriptor.
        ovf_file: PathBuf,
    },

    /// Reuse the disks of an old template revision for a new one.
    Remap {
        /// Name of the new vApp template (OVF base name).
        template: String,

        /// Name of the old vApp template already in the library.
        old_template: String,

        /// Path to the template library.
        #[arg(long, default_value = "/hol/lib")]
        repository: PathBuf,

        /// Staging directory on the same file system as the library.
        #[arg(long, default_value = "/hol/seeds")]
        seeds: PathBuf,

        /// Suppress progress output.
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting ovfkit");

    match cli.command {
        Commands::Validate { ovf_file, strict } => run_validate(&ovf_file, strict, cli.verbose > 0),
        Commands::Scrub {
            ovf_file,
            backup,
            no_manifest,
        } => run_scrub(&ovf_file, backup.as_deref(), !no_manifest),
        Commands::Bubble {
            template,
            rtc_start_time,
            repository,
        } => run_bubble(&template, rtc_start_time, &repository),
        Commands::Manifest { ovf_file, manifest } => {
            let status = update_manifest(&ovf_file, manifest.as_deref())?;
            print_manifest_status(&status);
            Ok(())
        }
        Commands::Map { ovf_file } => show_map(&ovf_file),
        Commands::Remap {
            template,
            old_template,
            repository,
            seeds,
            quiet,
        } => run_remap(&template, &old_template, &repository, &seeds, quiet),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn run_validate(ovf_file: &Path, strict: bool, verbose: bool) -> Result<()> {
    let report = validate_ovf(ovf_file, verbose)?;

    println!("OVF Validation");
    println!("--------------");
    for check in &report.files {
        let marker = match check.status {
            FileStatus::Present { .. } if check.size_matches() => "ok",
            FileStatus::Present { .. } => "size",
            FileStatus::NotFound => "missing",
            FileStatus::Unreadable { .. } => "unreadable",
        };
        println!("  [{marker:>10}] {check}");
    }
    println!();

    let mismatches = report.size_mismatches().count();
    if !report.is_valid() {
        bail!("{} is missing referenced files", ovf_file.display());
    }
    if strict && !report.is_strictly_valid() {
        bail!(
            "{} has {mismatches} file(s) whose size differs from the descriptor",
            ovf_file.display()
        );
    }
    println!(
        "All {} referenced files present ({mismatches} size mismatch(es))",
        report.files.len()
    );
    Ok(())
}

fn run_scrub(ovf_file: &Path, backup: Option<&Path>, refresh_manifest: bool) -> Result<()> {
    let report = scrub_ovf(ovf_file, backup)?;

    println!("OVF Scrub");
    println!("---------");
    for pass in &report.passes {
        let problems = if pass.problems.is_empty() {
            String::new()
        } else {
            format!(", {} problem(s)", pass.problems.len())
        };
        println!("  {:<28} {} change(s){problems}", pass.pass.to_string(), pass.changes.len());
    }
    for (old, new) in &report.renamed_networks {
        println!("  network renamed: {old} -> {new}");
    }
    if let Some(backup_path) = &report.backup_path {
        println!("Backup:    {}", backup_path.display());
    }

    if refresh_manifest {
        print_manifest_status(&update_manifest(ovf_file, None)?);
    }
    Ok(())
}

fn run_bubble(template: &str, rtc_start_time: u64, repository: &Path) -> Result<()> {
    let ovf_file = library_ovf(repository, template)?;

    if rtc_start_time > 0 {
        println!(
            "Bubble date/time: {} ({rtc_start_time})",
            bubble_date(rtc_start_time)?
        );
    } else {
        println!("Removing time bubble");
    }

    let (report, manifest) = apply_time_bubble(&ovf_file, rtc_start_time)?;
    print_bubble_report(&report);
    print_manifest_status(&manifest);
    Ok(())
}

/// Human-readable UTC date of an RTC start time in epoch seconds.
fn bubble_date(start_time: u64) -> Result<String> {
    let date = i64::try_from(start_time)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .with_context(|| format!("RTC start time {start_time} is out of range"))?;
    Ok(date.format("%a %b %e %H:%M:%S %Y UTC").to_string())
}

fn show_map(ovf_file: &Path) -> Result<()> {
    let map = map_disks(ovf_file)?;

    println!("Disk Map");
    println!("========");
    for (key, record) in map.iter() {
        println!("  {key} -> {}", record.file_name);
    }
    if !map.excluded().is_empty() {
        println!();
        println!("Excluded:");
        for exclusion in map.excluded() {
            println!("  {exclusion}");
        }
    }
    Ok(())
}

/// Paths of a remap whose old revision has been moved into the seeds directory.
#[derive(Debug)]
struct Staging {
    old_dir: PathBuf,
    seed_dir: PathBuf,
    old_ovf: PathBuf,
    new_ovf: PathBuf,
    lib_dir: PathBuf,
}

impl Staging {
    /// Move the old revision back into the library.
    fn restore(&self) -> Result<()> {
        fs::rename(&self.seed_dir, &self.old_dir).with_context(|| {
            format!(
                "failed to move {} back to {}",
                self.seed_dir.display(),
                self.old_dir.display()
            )
        })
    }
}

/// Check both revisions and move `repository/OLD` to `seeds/OLD`.
///
/// Both descriptors are parsed before anything moves, so a malformed OVF
/// leaves the library untouched.
fn stage_remap(
    template: &str,
    old_template: &str,
    repository: &Path,
    seeds: &Path,
) -> Result<Staging> {
    if repository.parent() != seeds.parent() {
        bail!(
            "{} and {} must share a parent directory (same file system)",
            repository.display(),
            seeds.display()
        );
    }
    if !seeds.is_dir() {
        bail!("seeds directory {} does not exist", seeds.display());
    }

    let old_dir = repository.join(old_template);
    let library_old_ovf = library_ovf(repository, old_template)?;
    let new_ovf = library_ovf(repository, template)?;
    map_disks(&library_old_ovf)
        .with_context(|| format!("cannot map disks of {}", library_old_ovf.display()))?;
    map_disks(&new_ovf).with_context(|| format!("cannot map disks of {}", new_ovf.display()))?;

    let seed_dir = seeds.join(old_template);
    if seed_dir.exists() {
        bail!("{} already exists", seed_dir.display());
    }
    fs::rename(&old_dir, &seed_dir).with_context(|| {
        format!(
            "failed to move {} to {}",
            old_dir.display(),
            seed_dir.display()
        )
    })?;
    let old_ovf = seed_dir.join(format!("{old_template}.ovf"));
    let lib_dir = new_ovf
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| repository.join(template));

    Ok(Staging {
        old_dir,
        seed_dir,
        old_ovf,
        new_ovf,
        lib_dir,
    })
}

fn run_remap(
    template: &str,
    old_template: &str,
    repository: &Path,
    seeds: &Path,
    quiet: bool,
) -> Result<()> {
    let staging = stage_remap(template, old_template, repository, seeds)?;

    let progress_bar = if quiet {
        None
    } else {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-");
        pb.set_style(style);
        Some(pb)
    };

    let callback: Option<RemapCallback> = progress_bar.clone().map(|pb| {
        Box::new(move |progress: RemapProgress| {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.completed as u64);
            pb.set_message(progress.key.to_string());
        }) as RemapCallback
    });

    let report = match remap_ovf(
        &staging.old_ovf,
        &staging.new_ovf,
        &staging.lib_dir,
        &staging.seed_dir,
        callback,
    ) {
        Ok(report) => report,
        Err(err) => {
            if let Err(restore_err) = staging.restore() {
                tracing::error!(error = %restore_err, "could not restore the old revision");
            }
            return Err(err.into());
        }
    };

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Complete!");
    }

    println!();
    print!("{report}");
    println!();
    println!(
        "Moved {} disk(s), {} unmatched, {} failed",
        report.moved.len(),
        report.unmatched.len(),
        report.failed.len()
    );
    Ok(())
}

/// Resolve `NAME` to `REPOSITORY/NAME/NAME.ovf`.
fn library_ovf(repository: &Path, template: &str) -> Result<PathBuf> {
    let ovf_file = repository.join(template).join(format!("{template}.ovf"));
    if !ovf_file.is_file() {
        bail!("Unable to locate OVF file in library: {}", ovf_file.display());
    }
    Ok(ovf_file)
}

fn print_bubble_report(report: &BubbleReport) {
    for vm in &report.vms {
        let outcome = match &vm.outcome {
            BubbleOutcome::Applied => "bubbled".to_string(),
            BubbleOutcome::AlreadyBubbled { start_time } => {
                format!("already bubbled at {start_time}, unchanged")
            }
            BubbleOutcome::Removed {
                start_time,
                entries,
            } => format!(
                "removed {entries} entries (was {})",
                start_time.as_deref().unwrap_or("unset")
            ),
            BubbleOutcome::NotBubbled => "not bubbled".to_string(),
            BubbleOutcome::NoHardwareSection => "no hardware section, skipped".to_string(),
        };
        println!("  {:<24} {outcome}", vm.vm);
    }
    if let Some(backup_path) = &report.backup_path {
        println!("Backup:    {}", backup_path.display());
    }
}

fn print_manifest_status(status: &ManifestStatus) {
    match status {
        ManifestStatus::Updated { hash } => println!("Manifest:  updated ({hash})"),
        ManifestStatus::Unchanged { hash } => println!("Manifest:  up to date ({hash})"),
        ManifestStatus::NoEntry => println!("Manifest:  no entry for descriptor"),
        ManifestStatus::MissingManifest => println!("Manifest:  none"),
        ManifestStatus::MissingOvf => println!("Manifest:  descriptor missing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_OVF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Envelope xmlns="http://schemas.dmtf.org/ovf/envelope/1" xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1">
  <References/>
</Envelope>
"#;

    /// `lib/` and `seeds/` under one parent, with `lab-v1` and `lab-v2` in the library.
    fn library(old_ovf: &str) -> (TempDir, PathBuf, PathBuf) {
        let root = TempDir::new().unwrap();
        let repository = root.path().join("lib");
        let seeds = root.path().join("seeds");
        fs::create_dir(&seeds).unwrap();
        for (name, contents) in [("lab-v1", old_ovf), ("lab-v2", EMPTY_OVF)] {
            let dir = repository.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{name}.ovf")), contents).unwrap();
        }
        (root, repository, seeds)
    }

    #[test]
    fn test_bubble_date() {
        assert_eq!(bubble_date(1702666800).unwrap(), "Fri Dec 15 19:00:00 2023 UTC");
        assert_eq!(bubble_date(1).unwrap(), "Thu Jan  1 00:00:01 1970 UTC");
    }

    #[test]
    fn test_bubble_date_out_of_range() {
        let err = bubble_date(u64::MAX).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(bubble_date(i64::MAX as u64).is_err());
    }

    #[test]
    fn test_stage_remap_moves_old_revision() {
        let (_root, repository, seeds) = library(EMPTY_OVF);

        let staging = stage_remap("lab-v2", "lab-v1", &repository, &seeds).unwrap();

        assert!(!repository.join("lab-v1").exists());
        assert!(staging.old_ovf.is_file());
        assert_eq!(staging.old_ovf, seeds.join("lab-v1").join("lab-v1.ovf"));
        assert_eq!(staging.lib_dir, repository.join("lab-v2"));

        staging.restore().unwrap();
        assert!(repository.join("lab-v1").join("lab-v1.ovf").is_file());
        assert!(!seeds.join("lab-v1").exists());
    }

    #[test]
    fn test_stage_remap_leaves_library_alone_on_bad_descriptor() {
        let (_root, repository, seeds) = library("<Envelope><References>");

        let err = stage_remap("lab-v2", "lab-v1", &repository, &seeds).unwrap_err();

        assert!(err.to_string().contains("cannot map disks"));
        assert!(repository.join("lab-v1").join("lab-v1.ovf").is_file());
        assert!(!seeds.join("lab-v1").exists());
    }
}
