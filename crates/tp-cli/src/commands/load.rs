//! Load command: create posts from track files and reconcile with a ledger.

use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use walkdir::WalkDir;

use tp_core::{
    DeviceRegistry, Entry, Ledger, Measurements, Reconciler, ResolvedInstant, TzfLookup, resolve,
};
use tp_store::{EntryStore, load_devices};

use crate::{Config, Console};

/// Arguments of `tp load`.
#[derive(Debug, Args)]
pub struct LoadArgs {
    /// A TCX file or a directory searched recursively for TCX files.
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Ledger export (semicolon-separated CSV) to enrich the new posts from.
    #[arg(short = 's', long, value_name = "FILE")]
    pub ledger: Option<PathBuf>,

    /// Delete each source file once it is copied into its post.
    #[arg(short, long)]
    pub delete: bool,

    /// Replace posts that already exist.
    #[arg(short, long)]
    pub force: bool,
}

/// Totals of a load run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub created: usize,
    pub skipped: usize,
    /// Ledger-enriched posts and failures, when a ledger was given.
    pub reconciled: Option<(usize, usize)>,
}

fn is_track_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tcx"))
}

/// Lists the track files under `source`, sorted by path.
fn collect_track_files(source: &Path) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(if is_track_file(source) {
            vec![source.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        if entry.file_type().is_file() && is_track_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Loaded reconciliation inputs.
struct LedgerInputs {
    ledger: Ledger,
    devices: DeviceRegistry,
}

fn load_ledger_inputs<W: Write>(
    path: &Path,
    config: &Config,
    console: &mut Console<W>,
) -> Result<LedgerInputs> {
    if !path.is_file() {
        bail!("Ledger file not found: {}", path.display());
    }
    let ledger = Ledger::open(path, &config.ledger)
        .with_context(|| format!("failed to read ledger {}", path.display()))?;
    if ledger.is_empty() {
        console.warn(format!("Ledger {} has no rows", path.display()))?;
    }

    let load = load_devices(&config.devices_dir).with_context(|| {
        format!("failed to read devices from {}", config.devices_dir.display())
    })?;
    for failure in &load.failures {
        console.warn(format!(
            "Device {} is unavailable: {}",
            failure.id, failure.error
        ))?;
    }
    if load.registry.is_empty() {
        console.warn(format!(
            "No devices found in {}",
            config.devices_dir.display()
        ))?;
    }
    tracing::debug!(
        rows = ledger.len(),
        devices = load.registry.len(),
        "loaded ledger inputs"
    );

    Ok(LedgerInputs {
        ledger,
        devices: load.registry,
    })
}

/// Copies the template and the track into `dir` and writes the measurements.
///
/// On failure `dir` is removed, so a rerun does not mistake it for a finished
/// post. The source is only deleted once the post is saved.
fn create_entry(
    store: &EntryStore,
    dir: &Path,
    file: &Path,
    measurements: &Measurements,
    instant: &ResolvedInstant,
    delete_source: bool,
) -> Result<Entry> {
    let entry = store
        .create(dir)
        .with_context(|| format!("failed to create post in {}", dir.display()))?;

    let entry = fill_entry(entry, dir, file, measurements, instant).inspect_err(|_| {
        if let Err(err) = fs::remove_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), %err, "failed to remove incomplete post");
        }
    })?;

    if delete_source {
        fs::remove_file(file).with_context(|| format!("failed to delete {}", file.display()))?;
        tracing::debug!(file = %file.display(), "deleted source file");
    }
    Ok(entry)
}

fn fill_entry(
    mut entry: Entry,
    dir: &Path,
    file: &Path,
    measurements: &Measurements,
    instant: &ResolvedInstant,
) -> Result<Entry> {
    let file_name = file.file_name().unwrap_or_else(|| file.as_os_str());
    fs::copy(file, dir.join(file_name))
        .with_context(|| format!("failed to copy {} into {}", file.display(), dir.display()))?;

    entry.merge_extraction(measurements, instant, file);
    tp_store::save(&entry)
        .with_context(|| format!("failed to save {}", entry.path.display()))?;
    Ok(entry)
}

/// Runs the load command.
pub fn run<W: Write>(
    args: &LoadArgs,
    config: &Config,
    console: &mut Console<W>,
) -> Result<LoadSummary> {
    if !args.source.exists() {
        bail!("Invalid source '{}'", args.source.display());
    }
    let inputs = args
        .ledger
        .as_deref()
        .map(|path| load_ledger_inputs(path, config, console))
        .transpose()?;

    console.line(format!("Loading from {}...", args.source.display()))?;
    let files = collect_track_files(&args.source)?;
    if files.is_empty() {
        bail!("No files found in {}", args.source.display());
    }

    let store = EntryStore::new(&config.posts_dir, &config.template_path);
    let zones = TzfLookup::new();
    let mut summary = LoadSummary::default();
    let mut entries = Vec::new();

    for (i, file) in files.iter().enumerate() {
        let name = file.file_name().unwrap_or_default().to_string_lossy();
        console.line(format!("Processing {}/{}: {name}", i + 1, files.len()))?;

        let measurements = match Measurements::extract(file) {
            Ok(measurements) => measurements,
            Err(err) => {
                console.warn(format!("Skipping {}: {err}", file.display()))?;
                summary.skipped += 1;
                continue;
            }
        };
        let position = measurements
            .first_position
            .filter(|_| config.timezone_lookup);
        let instant = match resolve(&measurements.started_at, position, &zones) {
            Ok(instant) => instant,
            Err(err) => {
                console.warn(format!("Skipping {}: {err}", file.display()))?;
                summary.skipped += 1;
                continue;
            }
        };

        let dir = store.entry_dir(&instant);
        if dir.exists() {
            if !args.force {
                tracing::debug!(dir = %dir.display(), "post exists, skipping");
                summary.skipped += 1;
                continue;
            }
            fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to remove {}", dir.display()))?;
            tracing::debug!(dir = %dir.display(), "removed existing post");
        }

        let entry = create_entry(&store, &dir, file, &measurements, &instant, args.delete)?;
        tracing::debug!(post = entry.dir_name(), "created post");
        entries.push(entry);
        summary.created += 1;
    }

    console.line(format!(
        "{} entries created, {} skipped.",
        summary.created, summary.skipped
    ))?;

    if let Some(inputs) = inputs {
        let reconciler = Reconciler::new(&inputs.ledger, &inputs.devices, config.equipment_policy);
        let report = reconciler
            .reconcile(&mut entries, &store)
            .context("failed to reconcile posts with ledger")?;

        for key in &report.unmatched {
            console.warn(format!("Key {key} not found in ledger"))?;
        }
        for (key, device) in &report.rejected {
            console.warn(format!("Ledger row for {key} names unknown equipment {device}"))?;
        }

        let failed = report.failed();
        if report.enriched == summary.created {
            console.line(format!(
                "All {} entries updated with ledger data, {failed} failed.",
                report.enriched
            ))?;
        } else {
            console.line(format!(
                "Only {}/{} entries updated with ledger data, {failed} failed.",
                report.enriched, summary.created
            ))?;
        }
        summary.reconciled = Some((report.enriched, failed));
    }

    Ok(summary)
}
