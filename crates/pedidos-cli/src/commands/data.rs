//! Data command handlers: init, load, save, clear

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use pedidos_core::{
    Collection, Contact, Order, Persistence, Record, SaveOutcome, Transaction, VersionInit,
};

use crate::output::{outcome_label, Output, OutputFormat};

/// Write the version marker if it is missing
pub async fn init(persistence: &Persistence, output: &Output) -> Result<()> {
    let init = persistence.initialize_version_marker().await;

    match output.format {
        OutputFormat::Json => {
            let (status, version) = match &init {
                VersionInit::Created => ("created", persistence.app_version().await),
                VersionInit::AlreadyPresent(v) => ("already_present", Some(v.clone())),
                VersionInit::Failed => ("failed", None),
            };
            println!(
                "{}",
                serde_json::json!({ "status": status, "version": version })
            );
        }
        _ => match &init {
            VersionInit::Created => output.success("Initialized version marker."),
            VersionInit::AlreadyPresent(v) => {
                output.success(&format!("Already initialized (version {}).", v))
            }
            VersionInit::Failed => output.warn("Could not write the version marker."),
        },
    }

    if init == VersionInit::Failed {
        bail!("Initialization failed in both storage tiers");
    }
    Ok(())
}

/// Print every record in a collection
pub async fn load(
    persistence: &Persistence,
    collection: Collection,
    output: &Output,
) -> Result<()> {
    let records = persistence.load_values(collection, Vec::new()).await;

    match output.format {
        OutputFormat::Quiet => println!("{}", records.len()),
        OutputFormat::Json => println!("{}", serde_json::to_string(&records)?),
        OutputFormat::Human => {
            if records.is_empty() {
                println!("No records in {}.", collection);
            } else {
                println!("{}", serde_json::to_string_pretty(&records)?);
                println!();
                println!("{} record(s) in {}", records.len(), collection);
            }
        }
    }

    Ok(())
}

/// Replace a collection with the JSON array read from `source` (`-` for stdin)
pub async fn save(
    persistence: &Persistence,
    collection: Collection,
    source: &Path,
    output: &Output,
) -> Result<()> {
    let raw = read_source(source)?;
    let values: Vec<Value> = serde_json::from_str(&raw)
        .with_context(|| format!("Expected a JSON array of records in {:?}", source))?;

    let outcome = match collection {
        Collection::Orders => save_typed::<Order>(persistence, values).await?,
        Collection::Transactions => save_typed::<Transaction>(persistence, values).await?,
        Collection::Contacts => save_typed::<Contact>(persistence, values).await?,
        Collection::AppVersion => {
            bail!("The version marker is managed by `pedidos init`")
        }
    };

    match output.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "collection": collection.name(),
                "outcome": outcome_label(outcome)
            })
        ),
        OutputFormat::Quiet => println!("{}", outcome_label(outcome)),
        OutputFormat::Human => match outcome {
            SaveOutcome::Primary => output.success(&format!("Saved {}.", collection)),
            SaveOutcome::Fallback => output.success(&format!(
                "Saved {} to the fallback store (primary unavailable).",
                collection
            )),
            SaveOutcome::Lost | SaveOutcome::Rejected => {}
        },
    }

    if !outcome.is_persisted() {
        bail!("{} was not saved ({})", collection, outcome_label(outcome));
    }
    Ok(())
}

/// Clear every collection in both tiers
pub async fn clear(persistence: &Persistence, yes: bool, output: &Output) -> Result<()> {
    if !yes {
        bail!("Refusing to delete all data without --yes");
    }

    let report = persistence.clear_all().await;

    match output.format {
        OutputFormat::Json => {
            let failures: Vec<Value> = report
                .failures
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "collection": f.collection.name(),
                        "tier": f.tier,
                        "error": f.error.to_string()
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({ "complete": report.is_complete(), "failures": failures })
            );
        }
        _ => {
            for failure in &report.failures {
                output.warn(&format!(
                    "{} ({} tier): {}",
                    failure.collection, failure.tier, failure.error
                ));
            }
            if report.is_complete() {
                output.success("All data cleared.");
            }
        }
    }

    Ok(())
}

/// Check that every value is a valid record of kind `R` before saving
async fn save_typed<R: Record>(
    persistence: &Persistence,
    values: Vec<Value>,
) -> Result<SaveOutcome> {
    let records = parse_records::<R>(values)?;
    Ok(persistence.save(&records).await)
}

fn parse_records<R: Record>(values: Vec<Value>) -> Result<Vec<R>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            serde_json::from_value(value)
                .with_context(|| format!("Record {} is not a valid {}", i, R::COLLECTION))
        })
        .collect()
}

fn read_source(source: &Path) -> Result<String> {
    if source == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read records from stdin")?;
        return Ok(raw);
    }

    std::fs::read_to_string(source).with_context(|| format!("Failed to read {:?}", source))
}
