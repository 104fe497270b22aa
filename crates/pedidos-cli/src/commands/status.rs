//! Status command handler

use anyhow::Result;

use pedidos_core::{Collection, Config, Persistence, Tier};

use crate::output::{Output, OutputFormat};

/// Show where data lives and how much of it each collection holds
pub async fn show(persistence: &Persistence, config: &Config, output: &Output) -> Result<()> {
    let schema_version = match persistence.primary().schema_version().await {
        Ok(version) => version,
        Err(e) => {
            output.warn(&format!("Primary store unavailable: {}", e));
            None
        }
    };
    let app_version = persistence.app_version().await;

    let mut counts = Vec::new();
    for collection in [Collection::Orders, Collection::Transactions, Collection::Contacts] {
        let (count, tier) = count_records(persistence, collection).await;
        counts.push((collection, count, tier));
    }

    match output.format {
        OutputFormat::Json => {
            let collections: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(collection, count, tier)| {
                    (
                        collection.name().to_string(),
                        serde_json::json!({
                            "records": count,
                            "tier": tier
                        }),
                    )
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "database_path": config.database_path(),
                    "fallback_dir": config.fallback_dir(),
                    "primary_enabled": config.primary_enabled,
                    "schema_version": schema_version,
                    "app_version": app_version,
                    "collections": collections
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", app_version.as_deref().unwrap_or("uninitialized"));
        }
        OutputFormat::Human => {
            println!("Pedidos Status");
            println!("==============");
            println!();
            println!("Storage:");
            println!("  Database: {}", config.database_path().display());
            println!("  Fallback: {}", config.fallback_dir().display());
            println!(
                "  Primary:  {}",
                if config.primary_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!(
                "  Schema:   {}",
                schema_version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "(unavailable)".to_string())
            );
            println!(
                "  Version:  {}",
                app_version.as_deref().unwrap_or("(not initialized)")
            );
            println!();
            println!("Collections:");
            for (collection, count, tier) in &counts {
                println!("  {:<12} {:>5} records  [{}]", collection.name(), count, tier);
            }
        }
    }

    Ok(())
}

/// Count a collection's records and name the tier that answered
///
/// Reads the tiers directly: the facade's load drops fallback copies once
/// the primary answers, which a diagnostic must not do.
async fn count_records(
    persistence: &Persistence,
    collection: Collection,
) -> (usize, &'static str) {
    let primary = persistence.primary();
    match primary.read(collection).await {
        Ok(records) => (records.map_or(0, |r| r.len()), primary.name()),
        Err(_) => {
            let fallback = persistence.fallback();
            match fallback.read(collection).await {
                Ok(records) => (records.map_or(0, |r| r.len()), fallback.name()),
                Err(_) => (0, "unavailable"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pedidos_core::{Contact, FallbackStore, PrimaryStore};
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_status_keeps_outage_copy() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir);
        let fallback = FallbackStore::from_config(&config);
        fallback
            .put("contatos", &[Contact::new("Fora do ar")])
            .unwrap();

        let persistence = Persistence::new(PrimaryStore::in_memory(), fallback);
        show(&persistence, &config, &Output::new(OutputFormat::Quiet))
            .await
            .unwrap();

        assert!(persistence.fallback().contains("contatos"));
    }

    #[tokio::test]
    async fn test_counts_come_from_fallback_when_primary_is_down() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir);
        let fallback = FallbackStore::from_config(&config);
        fallback
            .put("contatos", &[Contact::new("Ana"), Contact::new("Bia")])
            .unwrap();

        let persistence = Persistence::new(PrimaryStore::disabled(), fallback);

        assert_eq!(
            count_records(&persistence, Collection::Contacts).await,
            (2, "fallback")
        );
        assert_eq!(
            count_records(&persistence, Collection::Orders).await,
            (0, "fallback")
        );
        assert!(persistence.fallback().contains("contatos"));
    }
}
