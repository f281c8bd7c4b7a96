use std::path::Path;

use clap::Parser;
use relief_store::storage::collection_files;
use tracing::instrument;

#[derive(Debug, Parser, Default)]
#[command(about = "Show document counts per collection")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Status {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut store = super::open_store(root)?;
        let data_dir = store.data_dir();

        let mut counts = Vec::new();
        for (type_name, path) in collection_files(&data_dir) {
            let known = store
                .registry()
                .get(&type_name)
                .is_some_and(|schema| schema.is_indexed());
            if !known {
                tracing::warn!("Ignoring {}: {type_name} is not an indexed type", path.display());
                continue;
            }
            let count = store.all(&type_name)?.len();
            counts.push((type_name, count));
        }

        if counts.is_empty() {
            println!(
                "No collections found in {}. Create sample data with 'relief seed'.",
                data_dir.display()
            );
            return Ok(());
        }

        match self.output {
            OutputFormat::Table => {
                println!("{:<12} {:>6}", "Collection", "Count");
                for (type_name, count) in &counts {
                    println!("{type_name:<12} {count:>6}");
                }
                println!("{:<12} {:>6}", "Documents", store.document_count());
            }
            OutputFormat::Json => {
                let collections: serde_json::Map<_, _> = counts
                    .into_iter()
                    .map(|(type_name, count)| (type_name, count.into()))
                    .collect();
                let output = serde_json::json!({
                    "data_dir": data_dir.display().to_string(),
                    "collections": collections,
                    "documents": store.document_count(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
        Ok(())
    }
}
