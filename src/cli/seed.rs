use std::path::Path;

use clap::Parser;
use relief_store::relief;
use tracing::instrument;

#[derive(Debug, Parser)]
#[command(about = "Replace the store's contents with sample data")]
pub struct Seed {}

impl Seed {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut store = super::open_store(root)?;
        relief::seed(&mut store)?;
        println!("Seeded sample data into {}", store.data_dir().display());
        Ok(())
    }
}
