use std::path::Path;

use clap::Parser;
use tracing::instrument;

#[derive(Debug, Parser)]
#[command(about = "Delete every document of an indexed type")]
pub struct Clear {
    /// The document type, for example Camp or Plan
    type_name: String,
}

impl Clear {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut store = super::open_store(root)?;
        let count = store.all(&self.type_name)?.len();
        store.delete_all(&self.type_name)?;
        println!("Deleted {count} {} documents", self.type_name);
        Ok(())
    }
}
