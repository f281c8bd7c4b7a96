use std::path::Path;

use clap::Parser;
use tracing::instrument;

#[derive(Debug, Parser)]
#[command(about = "List the documents of an indexed type")]
pub struct List {
    /// The document type, for example Camp or Plan
    type_name: String,

    /// Print identity values only
    #[arg(long)]
    quiet: bool,
}

impl List {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut store = super::open_store(root)?;
        let documents = store.all(&self.type_name)?;

        if documents.is_empty() && !self.quiet {
            println!("No {} documents found.", self.type_name);
            return Ok(());
        }

        for id in documents {
            if self.quiet {
                if let Some(key) = store.key(id)? {
                    println!("{key}");
                }
            } else {
                println!("{}", super::summarize(&store, id)?);
            }
        }
        Ok(())
    }
}
