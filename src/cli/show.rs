use std::path::Path;

use clap::Parser;
use relief_store::{DocId, Key, Slot, Store};
use tracing::instrument;

#[derive(Debug, Parser)]
#[command(about = "Display a document with its references and referrers")]
pub struct Show {
    /// The document type, for example Camp or Plan
    type_name: String,

    /// The identity value of the document
    key: String,
}

impl Show {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut store = super::open_store(root)?;

        let key = parse_key(&self.key);
        let Some(id) = store.find(&self.type_name, key)? else {
            anyhow::bail!("{} '{}' not found", self.type_name, self.key);
        };

        print_document(&store, id)
    }
}

/// Integer identities are looked up as integers, everything else as text.
fn parse_key(input: &str) -> Key {
    input
        .parse::<i64>()
        .map_or_else(|_| Key::from(input), Key::from)
}

fn print_document(store: &Store, id: DocId) -> anyhow::Result<()> {
    let record = store.record(id)?;
    println!("# {record}");
    println!();

    for (field, slot) in record.schema().fields().iter().zip(record.slots()) {
        match slot {
            Slot::Value(value) => println!("  {:<20} {value}", field.name()),
            Slot::References(set) => {
                let element_type = set.element_type().unwrap_or("-");
                println!("  {:<20} {} x {element_type}", field.name(), set.len());
                for element in set {
                    println!("    - {}", super::summarize(store, element)?);
                }
            }
        }
    }

    let referrers = store.referred_by(id)?;
    if !referrers.is_empty() {
        println!();
        println!("Referred by:");
        for referrer in referrers {
            println!("  - {}", super::summarize(store, referrer)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("camp1", &Key::from("camp1"); "text")]
    #[test_case("42", &Key::from(42); "integer")]
    #[test_case("-3", &Key::from(-3); "negative")]
    fn keys_are_parsed(input: &str, expected: &Key) {
        assert_eq!(&parse_key(input), expected);
    }
}
