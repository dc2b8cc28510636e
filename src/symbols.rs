use crate::Result;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SymbolRow {
    #[serde(rename = "Symbol")]
    symbol: String,
}

/// Load the traded symbols from a CSV file with a `Symbol` column
pub fn load_symbols<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let symbols = from_reader(file)?;

    tracing::info!("Loaded {} symbols from {}", symbols.len(), path.display());

    Ok(symbols)
}

/// Parse symbols from any CSV source, keeping file order
///
/// Blank entries are skipped and repeats keep their first position.
pub fn from_reader<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut symbols: Vec<String> = Vec::new();

    for result in csv_reader.deserialize() {
        let row: SymbolRow = result?;

        if row.symbol.is_empty() {
            continue;
        }
        if symbols.contains(&row.symbol) {
            tracing::warn!(symbol = %row.symbol, "Duplicate symbol ignored");
            continue;
        }
        symbols.push(row.symbol);
    }

    Ok(symbols)
}
