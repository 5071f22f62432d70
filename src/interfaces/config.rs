use crate::domain::rail::RailCatalog;
use crate::error::Result;
use std::path::Path;

/// Parses a rail catalog from its JSON representation: an ordered array of
/// rail entries. Array order is the selection tie-break order.
pub fn parse_catalog(json: &str) -> Result<RailCatalog> {
    Ok(serde_json::from_str(json)?)
}

/// Loads a rail catalog from a JSON file.
pub fn load_catalog(path: &Path) -> Result<RailCatalog> {
    let contents = std::fs::read_to_string(path)?;
    parse_catalog(&contents)
}
