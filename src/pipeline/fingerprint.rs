use crate::error::{FilterError, Result};
use crate::store::{Query, TabularStore};

/// Order-independent blake3 digest of a table's schema and rows, as hex.
///
/// Two tables fingerprint equal iff they hold the same multiset of rows
/// under the same column names.
pub fn fingerprint(store: &dyn TabularStore, table: &str) -> Result<String> {
    let schema = store.schema(table)?;
    let mut row_hashes = store
        .select(&Query::table(table))?
        .map(|row| {
            serde_json::to_vec(&row)
                .map(|bytes| *blake3::hash(&bytes).as_bytes())
                .map_err(|e| FilterError::Data(format!("cannot encode row of '{table}': {e}")))
        })
        .collect::<Result<Vec<[u8; 32]>>>()?;
    row_hashes.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for name in schema.names() {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(&(row_hashes.len() as u64).to_le_bytes());
    for hash in &row_hashes {
        hasher.update(hash);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
