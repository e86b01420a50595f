use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::{key_value_store::Value, rdb::RdbLoader};

/// The canonical empty snapshot (redis-ver 7.2.0) a master sends right after
/// FULLRESYNC, stored as hex so the binary payload survives source control.
const EMPTY_RDB_HEX: &str = "524544495330303131fa0972656469732d76657205372e322e30fa0a7265\
6469732d62697473c040fa056374696d65c26d08bc65fa08757365642d6d656dc2b0c41000fa08616f662d\
62617365c000fff06e3bfec0ff5aa2";

/// Decodes the embedded empty snapshot into its 88 raw bytes.
pub fn empty_rdb_bytes() -> Vec<u8> {
    EMPTY_RDB_HEX
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let hex = std::str::from_utf8(pair).expect("embedded hex is ASCII");
            u8::from_str_radix(hex, 16).expect("embedded hex is valid")
        })
        .collect()
}

/// Loads the snapshot at `<directory>/<filename>` into keyspace entries.
///
/// A missing file is not an error: the server simply starts with an empty
/// keyspace. A file that exists but fails to parse is fatal to startup.
pub async fn load_rdb_file(
    directory: &str,
    filename: &str,
) -> tokio::io::Result<HashMap<String, Value>> {
    let path = Path::new(directory).join(filename);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == tokio::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no RDB snapshot found, starting empty");
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e),
    };

    let entries = RdbLoader::new(&bytes).parse()?;
    info!(
        path = %path.display(),
        keys = entries.len(),
        "loaded RDB snapshot"
    );

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::{empty_rdb_bytes, load_rdb_file};

    #[test]
    fn test_empty_rdb_bytes() {
        let bytes = empty_rdb_bytes();

        assert_eq!(bytes.len(), 88);
        assert_eq!(&bytes[..5], b"REDIS");
        // End-of-file opcode sits ahead of the 8-byte checksum.
        assert_eq!(bytes[bytes.len() - 9], 0xFF);
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_empty_store() {
        let entries = load_rdb_file("/tmp", "does-not-exist.rdb").await.unwrap();
        assert!(entries.is_empty());
    }
}
