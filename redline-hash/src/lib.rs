//! Hashing primitives shared across redline.
//!
//! - [`sha256_hex`]: lowercase hex SHA-256 of a byte slice.
//! - [`canonical_bytes`]: key-sorted compact JSON, the only serialization that is ever hashed.
//! - [`ContentAddresser`]: snapshot identity of a document's bytes.

use camino::Utf8Path;
use redline_types::document::DocumentSnapshot;
use redline_types::layout::LayoutDocument;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `H("")`, the `prev_hash` of the first ledger entry.
pub fn genesis_hash() -> String {
    sha256_hex(b"")
}

/// Hash of several byte strings fed back to back, i.e. `H(a || b || ...)`.
pub fn sha256_concat_hex<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Canonical JSON encoding: object keys sorted, no insignificant whitespace.
///
/// Going through `serde_json::Value` sorts keys because the workspace does not
/// enable serde_json's `preserve_order` feature.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

/// Lowercase 64-char hex check.
pub fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Computes snapshot identities. Stateless: callers re-read and re-hash on every use.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentAddresser;

impl ContentAddresser {
    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        sha256_hex(bytes)
    }

    /// Snapshot of in-memory bytes. `page_count` is filled when the bytes are a layout document.
    pub fn snapshot_bytes(&self, path: &Utf8Path, bytes: &[u8]) -> DocumentSnapshot {
        DocumentSnapshot {
            path: path.to_path_buf(),
            content_hash: sha256_hex(bytes),
            size: bytes.len() as u64,
            page_count: LayoutDocument::from_slice(bytes)
                .ok()
                .map(|doc| doc.page_count()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::collections::BTreeMap;

    #[test]
    fn genesis_is_hash_of_empty_string() {
        assert_eq!(
            genesis_hash(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn concat_equals_hash_of_joined_bytes() {
        assert_eq!(
            sha256_concat_hex([b"ab".as_slice(), b"cd".as_slice()]),
            sha256_hex(b"abcd")
        );
    }

    #[test]
    fn canonical_bytes_sort_keys() {
        #[derive(Serialize)]
        struct Unsorted {
            zeta: u8,
            alpha: u8,
        }
        let bytes = canonical_bytes(&Unsorted { zeta: 1, alpha: 2 }).unwrap();
        assert_eq!(bytes, br#"{"alpha":2,"zeta":1}"#);

        let mut map = BTreeMap::new();
        map.insert("b", 1);
        map.insert("a", 2);
        assert_eq!(canonical_bytes(&map).unwrap(), br#"{"a":2,"b":1}"#);
    }

    #[test]
    fn hex64_check() {
        assert!(is_hex64(&genesis_hash()));
        assert!(!is_hex64("ABC"));
        assert!(!is_hex64(&"G".repeat(64)));
    }

    #[test]
    fn snapshot_reports_size_and_pages() {
        let doc = r#"{"schema":"redline.layout.v1","pages":[{"width":1.0,"height":1.0,"runs":[]}]}"#;

        let snap = ContentAddresser.snapshot_bytes(Utf8Path::new("doc.json"), doc.as_bytes());
        assert_eq!(snap.path, Utf8PathBuf::from("doc.json"));
        assert_eq!(snap.size, doc.len() as u64);
        assert_eq!(snap.page_count, Some(1));
        assert_eq!(snap.content_hash, sha256_hex(doc.as_bytes()));
    }

    #[test]
    fn snapshot_of_opaque_bytes_has_no_page_count() {
        let snap = ContentAddresser.snapshot_bytes(Utf8Path::new("x.bin"), b"\x00\x01");
        assert_eq!(snap.page_count, None);
    }
}
