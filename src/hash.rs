// Hash computation utilities

use crate::config::value_as_str;
use crate::constants::IMPOSSIBLE_HASHES;
use anyhow::Result;
use md5::Md5;
use serde_yaml::{Mapping, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// Hex digests of one artifact. Any of them may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hashes {
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub sha512: Option<String>,
}

impl Hashes {
    /// Placeholder for an artifact that does not exist locally
    pub fn impossible() -> Self {
        let [md5, sha1, sha256, sha512] = IMPOSSIBLE_HASHES.map(|h| Some(h.to_string()));
        Self {
            md5,
            sha1,
            sha256,
            sha512,
        }
    }

    /// Persisted hashes are only trusted when the md5 is recorded
    pub fn is_known(&self) -> bool {
        self.md5.as_deref().is_some_and(|h| !h.is_empty())
    }

    pub fn from_value(value: Option<&Value>) -> Self {
        let field = |key: &str| value.and_then(|v| v.get(key)).and_then(value_as_str);
        Self {
            md5: field("md5"),
            sha1: field("sha1"),
            sha256: field("sha256"),
            sha512: field("sha512"),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        for (key, hash) in [
            ("md5", &self.md5),
            ("sha1", &self.sha1),
            ("sha256", &self.sha256),
            ("sha512", &self.sha512),
        ] {
            let value = hash.clone().map_or(Value::Null, Value::String);
            map.insert(Value::from(key), value);
        }
        Value::Mapping(map)
    }
}

/// Compute all four digests in a single pass over `reader`
pub fn hash_reader<R: Read>(mut reader: R) -> Result<Hashes> {
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut sha512 = Sha512::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        let chunk = &buffer[..read];
        md5.update(chunk);
        sha1.update(chunk);
        sha256.update(chunk);
        sha512.update(chunk);
    }

    Ok(Hashes {
        md5: Some(hex::encode(md5.finalize())),
        sha1: Some(hex::encode(sha1.finalize())),
        sha256: Some(hex::encode(sha256.finalize())),
        sha512: Some(hex::encode(sha512.finalize())),
    })
}

pub fn compute_hashes(path: &Path) -> Result<Hashes> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open {} for hashing: {}", path.display(), e))?;
    hash_reader(file)
}
