//! SHA-256 content digests.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;

pub type Digest = [u8; 32];

/// Files are hashed in fixed chunks so large files never sit in RAM.
const CHUNK: usize = 512;

/// Digest of a local file.  `None` when it is missing or unreadable.
pub fn file_digest(path: &Path) -> Option<Digest> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!("OTA: no local digest for {}: {}", path.display(), e);
            return None;
        }
    };
    let mut hasher = hmac_sha256::Hash::new();
    let mut buf = [0u8; CHUNK];
    loop {
        match file.read(&mut buf) {
            Ok(0) => return Some(hasher.finalize()),
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("OTA: read error hashing {}: {}", path.display(), e);
                return None;
            }
        }
    }
}

pub fn digest(bytes: &[u8]) -> Digest {
    hmac_sha256::Hash::hash(bytes)
}

/// Short hex prefix for log lines.
pub fn short_hex(d: &Digest) -> String {
    hex::encode(&d[..6])
}
