use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Prefix marking fingerprints built from sampled windows
pub const SAMPLED_PREFIX: &str = "sampled:";

const READ_BUFFER: usize = 1024 * 1024;

/// Fingerprint tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashOptions {
    /// Bytes per sampled window
    pub sample_window: u64,
    /// Files strictly larger than this are sampled
    pub sampled_threshold: u64,
    /// Evenly spaced windows between head and tail
    pub sample_segments: usize,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            sample_window: 1024 * 1024,
            sampled_threshold: 100 * 1024 * 1024,
            sample_segments: 8,
        }
    }
}

/// Content fingerprint of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub digest: String,
    pub sampled: bool,
    pub bytes_read: u64,
}

/// Compute full SHA-256 hash of a file
pub fn full_hash(path: &Path) -> io::Result<(String, u64)> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    let mut hasher = Sha256::new();

    let mut buffer = vec![0u8; READ_BUFFER];
    let mut total = 0u64;
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Offsets of every sampled window: head, evenly spaced middles, tail.
pub fn sample_offsets(len: u64, window: u64, segments: usize) -> Vec<u64> {
    let window = window.min(len);
    let last = len - window;
    let mut offsets = Vec::with_capacity(segments + 2);
    offsets.push(0);
    for i in 1..=segments as u64 {
        offsets.push(last * i / (segments as u64 + 1));
    }
    offsets.push(last);
    offsets
}

/// SHA-256 over the file length and fixed windows of its content.
///
/// Two files that differ only outside the sampled windows collide; callers
/// only use this above a size threshold where that risk is accepted.
pub fn sampled_hash(path: &Path, len: u64, window: u64, segments: usize) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let window = window.min(len);
    let mut hasher = Sha256::new();
    hasher.update(len.to_le_bytes());

    let mut buffer = vec![0u8; window as usize];
    let mut total = 0u64;
    for offset in sample_offsets(len, window, segments) {
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        hasher.update(&buffer);
        total += window;
    }

    Ok((
        format!("{}{:x}", SAMPLED_PREFIX, hasher.finalize()),
        total,
    ))
}

/// Full hash for small files, sampled hash above the threshold
pub fn fingerprint(path: &Path, size: u64, options: &HashOptions) -> io::Result<Fingerprint> {
    if size > options.sampled_threshold {
        let (digest, bytes_read) =
            sampled_hash(path, size, options.sample_window, options.sample_segments)?;
        Ok(Fingerprint {
            digest,
            sampled: true,
            bytes_read,
        })
    } else {
        let (digest, bytes_read) = full_hash(path)?;
        Ok(Fingerprint {
            digest,
            sampled: false,
            bytes_read,
        })
    }
}
