//! On-disk cache buckets
//!
//! One directory per bucket under the storage root, one file per entry named
//! by the xxh3 hash of its URL. Each file is a fixed header followed by the
//! zstd-compressed JSON record. Writes land in a temp file first and are
//! renamed into place, so a reader never sees half an entry.

use super::{CacheStorage, CachedResponse, StorageError, validate_bucket_name};
use async_trait::async_trait;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;
use zstd::stream::{Decoder, Encoder};

/// Compression level for Zstd (1-22)
const COMPRESSION_LEVEL: i32 = 3;

/// Magic bytes to identify cache entry files
const MAGIC_BYTES: &[u8; 8] = b"VCHN_CE\0";

/// Version of the entry format
const FORMAT_VERSION: u32 = 1;

const ENTRY_EXTENSION: &str = "entry";
const TEMP_EXTENSION: &str = "tmp";

/// Upper bound on the buffer reserved from a header's size field
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Configuration for disk-backed cache storage
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Directory holding one subdirectory per bucket
    pub root: PathBuf,
    /// Compression level (1-22)
    pub compression_level: i32,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("vechnost").join("cache"),
            compression_level: COMPRESSION_LEVEL,
        }
    }
}

impl DiskCacheConfig {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

/// File header for cache entries
#[derive(Debug)]
struct EntryHeader {
    magic: [u8; 8],
    version: u32,
    uncompressed_size: u64,
    compressed_size: u64,
    checksum: u64,
}

impl EntryHeader {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.checksum.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;

        let mut buf4 = [0u8; 4];
        let mut buf8 = [0u8; 8];

        reader.read_exact(&mut buf4)?;
        let version = u32::from_le_bytes(buf4);

        reader.read_exact(&mut buf8)?;
        let uncompressed_size = u64::from_le_bytes(buf8);

        reader.read_exact(&mut buf8)?;
        let compressed_size = u64::from_le_bytes(buf8);

        reader.read_exact(&mut buf8)?;
        let checksum = u64::from_le_bytes(buf8);

        Ok(Self {
            magic,
            version,
            uncompressed_size,
            compressed_size,
            checksum,
        })
    }
}

/// Serialize, compress and frame one entry
fn encode_entry(entry: &CachedResponse, level: i32) -> Result<Vec<u8>, StorageError> {
    let serialized =
        serde_json::to_vec(entry).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut encoder = Encoder::new(Vec::new(), level)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .write_all(&serialized)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| StorageError::Compression(e.to_string()))?;

    let header = EntryHeader {
        magic: *MAGIC_BYTES,
        version: FORMAT_VERSION,
        uncompressed_size: serialized.len() as u64,
        compressed_size: compressed.len() as u64,
        checksum: xxh3_64(&serialized),
    };

    let mut out = Vec::with_capacity(compressed.len() + 36);
    header.write_to(&mut out)?;
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Validate the frame and restore the entry
fn decode_entry(bytes: &[u8]) -> Result<CachedResponse, StorageError> {
    let mut reader = bytes;
    let header = EntryHeader::read_from(&mut reader)
        .map_err(|_| StorageError::InvalidEntry("Truncated header".to_string()))?;

    if &header.magic != MAGIC_BYTES {
        return Err(StorageError::InvalidEntry("Invalid magic bytes".to_string()));
    }

    if header.version != FORMAT_VERSION {
        return Err(StorageError::VersionMismatch {
            expected: FORMAT_VERSION,
            got: header.version,
        });
    }

    if reader.len() as u64 != header.compressed_size {
        return Err(StorageError::InvalidEntry(format!(
            "Size mismatch: expected {} compressed bytes, found {}",
            header.compressed_size,
            reader.len()
        )));
    }

    let decoder =
        Decoder::new(reader).map_err(|e| StorageError::Compression(e.to_string()))?;
    let mut decompressed = Vec::with_capacity(header.uncompressed_size.min(MAX_PREALLOC) as usize);
    decoder
        .take(header.uncompressed_size.saturating_add(1))
        .read_to_end(&mut decompressed)
        .map_err(|e| StorageError::Compression(e.to_string()))?;

    if decompressed.len() as u64 != header.uncompressed_size {
        return Err(StorageError::InvalidEntry(format!(
            "Size mismatch: expected {} bytes, decompressed {}",
            header.uncompressed_size,
            decompressed.len()
        )));
    }

    let checksum = xxh3_64(&decompressed);
    if checksum != header.checksum {
        return Err(StorageError::InvalidEntry(format!(
            "Checksum mismatch: expected {:016x}, got {:016x}",
            header.checksum, checksum
        )));
    }

    serde_json::from_slice(&decompressed).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Cache storage persisted under a directory
pub struct DiskCacheStorage {
    config: DiskCacheConfig,
    temp_counter: AtomicU64,
}

impl DiskCacheStorage {
    /// Open storage rooted at `config.root`, creating it if needed
    pub fn new(config: DiskCacheConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.root)?;

        info!("Cache storage initialized at: {}", config.root.display());

        Ok(Self {
            config,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::new(DiskCacheConfig::default())
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_bucket_name(bucket)?;
        Ok(self.config.root.join(bucket))
    }

    fn entry_path(dir: &Path, url: &str) -> PathBuf {
        dir.join(format!("{:016x}.{}", xxh3_64(url.as_bytes()), ENTRY_EXTENSION))
    }

    /// Write `entry` to a temp file beside its final path. Every call gets
    /// its own temp file, so writers of the same URL never share one.
    async fn stage(&self, dir: &Path, entry: &CachedResponse) -> Result<(PathBuf, PathBuf), StorageError> {
        let path = Self::entry_path(dir, &entry.url);
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp_path =
            path.with_extension(format!("{}-{}.{}", std::process::id(), n, TEMP_EXTENSION));

        let bytes = encode_entry(entry, self.config.compression_level)?;
        fs::write(&temp_path, &bytes).await?;
        Ok((temp_path, path))
    }

    async fn read_entry(path: &Path) -> Result<Option<CachedResponse>, StorageError> {
        match fs::read(path).await {
            Ok(bytes) => decode_entry(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        fs::create_dir_all(self.bucket_dir(bucket)?).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.config.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_bucket_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("Deleted bucket {}", bucket);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: &str, entry: CachedResponse) -> Result<(), StorageError> {
        let dir = self.bucket_dir(bucket)?;
        fs::create_dir_all(&dir).await?;

        let (temp_path, path) = self.stage(&dir, &entry).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn put_all(&self, bucket: &str, entries: Vec<CachedResponse>) -> Result<(), StorageError> {
        let dir = self.bucket_dir(bucket)?;
        fs::create_dir_all(&dir).await?;

        // Stage everything before anything becomes visible
        let mut staged = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.stage(&dir, entry).await {
                Ok(paths) => staged.push(paths),
                Err(e) => {
                    for (temp_path, _) in &staged {
                        let _ = fs::remove_file(temp_path).await;
                    }
                    return Err(e);
                }
            }
        }

        for (i, (temp_path, path)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(temp_path, path).await {
                warn!("Rolling back {} entries in {}: {}", i, bucket, e);
                // Entries already moved into place go too
                for (_, committed) in &staged[..i] {
                    let _ = fs::remove_file(committed).await;
                }
                for (pending, _) in &staged[i..] {
                    let _ = fs::remove_file(pending).await;
                }
                return Err(e.into());
            }
        }

        debug!("Stored {} entries in {}", entries.len(), bucket);
        Ok(())
    }

    async fn match_in(&self, bucket: &str, url: &str) -> Result<Option<CachedResponse>, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        let entry = Self::read_entry(&Self::entry_path(&dir, url)).await?;

        // A hash collision stores a different URL under the same name
        Ok(entry.filter(|e| e.url == url))
    }

    async fn urls(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        let mut listing = match fs::read_dir(&dir).await {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut urls = Vec::new();
        while let Some(file) = listing.next_entry().await? {
            let path = file.path();
            if path.extension().map(|e| e == ENTRY_EXTENSION).unwrap_or(false) {
                match Self::read_entry(&path).await {
                    Ok(Some(entry)) => urls.push(entry.url),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping unreadable entry {}: {}", path.display(), e),
                }
            }
        }

        urls.sort();
        Ok(urls)
    }
}
