//! Database reader
//!
//! [`Reader`] ties the pieces together: it owns the [`Buffer`], the bound
//! [`Metadata`] and the optional record cache, and answers lookups by walking
//! the search tree and decoding the value the matched network points to.
//!
//! A `Reader` is immutable after construction apart from two pieces of
//! write-once state (the IPv4 start node and the record cache), both safe for
//! concurrent use. Share one instance across threads with `Arc<Reader>`.

use crate::binding::{bind, Injectables, Record};
use crate::buffer::{Buffer, FileAccessMode};
use crate::cache::{CacheKey, DecodeCache};
use crate::config::ReaderOptions;
use crate::data_section::Decoder;
use crate::error::{MmdbError, Result};
use crate::metadata::Metadata;
use crate::tree::{SearchTree, TreeMatch};
use crate::value::DataValue;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Result of an IP lookup
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    /// The data associated with the matched network
    pub data: DataValue,
    /// Prefix length of the matched network, in the queried address family
    pub prefix_len: u8,
    /// Absolute offset of the value in the file
    pub offset: u64,
}

/// Read-only MaxMind DB reader
///
/// # Examples
///
/// ```no_run
/// use mmdb_lookup::Reader;
///
/// let reader = Reader::open("GeoLite2-City.mmdb")?;
///
/// if let Some(city) = reader.find("81.2.69.160")? {
///     println!("{}", city.to_json());
/// }
/// # Ok::<(), mmdb_lookup::MmdbError>(())
/// ```
pub struct Reader {
    buffer: Buffer,
    metadata: Metadata,
    tree: SearchTree,
    ipv4_start: OnceLock<u64>,
    cache: Option<DecodeCache>,
}

impl Reader {
    /// Open a database file with default options (memory-mapped, cache on)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    /// Open a database file
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), mode = ?options.mode, "opening MaxMind DB");
        Self::from_buffer(Buffer::open(path, options.mode)?, options)
    }

    /// Create a reader over an in-memory copy of a database
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let options = ReaderOptions::default().with_mode(FileAccessMode::Memory);
        Self::from_buffer(Buffer::from_bytes(data)?, options)
    }

    /// Create a reader from any stream, seekable or not
    ///
    /// The stream is read to the end. In `Mmap` mode it is spooled to an
    /// anonymous temporary file which is then mapped.
    pub fn from_reader<R: Read>(reader: R, options: ReaderOptions) -> Result<Self> {
        Self::from_buffer(Buffer::from_reader(reader, options.mode)?, options)
    }

    /// Create a reader over an existing buffer
    pub fn from_buffer(buffer: Buffer, options: ReaderOptions) -> Result<Self> {
        let (metadata, _) = Metadata::read(&buffer)?;
        let tree = SearchTree::new(metadata.node_count, metadata.record_size_bits()?);

        tracing::debug!(
            mode = ?buffer.mode(),
            size = buffer.len(),
            node_count = metadata.node_count,
            record_size = metadata.record_size,
            ip_version = metadata.ip_version,
            database_type = %metadata.database_type,
            "opened MaxMind DB"
        );

        let cache = (options.cache_capacity > 0).then(|| DecodeCache::new(options.cache_capacity));

        Ok(Self {
            buffer,
            metadata,
            tree,
            ipv4_start: OnceLock::new(),
            cache,
        })
    }

    /// Database metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// How the file contents are held
    pub fn mode(&self) -> FileAccessMode {
        self.buffer.mode()
    }

    /// Look up an address given as text
    ///
    /// # Errors
    ///
    /// Malformed text is rejected with [`MmdbError::InvalidInput`] before the
    /// file is touched.
    pub fn find(&self, address: &str) -> Result<Option<DataValue>> {
        let ip = address.trim().parse::<IpAddr>().map_err(|_| {
            MmdbError::invalid_input(format!(
                "The specified IP address was invalid: '{}'",
                address
            ))
        })?;
        self.find_ip(ip)
    }

    /// Look up an address
    pub fn find_ip(&self, ip: IpAddr) -> Result<Option<DataValue>> {
        Ok(self.lookup(ip)?.map(|result| result.data))
    }

    /// Look up a raw address of 4 (IPv4) or 16 (IPv6) bytes
    pub fn find_bytes(&self, address: &[u8]) -> Result<Option<DataValue>> {
        let ip = if let Ok(v4) = <[u8; 4]>::try_from(address) {
            IpAddr::V4(Ipv4Addr::from(v4))
        } else if let Ok(v6) = <[u8; 16]>::try_from(address) {
            IpAddr::V6(Ipv6Addr::from(v6))
        } else {
            return Err(MmdbError::invalid_input(format!(
                "An address must be 4 or 16 bytes, got {}",
                address.len()
            )));
        };
        self.find_ip(ip)
    }

    /// Look up an address, also reporting the matched prefix length and offset
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<LookupResult>> {
        let Some(found) = self.find_record(ip)? else {
            return Ok(None);
        };
        let data = self.decode_at(found.offset)?;
        Ok(Some(LookupResult {
            data,
            prefix_len: found.depth as u8,
            offset: found.offset,
        }))
    }

    /// Look up an address and bind the value into `T`.
    ///
    /// Bound records are kept in the reader's cache, keyed by offset, the size
    /// field of the value's header and type, so repeated hits on the same
    /// network skip decoding. Building the key reads only the value's control
    /// header, never the whole record.
    pub fn find_as<T>(&self, ip: IpAddr) -> Result<Option<Arc<T>>>
    where
        T: Record + Send + Sync + 'static,
    {
        let Some(found) = self.find_record(ip)? else {
            return Ok(None);
        };
        let decoder = self.decoder();

        let Some(cache) = &self.cache else {
            let (value, _) = decoder.decode(found.offset)?;
            return bind::<T>(&value, None).map(|record| Some(Arc::new(record)));
        };

        let (_, size) = decoder.header(found.offset)?;
        let key = CacheKey::of::<T>(found.offset, size);
        if let Some(hit) = cache.get::<T>(&key) {
            return Ok(Some(hit));
        }

        let (value, _) = decoder.decode(found.offset)?;
        let record = Arc::new(bind::<T>(&value, None)?);
        cache.try_insert(key, Arc::clone(&record));
        Ok(Some(record))
    }

    /// Look up an address and bind the value into `T`, overriding fields from
    /// `injectables`. These results are never cached.
    pub fn find_as_with<T: Record>(&self, ip: IpAddr, injectables: &Injectables) -> Result<Option<T>> {
        let Some(found) = self.find_record(ip)? else {
            return Ok(None);
        };
        let value = self.decode_at(found.offset)?;
        bind(&value, Some(injectables)).map(Some)
    }

    /// Decode the data section value at an absolute file offset
    pub fn decode_at(&self, offset: u64) -> Result<DataValue> {
        self.decoder().decode(offset).map(|(value, _)| value)
    }

    fn decoder(&self) -> Decoder<'_> {
        Decoder::new(&self.buffer, self.metadata.data_section_start())
    }

    fn find_record(&self, ip: IpAddr) -> Result<Option<TreeMatch>> {
        match ip {
            IpAddr::V4(addr) => {
                let start = if self.metadata.ip_version == 6 {
                    self.ipv4_start()?
                } else {
                    0
                };
                self.tree.walk(&self.buffer, &addr.octets(), start)
            }
            IpAddr::V6(addr) => {
                if self.metadata.ip_version == 4 {
                    return Err(MmdbError::invalid_input(format!(
                        "Error looking up {}. You attempted to look up an IPv6 address in an IPv4-only database",
                        addr
                    )));
                }
                self.tree.walk(&self.buffer, &addr.octets(), 0)
            }
        }
    }

    fn ipv4_start(&self) -> Result<u64> {
        if let Some(&node) = self.ipv4_start.get() {
            return Ok(node);
        }
        let node = self.tree.ipv4_start(&self.buffer)?;
        Ok(*self.ipv4_start.get_or_init(|| node))
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("buffer", &self.buffer)
            .field("database_type", &self.metadata.database_type)
            .field("ip_version", &self.metadata.ip_version)
            .field("cache", &self.cache)
            .finish()
    }
}
