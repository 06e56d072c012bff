//! Bitmap IP address management.
//!
//! Every subnet gets a string of `'0'`/`'1'` characters, one per address
//! in the subnet, persisted together as a JSON object keyed by the
//! subnet's CIDR. Position `n` stands for `network + n + 1`, so the
//! network address itself is never handed out. The last two positions
//! (the broadcast address and the one past it) are never claimed.
//!
//! The file is reloaded before every change; there is no in-memory
//! cache and no locking.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use ipnetwork::Ipv4Network;

const FREE: &str = "0";
const TAKEN: &str = "1";
const FREE_BYTE: u8 = b'0';
const TAKEN_BYTE: u8 = b'1';

/// Positions at the end of each bitmap that are never allocated.
const RESERVED_TAIL: usize = 2;

/// Shortest prefix accepted; keeps a bitmap at 16 MiB at most.
const MIN_PREFIX: u8 = 8;

/// Subnet CIDR to bitmap.
type Bitmaps = BTreeMap<String, String>;

/// Allocator backed by one JSON file.
#[derive(Debug, Clone)]
pub struct Ipam {
    path: PathBuf,
}

impl Ipam {
    /// Creates an allocator persisting to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Claims the lowest free address of `subnet`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::AddressExhausted`] if no address is free,
    /// [`BurrowError::Config`] for an unsupported subnet, or an I/O error
    /// if the store cannot be read or written.
    pub fn allocate(&self, subnet: &Ipv4Network) -> Result<Ipv4Addr> {
        let subnet = canonical(subnet)?;
        let key = subnet.to_string();
        let size = bitmap_len(&subnet);

        let mut bitmaps = self.load()?;
        let bitmap = bitmaps.entry(key.clone()).or_insert_with(|| FREE.repeat(size));
        check_len(&key, bitmap, size)?;

        let usable = size.saturating_sub(RESERVED_TAIL);
        let offset = bitmap.as_bytes()[..usable]
            .iter()
            .position(|b| *b == FREE_BYTE)
            .ok_or_else(|| BurrowError::AddressExhausted {
                subnet: key.clone(),
            })?;
        bitmap.replace_range(offset..=offset, TAKEN);
        self.dump(&bitmaps)?;

        let ip = address_at(&subnet, offset);
        tracing::debug!(subnet = %key, %ip, "address allocated");
        Ok(ip)
    }

    /// Returns `ip` to the free pool of `subnet`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] if `ip` is outside the allocatable
    /// range of `subnet`, [`BurrowError::NotFound`] if the subnet has no
    /// bitmap, or an I/O error if the store cannot be read or written.
    pub fn release(&self, subnet: &Ipv4Network, ip: Ipv4Addr) -> Result<()> {
        let subnet = canonical(subnet)?;
        let key = subnet.to_string();
        let size = bitmap_len(&subnet);
        let offset = offset_of(&subnet, ip)
            .filter(|offset| *offset < size.saturating_sub(RESERVED_TAIL))
            .ok_or_else(|| {
                BurrowError::config(format!("{ip} is not an allocatable address of {key}"))
            })?;

        let mut bitmaps = self.load()?;
        let bitmap = bitmaps.get_mut(&key).ok_or_else(|| BurrowError::NotFound {
            kind: "subnet",
            id: key.clone(),
        })?;
        check_len(&key, bitmap, size)?;
        bitmap.replace_range(offset..=offset, FREE);
        self.dump(&bitmaps)?;

        tracing::debug!(subnet = %key, %ip, "address released");
        Ok(())
    }

    /// Returns `true` if `ip` is currently claimed in `subnet`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn is_allocated(&self, subnet: &Ipv4Network, ip: Ipv4Addr) -> Result<bool> {
        let subnet = canonical(subnet)?;
        let Some(offset) = offset_of(&subnet, ip) else {
            return Ok(false);
        };
        Ok(self
            .load()?
            .get(&subnet.to_string())
            .and_then(|bitmap| bitmap.as_bytes().get(offset).copied())
            == Some(TAKEN_BYTE))
    }

    /// Returns the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Bitmaps> {
        if !self.path.exists() {
            return Ok(Bitmaps::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| BurrowError::io(&self.path, e))?;
        if raw.trim().is_empty() {
            return Ok(Bitmaps::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn dump(&self, bitmaps: &Bitmaps) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BurrowError::io(parent, e))?;
        }
        let json = serde_json::to_string(bitmaps)?;
        std::fs::write(&self.path, json).map_err(|e| BurrowError::io(&self.path, e))
    }
}

/// Normalizes `subnet` to its network address and checks the prefix.
fn canonical(subnet: &Ipv4Network) -> Result<Ipv4Network> {
    if subnet.prefix() < MIN_PREFIX {
        return Err(BurrowError::config(format!(
            "subnet {subnet} is too large, the shortest prefix is /{MIN_PREFIX}"
        )));
    }
    Ipv4Network::new(subnet.network(), subnet.prefix())
        .map_err(|e| BurrowError::config(format!("invalid subnet {subnet}: {e}")))
}

fn bitmap_len(subnet: &Ipv4Network) -> usize {
    1_usize << (32 - u32::from(subnet.prefix()))
}

fn check_len(key: &str, bitmap: &str, size: usize) -> Result<()> {
    if bitmap.len() == size {
        Ok(())
    } else {
        Err(BurrowError::config(format!(
            "bitmap of {key} has {} positions, expected {size}",
            bitmap.len()
        )))
    }
}

fn address_at(subnet: &Ipv4Network, offset: usize) -> Ipv4Addr {
    let base = u32::from(subnet.network());
    // offset < 2^24, so it fits in u32 and the sum stays inside the subnet
    #[allow(clippy::cast_possible_truncation)]
    Ipv4Addr::from(base + offset as u32 + 1)
}

fn offset_of(subnet: &Ipv4Network, ip: Ipv4Addr) -> Option<usize> {
    if !subnet.contains(ip) {
        return None;
    }
    let distance = u32::from(ip).checked_sub(u32::from(subnet.network()))?;
    distance.checked_sub(1).map(|d| d as usize)
}
