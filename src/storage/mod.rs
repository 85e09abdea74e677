//! Node location index used to resolve way geometries.
//!
//! Two backends: a hash map for small extracts and a sorted, memory-mapped
//! temporary file for country-sized inputs. Coordinates are stored as fixed
//! precision integers (deg * 10^7), which is the precision OSM uses anyway.

use anyhow::{Context, Result, anyhow};
use memmap2::Mmap;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use tempfile::NamedTempFile;

// 16 bytes per entry: 8 bytes node id (i64), 4 bytes lon (i32), 4 bytes lat (i32)
const ENTRY_SIZE: usize = 16;
const SCALE_FACTOR: f64 = 10_000_000.0;

pub struct LocationIndexWriter {
    inner: WriterImpl,
}

pub struct LocationIndex {
    inner: ReaderImpl,
}

enum WriterImpl {
    Sparse(SparseWriter),
    Memory(HashMap<i64, (i32, i32)>),
}

enum ReaderImpl {
    Sparse(SparseReader),
    Memory(HashMap<i64, (i32, i32)>),
}

struct SparseWriter {
    writer: BufWriter<NamedTempFile>,
    count: u64,
    last_id: Option<i64>,
}

struct SparseReader {
    mmap: Mmap,
    count: u64,
    /// Keeps the backing file alive; deleted on drop.
    _temp_file: NamedTempFile,
}

fn to_fixed(value: f64) -> i32 {
    (value * SCALE_FACTOR).round() as i32
}

fn from_fixed(value: i32) -> f64 {
    value as f64 / SCALE_FACTOR
}

impl LocationIndexWriter {
    /// Sorted on-disk index. Node ids must arrive in ascending order.
    pub fn new_sparse() -> Result<Self> {
        let temp_file = NamedTempFile::new()
            .context("LocationIndex: Failed to create temporary location file")?;
        Ok(Self {
            inner: WriterImpl::Sparse(SparseWriter {
                writer: BufWriter::new(temp_file),
                count: 0,
                last_id: None,
            }),
        })
    }

    pub fn new_memory() -> Self {
        Self {
            inner: WriterImpl::Memory(HashMap::new()),
        }
    }

    /// Whether this backend needs ids in ascending order.
    pub fn requires_sorted_input(&self) -> bool {
        matches!(self.inner, WriterImpl::Sparse(_))
    }

    pub fn put(&mut self, id: i64, lat: f64, lon: f64) -> Result<()> {
        match &mut self.inner {
            WriterImpl::Sparse(store) => store.put(id, lat, lon),
            WriterImpl::Memory(nodes) => {
                nodes.insert(id, (to_fixed(lon), to_fixed(lat)));
                Ok(())
            }
        }
    }

    pub fn finalize(self) -> Result<LocationIndex> {
        match self.inner {
            WriterImpl::Sparse(store) => store.finalize(),
            WriterImpl::Memory(nodes) => Ok(LocationIndex {
                inner: ReaderImpl::Memory(nodes),
            }),
        }
    }
}

impl SparseWriter {
    fn put(&mut self, id: i64, lat: f64, lon: f64) -> Result<()> {
        if let Some(last_id) = self.last_id
            && id <= last_id
        {
            return Err(anyhow!(
                "LocationIndex: Node {id} arrived after node {last_id}; run `osmium sort` on the input or use --node-cache-mode memory"
            ));
        }
        self.last_id = Some(id);
        self.count += 1;
        self.writer.write_all(&id.to_le_bytes())?;
        self.writer.write_all(&to_fixed(lon).to_le_bytes())?;
        self.writer.write_all(&to_fixed(lat).to_le_bytes())?;
        Ok(())
    }

    fn finalize(mut self) -> Result<LocationIndex> {
        self.writer
            .flush()
            .context("LocationIndex: Failed to flush location file")?;
        let temp_file = self
            .writer
            .into_inner()
            .context("LocationIndex: Failed to finalize location file")?;

        let file_len = temp_file
            .as_file()
            .metadata()
            .context("LocationIndex: Failed to stat location file")?
            .len();
        if file_len != self.count * ENTRY_SIZE as u64 {
            return Err(anyhow!(
                "LocationIndex: Location file has {} bytes, expected {} entries",
                file_len,
                self.count
            ));
        }

        // SAFETY: the temp file is owned by the reader and nobody else writes to it.
        let mmap = unsafe {
            Mmap::map(temp_file.as_file()).context("LocationIndex: Failed to map location file")?
        };

        Ok(LocationIndex {
            inner: ReaderImpl::Sparse(SparseReader {
                mmap,
                count: self.count,
                _temp_file: temp_file,
            }),
        })
    }
}

impl LocationIndex {
    /// Location of a node as `(lon, lat)`.
    pub fn get(&self, id: i64) -> Option<(f64, f64)> {
        match &self.inner {
            ReaderImpl::Sparse(store) => store.get(id),
            ReaderImpl::Memory(nodes) => nodes
                .get(&id)
                .map(|&(lon, lat)| (from_fixed(lon), from_fixed(lat))),
        }
    }

    /// In-memory index from `(id, lon, lat)` triples.
    #[cfg(test)]
    pub fn from_pairs(pairs: &[(i64, f64, f64)]) -> Self {
        let mut writer = LocationIndexWriter::new_memory();
        for &(id, lon, lat) in pairs {
            writer.put(id, lat, lon).unwrap();
        }
        writer.finalize().unwrap()
    }
}

impl SparseReader {
    fn entry(&self, index: u64) -> (i64, i32, i32) {
        let offset = index as usize * ENTRY_SIZE;
        let data = &self.mmap[offset..offset + ENTRY_SIZE];
        let mut id = [0u8; 8];
        let mut lon = [0u8; 4];
        let mut lat = [0u8; 4];
        id.copy_from_slice(&data[0..8]);
        lon.copy_from_slice(&data[8..12]);
        lat.copy_from_slice(&data[12..16]);
        (
            i64::from_le_bytes(id),
            i32::from_le_bytes(lon),
            i32::from_le_bytes(lat),
        )
    }

    fn get(&self, id: i64) -> Option<(f64, f64)> {
        let mut low = 0u64;
        let mut high = self.count;

        while low < high {
            let mid = low + (high - low) / 2;
            let (mid_id, lon, lat) = self.entry(mid);
            match mid_id.cmp(&id) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some((from_fixed(lon), from_fixed(lat))),
            }
        }

        None
    }
}
