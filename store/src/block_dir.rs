// Segmented block directory
// Ordered data segments, a single index file, and an optional managed chain

use crate::block_file::BlockFile;
use crate::error::StoreError;
use plid_core::{
    decode_from_slice, encode_to_vec, Block, BlockId, Chain, ChainReader, CodecError, Decode,
    Encode, Hash, Reader, Writer,
};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// "PLID", identifies a block index file.
pub const INDEX_MAGIC: u32 = 0x504C_4944;
pub const INDEX_VERSION: u16 = 1;
const INDEX_HEADER_SIZE: u64 = 16;
const INDEX_FILE_NAME: &str = "blocks.index";

/// Default capacity of one data segment.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Offset and payload size of one record inside a data file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockOffsetSize {
    pub offset: u64,
    pub size: u64,
}

impl Encode for BlockOffsetSize {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(self.offset)?;
        w.write_u64(self.size)
    }
}

impl Decode for BlockOffsetSize {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(BlockOffsetSize {
            offset: r.read_u64()?,
            size: r.read_u64()?,
        })
    }
}

/// Where a block lives: which file, and where inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLocation {
    pub file_id: u32,
    pub offset: u64,
    pub size: u64,
}

/// The contiguous block-id range stored in one data file. Entry `i` holds
/// block `start_block_id + i`, so per-block ids are never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileBlockRange {
    pub start_block_id: BlockId,
    pub entries: Vec<BlockOffsetSize>,
}

impl FileBlockRange {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.entries.len() as u64).map(move |i| self.start_block_id + i)
    }
}

impl Encode for FileBlockRange {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(self.start_block_id)?;
        self.entries.encode(w)
    }
}

impl Decode for FileBlockRange {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(FileBlockRange {
            start_block_id: r.read_u64()?,
            entries: Vec::<BlockOffsetSize>::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct IndexHeader {
    magic: u32,
    version: u16,
    reserved: u16,
    header_size: u64,
}

impl Default for IndexHeader {
    fn default() -> Self {
        IndexHeader {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            reserved: 0,
            header_size: INDEX_HEADER_SIZE,
        }
    }
}

impl Encode for IndexHeader {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u32(self.magic)?;
        w.write_u16(self.version)?;
        w.write_u16(self.reserved)?;
        w.write_u64(self.header_size)
    }
}

impl Decode for IndexHeader {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(IndexHeader {
            magic: r.read_u32()?,
            version: r.read_u16()?,
            reserved: r.read_u16()?,
            header_size: r.read_u64()?,
        })
    }
}

#[derive(Debug)]
struct FileInfo {
    /// Open handle; data files referenced by the index open lazily.
    file: Option<BlockFile>,
    range: FileBlockRange,
}

#[derive(Clone, Debug)]
pub struct BlockStoreConfig {
    pub dir: PathBuf,
    pub max_file_size: u64,
}

impl BlockStoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        BlockStoreConfig {
            dir: dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }
}

/// Ordered set of data segments plus the index that locates every block.
/// Block ids across the store are contiguous; only the newest file accepts
/// writes, and full files roll over to a new segment.
///
/// A store opened with `manages_chain` also keeps the in-memory [`Chain`],
/// rehydrated from storage on open and trimmed when segments move out.
#[derive(Debug)]
pub struct BlockStore {
    dir: PathBuf,
    max_file_size: u64,
    current_file_id: u32,
    files: HashMap<u32, FileInfo>,
    /// Oldest first
    file_order: Vec<u32>,
    block_index: HashMap<BlockId, BlockLocation>,
    index_path: PathBuf,
    chain: Option<Chain>,
}

impl BlockStore {
    pub fn open(config: BlockStoreConfig, manages_chain: bool) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.dir)?;
        let index_path = config.dir.join(INDEX_FILE_NAME);

        let mut store = BlockStore {
            dir: config.dir,
            max_file_size: config.max_file_size,
            current_file_id: 0,
            files: HashMap::new(),
            file_order: Vec::new(),
            block_index: HashMap::new(),
            index_path,
            chain: None,
        };

        if store.index_path.exists() {
            store.load_index()?;
            store.verify_data_files()?;
            info!(
                files = store.file_order.len(),
                blocks = store.block_index.len(),
                dir = %store.dir.display(),
                "loaded block index"
            );
        } else {
            debug!(dir = %store.dir.display(), "no index file, starting fresh");
        }

        store.report_unreferenced_files();

        if manages_chain {
            store.populate_chain()?;
        }

        Ok(store)
    }

    // ---- block access ----

    pub fn has_block(&self, block_id: BlockId) -> bool {
        self.block_index.contains_key(&block_id)
    }

    pub fn location(&self, block_id: BlockId) -> Option<BlockLocation> {
        self.block_index.get(&block_id).copied()
    }

    /// Append an encoded block under a fresh id. Ids must stay contiguous.
    pub fn write_block(&mut self, block_id: BlockId, bytes: &[u8]) -> Result<(), StoreError> {
        if self.has_block(block_id) {
            return Err(StoreError::DuplicateBlock(block_id));
        }
        if let Some(max) = self.block_index.keys().max() {
            let expected = max + 1;
            if block_id != expected {
                return Err(StoreError::NonContiguousBlock {
                    expected,
                    got: block_id,
                });
            }
        }

        let size = bytes.len() as u64;
        let file_id = self.active_file_id(size)?;
        self.open_file(file_id)?;

        let info = self
            .files
            .get_mut(&file_id)
            .ok_or(StoreError::MissingFile(file_id))?;
        let Some(file) = info.file.as_mut() else {
            return Err(StoreError::MissingFile(file_id));
        };

        let offset = file.append(bytes)?;
        if info.range.entries.is_empty() {
            info.range.start_block_id = block_id;
        }
        info.range.entries.push(BlockOffsetSize { offset, size });
        self.block_index.insert(
            block_id,
            BlockLocation {
                file_id,
                offset,
                size,
            },
        );

        debug!(block_id, file_id, offset, size, "wrote block");
        self.save_index()
    }

    pub fn read_block(&mut self, block_id: BlockId) -> Result<Vec<u8>, StoreError> {
        let location = self
            .location(block_id)
            .ok_or(StoreError::BlockNotFound(block_id))?;
        self.open_file(location.file_id)?;
        let info = self
            .files
            .get_mut(&location.file_id)
            .ok_or(StoreError::MissingFile(location.file_id))?;
        let Some(file) = info.file.as_mut() else {
            return Err(StoreError::MissingFile(location.file_id));
        };
        file.read_at(location.offset, location.size)
    }

    /// Id the next written block must carry.
    pub fn next_block_id(&self) -> BlockId {
        if let Some(chain) = &self.chain {
            return chain.next_index();
        }
        self.block_index.keys().max().map(|m| m + 1).unwrap_or(0)
    }

    /// Lowest block id still present, if any.
    pub fn base_block_id(&self) -> Option<BlockId> {
        self.file_order
            .first()
            .and_then(|id| self.files.get(id))
            .map(|info| info.range.start_block_id)
    }

    pub fn block_count(&self) -> usize {
        self.block_index.len()
    }

    // ---- file management ----

    pub fn file_count(&self) -> usize {
        self.file_order.len()
    }

    pub fn file_order(&self) -> &[u32] {
        &self.file_order
    }

    /// `start_block_id` of every file, oldest first.
    pub fn range_starts(&self) -> Vec<BlockId> {
        self.file_order
            .iter()
            .filter_map(|id| self.files.get(id))
            .map(|info| info.range.start_block_id)
            .collect()
    }

    /// Drop the oldest file from the store. The handle is closed; the data
    /// file itself stays on disk. Returns the file id and the block range
    /// it owned.
    pub fn pop_front_file(&mut self) -> Result<(u32, FileBlockRange), StoreError> {
        let front_id = *self.file_order.first().ok_or(StoreError::NoFiles)?;
        let range = self
            .files
            .get(&front_id)
            .ok_or_else(|| StoreError::CorruptIndex(format!("front file {front_id} not mapped")))?
            .range
            .clone();
        self.remove_front_entries(front_id, &range);
        self.save_index()?;
        info!(file_id = front_id, blocks = range.len(), "popped front file");
        Ok((front_id, range))
    }

    /// Move the oldest file into `target`: copy its bookkeeping over, drop
    /// it locally, then rename the data file on disk. A rename failure rolls
    /// back the in-memory changes on both stores. When this store manages
    /// the chain, exactly the moved block count is trimmed from its head.
    pub fn move_front_file_to(&mut self, target: &mut BlockStore) -> Result<usize, StoreError> {
        let front_id = *self.file_order.first().ok_or(StoreError::NoFiles)?;
        if target.files.contains_key(&front_id) {
            return Err(StoreError::FileExists(front_id));
        }
        let range = self
            .files
            .get(&front_id)
            .ok_or_else(|| StoreError::CorruptIndex(format!("front file {front_id} not mapped")))?
            .range
            .clone();
        let moved = range.len();

        // (a) copy bookkeeping into the target
        target.files.insert(
            front_id,
            FileInfo {
                file: None,
                range: range.clone(),
            },
        );
        target.file_order.push(front_id);
        for (i, entry) in range.entries.iter().enumerate() {
            target.block_index.insert(
                range.start_block_id + i as u64,
                BlockLocation {
                    file_id: front_id,
                    offset: entry.offset,
                    size: entry.size,
                },
            );
        }

        let source_path = self.data_file_path(front_id);
        let target_path = target.data_file_path(front_id);

        // (b) drop local bookkeeping; closes the open handle
        self.remove_front_entries(front_id, &range);

        // (c) rename on disk
        if let Err(err) = fs::rename(&source_path, &target_path) {
            target.file_order.retain(|id| *id != front_id);
            target.files.remove(&front_id);
            for id in range.block_ids() {
                target.block_index.remove(&id);
            }
            self.restore_front_entries(front_id, range);
            return Err(err.into());
        }

        self.save_index()?;
        target.save_index()?;

        if let Some(chain) = self.chain.as_mut() {
            let trimmed = chain.trim_front(moved);
            debug!(trimmed, "trimmed chain head after moving front file");
        }

        info!(
            file_id = front_id,
            blocks = moved,
            target = %target.dir.display(),
            "moved front file"
        );
        Ok(moved)
    }

    /// Bytes used by all data files on disk.
    pub fn total_storage_size(&self) -> u64 {
        let mut total = 0;
        for (file_id, info) in &self.files {
            if let Some(file) = &info.file {
                total += file.current_size();
            } else if let Ok(meta) = fs::metadata(self.data_file_path(*file_id)) {
                total += meta.len();
            }
        }
        total
    }

    /// Modification time of the oldest data file.
    pub fn front_file_modified(&self) -> Option<SystemTime> {
        let front_id = self.file_order.first()?;
        fs::metadata(self.data_file_path(*front_id))
            .ok()?
            .modified()
            .ok()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    // ---- managed chain ----

    pub fn manages_chain(&self) -> bool {
        self.chain.is_some()
    }

    pub fn chain(&self) -> Option<&Chain> {
        self.chain.as_ref()
    }

    /// Persist a block and append it to the managed chain. The block's
    /// index must be the chain's next index.
    pub fn append_block(&mut self, block: &Block) -> Result<(), StoreError> {
        let chain = self.chain.as_ref().ok_or(StoreError::NoChain)?;
        let expected = chain.next_index();
        if block.index != expected {
            return Err(StoreError::ChainIndexMismatch {
                expected,
                got: block.index,
            });
        }

        let bytes = encode_to_vec(block)?;
        self.write_block(block.index, &bytes)?;
        if let Some(chain) = self.chain.as_mut() {
            chain.append(block.clone());
        }
        Ok(())
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.chain.as_ref().and_then(|c| c.latest())
    }

    pub fn block(&self, index: BlockId) -> Option<&Block> {
        self.chain.as_ref().and_then(|c| c.get(index))
    }

    pub fn chain_size(&self) -> u64 {
        self.chain.as_ref().map(|c| c.size()).unwrap_or(0)
    }

    pub fn last_hash(&self) -> Hash {
        self.chain.as_ref().map(|c| c.last_hash()).unwrap_or(Hash::ZERO)
    }

    pub fn is_chain_valid(&self) -> bool {
        self.chain.as_ref().map(|c| c.validate()).unwrap_or(false)
    }

    // ---- internals ----

    fn data_file_path(&self, file_id: u32) -> PathBuf {
        self.dir.join(format!("block_{file_id:06}.dat"))
    }

    fn active_file_id(&mut self, size: u64) -> Result<u32, StoreError> {
        if let Some(last_id) = self.file_order.last().copied() {
            self.open_file(last_id)?;
            let fits = self
                .files
                .get(&last_id)
                .and_then(|info| info.file.as_ref())
                .map(|file| file.can_fit(size))
                .unwrap_or(false);
            if fits {
                return Ok(last_id);
            }
        }
        self.create_file()
    }

    fn create_file(&mut self) -> Result<u32, StoreError> {
        let file_id = self.current_file_id + 1;
        let path = self.data_file_path(file_id);
        let file = BlockFile::open(&path, self.max_file_size)?;
        info!(file_id, path = %path.display(), "created block file");

        self.current_file_id = file_id;
        self.files.insert(
            file_id,
            FileInfo {
                file: Some(file),
                range: FileBlockRange::default(),
            },
        );
        self.file_order.push(file_id);
        Ok(file_id)
    }

    fn open_file(&mut self, file_id: u32) -> Result<(), StoreError> {
        let info = self
            .files
            .get_mut(&file_id)
            .ok_or(StoreError::MissingFile(file_id))?;
        if info.file.is_some() {
            return Ok(());
        }
        let path = self.dir.join(format!("block_{file_id:06}.dat"));
        if !path.exists() {
            return Err(StoreError::MissingFile(file_id));
        }
        info.file = Some(BlockFile::open(&path, self.max_file_size)?);
        debug!(file_id, "opened block file");
        Ok(())
    }

    fn remove_front_entries(&mut self, file_id: u32, range: &FileBlockRange) {
        self.file_order.retain(|id| *id != file_id);
        self.files.remove(&file_id);
        for id in range.block_ids() {
            self.block_index.remove(&id);
        }
    }

    fn restore_front_entries(&mut self, file_id: u32, range: FileBlockRange) {
        for (i, entry) in range.entries.iter().enumerate() {
            self.block_index.insert(
                range.start_block_id + i as u64,
                BlockLocation {
                    file_id,
                    offset: entry.offset,
                    size: entry.size,
                },
            );
        }
        self.files.insert(
            file_id,
            FileInfo {
                file: None,
                range,
            },
        );
        self.file_order.insert(0, file_id);
    }

    fn verify_data_files(&self) -> Result<(), StoreError> {
        for file_id in &self.file_order {
            if !self.data_file_path(*file_id).exists() {
                return Err(StoreError::MissingFile(*file_id));
            }
        }
        Ok(())
    }

    fn report_unreferenced_files(&self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("block_") || !name.ends_with(".dat") {
                continue;
            }
            let id: Option<u32> = name
                .trim_start_matches("block_")
                .trim_end_matches(".dat")
                .parse()
                .ok();
            match id {
                Some(id) if self.files.contains_key(&id) => {}
                _ => warn!(file = name, "ignoring data file not referenced by index"),
            }
        }
    }

    fn populate_chain(&mut self) -> Result<(), StoreError> {
        let base = self.base_block_id().unwrap_or(0);
        let mut chain = Chain::with_base(base);

        for file_id in self.file_order.clone() {
            let range = self
                .files
                .get(&file_id)
                .ok_or_else(|| StoreError::CorruptIndex(format!("file {file_id} not mapped")))?
                .range
                .clone();
            for (i, entry) in range.entries.iter().enumerate() {
                let block_id = range.start_block_id + i as u64;
                self.open_file(file_id)?;
                let info = self
                    .files
                    .get_mut(&file_id)
                    .ok_or(StoreError::MissingFile(file_id))?;
                let Some(file) = info.file.as_mut() else {
                    return Err(StoreError::MissingFile(file_id));
                };
                let bytes = file.read_at(entry.offset, entry.size)?;
                let block: Block = decode_from_slice(&bytes)?;
                if block.index != block_id {
                    return Err(StoreError::BlockIndexMismatch {
                        id: block_id,
                        decoded: block.index,
                    });
                }
                chain.append(block);
            }
        }

        if chain.held() > 0 {
            info!(blocks = chain.held(), base, "rehydrated chain from storage");
        }
        self.chain = Some(chain);
        Ok(())
    }

    fn save_index(&self) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf);
        IndexHeader::default().encode(&mut w)?;
        for file_id in &self.file_order {
            let info = self
                .files
                .get(file_id)
                .ok_or_else(|| StoreError::CorruptIndex(format!("file {file_id} not mapped")))?;
            w.write_u32(*file_id)?;
            info.range.encode(&mut w)?;
        }

        // Write-then-rename so a torn write can never clobber the old index
        // and any committed prefix re-reads safely.
        let tmp_path = self.index_path.with_extension("index.tmp");
        fs::write(&tmp_path, &buf)?;
        fs::rename(&tmp_path, &self.index_path)?;
        Ok(())
    }

    fn load_index(&mut self) -> Result<(), StoreError> {
        let bytes = fs::read(&self.index_path)?;
        let mut cursor = Cursor::new(bytes.as_slice());

        let header = {
            let mut r = Reader::new(&mut cursor);
            IndexHeader::decode(&mut r)
                .map_err(|e| StoreError::CorruptIndex(format!("bad header: {e}")))?
        };
        if header.magic != INDEX_MAGIC {
            return Err(StoreError::CorruptIndex(format!(
                "bad magic 0x{:08X}",
                header.magic
            )));
        }
        if header.version > INDEX_VERSION {
            return Err(StoreError::CorruptIndex(format!(
                "unsupported version {} (current: {})",
                header.version, INDEX_VERSION
            )));
        }

        self.files.clear();
        self.file_order.clear();
        self.block_index.clear();

        loop {
            if cursor.position() as usize >= bytes.len() {
                break;
            }
            let mut r = Reader::new(&mut cursor);
            let entry = r.read_u32().and_then(|file_id| {
                FileBlockRange::decode(&mut r).map(|range| (file_id, range))
            });
            let (file_id, range) = match entry {
                Ok(entry) => entry,
                Err(CodecError::ShortRead(_)) => {
                    // Truncated tail; the committed prefix is still valid.
                    warn!("index file ends mid-entry, keeping the readable prefix");
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            for (i, location) in range.entries.iter().enumerate() {
                self.block_index.insert(
                    range.start_block_id + i as u64,
                    BlockLocation {
                        file_id,
                        offset: location.offset,
                        size: location.size,
                    },
                );
            }
            if file_id > self.current_file_id {
                self.current_file_id = file_id;
            }
            self.files.insert(file_id, FileInfo { file: None, range });
            self.file_order.push(file_id);
        }

        // Oldest segment first, by the block range it holds.
        self.file_order.sort_by_key(|id| {
            self.files
                .get(id)
                .map(|info| info.range.start_block_id)
                .unwrap_or(u64::MAX)
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_at(dir: &Path, max_file_size: u64) -> BlockStore {
        BlockStore::open(
            BlockStoreConfig::new(dir).with_max_file_size(max_file_size),
            false,
        )
        .unwrap()
    }

    fn payload(id: u64, len: usize) -> Vec<u8> {
        let mut bytes = vec![(id % 251) as u8; len];
        bytes[0] = (id >> 8) as u8;
        bytes
    }

    #[test]
    fn write_and_read_single_file() {
        let dir = tempdir().unwrap();
        let mut store = store_at(dir.path(), 4096);

        for id in 0..5 {
            store.write_block(id, &payload(id, 32)).unwrap();
        }
        assert_eq!(store.file_count(), 1);
        assert_eq!(store.next_block_id(), 5);
        for id in 0..5 {
            assert_eq!(store.read_block(id).unwrap(), payload(id, 32));
        }
        assert!(!store.has_block(5));
        assert!(matches!(
            store.read_block(9).unwrap_err(),
            StoreError::BlockNotFound(9)
        ));
    }

    #[test]
    fn rejects_duplicate_block() {
        let dir = tempdir().unwrap();
        let mut store = store_at(dir.path(), 4096);
        store.write_block(0, b"one").unwrap();
        assert!(matches!(
            store.write_block(0, b"again").unwrap_err(),
            StoreError::DuplicateBlock(0)
        ));
    }

    #[test]
    fn rejects_gap_in_block_ids() {
        let dir = tempdir().unwrap();
        let mut store = store_at(dir.path(), 4096);
        store.write_block(0, b"one").unwrap();
        assert!(matches!(
            store.write_block(5, b"gap").unwrap_err(),
            StoreError::NonContiguousBlock {
                expected: 1,
                got: 5
            }
        ));
    }

    #[test]
    fn rolls_over_at_capacity() {
        let dir = tempdir().unwrap();
        // ~100-byte records against a 256-byte capacity: two records per file
        let mut store = store_at(dir.path(), 256);
        for id in 0..10 {
            store.write_block(id, &payload(id, 100)).unwrap();
        }
        assert!(store.file_count() >= 4);
        assert_eq!(store.file_order().len(), store.file_count());
        for id in 0..10 {
            assert_eq!(store.read_block(id).unwrap(), payload(id, 100));
        }
    }

    #[test]
    fn reopen_restores_all_blocks_and_continues_writing() {
        let dir = tempdir().unwrap();
        {
            let mut store = store_at(dir.path(), 256);
            for id in 0..10 {
                store.write_block(id, &payload(id, 100)).unwrap();
            }
        }

        let mut reopened = store_at(dir.path(), 256);
        assert_eq!(reopened.block_count(), 10);
        for id in 0..10 {
            assert_eq!(reopened.read_block(id).unwrap(), payload(id, 100));
        }

        // Writes continue with the next contiguous id and the same file ids.
        reopened.write_block(10, &payload(10, 100)).unwrap();
        assert_eq!(reopened.next_block_id(), 11);
    }

    #[test]
    fn index_round_trip_is_byte_identical() {
        let dir = tempdir().unwrap();
        {
            let mut store = store_at(dir.path(), 256);
            for id in 0..10 {
                store.write_block(id, &payload(id, 100)).unwrap();
            }
        }
        let written = fs::read(dir.path().join(INDEX_FILE_NAME)).unwrap();

        // Reload and save again without changing anything.
        let store = store_at(dir.path(), 256);
        store.save_index().unwrap();
        let resaved = fs::read(dir.path().join(INDEX_FILE_NAME)).unwrap();
        assert_eq!(written, resaved);
    }

    #[test]
    fn missing_data_file_fails_open() {
        let dir = tempdir().unwrap();
        {
            let mut store = store_at(dir.path(), 4096);
            store.write_block(0, b"data").unwrap();
        }
        fs::remove_file(dir.path().join("block_000001.dat")).unwrap();
        let err = BlockStore::open(
            BlockStoreConfig::new(dir.path()).with_max_file_size(4096),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::MissingFile(1)));
    }

    #[test]
    fn unreferenced_data_file_is_ignored() {
        let dir = tempdir().unwrap();
        {
            let mut store = store_at(dir.path(), 4096);
            store.write_block(0, b"data").unwrap();
        }
        fs::write(dir.path().join("block_000099.dat"), b"stray").unwrap();

        let mut store = store_at(dir.path(), 4096);
        assert_eq!(store.file_count(), 1);
        assert_eq!(store.read_block(0).unwrap(), b"data");
    }

    #[test]
    fn pop_front_file_removes_its_blocks() {
        let dir = tempdir().unwrap();
        let mut store = store_at(dir.path(), 256);
        for id in 0..6 {
            store.write_block(id, &payload(id, 100)).unwrap();
        }
        let files_before = store.file_count();

        let (file_id, range) = store.pop_front_file().unwrap();
        assert_eq!(file_id, 1);
        assert_eq!(range.start_block_id, 0);
        assert_eq!(store.file_count(), files_before - 1);
        for id in range.block_ids() {
            assert!(!store.has_block(id));
        }
        assert!(store.has_block(range.start_block_id + range.len() as u64));
    }

    #[test]
    fn move_front_file_preserves_block_union() {
        let source_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();

        let mut source = store_at(source_dir.path(), 256);
        let mut target = store_at(target_dir.path(), 256);
        for id in 0..10 {
            source.write_block(id, &payload(id, 100)).unwrap();
        }

        let moved = source.move_front_file_to(&mut target).unwrap();
        assert!(moved > 0);

        // Every block is readable from exactly one of the two stores and
        // the bytes survive the move.
        for id in 0..10u64 {
            let in_source = source.has_block(id);
            let in_target = target.has_block(id);
            assert!(in_source ^ in_target, "block {id} must live in one store");
            let bytes = if in_source {
                source.read_block(id).unwrap()
            } else {
                target.read_block(id).unwrap()
            };
            assert_eq!(bytes, payload(id, 100));
        }
    }

    #[test]
    fn move_front_file_rejects_existing_target_file() {
        let source_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();

        let mut source = store_at(source_dir.path(), 256);
        let mut target = store_at(target_dir.path(), 256);
        for id in 0..4 {
            source.write_block(id, &payload(id, 100)).unwrap();
        }
        target.write_block(0, &payload(0, 100)).unwrap();

        let err = source.move_front_file_to(&mut target).unwrap_err();
        assert!(matches!(err, StoreError::FileExists(1)));
        // Source is untouched.
        for id in 0..4 {
            assert!(source.has_block(id));
        }
    }

    #[test]
    fn corrupt_magic_fails_open() {
        let dir = tempdir().unwrap();
        {
            let mut store = store_at(dir.path(), 4096);
            store.write_block(0, b"data").unwrap();
        }
        let index_path = dir.path().join(INDEX_FILE_NAME);
        let mut bytes = fs::read(&index_path).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&index_path, bytes).unwrap();

        let err = BlockStore::open(
            BlockStoreConfig::new(dir.path()).with_max_file_size(4096),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::CorruptIndex(_)));
    }

    #[test]
    fn managed_store_rehydrates_chain() {
        let dir = tempdir().unwrap();
        {
            let mut store = BlockStore::open(
                BlockStoreConfig::new(dir.path()).with_max_file_size(4096),
                true,
            )
            .unwrap();
            let mut prev = Hash::ZERO;
            for i in 0..4u64 {
                let block = Block::new(
                    i,
                    1_700_000_000 + i as i64,
                    prev,
                    payload(i, 40),
                    i,
                    "m1".to_string(),
                    Vec::new(),
                );
                prev = block.hash;
                store.append_block(&block).unwrap();
            }
            assert_eq!(store.chain_size(), 4);
            assert!(store.is_chain_valid());
        }

        let store = BlockStore::open(
            BlockStoreConfig::new(dir.path()).with_max_file_size(4096),
            true,
        )
        .unwrap();
        assert_eq!(store.chain_size(), 4);
        assert!(store.is_chain_valid());
        assert_eq!(store.latest_block().unwrap().index, 3);
        assert_eq!(store.block(2).unwrap().index, 2);
    }

    #[test]
    fn append_block_enforces_chain_head() {
        let dir = tempdir().unwrap();
        let mut store = BlockStore::open(
            BlockStoreConfig::new(dir.path()).with_max_file_size(4096),
            true,
        )
        .unwrap();
        let block = Block::new(
            7,
            1_700_000_000,
            Hash::ZERO,
            b"wrong index".to_vec(),
            0,
            "m1".to_string(),
            Vec::new(),
        );
        let err = store.append_block(&block).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ChainIndexMismatch {
                expected: 0,
                got: 7
            }
        ));
    }
}
