//! Byte offsets of the chunks of one container file.

use iopack_types::{ChunkId, ContentHash};
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::snapshot::ReleaseSnapshot;

/// A chunk waiting for an offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRequest {
    pub id: ChunkId,
    pub hash: ContentHash,
    /// Stored size in bytes.
    pub size: u64,
    pub memory_mapped: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacedChunk {
    pub id: ChunkId,
    pub offset: u64,
    pub size: u64,
    /// Alignment bytes skipped in front of the chunk.
    pub padding: u64,
    /// The chunk kept its offset from the previous release.
    pub reused: bool,
}

#[derive(Debug, Default)]
pub struct Placement {
    /// One entry per request, in request order.
    pub chunks: Vec<PlacedChunk>,
    pub total_size: u64,
    pub conflicts: Vec<LayoutError>,
}

impl Placement {
    pub fn reused_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.reused).count()
    }
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    offset: u64,
    size: u64,
    used: bool,
    next: Option<usize>,
    prev_free: Option<usize>,
    next_free: Option<usize>,
}

impl Segment {
    fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Used and free byte ranges in offset order. Free ranges are additionally
/// threaded through a doubly linked free list, also in offset order.
#[derive(Default)]
struct SegmentList {
    segments: Vec<Segment>,
    head: Option<usize>,
    tail: Option<usize>,
    free_head: Option<usize>,
    free_tail: Option<usize>,
}

impl SegmentList {
    fn end(&self) -> u64 {
        self.tail.map_or(0, |t| self.segments[t].end())
    }

    fn push_back(&mut self, offset: u64, size: u64, used: bool) -> usize {
        let index = self.segments.len();
        self.segments.push(Segment {
            offset,
            size,
            used,
            next: None,
            prev_free: None,
            next_free: None,
        });
        match self.tail {
            Some(tail) => self.segments[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        if !used {
            self.link_free_after(self.free_tail, index);
        }
        index
    }

    /// Insert a segment after `at` in offset order. Free-list membership is
    /// left to the caller.
    fn insert_after(&mut self, at: usize, offset: u64, size: u64, used: bool) -> usize {
        let index = self.segments.len();
        let next = self.segments[at].next;
        self.segments.push(Segment {
            offset,
            size,
            used,
            next,
            prev_free: None,
            next_free: None,
        });
        self.segments[at].next = Some(index);
        if next.is_none() {
            self.tail = Some(index);
        }
        index
    }

    fn link_free_after(&mut self, after: Option<usize>, index: usize) {
        let next = match after {
            Some(a) => self.segments[a].next_free,
            None => self.free_head,
        };
        self.segments[index].prev_free = after;
        self.segments[index].next_free = next;
        match after {
            Some(a) => self.segments[a].next_free = Some(index),
            None => self.free_head = Some(index),
        }
        match next {
            Some(n) => self.segments[n].prev_free = Some(index),
            None => self.free_tail = Some(index),
        }
    }

    fn unlink_free(&mut self, index: usize) {
        let Segment {
            prev_free,
            next_free,
            ..
        } = self.segments[index];
        match prev_free {
            Some(p) => self.segments[p].next_free = next_free,
            None => self.free_head = next_free,
        }
        match next_free {
            Some(n) => self.segments[n].prev_free = prev_free,
            None => self.free_tail = prev_free,
        }
        self.segments[index].prev_free = None;
        self.segments[index].next_free = None;
    }

    /// Free segments in offset order.
    fn free_segments(&self) -> Vec<usize> {
        let mut free = Vec::new();
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            free.push(index);
            cursor = self.segments[index].next_free;
        }
        free
    }

    /// Occupy `[offset, offset + size)` inside free segment `index`,
    /// splitting off the free space before and after.
    fn occupy(&mut self, index: usize, offset: u64, size: u64) {
        debug_assert!(!self.segments[index].used);
        let Segment {
            offset: start,
            size: free_size,
            ..
        } = self.segments[index];
        let end = start + free_size;
        let (used, before) = if offset > start {
            self.segments[index].size = offset - start;
            (self.insert_after(index, offset, size, true), Some(index))
        } else {
            let before = self.segments[index].prev_free;
            self.unlink_free(index);
            let segment = &mut self.segments[index];
            segment.size = size;
            segment.used = true;
            (index, before)
        };
        if offset + size < end {
            let rest = self.insert_after(used, offset + size, end - offset - size, false);
            self.link_free_after(before, rest);
        }
    }
}

/// Assigns offsets to chunks, reusing a previous release's layout where the
/// content is unchanged.
pub struct ChunkPlacer {
    config: LayoutConfig,
}

impl ChunkPlacer {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    /// First offset at or after `start` where a chunk of `size` bytes obeys
    /// the alignment rules.
    pub fn aligned_start(&self, start: u64, size: u64, memory_mapped: bool) -> u64 {
        let block = self.config.compression_block_size.max(1);
        let mut offset = start;
        loop {
            let mut next = offset;
            if memory_mapped {
                next = align_up(next, self.config.memory_mapping_alignment.max(1));
            }
            if size > block {
                next = align_up(next, block);
            } else if size > 0 && next / block != (next + size - 1) / block {
                next = align_up(next, block);
            }
            if next == offset {
                return offset;
            }
            offset = next;
        }
    }

    pub fn is_aligned(&self, offset: u64, size: u64, memory_mapped: bool) -> bool {
        self.aligned_start(offset, size, memory_mapped) == offset
    }

    /// Place `requests`. Reused chunks keep their previous offsets; every
    /// other chunk goes, in request order, into the first free gap that fits
    /// or at the end of the file.
    pub fn place(&self, requests: &[ChunkRequest], previous: Option<&ReleaseSnapshot>) -> Placement {
        let mut placed: Vec<Option<PlacedChunk>> = vec![None; requests.len()];
        let mut segments = SegmentList::default();
        let mut conflicts = Vec::new();

        if let Some(previous) = previous.filter(|_| self.config.reuse_previous_offsets) {
            let old = previous.chunk_map();
            let mut candidates: Vec<(u64, usize)> = requests
                .iter()
                .enumerate()
                .filter_map(|(i, request)| {
                    let old = old.get(&request.id)?;
                    let unchanged = old.hash == request.hash && old.size == request.size;
                    (unchanged && self.is_aligned(old.offset, request.size, request.memory_mapped))
                        .then_some((old.offset, i))
                })
                .collect();
            candidates.sort_by_key(|&(offset, i)| (offset, requests[i].id));

            for (offset, i) in candidates {
                let request = &requests[i];
                let end = segments.end();
                if offset < end {
                    warn!(
                        chunk = %request.id,
                        offset,
                        "layout conflict, placing chunk as new"
                    );
                    conflicts.push(LayoutError::LayoutConflict {
                        chunk: request.id,
                        offset,
                    });
                    continue;
                }
                if offset > end {
                    segments.push_back(end, offset - end, false);
                }
                segments.push_back(offset, request.size, true);
                placed[i] = Some(PlacedChunk {
                    id: request.id,
                    offset,
                    size: request.size,
                    padding: 0,
                    reused: true,
                });
            }
        }

        for (i, request) in requests.iter().enumerate() {
            if placed[i].is_some() {
                continue;
            }
            let gap = segments.free_segments().into_iter().find_map(|index| {
                let segment = segments.segments[index];
                let offset = self.aligned_start(segment.offset, request.size, request.memory_mapped);
                (offset + request.size <= segment.end()).then_some((index, segment.offset, offset))
            });
            let (start, offset) = match gap {
                Some((index, start, offset)) => {
                    segments.occupy(index, offset, request.size);
                    (start, offset)
                }
                None => {
                    let start = segments.end();
                    let offset = self.aligned_start(start, request.size, request.memory_mapped);
                    if offset > start {
                        segments.push_back(start, offset - start, false);
                    }
                    segments.push_back(offset, request.size, true);
                    (start, offset)
                }
            };
            placed[i] = Some(PlacedChunk {
                id: request.id,
                offset,
                size: request.size,
                padding: offset - start,
                reused: false,
            });
        }

        let chunks: Vec<PlacedChunk> = placed.into_iter().flatten().collect();
        let placement = Placement {
            total_size: segments.end(),
            chunks,
            conflicts,
        };
        debug!(
            chunks = placement.chunks.len(),
            reused = placement.reused_count(),
            conflicts = placement.conflicts.len(),
            total_size = placement.total_size,
            "placed chunks"
        );
        placement
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotChunk;
    use iopack_types::{ChunkType, PackageId};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn config() -> LayoutConfig {
        LayoutConfig {
            compression_block_size: 64,
            memory_mapping_alignment: 32,
            reuse_previous_offsets: true,
        }
    }

    fn request(index: u16, size: u64, content: &str) -> ChunkRequest {
        ChunkRequest {
            id: ChunkId::new(PackageId::from_name("/Game/P"), index, ChunkType::ExportBundleData),
            hash: ContentHash::of(content.as_bytes()),
            size,
            memory_mapped: false,
        }
    }

    fn snapshot_of(placement: &Placement, requests: &[ChunkRequest]) -> ReleaseSnapshot {
        let mut snapshot = ReleaseSnapshot::new("test", Uuid::now_v7());
        for (chunk, request) in placement.chunks.iter().zip(requests) {
            snapshot.chunks.push(SnapshotChunk {
                id: chunk.id,
                hash: request.hash,
                offset: chunk.offset,
                size: chunk.size,
            });
        }
        snapshot
    }

    fn assert_valid(placer: &ChunkPlacer, placement: &Placement, requests: &[ChunkRequest]) {
        let mut ranges: Vec<(u64, u64)> =
            placement.chunks.iter().map(|c| (c.offset, c.offset + c.size)).collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlap: {pair:?}");
        }
        for (chunk, request) in placement.chunks.iter().zip(requests) {
            assert!(placer.is_aligned(chunk.offset, chunk.size, request.memory_mapped));
            assert!(chunk.offset + chunk.size <= placement.total_size);
        }
    }

    #[test]
    fn small_chunks_never_straddle_blocks() {
        let placer = ChunkPlacer::new(config());
        assert_eq!(placer.aligned_start(0, 64, false), 0);
        assert_eq!(placer.aligned_start(10, 54, false), 10);
        assert_eq!(placer.aligned_start(10, 60, false), 64);
        assert_eq!(placer.aligned_start(65, 200, false), 128);
        assert_eq!(placer.aligned_start(1, 8, true), 32);
        assert_eq!(placer.aligned_start(7, 0, false), 7);
    }

    #[test]
    fn sequential_layout_with_padding() {
        let placer = ChunkPlacer::new(config());
        let requests = [request(0, 40, "a"), request(1, 40, "b"), request(2, 10, "c")];
        let placement = placer.place(&requests, None);
        let offsets: Vec<u64> = placement.chunks.iter().map(|c| c.offset).collect();
        // b does not fit behind a in the first block; c fills the gap
        assert_eq!(offsets, vec![0, 64, 40]);
        assert_eq!(placement.chunks[1].padding, 24);
        assert_eq!(placement.total_size, 104);
        assert_valid(&placer, &placement, &requests);
    }

    #[test]
    fn placement_is_idempotent() {
        let placer = ChunkPlacer::new(config());
        let requests: Vec<_> = (0..20).map(|i| request(i, (i as u64 * 37) % 150 + 1, "x")).collect();
        let first = placer.place(&requests, None);
        let second = placer.place(&requests, None);
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(first.total_size, second.total_size);
    }

    #[test]
    fn unchanged_chunks_keep_offsets() {
        let placer = ChunkPlacer::new(config());
        let before = [request(0, 30, "a"), request(1, 30, "b"), request(2, 30, "c")];
        let first = placer.place(&before, None);
        let snapshot = snapshot_of(&first, &before);

        let after = [request(0, 30, "a"), request(1, 50, "b2"), request(2, 30, "c")];
        let second = placer.place(&after, Some(&snapshot));
        assert_eq!(second.chunks[0].offset, first.chunks[0].offset);
        assert_eq!(second.chunks[2].offset, first.chunks[2].offset);
        assert!(second.chunks[0].reused && second.chunks[2].reused);
        assert!(!second.chunks[1].reused);
        assert_eq!(second.reused_count(), 2);
        assert_valid(&placer, &second, &after);
    }

    #[test]
    fn reuse_can_be_disabled() {
        let placer = ChunkPlacer::new(LayoutConfig {
            reuse_previous_offsets: false,
            ..config()
        });
        let requests = [request(0, 10, "a"), request(1, 10, "b")];
        let mut snapshot = snapshot_of(&placer.place(&requests, None), &requests);
        snapshot.chunks[0].offset = 640;
        let placement = placer.place(&requests, Some(&snapshot));
        assert_eq!(placement.chunks[0].offset, 0);
        assert_eq!(placement.reused_count(), 0);
    }

    #[test]
    fn overlapping_previous_offsets_are_conflicts() {
        let placer = ChunkPlacer::new(config());
        let requests = [request(0, 20, "a"), request(1, 20, "b")];
        let mut snapshot = snapshot_of(&placer.place(&requests, None), &requests);
        snapshot.chunks[0].offset = 0;
        snapshot.chunks[1].offset = 10;
        let placement = placer.place(&requests, Some(&snapshot));
        assert_eq!(placement.conflicts.len(), 1);
        assert!(matches!(
            placement.conflicts[0],
            LayoutError::LayoutConflict { offset: 10, .. }
        ));
        assert_eq!(placement.chunks[0].offset, 0);
        assert!(!placement.chunks[1].reused);
        assert_valid(&placer, &placement, &requests);
    }

    #[test]
    fn misaligned_previous_offset_is_not_reused() {
        let placer = ChunkPlacer::new(config());
        let mut requests = [request(0, 16, "m")];
        requests[0].memory_mapped = true;
        let mut snapshot = snapshot_of(&placer.place(&requests, None), &requests);
        snapshot.chunks[0].offset = 8;
        let placement = placer.place(&requests, Some(&snapshot));
        assert!(!placement.chunks[0].reused);
        assert_eq!(placement.chunks[0].offset, 0);
    }

    #[test]
    fn free_list_stays_in_offset_order() {
        let mut list = SegmentList::default();
        list.push_back(0, 100, false);
        list.push_back(100, 10, true);
        list.push_back(110, 50, false);

        list.occupy(0, 40, 20);
        let free: Vec<(u64, u64)> = list
            .free_segments()
            .into_iter()
            .map(|i| (list.segments[i].offset, list.segments[i].size))
            .collect();
        assert_eq!(free, vec![(0, 40), (60, 40), (110, 50)]);

        list.occupy(0, 0, 40);
        let first = list.free_segments()[0];
        list.occupy(first, 60, 10);
        let free: Vec<(u64, u64)> = list
            .free_segments()
            .into_iter()
            .map(|i| (list.segments[i].offset, list.segments[i].size))
            .collect();
        assert_eq!(free, vec![(70, 30), (110, 50)]);
        assert_eq!(list.end(), 160);
    }

    proptest! {
        #[test]
        fn incremental_layout_is_valid_and_stable(
            sizes in prop::collection::vec(1u64..200, 1..30),
            changed in prop::collection::vec(any::<bool>(), 30),
            mapped in prop::collection::vec(any::<bool>(), 30),
        ) {
            let placer = ChunkPlacer::new(config());
            let before: Vec<ChunkRequest> = sizes
                .iter()
                .enumerate()
                .map(|(i, &size)| ChunkRequest {
                    memory_mapped: mapped[i],
                    ..request(i as u16, size, "v1")
                })
                .collect();
            let first = placer.place(&before, None);
            assert_valid(&placer, &first, &before);

            let snapshot = snapshot_of(&first, &before);
            let after: Vec<ChunkRequest> = before
                .iter()
                .enumerate()
                .map(|(i, r)| if changed[i] {
                    ChunkRequest { hash: ContentHash::of(b"v2"), size: r.size + 3, ..*r }
                } else {
                    *r
                })
                .collect();
            let second = placer.place(&after, Some(&snapshot));
            assert_valid(&placer, &second, &after);
            prop_assert!(second.conflicts.is_empty());
            for i in 0..after.len() {
                if !changed[i] {
                    prop_assert!(second.chunks[i].reused);
                    prop_assert_eq!(second.chunks[i].offset, first.chunks[i].offset);
                }
            }
        }
    }
}
