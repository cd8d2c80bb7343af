//! Lazy chunked arrays
//!
//! A [`ChunkedArray`] is a shape, a per-dimension list of chunk lengths and a
//! shared [`BlockSource`] that can produce any single block on demand. Building
//! a graph (rechunking, permuting, broadcasting, mapping a function over
//! blocks) never evaluates a block; only [`ChunkedArray::compute`] and
//! [`ChunkedArray::block`] do. Materialisation evaluates blocks in parallel on
//! the rayon pool.

use crate::errors::{Result, SkillScoreError};
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Raw-buffer function applied to one aligned block of every input
pub type BlockFn = Arc<dyn Fn(&[ArrayD<f64>]) -> Result<ArrayD<f64>> + Send + Sync>;

/// Something that can produce the block at a given block index
pub trait BlockSource: Send + Sync {
    /// Produce the block at `index` (one entry per dimension)
    ///
    /// # Errors
    ///
    /// Returns an error if an upstream block or the mapped function fails.
    fn block(&self, index: &[usize]) -> Result<ArrayD<f64>>;

    /// Short name of the source kind, used in debug output
    fn kind(&self) -> &'static str;

    /// The same values split into `chunks`, if this source can re-split
    /// itself without going through its current blocks
    fn rechunked(&self, _chunks: &[Vec<usize>]) -> Option<Arc<dyn BlockSource>> {
        None
    }
}

/// A lazily evaluated, chunk-backed n-dimensional array
#[derive(Clone)]
pub struct ChunkedArray {
    shape: Vec<usize>,
    chunks: Vec<Vec<usize>>,
    source: Arc<dyn BlockSource>,
}

impl fmt::Debug for ChunkedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedArray")
            .field("shape", &self.shape)
            .field("chunks", &self.chunks)
            .field("source", &self.source.kind())
            .finish()
    }
}

impl ChunkedArray {
    /// Wrap an in-memory array, splitting it into blocks of `chunk_shape`.
    ///
    /// `None` keeps the whole array as a single block. A chunk length larger
    /// than the dimension is clamped to the dimension length.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_shape` has the wrong rank or a zero entry.
    pub fn from_array(data: ArrayD<f64>, chunk_shape: Option<&[usize]>) -> Result<Self> {
        let shape = data.shape().to_vec();
        let chunks = normalize_chunks(&shape, chunk_shape)?;
        let offsets = chunks.iter().map(|c| chunk_offsets(c)).collect();
        Ok(Self {
            shape,
            chunks,
            source: Arc::new(InMemorySource {
                data: Arc::new(data),
                offsets,
            }),
        })
    }

    /// Shape of the full array
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Chunk lengths along every dimension
    #[must_use]
    pub fn chunks(&self) -> &[Vec<usize>] {
        &self.chunks
    }

    /// Number of blocks along every dimension
    #[must_use]
    pub fn num_blocks(&self) -> Vec<usize> {
        self.chunks.iter().map(Vec::len).collect()
    }

    /// Evaluate a single block
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range or evaluation fails.
    pub fn block(&self, index: &[usize]) -> Result<ArrayD<f64>> {
        let region = block_region(&self.chunks, index)?;
        let block = self.source.block(index)?;
        let expected: Vec<usize> = region.iter().map(|r| r.end - r.start).collect();
        if block.shape() != expected.as_slice() {
            return Err(SkillScoreError::shape_mismatch(format!(
                "block {index:?} of {} source has shape {:?}, expected {expected:?}",
                self.source.kind(),
                block.shape()
            )));
        }
        Ok(block)
    }

    /// Materialise the whole array, evaluating blocks in parallel
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any block.
    pub fn compute(&self) -> Result<ArrayD<f64>> {
        let grid = index_grid(&self.num_blocks());
        debug!(
            blocks = grid.len(),
            threads = rayon::current_num_threads(),
            "computing chunked array of shape {:?}",
            self.shape
        );

        let blocks: Vec<(Vec<usize>, ArrayD<f64>)> = grid
            .into_par_iter()
            .map(|index| self.block(&index).map(|block| (index, block)))
            .collect::<Result<_>>()?;

        let mut out = ArrayD::<f64>::zeros(IxDyn(&self.shape));
        for (index, block) in blocks {
            let region = block_region(&self.chunks, &index)?;
            out.slice_each_axis_mut(|ax| Slice::from(region[ax.axis.index()].clone()))
                .assign(&block);
        }
        Ok(out)
    }

    /// Re-split the array into new chunk lengths.
    ///
    /// Returns a clone when the chunking is already as requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the new chunks do not cover the same shape.
    pub fn rechunk(&self, chunks: Vec<Vec<usize>>) -> Result<Self> {
        if chunks.len() != self.ndim() {
            return Err(SkillScoreError::shape_mismatch(format!(
                "cannot rechunk a {}-dimensional array with {} chunk specifications",
                self.ndim(),
                chunks.len()
            )));
        }
        for (axis, (c, &len)) in chunks.iter().zip(&self.shape).enumerate() {
            if c.iter().sum::<usize>() != len || c.is_empty() {
                return Err(SkillScoreError::shape_mismatch(format!(
                    "chunks {c:?} do not cover axis {axis} of length {len}"
                )));
            }
        }
        if chunks == self.chunks {
            return Ok(self.clone());
        }

        debug!(from = ?self.chunks, to = ?chunks, "rechunking");
        if let Some(source) = self.source.rechunked(&chunks) {
            return Ok(Self {
                shape: self.shape.clone(),
                chunks,
                source,
            });
        }
        Ok(Self {
            shape: self.shape.clone(),
            chunks: chunks.clone(),
            source: Arc::new(RechunkSource {
                parent_offsets: self.chunks.iter().map(|c| chunk_offsets(c)).collect(),
                parent: self.clone(),
                chunks,
            }),
        })
    }

    /// Reorder dimensions: output axis `k` is input axis `axes[k]`
    ///
    /// # Errors
    ///
    /// Returns an error if `axes` is not a permutation of `0..ndim`.
    pub fn permute_axes(&self, axes: &[usize]) -> Result<Self> {
        check_permutation(axes, self.ndim())?;
        if axes.iter().enumerate().all(|(k, &a)| k == a) {
            return Ok(self.clone());
        }
        Ok(Self {
            shape: axes.iter().map(|&a| self.shape[a]).collect(),
            chunks: axes.iter().map(|&a| self.chunks[a].clone()).collect(),
            source: Arc::new(PermuteSource {
                parent: self.clone(),
                axes: axes.to_vec(),
            }),
        })
    }

    /// Broadcast to `shape`, inserting the axes marked `None` in `axis_map`.
    ///
    /// `axis_map[k]` names the input axis that becomes output axis `k`. Mapped
    /// input axes must appear in increasing order; inserted axes are a single
    /// chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping is inconsistent with the shapes.
    pub fn broadcast_to(&self, shape: &[usize], axis_map: &[Option<usize>]) -> Result<Self> {
        if axis_map.len() != shape.len() {
            return Err(SkillScoreError::shape_mismatch(format!(
                "axis map {axis_map:?} does not match target shape {shape:?}"
            )));
        }
        let mapped: Vec<usize> = axis_map.iter().flatten().copied().collect();
        if mapped != (0..self.ndim()).collect::<Vec<_>>() {
            return Err(SkillScoreError::shape_mismatch(format!(
                "axis map {axis_map:?} must place all {} input axes in order",
                self.ndim()
            )));
        }

        let mut chunks = Vec::with_capacity(shape.len());
        for (k, (&len, slot)) in shape.iter().zip(axis_map).enumerate() {
            match slot {
                Some(a) if self.shape[*a] == len => chunks.push(self.chunks[*a].clone()),
                Some(a) => {
                    return Err(SkillScoreError::shape_mismatch(format!(
                        "cannot broadcast axis {a} of length {} to output axis {k} of length {len}",
                        self.shape[*a]
                    )))
                }
                None => chunks.push(vec![len]),
            }
        }
        if mapped.len() == shape.len() {
            return Ok(self.clone());
        }

        Ok(Self {
            shape: shape.to_vec(),
            chunks: chunks.clone(),
            source: Arc::new(BroadcastSource {
                parent: self.clone(),
                axis_map: axis_map.to_vec(),
                chunks,
            }),
        })
    }

    /// Rechunk same-shaped arrays to the common refinement of their chunk boundaries
    ///
    /// # Errors
    ///
    /// Returns [`SkillScoreError::ShapeMismatch`] if the shapes differ.
    pub fn unify_chunks(arrays: &[&ChunkedArray]) -> Result<Vec<ChunkedArray>> {
        let Some(first) = arrays.first() else {
            return Ok(Vec::new());
        };
        if let Some(other) = arrays.iter().find(|a| a.shape != first.shape) {
            return Err(SkillScoreError::shape_mismatch(format!(
                "cannot unify chunks of shapes {:?} and {:?}",
                first.shape, other.shape
            )));
        }
        let chunks: Vec<Vec<usize>> = (0..first.ndim())
            .map(|axis| {
                arrays[1..]
                    .iter()
                    .fold(first.chunks[axis].clone(), |acc, a| refine_chunks(&acc, &a.chunks[axis]))
            })
            .collect();
        arrays.iter().map(|a| a.rechunk(chunks.clone())).collect()
    }

    /// Apply `func` block by block across several aligned inputs.
    ///
    /// Each input comes with an index map: entry `j` names the output axis
    /// that input axis `j` is aligned with, or `None` for a core axis that the
    /// function consumes whole (and which is merged into a single chunk).
    /// Aligned axes are rechunked to the common refinement of all inputs'
    /// chunk boundaries, so every output block sees exactly one block of
    /// every input.
    ///
    /// # Errors
    ///
    /// Returns an error if aligned axis lengths disagree with `shape`.
    pub fn map_blocks(
        inputs: Vec<(ChunkedArray, Vec<Option<usize>>)>,
        shape: &[usize],
        func: BlockFn,
    ) -> Result<Self> {
        let mut out_chunks: Vec<Option<Vec<usize>>> = vec![None; shape.len()];
        for (array, index_map) in &inputs {
            if index_map.len() != array.ndim() {
                return Err(SkillScoreError::shape_mismatch(format!(
                    "index map {index_map:?} does not match a {}-dimensional input",
                    array.ndim()
                )));
            }
            for (j, slot) in index_map.iter().enumerate() {
                let Some(k) = *slot else { continue };
                if k >= shape.len() || array.shape[j] != shape[k] {
                    return Err(SkillScoreError::shape_mismatch(format!(
                        "input axis {j} of length {} cannot align with output axis {k} of shape {shape:?}",
                        array.shape[j]
                    )));
                }
                out_chunks[k] = Some(match out_chunks[k].take() {
                    Some(existing) => refine_chunks(&existing, &array.chunks[j]),
                    None => array.chunks[j].clone(),
                });
            }
        }
        let chunks: Vec<Vec<usize>> = out_chunks
            .into_iter()
            .zip(shape)
            .map(|(c, &len)| c.unwrap_or_else(|| vec![len]))
            .collect();

        let mut aligned = Vec::with_capacity(inputs.len());
        for (array, index_map) in inputs {
            let target: Vec<Vec<usize>> = index_map
                .iter()
                .enumerate()
                .map(|(j, slot)| match slot {
                    Some(k) => chunks[*k].clone(),
                    None => vec![array.shape[j]],
                })
                .collect();
            aligned.push((array.rechunk(target)?, index_map));
        }
        debug!(inputs = aligned.len(), chunks = ?chunks, "mapping function over blocks");

        Ok(Self {
            shape: shape.to_vec(),
            chunks,
            source: Arc::new(MapBlocksSource {
                inputs: aligned,
                func,
            }),
        })
    }
}

/// Blocks sliced out of a shared in-memory array
struct InMemorySource {
    data: Arc<ArrayD<f64>>,
    offsets: Vec<Vec<usize>>,
}

impl BlockSource for InMemorySource {
    fn block(&self, index: &[usize]) -> Result<ArrayD<f64>> {
        let region = region_from_offsets(&self.offsets, index)?;
        Ok(self
            .data
            .slice_each_axis(|ax| Slice::from(region[ax.axis.index()].clone()))
            .to_owned())
    }

    fn kind(&self) -> &'static str {
        "in-memory"
    }

    fn rechunked(&self, chunks: &[Vec<usize>]) -> Option<Arc<dyn BlockSource>> {
        Some(Arc::new(InMemorySource {
            data: Arc::clone(&self.data),
            offsets: chunks.iter().map(|c| chunk_offsets(c)).collect(),
        }))
    }
}

/// Blocks assembled from the overlapping blocks of a differently chunked parent
struct RechunkSource {
    parent: ChunkedArray,
    parent_offsets: Vec<Vec<usize>>,
    chunks: Vec<Vec<usize>>,
}

impl BlockSource for RechunkSource {
    fn block(&self, index: &[usize]) -> Result<ArrayD<f64>> {
        let region = block_region(&self.chunks, index)?;
        let block_shape: Vec<usize> = region.iter().map(|r| r.end - r.start).collect();
        let mut out = ArrayD::<f64>::zeros(IxDyn(&block_shape));
        if block_shape.contains(&0) {
            return Ok(out);
        }

        let parent_ranges: Vec<Range<usize>> = region
            .iter()
            .zip(&self.parent_offsets)
            .map(|(r, offsets)| locate(offsets, r.start)..locate(offsets, r.end - 1) + 1)
            .collect();

        for parent_index in index_grid_ranges(&parent_ranges) {
            let parent_block = self.parent.block(&parent_index)?;
            let mut src = Vec::with_capacity(region.len());
            let mut dst = Vec::with_capacity(region.len());
            for (axis, r) in region.iter().enumerate() {
                let offsets = &self.parent_offsets[axis];
                let b = parent_index[axis];
                let lo = r.start.max(offsets[b]);
                let hi = r.end.min(offsets[b + 1]);
                src.push(lo - offsets[b]..hi - offsets[b]);
                dst.push(lo - r.start..hi - r.start);
            }
            out.slice_each_axis_mut(|ax| Slice::from(dst[ax.axis.index()].clone()))
                .assign(&parent_block.slice_each_axis(|ax| Slice::from(src[ax.axis.index()].clone())));
        }
        Ok(out)
    }

    fn kind(&self) -> &'static str {
        "rechunk"
    }
}

struct PermuteSource {
    parent: ChunkedArray,
    axes: Vec<usize>,
}

impl BlockSource for PermuteSource {
    fn block(&self, index: &[usize]) -> Result<ArrayD<f64>> {
        let mut parent_index = vec![0; index.len()];
        for (k, &a) in self.axes.iter().enumerate() {
            parent_index[a] = index[k];
        }
        let block = self.parent.block(&parent_index)?;
        Ok(block.permuted_axes(IxDyn(&self.axes)).as_standard_layout().into_owned())
    }

    fn kind(&self) -> &'static str {
        "permute"
    }
}

struct BroadcastSource {
    parent: ChunkedArray,
    axis_map: Vec<Option<usize>>,
    chunks: Vec<Vec<usize>>,
}

impl BlockSource for BroadcastSource {
    fn block(&self, index: &[usize]) -> Result<ArrayD<f64>> {
        let region = block_region(&self.chunks, index)?;
        let block_shape: Vec<usize> = region.iter().map(|r| r.end - r.start).collect();

        let parent_index: Vec<usize> = self
            .axis_map
            .iter()
            .zip(index)
            .filter_map(|(slot, &i)| slot.map(|_| i))
            .collect();
        let mut block = self.parent.block(&parent_index)?;
        for (k, slot) in self.axis_map.iter().enumerate() {
            if slot.is_none() {
                block.insert_axis_inplace(Axis(k));
            }
        }

        let view = block.broadcast(IxDyn(&block_shape)).ok_or_else(|| {
            SkillScoreError::shape_mismatch(format!(
                "cannot broadcast block of shape {:?} to {block_shape:?}",
                block.shape()
            ))
        })?;
        Ok(view.to_owned())
    }

    fn kind(&self) -> &'static str {
        "broadcast"
    }
}

struct MapBlocksSource {
    inputs: Vec<(ChunkedArray, Vec<Option<usize>>)>,
    func: BlockFn,
}

impl BlockSource for MapBlocksSource {
    fn block(&self, index: &[usize]) -> Result<ArrayD<f64>> {
        let blocks = self
            .inputs
            .iter()
            .map(|(array, index_map)| {
                let input_index: Vec<usize> =
                    index_map.iter().map(|slot| slot.map_or(0, |k| index[k])).collect();
                array.block(&input_index)
            })
            .collect::<Result<Vec<_>>>()?;
        (self.func)(&blocks)
    }

    fn kind(&self) -> &'static str {
        "map-blocks"
    }
}

/// Turn an optional chunk shape into explicit chunk lengths per dimension
pub(crate) fn normalize_chunks(
    shape: &[usize],
    chunk_shape: Option<&[usize]>,
) -> Result<Vec<Vec<usize>>> {
    let Some(chunk_shape) = chunk_shape else {
        return Ok(shape.iter().map(|&len| vec![len]).collect());
    };
    if chunk_shape.len() != shape.len() {
        return Err(SkillScoreError::InvalidParameter(format!(
            "chunk shape {chunk_shape:?} does not match array shape {shape:?}"
        )));
    }

    shape
        .iter()
        .zip(chunk_shape)
        .map(|(&len, &size)| {
            if size == 0 {
                return Err(SkillScoreError::InvalidParameter(
                    "chunk lengths must be positive".to_string(),
                ));
            }
            if len == 0 {
                return Ok(vec![0]);
            }
            let mut chunks = vec![size; len / size];
            if len % size != 0 {
                chunks.push(len % size);
            }
            Ok(chunks)
        })
        .collect()
}

/// Common refinement of two chunkings of the same axis
fn refine_chunks(a: &[usize], b: &[usize]) -> Vec<usize> {
    let bounds: BTreeSet<usize> = chunk_offsets(a).into_iter().chain(chunk_offsets(b)).collect();
    let bounds: Vec<usize> = bounds.into_iter().collect();
    if bounds.len() < 2 {
        return vec![0];
    }
    bounds.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Start offsets of every chunk plus the total length
fn chunk_offsets(chunks: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(chunks.len() + 1);
    offsets.push(0);
    let mut acc = 0;
    for &c in chunks {
        acc += c;
        offsets.push(acc);
    }
    offsets
}

/// Index of the chunk containing `position`
fn locate(offsets: &[usize], position: usize) -> usize {
    offsets.partition_point(|&o| o <= position).saturating_sub(1)
}

fn block_region(chunks: &[Vec<usize>], index: &[usize]) -> Result<Vec<Range<usize>>> {
    let offsets: Vec<Vec<usize>> = chunks.iter().map(|c| chunk_offsets(c)).collect();
    region_from_offsets(&offsets, index)
}

fn region_from_offsets(offsets: &[Vec<usize>], index: &[usize]) -> Result<Vec<Range<usize>>> {
    if index.len() != offsets.len() {
        return Err(SkillScoreError::InvalidParameter(format!(
            "block index {index:?} has the wrong rank for {} dimensions",
            offsets.len()
        )));
    }
    index
        .iter()
        .zip(offsets)
        .map(|(&i, o)| {
            if i + 1 >= o.len() {
                Err(SkillScoreError::InvalidParameter(format!(
                    "block index {index:?} is out of range"
                )))
            } else {
                Ok(o[i]..o[i + 1])
            }
        })
        .collect()
}

fn check_permutation(axes: &[usize], ndim: usize) -> Result<()> {
    let mut seen = vec![false; ndim];
    if axes.len() != ndim {
        return Err(SkillScoreError::InvalidParameter(format!(
            "{axes:?} is not a permutation of {ndim} axes"
        )));
    }
    for &a in axes {
        if a >= ndim || seen[a] {
            return Err(SkillScoreError::InvalidParameter(format!(
                "{axes:?} is not a permutation of {ndim} axes"
            )));
        }
        seen[a] = true;
    }
    Ok(())
}

/// Every block index of a grid with `counts` blocks per dimension, row-major
fn index_grid(counts: &[usize]) -> Vec<Vec<usize>> {
    let ranges: Vec<Range<usize>> = counts.iter().map(|&n| 0..n).collect();
    index_grid_ranges(&ranges)
}

fn index_grid_ranges(ranges: &[Range<usize>]) -> Vec<Vec<usize>> {
    let mut grid = vec![Vec::with_capacity(ranges.len())];
    for r in ranges {
        grid = grid
            .into_iter()
            .flat_map(|prefix| {
                r.clone().map(move |i| {
                    let mut index = prefix.clone();
                    index.push(i);
                    index
                })
            })
            .collect();
    }
    grid
}
