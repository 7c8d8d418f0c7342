use crate::layout::StrideLayout;
use crate::shape::{Order, Shape};

// Iterators — Single-pass cursors over a StrideLayout
//
// All three iterators first resolve the requested order (`Natural` becomes
// the layout's dense order, or C) and compact the layout in that order with
// `compute_fortran_layout`. Axis 0 of the compacted layout is then the
// fastest-varying one and consecutive axes are never contiguous with each
// other, so:
//
//   - a dense layout compacts to rank 1, and the pointer walk is just
//     `offset + k * stride` with no multi-index bookkeeping;
//   - a general strided layout walks an odometer over the (few) remaining
//     axes, adding one stride per step and rewinding on carry.
//
// PointerIterator yields every physical pointer once. ChunkIterator yields
// whole runs along the innermost compacted axis, so kernels can process
// `len` elements with one loop and lane-sized blocks.

/// Odometer over a compacted (fastest-axis-first) layout.
#[derive(Debug, Clone)]
struct Odometer {
    dims: Vec<usize>,
    strides: Vec<usize>,
    index: Vec<usize>,
    ptr: usize,
}

impl Odometer {
    fn new(dims: &[usize], strides: &[usize], start: usize) -> Self {
        Odometer {
            dims: dims.to_vec(),
            strides: strides.to_vec(),
            index: vec![0; dims.len()],
            ptr: start,
        }
    }

    /// Step to the next index; the caller guards against stepping past the end.
    #[inline]
    fn advance(&mut self) {
        for i in 0..self.dims.len() {
            self.index[i] += 1;
            if self.index[i] < self.dims[i] {
                self.ptr += self.strides[i];
                return;
            }
            self.ptr -= (self.dims[i] - 1) * self.strides[i];
            self.index[i] = 0;
        }
    }
}

#[derive(Debug, Clone)]
enum Walk {
    /// `offset + k * step`
    Linear { offset: usize, step: usize },
    Strided(Odometer),
}

/// Yields the storage pointer of every element, in a logical order.
#[derive(Debug, Clone)]
pub struct PointerIterator {
    walk: Walk,
    pos: usize,
    size: usize,
}

impl PointerIterator {
    pub fn new(layout: &StrideLayout, order: Order) -> Self {
        let compact = layout.compute_fortran_layout(order, true);
        let walk = match compact.rank() {
            0 => Walk::Linear {
                offset: compact.offset(),
                step: 1,
            },
            1 => Walk::Linear {
                offset: compact.offset(),
                step: compact.strides()[0],
            },
            _ => Walk::Strided(Odometer::new(
                compact.dims(),
                compact.strides(),
                compact.offset(),
            )),
        };
        PointerIterator {
            walk,
            pos: 0,
            size: layout.size(),
        }
    }

    pub fn has_next(&self) -> bool {
        self.pos < self.size
    }

    /// Next pointer; only call while `has_next()` holds.
    #[inline]
    pub fn next_ptr(&mut self) -> usize {
        let ptr = match &mut self.walk {
            Walk::Linear { offset, step } => *offset + self.pos * *step,
            Walk::Strided(odo) => {
                let ptr = odo.ptr;
                if self.pos + 1 < self.size {
                    odo.advance();
                }
                ptr
            }
        };
        self.pos += 1;
        ptr
    }

    /// Logical position of the next pointer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether the walk avoids multi-index bookkeeping.
    pub fn is_linear(&self) -> bool {
        matches!(self.walk, Walk::Linear { .. })
    }

    /// `(offset, step)` of a linear walk.
    pub fn linear(&self) -> Option<(usize, usize)> {
        match self.walk {
            Walk::Linear { offset, step } => Some((offset, step)),
            Walk::Strided(_) => None,
        }
    }
}

impl Iterator for PointerIterator {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.has_next() {
            Some(self.next_ptr())
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.size - self.pos;
        (n, Some(n))
    }
}

impl ExactSizeIterator for PointerIterator {}

/// A run of `len` elements starting at `start`, `step` pointers apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub len: usize,
    pub step: usize,
}

impl Chunk {
    /// Storage pointers of this run.
    pub fn pointers(&self) -> impl Iterator<Item = usize> {
        let Chunk { start, len, step } = *self;
        (0..len).map(move |i| start + i * step)
    }
}

/// Yields maximal runs along the innermost axis of a logical order.
#[derive(Debug, Clone)]
pub struct ChunkIterator {
    outer: Odometer,
    chunk_len: usize,
    chunk_step: usize,
    pos: usize,
    count: usize,
}

impl ChunkIterator {
    pub fn new(layout: &StrideLayout, order: Order) -> Self {
        let compact = layout.compute_fortran_layout(order, true);
        if compact.rank() == 0 {
            return ChunkIterator {
                outer: Odometer::new(&[], &[], compact.offset()),
                chunk_len: 1,
                chunk_step: 1,
                pos: 0,
                count: 1,
            };
        }
        let chunk_len = compact.dims()[0];
        let chunk_step = compact.strides()[0];
        ChunkIterator {
            outer: Odometer::new(&compact.dims()[1..], &compact.strides()[1..], compact.offset()),
            chunk_len,
            chunk_step,
            pos: 0,
            count: layout.size() / chunk_len,
        }
    }

    /// Elements per chunk.
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Pointer distance between consecutive elements of a chunk.
    pub fn chunk_step(&self) -> usize {
        self.chunk_step
    }

    /// Total number of chunks.
    pub fn chunk_count(&self) -> usize {
        self.count
    }

    pub fn has_next(&self) -> bool {
        self.pos < self.count
    }

    /// Next chunk; only call while `has_next()` holds.
    pub fn next_chunk(&mut self) -> Chunk {
        let chunk = Chunk {
            start: self.outer.ptr,
            len: self.chunk_len,
            step: self.chunk_step,
        };
        self.pos += 1;
        if self.pos < self.count {
            self.outer.advance();
        }
        chunk
    }
}

impl Iterator for ChunkIterator {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.has_next() {
            Some(self.next_chunk())
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.count - self.pos;
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChunkIterator {}

/// Yields multi-indices of a shape in C or F order (`Natural` means C).
#[derive(Debug, Clone)]
pub struct IndexIterator {
    dims: Vec<usize>,
    axes: Vec<usize>,
    index: Vec<usize>,
    pos: usize,
    size: usize,
}

impl IndexIterator {
    pub fn new(shape: &Shape, order: Order) -> Self {
        let rank = shape.rank();
        // fastest axis first
        let axes = match order.auto_fc() {
            Order::F => (0..rank).collect(),
            _ => (0..rank).rev().collect(),
        };
        IndexIterator {
            dims: shape.dims().to_vec(),
            axes,
            index: vec![0; rank],
            pos: 0,
            size: shape.size(),
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.pos >= self.size {
            return None;
        }
        let out = self.index.clone();
        self.pos += 1;
        for &axis in &self.axes {
            self.index[axis] += 1;
            if self.index[axis] < self.dims[axis] {
                break;
            }
            self.index[axis] = 0;
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.size - self.pos;
        (n, Some(n))
    }
}

impl ExactSizeIterator for IndexIterator {}
