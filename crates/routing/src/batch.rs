//! Input chunking and frame sampling for extraction producers.
//!
//! Producers ask the planner how many sub-tasks to create before they
//! dispatch anything. Batches are computed lazily from `(total, size)`, so a
//! plan over millions of frames costs nothing until iterated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use marshal_core::config::BatchConfig;
use marshal_core::TaskKind;

use crate::catalog::QueueCatalog;
use crate::error::RoutingError;

/// What a batched kind counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchUnit {
    Segments,
    Frames,
}

impl std::fmt::Display for BatchUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BatchUnit::Segments => "segments",
            BatchUnit::Frames => "frames",
        })
    }
}

/// Half-open range `[start, start + len)` of input units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub index: u64,
    pub start: u64,
    pub len: u64,
}

impl Batch {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Lazy sequence of fixed-size batches; the last one may be smaller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batches {
    total: u64,
    size: u64,
    next_start: u64,
}

impl Batches {
    fn new(total: u64, size: u64) -> Result<Self, RoutingError> {
        if size == 0 {
            return Err(RoutingError::InvalidBatchSize);
        }
        Ok(Self { total, size, next_start: 0 })
    }

    /// Rewind to the first batch.
    pub fn restart(&mut self) {
        self.next_start = 0;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn batch_size(&self) -> u64 {
        self.size
    }

    /// Number of batches in the full sequence, independent of position.
    pub fn batch_count(&self) -> u64 {
        self.total.div_ceil(self.size)
    }

    fn remaining(&self) -> u64 {
        (self.total - self.next_start).div_ceil(self.size)
    }
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.next_start >= self.total {
            return None;
        }
        let start = self.next_start;
        let len = self.size.min(self.total - start);
        self.next_start += len;
        Some(Batch { index: start / self.size, start, len })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Batches {}

/// Temporal sampling for frame extraction. Key frames are always kept
/// because seeking downstream decodes from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplingPlan {
    pub every_nth: u32,
    pub include_key_frames: bool,
}

/// Full plan for one extraction or segmentation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub unit: BatchUnit,
    pub unit_count: u64,
    pub unit_size: u64,
    pub batch_count: u64,
    /// Only set for frame plans.
    pub sample_every_nth: Option<u32>,
    pub include_key_frames: bool,
}

impl BatchPlan {
    pub fn batches(&self) -> Batches {
        Batches {
            total: self.unit_count,
            size: self.unit_size,
            next_start: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchPlanner {
    catalog: Arc<QueueCatalog>,
    defaults: BatchConfig,
}

impl BatchPlanner {
    pub fn new(catalog: Arc<QueueCatalog>, defaults: BatchConfig) -> Self {
        Self { catalog, defaults }
    }

    pub fn defaults(&self) -> &BatchConfig {
        &self.defaults
    }

    pub fn plan_segments(&self, total: u64, batch_size: u64) -> Result<Batches, RoutingError> {
        Batches::new(total, batch_size)
    }

    pub fn plan_frames(&self, total: u64, batch_size: u64) -> Result<Batches, RoutingError> {
        Batches::new(total, batch_size)
    }

    pub fn sampling_rate(&self, every_nth: u32) -> Result<SamplingPlan, RoutingError> {
        if every_nth == 0 {
            return Err(RoutingError::InvalidSamplingRate);
        }
        Ok(SamplingPlan { every_nth, include_key_frames: true })
    }

    /// Batches for `kind` using the configured size of its unit.
    pub fn plan_batches(&self, total: u64, kind: &TaskKind) -> Result<Batches, RoutingError> {
        match self.unit_for(kind)? {
            BatchUnit::Segments => self.plan_segments(total, self.defaults.segments_batch_size),
            BatchUnit::Frames => self.plan_frames(total, self.defaults.frames_batch_size),
        }
    }

    /// Batch layout plus sampling; segment plans carry no sampling rate.
    pub fn plan(&self, total: u64, kind: &TaskKind) -> Result<BatchPlan, RoutingError> {
        let unit = self.unit_for(kind)?;
        let batches = self.plan_batches(total, kind)?;
        let sampling = match unit {
            BatchUnit::Frames => Some(self.sampling_rate(self.defaults.sampling_rate)?),
            BatchUnit::Segments => None,
        };
        Ok(BatchPlan {
            unit,
            unit_count: batches.total(),
            unit_size: batches.batch_size(),
            batch_count: batches.batch_count(),
            sample_every_nth: sampling.map(|s| s.every_nth),
            include_key_frames: true,
        })
    }

    fn unit_for(&self, kind: &TaskKind) -> Result<BatchUnit, RoutingError> {
        self.catalog
            .batch_unit(kind)
            .ok_or_else(|| RoutingError::NotBatchable(kind.clone()))
    }
}
