//! Suggested part layout for a multipart upload.
//!
//! The client is free to cut its file however it likes; the plan is what the
//! server advertises at initiation and what completion validates part numbers
//! against.

use serde::Serialize;
use thiserror::Error;

/// 100 MiB.
pub const DEFAULT_CHUNK_SIZE: i64 = 100 * 1024 * 1024;

/// 10 GiB.
pub const DEFAULT_MAX_FILE_SIZE: i64 = 10 * 1024 * 1024 * 1024;

/// Highest part number the multipart protocol accepts.
pub const MAX_PART_NUMBER: i64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkPlanError {
    #[error("file size {size} is invalid: must be between 1 and {max} bytes")]
    InvalidSize { size: i64, max: i64 },
    #[error("file of {size} bytes needs {parts} parts, above the limit of {MAX_PART_NUMBER}")]
    TooManyParts { size: i64, parts: i64 },
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    pub file_size: i64,
    pub chunk_size: i64,
    pub total_chunks: i64,
}

impl ChunkPlan {
    /// Planned size of part `part_number`; the last part holds the remainder.
    pub fn part_size(&self, part_number: i64) -> Option<i64> {
        if part_number < 1 || part_number > self.total_chunks {
            return None;
        }
        let offset = (part_number - 1) * self.chunk_size;
        Some((self.file_size - offset).min(self.chunk_size))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ChunkPlanner {
    pub chunk_size: i64,
    pub max_file_size: i64,
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ChunkPlanner {
    /// Largest file `chunk_size` can cover within the part-number limit.
    pub fn max_plannable_size(chunk_size: i64) -> i64 {
        chunk_size.saturating_mul(MAX_PART_NUMBER)
    }

    pub fn new(chunk_size: i64, max_file_size: i64) -> Self {
        Self {
            chunk_size,
            max_file_size,
        }
    }

    /// Compute `ceil(file_size / chunk_size)` parts of `chunk_size` bytes.
    pub fn plan(&self, file_size: i64) -> Result<ChunkPlan, ChunkPlanError> {
        if file_size <= 0 || file_size > self.max_file_size {
            return Err(ChunkPlanError::InvalidSize {
                size: file_size,
                max: self.max_file_size,
            });
        }

        let total_chunks =
            file_size / self.chunk_size + i64::from(file_size % self.chunk_size != 0);
        if total_chunks > MAX_PART_NUMBER {
            return Err(ChunkPlanError::TooManyParts {
                size: file_size,
                parts: total_chunks,
            });
        }

        Ok(ChunkPlan {
            file_size,
            chunk_size: self.chunk_size,
            total_chunks,
        })
    }
}
