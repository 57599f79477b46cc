//! Fixed-capacity sliding window of feature vectors.

use std::collections::VecDeque;

use crowdwatch_models::{FeatureVector, WindowRequest, DEFAULT_WINDOW_SIZE};

use crate::error::{InferenceError, InferenceResult};

/// Ordered FIFO buffer holding at most `capacity` vectors.
#[derive(Debug, Clone)]
pub struct SlidingWindowBuffer {
    capacity: usize,
    items: VecDeque<FeatureVector>,
}

impl Default for SlidingWindowBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl SlidingWindowBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a vector, returning the evicted oldest one when full.
    pub fn push(&mut self, vector: FeatureVector) -> Option<FeatureVector> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(vector);
        evicted
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Immutable copy of the current contents, oldest first.
    pub fn snapshot(&self) -> SlidingWindow {
        SlidingWindow {
            vectors: self.items.iter().cloned().collect(),
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Snapshot of a window, decoupled from further pushes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlidingWindow {
    vectors: Vec<FeatureVector>,
}

impl SlidingWindow {
    pub fn new(vectors: Vec<FeatureVector>) -> Self {
        Self { vectors }
    }

    /// Window from the raw channels of a worker request.
    pub fn from_request(request: &WindowRequest) -> InferenceResult<Self> {
        if request.motion_energy.len() != request.flux_of_count.len() {
            return Err(InferenceError::malformed_window(format!(
                "channel lengths differ: motion_energy={}, flux_of_count={}",
                request.motion_energy.len(),
                request.flux_of_count.len()
            )));
        }
        let vectors = request
            .motion_energy
            .iter()
            .zip(&request.flux_of_count)
            .enumerate()
            .map(|(i, (e, f))| FeatureVector {
                timestamp: i as u64,
                motion_energy: *e,
                flux_of_count: *f,
                live_count: 0,
                density_count: 0.0,
            })
            .collect();
        Ok(Self { vectors })
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Tick of the newest vector.
    pub fn end_timestamp(&self) -> u64 {
        self.vectors.last().map(|v| v.timestamp).unwrap_or(0)
    }

    /// One channel (`0` motion energy, `1` flux) over the window.
    pub fn channel(&self, index: usize) -> Vec<f64> {
        self.vectors.iter().map(|v| v.channels()[index]).collect()
    }

    pub fn to_request(&self) -> WindowRequest {
        WindowRequest::new(self.channel(0), self.channel(1))
    }

    /// Length and finiteness check against the expected window size.
    pub fn validate(&self, expected_len: usize) -> InferenceResult<()> {
        if self.vectors.len() != expected_len {
            return Err(InferenceError::malformed_window(format!(
                "expected {expected_len} vectors, got {}",
                self.vectors.len()
            )));
        }
        if let Some(v) = self
            .vectors
            .iter()
            .find(|v| !v.motion_energy.is_finite() || !v.flux_of_count.is_finite())
        {
            return Err(InferenceError::malformed_window(format!(
                "non-finite value at tick {}",
                v.timestamp
            )));
        }
        Ok(())
    }
}
