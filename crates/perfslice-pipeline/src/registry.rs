//! Two-slot recorder registry.
//!
//! Every registered API owns one recorder in each of two [`Generation`]s. One
//! generation is active and receives all writes; the other is standby, which
//! right after a rotation means "pending aggregation". Roles flip with a single
//! atomic index update, so hot-path lookups never take a lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use perfslice_recorder::{ProfiledApi, Recorder, RecorderMode, SliceWindow};

use crate::error::{PipelineError, PipelineResult};

/// One slot: a recorder for every registered API, in registration order.
#[derive(Debug)]
pub struct Generation {
    recorders: Vec<Arc<dyn Recorder>>,
    index: HashMap<String, usize>,
}

impl Generation {
    fn build(apis: &[ProfiledApi], mode: RecorderMode) -> Self {
        let recorders: Vec<Arc<dyn Recorder>> =
            apis.iter().map(|api| api.build_recorder(mode)).collect();
        let index = apis
            .iter()
            .enumerate()
            .map(|(position, api)| (api.name.clone(), position))
            .collect();
        Self { recorders, index }
    }

    /// Recorder for `api`.
    #[inline]
    #[must_use]
    pub fn get(&self, api: &str) -> Option<&dyn Recorder> {
        let position = *self.index.get(api)?;
        self.recorders.get(position).map(AsRef::as_ref)
    }

    /// All recorders in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Recorder> + '_ {
        self.recorders.iter().map(AsRef::as_ref)
    }

    /// Number of recorders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    /// Whether the generation holds no recorders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }

    /// Sum of `total_count` over every recorder.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.iter()
            .map(Recorder::total_count)
            .fold(0_u64, u64::saturating_add)
    }

    /// Stamp `window` on recorders that have never been stamped. Returns how
    /// many were stamped.
    pub(crate) fn stamp_unstamped(&self, window: SliceWindow) -> usize {
        let mut stamped = 0_usize;
        for recorder in self.iter().filter(|recorder| recorder.is_unstamped()) {
            recorder.stamp(window);
            stamped = stamped.saturating_add(1);
        }
        stamped
    }

    /// Reset every recorder and stamp `window` on it.
    pub(crate) fn reset_and_stamp(&self, window: SliceWindow) {
        for recorder in self.iter() {
            recorder.reset();
            recorder.stamp(window);
        }
    }
}

/// The two generations plus the index of the active one.
///
/// Only the rotation task calls [`swap`](Self::swap); everything else reads.
#[derive(Debug)]
pub struct RecorderRegistry {
    slots: [Generation; 2],
    active: AtomicUsize,
}

impl RecorderRegistry {
    /// Build both generations for `apis`.
    ///
    /// # Errors
    ///
    /// Returns an error if an API name is empty or registered twice.
    pub fn new(apis: &[ProfiledApi], mode: RecorderMode) -> PipelineResult<Self> {
        let mut seen = HashSet::with_capacity(apis.len());
        for api in apis {
            if api.name.is_empty() {
                return Err(PipelineError::EmptyApiName);
            }
            if !seen.insert(api.name.as_str()) {
                return Err(PipelineError::duplicate_api(api.name.clone()));
            }
        }

        Ok(Self {
            slots: [Generation::build(apis, mode), Generation::build(apis, mode)],
            active: AtomicUsize::new(0),
        })
    }

    /// Recorder for `api` in the active generation. Wait-free.
    #[inline]
    #[must_use]
    pub fn get_recorder(&self, api: &str) -> Option<&dyn Recorder> {
        self.active().get(api)
    }

    /// Index (0 or 1) of the active generation.
    #[inline]
    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire) & 1
    }

    /// Generation currently receiving writes.
    #[inline]
    #[must_use]
    pub fn active(&self) -> &Generation {
        self.slot(self.active_index())
    }

    /// Generation not receiving writes; pending aggregation after a rotation.
    #[inline]
    #[must_use]
    pub fn standby(&self) -> &Generation {
        self.slot(self.active_index() ^ 1)
    }

    /// Flip the roles and return the new active index.
    ///
    /// The release half publishes the standby slot's reset and window stamps to
    /// every thread that subsequently loads the index.
    pub(crate) fn swap(&self) -> usize {
        (self.active.fetch_xor(1, Ordering::AcqRel) ^ 1) & 1
    }

    /// Registered API identifiers in registration order.
    pub fn api_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.active().iter().map(Recorder::api)
    }

    /// Number of registered APIs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active().len()
    }

    /// Whether no API is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active().is_empty()
    }

    fn slot(&self, index: usize) -> &Generation {
        let [first, second] = &self.slots;
        if index == 0 { first } else { second }
    }
}
