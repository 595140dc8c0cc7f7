//! Ephemeris snapshot and lookup
use std::{
    cmp::Reverse,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::{debug, warn};

use crate::prelude::{Ephemeris, Epoch, Error, SV};

/// Immutable collection of broadcast [Ephemeris] frames,
/// indexed by [SV].
#[derive(Debug, Clone, Default)]
pub struct EphemerisStore {
    /// Frames per vehicle, along with their loading order
    frames: HashMap<SV, Vec<(usize, Ephemeris)>>,
    /// Loading counter
    loaded: usize,
    /// Number of frames rejected at loading time
    rejected: usize,
}

impl EphemerisStore {
    /// Builds a new [EphemerisStore] from a collection of frames.
    /// Frames are considered loaded in iteration order.
    pub fn from_records<I: IntoIterator<Item = Ephemeris>>(records: I) -> Self {
        let mut s = Self::default();
        for eph in records {
            s.insert(eph);
        }
        debug!(
            "ephemeris store: {} frames for {} vehicles ({} rejected)",
            s.len(),
            s.frames.len(),
            s.rejected
        );
        s
    }

    /// Indexes a new frame. Malformed frames are not indexed.
    /// Returns true when the frame was indexed.
    pub fn insert(&mut self, eph: Ephemeris) -> bool {
        if let Err(e) = eph.validate() {
            warn!("{} - rejected ephemeris frame: {}", eph.toe, e);
            self.rejected += 1;
            return false;
        }
        let seq = self.loaded;
        self.loaded += 1;
        self.frames.entry(eph.sv).or_default().push((seq, eph));
        true
    }

    /// Selects the frame to use for this [SV] at this [Epoch]:
    /// among all frames whose validity window contains `t`,
    /// the one with nearest time of ephemeris. Ties are resolved
    /// in favor of the most recently loaded frame.
    pub fn lookup(&self, sv: SV, t: Epoch) -> Result<&Ephemeris, Error> {
        self.frames
            .get(&sv)
            .and_then(|frames| {
                frames
                    .iter()
                    .filter(|(_, eph)| eph.is_valid(t))
                    .min_by_key(|(seq, eph)| ((t - eph.toe).abs(), Reverse(*seq)))
                    .map(|(_, eph)| eph)
            })
            .ok_or(Error::MissingEphemeris(sv))
    }

    /// Returns list of [SV] for which at least one frame exists, in ascending order.
    pub fn satellites(&self) -> Vec<SV> {
        let mut list = self.frames.keys().copied().collect::<Vec<_>>();
        list.sort();
        list
    }

    /// Total number of indexed frames
    pub fn len(&self) -> usize {
        self.frames.values().map(|frames| frames.len()).sum()
    }

    /// True if no frame was indexed
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames rejected at loading time
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

/// [EphemerisStore] snapshot shared between the processing tasks
/// and the refreshing task. Clones share the same snapshot slot.
#[derive(Debug, Clone, Default)]
pub struct SharedEphemeris {
    inner: Arc<RwLock<Arc<EphemerisStore>>>,
}

impl SharedEphemeris {
    /// Wraps initial [EphemerisStore]
    pub fn new(store: EphemerisStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(store))),
        }
    }

    /// Returns current snapshot. The snapshot remains valid and unchanged
    /// for as long as it is held, whatever the refresh activity.
    pub fn snapshot(&self) -> Arc<EphemerisStore> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces current snapshot
    pub fn refresh(&self, store: EphemerisStore) {
        let store = Arc::new(store);
        debug!("ephemeris refresh: {} frames", store.len());
        match self.inner.write() {
            Ok(mut guard) => *guard = store,
            Err(poisoned) => *poisoned.into_inner() = store,
        }
    }
}
