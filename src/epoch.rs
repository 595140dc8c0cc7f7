//! Measurement epochs
use itertools::Itertools;
use log::debug;

use crate::prelude::{Duration, Epoch, Observation, SV};

/// Set of [Observation]s sharing one sampling instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementEpoch {
    /// Sampling [Epoch]: timestamp of the first [Observation] of this group
    pub epoch: Epoch,
    /// [Observation]s, in arrival order, one per [SV]
    pub observations: Vec<Observation>,
}

impl MeasurementEpoch {
    /// Builds new [MeasurementEpoch] from a group of [Observation]s.
    /// Duplicate observations of one [SV] are collapsed: the first one is kept.
    /// Returns None on empty group.
    pub fn new(observations: Vec<Observation>) -> Option<Self> {
        let epoch = observations.first()?.epoch;
        let total = observations.len();

        let observations = observations
            .into_iter()
            .unique_by(|obs| obs.sv)
            .collect::<Vec<_>>();

        if observations.len() < total {
            debug!(
                "{} - dropped {} duplicate observation(s)",
                epoch,
                total - observations.len()
            );
        }

        Some(Self {
            epoch,
            observations,
        })
    }

    /// Number of vehicles
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Returns [SV]s observed during this epoch
    pub fn satellites(&self) -> impl Iterator<Item = SV> + '_ {
        self.observations.iter().map(|obs| obs.sv)
    }
}

/// Groups a time ordered stream of [Observation]s into [MeasurementEpoch]s.
/// Two successive observations belong to the same epoch if their timestamps
/// differ by less than the grouping threshold. Any larger gap, including a
/// backwards jump, starts a new epoch.
#[derive(Debug)]
pub struct EpochBuilder<I: Iterator<Item = Observation>> {
    iter: I,
    gap: Duration,
    pending: Option<Observation>,
}

impl<I: Iterator<Item = Observation>> EpochBuilder<I> {
    /// Builds new [EpochBuilder], with grouping threshold `gap`.
    pub fn new<T: IntoIterator<IntoIter = I>>(observations: T, gap: Duration) -> Self {
        Self {
            iter: observations.into_iter(),
            gap,
            pending: None,
        }
    }
}

impl<I: Iterator<Item = Observation>> Iterator for EpochBuilder<I> {
    type Item = MeasurementEpoch;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.pending.take().or_else(|| self.iter.next())?;

        let mut previous = first.epoch;
        let mut group = vec![first];

        for obs in self.iter.by_ref() {
            if (obs.epoch - previous).abs() < self.gap {
                previous = obs.epoch;
                group.push(obs);
            } else {
                self.pending = Some(obs);
                break;
            }
        }

        MeasurementEpoch::new(group)
    }
}
