//! PVT solver
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, error, info, warn};
use nalgebra::Vector4;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    cfg::Config,
    corrector::RangeCorrector,
    navigation::{Navigation, PVTSolution, ReceiverSolution},
    prelude::{EpochBuilder, Epoch, Error, MeasurementEpoch, Observation, Position},
    store::{EphemerisStore, SharedEphemeris},
};

/// Cooperative cancellation handle. Clones share the same flag.
/// Processing stops at the next epoch boundary once cancelled.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// [Solver] aims at solving [PVTSolution]s.
pub struct Solver {
    /// Solver parametrization
    pub cfg: Config,
    /// [SharedEphemeris] snapshot provider
    ephemeris: SharedEphemeris,
    /// [RangeCorrector]
    corrector: RangeCorrector,
    /// [Navigation]
    nav: Navigation,
    /// Previous solution (internal logic)
    prev_solution: Option<ReceiverSolution>,
}

impl Solver {
    /// Creates a new [Solver]
    pub fn new(cfg: &Config, ephemeris: SharedEphemeris) -> Self {
        Self {
            cfg: cfg.clone(),
            ephemeris,
            corrector: RangeCorrector::new(cfg),
            nav: Navigation::new(&cfg.solver),
            prev_solution: None,
        }
    }

    /// Forgets previous solution: next epoch is a cold start.
    pub fn reset(&mut self) {
        self.prev_solution = None;
    }

    /// Solves one [MeasurementEpoch]. The previous solution, if any,
    /// serves as apriori when [Config::warm_start] is set.
    pub fn resolve(&mut self, epoch: &MeasurementEpoch) -> Result<PVTSolution, Error> {
        let apriori = if self.cfg.warm_start {
            self.prev_solution
                .as_ref()
                .and_then(|prev| prev.position().ok().map(|pos| (pos, prev.state())))
        } else {
            None
        };

        let pvt = self.resolve_seeded(epoch, apriori)?;

        if pvt.solution.converged {
            self.prev_solution = Some(pvt.solution.clone());
        }

        Ok(pvt)
    }

    /// Solves one [MeasurementEpoch] independently of any previous solution.
    /// The `apriori` [Position] enables the elevation mask right away and
    /// seeds the iteration.
    pub fn resolve_with(
        &self,
        epoch: &MeasurementEpoch,
        apriori: Option<&Position>,
    ) -> Result<PVTSolution, Error> {
        let apriori = apriori.map(|pos| {
            let ecef = pos.ecef();
            (*pos, Vector4::new(ecef[0], ecef[1], ecef[2], 0.0))
        });
        self.resolve_seeded(epoch, apriori)
    }

    fn resolve_seeded(
        &self,
        epoch: &MeasurementEpoch,
        apriori: Option<(Position, Vector4<f64>)>,
    ) -> Result<PVTSolution, Error> {
        // one snapshot per epoch
        let store = self.ephemeris.snapshot();

        let solution = match apriori {
            Some((position, seed)) => self.solve(epoch, &store, Some(&position), Some(seed))?,
            None => {
                debug!("{} - cold start", epoch.epoch);
                let provisional = self.solve(epoch, &store, None, None)?;
                match provisional.position() {
                    Ok(position) if provisional.converged => {
                        self.solve(epoch, &store, Some(&position), Some(provisional.state()))?
                    },
                    _ => provisional,
                }
            },
        };

        if !solution.converged {
            warn!("{} - {}", epoch.epoch, Error::NonConvergence);
        }

        let pvt = PVTSolution::new(epoch.epoch, solution);

        match pvt.lat_long_alt_deg_deg_m {
            Some((lat, lon, alt)) => info!(
                "{} - lat={:.6}° lon={:.6}° alt={:.3}m dt={:.6E}s rms={:.3}m ({} sv)",
                pvt.epoch,
                lat,
                lon,
                alt,
                pvt.solution.clock_bias_s,
                pvt.solution.rms_m,
                pvt.solution.sv_used,
            ),
            None => warn!(
                "{} - {}: x={:.3}m y={:.3}m z={:.3}m ({} sv)",
                pvt.epoch,
                Error::DegeneratePosition,
                pvt.solution.position_ecef_m.0,
                pvt.solution.position_ecef_m.1,
                pvt.solution.position_ecef_m.2,
                pvt.solution.sv_used,
            ),
        }

        Ok(pvt)
    }

    fn solve(
        &self,
        epoch: &MeasurementEpoch,
        store: &EphemerisStore,
        apriori: Option<&Position>,
        seed: Option<Vector4<f64>>,
    ) -> Result<ReceiverSolution, Error> {
        let ranges = self.corrector.correct_epoch(epoch, store, apriori);
        debug!(
            "{} - {}/{} vehicles corrected",
            epoch.epoch,
            ranges.len(),
            epoch.len()
        );
        self.nav.solve(&ranges, seed)
    }

    /// Solves a sequence of [MeasurementEpoch]s, in order, each one
    /// serving as apriori to the next one. Per epoch failures do not
    /// interrupt the processing. Cancellation is verified between epochs:
    /// the first epoch that is not processed is reported as [Error::Cancelled].
    pub fn batch<I: IntoIterator<Item = MeasurementEpoch>>(
        &mut self,
        epochs: I,
        cancel: &Cancellation,
    ) -> Vec<(Epoch, Result<PVTSolution, Error>)> {
        let mut results = Vec::new();

        for epoch in epochs {
            if cancel.is_cancelled() {
                info!("{} - processing cancelled", epoch.epoch);
                results.push((epoch.epoch, Err(Error::Cancelled)));
                break;
            }

            let result = self.resolve(&epoch);
            if let Err(e) = &result {
                error!("{} - {}", epoch.epoch, e);
            }
            results.push((epoch.epoch, result));
        }

        results
    }

    /// Groups a stream of [Observation]s into epochs, using [Config::epoch_gap],
    /// then solves them like [Self::batch].
    pub fn process<I: IntoIterator<Item = Observation>>(
        &mut self,
        observations: I,
        cancel: &Cancellation,
    ) -> Vec<(Epoch, Result<PVTSolution, Error>)> {
        let epochs = EpochBuilder::new(observations, self.cfg.epoch_gap());
        self.batch(epochs, cancel)
    }

    /// Solves a set of [MeasurementEpoch]s in parallel. Each epoch is a cold start.
    /// Results are sorted by [Epoch].
    #[cfg(feature = "parallel")]
    #[cfg_attr(docrs, doc(cfg(feature = "parallel")))]
    pub fn par_batch(
        &self,
        epochs: &[MeasurementEpoch],
        cancel: &Cancellation,
    ) -> Vec<(Epoch, Result<PVTSolution, Error>)> {
        let mut results = epochs
            .par_iter()
            .map(|epoch| {
                if cancel.is_cancelled() {
                    return (epoch.epoch, Err(Error::Cancelled));
                }
                let result = self.resolve_seeded(epoch, None);
                if let Err(e) = &result {
                    error!("{} - {}", epoch.epoch, e);
                }
                (epoch.epoch, result)
            })
            .collect::<Vec<_>>();

        results.sort_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        results
    }
}
