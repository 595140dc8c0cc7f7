use crate::{
    prelude::{
        Cancellation, Config, EphemerisStore, Error, SharedEphemeris, Solver,
    },
    tests::{
        gps_constellation, gps_store, init_logger, reference_position, synthetic_epochs,
        RECEIVER_CLOCK_BIAS_S,
    },
};

#[test]
fn sequential_batch() {
    init_logger();
    let rx = reference_position();
    let epochs = synthetic_epochs(5, 30.0);

    let mut solver = Solver::new(&Config::default(), SharedEphemeris::new(gps_store()));
    let results = solver.batch(epochs.clone(), &Cancellation::new());

    assert_eq!(results.len(), 5);

    for (i, (t, result)) in results.iter().enumerate() {
        assert_eq!(*t, epochs[i].epoch);

        let pvt = result.as_ref().unwrap();
        assert!(pvt.solution.converged);
        assert!((pvt.position().unwrap().ecef() - rx.ecef()).norm() < 1.0E-3);
        assert!((pvt.clock_offset_s() - RECEIVER_CLOCK_BIAS_S).abs() < 1.0E-9);

        if i > 0 {
            // warm start from the previous solution
            let cold = solver.resolve_with(&epochs[i], None).unwrap();
            assert!(pvt.solution.iterations <= cold.solution.iterations);
        }
    }
}

#[test]
fn batch_failures_do_not_interrupt() {
    init_logger();
    let epochs = synthetic_epochs(3, 30.0);

    let mut degraded = epochs.clone();
    degraded[1].observations.truncate(3);

    let mut solver = Solver::new(&Config::default(), SharedEphemeris::new(gps_store()));
    let results = solver.batch(degraded, &Cancellation::new());

    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].1, Err(Error::InsufficientSatellites(3)));
    assert!(results[2].1.is_ok());
}

#[test]
fn observation_stream_processing() {
    init_logger();
    let rx = reference_position();
    let epochs = synthetic_epochs(4, 30.0);

    let observations = epochs
        .iter()
        .flat_map(|epoch| epoch.observations.iter().copied())
        .collect::<Vec<_>>();

    let mut solver = Solver::new(&Config::default(), SharedEphemeris::new(gps_store()));
    let results = solver.process(observations, &Cancellation::new());

    assert_eq!(results.len(), 4);
    for ((t, result), epoch) in results.iter().zip(epochs.iter()) {
        assert_eq!(*t, epoch.epoch);
        let pvt = result.as_ref().unwrap();
        assert_eq!(pvt.solution.sv_used, epoch.len());
        assert!((pvt.position().unwrap().ecef() - rx.ecef()).norm() < 1.0E-3);
    }
}

#[test]
fn batch_cancellation() {
    init_logger();
    let epochs = synthetic_epochs(5, 30.0);
    let mut solver = Solver::new(&Config::default(), SharedEphemeris::new(gps_store()));

    let cancel = Cancellation::new();
    cancel.cancel();
    let results = solver.batch(epochs.clone(), &cancel);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1, Err(Error::Cancelled));

    // cancelled while processing the third epoch
    let cancel = Cancellation::new();
    let handle = cancel.clone();
    let stream = epochs.into_iter().enumerate().map(|(i, epoch)| {
        if i == 2 {
            handle.cancel();
        }
        epoch
    });

    let results = solver.batch(stream, &cancel);
    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.is_ok());
    assert_eq!(results[2].1, Err(Error::Cancelled));
}

#[test]
fn ephemeris_refresh() {
    init_logger();
    let epochs = synthetic_epochs(2, 30.0);

    let shared = SharedEphemeris::new(EphemerisStore::default());
    let mut solver = Solver::new(&Config::default(), shared.clone());

    assert_eq!(
        solver.resolve(&epochs[0]),
        Err(Error::InsufficientSatellites(0))
    );

    shared.refresh(EphemerisStore::from_records(gps_constellation()));

    let pvt = solver.resolve(&epochs[1]).unwrap();
    assert!(pvt.solution.converged);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_batch() {
    init_logger();
    let rx = reference_position();
    let epochs = synthetic_epochs(8, 15.0);

    let solver = Solver::new(&Config::default(), SharedEphemeris::new(gps_store()));
    let results = solver.par_batch(&epochs, &Cancellation::new());

    assert_eq!(results.len(), 8);
    for ((t, result), epoch) in results.iter().zip(epochs.iter()) {
        assert_eq!(*t, epoch.epoch);
        let pvt = result.as_ref().unwrap();
        assert!((pvt.position().unwrap().ecef() - rx.ecef()).norm() < 1.0E-3);
    }

    let cancel = Cancellation::new();
    cancel.cancel();
    let results = solver.par_batch(&epochs, &cancel);
    assert!(results.iter().all(|(_, result)| *result == Err(Error::Cancelled)));
}
