use crate::prelude::{Constellation, Epoch, Error, SV};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Single satellite [Observation], as produced by the measurement parser.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    /// [SV] identity, which also carries the [Constellation]
    pub sv: SV,
    /// Sampling [Epoch] (reception time, receiver clock)
    pub epoch: Epoch,
    /// Raw pseudo range (in meters)
    pub pseudo_range_m: f64,
    /// Carrier to noise density ratio (in dB-Hz)
    pub cn0_dbhz: Option<f64>,
    /// Doppler shift (in Hz)
    pub doppler_hz: Option<f64>,
    /// Time of reception as tagged by the receiver, when it differs from [Self::epoch]
    pub received: Option<Epoch>,
}

impl Observation {
    /// Builds a new [Observation].
    /// The pseudo range must be finite and strictly positive.
    pub fn new(sv: SV, epoch: Epoch, pseudo_range_m: f64) -> Result<Self, Error> {
        if !pseudo_range_m.is_finite() {
            return Err(Error::InvalidObservation("non finite pseudo range"));
        }
        if pseudo_range_m <= 0.0 {
            return Err(Error::InvalidObservation("non positive pseudo range"));
        }
        Ok(Self {
            sv,
            epoch,
            pseudo_range_m,
            cn0_dbhz: None,
            doppler_hz: None,
            received: None,
        })
    }

    /// Copies and returns [Observation] with signal strength (dB-Hz).
    pub fn with_cn0(&self, cn0_dbhz: f64) -> Result<Self, Error> {
        if !cn0_dbhz.is_finite() {
            return Err(Error::InvalidObservation("non finite CN0"));
        }
        let mut s = *self;
        s.cn0_dbhz = Some(cn0_dbhz);
        Ok(s)
    }

    /// Copies and returns [Observation] with Doppler shift (Hz).
    pub fn with_doppler(&self, doppler_hz: f64) -> Result<Self, Error> {
        if !doppler_hz.is_finite() {
            return Err(Error::InvalidObservation("non finite doppler"));
        }
        let mut s = *self;
        s.doppler_hz = Some(doppler_hz);
        Ok(s)
    }

    /// Copies and returns [Observation] with receiver time tag.
    pub fn with_received(&self, received: Epoch) -> Self {
        let mut s = *self;
        s.received = Some(received);
        s
    }

    /// Returns [Constellation] this [Observation] belongs to.
    pub fn constellation(&self) -> Constellation {
        self.sv.constellation
    }

    /// Returns the reception [Epoch]: receiver time tag when provided,
    /// sampling [Epoch] otherwise.
    pub fn reception_epoch(&self) -> Epoch {
        self.received.unwrap_or(self.epoch)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::{Constellation, Epoch};

    #[test]
    fn observation_validation() {
        let sv = SV::new(Constellation::GPS, 1);
        let t = Epoch::from_gpst_seconds(1.0E9);

        assert!(Observation::new(sv, t, 21_000_000.0).is_ok());
        assert_eq!(
            Observation::new(sv, t, f64::NAN),
            Err(Error::InvalidObservation("non finite pseudo range"))
        );
        assert_eq!(
            Observation::new(sv, t, -1.0),
            Err(Error::InvalidObservation("non positive pseudo range"))
        );

        let obs = Observation::new(sv, t, 21_000_000.0).unwrap();
        assert!(obs.with_cn0(f64::INFINITY).is_err());
        assert!(obs.with_doppler(f64::NAN).is_err());

        let obs = obs.with_cn0(42.0).unwrap().with_doppler(-1200.0).unwrap();
        assert_eq!(obs.cn0_dbhz, Some(42.0));
        assert_eq!(obs.doppler_hz, Some(-1200.0));
        assert_eq!(obs.constellation(), Constellation::GPS);
        assert_eq!(obs.reception_epoch(), t);
    }
}
