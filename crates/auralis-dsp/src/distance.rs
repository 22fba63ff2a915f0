//! Distance attenuation models for spatialized sources.

/// How gain falls off with distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    /// No attenuation.
    None,
    /// Straight-line falloff between the reference and max distances.
    #[default]
    Linear,
    /// `(d / ref)^-rolloff`.
    Exponential,
    /// `ref / (ref + rolloff * (d - ref))`.
    Inverse,
}

impl DistanceModel {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(DistanceModel::None),
            1 => Some(DistanceModel::Linear),
            2 => Some(DistanceModel::Exponential),
            3 => Some(DistanceModel::Inverse),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            DistanceModel::None => 0,
            DistanceModel::Linear => 1,
            DistanceModel::Exponential => 2,
            DistanceModel::Inverse => 3,
        }
    }
}

/// Model parameters, all in meters except `rolloff` which is unitless.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceParams {
    pub model: DistanceModel,
    pub distance_ref: f64,
    pub distance_max: f64,
    pub rolloff: f64,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            model: DistanceModel::default(),
            distance_ref: 1.0,
            distance_max: 50.0,
            rolloff: 1.0,
        }
    }
}

/// Gain in [0, 1] for a source at `distance`.
pub fn distance_attenuation(params: &DistanceParams, distance: f64) -> f64 {
    let DistanceParams {
        model,
        distance_ref,
        distance_max,
        rolloff,
    } = *params;

    if distance_ref <= 0.0 || distance_max <= distance_ref {
        return 1.0;
    }

    let d = distance.clamp(distance_ref, distance_max);
    let gain = match model {
        DistanceModel::None => 1.0,
        DistanceModel::Linear => {
            1.0 - rolloff * (d - distance_ref) / (distance_max - distance_ref)
        }
        DistanceModel::Exponential => (d / distance_ref).powf(-rolloff),
        DistanceModel::Inverse => distance_ref / (distance_ref + rolloff * (d - distance_ref)),
    };
    gain.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(model: DistanceModel) -> DistanceParams {
        DistanceParams {
            model,
            distance_ref: 1.0,
            distance_max: 10.0,
            rolloff: 1.0,
        }
    }

    #[test]
    fn test_none_is_unity() {
        let p = params(DistanceModel::None);
        assert_eq!(distance_attenuation(&p, 100.0), 1.0);
    }

    #[test]
    fn test_inside_reference_is_unity() {
        for model in [
            DistanceModel::Linear,
            DistanceModel::Exponential,
            DistanceModel::Inverse,
        ] {
            let p = params(model);
            assert_eq!(distance_attenuation(&p, 0.5), 1.0);
        }
    }

    #[test]
    fn test_linear_reaches_zero_at_max() {
        let p = params(DistanceModel::Linear);
        assert!(distance_attenuation(&p, 10.0) < 1e-9);
        assert!((distance_attenuation(&p, 5.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_monotonically_decreasing() {
        for model in [
            DistanceModel::Linear,
            DistanceModel::Exponential,
            DistanceModel::Inverse,
        ] {
            let p = params(model);
            let mut last = 1.0;
            for i in 1..=100 {
                let g = distance_attenuation(&p, i as f64 / 10.0);
                assert!(g <= last + 1e-12, "{model:?} not monotone");
                last = g;
            }
        }
    }

    #[test]
    fn test_degenerate_params_are_unity() {
        let p = DistanceParams {
            model: DistanceModel::Linear,
            distance_ref: 0.0,
            distance_max: 10.0,
            rolloff: 1.0,
        };
        assert_eq!(distance_attenuation(&p, 5.0), 1.0);
    }
}
