use log::warn;
use std::env;
use std::str::FromStr;

/// Primary solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Greedy,
    Cso,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Greedy => "greedy",
            Algorithm::Cso => "cso",
        }
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" | "legacy" | "legacy_greedy" => Ok(Algorithm::Greedy),
            "cso" | "cp_sat" | "cpsat" => Ok(Algorithm::Cso),
            other => Err(format!("unknown algorithm '{}'", other)),
        }
    }
}

/// Soft-objective weights. Configuration-only; never tuned at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    /// Friendship shortfall (highest by default).
    pub w_f: f64,
    /// Gender imbalance.
    pub w_g: f64,
    /// Academic imbalance.
    pub w_a: f64,
    /// Behaviour imbalance.
    pub w_b: f64,
    /// Cluster split, when cohesion is demoted to soft.
    pub w_c: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            w_f: 10.0,
            w_g: 3.0,
            w_a: 3.0,
            w_b: 2.0,
            w_c: 20.0,
        }
    }
}

/// Engine configuration, read once at orchestrator construction.
/// Mutation of the environment mid-call is not observed.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub algorithm: Algorithm,
    pub timeout_seconds: u64,
    pub fallback_enabled: bool,
    pub min_class_size: usize,
    pub weights: Weights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            algorithm: Algorithm::Cso,
            timeout_seconds: 30,
            fallback_enabled: true,
            min_class_size: 2,
            weights: Weights::default(),
        }
    }
}

impl EngineConfig {
    /// Read configuration from the environment, falling back to defaults.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            algorithm: parse_env("ASSIGNMENT_ALGORITHM", defaults.algorithm),
            timeout_seconds: parse_env("ASSIGNMENT_TIMEOUT", defaults.timeout_seconds),
            fallback_enabled: parse_env("ASSIGNMENT_FALLBACK", defaults.fallback_enabled),
            min_class_size: parse_env("ASSIGNMENT_MIN_CLASS_SIZE", defaults.min_class_size),
            weights: Weights {
                w_f: parse_env("ASSIGNMENT_WEIGHT_FRIENDSHIP", defaults.weights.w_f),
                w_g: parse_env("ASSIGNMENT_WEIGHT_GENDER", defaults.weights.w_g),
                w_a: parse_env("ASSIGNMENT_WEIGHT_ACADEMIC", defaults.weights.w_a),
                w_b: parse_env("ASSIGNMENT_WEIGHT_BEHAVIOR", defaults.weights.w_b),
                w_c: parse_env("ASSIGNMENT_WEIGHT_CLUSTER", defaults.weights.w_c),
            },
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("ignoring unparseable {}='{}', using {:?}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.algorithm, Algorithm::Cso);
        assert_eq!(config.timeout_seconds, 30);
        assert!(config.fallback_enabled);
        assert_eq!(config.min_class_size, 2);
        assert_eq!(config.weights.w_f, 10.0);
        assert_eq!(config.weights.w_c, 20.0);
    }

    #[test]
    fn algorithm_aliases() {
        assert_eq!("greedy".parse::<Algorithm>().unwrap(), Algorithm::Greedy);
        assert_eq!("legacy".parse::<Algorithm>().unwrap(), Algorithm::Greedy);
        assert_eq!("legacy_greedy".parse::<Algorithm>().unwrap(), Algorithm::Greedy);
        assert_eq!("cso".parse::<Algorithm>().unwrap(), Algorithm::Cso);
        assert_eq!("cp_sat".parse::<Algorithm>().unwrap(), Algorithm::Cso);
        assert_eq!("CPSAT".parse::<Algorithm>().unwrap(), Algorithm::Cso);
        assert!("annealing".parse::<Algorithm>().is_err());
    }
}
