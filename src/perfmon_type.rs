//! Registry of resource-monitor metric types.
//!
//! The type column of a perfmon sample (`cpu_X`, `io_0_r`, `mem`, ...) is
//! matched against a fixed set of patterns. The matched type decides which
//! raw columns carry values, the unit conversion factor, whether the series
//! is a counter normalized to its first value, and how the binned series is
//! aggregated.

use crate::binning::AggregationType;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerfMonType {
    Cpu,
    Java,
    Io,
    Mem,
    Swap,
    DockerCpu,
    DockerMem,
}

/// Shape of the one-row summary written next to a binned perfmon series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    /// `min;mean;max`
    MinMeanMax,
    /// `min;q0.1;q0.5;q0.9;max`
    Quantiles,
}

const ALL_TYPES: [PerfMonType; 7] = [
    PerfMonType::Cpu,
    PerfMonType::Java,
    PerfMonType::Io,
    PerfMonType::Mem,
    PerfMonType::Swap,
    PerfMonType::DockerCpu,
    PerfMonType::DockerMem,
];

fn registry() -> &'static [(PerfMonType, Regex)] {
    static REGISTRY: OnceLock<Vec<(PerfMonType, Regex)>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        ALL_TYPES
            .iter()
            .map(|t| {
                let anchored = format!("^(?:{})$", t.pattern());
                (*t, Regex::new(&anchored).expect("valid perfmon type pattern"))
            })
            .collect()
    })
}

impl PerfMonType {
    pub fn pattern(&self) -> &'static str {
        match self {
            PerfMonType::Cpu => "cpu_X",
            PerfMonType::Java => r"java_\d+",
            PerfMonType::Io => r"io_\d+(?:_(?:r|w))?",
            PerfMonType::Mem => "mem",
            PerfMonType::Swap => "swap",
            PerfMonType::DockerCpu => r"docker_cpu(?:_\S+)?",
            PerfMonType::DockerMem => r"docker_mem(?:_\S+)?",
        }
    }

    /// Classify a type column value; `None` for unknown metrics.
    pub fn classify(type_string: &str) -> Option<PerfMonType> {
        registry()
            .iter()
            .find(|(_, re)| re.is_match(type_string))
            .map(|(t, _)| *t)
    }

    /// Multiplier converting the raw unit into the reported unit.
    pub fn factor(&self) -> f64 {
        match self {
            PerfMonType::Io | PerfMonType::Mem | PerfMonType::Swap | PerfMonType::DockerMem => {
                1.0 / 1024.0
            }
            PerfMonType::Cpu | PerfMonType::Java | PerfMonType::DockerCpu => 1.0,
        }
    }

    /// Monotonic counters are reported relative to their first sample.
    pub fn normalize_values(&self) -> bool {
        matches!(self, PerfMonType::Io)
    }

    pub fn aggregation(&self) -> AggregationType {
        match self {
            PerfMonType::Mem | PerfMonType::Swap | PerfMonType::DockerMem => {
                AggregationType::Median
            }
            PerfMonType::Cpu | PerfMonType::Java | PerfMonType::Io | PerfMonType::DockerCpu => {
                AggregationType::Mean
            }
        }
    }

    pub fn summary_kind(&self) -> SummaryKind {
        match self.aggregation() {
            AggregationType::Median => SummaryKind::Quantiles,
            _ => SummaryKind::MinMeanMax,
        }
    }
}

impl fmt::Display for PerfMonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PerfMonType::Cpu => "CPU",
            PerfMonType::Java => "JAVA",
            PerfMonType::Io => "IO",
            PerfMonType::Mem => "MEM",
            PerfMonType::Swap => "SWAP",
            PerfMonType::DockerCpu => "DOCKER_CPU",
            PerfMonType::DockerMem => "DOCKER_MEM",
        };
        write!(f, "{}", name)
    }
}
