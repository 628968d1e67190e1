//! Task sizing model and the serverless-compute CPU/memory pairing rules.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Valid `(vcpus, memory)` pairings for serverless tasks.
///
/// Memory ranges are inclusive and stepped; a request outside the table
/// is rejected before any network call.
const CPU_MEMORY_TABLE: &[(f64, MemoryRule)] = &[
    (0.25, MemoryRule::List(&[512, 1024, 2048])),
    (0.5, MemoryRule::Range { min: 1024, max: 4096, step: 1024 }),
    (1.0, MemoryRule::Range { min: 2048, max: 8192, step: 1024 }),
    (2.0, MemoryRule::Range { min: 4096, max: 16384, step: 1024 }),
    (4.0, MemoryRule::Range { min: 8192, max: 30720, step: 1024 }),
    (8.0, MemoryRule::Range { min: 16384, max: 61440, step: 4096 }),
    (16.0, MemoryRule::Range { min: 32768, max: 122880, step: 8192 }),
];

enum MemoryRule {
    List(&'static [u32]),
    Range { min: u32, max: u32, step: u32 },
}

impl MemoryRule {
    fn allows(&self, memory_mb: u32) -> bool {
        match *self {
            Self::List(values) => values.contains(&memory_mb),
            Self::Range { min, max, step } => {
                memory_mb >= min && memory_mb <= max && (memory_mb - min) % step == 0
            }
        }
    }
}

/// CPU and memory requested for a single task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub vcpus: f64,
    pub memory_mb: u32,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self { vcpus: 0.25, memory_mb: 512 }
    }
}

impl ResourceSpec {
    /// Check the pair against the provider's allowed combinations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the offending pair, with the
    /// valid memory choices when the vCPU count itself is known.
    pub fn validate(&self) -> Result<()> {
        let rule = CPU_MEMORY_TABLE
            .iter()
            .find(|(vcpus, _)| *vcpus == self.vcpus)
            .map(|(_, rule)| rule);

        match rule {
            None => Err(Error::Validation(format!(
                "unsupported vCPU count {}; valid values: 0.25, 0.5, 1, 2, 4, 8, 16",
                self.vcpus
            ))),
            Some(rule) if !rule.allows(self.memory_mb) => Err(Error::Validation(format!(
                "memory {} MB is not valid for {} vCPUs",
                self.memory_mb, self.vcpus
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Provider CPU units (1 vCPU = 1024 units).
    #[must_use]
    pub fn cpu_units(&self) -> u32 {
        (self.vcpus * 1024.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec_is_valid() {
        assert!(ResourceSpec::default().validate().is_ok());
    }

    #[test]
    fn test_accepted_pairs() {
        for (vcpus, memory_mb) in [
            (0.25, 512),
            (0.25, 2048),
            (0.5, 1024),
            (0.5, 4096),
            (1.0, 2048),
            (1.0, 8192),
            (2.0, 16384),
            (4.0, 30720),
            (8.0, 16384),
            (8.0, 61440),
            (16.0, 32768),
            (16.0, 122880),
        ] {
            let spec = ResourceSpec { vcpus, memory_mb };
            assert!(spec.validate().is_ok(), "expected valid: {:?}", spec);
        }
    }

    #[test]
    fn test_rejected_pairs() {
        for (vcpus, memory_mb) in [
            (0.25, 4096),
            (0.5, 512),
            (0.5, 1536),
            (1.0, 1024),
            (2.0, 20480),
            (8.0, 18432),
            (16.0, 16384),
        ] {
            let spec = ResourceSpec { vcpus, memory_mb };
            assert!(spec.validate().is_err(), "expected invalid: {:?}", spec);
        }
    }

    #[test]
    fn test_unknown_vcpu_count_rejected() {
        let err = ResourceSpec { vcpus: 3.0, memory_mb: 4096 }.validate().unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("unsupported vCPU count"));
    }

    #[test]
    fn test_step_boundaries() {
        assert!(ResourceSpec { vcpus: 8.0, memory_mb: 20480 }.validate().is_ok());
        assert!(ResourceSpec { vcpus: 8.0, memory_mb: 20481 }.validate().is_err());
    }

    #[test]
    fn test_cpu_units() {
        assert_eq!(ResourceSpec { vcpus: 0.25, memory_mb: 512 }.cpu_units(), 256);
        assert_eq!(ResourceSpec { vcpus: 0.5, memory_mb: 1024 }.cpu_units(), 512);
        assert_eq!(ResourceSpec { vcpus: 4.0, memory_mb: 8192 }.cpu_units(), 4096);
    }
}
