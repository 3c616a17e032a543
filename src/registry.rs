use indexmap::IndexMap;

use crate::config::SamplingPlan;
use crate::constants::strategies::{ATISE_TIME, NO_SAMPLING, TIME_AGNOSTIC, UNIFORM};
use crate::errors::SamplingError;
use crate::generator::{
    FullEnumeration, ModuloOffset, SampleGenerator, SharedAcrossBatch, TimeResample, Uniform,
};

/// Closed set of sampling strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Independent uniform draws.
    Uniform,
    /// Non-zero modulo offsets from the original, positive reserved in column 0.
    ModuloOffset,
    /// Uniform timestamps, positives in the leading rows.
    TimeResample,
    /// Whole vocabulary per fact.
    FullEnumeration,
}

impl StrategyKind {
    /// Registered configuration name.
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Uniform => UNIFORM,
            StrategyKind::ModuloOffset => TIME_AGNOSTIC,
            StrategyKind::TimeResample => ATISE_TIME,
            StrategyKind::FullEnumeration => NO_SAMPLING,
        }
    }

    pub(crate) fn build(self) -> Box<dyn SampleGenerator> {
        match self {
            StrategyKind::Uniform => Box::new(Uniform),
            StrategyKind::ModuloOffset => Box::new(ModuloOffset),
            StrategyKind::TimeResample => Box::new(TimeResample),
            StrategyKind::FullEnumeration => Box::new(FullEnumeration),
        }
    }
}

/// Name → strategy table, listed in registration order.
#[derive(Clone, Debug)]
pub struct SamplerRegistry {
    strategies: IndexMap<&'static str, StrategyKind>,
}

impl Default for SamplerRegistry {
    fn default() -> Self {
        let mut strategies = IndexMap::new();
        for kind in [
            StrategyKind::Uniform,
            StrategyKind::ModuloOffset,
            StrategyKind::TimeResample,
            StrategyKind::FullEnumeration,
        ] {
            strategies.insert(kind.name(), kind);
        }
        Self { strategies }
    }
}

impl SamplerRegistry {
    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.keys().copied().collect()
    }

    /// Strategy registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<StrategyKind, SamplingError> {
        self.strategies
            .get(name)
            .copied()
            .ok_or_else(|| SamplingError::UnknownStrategy {
                name: name.to_string(),
                registered: self.names().join(", "),
            })
    }

    /// Generator for a validated plan, wrapped for broadcasting when `shared` is set.
    pub fn create(&self, plan: &SamplingPlan) -> Result<Box<dyn SampleGenerator>, SamplingError> {
        let base = self.resolve(plan.strategy.name())?.build();
        if plan.shared {
            return Ok(Box::new(SharedAcrossBatch::new(base, plan.with_replacement)?));
        }
        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_registered_name() {
        let registry = SamplerRegistry::default();
        for name in registry.names() {
            assert_eq!(registry.resolve(name).expect("registered").name(), name);
        }
        assert_eq!(
            registry.names(),
            vec!["uniform", "time_agnostic", "atise_time", "no_sampling"]
        );
    }

    #[test]
    fn unknown_name_lists_registered_names() {
        let err = SamplerRegistry::default()
            .resolve("bogus")
            .expect_err("unregistered");
        assert!(err.is_configuration());
        let message = err.to_string();
        assert!(message.contains("'bogus'"));
        assert!(message.contains("uniform, time_agnostic, atise_time, no_sampling"));
    }
}
