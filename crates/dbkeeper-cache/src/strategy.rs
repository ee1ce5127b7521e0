//! Caching strategies

use std::{fmt, str::FromStr};

use dbkeeper_store::ResourceKind;
use serde::{Deserialize, Serialize};

use crate::CacheError;

/// Policy deciding whether and when kinds are mirrored
///
/// Fixed when the cache layer is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Never mirror; every read goes to the store
    NoCache,
    /// Mirror a kind once something reads it
    #[default]
    Lazy,
    /// Prewarm the essential kinds, mirror the rest on demand
    Selective,
    /// Same runtime behaviour as lazy; states that nothing is ever prewarmed
    OnDemandSync,
}

impl CacheStrategy {
    /// Whether reads consult the registry at all
    pub fn uses_cache(self) -> bool {
        !matches!(self, CacheStrategy::NoCache)
    }

    /// Kinds to enqueue when the cache layer starts
    pub fn prewarm_kinds(self, essential: &[ResourceKind]) -> Vec<ResourceKind> {
        match self {
            CacheStrategy::Selective => essential.to_vec(),
            CacheStrategy::NoCache | CacheStrategy::Lazy | CacheStrategy::OnDemandSync => {
                Vec::new()
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CacheStrategy::NoCache => "no-cache",
            CacheStrategy::Lazy => "lazy",
            CacheStrategy::Selective => "selective",
            CacheStrategy::OnDemandSync => "on-demand-sync",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "no-cache" | "none" | "disabled" => Ok(CacheStrategy::NoCache),
            "lazy" => Ok(CacheStrategy::Lazy),
            "selective" => Ok(CacheStrategy::Selective),
            "on-demand-sync" | "on-demand" => Ok(CacheStrategy::OnDemandSync),
            other => Err(CacheError::config(format!("unknown cache strategy: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use dbkeeper_store::kinds::{BACKUP, CLUSTER};

    use super::*;

    #[test]
    fn test_only_selective_prewarms() {
        let essential = vec![CLUSTER, BACKUP];
        assert_eq!(CacheStrategy::Selective.prewarm_kinds(&essential), essential);
        assert!(CacheStrategy::Lazy.prewarm_kinds(&essential).is_empty());
        assert!(CacheStrategy::OnDemandSync.prewarm_kinds(&essential).is_empty());
        assert!(CacheStrategy::NoCache.prewarm_kinds(&essential).is_empty());
    }

    #[test]
    fn test_uses_cache() {
        assert!(!CacheStrategy::NoCache.uses_cache());
        assert!(CacheStrategy::Lazy.uses_cache());
        assert!(CacheStrategy::Selective.uses_cache());
        assert!(CacheStrategy::OnDemandSync.uses_cache());
    }

    #[test]
    fn test_parse_and_display() {
        for strategy in [
            CacheStrategy::NoCache,
            CacheStrategy::Lazy,
            CacheStrategy::Selective,
            CacheStrategy::OnDemandSync,
        ] {
            assert_eq!(strategy.to_string().parse::<CacheStrategy>().unwrap(), strategy);
        }
        assert_eq!("ON_DEMAND".parse::<CacheStrategy>().unwrap(), CacheStrategy::OnDemandSync);
        assert!("eager".parse::<CacheStrategy>().is_err());
    }
}
