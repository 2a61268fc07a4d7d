//! Device enumeration seam
//!
//! USB enumeration lives outside the flashing core; anything that can list
//! target records plugs in here.

use crate::error::Result;
use crate::target::TargetRecord;

/// Source of target records
pub trait Enumerator: Send + Sync {
    /// Every target currently attached
    fn list_devices(&self) -> Result<Vec<TargetRecord>>;

    /// Targets with exactly this id
    fn find(&self, target_id: &str) -> Result<Vec<TargetRecord>> {
        Ok(self
            .list_devices()?
            .into_iter()
            .filter(|t| t.target_id == target_id)
            .collect())
    }
}

/// Enumerator that always reports the same list
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    targets: Vec<TargetRecord>,
}

impl StaticEnumerator {
    /// Wrap a fixed list
    pub fn new(targets: Vec<TargetRecord>) -> Self {
        Self { targets }
    }
}

impl Enumerator for StaticEnumerator {
    fn list_devices(&self) -> Result<Vec<TargetRecord>> {
        Ok(self.targets.clone())
    }
}
