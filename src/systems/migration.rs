use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    policy::TransitionPolicy,
    world::World,
};

/// Plans every territory's transition against the committed year, then
/// applies the whole batch into the next year's slots.
pub struct MigrationSystem {
    policy: TransitionPolicy,
}

impl MigrationSystem {
    pub fn new(policy: TransitionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TransitionPolicy {
        &self.policy
    }
}

impl Default for MigrationSystem {
    fn default() -> Self {
        Self::new(TransitionPolicy::default())
    }
}

impl System for MigrationSystem {
    fn name(&self) -> &str {
        "migration"
    }

    fn run(&mut self, ctx: &SystemContext, world: &mut World) -> Result<()> {
        let plan = world.plan_year(&self.policy)?;
        let summary = world.apply(&plan)?;
        if summary.departed > 0.0 {
            tracing::debug!(
                year = ctx.year,
                departed = summary.departed,
                placed = summary.placed,
                unplaced = summary.unplaced,
                returned = summary.returned,
                "migration applied"
            );
        }
        world.bookkeeping.pending = Some(summary);
        Ok(())
    }
}
