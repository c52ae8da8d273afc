use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    territory::Territory,
    world::{World, YearLedger},
};

const RELATIVE_TOLERANCE: f64 = 1e-9;

/// Audits the staged year: every person in a `year + 1` slot must be
/// explained by a retained, placed or returned flow.
pub struct BookkeepingSystem;

impl BookkeepingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BookkeepingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for BookkeepingSystem {
    fn name(&self) -> &str {
        "bookkeeping"
    }

    fn run(&mut self, ctx: &SystemContext, world: &mut World) -> Result<()> {
        let flows = world.bookkeeping.pending.take().unwrap_or_default();
        let total_population: f64 = world
            .territories()
            .map(Territory::staged_total_population)
            .sum();
        let total_water: f64 = world
            .territories()
            .filter_map(|territory| territory.water().staged())
            .sum();

        let migrant_truncation =
            (flows.departed - flows.placed - flows.unplaced - flows.returned).max(0.0);
        let residual = total_population - (flows.retained + flows.placed + flows.returned);
        if residual.abs() > RELATIVE_TOLERANCE * total_population.max(1.0) {
            tracing::warn!(
                year = ctx.year + 1,
                residual,
                total_population,
                "population does not match recorded flows"
            );
        }

        tracing::info!(
            scenario = ctx.scenario_name,
            year = ctx.year + 1,
            total_population,
            deficit_territories = flows.deficit_territories,
            departed = flows.departed,
            unplaced = flows.unplaced,
            "year complete"
        );

        world.bookkeeping.ledger.push(YearLedger {
            year: ctx.year + 1,
            total_population,
            total_water,
            flows,
            migrant_truncation,
            residual,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Rounding, TransitionPolicy};
    use crate::systems::MigrationSystem;
    use crate::territory::TerritorySpec;
    use crate::world::WorldBuilder;

    fn run_year(world: &mut World, policy: TransitionPolicy) {
        let ctx = SystemContext {
            year: world.year(),
            scenario_name: "ledger",
        };
        MigrationSystem::new(policy).run(&ctx, world).unwrap();
        BookkeepingSystem::new().run(&ctx, world).unwrap();
        world.advance_year().unwrap();
    }

    fn world() -> World {
        WorldBuilder::new(2)
            .territory(TerritorySpec::new("dry", 30.0, 100.0))
            .territory(TerritorySpec::new("east", 1_000.0, 0.0))
            .territory(TerritorySpec::new("west", 1_000.0, 0.0))
            .distance("dry", "east", 1.0)
            .distance("dry", "west", 2.0)
            .build()
            .unwrap()
    }

    #[test]
    fn ledger_balances_flows() {
        let mut world = world();
        run_year(&mut world, TransitionPolicy::default());

        let entry = &world.ledger()[0];
        assert_eq!(entry.year, 1);
        assert_eq!(entry.flows.departed, 70.0);
        assert!((entry.flows.placed - 70.0).abs() < 1e-9);
        assert!(entry.residual.abs() < 1e-9);
        assert!(entry.migrant_truncation < 1e-9);
        assert!((entry.total_population - 100.0).abs() < 1e-9);
        assert_eq!(entry.total_water, 2_030.0);
    }

    #[test]
    fn whole_shares_show_up_as_migrant_truncation() {
        let mut world = world();
        let policy = TransitionPolicy {
            rounding: Rounding::WholeAll,
            ..TransitionPolicy::default()
        };
        run_year(&mut world, policy);

        // 70 split 2:1 -> 46.67 and 23.33, truncated to 46 and 23.
        let entry = &world.ledger()[0];
        assert_eq!(entry.flows.placed, 69.0);
        assert!((entry.migrant_truncation - 1.0).abs() < 1e-9);
        assert!(entry.residual.abs() < 1e-9);
        assert_eq!(entry.total_population, 99.0);
    }
}
