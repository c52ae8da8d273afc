use std::path::PathBuf;

use exodus::{
    engine::{EngineBuilder, EngineSettings},
    migration,
    report::{presentation_table, Grouping},
    scenario::ScenarioLoader,
    TerritoryId,
};

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from("scenarios").join(format!("{name}.yaml"))
}

fn build_engine(name: &str, snapshot_dir: PathBuf, snapshot_interval: usize) -> EngineBuilder {
    let scenario = scenario_loader().load(scenario_path(name)).unwrap();
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        snapshot_interval_years: snapshot_interval,
        snapshot_dir,
    };
    EngineBuilder::new(settings).with_standard_systems(scenario.policy)
}

#[test]
fn scenario_loader_reads_fixtures() {
    let loader = scenario_loader();
    let scenario = loader.load(scenario_path("two_regions")).expect("scenario parses");
    assert_eq!(scenario.name, "two_regions");
    assert_eq!(scenario.territories.len(), 2);
    assert_eq!(scenario.total_population(), 200_000.0);

    let sahel = loader.load(scenario_path("sahel_drought")).unwrap();
    let world = sahel.build_world(sahel.years(None)).unwrap();
    assert_eq!(world.territory_ids().len(), 6);
    assert_eq!(world.distances().len(), 15);
}

#[test]
fn missing_scenario_reports_path() {
    let err = scenario_loader()
        .load(scenario_path("does_not_exist"))
        .unwrap_err();
    assert!(format!("{err:#}").contains("does_not_exist.yaml"));
}

#[test]
fn deficit_migrates_towards_surplus() {
    let scenario = scenario_loader().load(scenario_path("two_regions")).unwrap();
    let mut world = scenario.build_world(1).unwrap();
    let europe = TerritoryId::from("europe");
    let africa = TerritoryId::from("africa");

    let found = migration::candidates(0, &africa, &world).unwrap();
    assert_eq!(found.len(), 1);
    // (1_000_000 - 5 * 100_000) / 5 spare people over a distance of 1
    assert_eq!(found[0].weight, 100_000.0);

    let mut engine = build_engine("two_regions", PathBuf::from("unused"), 0).build();
    engine.run(&mut world, 1).unwrap();

    let a = world.territory(&africa).unwrap();
    let e = world.territory(&europe).unwrap();
    let departed = 100_000.0 - a.population(&africa, 1).unwrap();
    assert!(departed > 0.0);
    assert!((e.population(&africa, 1).unwrap() - departed).abs() < 1e-6);
    assert_eq!(e.population(&europe, 1), Some(101_000.0));
    assert!(
        (e.total_population(1).unwrap() - (101_000.0 + departed)).abs() < 1e-6,
        "europe holds its own grown population plus africa's migrants"
    );
    assert!(world.unplaced().is_empty());
}

#[test]
fn engine_runs_deterministically() {
    let scenario = scenario_loader().load(scenario_path("sahel_drought")).unwrap();
    let years = scenario.years(None);

    let mut world_a = scenario.build_world(years).unwrap();
    build_engine("sahel_drought", PathBuf::new(), 0)
        .build()
        .run(&mut world_a, years)
        .unwrap();

    let mut world_b = scenario.build_world(years).unwrap();
    build_engine("sahel_drought", PathBuf::new(), 0)
        .build()
        .run(&mut world_b, years)
        .unwrap();

    assert_eq!(world_a.total_population(years), world_b.total_population(years));
    assert_eq!(world_a.ledger(), world_b.ledger());
}

#[test]
fn sahel_ledger_balances_every_year() {
    let scenario = scenario_loader().load(scenario_path("sahel_drought")).unwrap();
    let years = scenario.years(None);
    let mut world = scenario.build_world(years).unwrap();
    build_engine("sahel_drought", PathBuf::new(), 0)
        .build()
        .run(&mut world, years)
        .unwrap();

    assert_eq!(world.ledger().len(), years);
    for entry in world.ledger() {
        assert!(
            entry.residual.abs() <= 1e-6 * entry.total_population,
            "year {} residual {}",
            entry.year,
            entry.residual
        );
        assert!(entry.migrant_truncation.abs() < 1e-3);
    }
    assert!(world.ledger().iter().any(|entry| entry.flows.departed > 0.0));

    // Sahel people end up abroad.
    let mali = TerritoryId::from("mali");
    let abroad: f64 = world
        .territories()
        .filter(|t| t.id() != &mali)
        .filter_map(|t| t.population(&mali, years))
        .sum();
    assert!(abroad > 1_000_000.0);
}

#[test]
fn engine_emits_snapshots() {
    let temp_dir = tempfile::tempdir().unwrap();
    let snapshot_dir = temp_dir.path().join("snaps");
    let scenario = scenario_loader().load(scenario_path("sahel_drought")).unwrap();
    let mut world = scenario.build_world(10).unwrap();
    let mut engine = build_engine("sahel_drought", snapshot_dir.clone(), 5).build();
    engine.run(&mut world, 10).unwrap();

    let expected = snapshot_dir.join("sahel_drought").join("year_0005.json");
    assert!(
        expected.exists(),
        "expected snapshot {} to exist",
        expected.display()
    );
    assert!(snapshot_dir.join("sahel_drought").join("year_0010.json").exists());
    assert!(!snapshot_dir.join("sahel_drought").join("year_0004.json").exists());

    let data = std::fs::read_to_string(expected).unwrap();
    assert!(
        data.contains("\"scenario\": \"sahel_drought\""),
        "snapshot should contain scenario metadata"
    );
}

#[test]
fn presentation_table_covers_every_year() {
    let scenario = scenario_loader().load(scenario_path("two_regions")).unwrap();
    let mut world = scenario.build_world(3).unwrap();
    build_engine("two_regions", PathBuf::new(), 0)
        .build()
        .run(&mut world, 3)
        .unwrap();

    let rows = presentation_table(&world, Grouping::ByRegion);
    for year in 0..=3 {
        assert!(rows.iter().any(|r| r.year == year && r.name == "europe"));
    }
    assert!(rows
        .iter()
        .any(|r| r.name == "europe" && r.origin == "Africa" && r.year == 3));
    let year_zero: Vec<_> = rows.iter().filter(|r| r.year == 0).collect();
    assert_eq!(year_zero.len(), 2);
    assert!(year_zero
        .iter()
        .any(|r| r.name == "europe" && r.origin == "Europe"));
    assert!(year_zero
        .iter()
        .any(|r| r.name == "africa" && r.origin == "Africa"));
}
