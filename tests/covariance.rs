//! Covariance-grid precomputation feeding the vector-space linkages.

use isogloss::cluster::{
    AnalysisContext, ClusterAnalysis, ClusterCount, FuzzyCMeans, HierarchicalAnalysis, KMeans,
    Linkage, Termination,
};
use isogloss::distance::{
    CovarianceDistance, MapDistance, MapDistanceStrategy, OverlapDistance, SectorDistance,
};
use isogloss::geo::{prepare_covariance, GeoPoint, GridConfig, Location};
use isogloss::metrics::ari;
use isogloss::object::{ClusterObject, DensitySurface, ObjectId};
use isogloss::progress::CancelFlag;
use isogloss::runner::TaskRunner;
use isogloss::{Error, Result};
use std::sync::Arc;

const TRUTH: [usize; 6] = [0, 0, 0, 1, 1, 1];

fn locations() -> Vec<Location> {
    let mut locs = Vec::new();
    let mut id = 0;
    for i in 0..5 {
        for j in 0..5 {
            locs.push(Location::new(id, 48.0 + 0.25 * i as f64, 11.0 + 0.25 * j as f64));
            id += 1;
        }
    }
    locs
}

fn bump(lat: f64, lon: f64) -> Arc<dyn DensitySurface> {
    Arc::new(move |p: &GeoPoint| -> Result<f64> {
        let d2 = (p.lat - lat).powi(2) + (p.lon - lon).powi(2);
        Ok((-d2 / 0.02).exp() + 1e-6)
    })
}

fn maps(locs: &[Location]) -> Vec<Arc<ClusterObject>> {
    [
        (48.20, 11.20),
        (48.25, 11.20),
        (48.20, 11.25),
        (48.80, 11.80),
        (48.75, 11.80),
        (48.80, 11.75),
    ]
    .iter()
    .enumerate()
    .map(|(i, &(lat, lon))| {
        Arc::new(
            ClusterObject::new(ObjectId(i as u64), bump(lat, lon), locs)
                .unwrap()
                .with_label(format!("map {i}")),
        )
    })
    .collect()
}

#[test]
fn ward_and_centroid_on_covariance_samples() {
    let locs = locations();
    let objs = maps(&locs);
    let runner = Arc::new(TaskRunner::with_threads(4));
    let progress = CancelFlag::new();
    let grid = prepare_covariance(
        &locs,
        &objs,
        &GridConfig::default().with_cells_per_side(8),
        &runner,
        &progress,
    )
    .unwrap();
    assert_eq!(progress.total(), grid.len() + objs.len());
    assert_eq!(progress.current(), progress.total());
    assert!(objs.iter().all(|o| o.cached_covariance().is_some()));

    let strategy: Arc<dyn MapDistanceStrategy> =
        Arc::new(MapDistance::from(CovarianceDistance::new(grid)));
    let ctx = AnalysisContext::new(strategy).with_runner(runner);
    for linkage in [Linkage::Ward, Linkage::Centroid, Linkage::Average] {
        let r = HierarchicalAnalysis::new(ctx.clone(), linkage, Termination::cluster_count(2))
            .analyze(&objs)
            .unwrap();
        assert_eq!(r.labels(), TRUTH, "{linkage:?}");
    }
}

#[test]
fn maps_without_surface_cannot_use_covariance() {
    let locs = locations();
    let runner = TaskRunner::with_threads(2);
    let objs = maps(&locs);
    let config = GridConfig::default().with_cells_per_side(6);
    let grid = prepare_covariance(&locs, &objs, &config, &runner, &CancelFlag::new()).unwrap();
    let bare = ClusterObject::from_densities(ObjectId(50), objs[0].densities().to_vec());
    let err = CovarianceDistance::new(grid).distance(&objs[0], &bare).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { name: "surface", .. }));
}

#[test]
fn degenerate_locations_fail_fast() {
    let objs: Vec<Arc<ClusterObject>> = Vec::new();
    let runner = TaskRunner::with_threads(2);
    let config = GridConfig::default();
    let err = prepare_covariance(&[], &objs, &config, &runner, &CancelFlag::new()).unwrap_err();
    assert!(matches!(err, Error::DegenerateGeometry(_)));
}

#[test]
fn location_strategies_group_the_same_maps() {
    let locs = locations();
    let objs = maps(&locs);
    let strategies: Vec<Arc<dyn MapDistanceStrategy>> = vec![
        Arc::new(MapDistance::from(OverlapDistance::new())),
        Arc::new(MapDistance::from(SectorDistance::new(&locs, 8).unwrap())),
    ];
    for strategy in strategies {
        let name = strategy.key().name();
        let ctx = AnalysisContext::new(strategy).with_runner(Arc::new(TaskRunner::with_threads(3)));
        let two = Termination::cluster_count(2);
        let r = HierarchicalAnalysis::new(ctx.clone(), Linkage::Average, two)
            .analyze(&objs)
            .unwrap();
        assert_eq!(r.labels(), TRUTH, "{name}");

        // Relational partitions run on the same non-Euclidean distances.
        for seed in 0..5 {
            let k = KMeans::new(ctx.clone(), ClusterCount::fixed(2))
                .with_seed(seed)
                .analyze(&objs)
                .unwrap();
            assert!(k.converged(), "{name} k-means seed {seed}");
            assert!((ari(&k.labels(), &TRUTH) - 1.0).abs() < 1e-12, "{name} k-means seed {seed}");

            let f = FuzzyCMeans::new(ctx.clone(), ClusterCount::fixed(2))
                .with_seed(seed)
                .analyze(&objs)
                .unwrap();
            let hard = f.harden().labels();
            assert!((ari(&hard, &TRUTH) - 1.0).abs() < 1e-12, "{name} fuzzy seed {seed}");
        }
    }
}
