//! Density-adaptive spatial zoning.
//!
//! The linking radius is the median distance from each waypoint to its k-th
//! nearest neighbour, scaled by a multiplier. Neighbours come from an R-tree
//! over locally projected points. Waypoints within that radius
//! of each other are merged through a union-find over a uniform grid whose
//! cells are one radius wide, so each point is only compared with the nine
//! cells around it.

use std::collections::HashMap;

use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::{LocalProjection, haversine_meters};
use crate::model::{FixedDays, Waypoint, Zone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoningOptions {
    /// Neighbour rank used for the density estimate.
    pub k_nearest: usize,
    /// Scale applied to the median k-th neighbour distance.
    pub radius_multiplier: f64,
    /// Floor for the radius, so coincident inputs still produce a grid.
    pub min_radius_meters: f64,
}

impl Default for ZoningOptions {
    fn default() -> Self {
        Self {
            k_nearest: 3,
            radius_multiplier: 1.2,
            min_radius_meters: 1.0,
        }
    }
}

/// Median k-th nearest neighbour distance times the multiplier, in meters.
pub fn estimate_radius(waypoints: &[Waypoint], options: &ZoningOptions) -> f64 {
    let n = waypoints.len();
    if n < 2 {
        return options.min_radius_meters;
    }
    let k = options.k_nearest.clamp(1, n - 1);

    let projection = LocalProjection::around(waypoints.iter().map(|w| &w.coordinate));
    let points: Vec<[f64; 2]> = waypoints
        .iter()
        .map(|w| {
            let (x, y) = projection.project(w.coordinate);
            [x, y]
        })
        .collect();
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, point)| GeomWithData::new(*point, i))
            .collect(),
    );

    let mut kth: Vec<f64> = points
        .iter()
        .enumerate()
        .filter_map(|(i, point)| {
            tree.nearest_neighbor_iter(point)
                .filter(|neighbour| neighbour.data != i)
                .nth(k - 1)
                .map(|neighbour| haversine_meters(waypoints[i].coordinate, waypoints[neighbour.data].coordinate))
        })
        .collect();
    if kth.is_empty() {
        return options.min_radius_meters;
    }

    kth.sort_by(f64::total_cmp);
    let mid = kth.len() / 2;
    let median = if kth.len() % 2 == 0 {
        (kth[mid - 1] + kth[mid]) / 2.0
    } else {
        kth[mid]
    };

    (median * options.radius_multiplier).max(options.min_radius_meters)
}

/// Partitions `waypoints` into connected components under the estimated
/// radius. Every waypoint lands in exactly one zone; isolated points become
/// singleton zones. Zones are ordered by their first member's input position.
pub fn build_zones(waypoints: &[Waypoint], fixed_days: &FixedDays, options: &ZoningOptions) -> Vec<Zone> {
    if waypoints.is_empty() {
        return Vec::new();
    }

    let radius = estimate_radius(waypoints, options);
    let projection = LocalProjection::around(waypoints.iter().map(|w| &w.coordinate));

    let cells: Vec<(i64, i64)> = waypoints
        .iter()
        .map(|w| {
            let (x, y) = projection.project(w.coordinate);
            ((x / radius).floor() as i64, (y / radius).floor() as i64)
        })
        .collect();

    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, cell) in cells.iter().enumerate() {
        grid.entry(*cell).or_default().push(i);
    }

    let mut sets = DisjointSet::new(waypoints.len());
    for (i, &(cx, cy)) in cells.iter().enumerate() {
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(bucket) = grid.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &j in bucket {
                    if j > i
                        && haversine_meters(waypoints[i].coordinate, waypoints[j].coordinate) <= radius
                    {
                        sets.union(i, j);
                    }
                }
            }
        }
    }

    let mut component_of_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<&Waypoint>> = Vec::new();
    for (i, waypoint) in waypoints.iter().enumerate() {
        let root = sets.find(i);
        let slot = *component_of_root.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[slot].push(waypoint);
    }

    debug!(
        radius_m = radius,
        waypoints = waypoints.len(),
        zones = components.len(),
        "built zones"
    );

    components
        .iter()
        .enumerate()
        .map(|(i, members)| Zone::from_members(format!("zone-{i}"), members, fixed_days))
        .collect()
}

/// Union-find with path halving and union by size.
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}
