//! Geographic clustering of concurrent signals.
//!
//! Pure function over a snapshot: pairwise haversine edges, union-find
//! connected components. O(n²) on non-terminal signals, acceptable for a
//! regional, ephemeral-per-call dataset; a spatial index would change the
//! cost, not the semantics.

use lifeline_common::{haversine_km, Priority, SignalCluster, SosSignal};

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Cluster non-terminal signals within `radius_km` of each other into
/// connected components. Resolved and false_alarm signals are not eligible.
/// Reachability is transitive: A near B and B near C puts all three in one
/// cluster even when A and C are farther apart than the radius.
pub fn cluster_signals(signals: &[SosSignal], radius_km: f64) -> Vec<SignalCluster> {
    let active: Vec<&SosSignal> = signals.iter().filter(|s| s.is_active()).collect();
    if active.is_empty() {
        return Vec::new();
    }

    let mut uf = UnionFind::new(active.len());
    for i in 0..active.len() {
        for j in (i + 1)..active.len() {
            let d = haversine_km(
                active[i].location.lat,
                active[i].location.lng,
                active[j].location.lat,
                active[j].location.lng,
            );
            if d <= radius_km {
                uf.union(i, j);
            }
        }
    }

    let mut components: std::collections::HashMap<usize, Vec<&SosSignal>> =
        std::collections::HashMap::new();
    for (i, signal) in active.iter().enumerate() {
        components.entry(uf.find(i)).or_default().push(signal);
    }

    let mut clusters: Vec<SignalCluster> = components
        .into_values()
        .map(|members| {
            let n = members.len() as f64;
            let centroid_lat = members.iter().map(|s| s.location.lat).sum::<f64>() / n;
            let centroid_lng = members.iter().map(|s| s.location.lng).sum::<f64>() / n;
            let dominant_priority = members
                .iter()
                .map(|s| s.priority)
                .max()
                .unwrap_or(Priority::Low);
            SignalCluster {
                signal_ids: members.iter().map(|s| s.id).collect(),
                centroid_lat,
                centroid_lng,
                dominant_priority,
                member_count: members.len(),
            }
        })
        .collect();

    // Largest clusters first, deterministic enough for dispatch views.
    clusters.sort_by_key(|c| std::cmp::Reverse(c.member_count));
    clusters
}
