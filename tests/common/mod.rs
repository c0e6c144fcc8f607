//! Shared builders for the integration tests: a nominal geometry and seeded
//! synthetic events.

#![allow(dead_code)]

use gemval::{
    ClusterCollection, EventData, GemDetId, GeometryService, LocalPoint, PlanarGeometry,
    ReconstructedCluster, RingSpec, SimulatedHit, SimulatedTrack,
};
use nalgebra::{Matrix2, Vector3};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use rand_distr::{Distribution, Normal};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

/// GE1/1 and GE2/1 rings in both endcaps.
pub fn nominal_geometry() -> PlanarGeometry {
    PlanarGeometry::from_rings(&[RingSpec::ge11(), RingSpec::ge21()])
        .expect("nominal rings are valid")
}

/// Knobs for the synthetic event source.
pub struct EventGenConfig {
    /// Muon tracks per event. Each leaves one hit in both layers of one chamber roll.
    pub muons_per_event: usize,
    /// Non-muon hits per event (filtered out by default).
    pub others_per_event: usize,
    /// Probability that a muon hit produces a cluster covering its strip, per layer.
    pub detection_efficiency: f64,
    /// Random noise clusters per event.
    pub noise_clusters: usize,
    /// Local position resolution of clusters (cm).
    pub resolution: f64,
}

impl Default for EventGenConfig {
    fn default() -> Self {
        Self {
            muons_per_event: 4,
            others_per_event: 1,
            detection_efficiency: 0.9,
            noise_clusters: 2,
            resolution: 0.03,
        }
    }
}

fn random_hit(rng: &mut StdRng, geom: &PlanarGeometry, ids: &[GemDetId], pdg: i32) -> SimulatedHit {
    let id = ids[(rng.random::<f64>() * ids.len() as f64) as usize % ids.len()];
    let roll = geom.roll(&id).expect("id comes from the geometry");
    let half_width = 0.5 * roll.num_strips as f64 * roll.pitch;
    let x = (rng.random::<f64>() * 2.0 - 1.0) * 0.95 * half_width;
    let y = (rng.random::<f64>() * 2.0 - 1.0) * 5.0;
    SimulatedHit {
        det_id: id,
        local: LocalPoint::new(x, y),
        particle_type: pdg,
        energy_loss: 1.0e-6 + rng.random::<f64>() * 3.0e-6,
        tof: 18.5 + rng.random::<f64>() * 3.0 + 8.0 * (id.station() - 1) as f64,
        track_id: None,
    }
}

/// The same roll position in the other layer of the chamber.
fn other_layer(id: &GemDetId) -> GemDetId {
    GemDetId::new(id.region(), id.station(), 3 - id.layer(), id.chamber(), id.roll())
        .expect("layer 1 and 2 are both valid")
}

/// Seeded stream of synthetic events over `geom`.
pub fn generate_events(
    geom: &PlanarGeometry,
    n_events: usize,
    seed: u64,
    config: &EventGenConfig,
) -> Vec<EventData> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, config.resolution).expect("valid resolution");
    let ids = geom.det_ids();
    let variance = config.resolution * config.resolution;

    (0..n_events)
        .map(|_| {
            let mut sim_hits = Vec::new();
            let mut clusters = ClusterCollection::new();
            let mut tracks = Vec::new();

            for track_id in 0..config.muons_per_event as u32 {
                let pdg = if rng.random::<f64>() < 0.5 { 13 } else { -13 };
                let first = SimulatedHit {
                    track_id: Some(track_id),
                    ..random_hit(&mut rng, geom, &ids, pdg)
                };
                let second = SimulatedHit {
                    det_id: other_layer(&first.det_id),
                    ..first.clone()
                };
                let pt = 5.0 + rng.random::<f64>() * 20.0;
                let phi = rng.random::<f64>() * std::f64::consts::TAU;
                tracks.push(SimulatedTrack {
                    track_id,
                    particle_type: pdg,
                    momentum: Vector3::new(pt * phi.cos(), pt * phi.sin(), 3.0 * pt),
                });

                for hit in [first, second] {
                    if rng.random::<f64>() >= config.detection_efficiency {
                        sim_hits.push(hit);
                        continue;
                    }
                    let strip = geom
                        .fired_channel(&hit.det_id, &hit.local)
                        .expect("hit lies on a known roll");
                    let size = 1 + (rng.random::<f64>() * 3.0) as u32;
                    let offset = (rng.random::<f64>() * size as f64) as i32;
                    let first_channel = (strip - offset).max(1);
                    let local = LocalPoint::new(
                        hit.local.x + noise.sample(&mut rng),
                        hit.local.y + noise.sample(&mut rng),
                    );
                    clusters.push(ReconstructedCluster {
                        det_id: hit.det_id,
                        first_channel,
                        size,
                        local: Some(local),
                        position_error: Some(Matrix2::new(variance, 0.0, 0.0, variance)),
                    });
                    sim_hits.push(hit);
                }
            }

            for _ in 0..config.others_per_event {
                sim_hits.push(random_hit(&mut rng, geom, &ids, 11));
            }

            for _ in 0..config.noise_clusters {
                let id = ids[(rng.random::<f64>() * ids.len() as f64) as usize % ids.len()];
                let strip = 1 + (rng.random::<f64>() * 300.0) as i32;
                clusters.push(ReconstructedCluster::digi(id, strip));
            }

            EventData {
                sim_hits,
                clusters,
                tracks,
            }
        })
        .collect()
}
