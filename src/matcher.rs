//! Simulated-hit to reconstructed-cluster matching.
//!
//! A reference (the strip fired by a simulated hit) matches the first
//! candidate cluster whose strip range `[first, first + size - 1]` contains it.
//! Size-1 clusters therefore match on strip equality. When nothing matches,
//! the candidate with the closest range boundary is reported with a signed
//! distance `boundary - reference`: positive if the cluster lies at higher
//! strip numbers, negative if lower. Ties go to the earliest candidate.
//!
//! Overlapping candidates are not resolved; scan order decides.

use nalgebra::Vector2;

use crate::event::ReconstructedCluster;
use crate::LocalPoint;

/// What a candidate set is matched against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    pub channel: i32,
    /// Local position of the simulated hit, used for residuals and pulls.
    pub local: Option<LocalPoint>,
}

/// Position comparison of a matched pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enrichment {
    /// cluster − reference, per local coordinate.
    pub residual: Vector2<f64>,
    /// residual / σ, per local coordinate. `None` without a usable covariance.
    pub pull: Option<Vector2<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestCandidate {
    pub index: usize,
    /// Signed strip distance from the reference to the nearest boundary. Never zero.
    pub distance: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchResult<'a> {
    Matched {
        index: usize,
        cluster: &'a ReconstructedCluster,
        enrichment: Option<Enrichment>,
    },
    NoMatch {
        /// `None` only when there were no candidates at all.
        closest: Option<ClosestCandidate>,
    },
}

impl MatchResult<'_> {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Signed distance from `channel` to the nearer boundary of `cluster`.
fn boundary_distance(cluster: &ReconstructedCluster, channel: i32) -> i32 {
    let to_first = cluster.first_channel - channel;
    let to_last = cluster.last_channel() - channel;
    if to_first.abs() <= to_last.abs() {
        to_first
    } else {
        to_last
    }
}

fn enrich(reference: &Reference, cluster: &ReconstructedCluster) -> Option<Enrichment> {
    let sim = reference.local?;
    let rec = cluster.local?;
    let residual = rec - sim;
    let pull = cluster.position_error.and_then(|cov| {
        let (vx, vy) = (cov[(0, 0)], cov[(1, 1)]);
        (vx > 0.0 && vy > 0.0).then(|| Vector2::new(residual.x / vx.sqrt(), residual.y / vy.sqrt()))
    });
    Some(Enrichment { residual, pull })
}

/// Match a reference against candidates sorted by first channel.
pub fn match_clusters<'a>(
    reference: &Reference,
    candidates: &'a [ReconstructedCluster],
) -> MatchResult<'a> {
    let mut closest: Option<ClosestCandidate> = None;
    for (index, cluster) in candidates.iter().enumerate() {
        if cluster.contains(reference.channel) {
            return MatchResult::Matched {
                index,
                cluster,
                enrichment: enrich(reference, cluster),
            };
        }
        let distance = boundary_distance(cluster, reference.channel);
        if closest.map_or(true, |c| distance.abs() < c.distance.abs()) {
            closest = Some(ClosestCandidate { index, distance });
        }
    }
    MatchResult::NoMatch { closest }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detid::GemDetId;
    use approx::assert_relative_eq;
    use nalgebra::Matrix2;

    fn id() -> GemDetId {
        GemDetId::new(1, 1, 1, 1, 1).unwrap()
    }

    fn cluster(first: i32, size: u32) -> ReconstructedCluster {
        ReconstructedCluster {
            size,
            ..ReconstructedCluster::digi(id(), first)
        }
    }

    fn at(channel: i32) -> Reference {
        Reference { channel, local: None }
    }

    #[test]
    fn test_single_strip_is_equality() {
        let c = [cluster(17, 1)];
        assert!(match_clusters(&at(17), &c).is_matched());
        assert!(!match_clusters(&at(16), &c).is_matched());
        assert!(!match_clusters(&at(18), &c).is_matched());
    }

    #[test]
    fn test_range_containment_picks_containing_cluster() {
        let c = [cluster(3, 2), cluster(10, 4), cluster(30, 1)];
        for ch in 10..=13 {
            match match_clusters(&at(ch), &c) {
                MatchResult::Matched { index, cluster, .. } => {
                    assert_eq!(index, 1);
                    assert_eq!(cluster.first_channel, 10);
                }
                other => panic!("expected match at {ch}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_first_qualifying_wins_on_overlap() {
        let c = [cluster(5, 6), cluster(8, 2)];
        match match_clusters(&at(9), &c) {
            MatchResult::Matched { index, .. } => assert_eq!(index, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_signed_near_miss() {
        let c = [cluster(3, 2), cluster(20, 3)];
        // Ref 7: distances to [3,4] are -4/-3, to [20,22] are 13/15.
        assert_eq!(
            match_clusters(&at(7), &c),
            MatchResult::NoMatch {
                closest: Some(ClosestCandidate { index: 0, distance: -3 })
            }
        );
        // Ref 18: cluster above.
        assert_eq!(
            match_clusters(&at(18), &c),
            MatchResult::NoMatch {
                closest: Some(ClosestCandidate { index: 1, distance: 2 })
            }
        );
        // Ref 12: |4-12| = 8 ties with |20-12| = 8, earliest wins.
        assert_eq!(
            match_clusters(&at(12), &c),
            MatchResult::NoMatch {
                closest: Some(ClosestCandidate { index: 0, distance: -8 })
            }
        );
    }

    #[test]
    fn test_no_match_distance_is_never_zero() {
        let c = [cluster(4, 3), cluster(12, 1), cluster(40, 8)];
        for ch in 1..60 {
            if let MatchResult::NoMatch { closest } = match_clusters(&at(ch), &c) {
                let closest = closest.unwrap();
                assert_ne!(closest.distance, 0);
                let best = c
                    .iter()
                    .map(|k| (k.first_channel - ch).abs().min((k.last_channel() - ch).abs()))
                    .min()
                    .unwrap();
                assert_eq!(closest.distance.abs(), best);
            }
        }
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(
            match_clusters(&at(1), &[]),
            MatchResult::NoMatch { closest: None }
        );
    }

    #[test]
    fn test_enrichment() {
        let mut c = cluster(10, 2);
        c.local = Some(LocalPoint::new(1.3, -2.0));
        c.position_error = Some(Matrix2::new(0.04, 0.0, 0.0, 4.0));
        let reference = Reference {
            channel: 11,
            local: Some(LocalPoint::new(1.0, 0.0)),
        };
        let cand = [c.clone()];
        let MatchResult::Matched { enrichment, .. } = match_clusters(&reference, &cand) else {
            panic!("expected a match");
        };
        let e = enrichment.unwrap();
        assert_relative_eq!(e.residual.x, 0.3, epsilon = 1e-12);
        assert_relative_eq!(e.residual.y, -2.0, epsilon = 1e-12);
        let pull = e.pull.unwrap();
        assert_relative_eq!(pull.x, 1.5, epsilon = 1e-12);
        assert_relative_eq!(pull.y, -1.0, epsilon = 1e-12);

        // No covariance: residual only.
        c.position_error = None;
        let cand = [c.clone()];
        let MatchResult::Matched { enrichment, .. } = match_clusters(&reference, &cand) else {
            panic!("expected a match");
        };
        assert!(enrichment.unwrap().pull.is_none());

        // No reference position: no enrichment.
        let cand = [c];
        let MatchResult::Matched { enrichment, .. } = match_clusters(&at(11), &cand) else {
            panic!("expected a match");
        };
        assert!(enrichment.is_none());
    }
}
