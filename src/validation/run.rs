//! The per-run aggregation facade.
//!
//! Processing an event runs in two steps. Every fallible lookup (geometry,
//! occupancy bin, index handles) is resolved into a plan first; the plans are
//! then applied, and applying cannot fail.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::detid::{ComponentKey, GemDetId};
use crate::efficiency::EfficiencyEstimator;
use crate::error::{Result, ValidationError};
use crate::event::{EventData, ReconstructedCluster, SimulatedHit};
use crate::geometry::{GeometryService, GlobalCoordinates, StationLayout};
use crate::histogram::{Accumulator, Axis, Histogram1D, Histogram2D};
use crate::index::{AccumulatorHandle, AccumulatorIndex};
use crate::matcher::{match_clusters, ClosestCandidate, Enrichment, MatchResult, Reference};
use crate::occupancy::{detector_x_axis, detector_y_axis, strip_axis, zr_z_axis, OccupancyBin};
use crate::sink::Sink;
use crate::tag::AccumulatorTag;

use super::harvest::{harvest_index, HarvestSummary};
use super::snapshot::RunSnapshot;
use super::track::{LayerCombination, TrackLayers};
use super::{EventSummary, HitOutcome, RunPhase, RunStats, SkipReason, ValidationConfig};

fn h1(axis: Axis) -> Accumulator {
    Accumulator::H1(Histogram1D::new(axis))
}

fn h2(x: Axis, y: Axis) -> Accumulator {
    Accumulator::H2(Histogram2D::new(x, y))
}

/// Total and matched handles of the four occupancy pairs of one hit.
struct OccupancyHandles {
    eta: (AccumulatorHandle, AccumulatorHandle),
    phi: (AccumulatorHandle, AccumulatorHandle),
    det: (AccumulatorHandle, AccumulatorHandle),
    strip: (AccumulatorHandle, AccumulatorHandle),
}

// ── Per-event plans ─────────────────────────────────────────────────────────

enum HitPlan {
    Skip(SkipReason),
    Fill(HitFill),
}

/// Everything an accepted hit contributes, with all lookups already resolved.
struct HitFill {
    id: GemDetId,
    handles: OccupancyHandles,
    bin: OccupancyBin,
    sim: GlobalCoordinates,
    channel: i32,
    /// (time of flight, scaled energy loss) of a muon hit.
    muon: Option<(f64, f64)>,
    result: FillResult,
}

enum FillResult {
    Matched {
        cluster_index: usize,
        cluster_size: u32,
        enrichment: Option<Enrichment>,
        /// Global coordinates of the matched cluster, when it has a position.
        rec: Option<GlobalCoordinates>,
    },
    Unmatched {
        closest: Option<ClosestCandidate>,
    },
}

impl HitFill {
    fn is_matched(&self) -> bool {
        matches!(self.result, FillResult::Matched { .. })
    }

    fn outcome(&self) -> HitOutcome {
        match self.result {
            FillResult::Matched { cluster_index, .. } => HitOutcome::Matched { cluster_index },
            FillResult::Unmatched { closest } => HitOutcome::Unmatched { closest },
        }
    }
}

struct StationTrackFill {
    total: AccumulatorHandle,
    /// Matched handles in [`LayerCombination::ALL`] order.
    matched: [AccumulatorHandle; 4],
    found: [bool; 2],
}

struct TrackFill {
    abs_eta: f64,
    stations: Vec<StationTrackFill>,
}

/// One validation run over a fixed geometry.
pub struct ValidationRun<'g, G: GeometryService> {
    geometry: &'g G,
    config: ValidationConfig,
    estimator: EfficiencyEstimator,
    index: AccumulatorIndex,
    phase: RunPhase,
    stats: RunStats,
}

impl<'g, G: GeometryService> ValidationRun<'g, G> {
    /// Create a run in the booking phase. Fails with `InvalidConfig` or
    /// `InvalidConfidenceLevel` if the configuration cannot be booked.
    pub fn new(geometry: &'g G, config: ValidationConfig) -> Result<Self> {
        config.validate()?;
        let estimator = EfficiencyEstimator::new(config.confidence_level)?;
        Ok(Self {
            geometry,
            config,
            estimator,
            index: AccumulatorIndex::new(),
            phase: RunPhase::Booking,
            stats: RunStats::default(),
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn index(&self) -> &AccumulatorIndex {
        &self.index
    }

    /// Booked accumulator for (key, tag), if any.
    pub fn accumulator(&self, key: &ComponentKey, tag: AccumulatorTag) -> Option<&Accumulator> {
        self.index.lookup(key, tag).map(|h| self.index.get(h))
    }

    fn expect_phase(&self, expected: RunPhase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ValidationError::InvalidPhase {
                expected,
                found: self.phase,
            })
        }
    }

    // ── Booking ─────────────────────────────────────────────────────────────

    fn book_one(&mut self, key: ComponentKey, tag: AccumulatorTag, acc: Accumulator) -> Result<()> {
        self.index.get_or_create(key, tag, || acc)?;
        Ok(())
    }

    /// Book every accumulator for the keys the geometry enumerates, then seal the index.
    ///
    /// Nothing is sealed if booking fails; the run stays in [`RunPhase::Booking`].
    pub fn book(&mut self) -> Result<()> {
        self.expect_phase(RunPhase::Booking)?;

        let geometry = self.geometry;
        let roll_keys = geometry.enumerate_keys();
        let regions: BTreeSet<ComponentKey> = roll_keys.iter().map(|k| k.region_key()).collect();
        let stations: BTreeSet<ComponentKey> =
            roll_keys.iter().filter_map(|k| k.station_key()).collect();
        let layers: BTreeSet<ComponentKey> =
            roll_keys.iter().filter_map(|k| k.layer_key()).collect();

        let layout_of = |key: &ComponentKey| -> Option<StationLayout> {
            let [r, s, _, _] = key.components();
            geometry.station_layout(r, s)
        };
        let layouts: Vec<(ComponentKey, StationLayout)> = stations
            .iter()
            .filter_map(|k| {
                let layout = layout_of(k);
                if layout.is_none() {
                    warn!("No layout for station {}; its occupancy is not booked", k);
                }
                layout.map(|l| (*k, l))
            })
            .collect();

        for &region in &regions {
            let eta = self.config.eta.axis()?;
            self.book_one(region, AccumulatorTag::SimOccupancyEta, h1(eta.clone()))?;
            self.book_one(region, AccumulatorTag::MatchedOccupancyEta, h1(eta))?;
            self.book_one(region, AccumulatorTag::PullX, h1(self.config.pull.axis()?))?;
            self.book_one(region, AccumulatorTag::PullY, h1(self.config.pull.axis()?))?;

            let in_region: Vec<StationLayout> = layouts
                .iter()
                .filter(|(k, _)| k.region_id() == region.region_id())
                .map(|(_, l)| l.clone())
                .collect();
            if !in_region.is_empty() {
                let z = zr_z_axis(&in_region, self.config.zr_z_step)?;
                let r_lo = in_region.iter().map(|l| l.r_range.0).fold(f64::INFINITY, f64::min);
                let r_hi = in_region.iter().map(|l| l.r_range.1).fold(f64::NEG_INFINITY, f64::max);
                let r = Axis::uniform(self.config.zr_r_bins, r_lo, r_hi)?;
                self.book_one(region, AccumulatorTag::RecOccupancyZR, h2(z, r))?;
            }
        }

        for (station, layout) in &layouts {
            let phi = self.config.phi.axis()?;
            self.book_one(*station, AccumulatorTag::SimOccupancyPhi, h1(phi.clone()))?;
            self.book_one(*station, AccumulatorTag::MatchedOccupancyPhi, h1(phi))?;

            let (x, y) = (detector_x_axis(layout)?, detector_y_axis(layout)?);
            self.book_one(*station, AccumulatorTag::SimOccupancyDet, h2(x.clone(), y.clone()))?;
            self.book_one(*station, AccumulatorTag::MatchedOccupancyDet, h2(x, y))?;

            let [_, station_id, _, _] = station.components();
            if let Some((lo, hi)) = self.config.tof_range(station_id) {
                let tof = Axis::uniform(self.config.tof_bins, lo, hi)?;
                self.book_one(*station, AccumulatorTag::TofMuon, h1(tof))?;
            }
            self.book_one(*station, AccumulatorTag::EnergyLossMuon, h1(self.config.energy_loss.axis()?))?;

            if self.config.track_plots {
                let eta = self.config.track_eta.axis()?;
                self.book_one(*station, AccumulatorTag::TrackEta, h1(eta.clone()))?;
                for combination in LayerCombination::ALL {
                    self.book_one(*station, combination.tag(), h1(eta.clone()))?;
                }
            }
        }

        for key in &roll_keys {
            let Some(layout) = layout_of(key) else { continue };
            let strips = strip_axis(&layout)?;
            self.book_one(*key, AccumulatorTag::SimOccupancyStrip, h1(strips.clone()))?;
            self.book_one(*key, AccumulatorTag::MatchedOccupancyStrip, h1(strips))?;
        }

        if self.config.detail_plots {
            for &layer in &layers {
                let residual = self.config.residual.axis()?;
                self.book_one(layer, AccumulatorTag::ResidualX, h1(residual.clone()))?;
                self.book_one(layer, AccumulatorTag::ResidualY, h1(residual))?;
                self.book_one(layer, AccumulatorTag::PullX, h1(self.config.pull.axis()?))?;
                self.book_one(layer, AccumulatorTag::PullY, h1(self.config.pull.axis()?))?;
                self.book_one(layer, AccumulatorTag::ClusterSize, h1(self.config.cluster_size.axis()?))?;
                self.book_one(layer, AccumulatorTag::MatchDistance, h1(self.config.match_distance.axis()?))?;
                if let Some(layout) = layout_of(&layer) {
                    let r = layout.r_range.1;
                    let xy = Axis::uniform(self.config.xy_bins, -r, r)?;
                    self.book_one(layer, AccumulatorTag::RecOccupancyXY, h2(xy.clone(), xy))?;
                }
            }
        }

        info!(
            "Booked {} accumulators over {} regions, {} stations, {} layers, {} rolls",
            self.index.len(),
            regions.len(),
            stations.len(),
            layers.len(),
            roll_keys.len()
        );
        self.index.seal();
        self.phase = RunPhase::Processing;
        Ok(())
    }

    // ── Processing ──────────────────────────────────────────────────────────

    fn fill(&mut self, key: &ComponentKey, tag: AccumulatorTag, x: f64) {
        if let Some(h) = self.index.lookup(key, tag) {
            self.index.get_mut(h).fill(x);
        }
    }

    fn fill_2d(&mut self, key: &ComponentKey, tag: AccumulatorTag, x: f64, y: f64) {
        if let Some(h) = self.index.lookup(key, tag) {
            self.index.get_mut(h).fill_2d(x, y);
        }
    }

    fn occupancy_handles(&self, id: &GemDetId) -> Result<OccupancyHandles> {
        let pair = |key: ComponentKey, total: AccumulatorTag, matched: AccumulatorTag| {
            Ok::<_, ValidationError>((self.index.require(&key, total)?, self.index.require(&key, matched)?))
        };
        Ok(OccupancyHandles {
            eta: pair(
                id.region_key(),
                AccumulatorTag::SimOccupancyEta,
                AccumulatorTag::MatchedOccupancyEta,
            )?,
            phi: pair(
                id.station_key(),
                AccumulatorTag::SimOccupancyPhi,
                AccumulatorTag::MatchedOccupancyPhi,
            )?,
            det: pair(
                id.station_key(),
                AccumulatorTag::SimOccupancyDet,
                AccumulatorTag::MatchedOccupancyDet,
            )?,
            strip: pair(
                id.roll_key(),
                AccumulatorTag::SimOccupancyStrip,
                AccumulatorTag::MatchedOccupancyStrip,
            )?,
        })
    }

    /// Process every simulated hit and track of an event.
    ///
    /// The event is applied whole or not at all: if any hit fails a geometry
    /// lookup, the error is returned and no counter or statistic changes, so the
    /// host can skip the event and carry on.
    pub fn process_event(&mut self, event: &EventData) -> Result<EventSummary> {
        self.expect_phase(RunPhase::Processing)?;
        let plans = event
            .sim_hits
            .iter()
            .map(|hit| self.plan_hit(hit, event.clusters.for_det(&hit.det_id)))
            .collect::<Result<Vec<HitPlan>>>()?;
        let tracks = self.plan_tracks(event, &plans)?;

        let mut summary = EventSummary::default();
        for plan in &plans {
            summary.record(&self.apply_hit(plan));
        }
        for track in &tracks {
            self.apply_track(track);
        }
        summary.tracks = tracks.len();
        self.stats.add(&summary);
        debug!(
            "Event {}: {} matched, {} unmatched, {} skipped, {} tracks",
            self.stats.events, summary.matched, summary.unmatched, summary.skipped, summary.tracks
        );
        Ok(summary)
    }

    /// Process one simulated hit against candidate clusters sorted by first channel.
    ///
    /// A hit whose roll is outside the geometry, or whose keys were never booked,
    /// contributes nothing and is reported as skipped. On error nothing is filled.
    /// Run statistics only count whole events from [`process_event`](Self::process_event).
    pub fn on_simulated_hit(
        &mut self,
        hit: &SimulatedHit,
        candidates: &[ReconstructedCluster],
    ) -> Result<HitOutcome> {
        self.expect_phase(RunPhase::Processing)?;
        let plan = self.plan_hit(hit, candidates)?;
        Ok(self.apply_hit(&plan))
    }

    fn plan_hit(&self, hit: &SimulatedHit, candidates: &[ReconstructedCluster]) -> Result<HitPlan> {
        let id = hit.det_id;
        let is_muon = hit.is_muon(self.config.muon_pdg_id);

        if self.config.muon_only && !is_muon {
            debug!("Skipping {} hit (pdg {})", id, hit.particle_type);
            return Ok(HitPlan::Skip(SkipReason::ParticleType));
        }
        if !self.geometry.component_exists(&id) {
            warn!("{} is not part of the geometry, skipping hit", id);
            return Ok(HitPlan::Skip(SkipReason::OutsideGeometry));
        }

        let bin = OccupancyBin::from_det_id(&id)?;
        let handles = match self.occupancy_handles(&id) {
            Ok(h) => h,
            Err(e @ ValidationError::UnknownComponentKey { .. }) => {
                warn!("Skipping hit in {}: {}", id, e);
                return Ok(HitPlan::Skip(SkipReason::UnbookedKey));
            }
            Err(e) => return Err(e),
        };
        let sim = GlobalCoordinates::from_point(&self.geometry.to_global(&id, &hit.local)?);
        let channel = self.geometry.fired_channel(&id, &hit.local)?;

        let reference = Reference {
            channel,
            local: Some(hit.local),
        };
        let result = match match_clusters(&reference, candidates) {
            MatchResult::Matched {
                index,
                cluster,
                enrichment,
            } => {
                let rec = match cluster.local {
                    Some(local) => Some(GlobalCoordinates::from_point(
                        &self.geometry.to_global(&id, &local)?,
                    )),
                    None => None,
                };
                FillResult::Matched {
                    cluster_index: index,
                    cluster_size: cluster.size,
                    enrichment,
                    rec,
                }
            }
            MatchResult::NoMatch { closest } => FillResult::Unmatched { closest },
        };

        Ok(HitPlan::Fill(HitFill {
            id,
            handles,
            bin,
            sim,
            channel,
            muon: is_muon.then(|| (hit.tof, hit.energy_loss * self.config.energy_loss_scale)),
            result,
        }))
    }

    /// Resolve the station handles of every selected track. Only hits that were
    /// accepted count; a track is placed at the |η| of its first accepted hit.
    fn plan_tracks(&self, event: &EventData, plans: &[HitPlan]) -> Result<Vec<TrackFill>> {
        let mut fills = Vec::new();
        if !self.config.track_plots {
            return Ok(fills);
        }
        for track in &event.tracks {
            let pt = track.pt();
            if track.particle_type.abs() != self.config.muon_pdg_id || !(pt >= self.config.track_min_pt) {
                debug!(
                    "Skipping track {} (pdg {}, pt {:.2})",
                    track.track_id, track.particle_type, pt
                );
                continue;
            }

            let mut layers = TrackLayers::default();
            let mut abs_eta = None;
            for (hit, plan) in event.sim_hits.iter().zip(plans) {
                let HitPlan::Fill(fill) = plan else { continue };
                if hit.track_id != Some(track.track_id) {
                    continue;
                }
                abs_eta.get_or_insert(fill.sim.eta.abs());
                layers.record(fill.id.station_key(), fill.id.layer(), fill.is_matched());
            }
            let Some(abs_eta) = abs_eta else {
                debug!("Track {} left no accepted hits", track.track_id);
                continue;
            };

            let mut stations = Vec::new();
            for (station, found) in layers.iter() {
                let total = self.index.require(station, AccumulatorTag::TrackEta)?;
                let mut matched = [total; 4];
                for (slot, combination) in matched.iter_mut().zip(LayerCombination::ALL) {
                    *slot = self.index.require(station, combination.tag())?;
                }
                stations.push(StationTrackFill {
                    total,
                    matched,
                    found: *found,
                });
            }
            fills.push(TrackFill { abs_eta, stations });
        }
        Ok(fills)
    }

    fn apply_hit(&mut self, plan: &HitPlan) -> HitOutcome {
        let fill = match plan {
            HitPlan::Skip(reason) => return HitOutcome::Skipped(*reason),
            HitPlan::Fill(fill) => fill,
        };
        let (sim, bin, handles) = (&fill.sim, fill.bin, &fill.handles);

        self.index.get_mut(handles.eta.0).fill(sim.eta.abs());
        self.index.get_mut(handles.phi.0).fill(sim.phi);
        self.index.get_mut(handles.det.0).fill_2d(bin.x as f64, bin.y as f64);
        self.index.get_mut(handles.strip.0).fill(fill.channel as f64);

        let station = fill.id.station_key();
        if let Some((tof, eloss)) = fill.muon {
            self.fill(&station, AccumulatorTag::TofMuon, tof);
            self.fill(&station, AccumulatorTag::EnergyLossMuon, eloss);
        }

        let layer = fill.id.layer_key();
        let region = fill.id.region_key();
        match &fill.result {
            FillResult::Matched {
                cluster_size,
                enrichment,
                rec,
                ..
            } => {
                self.index.get_mut(handles.eta.1).fill(sim.eta.abs());
                self.index.get_mut(handles.phi.1).fill(sim.phi);
                self.index.get_mut(handles.det.1).fill_2d(bin.x as f64, bin.y as f64);
                self.index.get_mut(handles.strip.1).fill(fill.channel as f64);

                self.fill(&layer, AccumulatorTag::ClusterSize, *cluster_size as f64);
                if let Some(e) = enrichment {
                    self.fill(&layer, AccumulatorTag::ResidualX, e.residual.x);
                    self.fill(&layer, AccumulatorTag::ResidualY, e.residual.y);
                    if let Some(pull) = e.pull {
                        for key in [region, layer] {
                            self.fill(&key, AccumulatorTag::PullX, pull.x);
                            self.fill(&key, AccumulatorTag::PullY, pull.y);
                        }
                    }
                }
                if let Some(rec) = rec {
                    self.fill_2d(&region, AccumulatorTag::RecOccupancyZR, rec.abs_z(), rec.r);
                    self.fill_2d(&layer, AccumulatorTag::RecOccupancyXY, rec.x, rec.y);
                }
            }
            FillResult::Unmatched { closest } => {
                if let Some(c) = closest {
                    self.fill(&layer, AccumulatorTag::MatchDistance, c.distance as f64);
                }
            }
        }
        fill.outcome()
    }

    fn apply_track(&mut self, track: &TrackFill) {
        for station in &track.stations {
            self.index.get_mut(station.total).fill(track.abs_eta);
            for (combination, handle) in LayerCombination::ALL.into_iter().zip(station.matched) {
                if combination.accepts(station.found) {
                    self.index.get_mut(handle).fill(track.abs_eta);
                }
            }
        }
    }

    // ── Harvest ─────────────────────────────────────────────────────────────

    /// Publish every accumulator and the derived efficiencies, then close the run.
    pub fn on_run_end(&mut self, sink: &mut dyn Sink) -> Result<HarvestSummary> {
        self.expect_phase(RunPhase::Processing)?;
        self.phase = RunPhase::Harvesting;
        info!(
            "Harvesting run: {} events, {} matched, {} unmatched, {} skipped hits, {} tracks",
            self.stats.events,
            self.stats.matched,
            self.stats.unmatched,
            self.stats.skipped,
            self.stats.tracks
        );
        let summary = harvest_index(&self.index, &self.estimator, sink)?;
        self.phase = RunPhase::Closed;
        Ok(summary)
    }

    /// Hand the raw counters over for merging with other shards instead of harvesting here.
    pub fn finish(self) -> Result<RunSnapshot> {
        self.expect_phase(RunPhase::Processing)?;
        Ok(RunSnapshot::from_index(self.index, self.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SimulatedTrack;
    use crate::geometry::{PlanarGeometry, RingSpec};
    use crate::sink::MemorySink;
    use crate::{GlobalPoint, LocalPoint};
    use nalgebra::Vector3;

    /// Nominal geometry whose strip lookup fails for one roll.
    struct BrokenStripGeometry {
        inner: PlanarGeometry,
        broken: GemDetId,
    }

    impl GeometryService for BrokenStripGeometry {
        fn component_exists(&self, id: &GemDetId) -> bool {
            self.inner.component_exists(id)
        }

        fn to_global(&self, id: &GemDetId, local: &LocalPoint) -> Result<GlobalPoint> {
            self.inner.to_global(id, local)
        }

        fn fired_channel(&self, id: &GemDetId, local: &LocalPoint) -> Result<i32> {
            if *id == self.broken {
                return Err(ValidationError::InvalidGeometryIndex {
                    field: "strip",
                    value: -1,
                });
            }
            self.inner.fired_channel(id, local)
        }

        fn enumerate_keys(&self) -> Vec<ComponentKey> {
            self.inner.enumerate_keys()
        }

        fn station_layout(&self, region: i32, station: i32) -> Option<StationLayout> {
            self.inner.station_layout(region, station)
        }
    }

    fn geometry() -> PlanarGeometry {
        PlanarGeometry::from_rings(&[RingSpec::ge11()]).unwrap()
    }

    fn muon(id: GemDetId, x: f64) -> SimulatedHit {
        SimulatedHit {
            det_id: id,
            local: LocalPoint::new(x, 2.0),
            particle_type: -13,
            energy_loss: 2.5e-6,
            tof: 19.5,
            track_id: None,
        }
    }

    fn muon_track(track_id: u32, pt: f64) -> SimulatedTrack {
        SimulatedTrack {
            track_id,
            particle_type: 13,
            momentum: Vector3::new(pt, 0.0, 4.0 * pt),
        }
    }

    fn entries(run: &ValidationRun<'_, impl GeometryService>, key: ComponentKey, tag: AccumulatorTag) -> u64 {
        run.accumulator(&key, tag).map_or(0, Accumulator::entries)
    }

    #[test]
    fn test_phase_order_is_enforced() {
        let geom = geometry();
        let mut run = ValidationRun::new(&geom, ValidationConfig::default()).unwrap();
        let mut sink = MemorySink::new();
        assert!(matches!(
            run.on_run_end(&mut sink),
            Err(ValidationError::InvalidPhase {
                expected: RunPhase::Processing,
                found: RunPhase::Booking
            })
        ));
        assert!(run.process_event(&EventData::default()).is_err());

        run.book().unwrap();
        assert!(matches!(run.book(), Err(ValidationError::InvalidPhase { .. })));
        run.on_run_end(&mut sink).unwrap();
        assert_eq!(run.phase(), RunPhase::Closed);
        assert!(matches!(
            run.on_run_end(&mut sink),
            Err(ValidationError::InvalidPhase {
                found: RunPhase::Closed,
                ..
            })
        ));
    }

    #[test]
    fn test_booking_follows_geometry() {
        let mut geom = geometry();
        let removed = GemDetId::new(1, 1, 2, 1, 8).unwrap();
        // Removing one chamber's roll keeps the roll key alive through the other chambers.
        geom.remove_roll(&removed);
        let mut run = ValidationRun::new(&geom, ValidationConfig::default()).unwrap();
        run.book().unwrap();

        assert!(run
            .accumulator(&ComponentKey::Region(-1), AccumulatorTag::RecOccupancyZR)
            .is_some());
        assert!(run
            .accumulator(&ComponentKey::Roll(1, 1, 2, 8), AccumulatorTag::SimOccupancyStrip)
            .is_some());
        assert!(run
            .accumulator(&ComponentKey::Station(1, 2), AccumulatorTag::SimOccupancyPhi)
            .is_none());
        let det = run
            .accumulator(&ComponentKey::Station(1, 1), AccumulatorTag::SimOccupancyDet)
            .and_then(Accumulator::as_2d)
            .unwrap();
        assert_eq!(det.x_axis().nbins(), 72);
        assert_eq!(det.y_axis().nbins(), 8);
    }

    #[test]
    fn test_single_hit_fills_total_and_matched() {
        let geom = geometry();
        let mut run = ValidationRun::new(&geom, ValidationConfig::default()).unwrap();
        run.book().unwrap();

        let id = GemDetId::new(1, 1, 1, 2, 3).unwrap();
        let hit = muon(id, 0.0);
        let strip = geom.fired_channel(&id, &hit.local).unwrap();
        let matching = [ReconstructedCluster {
            size: 3,
            ..ReconstructedCluster::digi(id, strip - 1)
        }];
        let outcome = run.on_simulated_hit(&hit, &matching).unwrap();
        assert_eq!(outcome, HitOutcome::Matched { cluster_index: 0 });

        let far = [ReconstructedCluster::digi(id, strip + 5)];
        let outcome = run.on_simulated_hit(&hit, &far).unwrap();
        assert!(matches!(outcome, HitOutcome::Unmatched { closest: Some(c) } if c.distance == 5));

        let station = id.station_key();
        let total = run
            .accumulator(&station, AccumulatorTag::SimOccupancyDet)
            .and_then(Accumulator::as_2d)
            .unwrap();
        let matched = run
            .accumulator(&station, AccumulatorTag::MatchedOccupancyDet)
            .and_then(Accumulator::as_2d)
            .unwrap();
        // Chamber 2 layer 1 → x bin 2; roll 3 → y bin index 2
        assert_eq!(total.count(2, 2), 2);
        assert_eq!(matched.count(2, 2), 1);

        let dist = run
            .accumulator(&id.layer_key(), AccumulatorTag::MatchDistance)
            .unwrap();
        assert_eq!(dist.entries(), 1);
        let tof = run.accumulator(&station, AccumulatorTag::TofMuon).unwrap();
        assert_eq!(tof.entries(), 2);
        let eloss = run
            .accumulator(&station, AccumulatorTag::EnergyLossMuon)
            .and_then(Accumulator::as_1d)
            .unwrap();
        assert!((eloss.mean().unwrap() - 2500.0).abs() < 1e-6);
    }

    #[test]
    fn test_skips() {
        let mut geom = geometry();
        let missing = GemDetId::new(-1, 1, 1, 7, 1).unwrap();
        geom.remove_roll(&missing);
        let mut run = ValidationRun::new(&geom, ValidationConfig::default()).unwrap();
        run.book().unwrap();

        let mut electron = muon(GemDetId::new(1, 1, 1, 1, 1).unwrap(), 0.0);
        electron.particle_type = 11;
        assert_eq!(
            run.on_simulated_hit(&electron, &[]).unwrap(),
            HitOutcome::Skipped(SkipReason::ParticleType)
        );
        assert_eq!(
            run.on_simulated_hit(&muon(missing, 0.0), &[]).unwrap(),
            HitOutcome::Skipped(SkipReason::OutsideGeometry)
        );

        let total = run
            .accumulator(&ComponentKey::Region(1), AccumulatorTag::SimOccupancyEta)
            .unwrap();
        assert_eq!(total.entries(), 0);
    }

    #[test]
    fn test_unbooked_station_is_skipped() {
        // A roll inserted without a station layout exists but has no occupancy booked.
        let mut geom = geometry();
        let extra = GemDetId::new(1, 2, 1, 1, 1).unwrap();
        let roll = geom.roll(&GemDetId::new(1, 1, 1, 1, 1).unwrap()).unwrap().clone();
        geom.insert_roll(extra, roll);
        let mut run = ValidationRun::new(&geom, ValidationConfig::default()).unwrap();
        run.book().unwrap();

        let outcome = run.on_simulated_hit(&muon(extra, 0.0), &[]).unwrap();
        assert_eq!(outcome, HitOutcome::Skipped(SkipReason::UnbookedKey));
        // The region total was booked but must not have been filled.
        let eta = run
            .accumulator(&ComponentKey::Region(1), AccumulatorTag::SimOccupancyEta)
            .unwrap();
        assert_eq!(eta.entries(), 0);
    }

    #[test]
    fn test_harvest_names() {
        let geom = PlanarGeometry::from_rings(&[RingSpec::ge11()]).unwrap();
        let config = ValidationConfig {
            detail_plots: false,
            ..Default::default()
        };
        let mut run = ValidationRun::new(&geom, config).unwrap();
        run.book().unwrap();
        let mut sink = MemorySink::new();
        let summary = run.on_run_end(&mut sink).unwrap();

        assert!(sink.counts_2d("sim_occ_det_re1_st1").is_some());
        assert!(sink.counts_1d("matched_occ_strip_re-1_st1_la2_ro8").is_some());
        assert!(sink.efficiency("eff_matched_occ_eta_re-1").is_some());
        assert!(sink.efficiency("eff_matched_occ_det_re1_st1").is_some());
        assert!(sink.get("cls_re1_st1_la1").is_none());
        assert!(sink.efficiency("eff_matched_track_eta_l1and2_re-1_st1").is_some());
        assert_eq!(
            sink.title("eff_matched_occ_det_re1_st1"),
            Some("Efficiency of Matched SimHit Occupancy Region 1 Station 1")
        );
        assert_eq!(sink.title("sim_occ_eta_re-1"), Some("SimHit Eta Occupancy Region -1"));
        // 2 regions x (eta, phi, det) + 32 rolls + 2 stations x 4 layer combinations
        assert_eq!(summary.efficiencies, 2 * 3 + 32 + 2 * 4);
        assert_eq!(summary.counters + summary.efficiencies, sink.len());
    }

    #[test]
    fn test_bad_config_is_rejected_before_booking() {
        let geom = geometry();
        for config in [
            ValidationConfig {
                tof_bins: 0,
                ..Default::default()
            },
            ValidationConfig {
                zr_z_step: 0.0,
                ..Default::default()
            },
            ValidationConfig {
                xy_bins: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                ValidationRun::new(&geom, config),
                Err(ValidationError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_failed_event_changes_nothing() {
        let good = GemDetId::new(1, 1, 1, 3, 2).unwrap();
        let broken = GemDetId::new(1, 1, 2, 3, 2).unwrap();
        let geom = BrokenStripGeometry {
            inner: geometry(),
            broken,
        };
        let mut run = ValidationRun::new(&geom, ValidationConfig::default()).unwrap();
        run.book().unwrap();

        let strip = geom.fired_channel(&good, &muon(good, 0.0).local).unwrap();
        let clusters: crate::event::ClusterCollection =
            [ReconstructedCluster::digi(good, strip)].into_iter().collect();
        let event = EventData {
            sim_hits: vec![muon(good, 0.0), muon(broken, 0.0)],
            clusters: clusters.clone(),
            tracks: Vec::new(),
        };
        assert!(run.process_event(&event).is_err());

        assert_eq!(*run.stats(), RunStats::default());
        for (key, tag) in [
            (good.region_key(), AccumulatorTag::SimOccupancyEta),
            (good.region_key(), AccumulatorTag::MatchedOccupancyEta),
            (good.station_key(), AccumulatorTag::SimOccupancyDet),
            (good.station_key(), AccumulatorTag::TofMuon),
            (good.roll_key(), AccumulatorTag::SimOccupancyStrip),
        ] {
            assert_eq!(entries(&run, key, tag), 0, "{tag:?}");
        }

        // Skipping the bad event leaves the run usable.
        let event = EventData {
            sim_hits: vec![muon(good, 0.0)],
            clusters,
            tracks: Vec::new(),
        };
        let summary = run.process_event(&event).unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(run.stats().events, 1);
        assert_eq!(entries(&run, good.region_key(), AccumulatorTag::MatchedOccupancyEta), 1);
    }

    #[test]
    fn test_track_layer_combinations() {
        let geom = geometry();
        let mut run = ValidationRun::new(&geom, ValidationConfig::default()).unwrap();
        run.book().unwrap();

        let l1 = GemDetId::new(1, 1, 1, 5, 4).unwrap();
        let l2 = GemDetId::new(1, 1, 2, 5, 4).unwrap();
        let hit = |id: GemDetId, track_id: u32| SimulatedHit {
            track_id: Some(track_id),
            ..muon(id, 1.0)
        };
        let strip = geom.fired_channel(&l1, &hit(l1, 1).local).unwrap();

        // Tracks 1 and 2 cross both layers; track 3 is below the pt threshold.
        let event = EventData {
            sim_hits: vec![hit(l1, 1), hit(l2, 1), hit(l1, 2), hit(l2, 2), hit(l1, 3)],
            clusters: [
                ReconstructedCluster::digi(l1, strip),
                ReconstructedCluster::digi(l2, strip + 20),
            ]
            .into_iter()
            .collect(),
            tracks: vec![muon_track(1, 10.0), muon_track(2, 10.0), muon_track(3, 1.0)],
        };
        let summary = run.process_event(&event).unwrap();
        assert_eq!(summary.tracks, 2);
        assert_eq!(run.stats().tracks, 2);

        let station = l1.station_key();
        assert_eq!(entries(&run, station, AccumulatorTag::TrackEta), 2);
        let found: Vec<u64> = LayerCombination::ALL
            .iter()
            .map(|c| entries(&run, station, c.tag()))
            .collect();
        // Only layer 1 has a cluster under the fired strip.
        assert_eq!(found, vec![2, 0, 2, 0]);

        // A cluster under the layer-2 strip completes both tracks.
        let mut event = event;
        event.clusters.push(ReconstructedCluster::digi(l2, strip));
        run.process_event(&event).unwrap();
        let found: Vec<u64> = LayerCombination::ALL
            .iter()
            .map(|c| entries(&run, station, c.tag()))
            .collect();
        assert_eq!(entries(&run, station, AccumulatorTag::TrackEta), 4);
        assert_eq!(found, vec![4, 2, 4, 2]);
    }

    #[test]
    fn test_tracks_disabled() {
        let geom = geometry();
        let config = ValidationConfig {
            track_plots: false,
            ..Default::default()
        };
        let mut run = ValidationRun::new(&geom, config).unwrap();
        run.book().unwrap();
        assert!(run
            .accumulator(&ComponentKey::Station(1, 1), AccumulatorTag::TrackEta)
            .is_none());

        let id = GemDetId::new(1, 1, 1, 1, 1).unwrap();
        let event = EventData {
            sim_hits: vec![SimulatedHit {
                track_id: Some(7),
                ..muon(id, 0.0)
            }],
            clusters: Default::default(),
            tracks: vec![muon_track(7, 20.0)],
        };
        assert_eq!(run.process_event(&event).unwrap().tracks, 0);
    }
}
