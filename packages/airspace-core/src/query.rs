//! Active-zone queries: which airspaces apply at a live position, and which
//! lie under a tapped point.
//!
//! Containment is a bbox test plus the altitude band, not an exact polygon
//! test. Live samples are debounced so high-rate GPS input only re-evaluates
//! after real movement, a climb or descent, or a timeout.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::altitude::{feet_to_meters, parse_meters};
use crate::catalog::Catalog;
use crate::config::QueryConfig;
use crate::geometry::AirspaceSlim;

/// One position fix from the aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: f64,
    /// Seconds since an arbitrary epoch; only differences are used.
    pub timestamp: f64,
}

impl Telemetry {
    pub fn new(lat: f64, lon: f64, altitude_ft: f64, timestamp: f64) -> Self {
        Self {
            lat,
            lon,
            altitude_ft,
            timestamp,
        }
    }

    pub fn altitude_m(&self) -> f64 {
        feet_to_meters(self.altitude_ft)
    }

    fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// Categories the user has switched on. Applied to results after the engine
/// has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnabledCategories {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl EnabledCategories {
    pub fn only<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnabledCategories::Only(categories.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, category: &str) -> bool {
        match self {
            EnabledCategories::All => true,
            EnabledCategories::Only(set) => set.contains(category),
        }
    }
}

pub fn filter_enabled<'a>(
    zones: &'a [AirspaceSlim],
    enabled: &EnabledCategories,
) -> Vec<&'a AirspaceSlim> {
    zones.iter().filter(|zone| enabled.allows(&zone.sub_category)).collect()
}

/// Whether a record applies at a position and altitude (meters).
pub fn contains(slim: &AirspaceSlim, lon: f64, lat: f64, altitude_m: f64) -> bool {
    slim.is_active()
        && slim.bbox.contains_point(lon, lat)
        && parse_meters(&slim.lower_limit) <= altitude_m
        && altitude_m <= parse_meters(&slim.upper_limit)
}

// Highest ceiling first, military before civil, then by name
pub fn compare_priority(a: &AirspaceSlim, b: &AirspaceSlim) -> Ordering {
    parse_meters(&b.upper_limit)
        .total_cmp(&parse_meters(&a.upper_limit))
        .then_with(|| b.is_military().cmp(&a.is_military()))
        .then_with(|| a.name.cmp(&b.name))
}

/// All records containing the position, in priority order.
pub fn active_zones(catalog: &Catalog, lon: f64, lat: f64, altitude_m: f64) -> Vec<AirspaceSlim> {
    let mut zones: Vec<AirspaceSlim> = catalog
        .slims_at(lon, lat)
        .into_iter()
        .filter(|slim| contains(slim, lon, lat, altitude_m))
        .cloned()
        .collect();
    zones.sort_by(compare_priority);
    zones
}

/// Records under a tapped point at any altitude, in priority order.
pub fn tap_query(catalog: &Catalog, lon: f64, lat: f64, limit: usize) -> Vec<AirspaceSlim> {
    let mut zones: Vec<AirspaceSlim> = catalog
        .slims_at(lon, lat)
        .into_iter()
        .filter(|slim| slim.is_active())
        .cloned()
        .collect();
    zones.sort_by(compare_priority);
    zones.truncate(limit);
    zones
}

// Where and when the engine last evaluated
#[derive(Debug, Clone, Copy)]
struct Evaluation {
    position: Point<f64>,
    altitude_m: f64,
    timestamp: f64,
    generation: u64,
}

/// Decides whether a telemetry sample warrants a fresh evaluation.
#[derive(Debug, Clone)]
pub struct Debouncer {
    config: QueryConfig,
    last: Option<Evaluation>,
}

impl Debouncer {
    pub fn new(config: QueryConfig) -> Self {
        Self { config, last: None }
    }

    pub fn is_stale(&self, sample: &Telemetry, generation: u64) -> bool {
        let Some(last) = self.last else {
            return true;
        };
        if last.generation != generation {
            return true;
        }

        let moved = Haversine::distance(last.position, sample.point());
        moved > self.config.min_distance_m
            || (sample.altitude_m() - last.altitude_m).abs() > self.config.min_altitude_delta_m
            || sample.timestamp - last.timestamp > self.config.max_interval_s
    }

    pub fn record(&mut self, sample: &Telemetry, generation: u64) {
        self.last = Some(Evaluation {
            position: sample.point(),
            altitude_m: sample.altitude_m(),
            timestamp: sample.timestamp,
            generation,
        });
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Live active-zone state for the HUD.
#[derive(Debug, Clone)]
pub struct ActiveZoneEngine {
    config: QueryConfig,
    debouncer: Debouncer,
    zones: Vec<AirspaceSlim>,
    evaluations: u64,
}

impl Default for ActiveZoneEngine {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl ActiveZoneEngine {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            config,
            debouncer: Debouncer::new(config),
            zones: Vec::new(),
            evaluations: 0,
        }
    }

    /// Feed one sample. Returns the new ordered zone list only when it
    /// differs from the previous one.
    pub fn on_sample(&mut self, catalog: &Catalog, sample: &Telemetry) -> Option<&[AirspaceSlim]> {
        if !self.debouncer.is_stale(sample, catalog.generation()) {
            return None;
        }
        self.debouncer.record(sample, catalog.generation());
        self.evaluations += 1;

        let zones = active_zones(catalog, sample.lon, sample.lat, sample.altitude_m());
        let unchanged = zones.len() == self.zones.len()
            && zones.iter().zip(&self.zones).all(|(a, b)| a.id == b.id);
        self.zones = zones;
        if unchanged {
            return None;
        }

        debug!("Active zones changed: {} in effect", self.zones.len());
        Some(&self.zones)
    }

    /// Every zone in effect at the last evaluation, in priority order.
    pub fn zones(&self) -> &[AirspaceSlim] {
        &self.zones
    }

    pub fn hud_strip(&self) -> &[AirspaceSlim] {
        &self.zones[..self.zones.len().min(self.config.hud_limit)]
    }

    pub fn tap(&self, catalog: &Catalog, lon: f64, lat: f64) -> Vec<AirspaceSlim> {
        tap_query(catalog, lon, lat, self.config.tap_limit)
    }

    /// Number of samples that were actually evaluated.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }
}
