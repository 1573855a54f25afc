//! Entity graph for the feed: Agency -> Route -> Service / Stop, plus the
//! most recent Predictions of each Stop.
//!
//! Ownership is a tree. Back-references (a stop's agency, a service's route,
//! a service's stops) are identifiers resolved against the owning collection.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::Cached;
use crate::identifiers::{AgencyTag, RouteTag, ServiceTag, StopId, StopTag};

// ============================================================================
// Data Structures
// ============================================================================

/// A transit operator.
#[derive(Debug, Clone, Serialize)]
pub struct Agency {
    pub tag: AgencyTag,
    pub title: String,
    pub short_title: String,
    pub region_title: String,
    #[serde(skip)]
    pub(crate) routes: Cached<Vec<Route>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub tag: RouteTag,
    pub title: String,
    pub short_title: String,
    pub agency: AgencyTag,
    pub(crate) stops: Vec<Stop>,
    pub(crate) services: Vec<Service>,
}

/// A directional variant of a route ("direction" in the feed).
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub tag: ServiceTag,
    pub name: String,
    pub title: String,
    pub use_for_ui: bool,
    pub agency: AgencyTag,
    pub route: RouteTag,
    /// Ordered stops, as tags into the owning route's stop set.
    pub stops: Vec<StopTag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stop {
    pub id: Option<StopId>,
    pub tag: StopTag,
    pub title: String,
    pub short_title: String,
    pub longitude: f64,
    pub latitude: f64,
    pub agency: AgencyTag,
    pub route: RouteTag,
    #[serde(skip)]
    pub(crate) predictions: Cached<Vec<Prediction>>,
}

/// An arrival estimate for one stop and service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub agency: AgencyTag,
    pub route: RouteTag,
    pub service: ServiceTag,
    pub stop: StopId,
    /// Live or scheduled arrival, see `schedule_based`.
    pub eta: DateTime<Utc>,
    /// Minutes until arrival. Preferred for display.
    pub minutes: i64,
    pub seconds: i64,
    /// Only published by the Toronto TTC.
    pub branch: String,
    /// The vehicle lays over on the way, so the estimate is less reliable.
    pub affected_by_layover: bool,
    /// The trip starts here: `eta` is a departure time.
    pub is_departure: bool,
    pub trip_tag: String,
    pub schedule_based: bool,
    pub delayed: bool,
    /// When this prediction was fetched.
    pub predicted_at: DateTime<Utc>,
}

// ============================================================================
// Lookups
// ============================================================================

impl Agency {
    /// Routes as last fetched, `None` if never fetched.
    pub fn routes(&self) -> Option<&[Route]> {
        self.routes.get().map(Vec::as_slice)
    }

    pub fn routes_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.routes.refreshed_at()
    }

    pub fn route(&self, tag: &str) -> Option<&Route> {
        self.routes.items().iter().find(|route| route.tag == tag)
    }
}

impl Route {
    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, tag: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.tag == tag)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.iter().find(|stop| stop.has_id(stop_id))
    }

    pub fn stop_by_tag(&self, tag: &str) -> Option<&Stop> {
        self.stops.iter().find(|stop| stop.tag == tag)
    }

    pub fn has_stop(&self, stop_id: &str) -> bool {
        self.stop(stop_id).is_some()
    }

    /// Stops of `service` in service order, resolved against this route.
    pub fn service_stops<'a>(&'a self, service: &'a Service) -> impl Iterator<Item = &'a Stop> + 'a {
        service.stops.iter().filter_map(move |tag| self.stop_by_tag(tag.as_str()))
    }

    /// Whether `service` of this route serves the stop with `stop_id`.
    pub fn service_serves(&self, service: &Service, stop_id: &str) -> bool {
        self.service_stops(service).any(|stop| stop.has_id(stop_id))
    }
}

impl Stop {
    pub fn has_id(&self, stop_id: &str) -> bool {
        self.id.as_ref().is_some_and(|id| *id == stop_id)
    }

    /// Predictions from the most recent fetch, `None` if never fetched.
    pub fn predictions(&self) -> Option<&[Prediction]> {
        self.predictions.get().map(Vec::as_slice)
    }

    pub fn predictions_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.predictions.refreshed_at()
    }
}

/// First service with `tag` across `routes`, with its route.
pub(crate) fn find_service<'a>(routes: &'a [Route], tag: &str) -> Option<(&'a Route, &'a Service)> {
    routes
        .iter()
        .find_map(|route| route.service(tag).map(|service| (route, service)))
}

pub(crate) fn find_stop<'a>(routes: &'a [Route], stop_id: &str) -> Option<&'a Stop> {
    routes.iter().flat_map(|route| route.stops.iter()).find(|stop| stop.has_id(stop_id))
}
