//! The entity graph and its get-or-refresh operations.
//!
//! A [`FeedHandler`] owns every cached collection: the agency list, each
//! agency's routes (with their stops and services) and each stop's
//! predictions. A collection is refreshed when it was never fetched, when it
//! is older than the applicable max age, or when the call disables the cache.
//!
//! Refreshes are all-or-nothing. A refresh that fails part way installs
//! nothing and the previous collection, stale or not, stays in place.
//!
//! Operations that mutate the cache take `&mut self`; share a handler across
//! threads behind a `Mutex`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::{CachePolicy, Cached};
use crate::command::Command;
use crate::config::{CacheOptions, HandlerConfig};
use crate::decode;
use crate::error::{FeedError, Result};
use crate::identifiers::{AgencyTag, RouteTag, ServiceTag, StopId};
use crate::models::{Agency, Prediction, Route, Service, Stop, find_service, find_stop};
use crate::transport::{Fetcher, HttpFetcher, Transport};

/// Accepts any collection that has been fetched at least once.
const ENSURE: CachePolicy = CachePolicy {
    use_cache: true,
    max_age: Duration::MAX,
};

pub struct FeedHandler {
    config: HandlerConfig,
    transport: Transport,
    agencies: Cached<Vec<Agency>>,
}

impl FeedHandler {
    /// Handler with the default configuration over HTTP.
    pub fn new() -> Result<Self> {
        Self::with_config(HandlerConfig::default())
    }

    pub fn with_config(config: HandlerConfig) -> Result<Self> {
        Ok(Self::with_fetcher(config, HttpFetcher::new()?))
    }

    /// Handler that performs its requests through `fetcher`.
    pub fn with_fetcher(config: HandlerConfig, fetcher: impl Fetcher + 'static) -> Self {
        let transport = Transport::new(config.base_uri.clone(), config.fetch.clone(), fetcher);
        Self {
            config,
            transport,
            agencies: Default::default(),
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    // ========================================================================
    // Agencies
    // ========================================================================

    pub fn get_agencies(&mut self, opts: CacheOptions) -> Result<&[Agency]> {
        self.agencies_with(opts.policy(self.config.cache_max_age))?;
        Ok(self.agencies.items())
    }

    pub fn get_agency(&mut self, tag: &str, opts: CacheOptions) -> Result<&Agency> {
        self.agencies_with(opts.policy(self.config.cache_max_age))?;
        let index = self.agency_index(tag)?;
        Ok(&self.agencies.items()[index])
    }

    fn agencies_with(&mut self, policy: CachePolicy) -> Result<()> {
        if self.agencies.is_fresh(policy, Utc::now()) {
            debug!("Agency list served from cache");
            return Ok(());
        }

        let started = Utc::now();
        let body = self.fetch_json(&Command::AgencyList)?;
        let mut agencies = decode::decode_agencies(&body)?;

        // Routes have their own freshness; keep them across agency refreshes.
        if let Some(previous) = self.agencies.get_mut() {
            for agency in &mut agencies {
                if let Some(old) = previous.iter_mut().find(|old| old.tag == agency.tag) {
                    agency.routes = std::mem::take(&mut old.routes);
                }
            }
        }

        info!(agencies = agencies.len(), "Refreshed agency list");
        self.agencies.replace(agencies, started);
        Ok(())
    }

    fn agency_index(&self, tag: &str) -> Result<usize> {
        self.agencies
            .items()
            .iter()
            .position(|agency| agency.tag == tag)
            .ok_or_else(|| FeedError::AgencyNotFound(AgencyTag::new(tag)))
    }

    // ========================================================================
    // Routes
    // ========================================================================

    /// All routes of `agency`, with their stops and services.
    ///
    /// A refresh issues one `routeList` command and then one `routeConfig`
    /// per route. The first failure aborts it.
    pub fn get_routes(&mut self, agency: &str, opts: CacheOptions) -> Result<&[Route]> {
        let index = self.routes_with(agency, opts.policy(self.config.cache_max_age))?;
        Ok(self.routes_of(index))
    }

    pub fn get_route(&mut self, agency: &str, tag: &str, opts: CacheOptions) -> Result<&Route> {
        let index = self.routes_with(agency, opts.policy(self.config.cache_max_age))?;
        self.route_in(index, tag)
    }

    /// First service tagged `tag` across all routes of `agency`.
    pub fn get_service(&mut self, agency: &str, tag: &str) -> Result<&Service> {
        let index = self.routes_with(agency, ENSURE)?;
        find_service(self.routes_of(index), tag)
            .map(|(_, service)| service)
            .ok_or_else(|| FeedError::ServiceNotFound {
                agency: AgencyTag::new(agency),
                service: ServiceTag::new(tag),
            })
    }

    pub fn get_service_by_route(&mut self, agency: &str, route: &str, tag: &str) -> Result<&Service> {
        let index = self.routes_with(agency, ENSURE)?;
        self.route_in(index, route)?
            .service(tag)
            .ok_or_else(|| FeedError::ServiceNotFound {
                agency: AgencyTag::new(agency),
                service: ServiceTag::new(tag),
            })
    }

    fn routes_with(&mut self, agency: &str, policy: CachePolicy) -> Result<usize> {
        self.agencies_with(ENSURE)?;
        let index = self.agency_index(agency)?;

        let cached = &self.agencies.items()[index];
        if cached.routes.is_fresh(policy, Utc::now()) {
            debug!(agency = %cached.tag, "Routes served from cache");
            return Ok(index);
        }

        let tag = cached.tag.clone();
        let started = Utc::now();
        let routes = self.load_routes(&tag)?;
        info!(agency = %tag, routes = routes.len(), "Refreshed routes");
        self.agencies.items_mut()[index].routes.replace(routes, started);
        Ok(index)
    }

    fn load_routes(&self, agency: &AgencyTag) -> Result<Vec<Route>> {
        let body = self.fetch_json(&Command::RouteList {
            agency: agency.clone(),
        })?;
        let tags = decode::decode_route_list(&body)?;

        let mut routes = Vec::with_capacity(tags.len());
        for tag in tags {
            let body = self.fetch_json(&Command::RouteConfig {
                agency: agency.clone(),
                route: tag.clone(),
            })?;
            routes.push(decode::decode_route_config(&body, agency, &tag)?);
        }
        Ok(routes)
    }

    fn routes_of(&self, index: usize) -> &[Route] {
        self.agencies.items()[index].routes.items()
    }

    fn route_in(&self, index: usize, tag: &str) -> Result<&Route> {
        self.routes_of(index)
            .iter()
            .find(|route| route.tag == tag)
            .ok_or_else(|| FeedError::RouteNotFound {
                agency: self.agencies.items()[index].tag.clone(),
                route: RouteTag::new(tag),
            })
    }

    // ========================================================================
    // Stops
    // ========================================================================

    pub fn get_stop(&mut self, agency: &str, stop_id: &str) -> Result<&Stop> {
        let index = self.routes_with(agency, ENSURE)?;
        find_stop(self.routes_of(index), stop_id).ok_or_else(|| stop_not_found(agency, stop_id))
    }

    /// Routes whose stop set contains `stop_id`.
    pub fn get_stop_routes(&mut self, agency: &str, stop_id: &str) -> Result<Vec<&Route>> {
        let index = self.routes_with(agency, ENSURE)?;
        Ok(self
            .routes_of(index)
            .iter()
            .filter(|route| route.has_stop(stop_id))
            .collect())
    }

    /// The services, within the routes serving `stop_id`, whose own stop
    /// list contains it.
    pub fn get_stop_service_routes(&mut self, agency: &str, stop_id: &str) -> Result<Vec<&Service>> {
        let index = self.routes_with(agency, ENSURE)?;
        Ok(self
            .routes_of(index)
            .iter()
            .filter(|route| route.has_stop(stop_id))
            .flat_map(|route| {
                route
                    .services()
                    .iter()
                    .filter(move |service| route.service_serves(service, stop_id))
            })
            .collect())
    }

    /// Every stop of `agency` once, in first-seen route order.
    ///
    /// Stops are shared between routes under the same stop id. Stops without
    /// an id cannot be matched and are all kept.
    pub fn get_stops(&mut self, agency: &str, opts: CacheOptions) -> Result<Vec<&Stop>> {
        let index = self.routes_with(agency, opts.policy(self.config.cache_max_age))?;
        let mut seen = HashSet::new();
        Ok(self
            .routes_of(index)
            .iter()
            .flat_map(|route| route.stops())
            .filter(|stop| stop.id.as_ref().is_none_or(|id| seen.insert(id.clone())))
            .collect())
    }

    // ========================================================================
    // Predictions
    // ========================================================================

    /// Predictions for `stop_id`, refetched unless the stop's set is fresh.
    ///
    /// A successful fetch replaces the set wholesale on every route's copy of
    /// the stop.
    pub fn get_predictions(&mut self, agency: &str, stop_id: &str, opts: CacheOptions) -> Result<&[Prediction]> {
        let index = self.routes_with(agency, ENSURE)?;
        let policy = opts.policy(self.config.prediction_max_age);

        let stop = find_stop(self.routes_of(index), stop_id).ok_or_else(|| stop_not_found(agency, stop_id))?;
        let fresh = stop.predictions.is_fresh(policy, Utc::now());

        if fresh {
            debug!(agency, stop = stop_id, "Predictions served from cache");
        } else {
            let started = Utc::now();
            let id = StopId::new(stop_id);
            let predictions = self.load_predictions(index, &id, None, started)?;
            info!(agency, stop = stop_id, predictions = predictions.len(), "Refreshed predictions");

            for route in self.agencies.items_mut()[index].routes.items_mut() {
                for stop in route.stops.iter_mut().filter(|stop| stop.has_id(stop_id)) {
                    stop.predictions.replace(predictions.clone(), started);
                }
            }
        }

        find_stop(self.routes_of(index), stop_id)
            .map(|stop| stop.predictions.items())
            .ok_or_else(|| stop_not_found(agency, stop_id))
    }

    /// Predictions for `stop_id` limited to one route. Always fetched, never
    /// cached.
    pub fn fetch_route_predictions(&mut self, agency: &str, stop_id: &str, route: &str) -> Result<Vec<Prediction>> {
        let index = self.routes_with(agency, ENSURE)?;
        let route = self.route_in(index, route)?.tag.clone();
        if find_stop(self.routes_of(index), stop_id).is_none() {
            return Err(stop_not_found(agency, stop_id));
        }
        self.load_predictions(index, &StopId::new(stop_id), Some(route), Utc::now())
    }

    fn load_predictions(
        &self,
        index: usize,
        stop: &StopId,
        route: Option<RouteTag>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<Prediction>> {
        let agency = &self.agencies.items()[index];
        let body = self.fetch_json(&Command::Predictions {
            agency: agency.tag.clone(),
            stop: stop.clone(),
            route,
        })?;
        decode::decode_predictions(&body, &agency.tag, agency.routes.items(), stop, fetched_at)
    }

    // ========================================================================
    // Raw commands
    // ========================================================================

    /// Run any command and return its decoded JSON body, bypassing the
    /// entity graph. Used for `schedule` and the vehicle location commands.
    pub fn fetch_json(&self, command: &Command) -> Result<Value> {
        let body = self.transport.fetch(command)?;
        Ok(decode::parse_json(&body)?)
    }
}

fn stop_not_found(agency: &str, stop_id: &str) -> FeedError {
    FeedError::StopNotFound {
        agency: AgencyTag::new(agency),
        stop: StopId::new(stop_id),
    }
}
