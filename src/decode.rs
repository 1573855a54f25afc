//! Builds entities from feed payloads.
//!
//! Every collection goes through [`Record::list`] / [`sequence`] so that a
//! bare object and a one-element array decode the same way.
//!
//! [`sequence`]: crate::normalize::sequence

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::cache::Cached;
use crate::error::{DecodeError, FeedError, Result};
use crate::identifiers::{AgencyTag, RouteTag, ServiceTag, StopId, StopTag};
use crate::models::{Agency, Prediction, Route, Service, Stop, find_service};
use crate::normalize::Record;

/// Present on a prediction group when its direction has nothing scheduled.
pub const NO_PREDICTIONS_MARKER: &str = "dirTitleBecauseNoPredictions";

pub fn parse_json(body: &[u8]) -> std::result::Result<Value, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

pub fn decode_agencies(body: &Value) -> std::result::Result<Vec<Agency>, DecodeError> {
    let root = Record::from_value(body, "body")?;
    root.required_list("agency")?
        .into_iter()
        .map(|record| -> std::result::Result<Agency, DecodeError> {
            let title = record.required_str("title")?;
            Ok(Agency {
                tag: AgencyTag::new(record.required_str("tag")?),
                short_title: record.optional_str("shortTitle").unwrap_or_else(|| title.clone()),
                region_title: record.optional_str("regionTitle").unwrap_or_default(),
                title,
                routes: Cached::empty(),
            })
        })
        .collect()
}

/// Route tags from a `routeList` response. No `route` field means no routes.
pub fn decode_route_list(body: &Value) -> std::result::Result<Vec<RouteTag>, DecodeError> {
    let root = Record::from_value(body, "body")?;
    root.list("route")?
        .into_iter()
        .map(|record| record.required_str("tag").map(RouteTag::new))
        .collect()
}

/// One route with its stops and services from a `routeConfig` response.
///
/// `requested` names the route when the payload omits its tag.
pub fn decode_route_config(
    body: &Value,
    agency: &AgencyTag,
    requested: &RouteTag,
) -> std::result::Result<Route, DecodeError> {
    let root = Record::from_value(body, "body")?;
    let route = root.required_child("route")?;

    let tag = route
        .optional_str("tag")
        .map(RouteTag::new)
        .unwrap_or_else(|| requested.clone());
    let title = route.optional_str("title").unwrap_or_default();
    let short_title = route.optional_str("shortTitle").unwrap_or_else(|| title.clone());

    let mut seen = HashSet::new();
    let mut stops = Vec::new();
    for record in route.list("stop")? {
        let stop = decode_stop(record, agency, &tag)?;
        if seen.insert(stop.tag.clone()) {
            stops.push(stop);
        } else {
            debug!(route = %tag, stop = %stop.tag, "Skipping duplicate stop");
        }
    }

    let services = route
        .list("direction")?
        .into_iter()
        .map(|record| decode_service(record, agency, &tag, &seen))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Route {
        tag,
        title,
        short_title,
        agency: agency.clone(),
        stops,
        services,
    })
}

fn decode_stop(record: Record<'_>, agency: &AgencyTag, route: &RouteTag) -> std::result::Result<Stop, DecodeError> {
    let title = record.optional_str("title").unwrap_or_default();
    Ok(Stop {
        id: record.optional_str("stopId").map(StopId::new),
        tag: StopTag::new(record.required_str("tag")?),
        short_title: record.optional_str("shortTitle").unwrap_or_else(|| title.clone()),
        title,
        longitude: record.optional_f64("lon").unwrap_or_default(),
        latitude: record.optional_f64("lat").unwrap_or_default(),
        agency: agency.clone(),
        route: route.clone(),
        predictions: Cached::empty(),
    })
}

/// Service stops reference the route's stops by tag; tags the route does not
/// know are dropped.
fn decode_service(
    record: Record<'_>,
    agency: &AgencyTag,
    route: &RouteTag,
    route_stops: &HashSet<StopTag>,
) -> std::result::Result<Service, DecodeError> {
    let tag = ServiceTag::new(record.required_str("tag")?);

    let mut stops = Vec::new();
    for stop in record.list("stop")? {
        let stop_tag = StopTag::new(stop.required_str("tag")?);
        if route_stops.contains(&stop_tag) {
            stops.push(stop_tag);
        } else {
            debug!(route = %route, service = %tag, stop = %stop_tag, "Service references unknown stop");
        }
    }

    Ok(Service {
        name: record.optional_str("name").unwrap_or_default(),
        title: record.optional_str("title").unwrap_or_default(),
        use_for_ui: record.flag("useForUI"),
        agency: agency.clone(),
        route: route.clone(),
        tag,
        stops,
    })
}

/// Predictions for `stop` from a `predictions` response.
///
/// The payload nests three collections, each of which may collapse to a bare
/// object: prediction groups, their directions, and the predictions of each
/// direction. Groups carrying [`NO_PREDICTIONS_MARKER`] contribute nothing.
/// Each prediction's direction tag must resolve to a service of `routes`.
pub fn decode_predictions(
    body: &Value,
    agency: &AgencyTag,
    routes: &[Route],
    stop: &StopId,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Prediction>> {
    let root = Record::from_value(body, "body")?;

    let mut predictions = Vec::new();
    for group in root.required_list("predictions")? {
        if group.has(NO_PREDICTIONS_MARKER) {
            continue;
        }
        for direction in group.list("direction")? {
            for record in direction.list("prediction")? {
                predictions.push(decode_prediction(record, agency, routes, stop, fetched_at)?);
            }
        }
    }

    Ok(predictions)
}

fn decode_prediction(
    record: Record<'_>,
    agency: &AgencyTag,
    routes: &[Route],
    stop: &StopId,
    fetched_at: DateTime<Utc>,
) -> Result<Prediction> {
    let service_tag = record.required_str("dirTag")?;
    let (route, service) =
        find_service(routes, &service_tag).ok_or_else(|| FeedError::ServiceNotFound {
            agency: agency.clone(),
            service: ServiceTag::new(&service_tag),
        })?;

    let epoch_ms = record.required_i64("epochTime")?;
    let eta = Utc
        .timestamp_millis_opt(epoch_ms)
        .single()
        .ok_or_else(|| DecodeError::InvalidValue {
            field: "epochTime".to_string(),
            value: epoch_ms.to_string(),
        })?;

    Ok(Prediction {
        agency: agency.clone(),
        route: route.tag.clone(),
        service: service.tag.clone(),
        stop: stop.clone(),
        eta,
        minutes: record.optional_i64("minutes").unwrap_or_default(),
        seconds: record.optional_i64("seconds").unwrap_or_default(),
        branch: record.optional_str("branch").unwrap_or_default(),
        affected_by_layover: record.flag("affectedByLayover"),
        is_departure: record.flag("isDeparture"),
        trip_tag: record.optional_str("tripTag").unwrap_or_default(),
        schedule_based: record.flag("isScheduleBased"),
        delayed: record.flag("delayed"),
        predicted_at: fetched_at,
    })
}
