use approx::assert_relative_eq;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use umo_feed::logger::init_test_logger;
use umo_feed::{
    CacheOptions, Command, DecodeError, FeedError, FeedHandler, Fetcher, HandlerConfig, TransportError,
};

const BASE: &str = "http://feed.test/service/publicJSONFeed";

const AGENCY_LIST: &str = "?command=agencyList";
const ROUTE_LIST: &str = "?command=routeList&a=sf-muni";
const ROUTE_CONFIG_N: &str = "?command=routeConfig&a=sf-muni&r=N&verbose";
const ROUTE_CONFIG_L: &str = "?command=routeConfig&a=sf-muni&r=L&verbose";
const PREDICTIONS_15205: &str = "?command=predictions&a=sf-muni&stopId=15205";
const PREDICTIONS_16995: &str = "?command=predictions&a=sf-muni&stopId=16995";

/// Serves canned bodies keyed by query string and records every request.
#[derive(Clone, Default)]
struct ScriptedFeed {
    responses: Arc<Mutex<HashMap<String, &'static str>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFeed {
    fn muni() -> Self {
        let feed = Self::default();
        feed.respond(AGENCY_LIST, include_str!("fixtures/agency_list.json"));
        feed.respond(ROUTE_LIST, include_str!("fixtures/route_list.json"));
        feed.respond(ROUTE_CONFIG_N, include_str!("fixtures/route_config_n.json"));
        feed.respond(ROUTE_CONFIG_L, include_str!("fixtures/route_config_l.json"));
        feed.respond(PREDICTIONS_15205, include_str!("fixtures/predictions_15205.json"));
        feed
    }

    fn respond(&self, query: &str, body: &'static str) {
        self.responses.lock().unwrap().insert(query.to_string(), body);
    }

    fn fail(&self, query: &str) {
        self.failing.lock().unwrap().insert(query.to_string());
    }

    fn recover(&self, query: &str) {
        self.failing.lock().unwrap().remove(query);
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Fetcher for ScriptedFeed {
    fn get(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
        _timeout: Option<Duration>,
    ) -> Result<Bytes, TransportError> {
        let query = url.strip_prefix(BASE).unwrap_or(url).to_string();
        self.requests.lock().unwrap().push(query.clone());

        if self.failing.lock().unwrap().contains(&query) {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        match self.responses.lock().unwrap().get(&query) {
            Some(body) => Ok(Bytes::from_static(body.as_bytes())),
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

fn handler(feed: &ScriptedFeed) -> FeedHandler {
    let config = HandlerConfig::builder().base_uri(BASE).build();
    FeedHandler::with_fetcher(config, feed.clone())
}

#[test]
fn test_agencies_decoded_from_fixture() {
    let _guard = init_test_logger();
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    let agencies = handler.get_agencies(CacheOptions::default()).unwrap();
    assert_eq!(agencies.len(), 2);
    assert_eq!(agencies[0].short_title, "SF Muni");
    assert_eq!(agencies[1].short_title, agencies[1].title);

    let ttc = handler.get_agency("ttc", CacheOptions::default()).unwrap();
    assert_eq!(ttc.region_title, "Ontario");
    assert_eq!(feed.request_count(), 1);

    let err = handler.get_agency("bart", CacheOptions::default()).unwrap_err();
    assert!(matches!(err, FeedError::AgencyNotFound(ref tag) if *tag == "bart"));
    assert!(err.is_not_found());
}

#[test]
fn test_routes_refreshed_once_per_max_age() {
    let _guard = init_test_logger();
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    let routes = handler.get_routes("sf-muni", CacheOptions::default()).unwrap();
    assert_eq!(routes.len(), 2);
    assert_eq!(
        feed.requests(),
        vec![AGENCY_LIST, ROUTE_LIST, ROUTE_CONFIG_N, ROUTE_CONFIG_L]
    );

    handler.get_routes("sf-muni", CacheOptions::default()).unwrap();
    assert_eq!(feed.request_count(), 4);

    thread::sleep(Duration::from_millis(20));
    let short = CacheOptions::default().with_max_age(Duration::from_millis(10));
    handler.get_routes("sf-muni", short).unwrap();
    assert_eq!(feed.request_count(), 7);
    assert_eq!(&feed.requests()[4..], &[ROUTE_LIST, ROUTE_CONFIG_N, ROUTE_CONFIG_L]);
}

#[test]
fn test_bypass_forces_refresh() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    handler.get_agencies(CacheOptions::default()).unwrap();
    handler.get_agencies(CacheOptions::bypass()).unwrap();
    assert_eq!(feed.requests(), vec![AGENCY_LIST, AGENCY_LIST]);
}

#[test]
fn test_agency_refresh_keeps_routes() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    handler.get_routes("sf-muni", CacheOptions::default()).unwrap();
    let agency = handler.get_agency("sf-muni", CacheOptions::bypass()).unwrap();
    assert_eq!(agency.routes().map(<[_]>::len), Some(2));
    assert!(agency.route("N").is_some());
}

#[test]
fn test_route_config_fixture() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    let route = handler.get_route("sf-muni", "N", CacheOptions::default()).unwrap();
    assert_eq!(route.title, "N-Judah");
    assert_eq!(route.services().len(), 2);

    let stop = route.stop("15206").unwrap();
    assert_eq!(stop.short_title, "Judah & 12th");
    assert_relative_eq!(stop.latitude, 37.7620399);
    assert_relative_eq!(stop.longitude, -122.46966);

    let outbound = route.service("N____O_F00").unwrap();
    let order: Vec<_> = route.service_stops(outbound).map(|s| s.tag.as_str()).collect();
    assert_eq!(order, vec!["6995", "5205", "5206"]);

    let err = handler.get_route("sf-muni", "J", CacheOptions::default()).unwrap_err();
    assert!(matches!(err, FeedError::RouteNotFound { .. }));
}

#[test]
fn test_service_lookups() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    let service = handler.get_service("sf-muni", "L____I_F01").unwrap();
    assert_eq!(service.route, "L");
    assert!(!service.use_for_ui);
    assert_eq!(service.stops.len(), 1, "a single stop object is normalized");

    let service = handler.get_service_by_route("sf-muni", "N", "N____I_F00").unwrap();
    assert_eq!(service.name, "Inbound");

    let err = handler.get_service_by_route("sf-muni", "N", "L____I_F01").unwrap_err();
    assert!(matches!(err, FeedError::ServiceNotFound { .. }));
    let err = handler.get_service("sf-muni", "X____O_F00").unwrap_err();
    assert!(matches!(err, FeedError::ServiceNotFound { .. }));
}

#[test]
fn test_unknown_stop_does_not_refresh_again() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    handler.get_routes("sf-muni", CacheOptions::default()).unwrap();
    let before = feed.request_count();

    let err = handler.get_stop("sf-muni", "99999").unwrap_err();
    match err {
        FeedError::StopNotFound { stop, .. } => assert_eq!(stop, "99999"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(feed.request_count(), before);
}

#[test]
fn test_stop_service_routes_narrow_to_serving_services() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    let routes = handler.get_stop_routes("sf-muni", "16995").unwrap();
    let tags: Vec<_> = routes.iter().map(|route| route.tag.as_str()).collect();
    assert_eq!(tags, vec!["N", "L"]);

    let services = handler.get_stop_service_routes("sf-muni", "16995").unwrap();
    let tags: Vec<_> = services.iter().map(|service| service.tag.as_str()).collect();
    assert_eq!(tags, vec!["N____O_F00", "L____O_F01"]);
}

#[test]
fn test_stops_are_unique_in_first_seen_order() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    let stops = handler.get_stops("sf-muni", CacheOptions::default()).unwrap();
    let ids: Vec<_> = stops
        .iter()
        .filter_map(|stop| stop.id.as_ref().map(|id| id.as_str()))
        .collect();
    assert_eq!(ids, vec!["15205", "15206", "16995", "17001"]);

    let stop = handler.get_stop("sf-muni", "16995").unwrap();
    assert_eq!(stop.route, "N", "first route wins");
}

#[test]
fn test_failed_route_refresh_keeps_previous_routes() {
    let _guard = init_test_logger();
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    handler.get_routes("sf-muni", CacheOptions::default()).unwrap();
    feed.fail(ROUTE_CONFIG_L);

    let err = handler.get_routes("sf-muni", CacheOptions::bypass()).unwrap_err();
    assert!(matches!(
        err,
        FeedError::Transport(TransportError::Status { status: 500, .. })
    ));

    let count = feed.request_count();
    let routes = handler.get_routes("sf-muni", CacheOptions::default()).unwrap();
    assert_eq!(routes.len(), 2);
    assert_eq!(feed.request_count(), count, "previous routes are still cached");
}

#[test]
fn test_failed_first_route_refresh_installs_nothing() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    feed.fail(ROUTE_CONFIG_L);
    assert!(handler.get_routes("sf-muni", CacheOptions::default()).is_err());
    let agency = handler.get_agency("sf-muni", CacheOptions::default()).unwrap();
    assert!(agency.routes().is_none());

    feed.recover(ROUTE_CONFIG_L);
    assert_eq!(handler.get_routes("sf-muni", CacheOptions::default()).unwrap().len(), 2);
}

#[test]
fn test_predictions_decoded_and_replaced_wholesale() {
    let _guard = init_test_logger();
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    let predictions = handler
        .get_predictions("sf-muni", "15205", CacheOptions::default())
        .unwrap();
    assert_eq!(predictions.len(), 2, "the no-predictions group is skipped");
    assert_eq!(predictions[0].eta.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    assert_eq!(predictions[0].minutes, 4);
    assert_eq!(predictions[0].service, "N____O_F00");
    assert!(predictions[1].affected_by_layover);

    feed.respond(PREDICTIONS_15205, include_str!("fixtures/predictions_15205_later.json"));
    let predictions = handler
        .get_predictions("sf-muni", "15205", CacheOptions::bypass())
        .unwrap();
    assert_eq!(predictions.len(), 1);
    assert!(predictions[0].schedule_based);
    assert_eq!(predictions[0].trip_tag, "11247790");

    let stop = handler.get_stop("sf-muni", "15205").unwrap();
    assert_eq!(stop.predictions().map(<[_]>::len), Some(1));
}

#[test]
fn test_predictions_respect_max_age_override() {
    let feed = ScriptedFeed::muni();
    let mut handler = handler(&feed);

    let cached = CacheOptions::default().with_max_age(Duration::from_secs(60));
    handler.get_predictions("sf-muni", "15205", cached).unwrap();
    handler.get_predictions("sf-muni", "15205", cached).unwrap();

    let fetches = feed
        .requests()
        .iter()
        .filter(|query| *query == PREDICTIONS_15205)
        .count();
    assert_eq!(fetches, 1);
}

#[test]
fn test_shared_stop_predictions_reach_every_route() {
    let feed = ScriptedFeed::muni();
    feed.respond(PREDICTIONS_16995, include_str!("fixtures/predictions_16995_l.json"));
    let mut handler = handler(&feed);

    let predictions = handler
        .get_predictions("sf-muni", "16995", CacheOptions::default())
        .unwrap();
    assert_eq!(predictions.len(), 1);
    assert!(predictions[0].delayed);
    assert_eq!(predictions[0].route, "L");

    for route in ["N", "L"] {
        let route = handler.get_route("sf-muni", route, CacheOptions::default()).unwrap();
        let stop = route.stop("16995").unwrap();
        assert_eq!(stop.predictions().map(<[_]>::len), Some(1));
    }
}

#[test]
fn test_unresolved_direction_aborts_predictions() {
    let feed = ScriptedFeed::muni();
    feed.respond(
        PREDICTIONS_15205,
        r#"{"predictions": {"direction": {"prediction": {"epochTime": "1700000000000", "dirTag": "J____O_F00"}}}}"#,
    );
    let mut handler = handler(&feed);

    let err = handler
        .get_predictions("sf-muni", "15205", CacheOptions::default())
        .unwrap_err();
    assert!(matches!(err, FeedError::ServiceNotFound { .. }));
    assert!(handler.get_stop("sf-muni", "15205").unwrap().predictions().is_none());
}

#[test]
fn test_malformed_predictions_are_decode_errors() {
    let feed = ScriptedFeed::muni();
    feed.respond(PREDICTIONS_15205, r#"{"predictions": "none"}"#);
    let mut handler = handler(&feed);

    let err = handler
        .get_predictions("sf-muni", "15205", CacheOptions::default())
        .unwrap_err();
    assert!(matches!(err, FeedError::Decode(DecodeError::UnexpectedShape { .. })));
}

#[test]
fn test_route_predictions_bypass_the_cache() {
    let feed = ScriptedFeed::muni();
    let query = "?command=predictions&a=sf-muni&stopId=16995&routeTag=L";
    feed.respond(query, include_str!("fixtures/predictions_16995_l.json"));
    let mut handler = handler(&feed);

    let predictions = handler.fetch_route_predictions("sf-muni", "16995", "L").unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(feed.requests().last().map(String::as_str), Some(query));

    let stop = handler.get_stop("sf-muni", "16995").unwrap();
    assert!(stop.predictions().is_none());
}

#[test]
fn test_fetch_json_passes_commands_through() {
    let feed = ScriptedFeed::muni();
    feed.respond(
        "?command=vehicleLocation&a=sf-muni&v=2040",
        r#"{"vehicle": {"id": "2040", "routeTag": "N", "lat": "37.76", "lon": "-122.46"}}"#,
    );
    let handler = handler(&feed);

    let value = handler
        .fetch_json(&Command::VehicleLocation {
            agency: "sf-muni".into(),
            vehicle: "2040".to_string(),
        })
        .unwrap();
    assert_eq!(value["vehicle"]["routeTag"], "N");

    let err = handler
        .fetch_json(&Command::Schedule {
            agency: "sf-muni".into(),
            route: "N".into(),
        })
        .unwrap_err();
    assert!(matches!(err, FeedError::Transport(TransportError::Status { status: 404, .. })));
}

#[test]
fn test_invalid_retry_delay_rejected_before_network() {
    let feed = ScriptedFeed::muni();
    let config = HandlerConfig::builder()
        .base_uri(BASE)
        .retry_delay(Duration::from_millis(10))
        .build();
    let mut handler = FeedHandler::with_fetcher(config, feed.clone());

    let err = handler.get_agencies(CacheOptions::default()).unwrap_err();
    assert!(matches!(err, FeedError::Config(_)));
    assert_eq!(feed.request_count(), 0);
}
