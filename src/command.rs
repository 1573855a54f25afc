//! Feed commands and their query strings.
//!
//! Feed API: https://retro.umoiq.com/service/publicJSONFeed
//! - agencyList
//! - routeList        a=<agency>
//! - routeConfig      a=<agency>&r=<route>&verbose
//! - schedule         a=<agency>&r=<route>
//! - vehicleLocations a=<agency>&r=<route>&t=<epoch ms>
//! - vehicleLocation  a=<agency>&v=<vehicle>
//! - predictions      a=<agency>&stopId=<stop>[&routeTag=<route>]

use std::fmt;

use crate::identifiers::{AgencyTag, RouteTag, StopId};

pub const FEED_URI: &str = "https://retro.umoiq.com/service/publicJSONFeed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AgencyList,
    RouteList {
        agency: AgencyTag,
    },
    RouteConfig {
        agency: AgencyTag,
        route: RouteTag,
    },
    Schedule {
        agency: AgencyTag,
        route: RouteTag,
    },
    VehicleLocations {
        agency: AgencyTag,
        route: RouteTag,
        since: i64,
    },
    VehicleLocation {
        agency: AgencyTag,
        vehicle: String,
    },
    Predictions {
        agency: AgencyTag,
        stop: StopId,
        route: Option<RouteTag>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AgencyList => "agencyList",
            Command::RouteList { .. } => "routeList",
            Command::RouteConfig { .. } => "routeConfig",
            Command::Schedule { .. } => "schedule",
            Command::VehicleLocations { .. } => "vehicleLocations",
            Command::VehicleLocation { .. } => "vehicleLocation",
            Command::Predictions { .. } => "predictions",
        }
    }

    pub fn query(&self) -> String {
        let name = self.name();
        match self {
            Command::AgencyList => format!("?command={}", name),
            Command::RouteList { agency } => format!("?command={}&a={}", name, agency),
            Command::RouteConfig { agency, route } => {
                format!("?command={}&a={}&r={}&verbose", name, agency, route)
            }
            Command::Schedule { agency, route } => {
                format!("?command={}&a={}&r={}", name, agency, route)
            }
            Command::VehicleLocations { agency, route, since } => {
                format!("?command={}&a={}&r={}&t={}", name, agency, route, since)
            }
            Command::VehicleLocation { agency, vehicle } => {
                format!("?command={}&a={}&v={}", name, agency, vehicle)
            }
            Command::Predictions { agency, stop, route } => {
                let mut query = format!("?command={}&a={}&stopId={}", name, agency, stop);
                if let Some(route) = route {
                    query.push_str("&routeTag=");
                    query.push_str(route.as_str());
                }
                query
            }
        }
    }

    pub fn url(&self, base_uri: &str) -> String {
        format!("{}{}", base_uri.trim_end_matches('?'), self.query())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query())
    }
}
