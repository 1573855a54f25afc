//! Feed tags and stop ids.
//!
//! The feed identifies everything by short strings (`"sf-muni"`, `"N"`,
//! `"N____O_F00"`, `"15205"`). Each kind gets its own type so an agency tag
//! cannot be passed where a route tag is expected. The text lives in an
//! `Arc<str>`, so stops and predictions can name their agency and route
//! without a copy per entity.

use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

macro_rules! feed_tag {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(tag: impl AsRef<str>) -> Self {
                Self(Arc::from(tag.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.as_str() == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.as_str() == *other
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(tag: &str) -> Self {
                Self::new(tag)
            }
        }

        impl From<String> for $name {
            fn from(tag: String) -> Self {
                Self(Arc::from(tag))
            }
        }
    };
}

feed_tag!(
    /// Agency tag, the `a=` query parameter.
    AgencyTag
);
feed_tag!(
    /// Route tag, the `r=` query parameter.
    RouteTag
);
feed_tag!(
    /// Direction tag (`dirTag`) of a service.
    ServiceTag
);
feed_tag!(
    /// Route-local stop tag. Only unique within one route.
    StopTag
);
feed_tag!(
    /// Agency-wide stop id, shared by every route calling at the stop.
    StopId
);
