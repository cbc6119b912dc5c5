use crate::buffer::PointBuffer;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_PORT: u16 = 8086;
const DEFAULT_PRECISION: &str = "s";
const DEFAULT_BUFFER_SIZE: usize = 100;
const DEFAULT_BUFFER_MAX_AGE_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("required setting '{setting}' not provided for destination '{name}'")]
    MissingSetting { name: String, setting: String },
    #[error("invalid setting '{setting}' for destination '{name}': {reason}")]
    InvalidSetting {
        name: String,
        setting: String,
        reason: String,
    },
    #[error("invalid endpoint for destination '{name}': {source}")]
    InvalidEndpoint {
        name: String,
        #[source]
        source: url::ParseError,
    },
    #[error("duplicate destination name '{0}'")]
    DuplicateName(String),
}

/// Raw per-destination settings as they appear in the configuration
/// file. All fields optional: additional destinations inherit anything
/// they do not override from the default destination.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationSettings {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub ssl: Option<bool>,
    pub precision: Option<String>,
    pub retention_policy: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub buffer_size: Option<usize>,
    pub buffer_max_age: Option<u64>,
    pub proxy_mode: Option<bool>,
}

impl DestinationSettings {
    /// Field-by-field inheritance: `self` wins, `base` fills the gaps.
    pub fn merged_over(&self, base: &Self) -> Self {
        Self {
            hostname: self.hostname.clone().or_else(|| base.hostname.clone()),
            port: self.port.or(base.port),
            database: self.database.clone().or_else(|| base.database.clone()),
            ssl: self.ssl.or(base.ssl),
            precision: self.precision.clone().or_else(|| base.precision.clone()),
            retention_policy: self
                .retention_policy
                .clone()
                .or_else(|| base.retention_policy.clone()),
            username: self.username.clone().or_else(|| base.username.clone()),
            password: self.password.clone().or_else(|| base.password.clone()),
            buffer_size: self.buffer_size.or(base.buffer_size),
            buffer_max_age: self.buffer_max_age.or(base.buffer_max_age),
            proxy_mode: self.proxy_mode.or(base.proxy_mode),
        }
    }
}

/// A named, independently configured output target. Created once at
/// configuration load, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Destination {
    pub name: String,
    pub endpoint: Url,
    pub buffer_size: usize,
    pub buffer_max_age: Duration,
    pub proxy_mode: bool,
}

impl Destination {
    pub fn from_settings(name: &str, settings: &DestinationSettings) -> Result<Self, RouteError> {
        let missing = |setting: &str| RouteError::MissingSetting {
            name: name.to_string(),
            setting: setting.to_string(),
        };
        let hostname = settings.hostname.as_deref().ok_or_else(|| missing("hostname"))?;
        let database = settings.database.as_deref().ok_or_else(|| missing("database"))?;

        let buffer_size = settings.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let buffer_max_age = settings
            .buffer_max_age
            .unwrap_or(DEFAULT_BUFFER_MAX_AGE_SECS);
        let invalid = |setting: &str| RouteError::InvalidSetting {
            name: name.to_string(),
            setting: setting.to_string(),
            reason: "must be greater than zero".to_string(),
        };
        if buffer_size == 0 {
            return Err(invalid("buffer_size"));
        }
        if buffer_max_age == 0 {
            return Err(invalid("buffer_max_age"));
        }

        let endpoint = build_write_url(name, settings, hostname, database)?;

        Ok(Self {
            name: name.to_string(),
            endpoint,
            buffer_size,
            buffer_max_age: Duration::from_secs(buffer_max_age),
            proxy_mode: settings.proxy_mode.unwrap_or(false),
        })
    }
}

/// `scheme://host:port/write?db=<db>&precision=<p>[&rp=..][&u=..&p=..]`
fn build_write_url(
    name: &str,
    settings: &DestinationSettings,
    hostname: &str,
    database: &str,
) -> Result<Url, RouteError> {
    let scheme = if settings.ssl.unwrap_or(false) {
        "https"
    } else {
        "http"
    };
    let port = settings.port.unwrap_or(DEFAULT_PORT);
    let precision = settings.precision.as_deref().unwrap_or(DEFAULT_PRECISION);

    let mut url = Url::parse(&format!("{scheme}://{hostname}:{port}/write")).map_err(|e| {
        RouteError::InvalidEndpoint {
            name: name.to_string(),
            source: e,
        }
    })?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("db", database);
        query.append_pair("precision", precision);
        if let Some(rp) = settings.retention_policy.as_deref() {
            query.append_pair("rp", rp);
        }
        // Auth rides in the query string only when both halves are set.
        if let (Some(user), Some(pass)) = (
            settings.username.as_deref(),
            settings.password.as_deref(),
        ) {
            query.append_pair("u", user);
            query.append_pair("p", pass);
        }
    }
    Ok(url)
}

/// One destination together with the buffer it exclusively owns.
#[derive(Debug)]
pub struct Route {
    pub destination: Destination,
    pub buffer: PointBuffer,
}

/// All configured destinations. Index 0 is always the default.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(default: Destination, additional: Vec<Destination>) -> Result<Self, RouteError> {
        let mut routes = Vec::with_capacity(1 + additional.len());
        for destination in std::iter::once(default).chain(additional) {
            if routes
                .iter()
                .any(|r: &Route| r.destination.name == destination.name)
            {
                return Err(RouteError::DuplicateName(destination.name));
            }
            routes.push(Route {
                destination,
                buffer: PointBuffer::new(),
            });
        }
        Ok(Self { routes })
    }

    /// Picks the first handler name that matches a configured destination;
    /// falls back to the default. Exactly one destination per event.
    pub fn resolve(&self, handlers: &[String]) -> usize {
        for handler in handlers {
            if let Some(idx) = self
                .routes
                .iter()
                .position(|r| r.destination.name == *handler)
            {
                return idx;
            }
        }
        0
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn route(&self, idx: usize) -> &Route {
        &self.routes[idx]
    }

    pub fn route_mut(&mut self, idx: usize) -> &mut Route {
        &mut self.routes[idx]
    }
}
