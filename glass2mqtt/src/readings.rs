use std::{collections::HashMap, fmt};

use chrono::{DateTime, Local, NaiveDate};
use log::warn;
use reqwest::StatusCode;
use serde_derive::Deserialize;
use serde_json::Value;

use crate::{error::VendorError, session::Session};

const ENTITIES_PATH: &str = "/api/v0-1/virtualentity/";

/// The two meters this bridge tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Meter {
    HeatEnergy,
    HeatEnergyCost,
}

impl Meter {
    pub fn name(&self) -> &'static str {
        match self {
            Meter::HeatEnergy => "heat energy",
            Meter::HeatEnergyCost => "heat energy cost",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [Meter::HeatEnergy, Meter::HeatEnergyCost]
            .into_iter()
            .find(|meter| name.eq_ignore_ascii_case(meter.name()))
    }
}

/// Vendor resource ids for the tracked meters. A missing key means the
/// corresponding readings are unavailable this cycle.
pub type ResourceMap = HashMap<Meter, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadingKind {
    CumulativeKwh,
    TodayKwh,
    TodayCost,
}

impl ReadingKind {
    fn meter(&self) -> Meter {
        match self {
            ReadingKind::CumulativeKwh | ReadingKind::TodayKwh => Meter::HeatEnergy,
            ReadingKind::TodayCost => Meter::HeatEnergyCost,
        }
    }

    /// Divisor from the vendor's unit to the published one. Costs arrive in
    /// minor currency units.
    fn scale(&self) -> f64 {
        match self {
            ReadingKind::TodayCost => 100.0,
            ReadingKind::CumulativeKwh | ReadingKind::TodayKwh => 1.0,
        }
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadingKind::CumulativeKwh => "kWh",
            ReadingKind::TodayKwh => "kWh today",
            ReadingKind::TodayCost => "Cost",
        })
    }
}

/// One polled value. `None`, or any negative number, means "no data".
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub kind: ReadingKind,
    pub value: Option<f64>,
    pub taken_at: DateTime<Local>,
}

impl Reading {
    fn new(kind: ReadingKind, value: Option<f64>) -> Self {
        Self {
            kind,
            value,
            taken_at: Local::now(),
        }
    }

    pub fn unavailable(kind: ReadingKind) -> Self {
        Self::new(kind, None)
    }

    /// The value if it is present and non-negative.
    pub fn valid_value(&self) -> Option<f64> {
        self.value.filter(|value| *value >= 0.0)
    }

    /// [`Reading::valid_value`] converted to the unit that gets published.
    pub fn published_value(&self) -> Option<f64> {
        self.valid_value().map(|value| value / self.kind.scale())
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(f, "{}: {}", self.kind, value / self.kind.scale()),
            None => write!(f, "{}: unavailable", self.kind),
        }
    }
}

#[derive(Deserialize)]
struct VirtualEntity {
    #[serde(default)]
    resources: Vec<EntityResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityResource {
    name: String,
    resource_id: String,
}

#[derive(Deserialize)]
struct DataResponse {
    data: Vec<Vec<Value>>,
}

/// Looks up the resource ids of the tracked meters. Never fails: any problem
/// yields an empty (or partial) map.
pub fn list_resources(session: &Session) -> ResourceMap {
    match fetch_resources(session) {
        Ok(resources) => resources,
        Err(e) => {
            warn!("Could not get resources: {e}");
            ResourceMap::new()
        }
    }
}

fn fetch_resources(session: &Session) -> Result<ResourceMap, VendorError> {
    let response = session.get(ENTITIES_PATH)?;
    if response.status() != StatusCode::OK {
        return Err(VendorError::Status(response.status()));
    }
    let entities: Vec<VirtualEntity> = response
        .json()
        .map_err(|e| VendorError::Malformed(e.to_string()))?;

    let mut resources = ResourceMap::new();
    for resource in entities.into_iter().flat_map(|entity| entity.resources) {
        if let Some(meter) = Meter::from_name(&resource.name) {
            resources.entry(meter).or_insert(resource.resource_id);
        }
    }
    Ok(resources)
}

/// Latest meter read of the heat energy counter.
pub fn read_cumulative(resources: &ResourceMap, session: &Session) -> Reading {
    read(ReadingKind::CumulativeKwh, resources, session, |id| {
        format!("/api/v0-1/resource/{id}/meterread")
    })
}

pub fn read_today_kwh(resources: &ResourceMap, session: &Session) -> Reading {
    read_day_kwh(resources, session, Local::now().date_naive())
}

pub fn read_today_cost(resources: &ResourceMap, session: &Session) -> Reading {
    read_day_cost(resources, session, Local::now().date_naive())
}

/// Energy used on `day`, summed by the vendor.
pub fn read_day_kwh(resources: &ResourceMap, session: &Session, day: NaiveDate) -> Reading {
    read(ReadingKind::TodayKwh, resources, session, |id| {
        day_total_path(id, day)
    })
}

/// Cost accrued on `day` in minor currency units, summed by the vendor.
pub fn read_day_cost(resources: &ResourceMap, session: &Session, day: NaiveDate) -> Reading {
    read(ReadingKind::TodayCost, resources, session, |id| {
        day_total_path(id, day)
    })
}

fn day_total_path(id: &str, day: NaiveDate) -> String {
    let day = day.format("%Y-%m-%d");
    format!(
        "/api/v0-1/resource/{id}/readings?from={day}T00:00:00&to={day}T23:59:59&period=P1D&function=sum"
    )
}

fn read(
    kind: ReadingKind,
    resources: &ResourceMap,
    session: &Session,
    path: impl FnOnce(&str) -> String,
) -> Reading {
    let meter = kind.meter();
    let result = resources
        .get(&meter)
        .ok_or(VendorError::MissingResource(meter.name()))
        .and_then(|id| fetch_first_value(session, &path(id.as_str())));
    match result {
        Ok(value) => Reading::new(kind, value),
        Err(e) => {
            warn!("Could not get {kind} value: {e}");
            Reading::unavailable(kind)
        }
    }
}

fn fetch_first_value(session: &Session, path: &str) -> Result<Option<f64>, VendorError> {
    let response = session.get(path)?;
    if response.status() != StatusCode::OK {
        return Err(VendorError::Status(response.status()));
    }
    let body: DataResponse = response
        .json()
        .map_err(|e| VendorError::Malformed(e.to_string()))?;
    Ok(first_value(&body))
}

fn first_value(body: &DataResponse) -> Option<f64> {
    body.data.first()?.get(1)?.as_f64()
}
