use std::future::Future;

use reqwest::{Client, Url};
use thiserror::Error;
use tracing::debug;

pub mod records;
use records::*;

use crate::models::{Stop, StopTime, Vehicle, VehicleInfo};

pub const STOPS_PATH: &str = "api/stops";
pub const ACTIVE_VEHICLES_PATH: &str = "api/vehicles/active/ttss";
pub const VEHICLES_PATH: &str = "api/vehicles";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Empty response body from {0}")]
    EmptyBody(String),
    #[error("Response is missing field: {0}")]
    MissingField(String),
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
}

/// The upstream transit data source.
pub trait TransitApi: Send + Sync + 'static {
    fn fetch_stops(&self) -> impl Future<Output = Result<Vec<Stop>, Error>> + Send;

    fn fetch_stop_times(
        &self,
        stop_name: &str,
    ) -> impl Future<Output = Result<Vec<StopTime>, Error>> + Send;

    fn fetch_active_vehicles(&self) -> impl Future<Output = Result<Vec<Vehicle>, Error>> + Send;

    fn fetch_vehicle_info(&self) -> impl Future<Output = Result<Vec<VehicleInfo>, Error>> + Send;
}

/// `TransitApi` over HTTP + JSON. Never retries; callers own that policy.
#[derive(Debug, Clone)]
pub struct HttpTransitApi {
    client: Client,
    base: Url,
}

impl HttpTransitApi {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let base = Url::parse(base_url).map_err(|err| Error::InvalidUrl(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, Error> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Vec<u8>, Error> {
        debug!("GET {url}");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        // A 2xx with nothing in it is what a preflight short-circuit looks like.
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::EmptyBody(url.to_string()));
        }
        Ok(body.to_vec())
    }
}

impl TransitApi for HttpTransitApi {
    async fn fetch_stops(&self) -> Result<Vec<Stop>, Error> {
        let url = self.url(STOPS_PATH.split('/'))?;
        let body = self.get(url).await?;
        decode_list::<StopRecord, _>(&body, "stops")
    }

    async fn fetch_stop_times(&self, stop_name: &str) -> Result<Vec<StopTime>, Error> {
        let url = self.url(
            STOPS_PATH
                .split('/')
                .chain([stop_name, "current_stop_times"]),
        )?;
        let body = self.get(url).await?;
        decode_list::<StopTimeRecord, _>(&body, "current_stop_times")
    }

    async fn fetch_active_vehicles(&self) -> Result<Vec<Vehicle>, Error> {
        let url = self.url(ACTIVE_VEHICLES_PATH.split('/'))?;
        let body = self.get(url).await?;
        decode_list::<VehicleRecord, _>(&body, "vehicles")
    }

    async fn fetch_vehicle_info(&self) -> Result<Vec<VehicleInfo>, Error> {
        let url = self.url(VEHICLES_PATH.split('/'))?;
        let body = self.get(url).await?;
        decode_list::<VehicleInfoRecord, _>(&body, "vehicles")
    }
}

#[test]
fn stop_times_url_is_encoded() {
    let api = HttpTransitApi::new("http://localhost:8787/").unwrap();
    let url = api
        .url(
            STOPS_PATH
                .split('/')
                .chain(["Rondo Mogilskie/Lubicz", "current_stop_times"]),
        )
        .unwrap();
    assert_eq!(
        url.as_str(),
        "http://localhost:8787/api/stops/Rondo%20Mogilskie%2FLubicz/current_stop_times"
    );
}
