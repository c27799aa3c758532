// weather_collector - Collector and dashboard renderer for weather station telemetry
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::stations::Station;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Maximum number of characters of a response body kept for diagnostics.
const SNIPPET_CHARS: usize = 200;

/// Characters left unescaped in the `p` parameter, matching the way browsers
/// encode URI components.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Coarse classification of a failed station request, used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Transport,
    Decode,
    Upstream,
    MissingData,
    Store,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::Upstream => "upstream",
            Self::MissingData => "missing_data",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected status {0} for {1}")]
    Unexpected(StatusCode, Url),

    #[error("unable to decode response: {error}; body: {snippet}")]
    Decode {
        #[source]
        error: serde_json::Error,
        snippet: String,
    },

    #[error("upstream rejected request with code {code}: {message}")]
    Upstream { code: i64, message: String },

    #[error("response did not contain an observation")]
    MissingData,
}

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) | Self::Unexpected(_, _) => FailureKind::Transport,
            Self::Decode { .. } => FailureKind::Decode,
            Self::Upstream { .. } => FailureKind::Upstream,
            Self::MissingData => FailureKind::MissingData,
        }
    }
}

#[derive(Debug)]
pub struct TelemetryClient {
    client: Client,
    base_url: Url,
}

impl TelemetryClient {
    const USER_AGENT: &'static str = concat!("weather_collector/", env!("CARGO_PKG_VERSION"));

    /// Create a new client for the service at `base_url`.
    ///
    /// Timeouts are a property of the provided `Client` and bound each station
    /// request individually.
    pub fn new(client: Client, base_url: Url) -> Self {
        TelemetryClient { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the latest observation for a station with a single attempt.
    pub async fn observation(&self, station: &Station) -> Result<RawReading, ClientError> {
        let request_url = self.observation_url(station.id());
        tracing::debug!(message = "making observation request", station = station.id(), url = %request_url);

        let res = self
            .client
            .get(request_url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = res.status();
        if status.is_server_error() {
            return Err(ClientError::Unexpected(status, request_url));
        }

        let body = res.text().await.map_err(ClientError::Transport)?;
        let envelope = serde_json::from_str::<Envelope>(&body).map_err(|e| ClientError::Decode {
            error: e,
            snippet: snippet(&body),
        })?;

        envelope.into_reading()
    }

    fn observation_url(&self, station: &str) -> Url {
        let query = Query {
            b: QueryBody {
                fycx_sstq: QueryStation { stationid: station },
            },
        };

        // Serializing a struct made only of strings cannot fail
        let payload = serde_json::to_string(&query).unwrap_or_default();
        let mut url = self.base_url.clone();
        url.set_query(Some(&format!("p={}", utf8_percent_encode(&payload, QUERY_COMPONENT))));
        url
    }
}

fn snippet(body: &str) -> String {
    let mut out: String = body.chars().take(SNIPPET_CHARS).collect();
    if body.chars().nth(SNIPPET_CHARS).is_some() {
        out.push_str("...");
    }

    out
}

#[derive(Serialize, Debug)]
struct Query<'a> {
    b: QueryBody<'a>,
}

#[derive(Serialize, Debug)]
struct QueryBody<'a> {
    /// Live observation query, also the key of the observation in responses
    fycx_sstq: QueryStation<'a>,
}

#[derive(Serialize, Debug)]
struct QueryStation<'a> {
    stationid: &'a str,
}

#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(default)]
    h: Option<Status>,
    #[serde(default)]
    b: Option<Payload>,
}

impl Envelope {
    fn into_reading(self) -> Result<RawReading, ClientError> {
        if let Some(status) = self.h {
            let code = status.is.unwrap_or(0);
            if code != 0 {
                return Err(ClientError::Upstream {
                    code,
                    message: status.error.unwrap_or_default(),
                });
            }
        }

        self.b.and_then(|b| b.observation).ok_or(ClientError::MissingData)
    }
}

#[derive(Deserialize, Debug)]
struct Status {
    #[serde(default)]
    is: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Payload {
    #[serde(rename = "fycx_sstq", default)]
    observation: Option<RawReading>,
}

/// Observation fields exactly as returned by the upstream service.
///
/// Values arrive as numbers or strings depending on the station so they are
/// kept as JSON values and interpreted when converted to a `Reading`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    #[serde(default)]
    pub wind_speed: Option<Value>,
    #[serde(default)]
    pub rainfall: Option<Value>,
    #[serde(default)]
    pub humidity: Option<Value>,
    #[serde(default)]
    pub wind_dir: Option<Value>,
    /// Air temperature, in degrees celsius
    #[serde(default)]
    pub ct: Option<Value>,
    /// Pressure, in hectopascals
    #[serde(default)]
    pub vaporpressuser: Option<Value>,
    #[serde(default)]
    pub visibility: Option<Value>,
    /// Time the upstream last updated the observation
    #[serde(default)]
    pub upt: Option<Value>,
}

#[cfg(test)]
mod test {
    use super::{ClientError, FailureKind, TelemetryClient};
    use crate::stations::StationRegistry;
    use reqwest::{Client, Url};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    const SERVICE_PATH: &str = "/ztq_sh_jc/service.do";

    fn client_for(server: &MockServer, timeout: Duration) -> TelemetryClient {
        let base: Url = format!("{}{}", server.uri(), SERVICE_PATH).parse().unwrap();
        let http = Client::builder().timeout(timeout).build().unwrap();
        TelemetryClient::new(http, base)
    }

    fn query_for(station: &str) -> String {
        format!(r#"{{"b":{{"fycx_sstq":{{"stationid":"{}"}}}}}}"#, station)
    }

    #[test]
    fn test_observation_url_encoding() {
        let base: Url = "http://ztq.soweather.com:8096/ztq_sh_jc/service.do".parse().unwrap();
        let client = TelemetryClient::new(Client::new(), base);
        let url = client.observation_url("58367");

        assert_eq!(
            "p=%7B%22b%22%3A%7B%22fycx_sstq%22%3A%7B%22stationid%22%3A%2258367%22%7D%7D%7D",
            url.query().unwrap()
        );

        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!("p", key);
        assert_eq!(query_for("58367"), value);
    }

    #[tokio::test]
    async fn test_observation_success() {
        let server = MockServer::start().await;
        let body = json!({
            "h": {"is": 0, "error": ""},
            "b": {"fycx_sstq": {
                "wind_speed": "3.4",
                "rainfall": 0,
                "humidity": "71",
                "wind_dir": "东北",
                "ct": 21.5,
                "vaporpressuser": "1013.2",
                "visibility": "9000",
                "upt": "2024-03-10 07:00"
            }}
        });

        Mock::given(matchers::method("GET"))
            .and(matchers::path(SERVICE_PATH))
            .and(matchers::query_param("p", query_for("58367")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let registry = StationRegistry::shanghai();
        let client = client_for(&server, Duration::from_secs(5));
        let reading = client.observation(registry.get("58367").unwrap()).await.unwrap();

        assert_eq!(Some(json!(21.5)), reading.ct);
        assert_eq!(Some(json!(0)), reading.rainfall);
        assert_eq!(Some(json!("东北")), reading.wind_dir);
    }

    #[tokio::test]
    async fn test_observation_not_json() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let registry = StationRegistry::shanghai();
        let client = client_for(&server, Duration::from_secs(5));
        let err = client.observation(registry.get("58361").unwrap()).await.unwrap_err();

        match err {
            ClientError::Decode { ref snippet, .. } => assert_eq!("not json", snippet),
            ref e => panic!("unexpected error {:?}", e),
        }
        assert_eq!(FailureKind::Decode, err.kind());
    }

    #[tokio::test]
    async fn test_observation_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "h": {"is": 1, "error": "station not found"},
                "b": {}
            })))
            .mount(&server)
            .await;

        let registry = StationRegistry::shanghai();
        let client = client_for(&server, Duration::from_secs(5));
        let err = client.observation(registry.get("58362").unwrap()).await.unwrap_err();

        match err {
            ClientError::Upstream { code, ref message } => {
                assert_eq!(1, code);
                assert_eq!("station not found", message);
            }
            ref e => panic!("unexpected error {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_observation_missing_payload() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"h": {"is": 0}, "b": {}})))
            .mount(&server)
            .await;

        let registry = StationRegistry::shanghai();
        let client = client_for(&server, Duration::from_secs(5));
        let err = client.observation(registry.get("58363").unwrap()).await.unwrap_err();

        assert_eq!(FailureKind::MissingData, err.kind());
    }

    #[tokio::test]
    async fn test_observation_timeout() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"h": {"is": 0}, "b": {"fycx_sstq": {}}}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let registry = StationRegistry::shanghai();
        let client = client_for(&server, Duration::from_millis(100));
        let err = client.observation(registry.get("58365").unwrap()).await.unwrap_err();

        assert_eq!(FailureKind::Transport, err.kind());
    }

    #[test]
    fn test_snippet_truncates() {
        let body = "x".repeat(500);
        let s = super::snippet(&body);
        assert_eq!(203, s.len());
        assert!(s.ends_with("..."));
    }
}
