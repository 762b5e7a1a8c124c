use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::header::{ACCEPT, AUTHORIZATION, LINK};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::{error, info};

use crate::config::{EnvSettings, FetcherConfig};
use crate::modules::error::ExportError;
use crate::modules::event_fetcher::event::{FlatRecord, SentryEvent};

pub mod event;

type HttpsClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

// Handles
// - Authenticated paginated retrieval from the events listing endpoint
// - Flattening each raw event into a CSV-ready record
// - Following Link headers until exhausted or the event cap is reached
pub struct EventFetcher {

    // HTTP client shared across all page fetches
    http_client: HttpsClient,

    // Fetch tunables from Config.toml
    config: FetcherConfig,

    // Organization/project identifiers and the auth token
    settings: EnvSettings,
}

impl EventFetcher {
    pub fn new(config: FetcherConfig, settings: EnvSettings) -> Self {
        // Plain http stays allowed so tests can target a loopback server
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let http_client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            http_client,
            config,
            settings,
        }
    }

    // First page of the events listing; later pages come from Link headers
    fn events_url(&self) -> String {
        format!(
            "{}/projects/{}/{}/events/?full=true",
            self.config.api_base_url, self.settings.organization_id, self.settings.project_slug
        )
    }

    // Fetch pages sequentially until there is no next link or the event cap
    // is reached. Any failure mid-run stops pagination and returns whatever
    // was accumulated so far; there are no retries.
    pub async fn fetch_all(&self) -> Vec<FlatRecord> {
        let mut records = Vec::new();
        let mut next_url = Some(self.events_url());

        while let Some(url) = next_url {
            // The cap is checked before the fetch, so a page that crosses it
            // is still kept whole
            if records.len() >= self.config.max_events {
                info!(
                    "event cap of {} reached, stopping pagination",
                    self.config.max_events
                );
                break;
            }

            match self.fetch_page(&url).await {
                Ok((page, link)) => {
                    info!("fetched {} events from {}", page.len(), url);
                    records.extend(page);
                    next_url = link;
                }
                Err(e) => {
                    error!("error fetching events page {}: {}", url, e);
                    break;
                }
            }
        }

        records
    }

    // Fetch and flatten a single page, returning the records together with
    // the next page URL if the Link header advertises one
    async fn fetch_page(
        &self,
        url: &str,
    ) -> Result<(Vec<FlatRecord>, Option<String>), ExportError> {
        let request = Request::get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.settings.auth_token))
            .header(ACCEPT, "application/json")
            .body(Empty::new())
            .map_err(|e| ExportError::Transport(e.to_string()))?;

        let response = self
            .http_client
            .request(request)
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;

        // The Link header has to be read before the body consumes the response
        let status = response.status();
        let link_header = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            return Err(ExportError::HttpStatus(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        let events: Vec<SentryEvent> =
            serde_json::from_slice(&body).map_err(|e| ExportError::JsonDecode(e.to_string()))?;

        let mut page = Vec::with_capacity(events.len());
        for event in events {
            page.push(FlatRecord::from_event(
                event,
                &self.settings.organization_id,
                &self.config.web_base_url,
            )?);
        }

        let next = link_header.as_deref().and_then(parse_next_link);
        Ok((page, next))
    }
}

// A Link segment only advances pagination when it both points forward and
// reports that more results exist. The rel="previous" segment sent first in
// the same header never matches.
fn parse_next_link(header: &str) -> Option<String> {
    for segment in header.split(',') {
        if !segment.contains(r#"rel="next""#) || !segment.contains(r#"results="true""#) {
            continue;
        }
        if let (Some(start), Some(end)) = (segment.find('<'), segment.find('>')) {
            if start < end {
                return Some(segment[start + 1..end].to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::{Query, State};
    use axum::http::{header, Response};
    use axum::routing::get;
    use axum::Router;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    // One page the fake API can serve: a JSON body plus an optional Link header
    struct FakePage {
        body: Value,
        link: Option<String>,
    }

    struct FakeSentryApi {
        pages: Vec<FakePage>,
        requests: AtomicUsize,
    }

    async fn events_route(
        State(state): State<Arc<FakeSentryApi>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response<Body> {
        state.requests.fetch_add(1, Ordering::SeqCst);

        // The cursor query parameter doubles as the page index; a cursor
        // pointing past the configured pages simulates an upstream failure
        let index: usize = params
            .get("cursor")
            .and_then(|cursor| cursor.parse().ok())
            .unwrap_or(0);
        let Some(page) = state.pages.get(index) else {
            return Response::builder()
                .status(500)
                .body(Body::from("internal error"))
                .unwrap();
        };

        let mut builder = Response::builder()
            .status(200)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(link) = &page.link {
            builder = builder.header(header::LINK, link.clone());
        }
        builder.body(Body::from(page.body.to_string())).unwrap()
    }

    // Serve the configured pages on a random loopback port. The page builder
    // gets the base URL so Link headers can point back at the server.
    async fn start_fake_api(
        build_pages: impl FnOnce(&str) -> Vec<FakePage>,
    ) -> (String, Arc<FakeSentryApi>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/api/0", listener.local_addr().unwrap());

        let state = Arc::new(FakeSentryApi {
            pages: build_pages(&base_url),
            requests: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/api/0/projects/{org}/{project}/events/", get(events_route))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (base_url, state)
    }

    fn fetcher_for(base_url: &str, max_events: usize) -> EventFetcher {
        EventFetcher::new(
            FetcherConfig {
                api_base_url: base_url.to_string(),
                web_base_url: "https://sentry.io".to_string(),
                max_events,
            },
            EnvSettings {
                organization_id: "acme".to_string(),
                project_slug: "recycling-api".to_string(),
                auth_token: "test-token".to_string(),
                bucket_name: "unused".to_string(),
            },
        )
    }

    fn event_json(group: &str, event: &str) -> Value {
        json!({
            "groupID": group,
            "eventID": event,
            "projectID": "42",
            "type": "error",
            "title": "ValueError",
            "message": "boom",
            "platform": "python",
            "culprit": "collector.handle",
            "dateCreated": "2024-03-05T12:30:45.123456Z",
            "entries": [],
        })
    }

    fn next_link(base_url: &str, cursor: usize) -> String {
        format!(
            "<{base_url}/projects/acme/recycling-api/events/?full=true&cursor=0>; \
             rel=\"previous\"; results=\"false\"; cursor=\"0:0:1\", \
             <{base_url}/projects/acme/recycling-api/events/?full=true&cursor={cursor}>; \
             rel=\"next\"; results=\"true\"; cursor=\"0:{cursor}:0\""
        )
    }

    #[tokio::test]
    async fn follows_next_links_and_merges_pages_in_order() {
        let (base_url, api) = start_fake_api(|base| {
            vec![
                FakePage {
                    body: json!([event_json("1", "a"), event_json("1", "b")]),
                    link: Some(next_link(base, 1)),
                },
                FakePage {
                    body: json!([event_json("2", "c")]),
                    link: Some(next_link(base, 2)),
                },
                FakePage {
                    body: json!([event_json("3", "d")]),
                    link: None,
                },
            ]
        })
        .await;

        let records = fetcher_for(&base_url, 1000).fetch_all().await;

        assert_eq!(api.requests.load(Ordering::SeqCst), 3);
        let ids: Vec<&str> = records.iter().map(|r| r.event_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn next_link_without_results_marker_stops_pagination() {
        let (base_url, api) = start_fake_api(|base| {
            vec![FakePage {
                body: json!([event_json("1", "a")]),
                link: Some(format!(
                    "<{base}/projects/acme/recycling-api/events/?cursor=1>; \
                     rel=\"next\"; results=\"false\"; cursor=\"0:1:0\"",
                    base = base
                )),
            }]
        })
        .await;

        let records = fetcher_for(&base_url, 1000).fetch_all().await;

        assert_eq!(api.requests.load(Ordering::SeqCst), 1);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn stops_once_the_event_cap_is_reached() {
        // Three 500-event pages all advertising a next page; the cap of 1000
        // is hit after the second fetch, before the third request goes out
        let (base_url, api) = start_fake_api(|base| {
            (0..3usize)
                .map(|index| {
                    let events: Vec<Value> = (0..500)
                        .map(|n| event_json("g", &format!("e{}-{}", index, n)))
                        .collect();
                    FakePage {
                        body: Value::Array(events),
                        link: Some(next_link(base, index + 1)),
                    }
                })
                .collect()
        })
        .await;

        let records = fetcher_for(&base_url, 1000).fetch_all().await;

        assert_eq!(api.requests.load(Ordering::SeqCst), 2);
        assert_eq!(records.len(), 1000);
    }

    #[tokio::test]
    async fn mid_run_failure_returns_accumulated_events() {
        // Page 0 links to a cursor the server has no page for, which makes
        // the second request come back as a 500
        let (base_url, api) = start_fake_api(|base| {
            vec![FakePage {
                body: json!([event_json("1", "a"), event_json("1", "b")]),
                link: Some(next_link(base, 7)),
            }]
        })
        .await;

        let records = fetcher_for(&base_url, 1000).fetch_all().await;

        assert_eq!(api.requests.load(Ordering::SeqCst), 2);
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_no_events() {
        // Nothing listens on port 1
        let records = fetcher_for("http://127.0.0.1:1/api/0", 1000).fetch_all().await;
        assert!(records.is_empty());
    }

    #[test]
    fn parses_the_next_url_out_of_a_link_header() {
        let header = "<https://sentry.io/api/0/projects/acme/recycling-api/events/?cursor=0:0:1>; \
                      rel=\"previous\"; results=\"false\"; cursor=\"0:0:1\", \
                      <https://sentry.io/api/0/projects/acme/recycling-api/events/?cursor=0:100:0>; \
                      rel=\"next\"; results=\"true\"; cursor=\"0:100:0\"";
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://sentry.io/api/0/projects/acme/recycling-api/events/?cursor=0:100:0")
        );
    }

    #[test]
    fn next_link_requires_the_results_marker() {
        let header = "<https://sentry.io/api/0/projects/acme/recycling-api/events/?cursor=0:100:0>; \
                      rel=\"next\"; results=\"false\"; cursor=\"0:100:0\"";
        assert_eq!(parse_next_link(header), None);
    }

    #[test]
    fn malformed_link_segments_are_ignored() {
        assert_eq!(parse_next_link("rel=\"next\"; results=\"true\""), None);
        assert_eq!(parse_next_link(""), None);
    }
}
