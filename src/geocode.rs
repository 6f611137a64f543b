use crate::cache::TtlCache;
use crate::error::GeocodeError;
use chrono::Duration;
use compact_str::CompactString;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// One outbound address lookup. `Ok(None)` means the provider had no match.
pub trait GeocodeProvider: Send + Sync {
    fn lookup(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<LatLon>, GeocodeError>> + Send;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

/// Google Maps geocoding API client.
pub struct GoogleGeocoder {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(client: Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

impl GeocodeProvider for GoogleGeocoder {
    async fn lookup(&self, address: &str) -> Result<Option<LatLon>, GeocodeError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GeocodeError::Status(resp.status().to_string()));
        }

        let body: GeocodeResponse = resp
            .json()
            .await
            .map_err(|e| GeocodeError::Malformed(e.to_string()))?;

        match body.status.as_str() {
            "OK" => {
                let first = body
                    .results
                    .into_iter()
                    .next()
                    .ok_or_else(|| GeocodeError::Malformed("status OK without results".into()))?;
                let loc = first.geometry.location;
                Ok(Some(LatLon {
                    lat: loc.lat,
                    lon: loc.lng,
                }))
            }
            "ZERO_RESULTS" => Ok(None),
            other => Err(GeocodeError::Status(other.to_string())),
        }
    }
}

/// Caching front for a provider. Successful lookups are kept for `ttl`;
/// concurrent lookups of the same uncached address share one request and
/// its outcome.
pub struct Geocoder<P> {
    provider: P,
    cache: Arc<TtlCache<CompactString, LatLon>>,
    inflight: DashMap<CompactString, Arc<OnceCell<Option<LatLon>>>>,
    ttl: Duration,
    concurrency: usize,
}

impl<P: GeocodeProvider> Geocoder<P> {
    pub fn new(
        provider: P,
        cache: Arc<TtlCache<CompactString, LatLon>>,
        ttl: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            provider,
            cache,
            inflight: DashMap::new(),
            ttl,
            concurrency: concurrency.max(1),
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache<CompactString, LatLon>> {
        &self.cache
    }

    #[cfg(test)]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn geocode(&self, address: &str) -> Option<LatLon> {
        if address.is_empty() {
            return None;
        }
        let key = CompactString::from(address);
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }

        // Callers that join an in-flight lookup take its outcome, success or not
        let cell = self.inflight.entry(key.clone()).or_default().clone();
        let result = *cell
            .get_or_init(|| async {
                // Another lookup may have filled the cache since our first check
                if let Some(hit) = self.cache.get(&key) {
                    return Some(hit);
                }
                match self.provider.lookup(address).await {
                    Ok(Some(point)) => {
                        self.cache.put(key.clone(), point, self.ttl);
                        Some(point)
                    }
                    Ok(None) => {
                        debug!(address, "No geocoding match");
                        None
                    }
                    Err(e) => {
                        warn!(address, error = %e, "Geocoding failed");
                        None
                    }
                }
            })
            .await;
        // Once finished the slot goes away, so a failed address is retried next time
        self.inflight.remove_if(&key, |_, c| Arc::ptr_eq(c, &cell));
        result
    }

    /// Looks up every address with bounded fan-out. Output order follows input.
    pub async fn geocode_all(&self, addresses: &[String]) -> Vec<Option<LatLon>> {
        let lookups: Vec<_> = addresses.iter().map(|a| self.geocode(a)).collect();
        stream::iter(lookups)
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warp::Filter;

    /// Provider answering from a fixed table, counting calls.
    pub struct FakeProvider {
        pub answers: HashMap<String, LatLon>,
        pub calls: AtomicUsize,
        pub delay_ms: u64,
    }

    impl FakeProvider {
        pub fn new(answers: &[(&str, f64, f64)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(a, lat, lon)| (a.to_string(), LatLon { lat: *lat, lon: *lon }))
                    .collect(),
                calls: AtomicUsize::new(0),
                delay_ms: 0,
            }
        }
    }

    impl GeocodeProvider for FakeProvider {
        async fn lookup(&self, address: &str) -> Result<Option<LatLon>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            match self.answers.get(address) {
                Some(p) => Ok(Some(*p)),
                None => Err(GeocodeError::Status("ZERO_RESULTS".into())),
            }
        }
    }

    fn geocoder(provider: FakeProvider) -> (Arc<ManualClock>, Geocoder<FakeProvider>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(TtlCache::new(clock.clone()));
        (clock, Geocoder::new(provider, cache, Duration::hours(24), 4))
    }

    #[tokio::test]
    async fn test_empty_address_skips_lookup() {
        let (_, g) = geocoder(FakeProvider::new(&[]));
        assert_eq!(g.geocode("").await, None);
        assert_eq!(g.provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeat_lookup_within_ttl_hits_cache() {
        let (clock, g) = geocoder(FakeProvider::new(&[("Rua A, Brasil", -23.5, -46.6)]));

        let first = g.geocode("Rua A, Brasil").await;
        let second = g.geocode("Rua A, Brasil").await;
        assert_eq!(first, Some(LatLon { lat: -23.5, lon: -46.6 }));
        assert_eq!(first, second);
        assert_eq!(g.provider.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::hours(24));
        g.geocode("Rua A, Brasil").await;
        assert_eq!(g.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (_, g) = geocoder(FakeProvider::new(&[]));
        assert_eq!(g.geocode("Nowhere, Brasil").await, None);
        assert_eq!(g.geocode("Nowhere, Brasil").await, None);
        assert_eq!(g.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_collapse_per_address() {
        let mut provider = FakeProvider::new(&[("Rua A, Brasil", 1.0, 2.0), ("Rua B, Brasil", 3.0, 4.0)]);
        provider.delay_ms = 20;
        let (_, g) = geocoder(provider);

        let addresses: Vec<String> = ["Rua A, Brasil", "Rua B, Brasil", "Rua A, Brasil", "Rua A, Brasil"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = g.geocode_all(&addresses).await;

        assert_eq!(
            out,
            vec![
                Some(LatLon { lat: 1.0, lon: 2.0 }),
                Some(LatLon { lat: 3.0, lon: 4.0 }),
                Some(LatLon { lat: 1.0, lon: 2.0 }),
                Some(LatLon { lat: 1.0, lon: 2.0 }),
            ]
        );
        assert_eq!(g.provider.calls.load(Ordering::SeqCst), 2);
        assert!(g.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_lookup() {
        let mut provider = FakeProvider::new(&[]);
        provider.delay_ms = 20;
        let (_, g) = geocoder(provider);

        let addresses = vec!["Rua Perdida, Brasil".to_string(); 4];
        let out = g.geocode_all(&addresses).await;

        assert_eq!(out, vec![None; 4]);
        assert_eq!(g.provider.calls.load(Ordering::SeqCst), 1);
        assert!(g.inflight.is_empty());

        // Nothing was cached, so the next request asks again
        assert_eq!(g.geocode("Rua Perdida, Brasil").await, None);
        assert_eq!(g.provider.calls.load(Ordering::SeqCst), 2);
    }

    async fn serve_geocoder(body: serde_json::Value) -> String {
        let route = warp::path!("geocode" / "json")
            .and(warp::query::<HashMap<String, String>>())
            .map(move |q: HashMap<String, String>| {
                let mut body = body.clone();
                body["echo_address"] = q.get("address").cloned().into();
                body["echo_key"] = q.get("key").cloned().into();
                warp::reply::json(&body)
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{}/geocode/json", addr)
    }

    #[tokio::test]
    async fn test_google_geocoder_reads_first_location() {
        let url = serve_geocoder(serde_json::json!({
            "status": "OK",
            "results": [
                {"geometry": {"location": {"lat": -23.55, "lng": -46.63}}},
                {"geometry": {"location": {"lat": 0.0, "lng": 0.0}}}
            ]
        }))
        .await;
        let google = GoogleGeocoder::new(Client::new(), url, "k".into());

        let got = google.lookup("Rua A, Centro, São Paulo, Brasil").await.unwrap();
        assert_eq!(got, Some(LatLon { lat: -23.55, lon: -46.63 }));
    }

    #[tokio::test]
    async fn test_google_geocoder_non_ok_status_is_absent() {
        let url = serve_geocoder(serde_json::json!({"status": "REQUEST_DENIED", "results": []})).await;
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let g = Geocoder::new(
            GoogleGeocoder::new(Client::new(), url, "bad".into()),
            Arc::new(TtlCache::new(clock)),
            Duration::hours(24),
            2,
        );
        assert_eq!(g.geocode("Rua A, Brasil").await, None);
        assert_eq!(g.cache().len(), 0);
    }

    #[tokio::test]
    async fn test_google_geocoder_malformed_body() {
        let url = serve_geocoder(serde_json::json!({"unexpected": true})).await;
        let google = GoogleGeocoder::new(Client::new(), url, "k".into());
        assert!(matches!(
            google.lookup("Rua A").await,
            Err(GeocodeError::Malformed(_))
        ));
    }
}
