use crate::cache::{Clock, TtlCache};
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::geocode::{GeocodeProvider, Geocoder, GoogleGeocoder, LatLon};
use crate::source::{CachedSource, RowSource, SupabaseSource};
use crate::table::Table;
use compact_str::CompactString;
use std::sync::Arc;

pub type LiveState = AppState<CachedSource<SupabaseSource>, GoogleGeocoder>;

/// Shared by the HTTP handlers and the background loops.
pub struct AppState<S, P> {
    pub dashboard: Dashboard<S, P>,

    // Table name -> last fetched table
    pub rows: Arc<TtlCache<CompactString, Arc<Table>>>,

    // Address -> coordinates
    pub geocodes: Arc<TtlCache<CompactString, LatLon>>,
}

impl<S: RowSource, P: GeocodeProvider> AppState<S, P> {
    pub fn new(
        dashboard: Dashboard<S, P>,
        rows: Arc<TtlCache<CompactString, Arc<Table>>>,
    ) -> Self {
        let geocodes = dashboard.geocoder().cache().clone();
        Self {
            dashboard,
            rows,
            geocodes,
        }
    }
}

impl LiveState {
    pub fn live(cfg: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;

        let rows = Arc::new(TtlCache::new(clock.clone()));
        let source = CachedSource::new(
            SupabaseSource::new(
                client.clone(),
                cfg.supabase_url.clone(),
                cfg.supabase_key.clone(),
                cfg.table_name.clone(),
            ),
            &cfg.table_name,
            rows.clone(),
            cfg.row_cache_ttl,
        );

        let geocoder = Geocoder::new(
            GoogleGeocoder::new(client, cfg.geocode_url.clone(), cfg.google_maps_api_key.clone()),
            Arc::new(TtlCache::new(clock)),
            cfg.geocode_cache_ttl,
            cfg.geocode_concurrency,
        );

        Ok(Self::new(Dashboard::new(source, geocoder), rows))
    }
}
