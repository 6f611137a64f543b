use crate::address::build_address;
use crate::error::DashboardError;
use crate::filter::{self, Choice, Direction, FilterOptions, Selection};
use crate::geocode::{GeocodeProvider, Geocoder, LatLon};
use crate::presentation::{Pin, Presenter};
use crate::source::RowSource;
use crate::table::CIDADE;
use tracing::info;

pub const NO_POINTS_WARNING: &str = "Nenhum ponto geocodificado.";
pub const CHOOSE_FILTERS_INFO: &str = "Selecione os filtros e clique em Consultar.";

const WIDE_ZOOM: f64 = 14.5;
const CLOSE_ZOOM: f64 = 15.5;

/// Fetch → filter → geocode pipeline. Knows nothing about how results are drawn.
pub struct Dashboard<S, P> {
    source: S,
    geocoder: Geocoder<P>,
}

impl<S: RowSource, P: GeocodeProvider> Dashboard<S, P> {
    pub fn new(source: S, geocoder: Geocoder<P>) -> Self {
        Self { source, geocoder }
    }

    pub fn geocoder(&self) -> &Geocoder<P> {
        &self.geocoder
    }

    /// Selector contents for the current city/direction. `None` when the
    /// source table is empty and nothing can be offered.
    pub async fn options(
        &self,
        city: &Choice,
        direction: Direction,
    ) -> Result<Option<FilterOptions>, DashboardError> {
        let table = self.source.fetch_all().await?;
        if table.is_empty() {
            return Ok(None);
        }
        Ok(Some(filter::filter_options(&table, city, direction)))
    }

    /// One explicit "Consultar" cycle.
    pub async fn consult(
        &self,
        selection: &Selection,
        out: &mut impl Presenter,
    ) -> Result<(), DashboardError> {
        let table = self.source.fetch_all().await?;
        if table.is_empty() {
            out.halt();
            return Ok(());
        }

        if selection.city == Choice::All {
            out.render_info(CHOOSE_FILTERS_INFO);
            return Ok(());
        }

        let filtered = filter::apply_filters(&table, selection)?;
        info!(
            city = ?selection.city,
            direction = ?selection.direction,
            neighborhood = ?selection.neighborhood,
            rows = filtered.len(),
            "Consulted"
        );
        // City is already the selection, so the grid leaves it out
        out.render_table(&filtered.drop_column(CIDADE));

        if selection.neighborhood == Choice::All {
            return Ok(());
        }

        let addresses: Vec<String> = filtered.rows.iter().map(build_address).collect();
        let points = self.geocoder.geocode_all(&addresses).await;

        let pins: Vec<Pin> = filtered
            .rows
            .iter()
            .zip(addresses)
            .zip(points)
            .filter_map(|((row, address), point)| point.map(|p| Pin::new(row, address, p)))
            .collect();

        if pins.is_empty() {
            out.render_warning(NO_POINTS_WARNING);
            out.halt();
            return Ok(());
        }

        let center = mean_center(&pins);
        let zoom = if pins.len() > 3 { WIDE_ZOOM } else { CLOSE_ZOOM };
        out.render_map(pins, center, zoom);
        Ok(())
    }
}

fn mean_center(pins: &[Pin]) -> LatLon {
    let n = pins.len() as f64;
    let (lat, lon) = pins
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.position.lat, lon + p.position.lon));
    LatLon {
        lat: lat / n,
        lon: lon / n,
    }
}
