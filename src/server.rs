use crate::error::DashboardError;
use crate::filter::{Choice, Direction, FilterOptions, Selection};
use crate::geocode::GeocodeProvider;
use crate::presentation::Page;
use crate::source::RowSource;
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub cidade: Option<String>,
    #[serde(default)]
    pub sentido: Direction,
    pub bairro: Option<String>,
}

impl FilterQuery {
    fn selection(&self) -> Selection {
        Selection {
            city: Choice::parse(self.cidade.as_deref()),
            direction: self.sentido,
            neighborhood: Choice::parse(self.bairro.as_deref()),
        }
    }
}

#[derive(Debug, Serialize)]
struct OptionsReply {
    halted: bool,
    options: Option<FilterOptions>,
}

#[derive(Debug, Serialize)]
struct ErrorReply {
    error: String,
}

pub fn routes<S, P>(
    state: Arc<AppState<S, P>>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone
where
    S: RowSource + 'static,
    P: GeocodeProvider + 'static,
{
    let state_filter = warp::any().map(move || state.clone());

    // GET /filtros
    let filtros_route = warp::path("filtros")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<FilterQuery>())
        .and(state_filter.clone())
        .and_then(filtros::<S, P>);

    // GET /consultar
    let consultar_route = warp::path("consultar")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<FilterQuery>())
        .and(state_filter)
        .and_then(consultar::<S, P>);

    filtros_route.or(consultar_route).unify()
}

async fn filtros<S: RowSource, P: GeocodeProvider>(
    q: FilterQuery,
    state: Arc<AppState<S, P>>,
) -> Result<Response, Infallible> {
    let city = Choice::parse(q.cidade.as_deref());
    Ok(match state.dashboard.options(&city, q.sentido).await {
        Ok(options) => warp::reply::json(&OptionsReply {
            halted: options.is_none(),
            options,
        })
        .into_response(),
        Err(e) => error_reply(&e),
    })
}

async fn consultar<S: RowSource, P: GeocodeProvider>(
    q: FilterQuery,
    state: Arc<AppState<S, P>>,
) -> Result<Response, Infallible> {
    let mut page = Page::default();
    Ok(match state.dashboard.consult(&q.selection(), &mut page).await {
        Ok(()) => warp::reply::json(&page).into_response(),
        Err(e) => error_reply(&e),
    })
}

fn error_reply(e: &DashboardError) -> Response {
    error!(error = %e, "Request failed");
    let status = match e {
        DashboardError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
        DashboardError::SchemaMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warp::reply::with_status(warp::reply::json(&ErrorReply { error: e.to_string() }), status)
        .into_response()
}
