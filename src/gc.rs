use crate::state::AppState;
use tracing::info;

/// Drops expired row and geocode entries. Lookups already ignore them; this
/// only bounds memory.
pub fn purge_expired<S, P>(state: &AppState<S, P>) -> (usize, usize) {
    let rows = state.rows.purge_expired();
    let geocodes = state.geocodes.purge_expired();
    if rows + geocodes > 0 {
        info!(rows, geocodes, "GC: purged expired cache entries");
    }
    (rows, geocodes)
}
