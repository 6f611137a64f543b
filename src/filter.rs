use crate::error::DashboardError;
use crate::table::{BAIRRO, CIDADE, DISPLAY_COLUMNS, OPTIONAL_COLUMNS, SENTIDO, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ALL_CITIES: &str = "(todas)";
pub const ALL_NEIGHBORHOODS: &str = "(todos)";
const CITY_PLACEHOLDER: &str = "cidade selecionada";

/// A single-choice selector that may also mean "no restriction".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Choice {
    All,
    Only(String),
}

impl Choice {
    /// Empty values and the "(todas)"/"(todos)" sentinels mean `All`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some(ALL_CITIES) | Some(ALL_NEIGHBORHOODS) => Choice::All,
            Some(v) => Choice::Only(v.to_string()),
        }
    }

    pub fn as_only(&self) -> Option<&str> {
        match self {
            Choice::All => None,
            Choice::Only(v) => Some(v.as_str()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    #[serde(alias = "ida", alias = "saindo")]
    Outbound,
    #[serde(alias = "volta", alias = "voltando")]
    Inbound,
}

impl Direction {
    pub fn prefix(self) -> &'static str {
        match self {
            Direction::Outbound => "ida",
            Direction::Inbound => "volta",
        }
    }

    pub fn label(self, city: &Choice) -> String {
        let city = city.as_only().unwrap_or(CITY_PLACEHOLDER);
        match self {
            Direction::Outbound => format!("Saindo de {}", city),
            Direction::Inbound => format!("Voltando para {}", city),
        }
    }

    fn matches(self, value: &str) -> bool {
        value.to_lowercase().starts_with(self.prefix())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub city: Choice,
    pub direction: Direction,
    pub neighborhood: Choice,
}

/// Options offered to the user for the current city and direction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterOptions {
    pub cities: Vec<String>,
    pub directions: Vec<DirectionOption>,
    pub neighborhoods: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DirectionOption {
    pub value: Direction,
    pub label: String,
}

fn filter_city(table: &Table, city: &Choice) -> Table {
    match city.as_only() {
        Some(c) => table.retain_rows(|r| r.equals(CIDADE, c)),
        None => table.clone(),
    }
}

fn filter_direction(table: &Table, direction: Direction) -> Table {
    // Tables without the column are left alone; rows with a blank value never match.
    // The prefix is checked on the raw value, so leading spaces do not match.
    if !table.has_column(SENTIDO) {
        return table.clone();
    }
    table.retain_rows(|r| {
        !r.is_empty(SENTIDO)
            && match r.get(SENTIDO) {
                Some(Value::String(s)) => direction.matches(s),
                Some(other) => direction.matches(&other.to_string()),
                None => false,
            }
    })
}

fn filter_neighborhood(table: &Table, neighborhood: &Choice) -> Table {
    match neighborhood.as_only() {
        Some(b) => table.retain_rows(|r| r.equals(BAIRRO, b)),
        None => table.clone(),
    }
}

/// City, direction and neighborhood narrowing without projection. This is
/// the table the map geocodes.
pub fn select_rows(table: &Table, selection: &Selection) -> Table {
    let out = filter_city(table, &selection.city);
    let out = filter_direction(&out, selection.direction);
    filter_neighborhood(&out, &selection.neighborhood)
}

pub fn apply_filters(table: &Table, selection: &Selection) -> Result<Table, DashboardError> {
    let selected = select_rows(table, selection);

    let mut out = selected
        .project(&DISPLAY_COLUMNS)
        .map_err(|missing| DashboardError::SchemaMismatch { missing })?;

    for column in OPTIONAL_COLUMNS {
        if out.column_all_empty(column) {
            out = out.drop_column(column);
        }
    }

    Ok(out)
}

pub fn filter_options(table: &Table, city: &Choice, direction: Direction) -> FilterOptions {
    let narrowed = filter_direction(&filter_city(table, city), direction);

    let mut cities = vec![ALL_CITIES.to_string()];
    cities.extend(table.distinct(CIDADE));

    let mut neighborhoods = vec![ALL_NEIGHBORHOODS.to_string()];
    neighborhoods.extend(narrowed.distinct(BAIRRO));

    FilterOptions {
        cities,
        directions: [Direction::Outbound, Direction::Inbound]
            .into_iter()
            .map(|d| DirectionOption {
                value: d,
                label: d.label(city),
            })
            .collect(),
        neighborhoods,
    }
}
