use crate::address::COUNTRY;
use crate::geocode::LatLon;
use crate::table::{BAIRRO, CIDADE, REFERENCIA, RUA, Row, Table};
use compact_str::CompactString;
use serde::Serialize;
use serde_json::Value;

pub const MAP_STYLE: &str = "mapbox://styles/mapbox/light-v9";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Icon {
    pub url: &'static str,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "anchorY")]
    pub anchor_y: u32,
}

pub const BUS_STOP_ICON: Icon = Icon {
    url: "https://cdn-icons-png.flaticon.com/512/3448/3448339.png",
    width: 128,
    height: 128,
    anchor_y: 128,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pin {
    pub position: LatLon,
    pub address: String,
    pub tooltip: String,
}

impl Pin {
    pub fn new(row: &Row, address: String, position: LatLon) -> Self {
        let field = |f: &str| row.text(f).unwrap_or_default();
        let tooltip = [field(RUA), field(BAIRRO), field(CIDADE), field(REFERENCIA)]
            .into_iter()
            .chain(std::iter::once(COUNTRY.to_string()))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            position,
            address,
            tooltip,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapView {
    pub center: LatLon,
    pub zoom: f64,
    pub pitch: f64,
    pub style: &'static str,
    pub icon: Icon,
    pub pins: Vec<Pin>,
}

/// Read-only grid: column headers plus one row of cells per record, with a
/// zero-based position.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Grid {
    pub columns: Vec<CompactString>,
    pub rows: Vec<GridRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GridRow {
    pub index: usize,
    pub cells: Vec<Value>,
}

impl From<&Table> for Grid {
    fn from(table: &Table) -> Self {
        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| GridRow {
                index,
                cells: table
                    .columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect(),
            })
            .collect();
        Grid {
            columns: table.columns.clone(),
            rows,
        }
    }
}

/// Rendering surface for one consult cycle.
pub trait Presenter: Send {
    fn render_table(&mut self, table: &Table);
    fn render_map(&mut self, pins: Vec<Pin>, center: LatLon, zoom: f64);
    fn render_warning(&mut self, text: &str);
    fn render_info(&mut self, text: &str);
    /// Stops the cycle; nothing is rendered after this.
    fn halt(&mut self);
}

/// Everything one cycle rendered, ready to be sent as JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Page {
    pub table: Option<Grid>,
    pub map: Option<MapView>,
    pub warnings: Vec<String>,
    pub infos: Vec<String>,
    pub halted: bool,
}

impl Presenter for Page {
    fn render_table(&mut self, table: &Table) {
        if !self.halted {
            self.table = Some(Grid::from(table));
        }
    }

    fn render_map(&mut self, pins: Vec<Pin>, center: LatLon, zoom: f64) {
        if !self.halted {
            self.map = Some(MapView {
                center,
                zoom,
                pitch: 0.0,
                style: MAP_STYLE,
                icon: BUS_STOP_ICON,
                pins,
            });
        }
    }

    fn render_warning(&mut self, text: &str) {
        if !self.halted {
            self.warnings.push(text.to_string());
        }
    }

    fn render_info(&mut self, text: &str) {
        if !self.halted {
            self.infos.push(text.to_string());
        }
    }

    fn halt(&mut self) {
        self.halted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grid_keeps_column_order_and_positions() {
        let table = Table::from_json(json!([
            {"rua": "Rua A", "linha": "L1"},
            {"rua": "Rua B"}
        ]))
        .unwrap();
        let grid = Grid::from(&table);
        assert_eq!(grid.columns, vec!["rua", "linha"]);
        assert_eq!(grid.rows[1].index, 1);
        assert_eq!(grid.rows[1].cells, vec![json!("Rua B"), Value::Null]);
    }

    #[test]
    fn test_tooltip_lists_stop_fields() {
        let row = Row(json!({"rua": "Rua A", "bairro": "Centro", "cidade": "São Paulo", "referencia": "Padaria"})
            .as_object()
            .unwrap()
            .clone());
        let pin = Pin::new(&row, "addr".into(), LatLon { lat: 1.0, lon: 2.0 });
        assert_eq!(pin.tooltip, "Rua A\nCentro\nSão Paulo\nPadaria\nBrasil");
    }

    #[test]
    fn test_page_ignores_output_after_halt() {
        let mut page = Page::default();
        page.render_warning("Nenhum ponto geocodificado.");
        page.halt();
        page.render_map(vec![], LatLon { lat: 0.0, lon: 0.0 }, 15.5);
        page.render_info("late");

        assert!(page.halted);
        assert!(page.map.is_none());
        assert!(page.infos.is_empty());
        assert_eq!(page.warnings, vec!["Nenhum ponto geocodificado."]);
    }

    #[test]
    fn test_icon_serializes_anchor_y() {
        let v = serde_json::to_value(BUS_STOP_ICON).unwrap();
        assert_eq!(v["anchorY"], 128);
        assert_eq!(v["width"], 128);
    }
}
