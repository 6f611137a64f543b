use crate::table::{BAIRRO, CIDADE, RUA, Row};

pub const COUNTRY: &str = "Brasil";
const DELIMITER: &str = ", ";

/// Postal address for geocoding: street, neighborhood, city, country.
/// Empty segments are skipped.
pub fn build_address(row: &Row) -> String {
    [row.text(RUA), row.text(BAIRRO), row.text(CIDADE)]
        .into_iter()
        .flatten()
        .chain(std::iter::once(COUNTRY.to_string()))
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: serde_json::Value) -> Row {
        Row(v.as_object().unwrap().clone())
    }

    #[test]
    fn test_full_address() {
        let r = row(json!({"rua": "Rua A, 10", "bairro": "Centro", "cidade": "São Paulo"}));
        assert_eq!(build_address(&r), "Rua A, 10, Centro, São Paulo, Brasil");
    }

    #[test]
    fn test_skips_empty_segments() {
        let r = row(json!({"rua": "  Rua B ", "bairro": "", "cidade": null}));
        assert_eq!(build_address(&r), "Rua B, Brasil");
    }

    #[test]
    fn test_all_empty_yields_country_only() {
        assert_eq!(build_address(&row(json!({}))), "Brasil");
        let r = row(json!({"rua": " ", "bairro": null, "cidade": ""}));
        assert_eq!(build_address(&r), "Brasil");
    }
}
