//! Public reference data.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::term::{unit_legal_name, SCHOOL_UNITS};

#[derive(Debug, Serialize, ToSchema)]
pub struct SchoolUnit {
    #[schema(example = "Objetivo Embaré")]
    pub name: String,
    #[schema(example = "SOCIEDADE INSTRUTIVA JOAQUIM NABUCO LTDA")]
    pub legal_name: Option<String>,
}

pub fn school_units() -> Vec<SchoolUnit> {
    SCHOOL_UNITS
        .iter()
        .map(|name| SchoolUnit {
            name: name.to_string(),
            legal_name: unit_legal_name(name).map(str::to_string),
        })
        .collect()
}

#[utoipa::path(
    get,
    path = "/units",
    tag = "Catalog",
    responses((status = 200, description = "School units", body = [SchoolUnit]))
)]
pub async fn list_units() -> Json<Vec<SchoolUnit>> {
    Json(school_units())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_unit_has_a_legal_name() {
        let units = school_units();
        assert_eq!(units.len(), 7);
        assert!(units.iter().all(|u| u.legal_name.is_some()));
    }
}
