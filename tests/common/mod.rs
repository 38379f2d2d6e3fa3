#![allow(dead_code)]

use std::fs;
use std::path::Path;

use geojson::{FeatureCollection, GeoJson};
use serde_json::{json, Value};

pub fn square(x: f64, y: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[x, y], [x + 1.0, y], [x + 1.0, y + 1.0], [x, y + 1.0], [x, y]]]
    })
}

pub fn commune(code: &str, year: &str, name: &str, geometry: Value) -> Value {
    json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": {
            "code_epci": code,
            "annee": year,
            "epci": format!("EPCI {code}"),
            "code_region": 84,
            "code_departement": "01",
            "region": "Auvergne-Rhône-Alpes",
            "departement": "Ain",
            "commune": name,
            "code_commune": format!("01{name}"),
            "geo_point_2d": [45.9, 5.3]
        }
    })
}

pub fn write_collection(path: &Path, features: Vec<Value>) {
    let collection = json!({ "type": "FeatureCollection", "features": features });
    fs::write(path, collection.to_string()).unwrap();
}

pub fn read_collection(path: &Path) -> FeatureCollection {
    match fs::read_to_string(path).unwrap().parse::<GeoJson>().unwrap() {
        GeoJson::FeatureCollection(collection) => collection,
        other => panic!("expected a feature collection, got {other:?}"),
    }
}
