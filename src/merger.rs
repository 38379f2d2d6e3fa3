use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use geojson::{Feature, FeatureCollection, GeoJson};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{MergeError, Result};
use crate::geometry;
use crate::group::{GroupingRegistry, Member};
use crate::identity::{unexpected_fields, GroupingIdentity};

const PROGRESS_INTERVAL: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
}

/// Reads commune features from `input` and writes one merged feature per
/// EPCI to `output`.
#[derive(Debug)]
pub struct Merger {
    input: PathBuf,
    output: PathBuf,
    registry: GroupingRegistry,
    state: LoadState,
}

impl Merger {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Merger {
            input: input.into(),
            output: output.into(),
            registry: GroupingRegistry::new(),
            state: LoadState::Unloaded,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn registry(&self) -> &GroupingRegistry {
        &self.registry
    }

    /// Parses the input collection and groups its features.
    ///
    /// On failure the merger keeps whatever it held before the call.
    pub fn load(&mut self) -> Result<()> {
        info!(path = %self.input.display(), "loading file");
        let file = File::open(&self.input).map_err(|e| MergeError::io(&self.input, e))?;

        let geojson =
            GeoJson::from_reader(BufReader::new(file)).map_err(|source| MergeError::Parse {
                path: self.input.clone(),
                source: geojson::Error::MalformedJson(source),
            })?;

        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(MergeError::NotFeatureCollection {
                path: self.input.clone(),
            });
        };

        let total = collection.features.len();
        info!(features = total, "found features in file");

        let registry = group_features(collection.features)?;
        for code in registry.split_codes() {
            warn!(
                code_epci = code,
                "grouping code appears under several identities; emitting one feature per identity"
            );
        }

        info!(features = total, groups = registry.len(), "loaded groupings");
        self.registry = registry;
        self.state = LoadState::Loaded;
        Ok(())
    }

    /// Writes the merged collection, replacing `output` atomically.
    pub fn save(&self) -> Result<()> {
        if self.state == LoadState::Unloaded {
            warn!(path = %self.output.display(), "nothing loaded, writing an empty collection");
        }

        let collection = self.registry.feature_collection()?;
        write_collection(&self.output, &collection)?;

        info!(
            path = %self.output.display(),
            groups = collection.features.len(),
            "wrote merged features"
        );
        Ok(())
    }
}

/// Groups features by identity. Every geometry is validated here so that a
/// bad member fails the run before any output exists.
pub fn group_features(features: Vec<Feature>) -> Result<GroupingRegistry> {
    let total = features.len();
    let mut registry = GroupingRegistry::new();
    let mut unexpected: BTreeSet<String> = BTreeSet::new();

    for (index, feature) in features.into_iter().enumerate() {
        if (index + 1) % PROGRESS_INTERVAL == 0 {
            debug!("processing feature {}/{}", index + 1, total);
        }

        let identity = GroupingIdentity::from_properties(feature.properties.as_ref())
            .map_err(|source| MergeError::Schema { index, source })?;
        if let Some(properties) = feature.properties.as_ref() {
            for name in unexpected_fields(properties) {
                if unexpected.insert(name.to_string()) {
                    warn!(property = name, index, "dropping property outside the grouping identity");
                }
            }
        }
        geometry::to_multi_polygon(feature.geometry.as_ref())
            .map_err(|source| MergeError::Geometry { index, source })?;

        registry.entry(identity).register(Member { index, feature });
    }

    Ok(registry)
}

fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // dropped (and removed) on every early return
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| MergeError::io(dir, e))?;
    let tmp_path = tmp.path().to_path_buf();

    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(existing.permissions())
            .map_err(|e| MergeError::io(&tmp_path, e))?;
    }

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, collection)?;
        writer.flush().map_err(|e| MergeError::io(&tmp_path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| MergeError::io(&tmp_path, e))?;

    tmp.persist(path).map_err(|e| MergeError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use serde_json::{json, Value};

    fn commune(code: &str, commune: &str, x: f64) -> Value {
        json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x, 0.0], [x + 1.0, 0.0], [x + 1.0, 1.0], [x, 1.0], [x, 0.0]]]
            },
            "properties": {
                "code_epci": code,
                "annee": "2021",
                "epci": "CC Test",
                "code_region": "84",
                "code_departement": "01",
                "region": "Auvergne-Rhône-Alpes",
                "departement": "Ain",
                "commune": commune,
                "code_commune": "01001",
                "geo_point_2d": [0.5, x + 0.5]
            }
        })
    }

    fn collection(features: Vec<Value>) -> String {
        json!({ "type": "FeatureCollection", "features": features }).to_string()
    }

    fn read_collection(path: &Path) -> FeatureCollection {
        match fs::read_to_string(path).unwrap().parse::<GeoJson>().unwrap() {
            GeoJson::FeatureCollection(collection) => collection,
            other => panic!("output is not a feature collection: {other:?}"),
        }
    }

    #[test]
    fn test_load_and_save_merges_communes() {
        crate::logging::init_test();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("communes.geojson");
        let output = dir.path().join("epci.geojson");
        fs::write(
            &input,
            collection(vec![
                commune("200000000", "A", 0.0),
                commune("200000000", "B", 1.0),
                commune("200000001", "C", 5.0),
            ]),
        )
        .unwrap();

        let mut merger = Merger::new(&input, &output);
        assert_eq!(merger.state(), LoadState::Unloaded);
        merger.load().unwrap();
        assert_eq!(merger.state(), LoadState::Loaded);
        assert_eq!(merger.registry().len(), 2);
        merger.save().unwrap();

        let written = read_collection(&output);
        assert_eq!(written.features.len(), 2);
        let codes: Vec<_> = written
            .features
            .iter()
            .map(|f| f.property("code_epci").cloned().unwrap())
            .collect();
        assert_eq!(codes, vec![json!("200000000"), json!("200000001")]);
    }

    #[test]
    fn test_not_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.geojson");
        let output = dir.path().join("out.geojson");
        fs::write(&input, "this is not json").unwrap();

        let mut merger = Merger::new(&input, &output);
        let err = merger.load().unwrap_err();
        assert!(matches!(err, MergeError::Parse { .. }));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(merger.state(), LoadState::Unloaded);
    }

    #[test]
    fn test_single_feature_is_not_a_collection() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("feature.geojson");
        fs::write(&input, commune("200000000", "A", 0.0).to_string()).unwrap();

        let err = Merger::new(&input, dir.path().join("out.geojson"))
            .load()
            .unwrap_err();
        assert!(matches!(err, MergeError::NotFeatureCollection { .. }));
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Merger::new(dir.path().join("absent.geojson"), dir.path().join("out.geojson"))
            .load()
            .unwrap_err();
        assert!(matches!(err, MergeError::Io { .. }));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_failed_load_keeps_no_partial_groups() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("communes.geojson");
        let mut missing_code = commune("200000001", "B", 1.0);
        missing_code["properties"]
            .as_object_mut()
            .unwrap()
            .remove("code_epci");
        fs::write(
            &input,
            collection(vec![commune("200000000", "A", 0.0), missing_code]),
        )
        .unwrap();

        let mut merger = Merger::new(&input, dir.path().join("out.geojson"));
        match merger.load() {
            Err(MergeError::Schema {
                index: 1,
                source: SchemaError::MissingField("code_epci"),
            }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(merger.registry().is_empty());
        assert_eq!(merger.state(), LoadState::Unloaded);
    }

    #[test]
    fn test_malformed_geometry_fails_load() {
        let mut feature = commune("200000000", "A", 0.0);
        feature["geometry"] = json!({ "type": "Point", "coordinates": [0.0, 0.0] });

        let features = vec![serde_json::from_value::<Feature>(feature).unwrap()];
        let err = group_features(features).unwrap_err();
        assert!(matches!(err, MergeError::Geometry { index: 0, .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_unexpected_properties_are_dropped() {
        let mut first = commune("200000000", "A", 0.0);
        first["properties"]["population"] = json!(1200);
        let mut second = commune("200000000", "B", 1.0);
        second["properties"]["population"] = json!(800);

        let features = vec![first, second]
            .into_iter()
            .map(|f| serde_json::from_value::<Feature>(f).unwrap())
            .collect();
        let registry = group_features(features).unwrap();

        assert_eq!(registry.len(), 1);
        let collection = registry.feature_collection().unwrap();
        let properties = collection.features[0].properties.as_ref().unwrap();
        assert!(!properties.contains_key("population"));
    }

    #[test]
    fn test_save_before_load_writes_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.geojson");

        Merger::new(dir.path().join("unused.geojson"), &output)
            .save()
            .unwrap();

        let written = read_collection(&output);
        assert!(written.features.is_empty());
    }

    #[test]
    fn test_unwritable_output_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("communes.geojson");
        fs::write(&input, collection(vec![commune("200000000", "A", 0.0)])).unwrap();
        let output = dir.path().join("missing_dir").join("out.geojson");

        let mut merger = Merger::new(&input, &output);
        merger.load().unwrap();
        let err = merger.save().unwrap_err();

        assert!(matches!(err, MergeError::Io { .. }));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_save_replaces_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("communes.geojson");
        let output = dir.path().join("out.geojson");
        fs::write(&input, collection(vec![commune("200000000", "A", 0.0)])).unwrap();
        fs::write(&output, "stale").unwrap();

        let mut merger = Merger::new(&input, &output);
        merger.load().unwrap();
        merger.save().unwrap();

        let written = read_collection(&output);
        assert_eq!(written.features.len(), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
