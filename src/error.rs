//! Error types for loading, merging and saving EPCI boundaries.

use std::path::PathBuf;

/// A feature's properties do not describe a grouping.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("feature has no properties object")]
    MissingProperties,

    #[error("missing required property `{0}`")]
    MissingField(&'static str),
}

/// A member geometry cannot take part in a union.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("feature has no geometry")]
    MissingGeometry,

    /// Only polygonal members can be merged.
    #[error("unsupported geometry type `{0}`, expected Polygon or MultiPolygon")]
    UnsupportedType(String),

    #[error("position has {0} ordinate(s), at least 2 are required")]
    PositionTooShort(usize),

    #[error("position contains a non-finite ordinate")]
    NonFiniteOrdinate,

    #[error("polygon ring has {0} position(s), at least 3 are required")]
    RingTooShort(usize),

    #[error("polygon has no exterior ring")]
    EmptyPolygon,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("feature {index}: {source}")]
    Schema {
        index: usize,
        #[source]
        source: SchemaError,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },

    #[error("{} is not a GeoJSON FeatureCollection", path.display())]
    NotFeatureCollection { path: PathBuf },

    #[error("feature {index}: invalid geometry: {source}")]
    Geometry {
        index: usize,
        #[source]
        source: GeometryError,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MergeError {
    /// Process exit code reported by the CLI for this failure. Code 2 is
    /// left to clap for usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            MergeError::Schema { .. } => 3,
            MergeError::Parse { .. } | MergeError::NotFeatureCollection { .. } => 4,
            MergeError::Geometry { .. } => 5,
            MergeError::Io { .. } | MergeError::Serialize(_) => 6,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
