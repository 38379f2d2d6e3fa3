use std::collections::btree_map::{BTreeMap, Entry};

use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection};
use tracing::debug;

use crate::error::{MergeError, Result};
use crate::geometry;
use crate::identity::{GroupingIdentity, GroupingKey};

/// A commune feature together with its position in the input collection.
#[derive(Debug, Clone)]
pub struct Member {
    pub index: usize,
    pub feature: Feature,
}

/// One EPCI and the commune features that make it up.
#[derive(Debug, Clone)]
pub struct GroupingRecord {
    identity: GroupingIdentity,
    members: Vec<Member>,
}

impl GroupingRecord {
    pub fn new(identity: GroupingIdentity) -> Self {
        GroupingRecord {
            identity,
            members: Vec::new(),
        }
    }

    pub fn identity(&self) -> &GroupingIdentity {
        &self.identity
    }

    pub fn key(&self) -> GroupingKey {
        self.identity.key()
    }

    pub fn register(&mut self, member: Member) {
        self.members.push(member);
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Union of every member geometry, recomputed on each call.
    pub fn polygon(&self) -> Result<MultiPolygon<f64>> {
        let parts = self
            .members
            .iter()
            .map(|member| {
                geometry::to_multi_polygon(member.feature.geometry.as_ref()).map_err(|source| {
                    MergeError::Geometry {
                        index: member.index,
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(geometry::union_all(parts))
    }

    /// Output feature: merged geometry plus the identity properties.
    pub fn feature(&self) -> Result<Feature> {
        let polygon = self.polygon()?;

        Ok(Feature {
            bbox: None,
            geometry: Some(geometry::to_geojson(&polygon)),
            id: None,
            properties: Some(self.identity.to_properties()),
            foreign_members: None,
        })
    }
}

/// Records keyed by grouping identity, iterated in key order.
#[derive(Debug, Default)]
pub struct GroupingRegistry {
    records: BTreeMap<GroupingKey, GroupingRecord>,
}

impl GroupingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record`, returning any record it replaced.
    pub fn register(&mut self, record: GroupingRecord) -> Option<GroupingRecord> {
        self.records.insert(record.key(), record)
    }

    pub fn get(&self, key: &GroupingKey) -> Option<&GroupingRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &GroupingKey) -> Option<&mut GroupingRecord> {
        self.records.get_mut(key)
    }

    /// Record for `identity`, created empty on first use.
    pub fn entry(&mut self, identity: GroupingIdentity) -> &mut GroupingRecord {
        match self.records.entry(identity.key()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(key = %entry.key(), "new grouping");
                entry.insert(GroupingRecord::new(identity))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &GroupingRecord> {
        self.records.values()
    }

    /// Grouping codes registered under more than one identity.
    pub fn split_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = Vec::new();
        let mut previous: Option<&str> = None;

        // keys are sorted by code first, so repeats are adjacent
        for key in self.records.keys() {
            if previous == Some(key.code()) && codes.last() != Some(&key.code()) {
                codes.push(key.code());
            }
            previous = Some(key.code());
        }
        codes
    }

    pub fn feature_collection(&self) -> Result<FeatureCollection> {
        let features = self
            .records()
            .map(|record| {
                debug!(
                    key = %record.key(),
                    members = record.members().len(),
                    "merging grouping"
                );
                record.feature()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}
