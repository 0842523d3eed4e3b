//! Point cloud types shared by the parser and the tilt corrector.

pub mod tilt;

pub use tilt::{IdentityCorrector, PlaneFitCorrector, TiltCorrector, TiltError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A measured coordinate in instrument units (mm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Point readings grouped by name.
///
/// Groups keep the order in which their name first appeared and points keep
/// file order inside a group, so iteration is deterministic for a given input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointGroups {
    groups: Vec<(String, Vec<Point3>)>,
    index: HashMap<String, usize>,
}

impl PointGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading to the group called `name`, creating it if needed.
    pub fn push(&mut self, name: &str, point: Point3) {
        match self.index.get(name) {
            Some(&i) => self.groups[i].1.push(point),
            None => {
                self.index.insert(name.to_string(), self.groups.len());
                self.groups.push((name.to_string(), vec![point]));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[Point3]> {
        self.index.get(name).map(|&i| self.groups[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Point3])> {
        self.groups.iter().map(|(name, points)| (name.as_str(), points.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.groups.iter().map(|(_, points)| points.len()).sum()
    }

    /// Build a new set with every point passed through `f`, keeping names and order.
    pub fn map_points<F>(&self, mut f: F) -> PointGroups
    where
        F: FnMut(&Point3) -> Point3,
    {
        PointGroups {
            groups: self
                .groups
                .iter()
                .map(|(name, points)| (name.clone(), points.iter().map(&mut f).collect()))
                .collect(),
            index: self.index.clone(),
        }
    }
}
