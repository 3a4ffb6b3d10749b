// Nested-location paths.
//
// Homebox only hands out a flat list of locations with parent links. This
// module indexes that list once per operation and maps between
// `Garage/Box 1/Drawer A` style paths and location ids.

use crate::error::{Error, Result};
use crate::models::Location;
use std::collections::HashMap;

pub const SEPARATOR: char = '/';

/// Split a path into its segment names. Blank segments (leading, trailing
/// or doubled separators) are dropped. Segments keep their whitespace;
/// `resolve` only trims a segment when no name matches it exactly.
pub fn split(path: &str) -> Vec<&str> {
    path.split(SEPARATOR)
        .filter(|s| !s.trim().is_empty())
        .collect()
}

pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

fn name_matches(name: &str, wanted: &str, ignore_case: bool) -> bool {
    if ignore_case {
        name.to_lowercase() == wanted.to_lowercase()
    } else {
        name == wanted
    }
}

/// Index over one listing of locations.
///
/// Sibling order is the server's listing order. Homebox does not keep
/// sibling names unique, so when two children share a name the first one
/// listed wins.
#[derive(Debug, Clone, Default)]
pub struct LocationTree {
    locations: Vec<Location>,
    by_id: HashMap<String, usize>,
    children: HashMap<Option<String>, Vec<usize>>,
}

impl LocationTree {
    pub fn new(locations: Vec<Location>) -> Self {
        let mut tree = LocationTree::default();
        for location in locations {
            tree.insert(location);
        }
        tree
    }

    /// Add a location to the index, e.g. one just created by this process.
    pub fn insert(&mut self, location: Location) {
        let idx = self.locations.len();
        self.by_id.insert(location.id.clone(), idx);
        self.children
            .entry(location.parent_id.clone())
            .or_default()
            .push(idx);
        self.locations.push(location);
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Location> {
        self.by_id.get(id).map(|&idx| &self.locations[idx])
    }

    /// All locations in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    fn children_of(&self, parent: Option<&str>) -> impl Iterator<Item = &Location> {
        self.children
            .get(&parent.map(str::to_string))
            .into_iter()
            .flatten()
            .map(|&idx| &self.locations[idx])
    }

    /// First child of `parent` (`None` = roots) called `name`.
    pub fn child(&self, parent: Option<&str>, name: &str, ignore_case: bool) -> Option<&Location> {
        self.children_of(parent)
            .find(|loc| name_matches(&loc.name, name, ignore_case))
    }

    // Exact name first, so `Garage ` and `Garage` stay distinct.
    fn child_by_segment(
        &self,
        parent: Option<&str>,
        segment: &str,
        ignore_case: bool,
    ) -> Option<&Location> {
        self.child(parent, segment, ignore_case)
            .or_else(|| self.child(parent, segment.trim(), ignore_case))
    }

    fn any_by_segment(&self, segment: &str, ignore_case: bool) -> Option<&Location> {
        let find = |name: &str| {
            self.locations
                .iter()
                .find(|loc| name_matches(&loc.name, name, ignore_case))
        };
        find(segment).or_else(|| find(segment.trim()))
    }

    /// Walk `path` down from the roots and return the location it names.
    ///
    /// The first segment is looked up among the roots. If no root carries
    /// that name, any location with it is accepted (first in listing
    /// order), so a bare `Box 1` still finds a box that lives in a garage.
    /// Every later segment must be a direct child of the previous match.
    ///
    /// A segment is compared verbatim first and trimmed only when nothing
    /// matches, so `Garage / Box 1` still works while a name that really
    /// carries spaces is found as exported.
    pub fn resolve(&self, path: &str, ignore_case: bool) -> Result<&Location> {
        let segments = split(path);
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| Error::validation(format!("empty location path '{path}'")))?;

        let mut current = self
            .child_by_segment(None, first, ignore_case)
            .or_else(|| self.any_by_segment(first, ignore_case))
            .ok_or_else(|| Error::PathNotFound {
                segment: first.trim().to_string(),
                prefix: String::new(),
            })?;

        let mut walked = vec![current.name.as_str()];
        for segment in rest {
            current = self
                .child_by_segment(Some(&current.id), segment, ignore_case)
                .ok_or_else(|| Error::PathNotFound {
                    segment: segment.trim().to_string(),
                    prefix: join(&walked),
                })?;
            walked.push(current.name.as_str());
        }
        Ok(current)
    }

    /// Full path of location `id`, root first.
    ///
    /// Fails with `CycleDetected` when following parents takes more steps
    /// than there are locations, and with `NotFound` when a link points at
    /// a location missing from the listing.
    pub fn path_of(&self, id: &str) -> Result<String> {
        let mut names = Vec::new();
        let mut current = self.get(id).ok_or_else(|| Error::not_found("location", id))?;
        loop {
            if names.len() >= self.locations.len() {
                return Err(Error::CycleDetected(id.to_string()));
            }
            names.push(current.name.as_str());
            match current.parent_id.as_deref() {
                None => break,
                Some(parent) => {
                    current = self
                        .get(parent)
                        .ok_or_else(|| Error::not_found("location", parent))?;
                }
            }
        }
        names.reverse();
        Ok(join(&names))
    }

    /// Locations whose name contains `term`, in listing order. The iterator
    /// borrows the tree and can be rebuilt at will.
    pub fn search<'a>(
        &'a self,
        term: &'a str,
        ignore_case: bool,
    ) -> impl Iterator<Item = &'a Location> + 'a {
        let folded = ignore_case.then(|| term.to_lowercase());
        self.locations.iter().filter(move |loc| match &folded {
            Some(term) => loc.name.to_lowercase().contains(term.as_str()),
            None => loc.name.contains(term),
        })
    }
}
