//! Library → room → access point hierarchy that drives a crawl.
//!
//! The document is a JSON object keyed by library identifier:
//!
//! ```json
//! {
//!   "bib1": {
//!     "name": "Universitätsbibliothek",
//!     "bib": "bib1",
//!     "uni": "LMU",
//!     "address": ["Geschwister-Scholl-Platz 1", "80539 München"],
//!     "rooms": {
//!       "Lesesaal": { "name": "Lesesaal", "aps": [{ "name": "apa01-0mg", "url": "..." }] }
//!     }
//!   }
//! }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use serde::{Deserialize, Serialize};
use wlan_client::NewLibrary;

use crate::pipeline::PipelineError;

pub mod apstat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointRef {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    #[serde(default)]
    pub aps: Vec<AccessPointRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTopology {
    pub name: String,
    /// Business identifier; the document key is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bib: Option<String>,
    /// Parent organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uni: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub address: Vec<String>,
    #[serde(default)]
    pub rooms: BTreeMap<String, Room>,
}

impl LibraryTopology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bib: None,
            uni: None,
            url: None,
            address: Vec::new(),
            rooms: BTreeMap::new(),
        }
    }

    pub fn business_id<'a>(&'a self, key: &'a str) -> &'a str {
        self.bib.as_deref().unwrap_or(key)
    }

    /// Address lines joined into one free-text location.
    pub fn location(&self) -> Option<String> {
        if self.address.is_empty() {
            None
        } else {
            Some(self.address.join(", "))
        }
    }

    /// Access point names across all rooms, sorted and without duplicates.
    pub fn access_point_names(&self) -> Vec<&str> {
        self.rooms
            .values()
            .flat_map(|room| room.aps.iter().map(|ap| ap.name.as_str()))
            .filter(|name| !name.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Row to create on first sight. `location` must outlive the result.
    pub fn new_library<'a>(&'a self, key: &'a str, location: Option<&'a str>) -> Result<NewLibrary<'a>, PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::Topology(format!("library {key:?} has no name")));
        }
        Ok(NewLibrary {
            bib: self.business_id(key),
            name: &self.name,
            uni: self.uni.as_deref(),
            location,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology {
    libraries: BTreeMap<String, LibraryTopology>,
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| PipelineError::Topology(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(contents).map_err(|e| PipelineError::Topology(format!("malformed topology document: {e}")))
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string(self).map_err(|e| PipelineError::Topology(e.to_string()))
    }

    pub fn insert(&mut self, key: impl Into<String>, library: LibraryTopology) {
        self.libraries.insert(key.into(), library);
    }

    pub fn get(&self, key: &str) -> Option<&LibraryTopology> {
        self.libraries.get(key)
    }

    pub fn libraries(&self) -> impl Iterator<Item = (&str, &LibraryTopology)> {
        self.libraries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

impl FromIterator<(String, LibraryTopology)> for Topology {
    fn from_iter<I: IntoIterator<Item = (String, LibraryTopology)>>(iter: I) -> Self {
        let mut topology = Topology::default();
        for (key, library) in iter {
            topology.insert(key, library);
        }
        topology
    }
}
