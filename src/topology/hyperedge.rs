//! Hyperedge declarations: one producer, a set of consumers, a bundle of
//! streams carried between them.

use std::collections::HashSet;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Hyperedge {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub targets: HashSet<String>,
    pub streams: Vec<String>,
    /// Always true in this core; kept so a future point-to-point mode has
    /// somewhere to declare itself.
    #[serde(default = "Hyperedge::default_multicast")]
    pub multicast: bool,
}

impl Hyperedge {
    fn default_multicast() -> bool {
        true
    }
}
