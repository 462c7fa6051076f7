//! Static correlation table.
//!
//! Direct: symbols in the same group move together, so same-direction exposure
//! doubles up. Inverse: the pair moves against itself, so opposite directions
//! double up. Read-only after construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::CorrelationConfig;
use crate::domain::{Direction, OpenPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Direct,
    Inverse,
}

impl Relation {
    /// True when holding `open` and adding `proposed` stacks the same exposure.
    pub fn conflicts(self, proposed: Direction, open: Direction) -> bool {
        match self {
            Relation::Direct => proposed == open,
            Relation::Inverse => proposed != open,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Direct => f.write_str("directly"),
            Relation::Inverse => f.write_str("inversely"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    links: HashMap<String, Vec<(String, Relation)>>,
}

impl CorrelationTable {
    pub fn from_config(cfg: &CorrelationConfig) -> Self {
        let mut table = Self::default();
        for group in &cfg.direct {
            for a in group {
                for b in group {
                    if a != b {
                        table.link(a, b, Relation::Direct);
                    }
                }
            }
        }
        for [a, b] in &cfg.inverse {
            table.link(a, b, Relation::Inverse);
            table.link(b, a, Relation::Inverse);
        }
        table
    }

    fn link(&mut self, a: &str, b: &str, relation: Relation) {
        let entry = self.links.entry(a.to_string()).or_default();
        if !entry.iter().any(|(s, r)| s == b && *r == relation) {
            entry.push((b.to_string(), relation));
        }
    }

    pub fn relation(&self, a: &str, b: &str) -> Option<Relation> {
        self.links.get(a)?.iter().find(|(s, _)| s == b).map(|(_, r)| *r)
    }

    /// First open position that conflicts with a new `direction` trade on `symbol`.
    pub fn find_conflict<'a>(
        &self,
        symbol: &str,
        direction: Direction,
        open: &'a [OpenPosition],
    ) -> Option<(&'a OpenPosition, Relation)> {
        open.iter().find_map(|pos| {
            let relation = self.relation(symbol, &pos.symbol)?;
            relation.conflicts(direction, pos.direction).then_some((pos, relation))
        })
    }
}
