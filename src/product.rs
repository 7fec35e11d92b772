use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Opaque listing identifier owned by the listing service. One open chat
/// screen maps to exactly one product scope.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id(pub String);

impl Id {
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Id> for mongodb::bson::Bson {
    fn from(val: Id) -> Self {
        mongodb::bson::Bson::String(val.0)
    }
}
