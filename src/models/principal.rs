//! The authenticated caller, as resolved by whatever sits in front of us.

use serde::{Deserialize, Serialize};

/// An already-authenticated principal id.
///
/// Read paths take `Option<Principal>`; `None` is the anonymous caller.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Principal(pub i64);

impl Principal {
    pub fn id(&self) -> i64 {
        self.0
    }
}
