use serde::{Deserialize, Serialize};

/// Contact reference for the person who receives and redeems a quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub name: String,
    pub email: String,
}
