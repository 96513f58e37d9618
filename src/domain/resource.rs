use crate::domain::payment::Amount;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rentable building. Full resource CRUD lives outside this engine; the
/// engine only needs the name (for notifications) and the daily price.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub unit_price_per_day: Amount,
}

impl Resource {
    pub fn new(name: String, unit_price_per_day: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            unit_price_per_day,
        }
    }
}
