// tabula-common: shared protocol and domain types for the Tabula workspace

pub mod protocol;
pub mod types;
