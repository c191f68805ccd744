//! Tabular schema description: field list, primary key, identity metadata,
//! plus the offline preparation stages that normalize it and inject ids.

pub mod identity;
pub mod infer;
pub mod io;
pub mod normalize;
pub mod types;

pub use identity::*;
pub use infer::*;
pub use io::*;
pub use normalize::*;
pub use types::*;
