pub mod filters;
pub mod record;
pub mod result;

pub use filters::*;
pub use record::{Photo, Profile, Publication, Record, RecordKind, Staff};
pub use result::*;
