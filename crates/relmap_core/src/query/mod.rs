//! SQL SELECT builder.
//!
//! # Responsibility
//! - Accumulate statement fragments and bound parameters.
//! - Execute through a [`crate::db::Backend`] in a requested fetch shape.
//!
//! # Invariants
//! - The first condition of a where/having list is bare; later ones carry
//!   their `AND`/`OR` prefix.
//! - Limits are non-negative; a zero count renders no LIMIT clause.

mod cond;
mod parts;
mod select;

pub use cond::{quote_into, Cond, Conj};
pub(crate) use cond::render_conds;
pub use parts::{JoinKind, JoinPart, Limit, Names, Part, SelectParts};
pub use select::{PageInfo, Select, DEFAULT_PAGING};
