//! Dataflow operator catalog (spec §4.5): stateless linear operators,
//! stateful keyed operators, and the higher-level combinators built from
//! them.

pub mod consolidate;
pub mod distinct;
pub mod filterby;
pub mod frac_index;
pub mod groupby;
pub mod join;
pub mod keyed;
pub mod linear;
pub mod orderby;
pub mod reduce;
pub mod topk;
