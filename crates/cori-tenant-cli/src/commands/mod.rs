//! CLI command implementations for `cori-tenant`.

pub mod check;
pub mod rewrite;
