//! Language frontends.
//!
//! A frontend turns source text into a syntax tree the analysis passes can
//! walk. Only TypeScript (including TSX) is supported.

pub mod typescript;
