//! Library half of `hgrc-settings`: the hgrc parser, the layered loader and
//! the builders the command line is made of.

pub mod builders;
pub mod core;
pub mod utils;
