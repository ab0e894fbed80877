// This file is the module declaration file for the `core` module.
// In Rust, a `mod.rs` file within a directory (e.g., `src/core/`)
// serves two main purposes:
//
// 1. It declares the submodules contained within that directory.
// 2. It exposes these submodules to the parent module (`src/` in this case),
//    making them accessible to the entire crate.

// `config` module:
// Finds the hgrc files that apply (HGRCPATH, system, user, repository),
// loads them in precedence order with any `--config` overrides on top, and
// decides which file writes go to. Exposes the `ConfigProvider` trait and
// its `ConfigManager` implementation.
pub mod config;

// `document` module:
// The ordered, section-grouped settings document every other module works
// on, with source locations for each value and hgrc/serde rendering.
pub mod document;

// `hostsecurity` module:
// Certificate fingerprint pinning: parses `[hostsecurity]` and the legacy
// `[hostfingerprints]`, verifies a peer certificate against the pins and
// probes live hosts over TLS.
pub mod hostsecurity;

// `parser` module:
// The hgrc grammar: sections, continuation lines, comments, `%include` and
// `%unset`.
pub mod parser;

// `settings` module:
// Typed views over the sections this tool understands (`[ui]`, `[diff]`,
// `[extensions]`, `[color]`, `[pager]`, merge patterns and host security).
pub mod settings;

// `values` module:
// Conversions from raw strings to booleans, integers and lists using
// Mercurial's spellings.
pub mod values;
