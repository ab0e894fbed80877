// This file is the module declaration file for the `builders` module.
// It declares and makes public all the sub-modules within the `src/builders`
// directory. These modules build on the parsed settings document: they edit
// config files, move settings between formats, and check and report on them.

// `editor` module:
// Line-based editing of a single hgrc file. `HgrcEditor` rewrites or removes
// individual assignments so that comments, blank lines and unrelated sections
// survive `set`, `unset`, `init` and `import`. Files are replaced atomically.
pub mod editor;

// `exporter` module:
// Defines `ExportFormat` (hgrc, JSON, YAML, TOML) and writes a merged settings
// document in any of them.
pub mod exporter;

// `importer` module:
// The `SettingsImporter` trait and its `FileImporter` implementation, which
// read settings from an hgrc or from a structured JSON/YAML/TOML file into a
// `SettingsDocument` ready to be merged into a config file.
pub mod importer;

// `patterns` module:
// Compiles the `[merge-patterns]` section. Each entry pairs a file pattern
// (glob, `re:` or `path:`) with a merge tool, and the `PatternMatcher` trait
// decides which files a pattern covers. The first matching pattern wins.
pub mod patterns;

// `reporter` module:
// Generates the human-readable summary of the effective settings and the
// results of validation. It defines a `StatusReporter` trait and its
// `ConsoleReporter` implementation.
pub mod reporter;

// `validator` module:
// Checks a settings document for values that parse but would be rejected or
// misread: malformed identities, non-boolean flags, unknown extensions and
// color effects, broken merge patterns and bad fingerprints.
pub mod validator;
