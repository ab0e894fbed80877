use anyhow::Result;
use colored::Colorize;

use crate::builders::validator::{Issue, Severity};
use crate::core::config::LayerStatus;
use crate::core::hostsecurity::HostPolicy;
use crate::core::settings::Settings;

pub trait StatusReporter {
    fn generate_status_report(&self, settings: &Settings, layers: &[LayerStatus]) -> Result<()>;

    fn report_issues(&self, issues: &[Issue]) -> Result<()>;
}

/// A concrete implementation of `StatusReporter` that prints the report to the console.
///
/// This is the reporter used by the `summary` and `validate` commands.
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// One line per config file: 🟢 loaded with entries, 🟡 present but empty,
    /// ⚪ not present.
    fn format_layer(&self, status: &LayerStatus) -> String {
        let icon = match (status.exists, status.entries) {
            (false, _) => "⚪",
            (true, 0) => "🟡",
            (true, _) => "🟢",
        };
        let detail = if status.exists {
            format!("{} entries", status.entries)
        } else {
            "not present".to_string()
        };
        format!(
            "{icon} {:<10} {} ({detail})",
            status.layer.kind.to_string(),
            status.layer.path.display()
        )
    }

    fn format_host(&self, host: &str, policy: &HostPolicy) -> String {
        let pins = policy
            .fingerprints
            .iter()
            .map(|f| f.algorithm.name())
            .collect::<Vec<_>>()
            .join(", ");
        let legacy = if policy.legacy { " [hostfingerprints]" } else { "" };
        let protocol = policy
            .minimum_protocol
            .map(|p| format!(", minimum {p}"))
            .unwrap_or_default();
        format!("  🔒 {host}: {} pin(s) ({pins}){protocol}{legacy}", policy.fingerprints.len())
    }
}

impl StatusReporter for ConsoleReporter {
    fn generate_status_report(&self, settings: &Settings, layers: &[LayerStatus]) -> Result<()> {
        println!("{}", "📊 Mercurial Settings Summary".bold());
        println!("============================");

        println!("\n📁 Config files (lowest precedence first):");
        if layers.is_empty() {
            println!("  No config files in the search path.");
        }
        for status in layers {
            if status.exists || self.verbose {
                println!("  {}", self.format_layer(status));
            }
        }

        println!("\n👤 Identity:");
        match &settings.ui.username {
            Some(identity) => println!("  {}", identity.to_string().green()),
            None => println!("  {}", "ui.username is not set".yellow()),
        }
        println!("  verbose: {}", settings.ui.verbose);

        println!("\n🧩 Extensions:");
        if settings.extensions.entries.is_empty() {
            println!("  none");
        }
        for extension in &settings.extensions.entries {
            let state = if extension.enabled {
                "enabled".green()
            } else {
                "disabled".red()
            };
            match &extension.path {
                Some(path) if self.verbose => println!("  {} ({state}) from {path}", extension.name),
                _ => println!("  {} ({state})", extension.name),
            }
        }

        println!("\n🖍  Diff:");
        let diff = &settings.diff;
        println!(
            "  showfunc: {}, git: {}, nodates: {}, ignorews: {}",
            diff.showfunc, diff.git, diff.nodates, diff.ignorews
        );
        let styles: Vec<_> = settings.color.diff_styles().collect();
        if !styles.is_empty() {
            println!("  {} diff color styles", styles.len());
            if self.verbose {
                for (label, effects) in styles {
                    println!("  └─ {label}: {}", effects.join(" "));
                }
            }
        }

        if let Some(command) = &settings.pager.command {
            println!("\n📜 Pager: {command}");
        }

        println!("\n🔀 Merge patterns:");
        if settings.merge_patterns.is_empty() {
            println!("  none");
        }
        for pattern in settings.merge_patterns.iter() {
            println!("  {} ({}) → {}", pattern.specification, pattern.kind, pattern.tool);
        }

        println!("\n🔐 Host security:");
        println!(
            "  minimum protocol: {}",
            settings.host_security.minimum_protocol
        );
        for (host, policy) in settings.host_security.hosts() {
            println!("{}", self.format_host(host, policy));
        }

        Ok(())
    }

    fn report_issues(&self, issues: &[Issue]) -> Result<()> {
        if issues.is_empty() {
            println!("✅ Configuration is valid");
            return Ok(());
        }

        let mut errors = 0;
        for issue in issues {
            match issue.severity {
                Severity::Error => {
                    errors += 1;
                    println!("❌ {}", issue.to_string().red());
                }
                Severity::Warning => println!("⚠️  {}", issue.to_string().yellow()),
            }
        }
        println!(
            "\n📈 {} error(s), {} warning(s)",
            errors,
            issues.len() - errors
        );
        Ok(())
    }
}
