//! Styled output formatting for realmscout using anstyle.
//!
//! Renders a [`DiscoveryReport`] as a short, aligned summary for terminals.
//! Colors are only emitted when stdout is a terminal and `NO_COLOR` is unset.

use anstyle::{AnsiColor, Color, Style};
use std::fmt::Write;
use std::io::{self, Write as IoWrite};

use crate::discovery::Provenance;
use crate::structured_output::{DiscoveryReport, HostnameSource};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Style definitions for different UI elements
pub struct Styles {
    pub header: Style,
    pub label: Style,
    pub value: Style,
    pub success: Style,
    pub warning: Style,
    pub muted: Style,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            header: Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Blue))),
            label: Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
            value: Style::new().bold(),
            success: Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
            warning: Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
            muted: Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
        }
    }
}

/// Styled output formatter for discovery reports
pub struct StyledFormatter {
    styles: Styles,
    use_colors: bool,
}

impl StyledFormatter {
    pub fn new() -> Self {
        Self {
            styles: Styles::default(),
            use_colors: Self::should_use_colors(),
        }
    }

    /// Create a formatter without colors (for non-interactive use)
    pub fn without_colors() -> Self {
        Self {
            styles: Styles::default(),
            use_colors: false,
        }
    }

    fn should_use_colors() -> bool {
        atty::is(atty::Stream::Stdout) && std::env::var("NO_COLOR").is_err()
    }

    fn styled(&self, text: &str, style: &Style) -> String {
        if self.use_colors {
            format!("{}{}{}", style.render(), text, style.render_reset())
        } else {
            text.to_string()
        }
    }

    pub fn format_report(&self, report: &DiscoveryReport) -> Result<String, std::fmt::Error> {
        let mut output = String::new();

        writeln!(output, "{}", self.styled(RULE, &self.styles.muted))?;
        writeln!(
            output,
            "  {}",
            self.styled(&format!("Realm {}", report.realm), &self.styles.header)
        )?;
        writeln!(output, "{}", self.styled(RULE, &self.styles.muted))?;

        let hostname_source = match report.sources.hostname {
            HostnameSource::ExplicitOption => "explicit-option",
            HostnameSource::MachineFqdn => "machine-fqdn",
        };
        self.write_field(&mut output, "Client hostname", &report.hostname, Some(hostname_source))?;
        self.write_field(&mut output, "Client domain", &report.client_domain, None)?;
        self.write_field(
            &mut output,
            "Realm",
            &report.realm,
            Some(source_name(report.sources.realm)),
        )?;
        self.write_field(
            &mut output,
            "DNS domain",
            &report.domain,
            Some(source_name(report.sources.domain)),
        )?;
        self.write_field(
            &mut output,
            "IPA server",
            &report.servers.join(", "),
            Some(source_name(report.sources.servers)),
        )?;
        self.write_field(
            &mut output,
            "BaseDN",
            &report.basedn,
            Some(source_name(report.sources.basedn)),
        )?;
        self.write_field(&mut output, "Subject base", &report.subject_base, None)?;
        self.write_list(&mut output, "KDC", &report.kdc)?;
        self.write_list(&mut output, "NTP servers", &report.ntp_servers)?;

        let dns = if report.dnsok {
            self.styled("validated", &self.styles.success)
        } else {
            self.styled("not validated", &self.styles.warning)
        };
        writeln!(output, "  {:<16} {}", self.styled("DNS discovery", &self.styles.label), dns)?;

        if !report.warnings.is_empty() {
            writeln!(output)?;
            writeln!(output, "  {}", self.styled("Warnings:", &self.styles.warning))?;
            for warning in &report.warnings {
                writeln!(
                    output,
                    "    {} {}",
                    self.styled("•", &self.styles.warning),
                    warning
                )?;
            }
        }
        writeln!(output, "{}", self.styled(RULE, &self.styles.muted))?;

        Ok(output)
    }

    fn write_field(
        &self,
        output: &mut String,
        label: &str,
        value: &str,
        source: Option<&str>,
    ) -> Result<(), std::fmt::Error> {
        let label = format!("{label:<16}");
        write!(
            output,
            "  {} {}",
            self.styled(&label, &self.styles.label),
            self.styled(value, &self.styles.value)
        )?;
        if let Some(source) = source {
            write!(output, " {}", self.styled(&format!("({source})"), &self.styles.muted))?;
        }
        writeln!(output)
    }

    fn write_list(
        &self,
        output: &mut String,
        label: &str,
        values: &[String],
    ) -> Result<(), std::fmt::Error> {
        if values.is_empty() {
            let none = self.styled("none", &self.styles.muted);
            let label = format!("{label:<16}");
            return writeln!(output, "  {} {}", self.styled(&label, &self.styles.label), none);
        }
        self.write_field(output, label, &values.join(", "), None)
    }

    /// Print a report to stdout
    pub fn print_report(&self, report: &DiscoveryReport) -> io::Result<()> {
        let formatted = self
            .format_report(report)
            .map_err(|e| io::Error::other(format!("{}", e)))?;
        print!("{}", formatted);
        io::stdout().flush()?;
        Ok(())
    }
}

impl Default for StyledFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn source_name(source: Provenance) -> &'static str {
    match source {
        Provenance::ExplicitOption => "provided as option",
        Provenance::DerivedFromServer => "from server name",
        Provenance::DnsSrvRecord => "DNS SRV record",
        Provenance::DnsReverseLookup => "reverse DNS",
        Provenance::DnsHostDomain => "host domain",
        Provenance::DnsAddressRecord => "DNS address record",
        Provenance::DirectoryRootEntry => "directory root entry",
        Provenance::DerivedFromDomain => "derived from domain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured_output::tests::sample_report;

    #[test]
    fn plain_report_has_no_escape_codes() {
        let text = StyledFormatter::without_colors()
            .format_report(&sample_report())
            .unwrap();
        assert!(!text.contains('\u{1b}'));
        assert!(text.contains("Realm EXAMPLE.COM"));
        assert!(text.contains("(DNS SRV record)"));
        assert!(text.contains("O=EXAMPLE.COM"));
        assert!(text.contains("NTP servers      none"));
    }

    #[test]
    fn warnings_are_listed() {
        let mut report = sample_report();
        report.warnings.push("Anonymous access to the LDAP server is disabled.".into());
        let text = StyledFormatter::without_colors().format_report(&report).unwrap();
        assert!(text.contains("Warnings:"));
        assert!(text.contains("• Anonymous access"));
    }
}
