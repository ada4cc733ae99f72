//! Command template substitution.

/// Build the full command line from a configured template by resolving the
/// `{src}` / `{dst}` placeholders and prepending the binary path.
#[must_use]
pub fn build_command(bin: &str, template: &str, src_url: &str, dst_url: &str) -> String {
    let args = template.replace("{src}", src_url).replace("{dst}", dst_url);
    format!("{bin} {args}")
}
