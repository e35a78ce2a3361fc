use console::style;

use crate::models::build::BuildRecord;

pub fn print_build_table(builds: &[BuildRecord]) {
    if builds.is_empty() {
        println!("  {}", style("No builds recorded.").dim());
        return;
    }

    println!(
        "  {:<42} {:<21} {}",
        style("COMMIT").bold(),
        style("DATE").bold(),
        style("LAST LOG LINE").bold(),
    );
    println!("  {}", "-".repeat(100));

    for build in builds {
        println!(
            "  {:<42} {:<21} {}",
            build.commit_id,
            build.build_date,
            last_line(&build.build_logs, 36),
        );
    }
}

pub fn print_build_detail(build: &BuildRecord) {
    println!();
    println!("  {} {}", style("Commit:").bold(), build.commit_id);
    println!("  {} {}", style("Date:").bold(), build.build_date);
    println!("  {}", style("Log:").bold());
    if build.build_logs.is_empty() {
        println!("  {}", style("(empty)").dim());
    } else {
        for line in build.build_logs.lines() {
            println!("    {}", line);
        }
    }
    println!();
}

/// Last non-blank line of `logs`, cut to `width` characters.
pub fn last_line(logs: &str, width: usize) -> String {
    let line = logs
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("--");
    if line.chars().count() > width {
        let cut: String = line.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_line_skips_blank_tail() {
        assert_eq!(last_line("first\nBUILD SUCCESSFUL\n\n", 40), "BUILD SUCCESSFUL");
        assert_eq!(last_line("", 40), "--");
    }

    #[test]
    fn test_last_line_truncates() {
        assert_eq!(last_line("abcdefghij", 6), "abc...");
    }
}
