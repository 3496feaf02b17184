use colored::Colorize;

pub mod audit;
pub mod config;
pub mod login;
pub mod report;

pub use audit::{AuditOptions, AuditProgressCallback, AuditRun, execute_audit};
pub use config::AuditProfile;
pub use login::{LoginOutcome, authenticate};
pub use report::{AuditReport, ReportFormat, build_report};

pub fn print_banner() {
    let banner = r#"
   ___  _   _ _____ ____   ___  _   _ _   _ ____
  / _ \| | | |_   _| __ ) / _ \| | | | \ | |  _ \
 | | | | | | | | | |  _ \| | | | | | |  \| | | | |
 | |_| | |_| | | | | |_) | |_| | |_| | |\  | |_| |
  \___/ \___/  |_| |____/ \___/ \___/|_| \_|____/
"#;
    eprintln!("{}", banner.cyan());
    eprintln!(
        "  {} v{}\n",
        "who does this site talk to?".dimmed(),
        env!("CARGO_PKG_VERSION")
    );
}
