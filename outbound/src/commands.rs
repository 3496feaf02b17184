use clap::{arg, command};
use std::path::PathBuf;
use url::Url;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub const DEFAULT_PROFILE_PATH: &str = "~/.config/outbound/profile.toml";

const FORMATS: [&str; 5] = ["markdown", "md", "json", "text", "txt"];

/// Flags shared by `crawl` and `auth-crawl`; they override the profile.
fn crawl_arguments(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-p --"profile" <PATH>)
            .required(false)
            .help("Site profile (TOML). Defaults are used when omitted")
            .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(
        arg!(-d --"domain" <DOMAIN>)
            .required(false)
            .help("First-party domain (default: the start page's host)"),
    )
    .arg(
        arg!(-m --"max-pages" <NUM>)
            .required(false)
            .help("Stop after visiting this many pages")
            .value_parser(clap::value_parser!(usize)),
    )
    .arg(
        arg!(--"pattern" <PATTERN>)
            .required(false)
            .help("Only crawl paths containing this string, e.g. /eng"),
    )
    .arg(
        arg!(--"headful")
            .required(false)
            .help("Show the browser window")
            .action(clap::ArgAction::SetTrue),
    )
    .arg(
        arg!(-o --"output" <PATH>)
            .required(false)
            .help("Save report to file (default: print to stdout)")
            .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(
        arg!(-f --"format" <FORMAT>)
            .required(false)
            .help("Report format: markdown, json, text (default: from profile)")
            .value_parser(FORMATS),
    )
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("outbound")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("outbound")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and progress output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log every page transition (RUST_LOG takes precedence)")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Writes a commented default site profile")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Where to write the profile")
                        .default_value(DEFAULT_PROFILE_PATH),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite an existing profile without asking")
                        .required(false),
                ),
        )
        .subcommand(crawl_arguments(
            command!("crawl")
                .about(
                    "Crawl a site and report every third-party origin its pages contact, \
                with the pages that contacted them.",
                )
                .arg(
                    arg!([URL])
                        .required(false)
                        .help("Start page (default: site.base_url from the profile)")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"probe")
                        .required(false)
                        .help("Hover menus and click cards on every page to find hidden pages")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"static")
                        .required(false)
                        .help("Fetch pages over plain HTTP instead of driving a browser")
                        .action(clap::ArgAction::SetTrue),
                ),
        ))
        .subcommand(
            crawl_arguments(command!("auth-crawl").about(
                "Log in with the profile's [login] section, then crawl from the landing \
                page with interaction probing enabled.",
            ))
            .mut_arg("profile", |a| a.required(true)),
        )
}
