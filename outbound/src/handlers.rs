use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use outbound_core::audit::{AuditOptions, AuditProgressCallback, AuditRun, execute_audit};
use outbound_core::config::{AuditProfile, BrowserSection, LoginSection};
use outbound_core::login::{LoginOutcome, authenticate};
use outbound_core::report::{ReportFormat, render, report_for_run, save_report};
use outbound_scanner::{ChromiumOptions, ChromiumRenderer, PageRenderer, StaticRenderer};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,outbound=debug,outbound_core=debug,outbound_scanner=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Only fails when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Command-line values that take precedence over the profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileOverrides {
    pub domain: Option<String>,
    pub max_pages: Option<usize>,
    pub include_pattern: Option<String>,
    pub probe: bool,
    pub use_static: bool,
    pub headful: bool,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
}

// `auth-crawl` lacks some of `crawl`'s flags, so lookups must tolerate unknown ids.
fn flag(args: &ArgMatches, id: &str) -> bool {
    args.try_get_one::<bool>(id).ok().flatten().copied().unwrap_or(false)
}

fn value<T: Clone + Send + Sync + 'static>(args: &ArgMatches, id: &str) -> Option<T> {
    args.try_get_one::<T>(id).ok().flatten().cloned()
}

impl ProfileOverrides {
    pub fn from_matches(args: &ArgMatches) -> Self {
        Self {
            domain: value(args, "domain"),
            max_pages: value(args, "max-pages"),
            include_pattern: value(args, "pattern"),
            probe: flag(args, "probe"),
            use_static: flag(args, "static"),
            headful: flag(args, "headful"),
            format: value(args, "format"),
            output: value(args, "output"),
        }
    }

    pub fn apply(&self, profile: &mut AuditProfile) {
        if let Some(domain) = &self.domain {
            profile.site.domain = Some(domain.clone());
        }
        if let Some(max_pages) = self.max_pages {
            profile.site.max_pages = max_pages;
        }
        if let Some(pattern) = &self.include_pattern {
            profile.site.include_pattern = pattern.clone();
        }
        if self.probe {
            profile.probe.enabled = true;
        }
        if self.use_static {
            profile.browser.engine = "static".to_string();
        }
        if self.headful {
            profile.browser.headless = false;
        }
        if let Some(format) = &self.format {
            profile.report.format = format.clone();
        }
        if let Some(output) = &self.output {
            profile.report.output = Some(output.display().to_string());
        }
    }
}

/// The profile named by `--profile` (or the defaults) with flag overrides applied.
pub fn load_profile(args: &ArgMatches) -> Result<AuditProfile> {
    let mut profile = match args.try_get_one::<PathBuf>("profile").ok().flatten() {
        Some(path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            AuditProfile::load(Path::new(&expanded))?
        }
        None => AuditProfile::default(),
    };

    ProfileOverrides::from_matches(args).apply(&mut profile);
    profile.validate()?;
    Ok(profile)
}

/// Start page: the positional URL, else the profile's base URL.
pub fn resolve_seed(url: Option<&Url>, profile: &AuditProfile) -> Result<String> {
    match (url, &profile.site.base_url) {
        (Some(url), _) => Ok(url.to_string()),
        (None, Some(base_url)) => Ok(base_url.clone()),
        (None, None) => bail!("No start page: pass a URL or set site.base_url in the profile"),
    }
}

pub fn require_login(profile: &AuditProfile) -> Result<&LoginSection> {
    if profile.browser.engine == "static" {
        bail!("auth-crawl needs a browser; browser.engine = \"static\" cannot fill forms");
    }
    profile
        .login
        .as_ref()
        .context("auth-crawl needs a [login] section in the profile")
}

/// The rendering session a run drives.
pub enum Engine {
    Chromium(ChromiumRenderer),
    Static(StaticRenderer),
}

impl Engine {
    pub async fn open(browser: &BrowserSection) -> Result<Self> {
        if browser.engine == "static" {
            let renderer = match &browser.user_agent {
                Some(user_agent) => StaticRenderer::with_user_agent(user_agent)?,
                None => StaticRenderer::new()?,
            };
            return Ok(Engine::Static(renderer));
        }

        let options = ChromiumOptions {
            headless: browser.headless,
            executable: browser
                .executable
                .as_ref()
                .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned())),
            user_agent: browser.user_agent.clone(),
            ..Default::default()
        };
        let renderer = ChromiumRenderer::launch(&options)
            .await
            .context("Could not start the browser")?;
        Ok(Engine::Chromium(renderer))
    }

    pub fn renderer(&self) -> &dyn PageRenderer {
        match self {
            Engine::Chromium(renderer) => renderer,
            Engine::Static(renderer) => renderer,
        }
    }

    pub async fn shutdown(self) {
        if let Engine::Chromium(renderer) = self
            && let Err(e) = renderer.close().await
        {
            warn!("Browser did not shut down cleanly: {}", e);
        }
    }
}

/// Render the run's report in the profile's format and write it out.
/// Returns the file written, or `None` when the report went to stdout.
pub fn write_report(run: &AuditRun, profile: &AuditProfile) -> Result<Option<PathBuf>> {
    let format = ReportFormat::from_str(&profile.report.format).unwrap_or(ReportFormat::Markdown);
    let report = report_for_run(run, &profile.report.title, profile.report.sample_size);
    let content = render(&report, format)?;

    match &profile.report.output {
        Some(output) => {
            let path = PathBuf::from(shellexpand::tilde(output).into_owned());
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            save_report(&content, &path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            Ok(Some(path))
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
            Ok(None)
        }
    }
}

fn progress_printer(quiet: bool) -> Option<AuditProgressCallback> {
    if quiet {
        return None;
    }
    Some(Arc::new(|msg: String| {
        if msg.starts_with("[!]") {
            eprintln!("{}", msg.yellow());
        }
    }))
}

/// Print the run summary and the report; an aborted run is still reported, then fails.
fn finish_run(run: &AuditRun, profile: &AuditProfile) -> Result<()> {
    let outcome = &run.outcome;
    let failed = outcome.failed_pages().count();

    eprintln!(
        "{} {} pages visited, {} third-party domains, {} failed pages ({}s)",
        "✓".green().bold(),
        outcome.visited_count().to_string().bright_white(),
        outcome.audit.len().to_string().bright_white(),
        failed,
        run.duration().num_seconds()
    );

    if let Some(path) = write_report(run, profile)? {
        eprintln!(
            "{} Report written to {}",
            "✓".green().bold(),
            path.display().to_string().bright_white()
        );
    }

    match &outcome.aborted {
        Some(reason) => bail!("Audit incomplete, the report is partial: {}", reason),
        None => Ok(()),
    }
}

pub async fn handle_crawl(args: &ArgMatches, quiet: bool) -> Result<()> {
    let profile = load_profile(args)?;
    let seed = resolve_seed(args.get_one::<Url>("URL"), &profile)?;

    if !quiet {
        eprintln!("{} Auditing {}", "→".blue(), seed.bright_white());
        if profile.probe.enabled {
            eprintln!("{} Interaction probing enabled", "→".blue());
        }
    }

    let engine = Engine::open(&profile.browser).await?;
    let options = AuditOptions {
        seed,
        profile: profile.clone(),
        probe: profile.probe.enabled,
        authenticated: false,
        show_progress_bars: !quiet,
    };
    let result = execute_audit(engine.renderer(), options, progress_printer(quiet)).await;
    engine.shutdown().await;

    finish_run(&result?, &profile)
}

pub async fn handle_auth_crawl(args: &ArgMatches, quiet: bool) -> Result<()> {
    let profile = load_profile(args)?;
    let login = require_login(&profile)?.clone();

    let engine = Engine::open(&profile.browser).await?;

    if !quiet {
        eprintln!("{} Logging in at {}", "→".blue(), login.url.bright_white());
    }
    let landing = match authenticate(engine.renderer(), &login, &profile.timing).await {
        Ok(LoginOutcome::Confirmed {
            landing_url,
            after_grace,
        }) => {
            if !quiet {
                let how = if after_grace { " after the grace period" } else { "" };
                eprintln!("{} Logged in{}", "✓".green().bold(), how);
            }
            landing_url
        }
        Ok(LoginOutcome::Unconfirmed) => {
            engine.shutdown().await;
            bail!(
                "Login could not be confirmed: {} never appeared",
                login.success_marker
            );
        }
        Err(e) => {
            engine.shutdown().await;
            return Err(e.context("Login failed"));
        }
    };

    let options = AuditOptions {
        seed: landing,
        profile: profile.clone(),
        probe: true,
        authenticated: true,
        show_progress_bars: !quiet,
    };
    let result = execute_audit(engine.renderer(), options, progress_printer(quiet)).await;
    engine.shutdown().await;

    finish_run(&result?, &profile)
}

/// Write the commented default profile to `path`, creating parent directories.
pub fn write_default_profile(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, AuditProfile::default_toml())
        .with_context(|| format!("Failed to write profile to {}", path.display()))
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    let raw_path = args
        .get_one::<String>("PATH")
        .context("missing profile path")?;
    let force = args.get_flag("force");
    let expanded = shellexpand::tilde(raw_path);
    let path = Path::new(expanded.as_ref());

    if path.exists() && !force {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!(
            "A profile already exists at {}",
            path.display().to_string().bright_white()
        );
        let response = print_prompt("Overwrite it? [y/N]:")?;
        if response != "y" && response != "yes" {
            println!("{} Initialization cancelled.", "✗".red().bold());
            return Ok(());
        }
    }

    write_default_profile(path)?;
    println!(
        "{} Profile written: {}",
        "✓".green().bold(),
        path.display().to_string().bright_white()
    );
    println!(
        "{} Set site.base_url, then run {}",
        "ℹ".blue(),
        format!("outbound crawl -p {}", path.display()).cyan()
    );
    Ok(())
}
