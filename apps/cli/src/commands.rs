//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docweave_core::{
    BuildContext, ComponentRegistry, PipelineEngine, ProgressReporter, default_skeleton,
    load_topics,
};
use docweave_document::Document;
use docweave_index::{IndexRule, build_index};
use docweave_shared::{
    AppConfig, BuildReport, EngineSettings, init_config, load_config, load_pipeline,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docweave: assemble documentation topics from indexed XML sources.
#[derive(Parser)]
#[command(
    name = "docweave",
    version,
    about = "Run documentation build pipelines over indexed XML sources.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run every topic in a manifest through a pipeline.
    Build {
        /// Pipeline file (TOML) declaring the ordered components.
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Topic manifest (`<topics><topic id="..."/></topics>`).
        #[arg(short, long)]
        manifest: PathBuf,

        /// Skeleton document every topic starts from. Defaults to `<document />`.
        #[arg(long)]
        skeleton: Option<PathBuf>,

        /// Output directory. Defaults to `defaults.output_dir`, relative to the pipeline file.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write the build report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Exit non-zero when any topic failed.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        fail_on_topic_errors: bool,
    },

    /// Index XML files and print what was found.
    Index {
        /// Files to scan.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Element path of the documents to index, e.g. `/reflection/apis/api`.
        #[arg(long)]
        value: String,

        /// Attribute holding each document's id.
        #[arg(long, default_value = "id")]
        key: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docweave=info",
        1 => "docweave=debug",
        _ => "docweave=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays clean for summaries.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build {
            pipeline,
            manifest,
            skeleton,
            out,
            report,
            fail_on_topic_errors,
        } => {
            let args = BuildArgs {
                pipeline,
                manifest,
                skeleton,
                out,
                report,
                fail_on_topic_errors,
            };
            cmd_build(&args, &load_config()?)
        }
        Command::Index { files, value, key } => cmd_index(&files, &value, &key),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

struct BuildArgs {
    pipeline: PathBuf,
    manifest: PathBuf,
    skeleton: Option<PathBuf>,
    out: Option<PathBuf>,
    report: Option<PathBuf>,
    fail_on_topic_errors: bool,
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_build(args: &BuildArgs, config: &AppConfig) -> Result<()> {
    let started = Instant::now();
    let pipeline = load_pipeline(&args.pipeline)?;

    let base_dir = args
        .pipeline
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let output_dir = match &args.out {
        Some(dir) => absolute(dir)?,
        None => PathBuf::from(&config.defaults.output_dir),
    };

    let settings = EngineSettings::from(config).with_build_settings(&pipeline.build);
    info!(
        pipeline = %args.pipeline.display(),
        components = pipeline.components.len(),
        parallel = settings.parallel,
        "starting build"
    );

    let context = BuildContext::new(settings)
        .with_base_dir(base_dir)
        .with_output_dir(output_dir);
    let registry = ComponentRegistry::with_builtins();
    let mut engine = PipelineEngine::from_config(&registry, &pipeline, context)?;

    let skeleton = match &args.skeleton {
        Some(path) => Document::from_file(path)?,
        None => default_skeleton(),
    };
    let topics = load_topics(&args.manifest, &skeleton)?;

    let reporter = CliProgress::new();
    reporter.phase("Building indexes");
    engine.initialize()?;

    let output = engine.run(topics, &reporter)?;
    let output_dir = engine.context().output_dir();
    engine.dispose();

    if let Some(path) = &args.report {
        write_report(path, &output.report)?;
    }

    let report = &output.report;
    println!();
    println!("  Build finished.");
    println!("  Run:      {}", report.run_id);
    println!("  Topics:   {}", report.topics_processed);
    println!("  Failed:   {}", report.topics_failed);
    println!("  Misses:   {}", report.resolution_misses.len());
    println!("  Warnings: {}", report.warnings.len());
    println!("  Output:   {}", output_dir.display());
    println!("  Time:     {:.1}s", started.elapsed().as_secs_f64());
    println!();

    for error in &report.topic_errors {
        println!(
            "  error: topic '{}' failed in '{}': {}",
            error.topic_key, error.component, error.message
        );
    }

    if report.has_topic_errors() {
        if args.fail_on_topic_errors {
            return Err(eyre!("{} topic(s) failed", report.topics_failed));
        }
        warn!(failed = report.topics_failed, "build finished with topic errors");
    }

    Ok(())
}

fn write_report(path: &Path, report: &BuildReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("cannot create '{}': {e}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).map_err(|e| eyre!("cannot write report '{}': {e}", path.display()))?;
    info!(path = %path.display(), "build report written");
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    Ok(cwd.join(path))
}

fn cmd_index(files: &[PathBuf], value: &str, key: &str) -> Result<()> {
    let rule = IndexRule::new(value, key)?;
    info!(files = files.len(), value, key, "indexing files");

    let (index, status) = build_index(files, &rule);

    println!();
    println!("  Files:      {}", status.files_indexed);
    println!("  Documents:  {}", index.len());
    println!("  Duplicates: {}", status.duplicates);
    println!("  No key:     {}", status.skipped_without_key);
    println!("  Failed:     {}", status.failed.len());
    for failed in &status.failed {
        println!("    {}: {}", failed.path.display(), failed.reason);
    }
    println!();

    if !status.is_complete() && status.files_indexed == 0 {
        return Err(eyre!("no file could be indexed"));
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn topic_done(&self, key: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing [{current}/{total}] {key}"));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "docweave-cli-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A pipeline that copies `<summary>` from `comments.xml` and saves each topic.
    fn write_site(dir: &Path, missing: &str) -> BuildArgs {
        std::fs::write(
            dir.join("comments.xml"),
            r#"<doc><members><member name="T:A"><summary>Type A</summary></member></members></doc>"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("topics.xml"),
            r#"<topics><topic id="T:A" /><topic id="T:B" /></topics>"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("pipeline.toml"),
            format!(
                r#"
                [[components]]
                type = "copy_from_index"
                [components.config.index]
                name = "comments"
                value = "/doc/members/member"
                key = "name"
                sources = [{{ path = "comments.xml" }}]
                [[components.config.copy]]
                source = "summary"
                target = "/document"
                missing = "{missing}"

                [[components]]
                type = "save"
                "#
            ),
        )
        .unwrap();

        BuildArgs {
            pipeline: dir.join("pipeline.toml"),
            manifest: dir.join("topics.xml"),
            skeleton: None,
            out: Some(dir.join("site")),
            report: Some(dir.join("reports/build.json")),
            fail_on_topic_errors: true,
        }
    }

    #[test]
    fn build_writes_topics_and_report() {
        let dir = temp_dir();
        let args = write_site(&dir, "warn");
        cmd_build(&args, &AppConfig::default()).unwrap();

        let saved = std::fs::read_to_string(dir.join("site/T_A.xml")).unwrap();
        assert!(saved.ends_with("<document><summary>Type A</summary></document>"));
        assert!(dir.join("site/T_B.xml").is_file());

        let json = std::fs::read_to_string(dir.join("reports/build.json")).unwrap();
        let report: BuildReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.topics_processed, 2);
        assert_eq!(report.topics_failed, 0);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].topic_key, "T:B");
    }

    #[test]
    fn topic_errors_fail_the_build_unless_allowed() {
        let dir = temp_dir();
        let mut args = write_site(&dir, "error");
        let err = cmd_build(&args, &AppConfig::default()).unwrap_err();
        assert!(err.to_string().contains("1 topic(s) failed"));

        let json = std::fs::read_to_string(dir.join("reports/build.json")).unwrap();
        let report: BuildReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.topic_errors.len(), 1);
        assert_eq!(report.topic_errors[0].topic_key, "T:B");
        assert_eq!(report.topic_errors[0].component, "copy_from_index");
        assert!(dir.join("site/T_A.xml").is_file());
        assert!(!dir.join("site/T_B.xml").exists());

        args.fail_on_topic_errors = false;
        cmd_build(&args, &AppConfig::default()).unwrap();
    }

    #[test]
    fn parses_build_arguments() {
        let cli = Cli::try_parse_from([
            "docweave",
            "-vv",
            "build",
            "--pipeline",
            "site/pipeline.toml",
            "--manifest",
            "site/topics.xml",
            "--fail-on-topic-errors",
            "false",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Build {
                pipeline,
                manifest,
                skeleton,
                fail_on_topic_errors,
                ..
            } => {
                assert_eq!(pipeline, PathBuf::from("site/pipeline.toml"));
                assert_eq!(manifest, PathBuf::from("site/topics.xml"));
                assert!(skeleton.is_none());
                assert!(!fail_on_topic_errors);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn fail_on_topic_errors_defaults_on() {
        let cli = Cli::try_parse_from([
            "docweave", "build", "-p", "p.toml", "-m", "m.xml",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Build { fail_on_topic_errors: true, .. }
        ));
    }

    #[test]
    fn index_requires_files() {
        assert!(Cli::try_parse_from(["docweave", "index", "--value", "/a/b"]).is_err());
        let cli = Cli::try_parse_from([
            "docweave", "index", "a.xml", "b.xml", "--value", "/reflection/apis/api",
        ])
        .unwrap();
        match cli.command {
            Command::Index { files, key, .. } => {
                assert_eq!(files.len(), 2);
                assert_eq!(key, "id");
            }
            _ => panic!("expected index"),
        }
    }
}
