//! depo CLI: release archival with DOIs and provenance document upkeep.

mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use depo_core::Environment;
use depo_deposit::DeployFailure;

use commands::deploy::DeployArgs;
use commands::document::{DocumentArgs, DocumentDrift};
use commands::ledger::RecordArgs;
use commands::ConfigError;
use config::DepoConfig;

#[derive(Parser)]
#[command(name = "depo", version, about = "Deposition & provenance pipeline")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive a tagged release to the deposit service and mint a DOI
    Deploy {
        /// Release tag to archive
        #[arg(long)]
        tag: String,
        /// Repository owner (default: deploy.owner)
        #[arg(long)]
        owner: Option<String>,
        /// Repository name (default: deploy.repo)
        #[arg(long)]
        repo: Option<String>,
        /// Deposit service environment (sandbox, production)
        #[arg(long)]
        environment: Option<Environment>,
        /// Use assets already in the cache directory without downloading
        #[arg(long)]
        skip_download: bool,
        /// Re-download assets even when a verified copy is cached
        #[arg(long)]
        force_download: bool,
        /// Metadata manifest (default: .zenodo.json)
        #[arg(long)]
        metadata: Option<PathBuf>,
        /// Asset cache directory (default: releases)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Show recorded deployments
    Status {
        /// Only this tag
        #[arg(long)]
        tag: Option<String>,
        /// Only this environment
        #[arg(long)]
        environment: Option<Environment>,
    },
    /// Render the provenance document
    Document {
        /// Directory to scan
        #[arg(long)]
        root: Option<PathBuf>,
        /// Template with insertion markers
        #[arg(long)]
        template: Option<PathBuf>,
        /// Rendered document path
        #[arg(long)]
        output: Option<PathBuf>,
        /// Audit ledger (TSV)
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// Fixed timestamp text instead of the newest ledger date
        #[arg(long)]
        timestamp: Option<String>,
        /// Fail if the committed document is out of date
        #[arg(long)]
        check: bool,
    },
    /// Manage the audit ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Hash an input and output and append a provenance row
    Record {
        /// Figure id, e.g. Fig1 or ED2
        figure_id: String,
        /// Producing script, relative to the project
        #[arg(long)]
        script: String,
        /// Input file that was read
        #[arg(long)]
        input: PathBuf,
        /// Output artifact that was written
        #[arg(long)]
        output: PathBuf,
        /// Interpreter or toolchain version
        #[arg(long)]
        environment_version: Option<String>,
        /// Pinned dependency list
        #[arg(long)]
        dependency_versions: Option<String>,
        /// Execution date (YYYY-MM-DD or RFC 3339; default: now)
        #[arg(long)]
        date: Option<String>,
        /// Audit ledger (default: document.ledger)
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Show the latest record per figure
    Show {
        /// Only this figure id
        figure_id: Option<String>,
        /// Every row, not only the latest per figure
        #[arg(long)]
        all: bool,
        /// Audit ledger (default: document.ledger)
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "depo={level},depo_core={level},depo_deposit={level},depo_provenance={level}"
        ))
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(exit_code(&e));
    }
}

/// Map a failure to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(failure) = err.downcast_ref::<DeployFailure>() {
        return failure.exit_code();
    }
    if err.is::<DocumentDrift>() {
        return 3;
    }
    if err
        .chain()
        .any(|cause| cause.is::<ConfigError>() || cause.is::<toml::de::Error>())
    {
        return 2;
    }
    1
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let (config, project_dir) = DepoConfig::load_or_default(&cwd)?;

    match cli.command {
        Commands::Deploy {
            tag,
            owner,
            repo,
            environment,
            skip_download,
            force_download,
            metadata,
            cache_dir,
        } => {
            let args = DeployArgs {
                owner,
                repo,
                tag,
                environment,
                skip_download,
                force_download,
                metadata,
                cache_dir,
            };
            commands::deploy::run(&project_dir, &config.deploy, &args)
        }

        Commands::Status { tag, environment } => {
            commands::status::run(&project_dir, &config.deploy, tag.as_deref(), environment)
        }

        Commands::Document {
            root,
            template,
            output,
            ledger,
            timestamp,
            check,
        } => {
            let args = DocumentArgs {
                root,
                template,
                output,
                ledger,
                timestamp,
                check,
            };
            commands::document::run(&project_dir, &config.document, &args).map(|_| ())
        }

        Commands::Ledger { action } => match action {
            LedgerAction::Record {
                figure_id,
                script,
                input,
                output,
                environment_version,
                dependency_versions,
                date,
                ledger,
            } => {
                // Artifact paths are given relative to where the command runs.
                let args = RecordArgs {
                    figure_id,
                    script,
                    input: cwd.join(input),
                    output: cwd.join(output),
                    environment_version,
                    dependency_versions,
                    date,
                    ledger,
                };
                commands::ledger::record(&project_dir, &config.document, &args).map(|_| ())
            }
            LedgerAction::Show {
                figure_id,
                all,
                ledger,
            } => commands::ledger::show(
                &project_dir,
                &config.document,
                figure_id.as_deref(),
                all,
                ledger.as_ref(),
            ),
        },
    }
}

#[cfg(test)]
mod integration_tests {
    use std::path::Path;

    use depo_deposit::{DepositError, Step};
    use depo_provenance::AuditLedger;

    use super::*;

    const MANIFEST: &str = r#"{
  "title": "Immune state geometry",
  "description": "Processed tables and figure sources",
  "creators": [{"name": "Doe, Jane", "affiliation": "Institute", "orcid": "0000-0002-1825-0097"}],
  "keywords": ["provenance"],
  "license": "MIT"
}"#;

    const TEMPLATE: &str = "# Data & Code Availability\n\n\
<!-- TABLES_AUTO -->\n\n## Figures\n<!-- FIGS_AUTO -->\n\n\
## Scripts\n<!-- SCRIPTS_AUTO -->\n\n<!-- CAVEATS_AUTO -->\n\n_Audited <!-- TIMESTAMP_AUTO -->_\n";

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn deploy_args(tag: &str) -> DeployArgs {
        DeployArgs {
            owner: Some("lab".into()),
            repo: Some("immune-state-geometry".into()),
            tag: tag.into(),
            environment: Some(Environment::Sandbox),
            ..Default::default()
        }
    }

    /// Missing token: halts in preflight with exit code 2 and writes nothing.
    #[test]
    fn deploy_without_token_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".zenodo.json", MANIFEST.as_bytes());
        let config = DepoConfig::default();

        let err = commands::deploy::prepare(
            dir.path(),
            &config.deploy,
            &deploy_args("v1.0.0"),
            "DEPO_TEST_TOKEN_NEVER_SET",
        )
        .err()
        .unwrap();

        let failure = err.downcast_ref::<DeployFailure>().unwrap();
        assert_eq!(failure.step, Step::Preflight);
        assert!(matches!(failure.source, DepositError::AuthRequired { .. }));
        assert_ne!(exit_code(&err), 0);
        assert_eq!(exit_code(&err), 2);
        assert!(!dir.path().join(&config.deploy.result_file).exists());
        assert!(!dir.path().join(&config.deploy.state_file).exists());
    }

    #[test]
    fn deploy_requires_environment() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = deploy_args("v1.0.0");
        args.environment = None;
        let err = commands::deploy::prepare(dir.path(), &DepoConfig::default().deploy, &args, "X")
            .err()
            .unwrap();
        assert!(err.is::<ConfigError>());
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn status_reads_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        commands::status::run(dir.path(), &DepoConfig::default().deploy, None, None).unwrap();
    }

    /// Ledger record → document render → check → drift after mutation.
    #[test]
    fn ledger_document_check_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let config = DepoConfig::default();
        write(root, &config.document.template.to_string_lossy(), TEMPLATE.as_bytes());
        write(root, "data/raw/counts.tsv.gz", b"raw");
        write(root, "data/processed/Fig1_InfoArchitecture.tsv", b"cluster\tx\ty\n");
        write(root, "figures/Fig1.pdf", b"%PDF-1.7");
        write(root, "scripts/fig1.py", b"# builds Fig1");

        commands::ledger::record(
            root,
            &config.document,
            &RecordArgs {
                figure_id: "Fig1".into(),
                script: "scripts/fig1.py".into(),
                input: "data/raw/counts.tsv.gz".into(),
                output: "data/processed/Fig1_InfoArchitecture.tsv".into(),
                environment_version: Some("python 3.11.6".into()),
                date: Some("2026-06-01".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let ledger = AuditLedger::new(root.join(&config.document.ledger));
        assert_eq!(ledger.read().unwrap().len(), 1);

        let rendered =
            commands::document::run(root, &config.document, &DocumentArgs::default()).unwrap();
        assert!(rendered.xref.stale.is_empty());
        let written = std::fs::read_to_string(root.join(&config.document.output)).unwrap();
        assert_eq!(written, rendered.document);
        assert!(written.contains("_Audited 2026-06-01T00:00:00Z_"));

        let check = DocumentArgs {
            check: true,
            ..Default::default()
        };
        commands::document::run(root, &config.document, &check).unwrap();

        write(root, "data/processed/Fig1_InfoArchitecture.tsv", b"cluster\tx\ty\nedited\n");
        let err = commands::document::run(root, &config.document, &check).err().unwrap();
        assert!(err.is::<DocumentDrift>());
        assert_eq!(exit_code(&err), 3);

        let rendered =
            commands::document::run(root, &config.document, &DocumentArgs::default()).unwrap();
        assert_eq!(rendered.xref.stale, vec!["Fig1"]);

        commands::ledger::show(root, &config.document, Some("Fig1"), true, None).unwrap();
    }
}
