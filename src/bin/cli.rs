use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mcp_provenance::attestation::{
    ArtifactRequest, AttestationSource, AttestationVerifier, CommandOracle, EvidenceOracle,
    HttpAttestationSource, NpmVerifier, PypiVerifier,
};
use mcp_provenance::config::{Config, CONFIG_FILE_NAME};
use mcp_provenance::error::{AuditError, Result};
use mcp_provenance::model::Ecosystem;
use mcp_provenance::output::OutputFormat;
use mcp_provenance::resolver::lockgen::{NpmLockGenerator, PoetryLockGenerator};
use mcp_provenance::resolver::tree::render_tree;
use mcp_provenance::resolver::{resolve_info, NpmResolver, PackageResolver, PypiResolver};
use mcp_provenance::{summary, CollectOptions};

/// Entries processed with `--dev`.
const DEV_LIMIT: usize = 2;

#[derive(Parser)]
#[command(
    name = "mcp-provenance",
    about = "Build-provenance auditor for MCP server packages",
    version,
    author
)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit every npm/PyPI package in the MCP registry
    Collect {
        /// Output directory
        #[arg(long)]
        out: Option<PathBuf>,

        /// Registry seed file URL or local path
        #[arg(long, env = "MCP_PROVENANCE_REGISTRY")]
        registry: Option<String>,

        /// Stop after this many packages were recorded
        #[arg(long, conflicts_with = "dev")]
        limit: Option<usize>,

        /// Development mode (limit to 2 packages)
        #[arg(long)]
        dev: bool,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Summarize persisted package records
    Summarize {
        /// Directory of package records
        input_dir: PathBuf,

        /// Summary file to write
        output: PathBuf,

        /// Also print the summary to stdout (console, json)
        #[arg(long, short = 'f')]
        format: Option<String>,
    },

    /// Resolve a package and print its dependency tree
    Resolve {
        /// Ecosystem (npm, pypi)
        ecosystem: String,

        /// Package name
        name: String,

        /// Version constraint (defaults to resolver.version_constraint)
        #[arg(long)]
        version: Option<String>,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Verify the attestations of a single artifact
    Verify {
        /// Ecosystem (npm, pypi)
        ecosystem: String,

        /// npm package name or PyPI distribution filename
        artifact: String,

        /// Canonical digest (sha512:<hex> for npm, sha256:<hex> for PyPI)
        hash: String,

        /// Package version (required for npm)
        #[arg(long)]
        version: Option<String>,

        /// Expected source repository URL
        #[arg(long)]
        repo: Option<String>,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Generate a starter .mcp-provenance.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Collect {
            out,
            registry,
            limit,
            dev,
            config,
        } => cmd_collect(out, registry, limit, dev, config),
        Commands::Summarize {
            input_dir,
            output,
            format,
        } => cmd_summarize(input_dir, output, format),
        Commands::Resolve {
            ecosystem,
            name,
            version,
            config,
        } => cmd_resolve(ecosystem, name, version, config),
        Commands::Verify {
            ecosystem,
            artifact,
            hash,
            version,
            repo,
            config,
        } => cmd_verify(ecosystem, artifact, hash, version, repo, config),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    Config::load(&path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME)))
}

fn parse_ecosystem(s: &str) -> Result<Ecosystem> {
    Ecosystem::from_registry_name(s)
        .ok_or_else(|| AuditError::Config(format!("unsupported ecosystem '{}' (npm, pypi)", s)))
}

fn cmd_collect(
    out: Option<PathBuf>,
    registry: Option<String>,
    limit: Option<usize>,
    dev: bool,
    config: Option<PathBuf>,
) -> Result<i32> {
    let options = CollectOptions {
        config_path: config,
        out_dir: out,
        registry,
        limit: if dev { Some(DEV_LIMIT) } else { limit },
    };

    let report = mcp_provenance::collect(&options)?;
    println!(
        "Recorded {} package(s), {} failed, {} skipped. Summary: {}",
        report.run.processed,
        report.run.failed,
        report.run.skipped,
        report.summary_path.display()
    );

    // Exit code: 0 = all entries recorded, 1 = some entries failed
    Ok(if report.run.failed == 0 { 0 } else { 1 })
}

fn cmd_summarize(input_dir: PathBuf, output: PathBuf, format: Option<String>) -> Result<i32> {
    if !input_dir.is_dir() {
        return Err(AuditError::Summary(format!(
            "{} is not a directory",
            input_dir.display()
        )));
    }

    let summaries = summary::summarize_dir(&input_dir)?;
    summary::write_summaries(&summaries, &output)?;

    if let Some(format_str) = format {
        let format = OutputFormat::from_str_lenient(&format_str).unwrap_or_else(|| {
            eprintln!("Warning: unknown format '{}', using console", format_str);
            OutputFormat::Console
        });
        print!("{}", mcp_provenance::output::render(&summaries, format)?);
    }

    Ok(0)
}

fn cmd_resolve(
    ecosystem: String,
    name: String,
    version: Option<String>,
    config: Option<PathBuf>,
) -> Result<i32> {
    let config = load_config(config)?;
    let constraint = version.unwrap_or(config.resolver.version_constraint);
    let resolver: Box<dyn PackageResolver> = match parse_ecosystem(&ecosystem)? {
        Ecosystem::Npm => Box::new(NpmResolver::new(NpmLockGenerator {
            program: config.resolver.npm_program,
        })?),
        Ecosystem::Pypi => Box::new(PypiResolver::new(PoetryLockGenerator {
            program: config.resolver.poetry_program,
            python: config.resolver.python_constraint,
        })?),
    };

    let info = resolve_info(resolver.as_ref(), &name, &constraint)?;
    print!("{}", render_tree(&info));
    for gap in &info.unresolved {
        println!("unresolved: {} -> {}", gap.package, gap.dependency);
    }

    Ok(0)
}

fn cmd_verify(
    ecosystem: String,
    artifact: String,
    hash: String,
    version: Option<String>,
    repo: Option<String>,
    config: Option<PathBuf>,
) -> Result<i32> {
    let config = load_config(config)?;
    let ecosystem = parse_ecosystem(&ecosystem)?;

    let source: Arc<dyn AttestationSource> = Arc::new(HttpAttestationSource::new(
        &config.attestation.npm_base_url,
        &config.attestation.pypi_base_url,
        config.attestation.timeout(),
    )?);
    let oracle: Arc<dyn EvidenceOracle> =
        Arc::new(CommandOracle::new(config.attestation.oracle_command.clone()));

    let verifier: Box<dyn AttestationVerifier> = match ecosystem {
        Ecosystem::Npm => Box::new(NpmVerifier::new(source, oracle)),
        Ecosystem::Pypi => Box::new(PypiVerifier::new(source, oracle)),
    };

    // npm evidence is keyed by name and version; PyPI by distribution filename.
    let (package, version, locator) = match ecosystem {
        Ecosystem::Npm => {
            let version = version.ok_or_else(|| {
                AuditError::Config("--version is required for npm artifacts".into())
            })?;
            let locator = format!("pkg:npm/{}@{}", artifact, version);
            (artifact, version, locator)
        }
        Ecosystem::Pypi => (artifact.clone(), version.unwrap_or_default(), artifact),
    };

    let request = ArtifactRequest {
        package: &package,
        version: &version,
        artifact: &locator,
        hash: &hash,
        expected_repo_url: repo.as_deref(),
    };
    let attestations = verifier.verify(&request)?;
    println!("{}", serde_json::to_string_pretty(&attestations)?);

    // Exit code: 0 = verified, 1 = missing or failed provenance
    let failed = attestations.is_empty() || attestations.iter().any(|a| a.error_code().is_some());
    Ok(if failed { 1 } else { 0 })
}

fn cmd_init(force: bool) -> Result<i32> {
    let path = PathBuf::from(CONFIG_FILE_NAME);

    if path.exists() && !force {
        eprintln!("{} already exists. Use --force to overwrite.", CONFIG_FILE_NAME);
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created {}", CONFIG_FILE_NAME);

    Ok(0)
}
