//! qadrift: QA metric extraction and drift analysis CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use qadrift::analysis::table::Table;
use qadrift::analysis::{regress, scan, RegressionOptions};
use qadrift::config::{build_glob_set, default_config_json, load_config, CONFIG_FILENAME};
use qadrift::extract::dicom::{extract_dicom, Attribute};
use qadrift::extract::{collect_sources, extract_qc, extract_segstats, ExtractionSummary, QcOptions};
use qadrift::reporter::svg::{render_fit_plot, render_heatmap, write_svg};
use qadrift::reporter::{ConsoleReporter, JsonReporter};
use qadrift::{Config, Profile};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// qadrift: extract imaging QA metrics and look for drift
#[derive(Parser, Debug)]
#[command(name = "qadrift")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: search .qadriftrc.json in current dir and parents)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Quiet mode (no informational messages)
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Verbose output (every skipped file, group members)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append metadata rows to a CSV
    Extract {
        #[command(subcommand)]
        kind: ExtractKind,

        /// Print the extraction summary as JSON
        #[arg(long, global = true)]
        json: bool,
    },

    /// Fit a regression of one QA metric and report significant covariates
    Analyze {
        /// Column to model, e.g. snr_total or tsnr
        #[arg(long)]
        target: String,

        #[arg(long, value_enum, default_value_t = ProfileKind::Qa)]
        profile: ProfileKind,

        /// Add the linear date term
        #[arg(long)]
        trend: bool,

        /// Add the yearly sine/cosine terms
        #[arg(long)]
        seasonal: bool,

        /// Add Shim1..Shim8 (qa profile)
        #[arg(long)]
        shims: bool,

        /// Add IOPD1..IOPD6 (qa profile)
        #[arg(long)]
        iopd: bool,

        /// Only use rows of this Filetype
        #[arg(long)]
        filetype: Option<String>,

        /// Write the fit diagnostic plot
        #[arg(long)]
        plot: bool,

        /// Write the correlation heatmap
        #[arg(long)]
        heatmap: bool,

        /// Significance level (overrides config)
        #[arg(long)]
        alpha: Option<f64>,

        /// Directory for rendered images (overrides config)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output the report as JSON
        #[arg(long, short)]
        json: bool,

        /// Extraction CSVs to analyze
        #[arg(required = true)]
        csv: Vec<PathBuf>,
    },

    /// Repeat one regression per target and tabulate a single covariate
    Scan {
        /// Comma-separated target columns
        #[arg(long, value_delimiter = ',', required = true)]
        targets: Vec<String>,

        /// Covariate whose p-value is collected
        #[arg(long)]
        variable: String,

        #[arg(long, value_enum, default_value_t = ProfileKind::Real)]
        profile: ProfileKind,

        #[arg(long)]
        trend: bool,

        #[arg(long)]
        seasonal: bool,

        #[arg(long)]
        filetype: Option<String>,

        #[arg(long)]
        alpha: Option<f64>,

        #[arg(long, short)]
        json: bool,

        #[arg(required = true)]
        csv: Vec<PathBuf>,
    },

    /// Create .qadriftrc.json with the default settings
    Init {
        /// Directory in which to create config (default: current)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ExtractKind {
    /// Functional QC metrics (tsnr, SAR, shims, ...) from *_bold.json sidecars
    Qc {
        #[arg(long, short)]
        output: PathBuf,

        /// Do not look up anatomical companions (drops the snr_total column)
        #[arg(long)]
        no_anatomical: bool,

        /// Files, directories or glob patterns
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// Per-region segmentation counts and volumes (writes OUT-count.csv and OUT-volume.csv)
    Segstats {
        #[arg(long, short)]
        output: PathBuf,

        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// One instrument attribute from DICOM files
    Dicom {
        #[arg(long, short)]
        output: PathBuf,

        /// Attribute keyword, e.g. PatientWeight
        #[arg(long = "type", value_name = "ATTR")]
        attribute: String,

        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProfileKind {
    Qa,
    Real,
    All,
}

/// Diagnostic verbosity shared by all subcommands
#[derive(Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{}: {}", "Info".blue(), message);
        }
    }

    fn warn(&self, message: &str) {
        eprintln!("{}: {}", "Warning".yellow(), message);
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = Args::parse();
    let out = Output {
        quiet: args.quiet,
        verbose: args.verbose,
    };

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let load = || load_config(&cwd, args.config.as_deref());

    match args.command {
        Commands::Init { dir } => run_init(dir.as_deref()),
        Commands::Extract { kind, json } => run_extract(kind, &load()?, json, out),
        Commands::Analyze {
            target,
            profile,
            trend,
            seasonal,
            shims,
            iopd,
            filetype,
            plot,
            heatmap,
            alpha,
            output_dir,
            json,
            csv,
        } => {
            let config = load()?.merge_with_cli(alpha, output_dir);
            check_alpha(config.alpha)?;
            let profile = build_profile(profile, trend, seasonal, shims, iopd);
            let options = RegressionOptions {
                filetype,
                ..RegressionOptions::from_config(&config, &target, profile)
            };
            run_analyze(&csv, &options, &config, plot, heatmap, json, out)
        }
        Commands::Scan {
            targets,
            variable,
            profile,
            trend,
            seasonal,
            filetype,
            alpha,
            json,
            csv,
        } => {
            let config = load()?.merge_with_cli(alpha, None);
            check_alpha(config.alpha)?;
            let profile = build_profile(profile, trend, seasonal, false, false);
            let options = RegressionOptions {
                filetype,
                ..RegressionOptions::from_config(&config, "", profile)
            };
            let table = Table::from_csv_paths(&csv)?;
            let rows = scan(&table, &targets, &variable, &options)?;
            if json {
                println!("{}", JsonReporter::new().pretty().report_scan(&variable, &rows));
            } else {
                reporter(out).report_scan(&variable, &rows);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check_alpha(alpha: f64) -> Result<()> {
    if !(alpha > 0.0 && alpha < 1.0) {
        anyhow::bail!("alpha must be in (0, 1), got {}", alpha);
    }
    Ok(())
}

fn build_profile(kind: ProfileKind, trend: bool, seasonal: bool, shims: bool, iopd: bool) -> Profile {
    match kind {
        ProfileKind::Qa => Profile::Qa {
            trend,
            seasonal,
            shims,
            iopd,
        },
        ProfileKind::Real => Profile::RealData { trend, seasonal },
        ProfileKind::All => Profile::All,
    }
}

fn reporter(out: Output) -> ConsoleReporter {
    if out.verbose {
        ConsoleReporter::new().verbose()
    } else {
        ConsoleReporter::new()
    }
}

fn run_extract(kind: ExtractKind, config: &Config, json: bool, out: Output) -> Result<ExitCode> {
    let ignore_set = if config.ignore.is_empty() {
        None
    } else {
        Some(build_glob_set(&config.ignore)?)
    };

    let summary = match kind {
        ExtractKind::Qc {
            output,
            no_anatomical,
            sources,
        } => {
            let include = build_glob_set(&config.include_patterns)?;
            let files = collect_sources(&sources, &include, ignore_set.as_ref())?;
            warn_if_empty(&files, out);
            let mut options = QcOptions::from_config(config);
            if no_anatomical {
                options = options.without_anatomical();
            }
            extract_qc(&files, &output, &options)?
        }
        ExtractKind::Segstats { output, sources } => {
            let include = build_glob_set(&["**/*.json".to_string()])?;
            let files = collect_sources(&sources, &include, ignore_set.as_ref())?;
            warn_if_empty(&files, out);
            extract_segstats(&files, &output)?
        }
        ExtractKind::Dicom {
            output,
            attribute,
            sources,
        } => {
            let attribute: Attribute = attribute.parse()?;
            let include = build_glob_set(&["**/*".to_string()])?;
            let files = collect_sources(&sources, &include, ignore_set.as_ref())?;
            warn_if_empty(&files, out);
            extract_dicom(&files, &output, attribute)?
        }
    };

    report_extraction_diagnostics(&summary, out);
    if json {
        println!("{}", JsonReporter::new().pretty().report_extraction(&summary));
    } else if !out.quiet {
        reporter(out).report_extraction(&summary);
    }
    Ok(ExitCode::SUCCESS)
}

fn warn_if_empty(files: &[PathBuf], out: Output) {
    if files.is_empty() {
        out.warn("No source files matched; only the header was written");
    }
}

fn report_extraction_diagnostics(summary: &ExtractionSummary, out: Output) {
    for note in &summary.notes {
        out.info(note);
    }
    if out.verbose {
        for skip in &summary.skipped {
            out.warn(&format!("Skipped {}: {}", skip.path.display(), skip.reason));
        }
    } else if !summary.skipped.is_empty() && !out.quiet {
        out.warn(&format!(
            "Skipped {} of {} files (use --verbose to list them)",
            summary.skipped.len(),
            summary.files_seen
        ));
    }
}

fn run_analyze(
    csv: &[PathBuf],
    options: &RegressionOptions,
    config: &Config,
    plot: bool,
    heatmap: bool,
    json: bool,
    out: Output,
) -> Result<ExitCode> {
    let table = Table::from_csv_paths(csv)?;

    if heatmap {
        let table = match &options.filetype {
            Some(filetype) => table.filter_filetype(filetype)?,
            None => table.clone(),
        };
        let (names, matrix) = table.correlation();
        let path = config.heatmap_path();
        write_svg(&path, &render_heatmap(&names, &matrix))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        out.info(&format!("Correlation heatmap written to {}", path.display()));
    }

    let report = regress(&table, options)?;

    if report.software_versions_consistent == Some(false) {
        out.warn("Conversion software version changed during the analyzed period");
    }
    if !report.excluded.missing_sar.is_empty() {
        let dates: Vec<String> = report.excluded.missing_sar.iter().map(|d| d.to_string()).collect();
        out.info(&format!("Following dates didn't have SAR, excluding them: {}", dates.join(", ")));
    }

    if plot {
        let path = config.fit_plot_path();
        write_svg(&path, &render_fit_plot(&report))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        out.info(&format!("Fit diagnostic written to {}", path.display()));
    }

    if json {
        println!("{}", JsonReporter::new().pretty().report_regression(&report));
    } else {
        reporter(out).report_regression(&report);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_init(dir: Option<&Path>) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let dir = dir.unwrap_or(&cwd);
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() {
        eprintln!(
            "{}: {} already exists; use --dir to write elsewhere or remove it first",
            "Warning".yellow(),
            config_path.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(&config_path, default_config_json())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("{} {}", "Created".green(), config_path.display());
    Ok(ExitCode::SUCCESS)
}
