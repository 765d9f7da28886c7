mod cli;
mod logging;
mod reporter;

use std::io::{self, Write};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands, FixArgs, PairsArgs, ValidateArgs};
use colored::*;
use dotenv::dotenv;
use media_integrity::config::{self, YearRange};
use media_integrity::remediate::RemediationRequest;
use media_integrity::report::ArtifactPaths;
use media_integrity::{AppConfig, AuditEngine, FieldPath, Report};
use reporter::CliReporter;
use tracing::{error, info, warn};

fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let mut config = match config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if args.recursive {
        config.recursive = true;
    }

    let result = match args.command {
        Some(Commands::Pairs(pairs)) => run_pairs(config, pairs),
        Some(Commands::Validate(validate)) => run_validate(config, validate),
        Some(Commands::Fix(fix)) => run_fix(config, fix),
        Some(Commands::PrintConfig) => {
            let rendered = toml::to_string_pretty(&config).context("rendering configuration")?;
            println!("{}", rendered);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

fn run_pairs(mut config: AppConfig, args: PairsArgs) -> Result<()> {
    if !args.media_extensions.is_empty() {
        config.media_extensions = args.media_extensions;
    }
    if let Some(ext) = args.metadata_extension {
        config.metadata_extension = ext;
    }
    if args.metadata_subdir.is_some() {
        config.metadata_subdir = args.metadata_subdir;
    }

    let engine = AuditEngine::new(config);
    let reporter = CliReporter::new();
    let outcome = match (args.media_dir, args.metadata_dir) {
        (Some(media), Some(metadata)) => engine.reconcile_dual(&media, &metadata, &reporter),
        _ => engine.reconcile(&args.folders, &reporter),
    };

    let totals = outcome.totals;
    let errored = outcome.errored_folders();
    let report = Report::from_reconciliation(outcome);
    let paths = engine.write_report(&report).context("writing pair report")?;

    println!();
    info!(
        "{} matched, {} missing media, {} missing metadata, {} duplicate",
        format!("{}", totals.matched).green(),
        format!("{}", totals.missing_media).red(),
        format!("{}", totals.missing_metadata).red(),
        format!("{}", totals.duplicate).yellow(),
    );
    info!(
        "Match rate: {}",
        format!("{:.1}%", totals.match_rate()).cyan()
    );
    if errored > 0 {
        warn!("{} folder(s) could not be scanned", errored);
    }
    print_artifacts(&paths);

    Ok(())
}

fn run_validate(mut config: AppConfig, args: ValidateArgs) -> Result<()> {
    if !args.date_formats.is_empty() {
        config.date_formats = args.date_formats;
    }
    if args.any_year {
        config.year_range = None;
    } else if let Some(bounds) = args.year_range {
        match bounds.as_slice() {
            [min, max] => config.year_range = Some(YearRange::new(*min, *max)),
            _ => bail!("--year-range takes exactly two years"),
        }
    }

    let fields = args
        .fields
        .iter()
        .map(|raw| FieldPath::parse(raw))
        .collect::<Result<Vec<_>, _>>()
        .context("parsing --field")?;

    let engine = AuditEngine::new(config);
    let reporter = CliReporter::new();
    let outcome = engine.validate(&args.folders, &fields, &reporter)?;

    let files_scanned = outcome.files_scanned;
    let per_field: Vec<_> = outcome
        .fields
        .iter()
        .map(|field| (field.clone(), outcome.counts_for(field)))
        .collect();
    let report = Report::from_validation(outcome);
    let paths = engine
        .write_report(&report)
        .context("writing validation report")?;

    println!();
    info!("{} document(s) scanned", files_scanned);
    for (field, counts) in per_field {
        info!(
            "{}: {} valid, {} invalid format, {} missing, {} out of range, {} parse error",
            field.bold(),
            format!("{}", counts.valid).green(),
            format!("{}", counts.invalid_format).red(),
            format!("{}", counts.missing).yellow(),
            format!("{}", counts.out_of_range).red(),
            format!("{}", counts.parse_error).red(),
        );
    }
    print_artifacts(&paths);

    Ok(())
}

fn run_fix(config: AppConfig, args: FixArgs) -> Result<()> {
    let field = FieldPath::parse(&args.field).context("parsing --field")?;
    let request = RemediationRequest::new(field, args.find.iter().cloned(), &args.replace)?
        .with_backup(!args.no_backup)
        .with_dry_run(args.dry_run);

    if !args.dry_run && !args.yes {
        let prompt = format!(
            "Replace [{}] with '{}' in field '{}'{}?",
            args.find.join(", "),
            args.replace,
            args.field,
            if args.no_backup { " WITHOUT backups" } else { "" }
        );
        match prompt_confirm(&prompt, Some(false)) {
            Ok(true) => {}
            _ => {
                println!("Aborted, nothing was changed");
                return Ok(());
            }
        }
    }

    let engine = AuditEngine::new(config);
    let reporter = CliReporter::new();
    let outcome = engine.remediate(&args.folders, &request, &reporter);

    let counts = outcome.counts;
    let dry_run = outcome.dry_run;
    let report = Report::from_remediation(outcome);
    let paths = engine.write_report(&report).context("writing fix log")?;

    println!();
    if dry_run {
        info!(
            "{} {} document(s) would change, {} scanned",
            "[DRY-RUN]".yellow(),
            format!("{}", counts.staged).cyan(),
            counts.scanned,
        );
    } else {
        info!(
            "{} applied, {} failed, {} skipped, {} unreadable of {} scanned",
            format!("{}", counts.applied).green(),
            format!("{}", counts.failed).red(),
            counts.skipped,
            format!("{}", counts.unreadable).red(),
            counts.scanned,
        );
    }
    print_artifacts(&paths);

    Ok(())
}

fn print_artifacts(paths: &ArtifactPaths) {
    for path in [&paths.text, &paths.json, &paths.csv] {
        info!("Report written: {}", path.display().to_string().cyan());
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
