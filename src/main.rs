use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dicom_core::Tag;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use dicom_rt_tools::edit::{self, AnonymizeOptions, UpiDefaults};
use dicom_rt_tools::header::parse_tag;
use dicom_rt_tools::select::select;
use dicom_rt_tools::{
    DatasetCache, DumpTree, Loader, Patient, UidGenerator, UidRemapper, check_patient,
    list_patient_folders,
};

#[derive(Parser)]
#[command(name = "dicom-rt")]
#[command(about = "Inspect, check and patch DICOM RT patient folders")]
#[command(version)]
struct Cli {
    /// Verbose output (debug logging and progress bars)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every element of one DICOM file as a tree
    Dump {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only show rows containing this text (case-insensitive, at least 2 characters)
        #[arg(short, long)]
        search: Option<String>,

        /// Also match the search against element values
        #[arg(long)]
        include_value: bool,

        /// Write the tab-indented tree to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the patient folders of a Conquest data directory
    Patients {
        #[arg(env = "DICOM_RT_DATA_DIR", value_name = "DATA_DIR")]
        data_dir: PathBuf,
    },

    /// Show the patient, study, series and instance tree of a folder
    List {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        /// Also list every instance
        #[arg(long)]
        instances: bool,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check the references between the RT objects of a folder
    Check {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Strip identifying attributes from every file of a folder, in place
    Anonymize {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        /// Value written to PatientBirthDate
        #[arg(long, default_value = "19500101")]
        birth_date: String,

        /// Additional tags to delete, as ggggeeee
        #[arg(long, value_delimiter = ',', value_parser = parse_tag)]
        remove: Vec<Tag>,

        /// Tags to keep but empty, as ggggeeee
        #[arg(long, value_delimiter = ',', value_parser = parse_tag)]
        clear: Vec<Tag>,

        /// Rewrite files in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// Move series from one study of a patient into another
    MergeStudy {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        /// Study to take series from (1-based position or UID)
        #[arg(long)]
        from: String,

        /// Study to move series into (1-based position or UID)
        #[arg(long)]
        into: String,

        /// Series of the source study to move; all of them when omitted
        #[arg(long, value_delimiter = ',')]
        series: Vec<String>,
    },

    /// Save a copy of a series with another patient position and new UIDs
    PatientPosition {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        /// Study (1-based position or UID)
        #[arg(long, default_value = "1")]
        study: String,

        /// Series (1-based position or UID)
        #[arg(long)]
        series: String,

        /// New patient position: HFS, FFS, HFP or FFP
        #[arg(long)]
        position: String,

        /// Directory receiving the original and converted series
        #[arg(long, env = "DICOM_RT_DEST_DIR")]
        dest: PathBuf,

        /// Organisation root for generated UIDs; 2.25 UUID UIDs when unset
        #[arg(long, env = "DICOM_RT_UID_ROOT")]
        uid_root: Option<String>,
    },

    /// Shorten over-long SeriesDescription values of a series, in place
    TruncateDescription {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        /// Study (1-based position or UID)
        #[arg(long, default_value = "1")]
        study: String,

        /// Series (1-based position or UID)
        #[arg(long)]
        series: String,

        #[arg(long, default_value_t = edit::MAX_DESCRIPTION_LEN)]
        max_len: usize,
    },

    /// Rewrite RTPLAN and RTDOSE descriptions to the U=<upi> form
    ResetUpi {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        /// Study (1-based position or UID)
        #[arg(long, default_value = "1")]
        study: String,

        /// PatientSex written where it is empty
        #[arg(long, default_value = "M")]
        sex: String,

        /// PatientBirthDate written where it is empty
        #[arg(long, default_value = "19790401")]
        birth_date: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    /// Indented text
    Text,
    /// Pretty-printed JSON
    Json,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Dump {
            file,
            search,
            include_value,
            output,
        } => dump(&file, search.as_deref(), include_value, output.as_deref())?,
        Command::Patients { data_dir } => {
            let folders = list_patient_folders(&data_dir)
                .with_context(|| format!("Failed to list {}", data_dir.display()))?;
            for folder in folders {
                println!("{}", folder.display());
            }
        }
        Command::List {
            folder,
            instances,
            format,
        } => {
            let patient = load(&folder, cli.verbose)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&patient)?),
                OutputFormat::Text => print_tree(&patient, instances),
            }
        }
        Command::Check { folder, format } => {
            let patient = load(&folder, cli.verbose)?;
            let report = check_patient(&patient);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => println!("{}", report.render(&patient)),
            }
            if !report.is_fine() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Anonymize {
            folder,
            birth_date,
            remove,
            clear,
            parallel,
        } => {
            let mut options = AnonymizeOptions {
                clear,
                birth_date,
                parallel,
                ..Default::default()
            };
            options.remove.extend(remove);
            let count = edit::anonymize_folder(&folder, &options)
                .with_context(|| format!("Failed to anonymize {}", folder.display()))?;
            println!("Anonymized {count} files");
        }
        Command::MergeStudy {
            folder,
            from,
            into,
            series,
        } => {
            let patient = load(&folder, cli.verbose)?;
            let source = select(patient.studies.as_slice(), &from, "study")?;
            let target = select(patient.studies.as_slice(), &into, "study")?;
            let series_uids = if series.is_empty() {
                source.series().map(|s| s.uid.clone()).collect()
            } else {
                series
                    .iter()
                    .map(|key| select(source.series.as_slice(), key, "series").map(|s| s.uid.clone()))
                    .collect::<dicom_rt_tools::Result<Vec<_>>>()?
            };
            let mut cache = DatasetCache::new();
            let changes = edit::merge_study(&patient, source, target, &series_uids, &mut cache)?;
            for change in &changes {
                println!("{}", change.file.display());
                for message in &change.changes {
                    println!("  {message}");
                }
            }
            println!("Rewrote {} files", changes.len());
        }
        Command::PatientPosition {
            folder,
            study,
            series,
            position,
            dest,
            uid_root,
        } => {
            let patient = load(&folder, cli.verbose)?;
            let study = select(patient.studies.as_slice(), &study, "study")?;
            let series = select(study.series.as_slice(), &series, "series")?;
            let mut uids = UidRemapper::new(UidGenerator::new(uid_root)?);
            let mut cache = DatasetCache::new();
            let change = edit::change_patient_position(series, &position, &dest, &mut uids, &mut cache)?;
            println!("Original series saved to {}", change.original_dir.display());
            println!(
                "Converted {} files into {}",
                change.files,
                change.output_dir.display()
            );
        }
        Command::TruncateDescription {
            folder,
            study,
            series,
            max_len,
        } => {
            let patient = load(&folder, cli.verbose)?;
            let study = select(patient.studies.as_slice(), &study, "study")?;
            let series = select(study.series.as_slice(), &series, "series")?;
            let mut cache = DatasetCache::new();
            let count = edit::truncate_series_description(series, max_len, &mut cache)?;
            println!("Truncated {count} of {} descriptions", series.instances.len());
        }
        Command::ResetUpi {
            folder,
            study,
            sex,
            birth_date,
        } => {
            let patient = load(&folder, cli.verbose)?;
            let study = select(patient.studies.as_slice(), &study, "study")?;
            let defaults = UpiDefaults { sex, birth_date };
            let mut cache = DatasetCache::new();
            for change in edit::reset_upi(study, &defaults, &mut cache)? {
                println!(
                    "{} {}: {} -> {}",
                    change.modality,
                    change.series_uid,
                    change.old_description.as_deref().unwrap_or(""),
                    change.new_description.as_deref().unwrap_or("(unchanged)")
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(folder: &Path, verbose: bool) -> Result<Patient> {
    let mut loader = Loader::new();
    let progress = if verbose {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );
        loader = loader.with_progress(pb.clone());
        Some(pb)
    } else {
        None
    };

    let patient = loader
        .load_folder(folder)
        .with_context(|| format!("Failed to load {}", folder.display()))?;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    Ok(patient)
}

fn dump(file: &Path, search: Option<&str>, include_value: bool, output: Option<&Path>) -> Result<()> {
    let tree = DumpTree::from_file(file).with_context(|| format!("Failed to read {}", file.display()))?;

    if let Some(query) = search {
        if query.chars().count() < dicom_rt_tools::dump::MIN_QUERY_LEN {
            bail!("Search text must be at least {} characters", dicom_rt_tools::dump::MIN_QUERY_LEN);
        }
        for row in tree.search(query, include_value) {
            println!("{}", row.columns.join("\t"));
        }
        return Ok(());
    }

    let text = tree.render_text();
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn print_tree(patient: &Patient, instances: bool) {
    println!("{patient}");
    for (i, study) in patient.studies().enumerate() {
        println!("  {}: {study}", i + 1);
        for (j, series) in study.series().enumerate() {
            println!("    {}: {series} [{} instances]", j + 1, series.instances.len());
            if instances {
                for instance in series.instances() {
                    println!("        {} {}", instance.uid, instance.file.display());
                }
            }
        }
    }
}
