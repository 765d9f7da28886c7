use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "media-integrity")]
#[command(about = "Verify media/metadata pairs and repair metadata date fields", long_about = None)]
pub struct Cli {
    /// Directory for text/JSON/CSV reports (overrides config)
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Walk subdirectories (overrides config)
    #[arg(long, global = true)]
    pub recursive: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check that every media file has a metadata document and vice versa
    Pairs(PairsArgs),
    /// Classify date fields in metadata documents
    Validate(ValidateArgs),
    /// Replace specific bad values of one field, with backup
    Fix(FixArgs),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct PairsArgs {
    /// Folders holding media and metadata side by side
    #[arg(required_unless_present = "media_dir")]
    pub folders: Vec<PathBuf>,

    /// Dual mode: folder holding the media files
    #[arg(long, requires = "metadata_dir", conflicts_with = "folders")]
    pub media_dir: Option<PathBuf>,

    /// Dual mode: folder holding the metadata documents
    #[arg(long, requires = "media_dir")]
    pub metadata_dir: Option<PathBuf>,

    /// Accepted media extensions, e.g. mp4 mov (overrides config)
    #[arg(long = "media-ext", num_args = 1..)]
    pub media_extensions: Vec<String>,

    /// Metadata extension (overrides config)
    #[arg(long = "metadata-ext")]
    pub metadata_extension: Option<String>,

    /// Metadata documents live in this subdirectory of each folder
    #[arg(long)]
    pub metadata_subdir: Option<String>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Folders holding metadata documents
    #[arg(required = true)]
    pub folders: Vec<PathBuf>,

    /// Field paths to check, e.g. program_broadcasted_at or program.aired
    #[arg(long = "field", required = true, num_args = 1..)]
    pub fields: Vec<String>,

    /// Accepted date formats in priority order (overrides config)
    #[arg(long = "date-format", num_args = 1..)]
    pub date_formats: Vec<String>,

    /// Inclusive year range MIN MAX (overrides config)
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
    pub year_range: Option<Vec<i32>>,

    /// Disable the year range check
    #[arg(long, conflicts_with = "year_range")]
    pub any_year: bool,
}

#[derive(Debug, Args)]
pub struct FixArgs {
    /// Folders holding metadata documents
    #[arg(required = true)]
    pub folders: Vec<PathBuf>,

    /// Field path to correct
    #[arg(long)]
    pub field: String,

    /// Values to look for
    #[arg(long, required = true, num_args = 1..)]
    pub find: Vec<String>,

    /// Value written in their place
    #[arg(long)]
    pub replace: String,

    /// Report what would change without touching any file
    #[arg(long)]
    pub dry_run: bool,

    /// Modify documents without writing backups first
    #[arg(long)]
    pub no_backup: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}
