use std::path::PathBuf;

use clap::{Parser, Subcommand};
use titlekit::decrypt::{self, Never};
use titlekit::fst::{self, ExtractOptions};
use titlekit::manifest::DecryptionContext;

#[derive(Parser)]
#[command(name = "titlectl", about = "Decrypt and extract packaged Wii/Wii U titles")]
struct Cli {
    /// Raise the log filter (stackable: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decrypt every content container in a title directory.
    Decrypt {
        game_dir: PathBuf,
        /// Remove source `.app`/`.h3` files once their `.app.dec` is written.
        #[arg(long)]
        delete: bool,
        /// Write `.app.dec` files here instead of alongside the source.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract the file tree embedded in a title's decrypted containers.
    Extract {
        game_dir: PathBuf,
        /// Walk the tree and log it, but don't write any files.
        #[arg(long)]
        no_extract: bool,
        /// Also log (never extract) deleted entries.
        #[arg(long)]
        all: bool,
        /// Log type/flags/offset/size/content-index per entry.
        #[arg(long)]
        dump_info: bool,
        /// Log accumulated paths instead of an indented tree.
        #[arg(long)]
        full_paths: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(filter).init();

    let success = match cli.command {
        Command::Decrypt {
            game_dir,
            delete,
            output,
        } => run_decrypt(&game_dir, delete, output.as_deref())?,
        Command::Extract {
            game_dir,
            no_extract,
            all,
            dump_info,
            full_paths,
        } => run_extract(&game_dir, no_extract, all, dump_info, full_paths)?,
    };

    if success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn run_decrypt(game_dir: &std::path::Path, delete: bool, output: Option<&std::path::Path>) -> anyhow::Result<bool> {
    let mut warnings = Vec::new();
    let ctx = DecryptionContext::load(game_dir, &mut warnings)?;
    for w in &warnings {
        log::warn!("{w}");
    }

    let report = decrypt::decrypt_title(game_dir, output, &ctx, delete, &Never)?;
    for w in &report.warnings {
        log::warn!("{w}");
    }
    log::info!(
        "decrypted {} content(s), {} failed",
        report.decrypted.len(),
        report.failed.len()
    );
    Ok(report.is_success())
}

fn run_extract(
    game_dir: &std::path::Path,
    no_extract: bool,
    all: bool,
    dump_info: bool,
    full_paths: bool,
) -> anyhow::Result<bool> {
    let mut warnings = Vec::new();
    let ctx = DecryptionContext::load(game_dir, &mut warnings)?;
    for w in &warnings {
        log::warn!("{w}");
    }

    let options = ExtractOptions {
        no_extract,
        show_all: all,
        dump_info,
        full_paths,
    };
    let report = fst::extract_title(game_dir, game_dir, ctx.manifest(), &options, &Never)?;
    for w in &report.warnings {
        log::warn!("{w}");
    }
    log::info!(
        "extracted {} file(s), {} skipped",
        report.extracted.len(),
        report.skipped.len()
    );
    Ok(report.is_success() || no_extract)
}

